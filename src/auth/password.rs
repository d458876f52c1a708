use crate::error::AppError;

pub fn hash_password(plain: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(plain, cost)?)
}

/// A malformed stored hash counts as a mismatch rather than an error.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = hash_password("s3cret!", 4).unwrap();
        assert_ne!(h, "s3cret!");
        assert!(verify_password("s3cret!", &h));
        assert!(!verify_password("wrong", &h));
    }

    #[test]
    fn plaintext_is_never_accepted_as_a_hash() {
        assert!(!verify_password("admin", "admin"));
    }
}
