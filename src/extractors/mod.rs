//! Request extractors: authenticated admins and the login form.

mod admin;
mod login;
pub use admin::{AuthAdmin, PrivilegedAdmin, BEARER_PREFIX};
pub(crate) use admin::ensure_privileged;
pub use login::LoginForm;
