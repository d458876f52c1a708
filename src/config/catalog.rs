//! The community-management data model. Tables are listed parents first so DDL runs in dependency order.

use crate::config::types::{Capability, ColumnDef, ColumnType, TableDef};

const ID_CARD_PATTERN: &str = r"^\d{17}[\dXx]$";
const CREDIT_CODE_PATTERN: &str = r"^[0-9A-Z]{18}$";

pub fn catalog() -> Vec<TableDef> {
    use ColumnType::*;

    vec![
        TableDef::new("streets", "streets")
            .column(ColumnDef::new("street_name", Varchar(100)).unique())
            .timestamps()
            .search(&["street_name"])
            .label("street_name"),
        TableDef::new("groups", "groups")
            .column(ColumnDef::new("group_number", Varchar(50)).unique())
            .timestamps()
            .search(&["group_number"])
            .label("group_number"),
        TableDef::new("ethnicities", "ethnicities")
            .column(ColumnDef::new("name", Varchar(50)).unique())
            .search(&["name"])
            .label("name"),
        TableDef::new("industries", "industries")
            .column(ColumnDef::new("industry_name", Varchar(100)).unique())
            .column(ColumnDef::new("industry_code", Varchar(50)).unique())
            .search(&["industry_name", "industry_code"])
            .label("industry_name"),
        TableDef::new("roles", "roles")
            .column(ColumnDef::new("name", Varchar(50)).unique())
            .column(ColumnDef::new("description", Varchar(255)).nullable())
            .search(&["name"])
            .label("name")
            .privileged_writes(),
        // address tree
        TableDef::new("hutong", "hutong")
            .column(ColumnDef::new("hutong_name", Varchar(255)).unique())
            .column(ColumnDef::new("group_id", Int).references("groups"))
            .column(ColumnDef::new("hutong_number", Varchar(50)))
            .timestamps()
            .search(&["hutong_name", "hutong_number"])
            .label("hutong_name")
            .index("idx_hutong_group", &["group_id"])
            .index("idx_hutong_number", &["hutong_number"]),
        TableDef::new("community", "communities")
            .column(ColumnDef::new("community_name", Varchar(255)).unique())
            .column(ColumnDef::new("group_id", Int).references("groups"))
            .column(ColumnDef::new("community_number", Varchar(50)))
            .column(ColumnDef::new("has_property", Bool).default_to("FALSE").managed())
            .timestamps()
            .search(&["community_name", "community_number"])
            .distributions(&["has_property", "group_id"])
            .label("community_name")
            .index("idx_community_group", &["group_id"])
            .index("idx_community_has_property", &["has_property"]),
        TableDef::new("apartment", "apartments")
            .column(ColumnDef::new("community_id", Int).references("community"))
            .column(ColumnDef::new("apartment_number", SmallInt).minimum(0))
            .timestamps()
            .search(&["apartment_number"])
            .index("idx_apartment_community_number", &["community_id", "apartment_number"]),
        TableDef::new("unit", "units")
            .column(ColumnDef::new("apartment_id", Int).references("apartment"))
            .column(ColumnDef::new("unit_number", SmallInt))
            .timestamps()
            .search(&["unit_number"])
            .index("idx_unit_apartment", &["apartment_id"]),
        TableDef::new("house", "houses")
            .column(ColumnDef::new("unit_id", Int).references("unit"))
            .column(ColumnDef::new("house_number", Varchar(20)))
            .timestamps()
            .search(&["house_number"])
            .index("idx_house_unit", &["unit_id"]),
        // population registry
        TableDef::new("residents", "residents")
            .column(ColumnDef::new("name", Varchar(50)))
            .column(ColumnDef::new("id_card", Varchar(18)).unique().pattern(ID_CARD_PATTERN))
            .column(ColumnDef::new("gender", SmallInt).default_to("0").choices(0, 1))
            .column(ColumnDef::new("birth_date", Date))
            .column(ColumnDef::new("ethnicity_id", Int).references("ethnicities"))
            .column(ColumnDef::new("political_affiliation", SmallInt).default_to("0").choices(0, 10))
            .column(ColumnDef::new("household_address", Varchar(255)).default_to("''"))
            .column(ColumnDef::new("phone_number", Varchar(20)).default_to("''"))
            .column(ColumnDef::new("marital_status", SmallInt).default_to("0").choices(0, 3))
            .column(ColumnDef::new("education_level", SmallInt).default_to("0").choices(0, 6))
            .column(ColumnDef::new("population_type", SmallInt).default_to("0").choices(0, 1))
            .column(ColumnDef::new("residential_type", SmallInt).default_to("0").choices(0, 1))
            .column(ColumnDef::new("own_house", SmallInt).default_to("0").choices(0, 1))
            .column(flag("is_low_income"))
            .column(flag("is_beneficiary"))
            .column(flag("is_disabled"))
            .column(flag("is_special_support"))
            .column(flag("is_key_person"))
            .column(flag("is_deceased"))
            .timestamps()
            .search(&["name", "id_card"])
            .distributions(&[
                "gender",
                "ethnicity_id",
                "political_affiliation",
                "marital_status",
                "education_level",
                "population_type",
                "residential_type",
            ])
            .label("name")
            .index("idx_residents_name", &["name"])
            .index("idx_residents_ethnicity", &["ethnicity_id"])
            .index("idx_residents_registration", &["registration_date"])
            .capability(Capability::NewCount)
            .capability(Capability::Import)
            .capability(Capability::AgeDistribution)
            .capability(Capability::SpecialStats)
            .capability(Capability::ByCommunity),
        TableDef::new("bungalow", "bungalows")
            .column(ColumnDef::new("resident_id", Int).references("residents"))
            .column(ColumnDef::new("bungalow_number", Varchar(50)))
            .column(ColumnDef::new("hutong_id", Int).references("hutong"))
            .timestamps()
            .search(&["bungalow_number"])
            .index("idx_bungalow_resident_number", &["resident_id", "bungalow_number"]),
        TableDef::new("building", "buildings")
            .column(ColumnDef::new("resident_id", Int).references("residents"))
            .column(ColumnDef::new("building_number", Int))
            .column(ColumnDef::new("house_id", Int).references("house"))
            .timestamps()
            .search(&["building_number"])
            .index("idx_building_resident_house", &["resident_id", "house_id"]),
        benefit("low_income", "low-income", "is_low_income", "idx_low_income_resident_id"),
        benefit("five_guarantees", "five-guarantees", "is_beneficiary", "idx_five_guar_resident_id"),
        benefit("disabled", "disabled", "is_disabled", "idx_disabled_resident_id"),
        benefit("special_needs", "special-needs", "is_special_support", "idx_special_needs_resident_id"),
        TableDef::new("deceased", "deceased")
            .column(ColumnDef::new("resident_id", Int).references("residents"))
            .column(ColumnDef::new("deceased_date", Timestamptz))
            .column(ColumnDef::new("deceased_place", Varchar(100)))
            .column(ColumnDef::new("deceased_reason", Varchar(255)))
            .column(ColumnDef::new("deceased_contact_name", Varchar(100)))
            .column(ColumnDef::new("deceased_contact_phone", Varchar(20)))
            .timestamps()
            .search(&["deceased_place", "deceased_reason", "deceased_contact_name"])
            .index("idx_deceased_resident_id", &["resident_id"])
            .mirror("resident_id", "residents", "is_deceased")
            .capability(Capability::NewCount)
            .capability(Capability::Import),
        TableDef::new("special_objects", "special-objects")
            .column(ColumnDef::new("resident_id", Int).references("residents"))
            .column(ColumnDef::new("object_type", SmallInt).choices(0, 2))
            .column(ColumnDef::new("object_name", Varchar(100)))
            .column(ColumnDef::new("object_contact_phone", Varchar(20)))
            .column(ColumnDef::new("object_address", Varchar(255)))
            .column(ColumnDef::new("object_responsible_name", Varchar(100)))
            .column(ColumnDef::new("object_responsible_phone", Varchar(20)))
            .timestamps()
            .search(&["object_name", "object_address", "object_responsible_name"])
            .distributions(&["object_type"])
            .index("idx_special_obj_resident_id", &["resident_id"])
            .mirror("resident_id", "residents", "is_key_person")
            .capability(Capability::Import),
        // business registry
        TableDef::new("merchants", "merchants")
            .column(ColumnDef::new("merchants_name", Varchar(100)))
            .column(ColumnDef::new("credit_code", Varchar(18)).unique().pattern(CREDIT_CODE_PATTERN))
            .column(ColumnDef::new("license_number", Varchar(50)))
            .column(ColumnDef::new("legal_person_name", Varchar(50)))
            .column(ColumnDef::new("legal_person_id", Varchar(18)).pattern(ID_CARD_PATTERN))
            .column(ColumnDef::new("phone_number", Varchar(20)).nullable())
            .column(ColumnDef::new("address", Varchar(255)))
            .column(ColumnDef::new("business_scope", Text).nullable())
            .column(ColumnDef::new("industry_id", Int).references("industries"))
            .column(ColumnDef::new("street_id", Int).references("streets"))
            .column(ColumnDef::new("establishment_date", Date))
            .timestamps()
            .search(&["merchants_name", "credit_code", "legal_person_name"])
            .distributions(&["industry_id", "street_id"])
            .index("idx_merchants_name", &["merchants_name"])
            .index("idx_license_number", &["license_number"])
            .index("idx_legal_person", &["legal_person_name"])
            .index("idx_merchants_street", &["street_id"])
            .index("idx_merchants_industry", &["industry_id"])
            .index("idx_merchants_registration", &["registration_date"])
            .capability(Capability::NewCount)
            .capability(Capability::Import),
        // property management
        TableDef::new("properties", "properties")
            .column(ColumnDef::new("property_name", Varchar(255)).unique())
            .column(ColumnDef::new("property_address", Varchar(255)))
            .column(ColumnDef::new("property_owner", Varchar(255)))
            .column(ColumnDef::new("property_contact_phone", Varchar(20)))
            .timestamps()
            .search(&["property_name", "property_address", "property_owner"])
            .label("property_name")
            .index("idx_property_owner", &["property_owner"])
            .index("idx_property_contact_phone", &["property_contact_phone"])
            .capability(Capability::ByCommunity),
        TableDef::new("property_manager", "property-managers")
            .column(ColumnDef::new("property_id", Int).references("properties"))
            .column(ColumnDef::new("community_id", Int).references("community").unique())
            .timestamps()
            .distributions(&["property_id"])
            .index("idx_property_community", &["property_id", "community_id"])
            .mirror("community_id", "community", "has_property"),
        // operators
        TableDef::new("admins", "admins")
            .column(ColumnDef::new("username", Varchar(50)).unique())
            .column(ColumnDef::new("password_hash", Varchar(255)).managed().sensitive())
            .column(ColumnDef::new("real_name", Varchar(50)))
            .column(ColumnDef::new("phone_number", Varchar(20)))
            .column(ColumnDef::new("role_id", Int).references("roles"))
            .column(ColumnDef::new("status", Bool).default_to("TRUE"))
            .column(ColumnDef::new("create_time", Timestamptz).default_to("NOW()").managed())
            .column(ColumnDef::new("last_login_time", Timestamptz).nullable().managed())
            .search(&["username", "real_name"])
            .distributions(&["status", "role_id"])
            .index("idx_admin_role", &["role_id"])
            .index("idx_admin_status", &["status"])
            .hidden(),
    ]
}

fn flag(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Bool).default_to("FALSE").managed()
}

/// Benefit detail tables share one shape and each mirrors one resident flag.
fn benefit(
    name: &'static str,
    path: &'static str,
    flag_column: &'static str,
    resident_index: &'static str,
) -> TableDef {
    TableDef::new(name, path)
        .column(ColumnDef::new("resident_id", ColumnType::Int).references("residents"))
        .column(ColumnDef::new("authentication_date", ColumnType::Timestamptz))
        .column(ColumnDef::new("bank_account_number", ColumnType::Varchar(50)).unique())
        .column(ColumnDef::new("bank_account_name", ColumnType::Varchar(100)))
        .timestamps()
        .search(&["bank_account_name", "bank_account_number"])
        .index(resident_index, &["resident_id"])
        .mirror("resident_id", "residents", flag_column)
        .capability(Capability::NewCount)
        .capability(Capability::Import)
}
