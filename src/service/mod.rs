//! Service layer: generic CRUD over the catalog plus reporting and account queries.

mod auth;
mod command;
mod crud;
mod pagination;
mod stats;
mod validation;
pub use auth::{AdminProfile, AdminRow, AuthService, LoginOutcome, MSG_ACCOUNT_DISABLED, MSG_BAD_CREDENTIALS, MSG_EMPTY_CREDENTIALS};
pub use command::{parse_command, AdminCommand, EntityCommand, UpdateCommand};
pub use crud::{row_id, CrudService, ImportSummary, IMPORT_LIMIT};
pub use pagination::{PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use stats::{AgeGroupCount, Dashboard, Period, PropertyQueries, ResidentQueries, SpecialStats, TimeRange};
pub use validation::RequestValidator;
