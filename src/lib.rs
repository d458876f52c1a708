//! Community administration backend: residents, addresses, merchants, properties and admin accounts
//! over PostgreSQL, served as a JSON API.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{catalog, resolve, ResolvedEntity, ResolvedModel, Settings};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::{api_routes, app, common_routes};
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_database_exists, seed_defaults};
