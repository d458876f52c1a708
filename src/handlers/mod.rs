//! HTTP handlers: generic entity endpoints, authentication, admin management and the dashboard.

pub mod admins;
pub mod auth;
pub mod dashboard;
pub mod entity;
