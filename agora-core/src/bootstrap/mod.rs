//! Wiring for binaries embedding the permission engine
//!
//! Loads configuration, opens the database pool and assembles the
//! PostgreSQL-backed services.

pub mod config;
pub mod database;
pub mod services;

pub use config::load_config;
pub use database::init_database;
pub use services::{init_services, postgres_stores, Services};
