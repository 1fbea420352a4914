//! Sieve - capture policy matching and session export.
//!
//! This crate backs the `sieve` binary:
//!
//! - [`config`]: settings persisted in the database
//! - [`commands`]: export, match, policy, decode and session listing
//!
//! # Usage
//!
//! ```ignore
//! use sieve_app::commands::export;
//! use sieve_app::config::AppConfig;
//! use sieve_export::ExportKind;
//! use sieve_storage::Database;
//!
//! let db = Database::new().expect("Failed to open database");
//! let config = AppConfig::load(&db).expect("Failed to load config");
//!
//! let path = export::run(&db, &config, vec![1, 2], ExportKind::HarArchive).await?;
//! println!("{}", path);
//! ```

pub mod commands;
pub mod config;

pub use config::AppConfig;
