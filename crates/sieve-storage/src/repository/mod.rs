//! Database repositories for each table.

pub mod config;
pub mod policies;
pub mod sessions;

pub use config::ConfigRepo;
pub use policies::PoliciesRepo;
pub use sessions::SessionsRepo;
