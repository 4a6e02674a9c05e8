//! Local profile storage: row models and SQL repositories.
//!
//! - `model`: rows returned by repositories.
//! - `repo`: SQL-only functions plus the `CredentialStore` implementation.
//!
//! Callers import from `canvas_grading_queue::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use model::ProfileRow;
pub use repo::*;
