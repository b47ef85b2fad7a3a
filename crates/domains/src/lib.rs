//! domains/src/lib.rs
//!
//! Entities, identifiers, errors and the storage port shared by every other
//! crate in the workspace. Nothing in here performs I/O.

pub mod error;
pub mod ids;
pub mod models;
pub mod slug;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use ids::*;
pub use models::*;
pub use crate::slug::slugify;
pub use traits::*;
