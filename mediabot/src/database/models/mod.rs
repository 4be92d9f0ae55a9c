//! Database models.
//!
//! These map directly to the schema and convert to and from the domain types.

pub mod media;

pub use media::*;
