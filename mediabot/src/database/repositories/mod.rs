//! Repository layer for database access.

pub mod media;

pub use media::*;
