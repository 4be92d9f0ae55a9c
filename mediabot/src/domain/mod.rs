//! Domain types shared by the bus, the crawler and the persistence layer.

mod media;
mod status;

pub use media::{MediaKey, MediaKind, MediaRecord, MediaUpdate};
pub use status::AcquisitionStatus;
