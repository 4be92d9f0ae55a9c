//! Small shared helpers.

pub mod format;
pub mod http_client;
pub mod url;
