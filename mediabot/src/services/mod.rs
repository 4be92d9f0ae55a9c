//! Application services: the bus host, the command dispatcher and the
//! front-end stand-ins.

mod console;
mod container;
mod dispatcher;
mod media_server;

pub use console::{ConsoleChat, render};
pub use container::{ServiceContainer, ServiceParts};
pub use dispatcher::CommandDispatcher;
pub use media_server::{LibraryScanner, MediaServerClient};
