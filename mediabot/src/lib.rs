//! mediabot library crate.
//!
//! A background media acquisition agent: a supervised message bus, a
//! torrent crawler and the download orchestration around it.

pub mod bus;
pub mod config;
pub mod crawler;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod services;
pub mod torrent_client;
pub mod trackers;
pub mod utils;

pub use error::{Error, Result};
