//! Torrent crawler: job scheduling, search arbitration and download
//! orchestration.
//!
//! The [`Crawler`] actor turns crawler requests into [`MediaTask`]s and runs
//! each one on a [`Worker`] task. Workers publish bus envelopes; the crawler
//! forwards them on its next tick.

mod client_worker;
mod download;
pub mod job;
pub mod matcher;
pub mod replies;
mod search;
mod service;
pub mod worker;

pub use client_worker::TorrentClientWorker;
pub use download::DownloadWorker;
pub use job::{MediaTask, WorkerKind, infer_action};
pub use matcher::{MatchSettings, MatchTarget, best_match};
pub use search::TorrentSearchWorker;
pub use service::{Crawler, CrawlerDeps, TickReport};
pub use worker::{ResultSink, Worker, WorkerHandle};
