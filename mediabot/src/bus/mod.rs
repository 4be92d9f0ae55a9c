//! Component-addressed message bus.
//!
//! Actors register with the [`Mediator`] under a [`Component`] identity and
//! a set of accepted [`Action`]s. Envelopes placed on the shared inbound
//! queue are fanned out to every actor whose identity and actions match.

mod actor;
mod envelope;
mod handle;
mod mediator;
mod restart_tracker;

pub use actor::{Actor, ActorContext};
pub use envelope::{
    Action, ChatMessage, Choice, Choices, Command, CommandRequest, Component, CrawlerRequest,
    Envelope, JobAction, Payload, ResolveRequest, TorrentPayload,
};
pub use handle::{ActorHandle, ActorMetadata, DEFAULT_MAILBOX_CAPACITY, SendError};
pub use mediator::{ActorFactory, Mediator, SupervisionReport};
pub use restart_tracker::{RestartPolicy, RestartTracker};
