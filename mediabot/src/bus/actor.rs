//! Supervised actor contract and its runtime.
//!
//! An actor runs as two tasks: a listen loop that drains its mailbox and
//! dispatches every envelope to [`Actor::handle_message`], and a main
//! activity for background behavior. The actor counts as alive while both
//! tasks are running.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use super::envelope::{Action, Component, Envelope};
use super::handle::{ActorHandle, ActorMetadata, SendError};
use crate::Result;

/// Behavior of a bus-addressable component.
///
/// Implementations are built by a factory registered with the mediator, so
/// everything an actor needs must be captured at construction. The queues
/// are supplied by the runtime through [`ActorContext`] and the mailbox.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
    /// Component identity this actor is registered under.
    fn component(&self) -> Component;

    /// Actions this actor accepts.
    fn accepted_actions(&self) -> &'static [Action];

    /// Handle one envelope from the mailbox.
    ///
    /// Errors are logged by the listen loop and never stop it.
    async fn handle_message(&self, envelope: Envelope, ctx: &ActorContext) -> Result<()>;

    /// Background activity. Returning ends the actor's life.
    async fn main_activity(&self, ctx: ActorContext) -> Result<()> {
        ctx.cancelled().await;
        Ok(())
    }
}

/// Per-instance context handed to an actor.
#[derive(Clone)]
pub struct ActorContext {
    component: Component,
    bus: mpsc::Sender<Envelope>,
    token: CancellationToken,
}

impl ActorContext {
    pub fn new(
        component: Component,
        bus: mpsc::Sender<Envelope>,
        token: CancellationToken,
    ) -> Self {
        Self {
            component,
            bus,
            token,
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    /// Enqueue an envelope on the bus without blocking.
    pub fn send_message(&self, envelope: Envelope) -> std::result::Result<(), SendError> {
        self.bus.try_send(envelope).map_err(SendError::from)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the actor is asked to stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// A started actor instance.
pub(crate) struct RunningActor {
    pub(crate) handle: ActorHandle<Envelope>,
    listen: JoinHandle<()>,
    main: JoinHandle<()>,
}

impl RunningActor {
    pub(crate) fn is_alive(&self) -> bool {
        !self.listen.is_finished() && !self.main.is_finished()
    }

    /// Stop both tasks; whichever is still running winds down on cancellation.
    pub(crate) fn stop(&self) {
        self.handle.cancel();
    }

    pub(crate) fn abort(&self) {
        self.handle.cancel();
        self.listen.abort();
        self.main.abort();
    }
}

/// Start an actor with a fresh mailbox.
pub(crate) fn start_actor(
    actor: Arc<dyn Actor>,
    bus: mpsc::Sender<Envelope>,
    mailbox_capacity: usize,
    token: CancellationToken,
    generation: u64,
) -> RunningActor {
    let component = actor.component();
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let handle = ActorHandle::new(
        tx,
        token.clone(),
        ActorMetadata::new(component.as_str(), generation),
    );
    let ctx = ActorContext::new(component, bus, token);

    let span = info_span!("actor", component = %component, generation);
    let listen = tokio::spawn(
        listen_loop(actor.clone(), rx, ctx.clone()).instrument(span.clone()),
    );
    let main = tokio::spawn(main_loop(actor, ctx).instrument(span));

    RunningActor {
        handle,
        listen,
        main,
    }
}

async fn listen_loop(
    actor: Arc<dyn Actor>,
    mut mailbox: mpsc::Receiver<Envelope>,
    ctx: ActorContext,
) {
    loop {
        let envelope = tokio::select! {
            _ = ctx.cancelled() => break,
            msg = mailbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let action = envelope.action();
        let source = envelope.source();
        match AssertUnwindSafe(actor.handle_message(envelope, &ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%action, %source, error = %e, "Message handler failed");
            }
            Err(_) => {
                error!(%action, %source, "Message handler panicked");
            }
        }
    }
    debug!("Listen loop stopped");
}

async fn main_loop(actor: Arc<dyn Actor>, ctx: ActorContext) {
    match AssertUnwindSafe(actor.main_activity(ctx.clone()))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) if ctx.is_cancelled() => debug!("Main activity stopped"),
        Ok(Ok(())) => warn!("Main activity returned before shutdown"),
        Ok(Err(e)) => error!(error = %e, "Main activity failed"),
        Err(_) => error!("Main activity panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bus::envelope::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Actor for Flaky {
        fn component(&self) -> Component {
            Component::ChatClient
        }

        fn accepted_actions(&self) -> &'static [Action] {
            &[Action::SendMessage]
        }

        async fn handle_message(&self, envelope: Envelope, _ctx: &ActorContext) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            let text = envelope.as_chat().map(|m| m.text.clone()).unwrap_or_default();
            match text.as_str() {
                "panic" => panic!("boom"),
                "error" => Err(Error::validation("bad message")),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_listen_loop_survives_errors_and_panics() {
        let handled = Arc::new(AtomicUsize::new(0));
        let (bus_tx, _bus_rx) = mpsc::channel(8);
        let running = start_actor(
            Arc::new(Flaky {
                handled: handled.clone(),
            }),
            bus_tx,
            8,
            CancellationToken::new(),
            0,
        );

        for text in ["panic", "error", "ok"] {
            running
                .handle
                .try_send(Envelope::chat(Component::Crawler, ChatMessage::text(1, text)))
                .unwrap();
        }

        for _ in 0..100 {
            if handled.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert!(running.is_alive());

        running.stop();
    }

    #[tokio::test]
    async fn test_context_send_is_non_blocking() {
        let (bus_tx, mut bus_rx) = mpsc::channel(1);
        let ctx = ActorContext::new(Component::Crawler, bus_tx, CancellationToken::new());

        let msg = || Envelope::chat(Component::Crawler, ChatMessage::text(1, "x"));
        ctx.send_message(msg()).unwrap();
        assert_eq!(ctx.send_message(msg()), Err(SendError::MailboxFull));
        assert!(bus_rx.recv().await.is_some());
    }
}
