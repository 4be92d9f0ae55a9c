//! The mediator: routes envelopes to actors and keeps actors alive.
//!
//! The registry is a list of slots rather than a map keyed by component,
//! one slot per component. A dead actor is swapped for a fresh instance
//! built from the slot's factory.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::actor::{Actor, RunningActor, start_actor};
use super::envelope::{Action, Component, Envelope};
use super::restart_tracker::RestartTracker;
use crate::config::BusConfig;
use crate::{Error, Result};

/// Builds a fresh actor instance from the arguments captured at registration.
pub type ActorFactory = Arc<dyn Fn() -> Result<Arc<dyn Actor>> + Send + Sync>;

struct ActorSlot {
    component: Component,
    actions: &'static [Action],
    factory: ActorFactory,
    running: Option<RunningActor>,
    generation: u64,
}

impl ActorSlot {
    fn accepts(&self, envelope: &Envelope) -> bool {
        self.component == envelope.destination() && self.actions.contains(&envelope.action())
    }

    fn is_alive(&self) -> bool {
        self.running.as_ref().is_some_and(RunningActor::is_alive)
    }
}

/// Outcome of one supervision pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisionReport {
    /// Components whose actor was rebuilt during this pass.
    pub restarted: Vec<Component>,
    /// Components left empty, waiting for backoff or after a failed rebuild.
    pub pending: Vec<Component>,
}

/// Component-addressed message router with supervision.
pub struct Mediator {
    inbound_tx: mpsc::Sender<Envelope>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<Envelope>>,
    slots: Mutex<Vec<ActorSlot>>,
    restarts: Mutex<RestartTracker>,
    mailbox_capacity: usize,
    token: CancellationToken,
}

impl Mediator {
    pub fn new(config: &BusConfig, token: CancellationToken) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            slots: Mutex::new(Vec::new()),
            restarts: Mutex::new(RestartTracker::new(config.restart.clone())),
            mailbox_capacity: config.mailbox_capacity,
            token,
        }
    }

    /// Handle to the shared inbound queue.
    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.inbound_tx.clone()
    }

    /// Register and start an actor. Each component may be registered once.
    pub fn register(&self, factory: ActorFactory) -> Result<Component> {
        let actor = factory()?;
        let component = actor.component();

        let mut slots = self.slots.lock();
        if slots.iter().any(|slot| slot.component == component) {
            return Err(Error::validation(format!(
                "component {component} is already registered"
            )));
        }

        let (running, actions) = self.start(actor, 0);
        slots.push(ActorSlot {
            component,
            actions,
            factory,
            running: Some(running),
            generation: 0,
        });
        info!(%component, "Actor registered");

        Ok(component)
    }

    fn start(&self, actor: Arc<dyn Actor>, generation: u64) -> (RunningActor, &'static [Action]) {
        let actions = actor.accepted_actions();
        let running = start_actor(
            actor,
            self.inbound_tx.clone(),
            self.mailbox_capacity,
            self.token.child_token(),
            generation,
        );
        (running, actions)
    }

    /// Deliver `envelope` to every matching actor. Returns the delivery count.
    ///
    /// Delivery is fire-and-forget: a full or closed mailbox is logged and
    /// skipped, and an envelope with no matching actor is dropped.
    pub fn route(&self, envelope: Envelope) -> usize {
        let slots = self.slots.lock();
        let mut delivered = 0;

        for slot in slots.iter().filter(|slot| slot.accepts(&envelope)) {
            let Some(running) = &slot.running else {
                debug!(component = %slot.component, "Slot empty, dropping envelope");
                continue;
            };
            match running.handle.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    component = %slot.component,
                    action = %envelope.action(),
                    mailbox = ?running.handle.mailbox_capacity(),
                    error = %e,
                    "Delivery failed, envelope skipped"
                ),
            }
        }

        if delivered == 0 {
            trace!(?envelope, "No actor accepted envelope");
        }
        delivered
    }

    /// Drain the inbound queue and route every envelope until cancelled.
    ///
    /// Only one loop can drain the queue at a time. A replacement loop
    /// started after a crash picks up where the dead one stopped.
    pub async fn run(self: Arc<Self>) {
        let mut inbound = self.inbound_rx.lock().await;
        info!("Bus loop started");

        loop {
            let envelope = tokio::select! {
                _ = self.token.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.route(envelope);
        }

        info!("Bus loop stopped");
    }

    /// Rebuild every dead actor whose restart backoff has elapsed.
    ///
    /// A live actor is never replaced.
    pub fn supervise_once(&self) -> SupervisionReport {
        let mut report = SupervisionReport::default();
        if self.token.is_cancelled() {
            return report;
        }

        let mut slots = self.slots.lock();
        let mut restarts = self.restarts.lock();

        for slot in slots.iter_mut() {
            if slot.is_alive() {
                continue;
            }

            let component = slot.component.as_str();
            if let Some(dead) = slot.running.take() {
                dead.stop();
                warn!(
                    component,
                    generation = slot.generation,
                    mailbox_closed = dead.handle.is_closed(),
                    "Actor is dead"
                );
                restarts.record_failure(component);
            }

            if !restarts.ready(component) {
                report.pending.push(slot.component);
                continue;
            }

            match (slot.factory)() {
                Ok(actor) => {
                    slot.generation += 1;
                    let (running, actions) = self.start(actor, slot.generation);
                    slot.actions = actions;
                    slot.running = Some(running);
                    info!(
                        component,
                        generation = slot.generation,
                        recent_failures = restarts.recent_failures(component),
                        total_restarts = restarts.total_restarts(component),
                        "Actor restarted"
                    );
                    report.restarted.push(slot.component);
                }
                Err(e) => {
                    error!(component, error = %e, "Failed to rebuild actor");
                    report.pending.push(slot.component);
                }
            }
        }

        report
    }

    pub fn is_alive(&self, component: Component) -> bool {
        self.slots
            .lock()
            .iter()
            .any(|slot| slot.component == component && slot.is_alive())
    }

    /// Generation of the registered instance, bumped on every rebuild.
    pub fn generation(&self, component: Component) -> Option<u64> {
        self.slots
            .lock()
            .iter()
            .find(|slot| slot.component == component)
            .map(|slot| slot.generation)
    }

    pub fn components(&self) -> Vec<Component> {
        self.slots.lock().iter().map(|slot| slot.component).collect()
    }

    /// Abort a component's tasks, as if the actor crashed.
    pub fn kill(&self, component: Component) {
        if let Some(running) = self
            .slots
            .lock()
            .iter()
            .find(|slot| slot.component == component)
            .and_then(|slot| slot.running.as_ref())
        {
            running.abort();
        }
    }

    /// Stop the bus loop and every actor.
    pub fn shutdown(&self) {
        self.token.cancel();
        for slot in self.slots.lock().iter() {
            if let Some(running) = &slot.running {
                running.stop();
            }
        }
    }
}
