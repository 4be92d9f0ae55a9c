//! Command dispatcher actor: executes the commands emitted by crawler workers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::media_server::LibraryScanner;
use crate::Result;
use crate::bus::{Action, Actor, ActorContext, ChatMessage, Command, Component, Envelope};
use crate::database::MediaStore;
use crate::domain::{MediaKey, MediaUpdate};

const DISPATCHER_ACTIONS: [Action; 1] = [Action::HandleCommand];

pub struct CommandDispatcher {
    store: Arc<dyn MediaStore>,
    scanner: Option<Arc<dyn LibraryScanner>>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn MediaStore>, scanner: Option<Arc<dyn LibraryScanner>>) -> Self {
        Self { store, scanner }
    }

    /// Persist `update`; the follow-ups go out only once it is stored.
    async fn update_media(
        &self,
        key: &MediaKey,
        update: &MediaUpdate,
        follow_up: &[Envelope],
        ctx: &ActorContext,
    ) -> Result<()> {
        self.store.update_fields(key, update).await?;
        debug!(media = %key, follow_up = follow_up.len(), "Media updated");

        for envelope in follow_up {
            if let Err(e) = ctx.send_message(envelope.clone()) {
                warn!(media = %key, envelope = ?envelope, error = %e, "Failed to send follow-up");
            }
        }
        Ok(())
    }

    async fn notify_by_media(&self, key: &MediaKey, text: &str, ctx: &ActorContext) -> Result<()> {
        let users = self.store.users_subscribed_to(key).await?;
        if users.is_empty() {
            debug!(media = %key, "Nobody to notify");
        }

        for user_id in users {
            let envelope =
                Envelope::chat(Component::CommandDispatcher, ChatMessage::text(user_id, text));
            if let Err(e) = ctx.send_message(envelope) {
                warn!(media = %key, user_id, error = %e, "Failed to queue notification");
            }
        }
        Ok(())
    }

    async fn rescan_library(&self) -> Result<()> {
        match &self.scanner {
            Some(scanner) => scanner.rescan().await,
            None => {
                info!("No media server configured, skipping library rescan");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Actor for CommandDispatcher {
    fn component(&self) -> Component {
        Component::CommandDispatcher
    }

    fn accepted_actions(&self) -> &'static [Action] {
        &DISPATCHER_ACTIONS
    }

    async fn handle_message(&self, envelope: Envelope, ctx: &ActorContext) -> Result<()> {
        let request = envelope.command_request()?;
        debug!(
            command = request.command.name(),
            user_id = request.user_id,
            source = %envelope.source(),
            "Handling command"
        );

        match &request.command {
            Command::UpdateMedia {
                key,
                update,
                follow_up,
            } => self.update_media(key, update, follow_up, ctx).await,
            Command::NotifyByMedia { key, text } => self.notify_by_media(key, text, ctx).await,
            Command::RescanLibrary => self.rescan_library().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bus::{CrawlerRequest, JobAction};
    use crate::database::InMemoryMediaStore;
    use crate::domain::{AcquisitionStatus, MediaRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct CountingScanner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LibraryScanner for CountingScanner {
        async fn rescan(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn context() -> (ActorContext, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(16);
        (
            ActorContext::new(Component::CommandDispatcher, tx, CancellationToken::new()),
            rx,
        )
    }

    fn update_envelope(key: MediaKey, status: AcquisitionStatus) -> Envelope {
        let follow_up = Envelope::crawler(
            Component::Crawler,
            JobAction::DownloadFile,
            CrawlerRequest::for_media(7, key),
        );
        Envelope::command(
            Component::Crawler,
            7,
            Command::UpdateMedia {
                key,
                update: MediaUpdate::default().with_status(status),
                follow_up: vec![follow_up],
            },
        )
    }

    #[tokio::test]
    async fn test_update_then_follow_up() {
        let store = Arc::new(InMemoryMediaStore::with_records([MediaRecord::film(
            1, "Heat", 1995,
        )]));
        let dispatcher = CommandDispatcher::new(store.clone(), None);
        let (ctx, mut rx) = context();

        dispatcher
            .handle_message(
                update_envelope(MediaKey::film(1), AcquisitionStatus::Ended),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(store.records()[0].status, AcquisitionStatus::Ended);
        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.job_action(), Some(JobAction::DownloadFile));
    }

    #[tokio::test]
    async fn test_failed_update_suppresses_follow_up() {
        let store = Arc::new(InMemoryMediaStore::new());
        let dispatcher = CommandDispatcher::new(store, None);
        let (ctx, mut rx) = context();

        let result = dispatcher
            .handle_message(
                update_envelope(MediaKey::film(404), AcquisitionStatus::Ended),
                &ctx,
            )
            .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_fans_out_to_subscribers() {
        let store = Arc::new(InMemoryMediaStore::with_records([MediaRecord::film(
            1, "Heat", 1995,
        )]));
        store.subscribe(10, &MediaKey::film(1)).await.unwrap();
        store.subscribe(11, &MediaKey::film(1)).await.unwrap();
        store.set_notify_all(12, true).await.unwrap();
        let dispatcher = CommandDispatcher::new(store, None);
        let (ctx, mut rx) = context();

        let envelope = Envelope::command(
            Component::Crawler,
            10,
            Command::NotifyByMedia {
                key: MediaKey::film(1),
                text: "ready".to_string(),
            },
        );
        dispatcher.handle_message(envelope, &ctx).await.unwrap();

        let mut users = Vec::new();
        while let Ok(sent) = rx.try_recv() {
            let chat = sent.as_chat().unwrap();
            assert_eq!(chat.text, "ready");
            users.push(chat.user_id);
        }
        assert_eq!(users, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_rescan_uses_scanner_when_configured() {
        let store = Arc::new(InMemoryMediaStore::new());
        let scanner = Arc::new(CountingScanner::default());
        let dispatcher = CommandDispatcher::new(store.clone(), Some(scanner.clone()));
        let (ctx, _rx) = context();
        let envelope = Envelope::command(Component::Crawler, 1, Command::RescanLibrary);

        dispatcher.handle_message(envelope.clone(), &ctx).await.unwrap();
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);

        let unconfigured = CommandDispatcher::new(store, None);
        unconfigured.handle_message(envelope, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_command_payload_is_rejected() {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryMediaStore::new()), None);
        let (ctx, _rx) = context();
        let envelope = Envelope::chat(Component::Crawler, ChatMessage::text(1, "hi"));

        let result = dispatcher.handle_message(envelope, &ctx).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
