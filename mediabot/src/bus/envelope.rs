//! Addressed message envelopes exchanged over the bus.
//!
//! An [`Envelope`] carries a destination component, an action, the sending
//! component and a typed payload. Envelopes can only be built through the
//! factory functions in this module, each of which fixes the
//! `(destination, action)` pair together with its payload type, so an
//! address can never disagree with what it carries.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::{MediaKey, MediaKind, MediaUpdate};
use crate::{Error, Result};

/// Addressable components on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// User-facing chat front-end.
    ChatClient,
    /// Title/year/season resolution pipeline.
    SearchResolver,
    /// Job scheduler performing torrent search and download orchestration.
    Crawler,
    /// Executes persistence and notification commands.
    CommandDispatcher,
    /// The host process itself (periodic checks, bootstrapping).
    Main,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatClient => "chat-client",
            Self::SearchResolver => "search-resolver",
            Self::Crawler => "crawler",
            Self::CommandDispatcher => "command-dispatcher",
            Self::Main => "main",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions an envelope can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SendMessage,
    Parse,
    HandleCommand,
    ForceCheck,
    CheckFilms,
    CheckSerials,
    Check,
    AddToClient,
    WatchProgress,
    DownloadFile,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send-message",
            Self::Parse => "parse",
            Self::HandleCommand => "handle-command",
            Self::ForceCheck => "force-check",
            Self::CheckFilms => "check-films",
            Self::CheckSerials => "check-serials",
            Self::Check => "check",
            Self::AddToClient => "add-to-client",
            Self::WatchProgress => "watch-progress",
            Self::DownloadFile => "download-file",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The subset of actions the crawler accepts, i.e. the kinds of crawler job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Standing watch: search, and tell the user when nothing is found yet.
    ForceCheck,
    CheckFilms,
    CheckSerials,
    Check,
    /// Submit an already fetched torrent file to the torrent client.
    AddToClient,
    /// Poll the torrent client for download progress.
    WatchProgress,
    /// Fetch the torrent file behind a resolved download URL.
    DownloadFile,
}

impl JobAction {
    pub const ALL: [JobAction; 7] = [
        JobAction::ForceCheck,
        JobAction::CheckFilms,
        JobAction::CheckSerials,
        JobAction::Check,
        JobAction::AddToClient,
        JobAction::WatchProgress,
        JobAction::DownloadFile,
    ];

    pub fn as_action(&self) -> Action {
        match self {
            Self::ForceCheck => Action::ForceCheck,
            Self::CheckFilms => Action::CheckFilms,
            Self::CheckSerials => Action::CheckSerials,
            Self::Check => Action::Check,
            Self::AddToClient => Action::AddToClient,
            Self::WatchProgress => Action::WatchProgress,
            Self::DownloadFile => Action::DownloadFile,
        }
    }

    pub fn from_action(action: Action) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_action() == action)
    }

    /// Search-family actions run the torrent search worker.
    pub fn is_search(&self) -> bool {
        matches!(
            self,
            Self::ForceCheck | Self::CheckFilms | Self::CheckSerials | Self::Check
        )
    }

    /// Client-management actions talk to the torrent client backend.
    pub fn is_client_management(&self) -> bool {
        matches!(self, Self::AddToClient | Self::WatchProgress)
    }
}

impl From<JobAction> for Action {
    fn from(action: JobAction) -> Self {
        action.as_action()
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_action())
    }
}

/// One selectable option attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub button: String,
    /// Opaque data handed back by the front-end when the option is picked.
    pub callback: serde_json::Value,
}

/// A set of options the user is asked to pick from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choices {
    pub action: String,
    pub options: Vec<Choice>,
}

/// Text message for a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: i64,
    pub text: String,
    pub choices: Option<Choices>,
}

impl ChatMessage {
    pub fn text(user_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            choices: None,
        }
    }

    pub fn with_choices(mut self, choices: Choices) -> Self {
        self.choices = Some(choices);
        self
    }
}

/// Raw torrent file carried from the download stage to the client stage.
#[derive(Clone, PartialEq)]
pub struct TorrentPayload {
    /// Tracker-side id of the torrent, used for file naming.
    pub id: String,
    pub data: Bytes,
}

impl fmt::Debug for TorrentPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentPayload")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Inbound request for the crawler.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerRequest {
    pub user_id: i64,
    /// Catalog id of the target, 0 for "all pending records of `kind`".
    pub media_id: u64,
    pub kind: MediaKind,
    pub season: Option<u32>,
    /// Force-refresh flag (progress watch stops after one report).
    pub force: bool,
    pub torrent: Option<TorrentPayload>,
    /// Overrides the torrent handle stored on the record.
    pub torrent_handle: Option<String>,
    /// Whether progress messages offer a refresh option.
    pub keyboard: bool,
}

impl CrawlerRequest {
    /// Request targeting one record.
    pub fn for_media(user_id: i64, key: MediaKey) -> Self {
        Self {
            user_id,
            media_id: key.media_id,
            kind: key.kind,
            season: key.season,
            force: false,
            torrent: None,
            torrent_handle: None,
            keyboard: true,
        }
    }

    /// Request covering every pending record of `kind`.
    pub fn broad(user_id: i64, kind: MediaKind) -> Self {
        Self {
            user_id,
            media_id: 0,
            kind,
            season: None,
            force: false,
            torrent: None,
            torrent_handle: None,
            keyboard: true,
        }
    }

    pub fn is_broad(&self) -> bool {
        self.media_id == 0
    }

    pub fn key(&self) -> MediaKey {
        MediaKey {
            media_id: self.media_id,
            kind: self.kind,
            season: self.season,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_torrent(mut self, torrent: TorrentPayload) -> Self {
        self.torrent = Some(torrent);
        self
    }

    pub fn with_torrent_handle(mut self, handle: impl Into<String>) -> Self {
        self.torrent_handle = Some(handle.into());
        self
    }

    pub fn without_keyboard(mut self) -> Self {
        self.keyboard = false;
        self
    }
}

/// Commands executed by the command dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Persist `update`, then re-emit `follow_up` once it is stored.
    UpdateMedia {
        key: MediaKey,
        update: MediaUpdate,
        follow_up: Vec<Envelope>,
    },
    /// Send `text` to every user subscribed to the record.
    NotifyByMedia { key: MediaKey, text: String },
    /// Ask the media server to rescan its library.
    RescanLibrary,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateMedia { .. } => "update-media",
            Self::NotifyByMedia { .. } => "notify-by-media",
            Self::RescanLibrary => "rescan-library",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub user_id: i64,
    pub command: Command,
}

/// Free-text request for the search resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub user_id: i64,
    pub text: String,
}

/// Typed payload; which variant is present follows from the address.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Chat(ChatMessage),
    Crawler(CrawlerRequest),
    Command(CommandRequest),
    Resolve(ResolveRequest),
}

/// An immutable, addressed unit of work.
#[derive(Clone, PartialEq)]
pub struct Envelope {
    destination: Component,
    action: Action,
    source: Component,
    payload: Arc<Payload>,
}

impl Envelope {
    fn new(destination: Component, action: Action, source: Component, payload: Payload) -> Self {
        Self {
            destination,
            action,
            source,
            payload: Arc::new(payload),
        }
    }

    /// Message for a user, delivered to the chat front-end.
    pub fn chat(source: Component, message: ChatMessage) -> Self {
        Self::new(
            Component::ChatClient,
            Action::SendMessage,
            source,
            Payload::Chat(message),
        )
    }

    /// Job request for the crawler.
    pub fn crawler(source: Component, action: JobAction, request: CrawlerRequest) -> Self {
        Self::new(
            Component::Crawler,
            action.as_action(),
            source,
            Payload::Crawler(request),
        )
    }

    /// Command for the command dispatcher.
    pub fn command(source: Component, user_id: i64, command: Command) -> Self {
        Self::new(
            Component::CommandDispatcher,
            Action::HandleCommand,
            source,
            Payload::Command(CommandRequest { user_id, command }),
        )
    }

    /// Free-text request for the search resolver.
    pub fn resolve(source: Component, request: ResolveRequest) -> Self {
        Self::new(
            Component::SearchResolver,
            Action::Parse,
            source,
            Payload::Resolve(request),
        )
    }

    pub fn destination(&self) -> Component {
        self.destination
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn source(&self) -> Component {
        self.source
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn as_chat(&self) -> Option<&ChatMessage> {
        match self.payload() {
            Payload::Chat(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_crawler(&self) -> Option<&CrawlerRequest> {
        match self.payload() {
            Payload::Crawler(request) => Some(request),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandRequest> {
        match self.payload() {
            Payload::Command(request) => Some(request),
            _ => None,
        }
    }

    /// Crawler payload, or a validation error for a malformed envelope.
    pub fn crawler_request(&self) -> Result<&CrawlerRequest> {
        self.as_crawler()
            .ok_or_else(|| Error::validation(format!("{self:?} does not carry a crawler request")))
    }

    /// Command payload, or a validation error for a malformed envelope.
    pub fn command_request(&self) -> Result<&CommandRequest> {
        self.as_command()
            .ok_or_else(|| Error::validation(format!("{self:?} does not carry a command")))
    }

    /// The crawler job kind this envelope asks for, if any.
    pub fn job_action(&self) -> Option<JobAction> {
        if self.destination != Component::Crawler {
            return None;
        }
        JobAction::from_action(self.action)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope<{} -> {}:{}>",
            self.source, self.destination, self.action
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_fix_address_and_payload() {
        let chat = Envelope::chat(Component::Crawler, ChatMessage::text(1, "hi"));
        assert_eq!(chat.destination(), Component::ChatClient);
        assert_eq!(chat.action(), Action::SendMessage);
        assert!(chat.as_chat().is_some());

        let job = Envelope::crawler(
            Component::Main,
            JobAction::Check,
            CrawlerRequest::broad(1, MediaKind::Any),
        );
        assert_eq!(job.destination(), Component::Crawler);
        assert_eq!(job.action(), Action::Check);
        assert_eq!(job.job_action(), Some(JobAction::Check));

        let cmd = Envelope::command(Component::Crawler, 1, Command::RescanLibrary);
        assert_eq!(cmd.destination(), Component::CommandDispatcher);
        assert_eq!(cmd.action(), Action::HandleCommand);
        assert_eq!(cmd.source(), Component::Crawler);

        let parse = Envelope::resolve(
            Component::ChatClient,
            ResolveRequest {
                user_id: 1,
                text: "heat 1995".to_string(),
            },
        );
        assert_eq!(parse.destination(), Component::SearchResolver);
        assert_eq!(parse.action(), Action::Parse);
        assert_eq!(parse.job_action(), None);
    }

    #[test]
    fn test_malformed_payload_access_is_an_error() {
        let chat = Envelope::chat(Component::Crawler, ChatMessage::text(1, "hi"));
        assert!(matches!(
            chat.crawler_request(),
            Err(Error::Validation(_))
        ));
        assert!(chat.command_request().is_err());
    }

    #[test]
    fn test_job_action_mapping() {
        for action in JobAction::ALL {
            assert_eq!(JobAction::from_action(action.as_action()), Some(action));
        }
        assert_eq!(JobAction::from_action(Action::SendMessage), None);
        assert!(JobAction::ForceCheck.is_search());
        assert!(JobAction::WatchProgress.is_client_management());
        assert!(!JobAction::DownloadFile.is_search());
    }

    #[test]
    fn test_torrent_payload_debug_hides_bytes() {
        let payload = TorrentPayload {
            id: "42".to_string(),
            data: Bytes::from_static(b"d4:infod4:name3:abcee"),
        };
        let debug = format!("{payload:?}");
        assert!(debug.contains("len"));
        assert!(!debug.contains("name"));
    }
}
