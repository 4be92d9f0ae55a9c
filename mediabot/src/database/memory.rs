//! In-memory [`MediaStore`] for tests and dry runs.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::repositories::MediaStore;
use crate::domain::{MediaKey, MediaKind, MediaRecord, MediaUpdate};
use crate::{Error, Result};

#[derive(Default)]
struct State {
    records: Vec<MediaRecord>,
    subscriptions: Vec<(i64, MediaKey)>,
    notify_all: HashSet<i64>,
}

#[derive(Default)]
pub struct InMemoryMediaStore {
    state: RwLock<State>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `records`.
    pub fn with_records(records: impl IntoIterator<Item = MediaRecord>) -> Self {
        let store = Self::new();
        store.state.write().records.extend(records);
        store
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<MediaRecord> {
        self.state.read().records.clone()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn find_media(&self, key: &MediaKey) -> Result<Option<MediaRecord>> {
        let state = self.state.read();
        Ok(state.records.iter().find(|r| key.matches(r)).cloned())
    }

    async fn find_all_pending(&self, kind: MediaKind) -> Result<Vec<MediaRecord>> {
        let state = self.state.read();
        Ok(state
            .records
            .iter()
            .filter(|r| kind.matches(r.kind) && r.status.is_pending())
            .cloned()
            .collect())
    }

    async fn update_fields(&self, key: &MediaKey, update: &MediaUpdate) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .records
            .iter_mut()
            .find(|r| key.matches(r))
            .ok_or_else(|| Error::not_found("media", key.to_string()))?;
        if let Some(target) = update.status {
            record.status.transition_to(target)?;
        }
        update.apply(record);
        Ok(())
    }

    async fn users_subscribed_to(&self, key: &MediaKey) -> Result<Vec<i64>> {
        let state = self.state.read();
        let mut users: BTreeSet<i64> = state.notify_all.iter().copied().collect();
        users.extend(
            state
                .subscriptions
                .iter()
                .filter(|(_, sub)| {
                    sub.media_id == key.media_id
                        && key.kind.matches(sub.kind)
                        && key.season.is_none_or(|s| sub.season == Some(s))
                })
                .map(|(user, _)| *user),
        );
        Ok(users.into_iter().collect())
    }

    async fn upsert_media(&self, record: &MediaRecord) -> Result<()> {
        if record.kind == MediaKind::Any {
            return Err(Error::validation("media records need a concrete kind"));
        }
        let mut state = self.state.write();
        match state.records.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => *existing = record.clone(),
            None => state.records.push(record.clone()),
        }
        Ok(())
    }

    async fn subscribe(&self, user_id: i64, key: &MediaKey) -> Result<()> {
        let mut state = self.state.write();
        let record_key = state
            .records
            .iter()
            .find(|r| key.matches(r))
            .map(MediaRecord::key)
            .ok_or_else(|| Error::not_found("media", key.to_string()))?;
        if !state.subscriptions.contains(&(user_id, record_key)) {
            state.subscriptions.push((user_id, record_key));
        }
        Ok(())
    }

    async fn set_notify_all(&self, user_id: i64, enabled: bool) -> Result<()> {
        let mut state = self.state.write();
        if enabled {
            state.notify_all.insert(user_id);
        } else {
            state.notify_all.remove(&user_id);
        }
        Ok(())
    }
}
