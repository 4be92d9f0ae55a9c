//! Crawler pipeline end to end: search, download, client hand-off and
//! progress watch, wired through the service container with fake
//! trackers and a fake torrent client.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mediabot::bus::{Component, CrawlerRequest, Envelope, JobAction, TorrentPayload};
use mediabot::config::AppConfig;
use mediabot::database::{InMemoryMediaStore, MediaStore};
use mediabot::domain::{AcquisitionStatus, MediaKey, MediaKind, MediaRecord};
use mediabot::services::{LibraryScanner, ServiceContainer, ServiceParts};
use mediabot::torrent_client::{ClientKind, TorrentClientBackend, TorrentStatus};
use mediabot::trackers::{Candidate, TorrentFile, TrackerBackend, Trackers};
use mediabot::{Error, Result};
use parking_lot::Mutex;

const SINGLE_FILE_TORRENT: &[u8] =
    b"d8:announce9:http://x/4:infod6:lengthi10e4:name5:a.mkv12:piece lengthi16384e6:pieces0:ee";

struct FakeTracker;

#[async_trait]
impl TrackerBackend for FakeTracker {
    fn name(&self) -> &str {
        "fake"
    }

    fn accepts(&self, url: &str) -> bool {
        url.contains("fake.tracker")
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        if !query.starts_with("Heat") {
            return Ok(Vec::new());
        }
        Ok(vec![Candidate {
            label: "Heat 1995 1080p".to_string(),
            source_url: "https://fake.tracker/dl/42".to_string(),
            detail_url: "https://fake.tracker/topic/42".to_string(),
            size_gb: 8.0,
            seeders: 25,
            resolution: Some(1080),
            audio: vec!["RUSSIAN".to_string()],
            file_count: 1,
            tracker: "fake".to_string(),
            ..Default::default()
        }])
    }

    async fn fetch(&self, url: &str) -> Result<TorrentFile> {
        if !url.ends_with("/dl/42") {
            return Err(Error::tracker("fake", format!("unknown torrent {url}")));
        }
        Ok(TorrentFile {
            id: "42".to_string(),
            data: Bytes::from_static(SINGLE_FILE_TORRENT),
        })
    }
}

/// Accepts every torrent and reports it half done, then complete.
#[derive(Default)]
struct FakeClient {
    added: Mutex<Vec<(String, String)>>,
    polls: AtomicUsize,
}

#[async_trait]
impl TorrentClientBackend for FakeClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Transmission
    }

    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String> {
        self.added
            .lock()
            .push((torrent.id.clone(), destination.to_string()));
        Ok(format!("handle-{}", torrent.id))
    }

    async fn status(&self, _handle: &str) -> Result<TorrentStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let percent = if poll == 0 { 50.0 } else { 100.0 };
        Ok(TorrentStatus::from_percent(percent, 5, 10))
    }
}

#[derive(Default)]
struct FakeScanner {
    calls: AtomicUsize,
}

#[async_trait]
impl LibraryScanner for FakeScanner {
    async fn rescan(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    container: Arc<ServiceContainer>,
    store: Arc<InMemoryMediaStore>,
    client: Arc<FakeClient>,
    scanner: Arc<FakeScanner>,
}

fn harness(records: Vec<MediaRecord>) -> Harness {
    let mut config = AppConfig::default();
    config.crawler.periodic_check_secs = 0;
    config.torrent_client.kind = ClientKind::Transmission;
    config.torrent_client.film_dir = "/media/films".to_string();
    config.torrent_client.watch_interval_secs = 5;

    let store = Arc::new(InMemoryMediaStore::with_records(records));
    let client = Arc::new(FakeClient::default());
    let scanner = Arc::new(FakeScanner::default());

    let container = ServiceContainer::from_parts(
        config,
        ServiceParts {
            store: store.clone(),
            trackers: Trackers::new(vec![Arc::new(FakeTracker)]),
            backend: client.clone(),
            scanner: Some(scanner.clone()),
            pool: None,
        },
    )
    .unwrap();

    Harness {
        container: Arc::new(container),
        store,
        client,
        scanner,
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..600 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_film_flows_from_search_to_library() {
    let h = harness(vec![MediaRecord::film(7, "Heat", 1995)]);
    h.store.subscribe(100, &MediaKey::film(7)).await.unwrap();
    let host = {
        let container = h.container.clone();
        tokio::spawn(async move { container.run().await })
    };

    h.container
        .submit(Envelope::crawler(
            Component::Main,
            JobAction::Check,
            CrawlerRequest::for_media(100, MediaKey::film(7)),
        ))
        .unwrap();

    let scanner = h.scanner.clone();
    wait_until(move || scanner.calls.load(Ordering::SeqCst) == 1).await;

    let record = h.store.find_media(&MediaKey::film(7)).await.unwrap().unwrap();
    assert_eq!(record.status, AcquisitionStatus::Ended);
    assert!(record.in_library);
    assert_eq!(record.download_url.as_deref(), Some("https://fake.tracker/dl/42"));
    assert_eq!(record.tracker.as_deref(), Some("fake"));
    assert_eq!(record.torrent_handle.as_deref(), Some("handle-42"));

    assert_eq!(
        *h.client.added.lock(),
        vec![("42".to_string(), "/media/films".to_string())]
    );
    assert_eq!(h.client.polls.load(Ordering::SeqCst), 2);

    h.container.shutdown().await;
    host.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_scope_skips_ended_records() {
    let mut ended = MediaRecord::film(1, "Heat", 1995);
    ended.status = AcquisitionStatus::Ended;
    let h = harness(vec![ended, MediaRecord::film(2, "Ronin", 1998)]);
    let host = {
        let container = h.container.clone();
        tokio::spawn(async move { container.run().await })
    };

    h.container.schedule_broad_check().unwrap();

    // Ronin finds nothing and Heat is never searched, so nothing reaches
    // the torrent client.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.client.added.lock().is_empty());
    let pending = h.store.find_all_pending(MediaKind::Any).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].media_id, 2);

    h.container.shutdown().await;
    host.await.unwrap().unwrap();
}
