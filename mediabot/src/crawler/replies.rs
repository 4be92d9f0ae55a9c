//! Outbound envelopes produced by crawler workers.

use serde_json::json;

use super::job::MediaTask;
use crate::bus::{
    ChatMessage, Choice, Choices, Command, Component, CrawlerRequest, Envelope, JobAction,
    TorrentPayload,
};
use crate::domain::{AcquisitionStatus, MediaRecord, MediaUpdate};
use crate::torrent_client::TorrentStatus;
use crate::trackers::Candidate;
use crate::utils::format::format_bytes;

const SELECT_TORRENT: &str = "select_torrent";
const REFRESH_PROGRESS: &str = "download_callback";

fn kind_label(media: &MediaRecord) -> &'static str {
    if media.is_serial() { "Serial" } else { "Film" }
}

/// Callback data identifying the task's record.
fn media_callback(task: &MediaTask) -> serde_json::Value {
    let key = task.key();
    json!({
        "media_id": key.media_id,
        "kind": key.kind,
        "season": key.season,
    })
}

/// Soft "not found" notice for standing watches.
pub fn not_found(task: &MediaTask) -> Envelope {
    let text = format!(
        "{} {} not found yet, I will keep looking.",
        kind_label(&task.media),
        task.text_query()
    );
    Envelope::chat(Component::Crawler, ChatMessage::text(task.user_id, text))
}

/// Store the picked candidate, then fetch its torrent file.
pub fn torrent_found(task: &MediaTask, candidate: &Candidate) -> Envelope {
    let update = MediaUpdate {
        download_url: Some(candidate.source_url.clone()),
        detail_url: Some(candidate.detail_url.clone()),
        tracker: Some(candidate.tracker.clone()),
        ..Default::default()
    };
    let download = Envelope::crawler(
        Component::Crawler,
        JobAction::DownloadFile,
        CrawlerRequest::for_media(task.user_id, task.key()),
    );

    Envelope::command(
        Component::Crawler,
        task.user_id,
        Command::UpdateMedia {
            key: task.key(),
            update,
            follow_up: vec![download],
        },
    )
}

/// Ask the user which of several candidates to download.
pub fn choose_torrent(task: &MediaTask, candidates: &[Candidate]) -> Envelope {
    let options = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut callback = media_callback(task);
            callback["action"] = json!(SELECT_TORRENT);
            callback["download_url"] = json!(c.source_url);
            callback["detail_url"] = json!(c.detail_url);
            callback["tracker"] = json!(c.tracker);
            Choice {
                text: c.detail_url.clone(),
                button: i.to_string(),
                callback,
            }
        })
        .collect();

    let text = format!(
        "Pick the torrent to download for {} (audio, quality and so on).",
        task.text_query()
    );
    Envelope::chat(
        Component::Crawler,
        ChatMessage::text(task.user_id, text).with_choices(Choices {
            action: SELECT_TORRENT.to_string(),
            options,
        }),
    )
}

/// Record update after a torrent file with `files` media files was fetched.
///
/// `None` when a serial torrent brings no new episodes.
pub fn download_update(media: &MediaRecord, files: u32) -> Option<MediaUpdate> {
    let (status, current_episodes) = if media.is_serial() {
        if files != 0 && files == media.current_episodes {
            return None;
        }
        let status = if media.episodes_total != 0 && files >= media.episodes_total {
            AcquisitionStatus::Ended
        } else {
            AcquisitionStatus::FindTorrent
        };
        (status, files)
    } else {
        (AcquisitionStatus::Ended, 0)
    };

    Some(MediaUpdate {
        status: Some(status),
        current_episodes: Some(current_episodes),
        in_library: Some(true),
        ..Default::default()
    })
}

/// Persist the update, hand the file to the torrent client and tell the
/// subscribers.
pub fn download_started(
    task: &MediaTask,
    update: MediaUpdate,
    torrent: TorrentPayload,
) -> Vec<Envelope> {
    let mut text = if task.media.is_serial() {
        format!(
            "New episode of \"{}\" will be downloaded in a few minutes.",
            task.text_query()
        )
    } else {
        format!(
            "Film \"{}\" will be downloaded in a few minutes.",
            task.text_query()
        )
    };
    if let Some(url) = task.media.catalog_url.as_deref() {
        text.push('\n');
        text.push_str(url);
    }

    vec![
        Envelope::command(
            Component::Crawler,
            task.user_id,
            Command::UpdateMedia {
                key: task.key(),
                update,
                follow_up: Vec::new(),
            },
        ),
        Envelope::crawler(
            Component::Crawler,
            JobAction::AddToClient,
            CrawlerRequest::for_media(task.user_id, task.key()).with_torrent(torrent),
        ),
        Envelope::command(
            Component::Crawler,
            task.user_id,
            Command::NotifyByMedia {
                key: task.key(),
                text,
            },
        ),
    ]
}

/// Store the client handle, then start watching it.
pub fn client_added(task: &MediaTask, handle: &str) -> Envelope {
    let mut watch = CrawlerRequest::for_media(task.user_id, task.key()).with_torrent_handle(handle);
    watch.keyboard = task.request.keyboard;

    Envelope::command(
        Component::Crawler,
        task.user_id,
        Command::UpdateMedia {
            key: task.key(),
            update: MediaUpdate::default().with_torrent_handle(handle),
            follow_up: vec![Envelope::crawler(
                Component::Crawler,
                JobAction::WatchProgress,
                watch,
            )],
        },
    )
}

/// Progress report, with a refresh option unless the request disabled it.
pub fn progress(task: &MediaTask, status: &TorrentStatus) -> Envelope {
    let text = format!(
        "Download progress {}: {}% {}/{}",
        task.text_query(),
        status.percent,
        format_bytes(status.bytes_done),
        format_bytes(status.bytes_total),
    );
    let mut message = ChatMessage::text(task.user_id, text);

    if task.request.keyboard {
        let mut callback = media_callback(task);
        callback["force"] = json!(true);
        message = message.with_choices(Choices {
            action: REFRESH_PROGRESS.to_string(),
            options: vec![Choice {
                text: "Refresh".to_string(),
                button: "refresh".to_string(),
                callback,
            }],
        });
    }
    Envelope::chat(Component::Crawler, message)
}

/// Completion notice plus a library rescan.
pub fn finished(task: &MediaTask) -> Vec<Envelope> {
    let text = format!("Download of {} finished", task.text_query());
    vec![
        Envelope::chat(Component::Crawler, ChatMessage::text(task.user_id, text)),
        Envelope::command(Component::Crawler, task.user_id, Command::RescanLibrary),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Payload;

    fn task(media: MediaRecord, action: JobAction) -> MediaTask {
        let request = CrawlerRequest::for_media(42, media.key());
        MediaTask::new(action, &request, media)
    }

    #[test]
    fn test_film_download_update() {
        let film = MediaRecord::film(1, "Heat", 1995);
        let update = download_update(&film, 1).unwrap();
        assert_eq!(update.status, Some(AcquisitionStatus::Ended));
        assert_eq!(update.current_episodes, Some(0));
        assert_eq!(update.in_library, Some(true));
    }

    #[test]
    fn test_serial_download_update() {
        let mut serial = MediaRecord::serial(2, "Dark", 2017, 1);
        serial.episodes_total = 10;
        serial.current_episodes = 4;

        assert!(download_update(&serial, 4).is_none());

        let update = download_update(&serial, 6).unwrap();
        assert_eq!(update.status, Some(AcquisitionStatus::FindTorrent));
        assert_eq!(update.current_episodes, Some(6));

        let update = download_update(&serial, 10).unwrap();
        assert_eq!(update.status, Some(AcquisitionStatus::Ended));

        serial.episodes_total = 0;
        let update = download_update(&serial, 12).unwrap();
        assert_eq!(update.status, Some(AcquisitionStatus::FindTorrent));
    }

    #[test]
    fn test_torrent_found_chains_download() {
        let task = task(MediaRecord::film(1, "Heat", 1995), JobAction::Check);
        let candidate = Candidate {
            source_url: "http://t/dl/1".to_string(),
            detail_url: "http://t/topic/1".to_string(),
            tracker: "jackett".to_string(),
            ..Default::default()
        };
        let envelope = torrent_found(&task, &candidate);

        let Payload::Command(request) = envelope.payload() else {
            panic!("expected a command");
        };
        let Command::UpdateMedia {
            update, follow_up, ..
        } = &request.command
        else {
            panic!("expected update-media");
        };
        assert_eq!(update.download_url.as_deref(), Some("http://t/dl/1"));
        assert_eq!(follow_up.len(), 1);
        assert_eq!(follow_up[0].job_action(), Some(JobAction::DownloadFile));
    }

    #[test]
    fn test_progress_text_and_refresh_choice() {
        let task = task(MediaRecord::film(1, "Heat", 1995), JobAction::WatchProgress);
        let status = TorrentStatus::from_percent(50.0, 512, 1024);
        let envelope = progress(&task, &status);

        let chat = envelope.as_chat().unwrap();
        assert_eq!(chat.text, "Download progress Heat 1995: 50% 512 B/1.00 KB");
        let choices = chat.choices.as_ref().unwrap();
        assert_eq!(choices.options[0].callback["force"], json!(true));
        assert_eq!(choices.options[0].callback["media_id"], json!(1));
    }

    #[test]
    fn test_progress_without_keyboard() {
        let film = MediaRecord::film(1, "Heat", 1995);
        let request = CrawlerRequest::for_media(42, film.key()).without_keyboard();
        let task = MediaTask::new(JobAction::WatchProgress, &request, film);

        let envelope = progress(&task, &TorrentStatus::default());
        assert!(envelope.as_chat().unwrap().choices.is_none());
    }

    #[test]
    fn test_choose_torrent_lists_detail_pages() {
        let task = task(MediaRecord::serial(2, "Dark", 2017, 1), JobAction::Check);
        let candidates: Vec<Candidate> = (0..3)
            .map(|i| Candidate {
                detail_url: format!("http://t/topic/{i}"),
                ..Default::default()
            })
            .collect();

        let envelope = choose_torrent(&task, &candidates);
        let choices = envelope.as_chat().unwrap().choices.clone().unwrap();
        assert_eq!(choices.options.len(), 3);
        assert_eq!(choices.options[2].text, "http://t/topic/2");
        assert_eq!(choices.options[2].button, "2");
        assert_eq!(choices.options[0].callback["season"], json!(1));
    }
}
