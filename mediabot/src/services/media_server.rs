//! Media server client used to refresh the library after a download.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use url::Url;

use crate::config::MediaServerConfig;
use crate::{Error, Result};

const TOKEN_HEADER: &str = "X-Plex-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can refresh the media library.
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    async fn rescan(&self) -> Result<()>;
}

pub struct MediaServerClient {
    refresh_url: Url,
    token: String,
    client: Client,
}

impl MediaServerClient {
    pub fn new(config: &MediaServerConfig) -> Result<Self> {
        let client = crate::utils::http_client::build_client(None, REQUEST_TIMEOUT)?;
        Ok(Self {
            refresh_url: refresh_url(config)?,
            token: config.token.clone(),
            client,
        })
    }
}

#[async_trait]
impl LibraryScanner for MediaServerClient {
    /// Ask the server to rescan the configured library section.
    async fn rescan(&self) -> Result<()> {
        self.client
            .get(self.refresh_url.clone())
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?
            .error_for_status()?;
        info!(url = %self.refresh_url, "Library rescan requested");
        Ok(())
    }
}

/// Refresh endpoint for the configured section, or for every section.
fn refresh_url(config: &MediaServerConfig) -> Result<Url> {
    let base = crate::utils::url::with_scheme(&config.url);
    let mut url = Url::parse(&base)
        .map_err(|e| Error::config(format!("invalid media server url '{}': {e}", config.url)))?;
    let section = config.section.as_deref().unwrap_or("all");

    url.path_segments_mut()
        .map_err(|_| Error::config(format!("media server url '{}' cannot be a base", config.url)))?
        .pop_if_empty()
        .extend(["library", "sections", section, "refresh"]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, section: Option<&str>) -> MediaServerConfig {
        MediaServerConfig {
            url: url.to_string(),
            token: "secret".to_string(),
            section: section.map(str::to_string),
        }
    }

    #[test]
    fn test_refresh_url_for_section() {
        let url = refresh_url(&config("http://plex:32400/", Some("2"))).unwrap();
        assert_eq!(url.as_str(), "http://plex:32400/library/sections/2/refresh");
    }

    #[test]
    fn test_refresh_url_defaults_to_all_sections() {
        let url = refresh_url(&config("plex:32400", None)).unwrap();
        assert_eq!(url.as_str(), "https://plex:32400/library/sections/all/refresh");
    }
}
