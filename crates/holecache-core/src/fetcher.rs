use crate::config::RemoteConfig;
use crate::pipeline::{FloorPageRequest, HolePageRequest, RemoteSource};
use crate::types::{Floor, Hole, HoleBundle, Tag};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Longest error body quoted back in [`Error::Remote`].
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for the forum API
pub struct HttpSource {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

/// A hole as listed by the API, with its tags and boundary floors embedded.
#[derive(Deserialize)]
struct WireHole {
    #[serde(flatten)]
    hole: Hole,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    floors: WireFloors,
}

#[derive(Default, Deserialize)]
struct WireFloors {
    first_floor: Option<Floor>,
    last_floor: Option<Floor>,
}

impl From<WireHole> for HoleBundle {
    fn from(wire: WireHole) -> Self {
        let WireHole {
            mut hole,
            tags,
            floors,
        } = wire;
        if hole.tag_ids.is_empty() {
            hole.tag_ids = tags.iter().map(|tag| tag.id).collect();
        }
        hole.first_floor_id = hole
            .first_floor_id
            .or_else(|| floors.first_floor.as_ref().map(|f| f.id));
        hole.last_floor_id = hole
            .last_floor_id
            .or_else(|| floors.last_floor.as_ref().map(|f| f.id));
        Self {
            hole,
            tags,
            first_floor: floors.first_floor,
            last_floor: floors.last_floor,
        }
    }
}

impl HttpSource {
    /// Creates a source for `base_url` with default settings
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(&RemoteConfig {
            base_url: base_url.to_string(),
            ..RemoteConfig::default()
        })
    }

    /// Creates a source from the `[remote]` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("holecache/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self.client.get(url.clone()).query(query);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| timed_out(e, &url))?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                return Err(Error::NotFound(format!("Nothing at '{url}'")));
            }
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.trim().chars().take(MAX_ERROR_BODY).collect()
            };
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| timed_out(e, &url))?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(serde_json::from_str(&body)?)
    }
}

/// Client timeouts surface as [`Error::Timeout`], everything else as a network error.
fn timed_out(e: reqwest::Error, url: &Url) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("Request to '{url}' timed out"))
    } else {
        Error::Network(e)
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn load_holes(&self, request: HolePageRequest) -> Result<Vec<HoleBundle>> {
        let mut query = vec![
            ("offset", request.before.to_rfc3339()),
            ("size", request.size.to_string()),
            ("order", request.order.as_query().to_string()),
        ];
        if let Some(division) = request.division {
            query.push(("division_id", division.to_string()));
        }

        let holes: Vec<WireHole> = self.get_json(self.endpoint("holes")?, &query).await?;
        info!("Loaded {} holes before {}", holes.len(), request.before);
        Ok(holes.into_iter().map(HoleBundle::from).collect())
    }

    async fn load_floors(&self, request: FloorPageRequest) -> Result<Vec<Floor>> {
        let query = [
            ("offset", request.offset.to_string()),
            ("size", request.size.to_string()),
            ("sort", if request.reversed { "desc" } else { "asc" }.to_string()),
        ];
        let url = self.endpoint(&format!("holes/{}/floors", request.hole_id))?;

        let floors: Vec<Floor> = self.get_json(url, &query).await?;
        info!(
            "Loaded {} floors of hole {} from offset {}",
            floors.len(),
            request.hole_id,
            request.offset
        );
        Ok(floors)
    }
}
