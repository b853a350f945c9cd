//! Person display names
//!
//! Messages only carry the author's id. Names are looked up once per
//! author through a [`PersonDirectory`] and kept for the process lifetime.
//! A failed lookup is not fatal: the transcript shows the raw id instead.

use crate::error::{DigestError, SourceError};
use crate::metrics::{Metrics, Service};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Look up a person's display name
#[async_trait]
pub trait PersonDirectory: Send + Sync {
    async fn display_name(&self, person_id: &str) -> std::result::Result<String, SourceError>;
}

/// `GET {base}/people/{id}` returning `{ id, displayName }`
pub struct HttpPersonDirectory {
    client: Client,
    base_url: String,
    token: String,
    metrics: Metrics,
}

impl HttpPersonDirectory {
    pub fn new(base_url: &str, token: String, metrics: Metrics) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(DigestError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            metrics,
        })
    }

    fn url(&self, person_id: &str) -> String {
        format!("{}/people/{}", self.base_url, urlencoding::encode(person_id))
    }

    async fn request(&self, person_id: &str) -> std::result::Result<String, SourceError> {
        let response = self
            .client
            .get(self.url(person_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let person: WirePerson = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        person
            .display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| SourceError::Decode("person has no display name".to_string()))
    }
}

#[async_trait]
impl PersonDirectory for HttpPersonDirectory {
    async fn display_name(&self, person_id: &str) -> std::result::Result<String, SourceError> {
        let timer = self.metrics.start(Service::MessagingApi, "people");
        let result = self.request(person_id).await;
        timer.finish(result.is_ok());
        result
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePerson {
    #[serde(default)]
    display_name: Option<String>,
}

/// Process-wide cache of display names, keyed by person id.
///
/// Only successful lookups are cached, so a directory outage does not pin
/// raw ids into every later report.
#[derive(Clone, Default)]
pub struct NameCache {
    names: Arc<RwLock<HashMap<String, String>>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached(&self, person_id: &str) -> Option<String> {
        let names = self.names.read().await;
        names.get(person_id).cloned()
    }

    /// Display name for `person_id`, falling back to the id itself
    pub async fn resolve(&self, directory: &dyn PersonDirectory, person_id: &str) -> String {
        if let Some(name) = self.cached(person_id).await {
            return name;
        }

        match directory.display_name(person_id).await {
            Ok(name) => {
                debug!(person_id, name = %name, "Display name resolved");
                let mut names = self.names.write().await;
                names.insert(person_id.to_string(), name.clone());
                name
            }
            Err(e) => {
                warn!(person_id, "Display name lookup failed, using id: {}", e);
                person_id.to_string()
            }
        }
    }

    /// Resolve every distinct id, one lookup per id
    pub async fn resolve_all<'a, I>(
        &self,
        directory: &dyn PersonDirectory,
        person_ids: I,
    ) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut resolved = HashMap::new();
        for id in person_ids {
            if !resolved.contains_key(id) {
                let name = self.resolve(directory, id).await;
                resolved.insert(id.to_string(), name);
            }
        }
        resolved
    }
}
