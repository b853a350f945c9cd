//! HTTP client for the upstream messaging API
//!
//! `GET {base}/{route}?recordCount=N&pageToken=T` returning
//! `{ records: [...], navigation: { nextPageToken } }`.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::{DigestError, SourceError};
use crate::messaging::MessageSource;
use crate::metrics::{Metrics, Service};
use crate::models::{Message, Page, Route};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

pub struct HttpMessageSource {
    client: Client,
    base_url: String,
    token: String,
    metrics: Metrics,
}

impl HttpMessageSource {
    pub fn new(base_url: &str, token: String, metrics: Metrics) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DigestError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            metrics,
        })
    }

    fn url(&self, route: &Route) -> String {
        format!("{}/{}", self.base_url, route.path())
    }

    async fn request(
        &self,
        route: &Route,
        page_size: u32,
        cursor: Option<&str>,
    ) -> std::result::Result<Page, SourceError> {
        let mut query: Vec<(&str, String)> = vec![("recordCount", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("pageToken", cursor.to_string()));
        }

        let response = self
            .client
            .get(self.url(route))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                error!(route = %route, "Messaging API request failed: {}", e);
                SourceError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(route = %route, status = status.as_u16(), "Messaging API error response: {}", body);
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let wire: WirePage = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let page = wire.into_page();
        debug!(
            route = %route,
            records = page.records.len(),
            has_next = page.next_cursor.is_some(),
            "Page received"
        );
        Ok(page)
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn fetch_page(
        &self,
        route: &Route,
        page_size: u32,
        cursor: Option<&str>,
    ) -> std::result::Result<Page, SourceError> {
        let timer = self.metrics.start(Service::MessagingApi, route.path());
        let result = self.request(route, page_size, cursor).await;
        timer.finish(result.is_ok());
        result
    }
}

//
// ================= Wire format =================
//

#[derive(Debug, Deserialize)]
struct WirePage {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(default)]
    navigation: Option<WireNavigation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    id: String,
    creator_id: String,
    creation_time: DateTime<Utc>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNavigation {
    #[serde(default)]
    next_page_token: Option<String>,
}

impl WirePage {
    fn into_page(self) -> Page {
        Page {
            records: self
                .records
                .into_iter()
                .map(|r| Message {
                    id: r.id,
                    author_id: r.creator_id,
                    created_at: r.creation_time,
                    text: r.text,
                })
                .collect(),
            next_cursor: self
                .navigation
                .and_then(|n| n.next_page_token)
                .filter(|token| !token.is_empty()),
        }
    }
}
