//! Steam Web API client: the app catalog, per-app news and global
//! achievement percentages.
//!
//! HTTP failures are classified per the harvest retry policy:
//!
//! - timeouts, connection errors, HTTP 429 and 5xx → [`FetchError::Transient`]
//! - any other 4xx, undecodable bodies → [`FetchError::Fatal`]

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use steam_harvest_core::models::CatalogEntry;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::traits::{FetchError, FetchOutcome, Fetcher};

pub fn build_client(source: &SourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .user_agent(source.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn classify_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Fatal(err.to_string())
    }
}

pub(crate) fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(FetchError::Transient(format!("HTTP {status}")))
    } else {
        Some(FetchError::Fatal(format!("HTTP {status}")))
    }
}

/// Per-app endpoints answer 403 or 404 for appids they hold nothing for;
/// those map to `Absent`. `None` means the body should be read.
pub(crate) fn per_app_status(status: StatusCode) -> Option<Result<FetchOutcome, FetchError>> {
    if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
        return Some(Ok(FetchOutcome::Absent));
    }
    classify_status(status).map(Err)
}

/// Fetch `ISteamApps/GetAppList/v2`.
pub async fn fetch_catalog(client: &reqwest::Client, api_base: &str) -> Result<Vec<CatalogEntry>> {
    let url = format!("{}/ISteamApps/GetAppList/v2/", api_base.trim_end_matches('/'));
    info!(%url, "fetching app catalog");
    let response = client.get(&url).send().await?.error_for_status()?;
    let body: Value = response.json().await.context("App list is not JSON")?;
    parse_catalog(&body)
}

/// Extract `applist.apps`. Entries without a numeric appid are dropped, and
/// a repeated appid keeps its first position.
pub fn parse_catalog(body: &Value) -> Result<Vec<CatalogEntry>> {
    let apps = body
        .pointer("/applist/apps")
        .and_then(Value::as_array)
        .context("App list response has no applist.apps array")?;

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(apps.len());
    for app in apps {
        let Some(appid) = app.get("appid").and_then(Value::as_i64) else {
            debug!(entry = %app, "catalog entry without numeric appid dropped");
            continue;
        };
        if !seen.insert(appid) {
            continue;
        }
        entries.push(CatalogEntry {
            appid,
            name: app
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(entries)
}

/// Reduce a `GetNewsForApp` response to the item list, or `Absent` when the
/// response carries no `appnews` block.
pub fn parse_news_response(body: &Value) -> FetchOutcome {
    match body.get("appnews") {
        Some(appnews) => FetchOutcome::Found(
            appnews
                .get("newsitems")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        ),
        None => FetchOutcome::Absent,
    }
}

/// `ISteamNews/GetNewsForApp/v2`, one request per appid.
pub struct NewsFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl NewsFetcher {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for NewsFetcher {
    fn dataset(&self) -> &str {
        "news"
    }

    async fn fetch(&self, id: i64) -> Result<FetchOutcome, FetchError> {
        let response = self
            .client
            .get(format!("{}/ISteamNews/GetNewsForApp/v2/", self.api_base))
            .query(&[("appid", id)])
            .send()
            .await
            .map_err(classify_error)?;

        if let Some(outcome) = per_app_status(response.status()) {
            return outcome;
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(format!("news response is not JSON: {e}")))?;
        Ok(parse_news_response(&body))
    }
}

/// Reduce a `GetGlobalAchievementPercentagesForApp` response to its
/// achievement list. Apps without achievements come back without an
/// `achievementpercentages` block and are `Absent`.
pub fn parse_achievements_response(body: &Value) -> FetchOutcome {
    match body.get("achievementpercentages") {
        Some(block) => FetchOutcome::Found(
            block
                .get("achievements")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        ),
        None => FetchOutcome::Absent,
    }
}

/// `ISteamUserStats/GetGlobalAchievementPercentagesForApp/v2`, one request
/// per appid.
pub struct AchievementsFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl AchievementsFetcher {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for AchievementsFetcher {
    fn dataset(&self) -> &str {
        "achievements"
    }

    async fn fetch(&self, id: i64) -> Result<FetchOutcome, FetchError> {
        let response = self
            .client
            .get(format!(
                "{}/ISteamUserStats/GetGlobalAchievementPercentagesForApp/v2/",
                self.api_base
            ))
            .query(&[("gameid", id)])
            .send()
            .await
            .map_err(classify_error)?;

        if let Some(outcome) = per_app_status(response.status()) {
            return outcome;
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(format!("achievements response is not JSON: {e}")))?;
        Ok(parse_achievements_response(&body))
    }
}
