//! Clients for the two third-party advertising APIs.
//!
//! Campaign listings come from the ad-campaign platform (bearer token plus a
//! CSRF cookie harvested out of band); goal listings come from the
//! search-engine analytics counters (bearer token only). Upstream failures
//! never reach callers raw: 401/403/404 translate to stable domain messages
//! and 5xx responses are retried with exponential backoff first.

use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::stats::error::{Result, StatsError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CampaignListResponse {
    campaigns: Vec<Campaign>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GoalListResponse {
    goals: Vec<Goal>,
}

#[derive(Debug, Serialize)]
struct CampaignListRequest<'a> {
    login: &'a str,
}

#[derive(Debug, Clone)]
pub struct AdPlatformClient {
    client: Client,
    base_url: String,
    auth_token: String,
    csrf_cookie: String,
}

impl AdPlatformClient {
    pub fn new(base_url: String, auth_token: String, csrf_cookie: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            csrf_cookie,
        }
    }

    /// Campaigns registered under an agency account login.
    pub async fn list_campaigns(&self, account_login: &str) -> Result<Vec<Campaign>> {
        info!(account_login, "Fetching upstream campaign list");

        let operation = || async {
            match self.list_campaigns_internal(account_login).await {
                Ok(campaigns) => Ok(campaigns),
                Err(e) if is_transient(&e) => Err(backoff::Error::transient(e)),
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        };

        retry(default_backoff(), operation).await
    }

    async fn list_campaigns_internal(&self, account_login: &str) -> Result<Vec<Campaign>> {
        let response = self
            .client
            .post(format!("{}/campaigns/list", self.base_url))
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Cookie", &self.csrf_cookie)
            .json(&CampaignListRequest { login: account_login })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(campaign_error(status, account_login));
        }

        let body: CampaignListResponse = response.json().await.map_err(request_error)?;
        Ok(body.campaigns)
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl AnalyticsClient {
    pub fn new(base_url: String, auth_token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    /// Conversion goals configured on an analytics counter.
    pub async fn list_goals(&self, counter_id: &str) -> Result<Vec<Goal>> {
        info!(counter_id, "Fetching upstream goal list");

        let operation = || async {
            match self.list_goals_internal(counter_id).await {
                Ok(goals) => Ok(goals),
                Err(e) if is_transient(&e) => Err(backoff::Error::transient(e)),
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        };

        retry(default_backoff(), operation).await
    }

    async fn list_goals_internal(&self, counter_id: &str) -> Result<Vec<Goal>> {
        let response = self
            .client
            .get(format!(
                "{}/counters/{counter_id}/goals",
                self.base_url
            ))
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(goal_error(status, counter_id));
        }

        let body: GoalListResponse = response.json().await.map_err(request_error)?;
        Ok(body.goals)
    }
}

fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..Default::default()
    }
}

fn request_error(e: reqwest::Error) -> StatsError {
    warn!("Upstream request failed: {}", e);
    StatsError::Upstream {
        message: "upstream service is unavailable, try again later".to_string(),
    }
}

/// Only service-side failures are worth retrying; auth and lookup failures
/// will not heal on their own.
fn is_transient(e: &StatsError) -> bool {
    matches!(
        e,
        StatsError::Upstream { message } if message.contains("unavailable")
    )
}

fn campaign_error(status: StatusCode, account_login: &str) -> StatsError {
    let message = match status {
        StatusCode::UNAUTHORIZED => {
            "ad platform authorization token expired, contact the administrator".to_string()
        }
        StatusCode::FORBIDDEN => {
            "ad platform rejected the request, the CSRF cookie needs refreshing".to_string()
        }
        StatusCode::NOT_FOUND => {
            format!("no ad platform account found for login \"{account_login}\"")
        }
        s if s.is_server_error() => {
            "upstream service is unavailable, try again later".to_string()
        }
        s => format!("unexpected ad platform response: {s}"),
    };
    StatsError::Upstream { message }
}

fn goal_error(status: StatusCode, counter_id: &str) -> StatsError {
    let message = match status {
        StatusCode::UNAUTHORIZED => {
            "analytics authorization token expired, contact the administrator".to_string()
        }
        StatusCode::FORBIDDEN => "analytics counter access denied".to_string(),
        StatusCode::NOT_FOUND => {
            format!("no analytics counter found for id \"{counter_id}\"")
        }
        s if s.is_server_error() => {
            "upstream service is unavailable, try again later".to_string()
        }
        s => format!("unexpected analytics response: {s}"),
    };
    StatsError::Upstream { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(e: StatsError) -> String {
        match e {
            StatsError::Upstream { message } => message,
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn campaign_statuses_map_to_domain_messages() {
        assert!(message(campaign_error(StatusCode::UNAUTHORIZED, "agency")).contains("token expired"));
        assert!(message(campaign_error(StatusCode::FORBIDDEN, "agency")).contains("CSRF"));
        assert!(message(campaign_error(StatusCode::NOT_FOUND, "agency")).contains("agency"));
    }

    #[test]
    fn goal_statuses_map_to_domain_messages() {
        assert!(message(goal_error(StatusCode::UNAUTHORIZED, "123")).contains("token expired"));
        assert!(message(goal_error(StatusCode::FORBIDDEN, "123")).contains("access denied"));
        assert!(message(goal_error(StatusCode::NOT_FOUND, "123")).contains("123"));
    }

    #[test]
    fn server_errors_are_transient() {
        let e = campaign_error(StatusCode::BAD_GATEWAY, "agency");
        assert!(is_transient(&e));

        let e = campaign_error(StatusCode::UNAUTHORIZED, "agency");
        assert!(!is_transient(&e));
    }
}
