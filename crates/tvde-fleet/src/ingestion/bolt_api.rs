use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::records::EarningRecord;
use crate::fleet::{Period, Platform};

pub const BOLT_AUTH_URL: &str = "https://oidc.bolt.eu/token";
pub const BOLT_API_URL: &str = "https://node.bolt.eu/fleet-integration-gateway";
const PAGE_SIZE: usize = 100;

/// Where the Bolt fleet integration lives; overridable for tests.
#[derive(Debug, Clone)]
pub struct BoltEndpoints {
    pub auth_url: String,
    pub api_url: String,
}

impl Default for BoltEndpoints {
    fn default() -> Self {
        Self {
            auth_url: BOLT_AUTH_URL.to_string(),
            api_url: BOLT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoltApiError {
    #[error("bolt request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bolt rejected the client credentials ({status}): {body}")]
    Auth { status: u16, body: String },
    #[error("bolt api answered {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EarningsPage {
    data: EarningsData,
}

#[derive(Debug, Deserialize)]
struct EarningsData {
    #[serde(default)]
    drivers: Vec<DriverEarnings>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct DriverEarnings {
    driver_uuid: String,
    #[serde(default)]
    driver_name: Option<String>,
    #[serde(default)]
    gross_earnings: f64,
    #[serde(default)]
    commission: f64,
    #[serde(default)]
    tips: f64,
    #[serde(default)]
    net_earnings: Option<f64>,
    #[serde(default)]
    rides: u32,
}

/// Client-credentials client for the Bolt fleet integration API.
#[derive(Debug, Clone)]
pub struct BoltFleetClient {
    http: reqwest::Client,
    endpoints: BoltEndpoints,
    client_id: String,
    client_secret: String,
}

impl BoltFleetClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: BoltEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoints,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    async fn token(&self) -> Result<String, BoltApiError> {
        let response = self
            .http
            .post(&self.endpoints.auth_url)
            .timeout(Duration::from_secs(30))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "fleet-integration:api"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BoltApiError::Auth {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Fetches every page of per-driver earnings for `period`.
    pub async fn earnings(&self, period: Period) -> Result<Vec<EarningRecord>, BoltApiError> {
        let token = self.token().await?;
        let url = format!(
            "{}/fleetIntegration/v1/getDriverEarnings",
            self.endpoints.api_url.trim_end_matches('/')
        );

        let mut records = Vec::new();
        let mut offset = 0usize;
        loop {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .timeout(Duration::from_secs(60))
                .json(&json!({
                    "start_date": period.start.format("%Y-%m-%d").to_string(),
                    "end_date": period.end.format("%Y-%m-%d").to_string(),
                    "offset": offset,
                    "limit": PAGE_SIZE,
                }))
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BoltApiError::Api {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            let page: EarningsPage = response.json().await?;
            let fetched = page.data.drivers.len();
            records.extend(page.data.drivers.into_iter().map(|driver| {
                let platform_fee = driver.commission.abs();
                EarningRecord {
                    platform: Platform::Bolt,
                    driver_ref: Some(driver.driver_uuid),
                    driver_name: driver.driver_name,
                    period,
                    gross: driver.gross_earnings,
                    tips: driver.tips,
                    platform_fee,
                    net: driver
                        .net_earnings
                        .unwrap_or(driver.gross_earnings - platform_fee),
                    trips: driver.rides,
                }
            }));

            offset += fetched;
            if fetched == 0 || offset >= page.data.total {
                break;
            }
        }

        tracing::debug!(count = records.len(), "fetched bolt earnings");
        Ok(records)
    }
}
