use std::time::Duration;

use async_trait::async_trait;
use idler_core::NotificationIcon;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

/// Player presence and in-game notifications on the primary server.
///
/// Every call fails soft: transport errors and non-success responses are
/// logged and mapped to `false`, `0`, or a dropped notification.
#[async_trait]
pub trait PresenceApi: Send + Sync {
    async fn ping(&self) -> bool;
    async fn fetch_online_players(&self) -> usize;
    async fn notify(&self, message: &str, icon: NotificationIcon);
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PushNotification<'a> {
    notification: &'a str,
    notification_icon: u8,
}

/// HTTPS client for the Fika server API.
///
/// The server is addressed by its container name on the internal network
/// and presents a self-signed certificate. This client trusts it without
/// verification; that choice is limited to this client and is deliberate.
#[derive(Debug, Clone)]
pub struct FikaClient {
    http: reqwest::Client,
    base_url: String,
}

impl FikaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("responsecompressed", HeaderValue::from_static("0"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // No idle keep-alive connections: each request opens and closes its own.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl PresenceApi for FikaClient {
    async fn ping(&self) -> bool {
        match self.http.get(self.url("/launcher/ping")).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "ping returned non-success status");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "server did not answer ping");
                false
            }
        }
    }

    async fn fetch_online_players(&self) -> usize {
        let resp = match self.http.get(self.url("/fika/presence/get")).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "failed to check player presence");
                return 0;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "presence API returned non-success status");
            return 0;
        }

        match resp.json::<Vec<serde_json::Value>>().await {
            Ok(players) => {
                tracing::debug!(?players, "presence API response");
                players.len()
            }
            Err(e) => {
                tracing::warn!(error = %e, "presence API returned an unexpected body");
                0
            }
        }
    }

    async fn notify(&self, message: &str, icon: NotificationIcon) {
        let body = PushNotification {
            notification: message,
            notification_icon: icon.code(),
        };
        let res = self
            .http
            .post(self.url("/fika/notification/push"))
            .json(&body)
            .send()
            .await;
        match res {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(message, "notification sent");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), message, "notification rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, message, "failed to send notification");
            }
        }
    }
}
