use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::InboxResult;
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;
use crate::utc_now;

/// Caches an application-permission (client-credentials) access token
/// for the Graph API, refreshing it shortly before expiry. Grounded on
/// `OutlookGraphClient`'s thin reqwest-wrapper shape (C2) — the token
/// endpoint is just another bearer-less `reqwest::Client` call, not a
/// reason to pull in an MSAL-style SDK.
pub struct GraphTokenProvider {
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Refresh this many seconds before the token's reported expiry, to
/// leave headroom for in-flight Graph requests.
const REFRESH_SKEW_SECS: i64 = 120;

impl GraphTokenProvider {
    pub fn new() -> InboxResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(SETTINGS.graph_request_timeout_secs))
            .build()?;
        Ok(Self { http, cached: Mutex::new(None) })
    }

    /// Returns a still-valid cached token, or fetches a fresh one.
    pub async fn access_token(&self) -> InboxResult<String> {
        let now = utc_now!();
        if let Some(cached) = self.cached.lock().expect("token mutex poisoned").as_ref() {
            if cached.expires_at_ms > now {
                return Ok(cached.access_token.clone());
            }
        }
        self.fetch_and_cache(now).await
    }

    async fn fetch_and_cache(&self, now: i64) -> InboxResult<String> {
        let tenant_id = SETTINGS.graph_tenant_id.clone().ok_or_else(|| {
            raise_error!("GRAPH_TENANT_ID is not configured".to_string(), ErrorCode::MissingConfiguration)
        })?;
        let client_id = SETTINGS.graph_client_id.clone().ok_or_else(|| {
            raise_error!("GRAPH_CLIENT_ID is not configured".to_string(), ErrorCode::MissingConfiguration)
        })?;
        let client_secret = SETTINGS.graph_client_secret.clone().ok_or_else(|| {
            raise_error!("GRAPH_CLIENT_SECRET is not configured".to_string(), ErrorCode::MissingConfiguration)
        })?;

        let url = format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", SETTINGS.graph_scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("token request failed: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }

        let parsed: TokenResponse = resp.json().await?;
        let expires_at_ms = now + (parsed.expires_in - REFRESH_SKEW_SECS).max(0) * 1000;
        let token = parsed.access_token.clone();
        *self.cached.lock().expect("token mutex poisoned") =
            Some(CachedToken { access_token: parsed.access_token, expires_at_ms });
        Ok(token)
    }
}
