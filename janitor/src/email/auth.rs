use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    app_config::GmailConfig,
    error::{AppError, AppResult},
    util::check_expired,
    HttpClient,
};

#[derive(Debug, Clone, Deserialize)]
pub struct GmailApiRefreshTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges the configured refresh token for access tokens, reusing one until it is
/// about to expire.
pub struct GmailTokenProvider {
    http_client: HttpClient,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GmailTokenProvider {
    pub fn new(http_client: HttpClient, config: &GmailConfig) -> AppResult<Self> {
        if config.client_id.is_empty()
            || config.client_secret.is_empty()
            || config.refresh_token.is_empty()
        {
            return Err(AppError::Configuration(
                "GMAIL_CLIENT_ID, GMAIL_CLIENT_SECRET and GMAIL_REFRESH_TOKEN must be set"
                    .to_string(),
            ));
        }

        Ok(Self {
            http_client,
            token_uri: config.token_uri.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !check_expired(token.expires_at) {
                return Ok(token.access_token.clone());
            }
        }

        let resp = self.exchange_refresh_token().await?;
        let token = CachedToken {
            access_token: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in),
        };
        tracing::debug!("Refreshed Gmail access token, expires at {}", token.expires_at);
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    /// Drop the cached token so the next call refreshes
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn exchange_refresh_token(&self) -> AppResult<GmailApiRefreshTokenResponse> {
        let resp = self
            .http_client
            .post(&self.token_uri)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Error refreshing token: {:?}", e);
                AppError::from(e)
            })?;

        let resp = resp.json::<serde_json::Value>().await?;
        parse_token_response(resp)
    }
}

fn parse_token_response(resp: serde_json::Value) -> AppResult<GmailApiRefreshTokenResponse> {
    if resp.get("error").is_some() {
        return match resp.get("error_description").and_then(|d| d.as_str()) {
            Some("Token has been expired or revoked.") => Err(AppError::Transport(
                "Gmail refresh token has been expired or revoked".to_string(),
            )),
            Some(desc) => {
                tracing::error!("Unexpected error refreshing token: {:?}", desc);
                Err(AppError::Transport(desc.to_string()))
            }
            None => {
                tracing::error!("Unknown error refreshing token: {:?}", resp);
                Err(AppError::Transport(resp.to_string()))
            }
        };
    }

    serde_json::from_value::<GmailApiRefreshTokenResponse>(resp.clone()).map_err(|_| {
        tracing::error!("Unexpected gmail oauth2 response: {:?}", resp);
        AppError::Transport(format!("Unexpected gmail oauth2 response: {}", resp))
    })
}
