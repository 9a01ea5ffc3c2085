//! OAuth2 token management for provider connections.
//!
//! The authorization-code dance happens elsewhere (a web or CLI
//! collaborator); this module only keeps an already-established connection's
//! access token valid, refreshing it through the provider's token endpoint
//! shortly before expiry. Refresh failures are never raised to the sync
//! pass: callers get `None` and treat it as "reconnect required".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::storage::PlannerDb;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// A persisted OAuth2 connection to a calendar provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub account_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConnection {
    pub fn new(
        user_id: impl Into<String>,
        provider: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            provider: provider.into(),
            access_token: Some(access_token.into()),
            refresh_token,
            token_expires_at: expires_in_secs.map(|s| now + Duration::seconds(s)),
            account_email: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// OAuth client configuration for the refresh grant.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Whether the connection's token is within the refresh margin of expiry.
///
/// A connection without a recorded expiry is assumed still valid, matching
/// providers that hand out non-expiring tokens.
pub fn token_needs_refresh(connection: &ProviderConnection, now: DateTime<Utc>) -> bool {
    match connection.token_expires_at {
        Some(expires_at) => now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= expires_at,
        None => false,
    }
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse, OAuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let resp = client
        .post(&config.token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| OAuthError::TokenRefreshFailed(e.to_string()))?;

    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| OAuthError::TokenRefreshFailed(e.to_string()))?;

    if let Some(error) = body.get("error") {
        return Err(OAuthError::TokenRefreshFailed(error.to_string()));
    }

    let access_token = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::TokenRefreshFailed("missing access_token".to_string()))?
        .to_string();

    Ok(TokenResponse {
        access_token,
        refresh_token: body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from),
        expires_in: body.get("expires_in").and_then(|v| v.as_i64()),
    })
}

/// Return a valid access token for the connection, refreshing if needed.
///
/// Returns `None` on missing credentials, a missing refresh token, or any
/// refresh failure; callers surface that as "reconnect required".
pub async fn valid_access_token(
    db: &PlannerDb,
    client: &reqwest::Client,
    config: &OAuthConfig,
    connection: &ProviderConnection,
) -> Option<String> {
    if let Some(token) = &connection.access_token {
        if !token_needs_refresh(connection, Utc::now()) {
            return Some(token.clone());
        }
    }

    let refresh_token = connection.refresh_token.as_deref()?;
    if !config.has_credentials() {
        warn!(provider = %connection.provider, "OAuth client credentials not configured");
        return None;
    }

    match refresh_access_token(client, config, refresh_token).await {
        Ok(tokens) => {
            debug!(provider = %connection.provider, "refreshed access token");
            let expires_at = tokens
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs));
            // Providers may omit the refresh token on refresh; keep the old one.
            let kept_refresh = tokens.refresh_token.as_deref().or(Some(refresh_token));
            if let Err(e) = db.update_connection_tokens(
                &connection.id,
                &tokens.access_token,
                kept_refresh,
                expires_at,
            ) {
                warn!(error = %e, "failed to persist refreshed token");
            }
            Some(tokens.access_token)
        }
        Err(e) => {
            warn!(provider = %connection.provider, error = %e, "token refresh failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection(expires_at: Option<DateTime<Utc>>) -> ProviderConnection {
        ProviderConnection {
            id: "conn-1".to_string(),
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            access_token: Some("cached-token".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            token_expires_at: expires_at,
            account_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_token_does_not_need_refresh() {
        let conn = connection(Some(Utc::now() + Duration::hours(1)));
        assert!(!token_needs_refresh(&conn, Utc::now()));
    }

    #[test]
    fn token_inside_margin_needs_refresh() {
        let conn = connection(Some(Utc::now() + Duration::minutes(3)));
        assert!(token_needs_refresh(&conn, Utc::now()));

        let expired = connection(Some(Utc::now() - Duration::minutes(10)));
        assert!(token_needs_refresh(&expired, Utc::now()));
    }

    #[test]
    fn token_without_expiry_is_trusted() {
        let conn = connection(None);
        assert!(!token_needs_refresh(&conn, Utc::now()));
    }

    #[tokio::test]
    async fn cached_token_short_circuits_network() {
        let db = PlannerDb::open_memory().unwrap();
        let config = OAuthConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            // Unroutable; a network call would fail loudly.
            token_url: "http://127.0.0.1:1/token".to_string(),
        };
        let conn = connection(Some(Utc::now() + Duration::hours(1)));

        let token = valid_access_token(&db, &reqwest::Client::new(), &config, &conn).await;
        assert_eq!(token.as_deref(), Some("cached-token"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(
                json!({"access_token": "fresh-token", "expires_in": 3600, "token_type": "Bearer"})
                    .to_string(),
            )
            .create_async()
            .await;

        let db = PlannerDb::open_memory().unwrap();
        let mut conn = connection(Some(Utc::now() - Duration::minutes(1)));
        conn.id = Uuid::new_v4().to_string();
        db.insert_connection(&conn).unwrap();

        let config = OAuthConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_url: format!("{}/token", server.url()),
        };

        let token = valid_access_token(&db, &reqwest::Client::new(), &config, &conn).await;
        assert_eq!(token.as_deref(), Some("fresh-token"));

        let stored = db.get_connection(&conn.id).unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("fresh-token"));
        // Old refresh token survives when the provider omits a new one.
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert!(stored.token_expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn refresh_failure_returns_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(json!({"error": "invalid_grant"}).to_string())
            .create_async()
            .await;

        let db = PlannerDb::open_memory().unwrap();
        let conn = connection(Some(Utc::now() - Duration::minutes(1)));
        let config = OAuthConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_url: format!("{}/token", server.url()),
        };

        let token = valid_access_token(&db, &reqwest::Client::new(), &config, &conn).await;
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn missing_credentials_return_none_without_network() {
        let db = PlannerDb::open_memory().unwrap();
        let conn = connection(Some(Utc::now() - Duration::minutes(1)));
        let config = OAuthConfig::google("", "");

        let token = valid_access_token(&db, &reqwest::Client::new(), &config, &conn).await;
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn missing_refresh_token_returns_none() {
        let db = PlannerDb::open_memory().unwrap();
        let mut conn = connection(Some(Utc::now() - Duration::minutes(1)));
        conn.refresh_token = None;
        let config = OAuthConfig::google("id", "secret");

        let token = valid_access_token(&db, &reqwest::Client::new(), &config, &conn).await;
        assert!(token.is_none());
    }
}
