//! OAuth2 client-credentials tokens for the admin REST API.

use crate::admin::AdminError;
use crate::config::OAuthSettings;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const REFRESH_MARGIN: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Service-account key file as issued by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyFile {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub issuer_url: Option<String>,
}

impl KeyFile {
    /// Accepts `file:///path`, `file:path` or a plain filesystem path.
    pub fn read(url: &str) -> Result<Self, AdminError> {
        let path = url
            .strip_prefix("file://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        let text = std::fs::read_to_string(path)
            .map_err(|e| AdminError::Auth(format!("read key file {}: {}", path, e)))?;
        serde_json::from_str(&text)
            .map_err(|e| AdminError::Auth(format!("parse key file {}: {}", path, e)))
    }
}

#[derive(Deserialize)]
struct Discovery {
    token_endpoint: String,
}

struct Cached {
    token: String,
    refresh_at: Instant,
}

pub struct TokenSource {
    settings: OAuthSettings,
    http: reqwest::Client,
    cached: Mutex<Option<Cached>>,
}

impl TokenSource {
    pub fn new(settings: OAuthSettings, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Returns a cached token, fetching a new one when absent or close to expiry.
    pub async fn token(&self) -> Result<String, AdminError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(c.token.clone());
            }
        }
        let (token, lifetime) = self.fetch().await?;
        *cached = Some(Cached {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(token)
    }

    async fn fetch(&self) -> Result<(String, Duration), AdminError> {
        let key = KeyFile::read(&self.settings.credentials_file_url)?;
        let issuer = key.issuer_url.as_deref().unwrap_or(&self.settings.issuer_url);
        let token_url = self.discover_token_endpoint(issuer).await?;
        tracing::debug!(%token_url, client_id = %key.client_id, "requesting admin token");

        let client = BasicClient::new(
            ClientId::new(key.client_id),
            Some(ClientSecret::new(key.client_secret)),
            AuthUrl::new(token_url.clone()).map_err(|e| AdminError::Auth(e.to_string()))?,
            Some(TokenUrl::new(token_url).map_err(|e| AdminError::Auth(e.to_string()))?),
        )
        .set_auth_type(AuthType::RequestBody);

        let mut request = client.exchange_client_credentials();
        if !self.settings.audience.is_empty() {
            request = request.add_extra_param("audience", self.settings.audience.clone());
        }
        let response = request
            .request_async(async_http_client)
            .await
            .map_err(|e| AdminError::Auth(format!("token exchange: {}", e)))?;
        Ok((
            response.access_token().secret().clone(),
            response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
        ))
    }

    async fn discover_token_endpoint(&self, issuer: &str) -> Result<String, AdminError> {
        let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
        let discovery: Discovery = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdminError::Auth(format!("discovery {}: {}", url, e)))?
            .json()
            .await
            .map_err(|e| AdminError::Auth(format!("discovery {}: {}", url, e)))?;
        Ok(discovery.token_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key_file(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_key_file_variants() {
        let f = key_file(r#"{"client_id":"id","client_secret":"s","type":"sn_service_account"}"#);
        let p = f.path().display().to_string();
        for url in [format!("file://{}", p), format!("file:{}", p), p.clone()] {
            let key = KeyFile::read(&url).unwrap();
            assert_eq!(key.client_id, "id");
            assert!(key.issuer_url.is_none());
        }
        assert!(KeyFile::read("file:///no/such/key.json").is_err());
    }

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("audience=urn%3Apulsar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let f = key_file(r#"{"client_id":"id","client_secret":"secret"}"#);
        let source = TokenSource::new(
            OAuthSettings {
                issuer_url: format!("{}/", server.uri()),
                audience: "urn:pulsar".into(),
                credentials_file_url: format!("file://{}", f.path().display()),
            },
            reqwest::Client::new(),
        );
        assert_eq!(source.token().await.unwrap(), "tok-1");
        assert_eq!(source.token().await.unwrap(), "tok-1");
    }
}
