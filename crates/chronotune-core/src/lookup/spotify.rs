//! Spotify Web API catalog using the client-credentials flow.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CatalogCredentials;

use super::{CatalogService, CatalogTrack, LookupError};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("chronotune/", env!("CARGO_PKG_VERSION"));
/// Refresh this long before the token's stated expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
    album: AlbumItem,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumItem {
    name: Option<String>,
    release_date: Option<String>,
}

impl From<TrackItem> for CatalogTrack {
    fn from(item: TrackItem) -> Self {
        CatalogTrack {
            title: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
            album: item.album.name,
            release_date: item.album.release_date,
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyCatalog {
    http: reqwest::Client,
    credentials: CatalogCredentials,
    accounts_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for SpotifyCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyCatalog")
            .field("credentials", &self.credentials)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl SpotifyCatalog {
    pub fn new(credentials: CatalogCredentials, timeout: Duration) -> Result<Self, LookupError> {
        Self::with_endpoints(credentials, timeout, ACCOUNTS_URL, API_URL)
    }

    pub fn with_endpoints(
        credentials: CatalogCredentials,
        timeout: Duration,
        accounts_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| LookupError::NetworkUnavailable(err.to_string()))?;
        Ok(Self {
            http,
            credentials,
            accounts_url: accounts_url.into().trim_end_matches('/').to_owned(),
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, LookupError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("requesting catalog access token");
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Unauthorized(body));
        }
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| LookupError::Parse(err.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        let value = token.access_token.clone();
        *slot = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn search_once(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>, LookupError> {
        let token = self.access_token().await?;
        let limit = limit.to_string();
        let response = self
            .http
            .get(format!("{}/search", self.api_url))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(LookupError::Unauthorized("access token rejected".into()));
        }
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let page: SearchResponse = response
            .json()
            .await
            .map_err(|err| LookupError::Parse(err.to_string()))?;
        Ok(page.tracks.items.into_iter().map(CatalogTrack::from).collect())
    }
}

#[async_trait]
impl CatalogService for SpotifyCatalog {
    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>, LookupError> {
        let first = self.search_once(query, limit).await;
        // A cached token may have been revoked early; fetch a fresh one once.
        if matches!(first, Err(LookupError::Unauthorized(_))) && self.token.lock().await.is_some() {
            self.invalidate_token().await;
            return self.search_once(query, limit).await;
        }
        first
    }
}

fn transport_error(err: reqwest::Error) -> LookupError {
    if err.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::NetworkUnavailable(err.to_string())
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> LookupError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LookupError::RateLimited(parse_retry_after(response.headers()));
    }
    let body = response.text().await.unwrap_or_default();
    LookupError::Api(status.as_u16(), body)
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> CatalogCredentials {
        CatalogCredentials::new("client", "secret").expect("credentials")
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    fn catalog(server: &MockServer) -> SpotifyCatalog {
        SpotifyCatalog::with_endpoints(
            credentials(),
            Duration::from_secs(2),
            server.uri(),
            server.uri(),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn maps_search_results() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Radiohead Creep"))
            .and(query_param("type", "track"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tracks": { "items": [{
                    "name": "Creep",
                    "artists": [{ "name": "Radiohead" }],
                    "album": { "name": "Pablo Honey", "release_date": "1993-02-22" }
                }]}
            })))
            .mount(&server)
            .await;

        let hits = catalog(&server)
            .search_tracks("Radiohead Creep", 15)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artists, vec!["Radiohead".to_string()]);
        assert_eq!(hits[0].release_year().map(|y| y.get()), Some(1993));
    }

    #[tokio::test]
    async fn rejected_credentials_are_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = catalog(&server).search_tracks("x y z", 5).await.unwrap_err();
        assert!(matches!(err, LookupError::Unauthorized(_)));
        assert!(err.disables_lookup());
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_hint() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = catalog(&server).search_tracks("abc", 5).await.unwrap_err();
        assert_eq!(err, LookupError::RateLimited(Some(Duration::from_secs(2))));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_unavailable() {
        let catalog = SpotifyCatalog::with_endpoints(
            credentials(),
            Duration::from_secs(2),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
        )
        .expect("client");
        let err = catalog.search_tracks("abc", 5).await.unwrap_err();
        assert!(err.disables_lookup(), "unexpected error {err:?}");
    }
}
