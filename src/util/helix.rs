use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, instrument};

use crate::constants::{
    API_HELIX_URL, API_OAUTH_URL, AVATAR_REFETCH_WORKERS, CHANNEL_URL_BASE, HELIX_BATCH_LIMIT,
    MAX_TRACKED_CHANNELS, RATE_LIMIT_MAX_ATTEMPTS, RATE_LIMIT_RETRY_DELAY,
};
use crate::tracker::ChannelSnapshot;

/// The subset of the platform API a tracking session depends on.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn category_id(&self, name: &str) -> HelixResult<String>;

    async fn top_streams(
        &self,
        category_id: &str,
        count: usize,
    ) -> HelixResult<Vec<ChannelSnapshot>>;

    /// Never fails as a whole; ids that could not be resolved are missing from the map.
    async fn avatars(&self, ids: &[String]) -> HashMap<String, String>;
}

#[derive(Debug, Clone)]
pub struct Helix {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    retry_delay: Duration,
}

impl Helix {
    pub fn new(client_id: &str, access_token: &str, timeout: Duration) -> HelixResult<Self> {
        Self::with_base_url(API_HELIX_URL, client_id, access_token, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        client_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> HelixResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HelixErr::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: auth_headers(client_id, access_token)?,
            retry_delay: RATE_LIMIT_RETRY_DELAY,
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[instrument(skip(client_secret, timeout))]
    /// Exchanges an application's client id/secret pair for an app access token
    /// (`client_credentials` grant).
    pub async fn exchange_token(
        oauth_url: Option<&str>,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> HelixResult<AppToken> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HelixErr::from_reqwest)?;

        let uri = format!(
            "{}/token",
            oauth_url.unwrap_or(API_OAUTH_URL).trim_end_matches('/')
        );

        let res = client
            .post(uri)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(HelixErr::from_reqwest)?;

        if !res.status().is_success() {
            return Err(HelixErr::from_response(res).await);
        }

        let token = res
            .json::<TokenResponse>()
            .await
            .map_err(HelixErr::from_reqwest)?;

        match token.access_token {
            Some(access_token) if !access_token.is_empty() => {
                tracing::info!(expires_in = ?token.expires_in, "exchanged client credentials for app token");
                Ok(AppToken {
                    access_token,
                    expires_in: token.expires_in,
                })
            }
            _ => Err(HelixErr::MissingToken),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_category_id(&self, name: &str) -> HelixResult<String> {
        let query = vec![(HelixParamType::Name.key(), name.to_string())];
        let res = self
            .get::<HelixDataResponse<HelixCategory>>(HelixUri::Games, &query)
            .await?;

        match res.data.into_iter().next() {
            Some(category) => {
                tracing::debug!(category_id = category.id, category_name = category.name, "resolved category");
                Ok(category.id)
            }
            None => Err(HelixErr::NotFound(name.to_string())),
        }
    }

    #[instrument(skip(self))]
    /// Fetches up to `count` live streams for a category, ordered by viewer count (highest
    /// first). `count` is clamped to the 100-stream page limit, and a count of zero makes no
    /// request at all.
    pub async fn fetch_top_streams(
        &self,
        category_id: &str,
        count: usize,
    ) -> HelixResult<Vec<ChannelSnapshot>> {
        let first = count.min(MAX_TRACKED_CHANNELS);
        if first == 0 {
            return Ok(Vec::new());
        }

        let query = vec![
            (HelixParamType::GameId.key(), category_id.to_string()),
            (HelixParamType::First.key(), first.to_string()),
        ];

        let mut streams = self
            .get::<HelixDataResponse<HelixStream>>(HelixUri::Streams, &query)
            .await?
            .data;

        // sort_by is stable, so ties keep the order helix gave them
        streams.sort_by(|a, b| b.viewers.cmp(&a.viewers));
        streams.truncate(first);

        tracing::debug!(stream_count = streams.len(), "fetched live streams");
        Ok(streams.into_iter().map(ChannelSnapshot::from).collect())
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    /// Looks up profile images for a set of user ids, `HELIX_BATCH_LIMIT` ids per request.
    ///
    /// A chunk rejected as a bad request is retried one id at a time so that a single bad id
    /// only costs its own avatar. Chunks that fail for any other reason are skipped.
    pub async fn fetch_avatars(&self, ids: &[String]) -> HashMap<String, String> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut avatars = HashMap::new();

        for (i, query) in build_query_params(HelixParamType::Id, &ids).iter().enumerate() {
            match self
                .get_with_retry::<HelixDataResponse<HelixUser>>(HelixUri::Users, query)
                .await
            {
                Ok(res) => avatars.extend(res.data.into_iter().filter_map(HelixUser::avatar)),
                // retrying id by id only helps when one bad id spoiled the chunk
                Err(e) if !matches!(e, HelixErr::Client { .. }) => {
                    tracing::warn!(
                        error = %e,
                        chunk_idx = i,
                        chunk_length = query.len(),
                        "avatar chunk failed, skipping"
                    );
                }
                Err(e) => {
                    let chunk = ids
                        .get(i * HELIX_BATCH_LIMIT..)
                        .and_then(|rest| rest.get(..HELIX_BATCH_LIMIT.min(rest.len())))
                        .unwrap_or_default();

                    tracing::warn!(
                        error = %e,
                        chunk_idx = i,
                        chunk_length = chunk.len(),
                        "avatar chunk failed, refetching individually"
                    );

                    avatars.extend(self.try_refetch(chunk.to_vec()).await);
                }
            }
        }

        tracing::debug!(avatar_count = avatars.len(), "fetched avatars");
        avatars
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn try_refetch(&self, ids: Vec<String>) -> HashMap<String, String> {
        let requests = ids.into_iter().map(|id| async move {
            let query = vec![(HelixParamType::Id.key(), id.clone())];
            let res = self
                .get_with_retry::<HelixDataResponse<HelixUser>>(HelixUri::Users, &query)
                .await;
            (id, res)
        });

        let results: Vec<_> = stream::iter(requests)
            .buffer_unordered(AVATAR_REFETCH_WORKERS)
            .collect()
            .instrument(tracing::debug_span!("resolve_refetch_futures"))
            .await;

        let mut refetched = HashMap::new();
        for (id, result) in results {
            match result {
                Ok(res) => refetched.extend(res.data.into_iter().filter_map(HelixUser::avatar)),
                Err(e) => tracing::warn!(user_id = id, error = %e, "avatar lookup failed, skipping"),
            }
        }

        refetched
    }

    async fn get_with_retry<T>(
        &self,
        endpoint: HelixUri,
        query: &[(&'static str, String)],
    ) -> HelixResult<T>
    where
        T: DeserializeOwned,
    {
        let mut attempt = 1;
        loop {
            match self.get(endpoint, query).await {
                Err(HelixErr::RateLimited) if attempt < RATE_LIMIT_MAX_ATTEMPTS => {
                    tracing::warn!(attempt, delay = ?self.retry_delay, "rate limited, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    #[instrument(skip(self, query))]
    /// Performs a GET request against a helix endpoint and parses the response as `T`.
    async fn get<T>(&self, endpoint: HelixUri, query: &[(&'static str, String)]) -> HelixResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint.urn()))
            .headers(self.headers.clone())
            .query(query)
            .send()
            .await
            .map_err(HelixErr::from_reqwest)?;

        if !res.status().is_success() {
            return Err(HelixErr::from_response(res).await);
        }

        let rl_remaining = res.headers().get("ratelimit-remaining");
        let rl_total = res.headers().get("ratelimit-limit");

        if let Some(remaining) = rl_remaining
            && let Some(total) = rl_total
        {
            tracing::debug!(ratelimit_available = ?remaining, ratelimit_total = ?total, "rate-limit bucket");
        }

        res.json::<T>().await.map_err(HelixErr::from_reqwest)
    }
}

#[async_trait]
impl Platform for Helix {
    async fn category_id(&self, name: &str) -> HelixResult<String> {
        self.fetch_category_id(name).await
    }

    async fn top_streams(
        &self,
        category_id: &str,
        count: usize,
    ) -> HelixResult<Vec<ChannelSnapshot>> {
        self.fetch_top_streams(category_id, count).await
    }

    async fn avatars(&self, ids: &[String]) -> HashMap<String, String> {
        self.fetch_avatars(ids).await
    }
}

fn auth_headers(client_id: &str, access_token: &str) -> HelixResult<HeaderMap> {
    let mut bearer_value = HeaderValue::from_str(&format!("Bearer {}", access_token))?;
    bearer_value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer_value);
    headers.insert("Client-Id", HeaderValue::from_str(client_id)?);

    Ok(headers)
}

pub const HELIX_URN_GAMES: &str = "games";
pub const HELIX_URN_STREAMS: &str = "streams";
pub const HELIX_URN_USERS: &str = "users";

#[derive(Debug, Clone, Copy)]
pub enum HelixUri {
    Games,
    Streams,
    Users,
}

impl HelixUri {
    fn urn(self) -> &'static str {
        match self {
            HelixUri::Games => HELIX_URN_GAMES,
            HelixUri::Streams => HELIX_URN_STREAMS,
            HelixUri::Users => HELIX_URN_USERS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HelixParamType {
    Id,
    Name,
    GameId,
    First,
}

impl HelixParamType {
    fn key(self) -> &'static str {
        match self {
            HelixParamType::Id => "id",
            HelixParamType::Name => "name",
            HelixParamType::GameId => "game_id",
            HelixParamType::First => "first",
        }
    }
}

/// Splits `items` into one query (a list of repeated `key=value` pairs) per helix batch.
pub fn build_query_params(
    param_type: HelixParamType,
    items: &[String],
) -> Vec<Vec<(&'static str, String)>> {
    items
        .chunks(HELIX_BATCH_LIMIT)
        .map(|chunk| {
            chunk
                .iter()
                .map(|item| (param_type.key(), item.to_string()))
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixStream {
    #[serde(rename = "user_id")]
    pub id: String,
    #[serde(rename = "user_login")]
    pub login: String,
    #[serde(rename = "user_name")]
    pub name: String,
    #[serde(rename = "viewer_count", default)]
    pub viewers: u64,
}

impl From<HelixStream> for ChannelSnapshot {
    fn from(stream: HelixStream) -> Self {
        let display_name = if stream.name.is_empty() {
            stream.login.clone()
        } else {
            stream.name
        };

        Self {
            link: format!("{}/{}", CHANNEL_URL_BASE, stream.login),
            id: stream.id,
            display_name,
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
    pub id: String,
    #[serde(rename = "profile_image_url", default)]
    pub image: String,
}

impl HelixUser {
    fn avatar(self) -> Option<(String, String)> {
        (!self.image.is_empty()).then_some((self.id, self.image))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Clone)]
pub struct AppToken {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for AppToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("no category matching '{0}'")]
    NotFound(String),

    #[error("rate limited by helix")]
    RateLimited,

    #[error("helix server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("helix rejected the request ({status}): {message}")]
    Client { status: StatusCode, message: String },

    #[error("malformed helix response: {0}")]
    Decode(reqwest::Error),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("token response did not contain an access token")]
    MissingToken,
}

impl HelixErr {
    /// Transient failures abort one poll cycle; anything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HelixErr::RateLimited
                | HelixErr::Server { .. }
                | HelixErr::Timeout
                | HelixErr::Network(_)
        )
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HelixErr::Timeout
        } else if e.is_decode() {
            HelixErr::Decode(e)
        } else {
            HelixErr::Network(e)
        }
    }

    /// Builds an error from a non-2xx response, keeping helix's `message` detail when the body
    /// carries one.
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status();
        tracing::error!(code = %status, "non-2xx response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return HelixErr::RateLimited;
        }

        let message = match res.json::<Value>().await {
            Ok(body) => {
                tracing::debug!(body = ?body, "error message in response");
                body["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string())
            }
            Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
        };

        if status.is_server_error() {
            HelixErr::Server { status, message }
        } else {
            HelixErr::Client { status, message }
        }
    }
}
