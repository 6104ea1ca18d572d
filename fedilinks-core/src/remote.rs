use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LINK};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthExchangeError, FetchError, RegistrationError};

/// Raw status as returned by the instance API. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    pub account: Account,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub favourited: bool,
    #[serde(default)]
    pub bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub preview_url: String,
}

/// Link-preview metadata attached to a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// One page of a collection plus the boundary id of its freshest item,
/// read from the instance's `rel="prev"` pagination pointer.
#[derive(Debug, Clone)]
pub struct StatusPage {
    pub statuses: Vec<Status>,
    pub next_min_id: Option<String>,
}

/// How to page a collection: the newest `limit` items, or only items newer
/// than a previously seen boundary id.
#[derive(Debug, Clone)]
pub enum PageRequest {
    Newest { limit: u32 },
    Since { min_id: String },
}

impl PageRequest {
    pub fn from_cursor(cursor: Option<&str>, limit: u32) -> Self {
        match cursor {
            Some(min_id) => Self::Since {
                min_id: min_id.to_owned(),
            },
            None => Self::Newest { limit },
        }
    }
}

/// The instance's OAuth and REST surface, as the session engine sees it.
/// Implemented over HTTP by [`MastodonClient`]; tests script their own.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn register_app(
        &self,
        instance: &str,
        app_name: &str,
        scopes: &str,
        redirect_uri: &str,
    ) -> Result<AppCredentials, RegistrationError>;

    fn build_authorize_url(
        &self,
        instance: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> Result<Url, RegistrationError>;

    async fn exchange_code(
        &self,
        instance: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> Result<String, AuthExchangeError>;

    async fn fetch_favorites(
        &self,
        instance: &str,
        token: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError>;

    async fn fetch_bookmarks(
        &self,
        instance: &str,
        token: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct MastodonClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct RegisterForm<'a> {
    client_name: &'a str,
    redirect_uris: &'a str,
    scopes: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenForm<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    code: &'a str,
    scope: &'a str,
}

impl MastodonClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// `https://{instance}/` after a sanity check on the supplied hostname.
    /// An instance given with an explicit scheme is taken as-is, which also
    /// lets local development point at a plain-HTTP server.
    fn base_url(instance: &str) -> Result<Url, RegistrationError> {
        let host = instance.trim();
        if host.starts_with("http://") || host.starts_with("https://") {
            return Url::parse(host)
                .map_err(|_| RegistrationError::InvalidHost(instance.to_owned()));
        }
        if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
            return Err(RegistrationError::InvalidHost(instance.to_owned()));
        }
        Url::parse(&format!("https://{host}/"))
            .map_err(|_| RegistrationError::InvalidHost(instance.to_owned()))
    }

    async fn fetch_collection(
        &self,
        instance: &str,
        token: &str,
        endpoint: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError> {
        let base = Self::base_url(instance)
            .map_err(|e| FetchError::BadResponse(e.to_string()))?;
        let mut url = base.join(endpoint).expect("static endpoint path");
        match page {
            PageRequest::Newest { limit } => {
                url.query_pairs_mut()
                    .append_pair("limit", &limit.to_string());
            }
            PageRequest::Since { min_id } => {
                url.query_pairs_mut().append_pair("min_id", min_id);
            }
        }

        let response = self.http.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::BadResponse(format!(
                "{} from {}",
                response.status(),
                endpoint
            )));
        }
        let next_min_id = prev_page_min_id(response.headers());
        let statuses = response.json::<Vec<Status>>().await?;
        Ok(StatusPage {
            statuses,
            next_min_id,
        })
    }
}

#[async_trait]
impl RemoteSession for MastodonClient {
    async fn register_app(
        &self,
        instance: &str,
        app_name: &str,
        scopes: &str,
        redirect_uri: &str,
    ) -> Result<AppCredentials, RegistrationError> {
        let url = Self::base_url(instance)?
            .join("api/v1/apps")
            .expect("static endpoint path");
        let response = self
            .http
            .post(url)
            .form(&RegisterForm {
                client_name: app_name,
                redirect_uris: redirect_uri,
                scopes,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected(format!("{status}: {body}")));
        }
        Ok(response.json::<AppCredentials>().await?)
    }

    fn build_authorize_url(
        &self,
        instance: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> Result<Url, RegistrationError> {
        let mut url = Self::base_url(instance)?
            .join("oauth/authorize")
            .expect("static endpoint path");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scopes);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        instance: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> Result<String, AuthExchangeError> {
        let url = Self::base_url(instance)
            .map_err(|e| AuthExchangeError::Rejected(e.to_string()))?
            .join("oauth/token")
            .expect("static endpoint path");
        let response = self
            .http
            .post(url)
            .form(&TokenForm {
                grant_type: "authorization_code",
                client_id,
                client_secret,
                redirect_uri,
                code,
                scope: scopes,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthExchangeError::Rejected(format!("{status}: {body}")));
        }
        Ok(response.json::<TokenResponse>().await?.access_token)
    }

    async fn fetch_favorites(
        &self,
        instance: &str,
        token: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError> {
        self.fetch_collection(instance, token, "api/v1/favourites", page)
            .await
    }

    async fn fetch_bookmarks(
        &self,
        instance: &str,
        token: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError> {
        self.fetch_collection(instance, token, "api/v1/bookmarks", page)
            .await
    }
}

/// Boundary id of the freshest page, from the `Link` header's `rel="prev"`
/// entry. Absent when the instance returned no pagination info.
fn prev_page_min_id(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    for part in link.split(',') {
        let part = part.trim();
        if !part.contains("rel=\"prev\"") {
            continue;
        }
        let target = part
            .split(';')
            .next()?
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>');
        let url = Url::parse(target).ok()?;
        if let Some((_, min_id)) = url.query_pairs().find(|(key, _)| key == "min_id") {
            return Some(min_id.into_owned());
        }
    }
    None
}
