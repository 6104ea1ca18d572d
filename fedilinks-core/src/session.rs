use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SessionError;
use crate::fetch;
use crate::models::{AccessToken, AppRegistration, AuthorizationCode};
use crate::remote::RemoteSession;
use crate::secret::{Sealed, SecretCodec};
use crate::store::{Slot, SlotStore};

/// OAuth scopes requested at registration and authorization.
pub const SCOPES: &str = "read";

/// Query-string marker the instance redirect must lead with for the
/// callback to be treated as an authorization response.
const CODE_MARKER: &str = "code";

/// Where the browser should go next, decided by a rule. The web layer
/// translates this into a full-page redirect.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Navigate to the instance's authorize endpoint.
    Remote(Url),
    /// Reset to the dashboard base path.
    BasePath,
}

/// Session phase, derived purely from the slot snapshot — never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No registration; the authorize prompt is shown.
    Anonymous,
    /// Registered with an instance, no access token yet.
    AwaitingCode,
    /// Access token present, no articles fetched yet.
    Authenticated,
    /// Access token and article cache present.
    Ready,
}

/// The session state machine. Each public method is one UI or browser
/// trigger; each private rule re-reads the slot snapshot, checks its guard,
/// and either advances the chain with exactly one slot write or does
/// nothing. Replaying any trigger with unchanged state is a no-op.
pub struct SessionEngine<R> {
    store: SlotStore,
    remote: R,
    codec: SecretCodec,
    app_name: String,
    redirect_uri: String,
}

impl<R: RemoteSession> SessionEngine<R> {
    pub fn new(
        store: SlotStore,
        remote: R,
        codec: SecretCodec,
        app_name: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            store,
            remote,
            codec,
            app_name: app_name.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub async fn phase(&self) -> SessionPhase {
        if self.store.access_token().await.is_some() {
            if self.store.article_cache().await.is_some() {
                SessionPhase::Ready
            } else {
                SessionPhase::Authenticated
            }
        } else if self.store.registration().await.is_some() {
            SessionPhase::AwaitingCode
        } else {
            SessionPhase::Anonymous
        }
    }

    /// RegisterApp, then RedirectToAuthorize. Registers a new OAuth client
    /// with the target instance, replacing any previous session wholesale.
    pub async fn authorize(&self, instance: &str) -> Result<Navigation, SessionError> {
        let instance = instance.trim();
        if instance.is_empty() {
            debug!("authorize requested without an instance name");
            return Ok(Navigation::BasePath);
        }

        let credentials = self
            .remote
            .register_app(instance, &self.app_name, SCOPES, &self.redirect_uri)
            .await?;

        // Fresh session: any previous code, token and cache are invalid
        // against the new client credentials.
        self.store.clear(Slot::AuthCode).await;
        self.store.clear(Slot::AccessToken).await;
        self.store.clear(Slot::ArticleCache).await;
        self.store
            .put_registration(AppRegistration {
                client_id: self.codec.seal(&credentials.client_id),
                client_secret: self.codec.seal(&credentials.client_secret),
                instance: instance.to_owned(),
            })
            .await;
        info!(instance, "registered OAuth app");

        self.redirect_to_authorize(false).await
    }

    /// Logout: clears every slot unconditionally, from any state.
    pub async fn logout(&self) -> Navigation {
        self.store.clear_all().await;
        info!("session cleared");
        Navigation::BasePath
    }

    /// Browser returned to the callback path. CaptureAuthorizationCode,
    /// then the chain advances through ExchangeToken and FetchArticles.
    pub async fn callback(&self, query: &str) -> Result<Navigation, SessionError> {
        self.capture_authorization_code(query).await;
        self.advance().await?;
        Ok(Navigation::BasePath)
    }

    /// Manual refresh trigger for FetchArticles. The freshness window still
    /// applies.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.fetch_articles().await
    }

    /// Runs the guarded chain until quiescent: ExchangeToken if a code is
    /// waiting, then FetchArticles if a token exists.
    pub async fn advance(&self) -> Result<(), SessionError> {
        self.exchange_token().await?;
        self.fetch_articles().await?;
        Ok(())
    }

    /// RedirectToAuthorize. Fires only when a registration exists and the
    /// flow has not progressed past it; otherwise resets to the base path.
    pub async fn redirect_to_authorize(
        &self,
        in_auth_callback: bool,
    ) -> Result<Navigation, SessionError> {
        if in_auth_callback {
            return Ok(Navigation::BasePath);
        }
        if self.store.access_token().await.is_some()
            || self.store.auth_code().await.is_some()
        {
            return Ok(Navigation::BasePath);
        }
        let Some(registration) = self.store.registration().await else {
            return Ok(Navigation::BasePath);
        };

        let client_id = self.open_or_reset(&registration.client_id).await?;
        let url = self.remote.build_authorize_url(
            &registration.instance,
            &client_id,
            &self.redirect_uri,
            SCOPES,
        )?;
        Ok(Navigation::Remote(url))
    }

    /// CaptureAuthorizationCode. Write-once: a second callback with the
    /// same (or any) query is ignored while a code or token exists.
    async fn capture_authorization_code(&self, query: &str) {
        let Some(code) = leading_code_param(query) else {
            debug!("callback query carries no leading code parameter");
            return;
        };
        if self.store.access_token().await.is_some() {
            debug!("access token already present, ignoring callback code");
            return;
        }
        if self.store.auth_code().await.is_some() {
            debug!("authorization code already captured, ignoring callback");
            return;
        }
        if self.store.registration().await.is_none() {
            warn!("callback code arrived without a registered app");
            return;
        }

        self.store
            .put_auth_code(AuthorizationCode {
                code: self.codec.seal(&code),
            })
            .await;
        info!("captured authorization code");
    }

    /// ExchangeToken. Needs a waiting code and no token; on remote failure
    /// nothing is written and re-entering the flow from RegisterApp retries.
    async fn exchange_token(&self) -> Result<(), SessionError> {
        if self.store.access_token().await.is_some() {
            return Ok(());
        }
        let Some(pending) = self.store.auth_code().await else {
            return Ok(());
        };
        let Some(registration) = self.store.registration().await else {
            return Ok(());
        };

        let client_id = self.open_or_reset(&registration.client_id).await?;
        let client_secret = self.open_or_reset(&registration.client_secret).await?;
        let code = self.open_or_reset(&pending.code).await?;

        let token = self
            .remote
            .exchange_code(
                &registration.instance,
                &client_id,
                &client_secret,
                &code,
                &self.redirect_uri,
                SCOPES,
            )
            .await?;

        // The flow may have been reset or re-entered while the exchange ran;
        // prefer writing nothing over writing against stale state.
        if self.store.access_token().await.is_some()
            || self.store.auth_code().await.as_ref() != Some(&pending)
        {
            debug!("state changed during token exchange, dropping result");
            return Ok(());
        }
        self.store
            .put_access_token(AccessToken {
                token: self.codec.seal(&token),
            })
            .await;
        // Code and token are mutually exclusive in steady state.
        self.store.clear(Slot::AuthCode).await;
        info!("exchanged authorization code for access token");
        Ok(())
    }

    /// FetchArticles. Pulls only items newer than the cached cursors and
    /// merges them into the cache; within the freshness window this is a
    /// no-op with zero remote calls.
    async fn fetch_articles(&self) -> Result<(), SessionError> {
        let Some(token) = self.store.access_token().await else {
            return Ok(());
        };
        let Some(registration) = self.store.registration().await else {
            return Ok(());
        };

        let bearer = self.open_or_reset(&token.token).await?;
        let prev = self.store.article_cache().await;
        let cache = fetch::refresh(
            &self.remote,
            &registration.instance,
            &bearer,
            prev.as_ref(),
            Utc::now(),
        )
        .await?;

        if prev.as_ref() == Some(&cache) {
            return Ok(());
        }
        if self.store.access_token().await.as_ref() != Some(&token) {
            debug!("session changed during fetch, dropping result");
            return Ok(());
        }
        self.store.put_article_cache(cache).await;
        Ok(())
    }

    /// Opens a stored secret; an unreadable one (foreign key, corrupted
    /// storage) invalidates the whole session, so the slots are reset
    /// before the error propagates.
    async fn open_or_reset(&self, sealed: &Sealed) -> Result<String, SessionError> {
        match self.codec.open(sealed) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) => {
                warn!(error = %e, "stored secret unreadable, resetting session");
                self.store.clear_all().await;
                Err(SessionError::Codec(e))
            }
        }
    }
}

/// Extracts the code value when the query string leads with the
/// authorization-code parameter, mirroring the instance redirect shape.
fn leading_code_param(query: &str) -> Option<String> {
    if !query.starts_with(CODE_MARKER) {
        return None;
    }
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == CODE_MARKER)
        .map(|(_, value)| value.into_owned())
}
