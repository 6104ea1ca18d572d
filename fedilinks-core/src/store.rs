use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::models::{AccessToken, AppRegistration, ArticleCache, AuthorizationCode};

/// The four persisted slots. Each slot has exactly one producing rule per
/// transition; any rule may read any slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Registration,
    AuthCode,
    AccessToken,
    ArticleCache,
}

impl Slot {
    fn file_name(self) -> &'static str {
        match self {
            Slot::Registration => "registration.json",
            Slot::AuthCode => "auth_code.json",
            Slot::AccessToken => "access_token.json",
            Slot::ArticleCache => "article_cache.json",
        }
    }
}

/// Notification sent after every successful slot mutation.
#[derive(Debug, Clone, Copy)]
pub struct SlotChange {
    pub slot: Slot,
    /// `None` when the slot was cleared.
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Persisted<T> {
    value: Option<T>,
    modified_at: Option<DateTime<Utc>>,
}

impl<T> Default for Persisted<T> {
    fn default() -> Self {
        Self {
            value: None,
            modified_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    registration: Persisted<AppRegistration>,
    auth_code: Persisted<AuthorizationCode>,
    access_token: Persisted<AccessToken>,
    article_cache: Persisted<ArticleCache>,
}

/// Key-value store for the session slots, surviving across page loads.
/// One JSON file per slot, written atomically via a `.json.tmp` rename;
/// every mutation stamps the slot's modified time and broadcasts a
/// [`SlotChange`].
#[derive(Debug, Clone)]
pub struct SlotStore {
    inner: Arc<RwLock<Slots>>,
    dir: Option<PathBuf>,
    changes: broadcast::Sender<SlotChange>,
}

impl SlotStore {
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(RwLock::new(Slots::default())),
            dir: None,
            changes,
        }
    }

    /// Loads all four slots from a state directory, creating it if needed.
    pub async fn load_from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(error = %e, "failed to create state dir");
        }
        let slots = Slots {
            registration: read_slot_file(&dir.join(Slot::Registration.file_name())).await,
            auth_code: read_slot_file(&dir.join(Slot::AuthCode.file_name())).await,
            access_token: read_slot_file(&dir.join(Slot::AccessToken.file_name())).await,
            article_cache: read_slot_file(&dir.join(Slot::ArticleCache.file_name())).await,
        };
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(RwLock::new(slots)),
            dir: Some(dir),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlotChange> {
        self.changes.subscribe()
    }

    pub async fn registration(&self) -> Option<AppRegistration> {
        self.inner.read().await.registration.value.clone()
    }

    pub async fn auth_code(&self) -> Option<AuthorizationCode> {
        self.inner.read().await.auth_code.value.clone()
    }

    pub async fn access_token(&self) -> Option<AccessToken> {
        self.inner.read().await.access_token.value.clone()
    }

    pub async fn article_cache(&self) -> Option<ArticleCache> {
        self.inner.read().await.article_cache.value.clone()
    }

    pub async fn modified_at(&self, slot: Slot) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().await;
        match slot {
            Slot::Registration => inner.registration.modified_at,
            Slot::AuthCode => inner.auth_code.modified_at,
            Slot::AccessToken => inner.access_token.modified_at,
            Slot::ArticleCache => inner.article_cache.modified_at,
        }
    }

    pub async fn put_registration(&self, value: AppRegistration) {
        let now = Utc::now();
        let snapshot = {
            let mut inner = self.inner.write().await;
            inner.registration = Persisted {
                value: Some(value),
                modified_at: Some(now),
            };
            inner.registration.clone()
        };
        self.persist(Slot::Registration, &snapshot).await;
        self.notify(Slot::Registration, Some(now));
    }

    pub async fn put_auth_code(&self, value: AuthorizationCode) {
        let now = Utc::now();
        let snapshot = {
            let mut inner = self.inner.write().await;
            inner.auth_code = Persisted {
                value: Some(value),
                modified_at: Some(now),
            };
            inner.auth_code.clone()
        };
        self.persist(Slot::AuthCode, &snapshot).await;
        self.notify(Slot::AuthCode, Some(now));
    }

    pub async fn put_access_token(&self, value: AccessToken) {
        let now = Utc::now();
        let snapshot = {
            let mut inner = self.inner.write().await;
            inner.access_token = Persisted {
                value: Some(value),
                modified_at: Some(now),
            };
            inner.access_token.clone()
        };
        self.persist(Slot::AccessToken, &snapshot).await;
        self.notify(Slot::AccessToken, Some(now));
    }

    pub async fn put_article_cache(&self, value: ArticleCache) {
        let now = Utc::now();
        let snapshot = {
            let mut inner = self.inner.write().await;
            inner.article_cache = Persisted {
                value: Some(value),
                modified_at: Some(now),
            };
            inner.article_cache.clone()
        };
        self.persist(Slot::ArticleCache, &snapshot).await;
        self.notify(Slot::ArticleCache, Some(now));
    }

    pub async fn clear(&self, slot: Slot) {
        let was_present = {
            let mut inner = self.inner.write().await;
            match slot {
                Slot::Registration => {
                    let present = inner.registration.value.is_some();
                    inner.registration = Persisted::default();
                    present
                }
                Slot::AuthCode => {
                    let present = inner.auth_code.value.is_some();
                    inner.auth_code = Persisted::default();
                    present
                }
                Slot::AccessToken => {
                    let present = inner.access_token.value.is_some();
                    inner.access_token = Persisted::default();
                    present
                }
                Slot::ArticleCache => {
                    let present = inner.article_cache.value.is_some();
                    inner.article_cache = Persisted::default();
                    present
                }
            }
        };
        self.persist(slot, &Persisted::<()>::default()).await;
        if was_present {
            self.notify(slot, None);
        }
    }

    pub async fn clear_all(&self) {
        for slot in [
            Slot::Registration,
            Slot::AuthCode,
            Slot::AccessToken,
            Slot::ArticleCache,
        ] {
            self.clear(slot).await;
        }
    }

    async fn persist<T: Serialize>(&self, slot: Slot, snapshot: &Persisted<T>) {
        let Some(dir) = &self.dir else {
            debug!(?slot, "slot store is in-memory only; skipping persist");
            return;
        };
        let path = dir.join(slot.file_name());
        let bytes = match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, ?slot, "failed to serialize slot");
                return;
            }
        };
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            warn!(error = %e, path = %tmp.display(), "failed to write temp slot file");
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            warn!(error = %e, path = %path.display(), "failed to persist slot file");
        }
    }

    fn notify(&self, slot: Slot, modified_at: Option<DateTime<Utc>>) {
        let _ = self.changes.send(SlotChange { slot, modified_at });
    }
}

/// Reads one slot file, falling back to its `.json.tmp` sibling when the
/// main file is corrupted, then to an empty slot.
async fn read_slot_file<T: DeserializeOwned>(path: &Path) -> Persisted<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse slot file, trying tmp fallback");
                let tmp = path.with_extension("json.tmp");
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                    Err(_) => Persisted::default(),
                }
            }
        },
        Err(_) => Persisted::default(),
    }
}
