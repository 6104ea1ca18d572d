use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::Status;
use crate::secret::Sealed;

/// OAuth client credentials registered with one instance. Immutable once
/// written; replaced wholesale by a new registration or cleared on logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRegistration {
    pub client_id: Sealed,
    pub client_secret: Sealed,
    pub instance: String,
}

/// Authorization code captured from the instance redirect. Write-once until
/// cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: Sealed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: Sealed,
}

/// Cached processed posts plus the pagination cursors marking the newest
/// item already fetched in each collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCache {
    pub favorite_cursor: Option<String>,
    pub bookmark_cursor: Option<String>,
    pub posts: Vec<Post>,
    pub last_fetched_at: DateTime<Utc>,
}

/// A favorited or bookmarked status reduced to its link card, ready for
/// rendering. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub date: DateTime<Utc>,
    pub account: String,
    pub display_name: String,
    pub status_url: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub interaction_count: u64,
    pub is_favorite: bool,
    pub is_bookmark: bool,
}

impl Post {
    /// Reduces a raw status to a renderable post. Statuses without a link
    /// card carry nothing to render and map to `None`.
    pub fn from_status(status: &Status) -> Option<Self> {
        let card = status.card.as_ref()?;
        let image_url = status
            .media_attachments
            .first()
            .map(|attachment| attachment.preview_url.clone());
        Some(Self {
            id: status.id.clone(),
            date: status.created_at,
            account: status.account.acct.clone(),
            display_name: status.account.display_name.clone(),
            status_url: status.url.clone().unwrap_or_default(),
            title: card.title.clone(),
            description: card.description.clone(),
            url: card.url.clone(),
            image_url,
            interaction_count: status.replies_count + status.reblogs_count
                + status.favourites_count,
            is_favorite: status.favourited,
            is_bookmark: status.bookmarked,
        })
    }
}
