use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::FetchError;
use crate::models::{ArticleCache, Post};
use crate::remote::{PageRequest, RemoteSession, Status};

/// A fetch triggered within this window of the previous one is served from
/// the cache with zero remote calls. Bounds request rate, not correctness.
pub const FRESHNESS_WINDOW_SECS: i64 = 5 * 60;

/// Page size for a collection with no cursor yet.
pub const PAGE_LIMIT: u32 = 40;

/// Fetches favorites and bookmarks newer than the cached cursors, merges
/// them with the previous cache and advances the cursors. On any remote
/// error the previous cache is returned untouched by the caller; this
/// function never builds a partial merge.
pub async fn refresh<R: RemoteSession + ?Sized>(
    remote: &R,
    instance: &str,
    token: &str,
    prev: Option<&ArticleCache>,
    now: DateTime<Utc>,
) -> Result<ArticleCache, FetchError> {
    if let Some(prev) = prev {
        if now - prev.last_fetched_at < Duration::seconds(FRESHNESS_WINDOW_SECS) {
            debug!("article cache still fresh, skipping remote fetch");
            return Ok(prev.clone());
        }
    }

    let favorite_cursor = prev.and_then(|c| c.favorite_cursor.as_deref());
    let bookmark_cursor = prev.and_then(|c| c.bookmark_cursor.as_deref());

    let favorites = remote
        .fetch_favorites(
            instance,
            token,
            &PageRequest::from_cursor(favorite_cursor, PAGE_LIMIT),
        )
        .await?;
    let bookmarks = remote
        .fetch_bookmarks(
            instance,
            token,
            &PageRequest::from_cursor(bookmark_cursor, PAGE_LIMIT),
        )
        .await?;

    info!(
        favorites = favorites.statuses.len(),
        bookmarks = bookmarks.statuses.len(),
        "retrieved new statuses"
    );

    let new_posts = process(favorites.statuses.iter().chain(&bookmarks.statuses));
    let mut posts = merge(new_posts, prev.map(|c| c.posts.as_slice()).unwrap_or(&[]));
    sort_newest_first(&mut posts);

    Ok(ArticleCache {
        // Cursors only advance; keep the old boundary when the instance
        // returned no pagination info.
        favorite_cursor: favorites
            .next_min_id
            .or_else(|| favorite_cursor.map(str::to_owned)),
        bookmark_cursor: bookmarks
            .next_min_id
            .or_else(|| bookmark_cursor.map(str::to_owned)),
        posts,
        last_fetched_at: now,
    })
}

/// Reduces raw statuses to posts, folding duplicates. A status both
/// favorited and bookmarked arrives once per collection and becomes a
/// single post carrying both flags.
fn process<'a>(statuses: impl Iterator<Item = &'a Status>) -> Vec<Post> {
    let mut posts: Vec<Post> = Vec::new();
    for status in statuses {
        let Some(post) = Post::from_status(status) else {
            continue;
        };
        match posts.iter_mut().find(|existing| existing.id == post.id) {
            Some(existing) => {
                existing.is_favorite |= post.is_favorite;
                existing.is_bookmark |= post.is_bookmark;
            }
            None => posts.push(post),
        }
    }
    posts
}

/// New posts first, then cached posts whose id did not reappear.
fn merge(mut new_posts: Vec<Post>, cached: &[Post]) -> Vec<Post> {
    let fresh_ids: HashSet<String> = new_posts.iter().map(|p| p.id.clone()).collect();
    new_posts.extend(
        cached
            .iter()
            .filter(|p| !fresh_ids.contains(&p.id))
            .cloned(),
    );
    new_posts
}

fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}
