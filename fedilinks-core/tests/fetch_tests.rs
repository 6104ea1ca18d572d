use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use url::Url;

use fedilinks_core::error::{AuthExchangeError, FetchError, RegistrationError};
use fedilinks_core::fetch;
use fedilinks_core::remote::{
    Account, AppCredentials, Card, MediaAttachment, PageRequest, RemoteSession, Status,
    StatusPage,
};
use fedilinks_core::ArticleCache;

/// Scripted pages: each fetch pops the next favorites/bookmarks page.
struct PagedRemote {
    favorite_pages: Mutex<Vec<StatusPage>>,
    bookmark_pages: Mutex<Vec<StatusPage>>,
    calls: AtomicUsize,
    seen_favorite_requests: Mutex<Vec<PageRequest>>,
    fail: bool,
}

impl PagedRemote {
    fn new(favorite_pages: Vec<StatusPage>, bookmark_pages: Vec<StatusPage>) -> Self {
        Self {
            favorite_pages: Mutex::new(favorite_pages),
            bookmark_pages: Mutex::new(bookmark_pages),
            calls: AtomicUsize::new(0),
            seen_favorite_requests: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

fn empty_page() -> StatusPage {
    StatusPage {
        statuses: Vec::new(),
        next_min_id: None,
    }
}

#[async_trait]
impl RemoteSession for PagedRemote {
    async fn register_app(
        &self,
        _instance: &str,
        _app_name: &str,
        _scopes: &str,
        _redirect_uri: &str,
    ) -> Result<AppCredentials, RegistrationError> {
        unimplemented!("not used by fetch tests")
    }

    fn build_authorize_url(
        &self,
        instance: &str,
        _client_id: &str,
        _redirect_uri: &str,
        _scopes: &str,
    ) -> Result<Url, RegistrationError> {
        Url::parse(&format!("https://{instance}/oauth/authorize"))
            .map_err(|_| RegistrationError::InvalidHost(instance.into()))
    }

    async fn exchange_code(
        &self,
        _instance: &str,
        _client_id: &str,
        _client_secret: &str,
        _code: &str,
        _redirect_uri: &str,
        _scopes: &str,
    ) -> Result<String, AuthExchangeError> {
        unimplemented!("not used by fetch tests")
    }

    async fn fetch_favorites(
        &self,
        _instance: &str,
        _token: &str,
        page: &PageRequest,
    ) -> Result<StatusPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::BadResponse("boom".into()));
        }
        self.seen_favorite_requests
            .lock()
            .unwrap()
            .push(page.clone());
        let mut pages = self.favorite_pages.lock().unwrap();
        Ok(if pages.is_empty() {
            empty_page()
        } else {
            pages.remove(0)
        })
    }

    async fn fetch_bookmarks(
        &self,
        _instance: &str,
        _token: &str,
        _page: &PageRequest,
    ) -> Result<StatusPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::BadResponse("boom".into()));
        }
        let mut pages = self.bookmark_pages.lock().unwrap();
        Ok(if pages.is_empty() {
            empty_page()
        } else {
            pages.remove(0)
        })
    }
}

fn status_with(
    id: &str,
    day: u32,
    card: bool,
    attachment: bool,
    favorited: bool,
    bookmarked: bool,
) -> Status {
    Status {
        id: id.into(),
        created_at: Utc.with_ymd_and_hms(2026, 6, day, 9, 30, 0).unwrap(),
        url: Some(format!("https://example.social/@a/{id}")),
        account: Account {
            acct: "a@example.social".into(),
            display_name: "A".into(),
        },
        replies_count: 2,
        reblogs_count: 3,
        favourites_count: 5,
        media_attachments: if attachment {
            vec![MediaAttachment {
                preview_url: format!("https://cdn.example/{id}.png"),
            }]
        } else {
            Vec::new()
        },
        card: card.then(|| Card {
            title: format!("Title {id}"),
            description: "desc".into(),
            url: format!("https://blog.example/{id}"),
        }),
        favourited: favorited,
        bookmarked,
    }
}

fn cached(posts: Vec<fedilinks_core::Post>, fetched_minutes_ago: i64) -> ArticleCache {
    ArticleCache {
        favorite_cursor: Some("100".into()),
        bookmark_cursor: None,
        posts,
        last_fetched_at: Utc::now() - Duration::minutes(fetched_minutes_ago),
    }
}

fn post_from(status: &Status) -> fedilinks_core::Post {
    fedilinks_core::Post::from_status(status).expect("status carries a card")
}

#[tokio::test]
async fn merge_keeps_descending_order() {
    let remote = PagedRemote::new(
        vec![StatusPage {
            statuses: vec![status_with("d5", 5, true, false, true, false)],
            next_min_id: Some("d5".into()),
        }],
        vec![StatusPage {
            statuses: vec![status_with("d4", 4, true, false, false, true)],
            next_min_id: Some("d4".into()),
        }],
    );
    let prev_posts = vec![
        post_from(&status_with("d3", 3, true, false, true, false)),
        post_from(&status_with("d2", 2, true, false, true, false)),
        post_from(&status_with("d1", 1, true, false, true, false)),
    ];
    let prev = cached(prev_posts, 30);

    let cache = fetch::refresh(&remote, "example.social", "tok", Some(&prev), Utc::now())
        .await
        .unwrap();

    let ids: Vec<_> = cache.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["d5", "d4", "d3", "d2", "d1"]);
}

#[tokio::test]
async fn fresh_cache_short_circuits_with_zero_remote_calls() {
    let remote = PagedRemote::empty();
    let prev = cached(Vec::new(), 2);

    let cache = fetch::refresh(&remote, "example.social", "tok", Some(&prev), Utc::now())
        .await
        .unwrap();

    assert_eq!(cache, prev);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn statuses_without_a_card_are_dropped() {
    let remote = PagedRemote::new(
        vec![StatusPage {
            statuses: vec![
                status_with("with-card", 5, true, false, true, false),
                status_with("no-card", 6, false, false, true, false),
            ],
            next_min_id: None,
        }],
        Vec::new(),
    );

    let cache = fetch::refresh(&remote, "example.social", "tok", None, Utc::now())
        .await
        .unwrap();

    assert_eq!(cache.posts.len(), 1);
    assert_eq!(cache.posts[0].id, "with-card");
}

#[tokio::test]
async fn image_url_comes_only_from_attachments() {
    let remote = PagedRemote::new(
        vec![StatusPage {
            statuses: vec![
                status_with("plain", 5, true, false, true, false),
                status_with("pictured", 6, true, true, true, false),
            ],
            next_min_id: None,
        }],
        Vec::new(),
    );

    let cache = fetch::refresh(&remote, "example.social", "tok", None, Utc::now())
        .await
        .unwrap();

    let plain = cache.posts.iter().find(|p| p.id == "plain").unwrap();
    let pictured = cache.posts.iter().find(|p| p.id == "pictured").unwrap();
    assert_eq!(plain.image_url, None);
    assert_eq!(
        pictured.image_url.as_deref(),
        Some("https://cdn.example/pictured.png")
    );
    assert_eq!(plain.interaction_count, 10);
}

#[tokio::test]
async fn status_in_both_collections_becomes_one_post_with_both_flags() {
    let remote = PagedRemote::new(
        vec![StatusPage {
            statuses: vec![status_with("dup", 5, true, false, true, false)],
            next_min_id: None,
        }],
        vec![StatusPage {
            statuses: vec![status_with("dup", 5, true, false, false, true)],
            next_min_id: None,
        }],
    );

    let cache = fetch::refresh(&remote, "example.social", "tok", None, Utc::now())
        .await
        .unwrap();

    assert_eq!(cache.posts.len(), 1);
    assert!(cache.posts[0].is_favorite);
    assert!(cache.posts[0].is_bookmark);
}

#[tokio::test]
async fn cursors_advance_and_never_move_backward() {
    let remote = PagedRemote::new(
        vec![
            StatusPage {
                statuses: vec![status_with("110", 2, true, false, true, false)],
                next_min_id: Some("110".into()),
            },
            // Second fetch: nothing new, no pagination info.
            empty_page(),
        ],
        vec![empty_page(), empty_page()],
    );

    let first = fetch::refresh(&remote, "example.social", "tok", None, Utc::now())
        .await
        .unwrap();
    assert_eq!(first.favorite_cursor.as_deref(), Some("110"));

    let mut aged = first.clone();
    aged.last_fetched_at = Utc::now() - Duration::minutes(10);
    let second = fetch::refresh(&remote, "example.social", "tok", Some(&aged), Utc::now())
        .await
        .unwrap();
    assert_eq!(
        second.favorite_cursor.as_deref(),
        Some("110"),
        "cursor stays put when the instance returns no pagination info"
    );

    // The second favorites request was bounded by the first cursor.
    let requests = remote.seen_favorite_requests.lock().unwrap();
    assert!(matches!(&requests[0], PageRequest::Newest { limit: 40 }));
    assert!(matches!(&requests[1], PageRequest::Since { min_id } if min_id == "110"));
}

#[tokio::test]
async fn remote_failure_leaves_no_partial_cache() {
    let mut remote = PagedRemote::empty();
    remote.fail = true;
    let prev = cached(
        vec![post_from(&status_with("d1", 1, true, false, true, false))],
        30,
    );

    let result = fetch::refresh(&remote, "example.social", "tok", Some(&prev), Utc::now()).await;
    assert!(matches!(result, Err(FetchError::BadResponse(_))));
}
