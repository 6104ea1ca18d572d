use chrono::Local;

use fedilinks_core::{ArticleCache, Post, SessionPhase};

const DESCRIPTION_LIMIT: usize = 200;

/// The whole dashboard page: authorize controls, an optional error banner,
/// and the cached posts as cards.
pub fn page(
    base_path: &str,
    phase: SessionPhase,
    instance: Option<&str>,
    cache: Option<&ArticleCache>,
    error_tag: Option<&str>,
) -> String {
    let mut body = String::new();

    body.push_str(&format!(
        "<form method=\"post\" action=\"{base}authorize\">\
         <input name=\"instance\" placeholder=\"Mastodon instance, e.g. mastodon.social\" \
         value=\"{instance}\">\
         <button type=\"submit\">Authorize Instance</button></form>\n",
        base = base_path,
        instance = escape(instance.unwrap_or_default()),
    ));
    if phase != SessionPhase::Anonymous {
        body.push_str(&format!(
            "<form method=\"post\" action=\"{base}logout\">\
             <button type=\"submit\">Log Out</button></form>\n\
             <form method=\"post\" action=\"{base}refresh\">\
             <button type=\"submit\">Refresh</button></form>\n",
            base = base_path,
        ));
    }

    if let Some(message) = error_message(error_tag) {
        body.push_str(&format!("<p class=\"error\">{message}</p>\n"));
    }

    body.push_str("<h3>Links from Mastodon Favorites and Bookmarks</h3>\n");

    match (phase, cache) {
        (SessionPhase::Anonymous, _) => {
            body.push_str("<p>Authorize an instance to see your saved links.</p>\n");
        }
        (SessionPhase::AwaitingCode, _) => {
            body.push_str("<p>Waiting for authorization from your instance.</p>\n");
        }
        (_, Some(cache)) => {
            for post in &cache.posts {
                body.push_str(&card(post, instance));
            }
        }
        (_, None) => {
            body.push_str("<p>No articles fetched yet.</p>\n");
        }
    }

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>Mastodon Link List</title></head>\
         <body><main>\n{body}</main></body></html>"
    )
}

fn card(post: &Post, instance: Option<&str>) -> String {
    let date = post
        .date
        .with_timezone(&Local)
        .format("%b %-d, %Y %-I:%M%p");
    let account = match instance {
        Some(host) => format!(
            "<a href=\"https://{host}/authorize_interaction?uri={uri}\">{acct}</a>",
            host = escape(host),
            uri = escape(&post.status_url),
            acct = escape(&post.account),
        ),
        None => escape(&post.account),
    };
    let image = match &post.image_url {
        Some(url) => format!(
            "<a href=\"{href}\"><img src=\"{src}\" alt=\"\"></a>",
            href = escape(&post.url),
            src = escape(url),
        ),
        None => String::new(),
    };

    format!(
        "<article class=\"card\">\
         <header>{date}, via {account} - <em>{name}</em>{icon}</header>\
         <h5>{title}</h5>\
         <p>{description}</p>\
         <a href=\"{url}\" target=\"_blank\">Go to Article</a>{image}\
         </article>\n",
        name = escape(&post.display_name),
        icon = icon(post),
        title = escape(&post.title),
        description = escape(&truncate(&post.description)),
        url = escape(&post.url),
    )
}

fn icon(post: &Post) -> &'static str {
    if post.is_favorite {
        " \u{2605}"
    } else if post.is_bookmark {
        " \u{1F516}"
    } else {
        ""
    }
}

fn error_message(tag: Option<&str>) -> Option<&'static str> {
    match tag? {
        "authorize" => Some("Unable to authorize with this instance."),
        "session" => Some("Sign-in could not be completed. Try authorizing again."),
        "fetch" => Some("Could not refresh articles. Try again later."),
        _ => None,
    }
}

fn truncate(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_LIMIT {
        return description.to_string();
    }
    let cut: String = description.chars().take(DESCRIPTION_LIMIT).collect();
    format!("{cut}...")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
