use std::sync::Arc;

use axum::extract::{Query, RawQuery, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tracing::warn;

use fedilinks_core::{MastodonClient, Navigation, SessionEngine};

use crate::render;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine<MastodonClient>>,
    pub base_path: String,
}

impl AppState {
    fn follow(&self, navigation: Navigation) -> Redirect {
        match navigation {
            Navigation::Remote(url) => Redirect::to(url.as_str()),
            Navigation::BasePath => Redirect::to(&self.base_path),
        }
    }

    fn degrade(&self, error_tag: &str) -> Redirect {
        Redirect::to(&format!("{}?error={error_tag}", self.base_path))
    }
}

pub fn router(state: AppState) -> Router {
    let base = state.base_path.trim_end_matches('/').to_string();
    let dash = Router::new()
        .route("/", get(dashboard))
        .route("/authorize", post(authorize))
        .route("/logout", post(logout))
        .route("/auth", get(auth_callback))
        .route("/refresh", post(refresh));
    Router::new().nest(&base, dash).with_state(state)
}

#[derive(Debug, Deserialize)]
struct AuthorizeForm {
    #[serde(default)]
    instance: String,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardParams {
    error: Option<String>,
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Html<String> {
    let phase = state.engine.phase().await;
    let store = state.engine.store();
    let registration = store.registration().await;
    let cache = store.article_cache().await;
    Html(render::page(
        &state.base_path,
        phase,
        registration.as_ref().map(|r| r.instance.as_str()),
        cache.as_ref(),
        params.error.as_deref(),
    ))
}

async fn authorize(
    State(state): State<AppState>,
    Form(form): Form<AuthorizeForm>,
) -> Redirect {
    match state.engine.authorize(&form.instance).await {
        Ok(navigation) => state.follow(navigation),
        Err(e) => {
            warn!(error = %e, "authorization failed");
            state.degrade("authorize")
        }
    }
}

async fn logout(State(state): State<AppState>) -> Redirect {
    let navigation = state.engine.logout().await;
    state.follow(navigation)
}

async fn auth_callback(State(state): State<AppState>, RawQuery(query): RawQuery) -> Redirect {
    match state.engine.callback(query.as_deref().unwrap_or_default()).await {
        Ok(navigation) => state.follow(navigation),
        Err(e) => {
            warn!(error = %e, "sign-in could not be completed");
            state.degrade("session")
        }
    }
}

async fn refresh(State(state): State<AppState>) -> Redirect {
    if let Err(e) = state.engine.refresh().await {
        warn!(error = %e, "manual refresh failed");
        return state.degrade("fetch");
    }
    Redirect::to(&state.base_path)
}
