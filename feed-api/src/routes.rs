use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use feed_core::process_feed;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feeds", get(list_feeds).post(subscribe).delete(unsubscribe))
        .route("/items", get(search_items))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn list_feeds(State(state): State<AppState>) -> Result<Json<Vec<feed_core::Feed>>, ApiError> {
    let feeds = state.store.list_feeds().await?;
    Ok(Json(feeds))
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    url: String,
}

#[derive(Debug, Serialize)]
struct SubscribeResponse {
    feed: Option<feed_core::Feed>,
    #[serde(rename = "itemsInserted")]
    items_inserted: usize,
}

async fn subscribe(
    State(state): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let outcome = process_feed(
        state.store.as_ref(),
        &state.client,
        state.images.as_ref(),
        &q.url,
        &state.cfg,
        Utc::now(),
    )
    .await?;

    let Some(outcome) = outcome else {
        return Err(ApiError::BadRequest("could not fetch or parse feed".into()));
    };

    let feeds = state.store.list_feeds().await?;
    let feed = feeds.into_iter().find(|f| f.feed_url == outcome.final_url);

    Ok(Json(SubscribeResponse {
        feed,
        items_inserted: outcome.items_inserted,
    }))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.store.delete_feed(&q.url).await?;
    Ok(if deleted {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn search_items(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<feed_core::ItemWithFeed>>, ApiError> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = q.offset.unwrap_or(0).max(0);

    let items = state.store.search_items(&q.q, limit, offset).await?;
    Ok(Json(items))
}

enum ApiError {
    BadRequest(String),
    Internal(feed_core::Error),
}

impl From<feed_core::Error> for ApiError {
    fn from(err: feed_core::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(err) => {
                tracing::error!(%err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use feed_core::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()), feed_core::EstimatorConfig::default())
    }

    #[tokio::test]
    async fn index_serves_static_html() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_feeds_starts_empty() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/feeds").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let feeds: Vec<feed_core::Feed> = serde_json::from_slice(&bytes).unwrap();
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn subscribe_to_unreachable_url_returns_400() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/feeds?url=http://localhost.invalid.example/feed.xml")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn subscribe_then_delete_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title><link>https://example.com/</link></channel></rss>"#,
            ))
            .mount(&server)
            .await;

        let app = router(test_state());
        let url = format!("{}/feed.xml", server.uri());

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/feeds?url={url}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/feeds?url={url}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn search_items_clamps_limit_and_offset() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/items?q=rust&limit=500&offset=-5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
