use crate::layer::SessionLayer;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sessionkit_core::{Blob, SessionError, SessionOptions};
use sessionkit_session::{SessionData, SessionStoreRef};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Request model for queueing a flash message
#[derive(Deserialize)]
pub struct FlashRequest {
    key: String,
    message: Value,
}

/// Snapshot of the session returned by the index route
#[derive(Serialize)]
pub struct SessionView {
    session_id: String,
    flash: Blob,
    flash_new: Blob,
    data: Blob,
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    InternalError(anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Session(e) => {
                let status = match &e {
                    SessionError::NotStarted(_) | SessionError::AlreadyStarted(_) => {
                        StatusCode::CONFLICT
                    }
                    SessionError::NotASequence { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            Self::InternalError(e) => {
                error!(error = %e, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", e),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Build the demo router wrapped in the session layer
pub fn app(store: SessionStoreRef, options: SessionOptions) -> anyhow::Result<Router> {
    let sessions = SessionLayer::new(store, options)
        .map_err(|e| anyhow::anyhow!("Failed to configure session layer: {}", e))?;

    Ok(Router::new()
        .route("/", get(show_session))
        .route("/flash", post(queue_flash))
        .route("/visits", post(count_visit))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .layer(sessions)
        .layer(TraceLayer::new_for_http()))
}

/// Start the HTTP server
pub async fn run_server(
    store: SessionStoreRef,
    options: SessionOptions,
    addr: SocketAddr,
    cleanup_interval: Duration,
) -> anyhow::Result<()> {
    info!("Starting HTTP server on {}", addr);

    let app = app(store.clone(), options)?;

    if !cleanup_interval.is_zero() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                match store.cleanup_expired_sessions().await {
                    Ok(count) => debug!(count, "Session cleanup finished"),
                    Err(e) => error!(error = %e, "Session cleanup failed"),
                }
            }
        });
    }

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start HTTP server: {}", e))
}

/// Session data attached by [`SessionLayer`]; missing when the session could not be started
fn attached(data: Option<Extension<SessionData>>) -> Result<SessionData, ApiError> {
    data.map(|Extension(data)| data).ok_or_else(|| {
        ApiError::InternalError(anyhow::anyhow!("Session is not available for this request"))
    })
}

async fn show_session(data: Option<Extension<SessionData>>) -> Result<Json<SessionView>, ApiError> {
    let data = attached(data)?;
    let flash = data.flash();
    Ok(Json(SessionView {
        session_id: data.session().id()?,
        flash: flash.to_map()?,
        flash_new: flash.to_map_new()?,
        data: data.to_map()?,
    }))
}

async fn queue_flash(
    data: Option<Extension<SessionData>>,
    Json(payload): Json<FlashRequest>,
) -> Result<StatusCode, ApiError> {
    attached(data)?
        .flash()
        .push_new(&payload.key, payload.message)?;
    Ok(StatusCode::ACCEPTED)
}

async fn count_visit(data: Option<Extension<SessionData>>) -> Result<Json<Value>, ApiError> {
    let data = attached(data)?;
    let visits = data.get_as::<u64>("visits")?.unwrap_or(0) + 1;
    data.set("visits", visits)?;
    Ok(Json(serde_json::json!({ "visits": visits })))
}

/// Rotate the session id after a privilege change
async fn login(data: Option<Extension<SessionData>>) -> Result<Json<Value>, ApiError> {
    let data = attached(data)?;
    let id = data.session().regenerate_id(true)?;
    data.flash().set_new("notice", "Signed in")?;
    Ok(Json(serde_json::json!({ "session_id": id })))
}

async fn logout(data: Option<Extension<SessionData>>) -> Result<StatusCode, ApiError> {
    attached(data)?.session().destroy()?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::json;
    use sessionkit_session::InMemorySessionStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(Arc::new(InMemorySessionStore::new()), SessionOptions::default()).unwrap()
    }

    fn cookie_of(response: &Response) -> String {
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, cookie: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(body).unwrap()
    }

    fn get_index(cookie: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_flash_round_trip() {
        let app = test_app();

        let body = Body::from(json!({"key": "errors", "message": "Invalid email"}).to_string());
        let response = app.clone().oneshot(post("/flash", None, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let cookie = cookie_of(&response);

        let response = app.clone().oneshot(get_index(&cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = json_body(response).await;
        assert_eq!(view["flash"], json!({"errors": ["Invalid email"]}));
        assert_eq!(view["flash_new"], json!({}));

        let view = json_body(app.oneshot(get_index(&cookie)).await.unwrap()).await;
        assert_eq!(view["flash"], json!({}));
    }

    #[tokio::test]
    async fn test_visit_counter() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post("/visits", None, Body::empty()))
            .await
            .unwrap();
        let cookie = cookie_of(&response);
        assert_eq!(json_body(response).await, json!({"visits": 1}));

        let response = app
            .clone()
            .oneshot(post("/visits", Some(&cookie), Body::empty()))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"visits": 2}));

        let view = json_body(app.oneshot(get_index(&cookie)).await.unwrap()).await;
        assert_eq!(view["data"], json!({"visits": 2}));
    }

    #[tokio::test]
    async fn test_login_rotates_cookie() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post("/visits", None, Body::empty()))
            .await
            .unwrap();
        let old_cookie = cookie_of(&response);

        let response = app
            .clone()
            .oneshot(post("/login", Some(&old_cookie), Body::empty()))
            .await
            .unwrap();
        let new_cookie = cookie_of(&response);
        assert_ne!(old_cookie, new_cookie);

        let view = json_body(app.clone().oneshot(get_index(&new_cookie)).await.unwrap()).await;
        assert_eq!(view["flash"], json!({"notice": "Signed in"}));
        assert_eq!(view["data"], json!({"visits": 1}));

        // The old id no longer resolves
        let view = json_body(app.oneshot(get_index(&old_cookie)).await.unwrap()).await;
        assert_eq!(view["data"], json!({}));
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post("/visits", None, Body::empty()))
            .await
            .unwrap();
        let cookie = cookie_of(&response);

        let response = app
            .clone()
            .oneshot(post("/logout", Some(&cookie), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(cookie_of(&response).ends_with('='));

        let view = json_body(app.oneshot(get_index(&cookie)).await.unwrap()).await;
        assert_eq!(view["data"], json!({}));
    }

    #[tokio::test]
    async fn test_missing_session_is_internal_error() {
        // Routes served without the session layer
        let app = Router::new().route("/", get(show_session));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(
            body["error"],
            json!("Internal server error: Session is not available for this request")
        );
    }

    #[test]
    fn test_session_error_status() {
        let response = ApiError::from(SessionError::NotASequence {
            key: "k".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(sessionkit_core::not_started()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
