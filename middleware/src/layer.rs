//! Request pipeline adapter.
//!
//! [`SessionLayer`] starts (or resumes) the session before the inner service runs,
//! attaches [`Session`] and [`SessionData`] to the request extensions, and persists
//! the outcome once the inner service has produced a response.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{Request, Response};
use sessionkit_core::{SessionError, SessionOptions, SessionResult};
use sessionkit_session::{Session, SessionData, SessionOutcome, SessionStoreRef};
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use crate::cookies;

/// Layer that manages one session per request
#[derive(Debug, Clone)]
pub struct SessionLayer {
    store: SessionStoreRef,
    options: Arc<SessionOptions>,
}

impl SessionLayer {
    /// Create the layer and hand the ini settings to the store
    pub fn new(store: SessionStoreRef, options: SessionOptions) -> SessionResult<Self> {
        store.configure(&options.ini_settings)?;
        Ok(Self {
            store,
            options: Arc::new(options),
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

/// Service produced by [`SessionLayer`]
#[derive(Debug, Clone)]
pub struct SessionService<S> {
    inner: S,
    store: SessionStoreRef,
    options: Arc<SessionOptions>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SessionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let store = self.store.clone();
        let options = self.options.clone();

        Box::pin(async move {
            let client_id = cookies::session_id(req.headers(), &options.name);
            let session = match open_session(&store, &options, client_id.as_deref()).await {
                Ok(session) => session,
                Err(e) => {
                    error!(error = %e, "Failed to start session");
                    return inner.call(req).await;
                }
            };

            match SessionData::attach(session.clone()) {
                Ok(data) => {
                    req.extensions_mut().insert(data);
                }
                Err(e) => warn!(error = %e, "Failed to attach session data"),
            }
            req.extensions_mut().insert(session.clone());

            // Errors from downstream leave the stored session untouched
            let mut response = inner.call(req).await?;
            persist(&store, &session, &mut response).await;
            Ok(response)
        })
    }
}

/// Resume the session the client presented, or start a fresh one
async fn open_session(
    store: &SessionStoreRef,
    options: &SessionOptions,
    client_id: Option<&str>,
) -> SessionResult<Session> {
    let session = Session::new(options.clone());

    if let Some(id) = client_id {
        match store.get_session(id).await {
            Ok(record) => {
                session.resume(record)?;
                return Ok(session);
            }
            Err(SessionError::NotFound(_)) => {
                debug!(session_id = %id, "Unknown or expired session id, starting a new session");
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to load session, starting a new session");
            }
        }
    }

    session.start()?;
    Ok(session)
}

/// Save or delete the record and emit the matching cookie
async fn persist<B>(store: &SessionStoreRef, session: &Session, response: &mut Response<B>) {
    let options = session.options();

    match session.outcome() {
        SessionOutcome::Save {
            record,
            stale_id,
            issue_cookie,
        } => {
            let id = record.id.clone();
            if let Some(stale_id) = stale_id {
                if let Err(e) = store.delete_session(&stale_id).await {
                    debug!(session_id = %stale_id, error = %e, "Stale session was not deleted");
                }
            }

            if let Err(e) = store.save_session(record).await {
                error!(session_id = %id, error = %e, "Failed to save session");
                return;
            }

            if issue_cookie || options.auto_refresh {
                let cookie =
                    cookies::session_cookie(&options.name, &id, &options.cookie, options.lifetime);
                cookies::append_set_cookie(response.headers_mut(), &cookie);
            }
        }
        SessionOutcome::Delete { id } => {
            if let Err(e) = store.delete_session(&id).await {
                debug!(session_id = %id, error = %e, "Destroyed session was not stored");
            }
            let cookie = cookies::removal_cookie(&options.name, &options.cookie);
            cookies::append_set_cookie(response.headers_mut(), &cookie);
        }
        SessionOutcome::Untouched => {}
    }
}
