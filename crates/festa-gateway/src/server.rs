//! Server assembly: shared state, session middleware, router, listener.

use axum::Router;
use axum::routing::{delete, get, post, put};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use festa_core::FestaConfig;
use festa_core::traits::{Channel, MulticastSender, RecordStore};
use festa_notify::PushChannel;

use crate::routes;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: FestaConfig,
    pub store: Arc<dyn RecordStore>,
    /// Channel the cron pass delivers through.
    pub push: Arc<dyn Channel>,
    /// Direct provider handle for the manual send endpoints.
    pub sender: Arc<dyn MulticastSender>,
    pub start_time: Instant,
}

/// Authenticated user identity, inserted by [`require_user`].
#[derive(Debug, Clone)]
pub struct UserId(pub String);

/// Session middleware for the protected routes.
///
/// Festa sits behind a fronting proxy that terminates authentication
/// and forwards the user id in `X-User-Id`; a request without it is
/// anonymous and gets a 401.
async fn require_user(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let user = req
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string();

    if user.is_empty() {
        return axum::response::Response::builder()
            .status(axum::http::StatusCode::UNAUTHORIZED)
            .header("Content-Type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({"error": "Unauthorized: missing X-User-Id header"})
                    .to_string(),
            ))
            .unwrap();
    }

    req.extensions_mut().insert(UserId(user));
    next.run(req).await
}

/// Build the full route tree with CORS and request tracing.
pub fn build_router(shared: Arc<AppState>) -> Router {
    // Reachable without a session header; the cron route carries its
    // own bearer check so the external scheduler needs no session
    let public = Router::new()
        .route("/health", get(routes::health_check))
        .route(
            "/api/cron/check-birthdays",
            get(routes::cron_check_birthdays),
        );

    // Everything else is owner-scoped
    let protected = Router::new()
        .route(
            "/api/birthdays",
            get(routes::list_birthdays).post(routes::create_birthday),
        )
        .route(
            "/api/birthdays/{id}",
            put(routes::update_birthday).delete(routes::delete_birthday),
        )
        .route(
            "/api/devices",
            get(routes::list_devices).post(routes::register_device),
        )
        .route("/api/devices/{token}", delete(routes::unregister_device))
        .route(
            "/api/settings/notifications",
            get(routes::get_notification_setting).put(routes::set_notification_setting),
        )
        .route(
            "/api/send-test-notification",
            post(routes::send_test_notification),
        )
        .route("/api/send-notification", post(routes::send_notification))
        .route_layer(axum::middleware::from_fn(require_user));

    protected
        .merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Restrict CORS origins in production via env var
            // Example: FESTA_CORS_ORIGINS=https://festa.app,https://www.festa.app
            if let Ok(origins_str) = std::env::var("FESTA_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                // Development fallback: allow all origins
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve. Runs until the process is stopped.
pub async fn start(
    config: FestaConfig,
    store: Arc<dyn RecordStore>,
    sender: Arc<dyn MulticastSender>,
) -> anyhow::Result<()> {
    let push = Arc::new(PushChannel::new(store.clone(), sender.clone()));
    let state = Arc::new(AppState {
        push,
        store,
        sender,
        start_time: Instant::now(),
        config,
    });
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
