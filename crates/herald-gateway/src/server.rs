//! Gateway HTTP server: publish endpoints and the Telegram webhook

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Result, bail};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use herald_core::{IncomingMessage, Publisher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::publish;

/// Shared state for all handlers
#[derive(Clone)]
pub struct GatewayState {
    pub publisher: Publisher,
    /// Parsed webhook updates go here, toward the command loop
    pub incoming: mpsc::Sender<IncomingMessage>,
    pub webhook_secret: Option<String>,
    pub start_time: Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
    webhook_path: String,
}

impl GatewayServer {
    /// Create a new gateway server.
    ///
    /// `webhook_path` is mounted at `/{webhook_path}` and must not collide with
    /// the publish routes.
    pub fn new(
        bind: SocketAddr,
        webhook_path: &str,
        publisher: Publisher,
        incoming: mpsc::Sender<IncomingMessage>,
        webhook_secret: Option<String>,
    ) -> Result<Self> {
        let webhook_path = webhook_path.trim_matches('/').to_string();
        if webhook_path.is_empty() || webhook_path == "send" || webhook_path == "sysinfo" {
            bail!("Invalid webhook path: {:?}", webhook_path);
        }

        let state = GatewayState {
            publisher,
            incoming,
            webhook_secret,
            start_time: Instant::now(),
        };
        Ok(Self {
            state,
            bind,
            webhook_path,
        })
    }

    /// Path the webhook is served on, with leading slash
    pub fn webhook_route(&self) -> String {
        format!("/{}", self.webhook_path)
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/sysinfo", get(sysinfo_handler))
            .route("/send", post(publish::publish_header_handler))
            .route("/send/{name}/{token}", post(publish::publish_body_handler))
            .route(
                "/send/{name}/{token}/{data}",
                get(publish::publish_path_handler),
            )
            .route(&self.webhook_route(), post(webhook_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server (blocks until `cancel` fires)
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

// ── HTTP Handlers ──

async fn index_handler() -> &'static str {
    "Hello World"
}

async fn sysinfo_handler(State(state): State<GatewayState>) -> String {
    format!(
        "Build: {}\nUptime: {}s",
        env!("CARGO_PKG_VERSION"),
        state.start_time.elapsed().as_secs()
    )
}

async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !auth::check_webhook_secret(state.webhook_secret.as_deref(), &headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let msg = match herald_channels::parse_update(&body) {
        Ok(Some(msg)) => msg,
        Ok(None) => return (StatusCode::OK, "OK"),
        Err(e) => {
            warn!("Webhook body decode failed: {:#}", e);
            debug!("Webhook body: {}", String::from_utf8_lossy(&body));
            return (StatusCode::INTERNAL_SERVER_ERROR, "request decode failed.");
        }
    };

    debug!("{}[{}] {}", msg.sender_id, msg.sender_name, msg.text);
    if state.incoming.send(msg).await.is_err() {
        error!("Command loop is gone, dropping webhook update");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "service unavailable, try again later",
        );
    }
    (StatusCode::OK, "OK")
}
