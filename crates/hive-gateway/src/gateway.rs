//! Gateway main structure
//!
//! Owns the shared state, builds the axum router (WebSocket upgrade plus the
//! plain HTTP routes) and runs the server until the shutdown signal fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use hive_channels::ConversationRunner;
use hive_session::SessionStore;

use crate::connection::{serve_connection, ConnectionRole};
use crate::http;
use crate::methods::MethodRegistry;
use crate::state::GatewayState;

/// Runtime settings of the gateway. The server builds these from the
/// config file's `gateway` and `sessions` sections.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    /// Pass-through token required on upgrade when set
    pub token: Option<String>,
    /// Outbound frames buffered per connection before it counts as slow
    pub queue_capacity: usize,
    pub max_connections: usize,
    /// Sessions idle longer than this are evicted. `None` keeps them forever.
    pub idle_ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            token: None,
            queue_capacity: 256,
            max_connections: 1024,
            idle_ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl GatewaySettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State every axum handler receives
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gateway: Arc<GatewayState>,
    pub(crate) methods: Arc<MethodRegistry>,
}

/// The main Gateway server
pub struct Gateway {
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.state.config)
            .field("methods", &self.methods.method_names())
            .finish()
    }
}

impl Gateway {
    /// Create the gateway and start its Hub. Must run inside a Tokio runtime.
    pub fn new(config: GatewaySettings, runner: ConversationRunner) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, runner)),
            methods: Arc::new(MethodRegistry::new()),
        }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.state.store
    }

    /// Build the router: `/ws` upgrade plus the `/api` routes
    pub fn router(&self) -> Router {
        let app_state = AppState {
            gateway: Arc::clone(&self.state),
            methods: Arc::clone(&self.methods),
        };

        Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .merge(http::routes())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(app_state)
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener. When `shutdown` resolves the
    /// server stops accepting and the Hub closes every connection.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            "Gateway listening on ws://{}/ws ({} methods registered)",
            addr,
            self.methods.method_names().len()
        );

        let sweeper = CancellationToken::new();
        if let Some(ttl) = self.state.config.idle_ttl {
            tokio::spawn(sweep_idle_sessions(
                Arc::clone(&self.state.store),
                ttl,
                self.state.config.sweep_interval,
                sweeper.clone(),
            ));
        }

        let hub = self.state.hub.clone();
        let app = self.router();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown requested, closing connections");
                hub.shutdown().await;
            })
            .await;

        sweeper.cancel();
        info!("Gateway stopped");
        Ok(result?)
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
    role: Option<String>,
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(app): State<AppState>,
) -> Response {
    if !token_matches(
        app.gateway.config.token.as_deref(),
        query.token.as_deref(),
        &headers,
    ) {
        warn!("rejecting upgrade with invalid token");
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }

    if app.gateway.hub.connection_count().await >= app.gateway.config.max_connections {
        warn!("rejecting upgrade, gateway at capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "gateway at capacity").into_response();
    }

    let role = ConnectionRole::from_query(query.role.as_deref());
    debug!(role = role.as_str(), "upgrading connection");
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        serve_connection(sink, stream, role, app.gateway, app.methods).await;
    })
}

/// No configured token admits everyone. Otherwise the query parameter or
/// the bearer header must match.
fn token_matches(expected: Option<&str>, query: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    if query == Some(expected) {
        return true;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

async fn sweep_idle_sessions(
    store: Arc<SessionStore>,
    ttl: Duration,
    every: Duration,
    stop: CancellationToken,
) {
    let Ok(max_idle) = chrono::Duration::from_std(ttl) else {
        warn!(?ttl, "idle ttl out of range, eviction disabled");
        return;
    };

    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let pruned = store.prune_idle(max_idle);
                if pruned > 0 {
                    info!(pruned, remaining = store.len(), "evicted idle sessions");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_token_matches() {
        let empty = HeaderMap::new();
        assert!(token_matches(None, None, &empty));
        assert!(token_matches(None, Some("anything"), &empty));

        assert!(token_matches(Some("s3cret"), Some("s3cret"), &empty));
        assert!(token_matches(Some("s3cret"), None, &bearer("s3cret")));
        assert!(!token_matches(Some("s3cret"), None, &empty));
        assert!(!token_matches(Some("s3cret"), Some("wrong"), &empty));
        assert!(!token_matches(Some("s3cret"), None, &bearer("wrong")));
    }

    #[test]
    fn test_default_config() {
        let config = GatewaySettings::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert!(config.token.is_none());
        assert!(config.idle_ttl.is_none());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let store = Arc::new(SessionStore::new());
        store.create("stale");
        let stop = CancellationToken::new();

        let task = tokio::spawn(sweep_idle_sessions(
            Arc::clone(&store),
            Duration::ZERO,
            Duration::from_secs(1),
            stop.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(store.is_empty());

        stop.cancel();
        task.await.unwrap();
    }
}
