//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with reserved endpoints and the catch-all relay
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener with graceful shutdown
//! - Dispatch every other request: table → gate → router → relay
//! - Observability (metrics, correlation IDs)

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::auth::{
    handlers as auth_handlers, CookieSettings, CredentialVerifier, SessionGate, SessionStore,
    StaticCredentials,
};
use crate::config::ProxyConfig;
use crate::error::GatewayError;
use crate::http::relay::RelayClient;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::websocket::WebSocketRelay;
use crate::mapping::{JsonFileSource, MappingStore, RuleSource};
use crate::observability::metrics::{self, Outcome};
use crate::routing::{RouteDecision, Router as ProxyRouter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub store: Arc<MappingStore>,
    pub router: Arc<ProxyRouter>,
    pub sessions: Arc<SessionStore>,
    pub gate: SessionGate,
    pub cookies: Arc<CookieSettings>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub relay: RelayClient,
    pub websockets: WebSocketRelay,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        source: Arc<dyn RuleSource>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::from_config(&config.auth));
        Self {
            store: Arc::new(MappingStore::new(source)),
            router: Arc::new(ProxyRouter::from_config(&config.auth)),
            gate: SessionGate::new(config.auth.cookie_name.clone(), sessions.clone()),
            cookies: Arc::new(CookieSettings::from_config(&config.auth)),
            relay: RelayClient::new(&config),
            websockets: WebSocketRelay::new(&config),
            sessions,
            verifier,
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Server reading its table from `config.mappings.path` and checking
    /// credentials against `config.auth.users`.
    pub fn new(config: ProxyConfig) -> Self {
        let source = Arc::new(JsonFileSource::new(&config.mappings.path));
        Self::with_source(config, source)
    }

    /// Server over an injected rule source.
    pub fn with_source(config: ProxyConfig, source: Arc<dyn RuleSource>) -> Self {
        let verifier = Arc::new(StaticCredentials::from_config(&config.auth));
        Self::with_components(config, source, verifier)
    }

    pub fn with_components(
        config: ProxyConfig,
        source: Arc<dyn RuleSource>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let state = AppState::new(config, source, verifier);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let max_body_size = state.config.security.max_body_size;

        Router::new()
            .route("/health", get(auth_handlers::health))
            .route(
                "/login",
                get(auth_handlers::login_form).post(auth_handlers::login),
            )
            .route("/logout", get(auth_handlers::logout))
            .nest(admin::API_PREFIX, admin::admin_router(state.clone()))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get(&X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(RequestBodyLimitLayer::new(max_body_size)),
            )
    }

    /// Sessions issued by this server's login endpoint.
    pub fn sessions(&self) -> Arc<SessionStore> {
        self.state.sessions.clone()
    }

    pub fn store(&self) -> Arc<MappingStore> {
        self.state.store.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.state.config
    }

    /// The fully layered router, for embedding or in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mappings = %self.state.config.mappings.path,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: everything that is not a reserved endpoint.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts);

    let rules = state.store.list().await;
    let authenticated = state.gate.is_authenticated(&ctx);

    let (response, outcome) = match state.router.route(&ctx, &rules, authenticated) {
        RouteDecision::NotFound => {
            tracing::debug!(
                request_id = %ctx.request_id,
                host = %ctx.host,
                path = %ctx.path,
                "No rule matched"
            );
            (GatewayError::NoMatchingRule.into_response(), Outcome::NotFound)
        }
        RouteDecision::Redirect { location } => {
            tracing::debug!(request_id = %ctx.request_id, location = %location, "Login required");
            (
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Outcome::Redirected,
            )
        }
        RouteDecision::Allow(target) if ctx.upgrade => {
            match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
                Ok(upgrade) => match state.websockets.upgrade(upgrade, &ctx, &target).await {
                    Ok(response) => (response, Outcome::Upgraded),
                    Err(e) => (e.into_response(), Outcome::Failed),
                },
                Err(rejection) => (rejection.into_response(), Outcome::Failed),
            }
        }
        RouteDecision::Allow(target) => match state.relay.forward(&ctx, &target, body).await {
            Ok(response) => (response, Outcome::Relayed),
            Err(e) => (e.into_response(), Outcome::Failed),
        },
    };

    let status = response.status();
    metrics::record_request(ctx.method.as_str(), status.as_u16(), outcome, start);
    tracing::debug!(
        request_id = %ctx.request_id,
        host = %ctx.host,
        path = %ctx.raw_path,
        status = %status,
        outcome = outcome.as_str(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request dispatched"
    );
    response
}
