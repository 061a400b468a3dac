//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the plaintext and TLS routers around one shared handler
//! - Wire up middleware (request ID, tracing, security headers, timeout)
//! - Bind both listeners and serve until shutdown
//! - Dispatch requests: static files first, then route and pool

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::proxy::Forwarder;
use crate::http::request::{client_addr, original_host, request_id, MakeRequestUuidV4};
use crate::http::response::{bad_gateway, proxy_error};
use crate::http::static_files::StaticFiles;
use crate::lifecycle::Shutdown;
use crate::net::{TlsError, TlsPolicy};
use crate::observability::metrics;
use crate::routing::{RouteError, RouteTable};
use crate::security::forwarded::ForwardedProto;
use crate::security::headers::secure_response;
use crate::upstream::{PoolError, PoolRegistry};

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid routes: {0}")]
    Route(#[from] RouteError),

    #[error("invalid upstreams: {0}")]
    Pool(#[from] PoolError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub pools: Arc<PoolRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub static_files: Option<Arc<StaticFiles>>,
    pub proto: ForwardedProto,
}

/// Edge server: the plaintext listener plus the optional TLS listener.
pub struct EdgeServer {
    config: ProxyConfig,
    routes: Arc<RouteTable>,
    pools: Arc<PoolRegistry>,
    forwarder: Arc<Forwarder>,
    static_files: Option<Arc<StaticFiles>>,
    tls: Option<TlsPolicy>,
}

impl EdgeServer {
    /// Build every subsystem from a validated config.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);
        let pools = Arc::new(PoolRegistry::from_config(&config.upstreams)?);
        let forwarder = Arc::new(Forwarder::new(&config.timeouts, &config.security));
        let static_files = config
            .static_files
            .root
            .as_ref()
            .map(|root| Arc::new(StaticFiles::new(root)));
        let tls = config.tls.as_ref().map(TlsPolicy::from_config).transpose()?;

        if tls.is_some() && !config.listener.redirect_to_https {
            tracing::warn!(
                address = %config.listener.http_address,
                "Plaintext listener proxies requests instead of redirecting to HTTPS"
            );
        }

        tracing::info!(
            routes = routes.len(),
            pools = pools.pools().count(),
            static_root = ?config.static_files.root,
            tls = tls.is_some(),
            "Edge server initialized"
        );

        Ok(Self {
            config,
            routes,
            pools,
            forwarder,
            static_files,
            tls,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared endpoint health table.
    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    pub fn tls_policy(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref()
    }

    fn state(&self, proto: ForwardedProto) -> AppState {
        AppState {
            routes: Arc::clone(&self.routes),
            pools: Arc::clone(&self.pools),
            forwarder: Arc::clone(&self.forwarder),
            static_files: self.static_files.clone(),
            proto,
        }
    }

    /// Router for the plaintext listener.
    pub fn plaintext_router(&self) -> Router {
        if self.config.listener.redirect_to_https {
            return self.redirect_router();
        }
        self.with_layers(
            Router::new()
                .fallback(edge_handler)
                .with_state(self.state(ForwardedProto::Http)),
        )
    }

    /// Router for the TLS listener.
    pub fn tls_router(&self) -> Router {
        self.with_layers(
            Router::new()
                .fallback(edge_handler)
                .with_state(self.state(ForwardedProto::Https)),
        )
    }

    fn redirect_router(&self) -> Router {
        let https_port = self
            .config
            .listener
            .https_address
            .parse::<SocketAddr>()
            .map(|addr| addr.port())
            .unwrap_or(443);
        self.with_layers(Router::new().fallback(move |request: Request<Body>| async move {
            let (parts, _) = request.into_parts();
            https_redirect(&parts, https_port)
        }))
    }

    /// Middleware stack, innermost first.
    fn with_layers(&self, router: Router) -> Router {
        let router = match self.config.timeouts.request_secs {
            Some(secs) => router.layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(secs),
            )),
            None => router,
        };
        router
            .layer(middleware::map_response(secure_response))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// Bind the configured addresses and serve until shutdown.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), ServerError> {
        let http_address = self.config.listener.http_address.clone();
        let plaintext = TcpListener::bind(&http_address)
            .await
            .map_err(|source| ServerError::Bind {
                address: http_address,
                source,
            })?;

        let tls = match &self.tls {
            Some(_) => {
                let https_address = self.config.listener.https_address.clone();
                let listener = std::net::TcpListener::bind(&https_address).map_err(|source| {
                    ServerError::Bind {
                        address: https_address,
                        source,
                    }
                })?;
                Some(listener)
            }
            None => None,
        };

        self.serve(plaintext, tls, shutdown).await
    }

    /// Serve on already bound listeners.
    ///
    /// The TLS listener is only used when a TLS policy is configured.
    pub async fn serve(
        self,
        plaintext: TcpListener,
        tls: Option<std::net::TcpListener>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let plain = serve_plaintext(self.plaintext_router(), plaintext, shutdown.wait(), grace);

        match (self.tls.as_ref(), tls) {
            (Some(policy), Some(listener)) => {
                let secure = serve_tls(
                    self.tls_router(),
                    listener,
                    policy.rustls_config(),
                    shutdown.wait(),
                    grace,
                );
                tokio::try_join!(plain, secure)?;
            }
            (Some(_), None) => {
                tracing::warn!("TLS configured but no TLS listener supplied; serving plaintext only");
                plain.await?;
            }
            (None, _) => plain.await?,
        }

        Ok(())
    }
}

/// Serve the plaintext router; in-flight requests get `grace` to finish.
///
/// Connections still open when the grace period ends are abandoned.
pub async fn serve_plaintext(
    router: Router,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP listener starting");

    let (fired_tx, fired_rx) = oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = fired_tx.send(());
    };

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => result?,
        Ok(()) = fired_rx => {
            if tokio::time::timeout(grace, &mut serve).await.is_err() {
                tracing::warn!(
                    address = %addr,
                    grace = ?grace,
                    "Grace period elapsed with requests in flight"
                );
            }
        }
    }

    tracing::info!(address = %addr, "HTTP listener stopped");
    Ok(())
}

/// Serve the TLS router; in-flight requests get `grace` to finish.
pub async fn serve_tls(
    router: Router,
    listener: std::net::TcpListener,
    config: RustlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTPS listener starting");

    let handle = Handle::new();
    let trigger = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        trigger.graceful_shutdown(Some(grace));
    });

    axum_server::from_tcp_rustls(listener, config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!(address = %addr, "HTTPS listener stopped");
    Ok(())
}

/// Static lookup, then route and forward.
async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();

    if let Some(files) = &state.static_files {
        if let Some(response) = files.try_serve(&parts).await {
            metrics::record_request(state.proto.as_str(), "static", response.status().as_u16());
            return response;
        }
    }

    let route = state.routes.resolve(parts.uri.path());
    let request_id = request_id(&parts).to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        route = %route.name,
        pool = %route.pool,
        "Proxying request"
    );

    let response = match state.pools.get(&route.pool) {
        Some(pool) => {
            let client_ip = client_addr(&parts).map(|addr| addr.ip());
            state
                .forwarder
                .forward(&pool, parts, body, client_ip, state.proto)
                .await
        }
        None => {
            tracing::error!(request_id = %request_id, pool = %route.pool, "Route points at unknown pool");
            bad_gateway()
        }
    };

    tracing::debug!(
        request_id = %request_id,
        status = %response.status(),
        elapsed = ?start_time.elapsed(),
        "Request complete"
    );
    metrics::record_request(state.proto.as_str(), &route.name, response.status().as_u16());
    response
}

/// 301 to the same host and path on the HTTPS listener.
fn https_redirect(parts: &Parts, https_port: u16) -> Response {
    let Some(host) = original_host(parts) else {
        return proxy_error(StatusCode::BAD_REQUEST);
    };
    let Ok(host) = host.to_str() else {
        return proxy_error(StatusCode::BAD_REQUEST);
    };
    let path = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");

    let location = if https_port == 443 {
        format!("https://{host}{path}")
    } else {
        format!("https://{host}:{https_port}{path}")
    };
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}
