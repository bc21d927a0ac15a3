pub mod api;

use crate::auth;
use crate::cli::Args;
use crate::relay::StreamRelay;
use axum::middleware;
use axum::routing::{ get, post };
use axum::Router;
use log::info;
use std::error::Error;
use std::net::SocketAddr;
use tower_http::cors::{ Any, CorsLayer };

#[derive(Clone)]
pub struct AppState {
    pub relay: StreamRelay,
    pub args: Args,
}

/// Assembles the full application router: auth endpoints, the two chat
/// endpoints, and the page routes the session guard redirects between.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/login", post(api::login_handler))
        .route("/api/auth/logout", post(api::logout_handler))
        .route("/api/chat", post(api::chat_handler))
        .route("/api/chat/stream", post(api::chat_stream_handler))
        .route("/", get(api::index_page))
        .route("/login", get(api::login_page))
        .layer(middleware::from_fn(auth::guard))
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    addr: String,
    state: AppState,
}

impl Server {
    pub fn new(addr: String, state: AppState) -> Self {
        Self { addr, state }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = router(self.state.clone());
        let args = &self.state.args;

        if args.enable_tls {
            let (cert, key) = match (args.tls_cert_path.as_deref(), args.tls_key_path.as_deref()) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err("TLS is enabled but TLS_CERT_PATH or TLS_KEY_PATH is not set".into());
                }
            };
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            info!("Listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}
