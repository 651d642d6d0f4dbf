//! Web server setup and routing

use anyhow::Result;
use axum::{
    response::Html,
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;
use crate::ws;

/// The component page
const INDEX_HTML: &str = include_str!("../web/index.html");

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        // API routes
        .route("/api/state", get(api::get_state))
        .route("/api/config", get(api::get_config))
        .route("/api/broker", put(api::update_broker))
        .route("/api/connect", post(api::connect))
        .route("/api/transform/{field}", put(api::set_field))
        .route("/api/apply", post(api::apply))
        .route("/api/reset", post(api::reset))
        .route("/api/tabs/show", post(api::show_tabs))
        .route("/api/tabs/close", post(api::close_tabs))
        .route("/api/tabs/select", post(api::select_tab))
        .route("/api/hotspot", post(api::hotspot))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // State
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Run the web server (HTTP or HTTPS depending on config) until `shutdown` resolves
pub async fn run<F>(
    state: Arc<AppState>,
    bind: &str,
    tls: Option<&TlsConfig>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config, shutdown).await
    } else {
        run_http(app, bind, shutdown).await
    }
}

/// Run plain HTTP server
async fn run_http<F>(app: Router, bind: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https<F>(app: Router, bind: &str, tls: &TlsConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    // Verify files exist
    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::FakeBroker;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use posecube_core::{ConnectionStatus, Snapshot};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<FakeBroker>) {
        let broker = Arc::new(FakeBroker::default());
        let (state, _task) = AppState::with_connector(Config::default(), broker.clone()).unwrap();
        (router(state), broker)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn snapshot(body: &[u8]) -> Snapshot {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let (app, _) = test_app();
        let (status, body) = send(&app, "GET", "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("Broker Interface"));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (app, _) = test_app();
        let (status, body) = send(&app, "GET", "/api/state", "").await;
        assert_eq!(status, StatusCode::OK);
        let state = snapshot(&body);
        assert_eq!(state.connection, ConnectionStatus::Disconnected);
        assert!(!state.display_visible);
        assert_eq!(
            state.transform_css,
            "rotateX(0deg) rotateY(0deg) rotateZ(0deg) translate3d(0px, 0px, 0px) scale3d(1, 1, 1)"
        );
    }

    #[tokio::test]
    async fn test_field_input_route() {
        let (app, _) = test_app();
        let (status, body) = send(&app, "PUT", "/api/transform/scaleX", r#"{"value":"abc"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot(&body).transform.scale_x, 0.0);

        let (status, body) = send(&app, "PUT", "/api/transform/yaw", r#"{"value":45}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot(&body).transform.yaw, 45.0);

        let (status, _) = send(&app, "PUT", "/api/transform/w", r#"{"value":"1"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connect_route() {
        let (app, broker) = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/connect",
            r#"{"url":"mqtt://broker.local","topic":"pose"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let state = snapshot(&body);
        assert_eq!(state.broker_url, "mqtt://broker.local");
        assert!(matches!(state.connection, ConnectionStatus::Connecting { .. }));
        assert_eq!(broker.opened.lock().unwrap().len(), 1);

        // No body reuses the stored fields
        let (status, _) = send(&app, "POST", "/api/connect", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(broker.closed.lock().unwrap().clone(), vec![0]);

        let (status, _) = send(&app, "POST", "/api/connect", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_apply_reset_and_tabs() {
        let (app, _) = test_app();
        let (_, body) = send(&app, "POST", "/api/tabs/show", "").await;
        assert!(!snapshot(&body).tabs_visible);

        let (_, body) = send(&app, "POST", "/api/apply", "").await;
        let state = snapshot(&body);
        assert!(state.display_visible);
        assert!(state.animating);

        let (_, body) = send(&app, "POST", "/api/tabs/show", "").await;
        assert!(snapshot(&body).tabs_visible);
        let (_, body) = send(&app, "POST", "/api/tabs/select", r#"{"tab":"transform"}"#).await;
        assert_eq!(snapshot(&body).selected_tab, Some(posecube_core::Tab::Transform));
        let (_, body) = send(&app, "POST", "/api/tabs/close", "").await;
        assert!(!snapshot(&body).tabs_visible);

        let (_, body) = send(&app, "POST", "/api/reset", "").await;
        let state = snapshot(&body);
        assert!(!state.animating);
        assert_eq!(state.transform, posecube_core::Transform::default());
    }

    #[tokio::test]
    async fn test_config_route() {
        let (app, _) = test_app();
        let (status, body) = send(&app, "GET", "/api/config", "").await;
        assert_eq!(status, StatusCode::OK);
        let config: Config = serde_json::from_slice(&body).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.animation.interval_ms, 1000);
        assert_eq!(config.hotspot.url, "http://localhost:5000/random-message");
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let (app, _) = test_app();
        // Valid JSON with the wrong shape
        let (status, _) = send(&app, "PUT", "/api/transform/roll", r#"{"value":null}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "POST", "/api/tabs/select", r#"{"tab":"settings"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "PUT", "/api/broker", r#"{"url":5}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        // Broken JSON
        let (status, _) = send(&app, "PUT", "/api/broker", "{url").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, "GET", "/api/state", "").await;
        assert_eq!(snapshot(&body).transform, posecube_core::Transform::default());
    }
}
