use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use ddalkkak_core::pipeline::RunLock;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const DATA_CACHE: &str = "public, max-age=300";
const ASSET_CACHE: &str = "public, max-age=31536000";

#[derive(Debug, Clone)]
pub struct AppState {
    pub started: Instant,
    pub environment: String,
    pub refresh_lock: RunLock,
}

impl AppState {
    pub fn new(environment: impl Into<String>, refresh_lock: RunLock) -> Self {
        Self {
            started: Instant::now(),
            environment: environment.into(),
            refresh_lock,
        }
    }
}

/// Health endpoint plus the built bundle. Unknown paths fall back to
/// `index.html` so client-side routes resolve.
pub fn router(state: AppState, build_dir: &Path) -> Router {
    let bundle =
        ServeDir::new(build_dir).fallback(ServeFile::new(build_dir.join("index.html")));

    Router::new()
        .route("/health", get(health))
        .fallback_service(bundle)
        .layer(middleware::from_fn(cache_control))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(access_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    timestamp: String,
    uptime_secs: u64,
    environment: String,
    version: &'static str,
    data_refresh_running: bool,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "OK",
        timestamp: Utc::now().to_rfc3339(),
        uptime_secs: state.started.elapsed().as_secs(),
        environment: state.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
        data_refresh_running: state.refresh_lock.is_running(),
    })
}

async fn cache_control(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let mut res = next.run(req).await;

    if path == "/health" || res.headers().contains_key(header::CACHE_CONTROL) {
        return res;
    }

    let is_html = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));

    let policy = if is_html || path.ends_with(".html") {
        NO_CACHE
    } else if path.ends_with(".json") {
        DATA_CACHE
    } else {
        ASSET_CACHE
    };
    res.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(policy));
    res
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let t0 = Instant::now();

    let res = next.run(req).await;

    let status = res.status();
    let elapsed_ms = t0.elapsed().as_millis();
    if status.is_server_error() {
        tracing::error!(%method, %uri, status = status.as_u16(), elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %uri, status = status.as_u16(), elapsed_ms, "request rejected");
    } else {
        tracing::info!(%method, %uri, status = status.as_u16(), elapsed_ms, "request served");
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    const INDEX: &str = "<!doctype html><html><head><title>app</title></head><body><div id=\"root\"></div></body></html>";

    fn bundle() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), INDEX).unwrap();
        std::fs::create_dir_all(dir.path().join("data/recommendations")).unwrap();
        std::fs::write(dir.path().join("data/metadata.json"), "{\"duration\":\"1.00s\"}").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('app');").unwrap();
        dir
    }

    async fn get(app: Router, uri: &str, gzip: bool) -> Response {
        let mut req = HttpRequest::builder().uri(uri);
        if gzip {
            req = req.header(header::ACCEPT_ENCODING, "gzip");
        }
        app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn header_str<'a>(res: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        res.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn app(dir: &Path) -> Router {
        router(AppState::new("test", RunLock::new()), dir)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = bundle();
        let res = get(app(dir.path()), "/health", false).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "OK");
        assert_eq!(v["environment"], "test");
        assert_eq!(v["dataRefreshRunning"], false);
    }

    #[tokio::test]
    async fn cache_policy_depends_on_file_kind() {
        let dir = bundle();

        let json = get(app(dir.path()), "/data/metadata.json", false).await;
        assert_eq!(json.status(), StatusCode::OK);
        assert_eq!(header_str(&json, header::CACHE_CONTROL), Some(DATA_CACHE));

        let js = get(app(dir.path()), "/app.js", false).await;
        assert_eq!(header_str(&js, header::CACHE_CONTROL), Some(ASSET_CACHE));

        let html = get(app(dir.path()), "/index.html", false).await;
        assert_eq!(header_str(&html, header::CACHE_CONTROL), Some(NO_CACHE));
    }

    #[tokio::test]
    async fn unknown_routes_fall_back_to_index() {
        let dir = bundle();
        let res = get(app(dir.path()), "/stocks/AAPL", false).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, header::CACHE_CONTROL), Some(NO_CACHE));

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, INDEX.as_bytes());
    }

    #[tokio::test]
    async fn security_headers_on_every_response() {
        let dir = bundle();
        for uri in ["/health", "/app.js", "/anything"] {
            let res = get(app(dir.path()), uri, false).await;
            assert_eq!(header_str(&res, header::X_FRAME_OPTIONS), Some("SAMEORIGIN"));
            assert_eq!(header_str(&res, header::X_CONTENT_TYPE_OPTIONS), Some("nosniff"));
            assert_eq!(
                header_str(&res, header::REFERRER_POLICY),
                Some("strict-origin-when-cross-origin")
            );
            assert!(header_str(&res, header::STRICT_TRANSPORT_SECURITY).is_some());
        }
    }

    #[tokio::test]
    async fn compresses_when_client_accepts_gzip() {
        let dir = bundle();
        let res = get(app(dir.path()), "/index.html", true).await;
        assert_eq!(header_str(&res, header::CONTENT_ENCODING), Some("gzip"));
    }
}
