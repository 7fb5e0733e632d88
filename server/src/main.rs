//! portier-rp: demo relying party for a Portier-style identity broker
//!
//! Lightweight HTTP server using hyper. Users POST their email to `/login` and
//! are redirected to the broker; the broker POSTs an ID token back to `/verify`.

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portier_rp_core::config::{Config, KEY_CACHE_TTL_SECS};
use portier_rp_core::error::{ApiError, ErrorResponse};
use portier_rp_core::login;
use portier_rp_core::nonce::NonceRegistry;

mod platform;

use platform::{MokaCache, ProcessEnv, ReqwestHttpClient, SystemClock};

/// Largest form body accepted on /login and /verify
const MAX_FORM_BYTES: usize = 64 * 1024;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Shared application state
struct AppState {
    config: Config,
    nonces: NonceRegistry,
    cache: MokaCache,
    http: ReqwestHttpClient,
    clock: SystemClock,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portier_rp=info,portier_rp_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env(&ProcessEnv)?;

    let listen_addr = match std::env::var("LISTEN_ADDR") {
        Ok(addr) => addr,
        Err(_) => listen_addr_from_origin(&config.rp_origin)?,
    };

    let timeout_secs = match std::env::var("HTTP_TIMEOUT_SECS") {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a number"))?,
        Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
    };

    tracing::info!(
        broker = %config.broker_origin,
        rp = %config.rp_origin,
        "starting relying party"
    );

    let state = Arc::new(AppState {
        config,
        nonces: NonceRegistry::new(),
        cache: MokaCache::new(Duration::from_secs(KEY_CACHE_TTL_SECS)),
        http: ReqwestHttpClient::new(Duration::from_secs(timeout_secs))?,
        clock: SystemClock,
    });

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let state = state.clone();

        tokio::spawn(async move {
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, &state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

type HyperResponse = Response<Full<Bytes>>;

async fn handle_request(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<HyperResponse, std::convert::Infallible> {
    let result = route_request(req, state).await;
    Ok(result)
}

async fn route_request(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, "/") => handle_health(),
        (Method::POST, "/login") => handle_login(req, state).await,
        (Method::POST, "/verify") => handle_verify(req, state).await,
        _ => json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "not_found"})),
    }
}

fn handle_health() -> HyperResponse {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "name": "portier-rp",
            "login": "POST /login (email)",
            "verify": "POST /verify (id_token)"
        }),
    )
}

async fn handle_login(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let email = match read_form_field(req, "email").await {
        Ok(email) => email,
        Err(e) => return error_response(&e),
    };

    match login::start::handle(&email, &state.config, &state.nonces, &state.clock) {
        Ok(location) => redirect_response(&location),
        Err(e) => error_response(&e),
    }
}

async fn handle_verify(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let id_token = match read_form_field(req, "id_token").await {
        Ok(token) => token,
        Err(e) => return error_response(&e),
    };

    match login::verify::handle(
        &id_token,
        &state.config,
        &state.nonces,
        &state.cache,
        &state.http,
        &state.clock,
    )
    .await
    {
        Ok(identity) => json_response(
            StatusCode::OK,
            &serde_json::json!({"email": identity.email}),
        ),
        Err(e) => error_response(&e),
    }
}

/// Read one field from an `application/x-www-form-urlencoded` body
async fn read_form_field(req: Request<Incoming>, name: &str) -> Result<String, ApiError> {
    let body = Limited::new(req.into_body(), MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|_| ApiError::invalid_request("failed to read body"))?
        .to_bytes();

    form_field(&body, name)
}

fn form_field(body: &[u8], name: &str) -> Result<String, ApiError> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| ApiError::invalid_request(format!("missing form field: {}", name)))
}

/// Derive a bind address from the relying party's own origin
fn listen_addr_from_origin(origin: &str) -> Result<String, ApiError> {
    let url = url::Url::parse(origin)
        .map_err(|e| ApiError::internal(format!("RP_ORIGIN is not a valid URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ApiError::internal("RP_ORIGIN has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ApiError::internal("RP_ORIGIN has no port"))?;

    Ok(format!("{}:{}", host, port))
}

fn error_response(err: &ApiError) -> HyperResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse::from(err);
    json_response(status, &body)
}

fn redirect_response(location: &str) -> HyperResponse {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback_response())
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let json = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| fallback_response())
}

fn fallback_response() -> HyperResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_field() {
        let body = b"email=alice%40example.com&other=1";
        assert_eq!(form_field(body, "email").unwrap(), "alice@example.com");
        assert!(form_field(body, "id_token").is_err());
    }

    #[test]
    fn test_listen_addr_from_origin() {
        assert_eq!(
            listen_addr_from_origin("http://localhost:8000").unwrap(),
            "localhost:8000"
        );
        assert_eq!(
            listen_addr_from_origin("https://rp.example").unwrap(),
            "rp.example:443"
        );
        assert!(listen_addr_from_origin("not a url").is_err());
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(&ApiError::Nonce);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = error_response(&ApiError::internal("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_redirect_response() {
        let response = redirect_response("https://broker.example/auth?nonce=abc");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[LOCATION],
            "https://broker.example/auth?nonce=abc"
        );
    }
}
