use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;
const TARGET: &str = "taskflow::http::response";

/// Correlation id for one request, taken from `x-request-id` when the caller
/// sent a usable one.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(RequestId(request_id));
    response
}

/// Logs 4xx/5xx responses with the [`ErrorReport`] the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let report = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .unwrap_or_else(|| ErrorReport::from_message("unknown", status, "no diagnostic available"));
    let failure = Failure {
        status,
        method: method.as_str(),
        path: &path,
        request_id: &request_id,
        elapsed_ms: start.elapsed().as_millis(),
        report: &report,
    };
    failure.log();

    response
}

struct Failure<'a> {
    status: StatusCode,
    method: &'a str,
    path: &'a str,
    request_id: &'a str,
    elapsed_ms: u128,
    report: &'a ErrorReport,
}

impl Failure<'_> {
    fn log(&self) {
        let detail = self.report.messages.first().map(String::as_str).unwrap_or("");
        let chain = &self.report.messages;

        if self.status.is_server_error() {
            error!(
                target = TARGET,
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                request_id = self.request_id,
                elapsed_ms = self.elapsed_ms as u64,
                source = self.report.source,
                detail,
                chain = ?chain,
                "request failed"
            );
        } else {
            warn!(
                target = TARGET,
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                request_id = self.request_id,
                elapsed_ms = self.elapsed_ms as u64,
                source = self.report.source,
                detail,
                chain = ?chain,
                "client request error"
            );
        }
    }
}
