use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Clone, Debug)]
pub struct RequestTraceContext {
    pub trace_id: String,
}

/// Reuses the caller's `x-trace-id` or assigns a fresh one, and echoes it back.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let incoming = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);
    let trace_id = incoming.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::trace!(
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
        "Request received"
    );

    request.extensions_mut().insert(RequestTraceContext {
        trace_id: trace_id.clone(),
    });

    let header_value = HeaderValue::from_str(&trace_id).ok();
    if incoming.is_none() {
        if let Some(value) = header_value.clone() {
            request
                .headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
    }

    let mut response = next.run(request).await;

    if !response.headers().contains_key(TRACE_ID_HEADER) {
        if let Some(value) = header_value {
            response
                .headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
    }

    response
}
