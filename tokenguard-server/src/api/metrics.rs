use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

pub async fn get_metrics() -> Response {
    match tokenguard_core::metrics::render() {
        Some(body) => {
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body)
                .into_response()
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
