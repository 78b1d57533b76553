use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Label for requests that matched no route, so probing random paths cannot
/// grow the label set.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Records request count and latency per method, route template and status.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = route_label(req.extensions().get::<MatchedPath>());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &route, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &route])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// `/api/v1/imports/{material_id}/status` rather than the concrete id.
fn route_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        let materials = Router::new().route("/{material_id}/status", get(|| async { "ok" }));
        Router::new()
            .nest("/api/v1/materials-metrics-test", materials)
            .layer(middleware::from_fn(metrics_middleware))
    }

    fn count(route: &str, status: &str) -> u64 {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", route, status])
            .get()
    }

    async fn get_status(uri: &str) -> StatusCode {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn requests_are_labelled_by_route_template() {
        let route = "/api/v1/materials-metrics-test/{material_id}/status";
        let before = count(route, "200");

        assert_eq!(
            get_status("/api/v1/materials-metrics-test/550e8400-e29b-41d4-a716-446655440000/status")
                .await,
            StatusCode::OK
        );
        assert_eq!(
            get_status("/api/v1/materials-metrics-test/not-a-uuid/status").await,
            StatusCode::OK
        );

        assert_eq!(count(route, "200"), before + 2);
    }

    #[tokio::test]
    async fn unknown_paths_share_one_label() {
        let before = count(UNMATCHED_ROUTE, "404");

        assert_eq!(get_status("/no/such/path/1").await, StatusCode::NOT_FOUND);
        assert_eq!(get_status("/no/such/path/2").await, StatusCode::NOT_FOUND);

        assert!(count(UNMATCHED_ROUTE, "404") >= before + 2);
        assert_eq!(count("/no/such/path/1", "404"), 0);
    }
}
