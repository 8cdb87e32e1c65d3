//! HTTP router.
//!
//! `/` serves the browser form; JSON endpoints are nested under `/api/`.
//! Every `/api` response carries `Cache-Control: no-store` since report
//! bodies contain patient data.
//!
//! NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::core_state::AppContext;

/// Build the report service router.
pub fn report_router(ctx: Arc<AppContext>) -> Router {
    let upload_limit = ctx.config().server.max_upload_bytes;

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/reports", post(endpoints::reports::create))
        .route("/reports/:file", get(endpoints::reports::download))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .route("/", get(endpoints::form::page))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::ReportConfig;
    use crate::hardware::InferenceDevice;
    use crate::pipeline::preprocess::tests::png_bytes;
    use crate::pipeline::{MockImageEmbedder, ScriptedGenerator};

    const BOUNDARY: &str = "cxrTestBoundary7MA4YWxk";

    fn test_app(root: &std::path::Path) -> Router {
        let ctx = AppContext::for_tests(root, ScriptedGenerator::new("no focal consolidation\nheart size normal"));
        report_router(Arc::new(ctx))
    }

    /// Hand-built multipart/form-data body.
    fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"xray\"; filename=\"chest.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_report(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/reports")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn form_page_served() {
        let tmp = tempfile::tempdir().unwrap();
        let response = test_app(tmp.path()).oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("name=\"xray\""));
        assert!(html.contains("/api/reports"));
    }

    #[tokio::test]
    async fn health_reports_device_and_top_k() {
        let tmp = tempfile::tempdir().unwrap();
        let response = test_app(tmp.path()).oneshot(get_request("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["device"], "cpu");
        assert_eq!(json["top_k"], 32);
        assert_eq!(json["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn create_report_then_download() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_app(tmp.path());
        let png = png_bytes(64, 64, [90, 90, 90]);
        let body = multipart_body(
            &[("name", "Jane Roe"), ("referred_by", "Dr. Smith"), ("date_taken", "2026-10-01")],
            Some(&png),
        );

        let response = app.clone().oneshot(post_report(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        let json = json_body(response).await;
        assert_eq!(json["findings"], "• No focal consolidation.\n• Heart size normal.");
        assert_eq!(json["prompt"].as_str().unwrap().split(' ').count(), 32);

        let url = json["download_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/api/reports/report_"));
        assert!(url.ends_with(".pdf"));

        let response = app.oneshot(get_request(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/pdf");
        let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.to_str().unwrap().starts_with("attachment; filename=\"report_"));
        let pdf = to_bytes(response.into_body(), 16 * 1024 * 1024).await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));

        let log = std::fs::read_to_string(tmp.path().join("report_logs.csv")).unwrap();
        assert!(log.lines().nth(1).unwrap().starts_with("Jane Roe,Dr. Smith,2026-10-01,"));
    }

    #[tokio::test]
    async fn missing_image_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let body = multipart_body(&[("name", "Jane")], None);
        let response = test_app(tmp.path()).oneshot(post_report(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn undecodable_image_is_422() {
        let tmp = tempfile::tempdir().unwrap();
        let body = multipart_body(&[], Some(&[0x5A; 512]));
        let response = test_app(tmp.path()).oneshot(post_report(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"]["code"], "IMAGE_INVALID");
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ReportConfig::default();
        config.paths.report_dir = tmp.path().join("reports");
        config.paths.log_csv = tmp.path().join("log.csv");
        config.server.max_upload_bytes = 1024;
        let ctx = AppContext::new(
            config,
            InferenceDevice::Cpu,
            Arc::new(MockImageEmbedder::default()),
            Arc::new(ScriptedGenerator::new("x")),
        )
        .unwrap();

        let body = multipart_body(&[], Some(&vec![0u8; 8 * 1024]));
        let response = report_router(Arc::new(ctx)).oneshot(post_report(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn download_rejects_unsafe_name() {
        let tmp = tempfile::tempdir().unwrap();
        let response = test_app(tmp.path())
            .oneshot(get_request("/api/reports/report_1_img.jpg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_missing_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let response = test_app(tmp.path())
            .oneshot(get_request("/api/reports/report_20000101_000000.pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let response = test_app(tmp.path()).oneshot(get_request("/api/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
