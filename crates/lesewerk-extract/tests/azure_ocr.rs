// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Azure Document Intelligence client against a mock analyze endpoint.

use std::time::Duration;

use image::DynamicImage;
use lesewerk_core::config::OcrServiceConfig;
use lesewerk_core::error::LesewerkError;
use lesewerk_extract::{AzureDocumentOcr, OcrModel, RetryConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYZE_PATH: &str = "/formrecognizer/documentModels/prebuilt-document:analyze";
const OPERATION_PATH: &str = "/formrecognizer/documentModels/prebuilt-document/analyzeResults/op-1";

fn client(server: &MockServer, timeout_secs: u64) -> AzureDocumentOcr {
    let config = OcrServiceConfig {
        endpoint: Some(server.uri()),
        api_key: Some("ocr-key".into()),
        poll_interval_ms: 5,
        timeout_secs,
        ..OcrServiceConfig::default()
    };
    AzureDocumentOcr::new(&config).unwrap().with_retry(RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    })
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(ANALYZE_PATH))
        .and(query_param("api-version", "2023-07-31"))
        .and(header("Ocp-Apim-Subscription-Key", "ocr-key"))
        .and(header("content-type", "image/png"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Operation-Location", format!("{}{}", server.uri(), OPERATION_PATH)),
        )
        .mount(server)
        .await;
}

fn succeeded(pages: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "succeeded",
        "analyzeResult": {"pages": pages}
    }))
}

#[tokio::test]
async fn polls_until_succeeded_and_joins_all_lines() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(succeeded(json!([
            {"lines": [{"content": "ACME Corp"}, {"content": "Invoice 9"}]},
            {"lines": [{"content": "Page two"}]}
        ])))
        .mount(&server)
        .await;

    let text = client(&server, 30)
        .extract_text(&[DynamicImage::new_rgb8(8, 8)])
        .await
        .unwrap();
    assert_eq!(text, "ACME Corp Invoice 9 Page two");
}

#[tokio::test]
async fn one_block_per_image() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(succeeded(json!([{"lines": [{"content": "same"}]}])))
        .mount(&server)
        .await;

    let images = vec![DynamicImage::new_rgb8(8, 8), DynamicImage::new_rgb8(8, 8)];
    let text = client(&server, 30).extract_text(&images).await.unwrap();
    assert_eq!(text, "same\nsame");
}

#[tokio::test]
async fn failed_operation_is_an_ocr_error() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": {"code": "InvalidContent", "message": "corrupt image"}
        })))
        .mount(&server)
        .await;

    let err = client(&server, 30)
        .extract_text(&[DynamicImage::new_rgb8(8, 8)])
        .await
        .unwrap_err();
    assert!(matches!(err, LesewerkError::OcrError(msg) if msg.contains("InvalidContent")));
}

#[tokio::test]
async fn missing_operation_location_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let err = client(&server, 30)
        .extract_text(&[DynamicImage::new_rgb8(8, 8)])
        .await
        .unwrap_err();
    assert!(matches!(err, LesewerkError::OcrError(_)));
}

#[tokio::test]
async fn never_finishing_operation_times_out() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let config = OcrServiceConfig {
        endpoint: Some(server.uri()),
        api_key: Some("ocr-key".into()),
        poll_interval_ms: 200,
        timeout_secs: 0,
        ..OcrServiceConfig::default()
    };
    let err = AzureDocumentOcr::new(&config)
        .unwrap()
        .extract_text(&[DynamicImage::new_rgb8(8, 8)])
        .await
        .unwrap_err();
    assert!(matches!(err, LesewerkError::OcrError(msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn bad_key_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ANALYZE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 30)
        .extract_text(&[DynamicImage::new_rgb8(8, 8)])
        .await
        .unwrap_err();
    assert!(matches!(err, LesewerkError::Http { status: Some(401), .. }));
}
