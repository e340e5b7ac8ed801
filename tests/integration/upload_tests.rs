//! Upload tests: storage, task publishing, and failure handling.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};

use task_gateway::RouterConfig;

use super::test_utils::{token_for, upload_request, BrokerMode, MockBroker, Part, TestGateway};

#[tokio::test]
async fn test_upload_stores_file_and_queues_task() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");
    let content = b"%PDF-1.4 quarterly numbers";

    let request = upload_request(Some(&token), &[Part::file("report.pdf", content)]);
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["message"], "File uploaded and queued for processing");
    let task_id = body["task_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(task_id).is_ok());

    let files = gateway.stored_files();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), content);
    assert_eq!(files[0].extension().unwrap(), "pdf");

    let tasks = gateway.broker.published_to("task_queue");
    assert_eq!(tasks.len(), 1);

    let task = &tasks[0];
    assert!(task.queue_durable);
    assert!(task.persistent);
    assert_eq!(task.body["task_id"], task_id);
    assert_eq!(task.body["user_id"], "auth0|alice");
    assert_eq!(task.body["original_name"], "report.pdf");
    assert_eq!(task.body["status"], "pending");
    assert_eq!(
        Path::new(task.body["file_path"].as_str().unwrap()),
        files[0].as_path()
    );

    assert_eq!(gateway.broker.sessions_opened(), 1);
    assert_eq!(gateway.broker.sessions_closed(), 1);
}

#[tokio::test]
async fn test_stored_name_is_not_the_client_name() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::file("../../etc/passwd.txt", b"x")]);
    let (status, _) = gateway.send(request).await;

    assert_eq!(status, StatusCode::OK);
    let files = gateway.stored_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].parent().unwrap(), gateway.storage_dir.path());

    let stem = files[0].file_stem().unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(stem).is_ok());
    assert_eq!(files[0].extension().unwrap(), "txt");
}

#[tokio::test]
async fn test_file_without_extension() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::file("Makefile", b"all:")]);
    let (status, _) = gateway.send(request).await;

    assert_eq!(status, StatusCode::OK);
    let files = gateway.stored_files();
    assert_eq!(files.len(), 1);
    assert!(files[0].extension().is_none());
}

#[tokio::test]
async fn test_identical_uploads_get_distinct_tasks() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let mut task_ids = Vec::new();
    for _ in 0..2 {
        let request = upload_request(Some(&token), &[Part::file("same.csv", b"a,b\n1,2\n")]);
        let (status, body) = gateway.send(request).await;
        assert_eq!(status, StatusCode::OK);
        task_ids.push(body["task_id"].as_str().unwrap().to_string());
    }

    assert_ne!(task_ids[0], task_ids[1]);
    assert_eq!(gateway.stored_files().len(), 2);
    assert_eq!(gateway.broker.published_to("task_queue").len(), 2);
}

#[tokio::test]
async fn test_upload_ignores_extra_text_fields() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = upload_request(
        Some(&token),
        &[
            Part::text("description", "monthly export"),
            Part::file("export.json", b"{}"),
        ],
    );
    let (status, _) = gateway.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(gateway.stored_files().len(), 1);
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::text("description", "nothing")]);
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
    assert_eq!(body["code"], "missing_file");
    assert_eq!(gateway.broker.sessions_opened(), 0);
    assert!(gateway.stored_files().is_empty());
}

#[tokio::test]
async fn test_upload_that_is_not_multipart() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_multipart");
    assert_eq!(body["status"], 400);
    assert!(body["error"].is_string());
    assert_eq!(gateway.broker.sessions_opened(), 0);
    assert!(gateway.stored_files().is_empty());
}

#[tokio::test]
async fn test_upload_without_boundary() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from("--x--\r\n"))
        .unwrap();
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_multipart");
    assert_eq!(gateway.broker.sessions_opened(), 0);
}

#[tokio::test]
async fn test_upload_with_two_files() {
    let gateway = TestGateway::new();
    let token = token_for("auth0|alice");

    let request = upload_request(
        Some(&token),
        &[Part::file("a.txt", b"first"), Part::file("b.txt", b"second")],
    );
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "multiple_files");
    assert_eq!(gateway.broker.sessions_opened(), 0);
    assert!(gateway.stored_files().is_empty());
}

#[tokio::test]
async fn test_failed_publish_keeps_stored_file() {
    let gateway = TestGateway::with_broker(MockBroker::new(BrokerMode::RejectPublish));
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::file("data.bin", b"\x00\x01\x02")]);
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "broker_error");
    assert!(body.get("task_id").is_none());

    assert_eq!(gateway.stored_files().len(), 1);
    assert!(gateway.broker.published().is_empty());
    assert_eq!(gateway.broker.sessions_opened(), 1);
    assert_eq!(gateway.broker.sessions_closed(), 1);
}

#[tokio::test]
async fn test_unreachable_broker_on_upload() {
    let gateway = TestGateway::with_broker(MockBroker::new(BrokerMode::Unreachable));
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::file("data.bin", b"payload")]);
    let (status, _) = gateway.send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(gateway.stored_files().len(), 1);
}

#[tokio::test]
async fn test_task_queue_declared_non_durable_elsewhere() {
    let broker = MockBroker::new(BrokerMode::Healthy).with_queue("task_queue", false);
    let gateway = TestGateway::with_broker(broker);
    let token = token_for("auth0|alice");

    let request = upload_request(Some(&token), &[Part::file("data.bin", b"payload")]);
    let (status, _) = gateway.send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(gateway.broker.published().is_empty());
    assert_eq!(gateway.broker.sessions_closed(), 1);
}

#[tokio::test]
async fn test_upload_over_size_limit() {
    let gateway = TestGateway::with_config(RouterConfig::new().with_max_upload_bytes(1024));
    let token = token_for("auth0|alice");
    let content = vec![b'x'; 8 * 1024];

    let request = upload_request(Some(&token), &[Part::file("big.bin", &content)]);
    let (status, body) = gateway.send(request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "payload_too_large");
    assert_eq!(gateway.broker.sessions_opened(), 0);
    assert!(gateway.stored_files().is_empty());
}
