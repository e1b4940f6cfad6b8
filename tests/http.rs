//! Wire-format tests for `HttpRemoteService` against a mock server.

use std::sync::Arc;

use batch_convert::{
    ConversionOrchestrator, ConversionTask, ConvertRequest, ConverterConfig, ConverterError,
    ConverterSession, FileSelection, HttpRemoteService, RawFile, RemoteArtifact, RemoteFailure,
    RemoteService, ResultRetriever, RetrievalError, StagedFile, TaskStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ConverterConfig {
    ConverterConfig::builder()
        .base_url(server.uri())
        .request_timeout_secs(5)
        .download_timeout_secs(5)
        .build()
        .unwrap()
}

fn service_for(config: &ConverterConfig) -> Arc<HttpRemoteService> {
    Arc::new(HttpRemoteService::new(config).unwrap())
}

fn staged(name: &str, content: &[u8]) -> (FileSelection, StagedFile) {
    let mut selection = FileSelection::new();
    let file = selection
        .add(vec![RawFile::new(name, content.to_vec(), None)])
        .remove(0);
    (selection, file)
}

async fn mount_upload_and_convert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": "abc",
            "original_name": "report.docx",
            "file_path": "../uploads/abc.docx",
            "file_size": 8,
            "file_type": "docx"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "converted_file_id": "abc",
            "converted_filename": "report_converted.pdf",
            "download_url": "/download/abc_report_converted.pdf"
        })))
        .mount(server)
        .await;
}

async fn converted_task(server: &MockServer, config: &ConverterConfig) -> ConversionTask {
    mount_upload_and_convert(server).await;
    let (_selection, file) = staged("report.docx", b"PK\x03\x04docx");
    let report = ConversionOrchestrator::new(service_for(config))
        .convert_all_collect(std::slice::from_ref(&file), "pdf")
        .await
        .unwrap();
    let task = report.registry.get(&file.id).unwrap().clone();
    assert_eq!(task.status(), TaskStatus::Completed);
    task
}

// ── Upload / convert ─────────────────────────────────────────────────────

#[tokio::test]
async fn upload_sends_multipart_file_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"report.docx\""))
        .and(body_string_contains("docx-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": "abc",
            "original_name": "report.docx",
            "file_path": "../uploads/abc.docx",
            "file_size": 10,
            "file_type": "docx"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&config_for(&server));
    let (_selection, file) = staged("report.docx", b"docx-bytes");
    let receipt = service.upload(&file).await.expect("upload ok");

    assert_eq!(receipt.file_id, "abc");
    assert_eq!(receipt.file_size, Some(10));
    assert_eq!(receipt.file_type.as_deref(), Some("docx"));
}

#[tokio::test]
async fn upload_error_uses_detail_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "File type not supported" })),
        )
        .mount(&server)
        .await;

    let service = service_for(&config_for(&server));
    let (_selection, file) = staged("archive.docx", b"x");
    let err = service.upload(&file).await.unwrap_err();

    assert_eq!(err.kind, RemoteFailure::Status(400));
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.info.message, "File type not supported");
}

#[tokio::test]
async fn convert_posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert"))
        .and(body_json(json!({
            "file_id": "abc",
            "target_format": "pdf",
            "original_name": "report.docx"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "converted_file_id": "abc",
            "converted_filename": "report_converted.pdf",
            "download_url": "/download/abc_report_converted.pdf"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&config_for(&server));
    let artifact = service
        .convert(&ConvertRequest {
            file_id: "abc".into(),
            target_format: "pdf".into(),
            original_name: "report.docx".into(),
        })
        .await
        .expect("convert ok");

    assert_eq!(
        artifact,
        RemoteArtifact {
            converted_file_id: "abc".into(),
            converted_filename: "report_converted.pdf".into(),
        }
    );
}

#[tokio::test]
async fn structured_detail_falls_back_and_keeps_payload() {
    let server = MockServer::start().await;
    let payload = json!({ "detail": [{ "loc": ["body", "file_id"], "msg": "field required" }] });
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(ResponseTemplate::new(422).set_body_json(payload.clone()))
        .mount(&server)
        .await;

    let service = service_for(&config_for(&server));
    let err = service
        .convert(&ConvertRequest {
            file_id: String::new(),
            target_format: "pdf".into(),
            original_name: "a.docx".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert!(err.info.message.starts_with("Conversion failed"));
    assert_eq!(err.info.raw, Some(payload));
}

#[tokio::test]
async fn convert_failure_in_batch_marks_task_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "file_id": "n1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({ "detail": "Conversion failed: unsupported encoding" })),
        )
        .mount(&server)
        .await;

    let (_selection, file) = staged("notes.txt", b"hello");
    let report = ConversionOrchestrator::new(service_for(&config_for(&server)))
        .convert_all_collect(std::slice::from_ref(&file), "pdf")
        .await
        .unwrap();

    let task = report.registry.get(&file.id).unwrap();
    assert_eq!(task.status(), TaskStatus::Error);
    assert_eq!(
        task.error().unwrap().message,
        "Conversion failed: unsupported encoding"
    );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let config = ConverterConfig::builder()
        .base_url("http://127.0.0.1:1")
        .connect_timeout_secs(2)
        .build()
        .unwrap();
    let service = service_for(&config);
    let (_selection, file) = staged("a.docx", b"x");

    let err = service.upload(&file).await.unwrap_err();
    assert!(matches!(err.kind, RemoteFailure::Network | RemoteFailure::Timeout));
    assert!(err.info.message.starts_with("Upload failed"));
}

// ── Download ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_saves_validated_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/abc_report_converted.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(&b"%PDF-1.7"[..], "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;
    let config = config_for(&server);
    let task = converted_task(&server, &config).await;

    let dir = tempfile::tempdir().unwrap();
    let path = ResultRetriever::new(service_for(&config), &config)
        .retrieve_to_dir(&task, dir.path())
        .await
        .expect("download ok");

    assert_eq!(path, dir.path().join("report_converted.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
}

#[tokio::test]
async fn download_404_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/abc_report_converted.pdf"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "File not found" })))
        .mount(&server)
        .await;
    let config = config_for(&server);
    let task = converted_task(&server, &config).await;

    let err = ResultRetriever::new(service_for(&config), &config)
        .retrieve(&task)
        .await
        .unwrap_err();
    match err {
        RetrievalError::Status { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "File not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn download_with_non_200_success_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/abc_report_converted.pdf"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let config = config_for(&server);
    let task = converted_task(&server, &config).await;

    let err = ResultRetriever::new(service_for(&config), &config)
        .retrieve(&task)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Status { status: 204, .. }));
}

#[tokio::test]
async fn download_with_html_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/abc_report_converted.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    let config = config_for(&server);
    let task = converted_task(&server, &config).await;

    let err = ResultRetriever::new(service_for(&config), &config)
        .retrieve(&task)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::UnexpectedContentType { .. }));
}

#[tokio::test]
async fn download_over_limit_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/abc_report_converted.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 64], "application/pdf"))
        .mount(&server)
        .await;
    let config = ConverterConfig::builder()
        .base_url(server.uri())
        .max_download_bytes(8)
        .build()
        .unwrap();
    let task = converted_task(&server, &config).await;

    let err = ResultRetriever::new(service_for(&config), &config)
        .retrieve(&task)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::TooLarge { limit: 8, .. }));
}

// ── Auxiliary endpoints ──────────────────────────────────────────────────

#[tokio::test]
async fn supported_formats_are_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/supported-formats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "input_formats": ["docx", "txt", "pdf", "xlsx", "csv", "jpg", "jpeg", "png", "bmp"],
            "output_formats": ["docx", "txt", "pdf", "xlsx", "csv", "jpg", "jpeg", "png", "bmp"]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let session = ConverterSession::new(service_for(&config), &config);
    let formats = session.supported_formats().await.expect("formats ok");
    assert_eq!(formats.input_formats.len(), 9);
    assert!(formats.output_formats.contains(&"pdf".to_string()));
}

#[tokio::test]
async fn session_cleanup_deletes_server_files() {
    let server = MockServer::start().await;
    mount_upload_and_convert(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/cleanup/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Files cleaned up successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut session = ConverterSession::new(service_for(&config), &config);
    session.add_files(vec![RawFile::new("report.docx", b"PK".to_vec(), None)]);
    session.set_target_format("pdf");
    let stats = session.convert_all().await.unwrap();
    assert_eq!(stats.completed, 1);

    let id = session.tasks()[0].id().to_string();
    let report = session.cleanup(&id).await.expect("cleanup ok");
    assert!(report.success);
    assert_eq!(report.message, "Files cleaned up successfully");
}

#[tokio::test]
async fn session_cleanup_reports_server_side_failure() {
    let server = MockServer::start().await;
    mount_upload_and_convert(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/cleanup/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Error during cleanup: permission denied"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut session = ConverterSession::new(service_for(&config), &config);
    session.add_files(vec![RawFile::new("report.docx", b"PK".to_vec(), None)]);
    session.set_target_format("pdf");
    session.convert_all().await.unwrap();

    let id = session.tasks()[0].id().to_string();
    match session.cleanup(&id).await {
        Err(ConverterError::Remote(err)) => {
            assert_eq!(err.kind, RemoteFailure::Rejected);
            assert_eq!(err.info.message, "Error during cleanup: permission denied");
        }
        other => panic!("expected a rejected cleanup, got {other:?}"),
    }
}
