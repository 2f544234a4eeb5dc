#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests against a mock Ollama server and a real
// LanceDB index in a temporary directory

use chatpdf::ChatPdfError;
use chatpdf::config::{Config, OllamaConfig};
use chatpdf::pipeline::{IndexOrigin, NO_DOCUMENT_MESSAGE, Pipeline, PipelineState};
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const VOCABULARY: [&str; 3] = ["total", "weather", "appendix"];

/// Embeds every `input` string as a bag of vocabulary keywords
struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| {
                        let text = input.as_str().unwrap_or_default().to_lowercase();
                        let mut vector: Vec<f32> = VOCABULARY
                            .iter()
                            .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                            .collect();
                        vector.push(0.05);
                        vector
                    })
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "mistral", "stream": false })))
        .and(body_string_contains("The total is 42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "mistral",
            "response": "The total is 42.",
            "done": true
        })))
        .mount(&server)
        .await;

    server
}

fn config_for(server: &MockServer, base_dir: &Path) -> Config {
    let mut config = Config::with_base_dir(base_dir);
    config.ollama = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        ..OllamaConfig::default()
    };
    config
}

/// Write a PDF with one line of text per page
fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).expect("page count fits");
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf is written");
}

#[tokio::test]
async fn ingest_and_answer_with_ollama() {
    let server = mock_ollama().await;
    let dir = TempDir::new().expect("temp dir");
    let pdf = dir.path().join("report.pdf");
    write_pdf(
        &pdf,
        &[
            "The total is 42.",
            "The weather was sunny.",
            "Appendix with tables.",
        ],
    );

    let mut pipeline =
        Pipeline::with_ollama(config_for(&server, dir.path())).expect("pipeline builds");
    let report = pipeline.ingest(&pdf).await.expect("ingest succeeds");

    assert_eq!(report.pages, 3);
    assert_eq!(report.chunks, 3);
    assert_eq!(
        pipeline.state(),
        PipelineState::Ready {
            origin: IndexOrigin::Built,
            entries: 3
        }
    );

    let answer = pipeline.ask("What is the total?").await.expect("answer");
    assert_eq!(answer, "The total is 42.");
}

#[tokio::test]
async fn later_session_loads_without_the_pdf() {
    let server = mock_ollama().await;
    let dir = TempDir::new().expect("temp dir");
    let pdf = dir.path().join("report.pdf");
    write_pdf(&pdf, &["The total is 42.", "The weather was sunny."]);

    {
        let mut first =
            Pipeline::with_ollama(config_for(&server, dir.path())).expect("pipeline builds");
        first.ingest(&pdf).await.expect("ingest succeeds");
    }
    std::fs::remove_file(&pdf).expect("pdf removed");

    let mut second =
        Pipeline::with_ollama(config_for(&server, dir.path())).expect("pipeline builds");
    let state = second
        .open_or_ingest(Some(dir.path()))
        .await
        .expect("stored index is loaded");

    assert_eq!(
        state,
        PipelineState::Ready {
            origin: IndexOrigin::Loaded,
            entries: 2
        }
    );
    assert_eq!(
        second.ask("What is the total?").await.expect("answer"),
        "The total is 42."
    );
}

#[tokio::test]
async fn missing_index_and_no_document() {
    let server = mock_ollama().await;
    let dir = TempDir::new().expect("temp dir");
    let mut pipeline =
        Pipeline::with_ollama(config_for(&server, dir.path())).expect("pipeline builds");

    let result = pipeline.load_existing(&dir.path().join("missing_dir")).await;

    assert!(matches!(result, Err(ChatPdfError::StorageLoad(_))));
    assert_eq!(pipeline.state(), PipelineState::Empty);
    assert_eq!(
        pipeline.ask("What is the total?").await.expect("fallback"),
        NO_DOCUMENT_MESSAGE
    );
}

#[tokio::test]
async fn generation_error_surfaces_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "model is loading"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let pdf = dir.path().join("report.pdf");
    write_pdf(&pdf, &["The total is 42."]);

    let mut config = config_for(&server, dir.path());
    config.ollama.retry_attempts = 3;
    let mut pipeline = Pipeline::with_ollama(config).expect("pipeline builds");
    pipeline.ingest(&pdf).await.expect("ingest succeeds");

    let result = pipeline.ask("What is the total?").await;

    assert!(
        matches!(result, Err(ChatPdfError::Generation(ref msg)) if msg.contains("model is loading"))
    );
}

#[tokio::test]
async fn unreachable_ollama_fails_ingest() {
    let dir = TempDir::new().expect("temp dir");
    let pdf = dir.path().join("report.pdf");
    write_pdf(&pdf, &["The total is 42."]);

    let mut config = Config::with_base_dir(dir.path());
    config.ollama.host = "127.0.0.1".to_string();
    config.ollama.port = 9;
    let mut pipeline = Pipeline::with_ollama(config).expect("pipeline builds");

    let result = pipeline.ingest(&pdf).await;

    assert!(matches!(result, Err(ChatPdfError::Ingestion(_))));
    assert_eq!(pipeline.state(), PipelineState::Empty);
}
