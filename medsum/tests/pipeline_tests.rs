use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use medsum::config::{
    Config, DictaConfig, LlmConfig, OcrConfig, ProcessingConfig, ReconcilerConfig,
};
use medsum::models::Stage;
use medsum::{Pipeline, ProcessOptions};

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ],
        "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
}

fn test_png() -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(200, 200);
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

/// A config wired entirely to mock servers: Dicta as the only OCR
/// engine, an OpenAI-compatible mock as the LLM.
fn test_config(ocr_base_url: String, llm_base_url: String) -> Config {
    Config {
        ocr: OcrConfig {
            engines: vec!["dicta".to_string()],
            languages: "heb+eng".to_string(),
            timeout_secs: 5,
            max_image_dimension: 4096,
            min_image_dimension: 50,
        },
        dicta: DictaConfig {
            base_url: ocr_base_url,
            timeout_secs: 5,
        },
        abbyy: None,
        vision: None,
        llm: Some(LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(llm_base_url),
            timeout_secs: 5,
            max_retries: 0,
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            stop: vec!["Text to summarize:".to_string()],
            context_budget_chars: 32768,
        }),
        reconciler: ReconcilerConfig {
            min_text_chars: 10,
            escalation_threshold: 100,
        },
        processing: ProcessingConfig {
            max_chunk_chars: 4000,
        },
    }
}

const HEBREW_PAGE: &str = "שלום עולם. המטופל בן 47, נגר במקצועו, סובל מכאבי גב תחתון לאחר תאונת עבודה.";

#[tokio::test]
async fn document_flows_from_bytes_to_summary() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ocr/heb"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": HEBREW_PAGE })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("סיכום רפואי תעסוקתי של המסמך.")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    let pipeline = Pipeline::new(&config);

    let report = pipeline
        .process(&test_png(), "scan.png", &ProcessOptions::default(), None)
        .await;

    assert!(report.success, "error: {:?}", report.error);
    assert_eq!(report.stage, Stage::Done);
    assert_eq!(report.pages.len(), 1);

    assert!(report.pages[0].succeeded);
    assert_eq!(report.pages[0].text.provenance, vec!["dicta"]);
    assert_eq!(report.text.as_deref(), Some(HEBREW_PAGE));

    let summary = report.summary.expect("summary should be present");
    assert_eq!(summary.chunk_count, 1);
    assert!(!summary.partial);
    assert_eq!(summary.summary, "סיכום רפואי תעסוקתי של המסמך.");
}

#[tokio::test]
async fn total_ocr_failure_fails_the_document_with_detail() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ocr/heb"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&mock_server)
        .await;

    let config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    let pipeline = Pipeline::new(&config);

    let report = pipeline
        .process(&test_png(), "scan.png", &ProcessOptions::default(), None)
        .await;

    assert!(!report.success);
    assert_eq!(report.stage, Stage::OcrReconciled);
    let error = report.error.expect("failure must carry detail");
    assert!(error.contains("dicta"), "per-engine detail preserved: {error}");
    assert_eq!(report.pages.len(), 1);
    assert!(!report.pages[0].succeeded);
    assert!(
        report.pages[0].text.no_text_detected,
        "failed page carries the no-text marker"
    );
    assert!(report.summary.is_none());
}

#[tokio::test]
async fn undecodable_bytes_fail_at_decode_stage() {
    let mock_server = MockServer::start().await;
    let config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    let pipeline = Pipeline::new(&config);

    let report = pipeline
        .process(b"not an image at all", "scan.jpg", &ProcessOptions::default(), None)
        .await;

    assert!(!report.success);
    assert_eq!(report.stage, Stage::Decoded);
    assert!(report.summary.is_none());
}

#[tokio::test]
async fn requesting_unknown_engine_fails_ocr_stage() {
    let mock_server = MockServer::start().await;
    let config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    let pipeline = Pipeline::new(&config);

    let options = ProcessOptions {
        engines: Some(vec!["nonexistent".to_string()]),
        ..Default::default()
    };
    let report = pipeline
        .process(&test_png(), "scan.png", &options, None)
        .await;

    assert!(!report.success);
    assert_eq!(report.stage, Stage::OcrReconciled);
}

#[tokio::test]
async fn batch_isolates_bad_documents_and_summarizes_the_rest() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ocr/heb"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": HEBREW_PAGE })),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("Combined case summary.")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    let pipeline = Pipeline::new(&config);

    let documents = vec![
        (test_png(), "first.png".to_string()),
        (b"garbage".to_vec(), "broken.png".to_string()),
        (test_png(), "second.png".to_string()),
    ];

    let report = pipeline
        .process_many(&documents, &ProcessOptions::default(), None)
        .await;

    assert!(report.success);
    assert_eq!(report.documents.len(), 3);
    assert!(report.documents[0].success);
    assert!(!report.documents[1].success, "bad scan is isolated");
    assert_eq!(report.documents[1].stage, Stage::Decoded);
    assert!(report.documents[2].success);

    let summary = report.summary.expect("combined summary should exist");
    assert_eq!(summary.summary, "Combined case summary.");
}

#[tokio::test]
async fn llm_unavailable_keeps_ocr_text_but_fails_summarization() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ocr/heb"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": HEBREW_PAGE })),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config(
        format!("{}/api/ocr/heb", mock_server.uri()),
        mock_server.uri(),
    );
    config.llm = None;
    let pipeline = Pipeline::new(&config);

    let report = pipeline
        .process(&test_png(), "scan.png", &ProcessOptions::default(), None)
        .await;

    assert!(!report.success);
    assert_eq!(report.stage, Stage::Summarizing);
    // The caller still gets the reconciled text.
    assert_eq!(report.text.as_deref(), Some(HEBREW_PAGE));
    assert!(report.summary.is_none());
}
