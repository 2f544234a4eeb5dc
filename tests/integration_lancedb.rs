#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB vector store with realistic data
use chatpdf::ChatPdfError;
use chatpdf::config::Config;
use chatpdf::database::{ChunkMetadata, EmbeddingRecord, VectorStore};
use chatpdf::embeddings::MetadataValue;
use chatpdf::retrieval::VectorIndex;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

// nomic-embed-text dimension
const DIMENSION: usize = 768;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::with_base_dir(temp_dir.path());
    (config, temp_dir)
}

/// A deterministic 768-dimensional vector that varies smoothly with `variation`
fn realistic_vector(variation: f32, content_len: usize) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| {
            let base = (i as f32).mul_add(0.01, variation).sin() * 0.1;
            (content_len as f32).mul_add(0.001, base)
        })
        .collect()
}

fn create_realistic_embedding_record(
    chunk_index: u32,
    page: u32,
    content: &str,
    vector_variation: f32,
) -> EmbeddingRecord {
    EmbeddingRecord {
        id: Uuid::new_v4().to_string(),
        vector: realistic_vector(vector_variation, content.len()),
        metadata: ChunkMetadata {
            content: content.to_string(),
            source: "/docs/annual-report.pdf".to_string(),
            page,
            offset: 0,
            chunk_index,
            metadata_json: format!(r#"{{"page":{},"source":"/docs/annual-report.pdf"}}"#, page),
            created_at: chrono::Utc::now().to_rfc3339(),
        },
    }
}

fn create_report_dataset() -> Vec<EmbeddingRecord> {
    vec![
        create_realistic_embedding_record(
            0,
            1,
            "Revenue for the fiscal year grew by twelve percent, driven by strong demand in the enterprise segment.",
            0.1,
        ),
        create_realistic_embedding_record(
            1,
            2,
            "Operating expenses remained flat as the company consolidated its regional offices.",
            0.5,
        ),
        create_realistic_embedding_record(
            2,
            3,
            "The board approved a dividend of forty-two cents per share, payable in the second quarter.",
            1.0,
        ),
        create_realistic_embedding_record(
            3,
            4,
            "Appendix A lists the subsidiaries and their countries of incorporation.",
            2.0,
        ),
        create_realistic_embedding_record(
            4,
            5,
            "Forward-looking statements involve risks and uncertainties described in the risk factors section.",
            3.0,
        ),
    ]
}

#[tokio::test]
async fn realistic_report_storage_and_search() {
    let (config, _temp_dir) = create_test_config();
    let records = create_report_dataset();

    let store = VectorStore::create(&config.index_path(), &records)
        .await
        .expect("should create store");

    assert_eq!(store.vector_dimension(), DIMENSION);
    assert_eq!(store.count_embeddings().await.expect("should count"), 5);

    let query = records[2].vector.clone();
    let results = store
        .search_similar(&query, 3)
        .await
        .expect("should search");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk_metadata.chunk_index, 2);
    assert!(results[0].chunk_metadata.content.contains("dividend"));
    assert!(
        results[0].similarity_score > 0.99,
        "Exact match should be near 1.0, got {}",
        results[0].similarity_score
    );
    assert!(results[0].distance.abs() < 0.01);
}

#[tokio::test]
async fn search_relevance_ranking() {
    let (config, _temp_dir) = create_test_config();
    let records = create_report_dataset();
    let store = VectorStore::create(&config.index_path(), &records)
        .await
        .expect("should create store");

    let query = realistic_vector(0.15, records[0].metadata.content.len());
    let results = store
        .search_similar(&query, 5)
        .await
        .expect("should search");

    assert_eq!(results.len(), 5);
    assert_eq!(results[0].chunk_metadata.chunk_index, 0);
    for pair in results.windows(2) {
        assert!(
            pair[0].similarity_score >= pair[1].similarity_score,
            "Results should be sorted by similarity"
        );
    }
}

#[tokio::test]
async fn large_document_batch() {
    let (config, _temp_dir) = create_test_config();

    let records: Vec<EmbeddingRecord> = (0..500u32)
        .map(|i| {
            create_realistic_embedding_record(
                i,
                i / 10 + 1,
                &format!("Section {} of the report discusses item number {}.", i / 10, i),
                i as f32 * 0.01,
            )
        })
        .collect();

    let store = VectorStore::create(&config.index_path(), &records)
        .await
        .expect("should store large batch");

    assert_eq!(store.count_embeddings().await.expect("should count"), 500);

    let results = store
        .search_similar(&records[250].vector, 10)
        .await
        .expect("should search");
    assert_eq!(results.len(), 10);
    assert_eq!(results[0].chunk_metadata.chunk_index, 250);
}

#[tokio::test]
async fn metadata_preservation() {
    let (config, _temp_dir) = create_test_config();
    let records = create_report_dataset();
    let store = VectorStore::create(&config.index_path(), &records)
        .await
        .expect("should create store");

    let results = store
        .search_similar(&records[3].vector, 1)
        .await
        .expect("should search");
    let found = &results[0].chunk_metadata;

    let mut expected = records[3].metadata.clone();
    expected.created_at = found.created_at.clone();
    assert_eq!(found, &expected);

    let page_metadata = found.metadata().expect("stored metadata parses");
    assert_eq!(page_metadata.get("page"), Some(&MetadataValue::Integer(4)));
}

#[tokio::test]
async fn persisted_index_survives_reopen() {
    let (config, _temp_dir) = create_test_config();
    let location = config.index_path();
    let records = create_report_dataset();

    {
        VectorStore::create(&location, &records)
            .await
            .expect("should create store");
    }

    assert!(VectorStore::exists(&location));
    let reopened = VectorStore::open(&location)
        .await
        .expect("should reopen store");

    assert_eq!(reopened.vector_dimension(), DIMENSION);
    assert_eq!(reopened.count_embeddings().await.expect("should count"), 5);

    let results = reopened
        .search_similar(&records[4].vector, 1)
        .await
        .expect("should search");
    assert_eq!(results[0].chunk_metadata.chunk_index, 4);
}

#[tokio::test]
async fn rebuild_replaces_previous_document() {
    let (config, _temp_dir) = create_test_config();
    let location = config.index_path();

    VectorStore::create(&location, &create_report_dataset())
        .await
        .expect("should create first store");

    let replacement = vec![create_realistic_embedding_record(
        0,
        1,
        "A different document with a single paragraph.",
        7.0,
    )];
    let store = VectorStore::create(&location, &replacement)
        .await
        .expect("should replace store");

    assert_eq!(store.count_embeddings().await.expect("should count"), 1);
    let results = store
        .search_similar(&replacement[0].vector, 5)
        .await
        .expect("should search");
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk_metadata.content.contains("different document"));
}

#[tokio::test]
async fn deleted_index_cannot_be_opened() {
    let (config, _temp_dir) = create_test_config();
    let location = config.index_path();

    VectorStore::create(&location, &create_report_dataset())
        .await
        .expect("should create store");

    assert!(VectorStore::delete(&location).await.expect("should delete"));
    assert!(!VectorStore::exists(&location));
    assert!(!VectorStore::delete(&location).await.expect("second delete is a no-op"));

    let reopened = VectorStore::open(&location).await;
    assert!(matches!(reopened, Err(ChatPdfError::StorageLoad(_))));
}

#[tokio::test]
async fn corrupted_index_reports_storage_error() {
    let (config, _temp_dir) = create_test_config();
    let location = config.index_path();

    std::fs::create_dir_all(&location).expect("should create dir");
    std::fs::write(location.join("chunks.lance"), b"not a lance table")
        .expect("should write junk");

    let result = VectorStore::open(&location).await;

    assert!(matches!(result, Err(ChatPdfError::StorageLoad(_))));
}

#[tokio::test]
async fn concurrent_searches() {
    let (config, _temp_dir) = create_test_config();
    let records = create_report_dataset();
    let store = VectorStore::create(&config.index_path(), &records)
        .await
        .expect("should create store");
    let index: Arc<dyn VectorIndex> = Arc::new(store);

    let mut handles = Vec::new();
    for record in records {
        let index = Arc::clone(&index);
        handles.push(tokio::spawn(async move {
            let found = index
                .nearest(&record.vector, 1)
                .await
                .expect("should search");
            (record.metadata.chunk_index, found[0].chunk_index)
        }));
    }

    for handle in handles {
        let (expected, found) = handle.await.expect("task should complete");
        assert_eq!(expected, found);
    }
}
