//! Live LanceDB + model2vec smoke test. Ignored by default since it opens a
//! real on-disk LanceDB table and loads a real embedding model (which may
//! download on first run) — run explicitly with `cargo test -- --ignored`.

use std::collections::BTreeSet;

use tin_loom::core::types::VectorPointPayload;
use tin_loom::providers::embedding::EMBEDDING_DIM;
use tin_loom::providers::EmbeddingProvider;
use tin_loom::stores::vector_store::VectorPoint;
use tin_loom::stores::VectorStore;
use uuid::Uuid;

#[tokio::test]
#[ignore]
async fn vector_store_retrieve_context_returns_seeded_chunk() {
    let tmp_dir = std::env::temp_dir().join(format!("tin_loom_lancedb_test_{}", Uuid::new_v4()));

    let store = VectorStore::connect(
        tmp_dir.to_str().expect("temp dir path should be valid UTF-8"),
        EMBEDDING_DIM,
    )
    .await
    .expect("connect to LanceDB");

    let embedding = EmbeddingProvider::new("minishlab/potion-multilingual-128M");
    let text = "Ngân hàng Nhà nước công bố giảm lãi suất điều hành để hỗ trợ tăng trưởng kinh tế.";
    let vector = embedding.encode_single(text).await.expect("encode seeded chunk");

    let mut search_id = BTreeSet::new();
    search_id.insert("search-smoke-1".to_string());

    let point = VectorPoint {
        id: Uuid::new_v4(),
        vector: vector.clone(),
        payload: VectorPointPayload::Chunk {
            article_id: "article-smoke-1".to_string(),
            chunk_id: "article-smoke-1_0".to_string(),
            text: text.to_string(),
            title: "Ngân hàng giảm lãi suất".to_string(),
            url: "https://example-news.test/ngan-hang-giam-lai-suat".to_string(),
            website: "example-news".to_string(),
            publish_date: None,
            sentiment: None,
            topic: None,
            search_id,
            user_id: "user-smoke-1".to_string(),
        },
    };

    store.upsert_points(&[point]).await.expect("upsert seeded point");

    let query_vector = embedding
        .encode_single("chính sách lãi suất ngân hàng")
        .await
        .expect("encode query");

    let results = store
        .retrieve_context(&query_vector, "user-smoke-1", 5)
        .await
        .expect("retrieve_context should succeed");

    assert!(!results.is_empty(), "expected at least one retrieved point");
    let found = results.iter().any(|p| match &p.payload {
        VectorPointPayload::Chunk { article_id, .. } => article_id == "article-smoke-1",
        VectorPointPayload::AiSummary { article_id, .. } => article_id == "article-smoke-1",
    });
    assert!(found, "seeded chunk should be among the retrieved results");
}
