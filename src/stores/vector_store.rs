//! Vector index (§3, §4.4) — a LanceDB-backed store of `{Chunk, AiSummary}`
//! points. Generalized from the teacher's `MemoryManager`
//! (`features/history.rs`): same lazy `OnceCell<Arc<StaticModel>>` +
//! `spawn_blocking` embedding load, same connect/open-or-create/create_index
//! sequence, same Arrow `RecordBatch` write path and manual-downcast read
//! path — widened from one text column to the full payload the spec's
//! `VectorPointPayload` needs (`type`, `article_id`, `website`, `user_id`,
//! `search_id`, ...). Point-kind shape and indexed fields are grounded in
//! `original_source/crawler/setup_qdrant.py` and `update_qdrant_data.py`.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use uuid::Uuid;

use crate::core::types::{SentimentLabel, VectorPointPayload};

const TABLE_NAME: &str = "article_vectors";

/// One row of the vector table: an id, its embedding, and its payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPointPayload,
}

/// A point as read back from LanceDB, with its match distance when the row
/// came from a `nearest_to` query (`None` for a plain scan).
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub payload: VectorPointPayload,
    pub distance: Option<f32>,
}

pub struct VectorStore {
    table: Table,
    embedding_dim: usize,
}

impl VectorStore {
    pub async fn connect(uri: &str, embedding_dim: usize) -> Result<Self> {
        let db = lancedb::connect(uri)
            .execute()
            .await
            .context("failed to connect to LanceDB")?;

        let schema = Arc::new(Self::vector_schema(embedding_dim)?);

        let table = match db.open_table(TABLE_NAME).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => db
                .create_empty_table(TABLE_NAME, schema.clone())
                .execute()
                .await
                .context("failed to create LanceDB table")?,
            Err(e) => return Err(e).context("failed to open LanceDB table"),
        };

        if let Err(e) = table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
        {
            tracing::debug!("LanceDB create_index skipped/failed: {}", e);
        }

        Ok(Self { table, embedding_dim })
    }

    fn vector_schema(embedding_dim: usize) -> Result<Schema> {
        let vector_len: i32 = embedding_dim.try_into().context("embedding dimension too large")?;
        Ok(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("point_type", DataType::Utf8, false),
            Field::new("article_id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, true),
            Field::new("url", DataType::Utf8, true),
            Field::new("website", DataType::Utf8, true),
            Field::new("publish_date", DataType::Utf8, true),
            Field::new("sentiment", DataType::Utf8, true),
            Field::new("topic", DataType::Utf8, true),
            Field::new("search_id", DataType::Utf8, true),
            Field::new("user_id", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_len),
                true,
            ),
        ]))
    }

    /// Write (or overwrite) a batch of points in one Arrow `RecordBatch`.
    pub async fn upsert_points(&self, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        // Overwriting ids keeps re-enrichment idempotent: delete first, then
        // insert, same as the source's "delete-then-upsert" Qdrant pattern.
        let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
        self.delete_by_ids(&ids).await?;

        let batch = self.points_to_record_batch(points)?;
        let schema = batch.schema();
        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema))
            .execute()
            .await
            .context("failed to add points to LanceDB")?;
        Ok(())
    }

    fn points_to_record_batch(&self, points: &[VectorPoint]) -> Result<RecordBatch> {
        let schema = Arc::new(Self::vector_schema(self.embedding_dim)?);
        let vector_len: i32 = self.embedding_dim.try_into().context("embedding dimension too large")?;

        let mut ids = Vec::with_capacity(points.len());
        let mut point_types = Vec::with_capacity(points.len());
        let mut article_ids = Vec::with_capacity(points.len());
        let mut texts = Vec::with_capacity(points.len());
        let mut titles = Vec::with_capacity(points.len());
        let mut urls = Vec::with_capacity(points.len());
        let mut websites = Vec::with_capacity(points.len());
        let mut publish_dates = Vec::with_capacity(points.len());
        let mut sentiments = Vec::with_capacity(points.len());
        let mut topics = Vec::with_capacity(points.len());
        let mut search_ids = Vec::with_capacity(points.len());
        let mut user_ids = Vec::with_capacity(points.len());
        let mut vectors = Vec::with_capacity(points.len());

        for point in points {
            ids.push(point.id.to_string());
            let row = PayloadRow::from(&point.payload);
            point_types.push(row.point_type);
            article_ids.push(row.article_id);
            texts.push(row.text);
            titles.push(row.title);
            urls.push(row.url);
            websites.push(row.website);
            publish_dates.push(row.publish_date);
            sentiments.push(row.sentiment);
            topics.push(row.topic);
            search_ids.push(row.search_id);
            user_ids.push(row.user_id);
            vectors.push(Some(point.vector.iter().map(|v| Some(*v)).collect::<Vec<_>>()));
        }

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, vector_len);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(point_types)),
                Arc::new(StringArray::from(article_ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(urls)),
                Arc::new(StringArray::from(websites)),
                Arc::new(StringArray::from(publish_dates)),
                Arc::new(StringArray::from(sentiments)),
                Arc::new(StringArray::from(topics)),
                Arc::new(StringArray::from(search_ids)),
                Arc::new(StringArray::from(user_ids)),
                Arc::new(vector_array),
            ],
        )
        .context("failed to build Arrow RecordBatch")
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let predicate = in_list_predicate("id", ids);
        self.table
            .delete(&predicate)
            .await
            .context("failed to delete existing points before upsert")?;
        Ok(())
    }

    pub async fn delete_by_article_ids(&self, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let predicate = in_list_predicate("article_id", article_ids);
        self.table
            .delete(&predicate)
            .await
            .context("failed to delete points by article_id")?;
        Ok(())
    }

    /// Emulates "scroll + patch payload" (§4.3 `add_search_id`): there is no
    /// partial-update API on a LanceDB table, so every point belonging to
    /// these articles is read back, its `search_id` CSV column is grown, and
    /// the row is rewritten in place (delete, then reinsert).
    pub async fn add_search_id(&self, article_ids: &[String], search_id: &str) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let predicate = in_list_predicate("article_id", article_ids);
        let stream = self
            .table
            .query()
            .only_if(predicate)
            .execute()
            .await
            .context("failed to scroll points for add_search_id")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await.context("collect scroll batches")?;

        let mut points = Vec::new();
        for batch in &batches {
            points.extend(batches_to_points(batch, None)?);
        }
        if points.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = points.iter().map(|p| p.id.id.to_string()).collect();
        self.delete_by_ids(&ids).await?;

        let vectors: Vec<VectorPoint> = points
            .into_iter()
            .map(|p| {
                let mut payload = p.payload;
                add_search_id_to_payload(&mut payload, search_id);
                VectorPoint {
                    id: p.id.id,
                    vector: p.id.vector,
                    payload,
                }
            })
            .collect();

        let batch = self.points_to_record_batch(&vectors)?;
        let schema = batch.schema();
        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema))
            .execute()
            .await
            .context("failed to rewrite points after add_search_id")?;
        Ok(())
    }

    /// §4.4 retrieval for chat context: cosine-nearest points restricted to
    /// `user_id ∈ {caller, "system", "system_auto"}`.
    pub async fn retrieve_context(
        &self,
        query_vector: &[f32],
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let predicate = format!(
            "user_id = '{}' OR user_id = 'system' OR user_id = 'system_auto'",
            escape_literal(user_id)
        );
        let stream = self
            .table
            .query()
            .nearest_to(query_vector)
            .context("failed to build nearest_to query")?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(predicate)
            .limit(limit)
            .execute()
            .await
            .context("vector retrieve_context query failed")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await.context("collect retrieve_context batches")?;
        let mut out = Vec::new();
        for batch in &batches {
            for p in batches_to_points(batch, Some("_distance"))? {
                out.push(ScoredPoint {
                    id: p.id.id,
                    payload: p.payload,
                    distance: p.distance,
                });
            }
        }
        Ok(out)
    }
}

struct RawPoint {
    id: VectorPoint,
    distance: Option<f32>,
}

struct PayloadRow {
    point_type: String,
    article_id: String,
    text: String,
    title: Option<String>,
    url: Option<String>,
    website: Option<String>,
    publish_date: Option<String>,
    sentiment: Option<String>,
    topic: Option<String>,
    search_id: Option<String>,
    user_id: Option<String>,
}

impl From<&VectorPointPayload> for PayloadRow {
    fn from(payload: &VectorPointPayload) -> Self {
        match payload {
            VectorPointPayload::Chunk {
                article_id,
                chunk_id: _,
                text,
                title,
                url,
                website,
                publish_date,
                sentiment,
                topic,
                search_id,
                user_id,
            } => PayloadRow {
                point_type: "chunk".to_string(),
                article_id: article_id.clone(),
                text: text.clone(),
                title: Some(title.clone()),
                url: Some(url.clone()),
                website: Some(website.clone()),
                publish_date: publish_date.map(|d| d.to_rfc3339()),
                sentiment: sentiment.as_ref().map(|s| s.as_str().to_string()),
                topic: topic.clone(),
                search_id: Some(encode_search_id(search_id)),
                user_id: Some(user_id.clone()),
            },
            VectorPointPayload::AiSummary {
                article_id,
                summary_text,
                title,
                url,
                website,
                publish_date,
                sentiment,
                topic,
                search_id,
                user_id,
            } => PayloadRow {
                point_type: "ai_summary".to_string(),
                article_id: article_id.clone(),
                text: encode_summary_sentences(summary_text),
                title: Some(title.clone()),
                url: Some(url.clone()),
                website: Some(website.clone()),
                publish_date: publish_date.map(|d| d.to_rfc3339()),
                sentiment: sentiment.as_ref().map(|s| s.as_str().to_string()),
                topic: topic.clone(),
                search_id: Some(encode_search_id(search_id)),
                user_id: Some(user_id.clone()),
            },
        }
    }
}

const SUMMARY_SENTENCE_SEPARATOR: char = '\u{1f}';

fn encode_summary_sentences(sentences: &[String]) -> String {
    sentences.join(&SUMMARY_SENTENCE_SEPARATOR.to_string())
}

fn decode_summary_sentences(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(SUMMARY_SENTENCE_SEPARATOR).map(String::from).collect()
}

fn parse_sentiment_label(raw: Option<&str>) -> Option<SentimentLabel> {
    match raw {
        Some("Positive") => Some(SentimentLabel::Positive),
        Some("Negative") => Some(SentimentLabel::Negative),
        Some("Neutral") => Some(SentimentLabel::Neutral),
        _ => None,
    }
}

fn encode_search_id(ids: &std::collections::BTreeSet<String>) -> String {
    ids.iter().cloned().collect::<Vec<_>>().join(",")
}

fn decode_search_id(raw: Option<&str>) -> std::collections::BTreeSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn add_search_id_to_payload(payload: &mut VectorPointPayload, search_id: &str) {
    let set = match payload {
        VectorPointPayload::Chunk { search_id, .. } => search_id,
        VectorPointPayload::AiSummary { search_id, .. } => search_id,
    };
    set.insert(search_id.to_string());
}

fn in_list_predicate(column: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", escape_literal(v))).collect();
    format!("{column} IN ({})", quoted.join(", "))
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

fn batches_to_points(batch: &RecordBatch, distance_column: Option<&str>) -> Result<Vec<RawPoint>> {
    let col = |name: &str| -> Result<&StringArray> {
        batch
            .column_by_name(name)
            .with_context(|| format!("missing column: {name}"))?
            .as_any()
            .downcast_ref::<StringArray>()
            .with_context(|| format!("invalid type for column: {name}"))
    };

    let id_col = col("id")?;
    let point_type_col = col("point_type")?;
    let article_id_col = col("article_id")?;
    let text_col = col("text")?;
    let title_col = col("title")?;
    let url_col = col("url")?;
    let website_col = col("website")?;
    let publish_date_col = col("publish_date")?;
    let sentiment_col = col("sentiment")?;
    let topic_col = col("topic")?;
    let search_id_col = col("search_id")?;
    let user_id_col = col("user_id")?;

    let vector_col = batch
        .column_by_name("vector")
        .context("missing column: vector")?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .context("invalid type for column: vector")?;

    let distance_col: Option<&Float32Array> = distance_column
        .and_then(|name| batch.column_by_name(name))
        .and_then(|arr| arr.as_any().downcast_ref::<Float32Array>());

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let id = Uuid::parse_str(id_col.value(row)).unwrap_or_else(|_| Uuid::nil());
        let article_id = article_id_col.value(row).to_string();
        let text = text_col.value(row).to_string();
        let title = non_empty(title_col.value(row));
        let url = non_empty(url_col.value(row));
        let website = non_empty(website_col.value(row));
        let publish_date = non_empty(publish_date_col.value(row)).and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc));
        let sentiment = parse_sentiment_label(non_empty(sentiment_col.value(row)).as_deref());
        let topic = non_empty(topic_col.value(row));
        let search_id = decode_search_id(Some(search_id_col.value(row)));
        let user_id = user_id_col.value(row).to_string();

        let vector_value = vector_col.value(row);
        let floats = vector_value
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.values().to_vec())
            .unwrap_or_default();

        let payload = match point_type_col.value(row) {
            "ai_summary" => VectorPointPayload::AiSummary {
                article_id,
                summary_text: decode_summary_sentences(&text),
                title: title.unwrap_or_default(),
                url: url.unwrap_or_default(),
                website: website.unwrap_or_default(),
                publish_date,
                sentiment,
                topic,
                search_id,
                user_id,
            },
            _ => VectorPointPayload::Chunk {
                article_id: article_id.clone(),
                chunk_id: format!("{article_id}_0"),
                text,
                title: title.unwrap_or_default(),
                url: url.unwrap_or_default(),
                website: website.unwrap_or_default(),
                publish_date,
                sentiment,
                topic,
                search_id,
                user_id,
            },
        };

        let distance = distance_col.map(|c| c.value(row));
        out.push(RawPoint {
            id: VectorPoint { id, vector: floats, payload },
            distance,
        });
    }
    Ok(out)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_payload() -> VectorPointPayload {
        let mut search_id = BTreeSet::new();
        search_id.insert("abc".to_string());
        VectorPointPayload::Chunk {
            article_id: "art-1".into(),
            chunk_id: "art-1_0".into(),
            text: "hello world".into(),
            title: "t".into(),
            url: "https://example.com".into(),
            website: "example".into(),
            publish_date: None,
            sentiment: None,
            topic: None,
            search_id,
            user_id: "system".into(),
        }
    }

    #[test]
    fn search_id_roundtrips_through_csv_encoding() {
        let payload = sample_payload();
        let row = PayloadRow::from(&payload);
        let decoded = decode_search_id(row.search_id.as_deref());
        assert!(decoded.contains("abc"));
    }

    #[test]
    fn add_search_id_to_payload_grows_the_set() {
        let mut payload = sample_payload();
        add_search_id_to_payload(&mut payload, "system_auto");
        match payload {
            VectorPointPayload::Chunk { search_id, .. } => {
                assert!(search_id.contains("abc"));
                assert!(search_id.contains("system_auto"));
            }
            _ => panic!("expected chunk payload"),
        }
    }

    #[test]
    fn in_list_predicate_quotes_each_value() {
        let predicate = in_list_predicate("article_id", &["a".to_string(), "b's".to_string()]);
        assert_eq!(predicate, "article_id IN ('a', 'b''s')");
    }
}
