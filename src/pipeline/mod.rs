pub mod chunking;
pub mod enrichment;
pub mod summarize;

pub use chunking::derive_article_id;
pub use enrichment::EnrichmentWorker;
