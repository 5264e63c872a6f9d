pub mod embedding;
pub mod sentiment;

pub use embedding::EmbeddingProvider;
pub use sentiment::SentimentProvider;
