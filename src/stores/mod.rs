pub mod document_store;
pub mod fanout;
pub mod lexical_store;
pub mod vector_store;

pub use document_store::DocumentStore;
pub use fanout::{FanoutArticle, FanoutOutcome, StoreFanout};
pub use lexical_store::LexicalStore;
pub use vector_store::{VectorPoint, VectorStore};
