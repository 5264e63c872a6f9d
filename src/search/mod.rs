pub mod hybrid;

pub use hybrid::HybridSearchOrchestrator;
