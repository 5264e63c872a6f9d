pub mod adapters;
pub mod core;
pub mod crawl;
pub mod http;
pub mod pipeline;
pub mod providers;
pub mod scheduler;
pub mod search;
pub mod stores;
pub mod stream;

pub use core::types;
pub use core::{AppError, AppResult, AppState};
