pub mod executor;

pub use executor::{CrawlExecutor, CrawlParams};
