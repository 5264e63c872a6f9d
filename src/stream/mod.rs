pub mod progress;

pub use progress::{poll_once, subscribe};
