pub mod topic;

pub use topic::TopicScheduler;
