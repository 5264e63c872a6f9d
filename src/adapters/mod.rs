pub mod generic;
pub mod site_adapter;

pub use generic::{GenericHtmlAdapter, SiteProfile};
pub use site_adapter::{matches_content_filter, ArticleLink, DraftArticle, SiteAdapter, SiteRegistry, TopicCandidate};
