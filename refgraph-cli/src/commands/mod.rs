//! CLI command implementations

pub mod crawl;
pub mod refs;

pub use crawl::CrawlArgs;
pub use refs::RefsArgs;
