pub mod backup;
pub mod cache;
pub mod rsync;

pub use backup::StaleCaches;
pub use cache::FetchCache;
pub use rsync::{FetchOutcome, Fetcher};
