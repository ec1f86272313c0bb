pub mod extract;
pub mod fetcher;
pub mod robots;

pub use extract::{GenericExtractor, SelectorExtractor};
pub use fetcher::{FetchConfig, HttpFetchClient};
pub use robots::RobotsGate;
