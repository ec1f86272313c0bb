pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod keywords;
pub mod limiter;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod testutil;
pub mod worker;

pub use dedup::{Classification, Deduper, DeduperConfig, Fingerprint};
pub use error::CrawlError;
pub use extract::{Extractor, ExtractorRegistry};
pub use fetch::{FetchResponse, Fetcher};
pub use limiter::{RateLimiter, RateLimiterConfig};
pub use models::{
    CanonicalRecord, CrawlStats, JobRun, JobSource, NewJobSource, RawRecord, RunCounters,
    RunStatus, StoredPage, compute_hash,
};
pub use normalize::normalize;
pub use pipeline::{AdHocCrawl, CrawlPipeline, PipelineConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{PageStore, RunStore};
pub use worker::{TracingWorkerReporter, Worker, WorkerConfig, WorkerReporter};
