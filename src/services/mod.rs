pub mod fetcher;
pub mod generation;
pub mod job_store;
pub mod ledger;
pub mod pipeline;
pub mod processor;
pub mod scheduler;
pub mod storage;
