//! Background processing: job tracking, asynchronous submission and the
//! subscription worker

mod job_store;
mod runner;
mod subscriber;

pub use job_store::{InMemoryJobStore, JobStats, JobStore};
pub use runner::{JobRunner, JobTicket};
pub use subscriber::{SubscriptionWorker, WorkerSettings, WorkerStats, WorkerState, WorkerStatus};
