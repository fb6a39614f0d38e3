// Redis-backed job queue protocol: queues, worker registry, status and stats

pub mod bootstrap;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod failure;
pub mod job;
pub mod keys;
pub mod models;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use client::ResqClient;
pub use errors::{CodecError, ResqError, StoreError};
pub use job::Job;
pub use keys::KeyNamespace;
pub use models::{FailureRecord, Info, JobPayload, StatusRecord, WorkerState};
pub use store::{Batch, KeyValueStore, MemoryStore, Mutation, RedisStore};
pub use worker::{HandlerRegistry, JobHandler, Worker};
