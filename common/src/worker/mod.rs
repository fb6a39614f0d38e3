// Worker side of the protocol: handler lookup and the poll loop

pub mod handler;
pub mod runner;

pub use handler::{HandlerRegistry, JobFn, JobHandler};
pub use runner::{worker_id, Worker, DEFAULT_POLL_INTERVAL};
