// Telemetry module for structured logging and job metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` wins over `log_level` when set. With `json` the output carries
/// the current span and span list so `queue`, `worker_id` and `class` fields
/// recorded by the client show up on every line.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, json = json, "Logging initialized");

    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe the job metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("resq_jobs_enqueued_total", "Jobs pushed onto a queue");
    describe_counter!("resq_jobs_reserved_total", "Jobs popped by a worker");
    describe_counter!("resq_jobs_processed_total", "Job attempts finished");
    describe_counter!("resq_jobs_failed_total", "Job attempts that failed");
    describe_histogram!("resq_job_duration_seconds", "Job execution time in seconds");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_enqueued(queue: &str) {
    counter!("resq_jobs_enqueued_total", "queue" => queue.to_string()).increment(1);
}

#[inline]
pub fn record_reserved(queue: &str) {
    counter!("resq_jobs_reserved_total", "queue" => queue.to_string()).increment(1);
}

#[inline]
pub fn record_processed(queue: &str, class: &str) {
    counter!(
        "resq_jobs_processed_total",
        "queue" => queue.to_string(),
        "class" => class.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_failed(queue: &str, class: &str) {
    counter!(
        "resq_jobs_failed_total",
        "queue" => queue.to_string(),
        "class" => class.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_job_duration(queue: &str, class: &str, duration_seconds: f64) {
    histogram!(
        "resq_job_duration_seconds",
        "queue" => queue.to_string(),
        "class" => class.to_string()
    )
    .record(duration_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_fails_second_time() {
        let first = init_logging("debug", true);
        let second = init_logging("debug", true);
        // Only one global subscriber can ever be installed per process.
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_metrics_recording() {
        // No recorder installed: recording must be a no-op, not a panic.
        record_enqueued("mailer");
        record_reserved("mailer");
        record_processed("mailer", "Send");
        record_failed("mailer", "Send");
        record_job_duration("mailer", "Send", 0.25);
    }
}
