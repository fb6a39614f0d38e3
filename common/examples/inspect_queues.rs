use resq_common::config::Settings;
use resq_common::{bootstrap, FailureRecord};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    println!("Connecting to Redis: {}", settings.redis.url);

    let client = bootstrap::init_client(&settings).await?;
    let info = client.info().await?;

    println!(
        "{} pending job(s) in {} queue(s), {} processed, {} failed",
        info.pending, info.queues, info.processed, info.failed
    );

    for queue in client.queues().await? {
        println!("  queue {:<24} {:>8}", queue, client.size(&queue).await?);
    }

    let working = client.working().await?;
    for worker in client.workers().await? {
        let started = client
            .worker_started(&worker)
            .await?
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "expired".to_string());
        let status = match client.worker_status(&worker).await? {
            Some(status) if working.contains(&worker) => {
                format!("working on {} from {}", status.payload.class, status.queue)
            }
            _ => "idle".to_string(),
        };
        println!(
            "  worker {} (started {}, processed {}, failed {}): {}",
            worker,
            started,
            client.processed(Some(worker.as_str())).await?,
            client.failed(Some(worker.as_str())).await?,
            status
        );
    }

    let failures: Vec<FailureRecord> = client.failures(0, 10).await?;
    for failure in failures {
        println!(
            "  failed {} on {} at {}: {}",
            failure.payload.class, failure.queue, failure.failed_at, failure.error
        );
    }

    Ok(())
}
