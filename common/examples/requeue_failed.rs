use resq_common::bootstrap;
use resq_common::config::Settings;

/// Move every retained failure back onto the queue it came from
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let client = bootstrap::init_client(&settings).await?;

    let total = client.failure_count().await?;
    println!("Found {} failed job(s)", total);

    let mut requeued = 0;
    while let Some(failure) = client.requeue_failure().await? {
        println!("  requeued {} onto {}", failure.payload.class, failure.queue);
        requeued += 1;
    }

    println!("Requeued {} job(s)", requeued);
    Ok(())
}
