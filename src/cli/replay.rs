use crate::error::Result;
use crate::store::EventBus;

/// Execute the `replay` command: re-publish a topic's dead letters.
pub async fn execute(topic: &str, bus: &EventBus) -> Result<()> {
    let report = bus.replay(topic).await?;

    println!("Topic: {topic}");
    println!("Replayed: {}", report.replayed);
    println!("Failed: {}", report.failed);
    println!("Skipped: {}", report.skipped);

    Ok(())
}
