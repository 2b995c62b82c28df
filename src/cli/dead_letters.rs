use crate::error::Result;
use crate::store::EventBus;

/// Execute the `dead-letters` command: list a topic's dead letters.
pub async fn execute(topic: &str, bus: &EventBus) -> Result<()> {
    let letters = bus.dead_letters(topic).await?;

    if letters.is_empty() {
        println!("No dead letters for {topic}");
        return Ok(());
    }

    println!(
        "{:<40} {:<24} {:<24} {:>7}  ERROR",
        "EVENT ID", "EVENT TYPE", "FAILED AT", "RETRIES"
    );
    for letter in &letters {
        let record = &letter.record;
        println!(
            "{:<40} {:<24} {:<24} {:>7}  {}",
            record.event.id_label(),
            record.event.event_type,
            record.failed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            record.retry_count,
            record.error
        );
    }
    println!("\n{} dead letter(s)", letters.len());

    Ok(())
}
