use uuid::Uuid;

use crate::error::Result;
use crate::store::EventBus;

/// Execute the `history` command: print a stored event as JSON.
pub async fn execute(id: &Uuid, bus: &EventBus) -> Result<()> {
    let event = bus.get_event_history(id).await?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
