//! `sleuth history`: Show persisted conversations.

use sleuth_checkpoint::SqliteCheckpointStore;
use sleuth_config::AppConfig;
use sleuth_core::checkpoint::{CheckpointId, CheckpointStore};
use sleuth_core::message::{Message, Role};

pub async fn run(id: Option<String>, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.checkpoint.backend != "sqlite" {
        return Err(format!(
            "The '{}' checkpoint backend keeps nothing between runs",
            config.checkpoint.backend
        )
        .into());
    }

    let store = SqliteCheckpointStore::open(&config.checkpoint.path).await?;

    match id {
        Some(id) => {
            let id = CheckpointId::from(id);
            let messages = store.load(&id).await?;
            if messages.is_empty() {
                return Err(format!("No conversation with checkpoint id '{id}'").into());
            }
            for message in &messages {
                println!("{}", render(message));
            }
        }
        None => {
            let recent = store.recent(limit).await?;
            if recent.is_empty() {
                println!("No conversations yet.");
            }
            for id in recent {
                println!("{id}");
            }
        }
    }

    Ok(())
}

/// One line per message: role, then content or capability activity.
fn render(message: &Message) -> String {
    match message.role {
        Role::User => format!("You       > {}", message.content),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls: Vec<String> = message
                .tool_calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect();
            format!("Sleuth    > [calls {}] {}", calls.join(", "), message.content)
        }
        Role::Assistant => format!("Sleuth    > {}", message.content),
        Role::Tool if message.is_error => format!("  result  ! {}", message.content),
        Role::Tool => format!("  result  < {} bytes", message.content.len()),
        Role::System => format!("System    > {}", message.content),
    }
}
