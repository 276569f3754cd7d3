use anyhow::Result;
use calspan_core::config::CalSpanConfig;
use owo_colors::OwoColorize;

pub async fn run(config: &CalSpanConfig, event_id: &str) -> Result<()> {
    let store = super::open_store(config)?;

    let Some(event) = store.get(event_id).await? else {
        anyhow::bail!("Event '{}' not found", event_id);
    };

    store.remove(event_id, None).await?;
    println!("{} {}", "Removed:".red(), event.title());

    Ok(())
}
