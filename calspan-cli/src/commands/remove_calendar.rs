use anyhow::Result;
use calspan_core::config::CalSpanConfig;
use owo_colors::OwoColorize;

pub async fn run(config: &CalSpanConfig, calendar_id: i64) -> Result<()> {
    let store = super::open_store(config)?;

    let removed = store.remove_calendar(calendar_id, None).await?;
    if removed == 0 {
        println!("{}", format!("No events in calendar {}", calendar_id).dimmed());
    } else {
        println!("{} {} events from calendar {}", "Removed".red(), removed, calendar_id);
    }

    Ok(())
}
