use anyhow::Result;
use calspan_core::AlarmStore;
use calspan_core::config::CalSpanConfig;
use owo_colors::OwoColorize;

pub async fn run(config: &CalSpanConfig) -> Result<()> {
    let store = super::open_store(config)?;
    let alarms = AlarmStore::new(store.busytimes().db().clone());

    println!("{:>10} {}", "events".dimmed(), store.count().await?);
    println!("{:>10} {}", "busytimes".dimmed(), store.busytimes().count().await?);
    println!("{:>10} {}", "alarms".dimmed(), alarms.count().await?);

    Ok(())
}
