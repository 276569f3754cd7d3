use anyhow::Result;
use calspan_core::config::CalSpanConfig;
use calspan_core::{Busytime, Timespan};
use chrono::{Duration, Local};
use owo_colors::OwoColorize;
use tracing::debug;

use crate::dates::parse_day;

pub async fn run(config: &CalSpanConfig, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let store = super::open_store(config)?;

    let from = match from {
        Some(s) => parse_day(s)?,
        None => parse_day(&Local::now().format("%Y-%m-%d").to_string())?,
    };
    // `to` names the last day shown, so the span runs to the following midnight.
    let to = match to {
        Some(s) => parse_day(s)? + Duration::days(1),
        None => from + Duration::days(7),
    };
    let span = Timespan::from_dates(&from, &to)?;

    let resynced = store.resync(None).await?;
    debug!(resynced, "expanded recurring events for the current window");

    let busytimes = store.busytimes().load_span(span).await?;
    if busytimes.is_empty() {
        println!("{}", "No busytimes found".dimmed());
        return Ok(());
    }

    for day in span.days_between() {
        let next = day + Duration::days(1);
        let Ok(day_span) = Timespan::from_dates(&day, &next) else {
            continue;
        };
        if !span.overlaps(&day_span) {
            continue;
        }

        let on_day: Vec<&Busytime> = busytimes
            .iter()
            .filter(|b| b.span().overlaps(&day_span))
            .collect();
        if on_day.is_empty() {
            continue;
        }

        println!("{}", day.format("%a %b %-d").bold());
        for busytime in on_day {
            let title = match store.get(&busytime.event_id).await? {
                Some(event) => event.title().to_string(),
                None => busytime.event_id.clone(),
            };
            println!(
                "  {} {} {}",
                format_time(busytime),
                title,
                format!("[{}]", busytime.calendar_id).dimmed()
            );
        }
        println!();
    }

    Ok(())
}

/// "15:00-16:00" or "all-day"
fn format_time(busytime: &Busytime) -> String {
    if busytime.is_all_day {
        return format!("{:>11}", "all-day");
    }
    format!(
        "{}-{}",
        busytime.start_date().format("%H:%M"),
        busytime.end_date().format("%H:%M")
    )
}
