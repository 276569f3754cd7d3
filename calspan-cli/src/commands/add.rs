use anyhow::{Result, anyhow};
use calspan_core::config::CalSpanConfig;
use calspan_core::event::{AlarmTrigger, Recurrence};
use calspan_core::{Event, EventAttributes};
use owo_colors::OwoColorize;

use crate::dates::parse_datetime;

pub struct AddArgs {
    pub title: String,
    pub start: String,
    pub end: String,
    pub all_day: bool,
    pub calendar: String,
    pub rrule: Option<String>,
    pub alarms: Vec<i64>,
}

pub async fn run(config: &CalSpanConfig, args: AddArgs) -> Result<()> {
    let store = super::open_store(config)?;

    let mut event = Event::new();
    event.set_calendar_id_str(&args.calendar)?;

    event
        .update_attributes(EventAttributes {
            is_all_day: Some(args.all_day),
            start_date: Some(parse_datetime(&args.start)?),
            end_date: Some(parse_datetime(&args.end)?),
            title: Some(args.title),
            alarms: Some(args.alarms.into_iter().map(AlarmTrigger::display).collect()),
            recurrence: args.rrule.map(|rrule| Recurrence {
                rrule,
                exdates: Vec::new(),
            }),
            ..Default::default()
        })
        .map_err(|errors| {
            let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
            anyhow!("Invalid event: {}", names.join(", "))
        })?;

    let busytimes = store.persist(&event, None).await?;

    println!("{} {}", "Created:".green(), event.title());
    println!("  {} {}", "id".dimmed(), event.id());
    println!("  {} {}", "busytimes".dimmed(), busytimes.len());

    Ok(())
}
