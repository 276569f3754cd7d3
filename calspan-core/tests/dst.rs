//! Recurring events across a daylight saving change.
//!
//! Pins `TZ` for this test binary, so it holds a single test.

use calspan_core::db::Db;
use calspan_core::event::Recurrence;
use calspan_core::{BusytimeStore, Event, EventAttributes, EventStore, SyncWindow, Timespan};
use chrono::{Local, TimeZone, Timelike};

#[tokio::test]
async fn test_weekly_event_keeps_wall_clock_time_across_dst() {
    // SAFETY: set before any other thread of this binary reads the environment.
    unsafe { std::env::set_var("TZ", "America/New_York") };

    let start = Local.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let end = Local.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
    let window = SyncWindow::new(
        Timespan::from_dates(
            &Local.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            &Local.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        )
        .unwrap(),
        365,
    );
    let store = EventStore::new(BusytimeStore::new(Db::in_memory(), window));

    let mut event = Event::new();
    event.set_id("standup");
    event
        .update_attributes(EventAttributes {
            calendar_id: Some(1),
            start_date: Some(start),
            end_date: Some(end),
            recurrence: Some(Recurrence {
                rrule: "FREQ=WEEKLY;COUNT=3".to_string(),
                exdates: vec![],
            }),
            ..Default::default()
        })
        .unwrap();
    let busytimes = store.persist(&event, None).await.unwrap();

    let hours: Vec<_> = busytimes.iter().map(|b| b.start_date().hour()).collect();
    assert_eq!(hours, vec![10, 10, 10]);
    assert!(busytimes
        .iter()
        .all(|b| b.end_date().hour() == 11));
}
