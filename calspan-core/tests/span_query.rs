use calspan_core::db::Db;
use calspan_core::{BusytimeStore, Event, EventAttributes, EventStore, SyncWindow, Timespan};
use chrono::{DateTime, Local, TimeZone};

fn date(y: i32, m: u32, d: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn store() -> EventStore {
    let window = SyncWindow::new(Timespan::new(0, 4_102_444_800_000).unwrap(), 365);
    EventStore::new(BusytimeStore::new(Db::in_memory(), window))
}

async fn add(store: &EventStore, id: &str, start: DateTime<Local>, end: DateTime<Local>) {
    let mut event = Event::new();
    event.set_id(id);
    event
        .update_attributes(EventAttributes {
            calendar_id: Some(1),
            title: Some(id.to_string()),
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        })
        .unwrap();
    store.persist(&event, None).await.unwrap();
}

async fn seed(store: &EventStore) {
    add(store, "next year", date(2013, 2, 1), date(2013, 4, 1)).await;
    add(store, "before long", date(2011, 1, 1), date(2011, 3, 1)).await;
    add(store, "overlap", date(2012, 2, 1), date(2012, 3, 1)).await;
    add(store, "starts before", date(2012, 2, 3), date(2012, 2, 6)).await;
    add(store, "during", date(2012, 2, 5), date(2012, 2, 9)).await;
    add(store, "ends after", date(2012, 2, 9), date(2012, 2, 11)).await;
    add(store, "after", date(2012, 2, 12), date(2012, 2, 15)).await;
}

fn event_ids(busytimes: &[calspan_core::Busytime]) -> Vec<&str> {
    busytimes.iter().map(|b| b.event_id.as_str()).collect()
}

#[tokio::test]
async fn test_load_span_returns_overlapping_events_by_start() {
    let store = store();
    seed(&store).await;

    let query = Timespan::from_dates(&date(2012, 2, 5), &date(2012, 2, 10)).unwrap();
    let found = store.busytimes().load_span(query).await.unwrap();

    assert_eq!(
        event_ids(&found),
        vec!["overlap", "starts before", "during", "ends after"]
    );
}

#[tokio::test]
async fn test_repeated_and_narrower_queries_agree() {
    let store = store();
    seed(&store).await;
    let busytimes = store.busytimes();

    let wide = Timespan::from_dates(&date(2012, 2, 5), &date(2012, 2, 10)).unwrap();
    let first = busytimes.load_span(wide).await.unwrap();
    let second = busytimes.load_span(wide).await.unwrap();
    assert_eq!(first, second);

    let narrow = Timespan::from_dates(&date(2012, 2, 10), &date(2012, 2, 13)).unwrap();
    let found = busytimes.load_span(narrow).await.unwrap();
    assert_eq!(event_ids(&found), vec!["overlap", "ends after", "after"]);
}

#[tokio::test]
async fn test_query_sees_later_writes() {
    let store = store();
    seed(&store).await;
    let query = Timespan::from_dates(&date(2012, 2, 5), &date(2012, 2, 10)).unwrap();

    assert_eq!(store.busytimes().load_span(query).await.unwrap().len(), 4);

    add(&store, "late addition", date(2012, 2, 7), date(2012, 2, 8)).await;
    store.remove("overlap", None).await.unwrap();

    let found = store.busytimes().load_span(query).await.unwrap();
    assert_eq!(
        event_ids(&found),
        vec!["starts before", "during", "late addition", "ends after"]
    );
}

#[tokio::test]
async fn test_single_event_outside_sync_window_is_still_found() {
    let window = SyncWindow::new(
        Timespan::from_dates(&date(2024, 1, 1), &date(2025, 1, 1)).unwrap(),
        365,
    );
    let store = EventStore::new(BusytimeStore::new(Db::in_memory(), window));
    add(&store, "far future", date(2027, 6, 1), date(2027, 6, 2)).await;

    assert_eq!(store.busytimes().count().await.unwrap(), 1);

    let query = Timespan::from_dates(&date(2027, 5, 30), &date(2027, 6, 3)).unwrap();
    let found = store.busytimes().load_span(query).await.unwrap();
    assert_eq!(event_ids(&found), vec!["far future"]);
}
