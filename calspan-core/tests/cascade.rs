use calspan_core::db::{Collection, Db};
use calspan_core::event::{AlarmTrigger, Recurrence};
use calspan_core::{AlarmStore, BusytimeStore, Event, EventAttributes, EventStore, SyncWindow, Timespan};
use chrono::{Local, TimeZone};

fn stores(db: Db) -> (EventStore, AlarmStore) {
    let window = SyncWindow::new(Timespan::new(0, 4_102_444_800_000).unwrap(), 365);
    (
        EventStore::new(BusytimeStore::new(db.clone(), window)),
        AlarmStore::new(db),
    )
}

fn event(id: &str, day: u32, recurrence: Option<&str>) -> Event {
    let mut event = Event::new();
    event.set_id(id);
    event
        .update_attributes(EventAttributes {
            calendar_id: Some(1),
            title: Some(id.to_string()),
            start_date: Some(Local.with_ymd_and_hms(2012, 3, day, 9, 0, 0).unwrap()),
            end_date: Some(Local.with_ymd_and_hms(2012, 3, day, 10, 0, 0).unwrap()),
            alarms: Some(vec![AlarmTrigger::display(-300)]),
            recurrence: recurrence.map(|rrule| Recurrence {
                rrule: rrule.to_string(),
                exdates: vec![],
            }),
            ..Default::default()
        })
        .unwrap();
    event
}

#[tokio::test]
async fn test_removing_event_cascades_to_busytimes_and_alarms() {
    let (events, alarms) = stores(Db::in_memory());
    events
        .persist(&event("pair", 1, Some("FREQ=DAILY;COUNT=2")), None)
        .await
        .unwrap();
    events.persist(&event("other", 20, None), None).await.unwrap();

    assert_eq!(events.busytimes().count().await.unwrap(), 3);
    assert_eq!(alarms.for_event("pair").await.unwrap().len(), 2);

    events.remove("pair", None).await.unwrap();

    assert_eq!(events.busytimes().count().await.unwrap(), 1);
    assert!(alarms.for_event("pair").await.unwrap().is_empty());
    assert_eq!(alarms.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_cascade_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (events, _) = stores(Db::open(dir.path()).unwrap());
        events
            .persist(&event("pair", 1, Some("FREQ=DAILY;COUNT=2")), None)
            .await
            .unwrap();
        events.persist(&event("other", 20, None), None).await.unwrap();
        events.remove("pair", None).await.unwrap();
    }

    let db = Db::open(dir.path()).unwrap();
    assert_eq!(db.count(Collection::Events).await.unwrap(), 1);
    assert_eq!(db.count(Collection::Busytimes).await.unwrap(), 1);
    assert_eq!(db.count(Collection::Alarms).await.unwrap(), 1);
}
