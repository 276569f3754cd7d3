//! Calendar interval engine.
//!
//! This crate provides:
//! - `Timespan` for half-open interval arithmetic
//! - `Event`, a validated view over persisted event records
//! - `BusytimeStore`, which derives busy intervals from events (expanding
//!   recurrences) and answers cached span queries
//! - `EventStore` and `AlarmStore` around it, over a pluggable `db::Backend`

pub mod alarm;
pub mod busytime;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod event;
pub mod event_store;
pub mod recurrence;
pub mod timespan;

pub use alarm::{Alarm, AlarmStore};
pub use busytime::{Busytime, BusytimeStore, SpanQuery};
pub use error::{CalSpanError, CalSpanResult};
pub use event::{Event, EventAttributes, EventRecord, ValidationError, ValidationErrorKind};
pub use event_store::EventStore;
pub use recurrence::SyncWindow;
pub use timespan::{PointOrSpan, Timespan};
