/// Days on each side of now in which recurring events are expanded.
pub const DEFAULT_SYNC_DAYS: i64 = 365;

/// Upper bound on occurrences generated per recurring event.
pub const DEFAULT_MAX_OCCURRENCES: u16 = 365;

/// Capacity of the change notification channel.
pub const NOTIFICATION_CAPACITY: usize = 256;
