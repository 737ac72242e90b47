use std::time::Duration;

use crate::model::Ms;

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const MAX_DURATION_MINUTES: u32 = 480;
/// Longest possible appointment span. Bounds the backward search in a calendar.
pub const MAX_DURATION_MS: Ms = MAX_DURATION_MINUTES as Ms * 60_000;

/// Last instant with a four-digit year, 9999-12-31T23:59:59.999Z. Keeps every
/// stored time renderable as RFC3339 and every span end inside `i64`.
pub const MAX_SCHEDULED_AT: Ms = 253_402_300_799_999;

pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_RESCHEDULES: u32 = 3;
/// A reschedule must be requested at least this long before the current start.
pub const MIN_RESCHEDULE_NOTICE_MS: Ms = 2 * 3_600_000;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE: u32 = 10_000_000;
