//! Fire-time arithmetic, clocks, and timestamp serialization.

use crate::error::BeaconError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Source of "now". Injected everywhere time matters so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What to do with a reminder once its fire time is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirePlan {
    /// The reminder window has already opened; deliver right away.
    Immediate(DateTime<Utc>),
    /// Persist and deliver at the given instant.
    Deferred(DateTime<Utc>),
}

impl FirePlan {
    pub fn fire_at(&self) -> DateTime<Utc> {
        match self {
            Self::Immediate(at) | Self::Deferred(at) => *at,
        }
    }
}

/// Parse an IANA zone name (e.g. `Asia/Tokyo`).
pub fn parse_timezone(name: &str) -> Result<Tz, BeaconError> {
    name.parse::<Tz>()
        .map_err(|e| BeaconError::Config(format!("unknown timezone '{name}': {e}")))
}

/// Combine a `YYYY-MM-DD` date and `HH:MM` (or `HH:MM:SS`) time in `tz` into a UTC instant.
pub fn event_time(date: &str, time: &str, tz: Tz) -> Result<DateTime<Utc>, BeaconError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| BeaconError::Validation(format!("invalid date '{date}': {e}")))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|e| BeaconError::Validation(format!("invalid time '{time}': {e}")))?;

    let local = NaiveDateTime::new(date, time);
    // Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| BeaconError::Validation(format!("{local} does not exist in {tz}")))
}

/// `event - reminder_minutes`. Offsets outside chrono's range are a validation error.
pub fn fire_time(
    event: DateTime<Utc>,
    reminder_minutes: i64,
) -> Result<DateTime<Utc>, BeaconError> {
    Duration::try_minutes(reminder_minutes)
        .and_then(|offset| event.checked_sub_signed(offset))
        .ok_or_else(|| {
            BeaconError::Validation(format!(
                "reminderMinutes {reminder_minutes} is out of range"
            ))
        })
}

/// Decide how a reminder for `event` should be handled at `now`.
///
/// Refuses events that have already started; reminders whose window has
/// opened are delivered immediately instead of being deferred.
pub fn plan(
    event: DateTime<Utc>,
    reminder_minutes: i64,
    now: DateTime<Utc>,
) -> Result<FirePlan, BeaconError> {
    if event <= now {
        return Err(BeaconError::EventAlreadyPassed);
    }
    let fire_at = fire_time(event, reminder_minutes)?;
    if fire_at <= now {
        Ok(FirePlan::Immediate(fire_at))
    } else {
        Ok(FirePlan::Deferred(fire_at))
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2025-01-10T09:30:00.000Z`.
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter that writes [`format_iso`] and accepts any RFC 3339 string.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_iso(*at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}
