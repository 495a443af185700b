//! Alarm definitions.
//!
//! An [`Alarm`] is plain data: a local wall-clock minute, the weekdays it
//! repeats on, and whether dismissing it takes a solved cube. The scheduler
//! decides when one is due; nothing here keeps time.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlarmError {
    #[error("invalid alarm time {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("unknown day {0:?}")]
    UnknownDay(String),
}

/// Opaque, stable alarm identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a fresh id from the creation instant.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self(format!("alarm_{}", now.timestamp_micros()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AlarmId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Day of the week an alarm repeats on. Serialized as a lowercase name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
#[serde(try_from = "String", into = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[schema(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl TryFrom<String> for Day {
    type Error = AlarmError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.trim()
            .parse()
            .map_err(|_| AlarmError::UnknownDay(name))
    }
}

impl From<Day> for String {
    fn from(day: Day) -> Self {
        day.to_string()
    }
}

impl From<Weekday> for Day {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Day::Monday,
            Weekday::Tue => Day::Tuesday,
            Weekday::Wed => Day::Wednesday,
            Weekday::Thu => Day::Thursday,
            Weekday::Fri => Day::Friday,
            Weekday::Sat => Day::Saturday,
            Weekday::Sun => Day::Sunday,
        }
    }
}

/// Local wall-clock minute an alarm rings at, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime {
    hour: u8,
    minute: u8,
}

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// True when `now` falls anywhere inside this minute.
    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        now.hour() == u32::from(self.hour) && now.minute() == u32::from(self.minute)
    }
}

impl FromStr for AlarmTime {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AlarmError::InvalidTime(s.to_string());

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        // `u8::from_str` takes a leading '+'.
        if !digits(hour) || !digits(minute) {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;

        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = AlarmError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(time: AlarmTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A recurring alarm definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alarm {
    pub id: AlarmId,

    #[schema(value_type = String, example = "07:00")]
    pub time: AlarmTime,

    pub label: String,

    /// Disabled alarms never trigger by schedule.
    pub enabled: bool,

    /// Days the alarm repeats on. Empty means it never triggers by schedule.
    #[schema(value_type = Vec<Day>)]
    pub days: BTreeSet<Day>,

    /// Only a solved cube (or a manual stop) dismisses the alarm.
    pub requires_cube_solve: bool,

    pub created_at: DateTime<Utc>,
}

impl Alarm {
    /// True when the schedule says this alarm rings during `now`'s minute.
    pub fn is_due(&self, now: &NaiveDateTime) -> bool {
        self.enabled && self.days.contains(&Day::from(now.weekday())) && self.time.matches(now)
    }
}

/// Body of an alarm creation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewAlarm {
    /// Client-chosen id. Generated when absent.
    #[serde(default)]
    pub id: Option<AlarmId>,

    #[schema(value_type = String, example = "07:00")]
    pub time: AlarmTime,

    #[serde(default)]
    pub label: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    #[schema(value_type = Vec<Day>)]
    pub days: BTreeSet<Day>,

    #[serde(default = "default_true")]
    pub requires_cube_solve: bool,
}

impl NewAlarm {
    pub fn into_alarm(self, id: AlarmId, created_at: DateTime<Utc>) -> Alarm {
        Alarm {
            id,
            time: self.time,
            label: self.label,
            enabled: self.enabled,
            days: self.days,
            requires_cube_solve: self.requires_cube_solve,
            created_at,
        }
    }
}

/// Partial update of an alarm. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AlarmPatch {
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "06:45")]
    pub time: Option<AlarmTime>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    #[schema(value_type = Option<Vec<Day>>)]
    pub days: Option<BTreeSet<Day>>,

    #[serde(default)]
    pub requires_cube_solve: Option<bool>,
}

impl AlarmPatch {
    pub fn apply(self, alarm: &mut Alarm) {
        if let Some(time) = self.time {
            alarm.time = time;
        }
        if let Some(label) = self.label {
            alarm.label = label;
        }
        if let Some(enabled) = self.enabled {
            alarm.enabled = enabled;
        }
        if let Some(days) = self.days {
            alarm.days = days;
        }
        if let Some(requires_cube_solve) = self.requires_cube_solve {
            alarm.requires_cube_solve = requires_cube_solve;
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use test_case::test_case;

    use super::*;

    /// Monday 2024-01-01 at the given time.
    pub(crate) fn monday_at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .unwrap()
    }

    pub(crate) fn alarm(id: &str, time: &str, days: &[Day]) -> Alarm {
        Alarm {
            id: AlarmId::new(id),
            time: time.parse().unwrap(),
            label: format!("{id} label"),
            enabled: true,
            days: days.iter().copied().collect(),
            requires_cube_solve: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test_case("07:00", 7, 0 ; "padded")]
    #[test_case("7:05", 7, 5 ; "single digit hour")]
    #[test_case("23:59", 23, 59 ; "last minute")]
    #[test_case(" 00:00 ", 0, 0 ; "surrounding whitespace")]
    fn parses_alarm_time(input: &str, hour: u8, minute: u8) {
        let time: AlarmTime = input.parse().unwrap();
        assert_eq!((time.hour(), time.minute()), (hour, minute));
    }

    #[test_case("24:00" ; "hour out of range")]
    #[test_case("12:60" ; "minute out of range")]
    #[test_case("12:5" ; "short minute")]
    #[test_case("1200" ; "missing colon")]
    #[test_case("12:00:00" ; "seconds")]
    #[test_case("" ; "empty")]
    #[test_case("07:+5" ; "signed minute")]
    #[test_case("+7:05" ; "signed hour")]
    fn rejects_bad_alarm_time(input: &str) {
        assert_eq!(
            input.parse::<AlarmTime>(),
            Err(AlarmError::InvalidTime(input.to_string()))
        );
    }

    #[test]
    fn alarm_time_formats_zero_padded() {
        assert_eq!(AlarmTime::new(6, 5).unwrap().to_string(), "06:05");
    }

    #[test]
    fn days_parse_case_insensitively() {
        let days: Vec<Day> = serde_json::from_str(r#"["Monday", "sunday"]"#).unwrap();
        assert_eq!(days, vec![Day::Monday, Day::Sunday]);
        assert!(serde_json::from_str::<Day>(r#""someday""#).is_err());
    }

    #[test]
    fn alarm_serializes_with_wire_names() {
        let json = serde_json::to_value(alarm("a1", "07:00", &[Day::Monday])).unwrap();
        assert_eq!(json["time"], "07:00");
        assert_eq!(json["days"], serde_json::json!(["monday"]));
        assert_eq!(json["requires_cube_solve"], true);
    }

    #[test]
    fn due_only_within_matching_minute_and_day() {
        let a = alarm("a1", "07:00", &[Day::Monday]);

        assert!(a.is_due(&monday_at(7, 0, 0)));
        assert!(a.is_due(&monday_at(7, 0, 59)));
        assert!(!a.is_due(&monday_at(7, 1, 0)));
        assert!(!a.is_due(&monday_at(6, 59, 59)));

        let tuesday = monday_at(7, 0, 0) + chrono::Duration::days(1);
        assert!(!a.is_due(&tuesday));
    }

    #[test]
    fn disabled_or_dayless_alarm_is_never_due() {
        let mut disabled = alarm("a1", "07:00", &[Day::Monday]);
        disabled.enabled = false;
        assert!(!disabled.is_due(&monday_at(7, 0, 0)));

        let dayless = alarm("a2", "07:00", &[]);
        assert!(!dayless.is_due(&monday_at(7, 0, 0)));
    }

    #[test]
    fn new_alarm_defaults() {
        let new: NewAlarm = serde_json::from_str(r#"{"time": "06:30"}"#).unwrap();
        assert!(new.enabled);
        assert!(new.requires_cube_solve);
        assert!(new.days.is_empty());
        assert!(new.id.is_none());
    }

    #[test]
    fn patch_touches_only_given_fields() {
        let mut a = alarm("a1", "07:00", &[Day::Monday]);
        let patch: AlarmPatch = serde_json::from_str(r#"{"label": "Gym", "enabled": false}"#).unwrap();
        patch.apply(&mut a);

        assert_eq!(a.label, "Gym");
        assert!(!a.enabled);
        assert_eq!(a.time.to_string(), "07:00");
        assert!(a.requires_cube_solve);
    }
}
