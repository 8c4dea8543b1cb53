//! Data model for zone definitions, observances, and expansion windows.

use jiff::civil::{self, DateTime};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::expand::ExpandError;

/// One UTC-offset change: from `onset` (inclusive) until the next
/// observance's onset, the zone's UTC offset equals `offset` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observance {
    /// The UTC instant at which the offset takes effect.
    pub onset: Timestamp,
    /// The UTC offset in seconds, practically within ±18h.
    pub offset: i32,
}

/// A synthesized observance describing the offset in effect at the start of
/// a window whose true rule history begins earlier.
///
/// `daylight` records whether the candidate rule that supplied the offset was
/// a daylight or a standard rule, so callers rendering a truncated definition
/// can pick the matching component as a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    pub onset: Timestamp,
    pub offset: i32,
    pub daylight: bool,
}

/// Half-open UTC instant range `[start, end)` over which observances are
/// expanded. `end == None` means the window is open-ended upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: Timestamp,
    end: Option<Timestamp>,
}

impl Window {
    /// Builds a window, validating that a closed window is non-empty.
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> Result<Self, ExpandError> {
        if let Some(end) = end {
            if start >= end {
                return Err(ExpandError::InvalidWindow { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Builds a closed window `[start, end)`.
    pub fn closed(start: Timestamp, end: Timestamp) -> Result<Self, ExpandError> {
        Self::new(start, Some(end))
    }

    /// Builds a window with no upper bound.
    pub fn open_ended(start: Timestamp) -> Self {
        Self { start, end: None }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }
}

/// Day of the week, serialized by its lowercase English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub(crate) fn to_civil(self) -> civil::Weekday {
        match self {
            Weekday::Monday => civil::Weekday::Monday,
            Weekday::Tuesday => civil::Weekday::Tuesday,
            Weekday::Wednesday => civil::Weekday::Wednesday,
            Weekday::Thursday => civil::Weekday::Thursday,
            Weekday::Friday => civil::Weekday::Friday,
            Weekday::Saturday => civil::Weekday::Saturday,
            Weekday::Sunday => civil::Weekday::Sunday,
        }
    }
}

/// Selects the nth weekday of a month; `nth` is negative to count from the
/// end of the month (`-1` = last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByDay {
    pub nth: i8,
    pub weekday: Weekday,
}

fn default_interval() -> i16 {
    1
}

/// A yearly repetition of a rule component's start instant.
///
/// Zone definitions in this domain only ever repeat yearly, so the descriptor
/// is a month plus an optional weekday selector rather than a general
/// recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    /// Inclusive UTC end of the repetition; `None` repeats forever.
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Month of year each instance falls in (1..=12).
    pub month: i8,
    /// Weekday-of-month selector; `None` reuses the start's calendar day.
    #[serde(default)]
    pub by_day: Option<ByDay>,
    /// Year step between instances.
    #[serde(default = "default_interval")]
    pub interval: i16,
}

impl Repeat {
    /// The rule's local instance in the given year, carrying the start's
    /// time of day. Returns `None` when the selector has no instance in
    /// that year (e.g. a start on Feb 29).
    pub fn instance(&self, year: i16, start: DateTime) -> Result<Option<DateTime>, jiff::Error> {
        let date = match self.by_day {
            Some(sel) => {
                let first = civil::Date::new(year, self.month, 1)?;
                match first.nth_weekday_of_month(sel.nth, sel.weekday.to_civil()) {
                    Ok(date) => date,
                    Err(_) => return Ok(None),
                }
            }
            None => match civil::Date::new(year, self.month, start.day()) {
                Ok(date) => date,
                Err(_) => return Ok(None),
            },
        };
        Ok(Some(date.to_datetime(start.time())))
    }

    pub(crate) fn interval_years(&self) -> i32 {
        i32::from(self.interval.max(1))
    }
}

/// One standard- or daylight-type sub-rule of a zone definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleComponent {
    /// Local wall-clock instant at which the rule first applies.
    pub start: DateTime,
    /// Offset in effect immediately before this rule, in seconds; used to
    /// normalize `start` (and every repeated instance) to UTC.
    pub offset_from: i32,
    /// Offset this rule establishes, in seconds.
    pub offset_to: i32,
    /// Whether this is a daylight-saving rule.
    #[serde(default)]
    pub daylight: bool,
    /// Optional yearly repetition of the start instant.
    #[serde(default)]
    pub repeat: Option<Repeat>,
    /// Explicit extra local instants at which the rule also applies.
    #[serde(default)]
    pub extra_dates: Vec<DateTime>,
}

/// An unordered set of rule components describing one timezone.
///
/// Conventionally one standard and up to one daylight component, but the
/// expansion engine tolerates any number of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub components: Vec<RuleComponent>,
}

impl ZoneDefinition {
    /// True when the definition has exactly one standard component and no
    /// daylight component, the shape eligible for a fixed-offset identifier.
    pub fn single_standard(&self) -> bool {
        let standard = self.components.iter().filter(|c| !c.daylight).count();
        standard == 1 && standard == self.components.len()
    }
}
