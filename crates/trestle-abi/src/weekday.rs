//! Enumerant-to-integer mapping and modular day arithmetic. Both sides bake
//! this mapping in at build time.

use std::fmt;
use std::str::FromStr;

/// Cardinality of the week enumeration.
pub const WEEK_LEN: i32 = 7;

#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WeekDay {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
    Saturday = 5,
    Sunday = 6,
}

const ALL_DAYS: [WeekDay; WEEK_LEN as usize] = [
    WeekDay::Monday,
    WeekDay::Tuesday,
    WeekDay::Wednesday,
    WeekDay::Thursday,
    WeekDay::Friday,
    WeekDay::Saturday,
    WeekDay::Sunday,
];

impl WeekDay {
    /// Decodes a wire discriminant, rejecting anything outside `0..WEEK_LEN`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if (0..WEEK_LEN).contains(&raw) {
            Some(ALL_DAYS[raw as usize])
        } else {
            None
        }
    }

    /// Modular day addition. The offset may be any `i32`, negative included;
    /// Euclidean remainder keeps the result in `0..WEEK_LEN` for every input.
    pub fn add(self, offset: i32) -> Self {
        let raw = (self as i64 + offset as i64).rem_euclid(WEEK_LEN as i64);
        ALL_DAYS[raw as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            WeekDay::Monday => "Monday",
            WeekDay::Tuesday => "Tuesday",
            WeekDay::Wednesday => "Wednesday",
            WeekDay::Thursday => "Thursday",
            WeekDay::Friday => "Friday",
            WeekDay::Saturday => "Saturday",
            WeekDay::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for WeekDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct ParseWeekDayError {
    value: String,
}

impl fmt::Display for ParseWeekDayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown day of the week: {:?}", self.value)
    }
}

impl std::error::Error for ParseWeekDayError {}

impl FromStr for WeekDay {
    type Err = ParseWeekDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.to_ascii_lowercase();
        match s.as_str() {
            "monday" => Ok(WeekDay::Monday),
            "tuesday" => Ok(WeekDay::Tuesday),
            "wednesday" => Ok(WeekDay::Wednesday),
            "thursday" => Ok(WeekDay::Thursday),
            "friday" => Ok(WeekDay::Friday),
            "saturday" => Ok(WeekDay::Saturday),
            "sunday" => Ok(WeekDay::Sunday),
            _ => Err(ParseWeekDayError { value: s }),
        }
    }
}
