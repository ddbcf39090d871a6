use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ParseError, types::ApplianceCommand};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn from_minutes(minutes: u16) -> Self {
        let minutes = minutes % MINUTES_PER_DAY;
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    pub fn minutes(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

// Hour first, then minute. Comparing the fields independently misorders
// 07:30 against 08:15.
impl Ord for TimeOfDay {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.hour, self.minute).cmp(&(other.hour, other.minute))
    }
}

impl PartialOrd for TimeOfDay {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub hour: u8,
    pub minute: u8,
    pub power: bool,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: i32,
}

impl ScheduleEntry {
    pub fn time(&self) -> TimeOfDay {
        TimeOfDay {
            hour: self.hour,
            minute: self.minute,
        }
    }

    pub fn command(&self) -> ApplianceCommand {
        ApplianceCommand {
            power: self.power,
            target_temperature: self.target_temperature,
        }
    }
}

/// Daily change-points, non-empty and strictly ascending by time of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Result<Self, ParseError> {
        if entries.is_empty() {
            return Err(ParseError::Empty);
        }

        for (index, entry) in entries.iter().enumerate() {
            if entry.hour > 23 {
                return Err(ParseError::HourOutOfRange {
                    index,
                    hour: entry.hour.into(),
                });
            }
            if entry.minute > 59 {
                return Err(ParseError::MinuteOutOfRange {
                    index,
                    minute: entry.minute.into(),
                });
            }
        }

        for (offset, pair) in entries.windows(2).enumerate() {
            let index = offset + 1;
            let (previous, current) = (pair[0].time(), pair[1].time());
            match current.cmp(&previous) {
                Ordering::Greater => {}
                Ordering::Equal => {
                    return Err(ParseError::Duplicate {
                        index,
                        hour: current.hour,
                        minute: current.minute,
                    })
                }
                Ordering::Less => {
                    return Err(ParseError::OutOfOrder {
                        index,
                        hour: current.hour,
                        minute: current.minute,
                    })
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleEntry> {
        self.entries.get(index)
    }
}

/// Parses a schedule document.
///
/// The document is a JSON array. Each record is either the compact tuple
/// `[hour, minute, power, targetTemperature]` or an object with those keys.
/// `power` accepts `true`/`false` or the integers `0`/`1`; anything else is
/// rejected rather than coerced. One bad record fails the whole document.
pub fn parse(document: &[u8]) -> Result<Schedule, ParseError> {
    let root: Value =
        serde_json::from_slice(document).map_err(|err| ParseError::Syntax(err.to_string()))?;

    let Value::Array(records) = root else {
        return Err(ParseError::Syntax("expected a top-level array".to_string()));
    };

    let entries = records
        .iter()
        .enumerate()
        .map(|(index, record)| parse_record(index, record))
        .collect::<Result<Vec<_>, _>>()?;

    Schedule::new(entries)
}

fn parse_record(index: usize, record: &Value) -> Result<ScheduleEntry, ParseError> {
    let (hour, minute, power, temperature) = match record {
        Value::Array(fields) if fields.len() == 4 => {
            (&fields[0], &fields[1], &fields[2], &fields[3])
        }
        Value::Object(fields) => {
            let field = |name: &str| {
                fields.get(name).ok_or_else(|| {
                    ParseError::Syntax(format!("entry {index}: missing field `{name}`"))
                })
            };
            (
                field("hour")?,
                field("minute")?,
                field("power")?,
                field("targetTemperature")?,
            )
        }
        _ => {
            return Err(ParseError::Syntax(format!(
                "entry {index}: expected [hour, minute, power, targetTemperature]"
            )))
        }
    };

    let hour = integer(index, "hour", hour)?;
    if !(0..=23).contains(&hour) {
        return Err(ParseError::HourOutOfRange { index, hour });
    }

    let minute = integer(index, "minute", minute)?;
    if !(0..=59).contains(&minute) {
        return Err(ParseError::MinuteOutOfRange { index, minute });
    }

    let power = match power {
        Value::Bool(flag) => *flag,
        Value::Number(number) => match number.as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => return Err(ParseError::InvalidPower { index }),
        },
        _ => return Err(ParseError::InvalidPower { index }),
    };

    let value = integer(index, "targetTemperature", temperature)?;
    let target_temperature = i32::try_from(value)
        .map_err(|_| ParseError::TemperatureOutOfRange { index, value })?;

    Ok(ScheduleEntry {
        hour: hour as u8,
        minute: minute as u8,
        power,
        target_temperature,
    })
}

fn integer(index: usize, name: &str, value: &Value) -> Result<i64, ParseError> {
    value
        .as_i64()
        .ok_or_else(|| ParseError::Syntax(format!("entry {index}: `{name}` must be an integer")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_compact_tuple_document() {
        let schedule = parse(br#"[[0,0,0,16],[7,0,1,21],[22,30,false,16]]"#).unwrap();

        assert_eq!(schedule.len(), 3);
        assert_eq!(
            schedule.get(1),
            Some(&ScheduleEntry {
                hour: 7,
                minute: 0,
                power: true,
                target_temperature: 21,
            })
        );
        assert!(!schedule.get(2).unwrap().power);
    }

    #[test]
    fn parses_object_records() {
        let document = br#"[
            {"hour": 6, "minute": 15, "power": true, "targetTemperature": 20},
            {"hour": 23, "minute": 0, "power": false, "targetTemperature": 16}
        ]"#;
        let schedule = parse(document).unwrap();

        assert_eq!(schedule.entries()[0].time(), TimeOfDay::new(6, 15).unwrap());
        assert_eq!(schedule.entries()[1].target_temperature, 16);
    }

    #[test]
    fn rejects_duplicate_times() {
        let err = parse(br#"[[8,0,1,20],[8,0,0,16]]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::Duplicate {
                index: 1,
                hour: 8,
                minute: 0
            }
        );
    }

    #[test]
    fn rejects_hour_twenty_four() {
        let err = parse(br#"[[24,0,1,20]]"#).unwrap_err();
        assert_eq!(err, ParseError::HourOutOfRange { index: 0, hour: 24 });
    }

    #[test]
    fn rejects_negative_minute() {
        let err = parse(br#"[[6,-1,1,20]]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::MinuteOutOfRange {
                index: 0,
                minute: -1,
            }
        );
    }

    #[test]
    fn rejects_same_hour_later_minute_out_of_order() {
        let err = parse(br#"[[7,30,1,20],[7,15,0,16]]"#).unwrap_err();
        assert!(matches!(err, ParseError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn rejects_empty_document() {
        assert_eq!(parse(b"[]").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn rejects_coercible_power_values() {
        assert_eq!(
            parse(br#"[[7,0,2,20]]"#).unwrap_err(),
            ParseError::InvalidPower { index: 0 }
        );
        assert_eq!(
            parse(br#"[[7,0,"on",20]]"#).unwrap_err(),
            ParseError::InvalidPower { index: 0 }
        );
    }

    #[test]
    fn rejects_fractional_and_textual_fields() {
        assert!(matches!(
            parse(br#"[[7.5,0,1,20]]"#).unwrap_err(),
            ParseError::Syntax(_)
        ));
        assert!(matches!(
            parse(br#"[["7",0,1,20]]"#).unwrap_err(),
            ParseError::Syntax(_)
        ));
    }

    #[test]
    fn rejects_truncated_json() {
        assert!(matches!(
            parse(br#"[[7,0,1,20],[22,0"#).unwrap_err(),
            ParseError::Syntax(_)
        ));
    }

    #[test]
    fn one_bad_entry_fails_whole_document() {
        let err = parse(br#"[[6,0,1,20],[12,75,1,20],[22,0,0,16]]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::MinuteOutOfRange {
                index: 1,
                minute: 75,
            }
        );
    }

    #[test]
    fn time_of_day_orders_hour_before_minute() {
        let early = TimeOfDay::new(7, 45).unwrap();
        let late = TimeOfDay::new(8, 15).unwrap();

        assert!(early < late);
        assert_eq!(TimeOfDay::from_minutes(22 * 60 + 30), TimeOfDay::new(22, 30).unwrap());
        assert_eq!(late.to_string(), "08:15");
    }
}
