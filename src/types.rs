/*!
 # Records exchanged with the timer appliance

 The fixed-size action slot, the device info block and the clock reading.
*/

use chrono::{NaiveDate, NaiveTime};

use crate::protocol::Command;
use crate::{Error, Result};

/// Size of one action slot in device memory, in bytes
pub const ACTION_RECORD_SIZE: usize = 10;

/// Size of the `get_info` response, in bytes
pub const INFO_RECORD_SIZE: usize = 24;

/// Size of a clock record, in bytes
pub const DATETIME_RECORD_SIZE: usize = 7;

/// One scheduled event slot as stored on the device
///
/// Wire layout (10 bytes): valid, major (ASCII), minor, day, month,
/// year (offset from 2000), weekday, hour, minute, command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    /// Whether the slot holds a meaningful action
    pub valid: bool,
    /// Group identifier, one ASCII character
    pub major: u8,
    /// Unit within the group
    pub minor: u8,
    /// Day of month, 0 when the action has no date
    pub day: u8,
    pub month: u8,
    /// Years since 2000
    pub year: u8,
    /// ISO weekday (1 = Monday), 0 for any day
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    /// 0 = off, 1 = on
    pub command: u8,
}

impl Action {
    /// The pattern written to slots that hold no action
    pub const EMPTY: Action = Action {
        valid: false,
        major: b'0',
        minor: 0,
        day: 0,
        month: 0,
        year: 0,
        weekday: 0,
        hour: 0,
        minute: 0,
        command: 0,
    };

    pub fn to_bytes(&self) -> [u8; ACTION_RECORD_SIZE] {
        [
            self.valid as u8,
            self.major,
            self.minor,
            self.day,
            self.month,
            self.year,
            self.weekday,
            self.hour,
            self.minute,
            self.command,
        ]
    }

    pub fn from_bytes(bytes: &[u8; ACTION_RECORD_SIZE]) -> Self {
        Self {
            valid: bytes[0] == 1,
            major: bytes[1],
            minor: bytes[2],
            day: bytes[3],
            month: bytes[4],
            year: bytes[5],
            weekday: bytes[6],
            hour: bytes[7],
            minute: bytes[8],
            command: bytes[9],
        }
    }

    /// The major identifier as a character
    pub fn major_char(&self) -> char {
        self.major as char
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.valid {
            return write!(f, "(empty)");
        }
        write!(
            f,
            "{}{} {:02}-{:02}-{:04} wd={} {:02}:{:02} cmd={}",
            self.major_char(),
            self.minor,
            self.day,
            self.month,
            2000 + self.year as u16,
            self.weekday,
            self.hour,
            self.minute,
            self.command
        )
    }
}

/// Capabilities reported by the appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub hw_version: String,
    pub sw_version: String,
    /// Bytes of action storage
    pub memory_size: u32,
    /// Number of slots the firmware counts as populated
    pub action_count: u32,
}

impl DeviceInfo {
    /// Number of action slots the device memory holds
    pub fn capacity(&self) -> usize {
        self.memory_size as usize / ACTION_RECORD_SIZE
    }

    /// Parses the 24-byte info block
    ///
    /// Layout: hw_version (3), sw_version (3), memory_size (5 digits),
    /// action_count (5 digits), reserved (8). Text fields are padded with
    /// spaces; an empty numeric field reads as 0.
    pub fn from_bytes(bytes: &[u8; INFO_RECORD_SIZE]) -> Result<Self> {
        Ok(Self {
            hw_version: ascii_field(&bytes[0..3], "hw_version")?.to_string(),
            sw_version: ascii_field(&bytes[3..6], "sw_version")?.to_string(),
            memory_size: numeric_field(&bytes[6..11], "memory_size")?,
            action_count: numeric_field(&bytes[11..16], "action_count")?,
        })
    }
}

fn ascii_field<'a>(bytes: &'a [u8], name: &str) -> Result<&'a str> {
    if !bytes.is_ascii() {
        return Err(Error::Protocol {
            command: Command::GetInfo,
            detail: format!("{} is not ASCII: {:02x?}", name, bytes),
        });
    }
    // ASCII is always valid UTF-8
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Protocol {
        command: Command::GetInfo,
        detail: e.to_string(),
    })?;
    Ok(text.trim_matches(|c: char| c == ' ' || c == '\0'))
}

fn numeric_field(bytes: &[u8], name: &str) -> Result<u32> {
    let text = ascii_field(bytes, name)?;
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| Error::Protocol {
        command: Command::GetInfo,
        detail: format!("{} is not a number: {:?}", name, text),
    })
}

/// The appliance clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeInfo {
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// ISO weekday as reported by the device (1 = Monday)
    pub weekday: u8,
}

impl DateTimeInfo {
    /// Decodes dd, mm, yy, wd, hh, mn, ss
    pub fn from_bytes(bytes: &[u8; DATETIME_RECORD_SIZE]) -> Result<Self> {
        let [dd, mm, yy, wd, hh, mn, ss] = *bytes;
        let invalid = |what: &str| Error::Protocol {
            command: Command::GetDateTime,
            detail: format!("invalid {} in {:02x?}", what, bytes),
        };

        let date = NaiveDate::from_ymd_opt(2000 + yy as i32, mm as u32, dd as u32)
            .ok_or_else(|| invalid("date"))?;
        let time = NaiveTime::from_hms_opt(hh as u32, mn as u32, ss as u32)
            .ok_or_else(|| invalid("time"))?;

        Ok(Self {
            date,
            time,
            weekday: wd,
        })
    }

    /// Weekday name, if the device reported a valid ISO weekday
    pub fn weekday_name(&self) -> Option<&'static str> {
        crate::schedule::WEEKDAY_NAMES
            .get((self.weekday as usize).checked_sub(1)?)
            .copied()
    }
}

impl std::fmt::Display for DateTimeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.date.format("%d-%m-%Y"),
            self.time.format("%H:%M:%S"),
            self.weekday_name().unwrap_or("?")
        )
    }
}
