/*!
 # Wire protocol of the timer appliance

 Every exchange is a one-byte command code, an optional fixed-size payload,
 then a fixed-size response. There is no framing, checksum or length prefix.
*/

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::types::DATETIME_RECORD_SIZE;
use crate::{Error, Result};

/// Status byte the device sends on success
pub const STATUS_OK: u8 = b'1';
/// Status byte the device sends on failure
pub const STATUS_ERROR: u8 = b'0';

/// Magic trailer guarding the provisioning command, sent little-endian
pub const PROVISION_MAGIC: u16 = 0xABFE;

/// The appliance command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Enable scheduled execution
    StartTimer,
    /// Disable scheduled execution
    StopTimer,
    /// Read the device clock
    GetDateTime,
    /// Write the device clock
    SetDateTime,
    /// Read one action slot
    GetAction,
    /// Write one action slot
    SetAction,
    /// Switch a unit immediately
    Switch,
    /// Query capabilities
    GetInfo,
    /// Provision appliance memory (manufacturer only)
    SetInfo,
    /// Enable debug output on the device
    SetVerbose,
    /// Request a hardware reset
    Reset,
}

impl Command {
    /// The single ASCII byte sent on the wire
    pub fn code(self) -> u8 {
        match self {
            Command::StartTimer => b'A',
            Command::StopTimer => b'B',
            Command::GetDateTime => b'C',
            Command::SetDateTime => b'D',
            Command::GetAction => b'E',
            Command::SetAction => b'F',
            Command::Switch => b'G',
            Command::GetInfo => b'H',
            Command::SetInfo => b'I',
            Command::SetVerbose => b'J',
            Command::Reset => b'K',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'A' => Command::StartTimer,
            b'B' => Command::StopTimer,
            b'C' => Command::GetDateTime,
            b'D' => Command::SetDateTime,
            b'E' => Command::GetAction,
            b'F' => Command::SetAction,
            b'G' => Command::Switch,
            b'H' => Command::GetInfo,
            b'I' => Command::SetInfo,
            b'J' => Command::SetVerbose,
            b'K' => Command::Reset,
            _ => return None,
        })
    }

    /// Number of bytes the device answers with
    pub fn response_len(self) -> usize {
        match self {
            Command::GetDateTime => DATETIME_RECORD_SIZE,
            Command::GetAction => crate::types::ACTION_RECORD_SIZE,
            Command::GetInfo => crate::types::INFO_RECORD_SIZE,
            Command::SetInfo | Command::Reset => 0,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::StartTimer => "start_timer",
            Command::StopTimer => "stop_timer",
            Command::GetDateTime => "get_datetime",
            Command::SetDateTime => "set_datetime",
            Command::GetAction => "get_action",
            Command::SetAction => "set_action",
            Command::Switch => "switch",
            Command::GetInfo => "get_info",
            Command::SetInfo => "set_info",
            Command::SetVerbose => "set_verbose",
            Command::Reset => "reset",
        };
        write!(f, "{} ({})", name, self.code() as char)
    }
}

/// Interprets a one-byte status response
pub fn check_status(command: Command, status: u8) -> Result<()> {
    match status {
        STATUS_OK => Ok(()),
        STATUS_ERROR => Err(Error::Rejected(command)),
        other => Err(Error::Protocol {
            command,
            detail: format!("unexpected status byte {:#04x}", other),
        }),
    }
}

/// Encodes a slot index as the firmware expects it (u16, low byte first)
pub fn encode_index(index: u16) -> [u8; 2] {
    index.to_le_bytes()
}

/// Encodes a clock value as dd, mm, yy, wd, hh, mn, ss
///
/// The weekday uses ISO numbering (Monday = 1) and the year is stored as an
/// offset from 2000, so only the years 2000 to 2255 can be represented.
pub fn encode_datetime(now: &NaiveDateTime) -> Result<[u8; DATETIME_RECORD_SIZE]> {
    let year = now.year();
    if !(2000..=2255).contains(&year) {
        return Err(Error::Validation(format!(
            "year {} cannot be stored on the device (2000-2255)",
            year
        )));
    }

    Ok([
        now.day() as u8,
        now.month() as u8,
        (year - 2000) as u8,
        now.weekday().number_from_monday() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    ])
}

/// Kind of memory holding the action table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// EEPROM internal to the microcontroller
    Internal,
    /// External I2C EEPROM
    I2c,
}

impl MemoryType {
    pub fn code(self) -> u8 {
        match self {
            MemoryType::Internal => 0,
            MemoryType::I2c => 1,
        }
    }
}

/// Factory provisioning record sent with `set_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionInfo {
    pub hw_version: u8,
    pub memory_type: MemoryType,
    /// Bytes of action storage
    pub memory_size: u32,
}

impl ProvisionInfo {
    /// hw_version, memory_type, memory_size (u32 LE), magic (u16 LE)
    pub fn to_bytes(&self) -> [u8; 8] {
        let size = self.memory_size.to_le_bytes();
        let magic = PROVISION_MAGIC.to_le_bytes();
        [
            self.hw_version,
            self.memory_type.code(),
            size[0],
            size[1],
            size[2],
            size[3],
            magic[0],
            magic[1],
        ]
    }
}
