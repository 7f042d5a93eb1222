/*!
 # Schedule table

 The user-facing view of the device's action memory: one row per slot, each
 field optional on its own. A row only becomes a device [`Action`] once its
 major, minor, time and command are all set.

 This module also owns the pure half of writing a schedule: turning the
 sparse table into the dense, capacity-long slot array (see [`Schedule::plan`]).
*/

use std::cmp::Ordering;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::types::Action;
use crate::{Error, Result};

/// Weekday names as shown and stored, Monday first
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Date format used in the table and in schedule files
pub const DATE_FORMAT: &str = "%d-%m-%Y";
/// Time format used in the table and in schedule files
pub const TIME_FORMAT: &str = "%H:%M";

/// What a scheduled action does to its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SwitchCommand {
    Off,
    On,
}

impl SwitchCommand {
    /// Wire value: 0 = off, 1 = on
    pub fn code(self) -> u8 {
        match self {
            SwitchCommand::Off => 0,
            SwitchCommand::On => 1,
        }
    }

    /// Anything other than 1 reads as off
    pub fn from_code(code: u8) -> Self {
        if code == 1 {
            SwitchCommand::On
        } else {
            SwitchCommand::Off
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SwitchCommand::Off => "Off",
            SwitchCommand::On => "On",
        }
    }
}

impl std::fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SwitchCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "on" | "1" => Ok(SwitchCommand::On),
            "off" | "0" => Ok(SwitchCommand::Off),
            other => Err(Error::Validation(format!(
                "command must be On or Off, got {:?}",
                other
            ))),
        }
    }
}

/// A column of the schedule table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Major,
    Minor,
    Date,
    Weekday,
    Time,
    Command,
}

impl Column {
    /// All columns in table order
    pub const ALL: [Column; 6] = [
        Column::Major,
        Column::Minor,
        Column::Date,
        Column::Weekday,
        Column::Time,
        Column::Command,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Major => "Major",
            Column::Minor => "Minor",
            Column::Date => "Date",
            Column::Weekday => "Weekday",
            Column::Time => "Time",
            Column::Command => "Command",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header())
    }
}

impl std::str::FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Column::ALL
            .into_iter()
            .find(|c| c.header().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown column {:?}", s)))
    }
}

/// One row of the schedule table; every field may be unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleRow {
    /// Group identifier (one ASCII character)
    pub major: Option<char>,
    pub minor: Option<u8>,
    /// Fires only on this date when set
    pub date: Option<NaiveDate>,
    /// Fires only on this weekday when set
    pub weekday: Option<Weekday>,
    /// Minute precision
    pub time: Option<NaiveTime>,
    pub command: Option<SwitchCommand>,
}

impl ScheduleRow {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when major, minor, time and command are all set
    pub fn is_complete(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.time.is_some() && self.command.is_some()
    }

    /// Decodes a slot read from the device
    ///
    /// An invalid slot gives an empty row whatever its other bytes hold.
    /// A zero day or weekday means the action has no date or weekday.
    pub fn from_action(action: &Action) -> Self {
        if !action.valid {
            return Self::default();
        }

        let major = if action.major.is_ascii() {
            Some(action.major as char)
        } else {
            warn!("Slot major {:#04x} is not ASCII, leaving it unset", action.major);
            None
        };

        let date = if action.day == 0 {
            None
        } else {
            let date = NaiveDate::from_ymd_opt(
                2000 + action.year as i32,
                action.month as u32,
                action.day as u32,
            );
            if date.is_none() {
                warn!(
                    "Slot date {}-{}-{} is not a calendar date, leaving it unset",
                    action.day,
                    action.month,
                    2000 + action.year as u16
                );
            }
            date
        };

        let weekday = match action.weekday {
            0 => None,
            wd @ 1..=7 => Some(WEEKDAYS[wd as usize - 1]),
            wd => {
                warn!("Slot weekday {} is out of range, leaving it unset", wd);
                None
            }
        };

        let time = NaiveTime::from_hms_opt(action.hour as u32, action.minute as u32, 0);
        if time.is_none() {
            warn!(
                "Slot time {}:{} is out of range, leaving it unset",
                action.hour, action.minute
            );
        }

        Self {
            major,
            minor: Some(action.minor),
            date,
            weekday,
            time,
            command: Some(SwitchCommand::from_code(action.command)),
        }
    }

    /// Encodes a complete row as a valid device action
    ///
    /// Unset date and weekday encode as 0. Returns `Ok(None)` for incomplete rows.
    pub fn to_action(&self) -> Result<Option<Action>> {
        let (Some(major), Some(minor), Some(time), Some(command)) =
            (self.major, self.minor, self.time, self.command)
        else {
            return Ok(None);
        };

        if !major.is_ascii() {
            return Err(Error::Validation(format!(
                "major {:?} is not an ASCII character",
                major
            )));
        }

        let (day, month, year) = match self.date {
            Some(date) => (date.day() as u8, date.month() as u8, year_offset(date)?),
            None => (0, 0, 0),
        };

        Ok(Some(Action {
            valid: true,
            major: major as u8,
            minor,
            day,
            month,
            year,
            weekday: self
                .weekday
                .map(|wd| wd.number_from_monday() as u8)
                .unwrap_or(0),
            hour: time.hour() as u8,
            minute: time.minute() as u8,
            command: command.code(),
        }))
    }

    /// The field as table text, `None` when unset
    pub fn field_text(&self, column: Column) -> Option<String> {
        match column {
            Column::Major => self.major.map(|c| c.to_string()),
            Column::Minor => self.minor.map(|m| m.to_string()),
            Column::Date => self.date.map(|d| d.format(DATE_FORMAT).to_string()),
            Column::Weekday => self
                .weekday
                .map(|wd| WEEKDAY_NAMES[wd.num_days_from_monday() as usize].to_string()),
            Column::Time => self.time.map(|t| t.format(TIME_FORMAT).to_string()),
            Column::Command => self.command.map(|c| c.label().to_string()),
        }
    }

    /// Sets a field from table text; blank text clears the field
    pub fn set_field(&mut self, column: Column, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            self.clear_field(column);
            return Ok(());
        }

        match column {
            Column::Major => self.major = Some(parse_major(text)?),
            Column::Minor => {
                self.minor = Some(text.parse().map_err(|_| {
                    Error::Validation(format!("minor must be 0-255, got {:?}", text))
                })?)
            }
            Column::Date => {
                let date = NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| {
                    Error::Validation(format!("date must be dd-mm-yyyy, got {:?}", text))
                })?;
                year_offset(date)?;
                self.date = Some(date);
            }
            Column::Weekday => self.weekday = Some(parse_weekday(text)?),
            Column::Time => {
                self.time = Some(NaiveTime::parse_from_str(text, TIME_FORMAT).map_err(|_| {
                    Error::Validation(format!("time must be hh:mm, got {:?}", text))
                })?)
            }
            Column::Command => self.command = Some(text.parse()?),
        }
        Ok(())
    }

    pub fn clear_field(&mut self, column: Column) {
        match column {
            Column::Major => self.major = None,
            Column::Minor => self.minor = None,
            Column::Date => self.date = None,
            Column::Weekday => self.weekday = None,
            Column::Time => self.time = None,
            Column::Command => self.command = None,
        }
    }

    fn sort_key(&self, column: Column) -> Option<i64> {
        match column {
            Column::Major => self.major.map(|c| c as i64),
            Column::Minor => self.minor.map(i64::from),
            Column::Date => self.date.map(|d| d.num_days_from_ce() as i64),
            Column::Weekday => self.weekday.map(|wd| wd.num_days_from_monday() as i64),
            Column::Time => self.time.map(|t| t.num_seconds_from_midnight() as i64),
            Column::Command => self.command.map(|c| c.code() as i64),
        }
    }

    fn to_record(&self) -> RowRecord {
        Column::ALL.map(|column| self.field_text(column).map(Cell::Text))
    }

    fn from_record(record: RowRecord) -> Result<Self> {
        let mut row = Self::default();
        for (column, cell) in Column::ALL.into_iter().zip(record) {
            if let Some(cell) = cell {
                row.set_field(column, &cell.into_text())?;
            }
        }
        Ok(row)
    }
}

impl std::fmt::Display for ScheduleRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<String> = Column::ALL
            .into_iter()
            .map(|column| self.field_text(column).unwrap_or_else(|| "-".to_string()))
            .collect();
        write!(
            f,
            "{:<5} {:<5} {:<10} {:<9} {:<5} {}",
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]
        )
    }
}

fn parse_major(text: &str) -> Result<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(Error::Validation(format!(
            "major must be a single ASCII character, got {:?}",
            text
        ))),
    }
}

fn parse_weekday(text: &str) -> Result<Weekday> {
    if let Ok(number) = text.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|i| WEEKDAYS.get(i).copied())
            .ok_or_else(|| Error::Validation(format!("weekday number must be 1-7, got {}", number)));
    }
    text.parse::<Weekday>()
        .map_err(|_| Error::Validation(format!("unknown weekday {:?}", text)))
}

fn year_offset(date: NaiveDate) -> Result<u8> {
    u8::try_from(date.year() - 2000).map_err(|_| {
        Error::Validation(format!(
            "date {} cannot be stored on the device (years 2000-2255)",
            date.format(DATE_FORMAT)
        ))
    })
}

/// One cell of a schedule file; minors may be written as numbers by hand
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Cell {
    Text(String),
    Number(u64),
}

impl Cell {
    fn into_text(self) -> String {
        match self {
            Cell::Text(text) => text,
            Cell::Number(n) => n.to_string(),
        }
    }
}

type RowRecord = [Option<Cell>; 6];

/// Result of laying a schedule out over the device slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    /// Exactly `capacity` actions: the scheduled ones first, then empty slots
    pub actions: Vec<Action>,
    /// Number of leading slots holding scheduled actions
    pub used: usize,
    /// Indices of table rows that were set but incomplete, in table order
    pub dropped_rows: Vec<usize>,
}

/// The sparse, user-editable schedule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    rows: Vec<ScheduleRow>,
}

impl Schedule {
    /// An all-unset table with one row per device slot
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: vec![ScheduleRow::default(); capacity],
        }
    }

    pub fn from_rows(rows: Vec<ScheduleRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ScheduleRow] {
        &mut self.rows
    }

    pub fn row(&self, index: usize) -> Option<&ScheduleRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Unsets every field of every row
    pub fn clear(&mut self) {
        self.rows.fill(ScheduleRow::default());
    }

    /// Sets one cell from text; blank text clears it
    pub fn set_field(&mut self, row: usize, column: Column, text: &str) -> Result<()> {
        let len = self.rows.len();
        self.rows
            .get_mut(row)
            .ok_or_else(|| Error::Validation(format!("row {} out of range (0..{})", row, len)))?
            .set_field(column, text)
    }

    pub fn clear_field(&mut self, row: usize, column: Column) {
        if let Some(row) = self.rows.get_mut(row) {
            row.clear_field(column);
        }
    }

    /// Sorts the rows by one column; unset values sort after set ones
    ///
    /// Descending order is the exact reverse of ascending, so unset values come first.
    pub fn sort_by(&mut self, column: Column, descending: bool) {
        self.rows.sort_by(|a, b| {
            let (a, b) = (a.sort_key(column), b.sort_key(column));
            match (a, b) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        if descending {
            self.rows.reverse();
        }
    }

    /// Lays the schedule out over `capacity` device slots
    ///
    /// Complete rows are ordered by time (stable, so equal times keep table
    /// order) and placed from slot 0; the remaining slots get [`Action::EMPTY`].
    /// Rows with some but not all required fields are dropped and reported.
    /// More complete rows than slots is an error; nothing is truncated.
    #[instrument(skip(self), fields(rows = self.rows.len()))]
    pub fn plan(&self, capacity: usize) -> Result<SlotPlan> {
        let mut selected: Vec<&ScheduleRow> = Vec::new();
        let mut dropped_rows = Vec::new();

        for (index, row) in self.rows.iter().enumerate() {
            if row.is_complete() {
                selected.push(row);
            } else if !row.is_empty() {
                debug!("Dropping incomplete row {}: {}", index, row);
                dropped_rows.push(index);
            }
        }

        if selected.len() > capacity {
            return Err(Error::CapacityExceeded {
                rows: selected.len(),
                capacity,
            });
        }

        // Option orders unset before set
        selected.sort_by_key(|row| row.time);

        let mut actions = Vec::with_capacity(capacity);
        for row in &selected {
            if let Some(action) = row.to_action()? {
                actions.push(action);
            }
        }
        let used = actions.len();
        actions.resize(capacity, Action::EMPTY);

        if !dropped_rows.is_empty() {
            warn!(
                "{} incomplete rows will not be written: {:?}",
                dropped_rows.len(),
                dropped_rows
            );
        }

        Ok(SlotPlan {
            actions,
            used,
            dropped_rows,
        })
    }

    /// Serializes the table as a JSON array of six-field rows
    pub fn to_json(&self) -> Result<String> {
        let records: Vec<RowRecord> = self.rows.iter().map(ScheduleRow::to_record).collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Parses a table written by [`Schedule::to_json`]; empty strings read as unset
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<RowRecord> = serde_json::from_str(json)?;
        let rows = records
            .into_iter()
            .map(ScheduleRow::from_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    /// Writes the table to a file
    #[instrument(skip(self, path), fields(file = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        debug!("Saved {} rows", self.rows.len());
        Ok(())
    }

    /// Reads a table from a file
    #[instrument(skip(path), fields(file = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let schedule = Self::from_json(&std::fs::read_to_string(path.as_ref())?)?;
        debug!("Loaded {} rows", schedule.rows.len());
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(major: char, minor: u8, time: Option<&str>, command: SwitchCommand) -> ScheduleRow {
        ScheduleRow {
            major: Some(major),
            minor: Some(minor),
            time: time.map(|t| NaiveTime::parse_from_str(t, TIME_FORMAT).unwrap()),
            command: Some(command),
            ..ScheduleRow::default()
        }
    }

    #[test]
    fn plan_orders_by_time_and_pads() {
        let schedule = Schedule::from_rows(vec![
            row('A', 1, Some("09:00"), SwitchCommand::On),
            row('A', 2, Some("07:30"), SwitchCommand::On),
            row('A', 3, None, SwitchCommand::Off),
            row('B', 1, Some("23:15"), SwitchCommand::Off),
        ]);

        let plan = schedule.plan(6).unwrap();
        assert_eq!(plan.used, 3);
        assert_eq!(plan.actions.len(), 6);
        let times: Vec<(u8, u8)> = plan.actions[..3]
            .iter()
            .map(|a| (a.hour, a.minute))
            .collect();
        assert_eq!(times, vec![(7, 30), (9, 0), (23, 15)]);
        assert!(plan.actions[3..].iter().all(|a| *a == Action::EMPTY));
        assert_eq!(plan.dropped_rows, vec![2]);
    }

    #[test]
    fn equal_times_keep_table_order() {
        let schedule = Schedule::from_rows(vec![
            row('A', 1, Some("08:00"), SwitchCommand::On),
            row('A', 2, Some("08:00"), SwitchCommand::Off),
        ]);
        let plan = schedule.plan(2).unwrap();
        assert_eq!(plan.actions[0].minor, 1);
        assert_eq!(plan.actions[1].minor, 2);
    }

    #[test]
    fn plan_rejects_more_rows_than_slots() {
        let schedule = Schedule::from_rows(vec![
            row('A', 1, Some("08:00"), SwitchCommand::On),
            row('A', 2, Some("09:00"), SwitchCommand::On),
            row('A', 3, Some("10:00"), SwitchCommand::On),
        ]);
        assert!(matches!(
            schedule.plan(2),
            Err(Error::CapacityExceeded {
                rows: 3,
                capacity: 2
            })
        ));
    }

    #[test]
    fn unset_date_and_weekday_encode_as_zero() {
        let action = row('C', 4, Some("18:05"), SwitchCommand::On)
            .to_action()
            .unwrap()
            .unwrap();
        assert_eq!(
            action.to_bytes(),
            [1, b'C', 4, 0, 0, 0, 0, 18, 5, 1]
        );
    }

    #[test]
    fn invalid_slot_decodes_to_empty_row() {
        let action = Action {
            valid: false,
            major: b'Z',
            minor: 9,
            day: 1,
            month: 2,
            year: 3,
            weekday: 4,
            hour: 5,
            minute: 6,
            command: 1,
        };
        assert!(ScheduleRow::from_action(&action).is_empty());
    }

    #[test]
    fn valid_slot_decodes_fields() {
        let action = Action {
            valid: true,
            major: b'A',
            minor: 2,
            day: 24,
            month: 12,
            year: 25,
            weekday: 0,
            hour: 6,
            minute: 45,
            command: 1,
        };
        let row = ScheduleRow::from_action(&action);
        assert_eq!(row.field_text(Column::Major).as_deref(), Some("A"));
        assert_eq!(row.field_text(Column::Minor).as_deref(), Some("2"));
        assert_eq!(row.field_text(Column::Date).as_deref(), Some("24-12-2025"));
        assert_eq!(row.weekday, None);
        assert_eq!(row.field_text(Column::Time).as_deref(), Some("06:45"));
        assert_eq!(row.command, Some(SwitchCommand::On));
        assert_eq!(row.to_action().unwrap(), Some(action));
    }

    #[test]
    fn blank_text_clears_a_field() {
        let mut schedule = Schedule::new(2);
        schedule.set_field(0, Column::Weekday, "tuesday").unwrap();
        assert_eq!(schedule.rows()[0].weekday, Some(Weekday::Tue));
        schedule.set_field(0, Column::Weekday, "  ").unwrap();
        assert!(schedule.rows()[0].is_empty());
    }

    #[test]
    fn field_parsing_rejects_bad_input() {
        let mut row = ScheduleRow::default();
        assert!(row.set_field(Column::Major, "AB").is_err());
        assert!(row.set_field(Column::Minor, "256").is_err());
        assert!(row.set_field(Column::Date, "01-01-1999").is_err());
        assert!(row.set_field(Column::Time, "25:00").is_err());
        assert!(row.set_field(Column::Command, "maybe").is_err());
        assert!(row.is_empty());
    }

    #[test]
    fn sort_puts_unset_last() {
        let mut schedule = Schedule::from_rows(vec![
            row('B', 1, None, SwitchCommand::On),
            row('A', 1, Some("12:00"), SwitchCommand::On),
            row('C', 1, Some("06:00"), SwitchCommand::On),
        ]);
        schedule.sort_by(Column::Time, false);
        let majors: Vec<char> = schedule.rows().iter().filter_map(|r| r.major).collect();
        assert_eq!(majors, vec!['C', 'A', 'B']);
    }

    #[test]
    fn json_uses_text_cells_and_nulls() {
        let mut schedule = Schedule::new(2);
        schedule.set_field(0, Column::Major, "A").unwrap();
        schedule.set_field(0, Column::Minor, "3").unwrap();
        schedule.set_field(0, Column::Date, "01-05-2026").unwrap();
        schedule.set_field(0, Column::Time, "07:30").unwrap();
        schedule.set_field(0, Column::Command, "On").unwrap();

        let value: serde_json::Value = serde_json::from_str(&schedule.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                ["A", "3", "01-05-2026", null, "07:30", "On"],
                [null, null, null, null, null, null]
            ])
        );
    }

    #[test]
    fn json_load_normalizes_empty_strings() {
        let json = r#"[["A", 3, "", "Friday", "21:00", "Off"], ["", "", "", "", "", ""]]"#;
        let schedule = Schedule::from_json(json).unwrap();
        assert_eq!(schedule.len(), 2);
        let first = &schedule.rows()[0];
        assert_eq!(first.minor, Some(3));
        assert_eq!(first.date, None);
        assert_eq!(first.weekday, Some(Weekday::Fri));
        assert!(schedule.rows()[1].is_empty());
    }
}
