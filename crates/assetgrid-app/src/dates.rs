// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::{Date, Month};

use crate::cell::CellError;

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";
pub const DISPLAY_DATE_LAYOUT: &str = "DD/MM/YYYY";
pub const MIN_EDIT_YEAR: i32 = 2024;
pub const MAX_EDIT_YEAR: i32 = 2100;

const IMMINENT_DAYS: i64 = 2;
const SOON_DAYS: i64 = 5;

pub fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn format_display_date(date: Date) -> String {
    format!(
        "{:02}/{:02}/{:04}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

/// Literal `DDDD-DD-DD` shape check. Says nothing about calendar validity.
pub fn is_iso_date_shape(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() == DATE_LAYOUT.len()
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

pub fn parse_iso_date(input: &str) -> Result<Date, CellError> {
    if !is_iso_date_shape(input) {
        return Err(CellError::InvalidDate);
    }
    let year = parse_number::<i32>(&input[0..4])?;
    let month = parse_number::<u8>(&input[5..7])?;
    let day = parse_number::<u8>(&input[8..10])?;
    let month = Month::try_from(month).map_err(|_| CellError::InvalidDate)?;
    Date::from_calendar_date(year, month, day).map_err(|_| CellError::InvalidDate)
}

pub fn parse_display_date(input: &str) -> Option<Date> {
    let mut parts = input.split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return None;
    }
    parse_iso_date(&format!("{year}-{month}-{day}")).ok()
}

/// Validates a raw date-cell draft. An empty draft clears the date.
pub fn validate_date_input(input: &str) -> Result<Option<Date>, CellError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !is_iso_date_shape(trimmed) {
        return Err(CellError::InvalidDate);
    }

    let year = parse_number::<i32>(&trimmed[0..4])?;
    if year < MIN_EDIT_YEAR {
        return Err(CellError::YearTooEarly);
    }
    if year > MAX_EDIT_YEAR {
        return Err(CellError::YearTooLate);
    }
    parse_iso_date(trimmed).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowUrgency {
    Normal,
    Soon,
    Imminent,
    Expired,
}

impl RowUrgency {
    pub fn classify(end_date: Option<Date>, today: Date) -> Self {
        let Some(end_date) = end_date else {
            return Self::Normal;
        };
        let days_left = (end_date - today).whole_days();
        if days_left < 0 {
            Self::Expired
        } else if days_left <= IMMINENT_DAYS {
            Self::Imminent
        } else if days_left <= SOON_DAYS {
            Self::Soon
        } else {
            Self::Normal
        }
    }
}

fn parse_number<T: std::str::FromStr>(digits: &str) -> Result<T, CellError> {
    digits.parse::<T>().map_err(|_| CellError::InvalidDate)
}
