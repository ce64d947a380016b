// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::Date;

use crate::dates::{format_display_date, format_iso_date};
use crate::ids::AssetId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusState {
    Operational,
    Maintenance,
    Repair,
    OnSite,
    Other(String),
}

impl StatusState {
    pub const KNOWN: [Self; 4] = [
        Self::Operational,
        Self::Maintenance,
        Self::Repair,
        Self::OnSite,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Operational => "operational",
            Self::Maintenance => "maintenance",
            Self::Repair => "repair",
            Self::OnSite => "on_site",
            Self::Other(value) => value,
        }
    }

    /// Unknown states are kept verbatim so a round trip through the grid
    /// never rewrites what the server sent.
    pub fn parse(value: &str) -> Self {
        match value {
            "operational" => Self::Operational,
            "maintenance" => Self::Maintenance,
            "repair" => Self::Repair,
            "on_site" => Self::OnSite,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Operational => "operational",
            Self::Maintenance => "maintenance",
            Self::Repair => "repair",
            Self::OnSite => "on site",
            Self::Other(value) => value,
        }
    }

    pub const fn uses_level(&self) -> bool {
        matches!(self, Self::Operational | Self::Maintenance)
    }

    pub fn cycle(&self, delta: isize) -> Self {
        let len = Self::KNOWN.len() as isize;
        let current = Self::KNOWN
            .iter()
            .position(|state| state == self)
            .map_or(if delta < 0 { 0 } else { -1 }, |index| index as isize);
        let next = (current + delta).rem_euclid(len) as usize;
        Self::KNOWN[next].clone()
    }
}

pub const MAX_STATUS_LEVEL: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetStatus {
    pub state: StatusState,
    pub level: Option<u8>,
}

impl AssetStatus {
    pub fn new(state: StatusState, level: Option<u8>) -> Self {
        Self { state, level }
    }

    pub fn display(&self) -> String {
        match self.level {
            Some(level) if self.state.uses_level() => {
                format!("{} ({level}/{MAX_STATUS_LEVEL})", self.state.label())
            }
            _ => self.state.label().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub serial: String,
    pub category: String,
    pub brand: String,
    pub asset_type: String,
    pub vehicle: String,
    pub status: AssetStatus,
    pub end_date: Option<Date>,
    pub sub_rows: Vec<AssetRecord>,
}

impl AssetRecord {
    pub fn cell_text(&self, column: ColumnId) -> String {
        match column {
            ColumnId::Select => String::new(),
            ColumnId::Id => self.id.to_string(),
            ColumnId::Serial => self.serial.clone(),
            ColumnId::Category => self.category.clone(),
            ColumnId::Brand => self.brand.clone(),
            ColumnId::Type => self.asset_type.clone(),
            ColumnId::Vehicle => self.vehicle.clone(),
            ColumnId::EndDate => self.end_date.map(format_display_date).unwrap_or_default(),
            ColumnId::Status => self.status.display(),
        }
    }

    /// Raw value a cell editor starts from; dates use the canonical form.
    pub fn edit_text(&self, field: AssetField) -> String {
        match field {
            AssetField::Serial => self.serial.clone(),
            AssetField::Category => self.category.clone(),
            AssetField::Brand => self.brand.clone(),
            AssetField::Type => self.asset_type.clone(),
            AssetField::Vehicle => self.vehicle.clone(),
            AssetField::EndDate => self.end_date.map(format_iso_date).unwrap_or_default(),
            AssetField::Status => self.status.state.as_str().to_owned(),
        }
    }

    pub fn apply(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Serial(text) => self.serial = text.clone(),
            FieldValue::Category(text) => self.category = text.clone(),
            FieldValue::Brand(text) => self.brand = text.clone(),
            FieldValue::Type(text) => self.asset_type = text.clone(),
            FieldValue::Vehicle(text) => self.vehicle = text.clone(),
            FieldValue::EndDate(date) => self.end_date = *date,
            FieldValue::Status(status) => self.status = status.clone(),
        }
    }

    pub fn has_sub_rows(&self) -> bool {
        !self.sub_rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetField {
    Serial,
    Category,
    Brand,
    Type,
    Vehicle,
    EndDate,
    Status,
}

impl AssetField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Category => "category",
            Self::Brand => "brand",
            Self::Type => "type",
            Self::Vehicle => "vehicle",
            Self::EndDate => "endDate",
            Self::Status => "status",
        }
    }

    pub const fn column(self) -> ColumnId {
        match self {
            Self::Serial => ColumnId::Serial,
            Self::Category => ColumnId::Category,
            Self::Brand => ColumnId::Brand,
            Self::Type => ColumnId::Type,
            Self::Vehicle => ColumnId::Vehicle,
            Self::EndDate => ColumnId::EndDate,
            Self::Status => ColumnId::Status,
        }
    }
}

/// A new value for one editable field of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Serial(String),
    Category(String),
    Brand(String),
    Type(String),
    Vehicle(String),
    EndDate(Option<Date>),
    Status(AssetStatus),
}

impl FieldValue {
    /// Builds a value for a plain text field. Returns `None` for fields that
    /// carry a typed value.
    pub fn text(field: AssetField, value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        match field {
            AssetField::Serial => Some(Self::Serial(value)),
            AssetField::Category => Some(Self::Category(value)),
            AssetField::Brand => Some(Self::Brand(value)),
            AssetField::Type => Some(Self::Type(value)),
            AssetField::Vehicle => Some(Self::Vehicle(value)),
            AssetField::EndDate | AssetField::Status => None,
        }
    }

    pub const fn field(&self) -> AssetField {
        match self {
            Self::Serial(_) => AssetField::Serial,
            Self::Category(_) => AssetField::Category,
            Self::Brand(_) => AssetField::Brand,
            Self::Type(_) => AssetField::Type,
            Self::Vehicle(_) => AssetField::Vehicle,
            Self::EndDate(_) => AssetField::EndDate,
            Self::Status(_) => AssetField::Status,
        }
    }

    /// JSON body for `PATCH /api/items/{id}`. Status is split into its two
    /// remote attributes; every other field passes through under its own name.
    pub fn to_patch(&self) -> Value {
        match self {
            Self::Status(status) => json!({
                "statusState": status.state.as_str(),
                "statusLevel": status.level,
            }),
            Self::EndDate(date) => {
                let mut body = Map::new();
                body.insert(
                    AssetField::EndDate.as_str().to_owned(),
                    date.map_or(Value::Null, |date| Value::String(format_iso_date(date))),
                );
                Value::Object(body)
            }
            Self::Serial(text)
            | Self::Category(text)
            | Self::Brand(text)
            | Self::Type(text)
            | Self::Vehicle(text) => {
                let mut body = Map::new();
                body.insert(self.field().as_str().to_owned(), Value::String(text.clone()));
                Value::Object(body)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnId {
    Select,
    Id,
    Serial,
    Category,
    Brand,
    Type,
    Vehicle,
    EndDate,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Control,
    ReadOnly,
    Text,
    Select,
    Date,
    Status,
}

impl ColumnId {
    pub const ALL: [Self; 9] = [
        Self::Select,
        Self::Id,
        Self::Serial,
        Self::Category,
        Self::Brand,
        Self::Type,
        Self::Vehicle,
        Self::EndDate,
        Self::Status,
    ];

    pub const DEFAULT_ORDER: [Self; 8] = [
        Self::Select,
        Self::Id,
        Self::Serial,
        Self::Category,
        Self::Brand,
        Self::Type,
        Self::Vehicle,
        Self::Status,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Id => "id",
            Self::Serial => "serial",
            Self::Category => "category",
            Self::Brand => "brand",
            Self::Type => "type",
            Self::Vehicle => "vehicle",
            Self::EndDate => "endDate",
            Self::Status => "status",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "select" => Some(Self::Select),
            "id" => Some(Self::Id),
            "serial" => Some(Self::Serial),
            "category" => Some(Self::Category),
            "brand" => Some(Self::Brand),
            "type" => Some(Self::Type),
            "vehicle" => Some(Self::Vehicle),
            "endDate" => Some(Self::EndDate),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Select => "",
            Self::Id => "Asset ID",
            Self::Serial => "Serial",
            Self::Category => "Category",
            Self::Brand => "Brand",
            Self::Type => "Type",
            Self::Vehicle => "Vehicle",
            Self::EndDate => "End Date",
            Self::Status => "Status",
        }
    }

    pub const fn width(self) -> u16 {
        match self {
            Self::Select => 6,
            Self::Id => 10,
            Self::Serial => 15,
            Self::Category | Self::Brand | Self::Type | Self::Vehicle | Self::EndDate => 14,
            Self::Status => 18,
        }
    }

    pub const fn field(self) -> Option<AssetField> {
        match self {
            Self::Select | Self::Id => None,
            Self::Serial => Some(AssetField::Serial),
            Self::Category => Some(AssetField::Category),
            Self::Brand => Some(AssetField::Brand),
            Self::Type => Some(AssetField::Type),
            Self::Vehicle => Some(AssetField::Vehicle),
            Self::EndDate => Some(AssetField::EndDate),
            Self::Status => Some(AssetField::Status),
        }
    }

    pub const fn cell_kind(self) -> CellKind {
        match self {
            Self::Select => CellKind::Control,
            Self::Id | Self::Vehicle => CellKind::ReadOnly,
            Self::Serial | Self::Brand | Self::Type => CellKind::Text,
            Self::Category => CellKind::Select,
            Self::EndDate => CellKind::Date,
            Self::Status => CellKind::Status,
        }
    }

    pub const fn can_sort(self) -> bool {
        !matches!(self, Self::Select)
    }

    pub const fn can_hide(self) -> bool {
        !matches!(self, Self::Select)
    }

    pub const fn can_filter(self) -> bool {
        !matches!(self, Self::Select)
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetField, AssetStatus, ColumnId, FieldValue, StatusState};
    use serde_json::json;
    use time::{Date, Month};

    #[test]
    fn status_patch_splits_state_and_level() {
        let value = FieldValue::Status(AssetStatus::new(StatusState::Operational, Some(3)));
        assert_eq!(
            value.to_patch(),
            json!({ "statusState": "operational", "statusLevel": 3 })
        );
    }

    #[test]
    fn status_patch_sends_null_level_when_absent() {
        let value = FieldValue::Status(AssetStatus::new(StatusState::Repair, None));
        assert_eq!(
            value.to_patch(),
            json!({ "statusState": "repair", "statusLevel": null })
        );
    }

    #[test]
    fn plain_field_patch_uses_wire_name() {
        let value = FieldValue::text(AssetField::Type, "Excavator").expect("text field");
        assert_eq!(value.to_patch(), json!({ "type": "Excavator" }));
    }

    #[test]
    fn end_date_patch_is_iso_or_null() {
        let date = Date::from_calendar_date(2025, Month::March, 9).expect("valid date");
        assert_eq!(
            FieldValue::EndDate(Some(date)).to_patch(),
            json!({ "endDate": "2025-03-09" })
        );
        assert_eq!(
            FieldValue::EndDate(None).to_patch(),
            json!({ "endDate": null })
        );
    }

    #[test]
    fn text_constructor_rejects_typed_fields() {
        assert!(FieldValue::text(AssetField::EndDate, "2025-01-01").is_none());
        assert!(FieldValue::text(AssetField::Status, "operational").is_none());
    }

    #[test]
    fn unknown_status_state_survives_round_trip() {
        let state = StatusState::parse("decommissioned");
        assert_eq!(state.as_str(), "decommissioned");
        assert!(!state.uses_level());
    }

    #[test]
    fn status_cycle_wraps_and_leaves_unknown_states() {
        assert_eq!(StatusState::OnSite.cycle(1), StatusState::Operational);
        assert_eq!(StatusState::Operational.cycle(-1), StatusState::OnSite);
        assert_eq!(
            StatusState::Other("custom".to_owned()).cycle(1),
            StatusState::Operational
        );
    }

    #[test]
    fn column_ids_round_trip_through_wire_names() {
        for column in ColumnId::ALL {
            assert_eq!(ColumnId::parse(column.as_str()), Some(column));
        }
        assert_eq!(ColumnId::parse("createdAt"), None);
    }
}
