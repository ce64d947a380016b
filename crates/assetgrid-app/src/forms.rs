// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::ids::AssetId;
use crate::model::{AssetStatus, MAX_STATUS_LEVEL, StatusState};
use crate::table::AssetTable;

/// A validated asset ready for `POST /api/items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub id: AssetId,
    pub serial: String,
    pub category: String,
    pub brand: String,
    pub asset_type: String,
    pub vehicle: String,
    pub status: AssetStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewAssetField {
    Id,
    Serial,
    Category,
    Brand,
    Type,
    Vehicle,
    StatusState,
    StatusLevel,
}

impl NewAssetField {
    pub const ALL: [Self; 8] = [
        Self::Id,
        Self::Serial,
        Self::Category,
        Self::Brand,
        Self::Type,
        Self::Vehicle,
        Self::StatusState,
        Self::StatusLevel,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Id => "Asset ID",
            Self::Serial => "Serial",
            Self::Category => "Category",
            Self::Brand => "Brand",
            Self::Type => "Type",
            Self::Vehicle => "Vehicle",
            Self::StatusState => "Status",
            Self::StatusLevel => "Level (1-5)",
        }
    }
}

/// Raw text of the add-item form, one string per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssetForm {
    pub id: String,
    pub serial: String,
    pub category: String,
    pub brand: String,
    pub asset_type: String,
    pub vehicle: String,
    pub status_state: String,
    pub status_level: String,
}

impl Default for NewAssetForm {
    fn default() -> Self {
        Self {
            id: String::new(),
            serial: String::new(),
            category: String::new(),
            brand: String::new(),
            asset_type: String::new(),
            vehicle: String::new(),
            status_state: StatusState::Operational.as_str().to_owned(),
            status_level: String::new(),
        }
    }
}

impl NewAssetForm {
    pub fn value(&self, field: NewAssetField) -> &str {
        match field {
            NewAssetField::Id => &self.id,
            NewAssetField::Serial => &self.serial,
            NewAssetField::Category => &self.category,
            NewAssetField::Brand => &self.brand,
            NewAssetField::Type => &self.asset_type,
            NewAssetField::Vehicle => &self.vehicle,
            NewAssetField::StatusState => &self.status_state,
            NewAssetField::StatusLevel => &self.status_level,
        }
    }

    pub fn value_mut(&mut self, field: NewAssetField) -> &mut String {
        match field {
            NewAssetField::Id => &mut self.id,
            NewAssetField::Serial => &mut self.serial,
            NewAssetField::Category => &mut self.category,
            NewAssetField::Brand => &mut self.brand,
            NewAssetField::Type => &mut self.asset_type,
            NewAssetField::Vehicle => &mut self.vehicle,
            NewAssetField::StatusState => &mut self.status_state,
            NewAssetField::StatusLevel => &mut self.status_level,
        }
    }

    pub fn validate(&self, table: &AssetTable) -> Result<NewAsset> {
        let id = self.id.trim();
        if id.is_empty() {
            bail!("asset id is required -- enter an id and retry");
        }
        let id = AssetId::from(id);
        if table.find_row(&id).is_some() {
            bail!("asset id {id} already exists -- choose another id");
        }
        if self.serial.trim().is_empty() {
            bail!("serial is required -- enter a serial and retry");
        }
        if self.category.trim().is_empty() {
            bail!("category is required -- enter a category and retry");
        }

        let state = self.status_state.trim();
        if state.is_empty() {
            bail!("status is required -- enter a status such as operational and retry");
        }
        let level = self.status_level.trim();
        let level = if level.is_empty() {
            None
        } else {
            match level.parse::<u8>() {
                Ok(value) if (1..=MAX_STATUS_LEVEL).contains(&value) => Some(value),
                _ => bail!("status level must be a whole number from 1 to {MAX_STATUS_LEVEL}"),
            }
        };

        Ok(NewAsset {
            id,
            serial: self.serial.trim().to_owned(),
            category: self.category.trim().to_owned(),
            brand: self.brand.trim().to_owned(),
            asset_type: self.asset_type.trim().to_owned(),
            vehicle: self.vehicle.trim().to_owned(),
            status: AssetStatus::new(StatusState::parse(state), level),
        })
    }
}
