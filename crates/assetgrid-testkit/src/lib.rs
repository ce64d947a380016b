// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use assetgrid_app::{
    ApiError, AssetApi, AssetId, AssetRecord, AssetStatus, MAX_STATUS_LEVEL, NewAsset,
    StatusState, parse_iso_date,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::{Date, Duration, macros::date};

const CATEGORIES: [&str; 6] = [
    "Crane",
    "Excavator",
    "Forklift",
    "Generator",
    "Loader",
    "Truck",
];

const BRANDS: [&str; 8] = [
    "Caterpillar",
    "Doosan",
    "Hitachi",
    "JCB",
    "Komatsu",
    "Liebherr",
    "Scania",
    "Volvo",
];

const TYPES: [&str; 6] = [
    "Articulated",
    "Compact",
    "Mobile",
    "Tipper",
    "Tracked",
    "Wheeled",
];

const REFERENCE_DATE: Date = date!(2026 - 01 - 01);

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of plausible fleet assets. The same seed always yields
/// the same sequence.
#[derive(Debug, Clone)]
pub struct AssetFaker {
    rng: DeterministicRng,
    next_id: u32,
}

impl AssetFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn asset(&mut self) -> AssetRecord {
        let number = self.next_id;
        self.next_id += 1;
        let brand = self.pick(&BRANDS);
        let category = self.pick(&CATEGORIES);
        AssetRecord {
            id: AssetId::new(format!("AST-{number:04}")),
            serial: format!("{}-{:05}", brand_prefix(brand), self.rng.int_n(100_000)),
            category: category.to_owned(),
            brand: brand.to_owned(),
            asset_type: self.pick(&TYPES).to_owned(),
            vehicle: format!("VH-{:03}", self.rng.int_n(1_000)),
            status: self.status(),
            end_date: self.end_date(),
            sub_rows: Vec::new(),
        }
    }

    pub fn assets(&mut self, count: usize) -> Vec<AssetRecord> {
        (0..count).map(|_| self.asset()).collect()
    }

    /// A parent asset carrying `children` sub-rows with their own ids.
    pub fn asset_with_sub_rows(&mut self, children: usize) -> AssetRecord {
        let mut parent = self.asset();
        parent.sub_rows = (1..=children)
            .map(|index| {
                let mut child = self.asset();
                child.id = AssetId::new(format!("{}-{index}", parent.id));
                child
            })
            .collect();
        parent
    }

    pub fn status(&mut self) -> AssetStatus {
        let state = StatusState::KNOWN[self.rng.int_n(StatusState::KNOWN.len())].clone();
        let level = state
            .uses_level()
            .then(|| 1 + self.rng.int_n(usize::from(MAX_STATUS_LEVEL)) as u8);
        AssetStatus::new(state, level)
    }

    fn end_date(&mut self) -> Option<Date> {
        if self.rng.int_n(4) == 0 {
            return None;
        }
        let offset = self.rng.int_n(3 * 365) as i64;
        Some(REFERENCE_DATE - Duration::days(365) + Duration::days(offset))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub fn brand_prefix(brand: &str) -> String {
    brand.chars().take(3).collect::<String>().to_uppercase()
}

pub fn temp_state_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("assetgrid-state.db");
    Ok((dir, path))
}

/// A request observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    List,
    Patch { id: AssetId, body: Value },
    Delete { ids: Vec<AssetId> },
    Create { id: AssetId },
}

/// In-memory `AssetApi` that records every call and fails on demand.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    items: Mutex<Vec<AssetRecord>>,
    calls: Mutex<Vec<ApiCall>>,
    failures: Mutex<VecDeque<ApiError>>,
}

impl ScriptedApi {
    pub fn new(items: Vec<AssetRecord>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    /// The next call fails with `error` instead of touching the items.
    pub fn fail_next(&self, error: ApiError) {
        lock(&self.failures).push_back(error);
    }

    pub fn fail_next_with_status(&self, status: u16, body: &str) {
        self.fail_next(ApiError::Status {
            status,
            body: body.to_owned(),
        });
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    pub fn mutating_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| !matches!(call, ApiCall::List))
            .count()
    }

    pub fn items(&self) -> Vec<AssetRecord> {
        lock(&self.items).clone()
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        lock(&self.calls).push(call);
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl AssetApi for ScriptedApi {
    fn list_items(&self) -> Result<Vec<AssetRecord>, ApiError> {
        self.record(ApiCall::List)?;
        Ok(self.items())
    }

    fn patch_item(&self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
        self.record(ApiCall::Patch {
            id: id.clone(),
            body: patch.clone(),
        })?;
        let mut items = lock(&self.items);
        let record = find_mut(&mut items, id).ok_or_else(|| ApiError::Status {
            status: 404,
            body: format!("item {id} not found"),
        })?;
        apply_patch(record, patch)
    }

    fn delete_items(&self, ids: &[AssetId]) -> Result<(), ApiError> {
        self.record(ApiCall::Delete { ids: ids.to_vec() })?;
        let mut items = lock(&self.items);
        items.retain(|row| !ids.contains(&row.id));
        for row in items.iter_mut() {
            row.sub_rows.retain(|sub| !ids.contains(&sub.id));
        }
        Ok(())
    }

    fn create_item(&self, item: &NewAsset) -> Result<AssetRecord, ApiError> {
        self.record(ApiCall::Create {
            id: item.id.clone(),
        })?;
        let record = AssetRecord {
            id: item.id.clone(),
            serial: item.serial.clone(),
            category: item.category.clone(),
            brand: item.brand.clone(),
            asset_type: item.asset_type.clone(),
            vehicle: item.vehicle.clone(),
            status: item.status.clone(),
            end_date: None,
            sub_rows: Vec::new(),
        };
        lock(&self.items).insert(0, record.clone());
        Ok(record)
    }
}

fn find_mut<'a>(items: &'a mut [AssetRecord], id: &AssetId) -> Option<&'a mut AssetRecord> {
    items.iter_mut().find_map(|row| {
        if &row.id == id {
            Some(row)
        } else {
            row.sub_rows.iter_mut().find(|sub| &sub.id == id)
        }
    })
}

fn apply_patch(record: &mut AssetRecord, patch: &Value) -> Result<(), ApiError> {
    let body = patch
        .as_object()
        .ok_or_else(|| ApiError::Status {
            status: 400,
            body: "patch body must be an object".to_owned(),
        })?;
    for (key, value) in body {
        match (key.as_str(), value) {
            ("serial", Value::String(text)) => record.serial = text.clone(),
            ("category", Value::String(text)) => record.category = text.clone(),
            ("brand", Value::String(text)) => record.brand = text.clone(),
            ("type", Value::String(text)) => record.asset_type = text.clone(),
            ("vehicle", Value::String(text)) => record.vehicle = text.clone(),
            ("endDate", Value::Null) => record.end_date = None,
            ("endDate", Value::String(text)) => {
                record.end_date = Some(parse_iso_date(text).map_err(|error| ApiError::Status {
                    status: 400,
                    body: error.to_string(),
                })?);
            }
            ("statusState", Value::String(text)) => record.status.state = StatusState::parse(text),
            ("statusLevel", Value::Null) => record.status.level = None,
            ("statusLevel", Value::Number(number)) => {
                record.status.level = number.as_u64().and_then(|level| u8::try_from(level).ok());
            }
            _ => {
                return Err(ApiError::Status {
                    status: 400,
                    body: format!("unsupported field {key}"),
                });
            }
        }
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
