// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use assetgrid_app::{
    ApiError, AssetApi, AssetId, AssetRecord, AssetStatus, ColumnOrderStore, NewAsset,
    StatusState, format_iso_date, parse_iso_date,
};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

pub const APP_NAME: &str = "assetgrid";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("ui_state", &["key", "value", "updated_at"]),
    (
        "items",
        &[
            "id",
            "parent_id",
            "serial",
            "category",
            "brand",
            "type",
            "vehicle",
            "status_state",
            "status_level",
            "end_date",
            "created_at",
        ],
    ),
];

const ITEM_COLUMNS: &str = "id, parent_id, serial, category, brand, type, vehicle, \
                            status_state, status_level, end_date";

/// SQLite-backed client state, plus an item table that stands in for the
/// remote API in demo mode.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_state_path(&printable)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create state directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open state database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        }
        self.conn
            .execute_batch(include_str!("sql/schema.sql"))
            .context("create schema")
    }

    pub fn get_ui_value(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM ui_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load ui state {key}"))
    }

    pub fn put_ui_value(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO ui_state (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("upsert ui state {key}"))?;
        Ok(())
    }

    /// Top-level items newest first, each with its sub-rows in insertion
    /// order.
    pub fn list_items(&self) -> Result<Vec<AssetRecord>> {
        let mut children: BTreeMap<String, Vec<AssetRecord>> = BTreeMap::new();
        for (parent, record) in self.query_items(
            "WHERE parent_id IS NOT NULL ORDER BY rowid ASC",
            "list sub-rows",
        )? {
            if let Some(parent) = parent {
                children.entry(parent).or_default().push(record);
            }
        }

        let mut items = Vec::new();
        for (_, mut record) in self.query_items(
            "WHERE parent_id IS NULL ORDER BY created_at DESC, rowid DESC",
            "list items",
        )? {
            if let Some(sub_rows) = children.remove(record.id.as_str()) {
                record.sub_rows = sub_rows;
            }
            items.push(record);
        }
        Ok(items)
    }

    fn query_items(
        &self,
        clause: &str,
        what: &'static str,
    ) -> Result<Vec<(Option<String>, AssetRecord)>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM items {clause}"))
            .with_context(|| format!("prepare {what}"))?;
        let rows = stmt
            .query_map([], item_from_row)
            .with_context(|| format!("query {what}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("decode {what}"))
    }

    pub fn item_exists(&self, id: &AssetId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM items WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up item {id}"))?;
        Ok(found.is_some())
    }

    /// Inserts `record` and its sub-rows in one transaction.
    pub fn insert_item(&self, record: &AssetRecord) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin item insert")?;
        let now = now_rfc3339()?;
        insert_row(&tx, record, None, &now)?;
        for sub in &record.sub_rows {
            insert_row(&tx, sub, Some(&record.id), &now)?;
        }
        tx.commit().context("commit item insert")
    }

    pub fn create_item(&self, item: &NewAsset) -> Result<AssetRecord> {
        if self.item_exists(&item.id)? {
            bail!("item {} already exists", item.id);
        }
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
        self.insert_item(&record)?;
        Ok(record)
    }

    /// Applies a partial update. Returns `false` when no item has `id`.
    pub fn update_item(&self, id: &AssetId, patch: &Value) -> Result<bool> {
        let assignments = patch_assignments(patch)?;
        self.apply_assignments(id, &assignments)
    }

    fn apply_assignments(&self, id: &AssetId, assignments: &[(&str, SqlValue)]) -> Result<bool> {
        let set_clause = assignments
            .iter()
            .map(|(column, _)| format!("\"{column}\" = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let values = assignments
            .iter()
            .map(|(_, value)| value.clone())
            .chain(std::iter::once(SqlValue::Text(id.to_string())));
        let changed = self
            .conn
            .execute(
                &format!("UPDATE items SET {set_clause} WHERE id = ?"),
                params_from_iter(values),
            )
            .with_context(|| format!("update item {id}"))?;
        debug!(item = %id, fields = assignments.len(), changed, "applied item patch");
        Ok(changed > 0)
    }

    /// Deletes every listed id in one transaction; sub-rows of a deleted
    /// parent go with it. Unknown ids are skipped.
    pub fn delete_items(&self, ids: &[AssetId]) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin batch delete")?;
        let mut removed = 0;
        for id in ids {
            removed += tx
                .execute("DELETE FROM items WHERE id = ?", params![id.as_str()])
                .with_context(|| format!("delete item {id}"))?;
        }
        tx.commit().context("commit batch delete")?;
        Ok(removed)
    }

    pub fn item_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .context("count items")?;
        usize::try_from(count).context("item count out of range")
    }

    /// Fills an empty item table with a small demo fleet. The first item
    /// carries two sub-rows.
    pub fn seed_demo_data(&self) -> Result<()> {
        if self.item_count()? > 0 {
            return Ok(());
        }
        let today = OffsetDateTime::now_utc().date();
        let mut records: Vec<AssetRecord> = DEMO_FLEET
            .iter()
            .map(|demo| AssetRecord {
                id: AssetId::from(demo.id),
                serial: demo.serial.to_owned(),
                category: demo.category.to_owned(),
                brand: demo.brand.to_owned(),
                asset_type: demo.asset_type.to_owned(),
                vehicle: demo.vehicle.to_owned(),
                status: AssetStatus::new(StatusState::parse(demo.state), demo.level),
                end_date: demo.days_left.map(|days| today + Duration::days(days)),
                sub_rows: Vec::new(),
            })
            .collect();
        if let Some(first) = records.first_mut() {
            first.sub_rows = demo_sales_records(today);
        }
        // Newest first on listing, so insert in reverse.
        for record in records.iter().rev() {
            self.insert_item(record)?;
        }
        info!(count = records.len(), "seeded demo fleet");
        Ok(())
    }
}

impl ColumnOrderStore for Store {
    fn load_raw(&self, key: &str) -> Result<Option<String>> {
        self.get_ui_value(key)
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<()> {
        self.put_ui_value(key, value)
    }
}

impl AssetApi for Store {
    fn list_items(&self) -> Result<Vec<AssetRecord>, ApiError> {
        Store::list_items(self).map_err(server_error)
    }

    fn patch_item(&self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
        let assignments = patch_assignments(patch).map_err(|error| ApiError::Status {
            status: 400,
            body: format!("{error:#}"),
        })?;
        match self.apply_assignments(id, &assignments) {
            Ok(true) => Ok(()),
            Ok(false) => Err(not_found(id)),
            Err(error) => Err(server_error(error)),
        }
    }

    fn delete_items(&self, ids: &[AssetId]) -> Result<(), ApiError> {
        Store::delete_items(self, ids)
            .map(|_| ())
            .map_err(server_error)
    }

    fn create_item(&self, item: &NewAsset) -> Result<AssetRecord, ApiError> {
        if self.item_exists(&item.id).map_err(server_error)? {
            return Err(ApiError::Status {
                status: 409,
                body: format!("item {} already exists", item.id),
            });
        }
        Store::create_item(self, item).map_err(server_error)
    }
}

fn server_error(error: anyhow::Error) -> ApiError {
    ApiError::Status {
        status: 500,
        body: format!("{error:#}"),
    }
}

fn not_found(id: &AssetId) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("item {id} not found"),
    }
}

/// Maps a wire patch body onto allowlisted item columns.
fn patch_assignments(patch: &Value) -> Result<Vec<(&'static str, SqlValue)>> {
    let body = patch
        .as_object()
        .ok_or_else(|| anyhow!("patch body must be a JSON object"))?;
    if body.is_empty() {
        bail!("patch body must name at least one field");
    }
    let mut assignments = Vec::with_capacity(body.len());
    for (key, value) in body {
        let column = match key.as_str() {
            "serial" => "serial",
            "category" => "category",
            "brand" => "brand",
            "type" => "type",
            "vehicle" => "vehicle",
            "statusState" => "status_state",
            "statusLevel" => "status_level",
            "endDate" => "end_date",
            other => bail!("field {other:?} cannot be updated"),
        };
        let sql = match (column, value) {
            ("status_level" | "end_date", Value::Null) => SqlValue::Null,
            ("status_level", Value::Number(number)) => number
                .as_u64()
                .filter(|level| *level <= u64::from(u8::MAX))
                .map(|level| SqlValue::Integer(level as i64))
                .ok_or_else(|| anyhow!("statusLevel must be a small whole number, got {number}"))?,
            ("end_date", Value::String(text)) => {
                parse_iso_date(text).map_err(|error| anyhow!("endDate {text:?}: {error}"))?;
                SqlValue::Text(text.clone())
            }
            ("status_level" | "end_date", _) => bail!("field {key:?} has invalid value {value}"),
            (_, Value::String(text)) => SqlValue::Text(text.clone()),
            _ => bail!("field {key:?} must be a string, got {value}"),
        };
        assignments.push((column, sql));
    }
    Ok(assignments)
}

fn insert_row(
    conn: &Connection,
    record: &AssetRecord,
    parent: Option<&AssetId>,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "
        INSERT INTO items (
          id, parent_id, serial, category, brand, type, vehicle,
          status_state, status_level, end_date, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            record.id.as_str(),
            parent.map(AssetId::as_str),
            record.serial,
            record.category,
            record.brand,
            record.asset_type,
            record.vehicle,
            record.status.state.as_str(),
            record.status.level,
            record.end_date.map(format_iso_date),
            created_at,
        ],
    )
    .with_context(|| format!("insert item {}", record.id))?;
    Ok(())
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<(Option<String>, AssetRecord)> {
    let id: String = row.get(0)?;
    let parent: Option<String> = row.get(1)?;
    let state: String = row.get(7)?;
    let level: Option<i64> = row.get(8)?;
    let end_date: Option<String> = row.get(9)?;
    let end_date = end_date
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            parse_iso_date(&raw).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(error))
            })
        })
        .transpose()?;
    Ok((
        parent,
        AssetRecord {
            id: AssetId::new(id),
            serial: row.get(2)?,
            category: row.get(3)?,
            brand: row.get(4)?,
            asset_type: row.get(5)?,
            vehicle: row.get(6)?,
            status: AssetStatus::new(
                StatusState::parse(&state),
                level.and_then(|level| u8::try_from(level).ok()),
            ),
            end_date,
            sub_rows: Vec::new(),
        },
    ))
}

struct DemoAsset {
    id: &'static str,
    serial: &'static str,
    category: &'static str,
    brand: &'static str,
    asset_type: &'static str,
    vehicle: &'static str,
    state: &'static str,
    level: Option<u8>,
    days_left: Option<i64>,
}

const DEMO_FLEET: [DemoAsset; 12] = [
    DemoAsset {
        id: "AST-1001",
        serial: "CAT-320-4471",
        category: "Excavator",
        brand: "Caterpillar",
        asset_type: "Tracked",
        vehicle: "EX-01",
        state: "operational",
        level: Some(5),
        days_left: Some(42),
    },
    DemoAsset {
        id: "AST-1002",
        serial: "VOL-FH16-0932",
        category: "Truck",
        brand: "Volvo",
        asset_type: "Tipper",
        vehicle: "TR-04",
        state: "maintenance",
        level: Some(2),
        days_left: Some(1),
    },
    DemoAsset {
        id: "AST-1003",
        serial: "KOM-WA380-118",
        category: "Loader",
        brand: "Komatsu",
        asset_type: "Wheeled",
        vehicle: "LD-02",
        state: "repair",
        level: None,
        days_left: Some(-3),
    },
    DemoAsset {
        id: "AST-1004",
        serial: "LIE-LTM1100-77",
        category: "Crane",
        brand: "Liebherr",
        asset_type: "Mobile",
        vehicle: "CR-01",
        state: "on_site",
        level: None,
        days_left: Some(4),
    },
    DemoAsset {
        id: "AST-1005",
        serial: "JCB-540-2210",
        category: "Forklift",
        brand: "JCB",
        asset_type: "Telescopic",
        vehicle: "FL-03",
        state: "operational",
        level: Some(4),
        days_left: None,
    },
    DemoAsset {
        id: "AST-1006",
        serial: "SCA-R500-3381",
        category: "Truck",
        brand: "Scania",
        asset_type: "Flatbed",
        vehicle: "TR-07",
        state: "operational",
        level: Some(3),
        days_left: Some(120),
    },
    DemoAsset {
        id: "AST-1007",
        serial: "HIT-ZX210-5520",
        category: "Excavator",
        brand: "Hitachi",
        asset_type: "Tracked",
        vehicle: "EX-03",
        state: "maintenance",
        level: Some(4),
        days_left: Some(0),
    },
    DemoAsset {
        id: "AST-1008",
        serial: "ATL-QAS60-014",
        category: "Generator",
        brand: "Atlas Copco",
        asset_type: "Towable",
        vehicle: "GN-01",
        state: "on_site",
        level: None,
        days_left: Some(9),
    },
    DemoAsset {
        id: "AST-1009",
        serial: "DOO-DX300-871",
        category: "Excavator",
        brand: "Doosan",
        asset_type: "Tracked",
        vehicle: "EX-05",
        state: "operational",
        level: Some(5),
        days_left: Some(3),
    },
    DemoAsset {
        id: "AST-1010",
        serial: "BEL-B30E-662",
        category: "Truck",
        brand: "Bell",
        asset_type: "Articulated",
        vehicle: "TR-09",
        state: "repair",
        level: None,
        days_left: Some(-12),
    },
    DemoAsset {
        id: "AST-1011",
        serial: "CAT-950-9013",
        category: "Loader",
        brand: "Caterpillar",
        asset_type: "Wheeled",
        vehicle: "LD-05",
        state: "operational",
        level: Some(1),
        days_left: Some(60),
    },
    DemoAsset {
        id: "AST-1012",
        serial: "TER-RT780-404",
        category: "Crane",
        brand: "Terex",
        asset_type: "Rough Terrain",
        vehicle: "CR-02",
        state: "standby",
        level: None,
        days_left: None,
    },
];

fn demo_sales_records(today: time::Date) -> Vec<AssetRecord> {
    [("sub-1", "SALE-2024-001", "Invoice", 5), ("sub-2", "SALE-2024-002", "Receipt", 9)]
        .into_iter()
        .map(|(id, serial, asset_type, days)| AssetRecord {
            id: AssetId::from(id),
            serial: serial.to_owned(),
            category: "Sales Record".to_owned(),
            brand: "-".to_owned(),
            asset_type: asset_type.to_owned(),
            vehicle: "-".to_owned(),
            status: AssetStatus::new(StatusState::Operational, Some(4)),
            end_date: Some(today + Duration::days(days)),
            sub_rows: Vec::new(),
        })
        .collect()
}

pub fn default_state_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("ASSETGRID_STATE_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!(
            "cannot resolve data directory; set ASSETGRID_STATE_PATH to a writable database path"
        )
    })?;
    Ok(data_root.join(APP_NAME).join("state.db"))
}

pub fn validate_state_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("state path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "state path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("state path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "state path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            continue;
        }
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "state database table `{table}` is missing columns {}; move the file aside or point [storage].state_path elsewhere",
                missing.join(", ")
            );
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("prepare column query for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query columns for {table}"))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

#[cfg(test)]
mod tests {
    use super::{patch_assignments, validate_state_path};
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;

    #[test]
    fn status_patch_maps_to_both_columns() -> anyhow::Result<()> {
        let assignments =
            patch_assignments(&json!({ "statusState": "repair", "statusLevel": null }))?;
        assert_eq!(
            assignments,
            vec![
                ("status_level", SqlValue::Null),
                ("status_state", SqlValue::Text("repair".to_owned())),
            ]
        );
        Ok(())
    }

    #[test]
    fn unknown_or_mistyped_fields_are_rejected() {
        assert!(patch_assignments(&json!({ "id": "x" })).is_err());
        assert!(patch_assignments(&json!({ "serial": 7 })).is_err());
        assert!(patch_assignments(&json!({ "endDate": "01/02/2025" })).is_err());
        assert!(patch_assignments(&json!({ "statusLevel": -1 })).is_err());
        assert!(patch_assignments(&json!({})).is_err());
        assert!(patch_assignments(&json!(["serial"])).is_err());
    }

    #[test]
    fn state_path_rejects_uris() {
        assert!(validate_state_path("").is_err());
        assert!(validate_state_path("https://example.com/db").is_err());
        assert!(validate_state_path("file:state.db").is_err());
        assert!(validate_state_path("state.db?mode=ro").is_err());
        assert!(validate_state_path(":memory:").is_ok());
        assert!(validate_state_path("/tmp/assetgrid/state.db").is_ok());
    }
}
