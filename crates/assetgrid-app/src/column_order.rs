// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::ColumnId;
use crate::table::AssetTable;

pub const COLUMN_ORDER_KEY: &str = "assetTableColumnOrder";

/// Durable client-local key/value storage.
pub trait ColumnOrderStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>>;
    fn save_raw(&self, key: &str, value: &str) -> Result<()>;
}

/// Decodes a stored order. Unknown ids and duplicates are dropped and
/// `select` is put first when the stored list lacks it.
pub fn parse_column_order(raw: &str) -> Result<Vec<ColumnId>> {
    let ids: Vec<String> =
        serde_json::from_str(raw).context("column order must be a JSON array of column ids")?;
    let mut order = Vec::with_capacity(ids.len() + 1);
    for id in &ids {
        match ColumnId::parse(id) {
            Some(column) if !order.contains(&column) => order.push(column),
            Some(_) => {}
            None => debug!(column = %id, "dropping unknown column from stored order"),
        }
    }
    if !order.contains(&ColumnId::Select) {
        order.insert(0, ColumnId::Select);
    }
    Ok(order)
}

pub fn encode_column_order(order: &[ColumnId]) -> String {
    Value::Array(
        order
            .iter()
            .map(|column| Value::String(column.as_str().to_owned()))
            .collect(),
    )
    .to_string()
}

/// `None` when nothing usable is stored; read and parse failures are logged.
pub fn load_column_order<S: ColumnOrderStore + ?Sized>(store: &S) -> Option<Vec<ColumnId>> {
    let raw = match store.load_raw(COLUMN_ORDER_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "failed to read saved column order");
            return None;
        }
    };
    match parse_column_order(&raw) {
        Ok(order) => Some(order),
        Err(error) => {
            warn!(error = %format!("{error:#}"), raw = %raw, "ignoring malformed column order");
            None
        }
    }
}

pub fn save_column_order<S: ColumnOrderStore + ?Sized>(store: &S, order: &[ColumnId]) -> bool {
    match store.save_raw(COLUMN_ORDER_KEY, &encode_column_order(order)) {
        Ok(()) => true,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "failed to save column order");
            false
        }
    }
}

/// Keeps the stored order in step with a table, writing only when the order
/// actually changed.
#[derive(Debug, Default)]
pub struct ColumnOrderPersistence {
    last_saved: Option<Vec<ColumnId>>,
}

impl ColumnOrderPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore<S: ColumnOrderStore + ?Sized>(&mut self, store: &S, table: &mut AssetTable) {
        if let Some(order) = load_column_order(store) {
            table.set_column_order(order.clone());
            self.last_saved = Some(order);
        }
    }

    /// Returns whether a write was attempted.
    pub fn sync<S: ColumnOrderStore + ?Sized>(&mut self, store: &S, table: &AssetTable) -> bool {
        let current = &table.view().column_order;
        if self.last_saved.as_ref() == Some(current) {
            return false;
        }
        if save_column_order(store, current) {
            self.last_saved = Some(current.clone());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{
        COLUMN_ORDER_KEY, ColumnOrderPersistence, ColumnOrderStore, encode_column_order,
        load_column_order, parse_column_order,
    };
    use crate::model::ColumnId;
    use crate::table::AssetTable;
    use anyhow::{Result, bail};
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        values: RefCell<HashMap<String, String>>,
        writes: RefCell<usize>,
        fail_writes: bool,
    }

    impl ColumnOrderStore for MemoryStore {
        fn load_raw(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.borrow().get(key).cloned())
        }

        fn save_raw(&self, key: &str, value: &str) -> Result<()> {
            *self.writes.borrow_mut() += 1;
            if self.fail_writes {
                bail!("disk full");
            }
            self.values
                .borrow_mut()
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }
    }

    #[test]
    fn missing_select_is_prepended() -> Result<()> {
        let order = parse_column_order(r#"["status","id"]"#)?;
        assert_eq!(order, [ColumnId::Select, ColumnId::Status, ColumnId::Id]);
        Ok(())
    }

    #[test]
    fn unknown_and_duplicate_ids_are_dropped() -> Result<()> {
        let order = parse_column_order(r#"["select","id","createdAt","id"]"#)?;
        assert_eq!(order, [ColumnId::Select, ColumnId::Id]);
        Ok(())
    }

    #[test]
    fn malformed_value_is_ignored() {
        let store = MemoryStore::default();
        store
            .save_raw(COLUMN_ORDER_KEY, "{not json")
            .expect("memory write");
        assert_eq!(load_column_order(&store), None);
    }

    #[test]
    fn nothing_stored_keeps_default_order() {
        let store = MemoryStore::default();
        let mut table = AssetTable::new(Vec::new(), 10);
        ColumnOrderPersistence::new().restore(&store, &mut table);
        assert_eq!(
            encode_column_order(&table.view().column_order),
            r#"["select","id","serial","category","brand","type","vehicle","status"]"#
        );
    }

    #[test]
    fn sync_writes_only_on_change() {
        let store = MemoryStore::default();
        let mut table = AssetTable::new(Vec::new(), 10);
        let mut persistence = ColumnOrderPersistence::new();
        persistence.restore(&store, &mut table);

        assert!(persistence.sync(&store, &table));
        assert!(!persistence.sync(&store, &table));
        table.move_column(ColumnId::Status, -2);
        assert!(persistence.sync(&store, &table));
        assert_eq!(*store.writes.borrow(), 2);

        let mut reloaded = AssetTable::new(Vec::new(), 10);
        ColumnOrderPersistence::new().restore(&store, &mut reloaded);
        assert_eq!(reloaded.effective_order(), table.effective_order());
    }

    #[test]
    fn failed_write_is_retried_on_next_sync() {
        let store = MemoryStore {
            fail_writes: true,
            ..MemoryStore::default()
        };
        let table = AssetTable::new(Vec::new(), 10);
        let mut persistence = ColumnOrderPersistence::new();
        assert!(persistence.sync(&store, &table));
        assert!(persistence.sync(&store, &table));
        assert_eq!(*store.writes.borrow(), 2);
    }
}
