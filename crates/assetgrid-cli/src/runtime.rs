// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use assetgrid_app::{
    ApiError, AssetApi, AssetId, AssetRecord, ColumnOrderStore, DeleteRequest, NewAsset,
    UpdateRequest,
};
use assetgrid_db::Store;
use assetgrid_tui::{GridRuntime, InternalEvent};
use serde_json::Value;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::warn;

/// Talks to the remote item API. Patches and deletes run on worker threads so
/// the grid keeps drawing while a request is in flight.
pub struct HttpRuntime {
    client: assetgrid_api::Client,
    state: Store,
}

impl HttpRuntime {
    pub fn new(client: assetgrid_api::Client, state: Store) -> Self {
        Self { client, state }
    }
}

impl GridRuntime for HttpRuntime {
    fn load_items(&mut self) -> Result<Vec<AssetRecord>, ApiError> {
        self.client.list_items()
    }

    fn patch_item(&mut self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
        self.client.patch_item(id, patch)
    }

    fn delete_items(&mut self, ids: &[AssetId]) -> Result<(), ApiError> {
        self.client.delete_items(ids)
    }

    fn create_item(&mut self, item: &NewAsset) -> Result<AssetRecord, ApiError> {
        self.client.create_item(item)
    }

    fn column_store(&self) -> &dyn ColumnOrderStore {
        &self.state
    }

    fn spawn_patch(&mut self, request: UpdateRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("patch-{}", request.row_id))
            .spawn(move || {
                let result = client.patch_item(&request.row_id, &request.patch);
                if tx
                    .send(InternalEvent::PatchSettled {
                        ticket: request.ticket,
                        result,
                    })
                    .is_err()
                {
                    warn!(row = %request.row_id, "grid closed before update settled");
                }
            })
            .context("spawn update worker")?;
        Ok(())
    }

    fn spawn_delete(&mut self, request: DeleteRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name("batch-delete".to_owned())
            .spawn(move || {
                let result = client.delete_items(&request.ids);
                let count = request.ids.len();
                if tx
                    .send(InternalEvent::DeleteSettled { request, result })
                    .is_err()
                {
                    warn!(count, "grid closed before delete settled");
                }
            })
            .context("spawn delete worker")?;
        Ok(())
    }
}

/// Offline backend: items live in an in-memory SQLite store seeded with demo
/// assets. Calls settle inline.
pub struct DemoRuntime {
    items: Store,
    state: Store,
}

impl DemoRuntime {
    pub fn new(state: Store) -> Result<Self> {
        let items = Store::open_memory()?;
        items.bootstrap()?;
        items.seed_demo_data()?;
        Ok(Self { items, state })
    }
}

impl GridRuntime for DemoRuntime {
    fn load_items(&mut self) -> Result<Vec<AssetRecord>, ApiError> {
        AssetApi::list_items(&self.items)
    }

    fn patch_item(&mut self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
        AssetApi::patch_item(&self.items, id, patch)
    }

    fn delete_items(&mut self, ids: &[AssetId]) -> Result<(), ApiError> {
        AssetApi::delete_items(&self.items, ids)
    }

    fn create_item(&mut self, item: &NewAsset) -> Result<AssetRecord, ApiError> {
        AssetApi::create_item(&self.items, item)
    }

    fn column_store(&self) -> &dyn ColumnOrderStore {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::DemoRuntime;
    use anyhow::Result;
    use assetgrid_app::{
        AssetId, AssetTable, ColumnId, FieldEdit, FieldValue, UpdateDispatcher, UpdateOutcome,
        load_column_order, save_column_order,
    };
    use assetgrid_db::Store;
    use assetgrid_tui::{GridRuntime, InternalEvent};
    use std::sync::mpsc;

    fn demo() -> Result<DemoRuntime> {
        let state = Store::open_memory()?;
        state.bootstrap()?;
        DemoRuntime::new(state)
    }

    #[test]
    fn demo_runtime_serves_seeded_items() -> Result<()> {
        let mut runtime = demo()?;
        let items = runtime.load_items()?;
        assert!(!items.is_empty());
        assert_eq!(items[0].id, AssetId::from("AST-1001"));
        Ok(())
    }

    #[test]
    fn demo_patch_settles_through_channel() -> Result<()> {
        let mut runtime = demo()?;
        let mut table = AssetTable::new(runtime.load_items()?, 10);
        let mut dispatcher = UpdateDispatcher::new();
        let edit = FieldEdit {
            row_id: AssetId::from("AST-1001"),
            value: FieldValue::Serial("DEMO-SERIAL".to_owned()),
        };
        let request = dispatcher.begin(&mut table, &edit)?;

        let (tx, rx) = mpsc::channel();
        runtime.spawn_patch(request, tx)?;
        let Ok(InternalEvent::PatchSettled { ticket, result }) = rx.try_recv() else {
            anyhow::bail!("patch should settle inline");
        };
        assert_eq!(
            dispatcher.settle(&mut table, ticket, result)?,
            UpdateOutcome::Committed
        );

        let reloaded = runtime.load_items()?;
        assert_eq!(reloaded[0].serial, "DEMO-SERIAL");
        Ok(())
    }

    #[test]
    fn demo_delete_reports_unknown_ids_as_success() -> Result<()> {
        let mut runtime = demo()?;
        let before = runtime.load_items()?.len();
        runtime.delete_items(&[AssetId::from("AST-1001"), AssetId::from("missing")])?;
        assert_eq!(runtime.load_items()?.len(), before - 1);
        Ok(())
    }

    #[test]
    fn column_order_goes_to_state_store() -> Result<()> {
        let runtime = demo()?;
        let order = [ColumnId::Select, ColumnId::Status, ColumnId::Id];
        assert!(save_column_order(runtime.column_store(), &order));
        assert_eq!(
            load_column_order(runtime.column_store()).as_deref(),
            Some(&order[..])
        );
        Ok(())
    }
}
