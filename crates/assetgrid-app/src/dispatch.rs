// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Optimistic field updates with whole-collection rollback.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, AssetApi};
use crate::ids::AssetId;
use crate::model::{AssetField, AssetRecord, FieldValue};
use crate::table::AssetTable;

/// A confirmed cell change, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub row_id: AssetId,
    pub value: FieldValue,
}

impl FieldEdit {
    pub fn field(&self) -> AssetField {
        self.value.field()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no row with id {0}")]
    UnknownRow(AssetId),
    #[error("{field} of {row_id} is still being saved")]
    AlreadyPending { row_id: AssetId, field: &'static str },
    #[error("no update in flight for ticket {0}")]
    UnknownTicket(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateTicket(pub u64);

/// The remote half of an in-flight update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub ticket: UpdateTicket,
    pub row_id: AssetId,
    pub patch: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Committed,
    RolledBack { reason: String },
}

#[derive(Debug)]
struct InFlight {
    row_id: AssetId,
    field: AssetField,
    snapshot: Vec<AssetRecord>,
}

#[derive(Debug, Default)]
pub struct UpdateDispatcher {
    next_ticket: u64,
    in_flight: BTreeMap<UpdateTicket, InFlight>,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, row_id: &AssetId, field: AssetField) -> bool {
        self.in_flight
            .values()
            .any(|entry| &entry.row_id == row_id && entry.field == field)
    }

    pub fn row_has_pending(&self, row_id: &AssetId) -> bool {
        self.in_flight.values().any(|entry| &entry.row_id == row_id)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Snapshots the rows, applies the edit locally and returns the request
    /// to send. The change is visible in `table` before this returns.
    pub fn begin(
        &mut self,
        table: &mut AssetTable,
        edit: &FieldEdit,
    ) -> Result<UpdateRequest, DispatchError> {
        let field = edit.field();
        if self.is_pending(&edit.row_id, field) {
            return Err(DispatchError::AlreadyPending {
                row_id: edit.row_id.clone(),
                field: field.as_str(),
            });
        }
        let snapshot = table.snapshot_rows();
        if !table.apply_edit(edit) {
            return Err(DispatchError::UnknownRow(edit.row_id.clone()));
        }

        self.next_ticket += 1;
        let ticket = UpdateTicket(self.next_ticket);
        self.in_flight.insert(
            ticket,
            InFlight {
                row_id: edit.row_id.clone(),
                field,
                snapshot,
            },
        );
        Ok(UpdateRequest {
            ticket,
            row_id: edit.row_id.clone(),
            patch: edit.value.to_patch(),
        })
    }

    /// Resolves an in-flight update. A failure restores the snapshot taken in
    /// [`Self::begin`].
    pub fn settle(
        &mut self,
        table: &mut AssetTable,
        ticket: UpdateTicket,
        result: Result<(), ApiError>,
    ) -> Result<UpdateOutcome, DispatchError> {
        let entry = self
            .in_flight
            .remove(&ticket)
            .ok_or(DispatchError::UnknownTicket(ticket.0))?;
        match result {
            Ok(()) => {
                info!(
                    row = %entry.row_id,
                    field = entry.field.as_str(),
                    "field update committed"
                );
                Ok(UpdateOutcome::Committed)
            }
            Err(error) => {
                warn!(
                    row = %entry.row_id,
                    field = entry.field.as_str(),
                    %error,
                    "field update failed; rolling back"
                );
                table.restore_rows(entry.snapshot);
                Ok(UpdateOutcome::RolledBack {
                    reason: error.detail(),
                })
            }
        }
    }

    /// Blocking form of `begin` + remote call + `settle`.
    pub fn attempt_update(
        &mut self,
        table: &mut AssetTable,
        api: &dyn AssetApi,
        edit: &FieldEdit,
    ) -> Result<UpdateOutcome, DispatchError> {
        let request = self.begin(table, edit)?;
        let result = api.patch_item(&request.row_id, &request.patch);
        self.settle(table, request.ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchError, FieldEdit, UpdateDispatcher, UpdateOutcome};
    use crate::api::{ApiError, AssetApi};
    use crate::forms::NewAsset;
    use crate::ids::AssetId;
    use crate::model::{AssetRecord, AssetStatus, FieldValue, StatusState};
    use crate::table::AssetTable;
    use serde_json::{Value, json};
    use std::cell::RefCell;

    struct FakeApi {
        fail_with: Option<ApiError>,
        patches: RefCell<Vec<(AssetId, Value)>>,
    }

    impl FakeApi {
        fn ok() -> Self {
            Self {
                fail_with: None,
                patches: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16, body: &str) -> Self {
            Self {
                fail_with: Some(ApiError::Status {
                    status,
                    body: body.to_owned(),
                }),
                patches: RefCell::new(Vec::new()),
            }
        }
    }

    impl AssetApi for FakeApi {
        fn list_items(&self) -> Result<Vec<AssetRecord>, ApiError> {
            Ok(Vec::new())
        }

        fn patch_item(&self, id: &AssetId, patch: &Value) -> Result<(), ApiError> {
            self.patches.borrow_mut().push((id.clone(), patch.clone()));
            self.fail_with.clone().map_or(Ok(()), Err)
        }

        fn delete_items(&self, _ids: &[AssetId]) -> Result<(), ApiError> {
            Ok(())
        }

        fn create_item(&self, _item: &NewAsset) -> Result<AssetRecord, ApiError> {
            Err(ApiError::Transport("unused".to_owned()))
        }
    }

    fn record(id: &str, serial: &str) -> AssetRecord {
        AssetRecord {
            id: AssetId::from(id),
            serial: serial.to_owned(),
            category: "Truck".to_owned(),
            brand: "Volvo".to_owned(),
            asset_type: "Tipper".to_owned(),
            vehicle: "TR-01".to_owned(),
            status: AssetStatus::new(StatusState::Operational, Some(5)),
            end_date: None,
            sub_rows: Vec::new(),
        }
    }

    fn serial_edit(id: &str, serial: &str) -> FieldEdit {
        FieldEdit {
            row_id: AssetId::from(id),
            value: FieldValue::Serial(serial.to_owned()),
        }
    }

    #[test]
    fn successful_update_keeps_optimistic_value() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let api = FakeApi::ok();
        let mut dispatcher = UpdateDispatcher::new();

        let outcome = dispatcher
            .attempt_update(&mut table, &api, &serial_edit("A-1", "A2"))
            .expect("dispatch");

        assert_eq!(outcome, UpdateOutcome::Committed);
        assert_eq!(table.rows()[0].serial, "A2");
        assert_eq!(
            api.patches.borrow().as_slice(),
            &[(AssetId::from("A-1"), json!({ "serial": "A2" }))]
        );
    }

    #[test]
    fn failed_update_restores_snapshot_exactly() {
        let rows = vec![record("A-1", "A1"), record("A-2", "B1")];
        let mut table = AssetTable::new(rows.clone(), 10);
        let api = FakeApi::failing(500, "boom");
        let mut dispatcher = UpdateDispatcher::new();

        let outcome = dispatcher
            .attempt_update(&mut table, &api, &serial_edit("A-1", "A2"))
            .expect("dispatch");

        assert_eq!(
            outcome,
            UpdateOutcome::RolledBack {
                reason: "boom".to_owned()
            }
        );
        assert_eq!(table.rows(), rows.as_slice());
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn optimistic_value_is_visible_before_settle() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let mut dispatcher = UpdateDispatcher::new();

        let request = dispatcher
            .begin(&mut table, &serial_edit("A-1", "A2"))
            .expect("begin");
        assert_eq!(table.rows()[0].serial, "A2");
        assert!(dispatcher.row_has_pending(&AssetId::from("A-1")));

        dispatcher
            .settle(&mut table, request.ticket, Ok(()))
            .expect("settle");
        assert!(!dispatcher.row_has_pending(&AssetId::from("A-1")));
    }

    #[test]
    fn second_edit_on_pending_cell_is_rejected() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let mut dispatcher = UpdateDispatcher::new();
        dispatcher
            .begin(&mut table, &serial_edit("A-1", "A2"))
            .expect("begin");

        let error = dispatcher
            .begin(&mut table, &serial_edit("A-1", "A3"))
            .expect_err("second edit must be rejected");
        assert!(matches!(error, DispatchError::AlreadyPending { .. }));
        assert_eq!(table.rows()[0].serial, "A2");
    }

    #[test]
    fn edits_to_other_fields_are_independent() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let mut dispatcher = UpdateDispatcher::new();
        dispatcher
            .begin(&mut table, &serial_edit("A-1", "A2"))
            .expect("begin serial");
        dispatcher
            .begin(
                &mut table,
                &FieldEdit {
                    row_id: AssetId::from("A-1"),
                    value: FieldValue::Brand("CAT".to_owned()),
                },
            )
            .expect("begin brand");
        assert_eq!(dispatcher.pending_count(), 2);
    }

    #[test]
    fn unknown_row_is_reported_without_side_effects() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let mut dispatcher = UpdateDispatcher::new();
        let error = dispatcher
            .begin(&mut table, &serial_edit("missing", "x"))
            .expect_err("unknown row");
        assert_eq!(error, DispatchError::UnknownRow(AssetId::from("missing")));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn settling_twice_is_an_error() {
        let mut table = AssetTable::new(vec![record("A-1", "A1")], 10);
        let mut dispatcher = UpdateDispatcher::new();
        let request = dispatcher
            .begin(&mut table, &serial_edit("A-1", "A2"))
            .expect("begin");
        dispatcher
            .settle(&mut table, request.ticket, Ok(()))
            .expect("settle");
        assert!(
            dispatcher
                .settle(&mut table, request.ticket, Ok(()))
                .is_err()
        );
    }
}
