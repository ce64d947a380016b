// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use assetgrid_app::{
    AssetApi, AssetField, AssetRecord, AssetTable, CellError, CommitDecision, ConfirmDecision,
    DeleteOutcome, EditableCell, EditorKind, FieldEdit, StatusCell, UpdateDispatcher,
    UpdateOutcome,
};
use assetgrid_testkit::{ApiCall, AssetFaker, ScriptedApi};
use serde_json::json;

fn fixture(count: usize) -> (AssetTable, ScriptedApi) {
    let mut assets = AssetFaker::new(11).assets(count);
    assets[0].serial = "A1".to_owned();
    assets[0].end_date = None;
    let api = ScriptedApi::new(assets.clone());
    (AssetTable::new(assets, 10), api)
}

fn first(table: &AssetTable) -> &AssetRecord {
    &table.rows()[0]
}

fn edit_serial(table: &AssetTable, text: &str) -> Result<FieldEdit> {
    let mut cell = EditableCell::for_record(first(table), AssetField::Serial, EditorKind::Text);
    cell.begin();
    cell.clear_draft();
    text.chars().for_each(|ch| cell.push_char(ch));
    assert_eq!(cell.commit(), CommitDecision::NeedsConfirmation);
    match cell.confirm(true) {
        ConfirmDecision::Submit(edit) => Ok(edit),
        other => Err(anyhow!("expected a submission, got {other:?}")),
    }
}

#[test]
fn early_end_date_is_rejected_without_network() {
    let (table, api) = fixture(3);
    let mut cell = EditableCell::for_record(first(&table), AssetField::EndDate, EditorKind::Date);
    cell.begin();
    "2023-05-01".chars().for_each(|ch| cell.push_char(ch));

    assert_eq!(cell.commit(), CommitDecision::Rejected(CellError::YearTooEarly));
    assert_eq!(cell.display(), "");
    assert_eq!(api.mutating_calls(), 0);
}

#[test]
fn unchanged_commit_never_calls_remote() {
    let (table, api) = fixture(3);
    let mut cell = EditableCell::for_record(first(&table), AssetField::Serial, EditorKind::Text);
    cell.begin();
    assert_eq!(cell.commit(), CommitDecision::Unchanged);
    assert_eq!(api.mutating_calls(), 0);
}

#[test]
fn confirmed_serial_edit_commits() -> Result<()> {
    let (mut table, api) = fixture(3);
    let mut dispatcher = UpdateDispatcher::new();
    let edit = edit_serial(&table, "A2")?;

    let outcome = dispatcher.attempt_update(&mut table, &api, &edit)?;

    assert_eq!(outcome, UpdateOutcome::Committed);
    assert_eq!(first(&table).serial, "A2");
    assert_eq!(api.items()[0].serial, "A2");
    assert_eq!(
        api.calls(),
        vec![ApiCall::Patch {
            id: first(&table).id.clone(),
            body: json!({ "serial": "A2" }),
        }]
    );
    Ok(())
}

#[test]
fn failed_serial_edit_rolls_back() -> Result<()> {
    let (mut table, api) = fixture(3);
    let before = table.snapshot_rows();
    let mut dispatcher = UpdateDispatcher::new();
    let edit = edit_serial(&table, "A2")?;
    api.fail_next_with_status(500, "internal error");

    let request = dispatcher.begin(&mut table, &edit)?;
    assert_eq!(first(&table).serial, "A2");
    let result = api.patch_item(&request.row_id, &request.patch);
    let outcome = dispatcher.settle(&mut table, request.ticket, result)?;

    assert_eq!(
        outcome,
        UpdateOutcome::RolledBack {
            reason: "internal error".to_owned()
        }
    );
    assert_eq!(table.rows(), before.as_slice());
    Ok(())
}

#[test]
fn status_edit_sends_split_attributes() -> Result<()> {
    let (mut table, api) = fixture(2);
    let mut cell = StatusCell::for_record(first(&table));
    cell.begin();
    cell.cycle_state(1);
    let decision = cell.commit();
    assert_eq!(decision, CommitDecision::NeedsConfirmation);
    let ConfirmDecision::Submit(edit) = cell.confirm(true) else {
        return Err(anyhow!("status edit was not submitted"));
    };

    UpdateDispatcher::new().attempt_update(&mut table, &api, &edit)?;

    let status = &first(&table).status;
    let calls = api.calls();
    let Some(ApiCall::Patch { body, .. }) = calls.first() else {
        return Err(anyhow!("no patch recorded"));
    };
    assert_eq!(
        body,
        &json!({ "statusState": status.state.as_str(), "statusLevel": status.level })
    );
    Ok(())
}

#[test]
fn batch_delete_removes_both_selected_rows() -> Result<()> {
    let (mut table, api) = fixture(5);
    let doomed = [table.rows()[1].id.clone(), table.rows()[3].id.clone()];
    for id in &doomed {
        table.toggle_row_selected(id);
    }

    let request = table.selected_for_delete()?;
    assert_eq!(
        request.confirmation_prompt(),
        "Are you sure you want to delete 2 item(s)?"
    );
    let result = api.delete_items(&request.ids);
    let outcome = table.apply_delete_result(&request, result);

    assert_eq!(outcome, DeleteOutcome::Deleted { count: 2 });
    assert_eq!(table.rows().len(), 3);
    assert!(doomed.iter().all(|id| table.find_row(id).is_none()));
    assert!(table.selected_ids().is_empty());
    assert_eq!(api.items().len(), 3);
    Ok(())
}

#[test]
fn failed_batch_delete_keeps_everything() -> Result<()> {
    let (mut table, api) = fixture(4);
    let before = table.snapshot_rows();
    table.toggle_all_page();
    api.fail_next_with_status(503, "maintenance window");

    let request = table.selected_for_delete()?;
    let result = api.delete_items(&request.ids);
    let outcome = table.apply_delete_result(&request, result);

    assert_eq!(
        outcome,
        DeleteOutcome::Failed {
            message: "Failed to delete items: maintenance window".to_owned()
        }
    );
    assert_eq!(table.rows(), before.as_slice());
    Ok(())
}

#[test]
fn sub_row_edit_targets_child_only() -> Result<()> {
    let parent = AssetFaker::new(5).asset_with_sub_rows(2);
    let child_id = parent.sub_rows[1].id.clone();
    let api = ScriptedApi::new(vec![parent.clone()]);
    let mut table = AssetTable::new(vec![parent], 10);

    let edit = FieldEdit {
        row_id: child_id.clone(),
        value: assetgrid_app::FieldValue::Brand("Bell".to_owned()),
    };
    UpdateDispatcher::new().attempt_update(&mut table, &api, &edit)?;

    let child = table
        .find_row(&child_id)
        .ok_or_else(|| anyhow!("child row missing"))?;
    assert_eq!(child.brand, "Bell");
    assert_ne!(first(&table).brand, "Bell");
    Ok(())
}
