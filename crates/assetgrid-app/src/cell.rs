// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Per-cell edit controllers.
//!
//! Every editable cell walks the same phases:
//!
//! ```text
//! Viewing --begin--> Editing --commit--> Confirming --confirm(yes)--> Viewing (FieldEdit)
//!                       |                    |
//!                       +--cancel/reject--> Viewing <--confirm(no)--+
//! ```
//!
//! `commit` is only honoured while `Editing`, so a focus-loss commit that
//! arrives after a key commit lands in `Confirming` or `Viewing` and is
//! dropped. One edit can therefore never be submitted twice.

use thiserror::Error;

use crate::dates::{format_display_date, parse_iso_date, validate_date_input};
use crate::dispatch::FieldEdit;
use crate::ids::AssetId;
use crate::model::{AssetField, AssetRecord, AssetStatus, FieldValue, MAX_STATUS_LEVEL};

pub const CONFIRM_CHANGE_PROMPT: &str =
    "You have changed the data. Do you want to save the changes?";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("Invalid date value. Please ensure date is selected correctly.")]
    InvalidDate,
    #[error("Invalid date: Year must be 2024 or later.")]
    YearTooEarly,
    #[error("Invalid date: Year is too far in the future.")]
    YearTooLate,
    #[error("{0:?} is not one of the allowed options")]
    NotAnOption(String),
    #[error("{0:?} cannot be edited as text")]
    NotTextField(AssetField),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession<V> {
    pub origin: V,
    pub draft: V,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellPhase<V> {
    Viewing,
    Editing(EditSession<V>),
    Confirming {
        session: EditSession<V>,
        value: FieldValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitDecision {
    /// Not in the editing phase; nothing happened.
    Ignored,
    /// Draft matched the origin value; edit mode closed without a remote call.
    Unchanged,
    /// Draft failed validation and was reverted.
    Rejected(CellError),
    /// Waiting for the user to confirm the change.
    NeedsConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmDecision {
    Ignored,
    Discarded,
    Submit(FieldEdit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Machine<V> {
    phase: CellPhase<V>,
}

impl<V: Clone + PartialEq> Machine<V> {
    fn new() -> Self {
        Self {
            phase: CellPhase::Viewing,
        }
    }

    fn begin(&mut self, current: V) -> bool {
        if !matches!(self.phase, CellPhase::Viewing) {
            return false;
        }
        self.phase = CellPhase::Editing(EditSession {
            origin: current.clone(),
            draft: current,
        });
        true
    }

    fn draft_mut(&mut self) -> Option<&mut V> {
        match &mut self.phase {
            CellPhase::Editing(session) => Some(&mut session.draft),
            _ => None,
        }
    }

    fn draft(&self) -> Option<&V> {
        match &self.phase {
            CellPhase::Editing(session) | CellPhase::Confirming { session, .. } => {
                Some(&session.draft)
            }
            CellPhase::Viewing => None,
        }
    }

    fn commit(
        &mut self,
        validate: impl FnOnce(&V) -> Result<FieldValue, CellError>,
    ) -> CommitDecision {
        let CellPhase::Editing(session) = &self.phase else {
            return CommitDecision::Ignored;
        };
        if session.draft == session.origin {
            self.phase = CellPhase::Viewing;
            return CommitDecision::Unchanged;
        }
        match validate(&session.draft) {
            Ok(value) => {
                let session = session.clone();
                self.phase = CellPhase::Confirming { session, value };
                CommitDecision::NeedsConfirmation
            }
            Err(error) => {
                self.phase = CellPhase::Viewing;
                CommitDecision::Rejected(error)
            }
        }
    }

    /// Returns the accepted draft and its field value, or `None` when the
    /// change was declined or there was nothing to confirm.
    fn confirm(&mut self, accepted: bool) -> Option<Option<(V, FieldValue)>> {
        let phase = std::mem::replace(&mut self.phase, CellPhase::Viewing);
        match phase {
            CellPhase::Confirming { session, value } => {
                if accepted {
                    Some(Some((session.draft, value)))
                } else {
                    Some(None)
                }
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    fn cancel(&mut self) -> bool {
        if matches!(self.phase, CellPhase::Viewing) {
            return false;
        }
        self.phase = CellPhase::Viewing;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorKind {
    Text,
    Date,
    Select(Vec<String>),
}

/// Controller for a single text, date or select cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableCell {
    row_id: AssetId,
    field: AssetField,
    kind: EditorKind,
    value: String,
    machine: Machine<String>,
}

impl EditableCell {
    pub fn new(row_id: AssetId, field: AssetField, kind: EditorKind, value: String) -> Self {
        Self {
            row_id,
            field,
            kind,
            value,
            machine: Machine::new(),
        }
    }

    pub fn for_record(record: &AssetRecord, field: AssetField, kind: EditorKind) -> Self {
        Self::new(record.id.clone(), field, kind, record.edit_text(field))
    }

    pub fn row_id(&self) -> &AssetId {
        &self.row_id
    }

    pub fn field(&self) -> AssetField {
        self.field
    }

    pub fn kind(&self) -> &EditorKind {
        &self.kind
    }

    pub fn phase(&self) -> &CellPhase<String> {
        &self.machine.phase
    }

    pub fn is_editing(&self) -> bool {
        !matches!(self.machine.phase, CellPhase::Viewing)
    }

    pub fn draft(&self) -> Option<&str> {
        self.machine.draft().map(String::as_str)
    }

    pub fn begin(&mut self) -> bool {
        self.machine.begin(self.value.clone())
    }

    pub fn push_char(&mut self, ch: char) {
        if matches!(self.kind, EditorKind::Select(_)) {
            return;
        }
        if let Some(draft) = self.machine.draft_mut() {
            draft.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if matches!(self.kind, EditorKind::Select(_)) {
            return;
        }
        if let Some(draft) = self.machine.draft_mut() {
            draft.pop();
        }
    }

    pub fn clear_draft(&mut self) {
        if matches!(self.kind, EditorKind::Select(_)) {
            return;
        }
        if let Some(draft) = self.machine.draft_mut() {
            draft.clear();
        }
    }

    /// Moves a select draft through its option list. Free text never reaches
    /// a select draft.
    pub fn cycle_option(&mut self, delta: isize) {
        let EditorKind::Select(options) = &self.kind else {
            return;
        };
        if options.is_empty() {
            return;
        }
        let len = options.len() as isize;
        let Some(draft) = self.machine.draft_mut() else {
            return;
        };
        let current = options
            .iter()
            .position(|option| option == draft)
            .map_or(if delta < 0 { 0 } else { -1 }, |index| index as isize);
        let next = (current + delta).rem_euclid(len) as usize;
        *draft = options[next].clone();
    }

    pub fn commit(&mut self) -> CommitDecision {
        let field = self.field;
        let kind = &self.kind;
        self.machine.commit(|draft| match kind {
            EditorKind::Date => validate_date_input(draft).map(FieldValue::EndDate),
            EditorKind::Select(options) => {
                if !options.iter().any(|option| option == draft) {
                    return Err(CellError::NotAnOption(draft.clone()));
                }
                text_value(field, draft)
            }
            EditorKind::Text => text_value(field, draft),
        })
    }

    pub fn confirm(&mut self, accepted: bool) -> ConfirmDecision {
        match self.machine.confirm(accepted) {
            Some(Some((draft, value))) => {
                self.value = draft;
                ConfirmDecision::Submit(FieldEdit {
                    row_id: self.row_id.clone(),
                    value,
                })
            }
            Some(None) => ConfirmDecision::Discarded,
            None => ConfirmDecision::Ignored,
        }
    }

    pub fn cancel(&mut self) -> bool {
        self.machine.cancel()
    }

    pub fn display(&self) -> String {
        let raw = self.draft().unwrap_or(&self.value);
        if self.is_editing() || self.kind != EditorKind::Date {
            return raw.to_owned();
        }
        parse_iso_date(raw).map_or_else(|_| raw.to_owned(), format_display_date)
    }
}

fn text_value(field: AssetField, draft: &str) -> Result<FieldValue, CellError> {
    FieldValue::text(field, draft).ok_or(CellError::NotTextField(field))
}

/// Controller for the compound status cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCell {
    row_id: AssetId,
    value: AssetStatus,
    machine: Machine<AssetStatus>,
}

impl StatusCell {
    pub fn new(row_id: AssetId, value: AssetStatus) -> Self {
        Self {
            row_id,
            value,
            machine: Machine::new(),
        }
    }

    pub fn for_record(record: &AssetRecord) -> Self {
        Self::new(record.id.clone(), record.status.clone())
    }

    pub fn row_id(&self) -> &AssetId {
        &self.row_id
    }

    pub fn phase(&self) -> &CellPhase<AssetStatus> {
        &self.machine.phase
    }

    pub fn is_editing(&self) -> bool {
        !matches!(self.machine.phase, CellPhase::Viewing)
    }

    pub fn draft(&self) -> Option<&AssetStatus> {
        self.machine.draft()
    }

    pub fn begin(&mut self) -> bool {
        self.machine.begin(self.value.clone())
    }

    pub fn cycle_state(&mut self, delta: isize) {
        if let Some(draft) = self.machine.draft_mut() {
            draft.state = draft.state.cycle(delta);
            if !draft.state.uses_level() {
                draft.level = None;
            }
        }
    }

    /// Level `0` clears the level. Ignored for states without a level.
    pub fn set_level(&mut self, level: u8) {
        if level > MAX_STATUS_LEVEL {
            return;
        }
        if let Some(draft) = self.machine.draft_mut() {
            if !draft.state.uses_level() {
                return;
            }
            draft.level = (level > 0).then_some(level);
        }
    }

    pub fn clear_level(&mut self) {
        if let Some(draft) = self.machine.draft_mut() {
            draft.level = None;
        }
    }

    pub fn commit(&mut self) -> CommitDecision {
        self.machine.commit(|draft| Ok(FieldValue::Status(draft.clone())))
    }

    pub fn confirm(&mut self, accepted: bool) -> ConfirmDecision {
        match self.machine.confirm(accepted) {
            Some(Some((draft, value))) => {
                self.value = draft;
                ConfirmDecision::Submit(FieldEdit {
                    row_id: self.row_id.clone(),
                    value,
                })
            }
            Some(None) => ConfirmDecision::Discarded,
            None => ConfirmDecision::Ignored,
        }
    }

    pub fn cancel(&mut self) -> bool {
        self.machine.cancel()
    }

    pub fn display(&self) -> String {
        self.draft().unwrap_or(&self.value).display()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CellError, CellPhase, CommitDecision, ConfirmDecision, EditableCell, EditorKind, StatusCell,
    };
    use crate::dispatch::FieldEdit;
    use crate::ids::AssetId;
    use crate::model::{AssetField, AssetStatus, FieldValue, StatusState};
    use time::{Date, Month};

    fn serial_cell(value: &str) -> EditableCell {
        EditableCell::new(
            AssetId::from("A-1"),
            AssetField::Serial,
            EditorKind::Text,
            value.to_owned(),
        )
    }

    fn type_in(cell: &mut EditableCell, text: &str) {
        cell.clear_draft();
        for ch in text.chars() {
            cell.push_char(ch);
        }
    }

    #[test]
    fn begin_only_from_viewing() {
        let mut cell = serial_cell("A1");
        assert!(cell.begin());
        assert!(!cell.begin());
        assert_eq!(cell.draft(), Some("A1"));
    }

    #[test]
    fn unchanged_commit_closes_without_submission() {
        let mut cell = serial_cell("A1");
        cell.begin();
        assert_eq!(cell.commit(), CommitDecision::Unchanged);
        assert_eq!(cell.phase(), &CellPhase::Viewing);
        assert_eq!(cell.confirm(true), ConfirmDecision::Ignored);
    }

    #[test]
    fn changed_commit_requires_confirmation_then_submits() {
        let mut cell = serial_cell("A1");
        cell.begin();
        type_in(&mut cell, "A2");
        assert_eq!(cell.commit(), CommitDecision::NeedsConfirmation);
        assert_eq!(
            cell.confirm(true),
            ConfirmDecision::Submit(FieldEdit {
                row_id: AssetId::from("A-1"),
                value: FieldValue::Serial("A2".to_owned()),
            })
        );
        assert!(!cell.is_editing());
        assert_eq!(cell.display(), "A2");
    }

    #[test]
    fn second_commit_while_confirming_is_ignored() {
        let mut cell = serial_cell("A1");
        cell.begin();
        type_in(&mut cell, "A2");
        assert_eq!(cell.commit(), CommitDecision::NeedsConfirmation);
        assert_eq!(cell.commit(), CommitDecision::Ignored);
        assert!(matches!(cell.confirm(true), ConfirmDecision::Submit(_)));
        assert_eq!(cell.commit(), CommitDecision::Ignored);
        assert_eq!(cell.confirm(true), ConfirmDecision::Ignored);
    }

    #[test]
    fn declining_reverts_to_origin() {
        let mut cell = serial_cell("A1");
        cell.begin();
        type_in(&mut cell, "B7");
        cell.commit();
        assert_eq!(cell.confirm(false), ConfirmDecision::Discarded);
        assert_eq!(cell.display(), "A1");
    }

    #[test]
    fn cancel_discards_draft() {
        let mut cell = serial_cell("A1");
        cell.begin();
        type_in(&mut cell, "zzz");
        assert!(cell.cancel());
        assert_eq!(cell.display(), "A1");
        assert!(!cell.cancel());
    }

    #[test]
    fn early_date_is_rejected_and_reverted() {
        let mut cell = EditableCell::new(
            AssetId::from("A-1"),
            AssetField::EndDate,
            EditorKind::Date,
            String::new(),
        );
        cell.begin();
        type_in(&mut cell, "2023-05-01");
        assert_eq!(cell.commit(), CommitDecision::Rejected(CellError::YearTooEarly));
        assert_eq!(cell.phase(), &CellPhase::Viewing);
        assert_eq!(cell.display(), "");
    }

    #[test]
    fn valid_date_submits_typed_value_and_displays_day_first() {
        let mut cell = EditableCell::new(
            AssetId::from("A-1"),
            AssetField::EndDate,
            EditorKind::Date,
            "2024-12-01".to_owned(),
        );
        assert_eq!(cell.display(), "01/12/2024");
        cell.begin();
        type_in(&mut cell, "2025-01-15");
        cell.commit();
        let expected = Date::from_calendar_date(2025, Month::January, 15).expect("valid date");
        assert_eq!(
            cell.confirm(true),
            ConfirmDecision::Submit(FieldEdit {
                row_id: AssetId::from("A-1"),
                value: FieldValue::EndDate(Some(expected)),
            })
        );
        assert_eq!(cell.display(), "15/01/2025");
    }

    #[test]
    fn select_draft_only_moves_through_options() {
        let options = vec!["Excavator".to_owned(), "Truck".to_owned()];
        let mut cell = EditableCell::new(
            AssetId::from("A-1"),
            AssetField::Category,
            EditorKind::Select(options),
            "Truck".to_owned(),
        );
        cell.begin();
        cell.push_char('x');
        assert_eq!(cell.draft(), Some("Truck"));
        cell.cycle_option(1);
        assert_eq!(cell.draft(), Some("Excavator"));
        assert_eq!(cell.commit(), CommitDecision::NeedsConfirmation);
    }

    #[test]
    fn text_editor_on_structured_field_is_rejected() {
        let mut cell = EditableCell::new(
            AssetId::from("A-1"),
            AssetField::Status,
            EditorKind::Text,
            String::new(),
        );
        cell.begin();
        cell.push_char('x');
        assert_eq!(
            cell.commit(),
            CommitDecision::Rejected(CellError::NotTextField(AssetField::Status))
        );
        assert!(!cell.is_editing());
    }

    #[test]
    fn status_cell_clears_level_for_levelless_states() {
        let mut cell = StatusCell::new(
            AssetId::from("A-1"),
            AssetStatus::new(StatusState::Operational, Some(4)),
        );
        cell.begin();
        cell.cycle_state(2);
        assert_eq!(
            cell.draft(),
            Some(&AssetStatus::new(StatusState::Repair, None))
        );
        cell.set_level(3);
        assert_eq!(cell.draft().and_then(|status| status.level), None);
    }

    #[test]
    fn status_cell_submits_compound_value() {
        let mut cell = StatusCell::new(
            AssetId::from("A-1"),
            AssetStatus::new(StatusState::Operational, Some(4)),
        );
        cell.begin();
        cell.set_level(2);
        assert_eq!(cell.commit(), CommitDecision::NeedsConfirmation);
        assert_eq!(
            cell.confirm(true),
            ConfirmDecision::Submit(FieldEdit {
                row_id: AssetId::from("A-1"),
                value: FieldValue::Status(AssetStatus::new(StatusState::Operational, Some(2))),
            })
        );
    }

    #[test]
    fn status_level_zero_clears() {
        let mut cell = StatusCell::new(
            AssetId::from("A-1"),
            AssetStatus::new(StatusState::Maintenance, Some(1)),
        );
        cell.begin();
        cell.set_level(0);
        assert_eq!(cell.draft().and_then(|status| status.level), None);
        cell.set_level(9);
        assert_eq!(cell.draft().and_then(|status| status.level), None);
    }
}
