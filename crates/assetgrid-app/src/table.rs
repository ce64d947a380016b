// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{info, warn};

use crate::api::ApiError;
use crate::dispatch::FieldEdit;
use crate::ids::AssetId;
use crate::model::{AssetRecord, ColumnId};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn indicator(self) -> &'static str {
        match self {
            Self::Asc => "\u{25b2}",
            Self::Desc => "\u{25bc}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: ColumnId,
    pub direction: SortDirection,
}

/// Everything about how rows are presented. Only `column_order` outlives
/// the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableViewState {
    pub sorting: Vec<SortSpec>,
    pub column_filters: BTreeMap<ColumnId, String>,
    pub global_filter: String,
    pub hidden: BTreeSet<ColumnId>,
    pub column_order: Vec<ColumnId>,
    pub selection: BTreeSet<AssetId>,
    pub expanded: BTreeSet<AssetId>,
    pub page_index: usize,
    pub page_size: usize,
}

impl TableViewState {
    pub fn new(page_size: usize) -> Self {
        Self {
            sorting: Vec::new(),
            column_filters: BTreeMap::new(),
            global_filter: String::new(),
            hidden: BTreeSet::new(),
            column_order: ColumnId::DEFAULT_ORDER.to_vec(),
            selection: BTreeSet::new(),
            expanded: BTreeSet::new(),
            page_index: 0,
            page_size: page_size.max(1),
        }
    }
}

impl Default for TableViewState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("No items selected!")]
    EmptySelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub ids: Vec<AssetId>,
}

impl DeleteRequest {
    pub fn confirmation_prompt(&self) -> String {
        format!("Are you sure you want to delete {} item(s)?", self.ids.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { count: usize },
    Failed { message: String },
}

/// One rendered line of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridRow<'a> {
    pub record: &'a AssetRecord,
    pub depth: usize,
}

/// Owns the row collection and view state. Every mutation goes through a
/// setter here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTable {
    rows: Vec<AssetRecord>,
    view: TableViewState,
}

impl AssetTable {
    pub fn new(rows: Vec<AssetRecord>, page_size: usize) -> Self {
        Self {
            rows,
            view: TableViewState::new(page_size),
        }
    }

    pub fn rows(&self) -> &[AssetRecord] {
        &self.rows
    }

    pub fn view(&self) -> &TableViewState {
        &self.view
    }

    /// Replaces the collection after a reload. Selection and expansion keep
    /// only ids that still exist; the page index is clamped, not reset.
    pub fn set_rows(&mut self, rows: Vec<AssetRecord>) {
        self.rows = rows;
        self.prune_row_state();
        self.clamp_page();
    }

    pub fn snapshot_rows(&self) -> Vec<AssetRecord> {
        self.rows.clone()
    }

    pub fn restore_rows(&mut self, snapshot: Vec<AssetRecord>) {
        self.rows = snapshot;
        self.prune_row_state();
        self.clamp_page();
    }

    pub fn find_row(&self, id: &AssetId) -> Option<&AssetRecord> {
        self.rows.iter().find_map(|row| {
            if &row.id == id {
                Some(row)
            } else {
                row.sub_rows.iter().find(|sub| &sub.id == id)
            }
        })
    }

    fn find_row_mut(&mut self, id: &AssetId) -> Option<&mut AssetRecord> {
        self.rows.iter_mut().find_map(|row| {
            if &row.id == id {
                Some(row)
            } else {
                row.sub_rows.iter_mut().find(|sub| &sub.id == id)
            }
        })
    }

    /// Returns `false` when no row carries the edit's id.
    pub fn apply_edit(&mut self, edit: &FieldEdit) -> bool {
        match self.find_row_mut(&edit.row_id) {
            Some(row) => {
                row.apply(&edit.value);
                true
            }
            None => false,
        }
    }

    pub fn prepend_row(&mut self, record: AssetRecord) {
        self.rows.insert(0, record);
    }

    // Sorting.

    /// Cycles a column through ascending, descending and unsorted. Without
    /// `multi` every other sort is dropped first.
    pub fn toggle_sort(&mut self, column: ColumnId, multi: bool) -> bool {
        if !column.can_sort() {
            return false;
        }
        if !multi {
            self.view.sorting.retain(|spec| spec.column == column);
        }
        match self
            .view
            .sorting
            .iter()
            .position(|spec| spec.column == column)
        {
            Some(index) => match self.view.sorting[index].direction {
                SortDirection::Asc => self.view.sorting[index].direction = SortDirection::Desc,
                SortDirection::Desc => {
                    self.view.sorting.remove(index);
                }
            },
            None => self.view.sorting.push(SortSpec {
                column,
                direction: SortDirection::Asc,
            }),
        }
        true
    }

    pub fn clear_sorting(&mut self) {
        self.view.sorting.clear();
    }

    pub fn sort_direction(&self, column: ColumnId) -> Option<SortDirection> {
        self.view
            .sorting
            .iter()
            .find(|spec| spec.column == column)
            .map(|spec| spec.direction)
    }

    // Filtering.

    pub fn set_column_filter(&mut self, column: ColumnId, value: &str) -> bool {
        if !column.can_filter() {
            return false;
        }
        if value.trim().is_empty() {
            self.view.column_filters.remove(&column);
        } else {
            self.view.column_filters.insert(column, value.to_owned());
        }
        self.view.page_index = 0;
        true
    }

    pub fn column_filter(&self, column: ColumnId) -> &str {
        self.view
            .column_filters
            .get(&column)
            .map_or("", String::as_str)
    }

    pub fn set_global_filter(&mut self, value: &str) {
        self.view.global_filter = value.to_owned();
        self.view.page_index = 0;
    }

    pub fn clear_filters(&mut self) {
        self.view.column_filters.clear();
        self.view.global_filter.clear();
        self.view.page_index = 0;
    }

    // Columns.

    pub fn toggle_column_hidden(&mut self, column: ColumnId) -> bool {
        if !column.can_hide() {
            return false;
        }
        if !self.view.hidden.remove(&column) {
            self.view.hidden.insert(column);
        }
        true
    }

    pub fn is_hidden(&self, column: ColumnId) -> bool {
        self.view.hidden.contains(&column)
    }

    pub fn set_column_order(&mut self, order: Vec<ColumnId>) {
        self.view.column_order = order;
    }

    /// Stored order (duplicates dropped), then every known column it is
    /// missing in definition order.
    pub fn effective_order(&self) -> Vec<ColumnId> {
        let mut order: Vec<ColumnId> = Vec::with_capacity(ColumnId::ALL.len());
        for column in self.view.column_order.iter().chain(ColumnId::ALL.iter()) {
            if !order.contains(column) {
                order.push(*column);
            }
        }
        order
    }

    pub fn visible_columns(&self) -> Vec<ColumnId> {
        self.effective_order()
            .into_iter()
            .filter(|column| !self.is_hidden(*column))
            .collect()
    }

    /// Moves a column by `delta` positions within the effective order.
    /// Returns whether the order changed.
    pub fn move_column(&mut self, column: ColumnId, delta: isize) -> bool {
        let mut order = self.effective_order();
        let Some(from) = order.iter().position(|candidate| *candidate == column) else {
            return false;
        };
        let to = (from as isize + delta).clamp(0, order.len() as isize - 1) as usize;
        if to == from {
            return false;
        }
        let moved = order.remove(from);
        order.insert(to, moved);
        self.view.column_order = order;
        true
    }

    // Selection and expansion.

    pub fn toggle_row_selected(&mut self, id: &AssetId) -> bool {
        if self.find_row(id).is_none() {
            return false;
        }
        if !self.view.selection.remove(id) {
            self.view.selection.insert(id.clone());
        }
        true
    }

    pub fn is_selected(&self, id: &AssetId) -> bool {
        self.view.selection.contains(id)
    }

    pub fn clear_selection(&mut self) {
        self.view.selection.clear();
    }

    /// Selects every top-level row on the current page, or clears them all
    /// when they are already selected.
    pub fn toggle_all_page(&mut self) {
        let ids: Vec<AssetId> = self
            .page_top_level()
            .into_iter()
            .map(|row| row.id.clone())
            .collect();
        let all_selected = !ids.is_empty() && ids.iter().all(|id| self.is_selected(id));
        for id in ids {
            if all_selected {
                self.view.selection.remove(&id);
            } else {
                self.view.selection.insert(id);
            }
        }
    }

    /// Selected ids in collection order, sub-rows after their parent.
    pub fn selected_ids(&self) -> Vec<AssetId> {
        self.rows
            .iter()
            .flat_map(|row| std::iter::once(row).chain(row.sub_rows.iter()))
            .filter(|row| self.is_selected(&row.id))
            .map(|row| row.id.clone())
            .collect()
    }

    /// Selected ids among the filtered rows and their sub-rows, in display
    /// order.
    pub fn visible_selected_ids(&self) -> Vec<AssetId> {
        self.filtered_rows()
            .into_iter()
            .flat_map(|row| std::iter::once(row).chain(row.sub_rows.iter()))
            .filter(|row| self.is_selected(&row.id))
            .map(|row| row.id.clone())
            .collect()
    }

    pub fn toggle_expanded(&mut self, id: &AssetId) -> bool {
        let expandable = self
            .rows
            .iter()
            .any(|row| &row.id == id && row.has_sub_rows());
        if !expandable {
            return false;
        }
        if !self.view.expanded.remove(id) {
            self.view.expanded.insert(id.clone());
        }
        true
    }

    pub fn is_expanded(&self, id: &AssetId) -> bool {
        self.view.expanded.contains(id)
    }

    // Derived rows.

    /// Top-level rows after filters and sorting. Filters and sort keys only
    /// look at top-level rows; the sub-rows of a matching parent come along
    /// unfiltered and in collection order.
    pub fn filtered_rows(&self) -> Vec<&AssetRecord> {
        let visible = self.visible_columns();
        let mut rows: Vec<&AssetRecord> = self
            .rows
            .iter()
            .filter(|row| self.matches_filters(row, &visible))
            .collect();
        if !self.view.sorting.is_empty() {
            rows.sort_by(|left, right| {
                self.view
                    .sorting
                    .iter()
                    .map(|spec| {
                        let ordering = compare_rows(left, right, spec.column);
                        match spec.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        rows
    }

    fn matches_filters(&self, row: &AssetRecord, visible: &[ColumnId]) -> bool {
        let column_match = self
            .view
            .column_filters
            .iter()
            .all(|(column, needle)| contains_ignore_case(&row.cell_text(*column), needle));
        if !column_match {
            return false;
        }
        let global = self.view.global_filter.trim();
        global.is_empty()
            || visible
                .iter()
                .filter(|column| column.can_filter())
                .any(|column| contains_ignore_case(&row.cell_text(*column), global))
    }

    pub fn row_count(&self) -> usize {
        self.filtered_rows().len()
    }

    pub fn page_size(&self) -> usize {
        self.view.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.view.page_size = page_size.max(1);
        self.clamp_page();
    }

    pub fn page_count(&self) -> usize {
        self.row_count().div_ceil(self.view.page_size).max(1)
    }

    pub fn page_index(&self) -> usize {
        self.view.page_index.min(self.page_count() - 1)
    }

    pub fn can_previous_page(&self) -> bool {
        self.page_index() > 0
    }

    pub fn can_next_page(&self) -> bool {
        self.page_index() + 1 < self.page_count()
    }

    pub fn set_page_index(&mut self, index: usize) {
        self.view.page_index = index.min(self.page_count() - 1);
    }

    pub fn next_page(&mut self) {
        if self.can_next_page() {
            self.view.page_index = self.page_index() + 1;
        }
    }

    pub fn previous_page(&mut self) {
        if self.can_previous_page() {
            self.view.page_index = self.page_index() - 1;
        }
    }

    pub fn first_page(&mut self) {
        self.view.page_index = 0;
    }

    pub fn last_page(&mut self) {
        self.view.page_index = self.page_count() - 1;
    }

    fn clamp_page(&mut self) {
        self.view.page_index = self.page_index();
    }

    fn page_top_level(&self) -> Vec<&AssetRecord> {
        let size = self.view.page_size;
        self.filtered_rows()
            .into_iter()
            .skip(self.page_index() * size)
            .take(size)
            .collect()
    }

    /// Rows shown on the current page: each top-level row followed by its
    /// sub-rows when expanded.
    pub fn page_rows(&self) -> Vec<GridRow<'_>> {
        let mut lines = Vec::new();
        for record in self.page_top_level() {
            lines.push(GridRow { record, depth: 0 });
            if self.is_expanded(&record.id) {
                lines.extend(
                    record
                        .sub_rows
                        .iter()
                        .map(|record| GridRow { record, depth: 1 }),
                );
            }
        }
        lines
    }

    pub fn range_summary(&self) -> String {
        let total = self.row_count();
        if total == 0 {
            return "Showing 0 to 0 of 0 records".to_owned();
        }
        let size = self.view.page_size;
        let start = self.page_index() * size + 1;
        let end = ((self.page_index() + 1) * size).min(total);
        format!("Showing {start} to {end} of {total} records")
    }

    /// Options for the category select cell.
    pub fn category_options(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| std::iter::once(row).chain(row.sub_rows.iter()))
            .map(|row| row.category.clone())
            .filter(|category| !category.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // Batch delete.

    /// Builds the delete request from selected rows that pass the current
    /// filters. Selected rows hidden by a filter are left alone.
    pub fn selected_for_delete(&self) -> Result<DeleteRequest, TableError> {
        let ids = self.visible_selected_ids();
        if ids.is_empty() {
            return Err(TableError::EmptySelection);
        }
        Ok(DeleteRequest { ids })
    }

    /// Applies the server's answer to a batch delete. Success removes exactly
    /// the requested ids and clears the selection; failure changes nothing.
    pub fn apply_delete_result(
        &mut self,
        request: &DeleteRequest,
        result: Result<(), ApiError>,
    ) -> DeleteOutcome {
        match result {
            Ok(()) => {
                let ids: BTreeSet<&AssetId> = request.ids.iter().collect();
                self.rows.retain(|row| !ids.contains(&row.id));
                for row in &mut self.rows {
                    row.sub_rows.retain(|sub| !ids.contains(&sub.id));
                }
                self.clear_selection();
                self.prune_row_state();
                self.clamp_page();
                info!(count = request.ids.len(), "deleted items");
                DeleteOutcome::Deleted {
                    count: request.ids.len(),
                }
            }
            Err(error) => {
                warn!(count = request.ids.len(), %error, "batch delete failed");
                DeleteOutcome::Failed {
                    message: format!("Failed to delete items: {}", error.detail()),
                }
            }
        }
    }

    fn prune_row_state(&mut self) {
        let known: BTreeSet<AssetId> = self
            .rows
            .iter()
            .flat_map(|row| std::iter::once(row).chain(row.sub_rows.iter()))
            .map(|row| row.id.clone())
            .collect();
        self.view.selection.retain(|id| known.contains(id));
        self.view.expanded.retain(|id| known.contains(id));
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn compare_rows(left: &AssetRecord, right: &AssetRecord, column: ColumnId) -> Ordering {
    match column {
        ColumnId::EndDate => left.end_date.cmp(&right.end_date),
        ColumnId::Status => left
            .status
            .state
            .as_str()
            .cmp(right.status.state.as_str())
            .then(left.status.level.cmp(&right.status.level)),
        _ => left
            .cell_text(column)
            .to_lowercase()
            .cmp(&right.cell_text(column).to_lowercase()),
    }
}
