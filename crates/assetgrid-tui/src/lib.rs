// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use assetgrid_app::{
    ApiError, AppCommand, AppMode, AppState, AssetField, AssetId, AssetRecord, AssetTable,
    CONFIRM_CHANGE_PROMPT, CellKind, CellPhase, ColumnId, ColumnOrderPersistence,
    ColumnOrderStore, CommitDecision, ConfirmDecision, DeleteOutcome, DeleteRequest,
    DispatchError, EditableCell, EditorKind, FieldEdit, GridRow, NewAsset, NewAssetField,
    NewAssetForm, RowUrgency, StatusCell, StatusKind, UpdateDispatcher, UpdateOutcome,
    UpdateRequest, UpdateTicket,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use serde_json::Value;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::{Date, OffsetDateTime};
use tracing::debug;

const PENDING_MARK: &str = " …";
const FILTER_MARK: &str = " *";
const EDIT_CARET: &str = "▏";
const PAGE_SIZE_OPTIONS: [usize; 5] = [10, 20, 30, 40, 50];
const INFO_CLEAR_AFTER: Duration = Duration::from_secs(4);
const ERROR_CLEAR_AFTER: Duration = Duration::from_secs(8);

/// Backend the grid talks to. The `spawn_*` hooks run the call inline and
/// report through the channel; runtimes with a thread-safe backend override
/// them to keep the UI responsive.
pub trait GridRuntime {
    fn load_items(&mut self) -> Result<Vec<AssetRecord>, ApiError>;
    fn patch_item(&mut self, id: &AssetId, patch: &Value) -> Result<(), ApiError>;
    fn delete_items(&mut self, ids: &[AssetId]) -> Result<(), ApiError>;
    fn create_item(&mut self, item: &NewAsset) -> Result<AssetRecord, ApiError>;
    fn column_store(&self) -> &dyn ColumnOrderStore;

    fn spawn_patch(&mut self, request: UpdateRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.patch_item(&request.row_id, &request.patch);
        tx.send(InternalEvent::PatchSettled {
            ticket: request.ticket,
            result,
        })
        .map_err(|_| anyhow!("update event channel closed"))
    }

    fn spawn_delete(&mut self, request: DeleteRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.delete_items(&request.ids);
        tx.send(InternalEvent::DeleteSettled { request, result })
            .map_err(|_| anyhow!("delete event channel closed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    PatchSettled {
        ticket: UpdateTicket,
        result: Result<(), ApiError>,
    },
    DeleteSettled {
        request: DeleteRequest,
        result: Result<(), ApiError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveEditor {
    Cell(EditableCell),
    Status(StatusCell),
}

impl ActiveEditor {
    fn row_id(&self) -> &AssetId {
        match self {
            Self::Cell(cell) => cell.row_id(),
            Self::Status(cell) => cell.row_id(),
        }
    }

    fn field(&self) -> AssetField {
        match self {
            Self::Cell(cell) => cell.field(),
            Self::Status(_) => AssetField::Status,
        }
    }

    fn begin(&mut self) -> bool {
        match self {
            Self::Cell(cell) => cell.begin(),
            Self::Status(cell) => cell.begin(),
        }
    }

    fn commit(&mut self) -> CommitDecision {
        match self {
            Self::Cell(cell) => cell.commit(),
            Self::Status(cell) => cell.commit(),
        }
    }

    fn confirm(&mut self, accepted: bool) -> ConfirmDecision {
        match self {
            Self::Cell(cell) => cell.confirm(accepted),
            Self::Status(cell) => cell.confirm(accepted),
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Cell(cell) => cell.display(),
            Self::Status(cell) => cell.display(),
        }
    }

    fn is_confirming(&self) -> bool {
        match self {
            Self::Cell(cell) => matches!(cell.phase(), CellPhase::Confirming { .. }),
            Self::Status(cell) => matches!(cell.phase(), CellPhase::Confirming { .. }),
        }
    }

    fn input(&mut self, key: KeyEvent) {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match self {
            Self::Cell(cell) => {
                if matches!(cell.kind(), EditorKind::Select(_)) {
                    match key.code {
                        KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('k') => {
                            cell.cycle_option(-1);
                        }
                        KeyCode::Right
                        | KeyCode::Char('l')
                        | KeyCode::Char('j')
                        | KeyCode::Char(' ') => cell.cycle_option(1),
                        _ => {}
                    }
                    return;
                }
                match key.code {
                    KeyCode::Char('u') if control => cell.clear_draft(),
                    KeyCode::Backspace => cell.backspace(),
                    KeyCode::Char(ch) if !control => cell.push_char(ch),
                    _ => {}
                }
            }
            Self::Status(cell) => match key.code {
                KeyCode::Left | KeyCode::Char('h') => cell.cycle_state(-1),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => cell.cycle_state(1),
                KeyCode::Backspace => cell.clear_level(),
                KeyCode::Char(ch) => {
                    if let Some(level) = ch.to_digit(10).and_then(|d| u8::try_from(d).ok()) {
                        cell.set_level(level);
                    }
                }
                _ => {}
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterTarget {
    Global,
    Column(ColumnId),
}

impl FilterTarget {
    fn label(self) -> &'static str {
        match self {
            Self::Global => "search",
            Self::Column(column) => column.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilterInput {
    target: FilterTarget,
    buffer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FormUiState {
    form: NewAssetForm,
    field: usize,
}

#[derive(Debug, Clone, Copy)]
enum Focus {
    Row(isize),
    Col(isize),
}

#[derive(Debug)]
struct ViewData {
    table: AssetTable,
    dispatcher: UpdateDispatcher,
    column_order: ColumnOrderPersistence,
    cursor_row: usize,
    cursor_col: usize,
    editor: Option<ActiveEditor>,
    pending_delete: Option<DeleteRequest>,
    delete_in_flight: bool,
    filter: Option<FilterInput>,
    columns_cursor: usize,
    form: Option<FormUiState>,
    status_token: u64,
}

impl ViewData {
    fn new(page_size: usize) -> Self {
        Self {
            table: AssetTable::new(Vec::new(), page_size),
            dispatcher: UpdateDispatcher::new(),
            column_order: ColumnOrderPersistence::new(),
            cursor_row: 0,
            cursor_col: 1,
            editor: None,
            pending_delete: None,
            delete_in_flight: false,
            filter: None,
            columns_cursor: 0,
            form: None,
            status_token: 0,
        }
    }
}

pub fn run_app<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    page_size: usize,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (internal_tx, internal_rx) = mpsc::channel();
    let mut view_data = ViewData::new(page_size);
    view_data
        .column_order
        .restore(runtime.column_store(), &mut view_data.table);
    reload_items(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event
            && let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(state, runtime, &mut view_data, &internal_tx, key)
        {
            break;
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::PatchSettled { ticket, result } => {
                settle_update(state, view_data, tx, ticket, result);
            }
            InternalEvent::DeleteSettled { request, result } => {
                finish_delete(state, view_data, tx, &request, result);
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64, after: Duration) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(after);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn notify(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: StatusKind,
    message: String,
) {
    state.dispatch(AppCommand::Notify(kind, message));
    view_data.status_token = view_data.status_token.saturating_add(1);
    let after = match kind {
        StatusKind::Info => INFO_CLEAR_AFTER,
        StatusKind::Error => ERROR_CLEAR_AFTER,
    };
    schedule_status_clear(internal_tx, view_data.status_token, after);
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    notify(state, view_data, internal_tx, StatusKind::Info, message.into());
}

fn emit_error(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    notify(state, view_data, internal_tx, StatusKind::Error, message.into());
}

fn handle_key_event<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c'))
    {
        return true;
    }

    match state.mode {
        AppMode::Browse => return handle_browse_key(state, runtime, view_data, internal_tx, key),
        AppMode::EditCell => handle_edit_key(state, view_data, internal_tx, key),
        AppMode::Confirm => handle_confirm_key(state, runtime, view_data, internal_tx, key),
        AppMode::Filter => handle_filter_key(state, view_data, key),
        AppMode::ColumnsMenu => {
            handle_columns_menu_key(state, runtime, view_data, internal_tx, key);
        }
        AppMode::AddForm => handle_form_key(state, runtime, view_data, internal_tx, key),
        AppMode::Help => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                state.dispatch(AppCommand::ExitToBrowse);
            }
        }
    }
    false
}

fn handle_browse_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('j') | KeyCode::Down => move_row(view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_row(view_data, -1),
        KeyCode::Char('h') | KeyCode::Left => move_col(view_data, -1),
        KeyCode::Char('l') | KeyCode::Right => move_col(view_data, 1),
        KeyCode::Char('g') | KeyCode::Home => view_data.cursor_row = 0,
        KeyCode::Char('G') | KeyCode::End => {
            view_data.cursor_row = view_data.table.page_rows().len().saturating_sub(1);
        }
        KeyCode::Enter | KeyCode::Char('e') => begin_edit(state, view_data, internal_tx),
        KeyCode::Char(' ') => toggle_current_selection(state, view_data, internal_tx),
        KeyCode::Char('a') => view_data.table.toggle_all_page(),
        KeyCode::Char('x') => toggle_current_expansion(state, view_data, internal_tx),
        KeyCode::Char('s') => sort_current_column(state, view_data, internal_tx, false),
        KeyCode::Char('S') => sort_current_column(state, view_data, internal_tx, true),
        KeyCode::Char('/') => open_filter(state, view_data, FilterTarget::Global),
        KeyCode::Char('f') => match current_column(view_data) {
            Some(column) if column.can_filter() => {
                open_filter(state, view_data, FilterTarget::Column(column));
            }
            _ => emit_error(
                state,
                view_data,
                internal_tx,
                "this column cannot be filtered",
            ),
        },
        KeyCode::Char('F') => {
            view_data.table.clear_filters();
            clamp_cursor(view_data);
            emit_status(state, view_data, internal_tx, "filters cleared");
        }
        KeyCode::Char('<') => shift_current_column(runtime, view_data, -1),
        KeyCode::Char('>') => shift_current_column(runtime, view_data, 1),
        KeyCode::Char('c') => {
            view_data.columns_cursor = 0;
            state.dispatch(AppCommand::Enter(AppMode::ColumnsMenu));
        }
        KeyCode::Char('D') => request_delete(state, view_data, internal_tx),
        KeyCode::Char('A') => {
            view_data.form = Some(FormUiState::default());
            state.dispatch(AppCommand::Enter(AppMode::AddForm));
        }
        KeyCode::Char('r') => reload_items(state, runtime, view_data, internal_tx),
        KeyCode::Char(']') | KeyCode::PageDown => {
            view_data.table.next_page();
            view_data.cursor_row = 0;
        }
        KeyCode::Char('[') | KeyCode::PageUp => {
            view_data.table.previous_page();
            view_data.cursor_row = 0;
        }
        KeyCode::Char('}') => {
            view_data.table.last_page();
            view_data.cursor_row = 0;
        }
        KeyCode::Char('{') => {
            view_data.table.first_page();
            view_data.cursor_row = 0;
        }
        KeyCode::Char('p') => cycle_page_size(state, view_data, internal_tx),
        KeyCode::Char('?') => {
            state.dispatch(AppCommand::Enter(AppMode::Help));
        }
        _ => {}
    }
    false
}

fn handle_edit_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.editor = None;
            state.dispatch(AppCommand::ExitToBrowse);
        }
        KeyCode::Enter => {
            commit_editor(state, view_data, internal_tx);
        }
        KeyCode::Tab => leave_cell(state, view_data, internal_tx, Focus::Col(1)),
        KeyCode::BackTab => leave_cell(state, view_data, internal_tx, Focus::Col(-1)),
        KeyCode::Up => leave_cell(state, view_data, internal_tx, Focus::Row(-1)),
        KeyCode::Down => leave_cell(state, view_data, internal_tx, Focus::Row(1)),
        _ => {
            if let Some(editor) = view_data.editor.as_mut() {
                editor.input(key);
            }
        }
    }
}

/// Focus moving away from an editing cell commits it. A change that needs
/// confirmation keeps the focus where it is.
fn leave_cell(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    focus: Focus,
) {
    let decision = commit_editor(state, view_data, internal_tx);
    if decision == CommitDecision::NeedsConfirmation {
        return;
    }
    match focus {
        Focus::Row(delta) => move_row(view_data, delta),
        Focus::Col(delta) => move_col(view_data, delta),
    }
}

fn commit_editor(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) -> CommitDecision {
    let Some(editor) = view_data.editor.as_mut() else {
        return CommitDecision::Ignored;
    };
    let decision = editor.commit();
    match &decision {
        CommitDecision::Ignored => {}
        CommitDecision::Unchanged => {
            view_data.editor = None;
            state.dispatch(AppCommand::ExitToBrowse);
        }
        CommitDecision::Rejected(error) => {
            view_data.editor = None;
            state.dispatch(AppCommand::ExitToBrowse);
            emit_error(state, view_data, internal_tx, error.to_string());
        }
        CommitDecision::NeedsConfirmation => {
            state.dispatch(AppCommand::Enter(AppMode::Confirm));
        }
    }
    decision
}

fn handle_confirm_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let accepted = match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => true,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
        _ => return,
    };
    state.dispatch(AppCommand::ExitToBrowse);

    if let Some(request) = view_data.pending_delete.take() {
        if accepted {
            start_delete(state, runtime, view_data, internal_tx, request);
        } else {
            emit_status(state, view_data, internal_tx, "delete canceled");
        }
        return;
    }

    let Some(mut editor) = view_data.editor.take() else {
        return;
    };
    match editor.confirm(accepted) {
        ConfirmDecision::Submit(edit) => submit_edit(state, runtime, view_data, internal_tx, edit),
        ConfirmDecision::Discarded => {
            emit_status(state, view_data, internal_tx, "changes discarded");
        }
        ConfirmDecision::Ignored => {}
    }
}

fn begin_edit(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let (Some(row_id), Some(column)) = (current_row_id(view_data), current_column(view_data))
    else {
        emit_error(state, view_data, internal_tx, "nothing to edit");
        return;
    };
    match column.cell_kind() {
        CellKind::Control => {
            view_data.table.toggle_row_selected(&row_id);
            return;
        }
        CellKind::ReadOnly => {
            emit_error(
                state,
                view_data,
                internal_tx,
                format!("{} is read-only", column.label()),
            );
            return;
        }
        CellKind::Text | CellKind::Select | CellKind::Date | CellKind::Status => {}
    }
    let Some(field) = column.field() else {
        return;
    };
    if view_data.dispatcher.is_pending(&row_id, field) {
        let error = DispatchError::AlreadyPending {
            row_id,
            field: field.as_str(),
        };
        emit_error(state, view_data, internal_tx, error.to_string());
        return;
    }
    let Some(record) = view_data.table.find_row(&row_id) else {
        return;
    };
    let mut editor = match column.cell_kind() {
        CellKind::Status => ActiveEditor::Status(StatusCell::for_record(record)),
        CellKind::Date => {
            ActiveEditor::Cell(EditableCell::for_record(record, field, EditorKind::Date))
        }
        CellKind::Select => ActiveEditor::Cell(EditableCell::for_record(
            record,
            field,
            EditorKind::Select(view_data.table.category_options()),
        )),
        _ => ActiveEditor::Cell(EditableCell::for_record(record, field, EditorKind::Text)),
    };
    editor.begin();
    view_data.editor = Some(editor);
    state.dispatch(AppCommand::Enter(AppMode::EditCell));
}

fn submit_edit<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    edit: FieldEdit,
) {
    let request = match view_data.dispatcher.begin(&mut view_data.table, &edit) {
        Ok(request) => request,
        Err(error) => {
            emit_error(state, view_data, internal_tx, error.to_string());
            return;
        }
    };
    debug!(row = %request.row_id, ticket = request.ticket.0, "submitting field update");
    let ticket = request.ticket;
    if let Err(error) = runtime.spawn_patch(request, internal_tx.clone()) {
        let result = Err(ApiError::Transport(format!("{error:#}")));
        settle_update(state, view_data, internal_tx, ticket, result);
    }
}

fn settle_update(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    ticket: UpdateTicket,
    result: Result<(), ApiError>,
) {
    match view_data
        .dispatcher
        .settle(&mut view_data.table, ticket, result)
    {
        Ok(UpdateOutcome::Committed) => emit_status(state, view_data, internal_tx, "changes saved"),
        Ok(UpdateOutcome::RolledBack { reason }) => emit_error(
            state,
            view_data,
            internal_tx,
            format!("Failed to save changes: {reason}. Reverting."),
        ),
        Err(error) => emit_error(state, view_data, internal_tx, error.to_string()),
    }
    clamp_cursor(view_data);
}

fn request_delete(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if view_data.delete_in_flight {
        emit_error(state, view_data, internal_tx, "a delete is already in progress");
        return;
    }
    match view_data.table.selected_for_delete() {
        Ok(request) => {
            view_data.pending_delete = Some(request);
            state.dispatch(AppCommand::Enter(AppMode::Confirm));
        }
        Err(error) => emit_error(state, view_data, internal_tx, error.to_string()),
    }
}

fn start_delete<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    request: DeleteRequest,
) {
    view_data.delete_in_flight = true;
    if let Err(error) = runtime.spawn_delete(request.clone(), internal_tx.clone()) {
        let result = Err(ApiError::Transport(format!("{error:#}")));
        finish_delete(state, view_data, internal_tx, &request, result);
    }
}

fn finish_delete(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    request: &DeleteRequest,
    result: Result<(), ApiError>,
) {
    view_data.delete_in_flight = false;
    match view_data.table.apply_delete_result(request, result) {
        DeleteOutcome::Deleted { count } => {
            emit_status(state, view_data, internal_tx, format!("Deleted {count} item(s)"));
        }
        DeleteOutcome::Failed { message } => emit_error(state, view_data, internal_tx, message),
    }
    clamp_cursor(view_data);
}

fn reload_items<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if view_data.dispatcher.pending_count() > 0 || view_data.delete_in_flight {
        emit_error(
            state,
            view_data,
            internal_tx,
            "wait for pending saves to finish before reloading",
        );
        return;
    }
    match runtime.load_items() {
        Ok(rows) => {
            let count = rows.len();
            view_data.table.set_rows(rows);
            clamp_cursor(view_data);
            emit_status(state, view_data, internal_tx, format!("loaded {count} item(s)"));
        }
        Err(error) => emit_error(
            state,
            view_data,
            internal_tx,
            format!("Failed to load items: {}", error.detail()),
        ),
    }
}

fn open_filter(state: &mut AppState, view_data: &mut ViewData, target: FilterTarget) {
    let buffer = match target {
        FilterTarget::Global => view_data.table.view().global_filter.clone(),
        FilterTarget::Column(column) => view_data.table.column_filter(column).to_owned(),
    };
    view_data.filter = Some(FilterInput { target, buffer });
    state.dispatch(AppCommand::Enter(AppMode::Filter));
}

fn handle_filter_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) {
    let Some(input) = view_data.filter.as_mut() else {
        state.dispatch(AppCommand::ExitToBrowse);
        return;
    };
    match key.code {
        KeyCode::Enter => {
            view_data.filter = None;
            state.dispatch(AppCommand::ExitToBrowse);
            return;
        }
        KeyCode::Esc => input.buffer.clear(),
        KeyCode::Backspace => {
            input.buffer.pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            input.buffer.push(ch);
        }
        _ => return,
    }

    let input = input.clone();
    match input.target {
        FilterTarget::Global => view_data.table.set_global_filter(&input.buffer),
        FilterTarget::Column(column) => {
            view_data.table.set_column_filter(column, &input.buffer);
        }
    }
    view_data.cursor_row = 0;
    if key.code == KeyCode::Esc {
        view_data.filter = None;
        state.dispatch(AppCommand::ExitToBrowse);
    }
}

fn handle_columns_menu_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let order = view_data.table.effective_order();
    let Some(column) = order.get(view_data.columns_cursor).copied() else {
        view_data.columns_cursor = 0;
        return;
    };
    match key.code {
        KeyCode::Esc | KeyCode::Char('c') | KeyCode::Char('q') => {
            state.dispatch(AppCommand::ExitToBrowse);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.columns_cursor = (view_data.columns_cursor + 1).min(order.len() - 1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.columns_cursor = view_data.columns_cursor.saturating_sub(1);
        }
        KeyCode::Char(' ') | KeyCode::Enter => {
            if !view_data.table.toggle_column_hidden(column) {
                emit_error(
                    state,
                    view_data,
                    internal_tx,
                    "select column cannot be hidden",
                );
            }
        }
        KeyCode::Char('<') | KeyCode::Char('K') => {
            if view_data.table.move_column(column, -1) {
                view_data.columns_cursor -= 1;
                persist_column_order(runtime, view_data);
            }
        }
        KeyCode::Char('>') | KeyCode::Char('J') => {
            if view_data.table.move_column(column, 1) {
                view_data.columns_cursor += 1;
                persist_column_order(runtime, view_data);
            }
        }
        _ => {}
    }
    clamp_cursor(view_data);
}

fn handle_form_key<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form_state) = view_data.form.as_mut() else {
        state.dispatch(AppCommand::ExitToBrowse);
        return;
    };
    let fields = NewAssetField::ALL.len();
    let current = NewAssetField::ALL[form_state.field % fields];
    match key.code {
        KeyCode::Esc => {
            view_data.form = None;
            state.dispatch(AppCommand::ExitToBrowse);
        }
        KeyCode::Tab | KeyCode::Down => form_state.field = (form_state.field + 1) % fields,
        KeyCode::BackTab | KeyCode::Up => {
            form_state.field = (form_state.field + fields - 1) % fields;
        }
        KeyCode::Backspace => {
            form_state.form.value_mut(current).pop();
        }
        KeyCode::Enter => submit_form(state, runtime, view_data, internal_tx),
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            form_state.form.value_mut(current).push(ch);
        }
        _ => {}
    }
}

fn submit_form<R: GridRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(form_state) = view_data.form.as_ref() else {
        return;
    };
    let item = match form_state.form.validate(&view_data.table) {
        Ok(item) => item,
        Err(error) => {
            emit_error(state, view_data, internal_tx, format!("{error:#}"));
            return;
        }
    };
    match runtime.create_item(&item) {
        Ok(record) => {
            let id = record.id.clone();
            view_data.table.prepend_row(record);
            view_data.form = None;
            view_data.cursor_row = 0;
            state.dispatch(AppCommand::ExitToBrowse);
            emit_status(state, view_data, internal_tx, format!("Added {id}"));
        }
        Err(error) => emit_error(
            state,
            view_data,
            internal_tx,
            format!("Failed to add item: {}", error.detail()),
        ),
    }
}

fn toggle_current_selection(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match current_row_id(view_data) {
        Some(row_id) => {
            view_data.table.toggle_row_selected(&row_id);
        }
        None => emit_error(state, view_data, internal_tx, "no row to select"),
    }
}

fn toggle_current_expansion(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let expanded = current_row_id(view_data)
        .is_some_and(|row_id| view_data.table.toggle_expanded(&row_id));
    if !expanded {
        emit_error(state, view_data, internal_tx, "row has no sub-rows");
    }
    clamp_cursor(view_data);
}

fn sort_current_column(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    multi: bool,
) {
    let sorted = current_column(view_data)
        .is_some_and(|column| view_data.table.toggle_sort(column, multi));
    if !sorted {
        emit_error(state, view_data, internal_tx, "this column cannot be sorted");
    }
}

fn shift_current_column<R: GridRuntime>(runtime: &mut R, view_data: &mut ViewData, delta: isize) {
    let Some(column) = current_column(view_data) else {
        return;
    };
    if !view_data.table.move_column(column, delta) {
        return;
    }
    if let Some(index) = view_data
        .table
        .visible_columns()
        .iter()
        .position(|candidate| *candidate == column)
    {
        view_data.cursor_col = index;
    }
    persist_column_order(runtime, view_data);
}

fn persist_column_order<R: GridRuntime>(runtime: &mut R, view_data: &mut ViewData) {
    view_data
        .column_order
        .sync(runtime.column_store(), &view_data.table);
}

fn cycle_page_size(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let current = view_data.table.page_size();
    let next = PAGE_SIZE_OPTIONS
        .iter()
        .copied()
        .find(|size| *size > current)
        .unwrap_or(PAGE_SIZE_OPTIONS[0]);
    view_data.table.set_page_size(next);
    view_data.cursor_row = 0;
    emit_status(state, view_data, internal_tx, format!("Show {next}"));
}

fn current_row_id(view_data: &ViewData) -> Option<AssetId> {
    view_data
        .table
        .page_rows()
        .get(view_data.cursor_row)
        .map(|row| row.record.id.clone())
}

fn current_column(view_data: &ViewData) -> Option<ColumnId> {
    view_data
        .table
        .visible_columns()
        .get(view_data.cursor_col)
        .copied()
}

fn move_row(view_data: &mut ViewData, delta: isize) {
    let len = view_data.table.page_rows().len();
    if len == 0 {
        view_data.cursor_row = 0;
        return;
    }
    view_data.cursor_row = view_data
        .cursor_row
        .saturating_add_signed(delta)
        .min(len - 1);
}

fn move_col(view_data: &mut ViewData, delta: isize) {
    let len = view_data.table.visible_columns().len();
    if len == 0 {
        view_data.cursor_col = 0;
        return;
    }
    view_data.cursor_col = view_data
        .cursor_col
        .saturating_add_signed(delta)
        .min(len - 1);
}

fn clamp_cursor(view_data: &mut ViewData) {
    let rows = view_data.table.page_rows().len();
    view_data.cursor_row = view_data.cursor_row.min(rows.saturating_sub(1));
    let cols = view_data.table.visible_columns().len();
    view_data.cursor_col = view_data.cursor_col.min(cols.saturating_sub(1));
    let order = view_data.table.effective_order().len();
    view_data.columns_cursor = view_data.columns_cursor.min(order.saturating_sub(1));
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let today = OffsetDateTime::now_utc().date();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(state, view_data))
        .block(Block::default().title("assetgrid").borders(Borders::ALL));
    frame.render_widget(header, layout[0]);

    render_table(frame, layout[1], view_data, today);

    let status_color = match state.status_line.as_ref().map(|message| message.kind) {
        Some(StatusKind::Error) => Color::Red,
        _ => Color::Yellow,
    };
    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(status_color))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    match state.mode {
        AppMode::Confirm => {
            render_overlay(frame, "confirm", confirm_overlay_text(view_data), 56, 24);
        }
        AppMode::ColumnsMenu => {
            render_overlay(frame, "columns", columns_menu_text(view_data), 40, 60);
        }
        AppMode::AddForm => {
            render_overlay(frame, "add item", form_overlay_text(view_data), 60, 56);
        }
        AppMode::Help => render_overlay(frame, "help", help_overlay_text().to_owned(), 80, 72),
        AppMode::Browse | AppMode::EditCell | AppMode::Filter => {}
    }
}

fn render_overlay(
    frame: &mut ratatui::Frame<'_>,
    title: &str,
    body: String,
    percent_x: u16,
    percent_y: u16,
) {
    let area = centered_rect(percent_x, percent_y, frame.area());
    frame.render_widget(Clear, area);
    let overlay = Paragraph::new(body).block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(overlay, area);
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData, today: Date) {
    let table = &view_data.table;
    let columns = table.visible_columns();
    let widths = columns
        .iter()
        .map(|column| Constraint::Length(column.width()))
        .collect::<Vec<_>>();

    let header = Row::new(columns.iter().map(|column| {
        Cell::from(header_label(table, *column)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = table
        .page_rows()
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            let cursor_row = row_index == view_data.cursor_row;
            let mut base = urgency_style(RowUrgency::classify(row.record.end_date, today));
            if table.is_selected(&row.record.id) {
                base = base.add_modifier(Modifier::BOLD);
            }
            if row.depth > 0 {
                base = base.add_modifier(Modifier::ITALIC);
            }
            let cells = columns
                .iter()
                .enumerate()
                .map(|(col_index, column)| {
                    let mut style = base;
                    if cursor_row {
                        style = style.bg(Color::DarkGray);
                    }
                    if cursor_row && col_index == view_data.cursor_col {
                        style = if view_data.editor.is_some() {
                            Style::default().fg(Color::Black).bg(Color::Yellow)
                        } else {
                            Style::default()
                                .fg(Color::Black)
                                .bg(Color::Cyan)
                                .add_modifier(Modifier::BOLD)
                        };
                    }
                    Cell::from(cell_display(view_data, &row, *column)).style(style)
                })
                .collect::<Vec<_>>();
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(view_data))
                .borders(Borders::ALL),
        );
    frame.render_widget(widget, area);
}

fn urgency_style(urgency: RowUrgency) -> Style {
    match urgency {
        RowUrgency::Expired => Style::default().fg(Color::Red),
        RowUrgency::Imminent => Style::default().fg(Color::LightRed),
        RowUrgency::Soon => Style::default().fg(Color::Yellow),
        RowUrgency::Normal => Style::default(),
    }
}

fn cell_display(view_data: &ViewData, row: &GridRow<'_>, column: ColumnId) -> String {
    let record = row.record;
    if let Some(editor) = &view_data.editor
        && editor.row_id() == &record.id
        && column.field() == Some(editor.field())
    {
        if editor.is_confirming() {
            return editor.display();
        }
        return format!("{}{EDIT_CARET}", editor.display());
    }

    let table = &view_data.table;
    let mut text = match column {
        ColumnId::Select => {
            if table.is_selected(&record.id) {
                "[x]".to_owned()
            } else {
                "[ ]".to_owned()
            }
        }
        ColumnId::Id => {
            let marker = if row.depth > 0 {
                "  └ "
            } else if !record.has_sub_rows() {
                "  "
            } else if table.is_expanded(&record.id) {
                "▾ "
            } else {
                "▸ "
            };
            format!("{marker}{}", record.id)
        }
        other => record.cell_text(other),
    };
    if let Some(field) = column.field()
        && view_data.dispatcher.is_pending(&record.id, field)
    {
        text.push_str(PENDING_MARK);
    }
    text
}

fn header_label(table: &AssetTable, column: ColumnId) -> String {
    let mut label = match column {
        ColumnId::Select => "Sel".to_owned(),
        other => other.label().to_owned(),
    };
    let sorting = &table.view().sorting;
    if let Some((position, spec)) = sorting
        .iter()
        .enumerate()
        .find(|(_, spec)| spec.column == column)
    {
        label.push(' ');
        label.push_str(spec.direction.indicator());
        if sorting.len() > 1 {
            label.push_str(&(position + 1).to_string());
        }
    }
    if !table.column_filter(column).is_empty() {
        label.push_str(FILTER_MARK);
    }
    label
}

fn table_title(view_data: &ViewData) -> String {
    let selected = view_data.table.view().selection.len();
    let pending = view_data.dispatcher.pending_count();
    let mut title = format!("assets ({selected} selected)");
    if pending > 0 {
        title.push_str(&format!(" saving {pending}…"));
    }
    if view_data.delete_in_flight {
        title.push_str(" deleting…");
    }
    title
}

fn header_text(state: &AppState, view_data: &ViewData) -> String {
    let table = &view_data.table;
    let mut parts = vec![format!("[{}]", state.mode.badge())];

    let global = table.view().global_filter.trim();
    if !global.is_empty() {
        parts.push(format!("search: {global}"));
    }
    let column_filters = table
        .view()
        .column_filters
        .iter()
        .map(|(column, value)| format!("{}~{value}", column.label()))
        .collect::<Vec<_>>();
    if !column_filters.is_empty() {
        parts.push(format!("filters: {}", column_filters.join(", ")));
    }
    if let Some(input) = &view_data.filter {
        parts.push(format!(
            "{}: {}{EDIT_CARET}",
            input.target.label(),
            input.buffer
        ));
    }
    parts.push(mode_hint(state.mode).to_owned());
    parts.join(" | ")
}

fn mode_hint(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Browse => "enter edit | space select | D delete | A add | ? help",
        AppMode::EditCell => "enter save | esc cancel | tab next cell",
        AppMode::Confirm => "y confirm | n cancel",
        AppMode::Filter => "type to filter | enter keep | esc clear",
        AppMode::ColumnsMenu => "space toggle | </> move | esc close",
        AppMode::AddForm => "tab next field | enter submit | esc cancel",
        AppMode::Help => "esc close",
    }
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let table = &view_data.table;
    let mut text = format!(
        "{} | page {} of {} | {} per page",
        table.range_summary(),
        table.page_index() + 1,
        table.page_count(),
        table.page_size()
    );
    if let Some(message) = &state.status_line {
        text.push_str(" | ");
        text.push_str(&message.text);
    }
    text
}

fn confirm_overlay_text(view_data: &ViewData) -> String {
    if let Some(request) = &view_data.pending_delete {
        return format!("{}\n\ny delete | n cancel", request.confirmation_prompt());
    }
    let detail = view_data
        .editor
        .as_ref()
        .map(|editor| format!("{} → {}", editor.field().column().label(), editor.display()))
        .unwrap_or_default();
    format!("{CONFIRM_CHANGE_PROMPT}\n\n{detail}\n\ny save | n discard")
}

fn columns_menu_text(view_data: &ViewData) -> String {
    let table = &view_data.table;
    let mut lines = table
        .effective_order()
        .into_iter()
        .enumerate()
        .map(|(index, column)| {
            let cursor = if index == view_data.columns_cursor {
                ">"
            } else {
                " "
            };
            let mark = if table.is_hidden(column) { "[ ]" } else { "[x]" };
            let label = match column {
                ColumnId::Select => "Select",
                other => other.label(),
            };
            let fixed = if column.can_hide() { "" } else { " (fixed)" };
            format!("{cursor} {mark} {label}{fixed}")
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push(mode_hint(AppMode::ColumnsMenu).to_owned());
    lines.join("\n")
}

fn form_overlay_text(view_data: &ViewData) -> String {
    let Some(form_state) = &view_data.form else {
        return String::new();
    };
    let mut lines = NewAssetField::ALL
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let cursor = if index == form_state.field { ">" } else { " " };
            format!(
                "{cursor} {:<12} {}",
                field.label(),
                form_state.form.value(*field)
            )
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push(mode_hint(AppMode::AddForm).to_owned());
    lines.join("\n")
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit\n\
browse: j/k/h/l move | g/G first/last row | enter or e edit cell | space select row | a select page\n\
browse: x expand sub-rows | s sort | S add sort | / search | f filter column | F clear filters\n\
browse: </> move column | c columns | D delete selected | A add item | r reload | q quit\n\
pages: [/] prev/next | {/} first/last | p page size\n\
edit: type to change | ctrl+u clear | enter save | tab/up/down save and move | esc cancel\n\
edit select/status: left/right cycle | status 0-5 level, backspace clears level\n\
confirm: y or enter accept | n or esc decline"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let scale = |length: u16, percent: u16| -> u16 {
        let scaled = u32::from(length) * u32::from(percent.min(100)) / 100;
        u16::try_from(scaled).unwrap_or(length)
    };
    let width = scale(area.width, percent_x);
    let height = scale(area.height, percent_y);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
