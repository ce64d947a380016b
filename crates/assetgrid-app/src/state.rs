// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Browse,
    EditCell,
    Confirm,
    Filter,
    ColumnsMenu,
    AddForm,
    Help,
}

impl AppMode {
    pub const fn badge(self) -> &'static str {
        match self {
            Self::Browse => "BROWSE",
            Self::EditCell => "EDIT",
            Self::Confirm => "CONFIRM",
            Self::Filter => "FILTER",
            Self::ColumnsMenu => "COLUMNS",
            Self::AddForm => "ADD",
            Self::Help => "HELP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub status_line: Option<StatusMessage>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Browse,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Enter(AppMode),
    ExitToBrowse,
    Notify(StatusKind, String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    StatusUpdated(StatusMessage),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::Enter(mode) => {
                if self.mode == mode {
                    return Vec::new();
                }
                self.mode = mode;
                vec![AppEvent::ModeChanged(mode)]
            }
            AppCommand::ExitToBrowse => {
                if self.mode == AppMode::Browse {
                    return Vec::new();
                }
                self.mode = AppMode::Browse;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::Notify(kind, text) => vec![self.set_status(kind, text)],
            AppCommand::ClearStatus => {
                if self.status_line.take().is_none() {
                    return Vec::new();
                }
                vec![AppEvent::StatusCleared]
            }
        }
    }

    pub fn info(&mut self, text: impl Into<String>) -> AppEvent {
        self.set_status(StatusKind::Info, text.into())
    }

    pub fn error(&mut self, text: impl Into<String>) -> AppEvent {
        self.set_status(StatusKind::Error, text.into())
    }

    fn set_status(&mut self, kind: StatusKind, text: String) -> AppEvent {
        let message = StatusMessage { kind, text };
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppMode, AppState, StatusKind, StatusMessage};

    #[test]
    fn entering_same_mode_emits_nothing() {
        let mut state = AppState::default();
        assert!(state.dispatch(AppCommand::Enter(AppMode::Browse)).is_empty());
        assert_eq!(
            state.dispatch(AppCommand::Enter(AppMode::EditCell)),
            vec![AppEvent::ModeChanged(AppMode::EditCell)]
        );
    }

    #[test]
    fn exit_returns_to_browse() {
        let mut state = AppState {
            mode: AppMode::Confirm,
            ..AppState::default()
        };
        let events = state.dispatch(AppCommand::ExitToBrowse);
        assert_eq!(state.mode, AppMode::Browse);
        assert_eq!(events, vec![AppEvent::ModeChanged(AppMode::Browse)]);
    }

    #[test]
    fn notify_then_clear() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::Notify(
            StatusKind::Error,
            "No items selected!".to_owned(),
        ));
        assert_eq!(
            events,
            vec![AppEvent::StatusUpdated(StatusMessage {
                kind: StatusKind::Error,
                text: "No items selected!".to_owned(),
            })]
        );
        assert_eq!(
            state.dispatch(AppCommand::ClearStatus),
            vec![AppEvent::StatusCleared]
        );
        assert!(state.dispatch(AppCommand::ClearStatus).is_empty());
    }

    #[test]
    fn helpers_set_status_kind() {
        let mut state = AppState::default();
        state.info("saved");
        assert_eq!(
            state.status_line.as_ref().map(|status| status.kind),
            Some(StatusKind::Info)
        );
        state.error("failed");
        assert_eq!(
            state.status_line.as_ref().map(|status| status.text.as_str()),
            Some("failed")
        );
    }
}
