//! Collaborative text editor facade
//!
//! [`CollabEditor`] is what a UI and a transport talk to. It turns caret
//! intents into changesets, keeps the undo history in step with the view,
//! and sequences server messages through an ordered buffer before applying
//! them.
//!
//! # Example
//!
//! ```rust
//! use synckit_collab::changeset::{Changeset, RevisionChangeset};
//! use synckit_collab::client::CollabEditor;
//! use synckit_collab::config::EngineConfig;
//! use synckit_collab::server::DocumentServer;
//!
//! let mut server = DocumentServer::new(Changeset::from_text("draft"));
//! let head = RevisionChangeset::new(server.head_revision(), server.head_text().clone());
//! let mut editor = CollabEditor::new(head, &EngineConfig::default()).unwrap().with_user("alice");
//!
//! editor.set_selection_range(5, 5);
//! editor.insert_text(" one").unwrap();
//! assert_eq!(editor.view_text(), "draft one");
//!
//! let submission = editor.submit_attributed_changes().unwrap();
//! let record = server.add_change(submission).unwrap();
//! editor.submitted_changes_acknowledged(record).unwrap();
//!
//! assert_eq!(editor.revision(), 1);
//! assert!(!editor.have_submitted_changes());
//! ```

use super::state::{ChangeSource, DocumentState, ViewChanged};
use crate::changeset::{
    deletion_count_operation, insertion_operation, ChangeSubmission, Changeset, EditOperation,
    Record, Revision, RevisionChangeset, SelectionRange,
};
use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::history::{EditorHistory, EditorRecordsHistoryRestore, HistoryEdit, RevisionRecordSource};
use crate::sync::OrderedMessageBuffer;
use crate::ClientID;
use std::ops::Range;

/// A server message, keyed in the buffer by the revision it creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Our submitted changes were committed as this record
    Acknowledged(Record),

    /// Someone else's change
    External(Record),
}

impl ServerMessage {
    pub fn record(&self) -> &Record {
        match self {
            ServerMessage::Acknowledged(record) | ServerMessage::External(record) => record,
        }
    }
}

/// One open collaborative text.
///
/// Single-writer: feed it intents and server messages from one task.
#[derive(Debug, Clone)]
pub struct CollabEditor {
    state: DocumentState,
    buffer: OrderedMessageBuffer<ServerMessage>,
    history: EditorHistory,
    selection: SelectionRange,
    user_id: Option<ClientID>,
    config: EngineConfig,

    /// Selection before the first unsubmitted local edit
    local_before: Option<SelectionRange>,
}

impl CollabEditor {
    /// Open an editor on a head text fetched from the server.
    ///
    /// # Errors
    ///
    /// `SyncError::Config` if `config` does not validate,
    /// `SyncError::InvalidChangeset` if `head` is not plain text.
    pub fn new(head: RevisionChangeset, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        if !head.changeset.is_text() {
            return Err(SyncError::InvalidChangeset(
                "editor head must be plain text".to_string(),
            ));
        }
        Ok(Self {
            state: DocumentState::new(head.changeset.clone()),
            buffer: OrderedMessageBuffer::new(head.revision)
                .with_stash_warn_threshold(config.buffer.stash_warn_threshold),
            history: EditorHistory::new(head.changeset, head.revision, config.history.max_entries),
            selection: SelectionRange::default(),
            user_id: None,
            config: config.clone(),
            local_before: None,
        })
    }

    /// Attribute submitted changes to `user_id`
    pub fn with_user(mut self, user_id: impl Into<ClientID>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn history(&self) -> &EditorHistory {
        &self.history
    }

    pub fn view_text(&self) -> String {
        self.state.view().to_text().unwrap_or_default()
    }

    /// Last server revision applied
    pub fn revision(&self) -> Revision {
        self.buffer.current_version()
    }

    pub fn selection(&self) -> SelectionRange {
        self.selection
    }

    pub fn have_local_changes(&self) -> bool {
        self.state.have_local_changes()
    }

    pub fn have_submitted_changes(&self) -> bool {
        self.state.have_submitted_changes()
    }

    pub fn can_submit_changes(&self) -> bool {
        self.state.can_submit_changes()
    }

    /// Revisions to request from the server to unblock stashed messages
    pub fn missing_revisions(&self) -> Range<Revision> {
        self.buffer.missing_versions()
    }

    /// Set the caret range, clamped to the view
    pub fn set_selection_range(&mut self, start: usize, end: usize) {
        self.selection = SelectionRange::new(start, end).clamp(self.state.view().len());
    }

    /// Replace the selection with `text`
    pub fn insert_text(&mut self, text: &str) -> Result<Option<ViewChanged>> {
        let op = insertion_operation(text, self.selection, self.state.view())?;
        self.apply_edit(op)
    }

    /// Delete the selection, or `count` characters before (positive) or
    /// after (negative) the caret.
    pub fn delete_text_count(&mut self, count: isize) -> Result<Option<ViewChanged>> {
        match deletion_count_operation(count, self.selection, self.state.view())? {
            Some(op) => self.apply_edit(op),
            None => Ok(None),
        }
    }

    fn apply_edit(&mut self, op: EditOperation) -> Result<Option<ViewChanged>> {
        let before = self.selection;
        let Some(changed) = self.state.compose_local_change(&op.changeset)? else {
            self.selection = op.selection;
            return Ok(None);
        };
        self.history.push(
            HistoryEdit::new(op.changeset, before, op.selection).with_undo(op.inverse),
        )?;
        self.selection = op.selection;
        self.local_before.get_or_insert(before);
        Ok(Some(changed))
    }

    /// Move local changes to submitted; the payload for the transport.
    pub fn submit_changes(&mut self) -> Option<RevisionChangeset> {
        self.submit_attributed_changes()
            .map(|submission| submission.change)
    }

    /// Like [`submit_changes`](Self::submit_changes), with the user id and
    /// selections the server stores for undo restoration.
    pub fn submit_attributed_changes(&mut self) -> Option<ChangeSubmission> {
        if !self.state.submit_changes() {
            return None;
        }
        let change = RevisionChangeset::new(self.revision(), self.state.submitted().clone());
        let before = self.local_before.take().unwrap_or(self.selection);
        tracing::debug!(revision = change.revision, changeset = %change.changeset, "submitting changes");

        Some(match &self.user_id {
            Some(user) => ChangeSubmission::authored(change, user.clone(), before, self.selection),
            None => change.into(),
        })
    }

    /// Feed the server's acknowledgement of our submitted changes.
    ///
    /// Returns the view changes caused by every message this released.
    ///
    /// # Errors
    ///
    /// `SyncError::Protocol` if the record does not match what was
    /// submitted. Messages released in the same batch after a failing one
    /// are dropped; the caller must [`reset`](Self::reset).
    pub fn submitted_changes_acknowledged(&mut self, record: Record) -> Result<Vec<ViewChanged>> {
        self.receive(ServerMessage::Acknowledged(record))
    }

    /// Feed a change made by another client.
    pub fn handle_external_change(&mut self, record: Record) -> Result<Vec<ViewChanged>> {
        self.receive(ServerMessage::External(record))
    }

    /// Feed any server message
    pub fn receive(&mut self, message: ServerMessage) -> Result<Vec<ViewChanged>> {
        let revision = message.record().revision;
        let outcome = self.buffer.add(revision, message);
        let mut changes = Vec::with_capacity(outcome.processed_count());
        for (_, message) in outcome.into_messages() {
            if let Some(changed) = self.process(message)? {
                changes.push(changed);
            }
        }
        Ok(changes)
    }

    fn process(&mut self, message: ServerMessage) -> Result<Option<ViewChanged>> {
        match message {
            ServerMessage::Acknowledged(record) if !self.state.have_submitted_changes() => {
                tracing::warn!(
                    revision = record.revision,
                    "acknowledgement without submitted changes, applying as external change"
                );
                self.apply_external(&record).map(Some)
            }
            ServerMessage::Acknowledged(record)
                if self.state.submitted().is_identity_for(self.state.server().len()) =>
            {
                tracing::debug!(
                    revision = record.revision,
                    "submission cancelled by external changes acknowledged"
                );
                self.state.submitted_changes_acknowledged()?;
                Ok(None)
            }
            ServerMessage::Acknowledged(record) => {
                let expected = self.state.server().compose(self.state.submitted())?;
                let committed = self
                    .state
                    .server()
                    .compose(&record.changeset)
                    .map_err(|err| record_mismatch(&record, err))?;
                if committed != expected {
                    return Err(SyncError::Protocol(format!(
                        "revision {} does not match the submitted changes",
                        record.revision
                    )));
                }
                self.state.submitted_changes_acknowledged()?;
                Ok(None)
            }
            ServerMessage::External(record) => self.apply_external(&record).map(Some),
        }
    }

    fn apply_external(&mut self, record: &Record) -> Result<ViewChanged> {
        let changed = self
            .state
            .handle_external_change(&record.changeset)
            .map_err(|err| record_mismatch(record, err))?;
        self.history
            .compose_on_all_entries(&changed.change, self.history.index())?;
        self.selection = self.selection.follow(&changed.change);
        self.local_before = self
            .local_before
            .map(|selection| selection.follow(&changed.change));
        Ok(changed)
    }

    /// Undo the latest applied history entry; `None` at the start of history
    pub fn undo(&mut self) -> Result<Option<ViewChanged>> {
        match self.history.undo()? {
            Some(operation) => self
                .apply_history_operation(operation.changeset, operation.selection)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Redo the next entry; `None` at the end of history
    pub fn redo(&mut self) -> Result<Option<ViewChanged>> {
        match self.history.redo()? {
            Some(operation) => self
                .apply_history_operation(operation.changeset, operation.selection)
                .map(Some),
            None => Ok(None),
        }
    }

    fn apply_history_operation(
        &mut self,
        changeset: Changeset,
        selection: SelectionRange,
    ) -> Result<ViewChanged> {
        let before = self.selection;
        let changed = match self.state.compose_local_change(&changeset)? {
            Some(changed) => changed,
            None => ViewChanged {
                view: self.state.view().clone(),
                change: self.state.view().to_identity(),
                source: ChangeSource::Local,
            },
        };
        self.selection = selection.clamp(self.state.view().len());
        self.local_before.get_or_insert(before);
        Ok(changed)
    }

    /// Restore up to `desired_count` of this user's edits from `source`.
    ///
    /// Returns the number of undo frames added; always 0 without a user id.
    pub fn history_restore<S: RevisionRecordSource + ?Sized>(
        &mut self,
        source: &S,
        desired_count: usize,
    ) -> Result<usize> {
        let Some(user) = self.user_id.as_deref() else {
            tracing::debug!("no user id, nothing to restore");
            return Ok(0);
        };
        EditorRecordsHistoryRestore::new(source, self.config.history.restore_batch_size)
            .restore(&mut self.history, desired_count, user)
    }

    /// Start over from a freshly fetched head, dropping all pending state
    pub fn reset(&mut self, head: RevisionChangeset) -> Result<()> {
        if !head.changeset.is_text() {
            return Err(SyncError::InvalidChangeset(
                "editor head must be plain text".to_string(),
            ));
        }
        tracing::debug!(revision = head.revision, "resetting editor");
        self.selection = self.selection.clamp(head.changeset.len());
        self.state = DocumentState::new(head.changeset.clone());
        self.buffer.reset(head.revision);
        self.history = EditorHistory::new(
            head.changeset,
            head.revision,
            self.config.history.max_entries,
        );
        self.local_before = None;
        Ok(())
    }
}

fn record_mismatch(record: &Record, err: SyncError) -> SyncError {
    SyncError::Protocol(format!(
        "revision {} does not fit the server text: {err}",
        record.revision
    ))
}
