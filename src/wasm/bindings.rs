//! JavaScript bindings for the collaborative editor

use super::utils::to_js_error;
use crate::changeset::{Changeset, Record, RevisionChangeset};
use crate::client::{ChangeSource, CollabEditor, ViewChanged};
use crate::config::EngineConfig;
use crate::protocol::{from_json, to_json};
use crate::server::DocumentServer;
use wasm_bindgen::prelude::*;

/// JavaScript-friendly wrapper for CollabEditor
#[wasm_bindgen]
pub struct WasmCollabEditor {
    inner: CollabEditor,
}

#[wasm_bindgen]
impl WasmCollabEditor {
    /// Open an editor on `text` at `revision`.
    ///
    /// `config_json` may be empty for the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(
        text: &str,
        revision: u64,
        user_id: Option<String>,
        config_json: Option<String>,
    ) -> Result<WasmCollabEditor, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => {
                EngineConfig::from_json_str(json).map_err(to_js_error)?
            }
            _ => EngineConfig::default(),
        };
        let head = RevisionChangeset::new(revision, Changeset::from_text(text));
        let mut inner = CollabEditor::new(head, &config).map_err(to_js_error)?;
        if let Some(user_id) = user_id {
            inner = inner.with_user(user_id);
        }
        Ok(Self { inner })
    }

    /// Current view text
    #[wasm_bindgen(js_name = viewText)]
    pub fn view_text(&self) -> String {
        self.inner.view_text()
    }

    /// Last applied server revision
    #[wasm_bindgen(getter)]
    pub fn revision(&self) -> u64 {
        self.inner.revision()
    }

    #[wasm_bindgen(js_name = selectionStart)]
    pub fn selection_start(&self) -> usize {
        self.inner.selection().start
    }

    #[wasm_bindgen(js_name = selectionEnd)]
    pub fn selection_end(&self) -> usize {
        self.inner.selection().end
    }

    #[wasm_bindgen(js_name = setSelectionRange)]
    pub fn set_selection_range(&mut self, start: usize, end: usize) {
        self.inner.set_selection_range(start, end);
    }

    /// Insert at the selection; returns the view change as JSON, if any
    #[wasm_bindgen(js_name = insertText)]
    pub fn insert_text(&mut self, text: &str) -> Result<Option<String>, JsValue> {
        let changed = self.inner.insert_text(text).map_err(to_js_error)?;
        changed.map(|change| change_json(&change)).transpose()
    }

    #[wasm_bindgen(js_name = deleteTextCount)]
    pub fn delete_text_count(&mut self, count: isize) -> Result<Option<String>, JsValue> {
        let changed = self.inner.delete_text_count(count).map_err(to_js_error)?;
        changed.map(|change| change_json(&change)).transpose()
    }

    #[wasm_bindgen(js_name = haveLocalChanges)]
    pub fn have_local_changes(&self) -> bool {
        self.inner.have_local_changes()
    }

    #[wasm_bindgen(js_name = haveSubmittedChanges)]
    pub fn have_submitted_changes(&self) -> bool {
        self.inner.have_submitted_changes()
    }

    #[wasm_bindgen(js_name = canSubmitChanges)]
    pub fn can_submit_changes(&self) -> bool {
        self.inner.can_submit_changes()
    }

    /// Submission payload as JSON, or `undefined` if nothing to submit
    #[wasm_bindgen(js_name = submitChanges)]
    pub fn submit_changes(&mut self) -> Result<Option<String>, JsValue> {
        self.inner
            .submit_attributed_changes()
            .map(|submission| to_json(&submission).map_err(to_js_error))
            .transpose()
    }

    /// Feed an acknowledgement record (JSON); returns view changes as JSON
    #[wasm_bindgen(js_name = submittedChangesAcknowledged)]
    pub fn submitted_changes_acknowledged(&mut self, record_json: &str) -> Result<String, JsValue> {
        let record: Record = from_json(record_json).map_err(to_js_error)?;
        let changes = self
            .inner
            .submitted_changes_acknowledged(record)
            .map_err(to_js_error)?;
        changes_json(&changes)
    }

    /// Feed another client's record (JSON); returns view changes as JSON
    #[wasm_bindgen(js_name = handleExternalChange)]
    pub fn handle_external_change(&mut self, record_json: &str) -> Result<String, JsValue> {
        let record: Record = from_json(record_json).map_err(to_js_error)?;
        let changes = self.inner.handle_external_change(record).map_err(to_js_error)?;
        changes_json(&changes)
    }

    #[wasm_bindgen(js_name = undo)]
    pub fn undo(&mut self) -> Result<Option<String>, JsValue> {
        let changed = self.inner.undo().map_err(to_js_error)?;
        changed.map(|change| change_json(&change)).transpose()
    }

    #[wasm_bindgen(js_name = redo)]
    pub fn redo(&mut self) -> Result<Option<String>, JsValue> {
        let changed = self.inner.redo().map_err(to_js_error)?;
        changed.map(|change| change_json(&change)).transpose()
    }

    /// First and one-past-last missing revision, as `[from, to]`
    #[wasm_bindgen(js_name = missingRevisions)]
    pub fn missing_revisions(&self) -> Vec<u64> {
        let missing = self.inner.missing_revisions();
        vec![missing.start, missing.end]
    }

    /// Restore up to `desired_count` of this user's undo frames.
    ///
    /// `records_json` holds the records committed after `tail_revision`, in
    /// order, where `tail_text` is the text at `tail_revision`. Returns the
    /// number of frames added.
    #[wasm_bindgen(js_name = historyRestore)]
    pub fn history_restore(
        &mut self,
        tail_text: &str,
        tail_revision: u64,
        records_json: &str,
        desired_count: usize,
    ) -> Result<usize, JsValue> {
        let records: Vec<Record> = from_json(records_json).map_err(to_js_error)?;
        let source = DocumentServer::from_records(Changeset::from_text(tail_text), tail_revision, records)
            .map_err(to_js_error)?;
        self.inner
            .history_restore(&source, desired_count)
            .map_err(to_js_error)
    }

    /// Hard resync from a freshly fetched head
    #[wasm_bindgen(js_name = reset)]
    pub fn reset(&mut self, text: &str, revision: u64) -> Result<(), JsValue> {
        self.inner
            .reset(RevisionChangeset::new(revision, Changeset::from_text(text)))
            .map_err(to_js_error)
    }
}

fn change_value(change: &ViewChanged) -> serde_json::Value {
    serde_json::json!({
        "change": change.change,
        "external": change.source == ChangeSource::External,
    })
}

fn change_json(change: &ViewChanged) -> Result<String, JsValue> {
    serde_json::to_string(&change_value(change)).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn changes_json(changes: &[ViewChanged]) -> Result<String, JsValue> {
    let values: Vec<serde_json::Value> = changes.iter().map(change_value).collect();
    serde_json::to_string(&values).map_err(|e| JsValue::from_str(&e.to_string()))
}
