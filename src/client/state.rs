//! Client document state: the four lenses of one editable text
//!
//! ```text
//! server ─▶ submitted ─▶ local        view = server ∘ submitted ∘ local
//! (acked)   (in flight)  (unsent)
//! ```
//!
//! The state changes only through four transitions: a local edit, a
//! submit, an acknowledgement and an external change. Each returns its
//! outcome directly instead of publishing an event.

use crate::changeset::Changeset;
use crate::error::Result;

/// Who caused a view change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    Local,
    External,
}

/// Result of a transition that changed the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChanged {
    /// New view text
    pub view: Changeset,

    /// Change composable on the previous view
    pub change: Changeset,

    pub source: ChangeSource,
}

/// Server, submitted, local and view changesets for one text.
///
/// `server` and `view` are plain texts. `submitted` is composable on
/// `server`, `local` on `server ∘ submitted`. An identity `local` means
/// nothing is pending locally. A submission stays in flight until it is
/// acknowledged, even if external changes rebase `submitted` to identity.
///
/// # Example
///
/// ```rust
/// use synckit_collab::client::DocumentState;
/// use synckit_collab::changeset::{Changeset, Strip};
///
/// let mut state = DocumentState::new(Changeset::from_text("server"));
/// let change = Changeset::from_strips(vec![Strip::retain(0, 5), Strip::insert("!")]).unwrap();
///
/// state.compose_local_change(&change).unwrap();
/// assert!(state.submit_changes());
/// assert!(state.submitted_changes_acknowledged().unwrap());
/// assert_eq!(state.server().to_text().unwrap(), "server!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    server: Changeset,
    submitted: Changeset,
    local: Changeset,
    view: Changeset,
    awaiting_ack: bool,
}

impl DocumentState {
    /// Fresh state on an acknowledged server text
    pub fn new(server: Changeset) -> Self {
        let identity = server.to_identity();
        Self {
            view: server.clone(),
            submitted: identity.clone(),
            local: identity,
            server,
            awaiting_ack: false,
        }
    }

    pub fn server(&self) -> &Changeset {
        &self.server
    }

    pub fn submitted(&self) -> &Changeset {
        &self.submitted
    }

    pub fn local(&self) -> &Changeset {
        &self.local
    }

    pub fn view(&self) -> &Changeset {
        &self.view
    }

    /// Whether a submission is waiting for its acknowledgement
    pub fn have_submitted_changes(&self) -> bool {
        self.awaiting_ack
    }

    pub fn have_local_changes(&self) -> bool {
        !self.local.is_identity_for(self.submitted.len())
    }

    /// Submit is allowed only with nothing in flight and something local
    pub fn can_submit_changes(&self) -> bool {
        !self.have_submitted_changes() && self.have_local_changes()
    }

    /// Compose a local edit (composable on the view).
    ///
    /// Returns `None` if the pending local change ends up identical, e.g.
    /// when retyping the text that was just deleted.
    pub fn compose_local_change(&mut self, change: &Changeset) -> Result<Option<ViewChanged>> {
        let base = self.server.compose(&self.submitted)?;
        let local = base.insertions_to_retained(&self.local.compose(change)?);
        if local == self.local {
            tracing::trace!(%change, "local change is a no-op");
            return Ok(None);
        }

        self.local = local;
        self.view = self.view.compose(change)?;
        tracing::debug!(%change, local = %self.local, "composed local change");

        Ok(Some(ViewChanged {
            view: self.view.clone(),
            change: change.clone(),
            source: ChangeSource::Local,
        }))
    }

    /// Move local changes into `submitted`; `false` if not allowed.
    pub fn submit_changes(&mut self) -> bool {
        if !self.can_submit_changes() {
            return false;
        }
        let identity = self.local.to_identity();
        self.submitted = std::mem::replace(&mut self.local, identity);
        self.awaiting_ack = true;
        tracing::debug!(submitted = %self.submitted, "submitted local changes");
        true
    }

    /// Fold `submitted` into `server`; `false` if nothing is in flight.
    pub fn submitted_changes_acknowledged(&mut self) -> Result<bool> {
        if !self.have_submitted_changes() {
            return Ok(false);
        }
        self.server = self.server.compose(&self.submitted)?;
        self.submitted = self.server.to_identity();
        self.awaiting_ack = false;
        tracing::debug!(server_len = self.server.len(), "submitted changes acknowledged");
        Ok(true)
    }

    /// Apply a change made by someone else (composable on `server`).
    pub fn handle_external_change(&mut self, change: &Changeset) -> Result<ViewChanged> {
        let server = self.server.compose(change)?;
        let submitted = change.follow(&self.submitted);
        let external_after_submitted = self.submitted.follow(change);
        let local = external_after_submitted.follow(&self.local);
        let view_change = self.local.follow(&external_after_submitted);
        let view = self.view.compose(&view_change)?;

        self.server = server;
        self.submitted = submitted;
        self.local = local;
        self.view = view;
        tracing::debug!(%change, view_change = %view_change, "applied external change");

        Ok(ViewChanged {
            view: self.view.clone(),
            change: view_change,
            source: ChangeSource::External,
        })
    }
}

impl Default for DocumentState {
    fn default() -> Self {
        Self::new(Changeset::empty())
    }
}
