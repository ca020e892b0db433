//! End-to-end collaboration: editors, server and transport in one process.

use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;

use synckit_collab::changeset::{ChangeSubmission, Changeset, Record, RevisionChangeset, SelectionRange, Strip};
use synckit_collab::client::{CollabEditor, ServerMessage};
use synckit_collab::config::{EngineConfig, ServerConfig};
use synckit_collab::server::{DocumentServer, DocumentStore, MemoryDocumentStore, MultiFieldDocumentServer};
use synckit_collab::sync::{BufferAdd, OrderedMessageBuffer};
use synckit_collab::SyncError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One server and a few editors joined by per-editor inboxes
struct Session {
    server: DocumentServer,
    editors: Vec<CollabEditor>,
    inboxes: Vec<Vec<ServerMessage>>,
}

impl Session {
    fn new(text: &str, users: &[&str]) -> Self {
        let server = DocumentServer::new(Changeset::from_text(text));
        let editors = users.iter().map(|user| Self::open(&server, user)).collect();
        Self {
            server,
            editors,
            inboxes: vec![Vec::new(); users.len()],
        }
    }

    fn open(server: &DocumentServer, user: &str) -> CollabEditor {
        let head = RevisionChangeset::new(server.head_revision(), server.head_text().clone());
        CollabEditor::new(head, &EngineConfig::default())
            .unwrap()
            .with_user(user)
    }

    fn type_at(&mut self, who: usize, start: usize, end: usize, text: &str) {
        let editor = &mut self.editors[who];
        editor.set_selection_range(start, end);
        editor.insert_text(text).unwrap();
    }

    /// Submit, commit and broadcast; acknowledgement goes to the author
    fn submit(&mut self, who: usize) -> Record {
        let submission = self.editors[who].submit_attributed_changes().unwrap();
        let record = self.server.add_change(submission).unwrap();
        for (i, inbox) in self.inboxes.iter_mut().enumerate() {
            inbox.push(if i == who {
                ServerMessage::Acknowledged(record.clone())
            } else {
                ServerMessage::External(record.clone())
            });
        }
        record
    }

    /// Deliver everything in `who`'s inbox, newest first
    fn deliver_reversed(&mut self, who: usize) {
        let mut messages = std::mem::take(&mut self.inboxes[who]);
        messages.reverse();
        for message in messages {
            self.editors[who].receive(message).unwrap();
        }
    }

    /// Deliver only the message at `index` in `who`'s inbox
    fn deliver_one(&mut self, who: usize, index: usize) {
        let message = self.inboxes[who].remove(index);
        self.editors[who].receive(message).unwrap();
    }

    /// Submit whatever can be submitted
    fn submit_ready(&mut self) -> bool {
        let mut submitted = false;
        for who in 0..self.editors.len() {
            if self.editors[who].can_submit_changes() {
                self.submit(who);
                submitted = true;
            }
        }
        submitted
    }

    /// Deliver and submit until nothing is pending anywhere
    fn settle(&mut self) {
        loop {
            self.deliver_all_reversed();
            if !self.submit_ready() {
                break;
            }
        }
    }

    fn deliver_all_reversed(&mut self) {
        for who in 0..self.editors.len() {
            self.deliver_reversed(who);
        }
    }

    fn assert_converged(&self) {
        let head = self.server.head_text().to_text().unwrap();
        for editor in &self.editors {
            assert_eq!(editor.view_text(), head, "editor {:?}", editor.user_id());
            assert_eq!(editor.revision(), self.server.head_revision());
            assert!(!editor.have_submitted_changes());
            assert!(!editor.have_local_changes());
        }
    }
}

// =============================================================================
// Convergence
// =============================================================================

#[test]
fn test_concurrent_edits_converge_out_of_order() {
    init_tracing();
    let mut session = Session::new("hello world", &["alice", "bob", "carol"]);

    session.type_at(0, 5, 5, ",");
    session.type_at(1, 11, 11, "!");
    session.type_at(2, 0, 5, "goodbye");

    session.submit(0);
    session.submit(1);
    session.submit(2);
    assert_eq!(session.server.head_revision(), 3);

    session.deliver_all_reversed();

    assert_eq!(session.server.head_text().to_text().unwrap(), "goodbye, world!");
    session.assert_converged();
}

#[test]
fn test_typing_while_waiting_for_ack() {
    let mut session = Session::new("", &["alice", "bob"]);

    session.type_at(0, 0, 0, "abc");
    session.submit(0);
    session.editors[0].insert_text("d").unwrap();
    assert!(!session.editors[0].can_submit_changes());

    session.type_at(1, 0, 0, "X");
    session.submit(1);

    session.deliver_reversed(0);
    assert_eq!(session.editors[0].view_text(), "Xabcd");
    assert_eq!(session.editors[0].selection(), SelectionRange::caret(5));
    assert!(session.editors[0].can_submit_changes());

    session.submit(0);
    session.deliver_all_reversed();

    assert_eq!(session.server.head_text().to_text().unwrap(), "Xabcd");
    session.assert_converged();
}

#[test]
fn test_cancelled_submission_blocks_next_submit_until_ack() {
    let mut session = Session::new("ab", &["alice", "bob"]);
    session.editors[0].set_selection_range(2, 2);
    session.editors[0].delete_text_count(1).unwrap();
    session.editors[1].set_selection_range(2, 2);
    session.editors[1].delete_text_count(1).unwrap();

    session.submit(1);
    let folded = session.submit(0);
    assert!(folded.changeset.is_identity_for(1));

    // alice sees bob's delete, her own ack is still on the way
    session.deliver_one(0, 0);
    assert_eq!(session.editors[0].view_text(), "a");
    assert!(session.editors[0].have_submitted_changes());

    session.editors[0].insert_text("z").unwrap();
    assert!(!session.editors[0].can_submit_changes());
    assert_eq!(session.editors[0].submit_attributed_changes(), None);

    session.deliver_reversed(0);
    assert!(session.editors[0].can_submit_changes());

    session.settle();
    assert_eq!(session.server.head_text().to_text().unwrap(), "az");
    session.assert_converged();
}

#[test]
fn test_duplicate_delivery_is_ignored() {
    let mut session = Session::new("ab", &["alice", "bob"]);
    session.type_at(0, 2, 2, "c");
    let record = session.submit(0);
    session.deliver_all_reversed();

    let again = session.editors[1]
        .handle_external_change(record)
        .unwrap();
    assert!(again.is_empty());
    session.assert_converged();
}

#[test]
fn test_gap_is_reported_until_filled() {
    let mut session = Session::new("", &["alice", "bob"]);
    session.type_at(0, 0, 0, "one");
    let first = session.submit(0);
    session.deliver_reversed(0);
    session.type_at(0, 3, 3, " two");
    let second = session.submit(0);
    session.deliver_reversed(0);
    session.inboxes[1].clear();

    let bob = &mut session.editors[1];
    assert!(bob.handle_external_change(second).unwrap().is_empty());
    assert_eq!(bob.missing_revisions(), 1..2);
    assert_eq!(bob.view_text(), "");

    let changes = bob.handle_external_change(first).unwrap();
    assert_eq!(changes.len(), 2);
    session.assert_converged();
}

// =============================================================================
// Randomized sessions
// =============================================================================

#[derive(Debug, Clone)]
enum Action {
    Type { at: usize, text: String },
    Delete { at: usize, count: isize },
    Submit,
    Deliver { pick: usize },
    Undo,
    Redo,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (any::<usize>(), "[a-c]{1,2}").prop_map(|(at, text)| Action::Type { at, text }),
        2 => (any::<usize>(), -2isize..=2).prop_map(|(at, count)| Action::Delete { at, count }),
        2 => Just(Action::Submit),
        3 => any::<usize>().prop_map(|pick| Action::Deliver { pick }),
        1 => Just(Action::Undo),
        1 => Just(Action::Redo),
    ]
}

impl Session {
    fn perform(&mut self, who: usize, action: Action) {
        match action {
            Action::Type { at, text } => {
                let caret = at % (self.editors[who].state().view().len() + 1);
                self.type_at(who, caret, caret, &text);
            }
            Action::Delete { at, count } => {
                let editor = &mut self.editors[who];
                let caret = at % (editor.state().view().len() + 1);
                editor.set_selection_range(caret, caret);
                editor.delete_text_count(count).unwrap();
            }
            Action::Submit => {
                if self.editors[who].can_submit_changes() {
                    self.submit(who);
                }
            }
            Action::Deliver { pick } => {
                if !self.inboxes[who].is_empty() {
                    let index = pick % self.inboxes[who].len();
                    self.deliver_one(who, index);
                }
            }
            Action::Undo => {
                self.editors[who].undo().unwrap();
            }
            Action::Redo => {
                self.editors[who].redo().unwrap();
            }
        }
    }

    fn assert_history_tracks_view(&self) {
        for editor in &self.editors {
            assert_eq!(editor.history().head(), editor.state().view());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Any interleaving of edits, submits, undo and out-of-order delivery
    /// settles on one text
    #[test]
    fn random_sessions_converge(
        start in "[a-c]{0,4}",
        script in prop::collection::vec((0usize..3, action()), 0..60),
    ) {
        let mut session = Session::new(&start, &["alice", "bob", "carol"]);
        for (who, action) in script {
            session.perform(who, action);
            session.assert_history_tracks_view();
        }

        session.settle();
        session.assert_history_tracks_view();
        session.assert_converged();
    }
}

// =============================================================================
// Undo across collaborators
// =============================================================================

#[test]
fn test_undo_survives_remote_edit() {
    let mut session = Session::new("", &["alice", "bob"]);

    session.type_at(0, 0, 0, "abc");
    session.submit(0);
    session.deliver_all_reversed();

    session.type_at(1, 0, 0, "X");
    session.submit(1);
    session.deliver_all_reversed();
    assert_eq!(session.editors[0].view_text(), "Xabc");

    session.editors[0].undo().unwrap().unwrap();
    assert_eq!(session.editors[0].view_text(), "X");

    session.submit(0);
    session.deliver_all_reversed();
    session.assert_converged();
    assert_eq!(session.server.head_text().to_text().unwrap(), "X");

    session.editors[0].redo().unwrap().unwrap();
    assert_eq!(session.editors[0].view_text(), "Xabc");
}

#[test]
fn test_restored_history_skips_other_users() {
    let mut session = Session::new("", &["alice", "bob"]);
    session.type_at(0, 0, 0, "hello");
    session.submit(0);
    session.deliver_all_reversed();
    session.type_at(1, 5, 5, " world");
    session.submit(1);
    session.deliver_all_reversed();

    // alice reopens the document with an empty history
    let mut alice = Session::open(&session.server, "alice");
    assert!(!alice.history().can_undo());
    assert_eq!(alice.history_restore(&session.server, 10).unwrap(), 1);

    alice.undo().unwrap().unwrap();
    assert_eq!(alice.view_text(), " world");
    assert!(!alice.history().can_undo());

    alice.redo().unwrap().unwrap();
    assert_eq!(alice.view_text(), "hello world");
}

#[test]
fn test_restore_from_fetched_records() {
    let mut session = Session::new("", &["alice", "bob"]);
    session.type_at(0, 0, 0, "hello");
    session.submit(0);
    session.deliver_all_reversed();
    session.type_at(1, 5, 5, " world");
    session.submit(1);
    session.deliver_all_reversed();

    // records travel as JSON, the way a browser client fetches them
    let json = serde_json::to_string(session.server.records()).unwrap();
    let records: Vec<Record> = serde_json::from_str(&json).unwrap();
    let log = DocumentServer::from_records(Changeset::empty(), 0, records).unwrap();
    assert_eq!(log.head_text(), session.server.head_text());

    let mut alice = Session::open(&session.server, "alice");
    assert_eq!(alice.history_restore(&log, 10).unwrap(), 1);
    alice.undo().unwrap().unwrap();
    assert_eq!(alice.view_text(), " world");
}

// =============================================================================
// Resync
// =============================================================================

#[test]
fn test_mismatched_ack_requires_resync() {
    let mut session = Session::new("", &["alice"]);
    session.type_at(0, 0, 0, "abc");
    session.editors[0].submit_changes().unwrap();

    let bogus = Record::new(1, Changeset::from_text("zzz"));
    let err = session.editors[0]
        .submitted_changes_acknowledged(bogus)
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
    assert!(err.requires_resync());

    let head = RevisionChangeset::new(1, Changeset::from_text("zzz"));
    session.editors[0].reset(head).unwrap();
    assert_eq!(session.editors[0].view_text(), "zzz");
    assert_eq!(session.editors[0].revision(), 1);
    assert!(!session.editors[0].have_submitted_changes());
}

// =============================================================================
// Message ordering
// =============================================================================

#[test]
fn test_buffer_releases_in_order_once() {
    let mut buffer = OrderedMessageBuffer::new(0);

    assert_eq!(buffer.add(2, "m2"), BufferAdd::Stashed);
    let delivered = buffer.add(1, "m1");
    assert_eq!(delivered.processed_count(), 2);
    assert_eq!(delivered.into_messages(), vec![(1, "m1"), (2, "m2")]);

    assert_eq!(buffer.add(1, "m1 again"), BufferAdd::Ignored);
    assert_eq!(buffer.current_version(), 2);
}

// =============================================================================
// Transactional server
// =============================================================================

#[test]
fn test_racing_transactions_both_commit() {
    init_tracing();
    let base = Changeset::from_text("the fox");
    let quick = Changeset::from_strips(vec![
        Strip::retain(0, 3),
        Strip::insert("quick "),
        Strip::retain(4, 6),
    ])
    .unwrap();
    let plural = Changeset::from_strips(vec![Strip::retain(0, 6), Strip::insert("es")]).unwrap();

    let store = Arc::new(MemoryDocumentStore::new());
    let id = store
        .create_document(vec![("body".to_string(), base.clone())])
        .unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [("alice", quick.clone()), ("bob", plural.clone())]
        .into_iter()
        .map(|(user, changeset)| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut server = MultiFieldDocumentServer::new(store, id, &ServerConfig::default());
                server.queue_change(
                    "body",
                    ChangeSubmission::authored(
                        RevisionChangeset::new(0, changeset),
                        user,
                        SelectionRange::caret(0),
                        SelectionRange::caret(0),
                    ),
                );
                barrier.wait();
                server.apply()
            })
        })
        .collect();

    let mut revisions: Vec<u64> = handles
        .into_iter()
        .map(|handle| {
            let applied = handle.join().unwrap().unwrap();
            assert_eq!(applied["body"].len(), 1);
            applied["body"][0].revision
        })
        .collect();
    revisions.sort_unstable();
    assert_eq!(revisions, vec![1, 2]);

    let field = store.field(&id, "body").unwrap();
    assert_eq!(field.latest_revision, 2);

    // the log replays to the stored text
    let mut replay = field.initial_text.clone();
    for record in &field.records {
        replay = replay.compose(&record.changeset).unwrap();
    }
    assert_eq!(replay, field.latest_text);

    let quick_first = base.compose(&quick).unwrap().compose(&quick.follow(&plural)).unwrap();
    let plural_first = base.compose(&plural).unwrap().compose(&plural.follow(&quick)).unwrap();
    assert!(field.latest_text == quick_first || field.latest_text == plural_first);
    assert_eq!(field.latest_text.to_text().unwrap(), "the quick foxes");
    assert_eq!(store.version(&id).unwrap(), 2);
}
