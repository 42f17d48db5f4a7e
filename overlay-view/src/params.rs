//! Parameter editing for overlays.
//!
//! The editor keeps a local draft of key/value rows. Each edit restarts a
//! quiet-period timer; when it expires the draft is turned into a typed JSON
//! object and persisted with one update, unless it serializes to the same
//! text as the last persisted snapshot.

use overlay_error::storage::StorageError;
use overlay_models::{
    domain::prelude::{OverlayPatch, OverlayRecord},
    OverlayStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// One editable row. `value` is the raw text typed by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub key: String,
    pub value: String,
}

impl ParamEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Decode raw text with JSON rules, falling back to a plain string.
///
/// `3` is a number, `true` a bool, `{"a":1}` an object; `red` stays `"red"`.
pub fn decode_value(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

/// Inverse of [`decode_value`] for display: strings are shown without quotes.
pub fn encode_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Canonical text of a parameter object, used to detect no-op edits.
pub fn snapshot_of(parameters: &Map<String, Json>) -> String {
    // serde_json's Map is ordered by key, so equal maps serialize identically.
    Json::Object(parameters.clone()).to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterDraft {
    rows: Vec<ParamEntry>,
}

impl ParameterDraft {
    pub fn new(rows: Vec<ParamEntry>) -> Self {
        Self { rows }
    }

    pub fn from_parameters(parameters: &Map<String, Json>) -> Self {
        Self {
            rows: parameters
                .iter()
                .map(|(key, value)| ParamEntry::new(key.clone(), encode_value(value)))
                .collect(),
        }
    }

    #[inline]
    pub fn rows(&self) -> &[ParamEntry] {
        &self.rows
    }

    /// Typed parameter object. Rows with a blank key are skipped; the last duplicate wins.
    pub fn to_parameters(&self) -> Map<String, Json> {
        let mut map = Map::new();
        for row in &self.rows {
            let key = row.key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), decode_value(&row.value));
        }
        map
    }
}

/// Result of one debounced flush.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    Persisted(OverlayRecord),
    /// The draft matched the last persisted snapshot; nothing was written.
    Unchanged,
    Failed(String),
}

/// Handle on the debounce task of one open editor.
///
/// [`ParameterEditor::close`] persists a pending draft before stopping.
/// Dropping the handle (teardown) stops the task and discards it.
pub struct ParameterEditor {
    record_id: i32,
    tx: Option<mpsc::UnboundedSender<ParameterDraft>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ParameterEditor {
    /// Open an editor for `record`. Opening seeds the draft and snapshot only.
    pub fn open(
        store: Arc<dyn OverlayStore>,
        record: &OverlayRecord,
        debounce: Duration,
        outcomes: mpsc::UnboundedSender<FlushOutcome>,
    ) -> (Self, ParameterDraft) {
        let parameters = record.parameters_map();
        let draft = ParameterDraft::from_parameters(&parameters);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = DebounceTask {
            store,
            record_id: record.id,
            debounce,
            snapshot: snapshot_of(&parameters),
            outcomes,
        };
        let handle = tokio::spawn(task.run(rx, cancel.clone()));
        (
            Self {
                record_id: record.id,
                tx: Some(tx),
                cancel,
                handle: Some(handle),
            },
            draft,
        )
    }

    #[inline]
    pub fn record_id(&self) -> i32 {
        self.record_id
    }

    /// Replace the draft and restart the quiet period.
    pub fn edit(&self, draft: ParameterDraft) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(draft);
        }
    }

    /// Persist any pending draft, then stop.
    pub async fn close(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Parameter editor task failed");
            }
        }
    }
}

impl Drop for ParameterEditor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

struct DebounceTask {
    store: Arc<dyn OverlayStore>,
    record_id: i32,
    debounce: Duration,
    snapshot: String,
    outcomes: mpsc::UnboundedSender<FlushOutcome>,
}

impl DebounceTask {
    #[instrument(name = "param-editor", skip_all, fields(overlay_id = self.record_id))]
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ParameterDraft>,
        cancel: CancellationToken,
    ) {
        let mut pending: Option<ParameterDraft> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(discarded = pending.is_some(), "Parameter editor torn down");
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(draft) => {
                        pending = Some(draft);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => {
                        if let Some(draft) = pending.take() {
                            self.flush(draft).await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if let Some(draft) = pending.take() {
                        self.flush(draft).await;
                    }
                }
            }
        }
    }

    async fn flush(&mut self, draft: ParameterDraft) {
        let parameters = draft.to_parameters();
        let snapshot = snapshot_of(&parameters);
        if snapshot == self.snapshot {
            debug!("Parameters unchanged, skipping write");
            let _ = self.outcomes.send(FlushOutcome::Unchanged);
            return;
        }

        match self
            .store
            .update(self.record_id, OverlayPatch::parameters(parameters))
            .await
        {
            Ok(record) => {
                debug!("Parameters persisted");
                self.snapshot = snapshot;
                let _ = self.outcomes.send(FlushOutcome::Persisted(record));
            }
            Err(StorageError::Cancelled) => debug!("Parameter write cancelled"),
            Err(e) => {
                warn!(error = %e, "Failed to persist parameters");
                let _ = self.outcomes.send(FlushOutcome::Failed(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use overlay_models::domain::prelude::NewOverlay;
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(600);

    async fn setup() -> (Arc<MemoryStore>, OverlayRecord) {
        let store = Arc::new(MemoryStore::new());
        let record = store
            .create(NewOverlay::component("Score", "PulaTile"))
            .await
            .unwrap();
        (store, record)
    }

    fn rows(pairs: &[(&str, &str)]) -> ParameterDraft {
        ParameterDraft::new(pairs.iter().map(|(k, v)| ParamEntry::new(*k, *v)).collect())
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value("3"), json!(3));
        assert_eq!(decode_value("true"), json!(true));
        assert_eq!(decode_value(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_value("[1,2]"), json!([1, 2]));
        assert_eq!(decode_value("null"), Json::Null);
        assert_eq!(decode_value("red"), json!("red"));
        assert_eq!(decode_value(""), json!(""));
        assert_eq!(decode_value(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn test_draft_roundtrip_and_rules() {
        let draft = rows(&[("color", "red"), ("count", "3"), ("", "ignored"), ("color", "blue")]);
        let params = draft.to_parameters();
        assert_eq!(Json::Object(params.clone()), json!({"color": "blue", "count": 3}));

        let seeded = ParameterDraft::from_parameters(&params);
        assert_eq!(seeded.rows(), rows(&[("color", "blue"), ("count", "3")]).rows());
    }

    #[test]
    fn test_snapshot_ignores_row_order() {
        let a = rows(&[("a", "1"), ("b", "2")]).to_parameters();
        let b = rows(&[("b", "2"), ("a", "1")]).to_parameters();
        assert_eq!(snapshot_of(&a), snapshot_of(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persists_typed_parameters_after_quiet_period() {
        let (store, record) = setup().await;
        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, _draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);

        editor.edit(rows(&[("color", "red"), ("count", "3")]));
        tokio::time::sleep(Duration::from_millis(599)).await;
        assert_eq!(store.update_count(), 0);

        match outcomes.recv().await {
            Some(FlushOutcome::Persisted(updated)) => {
                assert_eq!(updated.parameters, json!({"color": "red", "count": 3}));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.update_count(), 1);
        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.parameters, json!({"color": "red", "count": 3}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_write_once() {
        let (store, record) = setup().await;
        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, _draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);

        for value in ["r", "re", "red"] {
            editor.edit(rows(&[("color", value)]));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(matches!(outcomes.recv().await, Some(FlushOutcome::Persisted(_))));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.update_count(), 1);
        assert_eq!(
            store.get(record.id).await.unwrap().unwrap().parameters,
            json!({"color": "red"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_draft_is_not_written() {
        let (store, record) = setup().await;
        store
            .update(record.id, OverlayPatch::parameters(rows(&[("count", "3")]).to_parameters()))
            .await
            .unwrap();
        let record = store.get(record.id).await.unwrap().unwrap();
        let baseline = store.update_count();

        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.update_count(), baseline);

        editor.edit(draft);
        assert!(matches!(outcomes.recv().await, Some(FlushOutcome::Unchanged)));
        assert_eq!(store.update_count(), baseline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending_draft() {
        let (store, record) = setup().await;
        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, _draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);

        editor.edit(rows(&[("label", "POOL")]));
        editor.close().await;

        assert!(matches!(outcomes.recv().await, Some(FlushOutcome::Persisted(_))));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_discards_pending_draft() {
        let (store, record) = setup().await;
        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, _draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);

        editor.edit(rows(&[("label", "POOL")]));
        drop(editor);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(store.update_count(), 0);
        assert!(outcomes.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_reported() {
        let (store, record) = setup().await;
        store.fail_updates_with(Some(StorageError::StorageUnavailable));
        let (tx, mut outcomes) = mpsc::unbounded_channel();
        let (editor, _draft) = ParameterEditor::open(store.clone(), &record, DEBOUNCE, tx);

        editor.edit(rows(&[("label", "POOL")]));
        assert!(matches!(outcomes.recv().await, Some(FlushOutcome::Failed(_))));
        drop(editor);
    }
}
