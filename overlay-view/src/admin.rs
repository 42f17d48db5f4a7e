//! Admin panel projection and the session that drives it.
//!
//! [`AdminPanel`] is plain state: the overlay list, in-flight flags, the
//! pending confirmation and the notice queue. [`AdminSession`] connects it to
//! a store, a live-sync task and at most one parameter editor, and turns
//! [`AdminCommand`]s from the admin socket into store calls.

use crate::{
    params::{FlushOutcome, ParamEntry, ParameterDraft, ParameterEditor},
    sync::{run_live, LiveProjection},
    templates::{Templates, ADMIN_PANEL},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use overlay_error::{storage::StorageError, StorageResult};
use overlay_models::{
    domain::{
        overlay::{DESCRIPTION_REQUIRED, TYPE_REQUIRED},
        prelude::{
            AssetField, AssetUrlOptions, NewImage, NewOverlay, OverlayPatch, OverlayQuery,
            OverlayRecord, SortDirection, SortField, SortKey,
        },
    },
    enums::overlay::OverlayType,
    OverlayStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub const CREATED_MESSAGE: &str = "Overlay created successfully";
pub const LOAD_FAILED: &str = "Failed to load overlays";
/// Rows shown per table page.
pub const PAGE_SIZE: usize = 10;

/// Table columns in display order; `None` marks a column that cannot be sorted.
const COLUMNS: [(Option<SortField>, &str); 6] = [
    (Some(SortField::ShortDescription), "Short Description"),
    (Some(SortField::Type), "Type"),
    (Some(SortField::ComponentName), "Component Name"),
    (None, "Image"),
    (Some(SortField::Active), "Active"),
    (None, "Actions"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warn,
    Error,
}

/// Transient message shown to the operator until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub summary: String,
    pub detail: String,
}

/// A destructive or exclusive action waiting for the operator's yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirmation {
    Activate { id: i32, description: String },
    Delete { id: i32, description: String },
}

impl PendingConfirmation {
    pub fn message(&self) -> String {
        match self {
            PendingConfirmation::Activate { description, .. } => format!(
                "Set \"{description}\" as active? This will deactivate any other active overlay."
            ),
            PendingConfirmation::Delete { description, .. } => {
                format!("Delete \"{description}\"? This cannot be undone.")
            }
        }
    }
}

/// Fields of the create form as submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOverlayForm {
    pub short_description: String,
    pub overlay_type: Option<OverlayType>,
    pub component_name: String,
    pub image: Option<NewImage>,
}

impl CreateOverlayForm {
    /// Turn the form into a create payload, or the first failed rule's message.
    ///
    /// Rules run in form order: description, type, then what the type requires.
    pub fn validate(self) -> Result<NewOverlay, &'static str> {
        if self.short_description.trim().is_empty() {
            return Err(DESCRIPTION_REQUIRED);
        }
        let overlay_type = self.overlay_type.ok_or(TYPE_REQUIRED)?;
        let payload = NewOverlay {
            short_description: self.short_description,
            overlay_type,
            component_name: self.component_name,
            image: self.image,
            parameters: Map::new(),
        };
        payload.check()?;
        Ok(payload.normalized())
    }
}

/// One listed overlay with its resolved image URL.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminRow {
    pub record: OverlayRecord,
    pub image_url: Option<String>,
}

pub struct AdminPanel {
    /// Every listed overlay, in table order.
    rows: Vec<AdminRow>,
    /// Zero-based table page.
    page: usize,
    sort: Option<SortKey>,
    loading: bool,
    submitting: bool,
    confirmation: Option<PendingConfirmation>,
    notices: Vec<Notice>,
    next_notice: u64,
    editing: Option<i32>,
}

impl Default for AdminPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminPanel {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            page: 0,
            sort: None,
            loading: true,
            submitting: false,
            confirmation: None,
            notices: Vec::new(),
            next_notice: 1,
            editing: None,
        }
    }

    #[inline]
    pub fn rows(&self) -> &[AdminRow] {
        &self.rows
    }

    /// Rows on the current page.
    pub fn visible_rows(&self) -> &[AdminRow] {
        let start = (self.page * PAGE_SIZE).min(self.rows.len());
        let end = (start + PAGE_SIZE).min(self.rows.len());
        &self.rows[start..end]
    }

    #[inline]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Number of table pages; an empty table still has one.
    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(PAGE_SIZE).max(1)
    }

    /// Switch pages, clamping to the last page.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.min(self.page_count() - 1);
    }

    #[inline]
    pub fn sort(&self) -> Option<SortKey> {
        self.sort
    }

    /// Sort the table by `field`: ascending first, flipping on repeated
    /// requests for the same field. Returns `false` for columns that
    /// cannot be sorted. Sorting returns to the first page.
    pub fn sort_by(&mut self, field: SortField) -> bool {
        if !COLUMNS.iter().any(|(sortable, _)| *sortable == Some(field)) {
            return false;
        }
        let key = match self.sort {
            Some(current) if current.field == field && current.direction == SortDirection::Asc => {
                SortKey::desc(field)
            }
            _ => SortKey::asc(field),
        };
        self.sort = Some(key);
        self.apply_sort();
        self.page = 0;
        true
    }

    fn apply_sort(&mut self) {
        if let Some(key) = self.sort {
            self.rows.sort_by(|a, b| key.compare(&a.record, &b.record));
        }
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[inline]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    #[inline]
    pub fn confirmation(&self) -> Option<&PendingConfirmation> {
        self.confirmation.as_ref()
    }

    #[inline]
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn notify(
        &mut self,
        level: NoticeLevel,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> u64 {
        let id = self.next_notice;
        self.next_notice += 1;
        self.notices.push(Notice {
            id,
            level,
            summary: summary.into(),
            detail: detail.into(),
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    pub fn find(&self, id: i32) -> Option<&OverlayRecord> {
        self.rows.iter().map(|row| &row.record).find(|r| r.id == id)
    }

    /// Label used in notices; falls back to the id for unlisted records.
    pub fn description_of(&self, id: i32) -> String {
        self.find(id)
            .map(|r| r.short_description.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// Validate a submit and mark it in flight.
    ///
    /// Returns `None` when the form is invalid (a `Warn` notice is queued) or
    /// another create is still outstanding.
    pub fn begin_create(&mut self, form: CreateOverlayForm) -> Option<NewOverlay> {
        if self.submitting {
            self.notify(
                NoticeLevel::Info,
                "Please wait",
                "The previous overlay is still being created",
            );
            return None;
        }
        match form.validate() {
            Ok(payload) => {
                self.submitting = true;
                Some(payload)
            }
            Err(message) => {
                self.notify(NoticeLevel::Warn, "Validation", message);
                None
            }
        }
    }

    /// Settle a create. Returns `true` when the form should be cleared.
    pub fn finish_create(&mut self, result: &StorageResult<OverlayRecord>) -> bool {
        self.submitting = false;
        match result {
            Ok(_) => {
                self.notify(NoticeLevel::Success, "Created", CREATED_MESSAGE);
                true
            }
            Err(e) => {
                self.report("Failed to create overlay", e);
                false
            }
        }
    }

    pub fn request_activate(&mut self, id: i32) -> bool {
        self.request(id, |id, description| PendingConfirmation::Activate {
            id,
            description,
        })
    }

    pub fn request_delete(&mut self, id: i32) -> bool {
        self.request(id, |id, description| PendingConfirmation::Delete {
            id,
            description,
        })
    }

    fn request(&mut self, id: i32, make: impl FnOnce(i32, String) -> PendingConfirmation) -> bool {
        let description = self.find(id).map(|r| r.short_description.clone());
        match description {
            Some(description) => {
                self.confirmation = Some(make(id, description));
                true
            }
            None => {
                self.notify(NoticeLevel::Warn, "Not found", format!("Overlay #{id} no longer exists"));
                false
            }
        }
    }

    /// Accept the pending confirmation, handing it back for execution.
    pub fn confirm(&mut self) -> Option<PendingConfirmation> {
        self.confirmation.take()
    }

    pub fn cancel(&mut self) {
        self.confirmation = None;
    }

    pub fn finish_activate(&mut self, description: &str, result: &StorageResult<OverlayRecord>) {
        self.finish(result, || format!("Activated: {description}"), "Failed to activate overlay");
    }

    pub fn finish_deactivate(&mut self, description: &str, result: &StorageResult<OverlayRecord>) {
        self.finish(result, || format!("Deactivated: {description}"), "Failed to deactivate overlay");
    }

    pub fn finish_delete(&mut self, description: &str, result: &StorageResult<()>) {
        self.finish(result, || format!("Deleted: {description}"), "Failed to delete overlay");
    }

    fn finish<T>(&mut self, result: &StorageResult<T>, success: impl FnOnce() -> String, failure: &str) {
        match result {
            Ok(_) => {
                self.notify(NoticeLevel::Success, "Done", success());
            }
            Err(e) => self.report(failure, e),
        }
    }

    fn report(&mut self, summary: &str, error: &StorageError) {
        if error.is_abort() {
            return;
        }
        self.notify(NoticeLevel::Error, summary, error.to_string());
    }

    pub fn set_editing(&mut self, id: Option<i32>) {
        self.editing = id;
    }

    /// HTML of the whole panel body. The create form lives in the page shell.
    pub fn render(&self, templates: &Templates) -> String {
        let rows: Vec<RowView<'_>> = self
            .visible_rows()
            .iter()
            .map(|row| RowView::new(row, self.editing == Some(row.record.id)))
            .collect();
        let columns: Vec<ColumnView> = COLUMNS
            .iter()
            .map(|&(field, label)| ColumnView::new(field, label, self.sort))
            .collect();
        let view = PanelView {
            submitting: self.submitting,
            loading: self.loading,
            empty: self.rows.is_empty(),
            notices: &self.notices,
            confirmation: self.confirmation.as_ref().map(PendingConfirmation::message),
            columns,
            rows,
            pager: PagerView::new(self.page, self.page_count(), self.rows.len()),
        };
        templates.render(ADMIN_PANEL, &view)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PanelView<'a> {
    submitting: bool,
    loading: bool,
    empty: bool,
    notices: &'a [Notice],
    confirmation: Option<String>,
    columns: Vec<ColumnView>,
    rows: Vec<RowView<'a>>,
    pager: PagerView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnView {
    label: &'static str,
    field: Option<&'static str>,
    /// Value for `aria-sort`.
    aria_sort: &'static str,
    arrow: &'static str,
}

impl ColumnView {
    fn new(field: Option<SortField>, label: &'static str, sort: Option<SortKey>) -> Self {
        let direction = sort
            .filter(|key| Some(key.field) == field)
            .map(|key| key.direction);
        let (aria_sort, arrow) = match direction {
            Some(SortDirection::Asc) => ("ascending", " ▲"),
            Some(SortDirection::Desc) => ("descending", " ▼"),
            None => ("none", ""),
        };
        Self {
            label,
            field: field.map(|f| f.as_str()),
            aria_sort,
            arrow,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RowView<'a> {
    id: i32,
    description: &'a str,
    kind: &'static str,
    component_name: &'a str,
    is_image: bool,
    is_component: bool,
    image_url: Option<&'a str>,
    active: bool,
    editing: bool,
}

impl<'a> RowView<'a> {
    fn new(row: &'a AdminRow, editing: bool) -> Self {
        let record = &row.record;
        Self {
            id: record.id,
            description: &record.short_description,
            kind: record.overlay_type.as_str(),
            component_name: &record.component_name,
            is_image: record.overlay_type == OverlayType::Image,
            is_component: record.is_component(),
            image_url: row.image_url.as_deref(),
            active: record.active,
            editing,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PagerView {
    /// One-based page number for display.
    number: usize,
    pages: usize,
    total: usize,
    prev: usize,
    next: usize,
    has_prev: bool,
    has_next: bool,
    links: Vec<PageLink>,
}

#[derive(Serialize)]
struct PageLink {
    page: usize,
    number: usize,
    current: bool,
}

impl PagerView {
    fn new(page: usize, pages: usize, total: usize) -> Self {
        Self {
            number: page + 1,
            pages,
            total,
            prev: page.saturating_sub(1),
            next: (page + 1).min(pages - 1),
            has_prev: page > 0,
            has_next: page + 1 < pages,
            links: (0..pages)
                .map(|p| PageLink {
                    page: p,
                    number: p + 1,
                    current: p == page,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LiveProjection for AdminPanel {
    type Snapshot = Vec<AdminRow>;

    async fn fetch(store: &dyn OverlayStore) -> StorageResult<Vec<AdminRow>> {
        let query = OverlayQuery::new().sort_by(SortKey::desc(SortField::Created));
        let rows = store
            .list(&query)
            .await?
            .into_iter()
            .map(|record| AdminRow {
                image_url: store.asset_url(&record, AssetField::Image, &AssetUrlOptions::default()),
                record,
            })
            .collect();
        Ok(rows)
    }

    fn replace(&mut self, snapshot: Vec<AdminRow>) {
        self.rows = snapshot;
        self.apply_sort();
        self.set_page(self.page);
        self.loading = false;
    }

    fn fetch_failed(&mut self, error: &StorageError) {
        self.loading = false;
        self.notify(NoticeLevel::Error, LOAD_FAILED, error.to_string());
    }
}

/// Image attached to a create command, base64 encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub file_name: String,
    pub mime: String,
    /// Raw base64 or a `data:` URL.
    pub data: String,
}

impl UploadedImage {
    fn decode(self) -> Option<NewImage> {
        let data = match self.data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, b64)| b64)?,
            None => self.data.as_str(),
        };
        let bytes = STANDARD.decode(data.trim()).ok()?;
        Some(NewImage {
            file_name: self.file_name,
            mime: self.mime,
            bytes,
        })
    }
}

/// Commands sent by the admin page.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdminCommand {
    Refresh,
    Create {
        #[serde(default)]
        short_description: String,
        #[serde(default)]
        overlay_type: Option<String>,
        #[serde(default)]
        component_name: String,
        #[serde(default)]
        image: Option<UploadedImage>,
    },
    Activate {
        id: i32,
    },
    Deactivate {
        id: i32,
    },
    Delete {
        id: i32,
    },
    Confirm,
    Cancel,
    OpenParameters {
        id: i32,
    },
    EditParameters {
        rows: Vec<ParamEntry>,
    },
    CloseParameters,
    DismissNotice {
        id: u64,
    },
    /// Sort the table by a column, e.g. `short_description`.
    Sort {
        field: String,
    },
    /// Show a zero-based table page.
    Page {
        page: usize,
    },
    Ping {
        ts: i64,
    },
}

/// Messages pushed to the admin page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdminEvent {
    Render {
        html: String,
    },
    FormReset,
    Parameters {
        id: i32,
        description: String,
        rows: Vec<ParamEntry>,
    },
    ParameterStatus {
        status: ParameterStatus,
    },
    Pong {
        ts: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterStatus {
    Saved,
    Unchanged,
    Failed,
}

/// One admin connection: a live panel plus command handling.
///
/// Dropping the session cancels its live-sync task and discards any
/// unsaved parameter draft.
pub struct AdminSession {
    store: Arc<dyn OverlayStore>,
    templates: Arc<Templates>,
    panel: Arc<Mutex<AdminPanel>>,
    events: mpsc::UnboundedSender<AdminEvent>,
    outcomes: mpsc::UnboundedSender<FlushOutcome>,
    debounce: Duration,
    editor: Option<ParameterEditor>,
    cancel: CancellationToken,
}

impl AdminSession {
    /// Start the panel's live sync. Events for the page arrive on the returned receiver.
    pub fn start(
        store: Arc<dyn OverlayStore>,
        templates: Arc<Templates>,
        debounce: Duration,
        cancel: &CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<AdminEvent>) {
        let cancel = cancel.child_token();
        let panel = Arc::new(Mutex::new(AdminPanel::new()));
        let (events, events_rx) = mpsc::unbounded_channel();
        let (outcomes, outcomes_rx) = mpsc::unbounded_channel();

        let render_tx = events.clone();
        let render_templates = Arc::clone(&templates);
        tokio::spawn(run_live(
            Arc::clone(&store),
            Arc::clone(&panel),
            cancel.clone(),
            move |panel: &AdminPanel| {
                let _ = render_tx.send(AdminEvent::Render {
                    html: panel.render(&render_templates),
                });
            },
        ));
        tokio::spawn(forward_outcomes(
            outcomes_rx,
            Arc::clone(&panel),
            Arc::clone(&templates),
            events.clone(),
            cancel.clone(),
        ));

        (
            Self {
                store,
                templates,
                panel,
                events,
                outcomes,
                debounce,
                editor: None,
                cancel,
            },
            events_rx,
        )
    }

    #[instrument(name = "admin-command", skip_all)]
    pub async fn handle(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::Refresh => self.refresh().await,
            AdminCommand::Create {
                short_description,
                overlay_type,
                component_name,
                image,
            } => {
                let form = CreateOverlayForm {
                    short_description,
                    overlay_type: overlay_type.and_then(|t| t.parse().ok()),
                    component_name,
                    image: image.and_then(UploadedImage::decode),
                };
                self.create(form).await;
            }
            AdminCommand::Activate { id } => {
                self.panel.lock().await.request_activate(id);
            }
            AdminCommand::Delete { id } => {
                self.panel.lock().await.request_delete(id);
            }
            AdminCommand::Confirm => {
                let pending = self.panel.lock().await.confirm();
                match pending {
                    Some(PendingConfirmation::Activate { id, description }) => {
                        let result = self.store.update(id, OverlayPatch::activate()).await;
                        self.panel.lock().await.finish_activate(&description, &result);
                    }
                    Some(PendingConfirmation::Delete { id, description }) => {
                        if self.editor.as_ref().is_some_and(|e| e.record_id() == id) {
                            // The record is going away; its draft has nowhere to go.
                            self.editor = None;
                            self.panel.lock().await.set_editing(None);
                        }
                        let result = self.store.delete(id).await;
                        self.panel.lock().await.finish_delete(&description, &result);
                    }
                    None => debug!("Nothing to confirm"),
                }
            }
            AdminCommand::Cancel => self.panel.lock().await.cancel(),
            AdminCommand::Deactivate { id } => {
                let description = self.panel.lock().await.description_of(id);
                let result = self.store.update(id, OverlayPatch::deactivate()).await;
                self.panel.lock().await.finish_deactivate(&description, &result);
            }
            AdminCommand::OpenParameters { id } => self.open_parameters(id).await,
            AdminCommand::EditParameters { rows } => {
                match &self.editor {
                    Some(editor) => editor.edit(ParameterDraft::new(rows)),
                    None => debug!("Parameter edit without an open editor"),
                }
                return;
            }
            AdminCommand::CloseParameters => self.close_parameters().await,
            AdminCommand::DismissNotice { id } => {
                self.panel.lock().await.dismiss(id);
            }
            AdminCommand::Sort { field } => {
                let sorted = match field.parse::<SortField>() {
                    Ok(field) => self.panel.lock().await.sort_by(field),
                    Err(_) => false,
                };
                if !sorted {
                    debug!(%field, "Ignoring sort on unsortable column");
                }
            }
            AdminCommand::Page { page } => self.panel.lock().await.set_page(page),
            AdminCommand::Ping { ts } => {
                let _ = self.events.send(AdminEvent::Pong { ts });
                return;
            }
        }
        self.emit_render().await;
    }

    /// Re-fetch outside the change feed, e.g. after a reconnect.
    async fn refresh(&self) {
        let result = AdminPanel::fetch(self.store.as_ref()).await;
        let mut panel = self.panel.lock().await;
        match result {
            Ok(rows) => panel.replace(rows),
            Err(e) if e.is_abort() => {}
            Err(e) => panel.fetch_failed(&e),
        }
    }

    /// Start a create in the background.
    ///
    /// The store call runs off the command loop so that the in-flight flag is
    /// visible to the next command: a second submit arriving before the
    /// first settles is refused by [`AdminPanel::begin_create`].
    async fn create(&self, form: CreateOverlayForm) {
        let Some(payload) = self.panel.lock().await.begin_create(form) else {
            return;
        };

        let store = Arc::clone(&self.store);
        let templates = Arc::clone(&self.templates);
        let panel = Arc::clone(&self.panel);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.create(payload).await;
            if let Err(e) = &result {
                warn!(error = %e, "Failed to create overlay");
            }
            let (reset, html) = {
                let mut panel = panel.lock().await;
                let reset = panel.finish_create(&result);
                (reset, panel.render(&templates))
            };
            if reset {
                let _ = events.send(AdminEvent::FormReset);
            }
            let _ = events.send(AdminEvent::Render { html });
        });
    }

    async fn open_parameters(&mut self, id: i32) {
        self.close_parameters().await;

        let record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.panel.lock().await.notify(
                    NoticeLevel::Warn,
                    "Not found",
                    format!("Overlay #{id} no longer exists"),
                );
                return;
            }
            Err(e) => {
                let mut panel = self.panel.lock().await;
                if !e.is_abort() {
                    panel.notify(NoticeLevel::Error, "Failed to load parameters", e.to_string());
                }
                return;
            }
        };

        let (editor, draft) = ParameterEditor::open(
            Arc::clone(&self.store),
            &record,
            self.debounce,
            self.outcomes.clone(),
        );
        self.editor = Some(editor);
        self.panel.lock().await.set_editing(Some(id));
        let _ = self.events.send(AdminEvent::Parameters {
            id,
            description: record.short_description,
            rows: draft.rows().to_vec(),
        });
    }

    /// Close the open editor, persisting a pending draft first.
    async fn close_parameters(&mut self) {
        if let Some(editor) = self.editor.take() {
            editor.close().await;
            self.panel.lock().await.set_editing(None);
        }
    }

    async fn emit_render(&self) {
        let html = self.panel.lock().await.render(&self.templates);
        let _ = self.events.send(AdminEvent::Render { html });
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward_outcomes(
    mut outcomes: mpsc::UnboundedReceiver<FlushOutcome>,
    panel: Arc<Mutex<AdminPanel>>,
    templates: Arc<Templates>,
    events: mpsc::UnboundedSender<AdminEvent>,
    cancel: CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => outcome,
                None => break,
            },
        };
        let status = match outcome {
            FlushOutcome::Persisted(_) => ParameterStatus::Saved,
            FlushOutcome::Unchanged => ParameterStatus::Unchanged,
            FlushOutcome::Failed(message) => {
                let html = {
                    let mut panel = panel.lock().await;
                    panel.notify(NoticeLevel::Error, "Failed to save parameters", message);
                    panel.render(&templates)
                };
                let _ = events.send(AdminEvent::Render { html });
                ParameterStatus::Failed
            }
        };
        let _ = events.send(AdminEvent::ParameterStatus { status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use overlay_models::constants::PNG_SIGNATURE;
    use overlay_models::domain::overlay::{COMPONENT_NAME_REQUIRED, IMAGE_REQUIRED};
    use serde_json::json;

    fn templates() -> Templates {
        Templates::builtin().unwrap()
    }

    fn png() -> NewImage {
        NewImage {
            file_name: "cheer.png".into(),
            mime: "image/png".into(),
            bytes: [&PNG_SIGNATURE[..], b"IHDR".as_slice()].concat(),
        }
    }

    fn record(id: i32, description: &str, active: bool) -> OverlayRecord {
        OverlayRecord {
            id,
            short_description: description.into(),
            overlay_type: OverlayType::Component,
            component_name: "ExampleComponent".into(),
            image: None,
            image_mime: None,
            active,
            parameters: json!({}),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn loaded(records: Vec<OverlayRecord>) -> AdminPanel {
        let mut panel = AdminPanel::new();
        panel.replace(
            records
                .into_iter()
                .map(|record| AdminRow {
                    record,
                    image_url: None,
                })
                .collect(),
        );
        panel
    }

    #[test]
    fn test_form_validation_order() {
        let mut form = CreateOverlayForm::default();
        assert_eq!(form.clone().validate(), Err(DESCRIPTION_REQUIRED));

        form.short_description = "Score".into();
        assert_eq!(form.clone().validate(), Err(TYPE_REQUIRED));

        form.overlay_type = Some(OverlayType::Component);
        assert_eq!(form.clone().validate(), Err(COMPONENT_NAME_REQUIRED));

        form.overlay_type = Some(OverlayType::Image);
        assert_eq!(form.clone().validate(), Err(IMAGE_REQUIRED));

        form.image = Some(NewImage {
            mime: "image/jpeg".into(),
            ..png()
        });
        assert_eq!(form.clone().validate(), Err(IMAGE_REQUIRED));

        form.image = Some(png());
        let payload = form.validate().unwrap();
        assert_eq!(payload.overlay_type, OverlayType::Image);
    }

    #[test]
    fn test_invalid_submit_warns_and_stays_idle() {
        let mut panel = AdminPanel::new();
        assert!(panel.begin_create(CreateOverlayForm::default()).is_none());
        assert!(!panel.is_submitting());
        let notice = &panel.notices()[0];
        assert_eq!(notice.level, NoticeLevel::Warn);
        assert_eq!(notice.detail, DESCRIPTION_REQUIRED);
    }

    #[test]
    fn test_second_submit_refused_while_in_flight() {
        let mut panel = AdminPanel::new();
        let form = CreateOverlayForm {
            short_description: "Cheer".into(),
            overlay_type: Some(OverlayType::Image),
            image: Some(png()),
            ..Default::default()
        };
        assert!(panel.begin_create(form.clone()).is_some());
        assert!(panel.is_submitting());
        assert!(panel.begin_create(form).is_none());

        assert!(panel.finish_create(&Ok(record(1, "Cheer", false))));
        assert!(!panel.is_submitting());
        assert_eq!(panel.notices().last().unwrap().detail, CREATED_MESSAGE);
        assert_eq!(panel.notices().last().unwrap().level, NoticeLevel::Success);
    }

    #[test]
    fn test_failed_create_keeps_form() {
        let mut panel = AdminPanel::new();
        let failed: StorageResult<OverlayRecord> = Err(StorageError::StorageUnavailable);
        assert!(!panel.finish_create(&failed));
        let notice = panel.notices().last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.summary, "Failed to create overlay");
    }

    #[test]
    fn test_confirmation_messages() {
        let mut panel = loaded(vec![record(1, "Cheer", false)]);
        assert!(panel.request_activate(1));
        assert_eq!(
            panel.confirmation().unwrap().message(),
            "Set \"Cheer\" as active? This will deactivate any other active overlay."
        );
        assert!(panel.render(&templates()).contains("confirm-dialog"));
        panel.cancel();
        assert!(panel.confirmation().is_none());

        assert!(panel.request_delete(1));
        assert_eq!(
            panel.confirm(),
            Some(PendingConfirmation::Delete {
                id: 1,
                description: "Cheer".into()
            })
        );
        assert!(!panel.request_delete(42));
    }

    #[test]
    fn test_notices_and_dismiss() {
        let mut panel = loaded(vec![record(1, "Cheer", true)]);
        panel.finish_activate("Cheer", &Ok(record(1, "Cheer", true)));
        panel.finish_deactivate("Cheer", &Err(StorageError::StorageUnavailable));
        panel.finish_delete("Cheer", &Err(StorageError::Cancelled));

        let notices = panel.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].detail, "Activated: Cheer");
        assert_eq!(notices[1].summary, "Failed to deactivate overlay");

        let id = notices[0].id;
        assert!(panel.dismiss(id));
        assert!(!panel.dismiss(id));
        assert_eq!(panel.notices().len(), 1);
    }

    #[test]
    fn test_load_failure_notice() {
        let mut panel = AdminPanel::new();
        assert!(panel.is_loading());
        panel.fetch_failed(&StorageError::StorageUnavailable);
        assert!(!panel.is_loading());
        assert_eq!(panel.notices()[0].summary, LOAD_FAILED);
    }

    #[test]
    fn test_render_rows() {
        let panel = loaded(vec![record(2, "Score <b>", true), record(1, "Cheer", false)]);
        let html = panel.render(&templates());
        assert!(html.contains("Score &lt;b&gt;"));
        assert!(!html.contains("Score <b>"));
        assert!(html.contains(r#"data-command="deactivate" data-id="2""#));
        assert!(html.contains(r#"data-command="activate" data-id="1""#));
        assert!(html.contains(r#"data-command="openParameters""#));
        assert!(html.contains(r#"data-submitting="false""#));
        assert!(html.contains("Page 1 of 1"));
    }

    #[test]
    fn test_render_states() {
        let templates = templates();
        let mut panel = AdminPanel::new();
        assert!(panel.render(&templates).contains("Loading overlays…"));
        panel.replace(Vec::new());
        let html = panel.render(&templates);
        assert!(html.contains("No overlays found"));
        assert!(!html.contains("<table"));

        panel.notify(NoticeLevel::Warn, "Validation", "<i>oops</i>");
        let html = panel.render(&templates);
        assert!(html.contains("notice notice-warn"));
        assert!(html.contains("&lt;i&gt;oops&lt;/i&gt;"));
    }

    #[test]
    fn test_pages_of_ten() {
        let records: Vec<OverlayRecord> = (1..=23)
            .rev()
            .map(|id| record(id, &format!("Overlay {id:02}"), false))
            .collect();
        let mut panel = loaded(records);
        assert_eq!(panel.page_count(), 3);
        assert_eq!(panel.visible_rows().len(), PAGE_SIZE);
        assert_eq!(panel.visible_rows()[0].record.id, 23);

        panel.set_page(2);
        assert_eq!(panel.visible_rows().len(), 3);
        assert_eq!(panel.visible_rows()[2].record.id, 1);
        let html = panel.render(&templates());
        assert!(html.contains("Page 3 of 3"));
        assert!(html.contains(r#"data-id="1""#));
        assert!(!html.contains(r#"data-id="23""#));

        panel.set_page(99);
        assert_eq!(panel.page(), 2);

        // A shrinking list pulls the page back into range.
        panel.replace(
            (1..=4)
                .map(|id| AdminRow {
                    record: record(id, "x", false),
                    image_url: None,
                })
                .collect(),
        );
        assert_eq!(panel.page(), 0);
        assert_eq!(panel.page_count(), 1);
    }

    #[test]
    fn test_sort_toggles_and_survives_refetch() {
        let mut panel = loaded(vec![
            record(3, "Charlie", false),
            record(2, "Alpha", true),
            record(1, "Bravo", false),
        ]);
        assert!(panel.sort_by(SortField::ShortDescription));
        let order: Vec<i32> = panel.rows().iter().map(|r| r.record.id).collect();
        assert_eq!(order, vec![2, 1, 3]);
        let html = panel.render(&templates());
        assert!(html.contains(r#"aria-sort="ascending""#));
        assert!(html.contains(r#"data-command="sort" data-field="short_description""#));

        assert!(panel.sort_by(SortField::ShortDescription));
        assert_eq!(panel.sort(), Some(SortKey::desc(SortField::ShortDescription)));
        let order: Vec<i32> = panel.rows().iter().map(|r| r.record.id).collect();
        assert_eq!(order, vec![3, 1, 2]);

        assert!(panel.sort_by(SortField::Active));
        assert_eq!(panel.rows()[2].record.id, 2);

        // Re-fetched rows arrive newest first and are re-sorted.
        panel.replace(vec![
            AdminRow {
                record: record(4, "Delta", true),
                image_url: None,
            },
            AdminRow {
                record: record(1, "Bravo", false),
                image_url: None,
            },
        ]);
        assert_eq!(panel.rows()[0].record.id, 1);

        assert!(!panel.sort_by(SortField::Created));
        assert_eq!(panel.sort(), Some(SortKey::asc(SortField::Active)));
    }

    #[test]
    fn test_command_decoding() {
        let cmd: AdminCommand = serde_json::from_value(json!({
            "type": "create",
            "shortDescription": "Cheer",
            "overlayType": "image",
            "image": {"fileName": "cheer.png", "mime": "image/png", "data": "data:image/png;base64,iVBORw=="}
        }))
        .unwrap();
        match cmd {
            AdminCommand::Create { image: Some(image), .. } => {
                let image = image.decode().unwrap();
                assert_eq!(image.bytes[..4], [0x89, b'P', b'N', b'G']);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cmd: AdminCommand =
            serde_json::from_value(json!({"type": "dismissNotice", "id": 3})).unwrap();
        assert!(matches!(cmd, AdminCommand::DismissNotice { id: 3 }));

        let cmd: AdminCommand =
            serde_json::from_value(json!({"type": "sort", "field": "component_name"})).unwrap();
        assert!(matches!(cmd, AdminCommand::Sort { ref field } if field == "component_name"));
        let cmd: AdminCommand = serde_json::from_value(json!({"type": "page", "page": 2})).unwrap();
        assert!(matches!(cmd, AdminCommand::Page { page: 2 }));

        let event = serde_json::to_value(AdminEvent::ParameterStatus {
            status: ParameterStatus::Saved,
        })
        .unwrap();
        assert_eq!(event, json!({"type": "parameterStatus", "status": "saved"}));
    }

    async fn session(store: &Arc<MemoryStore>) -> (AdminSession, mpsc::UnboundedReceiver<AdminEvent>, CancellationToken) {
        let cancel = CancellationToken::new();
        let store: Arc<dyn OverlayStore> = store.clone();
        let (session, mut events) = AdminSession::start(
            store,
            Arc::new(templates()),
            Duration::from_millis(600),
            &cancel,
        );
        // First render comes from the initial fetch.
        assert!(matches!(events.recv().await, Some(AdminEvent::Render { .. })));
        (session, events, cancel)
    }

    #[tokio::test]
    async fn test_session_create_and_activate() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, mut events, cancel) = session(&store).await;

        session
            .handle(AdminCommand::Create {
                short_description: "Score".into(),
                overlay_type: Some("component".into()),
                component_name: "PulaTile".into(),
                image: None,
            })
            .await;
        wait_for_reset(&mut events).await;
        let created = store.list(&OverlayQuery::new()).await.unwrap();
        assert_eq!(created.len(), 1);
        assert!(!created[0].active);
        assert!(!session.panel.lock().await.is_submitting());

        // Wait until the live sync has picked up the new row.
        loop {
            if session.panel.lock().await.find(created[0].id).is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }

        session.handle(AdminCommand::Activate { id: created[0].id }).await;
        assert!(!store.get(created[0].id).await.unwrap().unwrap().active);
        session.handle(AdminCommand::Confirm).await;
        assert!(store.get(created[0].id).await.unwrap().unwrap().active);

        session.handle(AdminCommand::Deactivate { id: created[0].id }).await;
        assert!(!store.get(created[0].id).await.unwrap().unwrap().active);

        cancel.cancel();
    }

    async fn wait_for_reset(events: &mut mpsc::UnboundedReceiver<AdminEvent>) {
        loop {
            match events.recv().await {
                Some(AdminEvent::FormReset) => break,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    }

    fn create_command(description: &str) -> AdminCommand {
        AdminCommand::Create {
            short_description: description.into(),
            overlay_type: Some("component".into()),
            component_name: "ExampleComponent".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_session_double_submit_creates_once() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, mut events, cancel) = session(&store).await;

        let held = store.hold_creates().await;
        session.handle(create_command("Score")).await;
        let submitting = loop {
            match events.recv().await {
                Some(AdminEvent::Render { html }) => break html,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        };
        assert!(submitting.contains(r#"data-submitting="true""#));

        // The first create is still waiting on the store.
        session.handle(create_command("Score")).await;
        {
            let panel = session.panel.lock().await;
            assert!(panel.is_submitting());
            let notice = panel.notices().last().unwrap();
            assert_eq!(notice.level, NoticeLevel::Info);
            assert_eq!(notice.summary, "Please wait");
        }

        drop(held);
        wait_for_reset(&mut events).await;
        assert_eq!(store.list(&OverlayQuery::new()).await.unwrap().len(), 1);
        assert!(!session.panel.lock().await.is_submitting());

        // Once settled, the next submit goes through.
        session.handle(create_command("Score again")).await;
        wait_for_reset(&mut events).await;
        assert_eq!(store.list(&OverlayQuery::new()).await.unwrap().len(), 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_session_sort_and_page_commands() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store
                .create(NewOverlay::component(format!("Overlay {i:02}"), "ExampleComponent"))
                .await
                .unwrap();
        }
        let (mut session, mut events, cancel) = session(&store).await;

        session.handle(AdminCommand::Page { page: 1 }).await;
        let html = loop {
            match events.recv().await {
                Some(AdminEvent::Render { html }) => break html,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        };
        assert!(html.contains("Page 2 of 2"));

        session
            .handle(AdminCommand::Sort {
                field: "short_description".into(),
            })
            .await;
        {
            let panel = session.panel.lock().await;
            assert_eq!(panel.page(), 0);
            assert_eq!(panel.visible_rows()[0].record.short_description, "Overlay 00");
        }

        session.handle(AdminCommand::Sort { field: "image".into() }).await;
        assert_eq!(
            session.panel.lock().await.sort(),
            Some(SortKey::asc(SortField::ShortDescription))
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_session_invalid_create_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, _events, cancel) = session(&store).await;

        session
            .handle(AdminCommand::Create {
                short_description: "Score".into(),
                overlay_type: None,
                component_name: String::new(),
                image: None,
            })
            .await;
        assert!(store.list(&OverlayQuery::new()).await.unwrap().is_empty());
        let panel = session.panel.lock().await;
        assert_eq!(panel.notices().last().unwrap().detail, TYPE_REQUIRED);
        drop(panel);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_session_delete_requires_confirmation() {
        let store = Arc::new(MemoryStore::new());
        let record = store.create(NewOverlay::component("Score", "PulaTile")).await.unwrap();
        let (mut session, _events, cancel) = session(&store).await;

        session.handle(AdminCommand::Delete { id: record.id }).await;
        session.handle(AdminCommand::Cancel).await;
        assert!(store.get(record.id).await.unwrap().is_some());

        session.handle(AdminCommand::Delete { id: record.id }).await;
        session.handle(AdminCommand::Confirm).await;
        assert!(store.get(record.id).await.unwrap().is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_session_parameter_editor_close_persists() {
        let store = Arc::new(MemoryStore::new());
        let record = store.create(NewOverlay::component("Score", "PulaTile")).await.unwrap();
        let (mut session, mut events, cancel) = session(&store).await;

        session.handle(AdminCommand::OpenParameters { id: record.id }).await;
        let opened = loop {
            match events.recv().await {
                Some(AdminEvent::Parameters { id, rows, .. }) => break (id, rows),
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        };
        assert_eq!(opened, (record.id, Vec::new()));

        session
            .handle(AdminCommand::EditParameters {
                rows: vec![ParamEntry::new("color", "red"), ParamEntry::new("count", "3")],
            })
            .await;
        session.handle(AdminCommand::CloseParameters).await;

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.parameters, json!({"color": "red", "count": 3}));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, mut events, cancel) = session(&store).await;
        session.handle(AdminCommand::Ping { ts: 42 }).await;
        assert_eq!(events.recv().await, Some(AdminEvent::Pong { ts: 42 }));
        cancel.cancel();
    }
}
