//! Per-user mirrors of database tables, kept current from the Postgres
//! `row_changes` notification channel.
//!
//! A mirror subscribes to the change hub before it reads its snapshot, then
//! replays whatever arrived in between. Inserts are de-duplicated by id, so a
//! row that lands in both the snapshot and the feed appears once.
//!
//! Notifications carry key columns only; inserted and updated rows are read
//! back by id before they reach the mirror.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::queries::{fetch_row_as_json, fetch_rows_as_json};
use crate::db::ROW_CHANGES_CHANNEL;
use crate::errors::{AppError, AppResult};

const HUB_CAPACITY: usize = 256;
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorTable {
    Profiles,
    BasicInformation,
    ChatSessions,
    Messages,
    Reports,
    Assessments,
    DietPlans,
}

impl MirrorTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorTable::Profiles => "profiles",
            MirrorTable::BasicInformation => "basic_information",
            MirrorTable::ChatSessions => "chat_sessions",
            MirrorTable::Messages => "messages",
            MirrorTable::Reports => "reports",
            MirrorTable::Assessments => "assessments",
            MirrorTable::DietPlans => "diet_plans",
        }
    }

    pub fn default_column(&self) -> &'static str {
        match self {
            MirrorTable::Profiles => "id",
            _ => "user_id",
        }
    }

    /// Columns a mirror of this table may filter on.
    pub fn filter_columns(&self) -> &'static [&'static str] {
        match self {
            MirrorTable::Profiles => &["id"],
            MirrorTable::Messages => &["user_id", "session_id"],
            MirrorTable::Reports => &["user_id", "session_id"],
            MirrorTable::DietPlans => &["user_id", "report_id"],
            _ => &["user_id"],
        }
    }
}

impl FromStr for MirrorTable {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profiles" => Ok(MirrorTable::Profiles),
            "basic_information" => Ok(MirrorTable::BasicInformation),
            "chat_sessions" | "sessions" => Ok(MirrorTable::ChatSessions),
            "messages" => Ok(MirrorTable::Messages),
            "reports" => Ok(MirrorTable::Reports),
            "assessments" => Ok(MirrorTable::Assessments),
            "diet_plans" => Ok(MirrorTable::DietPlans),
            other => Err(AppError::InvalidInput(format!("table '{other}' cannot be mirrored"))),
        }
    }
}

/// Which rows a mirror follows: `table.column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSpec {
    pub table: MirrorTable,
    pub column: &'static str,
    pub value: Uuid,
}

impl MirrorSpec {
    pub fn new(table: MirrorTable, value: Uuid, column: Option<&str>) -> AppResult<Self> {
        let column = match column {
            None => table.default_column(),
            Some(requested) => table
                .filter_columns()
                .iter()
                .copied()
                .find(|c| *c == requested)
                .ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "column '{}' cannot filter {}",
                        requested,
                        table.as_str()
                    ))
                })?,
        };

        Ok(Self { table, column, value })
    }

    fn matches_row(&self, row: &Value) -> bool {
        row.get(self.column)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            == Some(self.value)
    }
}

/// A row a mirror can key by id.
pub trait MirrorRow: Clone + Send + Sync + 'static {
    type Id: PartialEq + Clone + Debug + Send + Sync;

    fn row_id(&self) -> Self::Id;
}

impl MirrorRow for Value {
    type Id = String;

    fn row_id(&self) -> String {
        json_row_id(self)
    }
}

fn json_row_id(row: &Value) -> String {
    match row.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T: MirrorRow> {
    Insert(T),
    Update(T),
    Delete(T::Id),
}

/// The ordered rows of one mirror plus its load state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeMirror<T> {
    pub data: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for RealtimeMirror<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

impl<T: MirrorRow> RealtimeMirror<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_snapshot(&mut self, rows: Vec<T>) {
        self.data = rows;
        self.loading = false;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.data.clear();
        self.loading = false;
        self.error = Some(error.to_string());
    }

    pub fn apply(&mut self, event: ChangeEvent<T>) {
        match event {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) => self.upsert(row),
            ChangeEvent::Delete(id) => self.data.retain(|r| r.row_id() != id),
        }
    }

    /// Replaces the row with the same id in place, or appends it.
    fn upsert(&mut self, row: T) {
        let id = row.row_id();
        match self.data.iter_mut().find(|r| r.row_id() == id) {
            Some(existing) => *existing = row,
            None => self.data.push(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// What a mirror does with one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// Read the row back by id, then apply it as an insert or update.
    Refresh(Uuid, ChangeType),
    Remove(String),
}

/// One decoded `row_changes` notification. `record` and `old_record` hold
/// the row's key columns, not the full row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowChange {
    pub table: String,
    #[serde(rename = "type")]
    pub event_type: ChangeType,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
}

impl RowChange {
    pub fn from_payload(payload: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn matches(&self, spec: &MirrorSpec) -> bool {
        if self.table != spec.table.as_str() {
            return false;
        }
        // An update that moves a row out of the filter still has to reach the mirror
        [self.record.as_ref(), self.old_record.as_ref()]
            .into_iter()
            .flatten()
            .any(|row| spec.matches_row(row))
    }

    /// What a mirror following `spec` has to do for this change.
    pub fn to_action(&self, spec: &MirrorSpec) -> Option<RowAction> {
        match (self.event_type, &self.record, &self.old_record) {
            (ChangeType::Insert | ChangeType::Update, Some(record), _) if spec.matches_row(record) => {
                row_uuid(record).map(|id| RowAction::Refresh(id, self.event_type))
            }
            (ChangeType::Update, Some(record), _) => Some(RowAction::Remove(json_row_id(record))),
            (ChangeType::Delete, _, Some(old)) => Some(RowAction::Remove(json_row_id(old))),
            _ => None,
        }
    }
}

fn row_uuid(row: &Value) -> Option<Uuid> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Fans out decoded row changes to every live mirror.
#[derive(Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<Arc<RowChange>>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RowChange>> {
        self.sender.subscribe()
    }

    pub fn publish(&self, change: RowChange) {
        // No receivers simply means no mirror is open
        let _ = self.sender.send(Arc::new(change));
    }

    /// Listens on the notification channel and publishes every change.
    ///
    /// Fails only if the first connection cannot be made; afterwards
    /// `PgListener` reconnects on its own and the loop keeps going.
    pub async fn spawn_listener(&self, pool: &PgPool) -> AppResult<JoinHandle<()>> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(ROW_CHANGES_CHANNEL).await?;
        tracing::info!("✅ Listening for row changes on '{}'", ROW_CHANGES_CHANNEL);

        let hub = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match RowChange::from_payload(notification.payload()) {
                        Ok(change) => {
                            tracing::debug!("Row change on {}: {:?}", change.table, change.event_type);
                            hub.publish(change);
                        }
                        Err(e) => tracing::warn!("⚠️ Ignoring undecodable row change: {}", e),
                    },
                    Err(e) => {
                        tracing::error!("❌ Row change listener lost its connection: {}", e);
                        tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                    }
                }
            }
        }))
    }
}

/// Where a mirror reads its rows from.
pub trait RowSource: Send + Sync + 'static {
    fn fetch(&self, spec: &MirrorSpec) -> impl Future<Output = AppResult<Vec<Value>>> + Send;

    fn fetch_row(
        &self,
        table: MirrorTable,
        id: Uuid,
    ) -> impl Future<Output = AppResult<Option<Value>>> + Send;
}

impl RowSource for PgPool {
    async fn fetch(&self, spec: &MirrorSpec) -> AppResult<Vec<Value>> {
        fetch_rows_as_json(self, spec.table.as_str(), spec.column, spec.value).await
    }

    async fn fetch_row(&self, table: MirrorTable, id: Uuid) -> AppResult<Option<Value>> {
        fetch_row_as_json(self, table.as_str(), id).await
    }
}

/// A live mirror. Dropping the handle stops its task.
pub struct MirrorHandle {
    receiver: watch::Receiver<RealtimeMirror<Value>>,
    task: JoinHandle<()>,
}

impl MirrorHandle {
    pub fn receiver(&self) -> watch::Receiver<RealtimeMirror<Value>> {
        self.receiver.clone()
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn load_snapshot<S: RowSource>(
    source: &S,
    spec: &MirrorSpec,
    mirror: &mut RealtimeMirror<Value>,
) {
    match source.fetch(spec).await {
        Ok(rows) => {
            tracing::info!("Loaded {} rows from {} for mirror", rows.len(), spec.table.as_str());
            mirror.load_snapshot(rows);
        }
        Err(e) => {
            tracing::error!("❌ Failed to load {} snapshot: {}", spec.table.as_str(), e);
            mirror.fail(e);
        }
    }
}

async fn apply_action<S: RowSource>(
    source: &S,
    spec: &MirrorSpec,
    mirror: &mut RealtimeMirror<Value>,
    action: RowAction,
) {
    match action {
        RowAction::Remove(id) => mirror.apply(ChangeEvent::Delete(id)),
        RowAction::Refresh(id, kind) => match source.fetch_row(spec.table, id).await {
            Ok(Some(row)) if spec.matches_row(&row) => mirror.apply(match kind {
                ChangeType::Insert => ChangeEvent::Insert(row),
                _ => ChangeEvent::Update(row),
            }),
            // deleted or moved out of the filter since the notification
            Ok(_) => mirror.apply(ChangeEvent::Delete(id.to_string())),
            Err(e) => {
                tracing::error!("❌ Failed to read {} row {}: {}", spec.table.as_str(), id, e);
                load_snapshot(source, spec, mirror).await;
            }
        },
    }
}

/// Opens a mirror for `spec`.
pub fn subscribe<S: RowSource>(hub: &ChangeHub, source: S, spec: MirrorSpec) -> MirrorHandle {
    // Subscribe first so nothing committed during the snapshot read is lost
    let mut changes = hub.subscribe();
    let (sender, receiver) = watch::channel(RealtimeMirror::new());

    let task = tokio::spawn(async move {
        let mut mirror = RealtimeMirror::new();
        load_snapshot(&source, &spec, &mut mirror).await;
        sender.send_replace(mirror.clone());

        loop {
            tokio::select! {
                _ = sender.closed() => break,
                received = changes.recv() => match received {
                    Ok(change) => {
                        if !change.matches(&spec) {
                            continue;
                        }
                        if let Some(action) = change.to_action(&spec) {
                            apply_action(&source, &spec, &mut mirror, action).await;
                            sender.send_replace(mirror.clone());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "⚠️ Mirror of {} missed {} changes, reloading snapshot",
                            spec.table.as_str(),
                            skipped
                        );
                        load_snapshot(&source, &spec, &mut mirror).await;
                        sender.send_replace(mirror.clone());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("Mirror of {} closed", spec.table.as_str());
    });

    MirrorHandle { receiver, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NOTIFY_KEY_COLUMNS;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        title: &'static str,
    }

    impl MirrorRow for Row {
        type Id = u32;

        fn row_id(&self) -> u32 {
            self.id
        }
    }

    fn row(id: u32, title: &'static str) -> Row {
        Row { id, title }
    }

    #[test]
    fn test_insert_then_update_leaves_one_row() {
        let mut mirror = RealtimeMirror::new();
        mirror.load_snapshot(vec![row(1, "first")]);
        mirror.apply(ChangeEvent::Insert(row(2, "draft")));
        mirror.apply(ChangeEvent::Update(row(2, "final")));

        assert_eq!(mirror.data, vec![row(1, "first"), row(2, "final")]);
    }

    #[test]
    fn test_update_preserves_position() {
        let mut mirror = RealtimeMirror::new();
        mirror.load_snapshot(vec![row(1, "a"), row(2, "b"), row(3, "c")]);
        mirror.apply(ChangeEvent::Update(row(2, "B")));

        assert_eq!(mirror.data, vec![row(1, "a"), row(2, "B"), row(3, "c")]);
    }

    #[test]
    fn test_delete_absent_id_is_noop() {
        let mut mirror = RealtimeMirror::new();
        mirror.load_snapshot(vec![row(1, "a")]);
        let before = mirror.clone();
        mirror.apply(ChangeEvent::Delete(42));

        assert_eq!(mirror, before);
    }

    #[test]
    fn test_duplicate_insert_is_deduplicated() {
        let mut mirror = RealtimeMirror::new();
        mirror.load_snapshot(vec![row(7, "from snapshot")]);
        mirror.apply(ChangeEvent::Insert(row(7, "from feed")));

        assert_eq!(mirror.data.len(), 1);
        assert_eq!(mirror.data[0].title, "from feed");
    }

    #[test]
    fn test_failed_snapshot_sets_error_and_empty_data() {
        let mut mirror: RealtimeMirror<Row> = RealtimeMirror::new();
        assert!(mirror.loading);
        mirror.fail("connection refused");

        assert!(mirror.data.is_empty());
        assert!(!mirror.loading);
        assert_eq!(mirror.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_mirror_spec_columns() {
        let user = Uuid::new_v4();
        let spec = MirrorSpec::new(MirrorTable::Assessments, user, None).unwrap();
        assert_eq!(spec.column, "user_id");

        let profile = MirrorSpec::new(MirrorTable::Profiles, user, None).unwrap();
        assert_eq!(profile.column, "id");

        assert!(MirrorSpec::new(MirrorTable::Assessments, user, Some("results")).is_err());
        assert!(MirrorSpec::new(MirrorTable::Messages, user, Some("session_id")).is_ok());
        assert!("users".parse::<MirrorTable>().is_err());
    }

    #[test]
    fn test_notifications_carry_every_filter_column() {
        let tables = [
            MirrorTable::Profiles,
            MirrorTable::BasicInformation,
            MirrorTable::ChatSessions,
            MirrorTable::Messages,
            MirrorTable::Reports,
            MirrorTable::Assessments,
            MirrorTable::DietPlans,
        ];
        for table in tables {
            for column in table.filter_columns() {
                assert!(NOTIFY_KEY_COLUMNS.contains(column), "{column} missing");
            }
        }
        assert!(NOTIFY_KEY_COLUMNS.contains(&"id"));
    }

    fn keys(id: Uuid, user: Uuid) -> Value {
        json!({"id": id.to_string(), "user_id": user.to_string()})
    }

    fn change(
        table: &str,
        event_type: ChangeType,
        record: Option<Value>,
        old_record: Option<Value>,
    ) -> RowChange {
        RowChange {
            table: table.to_string(),
            event_type,
            record,
            old_record,
        }
    }

    #[test]
    fn test_row_change_payload_decoding() {
        let user = Uuid::new_v4();
        let id = Uuid::new_v4();
        let payload = json!({
            "table": "reports",
            "type": "DELETE",
            "record": null,
            "old_record": keys(id, user)
        })
        .to_string();

        let change = RowChange::from_payload(&payload).unwrap();
        let spec = MirrorSpec::new(MirrorTable::Reports, user, None).unwrap();
        assert!(change.matches(&spec));
        assert_eq!(change.to_action(&spec), Some(RowAction::Remove(id.to_string())));

        let other = MirrorSpec::new(MirrorTable::Reports, Uuid::new_v4(), None).unwrap();
        assert!(!change.matches(&other));
    }

    #[test]
    fn test_insert_is_read_back_by_id() {
        let user = Uuid::new_v4();
        let id = Uuid::new_v4();
        let spec = MirrorSpec::new(MirrorTable::Messages, user, None).unwrap();
        let change = change("messages", ChangeType::Insert, Some(keys(id, user)), None);

        assert_eq!(change.to_action(&spec), Some(RowAction::Refresh(id, ChangeType::Insert)));
    }

    #[test]
    fn test_update_moving_row_out_of_filter_deletes_it() {
        let user = Uuid::new_v4();
        let id = Uuid::new_v4();
        let spec = MirrorSpec::new(MirrorTable::ChatSessions, user, None).unwrap();
        let change = change(
            "chat_sessions",
            ChangeType::Update,
            Some(keys(id, Uuid::new_v4())),
            Some(keys(id, user)),
        );

        assert!(change.matches(&spec));
        assert_eq!(change.to_action(&spec), Some(RowAction::Remove(id.to_string())));
    }

    struct FixedSource {
        snapshot: AppResult<Vec<Value>>,
        // full rows currently in the table, read back by id
        table: Vec<Value>,
        // published while the snapshot is being read
        concurrent: Option<(ChangeHub, RowChange)>,
    }

    impl FixedSource {
        fn new(snapshot: Vec<Value>, table: Vec<Value>) -> Self {
            Self {
                snapshot: Ok(snapshot),
                table,
                concurrent: None,
            }
        }
    }

    impl RowSource for FixedSource {
        async fn fetch(&self, _spec: &MirrorSpec) -> AppResult<Vec<Value>> {
            if let Some((hub, change)) = &self.concurrent {
                hub.publish(change.clone());
            }
            match &self.snapshot {
                Ok(rows) => Ok(rows.clone()),
                Err(e) => Err(AppError::Other(e.to_string())),
            }
        }

        async fn fetch_row(&self, _table: MirrorTable, id: Uuid) -> AppResult<Option<Value>> {
            let id = id.to_string();
            Ok(self.table.iter().find(|row| row.row_id() == id).cloned())
        }
    }

    async fn wait_until<F>(handle: &MirrorHandle, done: F) -> RealtimeMirror<Value>
    where
        F: Fn(&RealtimeMirror<Value>) -> bool,
    {
        let mut receiver = handle.receiver();
        let state = tokio::time::timeout(Duration::from_secs(2), receiver.wait_for(|s| done(s)))
            .await
            .expect("mirror did not settle")
            .expect("mirror task ended");
        state.clone()
    }

    #[tokio::test]
    async fn test_subscribe_reports_snapshot_error() {
        let hub = ChangeHub::default();
        let spec = MirrorSpec::new(MirrorTable::Assessments, Uuid::new_v4(), None).unwrap();
        let source = FixedSource {
            snapshot: Err(AppError::Other("relation does not exist".into())),
            table: Vec::new(),
            concurrent: None,
        };

        let handle = subscribe(&hub, source, spec);
        let state = wait_until(&handle, |s| !s.loading).await;

        assert!(state.data.is_empty());
        assert!(state.error.unwrap().contains("relation does not exist"));
    }

    #[tokio::test]
    async fn test_subscribe_snapshot_race_yields_single_row() {
        let hub = ChangeHub::default();
        let user = Uuid::new_v4();
        let [first, second, third] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let row = |id: Uuid| json!({"id": id.to_string(), "user_id": user.to_string(), "results": {}});
        let spec = MirrorSpec::new(MirrorTable::Assessments, user, None).unwrap();

        let mut source = FixedSource::new(
            vec![row(first), row(second)],
            vec![row(first), row(second), row(third)],
        );
        source.concurrent = Some((
            hub.clone(),
            change("assessments", ChangeType::Insert, Some(keys(second, user)), None),
        ));

        let handle = subscribe(&hub, source, spec);
        let state = wait_until(&handle, |s| !s.loading).await;
        assert_eq!(state.data.len(), 2);

        hub.publish(change("assessments", ChangeType::Insert, Some(keys(third, user)), None));
        let state = wait_until(&handle, |s| s.data.len() == 3).await;
        let ids: Vec<String> = state.data.iter().map(|r| r.row_id()).collect();
        assert_eq!(ids, vec![first.to_string(), second.to_string(), third.to_string()]);
    }

    #[tokio::test]
    async fn test_large_row_arrives_in_full() {
        let hub = ChangeHub::default();
        let user = Uuid::new_v4();
        let id = Uuid::new_v4();
        let content = "a".repeat(20_000);
        let full = json!({"id": id.to_string(), "user_id": user.to_string(), "content": content});
        let spec = MirrorSpec::new(MirrorTable::Messages, user, None).unwrap();
        let handle = subscribe(&hub, FixedSource::new(vec![], vec![full.clone()]), spec);
        wait_until(&handle, |s| !s.loading).await;

        let notification = change("messages", ChangeType::Insert, Some(keys(id, user)), None);
        let payload = json!({
            "table": notification.table,
            "type": "INSERT",
            "record": notification.record,
            "old_record": null
        })
        .to_string();
        assert!(payload.len() < 8000);
        hub.publish(RowChange::from_payload(&payload).unwrap());

        let state = wait_until(&handle, |s| !s.data.is_empty()).await;
        assert_eq!(state.data, vec![full]);
    }

    #[tokio::test]
    async fn test_row_gone_before_read_back_is_dropped() {
        let hub = ChangeHub::default();
        let user = Uuid::new_v4();
        let [kept, vanished] = [Uuid::new_v4(), Uuid::new_v4()];
        let row = |id: Uuid| json!({"id": id.to_string(), "user_id": user.to_string()});
        let spec = MirrorSpec::new(MirrorTable::ChatSessions, user, None).unwrap();
        let source = FixedSource::new(vec![row(kept), row(vanished)], vec![row(kept)]);
        let handle = subscribe(&hub, source, spec);
        wait_until(&handle, |s| !s.loading).await;

        hub.publish(change("chat_sessions", ChangeType::Update, Some(keys(vanished, user)), None));

        let state = wait_until(&handle, |s| s.data.len() == 1).await;
        assert_eq!(state.data, vec![row(kept)]);
    }

    #[tokio::test]
    async fn test_subscribe_ignores_other_users() {
        let hub = ChangeHub::default();
        let user = Uuid::new_v4();
        let [stranger_row, own_row] = [Uuid::new_v4(), Uuid::new_v4()];
        let stranger = Uuid::new_v4();
        let spec = MirrorSpec::new(MirrorTable::Reports, user, None).unwrap();
        let source = FixedSource::new(vec![], vec![keys(stranger_row, stranger), keys(own_row, user)]);
        let handle = subscribe(&hub, source, spec);
        wait_until(&handle, |s| !s.loading).await;

        hub.publish(change("reports", ChangeType::Insert, Some(keys(stranger_row, stranger)), None));
        hub.publish(change("reports", ChangeType::Insert, Some(keys(own_row, user)), None));

        let state = wait_until(&handle, |s| !s.data.is_empty()).await;
        assert_eq!(state.data.len(), 1);
        assert_eq!(state.data[0].row_id(), own_row.to_string());
    }
}
