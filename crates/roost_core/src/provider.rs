/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::accounts::AccountDirectory;
use crate::capability::{rules_for, AccessMode, CallerIdentity, PermissionsManager};
use crate::compose::{Composer, Digest, NotificationSurface};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::image_cache::{DirImageCache, ImageCache};
use crate::ledger::{Category, CategorySnapshot, LifecycleSignal, NotificationState, UnseenItem};
use crate::resource::{ResourceId, Route, Table};
use crate::store::{QueryArgs, TableBackend};
use chrono::Timelike;
use roost_protocol::{ProviderRequest, ProviderResponse, Record, Rows, Value, Verb};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_EVENT_CAPACITY: usize = 256;

type HourSource = Box<dyn Fn() -> u32 + Send + Sync>;

fn local_hour() -> u32 {
    chrono::Local::now().hour()
}

/// Single entry point for every resource. Each call resolves the address, checks the
/// caller, then touches the store.
pub struct DataProvider {
    store: Arc<dyn TableBackend>,
    permissions: PermissionsManager,
    state: NotificationState,
    notifier: ChangeNotifier,
    accounts: Arc<AccountDirectory>,
    composer: Composer,
    credentials: (String, String),
    hour: HourSource,
    /// Held from ledger mutation through surface post or cancel, so the surface
    /// always ends on the latest ledger state.
    publish: Mutex<()>,
}

impl DataProvider {
    pub fn new(
        store: Arc<dyn TableBackend>,
        permissions: PermissionsManager,
        composer: Composer,
        credentials: (String, String),
        event_capacity: usize,
    ) -> Self {
        let accounts = Arc::new(AccountDirectory::new());
        Self {
            store,
            permissions,
            state: NotificationState::new(),
            notifier: ChangeNotifier::new(event_capacity, accounts.clone()),
            accounts,
            composer,
            credentials,
            hour: Box::new(local_hour),
            publish: Mutex::new(()),
        }
    }

    pub fn from_config(
        cfg: &ProviderConfig,
        store: Arc<dyn TableBackend>,
        surface: Arc<dyn NotificationSurface>,
    ) -> anyhow::Result<Self> {
        let images: Arc<dyn ImageCache> = Arc::new(DirImageCache::new(cfg.image_cache_dir()?));
        let composer = Composer::new(cfg.notifications.clone(), surface, images);
        Ok(Self::new(
            store,
            cfg.permissions_manager(),
            composer,
            cfg.credentials(),
            cfg.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
        ))
    }

    /// Overrides the local-hour source used for quiet hours.
    pub fn with_hour_source(mut self, hour: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.hour = Box::new(hour);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn permissions(&self) -> &PermissionsManager {
        &self.permissions
    }

    pub fn notification_state(&self) -> &NotificationState {
        &self.state
    }

    pub fn apply(&self, signal: LifecycleSignal) {
        debug!(?signal, "lifecycle signal");
        self.state.apply(signal);
    }

    pub fn query(&self, caller: CallerIdentity, uri: &str, args: &QueryArgs) -> Result<Option<Rows>> {
        let route = Route::parse(uri);
        self.permissions
            .authorize(caller, route.resource, AccessMode::Read, args.projection.as_deref())?;
        match route.resource {
            ResourceId::Permissions => {
                let bits = self.permissions.permissions(caller).bits();
                Ok(Some(Rows::single(Record::new().with("permissions", i64::from(bits)))))
            }
            ResourceId::ConsumerKeySecret => {
                let (key, secret) = &self.credentials;
                Ok(Some(Rows::single(
                    Record::new()
                        .with("consumer_key", key.as_str())
                        .with("consumer_secret", secret.as_str()),
                )))
            }
            ResourceId::Table(_) => Ok(self.store.query(&route, args)?),
            r if r.is_conversation_view() => Ok(self.store.query(&route, args)?),
            _ => Ok(None),
        }
    }

    /// Returns the address of the new row, or `None` when nothing was stored.
    pub fn insert(&self, caller: CallerIdentity, uri: &str, values: &Record) -> Result<Option<String>> {
        let route = Route::parse(uri);
        self.permissions
            .authorize(caller, route.resource, AccessMode::Write, None)?;
        let Some(table) = self.writable_table(&route) else {
            return Ok(None);
        };
        let Some(row_id) = self.store.insert(table, values)? else {
            debug!(table = table.name(), "insert dropped by uniqueness rule");
            return Ok(None);
        };
        if route.notify {
            if table == Table::Statuses {
                self.state.add_home_unseen(1);
            }
            self.notifier.notify(&route);
            self.on_new_items(table, std::slice::from_ref(values));
        }
        Ok(Some(route.with_appended_id(row_id)))
    }

    pub fn bulk_insert(&self, caller: CallerIdentity, uri: &str, values: &[Record]) -> Result<usize> {
        let route = Route::parse(uri);
        self.permissions
            .authorize(caller, route.resource, AccessMode::Write, None)?;
        let Some(table) = self.writable_table(&route) else {
            return Ok(0);
        };
        let outcome = self.store.bulk_insert(table, values)?;
        if route.notify && !outcome.stored.is_empty() {
            if let Some(delta) = outcome.delta.filter(|_| table == Table::Statuses) {
                self.state.add_home_unseen(delta);
            }
            self.notifier.notify(&route);
            let stored = outcome.stored.iter().map(|&i| values[i].clone()).collect::<Vec<_>>();
            self.on_new_items(table, &stored);
        }
        Ok(outcome.inserted)
    }

    pub fn update(
        &self,
        caller: CallerIdentity,
        uri: &str,
        values: &Record,
        selection: Option<&str>,
        args: &[Value],
    ) -> Result<usize> {
        let route = Route::parse(uri);
        self.permissions
            .authorize(caller, route.resource, AccessMode::Write, None)?;
        let Some(table) = self.writable_table(&route) else {
            return Ok(0);
        };
        let changed = self.store.update(table, values, selection, args)?;
        if changed > 0 {
            self.notifier.notify(&route);
        }
        Ok(changed)
    }

    pub fn delete(&self, caller: CallerIdentity, uri: &str, selection: Option<&str>, args: &[Value]) -> Result<usize> {
        let route = Route::parse(uri);
        self.permissions
            .authorize(caller, route.resource, AccessMode::Write, None)?;
        if route.resource == ResourceId::Notifications {
            return Ok(self.clear_notification(&route));
        }
        let Some(table) = self.writable_table(&route) else {
            return Ok(0);
        };
        let removed = self.store.delete(table, selection, args)?;
        if removed > 0 {
            self.notifier.notify(&route);
        }
        Ok(removed)
    }

    /// JSON-facing dispatch. Errors become `ProviderResponse::Error`.
    pub fn handle(&self, req: ProviderRequest) -> ProviderResponse {
        let caller = CallerIdentity::new(req.caller_uid);
        let result = match req.verb {
            Verb::Query => {
                let args = QueryArgs {
                    projection: req.projection,
                    selection: req.selection,
                    selection_args: req.selection_args,
                    sort_order: req.sort_order,
                };
                self.query(caller, &req.uri, &args)
                    .map(|rows| ProviderResponse::Rows { rows })
            }
            Verb::Insert => {
                let values = req.values.into_iter().next().unwrap_or_default();
                self.insert(caller, &req.uri, &values)
                    .map(|uri| ProviderResponse::Inserted { uri })
            }
            Verb::BulkInsert => self
                .bulk_insert(caller, &req.uri, &req.values)
                .map(|n| ProviderResponse::Count { count: n as u64 }),
            Verb::Update => {
                let values = req.values.into_iter().next().unwrap_or_default();
                self.update(caller, &req.uri, &values, req.selection.as_deref(), &req.selection_args)
                    .map(|n| ProviderResponse::Count { count: n as u64 })
            }
            Verb::Delete => self
                .delete(caller, &req.uri, req.selection.as_deref(), &req.selection_args)
                .map(|n| ProviderResponse::Count { count: n as u64 }),
        };
        result.unwrap_or_else(|e| {
            if e.is_access_denied() {
                warn!(uid = caller.uid, uri = %req.uri, "{e}");
            } else {
                warn!(uid = caller.uid, uri = %req.uri, "provider call failed: {e:#}");
            }
            ProviderResponse::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            }
        })
    }

    fn writable_table(&self, route: &Route) -> Option<Table> {
        if rules_for(route.resource).read_only_view {
            debug!(resource = route.resource.name(), "write to read-only view ignored");
            return None;
        }
        let table = route.resource.table();
        if table.is_none() {
            debug!(resource = route.resource.name(), uri = route.as_str(), "write ignored");
        }
        table
    }

    /// `notifications` clears every category, `notifications/<category id>` one of them.
    /// Returns the number of categories cleared.
    fn clear_notification(&self, route: &Route) -> usize {
        let _publish = self.publish.lock().unwrap();
        match route.segments.as_slice() {
            [_] => {
                self.state.reset();
                for category in Category::ALL {
                    self.composer.cancel(category);
                }
                Category::ALL.len()
            }
            [_, id] => {
                let Some(category) = id.parse::<i64>().ok().and_then(Category::from_id) else {
                    return 0;
                };
                self.state.clear(category);
                self.composer.cancel(category);
                1
            }
            _ => 0,
        }
    }

    fn on_new_items(&self, table: Table, values: &[Record]) {
        let Some(category) = Category::for_table(table) else {
            return;
        };
        let _publish = self.publish.lock().unwrap();
        let snapshot = match category {
            Category::HomeTimeline => self.state.snapshot(category),
            _ => {
                let items = values
                    .iter()
                    .filter_map(|r| UnseenItem::from_record(category, r))
                    .collect::<Vec<_>>();
                if items.is_empty() {
                    return;
                }
                let (kept, snapshot) = self.state.record(category, items, |status| {
                    self.store.is_filtered(status).unwrap_or_else(|e| {
                        warn!(status_id = status.status_id, "filter lookup failed: {e:#}");
                        false
                    })
                });
                if kept == 0 {
                    return;
                }
                snapshot
            }
        };
        self.publish_digest(&snapshot);
    }

    fn publish_digest(&self, snapshot: &CategorySnapshot) -> Option<Digest> {
        let store = self.store.as_ref();
        let lookup = |id: i64| self.accounts.get(store, id);
        self.composer.publish(snapshot, &lookup, (self.hour)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountInfo;
    use crate::capability::Capability;
    use crate::compose::testing::{NoImages, RecordingSurface};
    use crate::config::NotificationConfig;
    use crate::events::ChangeKind;
    use crate::ledger::StatusItem;
    use crate::resource::content_uri;
    use crate::store::{BulkInsertOutcome, StoreResult, TableStore};
    use crate::compose::testing::SurfaceCall;
    use crate::compose::DigestStyle;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const HOST: u32 = 1000;
    const APP: u32 = 10_001;

    /// Counts every call before forwarding to a real store.
    struct SpyStore {
        inner: TableStore,
        calls: AtomicUsize,
    }

    impl SpyStore {
        fn new() -> Self {
            Self {
                inner: TableStore::open_in_memory().unwrap(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl TableBackend for SpyStore {
        fn query(&self, route: &Route, args: &QueryArgs) -> StoreResult<Option<Rows>> {
            self.hit();
            self.inner.query(route, args)
        }
        fn insert(&self, table: Table, values: &Record) -> StoreResult<Option<i64>> {
            self.hit();
            self.inner.insert(table, values)
        }
        fn bulk_insert(&self, table: Table, values: &[Record]) -> StoreResult<BulkInsertOutcome> {
            self.hit();
            self.inner.bulk_insert(table, values)
        }
        fn update(&self, table: Table, values: &Record, selection: Option<&str>, args: &[Value]) -> StoreResult<usize> {
            self.hit();
            self.inner.update(table, values, selection, args)
        }
        fn delete(&self, table: Table, selection: Option<&str>, args: &[Value]) -> StoreResult<usize> {
            self.hit();
            self.inner.delete(table, selection, args)
        }
        fn is_filtered(&self, status: &StatusItem) -> StoreResult<bool> {
            self.hit();
            self.inner.is_filtered(status)
        }
        fn account(&self, account_id: i64) -> StoreResult<Option<AccountInfo>> {
            self.hit();
            self.inner.account(account_id)
        }
    }

    struct Fixture {
        provider: DataProvider,
        store: Arc<SpyStore>,
        surface: Arc<RecordingSurface>,
    }

    fn fixture(config: NotificationConfig) -> Fixture {
        fixture_with_hour(config, || 12)
    }

    fn fixture_with_hour(config: NotificationConfig, hour: impl Fn() -> u32 + Send + Sync + 'static) -> Fixture {
        let store = Arc::new(SpyStore::new());
        let surface = Arc::new(RecordingSurface::default());
        let composer = Composer::new(config, surface.clone(), Arc::new(NoImages));
        let provider = DataProvider::new(
            store.clone(),
            PermissionsManager::new(HOST),
            composer,
            ("key".into(), "secret".into()),
            64,
        )
        .with_hour_source(hour);
        Fixture { provider, store, surface }
    }

    fn host() -> CallerIdentity {
        CallerIdentity::new(HOST)
    }

    fn app() -> CallerIdentity {
        CallerIdentity::new(APP)
    }

    fn status(account_id: i64, status_id: i64, screen_name: &str, text: &str) -> Record {
        Record::new()
            .with("account_id", account_id)
            .with("status_id", status_id)
            .with("status_timestamp", status_id)
            .with("screen_name", screen_name)
            .with("name", screen_name.to_uppercase())
            .with("text_plain", text)
    }

    fn message(account_id: i64, message_id: i64, sender: &str, text: &str) -> Record {
        Record::new()
            .with("account_id", account_id)
            .with("message_id", message_id)
            .with("message_timestamp", message_id)
            .with("sender_id", 77)
            .with("recipient_id", account_id)
            .with("sender_screen_name", sender)
            .with("text_plain", text)
    }

    /// Hour source whose first call parks the publishing thread until released.
    struct Gate {
        armed: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Gate {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let gate = Arc::new(Self {
                armed: AtomicBool::new(true),
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            });
            (gate, entered_rx, release_tx)
        }

        fn hour(&self) -> u32 {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.lock().unwrap().send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            12
        }
    }

    fn account(account_id: i64, screen_name: &str, name: &str) -> Record {
        Record::new()
            .with("account_id", account_id)
            .with("screen_name", screen_name)
            .with("name", name)
            .with("oauth_token", "tok")
    }

    #[test]
    fn denied_calls_never_reach_the_store() {
        let f = fixture(NotificationConfig::default());
        let statuses = content_uri("statuses");
        let inbox = content_uri("messages_inbox");

        let err = f.provider.query(app(), &statuses, &QueryArgs::default()).unwrap_err();
        assert!(err.is_access_denied());
        assert!(f.provider.insert(app(), &statuses, &status(1, 1, "a", "x")).is_err());
        assert!(f.provider.bulk_insert(app(), &statuses, &[status(1, 1, "a", "x")]).is_err());
        assert!(f
            .provider
            .update(app(), &statuses, &Record::new().with("is_favorite", 1), None, &[])
            .is_err());
        assert!(f.provider.delete(app(), &statuses, None, &[]).is_err());

        f.provider.permissions().grant(APP, Capability::READ | Capability::WRITE, false);
        assert!(f.provider.query(app(), &inbox, &QueryArgs::default()).is_err());
        assert!(f.provider.insert(app(), &content_uri("accounts"), &account(1, "a", "A")).is_err());
        assert_eq!(f.store.calls(), 0);
    }

    #[test]
    fn credential_fields_need_accounts_capability() {
        let f = fixture(NotificationConfig::default());
        f.provider.insert(host(), &content_uri("accounts"), &account(1, "me", "Me")).unwrap();
        f.provider.permissions().grant(APP, Capability::READ, false);
        let uri = content_uri("accounts");

        let args = QueryArgs {
            projection: Some(vec!["screen_name".into(), "oauth_token".into()]),
            ..Default::default()
        };
        let calls = f.store.calls();
        let err = f.provider.query(app(), &uri, &args).unwrap_err();
        assert_eq!(err.code(), "access_denied");
        assert_eq!(f.store.calls(), calls);

        let args = QueryArgs {
            projection: Some(vec!["screen_name".into()]),
            ..Default::default()
        };
        let rows = f.provider.query(app(), &uri, &args).unwrap().unwrap();
        assert_eq!(rows.rows[0].get_str("screen_name"), Some("me"));
    }

    #[test]
    fn bulk_insert_counts_only_stored_rows() {
        let f = fixture(NotificationConfig::default());
        let uri = content_uri("statuses");
        f.provider.insert(host(), &uri, &status(1, 1, "a", "x")).unwrap();
        assert_eq!(f.provider.notification_state().home_unseen(), 1);

        let batch = (1..=5).map(|i| status(1, i, "a", "x")).collect::<Vec<_>>();
        assert_eq!(f.provider.bulk_insert(host(), &uri, &batch).unwrap(), 5);
        assert_eq!(f.provider.notification_state().home_unseen(), 5);

        let quiet = format!("{uri}?notify=false");
        f.provider.bulk_insert(host(), &quiet, &[status(1, 9, "a", "x")]).unwrap();
        assert_eq!(f.provider.notification_state().home_unseen(), 5);
    }

    #[test]
    fn duplicate_single_insert_returns_no_address() {
        let f = fixture(NotificationConfig::default());
        let uri = content_uri("statuses");
        let first = f.provider.insert(host(), &uri, &status(1, 7, "a", "x")).unwrap();
        assert_eq!(first.as_deref(), Some("content://roost.provider/statuses/1"));
        assert_eq!(f.provider.insert(host(), &uri, &status(1, 7, "a", "x")).unwrap(), None);
        assert_eq!(f.provider.notification_state().home_unseen(), 1);
    }

    #[test]
    fn five_mentions_produce_one_list_digest() {
        let f = fixture(NotificationConfig::default());
        for (id, handle, name) in [(1, "me1", "One"), (2, "me2", "Two"), (3, "me3", "Three")] {
            f.provider.insert(host(), &content_uri("accounts"), &account(id, handle, name)).unwrap();
        }
        let batch = vec![
            status(1, 1, "ann", "a"),
            status(2, 2, "ben", "b"),
            status(3, 3, "cat", "c"),
            status(1, 4, "ann", "d"),
            status(1, 5, "ben", "e"),
        ];
        f.provider.bulk_insert(host(), &content_uri("mentions"), &batch).unwrap();

        let d = f.surface.last_digest(Category::Mentions.id()).unwrap();
        assert_eq!(d.title, "BEN and 2 others mentioned you");
        assert_eq!(d.lines.len(), 4);
        assert_eq!(d.more.as_deref(), Some("+1 more"));
        assert_eq!(d.summary.as_deref(), Some("One, Two, Three"));
    }

    #[test]
    fn self_mention_prefix_is_stripped() {
        let f = fixture(NotificationConfig::default());
        f.provider.insert(host(), &content_uri("accounts"), &account(1, "myhandle", "Me")).unwrap();
        f.provider
            .insert(host(), &content_uri("mentions"), &status(1, 10, "friend", "@myhandle thanks!"))
            .unwrap();
        let d = f.surface.last_digest(Category::Mentions.id()).unwrap();
        assert_eq!(d.body, "thanks!");
        assert_eq!(d.reply.unwrap().mentions[0], "friend");
    }

    #[test]
    fn filtered_mentions_are_not_announced() {
        let f = fixture(NotificationConfig::default());
        f.provider
            .insert(host(), &content_uri("filtered_users"), &Record::new().with("value", "spammer"))
            .unwrap();
        f.provider
            .insert(host(), &content_uri("mentions"), &status(1, 1, "Spammer", "buy"))
            .unwrap();
        assert!(f.provider.notification_state().snapshot(Category::Mentions).items.is_empty());
        assert!(f.surface.last_digest(Category::Mentions.id()).is_none());
    }

    #[test]
    fn deleting_notification_path_clears_and_cancels_once() {
        let f = fixture(NotificationConfig::default());
        f.provider
            .insert(host(), &content_uri("mentions"), &status(1, 1, "ann", "hi"))
            .unwrap();
        assert_eq!(f.provider.delete(host(), &content_uri("notifications/2"), None, &[]).unwrap(), 1);
        assert!(f.provider.notification_state().snapshot(Category::Mentions).is_empty());
        assert_eq!(f.surface.cancels(Category::Mentions.id()), 1);

        let (_, snap) = f.provider.notification_state().record(Category::Mentions, vec![], |_| false);
        assert!(snap.is_empty());
        assert_eq!(f.surface.cancels(Category::Mentions.id()), 1);

        assert_eq!(f.provider.delete(host(), &content_uri("notifications/9"), None, &[]).unwrap(), 0);
        assert_eq!(f.provider.delete(host(), &content_uri("notifications/2/x"), None, &[]).unwrap(), 0);
    }

    #[test]
    fn deleting_notifications_root_resets_every_category() {
        let f = fixture(NotificationConfig::default());
        f.provider.insert(host(), &content_uri("statuses"), &status(1, 1, "ann", "home")).unwrap();
        f.provider.insert(host(), &content_uri("mentions"), &status(1, 2, "ann", "hi")).unwrap();
        f.provider.insert(host(), &content_uri("messages_inbox"), &message(1, 3, "bob", "psst")).unwrap();

        assert_eq!(f.provider.delete(host(), &content_uri("notifications"), None, &[]).unwrap(), 3);
        let state = f.provider.notification_state();
        assert_eq!(state.home_unseen(), 0);
        for category in Category::ALL {
            assert!(state.snapshot(category).is_empty());
            assert_eq!(f.surface.cancels(category.id()), 1);
        }
    }

    #[test]
    fn overlapping_mention_batches_announce_stored_rows_only() {
        let f = fixture(NotificationConfig::default());
        let uri = content_uri("mentions");
        let batch = vec![status(1, 5, "ann", "hi"); 3];
        assert_eq!(f.provider.bulk_insert(host(), &uri, &batch).unwrap(), 3);

        let snap = f.provider.notification_state().snapshot(Category::Mentions);
        assert_eq!(snap.items.len(), 1);
        let d = f.surface.last_digest(Category::Mentions.id()).unwrap();
        assert_eq!(d.number, None);
        assert_eq!(d.style, DigestStyle::BigText);
        assert_eq!(f.surface.calls().len(), 1);

        f.provider.bulk_insert(host(), &uri, &batch).unwrap();
        assert_eq!(f.provider.notification_state().snapshot(Category::Mentions).items.len(), 1);
        assert_eq!(f.surface.calls().len(), 1);
    }

    #[test]
    fn overlapping_inbox_batches_announce_stored_rows_only() {
        let f = fixture(NotificationConfig::default());
        let uri = content_uri("messages_inbox");
        let batch = vec![message(1, 8, "bob", "psst"), message(1, 8, "bob", "psst"), message(1, 9, "bob", "again")];
        f.provider.bulk_insert(host(), &uri, &batch).unwrap();

        let snap = f.provider.notification_state().snapshot(Category::DirectMessages);
        assert_eq!(snap.items.len(), 2);
        assert_eq!(f.surface.last_digest(Category::DirectMessages.id()).unwrap().number, Some(2));

        f.provider.bulk_insert(host(), &uri, &batch[..2]).unwrap();
        assert_eq!(f.provider.notification_state().snapshot(Category::DirectMessages).items.len(), 2);
        assert_eq!(f.surface.calls().len(), 1);
    }

    #[test]
    fn later_digest_is_not_overwritten_by_slower_publisher() {
        let (gate, entered, release) = Gate::new();
        let hour_gate = gate.clone();
        let f = fixture_with_hour(NotificationConfig::default(), move || hour_gate.hour());
        let provider = Arc::new(f.provider);
        let uri = content_uri("mentions");

        let first = {
            let (provider, uri) = (provider.clone(), uri.clone());
            thread::spawn(move || provider.insert(host(), &uri, &status(1, 1, "ann", "one")).unwrap())
        };
        entered.recv().unwrap();
        let second = {
            let (provider, uri) = (provider.clone(), uri.clone());
            thread::spawn(move || provider.insert(host(), &uri, &status(1, 2, "ben", "two")).unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(f.surface.last_digest(Category::Mentions.id()).unwrap().number, Some(2));
        assert_eq!(provider.notification_state().snapshot(Category::Mentions).items.len(), 2);
    }

    #[test]
    fn clear_during_publish_leaves_notification_cancelled() {
        let (gate, entered, release) = Gate::new();
        let hour_gate = gate.clone();
        let f = fixture_with_hour(NotificationConfig::default(), move || hour_gate.hour());
        let provider = Arc::new(f.provider);

        let publisher = {
            let provider = provider.clone();
            thread::spawn(move || {
                provider
                    .insert(host(), &content_uri("mentions"), &status(1, 1, "ann", "one"))
                    .unwrap()
            })
        };
        entered.recv().unwrap();
        let clearer = {
            let provider = provider.clone();
            thread::spawn(move || {
                provider
                    .delete(host(), &content_uri("notifications/2"), None, &[])
                    .unwrap()
            })
        };
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
        publisher.join().unwrap();
        assert_eq!(clearer.join().unwrap(), 1);

        let calls = f.surface.calls();
        assert_eq!(calls.last(), Some(&SurfaceCall::Cancel(Category::Mentions.id())));
        assert!(provider.notification_state().snapshot(Category::Mentions).is_empty());
    }

    #[test]
    fn virtual_resources_answer_without_tables() {
        let f = fixture(NotificationConfig::default());
        f.provider.permissions().grant(APP, Capability::READ | Capability::ACCOUNTS, false);

        let rows = f.provider.query(app(), &content_uri("permissions"), &QueryArgs::default()).unwrap().unwrap();
        assert_eq!(rows.rows[0].get_i64("permissions"), Some(9));

        let rows = f
            .provider
            .query(app(), &content_uri("consumer_key_secret"), &QueryArgs::default())
            .unwrap()
            .unwrap();
        assert_eq!(rows.rows[0].get_str("consumer_secret"), Some("secret"));
        assert_eq!(f.store.calls(), 0);
    }

    #[test]
    fn unknown_and_view_writes_are_noops() {
        let f = fixture(NotificationConfig::default());
        assert_eq!(f.provider.insert(host(), &content_uri("nope"), &Record::new()).unwrap(), None);
        assert_eq!(
            f.provider.insert(host(), &content_uri("messages"), &Record::new()).unwrap(),
            None
        );
        assert_eq!(f.provider.delete(host(), &content_uri("messages_conversation/1/2"), None, &[]).unwrap(), 0);
        assert_eq!(
            f.provider.query(host(), "content://elsewhere/statuses", &QueryArgs::default()).unwrap(),
            None
        );
        assert_eq!(f.store.calls(), 0);
    }

    #[tokio::test]
    async fn writes_emit_change_events_unless_suppressed() {
        let f = fixture(NotificationConfig::default());
        let mut rx = f.provider.subscribe();
        let uri = content_uri("drafts");
        f.provider.insert(host(), &uri, &Record::new().with("text", "draft")).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::DraftsUpdated);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::DatabaseUpdated);

        f.provider
            .insert(host(), &format!("{uri}?notify=false"), &Record::new().with("text", "quiet"))
            .unwrap();
        assert!(rx.try_recv().is_err());

        assert_eq!(f.provider.delete(host(), &uri, Some("text = ?"), &["nothing".into()]).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn home_started_silences_alerts() {
        let f = fixture(NotificationConfig {
            sound: true,
            ..Default::default()
        });
        f.provider.apply(LifecycleSignal::HomeStarted);
        f.provider
            .insert(host(), &content_uri("mentions"), &status(1, 1, "ann", "hi"))
            .unwrap();
        assert!(f.surface.last_digest(Category::Mentions.id()).unwrap().alert.is_silent());

        f.provider.apply(LifecycleSignal::HomeStopped);
        f.provider
            .insert(host(), &content_uri("mentions"), &status(1, 2, "ann", "again"))
            .unwrap();
        let d = f.surface.last_digest(Category::Mentions.id()).unwrap();
        assert_eq!(d.alert.sound.as_deref(), Some("default"));
    }

    #[test]
    fn handle_maps_errors_to_codes() {
        let f = fixture(NotificationConfig::default());
        let resp = f.provider.handle(ProviderRequest {
            caller_uid: APP,
            verb: Verb::Query,
            uri: content_uri("statuses"),
            projection: None,
            selection: None,
            selection_args: vec![],
            sort_order: None,
            values: vec![],
        });
        assert!(matches!(resp, ProviderResponse::Error { ref code, .. } if code == "access_denied"));

        let resp = f.provider.handle(ProviderRequest {
            caller_uid: HOST,
            verb: Verb::BulkInsert,
            uri: content_uri("tabs"),
            projection: None,
            selection: None,
            selection_args: vec![],
            sort_order: None,
            values: vec![Record::new().with("name", "Home").with("type", "home")],
        });
        assert_eq!(resp, ProviderResponse::Count { count: 1 });

        let resp = f.provider.handle(ProviderRequest {
            caller_uid: HOST,
            verb: Verb::Query,
            uri: content_uri("tabs"),
            projection: Some(vec!["name; DROP TABLE tabs".into()]),
            selection: None,
            selection_args: vec![],
            sort_order: None,
            values: vec![],
        });
        assert!(matches!(resp, ProviderResponse::Error { ref code, .. } if code == "store_failure"));
    }
}
