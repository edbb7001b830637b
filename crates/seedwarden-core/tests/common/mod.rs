// In-memory doubles of every collaborator trait, shared by the
// integration tests.
#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use seedwarden_core::model::{FreeSpaceSource, ShareLimits, TorrentState};
use seedwarden_core::{
    ActivityDetail, ActivityRecord, AuditStore, BulkAction, ClientError, ClientProvider,
    CollectionId, DisplayNameStore, Engine, EngineConfig, NotificationSink, ProgramJob,
    ProgramRunner, Rule, RuleStore, RunNotification, StoreError, Torrent, TorrentClient,
    TorrentFile, TorrentHash,
};

// ── Torrent client ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UploadLimit(Vec<String>, i64),
    DownloadLimit(Vec<String>, i64),
    ShareLimits(Vec<String>),
    Bulk(Vec<String>, BulkAction),
    Category(Vec<String>, String),
    Location(Vec<String>, String),
    AddTags(Vec<String>, Vec<String>),
    RemoveTags(Vec<String>, Vec<String>),
}

fn names(hashes: &[TorrentHash]) -> Vec<String> {
    hashes.iter().map(ToString::to_string).collect()
}

#[derive(Default)]
pub struct MockClient {
    pub torrents: Mutex<Vec<Torrent>>,
    pub manifests: Mutex<HashMap<TorrentHash, Vec<TorrentFile>>>,
    pub free_space: Mutex<HashMap<FreeSpaceSource, u64>>,
    pub calls: Mutex<Vec<Call>>,
    pub manifest_requests: Mutex<Vec<Vec<TorrentHash>>>,
    /// Action names ("category", "pause", ...) that fail with a transport error.
    pub failing: Mutex<HashSet<&'static str>>,
    pub list_fails: AtomicBool,
    /// `list_torrents` never returns.
    pub list_hangs: AtomicBool,
    /// Delay applied to every mutating call.
    pub delay: Mutex<Option<Duration>>,
}

impl MockClient {
    pub fn with_torrents(torrents: Vec<Torrent>) -> Arc<Self> {
        let client = Self::default();
        *client.torrents.lock().unwrap() = torrents;
        Arc::new(client)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_free_space(&self, bytes: u64) {
        self.free_space
            .lock()
            .unwrap()
            .insert(FreeSpaceSource::ClientDefault, bytes);
    }

    pub fn fail(&self, action: &'static str) {
        self.failing.lock().unwrap().insert(action);
    }

    async fn mutate(
        &self,
        action: &'static str,
        call: Call,
        hashes: &[TorrentHash],
        apply: impl Fn(&mut Torrent),
    ) -> Result<(), ClientError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(action) {
            return Err(ClientError::Transport {
                message: format!("{action} refused"),
            });
        }
        self.calls.lock().unwrap().push(call);
        let mut torrents = self.torrents.lock().unwrap();
        for t in torrents.iter_mut().filter(|t| hashes.contains(&t.hash)) {
            apply(t);
        }
        Ok(())
    }
}

#[async_trait]
impl TorrentClient for MockClient {
    async fn list_torrents(&self) -> Result<Vec<Torrent>, ClientError> {
        if self.list_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(ClientError::Transport {
                message: "connection refused".into(),
            });
        }
        Ok(self.torrents.lock().unwrap().clone())
    }

    async fn file_manifests(
        &self,
        hashes: &[TorrentHash],
    ) -> Result<HashMap<TorrentHash, Vec<TorrentFile>>, ClientError> {
        self.manifest_requests.lock().unwrap().push(hashes.to_vec());
        let manifests = self.manifests.lock().unwrap();
        Ok(hashes
            .iter()
            .filter_map(|h| manifests.get(h).map(|m| (h.clone(), m.clone())))
            .collect())
    }

    async fn set_upload_limit(&self, hashes: &[TorrentHash], limit: i64) -> Result<(), ClientError> {
        self.mutate("upload_limit", Call::UploadLimit(names(hashes), limit), hashes, |t| {
            t.up_limit = limit;
        })
        .await
    }

    async fn set_download_limit(
        &self,
        hashes: &[TorrentHash],
        limit: i64,
    ) -> Result<(), ClientError> {
        self.mutate("download_limit", Call::DownloadLimit(names(hashes), limit), hashes, |t| {
            t.dl_limit = limit;
        })
        .await
    }

    async fn set_share_limits(
        &self,
        hashes: &[TorrentHash],
        limits: ShareLimits,
    ) -> Result<(), ClientError> {
        self.mutate("share_limits", Call::ShareLimits(names(hashes)), hashes, |t| {
            t.ratio_limit = limits.ratio_limit;
            t.seeding_time_limit = limits.seeding_time_limit;
            t.inactive_seeding_time_limit = limits.inactive_seeding_time_limit;
        })
        .await
    }

    async fn bulk_action(
        &self,
        hashes: &[TorrentHash],
        action: BulkAction,
    ) -> Result<(), ClientError> {
        let name = match action {
            BulkAction::Pause => "pause",
            BulkAction::Resume => "resume",
            BulkAction::Recheck => "recheck",
            BulkAction::Reannounce => "reannounce",
            BulkAction::Delete { .. } => "delete",
        };
        self.mutate(name, Call::Bulk(names(hashes), action), hashes, |t| match action {
            BulkAction::Pause => t.state = TorrentState::PausedUp,
            BulkAction::Resume => t.state = TorrentState::StalledUp,
            _ => {}
        })
        .await?;
        if matches!(action, BulkAction::Delete { .. }) {
            self.torrents
                .lock()
                .unwrap()
                .retain(|t| !hashes.contains(&t.hash));
        }
        Ok(())
    }

    async fn set_category(&self, hashes: &[TorrentHash], category: &str) -> Result<(), ClientError> {
        self.mutate("category", Call::Category(names(hashes), category.into()), hashes, |t| {
            t.category = category.into();
        })
        .await
    }

    async fn set_location(&self, hashes: &[TorrentHash], path: &str) -> Result<(), ClientError> {
        self.mutate("location", Call::Location(names(hashes), path.into()), hashes, |t| {
            t.save_path = path.into();
        })
        .await
    }

    async fn add_tags(&self, hashes: &[TorrentHash], tags: &[String]) -> Result<(), ClientError> {
        self.mutate("add_tags", Call::AddTags(names(hashes), tags.to_vec()), hashes, |t| {
            let mut current: Vec<String> = t.tag_list().into_iter().map(String::from).collect();
            current.extend(tags.iter().cloned());
            t.tags = current.join(", ");
        })
        .await
    }

    async fn remove_tags(&self, hashes: &[TorrentHash], tags: &[String]) -> Result<(), ClientError> {
        self.mutate("remove_tags", Call::RemoveTags(names(hashes), tags.to_vec()), hashes, |t| {
            let kept: Vec<String> = t
                .tag_list()
                .into_iter()
                .filter(|x| !tags.iter().any(|r| r == x))
                .map(String::from)
                .collect();
            t.tags = kept.join(", ");
        })
        .await
    }

    async fn free_space(&self, source: &FreeSpaceSource) -> Result<u64, ClientError> {
        self.free_space
            .lock()
            .unwrap()
            .get(source)
            .copied()
            .ok_or_else(|| ClientError::MissingData {
                message: "no reading".into(),
            })
    }
}

// ── Provider and stores ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockProvider {
    pub clients: Mutex<HashMap<CollectionId, Arc<MockClient>>>,
}

#[async_trait]
impl ClientProvider for MockProvider {
    async fn active_collections(&self) -> Result<Vec<CollectionId>, ClientError> {
        let mut ids: Vec<CollectionId> = self.clients.lock().unwrap().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn client(&self, collection: CollectionId) -> Result<Arc<dyn TorrentClient>, ClientError> {
        self.clients
            .lock()
            .unwrap()
            .get(&collection)
            .map(|c| Arc::clone(c) as Arc<dyn TorrentClient>)
            .ok_or(ClientError::UnknownCollection(collection))
    }
}

#[derive(Default)]
pub struct MemoryRules {
    pub rules: Mutex<HashMap<CollectionId, Vec<Rule>>>,
}

#[async_trait]
impl RuleStore for MemoryRules {
    async fn enabled_rules(&self, collection: CollectionId) -> Result<Vec<Rule>, StoreError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    pub records: Mutex<Vec<(i64, ActivityRecord)>>,
    pub details: Mutex<HashMap<i64, Vec<ActivityDetail>>>,
    pub prunes: Mutex<Vec<(DateTime<Utc>, usize)>>,
}

impl MemoryAudit {
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn details_of(&self, index: usize) -> Vec<ActivityDetail> {
        let id = self.records.lock().unwrap()[index].0;
        self.details
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditStore for MemoryAudit {
    async fn record(&self, record: &ActivityRecord) -> Result<i64, StoreError> {
        let mut records = self.records.lock().unwrap();
        let id = i64::try_from(records.len()).unwrap() + 1;
        records.push((id, record.clone()));
        Ok(id)
    }

    async fn attach_details(
        &self,
        record_id: i64,
        details: Vec<ActivityDetail>,
    ) -> Result<(), StoreError> {
        self.details.lock().unwrap().insert(record_id, details);
        Ok(())
    }

    async fn prune(&self, older_than: DateTime<Utc>, max_records: usize) -> Result<u64, StoreError> {
        self.prunes.lock().unwrap().push((older_than, max_records));
        Ok(0)
    }
}

#[derive(Default)]
pub struct MemoryNames(pub HashMap<String, String>);

#[async_trait]
impl DisplayNameStore for MemoryNames {
    async fn display_names(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    pub completed: Mutex<Vec<RunNotification>>,
    pub failed: Mutex<Vec<(CollectionId, String)>>,
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn run_completed(&self, notification: &RunNotification) {
        self.completed.lock().unwrap().push(notification.clone());
    }

    async fn run_failed(&self, collection: CollectionId, error: &str) {
        self.failed.lock().unwrap().push((collection, error.to_owned()));
    }
}

#[derive(Default)]
pub struct MemoryPrograms {
    pub jobs: Mutex<Vec<ProgramJob>>,
}

#[async_trait]
impl ProgramRunner for MemoryPrograms {
    async fn run(&self, job: ProgramJob) {
        self.jobs.lock().unwrap().push(job);
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub const COLLECTION: CollectionId = CollectionId(1);

pub struct Harness {
    pub engine: Engine,
    pub provider: Arc<MockProvider>,
    pub rules: Arc<MemoryRules>,
    pub audit: Arc<MemoryAudit>,
    pub notifier: Arc<MemoryNotifier>,
    pub programs: Arc<MemoryPrograms>,
    /// Wall clock in unix seconds.
    pub clock: Arc<AtomicI64>,
}

impl Harness {
    pub fn new(client: Arc<MockClient>, rules: Vec<Rule>) -> Self {
        Self::with_config(client, rules, EngineConfig::default())
    }

    pub fn with_config(client: Arc<MockClient>, rules: Vec<Rule>, config: EngineConfig) -> Self {
        let provider = Arc::new(MockProvider::default());
        provider.clients.lock().unwrap().insert(COLLECTION, client);
        let store = Arc::new(MemoryRules::default());
        store.rules.lock().unwrap().insert(COLLECTION, rules);
        let audit = Arc::new(MemoryAudit::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let programs = Arc::new(MemoryPrograms::default());
        let clock = Arc::new(AtomicI64::new(1_000_000));

        let tick = Arc::clone(&clock);
        let engine = Engine::builder(config, provider.clone(), store.clone(), audit.clone())
            .notifier(notifier.clone())
            .program_runner(programs.clone())
            .clock(move || Utc.timestamp_opt(tick.load(Ordering::SeqCst), 0).unwrap())
            .build();

        Self {
            engine,
            provider,
            rules: store,
            audit,
            notifier,
            programs,
            clock,
        }
    }

    pub fn advance(&self, secs: i64) {
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// A seeding torrent with its own content directory.
pub fn torrent(hash: &str, added_on: i64) -> Torrent {
    Torrent {
        hash: hash.into(),
        name: format!("Some.Release.{hash}.2021.1080p"),
        category: "movies".into(),
        save_path: "/data/movies".into(),
        content_path: format!("/data/movies/{hash}"),
        tracker: "https://tracker.example.org/announce".into(),
        state: TorrentState::StalledUp,
        size: 1_000,
        total_size: 1_000,
        ratio: 1.0,
        progress: 1.0,
        added_on,
        ..Torrent::default()
    }
}

pub fn file(name: &str, size: i64) -> TorrentFile {
    TorrentFile {
        name: name.into(),
        size,
    }
}
