//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rssbot::feed::{Entry, FeedSource, FetchError};
use rssbot::poll::{PollContext, PollOptions, Poller};
use rssbot::storage::{
    Bookmark, Cursor, CursorStore, Database, NewUser, StoreError, Subscriber, SubscriptionStore,
    UserId,
};
use rssbot::transport::{DeliveryError, Notification, Transport};

pub const FEED: &str = "https://example.com/feed.xml";

pub fn entry(id: &str) -> Entry {
    Entry {
        id: id.to_string(),
        title: format!("Entry {id}"),
        link: Some(format!("https://example.com/posts/{id}")),
        published: None,
    }
}

/// Feed ids newest first, as a real feed lists them.
pub fn entries(ids: &[&str]) -> Vec<Entry> {
    ids.iter().map(|id| entry(id)).collect()
}

#[derive(Debug, Clone)]
pub enum Response {
    Entries(Vec<Entry>),
    Transient,
    Malformed,
}

#[derive(Default)]
struct Track {
    queue: VecDeque<Response>,
    last: Option<Response>,
}

/// A subscription change that lands while a fetch is in flight, after the
/// feed has been read but before the poller sees the result.
#[derive(Debug, Clone)]
pub enum MidFetch {
    Subscribe { user: UserId, alias: &'static str },
    Reactivate(UserId),
}

/// Plays back queued responses per URL in order; once the queue runs dry
/// the last response repeats.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<String, Track>>,
    mid_fetch: Mutex<HashMap<String, (Database, MidFetch)>>,
}

impl ScriptedSource {
    pub fn push(&self, url: &str, response: Response) {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(response);
    }

    pub fn serve(&self, url: &str, ids: &[&str]) {
        self.push(url, Response::Entries(entries(ids)));
    }

    pub fn fail(&self, url: &str) {
        self.push(url, Response::Transient);
    }

    /// Apply `change` to `db` during the next fetch of `url`.
    pub fn during_next_fetch(&self, url: &str, db: Database, change: MidFetch) {
        self.mid_fetch
            .lock()
            .unwrap()
            .insert(url.to_string(), (db, change));
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<Entry>, FetchError> {
        let response = {
            let mut script = self.script.lock().unwrap();
            let track = script.get_mut(url).ok_or(FetchError::HttpStatus(404))?;
            if let Some(next) = track.queue.pop_front() {
                track.last = Some(next);
            }
            track.last.clone()
        };

        let change = self.mid_fetch.lock().unwrap().remove(url);
        match change {
            Some((db, MidFetch::Subscribe { user, alias })) => {
                db.register_user(&NewUser::with_id(user)).await.unwrap();
                db.add_bookmark(user, url, alias).await.unwrap();
            }
            Some((db, MidFetch::Reactivate(user))) => {
                assert!(db.set_user_active(user, true).await.unwrap());
            }
            None => {}
        }

        match response {
            Some(Response::Entries(entries)) => Ok(entries),
            Some(Response::Transient) => Err(FetchError::HttpStatus(503)),
            Some(Response::Malformed) => Err(FetchError::Parse("not a feed".into())),
            None => Err(FetchError::Timeout),
        }
    }
}

/// Records every delivered notification; some users can be made unreachable.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(UserId, String)>>,
    blocked: Mutex<HashSet<UserId>>,
    flaky: Mutex<HashSet<UserId>>,
    attempts: Mutex<Vec<UserId>>,
}

impl RecordingTransport {
    pub fn block(&self, user: UserId) {
        self.blocked.lock().unwrap().insert(user);
    }

    pub fn make_flaky(&self, user: UserId) {
        self.flaky.lock().unwrap().insert(user);
    }

    pub fn heal(&self, user: UserId) {
        self.flaky.lock().unwrap().remove(&user);
    }

    /// `(user, entry id)` pairs in delivery order.
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, id)| id)
            .collect()
    }

    pub fn attempts_for(&self, user: UserId) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|u| **u == user)
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user: UserId, n: &Notification) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(user);
        if self.blocked.lock().unwrap().contains(&user) {
            return Err(DeliveryError::Permanent("Forbidden: bot was blocked by the user".into()));
        }
        if self.flaky.lock().unwrap().contains(&user) {
            return Err(DeliveryError::Transient("Too Many Requests".into()));
        }
        let id = n
            .title
            .strip_prefix("Entry ")
            .unwrap_or(&n.title)
            .to_string();
        self.sent.lock().unwrap().push((user, id));
        Ok(())
    }
}

/// A [`Database`] whose reads or writes can be switched off.
pub struct FlakyStore {
    pub db: Database,
    pub fail_reads: AtomicBool,
    pub fail_cursor_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            fail_reads: AtomicBool::new(false),
            fail_cursor_writes: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubscriptionStore for FlakyStore {
    async fn list_active_feed_urls(&self) -> Result<Vec<String>, StoreError> {
        self.db.list_active_feed_urls().await
    }

    async fn list_active_subscribers_of(&self, url: &str) -> Result<Vec<Subscriber>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.db.list_active_subscribers_of(url).await
    }

    async fn set_user_active(&self, user: UserId, active: bool) -> Result<bool, StoreError> {
        self.db.set_user_active(user, active).await
    }

    async fn seeding_watermark(&self) -> Result<i64, StoreError> {
        self.db.seeding_watermark().await
    }

    async fn mark_subscriptions_seeded(&self, url: &str, watermark: i64) -> Result<u64, StoreError> {
        self.db.mark_subscriptions_seeded(url, watermark).await
    }

    async fn get_bookmark(&self, user: UserId, alias: &str) -> Result<Option<Bookmark>, StoreError> {
        self.db.get_bookmark(user, alias).await
    }
}

#[async_trait]
impl CursorStore for FlakyStore {
    async fn load_cursor(&self, url: &str) -> Result<Option<Cursor>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.db.load_cursor(url).await
    }

    async fn save_cursor(&self, url: &str, cursor: &Cursor) -> Result<(), StoreError> {
        Self::check(&self.fail_cursor_writes)?;
        self.db.save_cursor(url, cursor).await
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub source: Arc<ScriptedSource>,
    pub transport: Arc<RecordingTransport>,
    pub poller: Poller,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(PollOptions::default()).await
    }

    pub async fn with_options(options: PollOptions) -> Self {
        let db = Database::open(":memory:").await.unwrap();
        let store = Arc::new(FlakyStore::new(db));
        let source = Arc::new(ScriptedSource::default());
        let transport = Arc::new(RecordingTransport::default());
        let poller = Poller::new(
            PollContext {
                store: store.clone(),
                cursors: store.clone(),
                source: source.clone(),
                transport: transport.clone(),
            },
            options,
        );
        Self {
            store,
            source,
            transport,
            poller,
        }
    }

    pub fn db(&self) -> &Database {
        &self.store.db
    }

    pub fn during_next_fetch(&self, url: &str, change: MidFetch) {
        self.source.during_next_fetch(url, self.db().clone(), change);
    }

    pub async fn subscribe(&self, user: UserId, url: &str, alias: &str) {
        self.db().register_user(&NewUser::with_id(user)).await.unwrap();
        self.db().add_bookmark(user, url, alias).await.unwrap();
    }

    pub async fn cursor_ids(&self, url: &str) -> Option<Vec<String>> {
        self.db()
            .load_cursor(url)
            .await
            .unwrap()
            .map(|c| c.ids().to_vec())
    }
}
