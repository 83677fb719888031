use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::IconSource;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Terminal value for an app id. Never expires once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "src")]
pub enum IconState {
    /// `data:` URL ready to use as an image source.
    Resolved(String),
    /// Lookup failed; not found and transient errors both end here.
    Unavailable,
}

enum IconCommand {
    Get {
        app_id: String,
        reply: oneshot::Sender<Option<IconState>>,
    },
    Prefetch {
        app_id: String,
    },
    Subscribe {
        app_id: String,
        subscriber: u64,
        notify: oneshot::Sender<IconState>,
    },
    Unsubscribe {
        app_id: String,
        subscriber: u64,
    },
    #[cfg(test)]
    SubscriberCount {
        app_id: String,
        reply: oneshot::Sender<usize>,
    },
}

/// Process-wide icon cache.
///
/// All state lives in one worker task; handles talk to it over a channel, so
/// lookups, subscriptions and fetch completions are applied strictly one at
/// a time. At most one fetch is in flight across the whole cache, queued ids
/// are fetched in FIFO order and each id is fetched at most once for the
/// lifetime of the worker.
///
/// Create it once at startup and hand clones to every consumer. The worker
/// stops when the last handle is dropped.
#[derive(Clone)]
pub struct IconCache {
    commands: mpsc::UnboundedSender<IconCommand>,
    next_subscriber: Arc<AtomicU64>,
}

impl IconCache {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<S: IconSource>(source: S) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let worker = IconWorker::new(Arc::new(source), commands_rx);
        tokio::spawn(worker.run());

        Self {
            commands: commands_tx,
            next_subscriber: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, command: IconCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("icon cache worker has shut down"))
    }

    /// Cached value for `app_id`, or `None` if it is not known yet.
    /// Never starts a fetch.
    pub async fn get(&self, app_id: &str) -> Result<Option<IconState>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(IconCommand::Get {
            app_id: app_id.to_string(),
            reply: reply_tx,
        })?;
        reply_rx
            .await
            .map_err(|_| anyhow!("icon cache worker dropped the request"))
    }

    /// Queue a fetch for `app_id` without waiting for it.
    pub fn prefetch(&self, app_id: &str) -> Result<()> {
        self.send(IconCommand::Prefetch {
            app_id: app_id.to_string(),
        })
    }

    /// Register interest in `app_id`. The returned subscription completes
    /// once with the icon state; an already cached value is delivered
    /// straight away. Dropping it unsubscribes.
    pub fn subscribe(&self, app_id: &str) -> Result<IconSubscription> {
        let subscriber = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (notify_tx, notify_rx) = oneshot::channel();
        self.send(IconCommand::Subscribe {
            app_id: app_id.to_string(),
            subscriber,
            notify: notify_tx,
        })?;

        Ok(IconSubscription {
            app_id: app_id.to_string(),
            subscriber,
            receiver: Some(notify_rx),
            commands: self.commands.clone(),
        })
    }

    /// Subscribe and wait for the value.
    pub async fn resolve(&self, app_id: &str) -> Result<IconState> {
        self.subscribe(app_id)?
            .resolved()
            .await
            .ok_or_else(|| anyhow!("icon cache worker stopped before resolving {app_id}"))
    }

    #[cfg(test)]
    async fn subscriber_count(&self, app_id: &str) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(IconCommand::SubscriberCount {
            app_id: app_id.to_string(),
            reply: reply_tx,
        })
        .unwrap();
        reply_rx.await.unwrap()
    }
}

/// One waiter on an icon. Delivers at most one value.
pub struct IconSubscription {
    app_id: String,
    subscriber: u64,
    receiver: Option<oneshot::Receiver<IconState>>,
    commands: mpsc::UnboundedSender<IconCommand>,
}

impl IconSubscription {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Wait for the icon. `None` means the cache shut down first.
    pub async fn resolved(mut self) -> Option<IconState> {
        let receiver = self.receiver.as_mut()?;
        let state = receiver.await.ok();
        self.receiver = None;
        state
    }

    pub fn unsubscribe(self) {}
}

impl Drop for IconSubscription {
    fn drop(&mut self) {
        // Receiver is cleared once a value was delivered
        if self.receiver.is_some() {
            let _ = self.commands.send(IconCommand::Unsubscribe {
                app_id: std::mem::take(&mut self.app_id),
                subscriber: self.subscriber,
            });
        }
    }
}

type Fetched = (String, Result<String>);

struct IconWorker<S> {
    source: Arc<S>,
    commands: mpsc::UnboundedReceiver<IconCommand>,
    fetched_tx: mpsc::UnboundedSender<Fetched>,
    fetched_rx: mpsc::UnboundedReceiver<Fetched>,
    cache: HashMap<String, IconState>,
    /// Ids that are queued or being fetched.
    pending: HashSet<String>,
    queue: VecDeque<String>,
    subscribers: HashMap<String, HashMap<u64, oneshot::Sender<IconState>>>,
    in_flight: Option<String>,
}

impl<S: IconSource> IconWorker<S> {
    fn new(source: Arc<S>, commands: mpsc::UnboundedReceiver<IconCommand>) -> Self {
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();
        Self {
            source,
            commands,
            fetched_tx,
            fetched_rx,
            cache: HashMap::new(),
            pending: HashSet::new(),
            queue: VecDeque::new(),
            subscribers: HashMap::new(),
            in_flight: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some((app_id, result)) = self.fetched_rx.recv() => {
                    self.finish(app_id, result);
                }
            }
        }
        log_debug!("icon cache worker shutting down");
    }

    fn handle(&mut self, command: IconCommand) {
        match command {
            IconCommand::Get { app_id, reply } => {
                let _ = reply.send(self.cache.get(&app_id).cloned());
            }
            IconCommand::Prefetch { app_id } => self.request_icon(app_id),
            IconCommand::Subscribe {
                app_id,
                subscriber,
                notify,
            } => {
                if let Some(state) = self.cache.get(&app_id) {
                    let _ = notify.send(state.clone());
                    return;
                }
                self.subscribers
                    .entry(app_id.clone())
                    .or_default()
                    .insert(subscriber, notify);
                self.request_icon(app_id);
            }
            IconCommand::Unsubscribe { app_id, subscriber } => {
                if let Some(waiters) = self.subscribers.get_mut(&app_id) {
                    waiters.remove(&subscriber);
                    if waiters.is_empty() {
                        self.subscribers.remove(&app_id);
                    }
                }
            }
            #[cfg(test)]
            IconCommand::SubscriberCount { app_id, reply } => {
                let count = self.subscribers.get(&app_id).map_or(0, HashMap::len);
                let _ = reply.send(count);
            }
        }
    }

    fn request_icon(&mut self, app_id: String) {
        if self.cache.contains_key(&app_id) || self.pending.contains(&app_id) {
            return;
        }
        self.pending.insert(app_id.clone());
        self.queue.push_back(app_id);
        self.process_queue();
    }

    fn process_queue(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(app_id) = self.queue.pop_front() else {
            return;
        };

        log_debug!("fetching icon for {app_id}");
        self.in_flight = Some(app_id.clone());

        let source = Arc::clone(&self.source);
        let done = self.fetched_tx.clone();
        tokio::spawn(async move {
            let fetch = {
                let app_id = app_id.clone();
                tokio::spawn(async move { source.fetch_icon(&app_id).await })
            };
            // A panicking source still has to release the queue
            let result = match fetch.await {
                Ok(result) => result,
                Err(err) => Err(anyhow!("icon fetch for {app_id} did not complete: {err}")),
            };
            let _ = done.send((app_id, result));
        });
    }

    fn finish(&mut self, app_id: String, result: Result<String>) {
        let state = match result {
            Ok(base64_png) => IconState::Resolved(format!("data:image/png;base64,{base64_png}")),
            Err(err) => {
                log_warn!("failed to fetch icon for {app_id}: {err:#}");
                IconState::Unavailable
            }
        };

        self.cache.insert(app_id.clone(), state.clone());
        if let Some(waiters) = self.subscribers.remove(&app_id) {
            for (_, notify) in waiters {
                let _ = notify.send(state.clone());
            }
        }

        self.pending.remove(&app_id);
        self.in_flight = None;
        self.process_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Fetches block until the test hands out permits.
    struct GatedSource {
        gate: Semaphore,
        log: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl GatedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                log: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }

        fn fetched(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    struct SharedSource(Arc<GatedSource>);

    impl IconSource for SharedSource {
        async fn fetch_icon(&self, app_id: &str) -> Result<String> {
            let inner = &self.0;
            inner.log.lock().unwrap().push(app_id.to_string());
            let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_active.fetch_max(now, Ordering::SeqCst);

            inner.gate.acquire().await?.forget();
            inner.active.fetch_sub(1, Ordering::SeqCst);

            if app_id.starts_with("missing") {
                Err(anyhow!("no bundle for {app_id}"))
            } else {
                Ok(format!("png-{app_id}"))
            }
        }
    }

    fn gated_cache() -> (IconCache, Arc<GatedSource>) {
        let source = GatedSource::new();
        (IconCache::spawn(SharedSource(Arc::clone(&source))), source)
    }

    #[tokio::test]
    async fn concurrent_subscribers_share_one_fetch() {
        let (cache, source) = gated_cache();

        let subscriptions: Vec<IconSubscription> = (0..8)
            .map(|_| cache.subscribe("com.editor").unwrap())
            .collect();
        source.gate.add_permits(1);

        for subscription in subscriptions {
            assert_eq!(
                subscription.resolved().await,
                Some(IconState::Resolved("data:image/png;base64,png-com.editor".into()))
            );
        }
        assert_eq!(source.fetched(), vec!["com.editor".to_string()]);
    }

    #[tokio::test]
    async fn failures_are_cached_as_unavailable() {
        let (cache, source) = gated_cache();
        source.gate.add_permits(1);

        assert_eq!(cache.resolve("missing.app").await.unwrap(), IconState::Unavailable);
        assert_eq!(cache.resolve("missing.app").await.unwrap(), IconState::Unavailable);
        assert_eq!(
            cache.get("missing.app").await.unwrap(),
            Some(IconState::Unavailable)
        );
        assert_eq!(source.fetched().len(), 1);
    }

    #[tokio::test]
    async fn fetches_run_one_at_a_time_in_fifo_order() {
        let (cache, source) = gated_cache();

        let a = cache.subscribe("a").unwrap();
        let b = cache.subscribe("b").unwrap();
        cache.prefetch("c").unwrap();
        let a_again = cache.subscribe("a").unwrap();
        source.gate.add_permits(3);

        assert!(a.resolved().await.is_some());
        assert!(a_again.resolved().await.is_some());
        assert!(b.resolved().await.is_some());
        cache.resolve("c").await.unwrap();

        assert_eq!(source.fetched(), vec!["a", "b", "c"]);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_never_starts_a_fetch() {
        let (cache, source) = gated_cache();

        assert_eq!(cache.get("quiet.app").await.unwrap(), None);
        assert!(source.fetched().is_empty());

        source.gate.add_permits(1);
        cache.resolve("quiet.app").await.unwrap();
        assert!(matches!(
            cache.get("quiet.app").await.unwrap(),
            Some(IconState::Resolved(_))
        ));
    }

    struct PanickingSource;

    impl IconSource for PanickingSource {
        async fn fetch_icon(&self, app_id: &str) -> Result<String> {
            if app_id == "crashy.app" {
                panic!("icon decoder crashed");
            }
            Ok(format!("png-{app_id}"))
        }
    }

    #[tokio::test]
    async fn panicking_fetch_is_unavailable_and_queue_keeps_draining() {
        let cache = IconCache::spawn(PanickingSource);

        let crashy = cache.subscribe("crashy.app").unwrap();
        let after = cache.subscribe("calm.app").unwrap();

        let crashy = tokio::time::timeout(Duration::from_secs(2), crashy.resolved())
            .await
            .unwrap();
        let after = tokio::time::timeout(Duration::from_secs(2), after.resolved())
            .await
            .unwrap();

        assert_eq!(crashy, Some(IconState::Unavailable));
        assert_eq!(
            after,
            Some(IconState::Resolved("data:image/png;base64,png-calm.app".into()))
        );
        assert_eq!(
            cache.get("crashy.app").await.unwrap(),
            Some(IconState::Unavailable)
        );
    }

    #[tokio::test]
    async fn dropping_last_subscriber_clears_entry_but_not_fetch() {
        let (cache, source) = gated_cache();

        let first = cache.subscribe("term").unwrap();
        let second = cache.subscribe("term").unwrap();
        assert_eq!(cache.subscriber_count("term").await, 2);

        drop(first);
        assert_eq!(cache.subscriber_count("term").await, 1);
        second.unsubscribe();
        assert_eq!(cache.subscriber_count("term").await, 0);

        source.gate.add_permits(1);
        assert!(matches!(
            cache.resolve("term").await.unwrap(),
            IconState::Resolved(_)
        ));
        assert_eq!(source.fetched(), vec!["term".to_string()]);
    }
}
