//! Crawl engine
//!
//! The crawler owns a dedup index (one entry per identity, carrying the
//! shortest known depth) and a LIFO stack of pending work. Any number of
//! workers share both behind a single mutex; the fetch is the only await
//! point while processing a work item.
//!
//! Workers pop the most recently queued item, fetch it, emit `NodeFound`,
//! enqueue timeline cross-references and followed textual references, and
//! emit one `ReferenceFound` per textual reference. A crawl drains when the
//! stack is empty and no fetch is in flight. `stop` is cooperative and only
//! observed between work items.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::{CrawlEvent, Error, Identity, NodeData, ReferenceParser, Result};

/// Source of node data, usually the GitHub API
#[async_trait]
pub trait NodeFetcher: Send + Sync {
    /// Fetch one issue or pull request
    async fn fetch_node(&self, identity: &Identity) -> Result<NodeData>;
}

/// A pending crawl task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// What to fetch
    pub identity: Identity,
    /// Who referenced it, if anyone
    pub source: Option<Identity>,
    /// Shortest known distance from a seed
    pub depth: u32,
}

impl WorkItem {
    /// A crawl root at depth 0
    pub fn seed(identity: Identity) -> Self {
        Self {
            identity,
            source: None,
            depth: 0,
        }
    }

    /// Work discovered from `source`
    pub fn derived(identity: Identity, source: &Identity, depth: u32) -> Self {
        Self {
            identity,
            source: Some(source.clone()),
            depth,
        }
    }
}

/// Counters describing the crawl index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    /// Identities ever queued
    pub tracked: usize,
    /// Waiting on the stack
    pub pending: usize,
    /// Being fetched or processed
    pub in_flight: usize,
    /// Processed (found or failed)
    pub done: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkStatus {
    Pending,
    InFlight,
    Done,
}

#[derive(Debug)]
struct Entry {
    work: WorkItem,
    status: WorkStatus,
}

enum Next {
    Work(WorkItem),
    Wait,
    Drained,
}

#[derive(Debug, Default)]
struct QueueState {
    index: HashMap<String, Entry>,
    stack: Vec<String>,
    in_flight: usize,
}

impl QueueState {
    fn next(&mut self) -> Next {
        while let Some(key) = self.stack.pop() {
            if let Some(entry) = self.index.get_mut(&key) {
                if entry.status == WorkStatus::Pending {
                    entry.status = WorkStatus::InFlight;
                    self.in_flight += 1;
                    return Next::Work(entry.work.clone());
                }
            }
        }

        if self.in_flight == 0 {
            Next::Drained
        } else {
            Next::Wait
        }
    }

    fn depth_of(&self, identity: &Identity) -> Option<u32> {
        self.index.get(&identity.key()).map(|entry| entry.work.depth)
    }
}

struct Shared {
    fetcher: Arc<dyn NodeFetcher>,
    parser: ReferenceParser,
    events: mpsc::UnboundedSender<CrawlEvent>,
    max_depth: Option<u32>,
    state: Mutex<QueueState>,
    wakeup: Notify,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
}

/// Deduplicating, depth-aware crawl queue with cooperative workers
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct Crawler {
    shared: Arc<Shared>,
}

impl Crawler {
    /// Create a crawler and the receiving end of its event channel
    ///
    /// Work deeper than `max_depth` is never queued.
    pub fn new(
        fetcher: Arc<dyn NodeFetcher>,
        parser: ReferenceParser,
        max_depth: Option<u32>,
    ) -> (Self, mpsc::UnboundedReceiver<CrawlEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            fetcher,
            parser,
            events,
            max_depth,
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            cancel: Mutex::new(None),
        };

        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    /// Queue work, or lower the depth of an identity already seen
    ///
    /// Returns true when the identity was new and pushed onto the stack.
    /// Known identities are never processed again.
    ///
    /// # Panics
    ///
    /// Panics if the identity has an empty owner or repo or a zero number.
    pub fn enqueue(&self, work: WorkItem) -> bool {
        assert!(
            work.identity.is_valid(),
            "enqueue of invalid identity {:?}",
            work.identity
        );

        if let Some(max_depth) = self.shared.max_depth {
            if work.depth > max_depth {
                trace!(
                    identity = %work.identity,
                    depth = work.depth,
                    max_depth,
                    "Beyond max depth"
                );
                return false;
            }
        }

        let key = work.identity.key();
        let mut state = self.lock_state();

        if let Some(entry) = state.index.get_mut(&key) {
            if entry.work.depth > work.depth {
                debug!(
                    identity = %key,
                    from = entry.work.depth,
                    to = work.depth,
                    "Lowering depth"
                );
                entry.work.depth = work.depth;
                entry.work.source = work.source;

                // In-flight entries pick the new depth up when they finish
                if entry.status == WorkStatus::Done {
                    self.emit(CrawlEvent::DepthLowered {
                        identity: entry.work.identity.clone(),
                        depth: work.depth,
                    });
                }
            }
            return false;
        }

        trace!(identity = %key, depth = work.depth, "Queued");
        state.index.insert(
            key.clone(),
            Entry {
                work,
                status: WorkStatus::Pending,
            },
        );
        state.stack.push(key);
        drop(state);

        self.shared.wakeup.notify_waiters();
        true
    }

    /// Current entry for an identity, if it was ever queued
    pub fn tracked(&self, identity: &Identity) -> Option<WorkItem> {
        self.lock_state()
            .index
            .get(&identity.key())
            .map(|entry| entry.work.clone())
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> CrawlStats {
        let state = self.lock_state();
        let done = state
            .index
            .values()
            .filter(|entry| entry.status == WorkStatus::Done)
            .count();
        let pending = state
            .index
            .values()
            .filter(|entry| entry.status == WorkStatus::Pending)
            .count();

        CrawlStats {
            tracked: state.index.len(),
            pending,
            in_flight: state.in_flight,
            done,
        }
    }

    /// Spawn `concurrency` workers on the current tokio runtime
    ///
    /// A run already in progress is cancelled first. Work left on the stack
    /// by a stopped run is picked up again.
    pub fn start(&self, concurrency: usize) -> CrawlRun {
        let cancel = Arc::new(AtomicBool::new(false));
        let previous = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&cancel));
        if let Some(previous) = previous {
            debug!("Cancelling previous crawl run");
            previous.store(true, Ordering::SeqCst);
            self.shared.wakeup.notify_waiters();
        }

        let workers = concurrency.max(1);
        info!(workers, "Starting crawl");

        let handles = (0..workers)
            .map(|worker| {
                let crawler = self.clone();
                let cancel = Arc::clone(&cancel);
                tokio::spawn(async move { crawler.worker(worker, cancel).await })
            })
            .collect();

        CrawlRun { handles }
    }

    /// Start and wait for the crawl to drain or be stopped
    pub async fn run(&self, concurrency: usize) -> Result<()> {
        self.start(concurrency).wait().await
    }

    /// Ask workers to exit after their current item
    pub fn stop(&self) {
        if let Some(cancel) = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            info!("Stopping crawl");
            cancel.store(true, Ordering::SeqCst);
        }
        self.shared.wakeup.notify_waiters();
    }

    async fn worker(&self, worker: usize, cancel: Arc<AtomicBool>) {
        debug!(worker, "Worker started");

        loop {
            // Registered before inspecting the stack so no wakeup is missed
            let notified = self.shared.wakeup.notified();

            if cancel.load(Ordering::SeqCst) {
                debug!(worker, "Worker cancelled");
                break;
            }

            let next = self.lock_state().next();
            match next {
                Next::Work(work) => self.process_work(work).await,
                Next::Wait => notified.await,
                Next::Drained => {
                    debug!(worker, "Queue drained");
                    break;
                }
            }
        }
    }

    async fn process_work(&self, work: WorkItem) {
        let mut in_flight = InFlight {
            crawler: self,
            work: &work,
            depth: work.depth,
        };

        debug!(identity = %work.identity, depth = work.depth, "Fetching node");
        let result = self.shared.fetcher.fetch_node(&work.identity).await;

        // Depth may have been lowered while the fetch was running
        let depth = self
            .lock_state()
            .depth_of(&work.identity)
            .unwrap_or(work.depth);
        in_flight.depth = depth;

        match result {
            Err(e) => {
                warn!(identity = %work.identity, error = %e, "Failed to fetch node");
                self.emit(CrawlEvent::NodeError {
                    identity: work.identity.clone(),
                    depth,
                    source: work.source.clone(),
                    error: e.to_string(),
                });
            }
            Ok(node) => {
                let node = Arc::new(node);
                self.emit(CrawlEvent::NodeFound {
                    identity: work.identity.clone(),
                    depth,
                    node: Arc::clone(&node),
                });
                self.discover(&work.identity, depth, &node);
            }
        }
    }

    fn discover(&self, current: &Identity, depth: u32, node: &NodeData) {
        for source in &node.timeline_sources {
            if source.is_valid() {
                self.enqueue(WorkItem::derived(source.clone(), current, depth + 1));
            } else {
                warn!(identity = %current, source = ?source, "Ignoring invalid timeline source");
            }
        }

        let texts = std::iter::once(node.body.as_str())
            .chain(node.comments.iter().map(|comment| comment.body.as_str()));

        for text in texts {
            for reference in self.shared.parser.get_references(current, text) {
                if reference.follow() {
                    self.enqueue(WorkItem::derived(
                        reference.mentioned().clone(),
                        current,
                        depth + 1,
                    ));
                }
                self.emit(CrawlEvent::ReferenceFound { reference });
            }
        }
    }

    fn finish(&self, identity: &Identity, reported_depth: u32) {
        let mut state = self.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);

        if let Some(entry) = state.index.get_mut(&identity.key()) {
            entry.status = WorkStatus::Done;
            if entry.work.depth < reported_depth {
                self.emit(CrawlEvent::DepthLowered {
                    identity: identity.clone(),
                    depth: entry.work.depth,
                });
            }
        }

        let drained = state.stack.is_empty() && state.in_flight == 0;
        drop(state);

        if drained {
            info!("Crawl queue drained");
            self.shared.wakeup.notify_waiters();
        }
    }

    fn emit(&self, event: CrawlEvent) {
        if self.shared.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a popped item done when processing ends, including by panic
///
/// Children are enqueued before the guard drops, so other workers never
/// observe a drained queue while discovery is still running.
struct InFlight<'a> {
    crawler: &'a Crawler,
    work: &'a WorkItem,
    depth: u32,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(identity = %self.work.identity, "Processing panicked");
            self.crawler.emit(CrawlEvent::NodeError {
                identity: self.work.identity.clone(),
                depth: self.depth,
                source: self.work.source.clone(),
                error: "fetch panicked".to_string(),
            });
        }
        self.crawler.finish(&self.work.identity, self.depth);
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("max_depth", &self.shared.max_depth)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Handle on the workers of one `start` call
#[derive(Debug)]
pub struct CrawlRun {
    handles: Vec<JoinHandle<()>>,
}

impl CrawlRun {
    /// Number of workers in this run
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    pub async fn wait(self) -> Result<()> {
        let mut failures = 0;
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Crawl worker panicked");
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(Error::Other(format!("{} crawl worker(s) panicked", failures)));
        }
        Ok(())
    }
}
