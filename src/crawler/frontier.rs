//! Shared request frontier
//!
//! The frontier is an append-only sequence of discovered requests plus a
//! monotonic read cursor: entries are never reordered or removed, only
//! appended and claimed, which gives strict FIFO dispatch and makes "all
//! dispatched" a plain cursor-vs-length comparison. Because claimed
//! entries stay in the sequence, membership checks against it cover both
//! the done-set and the queue.

use crate::model::Request;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const STATUS_WAITING: u8 = 0;
const STATUS_RUNNING: u8 = 1;

struct FrontierInner {
    entries: Vec<Arc<Request>>,
    cursor: usize,
}

/// The coordination context shared by the coordinator and every worker.
///
/// The coordinator is the only writer of appends; workers only
/// read-then-advance the cursor. Claims are exclusive: an entry is handed
/// to exactly one worker.
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    work_available: Notify,
    shutdown: AtomicBool,
    worker_status: Vec<AtomicU8>,
}

impl Frontier {
    pub fn new(num_workers: usize) -> Self {
        Self {
            inner: Mutex::new(FrontierInner {
                entries: Vec::new(),
                cursor: 0,
            }),
            work_available: Notify::new(),
            shutdown: AtomicBool::new(false),
            worker_status: (0..num_workers).map(|_| AtomicU8::new(STATUS_RUNNING)).collect(),
        }
    }

    /// Appends requests and wakes blocked workers.
    pub fn append(&self, requests: Vec<Request>) {
        if requests.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.lock().expect("frontier lock poisoned");
            inner.entries.extend(requests.into_iter().map(Arc::new));
        }
        self.work_available.notify_waiters();
    }

    /// Seeds the dedup set with requests that are already done: they enter
    /// the sequence behind the cursor and are never dispatched.
    pub fn preload_done(&self, requests: Vec<Request>) {
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        inner.entries.extend(requests.into_iter().map(Arc::new));
        inner.cursor = inner.entries.len();
    }

    /// Blocks until an undispatched entry exists or shutdown is raised.
    ///
    /// `None` means shutdown: the worker must exit. The shutdown flag is
    /// only observed here, never mid-dispatch.
    pub async fn claim(&self, worker_id: usize) -> Option<Arc<Request>> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.set_status(worker_id, STATUS_WAITING);
                return None;
            }

            // register for wakeups before checking, so an append between
            // the check and the await is not missed
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().expect("frontier lock poisoned");
                if inner.cursor < inner.entries.len() {
                    let request = Arc::clone(&inner.entries[inner.cursor]);
                    inner.cursor += 1;
                    self.set_status(worker_id, STATUS_RUNNING);
                    return Some(request);
                }
            }

            self.set_status(worker_id, STATUS_WAITING);
            notified.await;
        }
    }

    /// Membership by dedup key over everything ever appended (done set
    /// included).
    pub fn contains(&self, request: &Request) -> bool {
        let inner = self.inner.lock().expect("frontier lock poisoned");
        inner.entries.iter().any(|r| r.as_ref() == request)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.work_available.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// True when no worker is actively dispatching. Together with a zero
    /// pending count this is the quiescence condition; checking only one
    /// of the two races against a worker that claimed but has not yet
    /// posted its result.
    pub fn all_workers_waiting(&self) -> bool {
        !self
            .worker_status
            .iter()
            .any(|s| s.load(Ordering::SeqCst) == STATUS_RUNNING)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("frontier lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatched(&self) -> usize {
        self.inner.lock().expect("frontier lock poisoned").cursor
    }

    fn set_status(&self, worker_id: usize, status: u8) {
        if let Some(slot) = self.worker_status.get(worker_id) {
            slot.store(status, Ordering::SeqCst);
        }
    }
}
