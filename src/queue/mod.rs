use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// the Candidate struct is a single url waiting to be probed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Producer side of the work queue.
///
/// Candidates can only be added while this value is alive; [`WorkQueue::seal`]
/// consumes it and hands back the claim side, so nothing can be enqueued once
/// workers are running.
pub struct WorkQueue {
    tx: spmc::Sender<Candidate>,
    rx: spmc::Receiver<Candidate>,
    pending: Arc<AtomicUsize>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = spmc::channel::<Candidate>();
        Self {
            tx,
            rx,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn enqueue(&mut self, candidate: Candidate) {
        // the receiver half lives in self, so the channel can't be disconnected here
        if self.tx.send(candidate).is_ok() {
            self.pending.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the producer side and returns the handle workers claim from.
    pub fn seal(self) -> ClaimQueue {
        let WorkQueue { tx, rx, pending } = self;
        drop(tx);
        ClaimQueue { rx, pending }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl Extend<Candidate> for WorkQueue {
    fn extend<I: IntoIterator<Item = Candidate>>(&mut self, iter: I) {
        for candidate in iter {
            self.enqueue(candidate);
        }
    }
}

impl FromIterator<Candidate> for WorkQueue {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut queue = WorkQueue::new();
        queue.extend(iter);
        queue
    }
}

/// Consumer side of a sealed work queue. Cheap to clone, one clone per worker.
#[derive(Clone)]
pub struct ClaimQueue {
    rx: spmc::Receiver<Candidate>,
    pending: Arc<AtomicUsize>,
}

impl ClaimQueue {
    /// Takes the next candidate, or `None` once the queue is drained.
    ///
    /// The producer is gone before any claim happens, so an empty channel is a
    /// final state rather than a transient one.
    pub fn try_claim(&self) -> Option<Candidate> {
        match self.rx.try_recv() {
            Ok(candidate) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(candidate)
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_drained(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ClaimQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimQueue")
            .field("pending", &self.len())
            .finish()
    }
}
