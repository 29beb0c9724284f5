//! In-process message passing along a tree of protocol instances
//!
//! [`launch`] runs one instance per tree node on its own thread. Each instance
//! owns a channel; messages are encoded on send and decoded on receive, and
//! arrive in order along each edge. Receives are bounded by the configured
//! timeout and abort as soon as the run is cancelled or any instance fails.

use crate::{config::ProtocolConfig, tree::Tree, Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A flag that aborts protocol runs
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every run watching this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the token was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Envelope {
    from: usize,
    bytes: Vec<u8>,
}

/// One protocol instance's view of the tree
pub struct TreeNodeInstance<M> {
    index: usize,
    tree: Arc<Tree>,
    config: ProtocolConfig,
    senders: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    pending: VecDeque<(usize, M)>,
    cancel: CancellationToken,
    abort: CancellationToken,
}

impl<M> TreeNodeInstance<M>
where
    M: Serialize + DeserializeOwned,
{
    /// Position of this node in the tree
    pub fn index(&self) -> usize {
        self.index
    }

    /// The tree
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Settings of the run
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Whether this node is the root
    pub fn is_root(&self) -> bool {
        self.index == 0
    }

    /// Whether this node has no children
    pub fn is_leaf(&self) -> bool {
        self.tree.is_leaf(self.index)
    }

    /// This node's parent, `None` for the root
    pub fn parent(&self) -> Option<usize> {
        self.tree.parent(self.index)
    }

    /// This node's children
    pub fn children(&self) -> Vec<usize> {
        self.tree.children(self.index)
    }

    /// Next node on the circuit
    pub fn circuit_next(&self) -> usize {
        self.tree.circuit_next(self.index)
    }

    /// Previous node on the circuit
    pub fn circuit_prev(&self) -> usize {
        self.tree.circuit_prev(self.index)
    }

    /// Sends a message to a node
    pub fn send_to(&self, to: usize, msg: &M) -> Result<()> {
        let bytes = unlynx_serde::serialize(msg)?;
        debug!(from = self.index, to, len = bytes.len(), "sending message");
        let sender = self.senders.get(to).ok_or(Error::Disconnected(to))?;
        sender
            .send(Envelope {
                from: self.index,
                bytes,
            })
            .map_err(|_| Error::Disconnected(to))
    }

    /// Sends a message to this node's parent
    pub fn send_to_parent(&self, msg: &M) -> Result<()> {
        let parent = self
            .parent()
            .ok_or(Error::InvalidTree("the root has no parent"))?;
        self.send_to(parent, msg)
    }

    /// Sends a message to every child of this node
    pub fn send_to_children(&self, msg: &M) -> Result<()> {
        for c in self.children() {
            self.send_to(c, msg)?;
        }
        Ok(())
    }

    fn poll(&mut self, deadline: Instant) -> Result<(usize, M)> {
        loop {
            if self.cancel.is_cancelled() || self.abort.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(node = self.index, "timed out waiting for a message");
                return Err(Error::Timeout);
            }
            match self.inbox.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
                Ok(env) => {
                    let msg = unlynx_serde::deserialize(&env.bytes)?;
                    debug!(node = self.index, from = env.from, "received message");
                    return Ok((env.from, msg));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Disconnected(self.index));
                }
            }
        }
    }

    /// Waits for the first message accepted by `pred`
    ///
    /// Other messages are kept for later receives.
    pub fn receive_where<F>(&mut self, pred: F) -> Result<(usize, M)>
    where
        F: Fn(usize, &M) -> bool,
    {
        if let Some(pos) = self.pending.iter().position(|(f, m)| pred(*f, m)) {
            if let Some(found) = self.pending.remove(pos) {
                return Ok(found);
            }
        }
        let deadline = Instant::now() + self.config.timeout();
        loop {
            let (from, msg) = self.poll(deadline)?;
            if pred(from, &msg) {
                return Ok((from, msg));
            }
            self.pending.push_back((from, msg));
        }
    }

    /// Waits for any message
    pub fn receive(&mut self) -> Result<(usize, M)> {
        self.receive_where(|_, _| true)
    }

    /// Waits for a message from a given node
    pub fn receive_from(&mut self, from: usize) -> Result<M> {
        self.receive_where(|f, _| f == from).map(|(_, m)| m)
    }

    /// Waits for one message from each child, in the order of the children
    pub fn receive_from_children(&mut self) -> Result<Vec<(usize, M)>> {
        let mut out = Vec::new();
        for c in self.children() {
            out.push((c, self.receive_from(c)?));
        }
        Ok(out)
    }
}

/// Passes a value once around the circuit, every node applying `step`
///
/// The root starts the round with `start` and gets back the value left by the
/// last node; the other nodes return `None`.
pub fn circuit_round<M, F>(
    node: &mut TreeNodeInstance<M>,
    start: Option<M>,
    mut step: F,
) -> Result<Option<M>>
where
    M: Serialize + DeserializeOwned,
    F: FnMut(M) -> Result<M>,
{
    if node.is_root() {
        let start = start.ok_or(Error::MissingInput("circuit start value"))?;
        let out = step(start)?;
        if node.tree().size() == 1 {
            return Ok(Some(out));
        }
        node.send_to(node.circuit_next(), &out)?;
        let prev = node.circuit_prev();
        node.receive_from(prev).map(Some)
    } else {
        let prev = node.circuit_prev();
        let msg = node.receive_from(prev)?;
        let out = step(msg)?;
        node.send_to(node.circuit_next(), &out)?;
        Ok(None)
    }
}

/// Runs `f` as one protocol instance per node of `tree`, on its own thread
///
/// Returns the instances' outputs in node order. If any instance fails, the
/// others are aborted and the first failure that is not an abort is returned.
pub fn launch<M, T, F>(
    tree: &Tree,
    config: &ProtocolConfig,
    cancel: &CancellationToken,
    f: F,
) -> Result<Vec<T>>
where
    M: Serialize + DeserializeOwned + Send,
    T: Send,
    F: Fn(&mut TreeNodeInstance<M>) -> Result<T> + Sync,
{
    let tree = Arc::new(tree.clone());
    let (senders, inboxes): (Vec<_>, Vec<_>) = (0..tree.size()).map(|_| mpsc::channel()).unzip();
    let abort = CancellationToken::new();

    let results: Vec<Result<T>> = thread::scope(|s| {
        let handles: Vec<_> = inboxes
            .into_iter()
            .enumerate()
            .map(|(index, inbox)| {
                let mut node = TreeNodeInstance {
                    index,
                    tree: tree.clone(),
                    config: *config,
                    senders: senders.clone(),
                    inbox,
                    pending: VecDeque::new(),
                    cancel: cancel.clone(),
                    abort: abort.clone(),
                };
                let f = &f;
                let abort = &abort;
                s.spawn(move || {
                    let r = f(&mut node);
                    if let Err(e) = &r {
                        if !e.is_cancelled() {
                            warn!(node = index, error = %e, "protocol instance failed");
                        }
                        abort.cancel();
                    }
                    r
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Err(Error::Panicked)))
            .collect()
    });

    let mut outputs = Vec::with_capacity(results.len());
    let mut failure: Option<Error> = None;
    for r in results {
        match r {
            Ok(t) => outputs.push(t),
            Err(e) => match &failure {
                Some(f) if !f.is_cancelled() || e.is_cancelled() => {}
                _ => failure = Some(e),
            },
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}
