//! Round-robin collection of worker handles.
//!
//! The pool owns every live [`PoolMember`] and hands them out in strict
//! rotation: with `N` members, `N` consecutive calls to
//! [`WorkerPool::next`] visit each member once in insertion order.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use tracing::{debug, warn};

use crate::process::StopSignal;

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Orchestrator-assigned identity of a pooled worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(usize);

impl HandleId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something the pool can rotate, look up and signal.
pub trait PoolMember {
    /// Orchestrator-assigned identity.
    fn handle_id(&self) -> HandleId;

    /// Operating-system process id.
    fn process_id(&self) -> u32;

    /// Delivers `signal` to the member's process.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the signal cannot be delivered.
    fn signal(&mut self, signal: StopSignal) -> io::Result<()>;
}

/// Ordered worker handles with a rotation cursor at the front.
#[derive(Debug)]
pub struct WorkerPool<H> {
    handles: VecDeque<H>,
}

impl<H> Default for WorkerPool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> WorkerPool<H> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handles: VecDeque::new(),
        }
    }

    /// Removes every member and returns them in rotation order.
    pub fn drain(&mut self) -> Vec<H> {
        self.handles.drain(..).collect()
    }

    /// Number of pooled members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates the members in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.handles.iter()
    }
}

impl<H: PoolMember> WorkerPool<H> {
    /// Appends `handle` at the tail of the rotation.
    ///
    /// # Errors
    ///
    /// Hands `handle` back when a member with the same handle id is
    /// already pooled.
    pub fn add(&mut self, handle: H) -> Result<(), H> {
        if self.find_by_handle_id(handle.handle_id()).is_some() {
            return Err(handle);
        }
        debug!(
            target: POOL_TARGET,
            handle = %handle.handle_id(),
            pid = handle.process_id(),
            "worker added to pool"
        );
        self.handles.push_back(handle);
        Ok(())
    }

    /// Returns the least recently selected handle, moving it to the tail.
    #[expect(
        clippy::should_implement_trait,
        reason = "rotation never ends, so an Iterator impl would mislead"
    )]
    pub fn next(&mut self) -> Option<&mut H> {
        let handle = self.handles.pop_front()?;
        self.handles.push_back(handle);
        self.handles.back_mut()
    }

    /// Finds the member running as `process_id`.
    #[must_use]
    pub fn find_by_process_id(&self, process_id: u32) -> Option<&H> {
        self.handles
            .iter()
            .find(|handle| handle.process_id() == process_id)
    }

    /// Finds the member with `handle_id`.
    #[must_use]
    pub fn find_by_handle_id(&self, handle_id: HandleId) -> Option<&H> {
        self.handles
            .iter()
            .find(|handle| handle.handle_id() == handle_id)
    }

    /// Removes and returns the first member running as `process_id`.
    pub fn remove_by_process_id(&mut self, process_id: u32) -> Option<H> {
        let index = self
            .handles
            .iter()
            .position(|handle| handle.process_id() == process_id)?;
        self.handles.remove(index)
    }

    /// Removes and returns the member with `handle_id`.
    pub fn remove_by_handle_id(&mut self, handle_id: HandleId) -> Option<H> {
        let index = self
            .handles
            .iter()
            .position(|handle| handle.handle_id() == handle_id)?;
        self.handles.remove(index)
    }

    /// Sends `signal` to every member, then empties the pool.
    ///
    /// Delivery failures are logged; the pool is cleared regardless.
    pub fn kill_all(&mut self, signal: StopSignal) {
        for mut handle in self.handles.drain(..) {
            if let Err(error) = handle.signal(signal) {
                warn!(
                    target: POOL_TARGET,
                    handle = %handle.handle_id(),
                    pid = handle.process_id(),
                    ?signal,
                    error = %error,
                    "failed to signal worker"
                );
            }
        }
    }
}
