//! Pending operations keyed by command handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::finalizer::OwnedHandle;
use crate::{BridgeResult, CommandHandle};

/// Shared by every shape so a command handle identifies exactly one call.
static NEXT_COMMAND_HANDLE: AtomicU32 = AtomicU32::new(1);

fn next_command_handle() -> CommandHandle {
    loop {
        let raw = NEXT_COMMAND_HANDLE.fetch_add(1, Ordering::Relaxed);
        if raw != 0 {
            return CommandHandle(raw);
        }
    }
}

fn was_issued(raw: u32) -> bool {
    raw != 0 && raw < NEXT_COMMAND_HANDLE.load(Ordering::Relaxed)
}

/// Disposes of a successful outcome whose caller stopped waiting.
pub(crate) type Reclaim<T> = Box<dyn FnOnce(T) + Send>;

struct PendingOperation<T> {
    sender: oneshot::Sender<BridgeResult<T>>,
    /// Holds the handle the native call operates on until it completes.
    _keep_alive: Option<Arc<OwnedHandle>>,
    reclaim: Option<Reclaim<T>>,
}

/// In-flight calls of one shape awaiting their callback.
pub(crate) struct PendingRegistry<T> {
    shape: &'static str,
    pending: Mutex<HashMap<u32, PendingOperation<T>>>,
}

impl<T> PendingRegistry<T> {
    pub(crate) fn new(shape: &'static str) -> Self {
        Self {
            shape,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, PendingOperation<T>>> {
        // Entries stay consistent under poisoning: every mutation is a single
        // insert or remove.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a command handle and parks a waiter for it.
    ///
    /// `reclaim` receives the outcome if the call succeeds after its waiter
    /// was dropped.
    pub(crate) fn register(
        &self,
        keep_alive: Option<Arc<OwnedHandle>>,
        reclaim: Option<Reclaim<T>>,
    ) -> (CommandHandle, oneshot::Receiver<BridgeResult<T>>) {
        let command_handle = next_command_handle();
        let (sender, receiver) = oneshot::channel();
        self.lock().insert(
            command_handle.0,
            PendingOperation {
                sender,
                _keep_alive: keep_alive,
                reclaim,
            },
        );
        (command_handle, receiver)
    }

    /// Forgets a call the native library refused; no callback is expected.
    pub(crate) fn abandon(&self, command_handle: CommandHandle) {
        let entry = self.lock().remove(&command_handle.0);
        drop(entry);
    }

    /// Delivers the outcome of `command_handle` to its waiter.
    ///
    /// Only the first completion for a command handle is delivered. Later ones,
    /// and completions for handles never issued, are logged and dropped.
    pub(crate) fn resolve(&self, command_handle: u32, outcome: BridgeResult<T>) {
        let entry = self.lock().remove(&command_handle);
        match entry {
            Some(operation) => {
                log::trace!("{} command {command_handle} completed", self.shape);
                if let Err(undelivered) = operation.sender.send(outcome) {
                    log::debug!(
                        "{} command {command_handle} completed after its caller stopped waiting",
                        self.shape
                    );
                    if let (Ok(value), Some(reclaim)) = (undelivered, operation.reclaim) {
                        reclaim(value);
                    }
                }
            }
            None if was_issued(command_handle) => {
                log::warn!(
                    "ignoring repeated completion of {} command {command_handle}",
                    self.shape
                );
            }
            None => {
                log::error!(
                    "completion for unknown {} command handle {command_handle}",
                    self.shape
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, command_handle: u32) -> bool {
        self.lock().contains_key(&command_handle)
    }
}
