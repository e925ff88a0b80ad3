//! Turns "call now, callback later" native operations into awaitable results.
//!
//! A call is bridged in three steps: a command handle is allocated and a
//! waiter parked under it, the native entry point is invoked with that command
//! handle and the shape's static trampoline, and the caller awaits the waiter.
//! The trampoline runs on a native thread and wakes the waiter, which resumes
//! the caller on its own executor.
//!
//! Exactly one result reaches the caller:
//!
//! * a non-zero status from the entry point rejects immediately with
//!   [`BridgeError::ImmediateDispatch`] and any later callback is ignored;
//! * a non-zero callback code rejects with [`BridgeError::AsyncCompletion`];
//! * a successful callback without the expected payload rejects with
//!   [`BridgeError::MissingPayload`].
//!
//! Repeated callbacks for the same command handle are logged and dropped.
//! Dropping the returned future does not cancel the native operation: its
//! completion is still consumed, and any handle the call uses stays alive
//! until then. A handle minted by an abandoned create or deserialize is
//! released as soon as it arrives.
//!
//! Calls against the *same* native handle must not overlap; serializing them
//! is the caller's job.

use std::sync::Arc;

use crate::finalizer::OwnedHandle;
use crate::native::SUCCESS;
use crate::{BridgeError, BridgeResult, CommandHandle};

mod registry;
mod shapes;

use registry::{PendingRegistry, Reclaim};
pub use shapes::{complete, create, deserialize, serialize, value};

/// One native callback signature and the registry its trampoline resolves into.
pub(crate) trait CallShape {
    /// Success payload delivered to the caller.
    type Output: Send + 'static;
    /// Function pointer type handed to the native entry point.
    type Callback: Copy;

    fn registry() -> &'static PendingRegistry<Self::Output>;

    fn trampoline() -> Self::Callback;
}

/// Issues one native call of shape `S` and waits for its completion.
///
/// `start` receives the command handle and trampoline and returns the native
/// status code. `keep_alive` is held until the completion arrives, and
/// `reclaim` takes a successful outcome that arrives after the caller stopped
/// waiting.
pub(crate) async fn call<S, F>(
    keep_alive: Option<Arc<OwnedHandle>>,
    reclaim: Option<Reclaim<S::Output>>,
    start: F,
) -> BridgeResult<S::Output>
where
    S: CallShape,
    F: FnOnce(CommandHandle, S::Callback) -> u32 + Send,
{
    let registry = S::registry();
    let (command_handle, receiver) = registry.register(keep_alive, reclaim);

    let rc = start(command_handle, S::trampoline());
    if rc != SUCCESS {
        registry.abandon(command_handle);
        log::debug!("command {command_handle} rejected by native library with {rc}");
        return Err(BridgeError::ImmediateDispatch { code: rc });
    }

    receiver.await.map_err(|_| {
        BridgeError::Internal(format!(
            "completion channel for command {command_handle} closed"
        ))
    })?
}
