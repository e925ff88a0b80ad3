//! Release of native handles tied to the lifetime of their owner.
//!
//! A handle is wrapped in an [`OwnedHandle`] as soon as the native library
//! hands it over. The release entry point runs from `Drop`, so it runs exactly
//! once, and only after the last strong reference is gone. In-flight native
//! calls hold such a reference, which keeps a handle alive while the library
//! may still be using it even if its owner was dropped in the meantime.

use std::sync::{Arc, OnceLock};

use crate::native::{ReleaseFn, SUCCESS};
use crate::{BridgeError, BridgeResult, NativeHandle};

/// A native handle that is released when dropped.
#[derive(Debug)]
pub struct OwnedHandle {
    handle: NativeHandle,
    release: ReleaseFn,
    kind: &'static str,
}

impl OwnedHandle {
    /// Takes ownership of `handle`; `release` will be invoked for it on drop.
    #[must_use]
    pub const fn new(handle: NativeHandle, release: ReleaseFn, kind: &'static str) -> Self {
        Self {
            handle,
            release,
            kind,
        }
    }

    /// Returns the wrapped handle.
    #[must_use]
    pub const fn handle(&self) -> NativeHandle {
        self.handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // Safety: the handle was minted by the library that supplied `release`
        // and is released nowhere else.
        let rc = unsafe { (self.release)(self.handle.as_raw()) };
        if rc == SUCCESS {
            log::trace!("released {} handle {}", self.kind, self.handle);
        } else {
            log::error!(
                "failed to release {} handle {}: native error {rc}",
                self.kind,
                self.handle
            );
        }
    }
}

/// Set-once slot associating a resource with the handle it will release.
///
/// Created empty together with its owner; filled exactly once when create or
/// deserialize completes.
#[derive(Debug)]
pub struct Finalizer {
    release: ReleaseFn,
    kind: &'static str,
    slot: OnceLock<Arc<OwnedHandle>>,
}

impl Finalizer {
    /// Registers `release` as the cleanup for whatever handle is set later.
    #[must_use]
    pub const fn new(release: ReleaseFn, kind: &'static str) -> Self {
        Self {
            release,
            kind,
            slot: OnceLock::new(),
        }
    }

    /// Stores the handle to release when this finalizer is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyInitialized`] if a handle was already set.
    /// `handle` is released immediately in that case, as nothing else owns it.
    pub fn set_handle(&self, handle: NativeHandle) -> BridgeResult<()> {
        let owned = Arc::new(OwnedHandle::new(handle, self.release, self.kind));
        self.slot.set(owned).map_err(|surplus| {
            log::warn!(
                "{} already holds handle {:?}; releasing surplus handle {}",
                self.kind,
                self.handle(),
                surplus.handle()
            );
            BridgeError::AlreadyInitialized
        })
    }

    /// The tracked handle, or `None` before one was set.
    #[must_use]
    pub fn handle(&self) -> Option<NativeHandle> {
        self.slot.get().map(|owned| owned.handle())
    }

    /// A strong reference that defers release until it is dropped too.
    #[must_use]
    pub fn keep_alive(&self) -> Option<Arc<OwnedHandle>> {
        self.slot.get().cloned()
    }
}
