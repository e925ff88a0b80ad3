//! The base every concrete native resource type is built on.
//!
//! A concrete type embeds a [`ResourceBase`] and implements [`Resource`]. The
//! base holds the caller's source identifier and, once create or deserialize
//! completes, the native handle, which is released when the base is dropped.
//!
//! ```
//! use std::os::raw::c_char;
//!
//! use cxs_core::native::{HandleCallback, NativeApi, StringCallback};
//! use cxs_core::{deserialize_into, BridgeResult, Resource, ResourceBase};
//! use cxs_core::resource::ResourceData;
//!
//! extern "C" fn serialize(command_handle: u32, _handle: u32, cb: Option<StringCallback>) -> u32 {
//!     cb.map_or(1007, |cb| {
//!         cb(command_handle, 0, c"{\"source_id\":\"alice42\"}".as_ptr());
//!         0
//!     })
//! }
//!
//! extern "C" fn deserialize(
//!     command_handle: u32,
//!     _json: *const c_char,
//!     cb: Option<HandleCallback>,
//! ) -> u32 {
//!     cb.map_or(1007, |cb| {
//!         cb(command_handle, 0, 42);
//!         0
//!     })
//! }
//!
//! extern "C" fn release(_handle: u32) -> u32 {
//!     0
//! }
//!
//! struct Connection {
//!     base: ResourceBase,
//! }
//!
//! impl Resource for Connection {
//!     const NATIVE: NativeApi = NativeApi { kind: "connection", serialize, deserialize, release };
//!     type Data = ResourceData;
//!     type Params = ();
//!     type Serialized = String;
//!
//!     fn from_data(base: ResourceBase, _data: &ResourceData, (): ()) -> Self {
//!         Self { base }
//!     }
//!
//!     fn base(&self) -> &ResourceBase {
//!         &self.base
//!     }
//!
//!     async fn serialize(&self) -> BridgeResult<String> {
//!         self.base.serialize_native().await
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let data: ResourceData = serde_json::from_str(r#"{"source_id":"alice42"}"#).unwrap();
//! let connection: Connection = deserialize_into(&data, ()).await.unwrap();
//! assert_eq!(connection.source_id(), "alice42");
//! assert_eq!(connection.handle().map(|handle| handle.as_raw()), Some(42));
//! # })
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bridge;
use crate::finalizer::{Finalizer, OwnedHandle};
use crate::native::{CompletionCallback, HandleCallback, NativeApi, ValueCallback};
use crate::{BridgeError, BridgeResult, CommandHandle, NativeHandle};

/// Serialized state that names the resource it belongs to.
pub trait SourceIdentified {
    /// The caller-supplied identifier of the resource.
    fn source_id(&self) -> &str;
}

/// Minimal serialized state: the source identifier plus whatever fields the
/// concrete type carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    /// Identifier of the resource.
    pub source_id: String,
    /// Remaining type-specific fields, passed through untouched.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SourceIdentified for ResourceData {
    fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// The externally visible serialized form of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Format version chosen by the concrete type.
    pub version: String,
    /// The state returned by the native serialize call.
    pub data: T,
}

impl<T> Versioned<T> {
    /// Wraps `data` under `version`.
    #[must_use]
    pub fn new(version: impl Into<String>, data: T) -> Self {
        Self {
            version: version.into(),
            data,
        }
    }
}

/// Shared state and operations of a native resource.
#[derive(Debug)]
pub struct ResourceBase {
    source_id: String,
    api: NativeApi,
    finalizer: Finalizer,
}

impl ResourceBase {
    /// Creates a base without a native handle.
    #[must_use]
    pub fn new(source_id: impl Into<String>, api: NativeApi) -> Self {
        Self {
            source_id: source_id.into(),
            api,
            finalizer: Finalizer::new(api.release, api.kind),
        }
    }

    /// The caller-supplied identifier; unaffected by serialization.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// The native handle, or `None` until create or deserialize completes.
    #[must_use]
    pub fn handle(&self) -> Option<NativeHandle> {
        self.finalizer.handle()
    }

    /// Whether a native handle is held.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle().is_some()
    }

    /// The native entry points of this resource type.
    #[must_use]
    pub const fn api(&self) -> &NativeApi {
        &self.api
    }

    /// Runs the native create call and takes ownership of the handle it mints.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadyInitialized`] if a handle is already held, or any
    /// rejection of the native call.
    pub async fn create<F>(&self, start: F) -> BridgeResult<NativeHandle>
    where
        F: FnOnce(CommandHandle, HandleCallback) -> u32 + Send,
    {
        if self.is_ready() {
            return Err(BridgeError::AlreadyInitialized);
        }
        let handle = bridge::create(&self.api, start).await?;
        self.finalizer.set_handle(handle)?;
        log::debug!("created {} {} with handle {handle}", self.api.kind, self.source_id);
        Ok(handle)
    }

    /// Returns the durable state the native library holds for this resource.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] before a handle is held, or any rejection
    /// of the native call.
    pub async fn serialize_native(&self) -> BridgeResult<String> {
        let handle = self.ready_handle("serialize")?;
        bridge::serialize(self.api.serialize, &handle).await
    }

    /// Runs a domain operation on this resource's handle that reports only
    /// success or failure.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] before a handle is held, or any rejection
    /// of the native call.
    pub async fn call<F>(&self, start: F) -> BridgeResult<()>
    where
        F: FnOnce(CommandHandle, NativeHandle, CompletionCallback) -> u32 + Send,
    {
        let owned = self.ready_handle("call")?;
        let handle = owned.handle();
        bridge::complete(Some(owned), |command_handle, cb| {
            start(command_handle, handle, cb)
        })
        .await
    }

    /// Runs a domain operation on this resource's handle that reports a small
    /// integer, such as a state.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] before a handle is held, or any rejection
    /// of the native call.
    pub async fn call_for_value<F>(&self, start: F) -> BridgeResult<u32>
    where
        F: FnOnce(CommandHandle, NativeHandle, ValueCallback) -> u32 + Send,
    {
        let owned = self.ready_handle("call")?;
        let handle = owned.handle();
        bridge::value(Some(owned), |command_handle, cb| {
            start(command_handle, handle, cb)
        })
        .await
    }

    async fn init_from_data(&self, state: &str) -> BridgeResult<()> {
        let handle = bridge::deserialize(&self.api, state).await?;
        self.finalizer.set_handle(handle)?;
        log::debug!(
            "deserialized {} {} into handle {handle}",
            self.api.kind,
            self.source_id
        );
        Ok(())
    }

    fn ready_handle(&self, operation: &str) -> BridgeResult<Arc<OwnedHandle>> {
        self.finalizer.keep_alive().ok_or_else(|| {
            BridgeError::InvalidState(format!(
                "cannot {operation} {} {} before create or deserialize completes",
                self.api.kind, self.source_id
            ))
        })
    }
}

/// Capabilities every concrete resource type provides.
pub trait Resource: Sized + Send + Sync {
    /// Native serialize, deserialize and release entry points of this type.
    const NATIVE: NativeApi;

    /// State accepted by [`deserialize_into`], JSON-encoded for the native library.
    type Data: Serialize + SourceIdentified + Sync;

    /// Extra constructor arguments not carried in [`Resource::Data`].
    type Params: Send;

    /// The externally visible serialized form, typically [`Versioned`].
    type Serialized;

    /// Builds an instance around `base`, which has no handle yet, restoring
    /// any type-specific fields from `data`.
    fn from_data(base: ResourceBase, data: &Self::Data, params: Self::Params) -> Self;

    /// The embedded base.
    fn base(&self) -> &ResourceBase;

    /// Produces the externally visible serialized form.
    ///
    /// Implementations are expected to build on [`ResourceBase::serialize_native`],
    /// which fails with [`BridgeError::InvalidState`] before the resource is ready.
    fn serialize(&self) -> impl Future<Output = BridgeResult<Self::Serialized>>;

    /// See [`ResourceBase::handle`].
    fn handle(&self) -> Option<NativeHandle> {
        self.base().handle()
    }

    /// See [`ResourceBase::source_id`].
    fn source_id(&self) -> &str {
        self.base().source_id()
    }
}

/// Builds a new `R` from serialized state, minting a fresh native handle.
///
/// The instance carries `data`'s source identifier; the whole of `data` is
/// JSON-encoded and handed to the native deserialize entry point.
///
/// # Errors
///
/// [`BridgeError::Serialization`] if `data` cannot be encoded, or any
/// rejection of the native call.
pub async fn deserialize_into<R: Resource>(
    data: &R::Data,
    params: R::Params,
) -> BridgeResult<R> {
    let state = serde_json::to_string(data)?;
    let resource = R::from_data(ResourceBase::new(data.source_id(), R::NATIVE), data, params);
    resource.base().init_from_data(&state).await?;
    Ok(resource)
}
