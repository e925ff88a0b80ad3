#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Adapter between a callback-based native resource library and awaitable Rust code.
//!
//! Every native operation is started synchronously, returns a status code, and
//! completes later by invoking an `extern "C"` callback from a native thread.
//! [`bridge`] turns that protocol into a single awaitable result, [`finalizer`]
//! ties each native handle to exactly one owner that releases it on drop, and
//! [`resource`] combines both into the base every concrete resource type builds on.

mod error;
pub use error::*;

mod handle;
pub use handle::*;

pub mod bridge;
pub mod finalizer;
pub mod logger;
pub mod native;
pub mod resource;

pub use finalizer::{Finalizer, OwnedHandle};
pub use native::NativeApi;
pub use resource::{
    deserialize_into, Resource, ResourceBase, ResourceData, SourceIdentified, Versioned,
};

uniffi::setup_scaffolding!("cxs_core");
