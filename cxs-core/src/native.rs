//! Calling convention of the native resource library.
//!
//! Every entry point takes a command handle and an optional callback, returns
//! `0` when the call was accepted, and later invokes the callback exactly once
//! from one of its own threads. Callbacks borrow any pointer payload only for
//! the duration of the call.

use std::os::raw::c_char;

/// Status code meaning "accepted" for entry points and "succeeded" for callbacks.
pub const SUCCESS: u32 = 0;

// ── Callback signatures ─────────────────────────────────────────────────

/// Callback delivering a newly minted native handle.
pub type HandleCallback = extern "C" fn(command_handle: u32, err: u32, handle: u32);

/// Callback delivering a NUL-terminated string, or null when there is none.
pub type StringCallback =
    extern "C" fn(command_handle: u32, err: u32, payload: *const c_char);

/// Callback carrying only the completion code.
pub type CompletionCallback = extern "C" fn(command_handle: u32, err: u32);

/// Callback delivering a small integer (state, count, ...).
pub type ValueCallback = extern "C" fn(command_handle: u32, err: u32, value: u32);

// ── Per-resource entry points ───────────────────────────────────────────

/// `serialize(command_handle, handle, cb) -> status`
pub type SerializeFn = unsafe extern "C" fn(
    command_handle: u32,
    handle: u32,
    cb: Option<StringCallback>,
) -> u32;

/// `deserialize(command_handle, json, cb) -> status`
///
/// `json` is only valid for the duration of the call; the library copies it
/// before returning.
pub type DeserializeFn = unsafe extern "C" fn(
    command_handle: u32,
    json: *const c_char,
    cb: Option<HandleCallback>,
) -> u32;

/// `release(handle) -> status`
pub type ReleaseFn = unsafe extern "C" fn(handle: u32) -> u32;

/// The entry points shared by every resource type of the native library.
///
/// Creation takes type-specific arguments and is therefore supplied per call
/// rather than stored here.
#[derive(Debug, Clone, Copy)]
pub struct NativeApi {
    /// Name used in diagnostics (e.g. `"issuer_claim"`).
    pub kind: &'static str,
    /// Serializes the object behind a handle to its durable JSON state.
    pub serialize: SerializeFn,
    /// Mints a new handle from durable JSON state.
    pub deserialize: DeserializeFn,
    /// Frees the object behind a handle.
    pub release: ReleaseFn,
}
