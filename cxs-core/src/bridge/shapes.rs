//! The fixed callback shapes of the native library.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, LazyLock};

use super::{call, CallShape, PendingRegistry, Reclaim};
use crate::finalizer::OwnedHandle;
use crate::native::{
    CompletionCallback, HandleCallback, NativeApi, ReleaseFn, SerializeFn, StringCallback,
    ValueCallback, SUCCESS,
};
use crate::{BridgeError, BridgeResult, CommandHandle, NativeHandle};

const NO_HANDLE: &str = "no handle returned";
const NO_DATA_TO_SERIALIZE: &str = "no data to serialize";

fn handle_outcome(err: u32, handle: u32) -> BridgeResult<NativeHandle> {
    if err != SUCCESS {
        return Err(BridgeError::AsyncCompletion { code: err });
    }
    if handle == 0 {
        return Err(BridgeError::missing_payload(NO_HANDLE));
    }
    Ok(NativeHandle::from_raw(handle))
}

fn string_outcome(err: u32, payload: *const c_char) -> BridgeResult<String> {
    if err != SUCCESS {
        return Err(BridgeError::AsyncCompletion { code: err });
    }
    if payload.is_null() {
        return Err(BridgeError::missing_payload(NO_DATA_TO_SERIALIZE));
    }
    // Safety: non-null payloads are NUL-terminated strings that stay valid
    // for the duration of the callback; they are copied before returning.
    let payload = unsafe { CStr::from_ptr(payload) };
    payload
        .to_str()
        .map(str::to_owned)
        .map_err(|err| BridgeError::InvalidPayload(err.to_string()))
}

/// Releases a handle minted for a call nobody awaits any more.
fn release_orphan(release: ReleaseFn, kind: &'static str) -> Reclaim<NativeHandle> {
    Box::new(move |handle| {
        log::debug!("releasing {kind} handle {handle} minted for an abandoned call");
        drop(OwnedHandle::new(handle, release, kind));
    })
}

const fn code_outcome(err: u32) -> BridgeResult<()> {
    if err == SUCCESS {
        Ok(())
    } else {
        Err(BridgeError::AsyncCompletion { code: err })
    }
}

// ── Create ──────────────────────────────────────────────────────────────

enum Create {}

static CREATE_CALLBACKS: LazyLock<PendingRegistry<NativeHandle>> =
    LazyLock::new(|| PendingRegistry::new("create"));

extern "C" fn create_trampoline(command_handle: u32, err: u32, handle: u32) {
    CREATE_CALLBACKS.resolve(command_handle, handle_outcome(err, handle));
}

impl CallShape for Create {
    type Output = NativeHandle;
    type Callback = HandleCallback;

    fn registry() -> &'static PendingRegistry<NativeHandle> {
        &CREATE_CALLBACKS
    }

    fn trampoline() -> HandleCallback {
        create_trampoline
    }
}

/// Runs a native create call and returns the handle it mints.
///
/// `start` invokes the type-specific create entry point with the given
/// command handle and callback and returns its status code. If the returned
/// future is dropped first, the handle is released through `api` on arrival.
///
/// # Errors
///
/// Rejects with the entry point's status code, the callback's error code, or
/// [`BridgeError::MissingPayload`] if the callback delivers handle `0`.
pub async fn create<F>(api: &NativeApi, start: F) -> BridgeResult<NativeHandle>
where
    F: FnOnce(CommandHandle, HandleCallback) -> u32 + Send,
{
    let reclaim = release_orphan(api.release, api.kind);
    call::<Create, F>(None, Some(reclaim), start).await
}

// ── Serialize ───────────────────────────────────────────────────────────

enum Serialize {}

static SERIALIZE_CALLBACKS: LazyLock<PendingRegistry<String>> =
    LazyLock::new(|| PendingRegistry::new("serialize"));

extern "C" fn serialize_trampoline(command_handle: u32, err: u32, payload: *const c_char) {
    SERIALIZE_CALLBACKS.resolve(command_handle, string_outcome(err, payload));
}

impl CallShape for Serialize {
    type Output = String;
    type Callback = StringCallback;

    fn registry() -> &'static PendingRegistry<String> {
        &SERIALIZE_CALLBACKS
    }

    fn trampoline() -> StringCallback {
        serialize_trampoline
    }
}

/// Serializes the object behind `handle` to its durable state.
///
/// # Errors
///
/// Rejects with the entry point's status code, the callback's error code,
/// `"no data to serialize"` if the callback delivers a null payload, or
/// [`BridgeError::InvalidPayload`] if the payload is not UTF-8.
pub async fn serialize(
    serialize_fn: SerializeFn,
    handle: &Arc<OwnedHandle>,
) -> BridgeResult<String> {
    let raw = handle.handle().as_raw();
    call::<Serialize, _>(Some(Arc::clone(handle)), None, |command_handle, cb| {
        // Safety: `raw` is owned by `handle`, which stays alive until completion.
        unsafe { serialize_fn(command_handle.as_raw(), raw, Some(cb)) }
    })
    .await
}

// ── Deserialize ─────────────────────────────────────────────────────────

enum Deserialize {}

static DESERIALIZE_CALLBACKS: LazyLock<PendingRegistry<NativeHandle>> =
    LazyLock::new(|| PendingRegistry::new("deserialize"));

extern "C" fn deserialize_trampoline(command_handle: u32, err: u32, handle: u32) {
    DESERIALIZE_CALLBACKS.resolve(command_handle, handle_outcome(err, handle));
}

impl CallShape for Deserialize {
    type Output = NativeHandle;
    type Callback = HandleCallback;

    fn registry() -> &'static PendingRegistry<NativeHandle> {
        &DESERIALIZE_CALLBACKS
    }

    fn trampoline() -> HandleCallback {
        deserialize_trampoline
    }
}

/// Mints a new native handle from JSON-encoded durable state through
/// `api`'s deserialize entry point.
///
/// # Errors
///
/// Rejects with [`BridgeError::InvalidInput`] if `state` contains a NUL byte,
/// otherwise as [`create`] does.
pub async fn deserialize(api: &NativeApi, state: &str) -> BridgeResult<NativeHandle> {
    let state = CString::new(state)
        .map_err(|err| BridgeError::InvalidInput(format!("serialized state: {err}")))?;
    let deserialize_fn = api.deserialize;
    let reclaim = release_orphan(api.release, api.kind);
    call::<Deserialize, _>(None, Some(reclaim), |command_handle, cb| {
        // Safety: the library copies `state` before the entry point returns.
        unsafe { deserialize_fn(command_handle.as_raw(), state.as_ptr(), Some(cb)) }
    })
    .await
}

// ── Completion ──────────────────────────────────────────────────────────

enum Completion {}

static COMPLETION_CALLBACKS: LazyLock<PendingRegistry<()>> =
    LazyLock::new(|| PendingRegistry::new("completion"));

extern "C" fn completion_trampoline(command_handle: u32, err: u32) {
    COMPLETION_CALLBACKS.resolve(command_handle, code_outcome(err));
}

impl CallShape for Completion {
    type Output = ();
    type Callback = CompletionCallback;

    fn registry() -> &'static PendingRegistry<()> {
        &COMPLETION_CALLBACKS
    }

    fn trampoline() -> CompletionCallback {
        completion_trampoline
    }
}

/// Runs a native call whose callback reports only success or failure.
///
/// # Errors
///
/// Rejects with the entry point's status code or the callback's error code.
pub async fn complete<F>(keep_alive: Option<Arc<OwnedHandle>>, start: F) -> BridgeResult<()>
where
    F: FnOnce(CommandHandle, CompletionCallback) -> u32 + Send,
{
    call::<Completion, F>(keep_alive, None, start).await
}

// ── Value ───────────────────────────────────────────────────────────────

enum Value {}

static VALUE_CALLBACKS: LazyLock<PendingRegistry<u32>> =
    LazyLock::new(|| PendingRegistry::new("value"));

extern "C" fn value_trampoline(command_handle: u32, err: u32, value: u32) {
    VALUE_CALLBACKS.resolve(command_handle, code_outcome(err).map(|()| value));
}

impl CallShape for Value {
    type Output = u32;
    type Callback = ValueCallback;

    fn registry() -> &'static PendingRegistry<u32> {
        &VALUE_CALLBACKS
    }

    fn trampoline() -> ValueCallback {
        value_trampoline
    }
}

/// Runs a native call whose callback delivers a small integer. `0` is a valid value.
///
/// # Errors
///
/// Rejects with the entry point's status code or the callback's error code.
pub async fn value<F>(keep_alive: Option<Arc<OwnedHandle>>, start: F) -> BridgeResult<u32>
where
    F: FnOnce(CommandHandle, ValueCallback) -> u32 + Send,
{
    call::<Value, F>(keep_alive, None, start).await
}
