//! In-process stand-in for the native claim library, plus a concrete resource
//! type built on it.
//!
//! Entry points validate their arguments synchronously and complete on a
//! spawned thread, as the real library does.

#![allow(dead_code, missing_docs)]

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{LazyLock, Mutex, Once};
use std::thread;
use std::time::Duration;

use cxs_core::native::{
    CompletionCallback, HandleCallback, NativeApi, StringCallback, ValueCallback, SUCCESS,
};
use cxs_core::{
    deserialize_into, BridgeError, BridgeResult, Resource, ResourceBase, SourceIdentified,
    Versioned,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_ERROR: u32 = 1001;
pub const INVALID_CONNECTION_HANDLE: u32 = 1003;
pub const INVALID_OPTION: u32 = 1007;
pub const INVALID_ISSUER_CLAIM_HANDLE: u32 = 1053;

/// Attribute value that makes serialize complete slowly.
pub const SLOW_ATTRIBUTES: &str = "slow";
/// Connection for which the library reports completion of send offer twice.
pub const REPEATING_CONNECTION: u32 = 99;
/// State value the native library refuses to restore.
pub const CORRUPT_STATE: u32 = 255;

const NATIVE_DELAY: Duration = Duration::from_millis(10);
const SLOW_NATIVE_DELAY: Duration = Duration::from_millis(300);

static CLAIMS: LazyLock<Mutex<HashMap<u32, Value>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);
static RELEASED: Mutex<Vec<u32>> = Mutex::new(Vec::new());
static MINTED: Mutex<Vec<(String, u32)>> = Mutex::new(Vec::new());

pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("cxs_core=trace"))
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
        let _ = tracing_log::LogTracer::init();
    });
}

fn later(delay: Duration, f: impl FnOnce() + Send + 'static) {
    thread::spawn(move || {
        thread::sleep(delay);
        f();
    });
}

fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let value = unsafe { CStr::from_ptr(ptr) }.to_str().ok()?;
    Some(value.to_owned())
}

fn store(state: Value) -> u32 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
    let source_id = state["source_id"].as_str().unwrap_or_default().to_owned();
    MINTED.lock().unwrap().push((source_id, handle));
    CLAIMS.lock().unwrap().insert(handle, state);
    handle
}

fn lookup(handle: u32) -> Option<Value> {
    CLAIMS.lock().unwrap().get(&handle).cloned()
}

/// Makes the library forget `handle`, so releasing it fails.
pub fn forget(handle: u32) {
    CLAIMS.lock().unwrap().remove(&handle);
}

/// Every handle the library has minted for `source_id`.
pub fn minted_for(source_id: &str) -> Vec<u32> {
    MINTED
        .lock()
        .unwrap()
        .iter()
        .filter(|(minted, _)| minted == source_id)
        .map(|(_, handle)| *handle)
        .collect()
}

pub fn is_live(handle: u32) -> bool {
    CLAIMS.lock().unwrap().contains_key(&handle)
}

pub fn release_count(handle: u32) -> usize {
    RELEASED
        .lock()
        .unwrap()
        .iter()
        .filter(|released| **released == handle)
        .count()
}

pub extern "C" fn claim_create(
    command_handle: u32,
    source_id: *const c_char,
    claim_data: *const c_char,
    cb: Option<HandleCallback>,
) -> u32 {
    let Some(cb) = cb else { return INVALID_OPTION };
    let (Some(source_id), Some(claim_data)) = (read_str(source_id), read_str(claim_data))
    else {
        return INVALID_OPTION;
    };
    if claim_data.is_empty() {
        return INVALID_OPTION;
    }

    later(NATIVE_DELAY, move || {
        let handle = store(serde_json::json!({
            "source_id": source_id,
            "claim_attributes": claim_data,
            "state": 1,
        }));
        cb(command_handle, SUCCESS, handle);
    });
    SUCCESS
}

pub extern "C" fn claim_serialize(
    command_handle: u32,
    handle: u32,
    cb: Option<StringCallback>,
) -> u32 {
    let Some(cb) = cb else { return INVALID_OPTION };
    let Some(state) = lookup(handle) else {
        return INVALID_ISSUER_CLAIM_HANDLE;
    };
    let delay = if state["claim_attributes"] == SLOW_ATTRIBUTES {
        SLOW_NATIVE_DELAY
    } else {
        NATIVE_DELAY
    };

    later(delay, move || {
        let payload = CString::new(state.to_string()).unwrap();
        cb(command_handle, SUCCESS, payload.as_ptr());
    });
    SUCCESS
}

pub extern "C" fn claim_deserialize(
    command_handle: u32,
    json: *const c_char,
    cb: Option<HandleCallback>,
) -> u32 {
    let Some(cb) = cb else { return INVALID_OPTION };
    let Some(state) = read_str(json).and_then(|json| serde_json::from_str::<Value>(&json).ok())
    else {
        return INVALID_OPTION;
    };
    if state["source_id"].as_str().is_none_or(str::is_empty) {
        return INVALID_OPTION;
    }

    later(NATIVE_DELAY, move || {
        if state["state"] == CORRUPT_STATE {
            cb(command_handle, UNKNOWN_ERROR, 0);
        } else {
            cb(command_handle, SUCCESS, store(state));
        }
    });
    SUCCESS
}

pub extern "C" fn claim_release(handle: u32) -> u32 {
    RELEASED.lock().unwrap().push(handle);
    if CLAIMS.lock().unwrap().remove(&handle).is_some() {
        SUCCESS
    } else {
        INVALID_ISSUER_CLAIM_HANDLE
    }
}

pub extern "C" fn claim_update_state(
    command_handle: u32,
    handle: u32,
    cb: Option<ValueCallback>,
) -> u32 {
    let Some(cb) = cb else { return INVALID_OPTION };
    if !is_live(handle) {
        return INVALID_ISSUER_CLAIM_HANDLE;
    }

    later(NATIVE_DELAY, move || {
        let next = CLAIMS.lock().unwrap().get_mut(&handle).map(|state| {
            let next = state["state"].as_u64().unwrap_or(0) + 1;
            state["state"] = next.into();
            next
        });
        match next {
            Some(next) => cb(command_handle, SUCCESS, u32::try_from(next).unwrap()),
            None => cb(command_handle, INVALID_ISSUER_CLAIM_HANDLE, 0),
        }
    });
    SUCCESS
}

pub extern "C" fn claim_send_offer(
    command_handle: u32,
    handle: u32,
    connection_handle: u32,
    cb: Option<CompletionCallback>,
) -> u32 {
    let Some(cb) = cb else { return INVALID_OPTION };
    if !is_live(handle) {
        return INVALID_ISSUER_CLAIM_HANDLE;
    }
    if connection_handle == 0 {
        return INVALID_CONNECTION_HANDLE;
    }

    later(NATIVE_DELAY, move || {
        cb(command_handle, SUCCESS);
        if connection_handle == REPEATING_CONNECTION {
            cb(command_handle, SUCCESS);
        }
    });
    SUCCESS
}

/// Durable state of an issuer claim as the native library encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimData {
    pub source_id: String,
    #[serde(default)]
    pub claim_attributes: String,
    #[serde(default)]
    pub state: u32,
}

impl SourceIdentified for ClaimData {
    fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// A concrete resource type: an issuer-side claim.
pub struct IssuerClaim {
    base: ResourceBase,
    claim_attributes: String,
    issuer_did: String,
}

impl IssuerClaim {
    pub const SERIALIZATION_VERSION: &'static str = "1.0";

    pub fn new(source_id: &str, claim_attributes: &str, issuer_did: &str) -> Self {
        Self {
            base: ResourceBase::new(source_id, Self::NATIVE),
            claim_attributes: claim_attributes.to_owned(),
            issuer_did: issuer_did.to_owned(),
        }
    }

    pub async fn create(
        source_id: &str,
        claim_attributes: &str,
        issuer_did: &str,
    ) -> BridgeResult<Self> {
        let claim = Self::new(source_id, claim_attributes, issuer_did);
        claim.init().await?;
        Ok(claim)
    }

    pub async fn init(&self) -> BridgeResult<()> {
        let source_id = c_string(self.source_id())?;
        let claim_attributes = c_string(&self.claim_attributes)?;
        self.base
            .create(|command_handle, cb| {
                claim_create(
                    command_handle.as_raw(),
                    source_id.as_ptr(),
                    claim_attributes.as_ptr(),
                    Some(cb),
                )
            })
            .await?;
        Ok(())
    }

    pub async fn deserialize(data: &ClaimData, issuer_did: &str) -> BridgeResult<Self> {
        deserialize_into(data, issuer_did.to_owned()).await
    }

    pub async fn update_state(&self) -> BridgeResult<u32> {
        self.base
            .call_for_value(|command_handle, handle, cb| {
                claim_update_state(command_handle.as_raw(), handle.as_raw(), Some(cb))
            })
            .await
    }

    pub async fn send_offer(&self, connection_handle: u32) -> BridgeResult<()> {
        self.base
            .call(|command_handle, handle, cb| {
                claim_send_offer(
                    command_handle.as_raw(),
                    handle.as_raw(),
                    connection_handle,
                    Some(cb),
                )
            })
            .await
    }

    pub fn claim_attributes(&self) -> &str {
        &self.claim_attributes
    }

    pub fn issuer_did(&self) -> &str {
        &self.issuer_did
    }
}

fn c_string(value: &str) -> BridgeResult<CString> {
    CString::new(value).map_err(|err| BridgeError::InvalidInput(err.to_string()))
}

impl Resource for IssuerClaim {
    const NATIVE: NativeApi = NativeApi {
        kind: "issuer_claim",
        serialize: claim_serialize,
        deserialize: claim_deserialize,
        release: claim_release,
    };

    type Data = ClaimData;
    type Params = String;
    type Serialized = Versioned<ClaimData>;

    fn from_data(base: ResourceBase, data: &ClaimData, issuer_did: String) -> Self {
        Self {
            base,
            claim_attributes: data.claim_attributes.clone(),
            issuer_did,
        }
    }

    fn base(&self) -> &ResourceBase {
        &self.base
    }

    async fn serialize(&self) -> BridgeResult<Versioned<ClaimData>> {
        let data = self.base.serialize_native().await?;
        Ok(Versioned::new(
            Self::SERIALIZATION_VERSION,
            serde_json::from_str(&data)?,
        ))
    }
}
