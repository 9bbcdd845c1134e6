#![allow(clippy::missing_safety_doc)]

//! C ABI over `patho_engine_core` for non-Rust presentation layers.
//!
//! Configuration and requests go in as UTF-8 JSON; evaluations come back as
//! owned JSON byte buffers that the caller returns via `pe_bytes_free`.

use std::ptr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use patho_engine_core::{presets, AnalyzerResult, DiagnosticEngine, EngineError, RiskFactors};

/// FFI ABI version for patho_engine_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const PE_FFI_VERSION: u32 = 1;

pub const PE_OK: i32 = 0;
pub const PE_ERR_NULL: i32 = -1;
pub const PE_ERR_UTF8: i32 = -2;
pub const PE_ERR_REQUEST: i32 = -3;
pub const PE_ERR_AGGREGATION: i32 = -4;
pub const PE_ERR_VALUE: i32 = -5;
pub const PE_ERR_CONFIG: i32 = -6;
pub const PE_ERR_ENCODE: i32 = -7;

#[no_mangle]
pub extern "C" fn pe_ffi_version() -> u32 {
    PE_FFI_VERSION
}

/// Opaque handle exposed over FFI.
pub struct PeEngine {
    inner: DiagnosticEngine,
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PeStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl PeStr {
    unsafe fn as_str<'a>(&self) -> Result<&'a str, i32> {
        if self.ptr.is_null() {
            return Err(PE_ERR_NULL);
        }
        let bytes = std::slice::from_raw_parts(self.ptr, self.len);
        std::str::from_utf8(bytes).map_err(|_| PE_ERR_UTF8)
    }
}

/// Owned byte buffer.
#[repr(C)]
pub struct PeBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl PeBytes {
    fn empty() -> Self {
        PeBytes {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let mut boxed = buf.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        PeBytes { ptr, len }
    }
}

/// Evaluation result (FFI-safe).
///
/// On success `rc == PE_OK` and `json` holds the evaluation. On a run error
/// `json` holds `{"error": ..., "message": ...}`. Free `json` either way.
#[repr(C)]
pub struct PeEvaluation {
    pub rc: i32,
    pub json: PeBytes,
}

#[derive(Deserialize)]
struct EvaluateRequest {
    results: Vec<AnalyzerResult>,
    #[serde(default)]
    risk_factors: RiskFactors,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn error_json(rc: i32, kind: &str, message: String) -> PeEvaluation {
    let body = serde_json::to_vec(&ErrorBody { error: kind, message }).unwrap_or_default();
    PeEvaluation {
        rc,
        json: PeBytes::from_vec(body),
    }
}

/// Install a global `tracing` subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_level` (e.g. "info"), or "warn"
/// when that is null. Returns `PE_OK`, or `PE_ERR_CONFIG` if a subscriber is
/// already installed.
#[no_mangle]
pub unsafe extern "C" fn pe_init_tracing(default_level: PeStr) -> i32 {
    let level = default_level.as_str().unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match fmt().with_env_filter(filter).with_target(true).try_init() {
        Ok(()) => PE_OK,
        Err(_) => PE_ERR_CONFIG,
    }
}

fn into_handle(engine: DiagnosticEngine) -> *mut PeEngine {
    Box::into_raw(Box::new(PeEngine { inner: engine }))
}

/// Create an engine from a JSON `EngineConfig`. Returns null on any error.
#[no_mangle]
pub unsafe extern "C" fn pe_engine_new(config_json: PeStr) -> *mut PeEngine {
    let json = match config_json.as_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };
    match DiagnosticEngine::from_json_str(json) {
        Ok(engine) => into_handle(engine),
        Err(e) => {
            tracing::warn!(error = %e, "rejected engine configuration");
            ptr::null_mut()
        }
    }
}

/// Create an engine from a built-in profile ("lung", "breast"). Null if unknown.
#[no_mangle]
pub unsafe extern "C" fn pe_engine_new_preset(name: PeStr) -> *mut PeEngine {
    let name = match name.as_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };
    let Some((_, cfg)) = presets::all().into_iter().find(|(n, _)| *n == name) else {
        return ptr::null_mut();
    };
    match DiagnosticEngine::from_config(cfg) {
        Ok(engine) => into_handle(engine),
        Err(e) => {
            tracing::warn!(preset = name, error = %e, "preset failed validation");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pe_engine_free(h: *mut PeEngine) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Evaluate a JSON request `{"results": [...], "risk_factors": {...}}`.
#[no_mangle]
pub unsafe extern "C" fn pe_engine_evaluate(h: *const PeEngine, request_json: PeStr) -> PeEvaluation {
    if h.is_null() {
        return PeEvaluation {
            rc: PE_ERR_NULL,
            json: PeBytes::empty(),
        };
    }
    let handle = &*h;

    let json = match request_json.as_str() {
        Ok(s) => s,
        Err(rc) => {
            return PeEvaluation {
                rc,
                json: PeBytes::empty(),
            }
        }
    };

    let req: EvaluateRequest = match serde_json::from_str(json) {
        Ok(r) => r,
        Err(e) => return error_json(PE_ERR_REQUEST, "request", e.to_string()),
    };

    match handle.inner.evaluate(&req.results, &req.risk_factors) {
        Ok(evaluation) => match serde_json::to_vec(&evaluation) {
            Ok(buf) => PeEvaluation {
                rc: PE_OK,
                json: PeBytes::from_vec(buf),
            },
            Err(e) => error_json(PE_ERR_ENCODE, "encode", e.to_string()),
        },
        Err(EngineError::Aggregation(e)) => error_json(PE_ERR_AGGREGATION, "aggregation", e.to_string()),
        Err(EngineError::Value(e)) => error_json(PE_ERR_VALUE, "value", e.to_string()),
        Err(EngineError::Configuration(e)) => error_json(PE_ERR_CONFIG, "configuration", e.to_string()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn pe_bytes_free(b: PeBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}
