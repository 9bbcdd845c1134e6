//! FFI smoke tests.
//!
//! These tests call the exported `extern "C"` functions directly (as an external consumer would),
//! to validate:
//! - ABI surface compiles and links
//! - allocation/free symmetry for returned buffers
//! - error codes and error bodies for rejected input

use std::ptr;

use patho_engine_ffi::*;

fn s(s: &str) -> PeStr {
    PeStr {
        ptr: s.as_ptr(),
        len: s.len(),
    }
}

fn lung_request(score: f64, extra: &str) -> String {
    let names = [
        "nuclear_morphology",
        "mitotic_activity",
        "tissue_architecture",
        "cellular_density",
        "cnn_classifier",
        "attention_model",
    ];
    let results: Vec<String> = names
        .iter()
        .map(|n| format!(r#"{{"analyzer_name":"{n}","score":{score},"confidence":0.9}}"#))
        .collect();
    format!(r#"{{"results":[{}]{extra}}}"#, results.join(","))
}

unsafe fn take_json(out: PeEvaluation) -> (i32, serde_json::Value) {
    let value = if out.json.ptr.is_null() {
        serde_json::Value::Null
    } else {
        let bytes = std::slice::from_raw_parts(out.json.ptr, out.json.len);
        serde_json::from_slice(bytes).unwrap()
    };
    let rc = out.rc;
    pe_bytes_free(out.json);
    (rc, value)
}

#[test]
fn ffi_version() {
    assert_eq!(pe_ffi_version(), PE_FFI_VERSION);
}

#[test]
fn ffi_preset_evaluate_and_free() {
    let h = unsafe { pe_engine_new_preset(s("lung")) };
    assert!(!h.is_null());

    let req = lung_request(0.5, r#","risk_factors":{"age":72,"smoking_history":true}"#);
    let (rc, json) = unsafe { take_json(pe_engine_evaluate(h, s(&req))) };
    assert_eq!(rc, PE_OK);

    let value = json["composite"]["value"].as_f64().unwrap();
    assert!((value - 0.58).abs() < 1e-9);
    assert_eq!(json["labels"]["grade"], "G2");
    assert_eq!(json["labels"]["stage"], "III");
    assert_eq!(json["recommendation"]["priority"], "high");

    unsafe { pe_engine_free(h) };
}

#[test]
fn ffi_engine_from_json_config() {
    let cfg = r#"{
        "registry": {
            "shares": { "quantitative": 1.0, "learned": 0.0 },
            "analyzers": [
                { "name": "a", "category": "quantitative", "weight": 0.6 },
                { "name": "b", "category": "quantitative", "weight": 0.4 }
            ]
        },
        "axes": [
            { "name": "risk", "bands": [
                { "label": "Low", "lower_bound": 0.0, "upper_bound": 0.5 },
                { "label": "High", "lower_bound": 0.5, "upper_bound": 1.0 }
            ] }
        ]
    }"#;
    let h = unsafe { pe_engine_new(s(cfg)) };
    assert!(!h.is_null());

    let req = r#"{"results":[
        {"analyzer_name":"a","score":0.9,"confidence":1.0},
        {"analyzer_name":"b","score":0.1,"confidence":1.0}
    ]}"#;
    let (rc, json) = unsafe { take_json(pe_engine_evaluate(h, s(req))) };
    assert_eq!(rc, PE_OK);
    assert_eq!(json["labels"]["risk"], "High");

    unsafe { pe_engine_free(h) };
}

#[test]
fn ffi_rejects_bad_config_and_unknown_preset() {
    let bad = r#"{"registry":{"analyzers":[{"name":"a","category":"quantitative","weight":1.5}]},"axes":[]}"#;
    assert!(unsafe { pe_engine_new(s(bad)) }.is_null());
    assert!(unsafe { pe_engine_new(s("not json")) }.is_null());
    assert!(unsafe { pe_engine_new_preset(s("kidney")) }.is_null());
    assert!(unsafe {
        pe_engine_new(PeStr {
            ptr: ptr::null(),
            len: 0,
        })
    }
    .is_null());
}

#[test]
fn ffi_error_codes() {
    let h = unsafe { pe_engine_new_preset(s("lung")) };
    assert!(!h.is_null());

    let (rc, json) = unsafe { take_json(pe_engine_evaluate(ptr::null(), s("{}"))) };
    assert_eq!(rc, PE_ERR_NULL);
    assert!(json.is_null());

    let invalid = [0xffu8, 0xfe];
    let (rc, _) = unsafe {
        take_json(pe_engine_evaluate(
            h,
            PeStr {
                ptr: invalid.as_ptr(),
                len: invalid.len(),
            },
        ))
    };
    assert_eq!(rc, PE_ERR_UTF8);

    let (rc, json) = unsafe { take_json(pe_engine_evaluate(h, s(r#"{"results": 3}"#))) };
    assert_eq!(rc, PE_ERR_REQUEST);
    assert_eq!(json["error"], "request");

    let partial = r#"{"results":[{"analyzer_name":"nuclear_morphology","score":0.5,"confidence":0.5}]}"#;
    let (rc, json) = unsafe { take_json(pe_engine_evaluate(h, s(partial))) };
    assert_eq!(rc, PE_ERR_AGGREGATION);
    assert_eq!(json["error"], "aggregation");
    assert!(json["message"].as_str().unwrap().contains("attention_model"));

    unsafe { pe_engine_free(h) };
}

#[test]
fn ffi_null_frees_are_noops() {
    unsafe {
        pe_engine_free(ptr::null_mut());
        pe_bytes_free(PeBytes {
            ptr: ptr::null_mut(),
            len: 0,
        });
    }
}
