//! WASM bindings for Self Disclosure Core
//!
//! Exposes signal unpacking, scope hashing, policy verification and enclave
//! attestation checks to JavaScript via wasm-bindgen.

use std::sync::{Arc, Mutex};
use wasm_bindgen::prelude::*;

use crate::attestation::{self, NitroRoot};
use crate::config::{StaticConfigStore, VerificationConfig, VerifierSettings};
use crate::disclosure::{unpack_with_id, PublicSignals};
use crate::scope::hash_endpoint_with_scope;
use crate::verifier::DisclosureVerifier;

// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

static VERIFIER: Mutex<Option<DisclosureVerifier>> = Mutex::new(None);

// ============== RESULT TYPES ==============

/// Outcome of an unpack or verify call, with the payload as JSON.
#[wasm_bindgen]
pub struct DisclosureResult {
    success: bool,
    json: String,
    error: Option<String>,
}

impl DisclosureResult {
    fn ok(json: String) -> Self {
        Self {
            success: true,
            json,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            json: String::new(),
            error: Some(error.to_string()),
        }
    }
}

#[wasm_bindgen]
impl DisclosureResult {
    #[wasm_bindgen(getter)]
    pub fn success(&self) -> bool {
        self.success
    }

    #[wasm_bindgen(getter)]
    pub fn json(&self) -> String {
        self.json.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

fn parse_signals(signals_json: &str) -> Result<PublicSignals, String> {
    let raw: Vec<String> = serde_json::from_str(signals_json).map_err(|e| e.to_string())?;
    PublicSignals::parse(&raw).map_err(|e| e.to_string())
}

// ============== INITIALIZATION ==============

/// Set up the verifier from settings JSON and one policy JSON.
/// Returns true if successful.
#[wasm_bindgen]
pub fn init_verifier(settings_json: &str, config_json: &str) -> bool {
    let setup = VerifierSettings::from_json(settings_json)
        .map_err(|e| e.to_string())
        .and_then(|settings| {
            let config: VerificationConfig =
                serde_json::from_str(config_json).map_err(|e| e.to_string())?;
            DisclosureVerifier::new(settings, Arc::new(StaticConfigStore::new(config)))
                .map_err(|e| e.to_string())
        });

    match (setup, VERIFIER.lock()) {
        (Ok(verifier), Ok(mut state)) => {
            web_sys::console::log_1(
                &format!("✓ Verifier ready, scope hash {}", verifier.scope_hash()).into(),
            );
            *state = Some(verifier);
            true
        }
        (Err(e), _) => {
            web_sys::console::error_1(&format!("Failed to init verifier: {e}").into());
            false
        }
        (_, Err(_)) => false,
    }
}

/// Check if the verifier is initialized
#[wasm_bindgen]
pub fn is_verifier_ready() -> bool {
    VERIFIER.lock().map(|state| state.is_some()).unwrap_or(false)
}

// ============== DISCLOSURE ==============

/// Unpack the disclosed fields of a proof. `signals_json` is a JSON array of
/// decimal or hex strings.
#[wasm_bindgen]
pub fn unpack_disclosure(attestation_id: u32, signals_json: &str) -> DisclosureResult {
    let signals = match parse_signals(signals_json) {
        Ok(s) => s,
        Err(e) => return DisclosureResult::failed(e),
    };
    match unpack_with_id(u64::from(attestation_id), &signals) {
        Ok(record) => match serde_json::to_string(&record) {
            Ok(json) => DisclosureResult::ok(json),
            Err(e) => DisclosureResult::failed(e),
        },
        Err(e) => DisclosureResult::failed(e),
    }
}

/// Run every policy check against the initialized verifier.
#[wasm_bindgen]
pub fn verify_disclosure(
    attestation_id: u32,
    signals_json: &str,
    user_context_data: &str,
) -> DisclosureResult {
    let raw: Vec<String> = match serde_json::from_str(signals_json) {
        Ok(raw) => raw,
        Err(e) => return DisclosureResult::failed(e),
    };

    let state = match VERIFIER.lock() {
        Ok(state) => state,
        Err(_) => return DisclosureResult::failed("Verifier state poisoned"),
    };
    let verifier = match state.as_ref() {
        Some(v) => v,
        None => {
            return DisclosureResult::failed("Verifier not initialized. Call init_verifier() first.")
        }
    };

    match verifier.verify(u64::from(attestation_id), &raw, user_context_data) {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => DisclosureResult::ok(json),
            Err(e) => DisclosureResult::failed(e),
        },
        Err(e) => DisclosureResult::failed(e),
    }
}

// ============== UTILITIES ==============

/// Scope hash of an endpoint and scope, as a decimal string.
#[wasm_bindgen]
pub fn hash_scope(endpoint: &str, scope: &str) -> Result<String, JsValue> {
    hash_endpoint_with_scope(endpoint, scope)
        .map(|hash| hash.to_decimal())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Verify a hex-encoded Nitro attestation document against the AWS root.
/// Returns the enclave module id.
#[wasm_bindgen]
pub fn verify_attestation_document(document_hex: &str) -> Result<String, JsValue> {
    let document = hex::decode(document_hex.trim_start_matches("0x"))
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    NitroRoot::load()
        .and_then(|root| attestation::verify_with_root(&document, &root))
        .map(|doc| doc.module_id)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Get version info
#[wasm_bindgen]
pub fn get_version() -> String {
    format!("Self Disclosure Core WASM v{}", env!("CARGO_PKG_VERSION"))
}
