//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use property_ops::store::{Deal, DealStore, NewDeal};
use serde_json::{json, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// A store in a fresh temp dir; keep the `TempDir` alive for the test.
pub fn temp_store() -> (TempDir, DealStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = DealStore::open(dir.path().join("deals")).expect("open store");
    (dir, store)
}

pub fn smith_street(store: &DealStore) -> Deal {
    store
        .create_deal(NewDeal {
            address: "42 Smith St, Newtown NSW 2042".to_string(),
            listing_url: "https://example.com/listing/42-smith-st".to_string(),
            state: "NSW".to_string(),
            council: "Inner West".to_string(),
            notes: String::new(),
        })
        .expect("create deal")
}

pub fn comps() -> Value {
    json!([
        {"address": "38 Smith St", "sale_price": 815000, "sale_date": "2026-01-12", "bedrooms": 3},
        {"address": "7 King St", "sale_price": 842000, "sale_date": "2025-11-30", "bedrooms": 3}
    ])
}

/// Shell command running the mock LM script.
pub fn mock_lm_command() -> String {
    let script = manifest_dir().join("tests/mock-lm.sh");
    format!("sh {}", shell_words::quote(&script.display().to_string()))
}

/// The `propops` binary against `root`, with the mock LM and no API keys.
pub fn propops(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_propops"));
    command
        .arg("--root")
        .arg(root)
        .env("PROPOPS_LM_COMMAND", mock_lm_command())
        .env("PROPOPS_VISION_COMMAND", mock_lm_command())
        .env_remove("PROPOPS_ROOT")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("MOCK_LM_FAIL")
        .env_remove("RUST_LOG");
    command
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write");
}
