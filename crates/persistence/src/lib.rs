#![deny(warnings)]

//! Persistence layer: trade snapshots as pretty JSON or compact bincode.
//!
//! Saves carry a format version. Older versions load with missing fields
//! defaulted; a save written by a newer format is rejected.

use std::fs;
use std::path::Path;
use thiserror::Error;
use trade_core::{TradeSnapshot, CURRENT_FORMAT_VERSION};

/// File extension used for JSON saves.
pub const SAVE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid save document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid binary snapshot: {0}")]
    Binary(#[from] bincode::Error),
    #[error("save format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

fn check_version(snap: &TradeSnapshot) -> Result<(), PersistenceError> {
    if snap.format_version > CURRENT_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: snap.format_version,
            supported: CURRENT_FORMAT_VERSION,
        });
    }
    Ok(())
}

pub fn to_json(snap: &TradeSnapshot) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(snap)?)
}

pub fn from_json(text: &str) -> Result<TradeSnapshot, PersistenceError> {
    let snap: TradeSnapshot = serde_json::from_str(text)?;
    check_version(&snap)?;
    Ok(snap)
}

/// Write `snap` to `path`, creating parent directories as needed.
pub fn save_json(path: impl AsRef<Path>, snap: &TradeSnapshot) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_json(snap)?)?;
    tracing::info!(
        path = %path.display(),
        routes = snap.routes.len(),
        hubs = snap.hubs.len(),
        markets = snap.markets.len(),
        "trade state saved"
    );
    Ok(())
}

pub fn load_json(path: impl AsRef<Path>) -> Result<TradeSnapshot, PersistenceError> {
    let path = path.as_ref();
    let snap = from_json(&fs::read_to_string(path)?)?;
    tracing::debug!(path = %path.display(), version = snap.format_version, "trade state read");
    Ok(snap)
}

pub fn encode_binary(snap: &TradeSnapshot) -> Result<Vec<u8>, PersistenceError> {
    Ok(bincode::serialize(snap)?)
}

pub fn decode_binary(bytes: &[u8]) -> Result<TradeSnapshot, PersistenceError> {
    let snap: TradeSnapshot = bincode::deserialize(bytes)?;
    check_version(&snap)?;
    Ok(snap)
}
