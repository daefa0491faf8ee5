//! Persistence layer.
//!
//! Saves and loads bot state to/from a JSON file. Trade signals and price
//! samples live in SQLite (see the data module); the JSON file only holds
//! the counters that survive a restart.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::BotState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "rebalancer_state.json";

/// Save bot state to a JSON file.
pub fn save_state(state: &BotState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json =
        serde_json::to_string_pretty(state).context("Failed to serialise bot state")?;

    std::fs::write(path, &json).context(format!("Failed to write state to {path}"))?;

    debug!(path, cycle_count = state.cycle_count, "State saved");
    Ok(())
}

/// Load bot state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<BotState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: BotState =
        serde_json::from_str(&json).context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        cycle_count = state.cycle_count,
        plans = state.plans_executed,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
