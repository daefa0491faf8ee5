//! The rebalancing decision engine.
//!
//! Four pure pipeline stages plus the orchestrator that sequences them:
//!
//! 1. [`eligibility`] — which holdings may be sold at all;
//! 2. [`stagnation`] — which eligible holdings are actually stagnating;
//! 3. [`allocation`] — which ranked assets to buy, after wash-trade and
//!    occupied-slot resolution;
//! 4. [`convergence`] — how much to spend on each, within exchange minimums.
//!
//! The stages operate on plain values from a snapshot frozen at cycle
//! start; only [`cycle`] talks to the collaborators.

pub mod allocation;
pub mod convergence;
pub mod cycle;
pub mod eligibility;
pub mod stagnation;

pub use cycle::{CycleReport, EngineConfig, FailedOrder, Rebalancer};
pub use stagnation::StagnationMode;
