//! Integration test harness.

mod scenarios;
