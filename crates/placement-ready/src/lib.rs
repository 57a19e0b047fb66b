//! Placement-readiness tracking.
//!
//! Students submit profile metrics, administrators maintain a single set of eligibility
//! thresholds, and every stored profile carries an `is_eligible` flag that is kept equal to
//! the evaluation of that profile against the current thresholds.

pub mod config;
pub mod eligibility;
pub mod error;
pub mod storage;
pub mod telemetry;
