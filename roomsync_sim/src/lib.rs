//! RoomSync Deterministic Room-Scan Simulator
//!
//! Plays seeded room-scan scenarios through the reconcile engine and checks
//! the reconcile contract after every cycle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                         │
//! │                                                              │
//! │  RoomOracle ──scan()──► Reconciler ──result──► SessionAdapter │
//! │  (ground truth,         (tracked set)             │          │
//! │   seeded ChaCha8)                                 ▼          │
//! │                                              SimSession      │
//! │                                           (anchors + calls)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use roomsync_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_cycles(30).run(ScenarioId::Flicker);
//! assert!(result.passed);
//! ```

mod exporter;
mod oracle;
mod runner;
mod session;
pub mod scenarios;

pub use exporter::{ElementBox, SimExport, SimFrame};
pub use oracle::{GroundTruthElement, OracleCounters, RoomOracle, ScanBehavior};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use session::{removes_are_last, SimSession};
