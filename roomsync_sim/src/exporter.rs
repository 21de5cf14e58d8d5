//! JSON exporter for scenario runs.
//!
//! Writes every cycle's decisions and the resulting tracked boxes, so a
//! renderer or notebook can replay a run.

use roomsync_core::{ElementRecord, ReconciliationResult};
use roomsync_env::translation_of;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single reconciliation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub cycle: u64,

    /// Detections in the batch (duplicates included)
    pub detections: usize,

    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub retracted: Vec<String>,

    /// Tracked elements after the cycle
    pub elements: Vec<ElementBox>,
}

impl SimFrame {
    /// Builds a frame from a cycle's result and the tracked records after it.
    pub fn from_cycle<'a>(
        result: &ReconciliationResult,
        detections: usize,
        tracked: impl Iterator<Item = &'a ElementRecord>,
    ) -> Self {
        let mut elements: Vec<ElementBox> = tracked.map(ElementBox::from_record).collect();
        elements.sort_by_key(|b| b.sequence);

        Self {
            cycle: result.cycle,
            detections,
            created: result.created_ids().iter().map(|id| id.to_string()).collect(),
            updated: result.updated_ids().iter().map(|id| id.to_string()).collect(),
            retracted: result.retracted.iter().map(|id| id.to_string()).collect(),
            elements,
        }
    }
}

/// A tracked element as a box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBox {
    pub id: String,
    pub sequence: u64,
    pub category: String,
    pub recognized: bool,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl ElementBox {
    pub fn from_record(record: &ElementRecord) -> Self {
        let translation = translation_of(record.transform());
        let dimensions = record.dimensions();

        Self {
            id: record.identity().to_string(),
            sequence: record.sequence(),
            category: record.category().to_string(),
            recognized: record.category().is_recognized(),
            x: translation.x,
            y: translation.y,
            z: translation.z,
            width: dimensions.x,
            height: dimensions.y,
            depth: dimensions.z,
        }
    }
}

/// Complete scenario export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
