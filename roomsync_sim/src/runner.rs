//! Scenario runner - plays room-scan scenarios through the reconciler.
//!
//! Every cycle is checked against the reconcile contract:
//! - tracked identities equal the identities in the batch
//! - created / updated / retracted are disjoint and match the set algebra
//! - each record holds the last snapshot reported for its identity
//! - the session mirrors the tracked collection, removes issued last
//!
//! Every fifth cycle the same batch is reconciled a second time and must
//! create and retract nothing.

use crate::exporter::{SimExport, SimFrame};
use crate::oracle::{RoomOracle, ScanBehavior};
use crate::scenarios::ScenarioId;
use crate::session::{removes_are_last, SimSession};

use roomsync_core::{ApplyReport, ReconciliationResult, Reconciler, ScanDriver, SessionAdapter, SessionOp};
use roomsync_env::{scan_feed, Category, DetectedElement, ElementIdentity, FeedConfig};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Reconciliation cycles executed (re-checks included)
    pub cycles: u64,

    /// Tracked elements at end
    pub final_tracked: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    pub created: u64,
    pub updated: u64,
    pub retracted: u64,

    /// Creates of identities that had been retracted earlier
    pub recreated: u64,

    /// Updates whose kind differed from the previous cycle
    pub kind_changes: u64,

    /// Repeated identities within fresh scans
    pub duplicates: u64,

    /// Unrecognized records after fresh scans, summed over cycles
    pub unrecognized: u64,

    /// Update notifications delivered to session observers
    pub notifications: u64,

    /// Same-batch re-checks performed
    pub idempotence_checks: u64,
}

/// Runs room-scan scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Scans per scenario
    cycles: u64,

    /// Furniture in the initial room
    objects: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            cycles: 30,
            objects: 6,
        }
    }

    /// Sets the number of scans.
    pub fn with_cycles(mut self, cycles: u64) -> Self {
        self.cycles = cycles.max(1);
        self
    }

    /// Sets the amount of initial furniture.
    pub fn with_objects(mut self, objects: usize) -> Self {
        self.objects = objects;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let mut export = SimExport::new(scenario.name(), self.seed);
        self.run_exported(scenario, &mut export)
    }

    /// Runs a scenario, recording every cycle into `export`.
    pub fn run_exported(&self, scenario: ScenarioId, export: &mut SimExport) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let result = match scenario {
            ScenarioId::Streamed => self.run_streamed(),
            _ => self.run_cycles(scenario, export),
        };

        export.finalize(result.passed, result.failure_reason.clone());
        result
    }

    fn behavior_for(scenario: ScenarioId) -> ScanBehavior {
        let base = ScanBehavior::default();
        match scenario {
            ScenarioId::SteadyRoom | ScenarioId::Teardown => base,
            ScenarioId::DoorSwing => ScanBehavior {
                door_toggle_rate: 0.3,
                ..base
            },
            ScenarioId::Flicker => ScanBehavior {
                occlusion_rate: 0.25,
                ..base
            },
            ScenarioId::Furnish => ScanBehavior {
                arrival_rate: 0.5,
                departure_rate: 0.2,
                ..base
            },
            ScenarioId::Echo => ScanBehavior {
                echo_rate: 0.3,
                ..base
            },
            ScenarioId::UnknownKinds => ScanBehavior {
                unknown_rate: 0.2,
                ..base
            },
            ScenarioId::Streamed => ScanBehavior {
                occlusion_rate: 0.1,
                door_toggle_rate: 0.2,
                arrival_rate: 0.3,
                departure_rate: 0.1,
                echo_rate: 0.1,
                ..base
            },
        }
    }

    fn room(&self, scenario: ScenarioId) -> RoomOracle {
        let mut oracle = RoomOracle::new(self.seed);
        oracle.furnish_room(self.objects);
        oracle.set_behavior(Self::behavior_for(scenario));
        oracle
    }

    /// Synchronous scenarios: one scan, one reconcile, full checks.
    fn run_cycles(&self, scenario: ScenarioId, export: &mut SimExport) -> ScenarioResult {
        let mut oracle = self.room(scenario);
        let initial_elements = oracle.element_count() as u64;
        let mut harness = CycleHarness::new();

        let mut outcome: Result<(), String> = Ok(());

        for cycle in 1..=self.cycles {
            if cycle > 1 {
                oracle.step();
            }
            let batch = oracle.scan();

            if let Err(reason) = harness.cycle(&batch, true, export) {
                outcome = Err(reason);
                break;
            }

            if cycle % 5 == 0 {
                if let Err(reason) = harness.recheck(&batch, export) {
                    outcome = Err(reason);
                    break;
                }
            }

            if cycle % 10 == 0 {
                debug!(
                    "  cycle={} | elements={} | tracked={}",
                    cycle,
                    oracle.element_count(),
                    harness.reconciler.tracked_count()
                );
            }
        }

        if outcome.is_ok() && scenario == ScenarioId::Teardown {
            oracle.clear();
            let tracked_before = harness.reconciler.tracked_count();
            outcome = harness.cycle(&oracle.scan(), true, export).and_then(|result| {
                if result.retracted.len() != tracked_before || !harness.reconciler.is_empty() {
                    Err(format!(
                        "empty scan retracted {} of {} elements",
                        result.retracted.len(),
                        tracked_before
                    ))
                } else if harness.adapter.session().anchors().anchor_count() != 0 {
                    Err("session still holds anchors after empty scan".to_string())
                } else {
                    Ok(())
                }
            });
        }

        let counters = oracle.counters().clone();
        let metrics = harness.metrics();

        if outcome.is_ok() {
            outcome = match scenario {
                ScenarioId::SteadyRoom if metrics.retracted != 0 || metrics.created != initial_elements => {
                    Err(format!(
                        "steady room created {} (expected {}) and retracted {} (expected 0)",
                        metrics.created, initial_elements, metrics.retracted
                    ))
                }
                ScenarioId::DoorSwing if metrics.kind_changes != counters.door_toggles => Err(format!(
                    "{} door toggles but {} kind changes",
                    counters.door_toggles, metrics.kind_changes
                )),
                ScenarioId::Flicker if metrics.recreated > metrics.retracted => Err(format!(
                    "{} recreates from only {} retractions",
                    metrics.recreated, metrics.retracted
                )),
                ScenarioId::Furnish
                    if metrics.created != initial_elements + counters.arrivals
                        || metrics.retracted != counters.departures =>
                {
                    Err(format!(
                        "furnish created {} / retracted {}, room saw {} arrivals / {} departures",
                        metrics.created, metrics.retracted, counters.arrivals, counters.departures
                    ))
                }
                ScenarioId::Echo if metrics.duplicates != counters.echoed => Err(format!(
                    "{} echoes but {} duplicates seen",
                    counters.echoed, metrics.duplicates
                )),
                ScenarioId::UnknownKinds if metrics.unrecognized != counters.unknown => Err(format!(
                    "{} unknown detections but {} unrecognized records",
                    counters.unknown, metrics.unrecognized
                )),
                _ => Ok(()),
            };
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            cycles: harness.reconciler.cycle(),
            final_tracked: harness.reconciler.tracked_count(),
            failure_reason: outcome.err(),
            metrics,
        }
    }

    /// Producer task publishes scans through the feed; the driver drains it.
    fn run_streamed(&self) -> ScenarioResult {
        let scenario = ScenarioId::Streamed;
        let failed = |reason: String| ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            cycles: 0,
            final_tracked: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        };

        let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => return failed(format!("failed to start runtime: {}", e)),
        };

        let mut oracle = self.room(scenario);
        let cycles = self.cycles;

        runtime.block_on(async move {
            let (publisher, feed) = scan_feed(FeedConfig::default().with_capacity(2));
            let mut driver = ScanDriver::new(feed, SimSession::new());

            let producer = tokio::spawn(async move {
                let mut last = Vec::new();
                for cycle in 1..=cycles {
                    if cycle > 1 {
                        oracle.step();
                    }
                    last = oracle.scan();
                    if publisher.publish(last.clone()).await.is_err() {
                        warn!("Scan feed closed early at cycle {}", cycle);
                        break;
                    }
                }
                last
            });

            let stats = driver.run().await;
            let last_batch = match producer.await {
                Ok(batch) => batch,
                Err(e) => return failed(format!("producer task failed: {}", e)),
            };

            let expected: HashSet<ElementIdentity> = last_batch.iter().map(|d| d.identity).collect();
            let tracked: HashSet<ElementIdentity> = driver.reconciler().identities().into_iter().collect();
            let anchors = driver.session().anchors();

            let outcome = if stats.batches != cycles || stats.stale_batches != 0 {
                Err(format!(
                    "driver processed {} batches ({} stale), expected {}",
                    stats.batches, stats.stale_batches, cycles
                ))
            } else if tracked != expected {
                Err(format!(
                    "tracked {} elements, last scan confirmed {}",
                    tracked.len(),
                    expected.len()
                ))
            } else if anchors.anchor_count() != tracked.len()
                || !tracked.iter().all(|id| anchors.is_anchored(id))
            {
                Err("session anchors diverged from tracked set".to_string())
            } else if stats.session_failures != 0 {
                Err(format!("{} session failures", stats.session_failures))
            } else {
                Ok(())
            };

            ScenarioResult {
                scenario,
                seed: self.seed,
                passed: outcome.is_ok(),
                cycles: driver.reconciler().cycle(),
                final_tracked: driver.reconciler().tracked_count(),
                failure_reason: outcome.err(),
                metrics: ScenarioMetrics {
                    created: stats.created,
                    updated: stats.updated,
                    retracted: stats.retracted,
                    notifications: driver.session().notifications(),
                    ..Default::default()
                },
            }
        })
    }
}

// ============================================================================
// CYCLE HARNESS
// ============================================================================

/// Reconciler + session under test, with per-cycle contract checks.
struct CycleHarness {
    reconciler: Reconciler,
    adapter: SessionAdapter<SimSession>,
    ever_retracted: HashSet<ElementIdentity>,
    metrics: ScenarioMetrics,
}

impl CycleHarness {
    fn new() -> Self {
        Self {
            reconciler: Reconciler::new(),
            adapter: SessionAdapter::new(SimSession::new()),
            ever_retracted: HashSet::new(),
            metrics: ScenarioMetrics::default(),
        }
    }

    fn metrics(&self) -> ScenarioMetrics {
        ScenarioMetrics {
            notifications: self.adapter.session().notifications(),
            ..self.metrics.clone()
        }
    }

    /// Reconciles `batch`, applies it, and checks the result.
    fn cycle(
        &mut self,
        batch: &[DetectedElement],
        fresh: bool,
        export: &mut SimExport,
    ) -> Result<ReconciliationResult, String> {
        let previous: HashMap<ElementIdentity, Category> = self
            .reconciler
            .records()
            .map(|record| (record.identity(), record.category()))
            .collect();

        let result = self.reconciler.reconcile(batch);
        let apply = self.adapter.apply(&result);
        let calls = self.adapter.session_mut().take_calls();

        self.check(&previous, batch, &result, &apply, &calls)?;

        let confirmed: HashSet<ElementIdentity> = batch.iter().map(|d| d.identity).collect();
        self.metrics.created += result.created.len() as u64;
        self.metrics.updated += result.updated.len() as u64;
        self.metrics.retracted += result.retracted.len() as u64;
        self.metrics.recreated += result
            .created
            .iter()
            .filter(|record| self.ever_retracted.contains(&record.identity()))
            .count() as u64;
        self.metrics.kind_changes += result
            .updated
            .iter()
            .filter(|record| previous.get(&record.identity()) != Some(&record.category()))
            .count() as u64;
        if fresh {
            self.metrics.duplicates += (batch.len() - confirmed.len()) as u64;
            self.metrics.unrecognized += self.reconciler.stats().unrecognized as u64;
        }
        self.ever_retracted.extend(result.retracted.iter().copied());

        export.add_frame(SimFrame::from_cycle(&result, batch.len(), self.reconciler.records()));
        Ok(result)
    }

    /// Reconciles the same batch again; nothing may be created or retracted.
    fn recheck(&mut self, batch: &[DetectedElement], export: &mut SimExport) -> Result<(), String> {
        self.metrics.idempotence_checks += 1;
        let result = self.cycle(batch, false, export)?;
        if result.is_unchanged() {
            Ok(())
        } else {
            Err(format!(
                "cycle {}: re-reconciling the same scan created {} and retracted {}",
                result.cycle,
                result.created.len(),
                result.retracted.len()
            ))
        }
    }

    fn check(
        &self,
        previous: &HashMap<ElementIdentity, Category>,
        batch: &[DetectedElement],
        result: &ReconciliationResult,
        apply: &ApplyReport,
        calls: &[(SessionOp, ElementIdentity)],
    ) -> Result<(), String> {
        let cycle = result.cycle;
        let before: HashSet<ElementIdentity> = previous.keys().copied().collect();
        let confirmed: HashSet<ElementIdentity> = batch.iter().map(|d| d.identity).collect();
        let tracked: HashSet<ElementIdentity> = self.reconciler.identities().into_iter().collect();

        // Confirm-or-retract totality
        if tracked != confirmed {
            return Err(format!(
                "cycle {}: tracked {} elements but batch confirmed {}",
                cycle,
                tracked.len(),
                confirmed.len()
            ));
        }

        // Set algebra, and no identity listed twice
        let created: HashSet<ElementIdentity> = result.created_ids().into_iter().collect();
        let updated: HashSet<ElementIdentity> = result.updated_ids().into_iter().collect();
        let retracted: HashSet<ElementIdentity> = result.retracted.iter().copied().collect();
        if created.len() != result.created.len()
            || updated.len() != result.updated.len()
            || retracted.len() != result.retracted.len()
        {
            return Err(format!("cycle {}: identity listed twice in one bucket", cycle));
        }
        if created != confirmed.difference(&before).copied().collect::<HashSet<_>>()
            || updated != confirmed.intersection(&before).copied().collect::<HashSet<_>>()
            || retracted != before.difference(&confirmed).copied().collect::<HashSet<_>>()
        {
            return Err(format!("cycle {}: created/updated/retracted do not match set difference", cycle));
        }

        // Last write wins
        let mut last: HashMap<ElementIdentity, &DetectedElement> = HashMap::new();
        for detection in batch {
            last.insert(detection.identity, detection);
        }
        for (id, detection) in &last {
            let record = self
                .reconciler
                .get(id)
                .ok_or_else(|| format!("cycle {}: {} missing after reconcile", cycle, id))?;
            if record.transform() != &detection.transform
                || record.dimensions() != &detection.dimensions
                || record.category() != detection.category
            {
                return Err(format!("cycle {}: {} does not hold its last snapshot", cycle, id));
            }
        }

        // Session mirrors the reconciler
        let anchors = self.adapter.session().anchors();
        if !apply.is_clean() {
            return Err(format!("cycle {}: {} session failures", cycle, apply.failures.len()));
        }
        if anchors.anchor_count() != tracked.len() {
            return Err(format!(
                "cycle {}: session holds {} anchors for {} tracked elements",
                cycle,
                anchors.anchor_count(),
                tracked.len()
            ));
        }
        for record in self.reconciler.records() {
            if anchors.anchor(&record.identity()) != Some(record) {
                return Err(format!("cycle {}: anchor for {} is stale", cycle, record.identity()));
            }
        }
        if !removes_are_last(calls) {
            return Err(format!("cycle {}: retraction issued before a create or update", cycle));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_all_scenarios_pass_default_seed() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[test]
    fn test_teardown_ends_empty() {
        let result = ScenarioRunner::new(7).with_cycles(10).run(ScenarioId::Teardown);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_tracked, 0);
    }

    #[test]
    fn test_steady_room_counts() {
        let result = ScenarioRunner::new(3)
            .with_cycles(10)
            .with_objects(2)
            .run(ScenarioId::SteadyRoom);

        // 4 walls + floor + door + window + 2 objects
        assert_eq!(result.metrics.created, 9);
        assert_eq!(result.metrics.retracted, 0);
        assert_eq!(result.metrics.idempotence_checks, 2);
        // 10 scans + 2 re-checks
        assert_eq!(result.cycles, 12);
        assert_eq!(result.metrics.notifications, result.metrics.updated);
    }

    #[test]
    fn test_export_has_frame_per_cycle() {
        let runner = ScenarioRunner::new(11).with_cycles(5);
        let mut export = SimExport::new("flicker", 11);
        let result = runner.run_exported(ScenarioId::Flicker, &mut export);

        assert_eq!(export.passed, result.passed);
        assert_eq!(export.frames.len() as u64, result.cycles);
    }

    #[test]
    fn test_streamed_counts_match() {
        let result = ScenarioRunner::new(5).with_cycles(20).run(ScenarioId::Streamed);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.cycles, 20);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_churny_scenarios_hold_for_any_seed(seed in any::<u64>()) {
            let runner = ScenarioRunner::new(seed).with_cycles(15);
            for scenario in [ScenarioId::Flicker, ScenarioId::Furnish, ScenarioId::Echo, ScenarioId::DoorSwing] {
                let result = runner.run(scenario);
                prop_assert!(result.passed, "{} seed={} failed: {:?}", scenario, seed, result.failure_reason);
            }
        }
    }
}
