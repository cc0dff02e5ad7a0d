//! Population planning: pure per-role target-headcount formulas over
//! the colony snapshot, static-priority deficit resolution, and the
//! trailing turret-energy statistic that can suppress repairer
//! production.
//!
//! `compute_targets` is a pure function of the snapshot: identical
//! input always yields the identical target map. Deficit resolution is
//! deliberately a static total order, not an auction; starvation of
//! low-priority roles under a sustained high-priority deficit is an
//! accepted trade-off.

use std::collections::BTreeMap;

use contracts::{
    ColonyRecord, ColonySnapshot, Role, SpawnRequest, TURRET_HISTORY_LEN,
};

use crate::catalog::{CatalogError, RoleCatalog};
use crate::environment::StructureInfo;

/// Below this available energy the harvester crisis override arms.
pub const CRISIS_ENERGY: u32 = 300;
/// Minimum deployed work parts per source before the crisis override
/// considers the colony viable.
pub const MIN_WORK_PARTS_PER_SOURCE: u32 = 3;
/// Aggregate damage per-mille at which repairers are requested.
pub const REPAIR_TRIGGER_PERMILLE: u32 = 200;
/// Trailing turret fullness at or above which repairers are fully
/// suppressed: the automated defense layer repairs on its own.
pub const TURRET_SELF_REPAIR_PERMILLE: u32 = 500;
pub const REPAIRER_CAP: u32 = 2;
pub const DEFENDER_CAP: u32 = 4;
pub const HAULER_CAP: u32 = 3;
pub const BUILDER_CAP: u32 = 3;

/// Stateless planner over colony snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopulationPlanner;

impl PopulationPlanner {
    /// Target headcount per role. Pure; targets are never negative by
    /// construction (unsigned).
    pub fn compute_targets(snapshot: &ColonySnapshot) -> BTreeMap<Role, u32> {
        Role::ALL
            .iter()
            .map(|&role| (role, Self::target_for(role, snapshot)))
            .collect()
    }

    fn target_for(role: Role, snapshot: &ColonySnapshot) -> u32 {
        match role {
            Role::Harvester => harvester_target(snapshot),
            Role::Hauler => hauler_target(snapshot),
            Role::Defender => defender_target(snapshot),
            Role::Upgrader => upgrader_target(snapshot),
            Role::Builder => builder_target(snapshot),
            Role::Repairer => repairer_target(snapshot),
        }
    }

    /// Deficit resolution: among roles with `target > current`, pick
    /// the first in the fixed `Role::ALL` priority order. No deficit or
    /// no idle production facility means no request this tick.
    pub fn plan_spawning(
        catalog: &RoleCatalog,
        snapshot: &ColonySnapshot,
        targets: &BTreeMap<Role, u32>,
    ) -> Result<Option<SpawnRequest>, CatalogError> {
        let Some(spawn_id) = snapshot.idle_spawn_ids.first() else {
            return Ok(None);
        };

        let needed = Role::ALL.iter().copied().find(|&role| {
            targets.get(&role).copied().unwrap_or(0) > snapshot.population_of(role)
        });
        let Some(role) = needed else {
            return Ok(None);
        };

        let loadout = catalog.best_affordable(role, snapshot.energy_available)?;
        Ok(Some(SpawnRequest {
            colony_id: snapshot.colony_id.clone(),
            spawn_id: spawn_id.clone(),
            role,
            parts: loadout.parts.clone(),
            cost: loadout.cost,
        }))
    }
}

// ---------------------------------------------------------------------------
// Per-role target formulas (one canonical formula per role)
// ---------------------------------------------------------------------------

fn harvester_target(snapshot: &ColonySnapshot) -> u32 {
    // Crisis override: near-zero economy with too little deployed work
    // capability forces one harvester per node regardless of
    // development level, guaranteeing recovery from a drained colony.
    if snapshot.energy_available < CRISIS_ENERGY
        && snapshot.deployed_work_parts < MIN_WORK_PARTS_PER_SOURCE * snapshot.source_count
    {
        return snapshot.source_count;
    }
    let per_source = if snapshot.development_level < 3 { 2 } else { 1 };
    snapshot.source_count * per_source
}

fn hauler_target(snapshot: &ColonySnapshot) -> u32 {
    if snapshot.development_level < 2 {
        return 0;
    }
    snapshot.source_count.min(HAULER_CAP)
}

fn defender_target(snapshot: &ColonySnapshot) -> u32 {
    snapshot.hostile_count.min(DEFENDER_CAP)
}

fn upgrader_target(snapshot: &ColonySnapshot) -> u32 {
    match snapshot.development_level {
        0..=3 => 3,
        4..=6 => 2,
        _ => 1,
    }
}

fn builder_target(snapshot: &ColonySnapshot) -> u32 {
    if snapshot.construction_request_count == 0 {
        return 0;
    }
    (1 + snapshot.construction_request_count / 5).min(BUILDER_CAP)
}

fn repairer_target(snapshot: &ColonySnapshot) -> u32 {
    // Sufficiently charged turrets over the trailing window handle
    // repair on their own; suppress the role entirely.
    if let Some(mean) = snapshot.turret_fullness_mean_permille {
        if mean >= TURRET_SELF_REPAIR_PERMILLE {
            return 0;
        }
    }
    if snapshot.damage_ratio_permille < REPAIR_TRIGGER_PERMILLE {
        return 0;
    }
    (1 + snapshot.damaged_structure_count / 10).min(REPAIRER_CAP)
}

// ---------------------------------------------------------------------------
// Trailing turret-energy statistic
// ---------------------------------------------------------------------------

/// Operations over the colony record's bounded per-turret fullness
/// history. The record is owned exclusively by the colony's scheduler
/// pass; this type never holds state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurretLog;

impl TurretLog {
    /// Append this tick's fullness sample for every live turret and
    /// evict history entries whose turret no longer resolves.
    pub fn record(record: &mut ColonyRecord, turrets: &[StructureInfo]) {
        record
            .turret_fullness_permille
            .retain(|id, _| turrets.iter().any(|t| t.id == *id));

        for turret in turrets {
            let samples = record
                .turret_fullness_permille
                .entry(turret.id.clone())
                .or_default();
            samples.push(turret.fullness_permille());
            if samples.len() > TURRET_HISTORY_LEN {
                let excess = samples.len() - TURRET_HISTORY_LEN;
                samples.drain(..excess);
            }
        }
    }

    /// Mean fullness across all samples of all tracked turrets, or
    /// `None` when no history exists.
    pub fn mean_permille(record: &ColonyRecord) -> Option<u32> {
        let mut sum: u64 = 0;
        let mut count: u64 = 0;
        for samples in record.turret_fullness_permille.values() {
            for &sample in samples {
                sum += u64::from(sample);
                count += 1;
            }
        }
        (count > 0).then(|| (sum / count) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Position, StructureKind};

    fn snapshot() -> ColonySnapshot {
        ColonySnapshot {
            colony_id: "colony:1".to_string(),
            tick: 100,
            energy_available: 550,
            energy_capacity: 800,
            source_count: 2,
            construction_request_count: 0,
            development_level: 2,
            population: BTreeMap::new(),
            idle_spawn_ids: vec!["spawn:1".to_string()],
            deployed_work_parts: 6,
            hostile_count: 0,
            damaged_structure_count: 0,
            damage_ratio_permille: 0,
            turret_fullness_mean_permille: None,
        }
    }

    fn turret(id: &str, energy: u32) -> StructureInfo {
        StructureInfo {
            id: id.to_string(),
            kind: StructureKind::Turret,
            position: Position::new(0, 0),
            energy,
            energy_capacity: 1000,
            hits: 1000,
            hits_max: 1000,
        }
    }

    #[test]
    fn compute_targets_is_pure() {
        let snap = snapshot();
        assert_eq!(
            PopulationPlanner::compute_targets(&snap),
            PopulationPlanner::compute_targets(&snap)
        );
    }

    #[test]
    fn crisis_override_one_harvester_per_node() {
        // 2 nodes, no harvesters, 150 energy: the override fires and
        // the development level is irrelevant.
        for level in [0, 3, 8] {
            let mut snap = snapshot();
            snap.energy_available = 150;
            snap.deployed_work_parts = 0;
            snap.development_level = level;
            let targets = PopulationPlanner::compute_targets(&snap);
            assert_eq!(targets.get(&Role::Harvester), Some(&2));
        }
    }

    #[test]
    fn crisis_needs_both_low_energy_and_thin_work_parts() {
        let mut snap = snapshot();
        snap.energy_available = 150;
        snap.deployed_work_parts = 6; // 3 per source: viable
        snap.development_level = 1;
        let targets = PopulationPlanner::compute_targets(&snap);
        // Normal formula: 2 per source below level 3.
        assert_eq!(targets.get(&Role::Harvester), Some(&4));
    }

    #[test]
    fn builder_target_follows_construction_backlog() {
        let mut snap = snapshot();
        assert_eq!(builder_target(&snap), 0);
        snap.construction_request_count = 1;
        assert_eq!(builder_target(&snap), 1);
        snap.construction_request_count = 12;
        assert_eq!(builder_target(&snap), 3);
        snap.construction_request_count = 40;
        assert_eq!(builder_target(&snap), BUILDER_CAP);
    }

    #[test]
    fn repairer_suppressed_by_charged_turrets() {
        let mut snap = snapshot();
        snap.damaged_structure_count = 5;
        snap.damage_ratio_permille = 400;
        snap.turret_fullness_mean_permille = Some(800);
        assert_eq!(repairer_target(&snap), 0);

        snap.turret_fullness_mean_permille = Some(200);
        assert_eq!(repairer_target(&snap), 1);

        snap.turret_fullness_mean_permille = None;
        assert_eq!(repairer_target(&snap), 1);
    }

    #[test]
    fn repairer_and_defender_respect_hard_ceilings() {
        let mut snap = snapshot();
        snap.damaged_structure_count = 100;
        snap.damage_ratio_permille = 900;
        assert_eq!(repairer_target(&snap), REPAIRER_CAP);

        snap.hostile_count = 50;
        assert_eq!(defender_target(&snap), DEFENDER_CAP);
    }

    #[test]
    fn deficit_resolution_picks_lowest_priority_number() {
        let catalog = RoleCatalog::default_catalog();
        let mut snap = snapshot();
        snap.hostile_count = 1;
        // Harvesters satisfied; haulers and defenders both under target.
        snap.population.insert(Role::Harvester, 4);
        let targets = PopulationPlanner::compute_targets(&snap);
        assert!(targets[&Role::Hauler] > 0);
        assert!(targets[&Role::Defender] > 0);

        let request = PopulationPlanner::plan_spawning(&catalog, &snap, &targets)
            .expect("catalog")
            .expect("request");
        // Hauler precedes Defender in the static order.
        assert_eq!(request.role, Role::Hauler);
        assert_eq!(request.spawn_id, "spawn:1");
    }

    #[test]
    fn no_deficit_means_no_request() {
        let catalog = RoleCatalog::default_catalog();
        let mut snap = snapshot();
        let targets = PopulationPlanner::compute_targets(&snap);
        for (role, count) in &targets {
            snap.population.insert(*role, *count);
        }
        let request = PopulationPlanner::plan_spawning(&catalog, &snap, &targets).expect("catalog");
        assert_eq!(request, None);
    }

    #[test]
    fn no_idle_spawn_means_no_request() {
        let catalog = RoleCatalog::default_catalog();
        let mut snap = snapshot();
        snap.idle_spawn_ids.clear();
        let targets = PopulationPlanner::compute_targets(&snap);
        let request = PopulationPlanner::plan_spawning(&catalog, &snap, &targets).expect("catalog");
        assert_eq!(request, None);
    }

    #[test]
    fn spawn_request_uses_greedy_affordable_loadout() {
        let catalog = RoleCatalog::default_catalog();
        let mut snap = snapshot();
        snap.energy_available = 460;
        snap.population.clear();
        let targets = PopulationPlanner::compute_targets(&snap);
        let request = PopulationPlanner::plan_spawning(&catalog, &snap, &targets)
            .expect("catalog")
            .expect("request");
        assert_eq!(request.role, Role::Harvester);
        assert_eq!(request.cost, 400);
    }

    #[test]
    fn turret_log_bounds_history_and_evicts_destroyed() {
        let mut record = ColonyRecord::new();
        let turrets = vec![turret("turret:1", 600), turret("turret:2", 400)];
        for _ in 0..(TURRET_HISTORY_LEN + 10) {
            TurretLog::record(&mut record, &turrets);
        }
        for samples in record.turret_fullness_permille.values() {
            assert_eq!(samples.len(), TURRET_HISTORY_LEN);
        }
        assert_eq!(TurretLog::mean_permille(&record), Some(500));

        // turret:2 destroyed: its history is evicted on the next pass.
        TurretLog::record(&mut record, &turrets[..1]);
        assert!(!record.turret_fullness_permille.contains_key("turret:2"));
        assert_eq!(TurretLog::mean_permille(&record), Some(600));
    }
}
