//! Deterministic simulated environment for exercising the kernel
//! end-to-end. World generation and every tie-break derive from the run
//! seed, so two runs with the same config produce identical event
//! streams.

use std::collections::BTreeMap;

use contracts::{
    loadout_cost, ActionIntent, ActionStatus, Capability, CapabilityKind, Event, Position, Role,
    SimConfig, SpawnStatus, StructureKind, TargetRef,
};

use crate::environment::{
    AgentObservation, ConstructionInfo, Environment, HostileInfo, SourceInfo, StructureInfo,
};
use crate::scheduler::ColonyScheduler;
use crate::store::{RecordStore, StoreError};

const MAP_SIZE: i32 = 50;
const CORE_POSITION: Position = Position { x: 25, y: 25 };
const SPAWN_POSITION: Position = Position { x: 23, y: 25 };
const SPAWN_ENERGY_CAPACITY: u32 = 300;
const EXTENSION_ENERGY_CAPACITY: u32 = 50;
const SOURCE_ENERGY_CAPACITY: u32 = 3000;
const SOURCE_REGEN_PER_TICK: u32 = 10;
const HARVEST_PER_WORK_PART: u32 = 2;
const BUILD_PER_WORK_PART: u32 = 5;
const REPAIR_PER_WORK_PART: u32 = 100;
const ATTACK_PER_ATTACK_PART: u32 = 30;
const UPGRADE_THRESHOLD_PER_LEVEL: u32 = 200;
const RAID_TICK: u64 = 50;
const HOSTILE_HITS: u32 = 150;

fn mix(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
struct SimAgent {
    colony_id: String,
    role: Role,
    position: Position,
    carried: u32,
    capacity: u32,
    parts: Vec<Capability>,
}

impl SimAgent {
    fn count_parts(&self, part: Capability) -> u32 {
        self.parts.iter().filter(|&&p| p == part).count() as u32
    }
}

#[derive(Debug, Clone)]
struct SimColony {
    sources: Vec<SourceInfo>,
    structures: Vec<StructureInfo>,
    constructions: Vec<ConstructionInfo>,
    hostiles: Vec<HostileInfo>,
    level: u8,
    upgrade_progress: u32,
    spawn_busy: bool,
}

/// In-memory world implementing the full environment surface.
pub struct SimWorld {
    tick: u64,
    colonies: BTreeMap<String, SimColony>,
    agents: BTreeMap<String, SimAgent>,
    next_agent: u64,
    next_structure: u64,
    raid_enabled: bool,
}

impl SimWorld {
    pub fn new(config: &SimConfig) -> Self {
        let mut rng = config.seed;
        let mut colonies = BTreeMap::new();
        let backlog_enabled = config
            .scenario_flags
            .get("construction_backlog")
            .copied()
            .unwrap_or(false);
        let raid_enabled = config.scenario_flags.get("raid").copied().unwrap_or(false);

        for colony_index in 1..=config.colony_count {
            let colony_id = format!("colony:{colony_index}");
            let mut sources = Vec::new();
            for source_index in 1..=config.sources_per_colony {
                let x = 5 + (mix(&mut rng) % 15) as i32;
                let y = 5 + (mix(&mut rng) % (MAP_SIZE as u64 - 10)) as i32;
                sources.push(SourceInfo {
                    id: format!("source:{colony_index}:{source_index}"),
                    position: Position::new(x, y),
                    energy: SOURCE_ENERGY_CAPACITY,
                    energy_capacity: SOURCE_ENERGY_CAPACITY,
                });
            }

            let structures = vec![
                StructureInfo {
                    id: format!("core:{colony_index}"),
                    kind: StructureKind::Core,
                    position: CORE_POSITION,
                    energy: 0,
                    energy_capacity: 0,
                    hits: 10_000,
                    hits_max: 10_000,
                },
                StructureInfo {
                    id: format!("spawn:{colony_index}:1"),
                    kind: StructureKind::Spawn,
                    position: SPAWN_POSITION,
                    energy: SPAWN_ENERGY_CAPACITY,
                    energy_capacity: SPAWN_ENERGY_CAPACITY,
                    hits: 5_000,
                    hits_max: 5_000,
                },
            ];

            let constructions = if backlog_enabled {
                vec![
                    ConstructionInfo {
                        id: format!("site:{colony_index}:1"),
                        kind: StructureKind::Extension,
                        position: Position::new(24, 27),
                        progress: 0,
                        progress_total: 300,
                    },
                    ConstructionInfo {
                        id: format!("site:{colony_index}:2"),
                        kind: StructureKind::Container,
                        position: Position::new(26, 26),
                        progress: 0,
                        progress_total: 300,
                    },
                ]
            } else {
                Vec::new()
            };

            colonies.insert(
                colony_id,
                SimColony {
                    sources,
                    structures,
                    constructions,
                    hostiles: Vec::new(),
                    level: 1,
                    upgrade_progress: 0,
                    spawn_busy: false,
                },
            );
        }

        Self {
            tick: 0,
            colonies,
            agents: BTreeMap::new(),
            next_agent: 1,
            next_structure: 1,
            raid_enabled,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// End-of-tick world mechanics: source regeneration, spawn energy
    /// trickle, scenario injections, spawn cooldown reset.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        let raid = self.raid_enabled;
        for (colony_id, colony) in &mut self.colonies {
            for source in &mut colony.sources {
                source.energy = (source.energy + SOURCE_REGEN_PER_TICK).min(source.energy_capacity);
            }
            for structure in &mut colony.structures {
                if structure.kind == StructureKind::Spawn {
                    structure.energy = (structure.energy + 1).min(structure.energy_capacity);
                }
            }
            if raid && tick == RAID_TICK {
                colony.hostiles.push(HostileInfo {
                    id: format!("hostile:{colony_id}:{tick}"),
                    position: Position::new(2, 2),
                    hits: HOSTILE_HITS,
                });
            }
            colony.spawn_busy = false;
        }
    }

    fn colony_of_agent(&self, agent_id: &str) -> Option<&str> {
        self.agents.get(agent_id).map(|a| a.colony_id.as_str())
    }

    fn target_position(&self, colony_id: &str, target: &TargetRef) -> Option<Position> {
        let colony = self.colonies.get(colony_id)?;
        match target {
            TargetRef::Resource { id } => {
                colony.sources.iter().find(|s| s.id == *id).map(|s| s.position)
            }
            TargetRef::Structure { id } => colony
                .structures
                .iter()
                .find(|s| s.id == *id)
                .map(|s| s.position),
            TargetRef::Construction { id } => colony
                .constructions
                .iter()
                .find(|c| c.id == *id)
                .map(|c| c.position),
            TargetRef::Hostile { id } => colony
                .hostiles
                .iter()
                .find(|h| h.id == *id)
                .map(|h| h.position),
        }
    }

    fn finish_construction(&mut self, colony_id: &str, site_id: &str) {
        let Some(colony) = self.colonies.get_mut(colony_id) else {
            return;
        };
        let Some(index) = colony.constructions.iter().position(|c| c.id == site_id) else {
            return;
        };
        let site = colony.constructions.remove(index);
        let structure_id = format!("built:{}", self.next_structure);
        self.next_structure += 1;
        let (energy_capacity, hits_max) = match site.kind {
            StructureKind::Extension => (EXTENSION_ENERGY_CAPACITY, 1_000),
            StructureKind::Container => (2_000, 250_000),
            StructureKind::Storage => (100_000, 10_000),
            StructureKind::Turret => (1_000, 3_000),
            StructureKind::Road => (0, 5_000),
            StructureKind::Rampart | StructureKind::Wall => (0, 300_000),
            StructureKind::Spawn => (SPAWN_ENERGY_CAPACITY, 5_000),
            StructureKind::Core => (0, 10_000),
        };
        colony.structures.push(StructureInfo {
            id: structure_id,
            kind: site.kind,
            position: site.position,
            energy: 0,
            energy_capacity,
            hits: hits_max,
            hits_max,
        });
    }

    fn apply_upgrade(&mut self, colony_id: &str, amount: u32) {
        let Some(colony) = self.colonies.get_mut(colony_id) else {
            return;
        };
        colony.upgrade_progress += amount;
        let threshold = u32::from(colony.level) * UPGRADE_THRESHOLD_PER_LEVEL;
        if colony.upgrade_progress >= threshold && colony.level < 8 {
            colony.upgrade_progress -= threshold;
            colony.level += 1;
        }
    }
}

impl Environment for SimWorld {
    fn colony_ids(&self) -> Vec<String> {
        self.colonies.keys().cloned().collect()
    }

    fn sources(&self, colony_id: &str) -> Vec<SourceInfo> {
        self.colonies
            .get(colony_id)
            .map(|c| c.sources.clone())
            .unwrap_or_default()
    }

    fn structures(&self, colony_id: &str) -> Vec<StructureInfo> {
        self.colonies
            .get(colony_id)
            .map(|c| c.structures.clone())
            .unwrap_or_default()
    }

    fn construction_requests(&self, colony_id: &str) -> Vec<ConstructionInfo> {
        self.colonies
            .get(colony_id)
            .map(|c| c.constructions.clone())
            .unwrap_or_default()
    }

    fn hostiles(&self, colony_id: &str) -> Vec<HostileInfo> {
        self.colonies
            .get(colony_id)
            .map(|c| c.hostiles.clone())
            .unwrap_or_default()
    }

    fn energy_available(&self, colony_id: &str) -> u32 {
        self.colonies
            .get(colony_id)
            .map(|c| {
                c.structures
                    .iter()
                    .filter(|s| s.kind.is_core_production())
                    .map(|s| s.energy)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn energy_capacity(&self, colony_id: &str) -> u32 {
        self.colonies
            .get(colony_id)
            .map(|c| {
                c.structures
                    .iter()
                    .filter(|s| s.kind.is_core_production())
                    .map(|s| s.energy_capacity)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn development_level(&self, colony_id: &str) -> u8 {
        self.colonies.get(colony_id).map(|c| c.level).unwrap_or(0)
    }

    fn idle_spawns(&self, colony_id: &str) -> Vec<String> {
        let Some(colony) = self.colonies.get(colony_id) else {
            return Vec::new();
        };
        if colony.spawn_busy {
            return Vec::new();
        }
        colony
            .structures
            .iter()
            .filter(|s| s.kind == StructureKind::Spawn)
            .map(|s| s.id.clone())
            .collect()
    }

    fn live_agents(&self, colony_id: &str) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, agent)| agent.colony_id == colony_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn observe_agent(&self, agent_id: &str) -> Option<AgentObservation> {
        let agent = self.agents.get(agent_id)?;
        Some(AgentObservation {
            agent_id: agent_id.to_string(),
            colony_id: agent.colony_id.clone(),
            role: agent.role,
            position: agent.position,
            carried: agent.carried,
            capacity: agent.capacity,
            work_parts: agent.count_parts(Capability::Work),
            attack_parts: agent.count_parts(Capability::Attack),
        })
    }

    fn travel_cost(&self, from: Position, to: Position) -> Option<u32> {
        Some(from.chebyshev(to))
    }

    fn invoke(&mut self, agent_id: &str, intent: &ActionIntent) -> ActionStatus {
        let Some(colony_id) = self.colony_of_agent(agent_id).map(str::to_string) else {
            return ActionStatus::TargetInvalid;
        };
        let Some(target_position) = self.target_position(&colony_id, &intent.target) else {
            return ActionStatus::TargetInvalid;
        };
        let Some(agent) = self.agents.get(agent_id) else {
            return ActionStatus::TargetInvalid;
        };
        if !agent.position.is_adjacent(target_position) {
            return ActionStatus::NotAdjacent;
        }

        let work_parts = agent.count_parts(Capability::Work);
        let attack_parts = agent.count_parts(Capability::Attack);

        match (intent.capability, &intent.target) {
            (CapabilityKind::Harvest, TargetRef::Resource { id }) => {
                let colony = match self.colonies.get_mut(&colony_id) {
                    Some(colony) => colony,
                    None => return ActionStatus::TargetInvalid,
                };
                let Some(source) = colony.sources.iter_mut().find(|s| s.id == *id) else {
                    return ActionStatus::TargetInvalid;
                };
                let agent = match self.agents.get_mut(agent_id) {
                    Some(agent) => agent,
                    None => return ActionStatus::TargetInvalid,
                };
                let amount = (work_parts * HARVEST_PER_WORK_PART)
                    .min(source.energy)
                    .min(agent.capacity.saturating_sub(agent.carried));
                if amount == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                source.energy -= amount;
                agent.carried += amount;
                ActionStatus::Success
            }
            (CapabilityKind::Transfer, TargetRef::Structure { id }) => {
                let colony = match self.colonies.get_mut(&colony_id) {
                    Some(colony) => colony,
                    None => return ActionStatus::TargetInvalid,
                };
                let Some(structure) = colony.structures.iter_mut().find(|s| s.id == *id) else {
                    return ActionStatus::TargetInvalid;
                };
                let agent = match self.agents.get_mut(agent_id) {
                    Some(agent) => agent,
                    None => return ActionStatus::TargetInvalid,
                };
                let room = structure.energy_capacity.saturating_sub(structure.energy);
                let amount = intent
                    .amount
                    .unwrap_or(agent.carried)
                    .min(agent.carried)
                    .min(room);
                if amount == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                structure.energy += amount;
                agent.carried -= amount;
                ActionStatus::Success
            }
            (CapabilityKind::Withdraw, TargetRef::Structure { id }) => {
                let colony = match self.colonies.get_mut(&colony_id) {
                    Some(colony) => colony,
                    None => return ActionStatus::TargetInvalid,
                };
                let Some(structure) = colony.structures.iter_mut().find(|s| s.id == *id) else {
                    return ActionStatus::TargetInvalid;
                };
                let agent = match self.agents.get_mut(agent_id) {
                    Some(agent) => agent,
                    None => return ActionStatus::TargetInvalid,
                };
                let amount = intent
                    .amount
                    .unwrap_or(structure.energy)
                    .min(structure.energy)
                    .min(agent.capacity.saturating_sub(agent.carried));
                if amount == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                structure.energy -= amount;
                agent.carried += amount;
                ActionStatus::Success
            }
            (CapabilityKind::Build, TargetRef::Construction { id }) => {
                let site_id = id.clone();
                let finished = {
                    let colony = match self.colonies.get_mut(&colony_id) {
                        Some(colony) => colony,
                        None => return ActionStatus::TargetInvalid,
                    };
                    let Some(site) = colony.constructions.iter_mut().find(|c| c.id == site_id)
                    else {
                        return ActionStatus::TargetInvalid;
                    };
                    let agent = match self.agents.get_mut(agent_id) {
                        Some(agent) => agent,
                        None => return ActionStatus::TargetInvalid,
                    };
                    let amount = (work_parts * BUILD_PER_WORK_PART).min(agent.carried);
                    if amount == 0 {
                        return ActionStatus::CapacityExceeded;
                    }
                    agent.carried -= amount;
                    site.progress = (site.progress + amount).min(site.progress_total);
                    site.progress >= site.progress_total
                };
                if finished {
                    self.finish_construction(&colony_id, &site_id);
                }
                ActionStatus::Success
            }
            (CapabilityKind::Repair, TargetRef::Structure { id }) => {
                let colony = match self.colonies.get_mut(&colony_id) {
                    Some(colony) => colony,
                    None => return ActionStatus::TargetInvalid,
                };
                let Some(structure) = colony.structures.iter_mut().find(|s| s.id == *id) else {
                    return ActionStatus::TargetInvalid;
                };
                let agent = match self.agents.get_mut(agent_id) {
                    Some(agent) => agent,
                    None => return ActionStatus::TargetInvalid,
                };
                if agent.carried == 0 || work_parts == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                agent.carried -= 1;
                structure.hits =
                    (structure.hits + work_parts * REPAIR_PER_WORK_PART).min(structure.hits_max);
                ActionStatus::Success
            }
            (CapabilityKind::Upgrade, TargetRef::Structure { .. }) => {
                let agent = match self.agents.get_mut(agent_id) {
                    Some(agent) => agent,
                    None => return ActionStatus::TargetInvalid,
                };
                let amount = work_parts.min(agent.carried);
                if amount == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                agent.carried -= amount;
                self.apply_upgrade(&colony_id, amount);
                ActionStatus::Success
            }
            (CapabilityKind::Attack, TargetRef::Hostile { id }) => {
                let colony = match self.colonies.get_mut(&colony_id) {
                    Some(colony) => colony,
                    None => return ActionStatus::TargetInvalid,
                };
                let Some(hostile) = colony.hostiles.iter_mut().find(|h| h.id == *id) else {
                    return ActionStatus::TargetInvalid;
                };
                if attack_parts == 0 {
                    return ActionStatus::CapacityExceeded;
                }
                hostile.hits = hostile.hits.saturating_sub(attack_parts * ATTACK_PER_ATTACK_PART);
                if hostile.hits == 0 {
                    colony.hostiles.retain(|h| h.id != *id);
                }
                ActionStatus::Success
            }
            (CapabilityKind::Move, _) => self.move_toward(agent_id, &intent.target),
            _ => ActionStatus::TargetInvalid,
        }
    }

    fn move_toward(&mut self, agent_id: &str, target: &TargetRef) -> ActionStatus {
        let Some(colony_id) = self.colony_of_agent(agent_id).map(str::to_string) else {
            return ActionStatus::TargetInvalid;
        };
        let Some(destination) = self.target_position(&colony_id, target) else {
            return ActionStatus::TargetInvalid;
        };
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return ActionStatus::TargetInvalid;
        };
        agent.position.x += (destination.x - agent.position.x).signum();
        agent.position.y += (destination.y - agent.position.y).signum();
        ActionStatus::Success
    }

    fn spawn_agent(&mut self, spawn_id: &str, role: Role, parts: &[Capability]) -> SpawnStatus {
        if parts.is_empty() {
            return SpawnStatus::InvalidLoadout;
        }
        let cost = loadout_cost(parts);
        let Some((colony_id, colony)) = self
            .colonies
            .iter_mut()
            .find(|(_, c)| c.structures.iter().any(|s| s.id == spawn_id))
        else {
            return SpawnStatus::InvalidLoadout;
        };
        if colony.spawn_busy {
            return SpawnStatus::Busy;
        }
        let available: u32 = colony
            .structures
            .iter()
            .filter(|s| s.kind.is_core_production())
            .map(|s| s.energy)
            .sum();
        if available < cost {
            return SpawnStatus::InsufficientEnergy;
        }

        // Drain spawn first, then extensions, until the cost is paid.
        let mut remaining = cost;
        for structure in colony
            .structures
            .iter_mut()
            .filter(|s| s.kind.is_core_production())
        {
            let take = structure.energy.min(remaining);
            structure.energy -= take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
        colony.spawn_busy = true;

        let capacity = parts.iter().filter(|&&p| p == Capability::Carry).count() as u32 * 50;
        let agent_id = format!("agent:{}", self.next_agent);
        self.next_agent += 1;
        self.agents.insert(
            agent_id,
            SimAgent {
                colony_id: colony_id.clone(),
                role,
                position: Position::new(SPAWN_POSITION.x, SPAWN_POSITION.y + 1),
                carried: 0,
                capacity,
                parts: parts.to_vec(),
            },
        );
        SpawnStatus::Accepted
    }
}

// ---------------------------------------------------------------------------
// Run harness
// ---------------------------------------------------------------------------

/// Summary of a completed simulation run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SimReport {
    pub ticks: u64,
    pub events: Vec<Event>,
    /// Final agent headcount per colony and role.
    pub populations: BTreeMap<String, BTreeMap<Role, u32>>,
    /// Final development level per colony.
    pub levels: BTreeMap<String, u8>,
}

/// Drive every colony through every tick against a fresh simulated
/// world.
pub fn run_simulation(
    config: &SimConfig,
    store: &mut dyn RecordStore,
) -> Result<SimReport, StoreError> {
    let mut world = SimWorld::new(config);
    let scheduler = ColonyScheduler::new();
    let mut events = Vec::new();

    tracing::info!(
        run_id = %config.run_id,
        seed = config.seed,
        ticks = config.ticks,
        colonies = config.colony_count,
        "simulation starting"
    );

    for tick in 0..config.ticks {
        for colony_id in world.colony_ids() {
            let tick_events = scheduler.run_tick(&colony_id, &mut world, store, tick)?;
            events.extend(tick_events);
        }
        world.advance_tick();
    }

    let mut populations = BTreeMap::new();
    let mut levels = BTreeMap::new();
    for colony_id in world.colony_ids() {
        let mut counts: BTreeMap<Role, u32> = BTreeMap::new();
        for agent_id in world.live_agents(&colony_id) {
            if let Some(obs) = world.observe_agent(&agent_id) {
                *counts.entry(obs.role).or_insert(0) += 1;
            }
        }
        populations.insert(colony_id.clone(), counts);
        levels.insert(colony_id.clone(), world.development_level(&colony_id));
    }

    tracing::info!(
        run_id = %config.run_id,
        events = events.len(),
        "simulation finished"
    );

    Ok(SimReport {
        ticks: config.ticks,
        events,
        populations,
        levels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use contracts::EventKind;

    fn config(seed: u64, ticks: u64) -> SimConfig {
        SimConfig {
            seed,
            ticks,
            ..SimConfig::default()
        }
    }

    #[test]
    fn world_generation_is_seed_deterministic() {
        let a = SimWorld::new(&config(42, 10));
        let b = SimWorld::new(&config(42, 10));
        assert_eq!(a.sources("colony:1"), b.sources("colony:1"));

        let c = SimWorld::new(&config(43, 10));
        assert_ne!(a.sources("colony:1"), c.sources("colony:1"));
    }

    #[test]
    fn identical_runs_produce_identical_event_streams() {
        let cfg = config(1337, 60);
        let mut store_a = MemoryStore::new();
        let mut store_b = MemoryStore::new();
        let report_a = run_simulation(&cfg, &mut store_a).expect("run a");
        let report_b = run_simulation(&cfg, &mut store_b).expect("run b");
        assert_eq!(report_a.events, report_b.events);
        assert_eq!(report_a.populations, report_b.populations);
    }

    #[test]
    fn run_spawns_harvesters_first() {
        let cfg = config(7, 30);
        let mut store = MemoryStore::new();
        let report = run_simulation(&cfg, &mut store).expect("run");

        let first_spawn = report.events.iter().find_map(|e| match &e.kind {
            EventKind::SpawnRequested { role, .. } => Some(*role),
            _ => None,
        });
        assert_eq!(first_spawn, Some(Role::Harvester));
    }

    #[test]
    fn sources_regenerate_up_to_capacity() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let colony = world.colonies.get_mut("colony:1").expect("colony");
        colony.sources[0].energy = 0;
        world.advance_tick();
        let sources = world.sources("colony:1");
        assert_eq!(sources[0].energy, SOURCE_REGEN_PER_TICK);
    }

    #[test]
    fn spawn_drains_energy_and_is_busy_for_the_tick() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Work, Capability::Carry, Capability::Move];
        let status = world.spawn_agent("spawn:1:1", Role::Harvester, &parts);
        assert_eq!(status, SpawnStatus::Accepted);
        assert_eq!(world.energy_available("colony:1"), 100);
        assert!(world.idle_spawns("colony:1").is_empty());

        let status = world.spawn_agent("spawn:1:1", Role::Harvester, &parts);
        assert_eq!(status, SpawnStatus::Busy);

        world.advance_tick();
        assert!(!world.idle_spawns("colony:1").is_empty());
    }

    #[test]
    fn insufficient_energy_is_reported() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Work; 10];
        assert_eq!(
            world.spawn_agent("spawn:1:1", Role::Harvester, &parts),
            SpawnStatus::InsufficientEnergy
        );
    }

    #[test]
    fn harvest_moves_energy_from_source_to_agent() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Work, Capability::Carry, Capability::Move];
        world.spawn_agent("spawn:1:1", Role::Harvester, &parts);
        let source = world.sources("colony:1")[0].clone();
        if let Some(agent) = world.agents.get_mut("agent:1") {
            agent.position = source.position;
        }
        let intent = ActionIntent {
            target: TargetRef::Resource {
                id: source.id.clone(),
            },
            capability: CapabilityKind::Harvest,
            amount: None,
        };
        assert_eq!(world.invoke("agent:1", &intent), ActionStatus::Success);
        let obs = world.observe_agent("agent:1").expect("agent");
        assert_eq!(obs.carried, HARVEST_PER_WORK_PART);
        assert_eq!(
            world.sources("colony:1")[0].energy,
            source.energy - HARVEST_PER_WORK_PART
        );
    }

    #[test]
    fn invoking_at_distance_reports_not_adjacent() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Work, Capability::Carry, Capability::Move];
        world.spawn_agent("spawn:1:1", Role::Harvester, &parts);
        let core_intent = ActionIntent {
            target: TargetRef::Structure {
                id: "source-far".to_string(),
            },
            capability: CapabilityKind::Harvest,
            amount: None,
        };
        assert_eq!(
            world.invoke("agent:1", &core_intent),
            ActionStatus::TargetInvalid
        );

        let source = world.sources("colony:1")[0].clone();
        if let Some(agent) = world.agents.get_mut("agent:1") {
            agent.position = Position::new(source.position.x + 5, source.position.y);
        }
        let intent = ActionIntent {
            target: TargetRef::Resource { id: source.id },
            capability: CapabilityKind::Harvest,
            amount: None,
        };
        assert_eq!(world.invoke("agent:1", &intent), ActionStatus::NotAdjacent);
    }

    #[test]
    fn move_toward_steps_one_cell_diagonally() {
        let cfg = config(1, 5);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Carry, Capability::Move];
        world.spawn_agent("spawn:1:1", Role::Hauler, &parts);
        let start = world.observe_agent("agent:1").expect("agent").position;
        let target = TargetRef::Structure {
            id: "core:1".to_string(),
        };
        world.move_toward("agent:1", &target);
        let after = world.observe_agent("agent:1").expect("agent").position;
        assert_eq!(start.chebyshev(after), 1);
        assert!(after.chebyshev(CORE_POSITION) <= start.chebyshev(CORE_POSITION));
    }

    #[test]
    fn raid_flag_injects_hostiles_at_the_raid_tick() {
        let mut cfg = config(1, 5);
        cfg.scenario_flags.insert("raid".to_string(), true);
        let mut world = SimWorld::new(&cfg);
        for _ in 0..RAID_TICK {
            world.advance_tick();
        }
        assert_eq!(world.hostiles("colony:1").len(), 1);
    }

    #[test]
    fn construction_backlog_flag_seeds_sites() {
        let mut cfg = config(1, 5);
        cfg.scenario_flags.insert("construction_backlog".to_string(), true);
        let world = SimWorld::new(&cfg);
        assert_eq!(world.construction_requests("colony:1").len(), 2);
    }

    #[test]
    fn finished_construction_becomes_a_structure() {
        let mut cfg = config(1, 5);
        cfg.scenario_flags.insert("construction_backlog".to_string(), true);
        let mut world = SimWorld::new(&cfg);
        let parts = vec![Capability::Work, Capability::Carry, Capability::Move];
        world.spawn_agent("spawn:1:1", Role::Builder, &parts);
        let site = world.construction_requests("colony:1")[0].clone();
        if let Some(agent) = world.agents.get_mut("agent:1") {
            agent.position = site.position;
            agent.carried = agent.capacity;
        }
        let intent = ActionIntent {
            target: TargetRef::Construction {
                id: site.id.clone(),
            },
            capability: CapabilityKind::Build,
            amount: None,
        };
        let structures_before = world.structures("colony:1").len();
        for _ in 0..200 {
            let status = world.invoke("agent:1", &intent);
            if status != ActionStatus::Success {
                if let Some(agent) = world.agents.get_mut("agent:1") {
                    agent.carried = agent.capacity;
                }
            }
            if world
                .construction_requests("colony:1")
                .iter()
                .all(|c| c.id != site.id)
            {
                break;
            }
        }
        assert!(world
            .construction_requests("colony:1")
            .iter()
            .all(|c| c.id != site.id));
        assert_eq!(world.structures("colony:1").len(), structures_before + 1);
    }
}
