//! The environment surface the kernel consumes each tick: telemetry
//! queries, capability primitives, and the spawn primitive. Path
//! computation stays behind `travel_cost`; the kernel never sees
//! terrain.

use contracts::{
    ActionIntent, ActionStatus, Capability, Position, Role, SpawnStatus, StructureKind, TargetRef,
};

/// Live observation of a single agent. Guards and rules read this,
/// never stale snapshot data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentObservation {
    pub agent_id: String,
    pub colony_id: String,
    pub role: Role,
    pub position: Position,
    pub carried: u32,
    pub capacity: u32,
    pub work_parts: u32,
    pub attack_parts: u32,
}

impl AgentObservation {
    pub fn free_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.carried)
    }
}

/// A harvestable resource node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: String,
    pub position: Position,
    pub energy: u32,
    pub energy_capacity: u32,
}

impl SourceInfo {
    pub fn is_active(&self) -> bool {
        self.energy > 0
    }
}

/// A built structure and its energy/hit-point telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureInfo {
    pub id: String,
    pub kind: StructureKind,
    pub position: Position,
    pub energy: u32,
    pub energy_capacity: u32,
    pub hits: u32,
    pub hits_max: u32,
}

impl StructureInfo {
    pub fn fullness_permille(&self) -> u32 {
        if self.energy_capacity == 0 {
            return 0;
        }
        self.energy.saturating_mul(1000) / self.energy_capacity
    }

    pub fn damage_permille(&self) -> u32 {
        if self.hits_max == 0 {
            return 0;
        }
        self.hits_max.saturating_sub(self.hits).saturating_mul(1000) / self.hits_max
    }

    pub fn needs_repair(&self) -> bool {
        self.hits < self.hits_max
    }
}

/// An open construction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionInfo {
    pub id: String,
    pub kind: StructureKind,
    pub position: Position,
    pub progress: u32,
    pub progress_total: u32,
}

impl ConstructionInfo {
    pub fn completion_permille(&self) -> u32 {
        if self.progress_total == 0 {
            return 0;
        }
        self.progress.saturating_mul(1000) / self.progress_total
    }
}

/// A hostile unit observed inside the colony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostileInfo {
    pub id: String,
    pub position: Position,
    pub hits: u32,
}

/// Everything the kernel needs from the outside world. One synchronous
/// pass per tick; no operation suspends, every capability invocation
/// returns a status code immediately.
pub trait Environment {
    // -- telemetry ----------------------------------------------------------

    fn colony_ids(&self) -> Vec<String>;
    fn sources(&self, colony_id: &str) -> Vec<SourceInfo>;
    fn structures(&self, colony_id: &str) -> Vec<StructureInfo>;
    fn construction_requests(&self, colony_id: &str) -> Vec<ConstructionInfo>;
    fn hostiles(&self, colony_id: &str) -> Vec<HostileInfo>;
    fn energy_available(&self, colony_id: &str) -> u32;
    fn energy_capacity(&self, colony_id: &str) -> u32;
    fn development_level(&self, colony_id: &str) -> u8;
    /// Production facilities idle this tick, i.e. able to accept a
    /// spawn request.
    fn idle_spawns(&self, colony_id: &str) -> Vec<String>;
    fn live_agents(&self, colony_id: &str) -> Vec<String>;
    fn observe_agent(&self, agent_id: &str) -> Option<AgentObservation>;

    /// Opaque travel-cost estimate between two positions. `None` means
    /// no path is currently known.
    fn travel_cost(&self, from: Position, to: Position) -> Option<u32>;

    // -- capabilities -------------------------------------------------------

    /// Invoke one capability on one target. Exactly one call per agent
    /// per tick is made by the scheduler.
    fn invoke(&mut self, agent_id: &str, intent: &ActionIntent) -> ActionStatus;

    /// Movement intent toward a target, issued when a capability
    /// reports `NotAdjacent`.
    fn move_toward(&mut self, agent_id: &str, target: &TargetRef) -> ActionStatus;

    /// Attempt to materialize a new agent with the given loadout.
    fn spawn_agent(&mut self, spawn_id: &str, role: Role, parts: &[Capability]) -> SpawnStatus;
}
