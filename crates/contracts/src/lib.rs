//! v1 cross-boundary contracts for the colony decision kernel, durable
//! records, and the simulation driver.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Default bounded length of the per-turret trailing energy history.
pub const TURRET_HISTORY_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Roles and behavioral states
// ---------------------------------------------------------------------------

/// Worker role. Declaration order is the static spawn priority: the
/// planner serves deficits top to bottom and never reorders dynamically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Harvester,
    Hauler,
    Defender,
    Upgrader,
    Builder,
    Repairer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Harvester,
        Role::Hauler,
        Role::Defender,
        Role::Upgrader,
        Role::Builder,
        Role::Repairer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Harvester => "harvester",
            Role::Hauler => "hauler",
            Role::Defender => "defender",
            Role::Upgrader => "upgrader",
            Role::Builder => "builder",
            Role::Repairer => "repairer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral state of an agent. Each role owns a subset of these; the
/// catalog's transition table is the authority on which.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Harvest,
    Deliver,
    Pickup,
    Collect,
    Build,
    Upgrade,
    Repair,
    Rearm,
    Engage,
}

/// Pure predicate over an agent's live inventory deciding whether a
/// state transition fires. Never evaluated against snapshot data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    InventoryFull,
    InventoryEmpty,
}

impl Guard {
    /// Evaluate against the observed carried amount and capacity.
    ///
    /// A zero-capacity inventory is never full; otherwise the two
    /// guards would both hold at once and the state would flip every
    /// tick.
    pub fn holds(self, carried: u32, capacity: u32) -> bool {
        match self {
            Guard::InventoryFull => capacity > 0 && carried >= capacity,
            Guard::InventoryEmpty => carried == 0,
        }
    }
}

/// One entry of a role's transition table: when `guard` holds for the
/// current state, the agent moves to `next`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateTransition {
    pub guard: Guard,
    pub next: AgentState,
}

/// Immutable definition of one role: ordered state list, initial state,
/// transition table, and the ascending loadout tier table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleDefinition {
    pub role: Role,
    pub states: Vec<AgentState>,
    pub initial: AgentState,
    pub transitions: BTreeMap<AgentState, StateTransition>,
    pub loadouts: Vec<LoadoutTier>,
}

// ---------------------------------------------------------------------------
// Capabilities and loadouts
// ---------------------------------------------------------------------------

/// Body capability unit purchased as part of a loadout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Work,
    Carry,
    Move,
    Attack,
    Tough,
}

impl Capability {
    /// Energy cost of one unit.
    pub fn cost(self) -> u32 {
        match self {
            Capability::Work => 100,
            Capability::Carry => 50,
            Capability::Move => 50,
            Capability::Attack => 80,
            Capability::Tough => 10,
        }
    }
}

/// Total energy cost of a loadout.
pub fn loadout_cost(parts: &[Capability]) -> u32 {
    parts.iter().map(|part| part.cost()).sum()
}

/// One affordable tier of a role's loadout table. Tables are sorted
/// ascending by `cost` and are monotonically non-decreasing in
/// capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadoutTier {
    pub cost: u32,
    pub parts: Vec<Capability>,
}

// ---------------------------------------------------------------------------
// Positions and targets
// ---------------------------------------------------------------------------

/// Grid position. Travel cost between positions is an opaque
/// environment capability; adjacency is Chebyshev distance <= 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, the adjacency metric.
    pub fn chebyshev(self, other: Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    pub fn is_adjacent(self, other: Position) -> bool {
        self.chebyshev(other) <= 1
    }
}

/// Structure classification used by telemetry and candidate rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Spawn,
    Extension,
    Turret,
    Container,
    Storage,
    Road,
    Rampart,
    Wall,
    Core,
}

impl StructureKind {
    /// Fortifications are excluded from the default repair policy.
    pub fn is_fortification(self) -> bool {
        matches!(self, StructureKind::Rampart | StructureKind::Wall)
    }

    /// Spawns and extensions: the capacity-limited core production
    /// structures that feed agent materialization.
    pub fn is_core_production(self) -> bool {
        matches!(self, StructureKind::Spawn | StructureKind::Extension)
    }
}

/// Tagged reference to an action target. The variant is fixed when the
/// candidate is constructed, never re-derived at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRef {
    Resource { id: String },
    Structure { id: String },
    Construction { id: String },
    Hostile { id: String },
}

impl TargetRef {
    pub fn id(&self) -> &str {
        match self {
            TargetRef::Resource { id }
            | TargetRef::Structure { id }
            | TargetRef::Construction { id }
            | TargetRef::Hostile { id } => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Capability invocation
// ---------------------------------------------------------------------------

/// Primitive action an agent performs on a target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Harvest,
    Transfer,
    Withdraw,
    Build,
    Repair,
    Upgrade,
    Attack,
    Move,
}

/// Fully resolved intent: one target, one capability, an optional
/// amount for withdraw/transfer. Exactly one is invoked per agent per
/// tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionIntent {
    pub target: TargetRef,
    pub capability: CapabilityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

/// Status code of a capability invocation. `NotAdjacent` is not an
/// error: it triggers a movement intent toward the same target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    NotAdjacent,
    NoPath,
    TargetInvalid,
    CapacityExceeded,
    CooldownActive,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::NotAdjacent => "not_adjacent",
            ActionStatus::NoPath => "no_path",
            ActionStatus::TargetInvalid => "target_invalid",
            ActionStatus::CapacityExceeded => "capacity_exceeded",
            ActionStatus::CooldownActive => "cooldown_active",
        }
    }
}

/// Status code of a spawn attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStatus {
    Accepted,
    Busy,
    InsufficientEnergy,
    InvalidLoadout,
}

// ---------------------------------------------------------------------------
// Colony telemetry snapshot
// ---------------------------------------------------------------------------

/// Read-only colony telemetry, rebuilt every tick from live environment
/// queries and never persisted. All planner formulas are pure functions
/// of this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColonySnapshot {
    pub colony_id: String,
    pub tick: u64,
    pub energy_available: u32,
    pub energy_capacity: u32,
    pub source_count: u32,
    pub construction_request_count: u32,
    pub development_level: u8,
    pub population: BTreeMap<Role, u32>,
    pub idle_spawn_ids: Vec<String>,
    /// Work parts currently deployed across live harvesters.
    pub deployed_work_parts: u32,
    pub hostile_count: u32,
    /// Non-fortification structures below full hit points.
    pub damaged_structure_count: u32,
    /// Aggregate missing-hits share across qualifying structures, in
    /// per-mille.
    pub damage_ratio_permille: u32,
    /// Trailing mean turret fullness in per-mille, if any turret
    /// history has been observed.
    pub turret_fullness_mean_permille: Option<u32>,
}

impl ColonySnapshot {
    pub fn population_of(&self, role: Role) -> u32 {
        self.population.get(&role).copied().unwrap_or(0)
    }
}

/// At most one per colony per tick: the chosen role and the best
/// loadout affordable at current energy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnRequest {
    pub colony_id: String,
    pub spawn_id: String,
    pub role: Role,
    pub parts: Vec<Capability>,
    pub cost: u32,
}

// ---------------------------------------------------------------------------
// Durable records
// ---------------------------------------------------------------------------

/// Durable per-agent record. Survives across ticks; garbage-collected
/// when the environment reports the agent gone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRecord {
    pub schema_version: String,
    pub colony_id: String,
    pub role: Role,
    /// Absent until the first tick after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AgentState>,
    /// Remembered target id; cleared when it no longer resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl AgentRecord {
    pub fn new(colony_id: impl Into<String>, role: Role) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            colony_id: colony_id.into(),
            role,
            state: None,
            target: None,
        }
    }
}

/// Durable per-colony record: the bounded trailing turret-energy
/// history, keyed by structure id. Entries whose key no longer resolves
/// are evicted by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColonyRecord {
    pub schema_version: String,
    #[serde(default)]
    pub turret_fullness_permille: BTreeMap<String, Vec<u32>>,
}

impl ColonyRecord {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            turret_fullness_permille: BTreeMap::new(),
        }
    }
}

impl Default for ColonyRecord {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Observability events
// ---------------------------------------------------------------------------

/// One observable kernel decision. Events are advisory telemetry, never
/// replayed into decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub event_id: String,
    pub tick: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StateChanged {
        agent_id: String,
        role: Role,
        from: Option<AgentState>,
        to: AgentState,
    },
    SpawnRequested {
        colony_id: String,
        role: Role,
        cost: u32,
        status: SpawnStatus,
    },
    ActionFailed {
        agent_id: String,
        capability: CapabilityKind,
        target_id: String,
        status: ActionStatus,
    },
    RecordEvicted {
        agent_id: String,
    },
}

// ---------------------------------------------------------------------------
// Simulation run configuration
// ---------------------------------------------------------------------------

/// Configuration for a deterministic simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub ticks: u64,
    pub colony_count: u32,
    pub sources_per_colony: u32,
    #[serde(default)]
    pub scenario_flags: BTreeMap<String, bool>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_local_001".to_string(),
            seed: 1337,
            ticks: 500,
            colony_count: 1,
            sources_per_colony: 2,
            scenario_flags: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_full_requires_capacity_reached() {
        assert!(Guard::InventoryFull.holds(50, 50));
        assert!(Guard::InventoryFull.holds(60, 50));
        assert!(!Guard::InventoryFull.holds(49, 50));
    }

    #[test]
    fn zero_capacity_inventory_is_empty_not_full() {
        assert!(!Guard::InventoryFull.holds(0, 0));
        assert!(Guard::InventoryEmpty.holds(0, 0));
    }

    #[test]
    fn guard_empty_only_at_zero() {
        assert!(Guard::InventoryEmpty.holds(0, 50));
        assert!(!Guard::InventoryEmpty.holds(1, 50));
    }

    #[test]
    fn loadout_cost_sums_part_costs() {
        let parts = [Capability::Work, Capability::Carry, Capability::Move];
        assert_eq!(loadout_cost(&parts), 200);
    }

    #[test]
    fn chebyshev_adjacency() {
        let origin = Position::new(10, 10);
        assert!(origin.is_adjacent(Position::new(11, 11)));
        assert!(origin.is_adjacent(Position::new(10, 10)));
        assert!(!origin.is_adjacent(Position::new(12, 10)));
    }

    #[test]
    fn fortifications_excluded_from_repair_filter() {
        assert!(StructureKind::Wall.is_fortification());
        assert!(StructureKind::Rampart.is_fortification());
        assert!(!StructureKind::Container.is_fortification());
    }

    #[test]
    fn sim_config_round_trips_with_string_seed() {
        let config = SimConfig {
            seed: u64::MAX,
            ..SimConfig::default()
        };
        let encoded = serde_json::to_string(&config).expect("serialize");
        assert!(encoded.contains("\"18446744073709551615\""));
        let decoded: SimConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(config, decoded);
    }

    #[test]
    fn agent_record_state_absent_until_first_tick() {
        let record = AgentRecord::new("colony:1", Role::Harvester);
        let encoded = serde_json::to_string(&record).expect("serialize");
        assert!(!encoded.contains("\"state\""));
        let decoded: AgentRecord = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded.state, None);
    }
}
