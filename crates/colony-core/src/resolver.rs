//! Per-state action resolution via ranked fallback search.
//!
//! Each behavioral state owns an ordered list of candidate rules. The
//! resolver walks the list in priority order and commits to the first
//! rule that yields a non-empty candidate set; lower-priority rules are
//! never evaluated once a higher one succeeds. Within a rule, ties
//! break by nearest travel cost unless the rule scores candidates
//! itself. Every chain ends in a terminal default rule so an agent is
//! never left idle.

use std::collections::BTreeMap;

use contracts::{
    ActionIntent, AgentState, CapabilityKind, Position, StructureKind, TargetRef,
};

use crate::environment::{AgentObservation, Environment};

/// Turrets are topped up only below this fullness ceiling.
pub const TURRET_FILL_CEILING_PERMILLE: u32 = 900;
/// Core production structures may be reclaimed from only above this
/// fullness threshold, so gathering never starves spawning.
pub const RECLAIM_FULLNESS_PERMILLE: u32 = 950;
/// Containers this close (Chebyshev) to the colony core count as
/// objective-adjacent deposit targets.
pub const CORE_CONTAINER_RADIUS: u32 = 4;
/// Containers this close (Chebyshev) to a source are treated as that
/// source's drop-off and are excluded from generic delivery.
pub const SOURCE_CONTAINER_RADIUS: u32 = 2;

const BUILD_PROGRESS_WEIGHT: i64 = 2;
const BUILD_IMPORTANCE_WEIGHT: i64 = 300;
const BUILD_DISTANCE_WEIGHT: i64 = 10;

/// Energy a structure keeps for itself; withdrawals only take the
/// surplus above this reserve.
fn withdraw_reserve(kind: StructureKind) -> Option<u32> {
    match kind {
        StructureKind::Spawn | StructureKind::Extension => Some(300),
        StructureKind::Container => Some(50),
        StructureKind::Storage => Some(0),
        _ => None,
    }
}

/// Fixed per-structure-type importance weight for construction scoring.
fn build_importance(kind: StructureKind) -> i64 {
    match kind {
        StructureKind::Spawn => 9,
        StructureKind::Extension => 8,
        StructureKind::Turret => 7,
        StructureKind::Storage => 6,
        StructureKind::Container => 5,
        StructureKind::Road => 3,
        StructureKind::Rampart => 2,
        StructureKind::Wall => 1,
        StructureKind::Core => 0,
    }
}

// ---------------------------------------------------------------------------
// Candidates and rules
// ---------------------------------------------------------------------------

/// Read-only context handed to candidate rules: one agent, one colony,
/// the live environment.
pub struct ResolveCtx<'a> {
    pub colony_id: &'a str,
    pub observation: &'a AgentObservation,
    /// Remembered target id from the durable record, if any.
    pub remembered_target: Option<&'a str>,
    pub env: &'a dyn Environment,
}

impl ResolveCtx<'_> {
    fn core_position(&self) -> Option<Position> {
        self.env
            .structures(self.colony_id)
            .into_iter()
            .find(|s| s.kind == StructureKind::Core)
            .map(|s| s.position)
    }
}

/// One potential target produced by a rule. `score` is set only by
/// rules that rank candidates themselves; unscored candidates fall back
/// to the nearest-by-travel-cost tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub intent: ActionIntent,
    pub position: Position,
    pub score: Option<i64>,
}

impl Candidate {
    fn new(intent: ActionIntent, position: Position) -> Self {
        Self {
            intent,
            position,
            score: None,
        }
    }
}

/// One entry in a state's ranked fallback search.
pub trait CandidateRule {
    fn name(&self) -> &'static str;
    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate>;
}

/// The resolver's commitment for one agent-tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAction {
    pub rule: &'static str,
    pub intent: ActionIntent,
}

/// Ordered rule list with first-match-wins semantics. Fallback order is
/// an explicit data structure, not implicit control flow.
pub struct FallbackChain {
    rules: Vec<Box<dyn CandidateRule>>,
}

impl FallbackChain {
    pub fn new(rules: Vec<Box<dyn CandidateRule>>) -> Self {
        Self { rules }
    }

    /// Evaluate rules in priority order; commit to the first rule with
    /// a non-empty candidate set.
    pub fn resolve(&self, ctx: &ResolveCtx<'_>) -> Option<ResolvedAction> {
        for rule in &self.rules {
            let candidates = rule.candidates(ctx);
            if candidates.is_empty() {
                continue;
            }
            let chosen = select_candidate(ctx, candidates);
            return Some(ResolvedAction {
                rule: rule.name(),
                intent: chosen.intent,
            });
        }
        None
    }
}

/// Pick one candidate from the winning rule's set: a still-valid
/// remembered target is kept (cheap hysteresis), scored candidates take
/// the maximum, unscored ones the nearest by travel cost with a
/// deterministic id tie-break.
fn select_candidate(ctx: &ResolveCtx<'_>, mut candidates: Vec<Candidate>) -> Candidate {
    if let Some(remembered) = ctx.remembered_target {
        if let Some(index) = candidates
            .iter()
            .position(|candidate| candidate.intent.target.id() == remembered)
        {
            return candidates.swap_remove(index);
        }
    }

    let from = ctx.observation.position;
    let rank = |candidate: &Candidate| -> (i64, i64, String) {
        let distance = ctx
            .env
            .travel_cost(from, candidate.position)
            .map_or(i64::MAX, i64::from);
        // Higher score first, then closer, then stable id order.
        (
            -candidate.score.unwrap_or(0),
            distance,
            candidate.intent.target.id().to_string(),
        )
    };
    candidates.sort_by_key(rank);
    candidates.remove(0)
}

// ---------------------------------------------------------------------------
// Delivery rules
// ---------------------------------------------------------------------------

/// Capacity-limited core production structures (spawns, extensions)
/// that still need energy.
struct NeedyCoreProductionRule;

impl CandidateRule for NeedyCoreProductionRule {
    fn name(&self) -> &'static str {
        "deliver.core_production"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| s.kind.is_core_production() && s.energy < s.energy_capacity)
            .map(|s| transfer_to(&s.id, s.position))
            .collect()
    }
}

/// Defense structures below the configurable fullness ceiling.
struct TurretTopUpRule;

impl CandidateRule for TurretTopUpRule {
    fn name(&self) -> &'static str {
        "deliver.turret"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                s.kind == StructureKind::Turret
                    && s.fullness_permille() < TURRET_FILL_CEILING_PERMILLE
            })
            .map(|s| transfer_to(&s.id, s.position))
            .collect()
    }
}

/// Containers within a small radius of the colony core.
struct CoreAdjacentContainerRule;

impl CandidateRule for CoreAdjacentContainerRule {
    fn name(&self) -> &'static str {
        "deliver.core_container"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let Some(core) = ctx.core_position() else {
            return Vec::new();
        };
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                s.kind == StructureKind::Container
                    && s.energy < s.energy_capacity
                    && s.position.chebyshev(core) <= CORE_CONTAINER_RADIUS
            })
            .map(|s| transfer_to(&s.id, s.position))
            .collect()
    }
}

/// Containers that are not acting as a source drop-off.
struct FreeContainerRule;

impl CandidateRule for FreeContainerRule {
    fn name(&self) -> &'static str {
        "deliver.free_container"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let sources = ctx.env.sources(ctx.colony_id);
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                s.kind == StructureKind::Container
                    && s.energy < s.energy_capacity
                    && !sources
                        .iter()
                        .any(|src| src.position.chebyshev(s.position) <= SOURCE_CONTAINER_RADIUS)
            })
            .map(|s| transfer_to(&s.id, s.position))
            .collect()
    }
}

/// Generic overflow storage.
struct StorageDepositRule;

impl CandidateRule for StorageDepositRule {
    fn name(&self) -> &'static str {
        "deliver.storage"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| s.kind == StructureKind::Storage && s.energy < s.energy_capacity)
            .map(|s| transfer_to(&s.id, s.position))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Gather rules
// ---------------------------------------------------------------------------

/// Reclaim energy from over-full core production structures, capped by
/// free capacity and the structure's surplus above its reserve.
struct ReclaimOverfullRule;

impl CandidateRule for ReclaimOverfullRule {
    fn name(&self) -> &'static str {
        "gather.reclaim_overfull"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let free = ctx.observation.free_capacity();
        if free == 0 {
            return Vec::new();
        }
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                s.kind.is_core_production()
                    && s.fullness_permille() >= RECLAIM_FULLNESS_PERMILLE
            })
            .filter_map(|s| {
                let reserve = withdraw_reserve(s.kind)?;
                let surplus = s.energy.saturating_sub(reserve);
                let amount = surplus.min(free);
                (amount > 0).then(|| withdraw_from(&s.id, s.position, amount))
            })
            .collect()
    }
}

/// Withdraw from containers and storage holding surplus energy.
struct StockpileWithdrawRule;

impl CandidateRule for StockpileWithdrawRule {
    fn name(&self) -> &'static str {
        "gather.stockpile"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let free = ctx.observation.free_capacity();
        if free == 0 {
            return Vec::new();
        }
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                matches!(s.kind, StructureKind::Container | StructureKind::Storage)
            })
            .filter_map(|s| {
                let reserve = withdraw_reserve(s.kind)?;
                let surplus = s.energy.saturating_sub(reserve);
                let amount = surplus.min(free);
                (amount > 0).then(|| withdraw_from(&s.id, s.position, amount))
            })
            .collect()
    }
}

/// Containers serving as source drop-offs; the hauler's first stop.
struct SourceContainerPickupRule;

impl CandidateRule for SourceContainerPickupRule {
    fn name(&self) -> &'static str {
        "gather.source_container"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let free = ctx.observation.free_capacity();
        if free == 0 {
            return Vec::new();
        }
        let sources = ctx.env.sources(ctx.colony_id);
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| {
                s.kind == StructureKind::Container
                    && s.energy > 0
                    && sources
                        .iter()
                        .any(|src| src.position.chebyshev(s.position) <= SOURCE_CONTAINER_RADIUS)
            })
            .map(|s| withdraw_from(&s.id, s.position, s.energy.min(free)))
            .collect()
    }
}

/// Harvest from an active resource node. Requires work capability.
struct HarvestSourceRule;

impl CandidateRule for HarvestSourceRule {
    fn name(&self) -> &'static str {
        "gather.harvest"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        if ctx.observation.work_parts == 0 {
            return Vec::new();
        }
        ctx.env
            .sources(ctx.colony_id)
            .into_iter()
            .filter(|src| src.is_active())
            .map(|src| {
                Candidate::new(
                    ActionIntent {
                        target: TargetRef::Resource { id: src.id },
                        capability: CapabilityKind::Harvest,
                        amount: None,
                    },
                    src.position,
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Build / repair / upgrade / combat rules
// ---------------------------------------------------------------------------

/// Construction requests scored by a weighted blend of completion
/// share and per-structure-type importance, minus a distance penalty.
struct ScoredConstructionRule;

impl CandidateRule for ScoredConstructionRule {
    fn name(&self) -> &'static str {
        "build.scored_construction"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        let from = ctx.observation.position;
        ctx.env
            .construction_requests(ctx.colony_id)
            .into_iter()
            .map(|site| {
                let distance = ctx
                    .env
                    .travel_cost(from, site.position)
                    .map_or(i64::MAX / BUILD_DISTANCE_WEIGHT, i64::from);
                let score = i64::from(site.completion_permille()) * BUILD_PROGRESS_WEIGHT
                    + build_importance(site.kind) * BUILD_IMPORTANCE_WEIGHT
                    - distance * BUILD_DISTANCE_WEIGHT;
                Candidate {
                    intent: ActionIntent {
                        target: TargetRef::Construction { id: site.id },
                        capability: CapabilityKind::Build,
                        amount: None,
                    },
                    position: site.position,
                    score: Some(score),
                }
            })
            .collect()
    }
}

/// Structures needing repair, fortification kinds excluded.
struct DamagedStructureRule;

impl CandidateRule for DamagedStructureRule {
    fn name(&self) -> &'static str {
        "repair.damaged"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| s.needs_repair() && !s.kind.is_fortification())
            .map(|s| {
                Candidate::new(
                    ActionIntent {
                        target: TargetRef::Structure { id: s.id },
                        capability: CapabilityKind::Repair,
                        amount: None,
                    },
                    s.position,
                )
            })
            .collect()
    }
}

/// Contribute to colony development: the terminal default for spend
/// phases.
struct UpgradeCoreRule;

impl CandidateRule for UpgradeCoreRule {
    fn name(&self) -> &'static str {
        "default.upgrade_core"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .filter(|s| s.kind == StructureKind::Core)
            .map(|s| {
                Candidate::new(
                    ActionIntent {
                        target: TargetRef::Structure { id: s.id },
                        capability: CapabilityKind::Upgrade,
                        amount: None,
                    },
                    s.position,
                )
            })
            .collect()
    }
}

/// Nearest hostile unit.
struct HostileRule;

impl CandidateRule for HostileRule {
    fn name(&self) -> &'static str {
        "engage.hostile"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .hostiles(ctx.colony_id)
            .into_iter()
            .map(|hostile| {
                Candidate::new(
                    ActionIntent {
                        target: TargetRef::Hostile { id: hostile.id },
                        capability: CapabilityKind::Attack,
                        amount: None,
                    },
                    hostile.position,
                )
            })
            .collect()
    }
}

/// Movement toward the colony core: the terminal default for gather
/// phases with nothing to gather.
struct RallyRule;

impl CandidateRule for RallyRule {
    fn name(&self) -> &'static str {
        "default.rally"
    }

    fn candidates(&self, ctx: &ResolveCtx<'_>) -> Vec<Candidate> {
        ctx.env
            .structures(ctx.colony_id)
            .into_iter()
            .find(|s| s.kind == StructureKind::Core)
            .map(|s| {
                Candidate::new(
                    ActionIntent {
                        target: TargetRef::Structure { id: s.id },
                        capability: CapabilityKind::Move,
                        amount: None,
                    },
                    s.position,
                )
            })
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

fn transfer_to(id: &str, position: Position) -> Candidate {
    Candidate::new(
        ActionIntent {
            target: TargetRef::Structure { id: id.to_string() },
            capability: CapabilityKind::Transfer,
            amount: None,
        },
        position,
    )
}

fn withdraw_from(id: &str, position: Position, amount: u32) -> Candidate {
    Candidate::new(
        ActionIntent {
            target: TargetRef::Structure { id: id.to_string() },
            capability: CapabilityKind::Withdraw,
            amount: Some(amount),
        },
        position,
    )
}

/// Maps each behavioral state to its fallback chain and selects zero or
/// one action per agent per tick.
pub struct ActionResolver {
    chains: BTreeMap<AgentState, FallbackChain>,
}

impl ActionResolver {
    /// The canonical chain table.
    pub fn new() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(
            AgentState::Harvest,
            FallbackChain::new(vec![
                Box::new(ReclaimOverfullRule) as Box<dyn CandidateRule>,
                Box::new(HarvestSourceRule),
                Box::new(RallyRule),
            ]),
        );
        chains.insert(
            AgentState::Pickup,
            FallbackChain::new(vec![
                Box::new(SourceContainerPickupRule) as Box<dyn CandidateRule>,
                Box::new(ReclaimOverfullRule),
                Box::new(RallyRule),
            ]),
        );
        chains.insert(
            AgentState::Collect,
            FallbackChain::new(vec![
                Box::new(StockpileWithdrawRule) as Box<dyn CandidateRule>,
                Box::new(ReclaimOverfullRule),
                Box::new(HarvestSourceRule),
                Box::new(RallyRule),
            ]),
        );
        // Hostiles outrank rearming: a defender caught mid-refill still
        // fights.
        chains.insert(
            AgentState::Rearm,
            FallbackChain::new(vec![
                Box::new(HostileRule) as Box<dyn CandidateRule>,
                Box::new(StockpileWithdrawRule),
                Box::new(ReclaimOverfullRule),
                Box::new(RallyRule),
            ]),
        );
        chains.insert(
            AgentState::Deliver,
            FallbackChain::new(vec![
                Box::new(NeedyCoreProductionRule) as Box<dyn CandidateRule>,
                Box::new(TurretTopUpRule),
                Box::new(CoreAdjacentContainerRule),
                Box::new(FreeContainerRule),
                Box::new(StorageDepositRule),
                Box::new(UpgradeCoreRule),
            ]),
        );
        chains.insert(
            AgentState::Build,
            FallbackChain::new(vec![
                Box::new(ScoredConstructionRule) as Box<dyn CandidateRule>,
                Box::new(UpgradeCoreRule),
            ]),
        );
        chains.insert(
            AgentState::Repair,
            FallbackChain::new(vec![
                Box::new(DamagedStructureRule) as Box<dyn CandidateRule>,
                Box::new(ScoredConstructionRule),
                Box::new(UpgradeCoreRule),
            ]),
        );
        chains.insert(
            AgentState::Upgrade,
            FallbackChain::new(vec![Box::new(UpgradeCoreRule) as Box<dyn CandidateRule>]),
        );
        chains.insert(
            AgentState::Engage,
            FallbackChain::new(vec![
                Box::new(HostileRule) as Box<dyn CandidateRule>,
                Box::new(TurretTopUpRule),
                Box::new(RallyRule),
            ]),
        );
        Self { chains }
    }

    /// Replace one state's chain. Test hook and extension point.
    pub fn with_chain(mut self, state: AgentState, chain: FallbackChain) -> Self {
        self.chains.insert(state, chain);
        self
    }

    pub fn resolve(&self, state: AgentState, ctx: &ResolveCtx<'_>) -> Option<ResolvedAction> {
        let chain = self.chains.get(&state)?;
        chain.resolve(ctx)
    }
}

impl Default for ActionResolver {
    fn default() -> Self {
        Self::new()
    }
}
