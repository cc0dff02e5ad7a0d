//! Static role catalog: per-role state graphs and loadout cost tables.
//! Built once at scheduler construction, never mutated at runtime.
//! Failed lookups signal a configuration fault, not a per-agent
//! failure.

use std::collections::BTreeMap;
use std::fmt;

use contracts::{
    loadout_cost, AgentState, Capability, Guard, LoadoutTier, Role, RoleDefinition,
    StateTransition,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    UnknownRole(Role),
    MissingTransition { role: Role, state: AgentState },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRole(role) => write!(f, "unknown role: {role}"),
            Self::MissingTransition { role, state } => {
                write!(f, "role {role} has no transition entry for state {state:?}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Read-only registry of role definitions.
#[derive(Debug, Clone)]
pub struct RoleCatalog {
    definitions: BTreeMap<Role, RoleDefinition>,
}

impl RoleCatalog {
    pub fn new(definitions: Vec<RoleDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|definition| (definition.role, definition))
                .collect(),
        }
    }

    /// The canonical six-role catalog. Every role follows the two-state
    /// gather/spend convention: the gather state transitions on a full
    /// inventory, the spend state on an empty one.
    pub fn default_catalog() -> Self {
        Self::new(vec![
            two_state_role(
                Role::Harvester,
                AgentState::Harvest,
                AgentState::Deliver,
                vec![
                    tier(&[W, C, M]),
                    tier(&[W, W, C, M]),
                    tier(&[W, W, C, C, M, M]),
                    tier(&[W, W, W, C, C, M, M]),
                    tier(&[W, W, W, W, C, C, M, M, M]),
                ],
            ),
            two_state_role(
                Role::Hauler,
                AgentState::Pickup,
                AgentState::Deliver,
                vec![
                    tier(&[C, C, M]),
                    tier(&[C, C, C, C, M, M]),
                    tier(&[C, C, C, C, C, C, M, M, M]),
                    tier(&[C, C, C, C, C, C, C, C, M, M, M, M]),
                ],
            ),
            two_state_role(
                Role::Defender,
                AgentState::Rearm,
                AgentState::Engage,
                // Carry capacity lets a rearmed defender top up turrets
                // while engaged, which drains it back to the rearm phase.
                vec![
                    tier(&[T, A, C, M, M]),
                    tier(&[T, T, A, A, C, M, M, M]),
                    tier(&[T, T, A, A, A, C, C, M, M, M, M]),
                ],
            ),
            two_state_role(
                Role::Upgrader,
                AgentState::Collect,
                AgentState::Upgrade,
                vec![
                    tier(&[W, C, M]),
                    tier(&[W, W, C, C, M, M]),
                    tier(&[W, W, W, C, C, M, M]),
                ],
            ),
            two_state_role(
                Role::Builder,
                AgentState::Collect,
                AgentState::Build,
                vec![
                    tier(&[W, C, M]),
                    tier(&[W, W, C, M, M]),
                    tier(&[W, W, W, C, C, M, M]),
                ],
            ),
            two_state_role(
                Role::Repairer,
                AgentState::Collect,
                AgentState::Repair,
                vec![tier(&[W, C, M]), tier(&[W, W, C, C, M, M])],
            ),
        ])
    }

    pub fn definition(&self, role: Role) -> Result<&RoleDefinition, CatalogError> {
        self.definitions
            .get(&role)
            .ok_or(CatalogError::UnknownRole(role))
    }

    pub fn states(&self, role: Role) -> Result<&[AgentState], CatalogError> {
        Ok(&self.definition(role)?.states)
    }

    pub fn initial(&self, role: Role) -> Result<AgentState, CatalogError> {
        Ok(self.definition(role)?.initial)
    }

    pub fn transition(&self, role: Role, state: AgentState) -> Result<StateTransition, CatalogError> {
        self.definition(role)?
            .transitions
            .get(&state)
            .copied()
            .ok_or(CatalogError::MissingTransition { role, state })
    }

    /// Greedy best-affordable loadout: the highest-cost tier whose cost
    /// does not exceed `energy`. Below the cheapest tier the cheapest
    /// tier is still returned, so a colony can always climb back from a
    /// drained economy.
    pub fn best_affordable(&self, role: Role, energy: u32) -> Result<&LoadoutTier, CatalogError> {
        let tiers = &self.definition(role)?.loadouts;
        let best = tiers
            .iter()
            .rev()
            .find(|tier| tier.cost <= energy)
            .or_else(|| tiers.first());
        best.ok_or(CatalogError::UnknownRole(role))
    }
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}

const W: Capability = Capability::Work;
const C: Capability = Capability::Carry;
const M: Capability = Capability::Move;
const A: Capability = Capability::Attack;
const T: Capability = Capability::Tough;

fn tier(parts: &[Capability]) -> LoadoutTier {
    LoadoutTier {
        cost: loadout_cost(parts),
        parts: parts.to_vec(),
    }
}

fn two_state_role(
    role: Role,
    gather: AgentState,
    spend: AgentState,
    loadouts: Vec<LoadoutTier>,
) -> RoleDefinition {
    let transitions = BTreeMap::from([
        (
            gather,
            StateTransition {
                guard: Guard::InventoryFull,
                next: spend,
            },
        ),
        (
            spend,
            StateTransition {
                guard: Guard::InventoryEmpty,
                next: gather,
            },
        ),
    ]);
    RoleDefinition {
        role,
        states: vec![gather, spend],
        initial: gather,
        transitions,
        loadouts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_definition() {
        let catalog = RoleCatalog::default_catalog();
        for role in Role::ALL {
            let definition = catalog.definition(role).expect("definition");
            assert_eq!(definition.states.len(), 2);
            assert_eq!(definition.initial, definition.states[0]);
        }
    }

    #[test]
    fn loadout_tables_are_ascending_and_consistent() {
        let catalog = RoleCatalog::default_catalog();
        for role in Role::ALL {
            let tiers = &catalog.definition(role).expect("definition").loadouts;
            assert!(!tiers.is_empty());
            for window in tiers.windows(2) {
                assert!(
                    window[0].cost < window[1].cost,
                    "{role}: tier costs must strictly ascend"
                );
                assert!(
                    window[0].parts.len() <= window[1].parts.len(),
                    "{role}: capability must not shrink with cost"
                );
            }
            for tier in tiers {
                assert_eq!(tier.cost, loadout_cost(&tier.parts));
            }
        }
    }

    #[test]
    fn best_affordable_is_greedy_highest_under_budget() {
        let catalog = RoleCatalog::default_catalog();
        let chosen = catalog
            .best_affordable(Role::Harvester, 420)
            .expect("loadout");
        assert_eq!(chosen.cost, 400);
    }

    #[test]
    fn best_affordable_with_exact_budget_takes_that_tier() {
        let catalog = RoleCatalog::default_catalog();
        let chosen = catalog
            .best_affordable(Role::Harvester, 300)
            .expect("loadout");
        assert_eq!(chosen.cost, 300);
    }

    #[test]
    fn best_affordable_below_cheapest_returns_floor_tier() {
        let catalog = RoleCatalog::default_catalog();
        let chosen = catalog
            .best_affordable(Role::Harvester, 50)
            .expect("loadout");
        assert_eq!(chosen.cost, 200);
    }

    #[test]
    fn transitions_form_a_two_state_cycle() {
        let catalog = RoleCatalog::default_catalog();
        for role in Role::ALL {
            let initial = catalog.initial(role).expect("initial");
            let forward = catalog.transition(role, initial).expect("forward");
            assert_eq!(forward.guard, Guard::InventoryFull);
            let back = catalog.transition(role, forward.next).expect("back");
            assert_eq!(back.guard, Guard::InventoryEmpty);
            assert_eq!(back.next, initial);
        }
    }

    #[test]
    fn missing_transition_is_a_configuration_fault() {
        let catalog = RoleCatalog::default_catalog();
        let err = catalog
            .transition(Role::Harvester, AgentState::Engage)
            .expect_err("harvester has no engage state");
        assert!(matches!(err, CatalogError::MissingTransition { .. }));
    }
}
