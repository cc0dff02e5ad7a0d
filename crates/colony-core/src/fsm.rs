//! Behavior state machine: one guard evaluation per agent per tick,
//! against the live inventory observation, performed before action
//! resolution so the action always matches the fresh state.

use contracts::{AgentRecord, AgentState};

use crate::catalog::{CatalogError, RoleCatalog};

/// Notification emitted when an agent's behavioral state changes.
/// `from` is `None` when the initial state was just assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: Option<AgentState>,
    pub to: AgentState,
}

/// Stateless advancer over durable agent records. Guards are pure
/// predicates over carried/capacity; there are no hidden timers and no
/// retry bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorStateMachine;

impl BehaviorStateMachine {
    /// Advance the agent's state by at most one transition.
    ///
    /// An unset state gets the role's initial state and no guard is
    /// evaluated this tick. Otherwise the current state's guard runs
    /// against the live inventory; if it holds, the agent moves to the
    /// transition's target state.
    pub fn advance(
        catalog: &RoleCatalog,
        record: &mut AgentRecord,
        carried: u32,
        capacity: u32,
    ) -> Result<Option<StateChange>, CatalogError> {
        let Some(current) = record.state else {
            let initial = catalog.initial(record.role)?;
            record.state = Some(initial);
            return Ok(Some(StateChange {
                from: None,
                to: initial,
            }));
        };

        let transition = catalog.transition(record.role, current)?;
        if !transition.guard.holds(carried, capacity) {
            return Ok(None);
        }

        record.state = Some(transition.next);
        // A phase flip invalidates the remembered target along with it.
        record.target = None;
        Ok(Some(StateChange {
            from: Some(current),
            to: transition.next,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Role;

    fn record(role: Role) -> AgentRecord {
        AgentRecord::new("colony:1", role)
    }

    #[test]
    fn unset_state_gets_initial_without_guard_evaluation() {
        let catalog = RoleCatalog::default_catalog();
        let mut rec = record(Role::Harvester);

        // Inventory already full: with a guard evaluation this would
        // jump straight to Deliver. Initial assignment must not.
        let change = BehaviorStateMachine::advance(&catalog, &mut rec, 50, 50)
            .expect("advance")
            .expect("change");
        assert_eq!(change.from, None);
        assert_eq!(change.to, AgentState::Harvest);
        assert_eq!(rec.state, Some(AgentState::Harvest));
    }

    #[test]
    fn full_inventory_deterministically_enters_spend_phase() {
        let catalog = RoleCatalog::default_catalog();
        let mut rec = record(Role::Harvester);
        rec.state = Some(AgentState::Harvest);

        let change = BehaviorStateMachine::advance(&catalog, &mut rec, 50, 50)
            .expect("advance")
            .expect("change");
        assert_eq!(change.from, Some(AgentState::Harvest));
        assert_eq!(change.to, AgentState::Deliver);
    }

    #[test]
    fn partial_inventory_does_not_transition() {
        let catalog = RoleCatalog::default_catalog();
        let mut rec = record(Role::Harvester);
        rec.state = Some(AgentState::Harvest);

        let change =
            BehaviorStateMachine::advance(&catalog, &mut rec, 25, 50).expect("advance");
        assert_eq!(change, None);
        assert_eq!(rec.state, Some(AgentState::Harvest));
    }

    #[test]
    fn every_role_oscillates_between_exactly_two_states() {
        let catalog = RoleCatalog::default_catalog();
        for role in Role::ALL {
            let mut rec = record(role);
            BehaviorStateMachine::advance(&catalog, &mut rec, 0, 50).expect("init");
            let gather = rec.state.expect("state set");

            let mut seen = vec![gather];
            // Alternate full/empty observations for several cycles; the
            // state set must stay at exactly two members.
            for cycle in 0..6 {
                let (carried, capacity) = if cycle % 2 == 0 { (50, 50) } else { (0, 50) };
                BehaviorStateMachine::advance(&catalog, &mut rec, carried, capacity)
                    .expect("advance");
                let state = rec.state.expect("state");
                if !seen.contains(&state) {
                    seen.push(state);
                }
                assert!(
                    catalog.states(role).expect("states").contains(&state),
                    "{role}: advanced to a state outside the role's set"
                );
            }
            assert_eq!(seen.len(), 2, "{role}: expected a two-state oscillation");
            assert_eq!(rec.state, Some(gather), "{role}: cycle should close");
        }
    }

    #[test]
    fn phase_flip_clears_remembered_target() {
        let catalog = RoleCatalog::default_catalog();
        let mut rec = record(Role::Builder);
        rec.state = Some(AgentState::Collect);
        rec.target = Some("container:1".to_string());

        BehaviorStateMachine::advance(&catalog, &mut rec, 50, 50).expect("advance");
        assert_eq!(rec.state, Some(AgentState::Build));
        assert_eq!(rec.target, None);
    }
}
