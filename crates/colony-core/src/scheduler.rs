//! Per-tick colony driver. Phases run in a fixed order so identical
//! environment state and identical stored records always produce the
//! identical event stream: record garbage collection, turret history,
//! snapshot assembly, population planning, then one state advance and
//! one capability invocation per agent.

use std::collections::BTreeMap;

use contracts::{
    ActionStatus, AgentRecord, ColonySnapshot, Event, EventKind, Role, StructureKind,
};

use crate::catalog::RoleCatalog;
use crate::environment::Environment;
use crate::fsm::BehaviorStateMachine;
use crate::population::{PopulationPlanner, TurretLog};
use crate::resolver::{ActionResolver, ResolveCtx};
use crate::store::{RecordStore, StoreError};

/// Drives one colony through one tick.
pub struct ColonyScheduler {
    catalog: RoleCatalog,
    resolver: ActionResolver,
}

impl ColonyScheduler {
    pub fn new() -> Self {
        Self {
            catalog: RoleCatalog::default_catalog(),
            resolver: ActionResolver::new(),
        }
    }

    pub fn with_resolver(catalog: RoleCatalog, resolver: ActionResolver) -> Self {
        Self { catalog, resolver }
    }

    /// Run the full tick pipeline for one colony. Store failures abort
    /// the tick; catalog faults skip the affected agent and are logged.
    pub fn run_tick(
        &self,
        colony_id: &str,
        env: &mut dyn Environment,
        store: &mut dyn RecordStore,
        tick: u64,
    ) -> Result<Vec<Event>, StoreError> {
        let mut events = EventLog::new(tick);

        self.collect_vanished_records(colony_id, env, store, &mut events)?;
        let turret_mean = self.update_turret_history(colony_id, env, store)?;
        let snapshot = self.assemble_snapshot(colony_id, env, tick, turret_mean);
        self.plan_population(&snapshot, env, &mut events);
        self.drive_agents(colony_id, env, store, &mut events)?;

        Ok(events.into_inner())
    }

    /// Drop durable records for agents the environment no longer
    /// reports.
    fn collect_vanished_records(
        &self,
        colony_id: &str,
        env: &dyn Environment,
        store: &mut dyn RecordStore,
        events: &mut EventLog,
    ) -> Result<(), StoreError> {
        let live = env.live_agents(colony_id);
        for agent_id in store.agent_ids(colony_id)? {
            if !live.contains(&agent_id) {
                store.remove_agent(&agent_id)?;
                events.push(EventKind::RecordEvicted {
                    agent_id: agent_id.clone(),
                });
                tracing::debug!(agent_id = %agent_id, "evicted record for vanished agent");
            }
        }
        Ok(())
    }

    /// Append this tick's turret fullness samples and return the
    /// trailing mean for the snapshot.
    fn update_turret_history(
        &self,
        colony_id: &str,
        env: &dyn Environment,
        store: &mut dyn RecordStore,
    ) -> Result<Option<u32>, StoreError> {
        let turrets: Vec<_> = env
            .structures(colony_id)
            .into_iter()
            .filter(|s| s.kind == StructureKind::Turret)
            .collect();

        let mut record = store.load_colony(colony_id)?.unwrap_or_default();
        TurretLog::record(&mut record, &turrets);
        let mean = TurretLog::mean_permille(&record);
        store.save_colony(colony_id, &record)?;
        Ok(mean)
    }

    /// Rebuild the read-only snapshot from live telemetry. Nothing in
    /// it is persisted.
    fn assemble_snapshot(
        &self,
        colony_id: &str,
        env: &dyn Environment,
        tick: u64,
        turret_mean: Option<u32>,
    ) -> ColonySnapshot {
        let mut population: BTreeMap<Role, u32> = BTreeMap::new();
        let mut deployed_work_parts = 0u32;
        for agent_id in env.live_agents(colony_id) {
            let Some(obs) = env.observe_agent(&agent_id) else {
                continue;
            };
            *population.entry(obs.role).or_insert(0) += 1;
            if obs.role == Role::Harvester {
                deployed_work_parts += obs.work_parts;
            }
        }

        let mut damaged_count = 0u32;
        let mut missing_hits = 0u64;
        let mut max_hits = 0u64;
        for structure in env.structures(colony_id) {
            if structure.kind.is_fortification() || structure.hits_max == 0 {
                continue;
            }
            max_hits += u64::from(structure.hits_max);
            missing_hits += u64::from(structure.hits_max.saturating_sub(structure.hits));
            if structure.needs_repair() {
                damaged_count += 1;
            }
        }
        let damage_ratio_permille = if max_hits == 0 {
            0
        } else {
            (missing_hits * 1000 / max_hits) as u32
        };

        ColonySnapshot {
            colony_id: colony_id.to_string(),
            tick,
            energy_available: env.energy_available(colony_id),
            energy_capacity: env.energy_capacity(colony_id),
            source_count: env.sources(colony_id).len() as u32,
            construction_request_count: env.construction_requests(colony_id).len() as u32,
            development_level: env.development_level(colony_id),
            population,
            idle_spawn_ids: env.idle_spawns(colony_id),
            deployed_work_parts,
            hostile_count: env.hostiles(colony_id).len() as u32,
            damaged_structure_count: damaged_count,
            damage_ratio_permille,
            turret_fullness_mean_permille: turret_mean,
        }
    }

    /// At most one spawn request per colony per tick.
    fn plan_population(
        &self,
        snapshot: &ColonySnapshot,
        env: &mut dyn Environment,
        events: &mut EventLog,
    ) {
        let targets = PopulationPlanner::compute_targets(snapshot);
        let request = match PopulationPlanner::plan_spawning(&self.catalog, snapshot, &targets) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(colony_id = %snapshot.colony_id, error = %err, "population planning failed");
                return;
            }
        };
        let Some(request) = request else {
            return;
        };

        let status = env.spawn_agent(&request.spawn_id, request.role, &request.parts);
        tracing::info!(
            colony_id = %request.colony_id,
            role = %request.role,
            cost = request.cost,
            status = ?status,
            "spawn requested"
        );
        events.push(EventKind::SpawnRequested {
            colony_id: request.colony_id,
            role: request.role,
            cost: request.cost,
            status,
        });
    }

    /// One state advance and one capability invocation per live agent,
    /// in agent-id order.
    fn drive_agents(
        &self,
        colony_id: &str,
        env: &mut dyn Environment,
        store: &mut dyn RecordStore,
        events: &mut EventLog,
    ) -> Result<(), StoreError> {
        let mut agent_ids = env.live_agents(colony_id);
        agent_ids.sort();

        for agent_id in agent_ids {
            let Some(observation) = env.observe_agent(&agent_id) else {
                continue;
            };
            let mut record = match store.load_agent(&agent_id)? {
                Some(record) => record,
                None => AgentRecord::new(colony_id, observation.role),
            };

            match BehaviorStateMachine::advance(
                &self.catalog,
                &mut record,
                observation.carried,
                observation.capacity,
            ) {
                Ok(Some(change)) => {
                    events.push(EventKind::StateChanged {
                        agent_id: agent_id.clone(),
                        role: record.role,
                        from: change.from,
                        to: change.to,
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(agent_id = %agent_id, error = %err, "state advance failed");
                    continue;
                }
            }

            let Some(state) = record.state else {
                store.save_agent(&agent_id, &record)?;
                continue;
            };

            let resolved = {
                let ctx = ResolveCtx {
                    colony_id,
                    observation: &observation,
                    remembered_target: record.target.as_deref(),
                    env: &*env,
                };
                self.resolver.resolve(state, &ctx)
            };

            match resolved {
                Some(action) => {
                    record.target = Some(action.intent.target.id().to_string());
                    let status = env.invoke(&agent_id, &action.intent);
                    match status {
                        ActionStatus::Success => {}
                        ActionStatus::NotAdjacent => {
                            let move_status = env.move_toward(&agent_id, &action.intent.target);
                            if move_status != ActionStatus::Success {
                                if move_status == ActionStatus::TargetInvalid {
                                    record.target = None;
                                }
                                events.push(EventKind::ActionFailed {
                                    agent_id: agent_id.clone(),
                                    capability: action.intent.capability,
                                    target_id: action.intent.target.id().to_string(),
                                    status: move_status,
                                });
                            }
                        }
                        ActionStatus::TargetInvalid => {
                            record.target = None;
                            events.push(EventKind::ActionFailed {
                                agent_id: agent_id.clone(),
                                capability: action.intent.capability,
                                target_id: action.intent.target.id().to_string(),
                                status,
                            });
                        }
                        other => {
                            tracing::debug!(
                                agent_id = %agent_id,
                                rule = action.rule,
                                status = other.as_str(),
                                "capability invocation failed"
                            );
                            events.push(EventKind::ActionFailed {
                                agent_id: agent_id.clone(),
                                capability: action.intent.capability,
                                target_id: action.intent.target.id().to_string(),
                                status: other,
                            });
                        }
                    }
                }
                None => {
                    // Terminal rules make the chains total in practice;
                    // an empty resolution leaves the agent idle for the
                    // tick.
                    record.target = None;
                    tracing::debug!(agent_id = %agent_id, state = ?state, "no action resolved");
                }
            }

            store.save_agent(&agent_id, &record)?;
        }
        Ok(())
    }
}

impl Default for ColonyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Accumulates events for one tick with sequential ids.
struct EventLog {
    tick: u64,
    events: Vec<Event>,
}

impl EventLog {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    fn push(&mut self, kind: EventKind) {
        let event_id = format!("evt_{:08}_{:04}", self.tick, self.events.len());
        self.events.push(Event {
            event_id,
            tick: self.tick,
            kind,
        });
    }

    fn into_inner(self) -> Vec<Event> {
        self.events
    }
}
