//! Per-tick decision kernel for colony worker agents: role catalog,
//! behavior state machine, ranked-fallback action resolution, population
//! planning, and the per-colony scheduler composing them.
//!
//! Every decision is recomputed from scratch each tick from live
//! environment queries; local failures are self-correcting and nothing
//! here halts a colony.

pub mod catalog;
pub mod environment;
pub mod fsm;
pub mod population;
pub mod resolver;
pub mod scheduler;
pub mod sim;
pub mod store;

pub use catalog::{CatalogError, RoleCatalog};
pub use environment::{
    AgentObservation, ConstructionInfo, Environment, HostileInfo, SourceInfo, StructureInfo,
};
pub use fsm::{BehaviorStateMachine, StateChange};
pub use population::{PopulationPlanner, TurretLog};
pub use resolver::{ActionResolver, CandidateRule, FallbackChain, ResolveCtx, ResolvedAction};
pub use scheduler::ColonyScheduler;
pub use sim::{run_simulation, SimReport, SimWorld};
pub use store::{MemoryStore, RecordStore, SqliteStore, StoreError};
