//! Construction Phase
//!
//! Turns an incident snapshot plus candidate steps into a validated,
//! deterministically ordered [`Plan`]:
//!
//! 1. Resolve dependencies (duplicates and dangling references fail fast)
//! 2. Kahn's sweep (cycle detection + stable ordering)
//! 3. Fingerprint the structure for idempotent re-planning
//!
//! Nothing here talks to the repository or executes anything.

pub mod builder;
pub mod order;
pub mod plan;

pub use builder::PlanGraph;
pub use order::topological_order_of;
pub use plan::Plan;
