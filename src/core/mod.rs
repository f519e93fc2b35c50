//! Reconciliation engine: observe, plan, apply, report, collect.

pub mod applier;
pub mod collector;
pub mod observer;
pub mod planner;
pub mod report;
pub mod skill;
pub mod target;
pub mod uninstall;

pub use applier::{Applier, ApplyReport, ApplyStatus, Outcome};
pub use collector::{CollectOptions, CollectReport, Collector};
pub use observer::{LinkState, Observation, Snapshot, Unit, observe, observe_all};
pub use planner::{Action, ActionKind, Plan, PlanOptions, plan, plan_all};
pub use skill::{Provenance, Skill, SkillMetadata, SourceTree};
pub use target::{SyncMode, Target, TargetRegistry};
pub use uninstall::{UninstallOptions, UninstallReport, uninstall};
