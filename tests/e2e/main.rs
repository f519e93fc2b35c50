//! E2E test suite entry point.

mod backup_workflow;
mod collect_workflow;
mod fixture;
mod sync_workflow;
mod target_workflow;
mod tracked_workflow;
