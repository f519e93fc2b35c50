//! Shared test utilities for sks.

pub mod fixtures;
