//! Shared fixtures for curator integration tests.
//!
//! - `TestHarness`: temp directory, in-memory repository and a
//!   database-backed job store
//! - `ScriptedPlugin`: a plugin whose failures are scripted per object id
//! - `FailingEventWrites`, `ShrinkingIndex`: services that fail on cue

pub mod harness;
pub mod plugins;
pub mod services;

pub use harness::TestHarness;
pub use plugins::{Probe, Script, ScriptedPlugin};
pub use services::{FailingEventWrites, ShrinkingIndex};
