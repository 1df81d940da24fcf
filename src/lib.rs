// ABOUTME: Root module for aios-core - local agent orchestration library.
// ABOUTME: Re-exports all public types from submodules.

pub mod error;
pub mod mcp;
pub mod registry;
pub mod subagent;
pub mod tool;

pub use error::CoreError;
