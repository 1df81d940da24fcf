// ABOUTME: Tool registry module - discovery, cataloging, and dispatch of tools
// ABOUTME: from builtin, plugin, instruction, and MCP sources.

mod registry;
mod scan;
mod spec;

pub use registry::{DISPATCH_TIMEOUT, MAX_OUTPUT_BYTES, ToolRegistry};
pub use scan::{MANIFEST_FILE, SKILL_FILE, normalize_skill_name};
pub use spec::*;

#[cfg(test)]
mod registry_test;
