// ABOUTME: Filesystem discovery of plugin and instruction tools.
// ABOUTME: Two-pass, best-effort scan over the configured skill directories.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::spec::{InstructionSpec, PluginManifest, PluginSpec, SkillFrontmatter};
use crate::error::RegistryError;

/// Manifest filename declaring plugin tools for a directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Skill definition filename for instruction tools.
pub const SKILL_FILE: &str = "SKILL.md";

/// Everything one scan pass produced. The registry swaps these in
/// wholesale, so a reload is always consistent with one filesystem
/// snapshot per source.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub plugins: HashMap<String, PluginSpec>,
    pub instructions: HashMap<String, InstructionSpec>,
}

/// Scan the skill directories for plugin manifests (pass 1) and skill
/// definitions (pass 2).
///
/// A tool is skipped with a warning, never a fatal error, when its
/// executable is missing, its name collides with a builtin, or its name
/// was claimed earlier in the same scan. One bad file never aborts the
/// walk.
pub fn scan_skill_dirs(dirs: &[PathBuf], builtin_names: &HashSet<String>) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    // Directories that hold a manifest are claimed by pass 1 and never
    // double-register as instruction tools.
    let mut claimed_dirs: HashSet<PathBuf> = HashSet::new();

    for path in find_files(dirs, MANIFEST_FILE) {
        scan_manifest(&path, builtin_names, &mut outcome, &mut claimed_dirs);
    }

    for path in find_files(dirs, SKILL_FILE) {
        let dir = match path.parent() {
            Some(dir) => dir.to_path_buf(),
            None => continue,
        };
        if claimed_dirs.contains(&dir) {
            debug!(path = %path.display(), "directory already claimed by a manifest");
            continue;
        }
        scan_skill(&path, builtin_names, &mut outcome);
    }

    outcome
}

fn find_files(dirs: &[PathBuf], filename: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        let pattern = dir.join("**").join(filename);
        let pattern = pattern.to_string_lossy();
        match glob::glob(&pattern) {
            Ok(paths) => {
                for entry in paths {
                    match entry {
                        Ok(path) => found.push(path),
                        Err(e) => warn!(error = %e, "unreadable path during scan"),
                    }
                }
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "bad scan pattern"),
        }
    }
    found.sort();
    found
}

fn scan_manifest(
    path: &Path,
    builtin_names: &HashSet<String>,
    outcome: &mut ScanOutcome,
    claimed_dirs: &mut HashSet<PathBuf>,
) {
    let Some(dir) = path.parent() else { return };

    let manifest = match read_manifest(path) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(error = %e, "skipping malformed manifest");
            return;
        }
    };

    claimed_dirs.insert(dir.to_path_buf());

    for tool in manifest.tools {
        let name = tool.tool_name;

        let executable = dir.join(&tool.executable);
        if !executable.is_file() {
            warn!(
                tool = %name,
                executable = %executable.display(),
                "skipping plugin tool: executable not found"
            );
            continue;
        }
        if let Err(e) = claim_name(&name, builtin_names, outcome) {
            warn!(error = %e, "skipping plugin tool");
            continue;
        }

        outcome.plugins.insert(
            name.clone(),
            PluginSpec {
                name,
                description: tool.description,
                executable,
                runtime: tool.runtime,
                inputs: tool.inputs,
                danger_level: tool.danger_level,
                version: tool.version,
                keywords: tool.keywords,
            },
        );
    }
}

fn scan_skill(path: &Path, builtin_names: &HashSet<String>, outcome: &mut ScanOutcome) {
    let front = match read_frontmatter(path) {
        Ok(front) => front,
        Err(e) => {
            warn!(error = %e, "skipping skill file");
            return;
        }
    };

    let name = normalize_skill_name(&front.name);
    if name.is_empty() {
        warn!(path = %path.display(), "skipping skill with empty name");
        return;
    }
    if let Err(e) = claim_name(&name, builtin_names, outcome) {
        warn!(error = %e, "skipping instruction tool");
        return;
    }

    outcome.instructions.insert(
        name.clone(),
        InstructionSpec {
            name,
            skill_name: front.name,
            description: front.description,
            version: front.version,
            path: path.to_path_buf(),
        },
    );
}

fn read_manifest(path: &Path) -> Result<PluginManifest, RegistryError> {
    let scan_err = |message: String| RegistryError::Scan {
        path: path.display().to_string(),
        message,
    };
    let content = std::fs::read_to_string(path).map_err(|e| scan_err(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| scan_err(e.to_string()))
}

fn read_frontmatter(path: &Path) -> Result<SkillFrontmatter, RegistryError> {
    let scan_err = |message: &str| RegistryError::Scan {
        path: path.display().to_string(),
        message: message.to_string(),
    };
    let content = std::fs::read_to_string(path).map_err(|e| scan_err(&e.to_string()))?;
    parse_frontmatter(&content).ok_or_else(|| scan_err("no valid frontmatter"))
}

/// Reject a name already held by a builtin or claimed earlier in this scan.
fn claim_name(
    name: &str,
    builtin_names: &HashSet<String>,
    outcome: &ScanOutcome,
) -> Result<(), RegistryError> {
    if builtin_names.contains(name)
        || outcome.plugins.contains_key(name)
        || outcome.instructions.contains_key(name)
    {
        return Err(RegistryError::Conflict(name.to_string()));
    }
    Ok(())
}

/// Parse the leading `--- ... ---` YAML frontmatter of a skill file.
fn parse_frontmatter(content: &str) -> Option<SkillFrontmatter> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    serde_yaml::from_str(&rest[..end]).ok()
}

/// Derive a registry tool name from a declared skill name: lower-cased,
/// punctuation and whitespace runs normalized to `_`.
pub fn normalize_skill_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}
