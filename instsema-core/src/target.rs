//! Target Specification System
//!
//! This module provides the output configuration for semantics generation:
//! which namespaces generated symbols live in and which optional parts of the
//! table get emitted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    /// Namespace for registers, operand types and complex patterns.
    /// Defaults to the database's target name.
    pub namespace: Option<String>,
    /// Namespace of the runtime's structural opcodes
    pub opcode_namespace: String,
    /// Namespace of predicate enumerators
    pub predicate_namespace: String,
    /// Emit each instruction's source pattern as a comment
    pub emit_pattern_comments: bool,
    /// Check every program and the laid-out table before rendering
    pub validate_programs: bool,
    /// Preprocessor guard of the instruction semantics section
    pub instr_guard: String,
    /// Preprocessor guard of the register semantics section
    pub register_guard: String,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            namespace: None,
            opcode_namespace: "DCINS".to_string(),
            predicate_namespace: "TargetOpcode::Predicate".to_string(),
            emit_pattern_comments: true,
            validate_programs: true,
            instr_guard: "GET_INSTR_SEMA".to_string(),
            register_guard: "GET_REGISTER_SEMA".to_string(),
        }
    }
}

impl TargetSpec {
    /// Load a target specification from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read target spec: {}", path.display()))?;
        let spec: TargetSpec = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse target spec: {}", path.display()))?;
        Ok(spec)
    }

    /// Namespace for symbols of the given database target.
    pub fn namespace<'a>(&'a self, db_target: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(db_target)
    }
}

/// Validate target specification.
pub fn validate_target(target: &TargetSpec) -> Result<(), String> {
    if let Some(ns) = &target.namespace {
        if ns.trim().is_empty() {
            return Err("namespace override must not be empty".to_string());
        }
    }
    if target.opcode_namespace.trim().is_empty() {
        return Err("opcode namespace must not be empty".to_string());
    }
    if target.predicate_namespace.trim().is_empty() {
        return Err("predicate namespace must not be empty".to_string());
    }
    for guard in [&target.instr_guard, &target.register_guard] {
        if guard.is_empty() || !guard.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid preprocessor guard '{}'", guard));
        }
    }
    Ok(())
}
