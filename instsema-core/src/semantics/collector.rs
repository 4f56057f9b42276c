//! Instruction Collector
//!
//! This module runs the linearizer over every instruction of a pattern
//! database and keeps the programs the decompiler runtime can use.
//!
//! # Collection Order
//! 1. Dedicated semantics overrides; an accepted override claims its
//!    instruction
//! 2. Every other instruction that has a pattern and isn't codegen-only
//!
//! Programs are stored in acceptance order; `index` maps each instruction's
//! enum value to its program. Table offsets are only assigned later, by the
//! emitter, once every accepted program is known.

use crate::semantics::constants::ConstantPool;
use crate::semantics::database::{InstructionDef, PatternDatabase, Records, RegisterBank};
use crate::semantics::equivalence::EquivalenceTable;
use crate::semantics::error::SemanticsError;
use crate::semantics::ir::micro_op::{Exclusion, InstructionProgram};
use crate::semantics::linearizer::{RunTables, TreeLinearizer};
use crate::semantics::pattern::PatternNode;
use anyhow::Result;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// Statistics collected during a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_instructions: usize,
    /// Instructions that had semantics to linearize.
    pub linearized: usize,
    /// Instructions whose semantics came from an override.
    pub from_overrides: usize,
    pub accepted: usize,
    pub excluded_intrinsic: usize,
    pub excluded_complex_pattern: usize,
    pub excluded_multiple_implicit_defs: usize,
    pub excluded_implicit_def_without_def: usize,
}

impl CollectionStats {
    fn record_exclusion(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::Intrinsic => self.excluded_intrinsic += 1,
            Exclusion::ComplexPattern => self.excluded_complex_pattern += 1,
            Exclusion::MultipleImplicitDefs => self.excluded_multiple_implicit_defs += 1,
            Exclusion::ImplicitDefWithoutDef => self.excluded_implicit_def_without_def += 1,
        }
    }

    /// Total number of excluded programs.
    pub fn excluded(&self) -> usize {
        self.excluded_intrinsic
            + self.excluded_complex_pattern
            + self.excluded_multiple_implicit_defs
            + self.excluded_implicit_def_without_def
    }
}

/// Result of a collection pass.
#[derive(Debug, Clone)]
pub struct CollectedSemantics {
    /// Accepted programs, in acceptance order.
    pub programs: Vec<InstructionProgram>,
    /// Per instruction enum value, the position of its program in `programs`.
    pub index: Vec<Option<usize>>,
    pub constants: ConstantPool,
    /// Guard predicates in first-emission order.
    pub predicates: IndexSet<String>,
    /// Excluded instructions with the reason.
    pub exclusions: Vec<(String, Exclusion)>,
    pub stats: CollectionStats,
}

impl CollectedSemantics {
    /// Program of the instruction with the given enum value.
    pub fn program(&self, instruction: usize) -> Option<&InstructionProgram> {
        self.index
            .get(instruction)
            .copied()
            .flatten()
            .map(|idx| &self.programs[idx])
    }
}

/// Drives linearization over a whole database.
pub struct InstructionCollector<'db> {
    db: &'db PatternDatabase,
    records: Records<'db>,
    equivalences: EquivalenceTable,
}

impl<'db> InstructionCollector<'db> {
    /// Prepare a collection pass: validate the database and build the
    /// equivalence table.
    pub fn new(db: &'db PatternDatabase) -> Result<Self> {
        db.validate()?;
        let records = Records::new(db);
        let equivalences = EquivalenceTable::build(db, &records)?;
        Ok(Self {
            db,
            records,
            equivalences,
        })
    }

    pub fn equivalences(&self) -> &EquivalenceTable {
        &self.equivalences
    }

    /// Linearize every instruction of the database.
    ///
    /// # Errors
    /// Returns error on the first input-contract violation; nothing is
    /// collected in that case.
    pub fn collect(&self) -> Result<CollectedSemantics> {
        let instructions = &self.db.instructions;
        let mut tables = RunTables::new();
        let mut collected = CollectedSemantics {
            programs: Vec::new(),
            index: vec![None; instructions.len()],
            constants: ConstantPool::new(),
            predicates: IndexSet::new(),
            exclusions: Vec::new(),
            stats: CollectionStats {
                total_instructions: instructions.len(),
                ..CollectionStats::default()
            },
        };

        let by_name: HashMap<&str, usize> = instructions
            .iter()
            .enumerate()
            .map(|(idx, inst)| (inst.name.as_str(), idx))
            .collect();

        for sema in self.db.semantics.iter() {
            let idx = *by_name.get(sema.instruction.as_str()).ok_or_else(|| {
                SemanticsError::unknown_record("instruction", sema.instruction.as_str(), "semantics override")
            })?;
            if collected.index[idx].is_some() {
                log::warn!(
                    "Instruction {} has several semantics overrides, keeping the first",
                    sema.instruction
                );
                continue;
            }
            self.collect_instruction(idx, &instructions[idx], &sema.pattern, &mut tables, &mut collected)?;
            if collected.index[idx].is_some() {
                collected.stats.from_overrides += 1;
            }
        }

        for (idx, inst) in instructions.iter().enumerate() {
            if collected.index[idx].is_some() {
                continue;
            }
            if let Some(pattern) = &inst.pattern {
                if !inst.codegen_only {
                    self.collect_instruction(idx, inst, pattern, &mut tables, &mut collected)?;
                }
            }
        }

        collected.constants = tables.constants;
        collected.predicates = tables.predicates;

        log::info!(
            "Collected semantics for {} of {} instructions ({} excluded, {} constants)",
            collected.stats.accepted,
            collected.stats.total_instructions,
            collected.stats.excluded(),
            collected.constants.len()
        );
        Ok(collected)
    }

    /// Linearize one instruction and accept its program if the runtime can
    /// use it.
    fn collect_instruction(
        &self,
        idx: usize,
        inst: &InstructionDef,
        trees: &[PatternNode],
        tables: &mut RunTables,
        collected: &mut CollectedSemantics,
    ) -> Result<()> {
        collected.stats.linearized += 1;

        let linearizer = TreeLinearizer::new(&self.records, &self.equivalences, inst);
        let mut program = linearizer.linearize(trees, tables)?;
        program.implicit_defs = compute_implicit_defs(&self.records.registers, inst, &program)?;

        if let Some(reason) = program.exclusion() {
            log::debug!("Skipping {}: {}", inst.name, reason);
            collected.stats.record_exclusion(reason);
            collected.exclusions.push((inst.name.clone(), reason));
            return Ok(());
        }

        collected.index[idx] = Some(collected.programs.len());
        collected.programs.push(program);
        collected.stats.accepted += 1;
        Ok(())
    }
}

/// Final implicit defs of an instruction.
///
/// Declared implicit defs come first, then the ones discovered while
/// linearizing `set` nodes. Registers the program writes explicitly are
/// dropped, as are duplicates; discovery order is kept.
///
/// # Errors
/// Returns error if a register isn't declared in the database.
pub fn compute_implicit_defs(
    registers: &RegisterBank<'_>,
    inst: &InstructionDef,
    program: &InstructionProgram,
) -> Result<SmallVec<[String; 1]>> {
    let resolve = |name: &str| {
        registers
            .register(name)
            .ok_or_else(|| SemanticsError::unknown_record("register", name, inst.name.as_str()))
    };

    let mut seen = HashSet::new();
    for reg in program.explicit_defs.iter() {
        seen.insert(resolve(reg)?);
    }

    let mut implicit_defs: SmallVec<[String; 1]> = SmallVec::new();
    for reg in inst.implicit_defs.iter().chain(program.implicit_defs.iter()) {
        if seen.insert(resolve(reg)?) {
            implicit_defs.push(reg.clone());
        }
    }
    Ok(implicit_defs)
}
