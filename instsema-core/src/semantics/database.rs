//! Pattern Database
//!
//! The typed export of a target description that semantics generation runs on:
//! instructions (in enum order) with their operands and patterns, selection DAG
//! operators, equivalences, complex patterns, registers and register classes.
//!
//! The database is read from JSON and never mutated afterwards. [`Records`]
//! builds the name lookups the linearizer needs on top of it.

use crate::semantics::error::SemanticsError;
use crate::semantics::pattern::{PatternNode, ValueType};
use anyhow::Result;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Complete pattern database for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternDatabase {
    /// Target name, used as the namespace of generated symbols (`X86`).
    pub target: String,
    /// Instructions in enum order; the position is the instruction's identity.
    #[serde(default)]
    pub instructions: Vec<InstructionDef>,
    /// Selection DAG operators.
    #[serde(default)]
    pub operators: Vec<OperatorDef>,
    /// Target-specific to canonical operator equivalences.
    #[serde(default)]
    pub equivalences: Vec<EquivalenceDef>,
    #[serde(default)]
    pub complex_patterns: Vec<ComplexPatternDef>,
    /// Names of all non-anonymous operand type records.
    #[serde(default)]
    pub operand_types: Vec<String>,
    /// Physical registers.
    #[serde(default)]
    pub registers: Vec<String>,
    /// Register classes in enum order.
    #[serde(default)]
    pub register_classes: Vec<RegisterClassDef>,
    /// Dedicated semantics that take precedence over instruction patterns.
    #[serde(default)]
    pub semantics: Vec<SemanticsOverride>,
}

/// One instruction definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstructionDef {
    pub name: String,
    #[serde(default)]
    pub operands: Vec<OperandInfo>,
    /// Top-level pattern trees, if the instruction has a pattern.
    #[serde(default)]
    pub pattern: Option<Vec<PatternNode>>,
    /// Registers declared as implicitly defined (`Defs = [EFLAGS]`).
    #[serde(default)]
    pub implicit_defs: Vec<String>,
    /// Pseudo instructions only used during instruction selection.
    #[serde(default)]
    pub codegen_only: bool,
}

impl InstructionDef {
    /// Find a formal operand by name.
    ///
    /// Instructions have a handful of operands, so a linear scan is enough.
    pub fn operand(&self, name: &str) -> Option<&OperandInfo> {
        if name.is_empty() {
            return None;
        }
        self.operands.iter().find(|op| op.name == name)
    }
}

/// A formal operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandInfo {
    pub name: String,
    /// Index of the operand's first machine operand.
    pub slot: u16,
    pub kind: OperandKind,
}

/// Backing storage of a formal operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    /// Register class, by name.
    RegisterClass(String),
    /// Register operand, by the class it wraps.
    RegisterOperand(String),
    /// Operand record of immediate type.
    Immediate(String),
    /// Any other operand record (memory operands, custom encodings).
    Custom(String),
}

/// A selection DAG operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDef {
    /// Record name (`add`, `X86add_flag`).
    pub name: String,
    /// Opcode enumerator (`ISD::ADD`, `X86ISD::ADD`).
    pub enum_name: String,
    pub num_results: u32,
}

/// A declared equivalence between operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceDef {
    pub target_specific: String,
    pub canonical: String,
}

/// A complex pattern matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexPatternDef {
    pub name: String,
    /// Selector function name (`selectAddr`).
    pub select_func: String,
}

/// A register class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClassDef {
    pub name: String,
    pub types: Vec<ValueType>,
}

/// Dedicated semantics for an instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticsOverride {
    pub instruction: String,
    #[serde(default)]
    pub pattern: Vec<PatternNode>,
}

impl PatternDatabase {
    /// Parse a database from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let db: PatternDatabase = serde_json::from_str(json).map_err(SemanticsError::from)?;
        Ok(db)
    }

    /// Load a database from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(SemanticsError::from)?;
        Self::from_json(&json)
    }

    /// Check the structural guarantees the generator relies on.
    ///
    /// # Checks
    /// - The target name is set
    /// - Instruction, operator and register names are unique
    /// - Operand names are unique within each instruction (custom operand
    ///   reads are memoized by name)
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(SemanticsError::database("the database has no target name").into());
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.instructions.len());
        for inst in self.instructions.iter() {
            if !seen.insert(inst.name.as_str()) {
                return Err(SemanticsError::database(format!(
                    "instruction '{}' is declared twice",
                    inst.name
                ))
                .into());
            }
            let mut operand_names: HashSet<&str> = HashSet::with_capacity(inst.operands.len());
            for op in inst.operands.iter() {
                if !operand_names.insert(op.name.as_str()) {
                    return Err(SemanticsError::database(format!(
                        "instruction '{}' declares operand '{}' twice",
                        inst.name, op.name
                    ))
                    .into());
                }
            }
        }

        let mut operators: HashSet<&str> = HashSet::with_capacity(self.operators.len());
        for op in self.operators.iter() {
            if !operators.insert(op.name.as_str()) {
                return Err(SemanticsError::database(format!(
                    "operator '{}' is declared twice",
                    op.name
                ))
                .into());
            }
        }

        let mut registers: HashSet<&str> = HashSet::with_capacity(self.registers.len());
        for reg in self.registers.iter() {
            if !registers.insert(reg.as_str()) {
                return Err(SemanticsError::database(format!(
                    "register '{}' is declared twice",
                    reg
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Enum value of the named instruction.
    pub fn instruction_index(&self, name: &str) -> Option<usize> {
        self.instructions.iter().position(|inst| inst.name == name)
    }
}

/// Identity of a physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u32);

/// Physical registers of the target.
#[derive(Debug, Clone, Default)]
pub struct RegisterBank<'db> {
    registers: IndexSet<&'db str>,
}

impl<'db> RegisterBank<'db> {
    pub fn new(registers: &'db [String]) -> Self {
        Self {
            registers: registers.iter().map(String::as_str).collect(),
        }
    }

    /// Resolve a register record to its identity.
    pub fn register(&self, name: &str) -> Option<RegisterId> {
        self.registers.get_index_of(name).map(|idx| RegisterId(idx as u32))
    }

    /// Register name for an identity.
    pub fn name(&self, id: RegisterId) -> Option<&'db str> {
        self.registers.get_index(id.0 as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Name lookups over a [`PatternDatabase`].
#[derive(Debug, Clone)]
pub struct Records<'db> {
    operators: HashMap<&'db str, &'db OperatorDef>,
    complex_patterns: HashMap<&'db str, &'db ComplexPatternDef>,
    pub registers: RegisterBank<'db>,
}

impl<'db> Records<'db> {
    pub fn new(db: &'db PatternDatabase) -> Self {
        Self {
            operators: db.operators.iter().map(|op| (op.name.as_str(), op)).collect(),
            complex_patterns: db
                .complex_patterns
                .iter()
                .map(|cp| (cp.name.as_str(), cp))
                .collect(),
            registers: RegisterBank::new(&db.registers),
        }
    }

    pub fn operator(&self, name: &str) -> Option<&'db OperatorDef> {
        self.operators.get(name).copied()
    }

    pub fn complex_pattern(&self, name: &str) -> Option<&'db ComplexPatternDef> {
        self.complex_patterns.get(name).copied()
    }
}
