//! Program Emitter
//!
//! This module lays the collected programs out as one flat table of 16-bit
//! words and renders it, together with the constant array and the debug name
//! tables, as an includable source file for the decompiler runtime.
//!
//! # Table Layout
//! - Word 0 is a shared `END_OF_INSTRUCTION`
//! - Each program: for every micro-operation, the opcode word, a header word
//!   `(types << 8) | operands`, one word per result type, one word per operand;
//!   then an optional `IMPLICIT` operation; then `END_OF_INSTRUCTION`
//! - The instruction index maps each instruction to the offset of its first
//!   word, or to `~0U` when it has no program
//!
//! # Memory Optimizations
//! - The output buffer is pre-allocated from the number of table words

use crate::semantics::collector::CollectedSemantics;
use crate::semantics::database::PatternDatabase;
use crate::semantics::error::SemanticsError;
use crate::semantics::ir::micro_op::{MicroOp, Opcode, OperandRef};
use crate::semantics::linearizer::sanitize_select_func;
use crate::semantics::pattern::ValueType;
use crate::target::TargetSpec;
use anyhow::Result;
use indexmap::IndexSet;
use std::fmt::Write;

/// One rendered line of the semantics array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRow {
    /// Source pattern of the program that follows.
    Comment(String),
    /// Table words of one operation.
    Words(Vec<String>),
}

/// Laid-out semantics table.
#[derive(Debug, Clone)]
pub struct SemanticsTable {
    /// Namespace of target symbols.
    pub namespace: String,
    pub rows: Vec<TableRow>,
    /// Total number of words in `rows`.
    pub num_words: u32,
    /// Per instruction enum value, the offset of its program.
    pub instruction_index: Vec<Option<u32>>,
    pub instruction_names: Vec<String>,
    /// Constant pool contents; position `i` holds constant index `i + 1`.
    pub constants: Vec<i64>,
    /// Sanitized complex pattern kinds, sorted and unique.
    pub complex_pattern_kinds: Vec<String>,
    /// Guard predicates in first-emission order.
    pub predicates: Vec<String>,
    pub custom_operand_types: Vec<String>,
    /// Canonical operator enumerators, unique, in declaration order.
    pub opcode_names: Vec<String>,
    /// Per register class, its value type.
    pub register_class_types: Vec<(String, ValueType)>,
}

impl SemanticsTable {
    /// Offset of the named instruction's program.
    pub fn offset_of(&self, instruction: &str) -> Option<u32> {
        let idx = self.instruction_names.iter().position(|name| name == instruction)?;
        self.instruction_index[idx]
    }

    /// The word rows of the program starting at `offset`, up to and including
    /// its `END_OF_INSTRUCTION`.
    pub fn program_rows(&self, offset: u32) -> Option<Vec<&[String]>> {
        let mut position: u32 = 0;
        let mut rows: Vec<&[String]> = Vec::new();
        for row in self.rows.iter() {
            let TableRow::Words(words) = row else {
                continue;
            };
            if position >= offset {
                rows.push(words.as_slice());
                if words.len() == 1 && words[0].ends_with("END_OF_INSTRUCTION") {
                    return Some(rows);
                }
            }
            position += words.len() as u32;
        }
        None
    }
}

/// Renders collected semantics for one target.
pub struct ProgramEmitter<'a> {
    db: &'a PatternDatabase,
    spec: &'a TargetSpec,
}

impl<'a> ProgramEmitter<'a> {
    pub fn new(db: &'a PatternDatabase, spec: &'a TargetSpec) -> Self {
        Self { db, spec }
    }

    fn namespace(&self) -> &str {
        self.spec.namespace(&self.db.target)
    }

    /// Lay the accepted programs out in instruction enum order and build the
    /// auxiliary tables.
    ///
    /// # Errors
    /// Returns error if an operation has too many types or operands for its
    /// header word, or a complex pattern selector is malformed.
    pub fn layout(&self, collected: &CollectedSemantics) -> Result<SemanticsTable> {
        let mut rows: Vec<TableRow> = Vec::with_capacity(collected.programs.len() * 4 + 1);
        let mut instruction_index: Vec<Option<u32>> = vec![None; collected.index.len()];

        rows.push(TableRow::Words(vec![self.structural(&Opcode::EndOfInstruction)]));
        let mut offset: usize = 1;

        for (idx, slot) in instruction_index.iter_mut().enumerate() {
            let Some(program) = collected.program(idx) else {
                continue;
            };
            *slot = Some(u32::try_from(offset).map_err(|_| {
                SemanticsError::emission(program.instruction.as_str(), "semantics table exceeds 2^32 words")
            })?);

            if self.spec.emit_pattern_comments {
                if let Some(pattern) = &program.pattern {
                    rows.push(TableRow::Comment(pattern.clone()));
                }
            }

            let implicit = program.implicit_def_op();
            for op in program.ops.iter().chain(implicit.iter()) {
                let words = self.encode(op, &program.instruction)?;
                offset += words.len();
                rows.push(TableRow::Words(words));
            }

            rows.push(TableRow::Words(vec![self.structural(&Opcode::EndOfInstruction)]));
            offset += 1;
        }

        let num_words = u32::try_from(offset)
            .map_err(|_| SemanticsError::emission("<table>", "semantics table exceeds 2^32 words"))?;
        log::info!(
            "Laid out {} programs in {} table words",
            collected.programs.len(),
            num_words
        );

        Ok(SemanticsTable {
            namespace: self.namespace().to_string(),
            rows,
            num_words,
            instruction_index,
            instruction_names: self.db.instructions.iter().map(|inst| inst.name.clone()).collect(),
            constants: collected.constants.values().collect(),
            complex_pattern_kinds: self.complex_pattern_kinds()?,
            predicates: collected.predicates.iter().cloned().collect(),
            custom_operand_types: self.db.operand_types.clone(),
            opcode_names: self.opcode_names(),
            register_class_types: self.register_class_types(),
        })
    }

    /// Encode one operation as table words.
    fn encode(&self, op: &MicroOp, instruction: &str) -> Result<Vec<String>> {
        if op.types.len() > u8::MAX as usize || op.operands.len() > u8::MAX as usize {
            return Err(SemanticsError::emission(
                instruction,
                format!(
                    "'{}' has {} result types and {} operands",
                    op.opcode,
                    op.types.len(),
                    op.operands.len()
                ),
            )
            .into());
        }

        let mut words: Vec<String> = Vec::with_capacity(2 + op.types.len() + op.operands.len());
        words.push(match &op.opcode {
            Opcode::Node(name) => name.clone(),
            structural => self.structural(structural),
        });
        words.push(format!("({}<<8)|{}", op.types.len(), op.operands.len()));
        for ty in op.types.iter() {
            words.push(format!("MVT::{}", ty.name()));
        }
        for operand in op.operands.iter() {
            words.push(self.operand(operand));
        }
        Ok(words)
    }

    fn structural(&self, opcode: &Opcode) -> String {
        format!(
            "{}::{}",
            self.spec.opcode_namespace,
            opcode.structural_name().unwrap_or("<unknown>")
        )
    }

    fn operand(&self, operand: &OperandRef) -> String {
        let ns = self.namespace();
        match operand {
            OperandRef::Value(value) => value.0.to_string(),
            OperandRef::Slot(slot) => slot.to_string(),
            OperandRef::Constant(idx) => idx.position().to_string(),
            OperandRef::Register(reg) => format!("{}::{}", ns, reg),
            OperandRef::OperandType(ty) => format!("{}::OpTypes::{}", ns, ty),
            OperandRef::Predicate(pred) => format!("{}::{}", self.spec.predicate_namespace, pred),
            OperandRef::ComplexPattern(kind) => format!("{}::ComplexPattern::{}", ns, kind),
        }
    }

    fn complex_pattern_kinds(&self) -> Result<Vec<String>> {
        let mut kinds: Vec<String> = Vec::with_capacity(self.db.complex_patterns.len());
        for cp in self.db.complex_patterns.iter() {
            let kind = sanitize_select_func(&cp.select_func).map_err(|message| {
                SemanticsError::invalid_pattern(format!("complex pattern {}", cp.name), message)
            })?;
            kinds.push(kind);
        }
        kinds.sort();
        kinds.dedup();
        Ok(kinds)
    }

    fn opcode_names(&self) -> Vec<String> {
        let names: IndexSet<&str> = self
            .db
            .operators
            .iter()
            .map(|op| op.enum_name.as_str())
            // Some targets declare operators without a real enumerator.
            .filter(|name| name.contains("::"))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    fn register_class_types(&self) -> Vec<(String, ValueType)> {
        self.db
            .register_classes
            .iter()
            .map(|rc| {
                let ty = match rc.types.first() {
                    Some(ValueType::X86Mmx) => ValueType::I64,
                    Some(ty) => *ty,
                    None => {
                        log::warn!("Register class {} has no value type", rc.name);
                        ValueType::Other
                    }
                };
                (rc.name.clone(), ty)
            })
            .collect()
    }

    /// Render a laid-out table as an includable source file.
    pub fn render(&self, table: &SemanticsTable) -> Result<String> {
        let ns = table.namespace.as_str();
        let mut out = String::with_capacity(table.num_words as usize * 12 + 4096);

        writeln!(out, "/*===- Target Instruction Semantics -----------------------------*- C++ -*-===*\\")?;
        writeln!(out, "|*                                                                            *|")?;
        writeln!(out, "|* Automatically generated file, do not edit!                                 *|")?;
        writeln!(out, "|*                                                                            *|")?;
        writeln!(out, "\\*===----------------------------------------------------------------------===*/")?;
        writeln!(out)?;
        writeln!(out, "namespace llvm {{")?;
        writeln!(out, "#ifdef {}", self.spec.instr_guard)?;

        writeln!(out, "namespace {} {{", ns)?;
        writeln!(out, "namespace ComplexPattern {{")?;
        writeln!(out, "enum {{")?;
        for kind in table.complex_pattern_kinds.iter() {
            writeln!(out, "  {},", kind)?;
        }
        writeln!(out, "}};\n}} // End ComplexPattern namespace\n")?;

        writeln!(out, "namespace {{\n")?;
        writeln!(out, "const uint16_t InstSemantics[] = {{")?;
        for row in table.rows.iter() {
            match row {
                TableRow::Comment(pattern) => {
                    writeln!(out, "  /*")?;
                    for line in pattern.lines() {
                        writeln!(out, "  {}", line)?;
                    }
                    writeln!(out, "  */")?;
                }
                TableRow::Words(words) => writeln!(out, "  {},", words.join(", "))?,
            }
        }
        writeln!(out, "}};\n")?;

        writeln!(out, "const unsigned OpcodeToSemaIdx[] = {{")?;
        for (offset, name) in table.instruction_index.iter().zip(table.instruction_names.iter()) {
            match offset {
                Some(offset) => writeln!(out, "{}, \t// {}", offset, name)?,
                None => writeln!(out, "~0U, \t// {}", name)?,
            }
        }
        writeln!(out, "}};\n")?;

        writeln!(out, "const uint64_t ConstantArray[] = {{")?;
        for value in table.constants.iter() {
            writeln!(out, "  {}ULL,", *value as u64)?;
        }
        writeln!(out, "}};\n")?;

        writeln!(out, "\n}} // end anonymous namespace")?;
        writeln!(out, "}} // end namespace {}", ns)?;

        let cp_cases: Vec<(String, &str)> = table
            .complex_pattern_kinds
            .iter()
            .map(|kind| (format!("{}::ComplexPattern::{}", ns, kind), kind.as_str()))
            .collect();
        self.render_name_switch(&mut out, ns, "getDCComplexPatternName", "CPKind", &cp_cases, "<unknown>")?;

        let pred_cases: Vec<(String, &str)> = table
            .predicates
            .iter()
            .map(|pred| (format!("{}::{}", self.spec.predicate_namespace, pred), pred.as_str()))
            .collect();
        self.render_name_switch(&mut out, ns, "getDCPredicateName", "PredKind", &pred_cases, "<unknown>")?;

        let op_cases: Vec<(String, &str)> = table
            .custom_operand_types
            .iter()
            .map(|ty| (format!("{}::OpTypes::{}", ns, ty), ty.as_str()))
            .collect();
        self.render_name_switch(&mut out, ns, "getDCCustomOpName", "CustomOpKind", &op_cases, "<unknown>")?;

        let opcode_cases: Vec<(String, &str)> = table
            .opcode_names
            .iter()
            .map(|name| (name.clone(), name.as_str()))
            .collect();
        self.render_name_switch(&mut out, ns, "getDCOpcodeName", "Opcode", &opcode_cases, "<unknown op>")?;

        writeln!(out, "#endif // {}", self.spec.instr_guard)?;

        writeln!(out, "#ifdef {}", self.spec.register_guard)?;
        writeln!(out, "namespace {} {{", ns)?;
        writeln!(out, "namespace {{\n")?;
        writeln!(out, "const MVT::SimpleValueType RegClassVTs[] = {{")?;
        for (name, ty) in table.register_class_types.iter() {
            writeln!(out, "  MVT::{}, // {}", ty.name(), name)?;
        }
        writeln!(out, "}};\n")?;
        writeln!(out, "\n}} // end anonymous namespace")?;
        writeln!(out, "}} // end namespace {}", ns)?;
        writeln!(out, "#endif // {}", self.spec.register_guard)?;

        writeln!(out, "}} // end namespace llvm")?;
        Ok(out)
    }

    fn render_name_switch(
        &self,
        out: &mut String,
        ns: &str,
        function: &str,
        param: &str,
        cases: &[(String, &str)],
        default: &str,
    ) -> Result<()> {
        writeln!(
            out,
            "StringRef {}DCInstruction::{}(unsigned {}) const {{",
            ns, function, param
        )?;
        writeln!(out, "  switch({}) {{", param)?;
        for (label, name) in cases.iter() {
            writeln!(out, "  case {}: return \"{}\";", label, name)?;
        }
        writeln!(out, "  default: return \"{}\";\n  }}\n}}\n", default)?;
        Ok(())
    }
}
