//! Program Validation
//!
//! This module checks linearized programs and the laid-out table before they
//! are written, so a bug in linearization shows up as an error instead of as a
//! table the runtime misreads.
//!
//! # Validation Checks
//! - **Programs**: operands only read values produced earlier, the recorded
//!   last def is the real one, write operations produce nothing, at most one
//!   implicit def
//! - **Table**: header words agree with operation sizes, index offsets point at
//!   program starts, constant operands are inside the constant array
//! - **Rendered output**: balanced braces and brackets

use crate::semantics::emitter::{SemanticsTable, TableRow};
use crate::semantics::error::SemanticsError;
use crate::semantics::ir::micro_op::{InstructionProgram, Opcode};
use anyhow::Result;
use std::collections::HashSet;

/// Validator for linearized programs and emitted tables.
pub struct ProgramValidator;

impl ProgramValidator {
    /// Validate one accepted program.
    ///
    /// # Errors
    /// Returns a validation error naming the instruction and the first broken
    /// invariant.
    pub fn validate_program(program: &InstructionProgram) -> Result<()> {
        let fail = |message: String| -> anyhow::Error {
            SemanticsError::validation(program.instruction.as_str(), message).into()
        };

        if let Some(reason) = program.exclusion() {
            return Err(fail(format!("program should have been excluded: {}", reason)));
        }

        let mut produced: u32 = 0;
        let mut last_def = None;
        for (op_index, op) in program.ops.iter().enumerate() {
            for value in op.value_operands() {
                if value.0 >= produced {
                    return Err(fail(format!(
                        "operation {} ({}) reads {} before it is produced",
                        op_index, op, value
                    )));
                }
            }
            if matches!(op.opcode, Opcode::PutRegClass | Opcode::PutRegister) && !op.types.is_empty() {
                return Err(fail(format!("write operation {} ({}) has result types", op_index, op)));
            }
            if matches!(op.opcode, Opcode::Implicit | Opcode::EndOfInstruction) {
                return Err(fail(format!("operation {} ({}) is reserved for the emitter", op_index, op)));
            }
            let defs = op.num_defs() as u32;
            if defs > 0 {
                last_def = Some((produced, op_index));
                produced += defs;
            }
        }

        let recorded = program.last_def.map(|last| (last.value.0, last.op_index));
        if recorded != last_def {
            return Err(fail(format!(
                "recorded last def {:?} doesn't match the program ({:?})",
                recorded, last_def
            )));
        }

        log::trace!(
            "Validated {}: {} operations, {} values",
            program.instruction,
            program.ops.len(),
            produced
        );
        Ok(())
    }

    /// Validate a laid-out table.
    ///
    /// # Errors
    /// Returns a validation error describing the first malformed row or index
    /// entry.
    pub fn validate_table(table: &SemanticsTable) -> Result<()> {
        let fail = |message: String| -> anyhow::Error { SemanticsError::validation("<table>", message).into() };

        let words: Vec<&Vec<String>> = table
            .rows
            .iter()
            .filter_map(|row| match row {
                TableRow::Words(words) => Some(words),
                TableRow::Comment(_) => None,
            })
            .collect();

        match words.first() {
            Some(first) if is_end(first) => {}
            _ => return Err(fail("table must start with END_OF_INSTRUCTION".to_string())),
        }

        let mut starts: HashSet<u32> = HashSet::new();
        let mut position: u32 = 0;
        for row in words.iter() {
            if is_end(row) {
                position += 1;
                starts.insert(position);
                continue;
            }
            let (num_types, num_operands) = parse_header(row.get(1).map(String::as_str))
                .ok_or_else(|| fail(format!("malformed header at word {}: {:?}", position, row)))?;
            if num_types > u8::MAX as usize || num_operands > u8::MAX as usize {
                return Err(fail(format!("header at word {} exceeds 255 entries", position)));
            }
            if row.len() != 2 + num_types + num_operands {
                return Err(fail(format!(
                    "operation at word {} has {} words, header says {}",
                    position,
                    row.len(),
                    2 + num_types + num_operands
                )));
            }
            if row[0].ends_with("::GET_CONSTANT") {
                let in_range = row
                    .last()
                    .and_then(|word| word.parse::<usize>().ok())
                    .is_some_and(|pos| pos < table.constants.len());
                if !in_range {
                    return Err(fail(format!("constant operand at word {} is out of range", position)));
                }
            }
            position += row.len() as u32;
        }

        if position != table.num_words {
            return Err(fail(format!(
                "table has {} words, layout recorded {}",
                position, table.num_words
            )));
        }

        for (offset, name) in table.instruction_index.iter().zip(table.instruction_names.iter()) {
            if let Some(offset) = offset {
                if *offset >= table.num_words || !starts.contains(offset) {
                    return Err(SemanticsError::validation(
                        name.as_str(),
                        format!("index offset {} is not the start of a program", offset),
                    )
                    .into());
                }
            }
        }

        log::debug!(
            "Table validation passed: {} words, {} programs",
            table.num_words,
            table.instruction_index.iter().flatten().count()
        );
        Ok(())
    }

    /// Basic syntax checks on the rendered file.
    pub fn validate_rendered(code: &str) -> Result<()> {
        for (open, close) in [('{', '}'), ('[', ']'), ('(', ')')] {
            let opened = code.matches(open).count();
            let closed = code.matches(close).count();
            if opened != closed {
                return Err(SemanticsError::validation(
                    "<output>",
                    format!("unbalanced '{}': {} open, {} close", open, opened, closed),
                )
                .into());
            }
        }
        if code.matches("#ifdef").count() != code.matches("#endif").count() {
            return Err(SemanticsError::validation("<output>", "unbalanced preprocessor guards").into());
        }
        Ok(())
    }
}

fn is_end(row: &[String]) -> bool {
    row.len() == 1 && row[0].ends_with("::END_OF_INSTRUCTION")
}

/// Parse a `(types<<8)|operands` header word.
fn parse_header(word: Option<&str>) -> Option<(usize, usize)> {
    let rest = word?.strip_prefix('(')?;
    let (types, operands) = rest.split_once("<<8)|")?;
    Some((types.parse().ok()?, operands.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::ir::micro_op::{LastDef, MicroOp, OperandRef, ValueNumber};
    use crate::semantics::pattern::ValueType;
    use smallvec::smallvec;

    fn get_rc(slot: u16) -> MicroOp {
        MicroOp {
            opcode: Opcode::GetRegClass,
            types: smallvec![ValueType::I32],
            operands: smallvec![OperandRef::Slot(slot)],
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(Some("(1<<8)|2")), Some((1, 2)));
        assert_eq!(parse_header(Some("MVT::i32")), None);
        assert_eq!(parse_header(None), None);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut program = InstructionProgram::new("BAD");
        program.ops.push(MicroOp {
            opcode: Opcode::Node("ISD::ADD".to_string()),
            types: smallvec![ValueType::I32],
            operands: smallvec![OperandRef::Value(ValueNumber(0)), OperandRef::Value(ValueNumber(1))],
        });
        program.last_def = Some(LastDef {
            value: ValueNumber(0),
            op_index: 0,
        });
        let err = ProgramValidator::validate_program(&program).unwrap_err();
        assert!(err.to_string().contains("before it is produced"));
    }

    #[test]
    fn test_stale_last_def_rejected() {
        let mut program = InstructionProgram::new("MOV32rr");
        program.ops.push(get_rc(1));
        program.ops.push(get_rc(2));
        program.last_def = Some(LastDef {
            value: ValueNumber(0),
            op_index: 0,
        });
        assert!(ProgramValidator::validate_program(&program).is_err());

        program.last_def = Some(LastDef {
            value: ValueNumber(1),
            op_index: 1,
        });
        assert!(ProgramValidator::validate_program(&program).is_ok());
    }

    #[test]
    fn test_rendered_balance() {
        assert!(ProgramValidator::validate_rendered("#ifdef X\nnamespace a { }\n#endif\n").is_ok());
        assert!(ProgramValidator::validate_rendered("namespace a {\n").is_err());
    }
}
