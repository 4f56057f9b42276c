//! Micro-Operation Programs
//!
//! This module defines the linear program the linearizer produces for one
//! instruction: a sequence of [`MicroOp`]s wired together by [`ValueNumber`]s.
//!
//! # Memory Optimizations
//! - `MicroOp::types` uses `SmallVec<[ValueType; 2]>`: almost every operation
//!   produces one result, flag-producing ones two
//! - `MicroOp::operands` uses `SmallVec<[OperandRef; 4]>`: operations rarely
//!   take more than three inputs plus a symbolic operand
//! - Def lists use `SmallVec<[String; 1]>`: instructions define at most a
//!   couple of fixed registers

use crate::semantics::constants::ConstantIndex;
use crate::semantics::pattern::ValueType;
use smallvec::SmallVec;
use std::fmt;

/// Dense, per-instruction index of a produced result.
///
/// Value numbers follow production order during the bottom-up walk; void
/// results don't consume one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueNumber(pub u32);

impl fmt::Display for ValueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Micro-operation opcode.
///
/// Selection DAG operations keep their enumerator name; everything else is a
/// structural opcode of the decompiler runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Canonical or target-specific operation (`ISD::ADD`).
    Node(String),
    /// Read a register-class operand.
    GetRegClass,
    /// Read a custom operand.
    CustomOperand,
    /// Read an immediate operand.
    GetImmediate,
    /// Read an explicit register.
    GetRegister,
    /// Read a pooled constant.
    GetConstant,
    /// Write a register-class operand.
    PutRegClass,
    /// Write an explicit register.
    PutRegister,
    /// Result of a complex pattern matcher.
    ComplexPattern,
    /// Value guarded by a predicate.
    Predicate,
    /// Implicit register def.
    Implicit,
    /// Program terminator.
    EndOfInstruction,
}

impl Opcode {
    /// Runtime name of a structural opcode, `None` for DAG operations.
    pub fn structural_name(&self) -> Option<&'static str> {
        Some(match self {
            Opcode::Node(_) => return None,
            Opcode::GetRegClass => "GET_RC",
            Opcode::CustomOperand => "CUSTOM_OP",
            Opcode::GetImmediate => "GET_IMMEDIATE",
            Opcode::GetRegister => "GET_REG",
            Opcode::GetConstant => "GET_CONSTANT",
            Opcode::PutRegClass => "PUT_RC",
            Opcode::PutRegister => "PUT_REG",
            Opcode::ComplexPattern => "COMPLEX_PATTERN",
            Opcode::Predicate => "PREDICATE",
            Opcode::Implicit => "IMPLICIT",
            Opcode::EndOfInstruction => "END_OF_INSTRUCTION",
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Node(name) => f.write_str(name),
            other => f.write_str(other.structural_name().unwrap_or("<unknown>")),
        }
    }
}

/// Operand of a micro-operation.
///
/// Symbols are kept unqualified; the emitter adds the target namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperandRef {
    /// Result of an earlier micro-operation.
    Value(ValueNumber),
    /// Machine operand index.
    Slot(u16),
    /// Pooled constant.
    Constant(ConstantIndex),
    /// Physical register name.
    Register(String),
    /// Operand type record name.
    OperandType(String),
    /// Predicate (PatFrag) name.
    Predicate(String),
    /// Sanitized complex pattern kind.
    ComplexPattern(String),
}

impl fmt::Display for OperandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandRef::Value(value) => write!(f, "{}", value),
            OperandRef::Slot(slot) => write!(f, "op{}", slot),
            OperandRef::Constant(idx) => write!(f, "{}", idx),
            OperandRef::Register(name)
            | OperandRef::OperandType(name)
            | OperandRef::Predicate(name)
            | OperandRef::ComplexPattern(name) => f.write_str(name),
        }
    }
}

/// One step of a linear semantics program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroOp {
    pub opcode: Opcode,
    /// Result types; void entries produce no value.
    pub types: SmallVec<[ValueType; 2]>,
    pub operands: SmallVec<[OperandRef; 4]>,
}

impl MicroOp {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            types: SmallVec::new(),
            operands: SmallVec::new(),
        }
    }

    /// Number of values this operation produces.
    #[inline]
    pub fn num_defs(&self) -> usize {
        self.types.iter().filter(|ty| !ty.is_void()).count()
    }

    /// Value numbers this operation reads.
    pub fn value_operands(&self) -> impl Iterator<Item = ValueNumber> + '_ {
        self.operands.iter().filter_map(|op| match op {
            OperandRef::Value(value) => Some(*value),
            _ => None,
        })
    }
}

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if !self.types.is_empty() {
            f.write_str(":")?;
            for (i, ty) in self.types.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", ty)?;
            }
        }
        for op in self.operands.iter() {
            write!(f, " {}", op)?;
        }
        Ok(())
    }
}

/// The last operation that produced at least one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDef {
    /// Its first produced value.
    pub value: ValueNumber,
    /// Its position in the program.
    pub op_index: usize,
}

/// Why an instruction's program was left out of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    /// Uses an intrinsic.
    Intrinsic,
    /// Uses a complex pattern.
    ComplexPattern,
    /// Implicitly defines more than one register.
    MultipleImplicitDefs,
    /// Implicitly defines a register without defining anything else.
    ImplicitDefWithoutDef,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Exclusion::Intrinsic => "uses an intrinsic",
            Exclusion::ComplexPattern => "uses a complex pattern",
            Exclusion::MultipleImplicitDefs => "implicitly defines multiple registers",
            Exclusion::ImplicitDefWithoutDef => "implicitly defines a register without any other def",
        })
    }
}

/// Linearized semantics of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionProgram {
    /// Instruction name.
    pub instruction: String,
    /// The source pattern, rendered, for table comments.
    pub pattern: Option<String>,
    /// Operations in execution order.
    pub ops: Vec<MicroOp>,
    /// Fixed registers written by `PUT_REG`.
    pub explicit_defs: SmallVec<[String; 1]>,
    /// Registers written as a side effect.
    pub implicit_defs: SmallVec<[String; 1]>,
    pub last_def: Option<LastDef>,
    pub uses_intrinsic: bool,
    pub uses_complex_pattern: bool,
}

impl InstructionProgram {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            pattern: None,
            ops: Vec::new(),
            explicit_defs: SmallVec::new(),
            implicit_defs: SmallVec::new(),
            last_def: None,
            uses_intrinsic: false,
            uses_complex_pattern: false,
        }
    }

    /// Total number of values produced by the program.
    pub fn num_values(&self) -> usize {
        self.ops.iter().map(MicroOp::num_defs).sum()
    }

    /// Reason the runtime can't use this program, if any.
    ///
    /// Checked in order: intrinsics, complex patterns, multiple implicit defs,
    /// implicit def with nothing to attach it to.
    pub fn exclusion(&self) -> Option<Exclusion> {
        if self.uses_intrinsic {
            Some(Exclusion::Intrinsic)
        } else if self.uses_complex_pattern {
            Some(Exclusion::ComplexPattern)
        } else if self.implicit_defs.len() > 1 {
            Some(Exclusion::MultipleImplicitDefs)
        } else if !self.implicit_defs.is_empty() && self.last_def.is_none() {
            Some(Exclusion::ImplicitDefWithoutDef)
        } else {
            None
        }
    }

    /// The implicit-def operation appended after the program body, if any.
    ///
    /// It names the register and the first value of the last producing
    /// operation, which is the value the register receives.
    pub fn implicit_def_op(&self) -> Option<MicroOp> {
        let reg = self.implicit_defs.first()?;
        let last = self.last_def?;
        let mut op = MicroOp::new(Opcode::Implicit);
        op.operands.push(OperandRef::Register(reg.clone()));
        op.operands.push(OperandRef::Value(last.value));
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_num_defs_skips_void() {
        let op = MicroOp {
            opcode: Opcode::Node("ISD::STORE".to_string()),
            types: smallvec![ValueType::IsVoid, ValueType::I32],
            operands: SmallVec::new(),
        };
        assert_eq!(op.num_defs(), 1);
    }

    #[test]
    fn test_exclusion_order() {
        let mut program = InstructionProgram::new("CMP32rr");
        assert_eq!(program.exclusion(), None);
        program.implicit_defs.push("EFLAGS".to_string());
        assert_eq!(program.exclusion(), Some(Exclusion::ImplicitDefWithoutDef));
        program.uses_complex_pattern = true;
        assert_eq!(program.exclusion(), Some(Exclusion::ComplexPattern));
        program.uses_intrinsic = true;
        assert_eq!(program.exclusion(), Some(Exclusion::Intrinsic));
    }

    #[test]
    fn test_display() {
        let op = MicroOp {
            opcode: Opcode::GetRegClass,
            types: smallvec![ValueType::I32],
            operands: smallvec![OperandRef::Slot(1)],
        };
        assert_eq!(op.to_string(), "GET_RC:i32 op1");
    }
}
