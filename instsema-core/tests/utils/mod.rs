//! Test Utilities
//!
//! This module provides builders for small pattern databases modelled on a
//! 32-bit x86 target, plus helpers to pull programs out of a collection.

#![allow(dead_code)]

use instsema_core::semantics::collector::{CollectedSemantics, InstructionCollector};
use instsema_core::semantics::database::{
    ComplexPatternDef, EquivalenceDef, InstructionDef, OperandInfo, OperandKind, OperatorDef,
    PatternDatabase, RegisterClassDef,
};
use instsema_core::semantics::ir::micro_op::InstructionProgram;
use instsema_core::semantics::pattern::{PatternNode, ValueType};

pub const I32: ValueType = ValueType::I32;

fn operator(name: &str, enum_name: &str, num_results: u32) -> OperatorDef {
    OperatorDef {
        name: name.to_string(),
        enum_name: enum_name.to_string(),
        num_results,
    }
}

/// A database with operators, registers and classes but no instructions.
pub fn base_database() -> PatternDatabase {
    PatternDatabase {
        target: "X86".to_string(),
        operators: vec![
            operator("add", "ISD::ADD", 1),
            operator("sub", "ISD::SUB", 1),
            operator("load", "ISD::LOAD", 1),
            operator("store", "ISD::STORE", 0),
            operator("membarrier", "ISD::MEMBARRIER", 0),
            operator("X86add_flag", "X86ISD::ADD", 2),
            operator("X86sub_flag", "X86ISD::SUB", 2),
            operator("X86mfence_flag", "X86ISD::MFENCE", 1),
            operator("X86rdtsc", "X86ISD::RDTSC_DAG", 1),
            operator("imm", "ISD::Constant", 1),
            operator("vpair", "X86ISD::VPAIR", 2),
        ],
        equivalences: vec![
            EquivalenceDef {
                target_specific: "X86add_flag".to_string(),
                canonical: "add".to_string(),
            },
            EquivalenceDef {
                target_specific: "X86sub_flag".to_string(),
                canonical: "sub".to_string(),
            },
            EquivalenceDef {
                target_specific: "X86mfence_flag".to_string(),
                canonical: "membarrier".to_string(),
            },
        ],
        complex_patterns: vec![ComplexPatternDef {
            name: "addr".to_string(),
            select_func: "selectAddr".to_string(),
        }],
        operand_types: vec!["i32mem".to_string(), "i32imm".to_string()],
        registers: vec![
            "EAX".to_string(),
            "EDX".to_string(),
            "EFLAGS".to_string(),
        ],
        register_classes: vec![
            RegisterClassDef {
                name: "GR32".to_string(),
                types: vec![ValueType::I32],
            },
            RegisterClassDef {
                name: "VR64".to_string(),
                types: vec![ValueType::X86Mmx],
            },
        ],
        ..PatternDatabase::default()
    }
}

pub fn gr32(name: &str, slot: u16) -> OperandInfo {
    OperandInfo {
        name: name.to_string(),
        slot,
        kind: OperandKind::RegisterClass("GR32".to_string()),
    }
}

pub fn reg_operand(name: &str, slot: u16) -> OperandInfo {
    OperandInfo {
        name: name.to_string(),
        slot,
        kind: OperandKind::RegisterOperand("GR32".to_string()),
    }
}

pub fn imm(name: &str, slot: u16) -> OperandInfo {
    OperandInfo {
        name: name.to_string(),
        slot,
        kind: OperandKind::Immediate("i32imm".to_string()),
    }
}

pub fn mem(name: &str, slot: u16) -> OperandInfo {
    OperandInfo {
        name: name.to_string(),
        slot,
        kind: OperandKind::Custom("i32mem".to_string()),
    }
}

/// Named register-class reference: `GR32:$name`.
pub fn reg(name: &str) -> PatternNode {
    PatternNode::register_class("GR32", I32).named(name)
}

/// Named register operand reference: `GR32Op:$name`.
pub fn reg_op_ref(name: &str) -> PatternNode {
    PatternNode::register_operand("GR32Op", "GR32", I32).named(name)
}

/// Named custom operand reference: `i32mem:$name`.
pub fn mem_ref(name: &str) -> PatternNode {
    PatternNode::record("i32mem", I32).named(name)
}

pub fn add(a: PatternNode, b: PatternNode) -> PatternNode {
    PatternNode::sdnode("add", &[I32], vec![a, b])
}

/// `(set GR32:$dst, value)`.
pub fn set_dst(value: PatternNode) -> PatternNode {
    PatternNode::set(vec![reg("dst")], value)
}

/// An instruction with the given operands and pattern.
pub fn instruction(name: &str, operands: Vec<OperandInfo>, pattern: Vec<PatternNode>) -> InstructionDef {
    InstructionDef {
        name: name.to_string(),
        operands,
        pattern: Some(pattern),
        ..InstructionDef::default()
    }
}

/// `ADD32rr`: `(set GR32:$dst, (add GR32:$a, GR32:$b))`.
pub fn add32rr() -> InstructionDef {
    instruction(
        "ADD32rr",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![set_dst(add(reg("a"), reg("b")))],
    )
}

/// A database holding the given instructions.
pub fn database_with(instructions: Vec<InstructionDef>) -> PatternDatabase {
    PatternDatabase {
        instructions,
        ..base_database()
    }
}

/// Run a collection pass, panicking on fatal errors.
pub fn collect(db: &PatternDatabase) -> CollectedSemantics {
    InstructionCollector::new(db)
        .expect("collector setup failed")
        .collect()
        .expect("collection failed")
}

/// Accepted program of the named instruction.
pub fn program<'c>(db: &PatternDatabase, collected: &'c CollectedSemantics, name: &str) -> Option<&'c InstructionProgram> {
    let idx = db.instruction_index(name).expect("unknown instruction");
    collected.program(idx)
}
