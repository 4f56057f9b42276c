//! Instruction semantics table generator.
//!
//! Turns typed instruction-selection patterns into linear micro-operation
//! programs that a decompiler runtime can interpret, one program per
//! instruction, together with the constant pool and debug name tables the
//! runtime needs to render them.

pub mod semantics;
pub mod target;
