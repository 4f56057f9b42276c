//! Linear semantics representation.
//!
//! The micro-operation program produced for each instruction, plus the
//! bookkeeping the collector needs to accept or reject it.

pub mod micro_op;
