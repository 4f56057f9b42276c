pub mod error;
pub mod pattern;
pub mod database;
pub mod equivalence;
pub mod constants;
pub mod ir;
pub mod linearizer;
pub mod collector;
pub mod emitter;
pub mod validator;
pub mod pipeline;

// Re-export commonly used types
pub use collector::{CollectedSemantics, CollectionStats, InstructionCollector};
pub use constants::{ConstantIndex, ConstantPool};
pub use database::PatternDatabase;
pub use emitter::{ProgramEmitter, SemanticsTable};
pub use equivalence::EquivalenceTable;
pub use error::SemanticsError;
pub use ir::micro_op::{InstructionProgram, MicroOp, Opcode, OperandRef, ValueNumber};
pub use linearizer::TreeLinearizer;
pub use pattern::{PatternNode, ValueType};
pub use pipeline::SemanticsPipeline;
