//! Semantics Generation Errors
//!
//! This module provides the error types for semantics generation using `thiserror`.
//! Every variant here is fatal: it means the pattern database handed to the
//! generator is malformed, and the whole run stops.
//!
//! Instructions that merely fall outside what the runtime supports (intrinsics,
//! complex patterns, unsupported implicit defs) are *not* errors. They are
//! reported through [`Exclusion`](crate::semantics::ir::micro_op::Exclusion)
//! and simply left out of the table.
//!
//! # Error Categories
//! - **Pattern errors**: malformed trees, unexpected leaves, bad `set` targets
//! - **Record errors**: references to operators, registers, or instructions the
//!   database doesn't declare
//! - **Constant pool errors**: too many distinct constants for a 16-bit index
//! - **Emission errors**: programs that can't be encoded in the word table
//! - **Validation errors**: generated programs violating a table invariant
//! - **Database errors**: unreadable or inconsistent input files

use thiserror::Error;

/// Semantics generator error types.
#[derive(Error, Debug, Clone)]
pub enum SemanticsError {
    /// Malformed pattern tree.
    ///
    /// Occurs when a tree breaks the input contract: a leaf of unknown shape,
    /// a `set` target that isn't a register, an equivalence that doesn't reduce
    /// the result count, and so on.
    #[error("Invalid pattern in {instruction}: {message}\nSuggestion: {suggestion}")]
    InvalidPattern {
        instruction: String,
        message: String,
        suggestion: String,
    },

    /// Reference to a record the database doesn't declare.
    #[error("Unknown {kind} '{name}' referenced by {context}\nSuggestion: {suggestion}")]
    UnknownRecord {
        kind: &'static str,
        name: String,
        context: String,
        suggestion: String,
    },

    /// Constant pool overflow.
    ///
    /// Constants are referenced through a 16-bit index, so at most
    /// `limit` distinct values fit.
    #[error("Constant pool overflow: cannot intern {value}, the pool already holds {limit} distinct constants\nSuggestion: {suggestion}")]
    ConstantPoolOverflow {
        value: i64,
        limit: usize,
        suggestion: String,
    },

    /// Program can't be encoded in the semantics table.
    #[error("Emission error for {instruction}: {message}\nSuggestion: {suggestion}")]
    EmissionError {
        instruction: String,
        message: String,
        suggestion: String,
    },

    /// Generated program or table violates a table invariant.
    #[error("Validation error for {instruction}: {message}")]
    ValidationError {
        instruction: String,
        message: String,
    },

    /// Unreadable or inconsistent pattern database.
    #[error("Database error: {message}\nSuggestion: {suggestion}")]
    DatabaseError {
        message: String,
        suggestion: String,
    },
}

impl SemanticsError {
    /// Create a pattern error with the default suggestion.
    pub fn invalid_pattern(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            instruction: instruction.into(),
            message: message.into(),
            suggestion: "Check the instruction's pattern in the target description.".to_string(),
        }
    }

    /// Create a pattern error with a specific suggestion.
    pub fn invalid_pattern_with(
        instruction: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidPattern {
            instruction: instruction.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an unknown record error.
    pub fn unknown_record(
        kind: &'static str,
        name: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        let suggestion = match kind {
            "operator" => "Add the operator to the database's `operators` list.",
            "register" => "Add the register to the database's `registers` list.",
            "instruction" => "Semantics overrides must name an instruction from `instructions`.",
            "complex pattern" => "Add the matcher to the database's `complex_patterns` list.",
            _ => "Check that the database export is complete.",
        };
        Self::UnknownRecord {
            kind,
            name: name.into(),
            context: context.into(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Create a constant pool overflow error.
    pub fn constant_overflow(value: i64, limit: usize) -> Self {
        Self::ConstantPoolOverflow {
            value,
            limit,
            suggestion: "The table format uses 16-bit constant indices; split the target or widen the format.".to_string(),
        }
    }

    /// Create an emission error.
    pub fn emission(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmissionError {
            instruction: instruction.into(),
            message: message.into(),
            suggestion: "A single micro-operation is limited to 255 result types and 255 operands.".to_string(),
        }
    }

    /// Create a validation error.
    pub fn validation(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            instruction: instruction.into(),
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
            suggestion: "Regenerate the pattern database export.".to_string(),
        }
    }
}

impl From<std::io::Error> for SemanticsError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        SemanticsError::DatabaseError {
            message: format!("IO error: {}", err),
            suggestion: "Check file permissions and that the file exists.".to_string(),
        }
    }
}

impl From<serde_json::Error> for SemanticsError {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        SemanticsError::DatabaseError {
            message: format!("JSON error at line {}, column {}: {}", err.line(), err.column(), err),
            suggestion: "The database must follow the pattern database JSON layout.".to_string(),
        }
    }
}
