//! Constant Pool
//!
//! Semantics tables are arrays of 16-bit words, so 64-bit constants can't be
//! stored inline. Every distinct constant is interned once, in the order it is
//! first seen, and micro-operations refer to it by index.
//!
//! # Indexing
//! Indices start at 1; index 0 is never handed out, so a zero index always
//! means "no constant". The emitted constant array starts with index 1 at
//! position 0.

use crate::semantics::error::SemanticsError;
use anyhow::Result;
use indexmap::IndexSet;
use std::fmt;

/// 1-based index of an interned constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantIndex(u16);

impl ConstantIndex {
    /// The 1-based index.
    #[inline]
    pub fn get(self) -> u16 {
        self.0
    }

    /// Position in the emitted constant array.
    #[inline]
    pub fn position(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for ConstantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deduplicated, insertion-ordered constant pool.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    values: IndexSet<i64>,
}

impl ConstantPool {
    /// Largest number of distinct constants a 16-bit index can address.
    pub const MAX_CONSTANTS: usize = u16::MAX as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning its stable index.
    ///
    /// # Errors
    /// Returns error if `value` is new and the pool is already full.
    pub fn intern(&mut self, value: i64) -> Result<ConstantIndex> {
        if let Some(position) = self.values.get_index_of(&value) {
            return Ok(ConstantIndex(position as u16 + 1));
        }
        if self.values.len() >= Self::MAX_CONSTANTS {
            return Err(SemanticsError::constant_overflow(value, Self::MAX_CONSTANTS).into());
        }
        self.values.insert(value);
        log::trace!("Interned constant {} as #{}", value, self.values.len());
        Ok(ConstantIndex(self.values.len() as u16))
    }

    /// Index of an already interned value.
    pub fn get(&self, value: i64) -> Option<ConstantIndex> {
        self.values
            .get_index_of(&value)
            .map(|position| ConstantIndex(position as u16 + 1))
    }

    /// Value behind an index.
    pub fn value(&self, index: ConstantIndex) -> Option<i64> {
        self.values.get_index(index.position()).copied()
    }

    /// Constants in index order.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
