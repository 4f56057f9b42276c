//! Operator Equivalences
//!
//! Target-specific operators often compute a canonical operation plus extra
//! results (typically flags). An equivalence maps such an operator to the
//! canonical one, which the runtime already knows how to interpret; the
//! linearizer then drops the trailing results the canonical form lacks.

use crate::semantics::database::{PatternDatabase, Records};
use crate::semantics::error::SemanticsError;
use anyhow::Result;
use std::collections::HashMap;

/// Target-specific operator name to canonical operator name.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceTable {
    equivalences: HashMap<String, String>,
}

impl EquivalenceTable {
    /// Build the table from every equivalence the database declares.
    ///
    /// # Errors
    /// Returns error if either side of an equivalence isn't a known operator.
    pub fn build(db: &PatternDatabase, records: &Records<'_>) -> Result<Self> {
        let mut equivalences: HashMap<String, String> = HashMap::with_capacity(db.equivalences.len());

        for equiv in db.equivalences.iter() {
            for name in [&equiv.target_specific, &equiv.canonical] {
                if records.operator(name).is_none() {
                    return Err(SemanticsError::unknown_record(
                        "operator",
                        name.as_str(),
                        format!("equivalence {} -> {}", equiv.target_specific, equiv.canonical),
                    )
                    .into());
                }
            }
            if let Some(previous) =
                equivalences.insert(equiv.target_specific.clone(), equiv.canonical.clone())
            {
                log::warn!(
                    "Operator {} declared equivalent to both {} and {}, keeping {}",
                    equiv.target_specific,
                    previous,
                    equiv.canonical,
                    equiv.canonical
                );
            }
        }

        log::debug!("Loaded {} operator equivalences", equivalences.len());
        Ok(Self { equivalences })
    }

    /// Canonical operator for `operator`, if any.
    pub fn lookup(&self, operator: &str) -> Option<&str> {
        self.equivalences.get(operator).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.equivalences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equivalences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::database::{EquivalenceDef, OperatorDef};

    fn operator(name: &str, enum_name: &str, num_results: u32) -> OperatorDef {
        OperatorDef {
            name: name.to_string(),
            enum_name: enum_name.to_string(),
            num_results,
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let db = PatternDatabase {
            target: "X86".to_string(),
            operators: vec![
                operator("add", "ISD::ADD", 1),
                operator("X86add_flag", "X86ISD::ADD", 2),
            ],
            equivalences: vec![EquivalenceDef {
                target_specific: "X86add_flag".to_string(),
                canonical: "add".to_string(),
            }],
            ..Default::default()
        };
        let records = Records::new(&db);
        let table = EquivalenceTable::build(&db, &records).unwrap();
        assert_eq!(table.lookup("X86add_flag"), Some("add"));
        assert_eq!(table.lookup("add"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_operator_is_fatal() {
        let db = PatternDatabase {
            target: "X86".to_string(),
            operators: vec![operator("add", "ISD::ADD", 1)],
            equivalences: vec![EquivalenceDef {
                target_specific: "X86sub_flag".to_string(),
                canonical: "add".to_string(),
            }],
            ..Default::default()
        };
        let records = Records::new(&db);
        assert!(EquivalenceTable::build(&db, &records).is_err());
    }
}
