//! Tree Linearizer - Converts Pattern Trees to Micro-Operation Programs
//!
//! This module walks an instruction's typed pattern trees bottom-up and emits
//! the linear program describing what the instruction computes.
//!
//! # Conversion Strategy
//! - **Operand references**: read the machine operand (`GET_RC`,
//!   `GET_IMMEDIATE`, `CUSTOM_OP`); custom operand reads are emitted once per
//!   operand name and reused afterwards
//! - **Leaves**: read a pooled constant (`GET_CONSTANT`) or a fixed register
//!   (`GET_REG`)
//! - **`set`**: linearize the value, then write each target (`PUT_RC`,
//!   `PUT_REG`); targets beyond what the value produced become implicit defs
//! - **Operations**: linearize children, take each child's first result as an
//!   operand, emit the operation (rewritten through the equivalence table and
//!   guard predicates)
//!
//! # Value Numbering
//! Every non-void result gets the next value number when its operation is
//! emitted, so operands always refer to earlier operations.

use crate::semantics::constants::ConstantPool;
use crate::semantics::database::{InstructionDef, OperandInfo, OperandKind, Records};
use crate::semantics::equivalence::EquivalenceTable;
use crate::semantics::error::SemanticsError;
use crate::semantics::ir::micro_op::{
    InstructionProgram, LastDef, MicroOp, Opcode, OperandRef, ValueNumber,
};
use crate::semantics::pattern::{Leaf, NodeKind, Operation, Operator, PatternNode, ValueType};
use anyhow::Result;
use indexmap::IndexSet;
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;

/// A value produced by a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Produced {
    pub value: ValueNumber,
    pub ty: ValueType,
}

/// Values produced by a subtree, in result order.
pub type Results = SmallVec<[Produced; 2]>;

/// Tables shared by every instruction of a generation run.
#[derive(Debug, Clone, Default)]
pub struct RunTables {
    pub constants: ConstantPool,
    /// Guard predicates in the order they were first emitted.
    pub predicates: IndexSet<String>,
}

impl RunTables {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Mutable state of one instruction's linearization.
pub struct LinearizationContext<'t> {
    tables: &'t mut RunTables,
    next_value: u32,
    /// Custom operand reads already emitted, by operand name.
    custom_operands: HashMap<String, ValueNumber>,
    program: InstructionProgram,
}

impl<'t> LinearizationContext<'t> {
    pub fn new(tables: &'t mut RunTables, instruction: &str) -> Self {
        Self {
            tables,
            next_value: 0,
            custom_operands: HashMap::new(),
            program: InstructionProgram::new(instruction),
        }
    }

    pub fn into_program(self) -> InstructionProgram {
        self.program
    }
}

/// Linearizer for the patterns of one instruction.
pub struct TreeLinearizer<'a> {
    records: &'a Records<'a>,
    equivalences: &'a EquivalenceTable,
    instruction: &'a InstructionDef,
}

impl<'a> TreeLinearizer<'a> {
    pub fn new(
        records: &'a Records<'a>,
        equivalences: &'a EquivalenceTable,
        instruction: &'a InstructionDef,
    ) -> Self {
        Self {
            records,
            equivalences,
            instruction,
        }
    }

    /// Linearize all top-level trees of an instruction into one program.
    ///
    /// The trees share one value numbering. Implicit defs in the returned
    /// program are only the ones discovered in `set` nodes; the collector
    /// merges in the declared ones.
    ///
    /// # Errors
    /// Returns error if a tree breaks the pattern input contract. Programs the
    /// runtime can't use are *not* errors; see [`InstructionProgram::exclusion`].
    pub fn linearize(&self, trees: &[PatternNode], tables: &mut RunTables) -> Result<InstructionProgram> {
        let mut cx = LinearizationContext::new(tables, &self.instruction.name);
        for tree in trees.iter() {
            self.flatten(tree, &mut cx)?;
        }

        let mut program = cx.into_program();
        if !trees.is_empty() {
            let rendered: Vec<String> = trees.iter().map(PatternNode::to_string).collect();
            program.pattern = Some(rendered.join("\n"));
        }
        Ok(program)
    }

    /// Linearize one top-level tree.
    ///
    /// A top-level tree is a `set`, an `implicit` marker (skipped, implicit
    /// defs are handled uniformly by the collector), or an operation without
    /// results.
    pub fn flatten(&self, tree: &PatternNode, cx: &mut LinearizationContext<'_>) -> Result<()> {
        if tree.name.as_deref().and_then(|name| self.instruction.operand(name)).is_some() {
            return Err(self.error(format!(
                "top-level pattern '{}' must be an operation, not an operand reference",
                tree
            )));
        }
        let op = match &tree.node {
            NodeKind::Op(op) => op,
            NodeKind::Leaf(_) => {
                return Err(self.error(format!("top-level pattern '{}' must be an operation", tree)));
            }
        };

        match &op.operator {
            Operator::Implicit => Ok(()),
            Operator::Set => self.flatten_set(tree, op, cx),
            Operator::Sdnode(name) => {
                let results = self.flatten_sdnode(tree, op, name, cx)?;
                self.expect_no_results(tree, &results)
            }
            Operator::ComplexPattern(name) => {
                let results = self.flatten_complex_pattern(tree, op, name, cx)?;
                self.expect_no_results(tree, &results)
            }
        }
    }

    fn expect_no_results(&self, tree: &PatternNode, results: &Results) -> Result<()> {
        if results.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!(
                "top-level operation '{}' produces {} unused result(s)",
                tree,
                results.len()
            )))
        }
    }

    /// Linearize any subtree, returning the values it produced.
    fn flatten_subtree(&self, node: &PatternNode, cx: &mut LinearizationContext<'_>) -> Result<Results> {
        if let Some(operand) = node.name.as_deref().and_then(|name| self.instruction.operand(name)) {
            return Ok(smallvec![self.flatten_operand(node, operand, cx)?]);
        }

        match &node.node {
            NodeKind::Leaf(leaf) => Ok(smallvec![self.flatten_leaf(node, leaf, cx)?]),
            NodeKind::Op(op) => match &op.operator {
                Operator::Sdnode(name) => self.flatten_sdnode(node, op, name, cx),
                Operator::ComplexPattern(name) => self.flatten_complex_pattern(node, op, name, cx),
                Operator::Set | Operator::Implicit => Err(self.error(format!(
                    "'{}' can only appear at the top level, found in '{}'",
                    op.operator.name(),
                    node
                ))),
            },
        }
    }

    /// Read a formal operand.
    ///
    /// - Register classes and register operands: `GET_RC <slot>`
    /// - Immediate operands: `GET_IMMEDIATE <slot>`
    /// - Custom operands: `CUSTOM_OP <operand type>, <slot>`, emitted once per
    ///   operand name; later reads reuse the first value
    fn flatten_operand(
        &self,
        node: &PatternNode,
        operand: &OperandInfo,
        cx: &mut LinearizationContext<'_>,
    ) -> Result<Produced> {
        let ty = self.single_type(node)?;

        let mut op = match &operand.kind {
            OperandKind::RegisterClass(_) | OperandKind::RegisterOperand(_) => {
                MicroOp::new(Opcode::GetRegClass)
            }
            OperandKind::Immediate(_) => MicroOp::new(Opcode::GetImmediate),
            OperandKind::Custom(record) => {
                if let Some(&value) = cx.custom_operands.get(&operand.name) {
                    return Ok(Produced { value, ty });
                }
                cx.custom_operands
                    .insert(operand.name.clone(), ValueNumber(cx.next_value));
                let mut op = MicroOp::new(Opcode::CustomOperand);
                op.operands.push(OperandRef::OperandType(record.clone()));
                op
            }
        };
        op.types.push(ty);
        op.operands.push(OperandRef::Slot(operand.slot));

        let results = self.emit(op, cx);
        Ok(results[0])
    }

    /// Read a leaf that isn't an operand.
    ///
    /// - Integer constants: `GET_CONSTANT <pool index>`, emitted at every use
    /// - Explicit registers: `GET_REG <register>`
    fn flatten_leaf(&self, node: &PatternNode, leaf: &Leaf, cx: &mut LinearizationContext<'_>) -> Result<Produced> {
        let ty = self.single_type(node)?;

        let mut op = match leaf {
            Leaf::Int(value) => {
                let idx = cx.tables.constants.intern(*value)?;
                let mut op = MicroOp::new(Opcode::GetConstant);
                op.operands.push(OperandRef::Constant(idx));
                op
            }
            Leaf::Register(reg) => {
                self.check_register(reg)?;
                let mut op = MicroOp::new(Opcode::GetRegister);
                op.operands.push(OperandRef::Register(reg.clone()));
                op
            }
            Leaf::RegisterClass(_) | Leaf::RegisterOperand { .. } | Leaf::Record(_) => {
                return Err(self.error_with(
                    format!("unknown operand type for leaf '{}'", node),
                    "Leaves must be constants, explicit registers, or named instruction operands.",
                ));
            }
        };
        op.types.push(ty);

        let results = self.emit(op, cx);
        Ok(results[0])
    }

    /// Linearize a `set`: the last child is the value, the others are the
    /// registers it is written to.
    ///
    /// If an equivalence dropped trailing results from the value, the
    /// corresponding targets must be explicit registers and become implicit
    /// defs.
    fn flatten_set(&self, node: &PatternNode, op: &Operation, cx: &mut LinearizationContext<'_>) -> Result<()> {
        let (value, targets) = op
            .children
            .split_last()
            .ok_or_else(|| self.error(format!("'{}' has no value to set", node)))?;

        if targets.len() > value.types.len() {
            return Err(self.error(format!(
                "invalid 'set': {} target(s) but the value '{}' only has {} result type(s)",
                targets.len(),
                value,
                value.types.len()
            )));
        }

        let results = self.flatten_subtree(value, cx)?;

        for (i, target) in targets.iter().enumerate() {
            let leaf = match &target.node {
                NodeKind::Leaf(leaf) => leaf,
                NodeKind::Op(_) => {
                    return Err(self.error(format!("'set' target '{}' is not a register", target)));
                }
            };

            let Some(result) = results.get(i) else {
                // Dropped by an equivalence.
                match leaf {
                    Leaf::Register(reg) => {
                        self.check_register(reg)?;
                        log::trace!("{}: {} becomes an implicit def", self.instruction.name, reg);
                        cx.program.implicit_defs.push(reg.clone());
                        continue;
                    }
                    _ => {
                        return Err(self.error(format!(
                            "dropped 'set' target '{}' is not an explicit register",
                            target
                        )));
                    }
                }
            };

            let mut put = match leaf {
                Leaf::RegisterClass(_) | Leaf::RegisterOperand { .. } => {
                    let operand = target
                        .name
                        .as_deref()
                        .and_then(|name| self.instruction.operand(name))
                        .ok_or_else(|| {
                            self.error(format!("'set' output operand '{}' not found in instruction", target))
                        })?;
                    let mut put = MicroOp::new(Opcode::PutRegClass);
                    put.operands.push(OperandRef::Slot(operand.slot));
                    put
                }
                Leaf::Register(reg) => {
                    self.check_register(reg)?;
                    cx.program.explicit_defs.push(reg.clone());
                    let mut put = MicroOp::new(Opcode::PutRegister);
                    put.operands.push(OperandRef::Register(reg.clone()));
                    put
                }
                Leaf::Int(_) | Leaf::Record(_) => {
                    return Err(self.error(format!(
                        "'set' should only set registers, found '{}'",
                        target
                    )));
                }
            };
            put.operands.push(OperandRef::Value(result.value));
            self.emit(put, cx);
        }

        Ok(())
    }

    /// Linearize a selection DAG node.
    fn flatten_sdnode(
        &self,
        node: &PatternNode,
        op: &Operation,
        name: &str,
        cx: &mut LinearizationContext<'_>,
    ) -> Result<Results> {
        let operator = self
            .records
            .operator(name)
            .ok_or_else(|| SemanticsError::unknown_record("operator", name, self.instruction.name.as_str()))?;

        if op.intrinsic {
            cx.program.uses_intrinsic = true;
        }
        if op.complex_pattern {
            cx.program.uses_complex_pattern = true;
        }

        let mut micro = MicroOp::new(Opcode::Node(operator.enum_name.clone()));
        micro.types = self.checked_types(node)?;

        if let Some(canonical_name) = self.equivalences.lookup(name) {
            let canonical = self.records.operator(canonical_name).ok_or_else(|| {
                SemanticsError::unknown_record("operator", canonical_name, self.instruction.name.as_str())
            })?;
            let arity = canonical.num_results as usize;
            if micro.types.len() <= arity {
                return Err(self.error_with(
                    format!(
                        "equivalence {} -> {} doesn't drop any result ({} type(s), canonical form has {})",
                        name,
                        canonical_name,
                        micro.types.len(),
                        arity
                    ),
                    "Equivalences must map to an operator producing strictly fewer results.",
                ));
            }
            micro.opcode = Opcode::Node(canonical.enum_name.clone());
            micro.types.truncate(arity);
        }

        if let Some(predicate) = op.predicates.last() {
            micro.opcode = Opcode::Predicate;
            micro.operands.push(OperandRef::Predicate(predicate.clone()));
            cx.tables.predicates.insert(predicate.clone());
        }

        self.flatten_children(node, op, &mut micro, cx)?;
        Ok(self.emit(micro, cx))
    }

    /// Linearize a complex pattern matcher.
    fn flatten_complex_pattern(
        &self,
        node: &PatternNode,
        op: &Operation,
        name: &str,
        cx: &mut LinearizationContext<'_>,
    ) -> Result<Results> {
        let pattern = self
            .records
            .complex_pattern(name)
            .ok_or_else(|| SemanticsError::unknown_record("complex pattern", name, self.instruction.name.as_str()))?;
        let kind = sanitize_select_func(&pattern.select_func)
            .map_err(|message| self.error(format!("complex pattern {}: {}", name, message)))?;

        if op.intrinsic {
            cx.program.uses_intrinsic = true;
        }
        // Clears the flag raised by enclosing nodes too. Generated tables rely
        // on this; see DESIGN.md before changing it.
        cx.program.uses_complex_pattern = false;

        let mut micro = MicroOp::new(Opcode::ComplexPattern);
        micro.types = self.checked_types(node)?;
        micro.operands.push(OperandRef::ComplexPattern(kind));

        self.flatten_children(node, op, &mut micro, cx)?;
        Ok(self.emit(micro, cx))
    }

    /// Linearize the children of an operation, appending the first result of
    /// each as an operand.
    ///
    /// Only the first result is used: `(store (umul_lohi x, y), addr)` stores
    /// the low half and ignores the high half.
    fn flatten_children(
        &self,
        node: &PatternNode,
        op: &Operation,
        micro: &mut MicroOp,
        cx: &mut LinearizationContext<'_>,
    ) -> Result<()> {
        for child in op.children.iter() {
            let results = self.flatten_subtree(child, cx)?;
            let first = results.first().ok_or_else(|| {
                self.error(format!("operand '{}' of '{}' doesn't define anything", child, node))
            })?;
            micro.operands.push(OperandRef::Value(first.value));
        }
        Ok(())
    }

    /// Append an operation to the program and number its results.
    fn emit(&self, op: MicroOp, cx: &mut LinearizationContext<'_>) -> Results {
        let first = cx.next_value;
        let mut results = Results::new();
        for &ty in op.types.iter() {
            if ty.is_untyped() {
                cx.program.uses_intrinsic = true;
            }
            if !ty.is_void() {
                results.push(Produced {
                    value: ValueNumber(cx.next_value),
                    ty,
                });
                cx.next_value += 1;
            }
        }

        if !results.is_empty() {
            cx.program.last_def = Some(LastDef {
                value: ValueNumber(first),
                op_index: cx.program.ops.len(),
            });
        }

        log::trace!("{} [{}]: {}", self.instruction.name, cx.program.ops.len(), op);
        cx.program.ops.push(op);
        results
    }

    /// The node's result types, all resolved.
    fn checked_types(&self, node: &PatternNode) -> Result<SmallVec<[ValueType; 2]>> {
        if let Some(ty) = node.types.iter().find(|ty| !ty.is_concrete()) {
            return Err(self.error_with(
                format!("'{}' has unresolved result type {}", node, ty),
                "Run type inference on the pattern before exporting the database.",
            ));
        }
        Ok(node.types.iter().copied().collect())
    }

    /// The node's only result type.
    fn single_type(&self, node: &PatternNode) -> Result<ValueType> {
        let types = self.checked_types(node)?;
        match types.as_slice() {
            [ty] if !ty.is_void() => Ok(*ty),
            [_] => Err(self.error(format!("'{}' must produce a value, found isVoid", node))),
            _ => Err(self.error(format!(
                "'{}' must have exactly one result type, found {}",
                node,
                types.len()
            ))),
        }
    }

    fn check_register(&self, reg: &str) -> Result<()> {
        if self.records.registers.register(reg).is_none() {
            return Err(SemanticsError::unknown_record("register", reg, self.instruction.name.as_str()).into());
        }
        Ok(())
    }

    fn error(&self, message: String) -> anyhow::Error {
        SemanticsError::invalid_pattern(self.instruction.name.as_str(), message).into()
    }

    fn error_with(&self, message: String, suggestion: &str) -> anyhow::Error {
        SemanticsError::invalid_pattern_with(self.instruction.name.as_str(), message, suggestion).into()
    }
}

/// Derive a complex pattern kind from its selector function name.
///
/// The name must start with `select` or `Select`, which is stripped. A
/// template argument list is folded into the name: `selectAddr<8>` becomes
/// `Addr_8`.
pub fn sanitize_select_func(func: &str) -> Result<String, String> {
    let rest = func
        .strip_prefix("select")
        .or_else(|| func.strip_prefix("Select"))
        .ok_or_else(|| format!("selector function doesn't start with 'select': '{}'", func))?;

    let mut kind = rest.to_string();
    if let Some(open) = kind.find('<') {
        kind.replace_range(open..open + 1, "_");
        if let Some(close) = kind[open..].find('>') {
            kind.truncate(open + close);
        }
    }
    Ok(kind)
}
