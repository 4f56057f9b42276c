//! Typed Pattern Trees
//!
//! This module defines the operation trees that describe what an instruction
//! computes, as exported from the target description after type inference.
//!
//! # Node Shapes
//! A node is either a [`Leaf`] (integer constant or record reference) or an
//! [`Operation`] applying an [`Operator`] to child trees. Any node may carry a
//! name; a name that matches one of the instruction's formal operands turns the
//! node into an operand reference, whatever its shape.
//!
//! The operator family is decided once, when the database is deserialized, so
//! the linearizer dispatches with an exhaustive `match` instead of inspecting
//! record class names.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! value_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Machine value type of a node result.
        ///
        /// Serialized under the target description's own spelling (`i32`,
        /// `isVoid`, `Untyped`, ...).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum ValueType {
            $(
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl ValueType {
            /// Name as spelled in the target description.
            pub fn name(self) -> &'static str {
                match self {
                    $(ValueType::$variant => $name,)*
                }
            }
        }
    };
}

value_types! {
    Other => "Other",
    I1 => "i1",
    I8 => "i8",
    I16 => "i16",
    I32 => "i32",
    I64 => "i64",
    I128 => "i128",
    F16 => "f16",
    F32 => "f32",
    F64 => "f64",
    F80 => "f80",
    F128 => "f128",
    PpcF128 => "ppcf128",
    V16I1 => "v16i1",
    V8I8 => "v8i8",
    V16I8 => "v16i8",
    V32I8 => "v32i8",
    V4I16 => "v4i16",
    V8I16 => "v8i16",
    V16I16 => "v16i16",
    V2I32 => "v2i32",
    V4I32 => "v4i32",
    V8I32 => "v8i32",
    V1I64 => "v1i64",
    V2I64 => "v2i64",
    V4I64 => "v4i64",
    V2F32 => "v2f32",
    V4F32 => "v4f32",
    V8F32 => "v8f32",
    V2F64 => "v2f64",
    V4F64 => "v4f64",
    X86Mmx => "x86mmx",
    Glue => "Glue",
    IsVoid => "isVoid",
    Untyped => "Untyped",
    // Polymorphic markers. They must be resolved before linearization.
    IPtrAny => "iPTRAny",
    VAny => "vAny",
    FAny => "fAny",
    IAny => "iAny",
    IPtr => "iPTR",
    Any => "Any",
}

impl ValueType {
    /// `isVoid` results don't produce a value.
    #[inline]
    pub fn is_void(self) -> bool {
        self == ValueType::IsVoid
    }

    /// `Untyped` results come from intrinsics.
    #[inline]
    pub fn is_untyped(self) -> bool {
        self == ValueType::Untyped
    }

    /// Whether type inference left this type unresolved.
    #[inline]
    pub fn is_concrete(self) -> bool {
        !matches!(
            self,
            ValueType::IPtrAny
                | ValueType::VAny
                | ValueType::FAny
                | ValueType::IAny
                | ValueType::IPtr
                | ValueType::Any
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A node of a typed pattern tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternNode {
    /// Node name (`$dst` in `GR32:$dst`), without the `$`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Result types, fully inferred.
    #[serde(default)]
    pub types: Vec<ValueType>,
    pub node: NodeKind,
}

/// Leaf or operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Leaf(Leaf),
    Op(Operation),
}

/// Leaf value, classified by the record it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leaf {
    /// Compile-time integer constant.
    Int(i64),
    /// Explicit physical register.
    Register(String),
    /// Register class.
    RegisterClass(String),
    /// Register operand wrapping a register class.
    RegisterOperand { name: String, class: String },
    /// Any other record; never valid in a semantics tree.
    Record(String),
}

/// Operator applied to child trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operator: Operator,
    #[serde(default)]
    pub children: Vec<PatternNode>,
    /// Guard predicates (PatFrag names), innermost last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    /// The node resolves to an intrinsic.
    #[serde(default, skip_serializing_if = "is_false")]
    pub intrinsic: bool,
    /// The node is matched through a complex pattern.
    #[serde(default, skip_serializing_if = "is_false")]
    pub complex_pattern: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Operator families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Assignment: all children but the last are targets.
    Set,
    /// Implicit register def marker.
    Implicit,
    /// Selection DAG node, by record name (`add`, `X86add_flag`).
    Sdnode(String),
    /// Complex pattern matcher, by record name.
    ComplexPattern(String),
}

impl Operator {
    /// Record name of the operator.
    pub fn name(&self) -> &str {
        match self {
            Operator::Set => "set",
            Operator::Implicit => "implicit",
            Operator::Sdnode(name) | Operator::ComplexPattern(name) => name,
        }
    }
}

impl PatternNode {
    /// Integer constant leaf.
    pub fn int(value: i64, ty: ValueType) -> Self {
        Self::leaf(Leaf::Int(value), ty)
    }

    /// Explicit register leaf.
    pub fn register(name: impl Into<String>, ty: ValueType) -> Self {
        Self::leaf(Leaf::Register(name.into()), ty)
    }

    /// Register class leaf, usually named after an operand.
    pub fn register_class(class: impl Into<String>, ty: ValueType) -> Self {
        Self::leaf(Leaf::RegisterClass(class.into()), ty)
    }

    /// Register operand leaf wrapping `class`.
    pub fn register_operand(name: impl Into<String>, class: impl Into<String>, ty: ValueType) -> Self {
        Self::leaf(
            Leaf::RegisterOperand {
                name: name.into(),
                class: class.into(),
            },
            ty,
        )
    }

    /// Leaf for an arbitrary record.
    pub fn record(name: impl Into<String>, ty: ValueType) -> Self {
        Self::leaf(Leaf::Record(name.into()), ty)
    }

    fn leaf(leaf: Leaf, ty: ValueType) -> Self {
        Self {
            name: None,
            types: vec![ty],
            node: NodeKind::Leaf(leaf),
        }
    }

    /// Operation node without result types.
    pub fn op(operator: Operator, children: Vec<PatternNode>) -> Self {
        Self {
            name: None,
            types: Vec::new(),
            node: NodeKind::Op(Operation {
                operator,
                children,
                predicates: Vec::new(),
                intrinsic: false,
                complex_pattern: false,
            }),
        }
    }

    /// `(set targets..., value)`.
    pub fn set(mut targets: Vec<PatternNode>, value: PatternNode) -> Self {
        targets.push(value);
        Self::op(Operator::Set, targets)
    }

    /// Selection DAG node with the given result types.
    pub fn sdnode(name: impl Into<String>, types: &[ValueType], children: Vec<PatternNode>) -> Self {
        Self::op(Operator::Sdnode(name.into()), children).with_types(types)
    }

    /// Complex pattern matcher with the given result types.
    pub fn complex(name: impl Into<String>, types: &[ValueType], children: Vec<PatternNode>) -> Self {
        Self::op(Operator::ComplexPattern(name.into()), children).with_types(types)
    }

    /// Set the node name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the result types.
    pub fn with_types(mut self, types: &[ValueType]) -> Self {
        self.types = types.to_vec();
        self
    }

    /// Attach a guard predicate to an operation node.
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        if let NodeKind::Op(op) = &mut self.node {
            op.predicates.push(predicate.into());
        }
        self
    }

    /// Mark an operation node as resolving to an intrinsic.
    pub fn with_intrinsic(mut self) -> Self {
        if let NodeKind::Op(op) = &mut self.node {
            op.intrinsic = true;
        }
        self
    }

    /// Mark an operation node as matched through a complex pattern.
    pub fn with_complex_pattern(mut self) -> Self {
        if let NodeKind::Op(op) = &mut self.node {
            op.complex_pattern = true;
        }
        self
    }
}

impl fmt::Display for PatternNode {
    /// Render in the target description's DAG syntax:
    /// `(set GR32:$dst, (add GR32:$a, 5))`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            NodeKind::Leaf(Leaf::Int(value)) => write!(f, "{}", value)?,
            NodeKind::Leaf(Leaf::Register(name))
            | NodeKind::Leaf(Leaf::RegisterClass(name))
            | NodeKind::Leaf(Leaf::RegisterOperand { name, .. })
            | NodeKind::Leaf(Leaf::Record(name)) => f.write_str(name)?,
            NodeKind::Op(op) => {
                write!(f, "({}", op.operator.name())?;
                for (i, child) in op.children.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { ", " })?;
                    write!(f, "{}", child)?;
                }
                f.write_str(")")?;
            }
        }
        if let Some(name) = &self.name {
            write!(f, ":${}", name)?;
        }
        Ok(())
    }
}
