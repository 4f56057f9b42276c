//! Tests for tree linearization

mod utils;

use instsema_core::semantics::database::{InstructionDef, Records};
use instsema_core::semantics::equivalence::EquivalenceTable;
use instsema_core::semantics::ir::micro_op::{InstructionProgram, LastDef, Opcode, OperandRef, ValueNumber};
use instsema_core::semantics::linearizer::{RunTables, TreeLinearizer};
use instsema_core::semantics::pattern::{Operator, PatternNode, ValueType};
use instsema_core::semantics::PatternDatabase;
use utils::*;

fn linearize(db: &PatternDatabase, inst: &InstructionDef, tables: &mut RunTables) -> anyhow::Result<InstructionProgram> {
    let records = Records::new(db);
    let equivalences = EquivalenceTable::build(db, &records)?;
    let linearizer = TreeLinearizer::new(&records, &equivalences, inst);
    linearizer.linearize(inst.pattern.as_deref().unwrap_or_default(), tables)
}

fn linearize_one(inst: InstructionDef) -> anyhow::Result<InstructionProgram> {
    let db = database_with(vec![inst.clone()]);
    linearize(&db, &inst, &mut RunTables::new())
}

fn value(n: u32) -> OperandRef {
    OperandRef::Value(ValueNumber(n))
}

#[test]
fn test_register_add() {
    let program = linearize_one(add32rr()).unwrap();

    assert_eq!(program.ops.len(), 4);

    assert_eq!(program.ops[0].opcode, Opcode::GetRegClass);
    assert_eq!(program.ops[0].types.to_vec(), vec![I32]);
    assert_eq!(program.ops[0].operands.to_vec(), vec![OperandRef::Slot(1)]);

    assert_eq!(program.ops[1].opcode, Opcode::GetRegClass);
    assert_eq!(program.ops[1].operands.to_vec(), vec![OperandRef::Slot(2)]);

    assert_eq!(program.ops[2].opcode, Opcode::Node("ISD::ADD".to_string()));
    assert_eq!(program.ops[2].types.to_vec(), vec![I32]);
    assert_eq!(program.ops[2].operands.to_vec(), vec![value(0), value(1)]);

    assert_eq!(program.ops[3].opcode, Opcode::PutRegClass);
    assert!(program.ops[3].types.is_empty());
    assert_eq!(program.ops[3].operands.to_vec(), vec![OperandRef::Slot(0), value(2)]);

    assert_eq!(program.num_values(), 3);
    assert_eq!(
        program.last_def,
        Some(LastDef {
            value: ValueNumber(2),
            op_index: 2
        })
    );
    assert!(program.implicit_defs.is_empty());
    assert!(program.implicit_def_op().is_none());
    assert_eq!(
        program.pattern.as_deref(),
        Some("(set GR32:$dst, (add GR32:$a, GR32:$b))")
    );
}

#[test]
fn test_repeated_constant_is_pooled_once() {
    let inst = instruction(
        "ADD32ri_twice",
        vec![gr32("dst", 0), gr32("a", 1)],
        vec![set_dst(add(
            add(reg("a"), PatternNode::int(5, I32)),
            PatternNode::int(5, I32),
        ))],
    );
    let db = database_with(vec![inst.clone()]);
    let mut tables = RunTables::new();
    let program = linearize(&db, &inst, &mut tables).unwrap();

    assert_eq!(tables.constants.len(), 1);
    let five = tables.constants.get(5).unwrap();
    assert_eq!(five.get(), 1);

    let reads: Vec<_> = program
        .ops
        .iter()
        .filter(|op| op.opcode == Opcode::GetConstant)
        .collect();
    assert_eq!(reads.len(), 2);
    for read in reads {
        assert_eq!(read.operands.to_vec(), vec![OperandRef::Constant(five)]);
    }
}

#[test]
fn test_custom_operand_read_once() {
    let inst = instruction(
        "ADD32mi_self",
        vec![gr32("src", 0), mem("imm", 1)],
        vec![PatternNode::sdnode(
            "store",
            &[],
            vec![reg("src"), add(mem_ref("imm"), mem_ref("imm"))],
        )],
    );
    let program = linearize_one(inst).unwrap();

    let custom: Vec<_> = program
        .ops
        .iter()
        .filter(|op| op.opcode == Opcode::CustomOperand)
        .collect();
    assert_eq!(custom.len(), 1);
    assert_eq!(
        custom[0].operands.to_vec(),
        vec![OperandRef::OperandType("i32mem".to_string()), OperandRef::Slot(1)]
    );

    // GET_RC src = %0, CUSTOM_OP imm = %1, add = %2
    let add_op = program
        .ops
        .iter()
        .find(|op| op.opcode == Opcode::Node("ISD::ADD".to_string()))
        .unwrap();
    assert_eq!(add_op.operands.to_vec(), vec![value(1), value(1)]);

    let store = program.ops.last().unwrap();
    assert_eq!(store.opcode, Opcode::Node("ISD::STORE".to_string()));
    assert_eq!(store.operands.to_vec(), vec![value(0), value(2)]);
    assert_eq!(store.num_defs(), 0);
}

#[test]
fn test_immediate_and_register_reads() {
    let inst = instruction(
        "ADD32ri",
        vec![gr32("dst", 0), imm("imm", 1)],
        vec![set_dst(add(
            PatternNode::register("EAX", I32),
            PatternNode::record("i32imm", I32).named("imm"),
        ))],
    );
    let program = linearize_one(inst).unwrap();

    assert_eq!(program.ops[0].opcode, Opcode::GetRegister);
    assert_eq!(program.ops[0].operands.to_vec(), vec![OperandRef::Register("EAX".to_string())]);
    assert_eq!(program.ops[1].opcode, Opcode::GetImmediate);
    assert_eq!(program.ops[1].operands.to_vec(), vec![OperandRef::Slot(1)]);
}

#[test]
fn test_equivalence_drops_result_into_implicit_def() {
    let inst = instruction(
        "ADD32rr_flags",
        vec![gr32("a", 1), gr32("b", 2)],
        vec![PatternNode::set(
            vec![
                PatternNode::register("EAX", I32),
                PatternNode::register("EFLAGS", I32),
            ],
            PatternNode::sdnode("X86add_flag", &[I32, I32], vec![reg("a"), reg("b")]),
        )],
    );
    let program = linearize_one(inst).unwrap();

    let add_op = &program.ops[2];
    assert_eq!(add_op.opcode, Opcode::Node("ISD::ADD".to_string()));
    assert_eq!(add_op.types.len(), 1);

    let put = &program.ops[3];
    assert_eq!(put.opcode, Opcode::PutRegister);
    assert_eq!(put.operands.to_vec(), vec![OperandRef::Register("EAX".to_string()), value(2)]);

    assert_eq!(program.explicit_defs.to_vec(), vec!["EAX".to_string()]);
    assert_eq!(program.implicit_defs.to_vec(), vec!["EFLAGS".to_string()]);
    assert_eq!(program.exclusion(), None);

    let implicit = program.implicit_def_op().unwrap();
    assert_eq!(implicit.opcode, Opcode::Implicit);
    assert_eq!(
        implicit.operands.to_vec(),
        vec![OperandRef::Register("EFLAGS".to_string()), value(2)]
    );
}

#[test]
fn test_equivalence_must_drop_a_result() {
    let inst = instruction(
        "ADD32rr_bad",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![set_dst(PatternNode::sdnode("X86add_flag", &[I32], vec![reg("a"), reg("b")]))],
    );
    let err = linearize_one(inst).unwrap_err();
    assert!(err.to_string().contains("doesn't drop any result"));
}

#[test]
fn test_dropped_target_must_be_explicit_register() {
    let inst = instruction(
        "ADD32rr_badset",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![PatternNode::set(
            vec![PatternNode::register("EAX", I32), reg("dst")],
            PatternNode::sdnode("X86add_flag", &[I32, I32], vec![reg("a"), reg("b")]),
        )],
    );
    let err = linearize_one(inst).unwrap_err();
    assert!(err.to_string().contains("not an explicit register"));
}

#[test]
fn test_predicate_guard() {
    let inst = instruction(
        "ADD32rr_nsw",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![set_dst(add(reg("a"), reg("b")).with_predicate("add_nsw"))],
    );
    let db = database_with(vec![inst.clone()]);
    let mut tables = RunTables::new();
    let program = linearize(&db, &inst, &mut tables).unwrap();

    let guarded = &program.ops[2];
    assert_eq!(guarded.opcode, Opcode::Predicate);
    assert_eq!(
        guarded.operands.to_vec(),
        vec![OperandRef::Predicate("add_nsw".to_string()), value(0), value(1)]
    );
    assert!(tables.predicates.contains("add_nsw"));
}

#[test]
fn test_flags_raised() {
    let intrinsic = instruction(
        "RDTSC",
        vec![gr32("dst", 0)],
        vec![set_dst(PatternNode::sdnode("X86rdtsc", &[I32], vec![]).with_intrinsic())],
    );
    assert!(linearize_one(intrinsic).unwrap().uses_intrinsic);

    let untyped = instruction(
        "RDTSC_untyped",
        vec![],
        vec![PatternNode::sdnode("store", &[], vec![PatternNode::sdnode("X86rdtsc", &[ValueType::Untyped], vec![])])],
    );
    assert!(linearize_one(untyped).unwrap().uses_intrinsic);

    let complex = instruction(
        "MOV32rm",
        vec![gr32("dst", 0), mem("src", 1)],
        vec![set_dst(PatternNode::sdnode("load", &[I32], vec![mem_ref("src")]).with_complex_pattern())],
    );
    assert!(linearize_one(complex).unwrap().uses_complex_pattern);
}

#[test]
fn test_complex_pattern_node_clears_flag() {
    let inst = instruction(
        "MOV32mr",
        vec![gr32("src", 0), gr32("base", 1)],
        vec![PatternNode::sdnode(
            "store",
            &[],
            vec![reg("src"), PatternNode::complex("addr", &[I32], vec![reg("base")])],
        )
        .with_complex_pattern()],
    );
    let program = linearize_one(inst).unwrap();

    assert!(!program.uses_complex_pattern);
    let cp = program
        .ops
        .iter()
        .find(|op| op.opcode == Opcode::ComplexPattern)
        .unwrap();
    assert_eq!(cp.operands[0], OperandRef::ComplexPattern("Addr".to_string()));
}

#[test]
fn test_trees_share_value_numbering() {
    let inst = instruction(
        "ADD32rr_store",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![
            set_dst(add(reg("a"), reg("b"))),
            PatternNode::sdnode("store", &[], vec![reg("a"), reg("b")]),
            PatternNode::op(Operator::Implicit, vec![PatternNode::register("EFLAGS", I32)]),
        ],
    );
    let program = linearize_one(inst).unwrap();

    let store = program.ops.last().unwrap();
    assert_eq!(store.operands.to_vec(), vec![value(3), value(4)]);
    assert!(program.implicit_defs.is_empty());
    assert_eq!(program.pattern.as_deref().map(|p| p.lines().count()), Some(3));
}

#[test]
fn test_no_forward_references() {
    let inst = instruction(
        "ADD32rr_nested",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![set_dst(add(add(reg("a"), PatternNode::int(1, I32)), add(reg("b"), reg("a"))))],
    );
    let program = linearize_one(inst).unwrap();

    let mut produced = 0u32;
    for op in program.ops.iter() {
        for read in op.value_operands() {
            assert!(read.0 < produced, "{} reads {} before it exists", op, read);
        }
        produced += op.num_defs() as u32;
    }
}

#[test]
fn test_void_result_takes_no_value_number() {
    let vpair = PatternNode::sdnode("vpair", &[ValueType::IsVoid, I32], vec![reg("r")]);
    let inst = instruction(
        "VPAIR_ADD",
        vec![gr32("dst", 0), gr32("r", 3)],
        vec![set_dst(add(vpair, reg("r")))],
    );
    let program = linearize_one(inst).unwrap();

    assert_eq!(program.ops.len(), 5);
    assert_eq!(program.ops[0].operands.to_vec(), vec![OperandRef::Slot(3)]);

    assert_eq!(program.ops[1].opcode, Opcode::Node("X86ISD::VPAIR".to_string()));
    assert_eq!(program.ops[1].types.to_vec(), vec![ValueType::IsVoid, I32]);
    assert_eq!(program.ops[1].operands.to_vec(), vec![value(0)]);
    assert_eq!(program.ops[1].num_defs(), 1);

    assert_eq!(program.ops[2].opcode, Opcode::GetRegClass);
    assert_eq!(program.ops[2].operands.to_vec(), vec![OperandRef::Slot(3)]);

    // The pair's only value is %1, so the second read is %2.
    assert_eq!(program.ops[3].opcode, Opcode::Node("ISD::ADD".to_string()));
    assert_eq!(program.ops[3].operands.to_vec(), vec![value(1), value(2)]);

    assert_eq!(program.ops[4].opcode, Opcode::PutRegClass);
    assert_eq!(program.ops[4].operands.to_vec(), vec![OperandRef::Slot(0), value(3)]);

    assert_eq!(program.num_values(), 4);
    assert_eq!(
        program.last_def,
        Some(LastDef {
            value: ValueNumber(3),
            op_index: 3
        })
    );
}

#[test]
fn test_register_operands_use_class_access() {
    let inst = instruction(
        "ADD32rr_op",
        vec![reg_operand("dst", 0), reg_operand("a", 1), gr32("b", 2)],
        vec![PatternNode::set(vec![reg_op_ref("dst")], add(reg_op_ref("a"), reg("b")))],
    );
    let program = linearize_one(inst).unwrap();

    assert_eq!(program.ops.len(), 4);
    assert_eq!(program.ops[0].opcode, Opcode::GetRegClass);
    assert_eq!(program.ops[0].types.to_vec(), vec![I32]);
    assert_eq!(program.ops[0].operands.to_vec(), vec![OperandRef::Slot(1)]);

    assert_eq!(program.ops[3].opcode, Opcode::PutRegClass);
    assert!(program.ops[3].types.is_empty());
    assert_eq!(program.ops[3].operands.to_vec(), vec![OperandRef::Slot(0), value(2)]);
    assert!(program.explicit_defs.is_empty());
}

#[test]
fn test_input_contract_violations() {
    let leaf = instruction("LEAF", vec![], vec![PatternNode::int(1, I32)]);
    assert!(linearize_one(leaf).is_err());

    let nested_set = instruction(
        "NESTED",
        vec![gr32("dst", 0), gr32("a", 1)],
        vec![set_dst(add(reg("a"), PatternNode::set(vec![], PatternNode::int(1, I32))))],
    );
    assert!(linearize_one(nested_set).is_err());

    let unknown_op = instruction(
        "UNKNOWN",
        vec![gr32("dst", 0), gr32("a", 1)],
        vec![set_dst(PatternNode::sdnode("frobnicate", &[I32], vec![reg("a")]))],
    );
    let err = linearize_one(unknown_op).unwrap_err();
    assert!(err.to_string().contains("frobnicate"));

    let unknown_reg = instruction(
        "UNKNOWN_REG",
        vec![gr32("dst", 0)],
        vec![set_dst(add(PatternNode::register("R13", I32), PatternNode::int(1, I32)))],
    );
    assert!(linearize_one(unknown_reg).is_err());

    let unresolved = instruction(
        "UNRESOLVED",
        vec![gr32("dst", 0), gr32("a", 1)],
        vec![set_dst(PatternNode::sdnode("add", &[ValueType::IAny], vec![reg("a"), reg("a")]))],
    );
    assert!(linearize_one(unresolved).is_err());

    let anonymous_class = instruction(
        "ANON",
        vec![gr32("dst", 0)],
        vec![set_dst(add(PatternNode::register_class("GR32", I32), PatternNode::int(1, I32)))],
    );
    assert!(linearize_one(anonymous_class).is_err());

    let unused_result = instruction(
        "UNUSED",
        vec![gr32("a", 1)],
        vec![add(reg("a"), reg("a"))],
    );
    assert!(linearize_one(unused_result).is_err());

    let too_many_targets = instruction(
        "TARGETS",
        vec![gr32("a", 1), gr32("b", 2)],
        vec![PatternNode::set(
            vec![PatternNode::register("EAX", I32), PatternNode::register("EFLAGS", I32)],
            add(reg("a"), reg("b")),
        )],
    );
    let err = linearize_one(too_many_targets).unwrap_err();
    assert!(err.to_string().contains("invalid 'set': 2 target(s)"));

    let top_level_operand = instruction(
        "TOP_OPERAND",
        vec![gr32("dst", 0), gr32("a", 1), gr32("b", 2)],
        vec![PatternNode::sdnode("store", &[], vec![reg("a"), reg("b")]).named("dst")],
    );
    let err = linearize_one(top_level_operand).unwrap_err();
    assert!(err.to_string().contains("not an operand reference"));
}
