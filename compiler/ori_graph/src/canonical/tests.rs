#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use super::*;
use crate::test_helpers::{fixed, int, logic, param};

/// Providers backed by a field table.
#[derive(Default)]
struct Tool {
    reads: bool,
    fields: FxHashMap<(ObjectId, FieldId), Constant>,
}

impl MetaAccessProvider for Tool {
    fn is_final_field(&self, field: FieldId) -> bool {
        field.raw() < 100
    }
}

impl ConstantReflectionProvider for Tool {
    fn read_constant_field(&self, object: ObjectId, field: FieldId) -> Option<Constant> {
        self.fields.get(&(object, field)).copied()
    }
}

impl CanonicalizerTool for Tool {
    fn meta_access(&self) -> &dyn MetaAccessProvider {
        self
    }

    fn constant_reflection(&self) -> &dyn ConstantReflectionProvider {
        self
    }

    fn canonicalize_reads(&self) -> bool {
        self.reads
    }

    fn all_usages_available(&self) -> bool {
        false
    }
}

fn run(g: &Graph, node: &NewNode) -> Canonical {
    canonical(g, &NodeView::of_new(node).unwrap(), &Tool::default())
}

fn floating(op: Op, stamp: Stamp, inputs: &[NodeId]) -> NewNode {
    NewNode::new(op, stamp).with_inputs(inputs.iter().copied())
}

#[test]
fn negation_of_constant() {
    let mut g = Graph::new();
    let t = logic(&mut g, true);
    let result = run(&g, &floating(Op::LogicNegation, Stamp::Logic, &[t]));
    assert_eq!(
        result,
        Canonical::Replace(Replacement::New(NewNode::new(
            Op::LogicConstant(false),
            Stamp::Logic
        )))
    );
}

#[test]
fn double_negation() {
    let mut g = Graph::new();
    let x = param(&mut g, 0);
    let cond = g
        .add(floating(Op::Compare(CompareOp::Lt), Stamp::Logic, &[x, x]))
        .unwrap();
    let inner = g.add(floating(Op::LogicNegation, Stamp::Logic, &[cond])).unwrap();
    let result = run(&g, &floating(Op::LogicNegation, Stamp::Logic, &[inner]));
    assert_eq!(result, Canonical::Replace(Replacement::Existing(cond)));
}

#[test]
fn is_null_from_stamp() {
    let mut g = Graph::new();
    let null = g
        .add_or_unique(NewNode::new(
            Op::Constant(Constant::Null),
            Stamp::for_constant(&Constant::Null),
        ))
        .unwrap();
    let unknown = g.add(NewNode::new(Op::Parameter(0), Stamp::OBJECT)).unwrap();

    assert_eq!(
        run(&g, &floating(Op::IsNull, Stamp::Logic, &[null])),
        Canonical::Replace(Replacement::New(NewNode::new(
            Op::LogicConstant(true),
            Stamp::Logic
        )))
    );
    assert_eq!(
        run(&g, &floating(Op::IsNull, Stamp::Logic, &[unknown])),
        Canonical::Unchanged
    );
}

#[test]
fn compare_folds() {
    let mut g = Graph::new();
    let two = int(&mut g, 2);
    let three = int(&mut g, 3);
    let x = param(&mut g, 0);
    let lt = |a, b| floating(Op::Compare(CompareOp::Lt), Stamp::Logic, &[a, b]);

    assert_eq!(run(&g, &lt(two, three)), logic_constant(true));
    assert_eq!(run(&g, &lt(x, x)), logic_constant(false));
    assert_eq!(run(&g, &lt(x, two)), Canonical::Unchanged);
}

#[test]
fn compare_decides_disjoint_ranges() {
    let mut g = Graph::new();
    let small = g
        .add(NewNode::new(Op::Parameter(0), Stamp::int_range(0, 9)))
        .unwrap();
    let big = g
        .add(NewNode::new(Op::Parameter(1), Stamp::int_range(10, 20)))
        .unwrap();
    let cmp = |op, a, b| floating(Op::Compare(op), Stamp::Logic, &[a, b]);

    assert_eq!(run(&g, &cmp(CompareOp::Lt, small, big)), logic_constant(true));
    assert_eq!(run(&g, &cmp(CompareOp::Gt, small, big)), logic_constant(false));
    assert_eq!(run(&g, &cmp(CompareOp::Eq, small, big)), logic_constant(false));
    assert_eq!(run(&g, &cmp(CompareOp::Le, small, big)), Canonical::Unchanged);
}

#[test]
fn binary_folds_and_identities() {
    let mut g = Graph::new();
    let x = param(&mut g, 0);
    let zero = int(&mut g, 0);
    let one = int(&mut g, 1);
    let six = int(&mut g, 6);
    let bin = |op, a, b| floating(Op::Binary(op), Stamp::INT, &[a, b]);

    assert_eq!(
        run(&g, &bin(BinaryOp::Mul, six, six)),
        Canonical::Replace(Replacement::New(int_constant(36)))
    );
    assert_eq!(run(&g, &bin(BinaryOp::Add, x, zero)), existing(x));
    assert_eq!(run(&g, &bin(BinaryOp::Add, zero, x)), existing(x));
    assert_eq!(run(&g, &bin(BinaryOp::Mul, one, x)), existing(x));
    assert_eq!(run(&g, &bin(BinaryOp::Sub, zero, x)), Canonical::Unchanged);
    assert_eq!(run(&g, &bin(BinaryOp::Div, six, zero)), Canonical::Unchanged);
}

#[test]
fn add_reassociates_constants() {
    let mut g = Graph::new();
    let x = param(&mut g, 0);
    let two = int(&mut g, 2);
    let five = int(&mut g, 5);
    let inner = g
        .add(floating(Op::Binary(BinaryOp::Add), Stamp::INT, &[x, two]))
        .unwrap();

    let result = run(&g, &floating(Op::Binary(BinaryOp::Add), Stamp::INT, &[inner, five]));

    let Canonical::Replace(Replacement::New(replacement)) = result else {
        panic!("expected a new node, got {result:?}");
    };
    let sum = g.add_or_unique_with_inputs(replacement).unwrap();
    assert_eq!(g.inputs(sum)[0], x);
    assert_eq!(g.op(g.inputs(sum)[1]), &Op::Constant(Constant::Int(7)));
}

#[test]
fn pi_disappears_when_value_already_narrow() {
    let mut g = Graph::new();
    let start = fixed(&mut g, Op::Start, &[]);
    let narrow = g
        .add(NewNode::new(Op::Parameter(0), Stamp::int_range(1, 2)))
        .unwrap();
    let wide = param(&mut g, 1);

    let pi = |v| floating(Op::Pi, Stamp::int_range(0, 10), &[v, start]);
    assert_eq!(run(&g, &pi(narrow)), existing(narrow));
    assert_eq!(run(&g, &pi(wide)), Canonical::Unchanged);
}

#[test]
fn placeholder_defers() {
    let g = Graph::new();
    assert_eq!(
        run(&g, &NewNode::new(Op::Placeholder, Stamp::Void)),
        Canonical::Defer
    );
}

#[test]
fn read_rules() {
    let mut g = Graph::new();
    let handle = ObjectId::new(4);
    let field = FieldId::new(1);
    let object = g
        .add_or_unique(NewNode::new(
            Op::Constant(Constant::Object(handle)),
            Stamp::for_constant(&Constant::Object(handle)),
        ))
        .unwrap();
    let null = g
        .add_or_unique(NewNode::new(
            Op::Constant(Constant::Null),
            Stamp::for_constant(&Constant::Null),
        ))
        .unwrap();
    let read_op = Op::Read {
        field,
        checked: true,
    };
    let load = fixed(&mut g, read_op.clone(), &[object]);
    let null_load = fixed(&mut g, read_op, &[null]);

    let mut tool = Tool::default();
    tool.fields.insert((handle, field), Constant::Int(11));

    // Reads not allowed: only the null check goes away.
    let result = canonical(&g, &NodeView::of(&g, load), &tool);
    assert_eq!(
        result,
        Canonical::Replace(Replacement::New(
            NewNode::new(
                Op::Read {
                    field,
                    checked: false
                },
                Stamp::Void
            )
            .with_inputs([object])
        ))
    );

    tool.reads = true;
    assert_eq!(
        canonical(&g, &NodeView::of(&g, load), &tool),
        Canonical::Replace(Replacement::New(int_constant(11)))
    );

    let Canonical::Replace(Replacement::New(deopt)) =
        canonical(&g, &NodeView::of(&g, null_load), &tool)
    else {
        panic!("expected a deoptimization");
    };
    assert!(deopt.op.is_control_sink());
}

#[test]
fn rule_coverage() {
    assert!(is_canonicalizable(&Op::Pi));
    assert!(is_canonicalizable(&Op::Read {
        field: FieldId::new(0),
        checked: false
    }));
    assert!(!is_canonicalizable(&Op::Phi));
    assert!(!is_canonicalizable(&Op::If));
}
