//! After reconditioning, no reachable integer arithmetic may remain in raw
//! form, across whole generated programs.

use forge_ast::{BinaryOp, Block, Expression, Statement};
use forge_gen::{generate_program, OptimalPolicy, WeightConfig};
use forge_recondition::recondition;

fn assert_no_raw_arithmetic(e: &Expression) {
    match e {
        Expression::Binary { op, ty, lhs, rhs } => {
            if ty.is_integer() {
                assert!(
                    matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor),
                    "raw integer {} survived reconditioning",
                    op
                );
            }
            assert_no_raw_arithmetic(lhs);
            assert_no_raw_arithmetic(rhs);
        }
        Expression::Grouped(inner) | Expression::Deref(inner) => assert_no_raw_arithmetic(inner),
        Expression::TupleLiteral(values) => values.iter().for_each(assert_no_raw_arithmetic),
        Expression::TupleAccess { base, .. } | Expression::FieldAccess { base, .. } => {
            assert_no_raw_arithmetic(base)
        }
        Expression::Block(b) => check_block(b),
        Expression::If {
            condition,
            then_block,
            else_block,
        } => {
            assert_no_raw_arithmetic(condition);
            check_block(then_block);
            check_block(else_block);
        }
        Expression::Call { args, .. } => args.iter().for_each(assert_no_raw_arithmetic),
        Expression::StructInit { fields, .. } => {
            fields.iter().for_each(|(_, v)| assert_no_raw_arithmetic(v))
        }
        Expression::Borrow { target, .. } => assert_no_raw_arithmetic(target),
        Expression::Wrapping { lhs, rhs, .. }
        | Expression::GuardedDiv { lhs, rhs, .. }
        | Expression::GuardedMod { lhs, rhs, .. } => {
            assert_no_raw_arithmetic(lhs);
            assert_no_raw_arithmetic(rhs);
        }
        _ => {}
    }
}

fn check_block(b: &Block) {
    for statement in &b.statements {
        match statement {
            Statement::Declaration { value, .. } => assert_no_raw_arithmetic(value),
            Statement::Assignment { target, value } => {
                assert_no_raw_arithmetic(target);
                assert_no_raw_arithmetic(value);
            }
            Statement::Expression(e) => assert_no_raw_arithmetic(e),
            Statement::Block(inner) => check_block(inner),
            Statement::Loop { body, .. } => check_block(body),
        }
    }
    if let Some(tail) = &b.tail {
        assert_no_raw_arithmetic(tail);
    }
}

#[test]
fn test_no_raw_integer_arithmetic_survives() {
    let policy = OptimalPolicy::new(WeightConfig::default());
    let mut checked = 0;
    let mut seed = 0;
    while checked < 5 {
        seed += 1;
        let (program, _) = match generate_program(seed, &policy) {
            Ok(result) => result,
            Err(_) => continue,
        };
        let (rewritten, _) = recondition(program);
        check_block(&rewritten.main);
        for function in &rewritten.functions {
            check_block(&function.body);
        }
        checked += 1;
    }
}

#[test]
fn test_guarded_forms_preserve_defined_results() {
    // The rendered guard is `lhs.checked_div(rhs).unwrap_or(zero)`; with a
    // non-zero divisor it must agree with plain division.
    assert_eq!(10i64.checked_div(2).unwrap_or(0), 10i64 / 2);
    assert_eq!(7i32.checked_rem(4).unwrap_or(0), 7i32 % 4);
    // And it absorbs both crash cases.
    assert_eq!(10i64.checked_div(0).unwrap_or(0), 0);
    assert_eq!(i64::MIN.checked_div(-1).unwrap_or(0), 0);
}

#[test]
fn test_reconditioning_keeps_rendered_structure() {
    let policy = OptimalPolicy::new(WeightConfig::default());
    let mut seed = 100;
    let (program, _) = loop {
        match generate_program(seed, &policy) {
            Ok(result) => break result,
            Err(_) => seed += 1,
        }
    };
    let functions_before = program.functions.len();
    let structs_before = program.structs.len();
    let (rewritten, stats) = recondition(program);
    assert_eq!(rewritten.functions.len(), functions_before);
    assert_eq!(rewritten.structs.len(), structs_before);
    assert!(stats.node_counts.values().sum::<u64>() > 0);
}
