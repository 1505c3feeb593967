//! Reconditioning: a post-order rewrite over a finished program that replaces
//! every arithmetic operation with undefined-behavior potential by a
//! defined-behavior equivalent, leaving types, bindings and control flow
//! untouched. Float and bitwise operators are already fully defined and stay
//! raw.
//!
//! The pass also accumulates per-node-kind occurrence counts and per-variable
//! use counts, reported as generation statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use forge_ast::{BinaryOp, Block, Expression, Program, Statement, WrappingOp};

/// Side output of the pass, persisted as JSON next to each generated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub node_counts: BTreeMap<String, u64>,
    pub average_variable_use: f64,
}

/// Rewrite `program` into its undefined-behavior-free equivalent and report
/// occurrence statistics.
pub fn recondition(program: Program) -> (Program, Statistics) {
    Reconditioner::new().run(program)
}

#[derive(Debug, Default)]
pub struct Reconditioner {
    node_counts: BTreeMap<String, u64>,
    variable_use: BTreeMap<String, u64>,
}

impl Reconditioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, program: Program) -> (Program, Statistics) {
        let functions = program
            .functions
            .into_iter()
            .map(|mut f| {
                f.body = self.rewrite_block(f.body);
                f
            })
            .collect();
        let main = self.rewrite_block(program.main);
        let rewritten = Program {
            structs: program.structs,
            functions,
            main,
        };
        let average_variable_use = if self.variable_use.is_empty() {
            0.0
        } else {
            self.variable_use.values().sum::<u64>() as f64 / self.variable_use.len() as f64
        };
        let statistics = Statistics {
            node_counts: self.node_counts,
            average_variable_use,
        };
        (rewritten, statistics)
    }

    fn count(&mut self, name: &str) {
        *self.node_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    fn count_variable(&mut self, name: &str) {
        *self.variable_use.entry(name.to_string()).or_insert(0) += 1;
    }

    fn rewrite_block(&mut self, block: Block) -> Block {
        Block {
            statements: block
                .statements
                .into_iter()
                .map(|s| self.rewrite_statement(s))
                .collect(),
            tail: block.tail.map(|t| Box::new(self.rewrite_expression(*t))),
            ty: block.ty,
        }
    }

    fn rewrite_statement(&mut self, statement: Statement) -> Statement {
        self.count(statement_name(&statement));
        match statement {
            Statement::Declaration {
                mutable,
                name,
                ty,
                value,
            } => Statement::Declaration {
                mutable,
                name,
                ty,
                value: self.rewrite_expression(value),
            },
            Statement::Assignment { target, value } => Statement::Assignment {
                target: self.rewrite_expression(target),
                value: self.rewrite_expression(value),
            },
            Statement::Expression(e) => Statement::Expression(self.rewrite_expression(e)),
            Statement::Block(b) => Statement::Block(self.rewrite_block(b)),
            Statement::Loop { iterations, body } => Statement::Loop {
                iterations,
                body: self.rewrite_block(body),
            },
        }
    }

    fn rewrite_expression(&mut self, expression: Expression) -> Expression {
        self.count(expression_name(&expression));
        match expression {
            Expression::Variable { name, ty } => {
                self.count_variable(&name);
                Expression::Variable { name, ty }
            }
            Expression::Grouped(inner) => {
                Expression::Grouped(Box::new(self.rewrite_expression(*inner)))
            }
            Expression::TupleLiteral(values) => Expression::TupleLiteral(
                values
                    .into_iter()
                    .map(|v| self.rewrite_expression(v))
                    .collect(),
            ),
            Expression::TupleAccess { base, index } => Expression::TupleAccess {
                base: Box::new(self.rewrite_expression(*base)),
                index,
            },
            Expression::FieldAccess { base, field } => Expression::FieldAccess {
                base: Box::new(self.rewrite_expression(*base)),
                field,
            },
            Expression::Binary { op, ty, lhs, rhs } => {
                let lhs = Box::new(self.rewrite_expression(*lhs));
                let rhs = Box::new(self.rewrite_expression(*rhs));
                if ty.is_integer() {
                    match op {
                        BinaryOp::Add => Expression::Wrapping {
                            op: WrappingOp::Add,
                            ty,
                            lhs,
                            rhs,
                        },
                        BinaryOp::Sub => Expression::Wrapping {
                            op: WrappingOp::Sub,
                            ty,
                            lhs,
                            rhs,
                        },
                        BinaryOp::Mul => Expression::Wrapping {
                            op: WrappingOp::Mul,
                            ty,
                            lhs,
                            rhs,
                        },
                        BinaryOp::Div => Expression::GuardedDiv { ty, lhs, rhs },
                        BinaryOp::Mod => Expression::GuardedMod { ty, lhs, rhs },
                        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                            Expression::Binary { op, ty, lhs, rhs }
                        }
                    }
                } else {
                    Expression::Binary { op, ty, lhs, rhs }
                }
            }
            Expression::Block(b) => Expression::Block(self.rewrite_block(b)),
            Expression::If {
                condition,
                then_block,
                else_block,
            } => Expression::If {
                condition: Box::new(self.rewrite_expression(*condition)),
                then_block: self.rewrite_block(then_block),
                else_block: self.rewrite_block(else_block),
            },
            Expression::Call {
                function,
                ret,
                args,
            } => Expression::Call {
                function,
                ret,
                args: args
                    .into_iter()
                    .map(|a| self.rewrite_expression(a))
                    .collect(),
            },
            Expression::StructInit { ty, fields } => Expression::StructInit {
                ty,
                fields: fields
                    .into_iter()
                    .map(|(name, value)| (name, self.rewrite_expression(value)))
                    .collect(),
            },
            Expression::Borrow { mutable, target } => Expression::Borrow {
                mutable,
                target: Box::new(self.rewrite_expression(*target)),
            },
            Expression::Deref(inner) => {
                Expression::Deref(Box::new(self.rewrite_expression(*inner)))
            }
            Expression::Wrapping { op, ty, lhs, rhs } => Expression::Wrapping {
                op,
                ty,
                lhs: Box::new(self.rewrite_expression(*lhs)),
                rhs: Box::new(self.rewrite_expression(*rhs)),
            },
            Expression::GuardedDiv { ty, lhs, rhs } => Expression::GuardedDiv {
                ty,
                lhs: Box::new(self.rewrite_expression(*lhs)),
                rhs: Box::new(self.rewrite_expression(*rhs)),
            },
            Expression::GuardedMod { ty, lhs, rhs } => Expression::GuardedMod {
                ty,
                lhs: Box::new(self.rewrite_expression(*lhs)),
                rhs: Box::new(self.rewrite_expression(*rhs)),
            },
            literal => literal,
        }
    }
}

fn statement_name(statement: &Statement) -> &'static str {
    match statement {
        Statement::Declaration { .. } => "Declaration",
        Statement::Assignment { .. } => "Assignment",
        Statement::Expression(_) => "ExpressionStatement",
        Statement::Block(_) => "BlockStatement",
        Statement::Loop { .. } => "LoopStatement",
    }
}

fn expression_name(expression: &Expression) -> &'static str {
    match expression {
        Expression::Int8Literal(_) => "Int8Literal",
        Expression::Int16Literal(_) => "Int16Literal",
        Expression::Int32Literal(_) => "Int32Literal",
        Expression::Int64Literal(_) => "Int64Literal",
        Expression::Int128Literal(_) => "Int128Literal",
        Expression::Float32Literal(_) => "Float32Literal",
        Expression::Float64Literal(_) => "Float64Literal",
        Expression::StringLiteral(_) => "StringLiteral",
        Expression::BoolLiteral(_) => "BoolLiteral",
        Expression::Variable { .. } => "Variable",
        Expression::Grouped(_) => "Grouped",
        Expression::TupleLiteral(_) => "TupleLiteral",
        Expression::TupleAccess { .. } => "TupleAccess",
        Expression::FieldAccess { .. } => "FieldAccess",
        Expression::Binary { op, .. } => match op {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
            BinaryOp::Mod => "Mod",
            BinaryOp::BitAnd => "BitAnd",
            BinaryOp::BitOr => "BitOr",
            BinaryOp::BitXor => "BitXor",
        },
        Expression::Block(_) => "BlockExpression",
        Expression::If { .. } => "IfExpression",
        Expression::Call { .. } => "FunctionCall",
        Expression::StructInit { .. } => "StructInit",
        Expression::Borrow { mutable: true, .. } => "MutBorrow",
        Expression::Borrow { mutable: false, .. } => "Borrow",
        Expression::Deref(_) => "Deref",
        Expression::Wrapping { op, .. } => match op {
            WrappingOp::Add => "WrappingAdd",
            WrappingOp::Sub => "WrappingSub",
            WrappingOp::Mul => "WrappingMul",
        },
        Expression::GuardedDiv { .. } => "GuardedDiv",
        Expression::GuardedMod { .. } => "GuardedMod",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ast::Type;

    fn int_binary(op: BinaryOp, lhs: i64, rhs: i64) -> Expression {
        Expression::Binary {
            op,
            ty: Type::I64,
            lhs: Box::new(Expression::Int64Literal(lhs)),
            rhs: Box::new(Expression::Int64Literal(rhs)),
        }
    }

    fn program_with_tail(tail: Expression) -> Program {
        Program {
            structs: vec![],
            functions: vec![],
            main: Block {
                statements: vec![],
                tail: Some(Box::new(tail)),
                ty: Some(Type::I64),
            },
        }
    }

    #[test]
    fn test_integer_division_becomes_guarded() {
        let (program, _) = recondition(program_with_tail(int_binary(BinaryOp::Div, 10, 2)));
        let tail = program.main.tail.clone().expect("tail survives");
        assert!(matches!(*tail, Expression::GuardedDiv { .. }));
        assert!(program
            .render()
            .contains("10i64.checked_div(2i64).unwrap_or(0i64)"));
    }

    #[test]
    fn test_integer_arithmetic_becomes_wrapping() {
        let nested = Expression::Binary {
            op: BinaryOp::Add,
            ty: Type::I64,
            lhs: Box::new(int_binary(BinaryOp::Mul, 3, 4)),
            rhs: Box::new(Expression::Int64Literal(5)),
        };
        let (program, stats) = recondition(program_with_tail(nested));
        let tail = program.main.tail.expect("tail survives");
        match *tail {
            Expression::Wrapping {
                op: WrappingOp::Add,
                ref lhs,
                ..
            } => assert!(matches!(
                **lhs,
                Expression::Wrapping {
                    op: WrappingOp::Mul,
                    ..
                }
            )),
            ref other => panic!("expected a wrapping add, got {}", other),
        }
        assert_eq!(stats.node_counts.get("Add"), Some(&1));
        assert_eq!(stats.node_counts.get("Mul"), Some(&1));
    }

    #[test]
    fn test_float_and_bitwise_operators_stay_raw() {
        let float_div = Expression::Binary {
            op: BinaryOp::Div,
            ty: Type::F64,
            lhs: Box::new(Expression::Float64Literal(1.5)),
            rhs: Box::new(Expression::Float64Literal(0.5)),
        };
        let xor = int_binary(BinaryOp::BitXor, 6, 3);
        let (program, _) = recondition(program_with_tail(Expression::Binary {
            op: BinaryOp::Add,
            ty: Type::F64,
            lhs: Box::new(float_div),
            rhs: Box::new(Expression::Float64Literal(0.25)),
        }));
        let tail = program.main.tail.expect("tail survives");
        assert!(matches!(
            *tail,
            Expression::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));

        let (program, _) = recondition(program_with_tail(xor));
        let tail = program.main.tail.expect("tail survives");
        assert!(matches!(
            *tail,
            Expression::Binary {
                op: BinaryOp::BitXor,
                ..
            }
        ));
    }

    #[test]
    fn test_statistics_track_nodes_and_variable_uses() {
        let program = Program {
            structs: vec![],
            functions: vec![],
            main: Block {
                statements: vec![
                    Statement::Declaration {
                        mutable: false,
                        name: "var0".to_string(),
                        ty: Type::I64,
                        value: Expression::Int64Literal(1),
                    },
                    Statement::Expression(Expression::Variable {
                        name: "var0".to_string(),
                        ty: Type::I64,
                    }),
                ],
                tail: Some(Box::new(Expression::Variable {
                    name: "var0".to_string(),
                    ty: Type::I64,
                })),
                ty: Some(Type::I64),
            },
        };
        let (_, stats) = recondition(program);
        assert_eq!(stats.node_counts.get("Declaration"), Some(&1));
        assert_eq!(stats.node_counts.get("Variable"), Some(&2));
        assert_eq!(stats.average_variable_use, 2.0);

        let json = serde_json::to_string(&stats).expect("statistics serialize");
        assert!(json.contains("average_variable_use"));
    }

    #[test]
    fn test_empty_program_average_is_zero() {
        let (_, stats) = recondition(program_with_tail(Expression::Int64Literal(0)));
        assert_eq!(stats.average_variable_use, 0.0);
    }
}
