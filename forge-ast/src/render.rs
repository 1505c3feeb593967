//! Rendering of programs to Rust source text.
//!
//! Lexical conventions: numeric literals carry an explicit width suffix,
//! string literals go through `String::from`, binary operators are always
//! parenthesized, and reconditioned operators render as their
//! `wrapping_*` / `checked_*` method forms.

use std::fmt;

use crate::{
    Block, BinaryOp, Expression, FunctionDefinition, Param, Program, Statement, StructDefinition,
    Type,
};

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::I128 => write!(f, "i128"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "String"),
            Type::Tuple(t) => {
                write!(f, "(")?;
                for (i, e) in t.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                if t.elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Type::Struct(s) => write!(f, "{}", s.name),
            Type::Function(fun) => {
                write!(f, "fn(")?;
                for (i, p) in fun.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", fun.ret)
            }
            Type::Reference(r) => {
                if r.mutable {
                    write!(f, "&mut {}", r.inner)
                } else {
                    write!(f, "&{}", r.inner)
                }
            }
        }
    }
}

/// Whether an expression must be parenthesized when used as the receiver of a
/// `.method()` or `.field` postfix: blocks and conditionals would not parse,
/// and a leading `-` on a literal binds looser than the postfix.
fn needs_parens_as_base(e: &Expression) -> bool {
    match e {
        Expression::Block(_) | Expression::If { .. } => true,
        Expression::Int8Literal(v) => *v < 0,
        Expression::Int16Literal(v) => *v < 0,
        Expression::Int32Literal(v) => *v < 0,
        Expression::Int64Literal(v) => *v < 0,
        Expression::Int128Literal(v) => *v < 0,
        Expression::Float32Literal(v) => *v < 0.0,
        Expression::Float64Literal(v) => *v < 0.0,
        _ => false,
    }
}

fn fmt_base(e: &Expression, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if needs_parens_as_base(e) {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Int8Literal(v) => write!(f, "{}i8", v),
            Expression::Int16Literal(v) => write!(f, "{}i16", v),
            Expression::Int32Literal(v) => write!(f, "{}i32", v),
            Expression::Int64Literal(v) => write!(f, "{}i64", v),
            Expression::Int128Literal(v) => write!(f, "{}i128", v),
            Expression::Float32Literal(v) => write!(f, "{}f32", v),
            Expression::Float64Literal(v) => write!(f, "{}f64", v),
            Expression::StringLiteral(s) => write!(f, "String::from({:?})", s),
            Expression::BoolLiteral(v) => write!(f, "{}", v),
            Expression::Variable { name, .. } => write!(f, "{}", name),
            Expression::Grouped(e) => write!(f, "({})", e),
            Expression::TupleLiteral(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expression::TupleAccess { base, index } => {
                fmt_base(base, f)?;
                write!(f, ".{}", index)
            }
            Expression::FieldAccess { base, field } => {
                fmt_base(base, f)?;
                write!(f, ".{}", field)
            }
            Expression::Binary { op, lhs, rhs, .. } => {
                write!(f, "({} {} {})", lhs, op, rhs)
            }
            Expression::Block(b) => write!(f, "{}", b),
            Expression::If {
                condition,
                then_block,
                else_block,
            } => {
                write!(f, "if ({}) {} else {}", condition, then_block, else_block)
            }
            Expression::Call { function, args, .. } => {
                write!(f, "{}(", function)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expression::StructInit { ty, fields } => {
                write!(f, "{} {{", ty.name)?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
            Expression::Borrow { mutable, target } => {
                if *mutable {
                    write!(f, "(&mut {})", target)
                } else {
                    write!(f, "(&{})", target)
                }
            }
            Expression::Deref(e) => write!(f, "(*{})", e),
            Expression::Wrapping { op, lhs, rhs, .. } => {
                fmt_base(lhs, f)?;
                write!(f, ".{}({})", op.method_name(), rhs)
            }
            Expression::GuardedDiv { ty, lhs, rhs } => {
                let zero = ty.zero_literal().unwrap_or(Expression::Int32Literal(0));
                fmt_base(lhs, f)?;
                write!(f, ".checked_div({}).unwrap_or({})", rhs, zero)
            }
            Expression::GuardedMod { ty, lhs, rhs } => {
                let zero = ty.zero_literal().unwrap_or(Expression::Int32Literal(0));
                fmt_base(lhs, f)?;
                write!(f, ".checked_rem({}).unwrap_or({})", rhs, zero)
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Declaration {
                mutable,
                name,
                ty,
                value,
            } => {
                if *mutable {
                    write!(f, "let mut {}: {} = {};", name, ty, value)
                } else {
                    write!(f, "let {}: {} = {};", name, ty, value)
                }
            }
            Statement::Assignment { target, value } => write!(f, "{} = {};", target, value),
            // A bare block or conditional at statement position must have
            // unit type; parenthesizing keeps it an expression statement.
            Statement::Expression(e) => {
                if matches!(e, Expression::Block(_) | Expression::If { .. }) {
                    write!(f, "({});", e)
                } else {
                    write!(f, "{};", e)
                }
            }
            Statement::Block(b) => write!(f, "{}", b),
            Statement::Loop { iterations, body } => {
                write!(f, "for _ in 0..{} {}", iterations, body)
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for s in &self.statements {
            writeln!(f, "{}", s)?;
        }
        if let Some(tail) = &self.tail {
            writeln!(f, "{}", tail)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {} {}", self.ret, self.body)
    }
}

impl fmt::Display for StructDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "struct {} {{", self.ty.name)?;
        for field in &self.ty.fields {
            writeln!(f, "    {}: {},", field.name, field.ty)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#![allow(warnings, unused)]")?;
        writeln!(f)?;
        for s in &self.structs {
            writeln!(f, "{}", s)?;
        }
        for fun in &self.functions {
            writeln!(f, "{}", fun)?;
        }
        writeln!(f, "fn main() {{")?;
        for s in &self.main.statements {
            writeln!(f, "{}", s)?;
        }
        if let Some(tail) = &self.main.tail {
            writeln!(f, "println!(\"{{}}\", {});", tail)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StructField, StructType, TupleType, WrappingOp};

    #[test]
    fn test_literal_suffixes() {
        assert_eq!(Expression::Int8Literal(7).to_string(), "7i8");
        assert_eq!(Expression::Int64Literal(-3).to_string(), "-3i64");
        assert_eq!(Expression::Float32Literal(0.5).to_string(), "0.5f32");
        assert_eq!(
            Expression::StringLiteral("ab1".to_string()).to_string(),
            "String::from(\"ab1\")"
        );
    }

    #[test]
    fn test_binary_is_parenthesized() {
        let e = Expression::Binary {
            op: BinaryOp::Add,
            ty: Type::I32,
            lhs: Box::new(Expression::Int32Literal(1)),
            rhs: Box::new(Expression::Int32Literal(2)),
        };
        assert_eq!(e.to_string(), "(1i32 + 2i32)");
    }

    #[test]
    fn test_negative_receiver_is_parenthesized() {
        let e = Expression::Wrapping {
            op: WrappingOp::Add,
            ty: Type::I32,
            lhs: Box::new(Expression::Int32Literal(-5)),
            rhs: Box::new(Expression::Int32Literal(2)),
        };
        assert_eq!(e.to_string(), "(-5i32).wrapping_add(2i32)");
    }

    #[test]
    fn test_guarded_division_render() {
        let e = Expression::GuardedDiv {
            ty: Type::I64,
            lhs: Box::new(Expression::Int64Literal(10)),
            rhs: Box::new(Expression::Int64Literal(2)),
        };
        assert_eq!(e.to_string(), "10i64.checked_div(2i64).unwrap_or(0i64)");
    }

    #[test]
    fn test_tuple_renders_native_syntax() {
        let single = Type::Tuple(TupleType {
            elements: vec![Type::I8],
        });
        assert_eq!(single.to_string(), "(i8,)");

        let access = Expression::TupleAccess {
            base: Box::new(Expression::Variable {
                name: "var0".to_string(),
                ty: Type::Tuple(TupleType {
                    elements: vec![Type::I8, Type::Bool],
                }),
            }),
            index: 1,
        };
        assert_eq!(access.to_string(), "var0.1");
    }

    #[test]
    fn test_struct_definition_render() {
        let def = StructDefinition {
            ty: StructType {
                name: "S0".to_string(),
                fields: vec![
                    StructField {
                        name: "var0".to_string(),
                        ty: Type::I32,
                    },
                    StructField {
                        name: "var1".to_string(),
                        ty: Type::Str,
                    },
                ],
            },
        };
        assert_eq!(
            def.to_string(),
            "struct S0 {\n    var0: i32,\n    var1: String,\n}"
        );
    }

    #[test]
    fn test_program_prints_tail_value() {
        let program = Program {
            structs: vec![],
            functions: vec![],
            main: Block {
                statements: vec![],
                tail: Some(Box::new(Expression::Int64Literal(4))),
                ty: Some(Type::I64),
            },
        };
        let text = program.render();
        assert!(text.starts_with("#![allow(warnings, unused)]"));
        assert!(text.contains("fn main() {"));
        assert!(text.contains("println!(\"{}\", 4i64);"));
    }
}
