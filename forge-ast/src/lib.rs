use serde::{Deserialize, Serialize};

pub mod render;

/// Ownership category of a type: COPY types stay usable after being read in a
/// moving position, MOVE types do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipCategory {
    Copy,
    Move,
}

/// Type system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Primitive types
    I8,
    I16,
    I32,
    I64,
    I128,
    F32,
    F64,
    Bool,
    /// Owned string (`String`)
    Str,

    /// Tuple: (T1, T2, ...)
    Tuple(TupleType),

    /// Named struct
    Struct(StructType),

    /// Function signature: fn(T1, T2) -> R
    Function(FunctionType),

    /// Reference: &T or &mut T
    Reference(ReferenceType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleType {
    pub elements: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

/// Struct field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceType {
    pub inner: Box<Type>,
    pub mutable: bool,
}

impl StructType {
    /// Index of a named field, if present.
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }
}

impl Type {
    pub fn ownership(&self) -> OwnershipCategory {
        match self {
            Type::I8
            | Type::I16
            | Type::I32
            | Type::I64
            | Type::I128
            | Type::F32
            | Type::F64
            | Type::Bool => OwnershipCategory::Copy,
            Type::Str => OwnershipCategory::Move,
            // A tuple is Copy exactly when every element is; generated structs
            // carry no derives, so struct values always move.
            Type::Tuple(t) => {
                if t.elements
                    .iter()
                    .all(|e| e.ownership() == OwnershipCategory::Copy)
                {
                    OwnershipCategory::Copy
                } else {
                    OwnershipCategory::Move
                }
            }
            Type::Struct(_) => OwnershipCategory::Move,
            // Function items are zero-sized and Copy.
            Type::Function(_) => OwnershipCategory::Copy,
            Type::Reference(r) => {
                if r.mutable {
                    OwnershipCategory::Move
                } else {
                    OwnershipCategory::Copy
                }
            }
        }
    }

    /// The type together with its transitive member decomposition.
    pub fn member_types(&self) -> Vec<Type> {
        let mut members = vec![self.clone()];
        match self {
            Type::Tuple(t) => {
                for e in &t.elements {
                    members.extend(e.member_types());
                }
            }
            Type::Struct(s) => {
                for f in &s.fields {
                    members.extend(f.ty.member_types());
                }
            }
            Type::Function(fun) => {
                for p in &fun.params {
                    members.extend(p.member_types());
                }
                members.extend(fun.ret.member_types());
            }
            Type::Reference(r) => members.extend(r.inner.member_types()),
            _ => {}
        }
        members
    }

    pub fn contains_reference(&self) -> bool {
        self.member_types()
            .iter()
            .any(|t| matches!(t, Type::Reference(_)))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Type::Tuple(_) | Type::Struct(_))
    }

    /// Types of the container's elements, in declaration order.
    pub fn element_types(&self) -> Vec<Type> {
        match self {
            Type::Tuple(t) => t.elements.clone(),
            Type::Struct(s) => s.fields.iter().map(|f| f.ty.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::I128
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Types accepted by `&`, `|` and `^`: the integers plus bool.
    pub fn is_bitwise_compatible(&self) -> bool {
        self.is_integer() || matches!(self, Type::Bool)
    }

    /// Additive identity literal for numeric types.
    pub fn zero_literal(&self) -> Option<Expression> {
        match self {
            Type::I8 => Some(Expression::Int8Literal(0)),
            Type::I16 => Some(Expression::Int16Literal(0)),
            Type::I32 => Some(Expression::Int32Literal(0)),
            Type::I64 => Some(Expression::Int64Literal(0)),
            Type::I128 => Some(Expression::Int128Literal(0)),
            Type::F32 => Some(Expression::Float32Literal(0.0)),
            Type::F64 => Some(Expression::Float64Literal(0.0)),
            _ => None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
}

/// The operators with wrapping equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrappingOp {
    Add,
    Sub,
    Mul,
}

impl WrappingOp {
    pub fn method_name(self) -> &'static str {
        match self {
            WrappingOp::Add => "wrapping_add",
            WrappingOp::Sub => "wrapping_sub",
            WrappingOp::Mul => "wrapping_mul",
        }
    }
}

/// Block of statements with an optional tail expression supplying the block's
/// result. `ty` is `None` for void blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub tail: Option<Box<Expression>>,
    pub ty: Option<Type>,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Variable declaration: let x: T = expr; or let mut x: T = expr;
    Declaration {
        mutable: bool,
        name: String,
        ty: Type,
        value: Expression,
    },

    /// Assignment into an lvalue path: x = expr; x.0 = expr; (*r) = expr;
    Assignment { target: Expression, value: Expression },

    /// Expression statement
    Expression(Expression),

    /// Nested block statement
    Block(Block),

    /// Bounded counted loop: for _ in 0..n { body }
    Loop { iterations: u64, body: Block },
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literals
    Int8Literal(i8),
    Int16Literal(i16),
    Int32Literal(i32),
    Int64Literal(i64),
    Int128Literal(i128),
    Float32Literal(f32),
    Float64Literal(f64),
    StringLiteral(String),
    BoolLiteral(bool),

    /// Variable reference, carrying its resolved type
    Variable { name: String, ty: Type },

    /// Parenthesized expression
    Grouped(Box<Expression>),

    /// Tuple literal: (a, b, c)
    TupleLiteral(Vec<Expression>),

    /// Tuple element access: base.0
    TupleAccess { base: Box<Expression>, index: usize },

    /// Struct field access: base.field
    FieldAccess { base: Box<Expression>, field: String },

    /// Binary operation, tagged with the operand type
    Binary {
        op: BinaryOp,
        ty: Type,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    /// Block expression
    Block(Block),

    /// if/else conditional; both blocks share the result type
    If {
        condition: Box<Expression>,
        then_block: Block,
        else_block: Block,
    },

    /// Function call, carrying the resolved return type
    Call {
        function: String,
        ret: Type,
        args: Vec<Expression>,
    },

    /// Struct instantiation: Name { field: expr, ... }
    StructInit {
        ty: StructType,
        fields: Vec<(String, Expression)>,
    },

    /// Borrow: &target or &mut target
    Borrow {
        mutable: bool,
        target: Box<Expression>,
    },

    /// Dereference: *expr
    Deref(Box<Expression>),

    /// Reconditioned arithmetic: lhs.wrapping_add(rhs) etc.
    Wrapping {
        op: WrappingOp,
        ty: Type,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    /// Reconditioned division: lhs.checked_div(rhs).unwrap_or(zero)
    GuardedDiv {
        ty: Type,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    /// Reconditioned modulo: lhs.checked_rem(rhs).unwrap_or(zero)
    GuardedMod {
        ty: Type,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    /// Resolve the expression's type structurally. Only meaningful on
    /// well-formed trees; an unresolvable access is a builder defect.
    pub fn ty(&self) -> Type {
        match self {
            Expression::Int8Literal(_) => Type::I8,
            Expression::Int16Literal(_) => Type::I16,
            Expression::Int32Literal(_) => Type::I32,
            Expression::Int64Literal(_) => Type::I64,
            Expression::Int128Literal(_) => Type::I128,
            Expression::Float32Literal(_) => Type::F32,
            Expression::Float64Literal(_) => Type::F64,
            Expression::StringLiteral(_) => Type::Str,
            Expression::BoolLiteral(_) => Type::Bool,
            Expression::Variable { ty, .. } => ty.clone(),
            Expression::Grouped(e) => e.ty(),
            Expression::TupleLiteral(elements) => Type::Tuple(TupleType {
                elements: elements.iter().map(Expression::ty).collect(),
            }),
            Expression::TupleAccess { base, index } => match base.ty() {
                Type::Tuple(t) => match t.elements.get(*index) {
                    Some(e) => e.clone(),
                    None => unreachable!("tuple access index out of bounds"),
                },
                _ => unreachable!("tuple access on non-tuple expression"),
            },
            Expression::FieldAccess { base, field } => match base.ty() {
                Type::Struct(s) => match s.fields.iter().find(|f| &f.name == field) {
                    Some(f) => f.ty.clone(),
                    None => unreachable!("field access on unknown field"),
                },
                _ => unreachable!("field access on non-struct expression"),
            },
            Expression::Binary { ty, .. } => ty.clone(),
            Expression::Block(b) => match &b.ty {
                Some(ty) => ty.clone(),
                None => unreachable!("void block in expression position"),
            },
            Expression::If { then_block, .. } => match &then_block.ty {
                Some(ty) => ty.clone(),
                None => unreachable!("void block in conditional expression"),
            },
            Expression::Call { ret, .. } => ret.clone(),
            Expression::StructInit { ty, .. } => Type::Struct(ty.clone()),
            Expression::Borrow { mutable, target } => Type::Reference(ReferenceType {
                inner: Box::new(target.ty()),
                mutable: *mutable,
            }),
            Expression::Deref(e) => match e.ty() {
                Type::Reference(r) => *r.inner,
                _ => unreachable!("dereference of non-reference expression"),
            },
            Expression::Wrapping { ty, .. } => ty.clone(),
            Expression::GuardedDiv { ty, .. } => ty.clone(),
            Expression::GuardedMod { ty, .. } => ty.clone(),
        }
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
}

impl FunctionDefinition {
    pub fn signature(&self) -> FunctionType {
        FunctionType {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

/// Struct definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDefinition {
    pub ty: StructType,
}

/// Root of the generated program: global definitions plus the entry point.
/// The entry block's `i64` tail value is printed by `main`, so every program
/// has observable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub structs: Vec<StructDefinition>,
    pub functions: Vec<FunctionDefinition>,
    pub main: Block,
}

impl Program {
    /// Serialize the program to Rust source text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: Type, b: Type) -> Type {
        Type::Tuple(TupleType {
            elements: vec![a, b],
        })
    }

    #[test]
    fn test_ownership_categories() {
        assert_eq!(Type::I32.ownership(), OwnershipCategory::Copy);
        assert_eq!(Type::Str.ownership(), OwnershipCategory::Move);
        assert_eq!(
            pair(Type::I8, Type::Bool).ownership(),
            OwnershipCategory::Copy
        );
        assert_eq!(
            pair(Type::I8, Type::Str).ownership(),
            OwnershipCategory::Move
        );
        let s = Type::Struct(StructType {
            name: "S0".to_string(),
            fields: vec![StructField {
                name: "var0".to_string(),
                ty: Type::I32,
            }],
        });
        assert_eq!(s.ownership(), OwnershipCategory::Move);

        let shared = Type::Reference(ReferenceType {
            inner: Box::new(Type::Str),
            mutable: false,
        });
        let exclusive = Type::Reference(ReferenceType {
            inner: Box::new(Type::Str),
            mutable: true,
        });
        assert_eq!(shared.ownership(), OwnershipCategory::Copy);
        assert_eq!(exclusive.ownership(), OwnershipCategory::Move);
    }

    #[test]
    fn test_member_decomposition() {
        let nested = pair(Type::I32, pair(Type::Str, Type::Bool));
        let members = nested.member_types();
        assert!(members.contains(&Type::I32));
        assert!(members.contains(&Type::Str));
        assert!(members.contains(&Type::Bool));
        assert!(!nested.contains_reference());

        let with_ref = Type::Reference(ReferenceType {
            inner: Box::new(Type::I64),
            mutable: false,
        });
        assert!(pair(Type::I8, with_ref).contains_reference());
    }

    #[test]
    fn test_zero_literal() {
        assert_eq!(Type::I64.zero_literal(), Some(Expression::Int64Literal(0)));
        assert_eq!(
            Type::F32.zero_literal(),
            Some(Expression::Float32Literal(0.0))
        );
        assert_eq!(Type::Bool.zero_literal(), None);
    }

    #[test]
    fn test_expression_type_resolution() {
        let tuple = Expression::TupleLiteral(vec![
            Expression::Int32Literal(1),
            Expression::StringLiteral("x".to_string()),
        ]);
        assert_eq!(tuple.ty(), pair(Type::I32, Type::Str));

        let access = Expression::TupleAccess {
            base: Box::new(tuple),
            index: 1,
        };
        assert_eq!(access.ty(), Type::Str);

        let borrow = Expression::Borrow {
            mutable: false,
            target: Box::new(Expression::Variable {
                name: "var0".to_string(),
                ty: Type::I8,
            }),
        };
        let deref = Expression::Deref(Box::new(borrow));
        assert_eq!(deref.ty(), Type::I8);
    }

    #[test]
    fn test_serialization() {
        let program = Program {
            structs: vec![],
            functions: vec![],
            main: Block {
                statements: vec![Statement::Expression(Expression::Int32Literal(5))],
                tail: Some(Box::new(Expression::Int64Literal(1))),
                ty: Some(Type::I64),
            },
        };

        let json = serde_json::to_string(&program).unwrap();
        let deserialized: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(program, deserialized);
    }
}
