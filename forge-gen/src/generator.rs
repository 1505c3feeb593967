//! Recursive-descent program synthesizer: builds statements, expressions and
//! global definitions for a required type, consulting the selection policy at
//! every branch point and the ownership tracker before every variable use.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use forge_ast::{
    BinaryOp, Block, Expression, FunctionDefinition, FunctionType, OwnershipCategory, Param,
    Program, ReferenceType, Statement, StructField, StructType, TupleType, Type,
};

use crate::context::{Context, NodeCategory, NodeKind, TypeKind};
use crate::error::{GenError, GenResult};
use crate::policy::{pick_flag, pick_weighted, SelectionPolicy};
use crate::session::Session;
use crate::symbol_table::{
    AssignTarget, FunctionTable, GlobalTable, IdentifierData, OwnershipState, ScopeStack,
};

const STATEMENT_KINDS: &[NodeKind] = &[
    NodeKind::Declaration,
    NodeKind::Assignment,
    NodeKind::ExpressionStatement,
    NodeKind::BlockStatement,
    NodeKind::LoopStatement,
];

/// Where a picked type will be used. Reference types only make sense where a
/// borrow can be rendered without lifetime parameters, i.e. local bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypePosition {
    Binding,
    Member,
}

/// The static compatibility table from a required type to the expression
/// productions able to produce it.
pub fn compatible_expression_kinds(ty: &Type) -> Vec<NodeKind> {
    let mut kinds = vec![
        NodeKind::Variable,
        NodeKind::Grouped,
        NodeKind::BlockExpression,
        NodeKind::IfExpression,
    ];
    match ty {
        Type::I8 => kinds.push(NodeKind::Int8Literal),
        Type::I16 => kinds.push(NodeKind::Int16Literal),
        Type::I32 => kinds.push(NodeKind::Int32Literal),
        Type::I64 => kinds.push(NodeKind::Int64Literal),
        Type::I128 => kinds.push(NodeKind::Int128Literal),
        Type::F32 => kinds.push(NodeKind::Float32Literal),
        Type::F64 => kinds.push(NodeKind::Float64Literal),
        Type::Bool => kinds.push(NodeKind::BoolLiteral),
        Type::Str => kinds.push(NodeKind::StringLiteral),
        Type::Tuple(_) => kinds.push(NodeKind::TupleLiteral),
        Type::Struct(_) => kinds.push(NodeKind::StructInit),
        Type::Reference(r) => kinds.push(if r.mutable {
            NodeKind::MutBorrow
        } else {
            NodeKind::Borrow
        }),
        Type::Function(_) => {}
    }
    if ty.is_numeric() {
        kinds.extend([NodeKind::Add, NodeKind::Sub, NodeKind::Mul, NodeKind::Div]);
    }
    if ty.is_integer() {
        kinds.push(NodeKind::Mod);
    }
    if ty.is_bitwise_compatible() {
        kinds.extend([NodeKind::BitAnd, NodeKind::BitOr, NodeKind::BitXor]);
    }
    if !ty.contains_reference() {
        kinds.extend([
            NodeKind::FunctionCall,
            NodeKind::TupleAccess,
            NodeKind::FieldAccess,
        ]);
    }
    // Dereferencing moves the value out of the reference, so only COPY
    // results are legal through it.
    if ty.ownership() == OwnershipCategory::Copy
        && !matches!(ty, Type::Reference(_) | Type::Function(_))
    {
        kinds.push(NodeKind::Deref);
    }
    kinds
}

/// Root variable and element-index path of an lvalue chain, if the chain
/// bottoms out at a variable.
fn lvalue_root(expr: &Expression) -> Option<(String, Vec<usize>)> {
    match expr {
        Expression::Variable { name, .. } => Some((name.clone(), Vec::new())),
        Expression::TupleAccess { base, index } => {
            let (name, mut path) = lvalue_root(base)?;
            path.push(*index);
            Some((name, path))
        }
        Expression::FieldAccess { base, field } => {
            let (name, mut path) = lvalue_root(base)?;
            let index = match base.ty() {
                Type::Struct(s) => s.field_index(field)?,
                _ => return None,
            };
            path.push(index);
            Some((name, path))
        }
        _ => None,
    }
}

fn random_string(rng: &mut StdRng) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let len = rng.gen_range(1..32);
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

struct Generator<'a> {
    session: &'a mut Session,
    policy: &'a dyn SelectionPolicy,
    scopes: ScopeStack,
    functions: FunctionTable,
    globals: GlobalTable,
    dependent: Vec<Statement>,
}

impl<'a> Generator<'a> {
    fn new(session: &'a mut Session, policy: &'a dyn SelectionPolicy) -> Self {
        Generator {
            session,
            policy,
            scopes: ScopeStack::new(),
            functions: FunctionTable::new(),
            globals: GlobalTable::new(),
            dependent: Vec::new(),
        }
    }

    /// Generate a statement block in the current scope. Hoisted dependant
    /// declarations splice in immediately before the statement (or tail
    /// expression) that needed them.
    fn block(&mut self, ctx: &Context, ty: Option<&Type>) -> GenResult<Block> {
        let saved = std::mem::take(&mut self.dependent);
        let mut ctx = ctx.enter_scope();
        let mut statements = Vec::new();
        loop {
            let (go_on, stop) = self.policy.continue_weights(&ctx);
            if !pick_flag(&mut self.session.rng, go_on, stop) {
                break;
            }
            let statement = self.statement(&ctx)?;
            statements.append(&mut self.dependent);
            statements.push(statement);
            ctx = ctx.increment_statement_count();
        }
        let (tail, block_ty) = match ty {
            Some(t) => {
                let value = self.expression(t, &ctx)?;
                statements.append(&mut self.dependent);
                (Some(Box::new(value)), Some(t.clone()))
            }
            None => (None, None),
        };
        self.dependent = saved;
        Ok(Block {
            statements,
            tail,
            ty: block_ty,
        })
    }

    /* Statement generation */

    fn statement(&mut self, ctx: &Context) -> GenResult<Statement> {
        let weights = self.policy.statement_weights(ctx, STATEMENT_KINDS);
        match pick_weighted(&mut self.session.rng, &weights, "statement")? {
            NodeKind::Declaration => self.declaration(ctx),
            NodeKind::Assignment => self.assignment(ctx),
            NodeKind::ExpressionStatement => self.expression_statement(ctx),
            NodeKind::BlockStatement => self.block_statement(ctx),
            NodeKind::LoopStatement => self.loop_statement(ctx),
            other => Err(GenError::invariant(format!(
                "{} is not a statement production",
                other.name()
            ))),
        }
    }

    fn declaration(&mut self, ctx: &Context) -> GenResult<Statement> {
        let ty = self.pick_type(ctx, TypePosition::Binding)?;
        let mutable = self.session.rng.gen_bool(0.5);
        let (_, declaration) = self.hoisted_declaration(&ty, mutable, ctx)?;
        Ok(declaration)
    }

    /// Declare a fresh binding of `ty`, returning its name and the statement.
    /// Used directly by the declaration production and as the hoisting path
    /// whenever an expression generator finds no usable candidate.
    fn hoisted_declaration(
        &mut self,
        ty: &Type,
        mutable: bool,
        ctx: &Context,
    ) -> GenResult<(String, Statement)> {
        let name = self.session.idents.next_variable();
        let mut value_ctx = ctx.increment(NodeKind::Declaration);
        if ty.contains_reference() {
            value_ctx = value_ctx.bound_lifetime(self.scopes.current_depth());
        }
        let value = self.expression(ty, &value_ctx)?;
        self.scopes.declare(
            &name,
            IdentifierData::new(ty.clone(), mutable, self.scopes.current_depth()),
        )?;
        let declaration = Statement::Declaration {
            mutable,
            name: name.clone(),
            ty: ty.clone(),
            value,
        };
        Ok((name, declaration))
    }

    fn assignment(&mut self, ctx: &Context) -> GenResult<Statement> {
        let ctx = ctx.increment(NodeKind::Assignment);
        let target = match self
            .scopes
            .random_mutable_variable(&ctx, &mut self.session.rng)
        {
            Some(target) => target,
            None => {
                // No assignable location exists yet: hoist a mutable
                // declaration and assign into that.
                let ty = self.pick_type(&ctx, TypePosition::Binding)?;
                let (name, declaration) = self.hoisted_declaration(&ty, true, &ctx)?;
                self.dependent.push(declaration);
                AssignTarget {
                    expr: Expression::Variable {
                        name: name.clone(),
                        ty: ty.clone(),
                    },
                    ty,
                    root: name,
                }
            }
        };
        let mut value_ctx = ctx.with_assignment_roots(vec![target.root.clone()]);
        if target.ty.contains_reference() {
            // The assigned reference lives as long as the target binding, so
            // its sources must come from the target's scope or above.
            if let Some(data) = self.scopes.lookup(&target.root) {
                value_ctx = value_ctx.bound_lifetime(data.depth);
            }
        }
        let value = self.expression(&target.ty, &value_ctx)?;
        if matches!(target.expr, Expression::Variable { .. }) {
            self.scopes
                .set_state(&target.root, OwnershipState::Valid, None);
        }
        Ok(Statement::Assignment {
            target: target.expr,
            value,
        })
    }

    fn expression_statement(&mut self, ctx: &Context) -> GenResult<Statement> {
        let ty = self.pick_type(ctx, TypePosition::Binding)?;
        let value = self.expression(&ty, &ctx.increment(NodeKind::ExpressionStatement))?;
        Ok(Statement::Expression(value))
    }

    fn block_statement(&mut self, ctx: &Context) -> GenResult<Statement> {
        let ctx = ctx.increment(NodeKind::BlockStatement);
        self.scopes.push_scope();
        let body = self.block(&ctx, None);
        self.scopes.pop_scope();
        Ok(Statement::Block(body?))
    }

    /// Loop bodies may run zero or many times, so they are generated against
    /// a snapshot and merged back conservatively afterwards.
    fn loop_statement(&mut self, ctx: &Context) -> GenResult<Statement> {
        let ctx = ctx.increment(NodeKind::LoopStatement);
        let iterations = self.session.rng.gen_range(1..=8);
        let before = self.scopes.snapshot();
        self.scopes.push_scope();
        let body = self.block(&ctx, None);
        let after = std::mem::replace(&mut self.scopes, before);
        let body = body?;
        self.scopes.merge_snapshot(&after);
        Ok(Statement::Loop { iterations, body })
    }

    /* Expression generation */

    fn expression(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let kinds = compatible_expression_kinds(ty);
        let weights = self.policy.expression_weights(ctx, ty, &kinds);
        let kind = pick_weighted(
            &mut self.session.rng,
            &weights,
            &format!("expression of type {}", ty),
        )?;
        match kind {
            NodeKind::Int8Literal => Ok(Expression::Int8Literal(
                self.session.rng.gen_range(0..=i8::MAX),
            )),
            NodeKind::Int16Literal => Ok(Expression::Int16Literal(
                self.session.rng.gen_range(0..=i16::MAX),
            )),
            NodeKind::Int32Literal => Ok(Expression::Int32Literal(self.session.rng.gen())),
            NodeKind::Int64Literal => Ok(Expression::Int64Literal(self.session.rng.gen())),
            NodeKind::Int128Literal => Ok(Expression::Int128Literal(
                self.session.rng.gen::<i128>() & i128::MAX,
            )),
            NodeKind::Float32Literal => Ok(Expression::Float32Literal(self.session.rng.gen())),
            NodeKind::Float64Literal => Ok(Expression::Float64Literal(self.session.rng.gen())),
            NodeKind::StringLiteral => Ok(Expression::StringLiteral(random_string(
                &mut self.session.rng,
            ))),
            NodeKind::BoolLiteral => Ok(Expression::BoolLiteral(self.session.rng.gen_bool(0.5))),
            NodeKind::Variable => self.variable(ty, ctx),
            NodeKind::Grouped => Ok(Expression::Grouped(Box::new(
                self.expression(ty, &ctx.increment(NodeKind::Grouped))?,
            ))),
            NodeKind::TupleLiteral => self.tuple_literal(ty, ctx),
            NodeKind::TupleAccess => self.tuple_access(ty, ctx),
            NodeKind::FieldAccess => self.field_access(ty, ctx),
            NodeKind::Add => self.binary(BinaryOp::Add, NodeKind::Add, ty, ctx),
            NodeKind::Sub => self.binary(BinaryOp::Sub, NodeKind::Sub, ty, ctx),
            NodeKind::Mul => self.binary(BinaryOp::Mul, NodeKind::Mul, ty, ctx),
            NodeKind::Div => self.binary(BinaryOp::Div, NodeKind::Div, ty, ctx),
            NodeKind::Mod => self.binary(BinaryOp::Mod, NodeKind::Mod, ty, ctx),
            NodeKind::BitAnd => self.binary(BinaryOp::BitAnd, NodeKind::BitAnd, ty, ctx),
            NodeKind::BitOr => self.binary(BinaryOp::BitOr, NodeKind::BitOr, ty, ctx),
            NodeKind::BitXor => self.binary(BinaryOp::BitXor, NodeKind::BitXor, ty, ctx),
            NodeKind::BlockExpression => self.block_expression(ty, ctx),
            NodeKind::IfExpression => self.if_expression(ty, ctx),
            NodeKind::FunctionCall => self.call(ty, ctx),
            NodeKind::StructInit => self.struct_init(ty, ctx),
            NodeKind::Borrow | NodeKind::MutBorrow => self.borrow(ty, ctx),
            NodeKind::Deref => self.deref(ty, ctx),
            other => Err(GenError::invariant(format!(
                "{} is not an expression production",
                other.name()
            ))),
        }
    }

    fn variable(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let found = self.scopes.random_variable_of_type(
            ty,
            ctx.required_type(),
            ctx,
            false,
            &mut self.session.rng,
        );
        let name = match found {
            Some((name, _)) => name,
            None => {
                // No candidate: hoist a dependant declaration and read that.
                let mutable = self.session.rng.gen_bool(0.5);
                let (name, declaration) =
                    self.hoisted_declaration(ty, mutable, &ctx.increment(NodeKind::Variable))?;
                self.dependent.push(declaration);
                name
            }
        };
        // A read in moving position consumes the source. Access-chain bases
        // are handled element-wise by the access generators instead.
        let in_access_chain = matches!(
            ctx.previous_increment(),
            Some(NodeKind::TupleAccess | NodeKind::FieldAccess)
        );
        if !in_access_chain && ty.ownership() == OwnershipCategory::Move {
            self.scopes.mark_moved(&name);
        }
        Ok(Expression::Variable {
            name,
            ty: ty.clone(),
        })
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        kind: NodeKind,
        ty: &Type,
        ctx: &Context,
    ) -> GenResult<Expression> {
        let lhs = self.expression(ty, &ctx.increment(kind))?;
        let rhs = self.expression(ty, &ctx.increment(kind))?;
        Ok(Expression::Binary {
            op,
            ty: ty.clone(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn tuple_literal(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let tuple = match ty {
            Type::Tuple(t) => t.clone(),
            _ => {
                return Err(GenError::invariant(
                    "tuple literal generator invoked for a non-tuple type",
                ))
            }
        };
        let mut values = Vec::new();
        for element in &tuple.elements {
            values.push(self.expression(element, &ctx.increment(NodeKind::TupleLiteral))?);
        }
        Ok(Expression::TupleLiteral(values))
    }

    fn tuple_access(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let in_chain = matches!(
            ctx.previous_increment(),
            Some(NodeKind::TupleAccess | NodeKind::FieldAccess)
        );
        let tuple = match self.globals.tuple_containing(ty, &mut self.session.rng) {
            Some(t) => t,
            None => self.tuple_type_containing(ty, ctx)?,
        };
        let ctx = ctx
            .with_required_type(Some(ty.clone()))
            .increment(NodeKind::TupleAccess);
        let base = self.expression(&Type::Tuple(tuple.clone()), &ctx)?;
        let index = self.usable_element_index(&base, &tuple.elements, ty, &ctx)?;
        if !in_chain {
            self.note_element_move(&base, index, ty);
        }
        Ok(Expression::TupleAccess {
            base: Box::new(base),
            index,
        })
    }

    fn field_access(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let in_chain = matches!(
            ctx.previous_increment(),
            Some(NodeKind::TupleAccess | NodeKind::FieldAccess)
        );
        let strukt = match self.globals.struct_containing(ty, &mut self.session.rng) {
            Some(s) => s,
            None => self.define_struct_type(Some(ty), ctx)?,
        };
        let ctx = ctx
            .with_required_type(Some(ty.clone()))
            .increment(NodeKind::FieldAccess);
        let base = self.expression(&Type::Struct(strukt.clone()), &ctx)?;
        let element_types: Vec<Type> = strukt.fields.iter().map(|f| f.ty.clone()).collect();
        let index = self.usable_element_index(&base, &element_types, ty, &ctx)?;
        let field = match strukt.fields.get(index) {
            Some(f) => f.name.clone(),
            None => return Err(GenError::invariant("field index out of range")),
        };
        if !in_chain {
            self.note_element_move(&base, index, ty);
        }
        Ok(Expression::FieldAccess {
            base: Box::new(base),
            field,
        })
    }

    /// Pick which element of the container to access. When the base is a
    /// tracked variable the element must still be VALID (or PARTIALLY_VALID
    /// one level further down an access chain).
    fn usable_element_index(
        &mut self,
        base: &Expression,
        elements: &[Type],
        required: &Type,
        ctx: &Context,
    ) -> GenResult<usize> {
        let mut positions: Vec<usize> = elements
            .iter()
            .enumerate()
            .filter(|(_, t)| *t == required)
            .map(|(i, _)| i)
            .collect();
        // When the base bottoms out at a tracked binding, consult the
        // ownership tree along the whole access path: the chosen element must
        // still be VALID, or PARTIALLY_VALID when a deeper chain will narrow
        // it further.
        if let Some((root, path)) = lvalue_root(base) {
            if let Some(data) = self.scopes.lookup(&root) {
                let mut node = Some(&data.ownership);
                for step in &path {
                    node = node.and_then(|n| n.elements.get(*step));
                }
                if let Some(node) = node {
                    let chain_depth = ctx.category_depth(NodeCategory::PartialMoveAccess);
                    let valid: Vec<usize> = positions
                        .iter()
                        .copied()
                        .filter(|i| node.element_state(*i) == Some(OwnershipState::Valid))
                        .collect();
                    let fallback: Vec<usize> = if chain_depth > 1 {
                        positions
                            .iter()
                            .copied()
                            .filter(|i| {
                                node.element_state(*i) == Some(OwnershipState::PartiallyValid)
                            })
                            .collect()
                    } else {
                        Vec::new()
                    };
                    positions = if valid.is_empty() { fallback } else { valid };
                }
            }
        }
        positions
            .choose(&mut self.session.rng)
            .copied()
            .ok_or_else(|| GenError::dead_end(format!("usable element of type {}", required)))
    }

    /// Consuming a MOVE-category element moves it out of its container.
    fn note_element_move(&mut self, base: &Expression, index: usize, element_ty: &Type) {
        if element_ty.ownership() != OwnershipCategory::Move {
            return;
        }
        if let Some((root, mut path)) = lvalue_root(base) {
            path.push(index);
            self.scopes.mark_element_moved(&root, &path);
        }
    }

    fn block_expression(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let body = self.scoped_block(ty, &ctx.increment(NodeKind::BlockExpression))?;
        Ok(Expression::Block(body))
    }

    fn if_expression(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let condition = self.expression(&Type::Bool, &ctx.increment(NodeKind::IfExpression))?;
        let then_block = self.scoped_block(ty, &ctx.increment(NodeKind::IfExpression))?;
        let else_block = self.scoped_block(ty, &ctx.increment(NodeKind::IfExpression))?;
        Ok(Expression::If {
            condition: Box::new(condition),
            then_block,
            else_block,
        })
    }

    /// A nested block producing `ty`. When the result carries a reference,
    /// its sources must outlive this block, so the lifetime bound tightens to
    /// the current scope before entering.
    fn scoped_block(&mut self, ty: &Type, ctx: &Context) -> GenResult<Block> {
        let mut ctx = ctx.clone();
        if ty.contains_reference() {
            ctx = ctx.bound_lifetime(self.scopes.current_depth());
        }
        self.scopes.push_scope();
        let body = self.block(&ctx, Some(ty));
        self.scopes.pop_scope();
        body
    }

    fn call(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let existing = self
            .functions
            .random_function_returning(ty, &mut self.session.rng);
        let (new_weight, reuse_weight) = self.policy.new_function_weights(ctx);
        let (name, signature) = match existing {
            Some(found)
                if !pick_flag(&mut self.session.rng, new_weight, reuse_weight) =>
            {
                found
            }
            _ => self.define_function(ty, ctx)?,
        };
        let mut args = Vec::new();
        for param_ty in &signature.params {
            args.push(self.expression(param_ty, &ctx.increment(NodeKind::FunctionCall))?);
        }
        Ok(Expression::Call {
            function: name,
            ret: ty.clone(),
            args,
        })
    }

    /// Synthesize a fresh global function returning `ret`: new parameter
    /// types, parameters bound VALID in an isolated scope stack, body
    /// generated recursively under the carried depth state.
    fn define_function(&mut self, ret: &Type, ctx: &Context) -> GenResult<(String, FunctionType)> {
        let param_count = self.session.rng.gen_range(0..4);
        let mut params = Vec::new();
        for _ in 0..param_count {
            let ty = self.pick_type(
                &ctx.increment(NodeKind::FunctionSignature),
                TypePosition::Member,
            )?;
            params.push(Param {
                name: self.session.idents.next_variable(),
                ty,
            });
        }
        let name = self.session.idents.next_function();
        debug!("defining {} with {} parameters", name, params.len());
        let mut body_scopes = ScopeStack::new();
        for param in &params {
            body_scopes.declare(
                &param.name,
                IdentifierData::new(param.ty.clone(), false, 0),
            )?;
        }
        let outer = std::mem::replace(&mut self.scopes, body_scopes);
        let body = self.block(&ctx.increment(NodeKind::FunctionCall).isolated(), Some(ret));
        self.scopes = outer;
        let definition = FunctionDefinition {
            name: name.clone(),
            params,
            ret: ret.clone(),
            body: body?,
        };
        let signature = definition.signature();
        self.functions.register(definition);
        Ok((name, signature))
    }

    fn struct_init(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let strukt = match ty {
            Type::Struct(s) => s.clone(),
            _ => {
                return Err(GenError::invariant(
                    "struct instantiation generator invoked for a non-struct type",
                ))
            }
        };
        let mut fields = Vec::new();
        for field in &strukt.fields {
            fields.push((
                field.name.clone(),
                self.expression(&field.ty, &ctx.increment(NodeKind::StructInit))?,
            ));
        }
        Ok(Expression::StructInit { ty: strukt, fields })
    }

    /// Borrow an existing (or hoisted) binding of the referenced type. The
    /// borrow is recorded at the scope the reference value escapes to (the
    /// active lifetime bound), or the innermost scope when it stays local, so
    /// it ends exactly when that scope is discarded.
    fn borrow(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let reference = match ty {
            Type::Reference(r) => r.clone(),
            _ => {
                return Err(GenError::invariant(
                    "borrow generator invoked for a non-reference type",
                ))
            }
        };
        let kind = if reference.mutable {
            NodeKind::MutBorrow
        } else {
            NodeKind::Borrow
        };
        let ctx = ctx.increment(kind);
        let name = match self.scopes.random_variable_of_type(
            &reference.inner,
            None,
            &ctx,
            reference.mutable,
            &mut self.session.rng,
        ) {
            Some((name, _)) => name,
            None => {
                if let Some(bound) = ctx.lifetime_bound() {
                    if self.scopes.current_depth() > bound {
                        return Err(GenError::dead_end(format!(
                            "borrow source declared at depth {} or above",
                            bound
                        )));
                    }
                }
                let mutable = reference.mutable || self.session.rng.gen_bool(0.5);
                let (name, declaration) =
                    self.hoisted_declaration(&reference.inner, mutable, &ctx)?;
                self.dependent.push(declaration);
                name
            }
        };
        let state = if reference.mutable {
            OwnershipState::MutablyBorrowed
        } else {
            OwnershipState::Borrowed
        };
        // The reference value lives in the scope the lifetime bound points
        // at, so the borrow must be recorded there to outlast this block.
        self.scopes.set_state(&name, state, ctx.lifetime_bound());
        Ok(Expression::Borrow {
            mutable: reference.mutable,
            target: Box::new(Expression::Variable {
                name,
                ty: (*reference.inner).clone(),
            }),
        })
    }

    fn deref(&mut self, ty: &Type, ctx: &Context) -> GenResult<Expression> {
        let source = Type::Reference(ReferenceType {
            inner: Box::new(ty.clone()),
            mutable: false,
        });
        let value = self.expression(&source, &ctx.increment(NodeKind::Deref))?;
        Ok(Expression::Deref(Box::new(value)))
    }

    /* Type generation */

    fn pick_type(&mut self, ctx: &Context, position: TypePosition) -> GenResult<Type> {
        let mut kinds = vec![
            TypeKind::I8,
            TypeKind::I16,
            TypeKind::I32,
            TypeKind::I64,
            TypeKind::I128,
            TypeKind::F32,
            TypeKind::F64,
            TypeKind::Str,
            TypeKind::Bool,
            TypeKind::Tuple,
            TypeKind::Struct,
        ];
        if position == TypePosition::Binding {
            kinds.push(TypeKind::Reference);
        }
        let weights = self.policy.type_weights(ctx, &kinds);
        match pick_weighted(&mut self.session.rng, &weights, "type")? {
            TypeKind::I8 => Ok(Type::I8),
            TypeKind::I16 => Ok(Type::I16),
            TypeKind::I32 => Ok(Type::I32),
            TypeKind::I64 => Ok(Type::I64),
            TypeKind::I128 => Ok(Type::I128),
            TypeKind::F32 => Ok(Type::F32),
            TypeKind::F64 => Ok(Type::F64),
            TypeKind::Str => Ok(Type::Str),
            TypeKind::Bool => Ok(Type::Bool),
            TypeKind::Tuple => Ok(Type::Tuple(self.pick_tuple_type(ctx)?)),
            TypeKind::Struct => Ok(Type::Struct(self.pick_struct_type(ctx)?)),
            TypeKind::Reference => {
                let inner =
                    self.pick_type(&ctx.increment(NodeKind::ReferenceType), TypePosition::Member)?;
                Ok(Type::Reference(ReferenceType {
                    inner: Box::new(inner),
                    mutable: self.session.rng.gen_bool(0.5),
                }))
            }
        }
    }

    fn pick_tuple_type(&mut self, ctx: &Context) -> GenResult<TupleType> {
        let existing = self.globals.random_tuple(&mut self.session.rng);
        let (new_weight, reuse_weight) = self.policy.new_tuple_weights(ctx);
        match existing {
            Some(tuple) if !pick_flag(&mut self.session.rng, new_weight, reuse_weight) => {
                Ok(tuple)
            }
            _ => {
                let count = self.session.rng.gen_range(2..5);
                let mut elements = Vec::new();
                for _ in 0..count {
                    elements.push(
                        self.pick_type(&ctx.increment(NodeKind::TupleType), TypePosition::Member)?,
                    );
                }
                let tuple = TupleType { elements };
                self.globals.register_tuple(tuple.clone());
                Ok(tuple)
            }
        }
    }

    /// A fresh tuple type guaranteed to contain `required`.
    fn tuple_type_containing(&mut self, required: &Type, ctx: &Context) -> GenResult<TupleType> {
        let count = self.session.rng.gen_range(2..5);
        let mut elements = Vec::new();
        for _ in 0..count {
            elements
                .push(self.pick_type(&ctx.increment(NodeKind::TupleType), TypePosition::Member)?);
        }
        elements.push(required.clone());
        let tuple = TupleType { elements };
        self.globals.register_tuple(tuple.clone());
        Ok(tuple)
    }

    fn pick_struct_type(&mut self, ctx: &Context) -> GenResult<StructType> {
        let existing = self.globals.random_struct(&mut self.session.rng);
        let (new_weight, reuse_weight) = self.policy.new_struct_weights(ctx);
        match existing {
            Some(strukt) if !pick_flag(&mut self.session.rng, new_weight, reuse_weight) => {
                Ok(strukt)
            }
            _ => self.define_struct_type(None, ctx),
        }
    }

    /// A fresh struct definition, optionally guaranteed to carry a field of
    /// `required`, registered globally for reuse.
    fn define_struct_type(
        &mut self,
        required: Option<&Type>,
        ctx: &Context,
    ) -> GenResult<StructType> {
        let count = self.session.rng.gen_range(1..4);
        let mut fields = Vec::new();
        for _ in 0..count {
            fields.push(StructField {
                name: self.session.idents.next_variable(),
                ty: self.pick_type(&ctx.increment(NodeKind::StructType), TypePosition::Member)?,
            });
        }
        if let Some(ty) = required {
            fields.push(StructField {
                name: self.session.idents.next_variable(),
                ty: ty.clone(),
            });
        }
        let strukt = StructType {
            name: self.session.idents.next_struct(),
            fields,
        };
        self.globals.register_struct(strukt.clone());
        Ok(strukt)
    }
}

/// Generate one complete program from a seed and a selection policy, plus the
/// driver arguments that reproduce it.
pub fn generate_program(
    seed: u64,
    policy: &dyn SelectionPolicy,
) -> GenResult<(Program, Vec<String>)> {
    let mut session = Session::new(seed);
    let mut generator = Generator::new(&mut session, policy);
    let main = generator.block(&Context::new(), Some(&Type::I64))?;
    let Generator {
        functions, globals, ..
    } = generator;
    let program = Program {
        structs: globals.into_struct_definitions(),
        functions: functions.into_definitions(),
        main,
    };
    debug!(
        "seed {}: {} structs, {} functions",
        seed,
        program.structs.len(),
        program.functions.len()
    );
    let reproduction = vec![
        "--seed".to_string(),
        seed.to_string(),
        "--policy".to_string(),
        policy.name().to_string(),
        "--count".to_string(),
        "1".to_string(),
    ];
    Ok((program, reproduction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table_by_category() {
        let int_kinds = compatible_expression_kinds(&Type::I32);
        assert!(int_kinds.contains(&NodeKind::Int32Literal));
        assert!(int_kinds.contains(&NodeKind::Div));
        assert!(int_kinds.contains(&NodeKind::Mod));
        assert!(int_kinds.contains(&NodeKind::BitXor));
        assert!(!int_kinds.contains(&NodeKind::StringLiteral));

        let float_kinds = compatible_expression_kinds(&Type::F64);
        assert!(float_kinds.contains(&NodeKind::Div));
        assert!(!float_kinds.contains(&NodeKind::Mod));
        assert!(!float_kinds.contains(&NodeKind::BitAnd));

        let string_kinds = compatible_expression_kinds(&Type::Str);
        assert!(string_kinds.contains(&NodeKind::StringLiteral));
        assert!(!string_kinds.contains(&NodeKind::Add));
        // Dereferencing a MOVE type would move out of the reference.
        assert!(!string_kinds.contains(&NodeKind::Deref));

        let bool_kinds = compatible_expression_kinds(&Type::Bool);
        assert!(bool_kinds.contains(&NodeKind::BitAnd));
        assert!(bool_kinds.contains(&NodeKind::Deref));
    }

    #[test]
    fn test_reference_types_borrow_and_nothing_else() {
        let shared = Type::Reference(ReferenceType {
            inner: Box::new(Type::I32),
            mutable: false,
        });
        let kinds = compatible_expression_kinds(&shared);
        assert!(kinds.contains(&NodeKind::Borrow));
        assert!(!kinds.contains(&NodeKind::MutBorrow));
        assert!(!kinds.contains(&NodeKind::FunctionCall));
        assert!(!kinds.contains(&NodeKind::TupleAccess));
        assert!(!kinds.contains(&NodeKind::Deref));

        let exclusive = Type::Reference(ReferenceType {
            inner: Box::new(Type::I32),
            mutable: true,
        });
        let kinds = compatible_expression_kinds(&exclusive);
        assert!(kinds.contains(&NodeKind::MutBorrow));
        assert!(!kinds.contains(&NodeKind::Borrow));
    }

    #[test]
    fn test_lvalue_root_follows_access_chains() {
        let strukt = StructType {
            name: "S0".to_string(),
            fields: vec![
                StructField {
                    name: "var0".to_string(),
                    ty: Type::I8,
                },
                StructField {
                    name: "var1".to_string(),
                    ty: Type::Str,
                },
            ],
        };
        let access = Expression::FieldAccess {
            base: Box::new(Expression::Variable {
                name: "var9".to_string(),
                ty: Type::Struct(strukt),
            }),
            field: "var1".to_string(),
        };
        assert_eq!(lvalue_root(&access), Some(("var9".to_string(), vec![1])));

        let literal = Expression::TupleAccess {
            base: Box::new(Expression::TupleLiteral(vec![
                Expression::Int8Literal(1),
                Expression::Int8Literal(2),
            ])),
            index: 0,
        };
        assert_eq!(lvalue_root(&literal), None);
    }
}
