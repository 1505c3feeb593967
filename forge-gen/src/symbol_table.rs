//! Scoped symbol table with ownership-state simulation.
//!
//! The tracker knows just enough borrow-checker legality to never hand the
//! synthesizer a variable whose use would make the emitted program illegal:
//! moves invalidate, borrows pin, element moves leave siblings usable, and
//! loop bodies are speculated against a snapshot and merged back
//! conservatively.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use forge_ast::{
    Expression, FunctionDefinition, FunctionType, OwnershipCategory, StructDefinition, StructType,
    TupleType, Type,
};

use crate::context::{Context, NodeCategory, NodeKind};
use crate::error::{GenError, GenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    Valid,
    Borrowed,
    MutablyBorrowed,
    PartiallyValid,
    Invalid,
}

impl OwnershipState {
    pub fn borrowable(self) -> bool {
        matches!(self, OwnershipState::Valid | OwnershipState::Borrowed)
    }

    pub fn movable(self) -> bool {
        self == OwnershipState::Valid
    }

    pub fn assignable(self) -> bool {
        matches!(self, OwnershipState::Valid | OwnershipState::PartiallyValid)
    }

    /// Overriding states are written through every scope holding the name: a
    /// move is visible no matter which alias observed it first.
    pub fn overriding(self) -> bool {
        matches!(
            self,
            OwnershipState::Invalid | OwnershipState::PartiallyValid
        )
    }

    fn rank(self) -> u8 {
        match self {
            OwnershipState::Valid => 0,
            OwnershipState::Borrowed => 1,
            OwnershipState::MutablyBorrowed => 2,
            OwnershipState::PartiallyValid => 3,
            OwnershipState::Invalid => 4,
        }
    }

    pub fn more_restrictive(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Ownership tree for a binding: the root state plus one node per container
/// element, mirroring the type's structure. Leaves have no children.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOwnership {
    pub state: OwnershipState,
    pub elements: Vec<FieldOwnership>,
}

impl FieldOwnership {
    pub fn for_type(ty: &Type) -> Self {
        FieldOwnership {
            state: OwnershipState::Valid,
            elements: ty.element_types().iter().map(Self::for_type).collect(),
        }
    }

    fn set_all(&mut self, state: OwnershipState) {
        self.state = state;
        for e in &mut self.elements {
            e.set_all(state);
        }
    }

    /// Root-level state change. Whole-value moves and reinitializations reach
    /// every element; borrow states stay at the root.
    fn apply_root_state(&mut self, state: OwnershipState) {
        match state {
            OwnershipState::Invalid | OwnershipState::Valid => self.set_all(state),
            _ => self.state = state,
        }
    }

    /// Move out the element at `path`: the element and everything under it
    /// becomes INVALID while each node along the path drops to
    /// PARTIALLY_VALID, leaving sibling elements untouched.
    pub fn move_element(&mut self, path: &[usize]) {
        match path.split_first() {
            None => self.set_all(OwnershipState::Invalid),
            Some((&index, rest)) => {
                self.state = self
                    .state
                    .more_restrictive(OwnershipState::PartiallyValid);
                if let Some(child) = self.elements.get_mut(index) {
                    child.move_element(rest);
                }
            }
        }
    }

    pub fn element_state(&self, index: usize) -> Option<OwnershipState> {
        self.elements.get(index).map(|e| e.state)
    }

    pub fn merge_restrictive(&mut self, other: &FieldOwnership) {
        self.state = self.state.more_restrictive(other.state);
        for (mine, theirs) in self.elements.iter_mut().zip(other.elements.iter()) {
            mine.merge_restrictive(theirs);
        }
    }
}

/// Everything the tracker knows about one binding. The declared type never
/// changes for the binding's lifetime; only the ownership tree does.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierData {
    pub ty: Type,
    pub mutable: bool,
    pub depth: usize,
    pub ownership: FieldOwnership,
}

impl IdentifierData {
    pub fn new(ty: Type, mutable: bool, depth: usize) -> Self {
        let ownership = FieldOwnership::for_type(&ty);
        IdentifierData {
            ty,
            mutable,
            depth,
            ownership,
        }
    }

    pub fn state(&self) -> OwnershipState {
        self.ownership.state
    }
}

/// An assignable lvalue path found by `random_mutable_variable`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub expr: Expression,
    pub ty: Type,
    pub root: String,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    symbols: BTreeMap<String, IdentifierData>,
}

/// Stack of scopes, innermost last. Scope maps are ordered so candidate
/// iteration (and therefore generation) is deterministic for a fixed seed.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            scopes: vec![Scope::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Index of the innermost scope; also the declaration depth of bindings
    /// created now.
    pub fn current_depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a fresh name in the innermost scope. Names come from the
    /// session's identifier source, so a collision is a generator defect.
    pub fn declare(&mut self, name: &str, data: IdentifierData) -> GenResult<()> {
        let scope = match self.scopes.last_mut() {
            Some(s) => s,
            None => return Err(GenError::invariant("declaration with no open scope")),
        };
        if scope.symbols.contains_key(name) {
            return Err(GenError::invariant(format!(
                "identifier {} redeclared in the same scope",
                name
            )));
        }
        scope.symbols.insert(name.to_string(), data);
        Ok(())
    }

    /// Nearest binding for `name`, walking innermost to outermost.
    pub fn lookup(&self, name: &str) -> Option<&IdentifierData> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    /// Effective view of the chain: for each name, its innermost entry.
    fn effective(&self) -> BTreeMap<&str, &IdentifierData> {
        let mut view: BTreeMap<&str, &IdentifierData> = BTreeMap::new();
        for scope in self.scopes.iter().rev() {
            for (name, data) in &scope.symbols {
                view.entry(name.as_str()).or_insert(data);
            }
        }
        view
    }

    /// Apply an ownership transition. Overriding states (INVALID,
    /// PARTIALLY_VALID) are written through every scope holding the name;
    /// otherwise the write lands at the given scope depth, or — with no depth
    /// — as a shadow entry in the innermost scope only, so it ends when that
    /// scope is discarded.
    pub fn set_state(&mut self, name: &str, state: OwnershipState, depth: Option<usize>) {
        if state.overriding() {
            for scope in &mut self.scopes {
                if let Some(data) = scope.symbols.get_mut(name) {
                    data.ownership.apply_root_state(state);
                }
            }
            return;
        }
        let current = match self.lookup(name) {
            Some(data) => data.clone(),
            None => return,
        };
        let target = match depth {
            Some(d) => d,
            None => self.current_depth(),
        };
        if let Some(scope) = self.scopes.get_mut(target) {
            let mut data = current;
            data.ownership.apply_root_state(state);
            scope.symbols.insert(name.to_string(), data);
        }
    }

    /// A whole-value move: the binding becomes INVALID everywhere.
    pub fn mark_moved(&mut self, name: &str) {
        if let Some(data) = self.lookup(name) {
            if data.ty.ownership() == OwnershipCategory::Copy {
                return;
            }
        }
        self.set_state(name, OwnershipState::Invalid, None);
    }

    /// An element move: the accessed element becomes INVALID, the container
    /// PARTIALLY_VALID, written through every scope holding the name.
    pub fn mark_element_moved(&mut self, name: &str, path: &[usize]) {
        for scope in &mut self.scopes {
            if let Some(data) = scope.symbols.get_mut(name) {
                data.ownership.move_element(path);
            }
        }
    }

    /// Deep copy of the whole chain, taken before speculatively generating a
    /// loop body.
    pub fn snapshot(&self) -> ScopeStack {
        self.clone()
    }

    /// Conservative merge of a post-body snapshot: per identifier the more
    /// restrictive of the two states wins, so anything possibly moved or
    /// borrowed inside the body stays moved or borrowed afterward. Names
    /// declared only inside the body are gone with its scope and skipped.
    pub fn merge_snapshot(&mut self, other: &ScopeStack) {
        let merges: Vec<(String, OwnershipState, FieldOwnership, usize)> = other
            .effective()
            .into_iter()
            .filter_map(|(name, theirs)| {
                self.lookup(name).map(|mine| {
                    (
                        name.to_string(),
                        mine.state().more_restrictive(theirs.state()),
                        theirs.ownership.clone(),
                        theirs.depth,
                    )
                })
            })
            .collect();
        for (name, merged, their_ownership, declared_at) in merges {
            if merged.overriding() {
                for scope in &mut self.scopes {
                    if let Some(data) = scope.symbols.get_mut(&name) {
                        data.ownership.merge_restrictive(&their_ownership);
                    }
                }
            } else {
                self.set_state(&name, merged, Some(declared_at));
            }
        }
    }

    /// A candidate binding for reading a value of `ty`, honoring ownership,
    /// mutability, lifetime and partial-move legality for the requesting
    /// context. `None` means the caller must hoist a fresh declaration.
    pub fn random_variable_of_type(
        &self,
        ty: &Type,
        required_contained: Option<&Type>,
        ctx: &Context,
        mutable_required: bool,
        rng: &mut StdRng,
    ) -> Option<(String, IdentifierData)> {
        let in_loop = ctx.depth(NodeKind::LoopStatement) > 0;
        // A borrow applies to the binding it directly selects, so the chain
        // marker decides borrowable-vs-movable; the lifetime filter instead
        // triggers on any reference involvement along the path.
        let borrow_chain = matches!(
            ctx.previous_increment(),
            Some(NodeKind::Borrow | NodeKind::MutBorrow)
        );
        let mut_borrow = ctx.previous_increment() == Some(NodeKind::MutBorrow);
        let refs_involved =
            ty.contains_reference() || ctx.category_depth(NodeCategory::Referencing) > 0;

        let mut candidates: Vec<(&str, &IdentifierData)> = if in_loop {
            // Inside a loop body only bindings from the innermost scope are
            // eligible: moving an outer binding would be a use-after-move on
            // the second iteration.
            match self.scopes.last() {
                Some(scope) => scope
                    .symbols
                    .iter()
                    .map(|(n, d)| (n.as_str(), d))
                    .collect(),
                None => Vec::new(),
            }
        } else {
            self.effective().into_iter().collect()
        };

        if refs_involved {
            if let Some(bound) = ctx.lifetime_bound() {
                candidates.retain(|(_, d)| d.depth <= bound);
            }
        }
        candidates.retain(|(n, _)| !ctx.assignment_roots().iter().any(|r| r == n));

        let partial_chain = required_contained.is_some()
            && ty.is_container()
            && matches!(
                ctx.previous_increment(),
                Some(NodeKind::TupleAccess | NodeKind::FieldAccess)
            );

        if partial_chain {
            let required = required_contained?;
            let chain_depth = ctx.category_depth(NodeCategory::PartialMoveAccess);
            let element_types = ty.element_types();
            candidates.retain(|(_, d)| {
                if d.ty != *ty {
                    return false;
                }
                let root_ok = if borrow_chain {
                    d.state().borrowable()
                } else {
                    d.state().assignable()
                };
                if !root_ok {
                    return false;
                }
                element_types.iter().enumerate().any(|(i, elem_ty)| {
                    if elem_ty != required {
                        return false;
                    }
                    match d.ownership.element_state(i) {
                        Some(OwnershipState::Valid) => true,
                        Some(OwnershipState::PartiallyValid) => chain_depth > 1,
                        _ => false,
                    }
                })
            });
        } else {
            candidates.retain(|(_, d)| {
                if d.ty != *ty {
                    return false;
                }
                if mut_borrow {
                    d.state().movable()
                } else if borrow_chain {
                    d.state().borrowable()
                } else {
                    d.state().movable()
                }
            });
        }

        if mutable_required {
            candidates.retain(|(_, d)| d.mutable);
        }

        candidates
            .choose(rng)
            .map(|(n, d)| (n.to_string(), (*d).clone()))
    }

    /// An assignable lvalue path: container bindings decompose into their
    /// assignable elements, and `&mut` bindings additionally offer assignment
    /// through the reference.
    pub fn random_mutable_variable(&self, ctx: &Context, rng: &mut StdRng) -> Option<AssignTarget> {
        let mut paths: Vec<AssignTarget> = Vec::new();
        for (name, data) in self.effective() {
            if !data.state().assignable() {
                continue;
            }
            if ctx.assignment_roots().iter().any(|r| r == name) {
                continue;
            }
            let root = Expression::Variable {
                name: name.to_string(),
                ty: data.ty.clone(),
            };
            let mut found = Vec::new();
            collect_assignable_paths(root, &data.ty, &data.ownership, data.mutable, &mut found);
            paths.extend(found.into_iter().map(|(expr, ty)| AssignTarget {
                expr,
                ty,
                root: name.to_string(),
            }));
        }
        paths.choose(rng).cloned()
    }
}

fn collect_assignable_paths(
    expr: Expression,
    ty: &Type,
    ownership: &FieldOwnership,
    binding_mutable: bool,
    out: &mut Vec<(Expression, Type)>,
) {
    match ty {
        Type::Tuple(t) => {
            for (i, elem_ty) in t.elements.iter().enumerate() {
                let state = ownership.element_state(i).unwrap_or(OwnershipState::Valid);
                if !state.assignable() {
                    continue;
                }
                if let Some(elem_own) = ownership.elements.get(i) {
                    collect_assignable_paths(
                        Expression::TupleAccess {
                            base: Box::new(expr.clone()),
                            index: i,
                        },
                        elem_ty,
                        elem_own,
                        binding_mutable,
                        out,
                    );
                }
            }
        }
        Type::Struct(s) => {
            for (i, field) in s.fields.iter().enumerate() {
                let state = ownership.element_state(i).unwrap_or(OwnershipState::Valid);
                if !state.assignable() {
                    continue;
                }
                if let Some(elem_own) = ownership.elements.get(i) {
                    collect_assignable_paths(
                        Expression::FieldAccess {
                            base: Box::new(expr.clone()),
                            field: field.name.clone(),
                        },
                        &field.ty,
                        elem_own,
                        binding_mutable,
                        out,
                    );
                }
            }
        }
        Type::Reference(r) if r.mutable => {
            // Assignment through the reference needs no mutable binding.
            out.push((Expression::Deref(Box::new(expr.clone())), (*r.inner).clone()));
            if binding_mutable {
                out.push((expr, ty.clone()));
            }
        }
        _ => {
            if binding_mutable {
                out.push((expr, ty.clone()));
            }
        }
    }
}

/// Global registry of synthesized functions, one per program.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: Vec<FunctionDefinition>,
    signatures: BTreeMap<String, FunctionType>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: FunctionDefinition) {
        self.signatures.insert(def.name.clone(), def.signature());
        self.functions.push(def);
    }

    pub fn signature(&self, name: &str) -> Option<&FunctionType> {
        self.signatures.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn random_function_returning(
        &self,
        ty: &Type,
        rng: &mut StdRng,
    ) -> Option<(String, FunctionType)> {
        let matching: Vec<(&String, &FunctionType)> = self
            .signatures
            .iter()
            .filter(|(_, sig)| *sig.ret == *ty)
            .collect();
        matching
            .choose(rng)
            .map(|(name, sig)| ((*name).clone(), (*sig).clone()))
    }

    pub fn into_definitions(self) -> Vec<FunctionDefinition> {
        self.functions
    }
}

/// Global registry of struct and tuple types available for reuse.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    structs: Vec<StructDefinition>,
    tuples: Vec<TupleType>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_struct(&mut self, ty: StructType) {
        self.structs.push(StructDefinition { ty });
    }

    pub fn random_struct(&self, rng: &mut StdRng) -> Option<StructType> {
        self.structs.choose(rng).map(|d| d.ty.clone())
    }

    /// A registered struct with at least one field of `ty`.
    pub fn struct_containing(&self, ty: &Type, rng: &mut StdRng) -> Option<StructType> {
        let matching: Vec<&StructDefinition> = self
            .structs
            .iter()
            .filter(|d| d.ty.fields.iter().any(|f| f.ty == *ty))
            .collect();
        matching.choose(rng).map(|d| d.ty.clone())
    }

    pub fn register_tuple(&mut self, ty: TupleType) {
        self.tuples.push(ty);
    }

    pub fn random_tuple(&self, rng: &mut StdRng) -> Option<TupleType> {
        self.tuples.choose(rng).cloned()
    }

    /// A registered tuple with at least one element of `ty`.
    pub fn tuple_containing(&self, ty: &Type, rng: &mut StdRng) -> Option<TupleType> {
        let matching: Vec<&TupleType> = self
            .tuples
            .iter()
            .filter(|t| t.elements.iter().any(|e| e == ty))
            .collect();
        matching.choose(rng).cloned().cloned()
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    pub fn into_struct_definitions(self) -> Vec<StructDefinition> {
        self.structs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn str_pair() -> Type {
        Type::Tuple(TupleType {
            elements: vec![Type::Str, Type::Str],
        })
    }

    #[test]
    fn test_declare_and_lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::I32, false, 0))
            .unwrap();
        scopes.push_scope();
        scopes
            .declare("var1", IdentifierData::new(Type::Bool, false, 1))
            .unwrap();
        assert_eq!(scopes.lookup("var0").map(|d| d.ty.clone()), Some(Type::I32));
        assert_eq!(
            scopes.lookup("var1").map(|d| d.ty.clone()),
            Some(Type::Bool)
        );
        assert!(scopes.lookup("var2").is_none());
        assert!(scopes
            .declare("var1", IdentifierData::new(Type::I8, false, 1))
            .is_err());
    }

    #[test]
    fn test_move_writes_through_all_scopes() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::Str, true, 0))
            .unwrap();
        scopes.push_scope();
        scopes.mark_moved("var0");
        scopes.pop_scope();
        // The move survives the inner scope.
        assert_eq!(
            scopes.lookup("var0").map(|d| d.state()),
            Some(OwnershipState::Invalid)
        );
    }

    #[test]
    fn test_copy_types_survive_moving_reads() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::I64, false, 0))
            .unwrap();
        scopes.mark_moved("var0");
        assert_eq!(
            scopes.lookup("var0").map(|d| d.state()),
            Some(OwnershipState::Valid)
        );
    }

    #[test]
    fn test_borrow_shadow_ends_with_scope() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::Str, false, 0))
            .unwrap();
        scopes.push_scope();
        scopes.set_state("var0", OwnershipState::Borrowed, None);
        assert_eq!(
            scopes.lookup("var0").map(|d| d.state()),
            Some(OwnershipState::Borrowed)
        );
        scopes.pop_scope();
        assert_eq!(
            scopes.lookup("var0").map(|d| d.state()),
            Some(OwnershipState::Valid)
        );
    }

    #[test]
    fn test_element_move_leaves_siblings_usable() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(str_pair(), false, 0))
            .unwrap();
        scopes.mark_element_moved("var0", &[0]);
        let data = scopes.lookup("var0").unwrap();
        assert_eq!(data.state(), OwnershipState::PartiallyValid);
        assert_eq!(data.ownership.element_state(0), Some(OwnershipState::Invalid));
        assert_eq!(data.ownership.element_state(1), Some(OwnershipState::Valid));
    }

    #[test]
    fn test_merge_snapshot_is_conservative() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::Str, false, 0))
            .unwrap();
        scopes
            .declare("var1", IdentifierData::new(Type::Str, false, 0))
            .unwrap();

        let before = scopes.snapshot();
        scopes.push_scope();
        // Body: moves var0, borrows var1, declares a body-local.
        scopes.mark_moved("var0");
        scopes.set_state("var1", OwnershipState::Borrowed, None);
        scopes
            .declare("var2", IdentifierData::new(Type::I8, false, 1))
            .unwrap();
        let after = std::mem::replace(&mut scopes, before);
        scopes.merge_snapshot(&after);

        assert_eq!(
            scopes.lookup("var0").map(|d| d.state()),
            Some(OwnershipState::Invalid)
        );
        assert_eq!(
            scopes.lookup("var1").map(|d| d.state()),
            Some(OwnershipState::Borrowed)
        );
        assert!(scopes.lookup("var2").is_none());
    }

    #[test]
    fn test_selection_skips_moved_and_borrowed_sources() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::Str, false, 0))
            .unwrap();
        scopes
            .declare("var1", IdentifierData::new(Type::Str, false, 0))
            .unwrap();
        scopes.mark_moved("var0");
        let ctx = Context::new();
        for _ in 0..16 {
            let picked = scopes
                .random_variable_of_type(&Type::Str, None, &ctx, false, &mut rng())
                .map(|(n, _)| n);
            assert_eq!(picked.as_deref(), Some("var1"));
        }
    }

    #[test]
    fn test_selection_respects_lifetime_bound() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(Type::I32, false, 0))
            .unwrap();
        scopes.push_scope();
        scopes
            .declare("var1", IdentifierData::new(Type::I32, false, 1))
            .unwrap();
        let ctx = Context::new()
            .increment(NodeKind::Borrow)
            .bound_lifetime(0);
        for _ in 0..16 {
            let picked = scopes
                .random_variable_of_type(&Type::I32, None, &ctx, false, &mut rng())
                .map(|(n, _)| n);
            assert_eq!(picked.as_deref(), Some("var0"));
        }
    }

    #[test]
    fn test_partially_moved_container_still_offers_valid_element() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(str_pair(), false, 0))
            .unwrap();
        scopes.mark_element_moved("var0", &[0]);
        let ctx = Context::new()
            .with_required_type(Some(Type::Str))
            .increment(NodeKind::TupleAccess);
        let picked = scopes.random_variable_of_type(
            &str_pair(),
            Some(&Type::Str),
            &ctx,
            false,
            &mut rng(),
        );
        assert!(picked.is_some());

        // Once both elements are gone the container no longer qualifies.
        scopes.mark_element_moved("var0", &[1]);
        let picked = scopes.random_variable_of_type(
            &str_pair(),
            Some(&Type::Str),
            &ctx,
            false,
            &mut rng(),
        );
        assert!(picked.is_none());
    }

    #[test]
    fn test_mutable_paths_decompose_containers() {
        let mut scopes = ScopeStack::new();
        scopes
            .declare("var0", IdentifierData::new(str_pair(), true, 0))
            .unwrap();
        let ctx = Context::new();
        let target = scopes.random_mutable_variable(&ctx, &mut rng()).unwrap();
        assert_eq!(target.root, "var0");
        assert_eq!(target.ty, Type::Str);
        assert!(matches!(target.expr, Expression::TupleAccess { .. }));
    }

    #[test]
    fn test_assignment_through_mutable_reference() {
        use forge_ast::ReferenceType;
        let mut scopes = ScopeStack::new();
        let ref_ty = Type::Reference(ReferenceType {
            inner: Box::new(Type::I32),
            mutable: true,
        });
        // Immutable binding of a `&mut` still allows writing through it.
        scopes
            .declare("var0", IdentifierData::new(ref_ty, false, 0))
            .unwrap();
        let target = scopes
            .random_mutable_variable(&Context::new(), &mut rng())
            .unwrap();
        assert_eq!(target.ty, Type::I32);
        assert!(matches!(target.expr, Expression::Deref(_)));
    }
}
