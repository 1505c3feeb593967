//! Pluggable selection policies: every branch point in the synthesizer asks
//! the active policy for relative weights and draws from them.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use forge_ast::Type;

use crate::context::{Context, NodeCategory, NodeKind, TypeKind};
use crate::error::{GenError, GenResult};

/// Draw one option from a weighted list. A zero weight permanently excludes
/// the option for this query; an all-zero (or empty) list is a dead end.
pub fn pick_weighted<T: Clone>(
    rng: &mut StdRng,
    options: &[(T, f64)],
    wanted: &str,
) -> GenResult<T> {
    options
        .choose_weighted(rng, |o| o.1)
        .map(|o| o.0.clone())
        .map_err(|_| GenError::dead_end(wanted.to_string()))
}

/// Weighted yes/no draw. A zero total means "no".
pub fn pick_flag(rng: &mut StdRng, yes: f64, no: f64) -> bool {
    let total = yes + no;
    if total <= 0.0 {
        return false;
    }
    rng.gen_range(0.0..total) < yes
}

/// Tunable weight constants. Empirically tuned, so they live here as named,
/// overridable configuration instead of inline numbers.
#[derive(Debug, Clone)]
pub struct WeightConfig {
    /// Hard ceiling on statements per scope; the continue vote stops here.
    pub max_statements_per_scope: usize,
    pub max_operator_depth: usize,
    pub max_block_depth: usize,
    pub max_function_depth: usize,
    pub max_access_depth: usize,
    pub max_variable_hoist_depth: usize,
    pub max_grouped_depth: usize,
    pub max_deref_depth: usize,
    pub max_loop_depth: usize,
    pub max_container_type_depth: usize,

    pub continue_weight: f64,
    pub stop_weight: f64,
    pub statement_weight: f64,
    pub literal_weight: f64,
    pub variable_weight: f64,
    pub recursive_weight: f64,

    pub leaf_type_weight: f64,
    pub container_type_weight: f64,
    pub reference_type_weight: f64,

    pub new_function_weight: f64,
    pub reuse_function_weight: f64,
    pub new_struct_weight: f64,
    pub reuse_struct_weight: f64,
    pub new_tuple_weight: f64,
    pub reuse_tuple_weight: f64,

    /// Probability that Swarm disables any given recursive production.
    pub swarm_disable_probability: f64,
    /// Factor Aggressive applies to its targeted production.
    pub aggressive_multiplier: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig {
            max_statements_per_scope: 10,
            max_operator_depth: 3,
            max_block_depth: 2,
            max_function_depth: 2,
            max_access_depth: 2,
            max_variable_hoist_depth: 4,
            max_grouped_depth: 2,
            max_deref_depth: 1,
            max_loop_depth: 1,
            max_container_type_depth: 2,

            continue_weight: 4.0,
            stop_weight: 1.0,
            statement_weight: 1.0,
            literal_weight: 2.0,
            variable_weight: 2.5,
            recursive_weight: 1.0,

            leaf_type_weight: 1.0,
            container_type_weight: 0.5,
            reference_type_weight: 0.25,

            new_function_weight: 0.35,
            reuse_function_weight: 0.65,
            new_struct_weight: 0.4,
            reuse_struct_weight: 0.6,
            new_tuple_weight: 0.4,
            reuse_tuple_weight: 0.6,

            swarm_disable_probability: 0.25,
            aggressive_multiplier: 8.0,
        }
    }
}

/// Whether a production is still legal under the context's depth budgets.
/// Container literals and borrows stay available at any depth: their
/// recursion descends into strictly smaller types, so it is bounded by the
/// type itself.
fn within_budget(config: &WeightConfig, ctx: &Context, kind: NodeKind) -> bool {
    match kind {
        NodeKind::Variable => ctx.depth(NodeKind::Variable) < config.max_variable_hoist_depth,
        NodeKind::Grouped => ctx.depth(NodeKind::Grouped) < config.max_grouped_depth,
        NodeKind::Add
        | NodeKind::Sub
        | NodeKind::Mul
        | NodeKind::Div
        | NodeKind::Mod
        | NodeKind::BitAnd
        | NodeKind::BitOr
        | NodeKind::BitXor => {
            ctx.category_depth(NodeCategory::BinaryOperator) < config.max_operator_depth
        }
        NodeKind::BlockExpression | NodeKind::IfExpression => {
            ctx.depth(NodeKind::BlockExpression) + ctx.depth(NodeKind::IfExpression)
                < config.max_block_depth
        }
        NodeKind::BlockStatement => {
            ctx.depth(NodeKind::BlockStatement) < config.max_block_depth
        }
        NodeKind::FunctionCall => ctx.depth(NodeKind::FunctionCall) < config.max_function_depth,
        NodeKind::TupleAccess | NodeKind::FieldAccess => {
            ctx.category_depth(NodeCategory::PartialMoveAccess) < config.max_access_depth
        }
        NodeKind::Deref => ctx.depth(NodeKind::Deref) < config.max_deref_depth,
        NodeKind::LoopStatement => ctx.depth(NodeKind::LoopStatement) < config.max_loop_depth,
        _ => true,
    }
}

/// The productions whose weight scales with depth under the Optimal policy,
/// and the pool Swarm draws its disabled set from.
const RECURSIVE_EXPRESSIONS: &[NodeKind] = &[
    NodeKind::Grouped,
    NodeKind::TupleAccess,
    NodeKind::FieldAccess,
    NodeKind::Add,
    NodeKind::Sub,
    NodeKind::Mul,
    NodeKind::Div,
    NodeKind::Mod,
    NodeKind::BitAnd,
    NodeKind::BitOr,
    NodeKind::BitXor,
    NodeKind::BlockExpression,
    NodeKind::IfExpression,
    NodeKind::FunctionCall,
    NodeKind::Deref,
];

fn is_literal(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Int8Literal
            | NodeKind::Int16Literal
            | NodeKind::Int32Literal
            | NodeKind::Int64Literal
            | NodeKind::Int128Literal
            | NodeKind::Float32Literal
            | NodeKind::Float64Literal
            | NodeKind::StringLiteral
            | NodeKind::BoolLiteral
    )
}

/// A strategy for every weighted decision the synthesizer makes.
pub trait SelectionPolicy {
    fn name(&self) -> &'static str;

    /// (continue, stop) weights for emitting another statement.
    fn continue_weights(&self, ctx: &Context) -> (f64, f64);

    fn statement_weights(&self, ctx: &Context, kinds: &[NodeKind]) -> Vec<(NodeKind, f64)>;

    fn expression_weights(
        &self,
        ctx: &Context,
        ty: &Type,
        kinds: &[NodeKind],
    ) -> Vec<(NodeKind, f64)>;

    fn type_weights(&self, ctx: &Context, kinds: &[TypeKind]) -> Vec<(TypeKind, f64)>;

    /// (synthesize-new, reuse-existing) weights.
    fn new_function_weights(&self, ctx: &Context) -> (f64, f64);
    fn new_struct_weights(&self, ctx: &Context) -> (f64, f64);
    fn new_tuple_weights(&self, ctx: &Context) -> (f64, f64);
}

fn type_kind_weight(config: &WeightConfig, ctx: &Context, kind: TypeKind) -> f64 {
    match kind {
        TypeKind::Tuple | TypeKind::Struct => {
            let nesting = ctx.depth(NodeKind::TupleType) + ctx.depth(NodeKind::StructType);
            if nesting < config.max_container_type_depth {
                config.container_type_weight
            } else {
                0.0
            }
        }
        TypeKind::Reference => {
            if ctx.depth(NodeKind::ReferenceType) == 0 {
                config.reference_type_weight
            } else {
                0.0
            }
        }
        _ => config.leaf_type_weight,
    }
}

/// Fixed, context-independent weights (beyond the hard depth budgets every
/// policy honors).
#[derive(Debug, Clone, Default)]
pub struct BasePolicy {
    pub config: WeightConfig,
}

impl BasePolicy {
    pub fn new(config: WeightConfig) -> Self {
        BasePolicy { config }
    }
}

impl SelectionPolicy for BasePolicy {
    fn name(&self) -> &'static str {
        "base"
    }

    fn continue_weights(&self, ctx: &Context) -> (f64, f64) {
        if ctx.statements_in_scope() >= self.config.max_statements_per_scope {
            (0.0, self.config.stop_weight)
        } else {
            (self.config.continue_weight, self.config.stop_weight)
        }
    }

    fn statement_weights(&self, ctx: &Context, kinds: &[NodeKind]) -> Vec<(NodeKind, f64)> {
        kinds
            .iter()
            .map(|&k| {
                let w = if within_budget(&self.config, ctx, k) {
                    self.config.statement_weight
                } else {
                    0.0
                };
                (k, w)
            })
            .collect()
    }

    fn expression_weights(
        &self,
        ctx: &Context,
        _ty: &Type,
        kinds: &[NodeKind],
    ) -> Vec<(NodeKind, f64)> {
        kinds
            .iter()
            .map(|&k| {
                let w = if !within_budget(&self.config, ctx, k) {
                    0.0
                } else if is_literal(k) {
                    self.config.literal_weight
                } else if k == NodeKind::Variable {
                    self.config.variable_weight
                } else {
                    self.config.recursive_weight
                };
                (k, w)
            })
            .collect()
    }

    fn type_weights(&self, ctx: &Context, kinds: &[TypeKind]) -> Vec<(TypeKind, f64)> {
        kinds
            .iter()
            .map(|&k| (k, type_kind_weight(&self.config, ctx, k)))
            .collect()
    }

    fn new_function_weights(&self, _ctx: &Context) -> (f64, f64) {
        (
            self.config.new_function_weight,
            self.config.reuse_function_weight,
        )
    }

    fn new_struct_weights(&self, _ctx: &Context) -> (f64, f64) {
        (
            self.config.new_struct_weight,
            self.config.reuse_struct_weight,
        )
    }

    fn new_tuple_weights(&self, _ctx: &Context) -> (f64, f64) {
        (self.config.new_tuple_weight, self.config.reuse_tuple_weight)
    }
}

/// Depth- and progress-sensitive weights: recursive productions fade as their
/// depth grows and the continue vote fades as a scope fills, which keeps
/// recursion bounded while spreading structure across the program.
#[derive(Debug, Clone, Default)]
pub struct OptimalPolicy {
    pub config: WeightConfig,
}

impl OptimalPolicy {
    pub fn new(config: WeightConfig) -> Self {
        OptimalPolicy { config }
    }

    fn damped(&self, ctx: &Context, kind: NodeKind) -> f64 {
        let depth = match kind {
            NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod
            | NodeKind::BitAnd
            | NodeKind::BitOr
            | NodeKind::BitXor => ctx.category_depth(NodeCategory::BinaryOperator),
            NodeKind::TupleAccess | NodeKind::FieldAccess => {
                ctx.category_depth(NodeCategory::PartialMoveAccess)
            }
            NodeKind::BlockExpression | NodeKind::IfExpression => {
                ctx.depth(NodeKind::BlockExpression) + ctx.depth(NodeKind::IfExpression)
            }
            _ => ctx.depth(kind),
        };
        self.config.recursive_weight / (1.0 + depth as f64)
    }
}

impl SelectionPolicy for OptimalPolicy {
    fn name(&self) -> &'static str {
        "optimal"
    }

    fn continue_weights(&self, ctx: &Context) -> (f64, f64) {
        let max = self.config.max_statements_per_scope;
        let done = ctx.statements_in_scope();
        if done >= max {
            return (0.0, self.config.stop_weight);
        }
        let remaining = (max - done) as f64 / max as f64;
        (
            self.config.continue_weight * remaining,
            self.config.stop_weight,
        )
    }

    fn statement_weights(&self, ctx: &Context, kinds: &[NodeKind]) -> Vec<(NodeKind, f64)> {
        kinds
            .iter()
            .map(|&k| {
                let w = if !within_budget(&self.config, ctx, k) {
                    0.0
                } else if matches!(k, NodeKind::BlockStatement | NodeKind::LoopStatement) {
                    // Nesting statements thin out with scope depth.
                    self.config.statement_weight / ctx.scope_count().max(1) as f64
                } else {
                    self.config.statement_weight
                };
                (k, w)
            })
            .collect()
    }

    fn expression_weights(
        &self,
        ctx: &Context,
        _ty: &Type,
        kinds: &[NodeKind],
    ) -> Vec<(NodeKind, f64)> {
        kinds
            .iter()
            .map(|&k| {
                let w = if !within_budget(&self.config, ctx, k) {
                    0.0
                } else if is_literal(k) {
                    self.config.literal_weight
                } else if k == NodeKind::Variable {
                    self.config.variable_weight
                } else if RECURSIVE_EXPRESSIONS.contains(&k) {
                    self.damped(ctx, k)
                } else {
                    self.config.recursive_weight
                };
                (k, w)
            })
            .collect()
    }

    fn type_weights(&self, ctx: &Context, kinds: &[TypeKind]) -> Vec<(TypeKind, f64)> {
        kinds
            .iter()
            .map(|&k| (k, type_kind_weight(&self.config, ctx, k)))
            .collect()
    }

    fn new_function_weights(&self, ctx: &Context) -> (f64, f64) {
        // Deep call chains prefer reuse; fresh functions come from shallow
        // positions.
        let depth = ctx.depth(NodeKind::FunctionCall) as f64;
        (
            self.config.new_function_weight / (1.0 + depth),
            self.config.reuse_function_weight,
        )
    }

    fn new_struct_weights(&self, _ctx: &Context) -> (f64, f64) {
        (
            self.config.new_struct_weight,
            self.config.reuse_struct_weight,
        )
    }

    fn new_tuple_weights(&self, _ctx: &Context) -> (f64, f64) {
        (self.config.new_tuple_weight, self.config.reuse_tuple_weight)
    }
}

/// Swarm testing: a random subset of recursive productions is switched off
/// for the whole run, so coverage varies across files instead of within one.
#[derive(Debug, Clone)]
pub struct SwarmPolicy {
    inner: BasePolicy,
    disabled: Vec<NodeKind>,
}

impl SwarmPolicy {
    pub fn new(config: WeightConfig, rng: &mut StdRng) -> Self {
        let disabled = RECURSIVE_EXPRESSIONS
            .iter()
            .chain([NodeKind::LoopStatement, NodeKind::BlockStatement].iter())
            .copied()
            .filter(|_| rng.gen_bool(config.swarm_disable_probability))
            .collect();
        SwarmPolicy {
            inner: BasePolicy::new(config),
            disabled,
        }
    }

    pub fn disabled(&self) -> &[NodeKind] {
        &self.disabled
    }

    fn mask(&self, weights: Vec<(NodeKind, f64)>) -> Vec<(NodeKind, f64)> {
        weights
            .into_iter()
            .map(|(k, w)| {
                if self.disabled.contains(&k) {
                    (k, 0.0)
                } else {
                    (k, w)
                }
            })
            .collect()
    }
}

impl SelectionPolicy for SwarmPolicy {
    fn name(&self) -> &'static str {
        "swarm"
    }

    fn continue_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.continue_weights(ctx)
    }

    fn statement_weights(&self, ctx: &Context, kinds: &[NodeKind]) -> Vec<(NodeKind, f64)> {
        self.mask(self.inner.statement_weights(ctx, kinds))
    }

    fn expression_weights(
        &self,
        ctx: &Context,
        ty: &Type,
        kinds: &[NodeKind],
    ) -> Vec<(NodeKind, f64)> {
        self.mask(self.inner.expression_weights(ctx, ty, kinds))
    }

    fn type_weights(&self, ctx: &Context, kinds: &[TypeKind]) -> Vec<(TypeKind, f64)> {
        self.inner.type_weights(ctx, kinds)
    }

    fn new_function_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_function_weights(ctx)
    }

    fn new_struct_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_struct_weights(ctx)
    }

    fn new_tuple_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_tuple_weights(ctx)
    }
}

/// Stress one targeted production by inflating its weight.
#[derive(Debug, Clone)]
pub struct AggressivePolicy {
    inner: OptimalPolicy,
    target: NodeKind,
    multiplier: f64,
}

impl AggressivePolicy {
    pub fn new(config: WeightConfig, target: NodeKind) -> Self {
        let multiplier = config.aggressive_multiplier;
        AggressivePolicy {
            inner: OptimalPolicy::new(config),
            target,
            multiplier,
        }
    }

    pub fn target(&self) -> NodeKind {
        self.target
    }
}

impl SelectionPolicy for AggressivePolicy {
    fn name(&self) -> &'static str {
        "aggressive"
    }

    fn continue_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.continue_weights(ctx)
    }

    fn statement_weights(&self, ctx: &Context, kinds: &[NodeKind]) -> Vec<(NodeKind, f64)> {
        self.inner
            .statement_weights(ctx, kinds)
            .into_iter()
            .map(|(k, w)| {
                if k == self.target {
                    (k, w * self.multiplier)
                } else {
                    (k, w)
                }
            })
            .collect()
    }

    fn expression_weights(
        &self,
        ctx: &Context,
        ty: &Type,
        kinds: &[NodeKind],
    ) -> Vec<(NodeKind, f64)> {
        self.inner
            .expression_weights(ctx, ty, kinds)
            .into_iter()
            .map(|(k, w)| {
                if k == self.target {
                    (k, w * self.multiplier)
                } else {
                    (k, w)
                }
            })
            .collect()
    }

    fn type_weights(&self, ctx: &Context, kinds: &[TypeKind]) -> Vec<(TypeKind, f64)> {
        self.inner.type_weights(ctx, kinds)
    }

    fn new_function_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_function_weights(ctx)
    }

    fn new_struct_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_struct_weights(ctx)
    }

    fn new_tuple_weights(&self, ctx: &Context) -> (f64, f64) {
        self.inner.new_tuple_weights(ctx)
    }
}

/// Named policy variants selectable from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Base,
    Optimal,
    Swarm,
    Aggressive,
}

impl PolicyKind {
    pub const ALL: &'static [PolicyKind] = &[
        PolicyKind::Base,
        PolicyKind::Optimal,
        PolicyKind::Swarm,
        PolicyKind::Aggressive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Base => "base",
            PolicyKind::Optimal => "optimal",
            PolicyKind::Swarm => "swarm",
            PolicyKind::Aggressive => "aggressive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "base" => Some(PolicyKind::Base),
            "optimal" => Some(PolicyKind::Optimal),
            "swarm" => Some(PolicyKind::Swarm),
            "aggressive" => Some(PolicyKind::Aggressive),
            _ => None,
        }
    }

    /// Instantiate the policy for one file. Swarm draws its disabled set from
    /// the given RNG; Aggressive stresses addition by default.
    pub fn build(self, config: WeightConfig, rng: &mut StdRng) -> Box<dyn SelectionPolicy> {
        match self {
            PolicyKind::Base => Box::new(BasePolicy::new(config)),
            PolicyKind::Optimal => Box::new(OptimalPolicy::new(config)),
            PolicyKind::Swarm => Box::new(SwarmPolicy::new(config, rng)),
            PolicyKind::Aggressive => Box::new(AggressivePolicy::new(config, NodeKind::Add)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    #[test]
    fn test_zero_total_weight_is_a_dead_end() {
        let options = [(NodeKind::Add, 0.0), (NodeKind::Sub, 0.0)];
        let err = pick_weighted(&mut rng(), &options, "operator").unwrap_err();
        assert!(err.is_dead_end());
    }

    #[test]
    fn test_zero_weight_excludes_option() {
        let options = [(NodeKind::Add, 0.0), (NodeKind::Sub, 1.0)];
        let mut r = rng();
        for _ in 0..32 {
            assert_eq!(
                pick_weighted(&mut r, &options, "operator").unwrap(),
                NodeKind::Sub
            );
        }
    }

    #[test]
    fn test_operator_budget_exhausts() {
        let policy = BasePolicy::new(WeightConfig::default());
        let mut ctx = Context::new();
        for _ in 0..policy.config.max_operator_depth {
            ctx = ctx.increment(NodeKind::Add);
        }
        let weights = policy.expression_weights(&ctx, &Type::I32, &[NodeKind::Mul]);
        assert_eq!(weights, vec![(NodeKind::Mul, 0.0)]);
    }

    #[test]
    fn test_optimal_damps_with_depth() {
        let policy = OptimalPolicy::new(WeightConfig::default());
        let shallow = Context::new();
        let deep = shallow.increment(NodeKind::Add).increment(NodeKind::Add);
        let w_shallow = policy.expression_weights(&shallow, &Type::I32, &[NodeKind::Add]);
        let w_deep = policy.expression_weights(&deep, &Type::I32, &[NodeKind::Add]);
        assert!(w_shallow[0].1 > w_deep[0].1);
    }

    #[test]
    fn test_optimal_continue_fades_and_stops() {
        let policy = OptimalPolicy::new(WeightConfig::default());
        let fresh = Context::new().enter_scope();
        let mut full = fresh.clone();
        for _ in 0..policy.config.max_statements_per_scope {
            full = full.increment_statement_count();
        }
        assert!(policy.continue_weights(&fresh).0 > 0.0);
        assert_eq!(policy.continue_weights(&full).0, 0.0);
    }

    #[test]
    fn test_swarm_masks_disabled_productions() {
        let config = WeightConfig {
            swarm_disable_probability: 1.0,
            ..WeightConfig::default()
        };
        let policy = SwarmPolicy::new(config, &mut rng());
        assert!(policy.disabled().contains(&NodeKind::Add));
        let weights =
            policy.expression_weights(&Context::new(), &Type::I32, &[NodeKind::Add]);
        assert_eq!(weights, vec![(NodeKind::Add, 0.0)]);
        // Literals are never in the disabled pool.
        let weights =
            policy.expression_weights(&Context::new(), &Type::I32, &[NodeKind::Int32Literal]);
        assert!(weights[0].1 > 0.0);
    }

    #[test]
    fn test_aggressive_inflates_target() {
        let config = WeightConfig::default();
        let optimal = OptimalPolicy::new(config.clone());
        let aggressive = AggressivePolicy::new(config, NodeKind::Add);
        let ctx = Context::new();
        let base = optimal.expression_weights(&ctx, &Type::I32, &[NodeKind::Add, NodeKind::Sub]);
        let boosted =
            aggressive.expression_weights(&ctx, &Type::I32, &[NodeKind::Add, NodeKind::Sub]);
        assert!(boosted[0].1 > base[0].1);
        assert_eq!(boosted[1].1, base[1].1);
    }

    #[test]
    fn test_policy_names_round_trip() {
        for kind in PolicyKind::ALL {
            assert_eq!(PolicyKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(PolicyKind::from_name("greedy"), None);
    }
}
