//! # Rule System
//!
//! Rules drive both exploration and demand propagation over the memo.
//!
//! ## Rule Types
//!
//! - **Transformation rules** (`RuleType::Transformation`): rewrite a logical
//!   expression into equivalent logical alternatives, expanding the search
//!   space. Transformation rules are also the carriers of demand propagation: a
//!   rule may read the demands attached to the reference it fires in and push
//!   derived demands onto child references.
//!
//! - **Implementation rules** (`RuleType::Implementation`): map a logical
//!   expression to one or more physical alternatives. Implementation rules
//!   typically consume demands, e.g. producing a sorted plan only for orderings
//!   somebody upstream asked for.
//!
//! ## Demand Protocol
//!
//! A rule that participates in propagation declares the [`DemandKind`] it
//! consumes. The engine hands it the current reference's demand set of that
//! kind (or `None` when nothing was pushed, which is not an error) and collects
//! [`RuleResult::PushDemands`] results. Pushing is monotone: demand sets only
//! grow, and pushing an already-present value is a no-op that schedules no
//! further work.
//!
//! ## Rule Deduplication
//!
//! Each rule has a `rule_hash()` fingerprint. The engine tracks which
//! (expression, rule, demand state) combinations have fired so that a rule is
//! re-applied on an expression only when the demands it depends on have
//! actually changed.

use crate::expr::Operator;
use crate::memo::{ExprId, Expression, Memo, RefId};
use crate::pattern::Pattern;
use crate::properties::{Demand, DemandKind};
use indexmap::IndexSet;
use std::hash::{Hash, Hasher};

/// Classification of rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical to logical transformation, possibly pushing demands.
    Transformation,
    /// Logical to physical implementation.
    Implementation,
}

/// Context passed to rules during application.
pub struct RuleContext<'a> {
    pub memo: &'a Memo,
    /// The reference the matched expression belongs to.
    pub reference: RefId,
    /// Demands of the kind the rule declared, attached to `reference`.
    /// `None` when no demand of that kind was pushed.
    pub demands: Option<&'a IndexSet<Demand>>,
}

/// A child in a rule result: an existing reference, or a new sub-expression
/// the engine memoizes bottom-up into its own reference.
#[derive(Debug, Clone)]
pub enum RuleChild {
    Existing(RefId),
    New(Operator, Vec<RuleChild>),
}

/// One result of applying a rule.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// Add an equivalent expression to the current reference. Children that are
    /// `RuleChild::New` get their own references, created through the
    /// exploratory memoizer so structural duplicates are reused.
    Substitution(Operator, Vec<RuleChild>),
    /// Push demands onto a child reference.
    PushDemands(RefId, Vec<Demand>),
}

/// A rule transforms expressions or propagates demands.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    fn rule_type(&self) -> RuleType;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// The demand kind this rule consumes, if any. The engine re-fires the rule
    /// on an expression whenever demands of this kind change on its reference.
    fn demand_kind(&self) -> Option<DemandKind> {
        None
    }

    /// Apply the rule to a matching expression.
    fn apply(&self, expr: &Expression, expr_id: ExprId, ctx: &RuleContext) -> Vec<RuleResult>;

    /// Hash for fingerprinting (to avoid re-applying rules).
    fn rule_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.name().hash(&mut hasher);
        hasher.finish()
    }
}

/// Registry of rules, applied in registration order.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn transformation_rules(&self) -> Vec<&dyn Rule> {
        self.rules()
            .filter(|r| r.rule_type() == RuleType::Transformation)
            .collect()
    }

    pub fn implementation_rules(&self) -> Vec<&dyn Rule> {
        self.rules()
            .filter(|r| r.rule_type() == RuleType::Implementation)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
