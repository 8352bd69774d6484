//! # Push Requested Ordering Through Filter
//!
//! A filter neither reorders nor deduplicates its input, so a requested
//! ordering on the filter's reference is satisfiable exactly when the child can
//! satisfy it. The demand passes through unchanged.

use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::properties::DemandKind;
use relmemo_core::rule::{Rule, RuleContext, RuleResult, RuleType};

/// Propagate requested orderings through a filter, unchanged.
pub struct PushOrderingThroughFilterRule;

impl Rule for PushOrderingThroughFilterRule {
    fn name(&self) -> &str {
        "PushOrderingThroughFilter"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn demand_kind(&self) -> Option<DemandKind> {
        Some(DemandKind::RequestedOrdering)
    }

    fn apply(&self, expr: &Expression, _expr_id: ExprId, ctx: &RuleContext) -> Vec<RuleResult> {
        let Some(demands) = ctx.demands else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };
        vec![RuleResult::PushDemands(
            child,
            demands.iter().cloned().collect(),
        )]
    }
}
