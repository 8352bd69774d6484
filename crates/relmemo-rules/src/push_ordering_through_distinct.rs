//! # Push Requested Ordering Through Distinct
//!
//! De-duplication keeps the relative order of the surviving rows, so a
//! requested ordering on a distinct's reference passes through to the child
//! unchanged. (Streaming de-duplication in fact *wants* sorted input, which is
//! exactly what the forwarded demand asks the child's exploration to produce.)

use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::properties::DemandKind;
use relmemo_core::rule::{Rule, RuleContext, RuleResult, RuleType};

/// Propagate requested orderings through a distinct, unchanged.
pub struct PushOrderingThroughDistinctRule;

impl Rule for PushOrderingThroughDistinctRule {
    fn name(&self) -> &str {
        "PushOrderingThroughDistinct"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::distinct()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_metadata() {
        let rule = PushOrderingThroughDistinctRule;
        assert_eq!(rule.name(), "PushOrderingThroughDistinct");
        assert_eq!(rule.rule_type(), RuleType::Transformation);
        assert_eq!(rule.demand_kind(), Some(DemandKind::RequestedOrdering));
    }
}
