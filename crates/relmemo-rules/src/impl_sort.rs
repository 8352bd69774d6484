//! # Sort Implementation Rule
//!
//! Maps a logical sort to the materializing physical sort operator. The
//! resulting member's Ordering property records the produced order, which is
//! what downstream partition queries and ordering demands check against.

use relmemo_core::expr::{LogicalOp, Operator, PhysicalOp};
use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::rule::{Rule, RuleChild, RuleContext, RuleResult, RuleType};

/// Implement a logical sort as a physical sort operator.
pub struct ImplSortRule;

impl Rule for ImplSortRule {
    fn name(&self) -> &str {
        "ImplSort"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::sort()
    }

    fn apply(&self, expr: &Expression, _expr_id: ExprId, _ctx: &RuleContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Sort { order }) = &expr.op else {
            return vec![];
        };
        let Some(&child) = expr.children.first() else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SortOp {
                order: order.clone(),
            }),
            vec![RuleChild::Existing(child)],
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_metadata() {
        let rule = ImplSortRule;
        assert_eq!(rule.name(), "ImplSort");
        assert_eq!(rule.rule_type(), RuleType::Implementation);
    }
}
