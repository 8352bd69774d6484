//! # Sequential Scan Implementation Rule
//!
//! Maps a logical table scan to a sequential (full) scan, the universally
//! applicable physical access path. The physical member lands in the same
//! reference as the logical scan, so plan-side partition queries can tell the
//! two apart by their property tuples.

use relmemo_core::expr::{LogicalOp, Operator, PhysicalOp};
use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::rule::{Rule, RuleContext, RuleResult, RuleType};

/// Implement a logical scan as a sequential table scan.
pub struct ImplSeqScanRule;

impl Rule for ImplSeqScanRule {
    fn name(&self) -> &str {
        "ImplSeqScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::scan()
    }

    fn apply(&self, expr: &Expression, _expr_id: ExprId, _ctx: &RuleContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Scan { table, columns }) = &expr.op else {
            return vec![];
        };
        vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SeqScan {
                table: table.clone(),
                columns: columns.clone(),
                predicate: None,
            }),
            vec![],
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_metadata() {
        let rule = ImplSeqScanRule;
        assert_eq!(rule.name(), "ImplSeqScan");
        assert_eq!(rule.rule_type(), RuleType::Implementation);
    }
}
