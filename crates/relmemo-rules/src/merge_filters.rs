//! # Merge Filters Rule
//!
//! When a filter's child reference contains another filter, the two predicates
//! can be evaluated in one pass. The rule yields a new equivalent member into
//! the *outer* filter's reference: a single filter with the conjunction of both
//! predicates, reading from the inner filter's child.
//!
//! ```text
//! Before: Filter(p, ref{ Filter(q, X) })
//! After:  + Filter(p AND q, X)   -- added alongside, not replacing
//! ```
//!
//! In a memo-based optimizer the original two-filter shape stays in place as an
//! alternative; exploratory memoization deduplicates the merged expression if
//! some other rule application already produced it.

use relmemo_core::expr::{Expr, LogicalOp, Operator};
use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::rule::{Rule, RuleChild, RuleContext, RuleResult, RuleType};

/// Collapse adjacent filters into one conjunctive filter.
pub struct MergeFiltersRule;

impl Rule for MergeFiltersRule {
    fn name(&self) -> &str {
        "MergeFilters"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_filter()
    }

    fn apply(&self, expr: &Expression, _expr_id: ExprId, ctx: &RuleContext) -> Vec<RuleResult> {
        let Operator::Logical(LogicalOp::Filter { predicate: outer }) = &expr.op else {
            return vec![];
        };
        let Some(&child_ref) = expr.children.first() else {
            return vec![];
        };

        // every inner-filter member of the child reference yields one merge
        let mut results = Vec::new();
        for &member in ctx.memo.reference(child_ref).members() {
            let inner_expr = ctx.memo.expr(member);
            let Operator::Logical(LogicalOp::Filter { predicate: inner }) = &inner_expr.op else {
                continue;
            };
            let Some(&grandchild) = inner_expr.children.first() else {
                continue;
            };

            let mut conjuncts: Vec<Expr> = outer.conjuncts().into_iter().cloned().collect();
            conjuncts.extend(inner.conjuncts().into_iter().cloned());
            let merged = Operator::Logical(LogicalOp::Filter {
                predicate: Expr::and(conjuncts),
            });
            results.push(RuleResult::Substitution(
                merged,
                vec![RuleChild::Existing(grandchild)],
            ));
        }
        results
    }
}
