//! # Push Requested Ordering Through Union
//!
//! The demand-propagation rule for union-shaped expressions. When a consumer
//! requests orderings from a union's reference, each union leg must be told
//! what to provide, but the legs are not symmetric:
//!
//! - **Child 0** receives each requested ordering in its *exhaustive* form:
//!   the same sort keys with the exhaustive bit set, asking the leg to surface
//!   every compatible ordering it can produce rather than just the literal
//!   request. The first leg alone determines which orderings are achievable
//!   for the whole union.
//! - **Children 1..n** receive the original, unwidened demand set. Once the
//!   first leg has fixed the candidate orderings, the remaining legs only need
//!   to match them.
//!
//! Pushing is monotone: a leg that already carries a pushed demand value is
//! left untouched and schedules no further work.

use relmemo_core::memo::{ExprId, Expression};
use relmemo_core::pattern::Pattern;
use relmemo_core::properties::{Demand, DemandKind, RequestedOrdering};
use relmemo_core::rule::{Rule, RuleContext, RuleResult, RuleType};
use tracing::trace;

/// Propagate requested orderings from a union's reference to its legs.
pub struct PushOrderingThroughUnionRule;

impl Rule for PushOrderingThroughUnionRule {
    fn name(&self) -> &str {
        "PushOrderingThroughUnion"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::union()
    }

    fn demand_kind(&self) -> Option<DemandKind> {
        Some(DemandKind::RequestedOrdering)
    }

    fn apply(&self, expr: &Expression, _expr_id: ExprId, ctx: &RuleContext) -> Vec<RuleResult> {
        // no demand attached means the rule declines, not an error
        let Some(demands) = ctx.demands else {
            return vec![];
        };

        let requested: Vec<&RequestedOrdering> = demands
            .iter()
            .map(|demand| {
                let Demand::RequestedOrdering(ordering) = demand;
                ordering
            })
            .collect();
        if requested.is_empty() {
            return vec![];
        }

        trace!(
            reference = %ctx.reference,
            legs = expr.children.len(),
            requested = requested.len(),
            "pushing requested orderings through union"
        );

        expr.children
            .iter()
            .enumerate()
            .map(|(position, &child)| {
                let pushed: Vec<Demand> = if position == 0 {
                    requested
                        .iter()
                        .map(|&ordering| Demand::RequestedOrdering(ordering.exhaustive()))
                        .collect()
                } else {
                    requested
                        .iter()
                        .map(|&ordering| Demand::RequestedOrdering(ordering.clone()))
                        .collect()
                };
                RuleResult::PushDemands(child, pushed)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use relmemo_core::expr::{ColumnRef, LogicalOp, Operator, SortKey, TableRef};
    use relmemo_core::memo::{Memo, Memoizer};

    fn col(name: &str) -> ColumnRef {
        ColumnRef {
            table: None,
            name: name.into(),
            index: 0,
        }
    }

    fn scan(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef {
                schema: "public".into(),
                name: name.into(),
            },
            columns: vec![col("a")],
        })
    }

    #[test]
    fn test_rule_metadata() {
        let rule = PushOrderingThroughUnionRule;
        assert_eq!(rule.name(), "PushOrderingThroughUnion");
        assert_eq!(rule.rule_type(), RuleType::Transformation);
        assert_eq!(rule.demand_kind(), Some(DemandKind::RequestedOrdering));
    }

    /// A multi-key request maps to exactly one exhaustive demand on the first
    /// leg, never to one demand per key prefix.
    #[test]
    fn first_leg_receives_one_exhaustive_form_per_request() {
        let mut memo = Memo::default();
        let legs = vec![
            memo.memoize_exploratory_expression(scan("t1"), vec![])
                .unwrap()
                .reference()
                .unwrap(),
            memo.memoize_exploratory_expression(scan("t2"), vec![])
                .unwrap()
                .reference()
                .unwrap(),
        ];
        let builder = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Union { all: true }),
                legs.clone(),
            )
            .unwrap();
        let union_expr = builder.members()[0];
        let union_ref = builder.reference().unwrap();

        let parts = vec![SortKey::asc(col("a")), SortKey::desc(col("b"))];
        let mut demands: IndexSet<Demand> = IndexSet::new();
        demands.insert(Demand::RequestedOrdering(RequestedOrdering::new(
            parts.clone(),
        )));
        let ctx = RuleContext {
            memo: &memo,
            reference: union_ref,
            demands: Some(&demands),
        };

        let results = PushOrderingThroughUnionRule.apply(memo.expr(union_expr), union_expr, &ctx);
        assert_eq!(results.len(), 2);

        let RuleResult::PushDemands(first_leg, first_pushed) = &results[0] else {
            panic!("expected a demand push");
        };
        assert_eq!(*first_leg, legs[0]);
        assert_eq!(first_pushed.len(), 1);
        let Demand::RequestedOrdering(widened) = &first_pushed[0];
        assert!(widened.exhaustive);
        assert_eq!(widened.parts, parts);

        let RuleResult::PushDemands(second_leg, second_pushed) = &results[1] else {
            panic!("expected a demand push");
        };
        assert_eq!(*second_leg, legs[1]);
        assert_eq!(second_pushed.len(), 1);
        let Demand::RequestedOrdering(original) = &second_pushed[0];
        assert!(!original.exhaustive);
        assert_eq!(original.parts, parts);
    }
}
