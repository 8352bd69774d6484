//! # Declarative Pattern Matching for Rules
//!
//! Each rule declares a `Pattern` describing the expression shape it can
//! transform. The propagation engine checks the pattern before calling
//! `apply()`, so rules never see non-matching expressions.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(matcher, children)`: matches an expression whose
//!   operator satisfies `matcher` and whose children match the given child
//!   patterns, positionally.
//!
//! - `Pattern::OperatorAny(matcher)`: like `Operator` but accepts any arity.
//!   Needed for n-ary operators such as unions.
//!
//! - `Pattern::Any`: matches any expression. The most common child pattern.
//!
//! - `Pattern::Leaf`: matches only expressions with no children.
//!
//! ## Reference-Level Matching
//!
//! When a child pattern is not `Any`, the matcher checks every member of the
//! child reference. A child pattern matches if *any* member satisfies it, which
//! is sound because all members of a reference are interchangeable.

use crate::expr::{LogicalOpKind, Operator, PhysicalOpKind};
use crate::memo::{ExprId, Memo};

/// Pattern for matching expressions in the memo.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match an operator with positional child patterns.
    Operator(OpMatcher, Vec<Pattern>),
    /// Match an operator with any number of children.
    OperatorAny(OpMatcher),
    /// Match any expression.
    Any,
    /// Match a leaf expression (no children).
    Leaf,
}

/// Matcher for operator types (without data).
#[derive(Debug, Clone)]
pub enum OpMatcher {
    LogicalOp(LogicalOpKind),
    PhysicalOp(PhysicalOpKind),
    AnyLogical,
    AnyPhysical,
}

impl Pattern {
    /// Match a logical scan.
    pub fn scan() -> Self {
        Pattern::Operator(OpMatcher::LogicalOp(LogicalOpKind::Scan), vec![])
    }

    /// Match a logical filter with one child.
    pub fn filter() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Filter),
            vec![Pattern::Any],
        )
    }

    /// Match a filter whose child reference contains another filter.
    pub fn filter_filter() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Filter),
            vec![Pattern::Operator(
                OpMatcher::LogicalOp(LogicalOpKind::Filter),
                vec![Pattern::Any],
            )],
        )
    }

    /// Match a logical union of any arity.
    pub fn union() -> Self {
        Pattern::OperatorAny(OpMatcher::LogicalOp(LogicalOpKind::Union))
    }

    /// Match a logical distinct with one child.
    pub fn distinct() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Distinct),
            vec![Pattern::Any],
        )
    }

    /// Match a logical sort with one child.
    pub fn sort() -> Self {
        Pattern::Operator(
            OpMatcher::LogicalOp(LogicalOpKind::Sort),
            vec![Pattern::Any],
        )
    }
}

impl OpMatcher {
    fn accepts(&self, op: &Operator) -> bool {
        match (op, self) {
            (Operator::Logical(l), OpMatcher::LogicalOp(kind)) => l.kind() == *kind,
            (Operator::Physical(p), OpMatcher::PhysicalOp(kind)) => p.kind() == *kind,
            (Operator::Logical(_), OpMatcher::AnyLogical) => true,
            (Operator::Physical(_), OpMatcher::AnyPhysical) => true,
            _ => false,
        }
    }
}

/// Check if a memo expression matches a pattern.
pub fn matches(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> bool {
    let expr = memo.expr(expr_id);
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => expr.children.is_empty(),
        Pattern::OperatorAny(matcher) => matcher.accepts(&expr.op),
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.accepts(&expr.op) {
                return false;
            }
            if expr.children.len() != child_patterns.len() {
                return false;
            }

            // A non-trivial child pattern matches if any member of the child
            // reference satisfies it.
            for (child_ref, child_pattern) in expr.children.iter().zip(child_patterns.iter()) {
                match child_pattern {
                    Pattern::Any => continue,
                    _ => {
                        let any_match = memo
                            .reference(*child_ref)
                            .members()
                            .iter()
                            .any(|&eid| matches(memo, eid, child_pattern));
                        if !any_match {
                            return false;
                        }
                    }
                }
            }

            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, Expr, LogicalOp, TableRef};
    use crate::memo::Memoizer;

    fn scan_op(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef {
                schema: "public".into(),
                name: name.into(),
            },
            columns: vec![ColumnRef {
                table: None,
                name: "a".into(),
                index: 0,
            }],
        })
    }

    #[test]
    fn union_pattern_matches_any_arity() {
        let mut memo = Memo::default();
        let mut children = Vec::new();
        for name in ["t1", "t2", "t3"] {
            children.push(
                memo.memoize_exploratory_expression(scan_op(name), vec![])
                    .unwrap()
                    .reference()
                    .unwrap(),
            );
        }
        let union = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Union { all: false }),
                children,
            )
            .unwrap();
        let union_expr = union.members()[0];
        union.reference().unwrap();

        assert!(matches(&memo, union_expr, &Pattern::union()));
        assert!(!matches(&memo, union_expr, &Pattern::filter()));
        assert!(!matches(&memo, union_expr, &Pattern::Leaf));
    }

    #[test]
    fn class_matchers_distinguish_logical_from_physical() {
        use crate::expr::{PhysicalOp, SortKey};
        let mut memo = Memo::default();
        let scan_ref = memo
            .memoize_exploratory_expression(scan_op("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let builder = memo
            .memoize_exploratory_expression(
                Operator::Physical(PhysicalOp::SortOp {
                    order: vec![SortKey::asc(ColumnRef {
                        table: None,
                        name: "a".into(),
                        index: 0,
                    })],
                }),
                vec![scan_ref],
            )
            .unwrap();
        let sort_expr = builder.members()[0];
        builder.reference().unwrap();
        let scan_expr = memo.reference(scan_ref).members()[0];

        assert!(matches(
            &memo,
            scan_expr,
            &Pattern::OperatorAny(OpMatcher::AnyLogical)
        ));
        assert!(!matches(
            &memo,
            scan_expr,
            &Pattern::OperatorAny(OpMatcher::AnyPhysical)
        ));
        assert!(matches(
            &memo,
            sort_expr,
            &Pattern::OperatorAny(OpMatcher::AnyPhysical)
        ));
        assert!(!matches(
            &memo,
            sort_expr,
            &Pattern::OperatorAny(OpMatcher::AnyLogical)
        ));
    }

    #[test]
    fn child_patterns_match_against_reference_members() {
        let mut memo = Memo::default();
        let scan_ref = memo
            .memoize_exploratory_expression(scan_op("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let inner = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Filter {
                    predicate: Expr::Column(ColumnRef {
                        table: None,
                        name: "a".into(),
                        index: 0,
                    }),
                }),
                vec![scan_ref],
            )
            .unwrap()
            .reference()
            .unwrap();
        let outer = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Filter {
                    predicate: Expr::Column(ColumnRef {
                        table: None,
                        name: "a".into(),
                        index: 0,
                    }),
                }),
                vec![inner],
            )
            .unwrap();
        let outer_expr = outer.members()[0];
        outer.reference().unwrap();

        assert!(matches(&memo, outer_expr, &Pattern::filter()));
        assert!(matches(&memo, outer_expr, &Pattern::filter_filter()));
    }
}
