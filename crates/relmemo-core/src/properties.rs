//! # Derived Properties and Demanded Properties
//!
//! Two distinct notions share this module, and keeping them apart is the point:
//!
//! ## Properties (what an expression *produces*)
//!
//! A [`Property`] names one derived fact about an expression: the orderings its
//! output satisfies, whether its output is duplicate-free, which columns it
//! produces. Property values are pure functions of an immutable expression, so once
//! computed they never change. They are computed by [`evaluate`], which dispatches
//! on operator kind and may read the already-computed property maps of child
//! references (the memo forces children first, in post-order over the acyclic
//! reference DAG).
//!
//! ## Demands (what a consumer *requests*)
//!
//! A [`Demand`] is a declarative requirement a parent attaches transiently to a
//! reference during one optimization pass, e.g. "give me output sorted by X"
//! ([`RequestedOrdering`]). Demands pushed to the same reference accumulate as a
//! set, deduplicated by value, not by origin: a reference may need to satisfy
//! several distinct demands from different parents. Rules declare which
//! [`DemandKind`]s they react to.
//!
//! The full value tuple of one expression across a map's tracked domain is a
//! [`PropertyTuple`]; it is the grouping key for expression partitioning.

use crate::expr::{ColumnRef, Expr, LogicalOp, Operator, PhysicalOp, SortKey};
use crate::memo::{ExprId, Memo};
use serde::{Deserialize, Serialize};

/// Names one derived fact tracked by an expression properties map. The set of
/// tracked properties for a given reference (its domain) is fixed at
/// reference-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Property {
    /// The set of orderings the expression's output satisfies.
    Ordering,
    /// Whether the expression's output is free of duplicate rows.
    Distinctness,
    /// The columns the expression produces.
    OutputColumns,
}

/// The value of one [`Property`] for one expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    /// All orderings the output satisfies, in first-encounter order.
    Orderings(Vec<Vec<SortKey>>),
    Distinct(bool),
    Columns(Vec<ColumnRef>),
}

/// The full property-value tuple of one expression, in the owning map's domain
/// order. This is the key by which a reference's members are partitioned: two
/// expressions fall in the same partition exactly when their entire tuples are
/// equal, not when individual properties happen to agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyTuple {
    entries: Vec<(Property, PropertyValue)>,
}

impl PropertyTuple {
    pub fn new(entries: Vec<(Property, PropertyValue)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, property: Property) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(Property, PropertyValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordering requested by a consumer of a reference.
///
/// `exhaustive` widens the request: instead of asking for exactly `parts`, an
/// exhaustive request asks the reference to surface *every* ordering it can
/// produce that is compatible with `parts`. The first child of a union receives
/// the exhaustive closure of all requests because it alone determines which
/// orderings the union can promise at all; the remaining children are asked for
/// the specific orderings later, once the first child's capabilities are known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestedOrdering {
    pub parts: Vec<SortKey>,
    pub exhaustive: bool,
}

impl RequestedOrdering {
    pub fn new(parts: Vec<SortKey>) -> Self {
        Self {
            parts,
            exhaustive: false,
        }
    }

    /// The exhaustive widening of this request.
    pub fn exhaustive(&self) -> Self {
        Self {
            parts: self.parts.clone(),
            exhaustive: true,
        }
    }
}

/// Names a kind of demand. Rules register the kinds they react to; a rule whose
/// kinds carry no demands on the reference under examination declines to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DemandKind {
    RequestedOrdering,
}

/// One demanded-property value. Distinct from [`PropertyValue`]: a property
/// describes what an expression produces, a demand describes what a consumer
/// requires of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Demand {
    RequestedOrdering(RequestedOrdering),
}

impl Demand {
    pub fn kind(&self) -> DemandKind {
        match self {
            Demand::RequestedOrdering(_) => DemandKind::RequestedOrdering,
        }
    }
}

/// Compute the value of `property` for the expression `expr_id`.
///
/// Pure with respect to the expression: expressions are immutable, so repeated
/// evaluation yields the same value, which is why the properties map may cache the
/// result forever. Child references must already be forced when this runs; the
/// memo guarantees that by draining property queues in post-order.
pub(crate) fn evaluate(property: Property, memo: &Memo, expr_id: ExprId) -> PropertyValue {
    match property {
        Property::Ordering => PropertyValue::Orderings(derive_orderings(memo, expr_id)),
        Property::Distinctness => PropertyValue::Distinct(derive_distinctness(memo, expr_id)),
        Property::OutputColumns => PropertyValue::Columns(derive_output_columns(memo, expr_id)),
    }
}

/// Orderings the expression's output satisfies.
///
/// Sorting operators establish their own order; row-preserving operators pass
/// their child's orderings through; scans and unordered unions promise nothing.
fn derive_orderings(memo: &Memo, expr_id: ExprId) -> Vec<Vec<SortKey>> {
    let expr = memo.expr(expr_id);
    match &expr.op {
        Operator::Logical(LogicalOp::Sort { order })
        | Operator::Physical(PhysicalOp::SortOp { order })
        | Operator::Physical(PhysicalOp::MergeUnion { order }) => vec![order.clone()],
        Operator::Logical(LogicalOp::Filter { .. })
        | Operator::Logical(LogicalOp::Distinct)
        | Operator::Physical(PhysicalOp::FilterOp { .. })
        | Operator::Physical(PhysicalOp::StreamDistinct) => expr
            .children
            .first()
            .map(|&child| memo.reference_orderings(child))
            .unwrap_or_default(),
        Operator::Logical(LogicalOp::Scan { .. })
        | Operator::Logical(LogicalOp::Project { .. })
        | Operator::Logical(LogicalOp::Union { .. })
        | Operator::Physical(PhysicalOp::SeqScan { .. }) => Vec::new(),
    }
}

/// Whether the expression's output is duplicate-free.
///
/// Base-table scans produce each stored row once. De-duplicating operators force
/// the fact; row-preserving operators inherit it from their child; projections and
/// duplicate-preserving unions drop it.
fn derive_distinctness(memo: &Memo, expr_id: ExprId) -> bool {
    let expr = memo.expr(expr_id);
    match &expr.op {
        Operator::Logical(LogicalOp::Distinct)
        | Operator::Physical(PhysicalOp::StreamDistinct)
        | Operator::Physical(PhysicalOp::MergeUnion { .. }) => true,
        Operator::Logical(LogicalOp::Union { all }) => !*all,
        Operator::Logical(LogicalOp::Scan { .. }) | Operator::Physical(PhysicalOp::SeqScan { .. }) => {
            true
        }
        Operator::Logical(LogicalOp::Filter { .. })
        | Operator::Logical(LogicalOp::Sort { .. })
        | Operator::Physical(PhysicalOp::FilterOp { .. })
        | Operator::Physical(PhysicalOp::SortOp { .. }) => expr
            .children
            .first()
            .map(|&child| memo.reference_distinctness(child))
            .unwrap_or(false),
        Operator::Logical(LogicalOp::Project { .. }) => false,
    }
}

/// Columns the expression produces.
fn derive_output_columns(memo: &Memo, expr_id: ExprId) -> Vec<ColumnRef> {
    let expr = memo.expr(expr_id);
    match &expr.op {
        Operator::Logical(LogicalOp::Scan { columns, .. })
        | Operator::Physical(PhysicalOp::SeqScan { columns, .. }) => columns.clone(),
        Operator::Logical(LogicalOp::Project { exprs, aliases }) => exprs
            .iter()
            .zip(aliases.iter())
            .enumerate()
            .map(|(i, (e, alias))| match e {
                Expr::Column(c) if c.name == *alias => c.clone(),
                _ => ColumnRef {
                    table: None,
                    name: alias.clone(),
                    index: i as u32,
                },
            })
            .collect(),
        _ => expr
            .children
            .first()
            .map(|&child| memo.reference_output_columns(child))
            .unwrap_or_default(),
    }
}
