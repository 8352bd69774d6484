//! # Memo Arena and Memoization Contract
//!
//! The memo is the optimizer's central data structure: an arena of expressions
//! and references forming a strictly alternating DAG. Expressions never point at
//! other expressions, only at references; references own their member
//! expressions. The arena hands out small copyable ids instead of shared
//! pointers, so identity comparisons are integer comparisons and the whole
//! structure is trivially `Send`.
//!
//! ## Reuse contract
//!
//! All creation of memo structures goes through the [`Memoizer`] surface, which
//! draws a hard line between two phases:
//!
//! * **Exploratory** memoization (during rule application) *may* reuse: if a
//!   structurally identical exploratory expression already exists, the existing
//!   id comes back and no duplicate work is scheduled. Reuse is an optimization,
//!   never a semantic guarantee.
//! * **Final** memoization (plan extraction) *must not* reuse: every call
//!   produces fresh expressions and a fresh plan-only reference, so that
//!   downstream consumers can mutate their results without aliasing surprises.
//!   Final members must all be physical.

use crate::error::{MemoError, Result};
use crate::expr::Operator;
use crate::properties::{evaluate, Demand, DemandKind, Property, PropertyTuple};
use crate::reference::{ExpressionPropertiesMap, MapKind, Reference};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// Identity of an expression in the memo arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identity of a reference (equivalence class) in the memo arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefId(pub(crate) u32);

impl RefId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An operator plus the references it reads from. The only expression shape the
/// memo stores: children are always references, never other expressions.
#[derive(Debug, Clone)]
pub struct Expression {
    pub op: Operator,
    pub children: Vec<RefId>,
}

/// The memo arena. Owns every expression and reference ever created and
/// enforces the memoization contract between exploration and plan extraction.
#[derive(Debug)]
pub struct Memo {
    exprs: Vec<Expression>,
    refs: Vec<Reference>,
    /// Reuse index for exploratory expressions, keyed by structural identity.
    /// Final expressions are deliberately never entered here.
    exploratory: HashMap<(Operator, Vec<RefId>), ExprId>,
    /// The reference each expression belongs to. Membership is exclusive:
    /// growing a reference with an expression owned elsewhere inserts an
    /// arena copy instead of sharing the member.
    owner: HashMap<ExprId, RefId>,
    /// Property domain installed on every new general reference.
    tracked: Vec<Property>,
}

impl Default for Memo {
    fn default() -> Self {
        Self::new(vec![
            Property::Ordering,
            Property::Distinctness,
            Property::OutputColumns,
        ])
    }
}

impl Memo {
    pub fn new(tracked: Vec<Property>) -> Self {
        Self {
            exprs: Vec::new(),
            refs: Vec::new(),
            exploratory: HashMap::new(),
            owner: HashMap::new(),
            tracked,
        }
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        &self.exprs[id.index()]
    }

    pub fn reference(&self, id: RefId) -> &Reference {
        &self.refs[id.index()]
    }

    pub(crate) fn reference_mut(&mut self, id: RefId) -> &mut Reference {
        &mut self.refs[id.index()]
    }

    pub fn num_expressions(&self) -> usize {
        self.exprs.len()
    }

    pub fn num_references(&self) -> usize {
        self.refs.len()
    }

    /// The reference an expression belongs to, once it has been added to one.
    pub fn owner_of(&self, expr_id: ExprId) -> Option<RefId> {
        self.owner.get(&expr_id).copied()
    }

    fn check_children(&self, children: &[RefId]) -> Result<()> {
        for child in children {
            if child.index() >= self.refs.len() {
                return Err(MemoError::contract(format!(
                    "expression points at unknown reference {child}"
                )));
            }
        }
        Ok(())
    }

    fn alloc_expr(&mut self, op: Operator, children: Vec<RefId>) -> Result<ExprId> {
        self.check_children(&children)?;
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expression { op, children });
        Ok(id)
    }

    /// Intern an exploratory expression, reusing a structurally identical one if
    /// present. Returns the id and whether it was reused.
    fn intern_exploratory(&mut self, op: Operator, children: Vec<RefId>) -> Result<(ExprId, bool)> {
        let key = (op, children);
        if let Some(&existing) = self.exploratory.get(&key) {
            trace!(expr = %existing, "reusing exploratory expression");
            return Ok((existing, true));
        }
        let (op, children) = key;
        let id = self.alloc_expr(op.clone(), children.clone())?;
        self.exploratory.insert((op, children), id);
        Ok((id, false))
    }

    /// Arena copy of an expression. The copy is deliberately kept out of the
    /// exploratory dedup index: the original keeps winning structural lookups.
    fn clone_expr(&mut self, expr_id: ExprId) -> Result<ExprId> {
        let Expression { op, children } = self.expr(expr_id).clone();
        self.alloc_expr(op, children)
    }

    /// Whether the reference already holds `expr_id` or a structurally equal
    /// member.
    fn contains_equal_member(&self, ref_id: RefId, expr_id: ExprId) -> bool {
        let candidate = self.expr(expr_id);
        self.refs[ref_id.index()].members().iter().any(|&m| {
            m == expr_id || {
                let member = self.expr(m);
                member.op == candidate.op && member.children == candidate.children
            }
        })
    }

    fn alloc_reference(&mut self, kind: MapKind) -> RefId {
        let id = RefId(self.refs.len() as u32);
        let map = ExpressionPropertiesMap::new(kind, self.tracked.clone());
        self.refs.push(Reference::new(id, map));
        id
    }

    fn add_member(&mut self, ref_id: RefId, expr_id: ExprId) -> Result<()> {
        if self.refs[ref_id.index()].contains_member(expr_id) {
            return Err(MemoError::contract(format!(
                "expression {expr_id} is already a member of reference {ref_id}"
            )));
        }
        self.refs[ref_id.index()].push_member(expr_id);
        self.owner.insert(expr_id, ref_id);
        Ok(())
    }

    /// Add an expression to an existing reference together with a property tuple
    /// computed elsewhere, typically copied from the reference it was read from.
    pub fn add_member_with_properties(
        &mut self,
        ref_id: RefId,
        expr_id: ExprId,
        tuple: PropertyTuple,
    ) -> Result<()> {
        if let Some(owner) = self.owner_of(expr_id) {
            if owner != ref_id {
                return Err(MemoError::contract(format!(
                    "expression {expr_id} already belongs to reference {owner}"
                )));
            }
        }
        self.refs[ref_id.index()].push_member_with_properties(expr_id, tuple)?;
        self.owner.insert(expr_id, ref_id);
        Ok(())
    }

    /// Force lazy property computation for a reference and everything below it.
    ///
    /// Walks the reference DAG in post-order so that by the time a pending
    /// expression's tuple is computed, every child reference it reads from is
    /// fully computed. The DAG is acyclic by construction, so the walk
    /// terminates.
    pub fn force_properties(&mut self, ref_id: RefId) -> Result<()> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.post_order(ref_id, &mut visited, &mut order);
        for r in order {
            let pending = self.refs[r.index()].properties_mut().take_pending();
            for expr_id in pending {
                let tuple = self.compute_tuple(expr_id);
                self.refs[r.index()]
                    .properties_mut()
                    .insert_computed(expr_id, tuple);
            }
        }
        Ok(())
    }

    /// Forcing read of one expression's property tuple: drains the pending
    /// queue of the whole subtree first. The non-forcing counterpart is
    /// `reference(id).properties().current_properties(expr)`.
    pub fn expression_properties(
        &mut self,
        ref_id: RefId,
        expr_id: ExprId,
    ) -> Result<Option<&PropertyTuple>> {
        self.force_properties(ref_id)?;
        Ok(self.refs[ref_id.index()].properties().current_properties(expr_id))
    }

    /// Forcing read of one property's value for every member of a reference.
    pub fn reference_property_values(
        &mut self,
        ref_id: RefId,
        property: Property,
    ) -> Result<indexmap::IndexMap<ExprId, crate::properties::PropertyValue>> {
        self.force_properties(ref_id)?;
        self.refs[ref_id.index()].properties().property_values(property)
    }

    /// Forcing partition query: compute everything pending, then group the
    /// members by identical property tuples.
    pub fn reference_partitions(
        &mut self,
        ref_id: RefId,
    ) -> Result<Vec<crate::reference::ExpressionPartition>> {
        self.force_properties(ref_id)?;
        Ok(self.refs[ref_id.index()].properties().partitions())
    }

    fn post_order(&self, ref_id: RefId, visited: &mut HashSet<RefId>, order: &mut Vec<RefId>) {
        if !visited.insert(ref_id) {
            return;
        }
        for &member in self.refs[ref_id.index()].members() {
            for &child in &self.exprs[member.index()].children {
                self.post_order(child, visited, order);
            }
        }
        order.push(ref_id);
    }

    fn compute_tuple(&self, expr_id: ExprId) -> PropertyTuple {
        let entries = self
            .tracked
            .iter()
            .map(|&property| (property, evaluate(property, self, expr_id)))
            .collect();
        PropertyTuple::new(entries)
    }

    /// Orderings a reference may provide: the deduplicated union of its computed
    /// members' orderings, in first-encounter order. Reads only computed state;
    /// call [`Self::force_properties`] first if completeness matters.
    pub fn reference_orderings(&self, ref_id: RefId) -> Vec<Vec<crate::expr::SortKey>> {
        let mut orderings: IndexSet<Vec<crate::expr::SortKey>> = IndexSet::new();
        for &member in self.refs[ref_id.index()].members() {
            if let Some(tuple) = self.refs[ref_id.index()].properties().current_properties(member)
            {
                if let Some(crate::properties::PropertyValue::Orderings(o)) =
                    tuple.get(Property::Ordering)
                {
                    orderings.extend(o.iter().cloned());
                }
            }
        }
        orderings.into_iter().collect()
    }

    /// Distinctness is a property of a reference's denoted relation, shared by
    /// all members. Read from the first computed member.
    pub fn reference_distinctness(&self, ref_id: RefId) -> bool {
        self.first_computed_value(ref_id, Property::Distinctness)
            .map(|v| matches!(v, crate::properties::PropertyValue::Distinct(true)))
            .unwrap_or(false)
    }

    pub fn reference_output_columns(&self, ref_id: RefId) -> Vec<crate::expr::ColumnRef> {
        match self.first_computed_value(ref_id, Property::OutputColumns) {
            Some(crate::properties::PropertyValue::Columns(columns)) => columns.clone(),
            _ => Vec::new(),
        }
    }

    fn first_computed_value(
        &self,
        ref_id: RefId,
        property: Property,
    ) -> Option<&crate::properties::PropertyValue> {
        let reference = &self.refs[ref_id.index()];
        reference
            .members()
            .iter()
            .find_map(|&m| reference.properties().current_properties(m))
            .and_then(|tuple| tuple.get(property))
    }

    /// Attach demands to a reference. Returns whether any demand was new.
    pub fn push_demands(
        &mut self,
        ref_id: RefId,
        demands: impl IntoIterator<Item = Demand>,
    ) -> bool {
        self.refs[ref_id.index()].push_demands(demands)
    }

    pub fn demands(&self, ref_id: RefId, kind: DemandKind) -> Option<&IndexSet<Demand>> {
        self.refs[ref_id.index()].demands(kind)
    }
}

/// The only sanctioned way to create memo structures.
///
/// Exploratory methods may hand back existing structures when structural
/// identity allows it; final methods always create fresh ones.
pub trait Memoizer {
    /// Memoize one exploratory expression. May return an existing id.
    fn memoize_exploratory_expression(
        &mut self,
        op: Operator,
        children: Vec<RefId>,
    ) -> Result<ExploratoryBuilder<'_>>;

    /// Memoize a batch of exploratory expressions destined for one reference.
    fn memoize_exploratory_expressions(
        &mut self,
        exprs: Vec<(Operator, Vec<RefId>)>,
    ) -> Result<ExploratoryBuilder<'_>>;

    /// Memoize final (physical) expressions. Always fresh; never reuses, and
    /// rejects logical members.
    fn memoize_final_expressions(
        &mut self,
        exprs: Vec<(Operator, Vec<RefId>)>,
    ) -> Result<FinalBuilder<'_>>;
}

impl Memoizer for Memo {
    fn memoize_exploratory_expression(
        &mut self,
        op: Operator,
        children: Vec<RefId>,
    ) -> Result<ExploratoryBuilder<'_>> {
        self.memoize_exploratory_expressions(vec![(op, children)])
    }

    fn memoize_exploratory_expressions(
        &mut self,
        exprs: Vec<(Operator, Vec<RefId>)>,
    ) -> Result<ExploratoryBuilder<'_>> {
        let mut members = Vec::with_capacity(exprs.len());
        let mut all_reused = true;
        for (op, children) in exprs {
            let (id, reused) = self.intern_exploratory(op, children)?;
            all_reused &= reused;
            if !members.contains(&id) {
                members.push(id);
            }
        }
        Ok(ExploratoryBuilder {
            memo: self,
            members,
            all_reused,
        })
    }

    fn memoize_final_expressions(
        &mut self,
        exprs: Vec<(Operator, Vec<RefId>)>,
    ) -> Result<FinalBuilder<'_>> {
        let mut members = Vec::with_capacity(exprs.len());
        for (op, children) in exprs {
            if !op.is_physical() {
                return Err(MemoError::contract(
                    "final memoization accepts only physical expressions",
                ));
            }
            members.push(self.alloc_expr(op, children)?);
        }
        Ok(FinalBuilder {
            memo: self,
            members,
        })
    }
}

/// Pending exploratory memoization: expressions are interned, the owning
/// reference is decided here.
pub struct ExploratoryBuilder<'a> {
    memo: &'a mut Memo,
    members: Vec<ExprId>,
    all_reused: bool,
}

impl ExploratoryBuilder<'_> {
    pub fn members(&self) -> &[ExprId] {
        &self.members
    }

    /// Whether every requested expression already existed.
    pub fn fully_reused(&self) -> bool {
        self.all_reused
    }

    /// Resolve to a reference. If every member was reused and they all share one
    /// owning reference, that reference comes back; otherwise a fresh general
    /// reference is created around the members.
    pub fn reference(self) -> Result<RefId> {
        if self.all_reused {
            let mut owners = self.members.iter().filter_map(|&m| self.memo.owner_of(m));
            if let Some(first) = owners.next() {
                if owners.all(|o| o == first) {
                    trace!(reference = %first, "reusing exploratory reference");
                    return Ok(first);
                }
            }
        }
        let ref_id = self.memo.alloc_reference(MapKind::General);
        for member in self.members {
            // membership is exclusive: a reused expression already owned by
            // another reference contributes an arena copy here
            let member = if self.memo.owner_of(member).is_some() {
                self.memo.clone_expr(member)?
            } else {
                member
            };
            self.memo.add_member(ref_id, member)?;
        }
        Ok(ref_id)
    }

    /// Add the members to an existing reference instead of building a new one.
    /// Members the reference already holds, by id or by structure, are
    /// skipped; members owned by another reference contribute an arena copy.
    pub fn into_reference(self, ref_id: RefId) -> Result<Vec<ExprId>> {
        let mut added = Vec::new();
        for &member in &self.members {
            if self.memo.contains_equal_member(ref_id, member) {
                continue;
            }
            let member = match self.memo.owner_of(member) {
                Some(owner) if owner != ref_id => self.memo.clone_expr(member)?,
                _ => member,
            };
            self.memo.add_member(ref_id, member)?;
            added.push(member);
        }
        Ok(added)
    }
}

/// Pending final memoization: always resolves to a fresh plan-only reference.
pub struct FinalBuilder<'a> {
    memo: &'a mut Memo,
    members: Vec<ExprId>,
}

impl FinalBuilder<'_> {
    pub fn members(&self) -> &[ExprId] {
        &self.members
    }

    pub fn reference(self) -> Result<RefId> {
        let ref_id = self.memo.alloc_reference(MapKind::PlanOnly);
        for member in self.members {
            self.memo.add_member(ref_id, member)?;
        }
        Ok(ref_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, LogicalOp, PhysicalOp, TableRef};

    fn table(name: &str) -> TableRef {
        TableRef {
            schema: "public".into(),
            name: name.into(),
        }
    }

    fn col(name: &str, index: u32) -> ColumnRef {
        ColumnRef {
            table: None,
            name: name.into(),
            index,
        }
    }

    fn scan(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: table(name),
            columns: vec![col("a", 0), col("b", 1)],
        })
    }

    #[test]
    fn exploratory_memoization_reuses_identical_expressions() {
        let mut memo = Memo::default();
        let r1 = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let builder = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap();
        assert!(builder.fully_reused());
        let r2 = builder.reference().unwrap();
        assert_eq!(r1, r2);
        assert_eq!(memo.num_expressions(), 1);
    }

    #[test]
    fn distinct_exploratory_expressions_do_not_alias() {
        let mut memo = Memo::default();
        let b1 = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap();
        let e1 = b1.members()[0];
        b1.reference().unwrap();
        let b2 = memo
            .memoize_exploratory_expression(scan("u"), vec![])
            .unwrap();
        assert!(!b2.fully_reused());
        assert_ne!(e1, b2.members()[0]);
    }

    #[test]
    fn batch_members_keep_exclusive_ownership() {
        let mut memo = Memo::default();
        let r0 = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let e0 = memo.reference(r0).members()[0];

        // mixed batch: one interned expression, one genuinely new
        let r1 = memo
            .memoize_exploratory_expressions(vec![(scan("t"), vec![]), (scan("u"), vec![])])
            .unwrap()
            .reference()
            .unwrap();
        assert_ne!(r0, r1);
        assert!(!memo.reference(r1).contains_member(e0));
        assert_eq!(memo.reference(r1).members().len(), 2);
        for &member in memo.reference(r1).members() {
            assert_eq!(memo.owner_of(member), Some(r1));
        }
        assert_eq!(memo.reference(r0).members(), &[e0]);
        assert_eq!(memo.owner_of(e0), Some(r0));
    }

    #[test]
    fn growing_a_reference_does_not_steal_foreign_members() {
        let mut memo = Memo::default();
        let r0 = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let e0 = memo.reference(r0).members()[0];
        let r1 = memo
            .memoize_exploratory_expression(scan("u"), vec![])
            .unwrap()
            .reference()
            .unwrap();

        let added = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .into_reference(r1)
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_ne!(added[0], e0);
        assert_eq!(memo.owner_of(added[0]), Some(r1));
        assert_eq!(memo.owner_of(e0), Some(r0));

        // the structural copy satisfies later yields of the same expression
        let again = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .into_reference(r1)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn final_memoization_is_always_fresh() {
        let mut memo = Memo::default();
        let plan = Operator::Physical(PhysicalOp::SeqScan {
            table: table("t"),
            columns: vec![col("a", 0)],
            predicate: None,
        });
        let r1 = memo
            .memoize_final_expressions(vec![(plan.clone(), vec![])])
            .unwrap()
            .reference()
            .unwrap();
        let r2 = memo
            .memoize_final_expressions(vec![(plan, vec![])])
            .unwrap()
            .reference()
            .unwrap();
        assert_ne!(r1, r2);
        assert_eq!(memo.num_expressions(), 2);
        assert!(memo
            .reference(r1)
            .properties()
            .plan_partitions()
            .is_ok());
    }

    #[test]
    fn final_memoization_rejects_logical_expressions() {
        let mut memo = Memo::default();
        let err = memo
            .memoize_final_expressions(vec![(scan("t"), vec![])])
            .err()
            .unwrap();
        assert!(matches!(err, MemoError::ContractViolation(_)));
    }

    #[test]
    fn dangling_child_reference_is_a_violation() {
        let mut memo = Memo::default();
        let err = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Distinct),
                vec![RefId(42)],
            )
            .err()
            .unwrap();
        assert!(matches!(err, MemoError::ContractViolation(_)));
    }

    #[test]
    fn forcing_computes_properties_bottom_up() {
        let mut memo = Memo::default();
        let scan_ref = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let distinct_ref = memo
            .memoize_exploratory_expression(
                Operator::Logical(LogicalOp::Distinct),
                vec![scan_ref],
            )
            .unwrap()
            .reference()
            .unwrap();

        assert!(!memo.reference(distinct_ref).properties().is_fully_computed());
        memo.force_properties(distinct_ref).unwrap();
        assert!(memo.reference(distinct_ref).properties().is_fully_computed());
        assert!(memo.reference(scan_ref).properties().is_fully_computed());
        assert!(memo.reference_distinctness(distinct_ref));
        assert_eq!(
            memo.reference_output_columns(scan_ref),
            vec![col("a", 0), col("b", 1)]
        );
    }

    #[test]
    fn reference_orderings_union_members_in_first_encounter_order() {
        use crate::expr::SortKey;
        let mut memo = Memo::default();
        let scan_ref = memo
            .memoize_exploratory_expression(scan("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let order_a = vec![SortKey::asc(col("a", 0))];
        let order_b = vec![SortKey::asc(col("b", 1))];
        let sorted_ref = memo
            .memoize_exploratory_expressions(vec![
                (
                    Operator::Logical(LogicalOp::Sort {
                        order: order_a.clone(),
                    }),
                    vec![scan_ref],
                ),
                (
                    Operator::Logical(LogicalOp::Sort {
                        order: order_b.clone(),
                    }),
                    vec![scan_ref],
                ),
            ])
            .unwrap()
            .reference()
            .unwrap();
        memo.force_properties(sorted_ref).unwrap();
        assert_eq!(memo.reference_orderings(sorted_ref), vec![order_a, order_b]);
    }
}
