//! # Demand Propagation Engine
//!
//! Drives rule application over the memo to a fixpoint. The engine owns the memo
//! and repeatedly processes references off a worklist:
//!
//! 1. **Match**: for every member expression of the reference, check each
//!    registered rule's pattern.
//! 2. **Apply**: call matching rules with the reference's current demand state.
//!    Rules return substitutions (new equivalent members) and demand pushes
//!    (derived demands for child references).
//! 3. **Materialize**: substitutions go through the exploratory memoizer so
//!    structurally identical expressions are reused; demand pushes merge into
//!    the child's demand sets.
//!
//! ## Termination
//!
//! Re-processing is driven by a per-reference fingerprint covering the demand
//! sets and the member count. A rule application is keyed by
//! `(expression, rule_hash ^ fingerprint)`: the same rule fires again on the
//! same expression only after a new demand or member actually arrived. Demand
//! sets grow monotonically and member creation is bounded by the finite rule
//! set, so the worklist drains; `max_iterations` is the safety valve for
//! pathological rule sets.
//!
//! ## Ordering
//!
//! References are seeded in breadth-first order from the root, parents before
//! children, because demands flow downward. Re-enqueued references append at
//! the tail. Substitutions may materialize references that did not exist when
//! the worklist was seeded; the references reachable from every added member
//! are enqueued along with the reference that grew. All iteration orders are
//! deterministic for a fixed memo and rule registration order.

use crate::error::Result;
use crate::memo::{ExprId, Memo, Memoizer, RefId};
use crate::pattern::matches;
use crate::properties::Demand;
use crate::rule::{RuleChild, RuleContext, RuleRegistry, RuleResult};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Configuration knobs for demand propagation.
pub struct EngineConfig {
    /// Upper bound on the total number of rule applications.
    pub max_iterations: usize,
    /// Upper bound on the number of references the memo may contain.
    pub max_references: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000_000,
            max_references: 100_000,
        }
    }
}

/// The propagation engine. Owns the memo and applies rules to a fixpoint.
pub struct PropagationEngine {
    /// The memo holding all references and expressions.
    pub memo: Memo,
    /// Registry of transformation and implementation rules to apply.
    pub rule_registry: Arc<RuleRegistry>,
    /// Configuration limits for propagation.
    pub config: EngineConfig,
    /// Running count of rule applications across the whole pass.
    iterations: usize,
    /// Rule applications already performed, keyed by expression and the
    /// xor of rule hash and reference fingerprint at application time.
    applied: HashSet<(ExprId, u64)>,
}

impl PropagationEngine {
    pub fn new(memo: Memo, rule_registry: Arc<RuleRegistry>, config: EngineConfig) -> Self {
        Self {
            memo,
            rule_registry,
            config,
            iterations: 0,
            applied: HashSet::new(),
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Seed the root reference with demands and run rule application to a
    /// fixpoint over everything reachable from the root.
    pub fn propagate(
        &mut self,
        root: RefId,
        seed: impl IntoIterator<Item = Demand>,
    ) -> Result<()> {
        self.memo.push_demands(root, seed);

        let mut queue: VecDeque<RefId> = self.top_down_order(root).into();
        let mut queued: HashSet<RefId> = queue.iter().copied().collect();
        debug!(
            references = queue.len(),
            rules = self.rule_registry.len(),
            "starting demand propagation"
        );

        while let Some(ref_id) = queue.pop_front() {
            queued.remove(&ref_id);
            if self.iterations >= self.config.max_iterations {
                debug!("hit iteration limit");
                break;
            }
            if self.memo.num_references() >= self.config.max_references {
                debug!("hit reference limit");
                break;
            }
            for dirty in self.process_reference(ref_id)? {
                if queued.insert(dirty) {
                    queue.push_back(dirty);
                }
            }
        }

        debug!(iterations = self.iterations, "propagation complete");
        Ok(())
    }

    /// Breadth-first order from the root, parents before children.
    fn top_down_order(&self, root: RefId) -> Vec<RefId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        seen.insert(root);
        while let Some(ref_id) = queue.pop_front() {
            order.push(ref_id);
            for &member in self.memo.reference(ref_id).members() {
                for &child in &self.memo.expr(member).children {
                    if seen.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        order
    }

    /// Apply all rules to all members of one reference, then materialize the
    /// results. Returns the references whose pass-relevant state changed.
    fn process_reference(&mut self, ref_id: RefId) -> Result<Vec<RefId>> {
        // Property-reading rules see fully computed child state.
        self.memo.force_properties(ref_id)?;

        let registry = Arc::clone(&self.rule_registry);
        let members: Vec<ExprId> = self.memo.reference(ref_id).members().to_vec();
        let fingerprint = self.memo.reference(ref_id).pass_fingerprint();

        let mut results = Vec::new();
        for rule in registry.rules() {
            for &expr_id in &members {
                let key = (expr_id, rule.rule_hash() ^ fingerprint);
                if !self.applied.insert(key) {
                    continue;
                }
                if !matches(&self.memo, expr_id, &rule.pattern()) {
                    continue;
                }
                let ctx = RuleContext {
                    memo: &self.memo,
                    reference: ref_id,
                    demands: rule
                        .demand_kind()
                        .and_then(|kind| self.memo.demands(ref_id, kind)),
                };
                trace!(rule = rule.name(), expr = %expr_id, reference = %ref_id, "applying rule");
                results.extend(rule.apply(self.memo.expr(expr_id), expr_id, &ctx));
                self.iterations += 1;
            }
        }

        let mut dirty = Vec::new();
        for result in results {
            match result {
                RuleResult::Substitution(op, children) => {
                    let child_refs = children
                        .into_iter()
                        .map(|child| self.materialize_child(child))
                        .collect::<Result<Vec<_>>>()?;
                    let added = self
                        .memo
                        .memoize_exploratory_expression(op, child_refs)?
                        .into_reference(ref_id)?;
                    if !added.is_empty() {
                        dirty.push(ref_id);
                        for &member in &added {
                            self.collect_child_refs(member, &mut dirty);
                        }
                    }
                }
                RuleResult::PushDemands(child, demands) => {
                    if self.memo.push_demands(child, demands) {
                        dirty.push(child);
                    }
                }
            }
        }
        Ok(dirty)
    }

    /// References reachable from a member's children. A substitution may have
    /// materialized references that were never on the worklist; everything it
    /// reaches gets (re-)enqueued, and already-drained references no-op.
    fn collect_child_refs(&self, expr_id: ExprId, out: &mut Vec<RefId>) {
        let mut seen: HashSet<RefId> = out.iter().copied().collect();
        let mut stack = self.memo.expr(expr_id).children.clone();
        while let Some(ref_id) = stack.pop() {
            if !seen.insert(ref_id) {
                continue;
            }
            out.push(ref_id);
            for &member in self.memo.reference(ref_id).members() {
                stack.extend(self.memo.expr(member).children.iter().copied());
            }
        }
    }

    fn materialize_child(&mut self, child: RuleChild) -> Result<RefId> {
        match child {
            RuleChild::Existing(ref_id) => Ok(ref_id),
            RuleChild::New(op, children) => {
                let child_refs = children
                    .into_iter()
                    .map(|c| self.materialize_child(c))
                    .collect::<Result<Vec<_>>>()?;
                self.memo
                    .memoize_exploratory_expression(op, child_refs)?
                    .reference()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, LogicalOp, Operator, PhysicalOp, SortKey, TableRef};
    use crate::memo::Expression;
    use crate::pattern::Pattern;
    use crate::properties::{Demand, DemandKind, RequestedOrdering};
    use crate::rule::{Rule, RuleType};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    /// Implements a sorted plan for each requested ordering on the reference.
    struct ImplSortForDemand {
        applications: Arc<AtomicUsize>,
    }

    impl Rule for ImplSortForDemand {
        fn name(&self) -> &str {
            "test_impl_sort_for_demand"
        }

        fn rule_type(&self) -> RuleType {
            RuleType::Implementation
        }

        fn pattern(&self) -> Pattern {
            Pattern::scan()
        }

        fn demand_kind(&self) -> Option<DemandKind> {
            Some(DemandKind::RequestedOrdering)
        }

        fn apply(&self, _expr: &Expression, _expr_id: ExprId, ctx: &RuleContext) -> Vec<RuleResult> {
            self.applications.fetch_add(1, Ordering::SeqCst);
            let Some(demands) = ctx.demands else {
                return Vec::new();
            };
            demands
                .iter()
                .map(|demand| {
                    let Demand::RequestedOrdering(ordering) = demand;
                    RuleResult::Substitution(
                        Operator::Physical(PhysicalOp::SortOp {
                            order: ordering.parts.clone(),
                        }),
                        vec![RuleChild::New(scan_op("t"), vec![])],
                    )
                })
                .collect()
        }
    }

    fn ordering_demand(column: &str) -> Demand {
        Demand::RequestedOrdering(RequestedOrdering::new(vec![SortKey::asc(ColumnRef {
            table: None,
            name: column.into(),
            index: 0,
        })]))
    }

    fn engine_with_rule(applications: Arc<AtomicUsize>) -> (PropagationEngine, RefId) {
        let mut memo = Memo::default();
        let root = memo
            .memoize_exploratory_expression(scan_op("t"), vec![])
            .unwrap()
            .reference()
            .unwrap();
        let mut registry = RuleRegistry::new();
        registry.add_rule(Box::new(ImplSortForDemand { applications }));
        (
            PropagationEngine::new(memo, Arc::new(registry), EngineConfig::default()),
            root,
        )
    }

    #[test]
    fn propagation_reaches_a_fixpoint() {
        let applications = Arc::new(AtomicUsize::new(0));
        let (mut engine, root) = engine_with_rule(Arc::clone(&applications));
        engine
            .propagate(root, [ordering_demand("a")])
            .unwrap();

        // the sorted member was added to the root reference
        let members = engine.memo.reference(root).members();
        assert_eq!(members.len(), 2);
        assert!(engine
            .memo
            .expr(members[1])
            .op
            .is_physical());
        assert!(applications.load(Ordering::SeqCst) < 10);
    }

    #[test]
    fn repeated_demand_does_not_refire_rules() {
        let applications = Arc::new(AtomicUsize::new(0));
        let (mut engine, root) = engine_with_rule(Arc::clone(&applications));
        engine.propagate(root, [ordering_demand("a")]).unwrap();
        let after_first = applications.load(Ordering::SeqCst);

        engine.propagate(root, [ordering_demand("a")]).unwrap();
        assert_eq!(applications.load(Ordering::SeqCst), after_first);
        assert_eq!(engine.memo.reference(root).members().len(), 2);
    }

    #[test]
    fn new_demand_refires_with_changed_fingerprint() {
        let applications = Arc::new(AtomicUsize::new(0));
        let (mut engine, root) = engine_with_rule(Arc::clone(&applications));
        engine.propagate(root, [ordering_demand("a")]).unwrap();
        let members_after_first = engine.memo.reference(root).members().len();

        engine.propagate(root, [ordering_demand("b")]).unwrap();
        assert!(engine.memo.reference(root).members().len() > members_after_first);
    }
}
