//! # References and Expression Property Maps
//!
//! A [`Reference`] is the unit of sharing in the memo DAG: a named equivalence
//! class owning a set of interchangeable member expressions plus one
//! [`ExpressionPropertiesMap`] over them. A reference is exclusively owned by the
//! memo arena that created it, but may be pointed to (by id) by arbitrarily many
//! parent expressions.
//!
//! ## Lazy property computation
//!
//! Properties for member expressions are computed lazily, on first read, for two
//! reasons. First, a property that is never queried is never paid for — many
//! references are created during exploration and discarded without their
//! properties ever mattering. Second, the basic (non-type-aware) planning path
//! builds the same reference structures but lacks the type information some
//! property computations need; it must therefore never trigger computation, which
//! is why every read operation exists in a forcing and a non-forcing variant.
//!
//! The map is a two-level lazy cache: a FIFO queue of expressions whose tuples
//! have not been computed ("pending"), and a map of computed tuples. A reverse
//! index groups member expressions by their *entire* property tuple, supporting
//! partition queries used by rules whose applicability depends on joint
//! properties (e.g., "already produces one of these orderings AND is distinct").
//!
//! Forcing is orchestrated by the memo (`Memo::force_properties`), because a
//! property visitor may recurse into child references' maps and only the arena
//! can drive that post-order walk.

use crate::error::{MemoError, Result};
use crate::memo::{ExprId, RefId};
use crate::properties::{Demand, DemandKind, Property, PropertyTuple, PropertyValue};
use indexmap::{IndexMap, IndexSet};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

/// Discriminates the two specializations of a properties map.
///
/// A `General` map manages members of any operator kind. A `PlanOnly` map is the
/// specialization created by the final memoization surface: its members are all
/// physical, and only it can answer the plan-partition queries. Asking a general
/// map for plan partitions is unsupported by design, never a silent empty answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    General,
    PlanOnly,
}

/// A maximal group of a reference's members sharing one exact property tuple.
#[derive(Debug, Clone)]
pub struct ExpressionPartition {
    pub properties: PropertyTuple,
    pub members: Vec<ExprId>,
}

/// Per-reference cache mapping each member expression to its tracked property
/// values, computed lazily and grouped by identical property tuples.
#[derive(Debug)]
pub struct ExpressionPropertiesMap {
    kind: MapKind,
    /// The fixed domain of tracked properties, in tuple order.
    domain: Vec<Property>,
    /// Expressions whose properties have not been computed yet, in insertion order.
    pending: VecDeque<ExprId>,
    /// Computed property tuples, keyed by expression identity.
    computed: IndexMap<ExprId, PropertyTuple>,
    /// Reverse index: full property tuple to the members carrying it,
    /// in first-encounter order of each distinct tuple.
    grouped: IndexMap<PropertyTuple, IndexSet<ExprId>>,
}

impl ExpressionPropertiesMap {
    pub fn new(kind: MapKind, domain: Vec<Property>) -> Self {
        Self {
            kind,
            domain,
            pending: VecDeque::new(),
            computed: IndexMap::new(),
            grouped: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> MapKind {
        self.kind
    }

    pub fn domain(&self) -> &[Property] {
        &self.domain
    }

    pub fn tracks(&self, property: Property) -> bool {
        self.domain.contains(&property)
    }

    /// Enqueue an expression for lazy property computation. The expression becomes
    /// visible to partition queries only once the next forcing read drains the
    /// queue.
    pub fn add(&mut self, expr_id: ExprId) {
        self.pending.push_back(expr_id);
    }

    /// Insert an expression whose property tuple was computed elsewhere, e.g.
    /// copied from the reference it was read out of. Inserting an expression that
    /// is already present is a contract violation, not a silent no-op.
    pub fn add_with_properties(&mut self, expr_id: ExprId, tuple: PropertyTuple) -> Result<()> {
        if self.computed.contains_key(&expr_id) || self.pending.contains(&expr_id) {
            return Err(MemoError::contract(format!(
                "expression {expr_id} is already present in the properties map"
            )));
        }
        if tuple.len() != self.domain.len()
            || self.domain.iter().any(|p| tuple.get(*p).is_none())
        {
            return Err(MemoError::contract(format!(
                "precomputed property tuple for {expr_id} does not match the tracked domain"
            )));
        }
        self.insert_computed(expr_id, tuple);
        Ok(())
    }

    /// Drain the pending queue in FIFO order. The memo computes tuples for the
    /// returned ids and hands them back through [`Self::insert_computed`].
    pub(crate) fn take_pending(&mut self) -> Vec<ExprId> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn insert_computed(&mut self, expr_id: ExprId, tuple: PropertyTuple) {
        if self.computed.contains_key(&expr_id) {
            return;
        }
        self.grouped
            .entry(tuple.clone())
            .or_default()
            .insert(expr_id);
        self.computed.insert(expr_id, tuple);
    }

    /// Non-forcing read: the tuple of an expression that has already been
    /// computed, or `None` for anything still queued or unknown. This is the only
    /// read the non-type-aware planning path may use.
    pub fn current_properties(&self, expr_id: ExprId) -> Option<&PropertyTuple> {
        self.computed.get(&expr_id)
    }

    /// Whether every enqueued expression has been computed.
    pub fn is_fully_computed(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of member expressions, computed or pending.
    pub fn len(&self) -> usize {
        self.computed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value of exactly one tracked property for every computed member.
    /// Querying a property outside the tracked domain is a contract violation.
    /// Forcing variants live on the memo; this reads only what is computed.
    pub fn property_values(&self, property: Property) -> Result<IndexMap<ExprId, PropertyValue>> {
        if !self.tracks(property) {
            return Err(MemoError::contract(format!(
                "property {property:?} is outside the tracked domain {:?}",
                self.domain
            )));
        }
        self.computed
            .iter()
            .map(|(expr_id, tuple)| {
                tuple
                    .get(property)
                    .cloned()
                    .map(|value| (*expr_id, value))
                    .ok_or_else(|| {
                        MemoError::contract(format!(
                            "expression {expr_id} has no computed value for tracked property {property:?}"
                        ))
                    })
            })
            .collect()
    }

    /// Group all computed members by identical full property tuples, one
    /// partition per distinct tuple, in first-encounter order.
    pub fn partitions(&self) -> Vec<ExpressionPartition> {
        self.grouped
            .iter()
            .map(|(tuple, members)| ExpressionPartition {
                properties: tuple.clone(),
                members: members.iter().copied().collect(),
            })
            .collect()
    }

    /// Plan partitions: only a plan-only map can answer this. On a general map
    /// the query is unsupported by design.
    pub fn plan_partitions(&self) -> Result<Vec<ExpressionPartition>> {
        if self.kind != MapKind::PlanOnly {
            return Err(MemoError::Unsupported(
                "plan partitions require a plan-only properties map",
            ));
        }
        Ok(self.partitions())
    }

    /// Per-plan property values: only a plan-only map can answer this.
    pub fn property_value_for_plans(
        &self,
        property: Property,
    ) -> Result<IndexMap<ExprId, PropertyValue>> {
        if self.kind != MapKind::PlanOnly {
            return Err(MemoError::Unsupported(
                "per-plan property values require a plan-only properties map",
            ));
        }
        self.property_values(property)
    }

    /// Drop all pending, computed, and grouped state atomically.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.computed.clear();
        self.grouped.clear();
    }
}

/// A memo group: an equivalence class of interchangeable expressions, their
/// properties map, and the transient per-pass demand state.
#[derive(Debug)]
pub struct Reference {
    id: RefId,
    /// Member expressions. Append-only within the lifetime of the properties map;
    /// the only removal primitive is a wholesale clear.
    members: Vec<ExprId>,
    properties: ExpressionPropertiesMap,
    /// Demands attached to this reference during the current pass, per kind,
    /// deduplicated by value.
    demands: IndexMap<DemandKind, IndexSet<Demand>>,
}

impl Reference {
    pub(crate) fn new(id: RefId, properties: ExpressionPropertiesMap) -> Self {
        Self {
            id,
            members: Vec::new(),
            properties,
            demands: IndexMap::new(),
        }
    }

    pub fn id(&self) -> RefId {
        self.id
    }

    pub fn members(&self) -> &[ExprId] {
        &self.members
    }

    pub fn contains_member(&self, expr_id: ExprId) -> bool {
        self.members.contains(&expr_id)
    }

    pub fn properties(&self) -> &ExpressionPropertiesMap {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut ExpressionPropertiesMap {
        &mut self.properties
    }

    pub(crate) fn push_member(&mut self, expr_id: ExprId) {
        self.members.push(expr_id);
        self.properties.add(expr_id);
    }

    pub(crate) fn push_member_with_properties(
        &mut self,
        expr_id: ExprId,
        tuple: PropertyTuple,
    ) -> Result<()> {
        self.properties.add_with_properties(expr_id, tuple)?;
        self.members.push(expr_id);
        Ok(())
    }

    /// Wipe membership and all property state at once, e.g. after a destructive
    /// rewrite. Demand state is per-pass and survives only until the pass ends.
    pub fn clear(&mut self) {
        self.members.clear();
        self.properties.clear();
    }

    /// The demand set of one kind, or `None` if no demand of that kind was ever
    /// pushed. Absence is not an error: basic planning paths never push demands.
    pub fn demands(&self, kind: DemandKind) -> Option<&IndexSet<Demand>> {
        self.demands.get(&kind)
    }

    /// Merge demands into this reference's pending sets. Returns whether any
    /// demand was new; pushing an already-present demand value is a no-op and
    /// must not schedule further exploration.
    pub(crate) fn push_demands(&mut self, demands: impl IntoIterator<Item = Demand>) -> bool {
        let mut any_new = false;
        for demand in demands {
            let set = self.demands.entry(demand.kind()).or_default();
            if set.insert(demand) {
                any_new = true;
            }
        }
        any_new
    }

    /// Fingerprint of the state a propagation pass cares about: the demand sets
    /// and the membership size. Stable across runs for identical push sequences,
    /// and guaranteed to change when a new demand or member arrives, which is
    /// what bounds re-processing.
    pub fn pass_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.members.len().hash(&mut hasher);
        for (kind, set) in &self.demands {
            kind.hash(&mut hasher);
            set.len().hash(&mut hasher);
            for demand in set {
                demand.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}
