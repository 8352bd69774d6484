//! # Built-in Rules for the Propagation Substrate
//!
//! This crate provides the default rule set for the demand-propagation engine.
//! It is intentionally small: the substrate does not aim to define a complete
//! optimizer, only enough rules to exercise every contract it exposes.
//!
//! ## Demand-Propagation Rules (constraint-reactive)
//!
//! - **`PushOrderingThroughUnionRule`**: pushes requested orderings into union
//!   legs; the first leg receives each request in exhaustive form, the rest
//!   the original set.
//! - **`PushOrderingThroughFilterRule`**, **`PushOrderingThroughDistinctRule`**:
//!   forward requested orderings through order-preserving operators unchanged.
//!
//! ## Transformation Rules (Logical -> Logical)
//!
//! - **`MergeFiltersRule`**: collapses adjacent filters into one conjunctive
//!   filter, exercising exploratory memoization and reuse.
//!
//! ## Implementation Rules (Logical -> Physical)
//!
//! - **`ImplSeqScanRule`**: implements a scan as a sequential table scan.
//! - **`ImplSortRule`**: implements a logical sort as a physical sort operator.

pub mod impl_seq_scan;
pub mod impl_sort;
pub mod merge_filters;
pub mod push_ordering_through_distinct;
pub mod push_ordering_through_filter;
pub mod push_ordering_through_union;

use relmemo_core::rule::RuleRegistry;

/// Create a rule registry with all built-in rules, in deterministic order.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    // Demand propagation first: demands reach children before their
    // implementation rules run.
    registry.add_rule(Box::new(
        push_ordering_through_union::PushOrderingThroughUnionRule,
    ));
    registry.add_rule(Box::new(
        push_ordering_through_filter::PushOrderingThroughFilterRule,
    ));
    registry.add_rule(Box::new(
        push_ordering_through_distinct::PushOrderingThroughDistinctRule,
    ));

    // Transformation rules: expand the logical search space.
    registry.add_rule(Box::new(merge_filters::MergeFiltersRule));

    // Implementation rules: map logical operators to physical alternatives.
    registry.add_rule(Box::new(impl_seq_scan::ImplSeqScanRule));
    registry.add_rule(Box::new(impl_sort::ImplSortRule));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmemo_core::rule::RuleType;

    #[test]
    fn default_registry_groups_rules_by_type() {
        let registry = default_rule_registry();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.transformation_rules().len(), 4);
        assert_eq!(registry.implementation_rules().len(), 2);
        assert!(registry
            .transformation_rules()
            .iter()
            .all(|rule| rule.rule_type() == RuleType::Transformation));
    }
}
