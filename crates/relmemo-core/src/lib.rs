//! # relmemo-core: Memoization and Property-Propagation Substrate
//!
//! This crate implements the memoization core of a Cascades-style cost-based
//! query optimizer: the memo DAG of references and expressions, per-reference
//! lazy property caching and partitioning, the memoization (insert-or-reuse)
//! contract, and the demand-propagation engine that rules run on. Cost models,
//! physical execution, and the SQL front end are external collaborators.
//!
//! ## Module Overview
//!
//! - **`memo`**: The memo arena -- references, expressions, the `Memoizer`
//!   contract, and forcing property reads.
//! - **`expr`**: Expression and operator type definitions (logical, physical,
//!   scalar).
//! - **`reference`**: References (memo groups) and the per-reference
//!   `ExpressionPropertiesMap` with its partition index.
//! - **`properties`**: Tracked property definitions, property evaluation, and
//!   demand records.
//! - **`engine`**: The demand-propagation fixpoint engine.
//! - **`rule`**: The Rule trait and RuleRegistry.
//! - **`pattern`**: Declarative pattern matching for rule applicability checks.
//! - **`multigraph`**: Deterministic directed multigraph utility.
//! - **`error`**: The error taxonomy shared by all of the above.

pub mod engine;
pub mod error;
pub mod expr;
pub mod memo;
pub mod multigraph;
pub mod pattern;
pub mod properties;
pub mod reference;
pub mod rule;
