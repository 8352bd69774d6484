//! # Expression and Operator Types
//!
//! This module defines the type system for the optimizer's plan representation.
//! It is organized into three layers:
//!
//! ## Scalar Expressions (`Expr`)
//! Scalar expressions represent computations on individual rows: column references,
//! literal values, arithmetic operations, comparisons, boolean logic, and function
//! calls. They appear inside predicates, projections, and sort keys.
//!
//! ## Logical Operators (`LogicalOp`)
//! Logical operators describe *what* to compute without specifying *how*. A logical
//! `Union` says "combine these relations" but does not specify whether to use an
//! ordered merge or a rescan. Transformation rules operate on logical operators to
//! generate equivalent alternatives.
//!
//! ## Physical Operators (`PhysicalOp`)
//! Physical operators describe *how* to execute a computation. They are produced by
//! implementation rules from logical operators and are the only operator kind whose
//! references the final memoization surface accepts.
//!
//! ## Unified `Operator` Enum
//! The `Operator` enum wraps both logical and physical operators so that the memo can
//! store them uniformly. The `OpKind` discriminant allows pattern matching on operator
//! type without inspecting the operator's data fields.
//!
//! Operator nodes never store their inputs inline: children are reference ids managed
//! by the memo (`Expression` in the `memo` module), which is what makes the plan space
//! a DAG of alternating expression/reference layers.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Reference to a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that floating-point values can be used as hash
/// map keys and in Eq/Hash comparisons (needed for memo deduplication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point, wrapped in OrderedFloat for Eq/Hash support.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

/// Scalar expressions used in predicates, projections, and sort keys.
///
/// This is a recursive tree representing a single scalar computation. Expressions
/// are stored inside operator nodes (e.g., a Filter's predicate or a Sort's keys).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column by name and ordinal index.
    Column(ColumnRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Binary operation (e.g., `a + b`, `x = y`, `price > 100`).
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., `NOT flag`, `-value`, `IS NULL`).
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// Named function call (e.g., `UPPER(name)`, `ABS(value)`).
    Function { name: String, args: Vec<Expr> },
    /// Conjunction (AND) of multiple predicates. Stored as a flat list to simplify
    /// predicate decomposition (avoiding nested binary AND trees).
    And(Vec<Expr>),
    /// Disjunction (OR) of multiple predicates.
    Or(Vec<Expr>),
}

impl Expr {
    /// Flatten AND-chains: (A AND (B AND C)) → And([A, B, C]).
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Build a conjunction from the given predicates, flattening single-element lists.
    pub fn and(mut conjuncts: Vec<Expr>) -> Expr {
        if conjuncts.len() == 1 {
            conjuncts.remove(0)
        } else {
            Expr::And(conjuncts)
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Equality comparison (`=`).
    Eq,
    /// Inequality comparison (`<>` or `!=`).
    NotEq,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    LtEq,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    GtEq,
    /// Addition (`+`).
    Add,
    /// Subtraction (`-`).
    Sub,
    /// Multiplication (`*`).
    Mul,
    /// Division (`/`).
    Div,
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation (`NOT`).
    Not,
    /// Arithmetic negation (unary minus).
    Neg,
    /// Null check (`IS NULL`).
    IsNull,
    /// Non-null check (`IS NOT NULL`).
    IsNotNull,
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    /// Ascending, nulls-last sort on a bare column. The common case in fixtures
    /// and rule code.
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            expr: Expr::Column(column),
            ascending: true,
            nulls_first: false,
        }
    }

    /// Descending, nulls-last sort on a bare column.
    pub fn desc(column: ColumnRef) -> Self {
        Self {
            expr: Expr::Column(column),
            ascending: false,
            nulls_first: false,
        }
    }
}

/// Logical operators -- represent *what* to compute, not *how*.
///
/// These operators are the input to the optimizer. Transformation rules rewrite them
/// into equivalent logical alternatives, and implementation rules map them to
/// physical operators.
///
/// Children of logical operators are referenced by reference id in the memo, not
/// stored inline here. The children are managed by the `Expression` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// Table scan: reads rows from a base table with optional column pruning.
    /// Always a leaf node (no children).
    Scan {
        table: TableRef,
        columns: Vec<ColumnRef>,
    },
    /// Filter: applies a predicate to its single child, discarding non-matching rows.
    Filter { predicate: Expr },
    /// Projection: computes a set of output expressions from its child's columns.
    Project { exprs: Vec<Expr>, aliases: Vec<String> },
    /// Union: combines two or more child relations. `all` preserves duplicates
    /// (`UNION ALL`); otherwise the output is de-duplicated.
    Union { all: bool },
    /// Distinct: removes duplicate rows from its single child.
    Distinct,
    /// Sort: orders the output by the given sort keys.
    Sort { order: Vec<SortKey> },
}

/// Physical operators -- represent *how* to execute a computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    /// Sequential (full) table scan with an optional pushed-down predicate.
    SeqScan {
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    },
    /// Row-at-a-time predicate evaluation over a single child.
    FilterOp { predicate: Expr },
    /// Ordered union: merges pre-sorted children on the given comparison key and
    /// removes duplicates in the process. Requires every child sorted on `order`.
    MergeUnion { order: Vec<SortKey> },
    /// Streaming de-duplication over sorted input. Preserves the input ordering.
    StreamDistinct,
    /// Sort operator: materializes all input rows and sorts them.
    SortOp { order: Vec<SortKey> },
}

/// Unified operator enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Logical(l) => OpKind::Logical(l.kind()),
            Operator::Physical(p) => OpKind::Physical(p.kind()),
        }
    }
}

/// Kind discriminant for pattern matching (without data).
///
/// `OpKind` strips away all the fields of an operator and retains only its
/// discriminant (e.g., "this is a Union" or "this is a SortOp"). The pattern
/// matching system uses it to check rule applicability without inspecting
/// operator-specific fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOpKind {
    Scan,
    Filter,
    Project,
    Union,
    Distinct,
    Sort,
}

impl LogicalOp {
    pub fn kind(&self) -> LogicalOpKind {
        match self {
            LogicalOp::Scan { .. } => LogicalOpKind::Scan,
            LogicalOp::Filter { .. } => LogicalOpKind::Filter,
            LogicalOp::Project { .. } => LogicalOpKind::Project,
            LogicalOp::Union { .. } => LogicalOpKind::Union,
            LogicalOp::Distinct => LogicalOpKind::Distinct,
            LogicalOp::Sort { .. } => LogicalOpKind::Sort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    SeqScan,
    FilterOp,
    MergeUnion,
    StreamDistinct,
    SortOp,
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::SeqScan { .. } => PhysicalOpKind::SeqScan,
            PhysicalOp::FilterOp { .. } => PhysicalOpKind::FilterOp,
            PhysicalOp::MergeUnion { .. } => PhysicalOpKind::MergeUnion,
            PhysicalOp::StreamDistinct => PhysicalOpKind::StreamDistinct,
            PhysicalOp::SortOp { .. } => PhysicalOpKind::SortOp,
        }
    }
}
