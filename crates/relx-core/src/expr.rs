//! # Scalar Expressions and Row Types
//!
//! Scalar expressions are the row-level computations carried inside operators:
//! filter conditions, join conditions, projection lists. Columns are referenced
//! positionally (`$0`, `$1`, ...) against the operator's input row, which makes
//! rules that move predicates across operators a matter of remapping ordinals.
//!
//! ## Row Types
//!
//! Every operator node exposes a `RowType`: an ordered list of named, typed
//! fields. Two alternatives may only be registered as equivalent when their row
//! types are equal, so the row type is compared structurally (names and types).
//!
//! ## Display
//!
//! The `Display` output of an expression is part of an operator's digest, so it
//! must be deterministic and must distinguish every structurally distinct
//! expression. It follows the familiar `=($0, 'x')` prefix notation.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column data types understood by the optimizer.
///
/// Precise numeric type derivation is left to the front end; the optimizer
/// only needs enough to keep row types comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::Boolean => "BOOLEAN",
            DataType::Int64 => "BIGINT",
            DataType::Float64 => "DOUBLE",
            DataType::Utf8 => "VARCHAR",
            DataType::Date => "DATE",
        };
        f.write_str(name)
    }
}

/// A named, typed output column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields produced by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowType {
    pub fields: Vec<Field>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Concatenate two row types, as a join does.
    pub fn concat(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowType { fields }
    }

    /// Same arity and same types position by position, names ignored.
    /// Set operators only require this much of their inputs.
    pub fn is_union_compatible(&self, other: &RowType) -> bool {
        self.arity() == other.arity()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordType(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.data_type, field.name)?;
        }
        f.write_str(")")
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that literals participate in `Eq`/`Hash`,
/// which operators need for digest-based de-duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Days since 1970-01-01.
    Date(i32),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Date(_) => DataType::Date,
        }
    }
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

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{:?}", v.0),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
            ScalarValue::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

impl UnaryOp {
    fn label(&self) -> &'static str {
        match self {
            UnaryOp::Not => "NOT",
            UnaryOp::Neg => "-",
            UnaryOp::IsNull => "IS NULL",
            UnaryOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Scalar expressions used in predicates, projections and join conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Reference to the input field at this ordinal.
    InputRef(usize),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Conjunction stored flat so predicates split without re-associating.
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn col(index: usize) -> Expr {
        Expr::InputRef(index)
    }

    pub fn lit(value: ScalarValue) -> Expr {
        Expr::Literal(value)
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(ScalarValue::Int64(value))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(ScalarValue::Utf8(value.into()))
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Literal(ScalarValue::Bool(value))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Gt, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Lt, left, right)
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self, Expr::Literal(ScalarValue::Bool(true)))
    }

    /// Combine predicates with AND, flattening nested conjunctions.
    ///
    /// Returns `None` for an empty list and the predicate itself for a
    /// singleton, so callers can skip building a filter that does nothing.
    pub fn and_all(predicates: Vec<Expr>) -> Option<Expr> {
        let mut flat: Vec<Expr> = Vec::with_capacity(predicates.len());
        for p in predicates {
            match p {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::And(flat)),
        }
    }

    /// Flatten AND-chains: (A AND (B AND C)) -> [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Every input ordinal this expression reads.
    pub fn input_refs(&self) -> BTreeSet<usize> {
        let mut refs = BTreeSet::new();
        self.collect_refs(&mut refs);
        refs
    }

    pub fn max_input_ref(&self) -> Option<usize> {
        self.input_refs().into_iter().next_back()
    }

    fn collect_refs(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::InputRef(i) => {
                out.insert(*i);
            }
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_refs(out);
                right.collect_refs(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_refs(out),
            Expr::Function { args, .. } | Expr::And(args) | Expr::Or(args) => {
                for a in args {
                    a.collect_refs(out);
                }
            }
        }
    }

    /// Rewrite every input reference through `f`.
    pub fn map_inputs(&self, f: &dyn Fn(usize) -> usize) -> Expr {
        match self {
            Expr::InputRef(i) => Expr::InputRef(f(*i)),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.map_inputs(f)),
                right: Box::new(right.map_inputs(f)),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.map_inputs(f)),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_inputs(f)).collect(),
            },
            Expr::And(args) => Expr::And(args.iter().map(|a| a.map_inputs(f)).collect()),
            Expr::Or(args) => Expr::Or(args.iter().map(|a| a.map_inputs(f)).collect()),
        }
    }

    /// Result type of this expression evaluated against `input`.
    ///
    /// Out-of-range references are reported as `Null`; node constructors
    /// validate references before asking for types.
    pub fn data_type(&self, input: &RowType) -> DataType {
        match self {
            Expr::InputRef(i) => input
                .field(*i)
                .map(|f| f.data_type)
                .unwrap_or(DataType::Null),
            Expr::Literal(v) => v.data_type(),
            Expr::BinaryOp { op, left, right } => {
                if op.is_comparison() {
                    DataType::Boolean
                } else {
                    match (left.data_type(input), right.data_type(input)) {
                        (DataType::Float64, _) | (_, DataType::Float64) => DataType::Float64,
                        (l, _) => l,
                    }
                }
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Neg => operand.data_type(input),
                _ => DataType::Boolean,
            },
            Expr::Function { args, .. } => args
                .first()
                .map(|a| a.data_type(input))
                .unwrap_or(DataType::Null),
            Expr::And(_) | Expr::Or(_) => DataType::Boolean,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::InputRef(i) => write!(f, "${i}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::BinaryOp { op, left, right } => {
                write!(f, "{}({left}, {right})", op.symbol())
            }
            Expr::UnaryOp { op, operand } => write!(f, "{}({operand})", op.label()),
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::And(args) => {
                f.write_str("AND(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Or(args) => {
                f.write_str("OR(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
        }
    }
}

/// SQL join types.
///
/// Only inner joins are freely commutative; the outer and semi variants have
/// fixed left/right semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with at least one match; produces only left columns.
    Semi,
    /// Left rows with no match; produces only left columns.
    Anti,
}

impl JoinType {
    /// Whether the join output includes the right input's columns.
    pub fn projects_right(&self) -> bool {
        !matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Count,
    Sum,
    /// SUM that yields 0 instead of NULL over no rows.
    Sum0,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Sum0 => "$SUM0",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        };
        f.write_str(name)
    }
}

/// One aggregate function call inside an Aggregate operator.
///
/// Arguments are input ordinals, like the group set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggCall {
    pub func: AggFunc,
    #[serde(default)]
    pub args: Vec<usize>,
    #[serde(default)]
    pub distinct: bool,
    pub name: String,
}

impl AggCall {
    pub fn new(func: AggFunc, args: Vec<usize>, name: impl Into<String>) -> Self {
        Self {
            func,
            args,
            distinct: false,
            name: name.into(),
        }
    }

    pub fn count_star(name: impl Into<String>) -> Self {
        Self::new(AggFunc::Count, vec![], name)
    }

    pub fn data_type(&self, input: &RowType) -> DataType {
        match self.func {
            AggFunc::Count => DataType::Int64,
            AggFunc::Avg => DataType::Float64,
            AggFunc::Sum0 => self
                .args
                .first()
                .and_then(|i| input.field(*i))
                .map_or(DataType::Int64, |f| f.data_type),
            AggFunc::Sum | AggFunc::Min | AggFunc::Max => self
                .args
                .first()
                .and_then(|i| input.field(*i))
                .map(|f| f.data_type)
                .unwrap_or(DataType::Null),
        }
    }
}

impl fmt::Display for AggCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${arg}")?;
        }
        f.write_str(")")
    }
}
