use crate::arena::{aexpr_output_name, to_aexpr, to_expr, AExpr, Arena, Node};
use crate::expr::{AggFunc, BinaryOp, Expr, UnaryOp, WindowFunc};
use keel_core::{DataFrame, DataType, Error, Field, Result, Scalar, Schema, SchemaRef, VectorizedOps};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Relational operator. Inputs and expressions are arena nodes.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// In-memory source. `projection` and `predicate` are hints filled in by
    /// the optimizer: only the named columns and matching rows are produced.
    Scan {
        df: Arc<DataFrame>,
        projection: Option<Vec<String>>,
        predicate: Option<Node>,
    },
    Filter {
        input: Node,
        predicate: Node,
    },
    Project {
        input: Node,
        exprs: Vec<Node>,
    },
    WithColumn {
        input: Node,
        name: String,
        expr: Node,
    },
    Aggregate {
        input: Node,
        keys: Vec<Node>,
        aggs: Vec<Node>,
    },
    Join {
        left: Node,
        right: Node,
        left_on: Vec<String>,
        right_on: Vec<String>,
        kind: JoinKind,
        suffix: String,
    },
    Sort {
        input: Node,
        by: Vec<Node>,
        descending: Vec<bool>,
    },
    Limit {
        input: Node,
        n: usize,
    },
    /// Last `n` rows.
    Tail {
        input: Node,
        n: usize,
    },
    /// Drops repeated rows, keeping the first occurrence of each.
    Distinct {
        input: Node,
    },
}

impl PlanNode {
    pub fn inputs(&self) -> Vec<Node> {
        match self {
            PlanNode::Scan { .. } => vec![],
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::WithColumn { input, .. }
            | PlanNode::Aggregate { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Limit { input, .. }
            | PlanNode::Tail { input, .. }
            | PlanNode::Distinct { input } => vec![*input],
            PlanNode::Join { left, right, .. } => vec![*left, *right],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlanNode::Scan { .. } => "Scan",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Project { .. } => "Project",
            PlanNode::WithColumn { .. } => "WithColumn",
            PlanNode::Aggregate { .. } => "Aggregate",
            PlanNode::Join { .. } => "Join",
            PlanNode::Sort { .. } => "Sort",
            PlanNode::Limit { .. } => "Limit",
            PlanNode::Tail { .. } => "Tail",
            PlanNode::Distinct { .. } => "Distinct",
        }
    }

    fn shift(&mut self, plan_offset: usize, expr_offset: usize) {
        let shift_all = |nodes: &mut Vec<Node>| nodes.iter_mut().for_each(|n| n.0 += expr_offset);
        match self {
            PlanNode::Scan { predicate, .. } => {
                if let Some(p) = predicate {
                    p.0 += expr_offset;
                }
            }
            PlanNode::Filter { input, predicate } => {
                input.0 += plan_offset;
                predicate.0 += expr_offset;
            }
            PlanNode::Project { input, exprs } => {
                input.0 += plan_offset;
                shift_all(exprs);
            }
            PlanNode::WithColumn { input, expr, .. } => {
                input.0 += plan_offset;
                expr.0 += expr_offset;
            }
            PlanNode::Aggregate { input, keys, aggs } => {
                input.0 += plan_offset;
                shift_all(keys);
                shift_all(aggs);
            }
            PlanNode::Join { left, right, .. } => {
                left.0 += plan_offset;
                right.0 += plan_offset;
            }
            PlanNode::Sort { input, by, .. } => {
                input.0 += plan_offset;
                shift_all(by);
            }
            PlanNode::Limit { input, .. } | PlanNode::Tail { input, .. } | PlanNode::Distinct { input } => {
                input.0 += plan_offset
            }
        }
    }
}

/// A query: operator and expression arenas plus the root operator.
///
/// Cloning copies the two flat arenas; the scanned frames are shared.
#[derive(Debug, Clone)]
pub struct LogicalPlan {
    pub lp_arena: Arena<PlanNode>,
    pub expr_arena: Arena<AExpr>,
    pub root: Node,
}

impl LogicalPlan {
    pub fn scan(df: Arc<DataFrame>) -> Self {
        let mut lp_arena = Arena::new();
        let root = lp_arena.add(PlanNode::Scan {
            df,
            projection: None,
            predicate: None,
        });
        Self {
            lp_arena,
            expr_arena: Arena::new(),
            root,
        }
    }

    pub fn add_expr(&mut self, expr: &Expr) -> Node {
        to_aexpr(expr, &mut self.expr_arena)
    }

    /// Copy of this plan with `build(root, plan)` as the new root.
    pub fn with_root<F>(&self, build: F) -> LogicalPlan
    where
        F: FnOnce(Node, &mut LogicalPlan) -> PlanNode,
    {
        let mut plan = self.clone();
        let node = build(plan.root, &mut plan);
        plan.root = plan.lp_arena.add(node);
        plan
    }

    /// Copies `other` into this plan's arenas, returning `other`'s root in
    /// the combined arena.
    pub fn merge(&mut self, other: &LogicalPlan) -> Node {
        let expr_offset = self.expr_arena.append(&other.expr_arena, |e, off| e.shift(off));
        let plan_offset = self
            .lp_arena
            .append(&other.lp_arena, |p, off| p.shift(off, expr_offset));
        Node(other.root.0 + plan_offset)
    }

    pub fn schema(&self) -> Result<SchemaRef> {
        self.node_schema(self.root)
    }

    /// Output schema of `node`, derived without executing anything.
    pub fn node_schema(&self, node: Node) -> Result<SchemaRef> {
        match self.lp_arena.get(node) {
            PlanNode::Scan { df, projection, .. } => {
                let schema = df.schema();
                match projection {
                    None => Ok(schema),
                    Some(cols) => Ok(Arc::new(Schema::new(
                        schema
                            .fields
                            .iter()
                            .filter(|f| cols.contains(&f.name))
                            .cloned()
                            .collect(),
                    ))),
                }
            }
            PlanNode::Filter { input, predicate } => {
                let input_schema = self.node_schema(*input)?;
                let field = expr_field(*predicate, &self.expr_arena, &input_schema)?;
                if field.data_type != DataType::Boolean {
                    return Err(Error::data_type(DataType::Boolean, field.data_type));
                }
                Ok(input_schema)
            }
            PlanNode::Sort { input, by, .. } => {
                let input_schema = self.node_schema(*input)?;
                for key in by {
                    expr_field(*key, &self.expr_arena, &input_schema)?;
                }
                Ok(input_schema)
            }
            PlanNode::Limit { input, .. } | PlanNode::Tail { input, .. } | PlanNode::Distinct { input } => {
                self.node_schema(*input)
            }
            PlanNode::Project { input, exprs } => {
                let input_schema = self.node_schema(*input)?;
                let fields = exprs
                    .iter()
                    .map(|e| expr_field(*e, &self.expr_arena, &input_schema))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(Schema::try_new(fields)?))
            }
            PlanNode::WithColumn { input, name, expr } => {
                let input_schema = self.node_schema(*input)?;
                let mut field = expr_field(*expr, &self.expr_arena, &input_schema)?;
                field.name = name.clone();
                Ok(Arc::new(input_schema.with_field(field)))
            }
            PlanNode::Aggregate { input, keys, aggs } => {
                let input_schema = self.node_schema(*input)?;
                let fields = keys
                    .iter()
                    .chain(aggs.iter())
                    .map(|e| expr_field(*e, &self.expr_arena, &input_schema))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(Schema::try_new(fields)?))
            }
            PlanNode::Join {
                left,
                right,
                left_on,
                right_on,
                kind,
                suffix,
            } => {
                let left_schema = self.node_schema(*left)?;
                let right_schema = self.node_schema(*right)?;
                join_schema(&left_schema, &right_schema, left_on, right_on, *kind, suffix)
            }
        }
    }

    /// Renders the plan as an indented tree, root first.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_node(self.root, 0, &mut out);
        out
    }

    fn fmt_expr(&self, node: Node) -> String {
        to_expr(node, &self.expr_arena).to_string()
    }

    fn fmt_exprs(&self, nodes: &[Node]) -> String {
        nodes
            .iter()
            .map(|n| self.fmt_expr(*n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn explain_node(&self, node: Node, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let plan_node = self.lp_arena.get(node);
        let _ = match plan_node {
            PlanNode::Scan {
                df,
                projection,
                predicate,
            } => {
                let mut line = format!("Scan [{} rows x {} cols]", df.height(), df.width());
                if let Some(cols) = projection {
                    let _ = write!(line, " projection=[{}]", cols.join(", "));
                }
                if let Some(p) = predicate {
                    let _ = write!(line, " predicate={}", self.fmt_expr(*p));
                }
                writeln!(out, "{}{}", pad, line)
            }
            PlanNode::Filter { predicate, .. } => {
                writeln!(out, "{}Filter {}", pad, self.fmt_expr(*predicate))
            }
            PlanNode::Project { exprs, .. } => {
                writeln!(out, "{}Project [{}]", pad, self.fmt_exprs(exprs))
            }
            PlanNode::WithColumn { name, expr, .. } => {
                writeln!(out, "{}WithColumn {:?} = {}", pad, name, self.fmt_expr(*expr))
            }
            PlanNode::Aggregate { keys, aggs, .. } => writeln!(
                out,
                "{}Aggregate keys=[{}] aggs=[{}]",
                pad,
                self.fmt_exprs(keys),
                self.fmt_exprs(aggs)
            ),
            PlanNode::Join {
                left_on,
                right_on,
                kind,
                ..
            } => writeln!(
                out,
                "{}Join {:?} left_on=[{}] right_on=[{}]",
                pad,
                kind,
                left_on.join(", "),
                right_on.join(", ")
            ),
            PlanNode::Sort { by, descending, .. } => {
                let keys: Vec<String> = by
                    .iter()
                    .zip(descending)
                    .map(|(b, d)| {
                        format!("{} {}", self.fmt_expr(*b), if *d { "desc" } else { "asc" })
                    })
                    .collect();
                writeln!(out, "{}Sort by=[{}]", pad, keys.join(", "))
            }
            PlanNode::Limit { n, .. } => writeln!(out, "{}Limit {}", pad, n),
            PlanNode::Tail { n, .. } => writeln!(out, "{}Tail {}", pad, n),
            PlanNode::Distinct { .. } => writeln!(out, "{}Distinct", pad),
        };
        for input in plan_node.inputs() {
            self.explain_node(input, depth + 1, out);
        }
    }
}

/// Output schema of a join: left columns, then right columns except keys
/// that share their left key's name. Right names that collide with a left
/// name get `suffix`.
pub fn join_schema(
    left: &Schema,
    right: &Schema,
    left_on: &[String],
    right_on: &[String],
    kind: JoinKind,
    suffix: &str,
) -> Result<SchemaRef> {
    validate_join_keys(left, right, left_on, right_on)?;
    let mut fields = left.fields.clone();
    for (name, out_name) in join_right_columns(left, right, left_on, right_on, suffix) {
        let mut field = right.try_field(&name)?.clone();
        field.name = out_name;
        if kind == JoinKind::Left {
            field.nullable = true;
        }
        fields.push(field);
    }
    Ok(Arc::new(Schema::try_new(fields)?))
}

/// `(right name, output name)` for each right column kept by a join.
pub fn join_right_columns(
    left: &Schema,
    right: &Schema,
    left_on: &[String],
    right_on: &[String],
    suffix: &str,
) -> Vec<(String, String)> {
    let shared_keys: HashSet<&str> = left_on
        .iter()
        .zip(right_on)
        .filter(|(l, r)| l == r)
        .map(|(_, r)| r.as_str())
        .collect();
    right
        .names()
        .filter(|name| !shared_keys.contains(name))
        .map(|name| {
            let out = if left.contains(name) {
                format!("{}{}", name, suffix)
            } else {
                name.to_string()
            };
            (name.to_string(), out)
        })
        .collect()
}

pub fn validate_join_keys(
    left: &Schema,
    right: &Schema,
    left_on: &[String],
    right_on: &[String],
) -> Result<()> {
    if left_on.is_empty() {
        return Err(Error::Shape("join requires at least one key column".to_string()));
    }
    if left_on.len() != right_on.len() {
        return Err(Error::Shape(format!(
            "join has {} left keys but {} right keys",
            left_on.len(),
            right_on.len()
        )));
    }
    for (l, r) in left_on.iter().zip(right_on) {
        let lt = left.try_field(l)?.data_type;
        let rt = right.try_field(r)?.data_type;
        if lt != rt {
            return Err(Error::Type(format!(
                "join key '{}' is {} but '{}' is {}",
                l, lt, r, rt
            )));
        }
    }
    Ok(())
}

/// Infers the output field of an expression against `schema`.
pub fn expr_field(node: Node, arena: &Arena<AExpr>, schema: &Schema) -> Result<Field> {
    let name = aexpr_output_name(node, arena);
    let data_type = expr_type(node, arena, schema)?;
    Ok(Field::new(name, data_type))
}

fn expr_type(node: Node, arena: &Arena<AExpr>, schema: &Schema) -> Result<DataType> {
    let ty = |n: Node| expr_type(n, arena, schema);
    match arena.get(node) {
        AExpr::Column(name) => Ok(schema.try_field(name)?.data_type),
        AExpr::Literal(value) => Ok(literal_type(value)),
        AExpr::Alias(input, _) | AExpr::FillNull { input, .. } => ty(*input),
        AExpr::Cast { data_type, .. } => Ok(*data_type),
        AExpr::Unary { op, input } => {
            let input_type = ty(*input)?;
            match op {
                UnaryOp::Not if input_type != DataType::Boolean => {
                    Err(Error::data_type(DataType::Boolean, input_type))
                }
                UnaryOp::Neg if !input_type.is_numeric() => Err(Error::Type(format!(
                    "cannot negate {}",
                    input_type
                ))),
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(DataType::Boolean),
                UnaryOp::Neg => Ok(input_type),
            }
        }
        AExpr::Binary { left, op, right } => {
            let (l, r) = (ty(*left)?, ty(*right)?);
            let (l, r) = adapt_null_literals(*left, l, *right, r, arena);
            match op {
                BinaryOp::Arithmetic(op) => {
                    let supertype = l.numeric_supertype(&r).ok_or_else(|| {
                        Error::Type(format!("cannot apply '{}' to {} and {}", op, l, r))
                    })?;
                    Ok(match op {
                        keel_core::ArithmeticOp::Div => DataType::Float64,
                        _ => supertype,
                    })
                }
                BinaryOp::Comparison(_) => l
                    .comparison_supertype(&r)
                    .map(|_| DataType::Boolean)
                    .ok_or_else(|| Error::Type(format!("cannot compare {} with {}", l, r))),
                BinaryOp::And | BinaryOp::Or => {
                    if l != DataType::Boolean {
                        Err(Error::data_type(DataType::Boolean, l))
                    } else if r != DataType::Boolean {
                        Err(Error::data_type(DataType::Boolean, r))
                    } else {
                        Ok(DataType::Boolean)
                    }
                }
            }
        }
        AExpr::Agg { func, input } => {
            let input_type = ty(*input)?;
            match func {
                AggFunc::Sum => sum_type(input_type),
                AggFunc::Mean if input_type == DataType::Utf8 => {
                    Err(Error::Type("cannot take mean of Utf8".to_string()))
                }
                AggFunc::Std | AggFunc::Var if !input_type.is_numeric() => Err(Error::Type(format!(
                    "cannot take {} of {}",
                    func.name(),
                    input_type
                ))),
                AggFunc::Median | AggFunc::Quantile(_) if !input_type.is_numeric() => Err(Error::Type(format!(
                    "cannot take {} of {}",
                    func.name(),
                    input_type
                ))),
                AggFunc::Quantile(q) => VectorizedOps::check_quantile(*q).map(|_| DataType::Float64),
                AggFunc::Mean | AggFunc::Std | AggFunc::Var | AggFunc::Median => Ok(DataType::Float64),
                AggFunc::Count => Ok(DataType::Int64),
                AggFunc::Min | AggFunc::Max | AggFunc::First | AggFunc::Last => Ok(input_type),
            }
        }
        AExpr::Window { func, input } => {
            let input_type = ty(*input)?;
            match func {
                WindowFunc::Lag { .. }
                | WindowFunc::Lead { .. }
                | WindowFunc::CumMin
                | WindowFunc::CumMax
                | WindowFunc::RollingMin { .. }
                | WindowFunc::RollingMax { .. } => Ok(input_type),
                WindowFunc::Diff { .. } => {
                    if input_type.is_numeric() {
                        Ok(input_type)
                    } else {
                        Err(Error::Type(format!("cannot diff {}", input_type)))
                    }
                }
                WindowFunc::CumSum | WindowFunc::RollingSum { .. } => sum_type(input_type),
                WindowFunc::PctChange | WindowFunc::RollingMean { .. } => {
                    if input_type.is_numeric() {
                        Ok(DataType::Float64)
                    } else {
                        Err(Error::Type(format!("{} requires a numeric input", func)))
                    }
                }
            }
        }
    }
}

/// Untyped null literals take the type of the other operand.
pub(crate) fn adapt_null_literals(
    left: Node,
    left_type: DataType,
    right: Node,
    right_type: DataType,
    arena: &Arena<AExpr>,
) -> (DataType, DataType) {
    let is_null_lit = |n: Node| matches!(arena.get(n), AExpr::Literal(Scalar::Null));
    match (is_null_lit(left), is_null_lit(right)) {
        (true, false) => (right_type, right_type),
        (false, true) => (left_type, left_type),
        _ => (left_type, right_type),
    }
}

/// Type of an untyped literal; a bare null is treated as Int64.
pub(crate) fn literal_type(value: &Scalar) -> DataType {
    value.data_type().unwrap_or(DataType::Int64)
}

fn sum_type(input: DataType) -> Result<DataType> {
    match input {
        DataType::Int64 | DataType::Boolean => Ok(DataType::Int64),
        DataType::Float32 | DataType::Float64 => Ok(input),
        DataType::Utf8 => Err(Error::Type("cannot sum Utf8".to_string())),
    }
}
