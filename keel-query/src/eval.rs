use crate::arena::{aexpr_output_name, to_aexpr, AExpr, Arena, Node};
use crate::expr::{AggFunc, BinaryOp, Expr, UnaryOp};
use crate::operators::{aggregate_groups, apply_window, group_keys, sort_indices, Groups};
use crate::plan::literal_type;
use keel_core::{Column, DataFrame, DataType, Error, ExecutionContext, Result, Scalar, Series};

/// Evaluates `expr` against `df` with the default execution context.
pub fn evaluate(expr: &Expr, df: &DataFrame) -> Result<Series> {
    evaluate_with(expr, df, &ExecutionContext::default())
}

pub fn evaluate_with(expr: &Expr, df: &DataFrame, ctx: &ExecutionContext) -> Result<Series> {
    let mut arena = Arena::new();
    let node = to_aexpr(expr, &mut arena);
    ExprEvaluator::new(&arena, ctx).evaluate(node, df)
}

/// Where aggregations reduce to.
#[derive(Clone, Copy)]
enum Scope<'g> {
    /// The whole frame: an aggregation yields one row.
    Rows,
    /// One row per group; bare columns must be group keys.
    Groups { groups: &'g Groups, keys: &'g [Series] },
}

/// Evaluates arena expressions against frames.
pub struct ExprEvaluator<'a> {
    arena: &'a Arena<AExpr>,
    ctx: &'a ExecutionContext,
}

impl<'a> ExprEvaluator<'a> {
    pub fn new(arena: &'a Arena<AExpr>, ctx: &'a ExecutionContext) -> Self {
        Self { arena, ctx }
    }

    /// Evaluates `node` row-wise. The result has the frame's height, or a
    /// single row for literals and aggregations.
    pub fn evaluate(&self, node: Node, df: &DataFrame) -> Result<Series> {
        self.eval(node, df, Scope::Rows)
    }

    fn eval(&self, node: Node, df: &DataFrame, scope: Scope<'_>) -> Result<Series> {
        match self.arena.get(node) {
            AExpr::Column(name) => match scope {
                Scope::Rows => df.column(name).cloned(),
                Scope::Groups { keys, .. } => keys.iter().find(|k| k.name() == name).cloned().ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "column '{}' must be aggregated or be a group key",
                        name
                    ))
                }),
            },
            AExpr::Literal(value) => literal_series(value),
            AExpr::Alias(input, name) => self.eval(*input, df, scope)?.rename(name.as_str()),
            AExpr::Unary { op, input } => {
                let s = self.eval(*input, df, scope)?;
                match op {
                    UnaryOp::Not => s.not(),
                    UnaryOp::Neg => s.neg(),
                    UnaryOp::IsNull => Ok(s.is_null()),
                    UnaryOp::IsNotNull => Ok(s.is_not_null()),
                }
            }
            AExpr::Binary { left, op, right } => {
                let mut l = self.eval(*left, df, scope)?;
                let mut r = self.eval(*right, df, scope)?;
                if is_null_literal(self.arena.get(*left)) {
                    l = l.cast(r.data_type())?;
                } else if is_null_literal(self.arena.get(*right)) {
                    r = r.cast(l.data_type())?;
                }
                let (l, r) = align(l, r)?;
                let out = match op {
                    BinaryOp::Arithmetic(op) => l.arithmetic(*op, &r)?,
                    BinaryOp::Comparison(op) => l.compare(*op, &r)?,
                    BinaryOp::And => l.and(&r)?,
                    BinaryOp::Or => l.or(&r)?,
                };
                out.rename(aexpr_output_name(node, self.arena))
            }
            AExpr::Agg { func, input } => match scope {
                Scope::Rows => self.reduce(*func, &self.eval(*input, df, Scope::Rows)?),
                Scope::Groups { groups, .. } => {
                    let values = broadcast(self.eval(*input, df, Scope::Rows)?, df.height())?;
                    aggregate_groups(*func, &values, groups)
                }
            },
            AExpr::Window { func, input } => match scope {
                Scope::Rows => apply_window(func, &self.eval(*input, df, scope)?),
                Scope::Groups { .. } => Err(Error::InvalidOperation(format!(
                    "window function {} is not allowed in an aggregation",
                    func
                ))),
            },
            AExpr::Cast { input, data_type } => self.eval(*input, df, scope)?.cast(*data_type),
            AExpr::FillNull { input, value } => self.eval(*input, df, scope)?.fill_null(value),
        }
    }

    /// Whole-series reduction to a single row.
    fn reduce(&self, func: AggFunc, s: &Series) -> Result<Series> {
        let ctx = self.ctx;
        let value = match func {
            AggFunc::Sum => s.sum_with(ctx)?,
            AggFunc::Mean => s.mean_with(ctx)?,
            AggFunc::Min => s.min_with(ctx)?,
            AggFunc::Max => s.max_with(ctx)?,
            AggFunc::Count => Scalar::Int64(s.count() as i64),
            AggFunc::First => s.first(),
            AggFunc::Last => s.last(),
            AggFunc::Std => s.std_with(ctx)?,
            AggFunc::Var => s.var_with(ctx)?,
            AggFunc::Median => s.median()?,
            AggFunc::Quantile(q) => s.quantile(q)?,
        };
        let data_type = match (func, s.data_type()) {
            (AggFunc::Sum, DataType::Boolean) | (AggFunc::Count, _) => DataType::Int64,
            (AggFunc::Mean | AggFunc::Std | AggFunc::Var | AggFunc::Median | AggFunc::Quantile(_), _) => {
                DataType::Float64
            }
            (_, dt) => dt,
        };
        Ok(s.with_column(Column::from_scalar(&value, data_type, 1)?))
    }

    /// Evaluates `exprs` into a new frame. Single-row results (literals,
    /// aggregations) broadcast to the frame height when any expression is
    /// row-wise, so an empty frame stays empty.
    pub fn project(&self, exprs: &[Node], df: &DataFrame) -> Result<DataFrame> {
        let columns = exprs
            .iter()
            .map(|&e| self.evaluate(e, df))
            .collect::<Result<Vec<_>>>()?;
        let height = if columns.iter().any(|s| s.len() == df.height()) {
            df.height()
        } else {
            columns.iter().map(|s| s.len()).max().unwrap_or(0)
        };
        let columns = columns
            .into_iter()
            .map(|s| broadcast(s, height))
            .collect::<Result<Vec<_>>>()?;
        DataFrame::new(columns)
    }

    pub fn with_column(&self, name: &str, expr: Node, df: &DataFrame) -> Result<DataFrame> {
        let series = broadcast(self.evaluate(expr, df)?, df.height())?;
        df.with_column(series.rename(name)?)
    }

    pub fn filter(&self, predicate: Node, df: &DataFrame) -> Result<DataFrame> {
        let mask = broadcast(self.evaluate(predicate, df)?, df.height())?;
        df.filter(&mask)
    }

    /// Groups `df` by `keys` and evaluates each of `aggs` once per group.
    /// Output columns are the keys followed by the aggregations.
    pub fn aggregate(&self, keys: &[Node], aggs: &[Node], df: &DataFrame) -> Result<DataFrame> {
        let key_series = keys
            .iter()
            .map(|&k| {
                let s = broadcast(self.evaluate(k, df)?, df.height())?;
                s.rename(aexpr_output_name(k, self.arena))
            })
            .collect::<Result<Vec<_>>>()?;
        let (groups, key_values) = group_keys(&key_series, self.ctx)?;

        let scope = Scope::Groups {
            groups: &groups,
            keys: &key_values,
        };
        let mut columns = key_values.clone();
        for &agg in aggs {
            let s = broadcast(self.eval(agg, df, scope)?, groups.len())?;
            columns.push(s.rename(aexpr_output_name(agg, self.arena))?);
        }
        DataFrame::new(columns)
    }

    pub fn sort(&self, by: &[Node], descending: &[bool], df: &DataFrame) -> Result<DataFrame> {
        let keys = by
            .iter()
            .map(|&k| broadcast(self.evaluate(k, df)?, df.height()))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Series> = keys.iter().collect();
        let indices = sort_indices(&refs, descending, self.ctx)?;
        Ok(df.take(&indices))
    }
}

fn is_null_literal(expr: &AExpr) -> bool {
    matches!(expr, AExpr::Literal(Scalar::Null))
}

fn literal_series(value: &Scalar) -> Result<Series> {
    Series::new("literal", Column::from_scalar(value, literal_type(value), 1)?)
}

/// Broadcasts a single-row operand to the other operand's length.
fn align(l: Series, r: Series) -> Result<(Series, Series)> {
    match (l.len(), r.len()) {
        (a, b) if a == b => Ok((l, r)),
        (1, b) => Ok((broadcast(l, b)?, r)),
        (a, 1) => Ok((l, broadcast(r, a)?)),
        // Mismatched lengths are reported by the series operation itself.
        _ => Ok((l, r)),
    }
}

/// Repeats a single-row series to `len` rows; other lengths must match.
fn broadcast(series: Series, len: usize) -> Result<Series> {
    match series.len() {
        n if n == len => Ok(series),
        1 => {
            let column = Column::from_scalar(&series.get(0), series.data_type(), len)?;
            Ok(series.with_column(column))
        }
        n => Err(Error::Shape(format!(
            "expression '{}' produced {} rows, expected {}",
            series.name(),
            n,
            len
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, lit_null};
    use keel_core::df;

    fn frame() -> DataFrame {
        df!(
            "a" => [1, 2, 3],
            "b" => [Some(1.0), None, Some(3.0)],
            "s" => ["x", "y", "z"],
        )
        .unwrap()
    }

    #[test]
    fn test_evaluate_names_and_types() {
        let df = frame();
        let out = evaluate(&(col("a") + col("b")), &df).unwrap();
        assert_eq!(out.name(), "a");
        assert_eq!(out.data_type(), DataType::Float64);
        assert_eq!(out.to_vec::<f64>().unwrap(), vec![Some(2.0), None, Some(6.0)]);

        let aliased = evaluate(&(lit(2) * col("a")).alias("double"), &df).unwrap();
        assert_eq!(aliased.name(), "double");
        assert_eq!(aliased.to_vec::<i64>().unwrap(), vec![Some(2), Some(4), Some(6)]);
    }

    #[test]
    fn test_evaluate_errors() {
        let df = frame();
        assert!(matches!(evaluate(&col("missing"), &df), Err(Error::ColumnNotFound(_))));
        let err = evaluate(&(col("s") + lit(1)), &df).unwrap_err();
        assert_eq!(err.kind(), keel_core::ErrorKind::Type);
    }

    #[test]
    fn test_aggregation_outside_group_is_one_row() {
        let df = frame();
        let sum = evaluate(&col("a").sum(), &df).unwrap();
        assert_eq!(sum.len(), 1);
        assert_eq!(sum.get(0), Scalar::Int64(6));
        let mean = evaluate(&col("b").mean(), &df).unwrap();
        assert_eq!(mean.get(0), Scalar::Float64(2.0));
        let count = evaluate(&col("b").count(), &df).unwrap();
        assert_eq!(count.get(0), Scalar::Int64(2));
    }

    #[test]
    fn test_null_literal_adopts_other_type() {
        let df = frame();
        let out = evaluate(&(col("s").eq(lit(Scalar::Null))), &df).unwrap();
        assert_eq!(out.data_type(), DataType::Boolean);
        assert_eq!(out.null_count(), 3);
        let typed = evaluate(&lit_null(DataType::Float64), &df).unwrap();
        assert_eq!(typed.data_type(), DataType::Float64);
    }

    #[test]
    fn test_project_broadcasts_aggregates() {
        let df = frame();
        let arena_expr = [col("a"), (col("a").sum()).alias("total")];
        let mut arena = Arena::new();
        let nodes: Vec<Node> = arena_expr.iter().map(|e| to_aexpr(e, &mut arena)).collect();
        let ctx = ExecutionContext::sequential();
        let out = ExprEvaluator::new(&arena, &ctx).project(&nodes, &df).unwrap();
        assert_eq!(out.shape(), (3, 2));
        assert_eq!(out.column("total").unwrap().to_vec::<i64>().unwrap(), vec![Some(6); 3]);
    }

    #[test]
    fn test_project_on_empty_frame_keeps_zero_rows() {
        let df = DataFrame::new(vec![Series::new("a", Vec::<i64>::new()).unwrap()]).unwrap();
        let mut arena = Arena::new();
        let nodes = [
            to_aexpr(&col("a"), &mut arena),
            to_aexpr(&col("a").sum().alias("t"), &mut arena),
            to_aexpr(&(col("a") + col("a").max()).alias("shifted"), &mut arena),
        ];
        let ctx = ExecutionContext::sequential();
        let evaluator = ExprEvaluator::new(&arena, &ctx);
        let out = evaluator.project(&nodes, &df).unwrap();
        assert_eq!(out.shape(), (0, 3));
        assert_eq!(out.column("t").unwrap().data_type(), DataType::Int64);

        // Aggregations alone still give one row.
        let totals = evaluator.project(&nodes[1..2], &df).unwrap();
        assert_eq!(totals.shape(), (1, 1));
        assert_eq!(totals.column("t").unwrap().get(0), Scalar::Int64(0));
    }

    #[test]
    fn test_literal_operands_broadcast_in_expressions() {
        let df = frame();
        let scaled = evaluate(&(lit(10) * col("a")), &df).unwrap();
        assert_eq!(scaled.to_vec::<i64>().unwrap(), vec![Some(10), Some(20), Some(30)]);
        let centered = evaluate(&(col("a") - col("a").mean()), &df).unwrap();
        assert_eq!(centered.to_vec::<f64>().unwrap(), vec![Some(-1.0), Some(0.0), Some(1.0)]);
        let mask = evaluate(&col("s").eq(lit("y")).or(lit(false)), &df).unwrap();
        assert_eq!(mask.to_vec::<bool>().unwrap(), vec![Some(false), Some(true), Some(false)]);
    }

    #[test]
    fn test_aggregate_rejects_bare_columns() {
        let df = frame();
        let mut arena = Arena::new();
        let key = to_aexpr(&col("s"), &mut arena);
        let bare = to_aexpr(&col("a"), &mut arena);
        let ctx = ExecutionContext::sequential();
        let err = ExprEvaluator::new(&arena, &ctx)
            .aggregate(&[key], &[bare], &df)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }
}
