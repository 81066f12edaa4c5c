use crate::executor::{DefaultQueryExecutor, QueryExecutor};
use crate::expr::{col, Expr};
use crate::optimizer::QueryOptimizer;
use crate::plan::{JoinKind, LogicalPlan, PlanNode};
use keel_core::{DataFrame, EngineConfig, ExecutionConfig, ExecutionContext, Result, SchemaRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info_span};

/// A deferred query. Every builder call returns a new frame and leaves the
/// receiver untouched, so one frame may be extended or collected many times.
#[derive(Debug, Clone)]
pub struct LazyFrame {
    plan: LogicalPlan,
    config: EngineConfig,
}

pub trait IntoLazy {
    fn lazy(self) -> LazyFrame;
}

impl IntoLazy for DataFrame {
    fn lazy(self) -> LazyFrame {
        LazyFrame::new(self)
    }
}

impl IntoLazy for Arc<DataFrame> {
    fn lazy(self) -> LazyFrame {
        LazyFrame::from_plan(LogicalPlan::scan(self))
    }
}

impl LazyFrame {
    pub fn new(df: DataFrame) -> Self {
        Self::from_plan(LogicalPlan::scan(Arc::new(df)))
    }

    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self {
            plan,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The unoptimized plan built so far.
    pub fn logical_plan(&self) -> &LogicalPlan {
        &self.plan
    }

    fn derive<F>(&self, build: F) -> LazyFrame
    where
        F: FnOnce(crate::arena::Node, &mut LogicalPlan) -> PlanNode,
    {
        LazyFrame {
            plan: self.plan.with_root(build),
            config: self.config.clone(),
        }
    }

    /// Keeps rows where `predicate` is true. Null results drop the row.
    pub fn filter(&self, predicate: Expr) -> LazyFrame {
        self.derive(|input, plan| PlanNode::Filter {
            input,
            predicate: plan.add_expr(&predicate),
        })
    }

    pub fn select<I>(&self, exprs: I) -> LazyFrame
    where
        I: IntoIterator<Item = Expr>,
    {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        self.derive(|input, plan| PlanNode::Project {
            input,
            exprs: exprs.iter().map(|e| plan.add_expr(e)).collect(),
        })
    }

    /// Adds or replaces the column `name`.
    pub fn with_column(&self, name: &str, expr: Expr) -> LazyFrame {
        self.derive(|input, plan| PlanNode::WithColumn {
            input,
            name: name.to_string(),
            expr: plan.add_expr(&expr),
        })
    }

    pub fn group_by<I>(&self, keys: I) -> LazyGroupBy
    where
        I: IntoIterator<Item = Expr>,
    {
        LazyGroupBy {
            frame: self.clone(),
            keys: keys.into_iter().collect(),
        }
    }

    /// Equality join with `other` as the build side.
    pub fn join(&self, other: LazyFrame, spec: JoinSpec) -> LazyFrame {
        let suffix = spec.suffix.unwrap_or_else(|| self.config.join.suffix.clone());
        let mut plan = self.plan.clone();
        let left = plan.root;
        let right = plan.merge(&other.plan);
        let root = plan.lp_arena.add(PlanNode::Join {
            left,
            right,
            left_on: spec.left_on,
            right_on: spec.right_on,
            kind: spec.kind,
            suffix,
        });
        plan.root = root;
        LazyFrame {
            plan,
            config: self.config.clone(),
        }
    }

    pub fn sort(&self, by: &str, descending: bool) -> LazyFrame {
        self.sort_by(vec![col(by)], vec![descending])
    }

    /// Stable multi-key sort; nulls sort last in either direction.
    pub fn sort_by(&self, by: Vec<Expr>, descending: Vec<bool>) -> LazyFrame {
        self.derive(|input, plan| PlanNode::Sort {
            input,
            by: by.iter().map(|e| plan.add_expr(e)).collect(),
            descending,
        })
    }

    pub fn limit(&self, n: usize) -> LazyFrame {
        self.derive(|input, _| PlanNode::Limit { input, n })
    }

    pub fn tail(&self, n: usize) -> LazyFrame {
        self.derive(|input, _| PlanNode::Tail { input, n })
    }

    /// Drops repeated rows, keeping the first occurrence. Nulls compare equal.
    pub fn distinct(&self) -> LazyFrame {
        self.derive(|input, _| PlanNode::Distinct { input })
    }

    /// Output schema, derived without executing anything.
    pub fn schema(&self) -> Result<SchemaRef> {
        self.plan.schema()
    }

    pub fn optimize(&self) -> Result<LogicalPlan> {
        QueryOptimizer::new(self.config.optimizer.clone()).optimize(&self.plan)
    }

    pub fn explain(&self, optimized: bool) -> Result<String> {
        if optimized {
            Ok(self.optimize()?.explain())
        } else {
            self.plan.schema()?;
            Ok(self.plan.explain())
        }
    }

    /// Optimizes and runs the plan on a context built from this frame's
    /// execution config.
    pub fn collect(&self) -> Result<DataFrame> {
        let ctx = if self.config.execution == ExecutionConfig::default() {
            ExecutionContext::default()
        } else {
            ExecutionContext::new(&self.config.execution)?
        };
        self.collect_with(&ctx)
    }

    pub fn collect_with(&self, ctx: &ExecutionContext) -> Result<DataFrame> {
        let span = info_span!("collect", workers = ctx.max_workers());
        let _guard = span.enter();
        let plan = self.optimize()?;
        debug!(plan = %plan.explain(), "optimized plan");
        DefaultQueryExecutor::new(ctx.clone()).execute(&plan)
    }
}

/// A pending grouped aggregation; finish it with [`LazyGroupBy::agg`].
#[derive(Debug, Clone)]
pub struct LazyGroupBy {
    frame: LazyFrame,
    keys: Vec<Expr>,
}

impl LazyGroupBy {
    /// One output row per distinct key, in first-occurrence order. Columns
    /// are the keys followed by `aggs`.
    pub fn agg<I>(self, aggs: I) -> LazyFrame
    where
        I: IntoIterator<Item = Expr>,
    {
        let aggs: Vec<Expr> = aggs.into_iter().collect();
        let keys = self.keys;
        self.frame.derive(|input, plan| PlanNode::Aggregate {
            input,
            keys: keys.iter().map(|k| plan.add_expr(k)).collect(),
            aggs: aggs.iter().map(|a| plan.add_expr(a)).collect(),
        })
    }
}

/// Key mapping and options of a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub kind: JoinKind,
    /// Overrides the configured suffix for colliding right columns.
    pub suffix: Option<String>,
}

fn names<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter().map(|k| k.as_ref().to_string()).collect()
}

impl JoinSpec {
    /// Same key names on both sides; inner join.
    pub fn on<S: AsRef<str>>(keys: &[S]) -> Self {
        let keys = names(keys);
        Self {
            left_on: keys.clone(),
            right_on: keys,
            kind: JoinKind::Inner,
            suffix: None,
        }
    }

    pub fn left_on<S: AsRef<str>>(keys: &[S]) -> Self {
        Self {
            left_on: names(keys),
            right_on: Vec::new(),
            kind: JoinKind::Inner,
            suffix: None,
        }
    }

    pub fn right_on<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.right_on = names(keys);
        self
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }
}

/// Eager operations. Each call runs a one-operator plan over a scan of the
/// frame, so eager and lazy results agree.
pub trait DataFrameExt {
    fn filter_by(&self, predicate: Expr) -> Result<DataFrame>;
    fn select_exprs<I: IntoIterator<Item = Expr>>(&self, exprs: I) -> Result<DataFrame>;
    fn with_column_expr(&self, name: &str, expr: Expr) -> Result<DataFrame>;
    fn group_by_agg<K, A>(&self, keys: K, aggs: A) -> Result<DataFrame>
    where
        K: IntoIterator<Item = Expr>,
        A: IntoIterator<Item = Expr>;
    fn join(&self, other: &DataFrame, spec: JoinSpec) -> Result<DataFrame>;
    fn sort_by(&self, by: &[&str], descending: &[bool]) -> Result<DataFrame>;
    fn distinct(&self) -> Result<DataFrame>;
}

impl DataFrameExt for DataFrame {
    fn filter_by(&self, predicate: Expr) -> Result<DataFrame> {
        self.clone().lazy().filter(predicate).collect()
    }

    fn select_exprs<I: IntoIterator<Item = Expr>>(&self, exprs: I) -> Result<DataFrame> {
        self.clone().lazy().select(exprs).collect()
    }

    fn with_column_expr(&self, name: &str, expr: Expr) -> Result<DataFrame> {
        self.clone().lazy().with_column(name, expr).collect()
    }

    fn group_by_agg<K, A>(&self, keys: K, aggs: A) -> Result<DataFrame>
    where
        K: IntoIterator<Item = Expr>,
        A: IntoIterator<Item = Expr>,
    {
        self.clone().lazy().group_by(keys).agg(aggs).collect()
    }

    fn join(&self, other: &DataFrame, spec: JoinSpec) -> Result<DataFrame> {
        self.clone().lazy().join(other.clone().lazy(), spec).collect()
    }

    fn sort_by(&self, by: &[&str], descending: &[bool]) -> Result<DataFrame> {
        self.clone()
            .lazy()
            .sort_by(by.iter().map(|name| col(*name)).collect(), descending.to_vec())
            .collect()
    }

    fn distinct(&self) -> Result<DataFrame> {
        self.clone().lazy().distinct().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lit;
    use keel_core::{df, DataType, Error, Scalar};

    fn sales() -> DataFrame {
        df!(
            "region" => ["east", "west", "east", "north", "west"],
            "units" => [10, 4, 6, 1, 8],
            "price" => [2.5, 3.0, 2.0, 10.0, 1.5],
        )
        .unwrap()
    }

    #[test]
    fn test_builders_do_not_execute_or_mutate() {
        let base = sales().lazy();
        let filtered = base.filter(col("units").gt(lit(5)));
        assert_eq!(base.collect().unwrap().height(), 5);
        assert_eq!(filtered.collect().unwrap().height(), 3);
        // Collecting twice gives the same answer.
        assert_eq!(filtered.collect().unwrap(), filtered.collect().unwrap());
    }

    #[test]
    fn test_chain_with_group_by_and_sort() {
        let out = sales()
            .lazy()
            .with_column("revenue", col("units") * col("price"))
            .filter(col("revenue").gt_eq(lit(10.0)))
            .group_by([col("region")])
            .agg([col("revenue").sum().alias("total"), col("units").count().alias("n")])
            .sort("total", true)
            .collect()
            .unwrap();
        assert_eq!(out.column_names(), vec!["region", "total", "n"]);
        assert_eq!(out.get_row(0).unwrap(), vec![Scalar::from("east"), Scalar::Float64(37.0), Scalar::Int64(2)]);
        assert_eq!(out.get_row(1).unwrap()[0], Scalar::from("west"));
        assert_eq!(out.get_row(2).unwrap()[0], Scalar::from("north"));
    }

    #[test]
    fn test_schema_without_execution() {
        let lf = sales()
            .lazy()
            .group_by([col("region")])
            .agg([col("price").mean()]);
        let schema = lf.schema().unwrap();
        assert_eq!(schema.try_field("price").unwrap().data_type, DataType::Float64);

        let bad = sales().lazy().select([col("nope")]);
        assert!(matches!(bad.collect(), Err(Error::ColumnNotFound(_))));
    }

    #[test]
    fn test_join_spec_and_suffix() {
        let left = df!("id" => [1, 2, 3], "v" => [1, 2, 3]).unwrap();
        let right = df!("key" => [2, 3], "v" => [20, 30]).unwrap();
        let out = left
            .join(&right, JoinSpec::left_on(&["id"]).right_on(&["key"]).kind(JoinKind::Left).suffix("_r"))
            .unwrap();
        assert_eq!(out.column_names(), vec!["id", "v", "key", "v_r"]);
        assert_eq!(out.column("v_r").unwrap().get(0), Scalar::Null);

        let config = EngineConfig {
            join: keel_core::JoinConfig {
                suffix: "_other".to_string(),
            },
            ..EngineConfig::default()
        };
        let renamed = df!("id" => [1], "v" => [1])
            .unwrap()
            .lazy()
            .with_config(config)
            .join(df!("id" => [1], "v" => [9]).unwrap().lazy(), JoinSpec::on(&["id"]))
            .collect()
            .unwrap();
        assert_eq!(renamed.column_names(), vec!["id", "v", "v_other"]);
    }

    #[test]
    fn test_eager_matches_lazy() {
        let df = sales();
        let eager = df.filter_by(col("price").lt(lit(3.0))).unwrap();
        let lazy = df.clone().lazy().filter(col("price").lt(lit(3.0))).collect().unwrap();
        assert_eq!(eager, lazy);

        let sorted = df.sort_by(&["region", "units"], &[false, true]).unwrap();
        assert_eq!(
            sorted.column("units").unwrap().to_vec::<i64>().unwrap(),
            vec![Some(10), Some(6), Some(1), Some(8), Some(4)]
        );
    }

    #[test]
    fn test_explain_optimized() {
        let lf = sales()
            .lazy()
            .filter(col("units").gt(lit(2)))
            .select([col("region")]);
        let plain = lf.explain(false).unwrap();
        assert!(plain.starts_with("Project [col(\"region\")]\n  Filter"));
        let optimized = lf.explain(true).unwrap();
        assert_eq!(
            optimized,
            "Project [col(\"region\")]\n  Scan [5 rows x 3 cols] projection=[region] predicate=(col(\"units\") > 2)\n"
        );
    }

    #[test]
    fn test_distinct_then_tail() {
        let df = df!(
            "region" => ["east", "west", "east", "west", "north"],
            "units" => [Some(1), None, Some(1), None, Some(2)],
        )
        .unwrap();
        let lf = df.clone().lazy().distinct();
        let out = lf.collect().unwrap();
        assert_eq!(out.height(), 3);
        assert_eq!(out, DataFrameExt::distinct(&df).unwrap());

        let last = lf.tail(2).collect().unwrap();
        let region = last.column("region").unwrap();
        assert_eq!(region.get(0), Scalar::from("west"));
        assert_eq!(region.get(1), Scalar::from("north"));
        assert_eq!(df.lazy().tail(10).collect().unwrap().height(), 5);
    }

    #[test]
    fn test_median_and_quantile_by_group() {
        let out = sales()
            .lazy()
            .group_by([col("region")])
            .agg([col("units").median(), col("price").quantile(1.0).alias("top")])
            .collect()
            .unwrap();
        assert_eq!(
            out.column("units").unwrap().to_vec::<f64>().unwrap(),
            vec![Some(8.0), Some(6.0), Some(1.0)]
        );
        assert_eq!(out.column("top").unwrap().get(0), Scalar::Float64(2.5));

        let err = sales()
            .lazy()
            .select([col("units").quantile(-0.1)])
            .collect()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = sales().lazy().select([col("region").median()]).schema().unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }
}
