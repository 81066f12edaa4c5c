use crate::eval::ExprEvaluator;
use crate::operators::{distinct_rows, hash_join};
use crate::plan::{LogicalPlan, PlanNode};
use crate::arena::{aexpr_columns, Node};
use keel_core::{DataFrame, ExecutionContext, Result};
use std::collections::HashSet;
use tracing::{debug, info};

pub trait QueryExecutor {
    fn execute(&self, plan: &LogicalPlan) -> Result<DataFrame>;
}

/// Runs plans bottom-up, materializing each operator's output in memory.
pub struct DefaultQueryExecutor {
    ctx: ExecutionContext,
}

impl DefaultQueryExecutor {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }
}

impl Default for DefaultQueryExecutor {
    fn default() -> Self {
        Self::new(ExecutionContext::default())
    }
}

impl QueryExecutor for DefaultQueryExecutor {
    fn execute(&self, plan: &LogicalPlan) -> Result<DataFrame> {
        info!(workers = self.ctx.max_workers(), "executing query plan");
        let out = self.ctx.install(|| self.execute_node(plan, plan.root))?;
        debug!(rows = out.height(), cols = out.width(), "query finished");
        Ok(out)
    }
}

impl DefaultQueryExecutor {
    fn execute_node(&self, plan: &LogicalPlan, node: Node) -> Result<DataFrame> {
        let eval = ExprEvaluator::new(&plan.expr_arena, &self.ctx);
        let plan_node = plan.lp_arena.get(node);
        debug!(operator = plan_node.name(), "executing");
        match plan_node {
            PlanNode::Scan {
                df,
                projection,
                predicate,
            } => {
                let predicate_columns = predicate
                    .map(|p| aexpr_columns(p, &plan.expr_arena))
                    .unwrap_or_default();
                let mut out = match projection {
                    Some(columns) => df.select(&scan_columns(df, columns, &predicate_columns))?,
                    None => df.as_ref().clone(),
                };
                if let Some(predicate) = predicate {
                    out = eval.filter(*predicate, &out)?;
                }
                match projection {
                    Some(columns) => out.select(columns),
                    None => Ok(out),
                }
            }
            PlanNode::Filter { input, predicate } => {
                let input = self.execute_node(plan, *input)?;
                eval.filter(*predicate, &input)
            }
            PlanNode::Project { input, exprs } => {
                let input = self.execute_node(plan, *input)?;
                eval.project(exprs, &input)
            }
            PlanNode::WithColumn { input, name, expr } => {
                let input = self.execute_node(plan, *input)?;
                eval.with_column(name, *expr, &input)
            }
            PlanNode::Aggregate { input, keys, aggs } => {
                let input = self.execute_node(plan, *input)?;
                eval.aggregate(keys, aggs, &input)
            }
            PlanNode::Join {
                left,
                right,
                left_on,
                right_on,
                kind,
                suffix,
            } => {
                let left = self.execute_node(plan, *left)?;
                let right = self.execute_node(plan, *right)?;
                hash_join(&left, &right, left_on, right_on, *kind, suffix, &self.ctx)
            }
            PlanNode::Sort {
                input,
                by,
                descending,
            } => {
                let input = self.execute_node(plan, *input)?;
                eval.sort(by, descending, &input)
            }
            PlanNode::Limit { input, n } => Ok(self.execute_node(plan, *input)?.head(*n)),
            PlanNode::Tail { input, n } => Ok(self.execute_node(plan, *input)?.tail(*n)),
            PlanNode::Distinct { input } => distinct_rows(&self.execute_node(plan, *input)?, &self.ctx),
        }
    }
}

/// Columns a scan reads: the projection plus whatever its predicate needs,
/// in frame order.
fn scan_columns<'a>(df: &'a DataFrame, projection: &[String], predicate_columns: &[String]) -> Vec<&'a str> {
    let wanted: HashSet<&str> = projection
        .iter()
        .chain(predicate_columns)
        .map(String::as_str)
        .collect();
    df.column_names()
        .into_iter()
        .filter(|name| wanted.contains(name))
        .collect()
}
