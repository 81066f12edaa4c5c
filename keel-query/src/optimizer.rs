// Logical plan rewrites: constant folding, predicate and projection pushdown

use crate::arena::{aexpr_columns, as_column, combine_conjunction, is_row_dependent, split_conjunction, AExpr, Node};
use crate::eval::ExprEvaluator;
use crate::plan::{join_right_columns, literal_type, JoinKind, LogicalPlan, PlanNode};
use keel_core::{DataFrame, ExecutionContext, OptimizerConfig, Result, Scalar};
use std::collections::HashSet;
use tracing::{debug, info};

type Required = Option<HashSet<String>>;

/// Rewrites plans into cheaper equivalents. Rewrites never change the
/// result of a plan, only where work happens.
#[derive(Debug, Clone, Default)]
pub struct QueryOptimizer {
    config: OptimizerConfig,
}

impl QueryOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Validates `plan` and returns an optimized copy.
    pub fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        plan.schema()?;
        let mut plan = plan.clone();

        let mut passes = 0;
        while passes < self.config.max_iterations {
            passes += 1;
            let mut changed = false;
            if self.config.constant_folding {
                changed |= fold_constants(&mut plan);
            }
            if self.config.predicate_pushdown {
                let mut moved = false;
                let root = plan.root;
                plan.root = push_predicates(&mut plan, root, Vec::new(), &mut moved)?;
                changed |= moved;
            }
            if !changed {
                break;
            }
        }

        if self.config.projection_pushdown {
            let root = plan.root;
            plan.root = push_projections(&mut plan, root, None)?;
        }

        info!(passes, nodes = plan.lp_arena.len(), "optimized plan");
        Ok(plan)
    }
}

/// Replaces operator nodes whose inputs are all literals by their value.
/// Nodes that fail to evaluate are left for execution to report.
fn fold_constants(plan: &mut LogicalPlan) -> bool {
    let ctx = ExecutionContext::sequential();
    let empty = DataFrame::empty();
    let mut changed = false;

    // Children precede parents, so one forward sweep folds whole subtrees.
    for i in 0..plan.expr_arena.len() {
        let node = Node(i);
        let foldable = match plan.expr_arena.get(node) {
            AExpr::Unary { .. } | AExpr::Binary { .. } | AExpr::Cast { .. } | AExpr::FillNull { .. } => plan
                .expr_arena
                .get(node)
                .inputs()
                .iter()
                .all(|n| matches!(plan.expr_arena.get(*n), AExpr::Literal(_))),
            _ => false,
        };
        if !foldable {
            continue;
        }
        let value = match ExprEvaluator::new(&plan.expr_arena, &ctx).evaluate(node, &empty) {
            // A folded null must keep the type the expression had.
            Ok(series) if series.len() == 1 && literal_type(&series.get(0)) == series.data_type() => series.get(0),
            _ => continue,
        };
        debug!(node = i, value = %value, "folded constant");
        plan.expr_arena.replace(node, AExpr::Literal(value));
        changed = true;
    }
    changed
}

fn is_true_literal(plan: &LogicalPlan, node: Node) -> bool {
    matches!(plan.expr_arena.get(node), AExpr::Literal(Scalar::Boolean(true)))
}

/// Puts `predicates` in a Filter above `node`, if there are any.
fn wrap_filter(plan: &mut LogicalPlan, node: Node, predicates: &[Node]) -> Node {
    match combine_conjunction(predicates, &mut plan.expr_arena) {
        Some(predicate) => plan.lp_arena.add(PlanNode::Filter { input: node, predicate }),
        None => node,
    }
}

/// Moves the conjuncts in `predicates` as close to the scans as they can go
/// and returns the node that replaces `node`.
///
/// `moved` is set when a conjunct crosses a non-filter operator, enters a
/// scan, or two filters merge.
fn push_predicates(plan: &mut LogicalPlan, node: Node, mut predicates: Vec<Node>, moved: &mut bool) -> Result<Node> {
    predicates.retain(|p| !is_true_literal(plan, *p));

    match plan.lp_arena.get(node).clone() {
        PlanNode::Filter { input, predicate } => {
            let conjuncts = split_conjunction(predicate, &plan.expr_arena);
            if conjuncts.iter().any(|c| is_row_dependent(*c, &plan.expr_arena)) {
                // Aggregates and windows see this filter's input, which must not shrink.
                let input = push_predicates(plan, input, Vec::new(), moved)?;
                plan.lp_arena.replace(node, PlanNode::Filter { input, predicate });
                return Ok(wrap_filter(plan, node, &predicates));
            }
            if !predicates.is_empty() {
                debug!("merged adjacent filters");
                *moved = true;
            }
            predicates.extend(conjuncts);
            push_predicates(plan, input, predicates, moved)
        }
        PlanNode::Scan { df, projection, predicate } => {
            if predicates.is_empty() {
                return Ok(node);
            }
            debug!(count = predicates.len(), "pushed predicates into scan");
            *moved = true;
            let mut all = predicate
                .map(|p| split_conjunction(p, &plan.expr_arena))
                .unwrap_or_default();
            all.extend(predicates);
            let predicate = combine_conjunction(&all, &mut plan.expr_arena);
            plan.lp_arena.replace(node, PlanNode::Scan { df, projection, predicate });
            Ok(node)
        }
        PlanNode::Sort { input, by, descending } => {
            if !predicates.is_empty() {
                *moved = true;
            }
            let input = push_predicates(plan, input, predicates, moved)?;
            plan.lp_arena.replace(node, PlanNode::Sort { input, by, descending });
            Ok(node)
        }
        PlanNode::Limit { input, n } => {
            let input = push_predicates(plan, input, Vec::new(), moved)?;
            plan.lp_arena.replace(node, PlanNode::Limit { input, n });
            Ok(wrap_filter(plan, node, &predicates))
        }
        PlanNode::Tail { input, n } => {
            let input = push_predicates(plan, input, Vec::new(), moved)?;
            plan.lp_arena.replace(node, PlanNode::Tail { input, n });
            Ok(wrap_filter(plan, node, &predicates))
        }
        PlanNode::Distinct { input } => {
            // Duplicates share every value, so a row filter keeps or drops them together.
            if !predicates.is_empty() {
                *moved = true;
            }
            let input = push_predicates(plan, input, predicates, moved)?;
            plan.lp_arena.replace(node, PlanNode::Distinct { input });
            Ok(node)
        }
        PlanNode::Project { input, exprs } => {
            let row_dependent = exprs.iter().any(|e| is_row_dependent(*e, &plan.expr_arena));
            let passthrough: HashSet<String> = exprs
                .iter()
                .filter_map(|e| as_column(*e, &plan.expr_arena).map(str::to_string))
                .collect();
            let (down, keep) = if row_dependent {
                (Vec::new(), predicates)
            } else {
                partition(plan, predicates, |cols| cols.iter().all(|c| passthrough.contains(c)))
            };
            if !down.is_empty() {
                *moved = true;
            }
            let input = push_predicates(plan, input, down, moved)?;
            plan.lp_arena.replace(node, PlanNode::Project { input, exprs });
            Ok(wrap_filter(plan, node, &keep))
        }
        PlanNode::WithColumn { input, name, expr } => {
            let (down, keep) = if is_row_dependent(expr, &plan.expr_arena) {
                (Vec::new(), predicates)
            } else {
                partition(plan, predicates, |cols| !cols.contains(&name))
            };
            if !down.is_empty() {
                *moved = true;
            }
            let input = push_predicates(plan, input, down, moved)?;
            plan.lp_arena.replace(node, PlanNode::WithColumn { input, name, expr });
            Ok(wrap_filter(plan, node, &keep))
        }
        PlanNode::Aggregate { input, keys, aggs } => {
            let key_columns: HashSet<String> = keys
                .iter()
                .filter_map(|k| as_column(*k, &plan.expr_arena).map(str::to_string))
                .collect();
            let (down, keep) = partition(plan, predicates, |cols| {
                !cols.is_empty() && cols.iter().all(|c| key_columns.contains(c))
            });
            if !down.is_empty() {
                debug!(count = down.len(), "pushed predicates below aggregate");
                *moved = true;
            }
            let input = push_predicates(plan, input, down, moved)?;
            plan.lp_arena.replace(node, PlanNode::Aggregate { input, keys, aggs });
            Ok(wrap_filter(plan, node, &keep))
        }
        PlanNode::Join {
            left,
            right,
            left_on,
            right_on,
            kind,
            suffix,
        } => {
            let left_schema = plan.node_schema(left)?;
            let right_schema = plan.node_schema(right)?;
            let (to_left, rest) = partition(plan, predicates, |cols| cols.iter().all(|c| left_schema.contains(c)));
            let (to_right, keep) = if kind == JoinKind::Inner {
                partition(plan, rest, |cols| {
                    !cols.is_empty()
                        && cols
                            .iter()
                            .all(|c| right_schema.contains(c) && !left_schema.contains(c))
                })
            } else {
                (Vec::new(), rest)
            };
            if !to_left.is_empty() || !to_right.is_empty() {
                debug!(left = to_left.len(), right = to_right.len(), "pushed predicates below join");
                *moved = true;
            }
            let left = push_predicates(plan, left, to_left, moved)?;
            let right = push_predicates(plan, right, to_right, moved)?;
            plan.lp_arena.replace(
                node,
                PlanNode::Join {
                    left,
                    right,
                    left_on,
                    right_on,
                    kind,
                    suffix,
                },
            );
            Ok(wrap_filter(plan, node, &keep))
        }
    }
}

/// Splits predicates by whether the columns they reference satisfy `can_push`.
fn partition<F>(plan: &LogicalPlan, predicates: Vec<Node>, can_push: F) -> (Vec<Node>, Vec<Node>)
where
    F: Fn(&[String]) -> bool,
{
    predicates
        .into_iter()
        .partition(|p| can_push(&aexpr_columns(*p, &plan.expr_arena)))
}

fn columns_of(plan: &LogicalPlan, nodes: &[Node], into: &mut HashSet<String>) {
    for node in nodes {
        into.extend(aexpr_columns(*node, &plan.expr_arena));
    }
}

/// Narrows scans to the columns some ancestor reads and drops computed
/// columns nobody reads. `required == None` means every column is needed.
fn push_projections(plan: &mut LogicalPlan, node: Node, required: Required) -> Result<Node> {
    match plan.lp_arena.get(node).clone() {
        PlanNode::Scan { df, predicate, .. } => {
            let Some(required) = required else {
                return Ok(node);
            };
            let mut projection: Vec<String> = df
                .column_names()
                .into_iter()
                .filter(|name| required.contains(*name))
                .map(str::to_string)
                .collect();
            if projection.is_empty() {
                // Keep one column so the row count survives.
                projection.extend(df.column_names().first().map(|s| s.to_string()));
            }
            if projection.len() < df.width() {
                debug!(kept = projection.len(), width = df.width(), "narrowed scan");
            }
            plan.lp_arena.replace(
                node,
                PlanNode::Scan {
                    df,
                    projection: Some(projection),
                    predicate,
                },
            );
            Ok(node)
        }
        PlanNode::Filter { input, predicate } => {
            let required = required.map(|mut r| {
                columns_of(plan, &[predicate], &mut r);
                r
            });
            let input = push_projections(plan, input, required)?;
            plan.lp_arena.replace(node, PlanNode::Filter { input, predicate });
            Ok(node)
        }
        PlanNode::Sort { input, by, descending } => {
            let required = required.map(|mut r| {
                columns_of(plan, &by, &mut r);
                r
            });
            let input = push_projections(plan, input, required)?;
            plan.lp_arena.replace(node, PlanNode::Sort { input, by, descending });
            Ok(node)
        }
        PlanNode::Limit { input, n } => {
            let input = push_projections(plan, input, required)?;
            plan.lp_arena.replace(node, PlanNode::Limit { input, n });
            Ok(node)
        }
        PlanNode::Tail { input, n } => {
            let input = push_projections(plan, input, required)?;
            plan.lp_arena.replace(node, PlanNode::Tail { input, n });
            Ok(node)
        }
        PlanNode::Distinct { input } => {
            let input = push_projections(plan, input, None)?;
            plan.lp_arena.replace(node, PlanNode::Distinct { input });
            Ok(node)
        }
        PlanNode::Project { input, exprs } => {
            let mut needed = HashSet::new();
            columns_of(plan, &exprs, &mut needed);
            let input = push_projections(plan, input, Some(needed))?;
            plan.lp_arena.replace(node, PlanNode::Project { input, exprs });
            Ok(node)
        }
        PlanNode::WithColumn { input, name, expr } => {
            if let Some(required) = &required {
                if !required.contains(&name) {
                    debug!(column = %name, "dropped unused computed column");
                    return push_projections(plan, input, Some(required.clone()));
                }
            }
            let required = required.map(|mut r| {
                r.remove(&name);
                columns_of(plan, &[expr], &mut r);
                r
            });
            let input = push_projections(plan, input, required)?;
            plan.lp_arena.replace(node, PlanNode::WithColumn { input, name, expr });
            Ok(node)
        }
        PlanNode::Aggregate { input, keys, aggs } => {
            let mut needed = HashSet::new();
            columns_of(plan, &keys, &mut needed);
            columns_of(plan, &aggs, &mut needed);
            let input = push_projections(plan, input, Some(needed))?;
            plan.lp_arena.replace(node, PlanNode::Aggregate { input, keys, aggs });
            Ok(node)
        }
        PlanNode::Join {
            left,
            right,
            left_on,
            right_on,
            kind,
            suffix,
        } => {
            let (left_required, right_required) = match &required {
                None => (None, None),
                Some(required) => {
                    let left_schema = plan.node_schema(left)?;
                    let right_schema = plan.node_schema(right)?;
                    let mut right_needed: HashSet<String> = right_on.iter().cloned().collect();
                    let mut left_needed: HashSet<String> = left_on.iter().cloned().collect();
                    for (name, out_name) in join_right_columns(&left_schema, &right_schema, &left_on, &right_on, &suffix) {
                        if required.contains(&out_name) {
                            // A suffixed name only stays suffixed while the left column exists.
                            if out_name != name {
                                left_needed.insert(name.clone());
                            }
                            right_needed.insert(name);
                        }
                    }
                    left_needed.extend(left_schema.names().filter(|n| required.contains(*n)).map(str::to_string));
                    (Some(left_needed), Some(right_needed))
                }
            };
            let left = push_projections(plan, left, left_required)?;
            let right = push_projections(plan, right, right_required)?;
            plan.lp_arena.replace(
                node,
                PlanNode::Join {
                    left,
                    right,
                    left_on,
                    right_on,
                    kind,
                    suffix,
                },
            );
            Ok(node)
        }
    }
}
