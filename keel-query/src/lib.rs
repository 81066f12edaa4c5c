pub mod expr;
pub mod arena;
pub mod plan;
pub mod optimizer;
pub mod eval;
pub mod executor;
pub mod lazy;
pub mod operators;

pub use expr::{col, lit, lit_null, AggFunc, BinaryOp, Expr, UnaryOp, WindowFunc};
pub use plan::{JoinKind, LogicalPlan, PlanNode};
pub use optimizer::QueryOptimizer;
pub use eval::{evaluate, evaluate_with, ExprEvaluator};
pub use executor::{DefaultQueryExecutor, QueryExecutor};
pub use lazy::{DataFrameExt, IntoLazy, JoinSpec, LazyFrame, LazyGroupBy};
