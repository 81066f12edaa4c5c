mod common;

use common::{employees, init_tracing, parallel_ctx};
use keel_core::{df, EngineConfig, OptimizerConfig, Scalar};
use keel_query::{col, lit, DataFrameExt, IntoLazy, JoinKind, JoinSpec, LazyFrame};

fn unoptimized(lf: LazyFrame) -> LazyFrame {
    lf.with_config(EngineConfig {
        optimizer: OptimizerConfig {
            predicate_pushdown: false,
            projection_pushdown: false,
            constant_folding: false,
            ..OptimizerConfig::default()
        },
        ..EngineConfig::default()
    })
}

fn depts() -> keel_core::DataFrame {
    df!("dept" => ["eng", "ops", "hr"], "floor" => [3, 1, 2]).unwrap()
}

/// Queries whose optimized and unoptimized results must agree.
fn queries() -> Vec<LazyFrame> {
    let people = employees().lazy();
    vec![
        people
            .with_column("bonus", col("salary") * lit(0.1))
            .filter(col("bonus").gt(lit(9.0)).and(col("dept").neq(lit("ops"))))
            .select([col("name"), col("bonus")]),
        people
            .join(depts().lazy(), JoinSpec::on(&["dept"]).kind(JoinKind::Left))
            .filter(col("floor").gt(lit(1)).and(col("salary").lt(lit(115.0))))
            .select([col("name"), col("floor")]),
        people
            .group_by([col("dept")])
            .agg([col("salary").mean().alias("avg"), col("years").max()])
            .filter(col("dept").neq(lit("sales")))
            .sort("avg", false),
        people
            .sort("salary", true)
            .limit(3)
            .filter(col("years").gt(lit(2)))
            .select([col("name")]),
        people
            .with_column("running", col("salary").cum_sum())
            .filter(col("running").gt(lit(300.0)).and(col("salary").gt(lit(2.0))))
            .select([col("name"), col("running")]),
        people
            .select([col("dept"), col("years")])
            .distinct()
            .filter(col("dept").neq(lit("sales")))
            .select([col("dept")]),
        people
            .tail(4)
            .filter(col("salary").lt(lit(100.0)))
            .select([col("name")]),
    ]
}

#[test]
fn test_optimizer_preserves_results() {
    init_tracing();
    for (i, lf) in queries().into_iter().enumerate() {
        let fast = lf.collect().unwrap();
        let slow = unoptimized(lf).collect().unwrap();
        assert_eq!(fast, slow, "query {} changed under optimization", i);
        assert_eq!(fast.column_names(), slow.column_names());
    }
}

#[test]
fn test_results_independent_of_worker_count() {
    for lf in queries() {
        let one = lf.collect_with(&parallel_ctx(1)).unwrap();
        let four = lf.collect_with(&parallel_ctx(4)).unwrap();
        assert_eq!(one, four);
    }
}

#[test]
fn test_left_join_filter_on_right_stays_above() {
    let lf = employees()
        .lazy()
        .join(depts().lazy(), JoinSpec::on(&["dept"]).kind(JoinKind::Left))
        .filter(col("floor").is_null());
    let plan = lf.explain(true).unwrap();
    assert!(plan.starts_with("Filter col(\"floor\").is_null()\n  Join Left"));
    let out = lf.collect().unwrap();
    assert_eq!(out.column("name").unwrap().get(0), Scalar::from("di"));
    assert_eq!(out.height(), 1);
}

#[test]
fn test_predicate_reaches_both_scans() {
    let lf = employees()
        .lazy()
        .join(depts().lazy(), JoinSpec::on(&["dept"]))
        .filter(col("salary").gt(lit(95.0)))
        .filter(col("floor").eq(lit(3)));
    let plan = lf.explain(true).unwrap();
    assert!(!plan.contains("Filter"));
    assert!(plan.contains("predicate=(col(\"salary\") > 95)"));
    assert!(plan.contains("predicate=(col(\"floor\") == 3)"));
    assert_eq!(lf.collect().unwrap().height(), 3);
}

#[test]
fn test_projection_narrows_join_inputs() {
    let lf = employees()
        .lazy()
        .join(depts().lazy(), JoinSpec::on(&["dept"]))
        .select([col("name"), col("floor")]);
    let plan = lf.explain(true).unwrap();
    assert!(plan.contains("projection=[name, dept]"));
    assert!(plan.contains("projection=[dept, floor]"));
}

#[test]
fn test_constant_subtrees_fold() {
    let lf = employees().lazy().filter(col("salary").gt(lit(50.0) * lit(2)));
    assert!(lf.explain(true).unwrap().contains("(col(\"salary\") > 100)"));
    assert_eq!(lf.collect().unwrap().height(), 2);
}

#[test]
fn test_aggregate_key_predicate_pushed() {
    let lf = employees()
        .lazy()
        .group_by([col("dept")])
        .agg([col("salary").sum()])
        .filter(col("dept").eq(lit("eng")));
    let plan = lf.explain(true).unwrap();
    assert!(plan.starts_with("Aggregate"));
    let out = lf.collect().unwrap();
    assert_eq!(out.get_row(0).unwrap(), vec![Scalar::from("eng"), Scalar::Float64(330.0)]);
}

#[test]
fn test_plan_reuse() {
    let base = employees().lazy().filter(col("dept").eq(lit("eng")));
    let names = base.select([col("name")]);
    let top = base.sort("salary", true).limit(1);
    assert_eq!(names.collect().unwrap().height(), 3);
    assert_eq!(top.collect().unwrap().column("name").unwrap().get(0), Scalar::from("ana"));
    assert_eq!(base.collect().unwrap(), base.collect().unwrap());
}

#[test]
fn test_eager_join_uses_same_engine() {
    let eager = employees().join(&depts(), JoinSpec::on(&["dept"])).unwrap();
    let lazy = employees()
        .lazy()
        .join(depts().lazy(), JoinSpec::on(&["dept"]))
        .collect()
        .unwrap();
    assert_eq!(eager, lazy);
    assert_eq!(eager.height(), 5);
}

#[test]
fn test_collect_honours_engine_config() {
    let mut config = EngineConfig::default();
    config.execution.max_workers = Some(2);
    config.execution.min_rows_for_parallel = 1;
    config.execution.morsel_size = 2;
    let out = employees()
        .lazy()
        .with_config(config)
        .group_by([col("dept")])
        .agg([col("salary").count()])
        .collect()
        .unwrap();
    assert_eq!(
        out.column("dept").unwrap().iter().collect::<Vec<_>>(),
        vec![Scalar::from("eng"), Scalar::from("ops"), Scalar::from("sales")]
    );
}

#[test]
fn test_distinct_keeps_first_of_each_row() {
    let df = df!(
        "dept" => ["eng", "ops", "eng", "ops", "eng"],
        "level" => [Some(1), None, Some(1), None, Some(2)],
    )
    .unwrap();
    let out = df.lazy().distinct().tail(2).collect().unwrap();
    assert_eq!(out.get_row(0).unwrap(), vec![Scalar::from("ops"), Scalar::Null]);
    assert_eq!(out.get_row(1).unwrap(), vec![Scalar::from("eng"), Scalar::Int64(2)]);
}
