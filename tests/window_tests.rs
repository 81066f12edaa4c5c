mod common;

use keel_core::{df, DataFrame, DataType, ErrorKind, Scalar};
use keel_query::{col, evaluate, DataFrameExt, Expr};

fn prices() -> DataFrame {
    df!(
        "day" => [1, 2, 3, 4, 5],
        "px" => [Some(10.0), Some(12.0), None, Some(9.0), Some(0.0)],
        "qty" => [3, 1, 4, 1, 5],
    )
    .unwrap()
}

fn floats(expr: Expr) -> Vec<Option<f64>> {
    evaluate(&expr, &prices()).unwrap().to_vec::<f64>().unwrap()
}

fn ints(expr: Expr) -> Vec<Option<i64>> {
    evaluate(&expr, &prices()).unwrap().to_vec::<i64>().unwrap()
}

#[test]
fn test_rolling_mean_partial_window() {
    let df = df!("v" => [1.0, 2.0, 3.0, 4.0]).unwrap();
    let out = evaluate(&col("v").rolling_mean(3, 1), &df).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![Some(1.0), Some(1.5), Some(2.0), Some(3.0)]);
}

#[test]
fn test_lag_and_lead_fill_edges() {
    assert_eq!(ints(col("qty").lag(2, 0)), vec![Some(0), Some(0), Some(3), Some(1), Some(4)]);
    assert_eq!(ints(col("qty").lead(1, -1)), vec![Some(1), Some(4), Some(1), Some(5), Some(-1)]);
    // A null default leaves the edge null.
    assert_eq!(ints(col("qty").lag(1, Scalar::Null))[0], None);
}

#[test]
fn test_diff_and_pct_change() {
    assert_eq!(ints(col("qty").diff()), vec![None, Some(-2), Some(3), Some(-3), Some(4)]);
    assert_eq!(ints(col("qty").diff_n(2)), vec![None, None, Some(1), Some(0), Some(1)]);
    assert_eq!(
        floats(col("px").pct_change()),
        vec![None, Some(0.2), None, None, Some(-1.0)]
    );
    let zero = df!("v" => [0.0, 5.0]).unwrap();
    assert_eq!(evaluate(&col("v").pct_change(), &zero).unwrap().get(1), Scalar::Null);
}

#[test]
fn test_cumulative_folds() {
    assert_eq!(ints(col("qty").cum_sum()), vec![Some(3), Some(4), Some(8), Some(9), Some(14)]);
    assert_eq!(ints(col("qty").cum_max()), vec![Some(3), Some(3), Some(4), Some(4), Some(5)]);
    assert_eq!(ints(col("qty").cum_min()), vec![Some(3), Some(1), Some(1), Some(1), Some(1)]);
    // Nulls stay null and do not reset the fold.
    assert_eq!(floats(col("px").cum_sum()), vec![Some(10.0), Some(22.0), None, Some(31.0), Some(31.0)]);
}

#[test]
fn test_rolling_respects_min_periods() {
    assert_eq!(
        floats(col("px").rolling_sum(2, 2)),
        vec![None, Some(22.0), None, None, Some(9.0)]
    );
    assert_eq!(
        floats(col("px").rolling_mean(3, 2)),
        vec![None, Some(11.0), Some(11.0), Some(10.5), Some(4.5)]
    );
    assert_eq!(ints(col("qty").rolling_max(2, 1)), vec![Some(3), Some(3), Some(4), Some(4), Some(5)]);
    assert_eq!(floats(col("px").rolling_min(3, 1)), vec![Some(10.0), Some(10.0), Some(10.0), Some(9.0), Some(0.0)]);
}

#[test]
fn test_window_output_types() {
    let df = prices();
    let types = |e: Expr| evaluate(&e, &df).unwrap().data_type();
    assert_eq!(types(col("qty").rolling_mean(2, 1)), DataType::Float64);
    assert_eq!(types(col("qty").rolling_sum(2, 1)), DataType::Int64);
    assert_eq!(types(col("qty").pct_change()), DataType::Float64);
    assert_eq!(types(col("qty").lag(1, 0)), DataType::Int64);
}

#[test]
fn test_invalid_window_arguments() {
    let err = evaluate(&col("qty").rolling_sum(0, 1), &prices()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = evaluate(&col("qty").rolling_mean(2, 3), &prices()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = evaluate(&col("day").cast(DataType::Utf8).diff(), &prices()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_windows_in_lazy_pipeline() {
    let out = prices()
        .with_column_expr("moving", col("qty").rolling_sum(3, 1))
        .unwrap()
        .with_column_expr("prev", col("qty").lag(1, 0))
        .unwrap();
    assert_eq!(
        out.column("moving").unwrap().to_vec::<i64>().unwrap(),
        vec![Some(3), Some(4), Some(8), Some(6), Some(10)]
    );
    assert_eq!(out.column("prev").unwrap().get(4), Scalar::Int64(1));
    assert_eq!(out.width(), 5);
}
