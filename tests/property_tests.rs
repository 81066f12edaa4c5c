mod common;

use common::parallel_ctx;
use keel_core::{DataFrame, ExecutionContext, Scalar, Series};
use keel_query::{col, evaluate, evaluate_with, lit, DataFrameExt, IntoLazy, JoinKind, JoinSpec};
use proptest::prelude::*;

fn opt_ints() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::weighted(0.85, -1000i64..1000), 0..200)
}

proptest! {
    #[test]
    fn test_rolling_sum_is_sum_of_last_window(
        data in prop::collection::vec(-1000i64..1000, 1..200),
        window in 1usize..12,
    ) {
        let df = DataFrame::new(vec![Series::new("v", data.clone()).unwrap()]).unwrap();
        let out = evaluate(&col("v").rolling_sum(window, 1), &df).unwrap();
        let got = out.to_vec::<i64>().unwrap();
        for i in 0..data.len() {
            let start = (i + 1).saturating_sub(window);
            let expected: i64 = data[start..=i].iter().sum();
            prop_assert_eq!(got[i], Some(expected));
        }
    }

    #[test]
    fn test_cum_max_and_min_are_monotonic(data in opt_ints()) {
        let df = DataFrame::new(vec![Series::new("v", data).unwrap()]).unwrap();
        let maxes: Vec<i64> = evaluate(&col("v").cum_max(), &df).unwrap()
            .to_vec::<i64>().unwrap().into_iter().flatten().collect();
        let mins: Vec<i64> = evaluate(&col("v").cum_min(), &df).unwrap()
            .to_vec::<i64>().unwrap().into_iter().flatten().collect();
        prop_assert!(maxes.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(mins.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_group_sums_partition_total(
        rows in prop::collection::vec((0i64..8, -500i64..500), 1..300),
    ) {
        let (keys, values): (Vec<i64>, Vec<i64>) = rows.into_iter().unzip();
        let df = DataFrame::new(vec![
            Series::new("k", keys).unwrap(),
            Series::new("v", values).unwrap(),
        ]).unwrap();
        let total = df.column("v").unwrap().sum().unwrap();
        let grouped = df.group_by_agg([col("k")], [col("v").sum()]).unwrap();
        prop_assert_eq!(grouped.column("v").unwrap().sum().unwrap(), total);
    }

    #[test]
    fn test_filter_idempotent(data in opt_ints(), threshold in -1000i64..1000) {
        let df = DataFrame::new(vec![Series::new("v", data).unwrap()]).unwrap();
        let predicate = col("v").gt(lit(threshold));
        let once = df.filter_by(predicate.clone()).unwrap();
        let twice = once.filter_by(predicate).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_reductions_ignore_worker_count(data in opt_ints(), workers in 1usize..6) {
        let df = DataFrame::new(vec![Series::new("v", data).unwrap()]).unwrap();
        let seq = ExecutionContext::sequential();
        let par = parallel_ctx(workers);
        for expr in [col("v").sum(), col("v").min(), col("v").max(), col("v").mean(), col("v").count()] {
            let a = evaluate_with(&expr, &df, &seq).unwrap().get(0);
            let b = evaluate_with(&expr, &df, &par).unwrap().get(0);
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn test_left_join_keeps_every_probe_row(
        left in prop::collection::vec(0i64..30, 0..100),
        right in prop::collection::btree_set(0i64..30, 0..30),
    ) {
        let left_df = DataFrame::new(vec![Series::new("k", left.clone()).unwrap()]).unwrap();
        let right_keys: Vec<i64> = right.iter().copied().collect();
        let right_df = DataFrame::new(vec![
            Series::new("k", right_keys.clone()).unwrap(),
            Series::new("hit", vec![true; right_keys.len()]).unwrap(),
        ]).unwrap();
        let out = left_df
            .lazy()
            .join(right_df.lazy(), JoinSpec::on(&["k"]).kind(JoinKind::Left))
            .collect_with(&parallel_ctx(3))
            .unwrap();
        prop_assert_eq!(out.height(), left.len());
        for (i, k) in left.iter().enumerate() {
            let expected = if right.contains(k) { Scalar::Boolean(true) } else { Scalar::Null };
            prop_assert_eq!(out.column("hit").unwrap().get(i), expected);
        }
    }
}
