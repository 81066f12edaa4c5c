use super::hashing::{group_rows, Groups};
use super::sort::RowCmp;
use crate::expr::AggFunc;
use keel_core::{Column, ColumnData, DataFrame, DataType, Error, ExecutionContext, NumericNative, Result, Series, VectorizedOps};
use std::cmp::Ordering;
use tracing::debug;

/// Groups rows by the composite value of `keys`.
///
/// Returns the group assignment plus one output series per key holding the
/// key value of each group, in first-occurrence order.
pub fn group_keys(keys: &[Series], ctx: &ExecutionContext) -> Result<(Groups, Vec<Series>)> {
    let first = keys
        .first()
        .ok_or_else(|| Error::Shape("group_by requires at least one key".to_string()))?;
    if let Some(bad) = keys.iter().find(|k| k.len() != first.len()) {
        return Err(Error::Shape(format!(
            "group key '{}' has {} rows but '{}' has {}",
            bad.name(),
            bad.len(),
            first.name(),
            first.len()
        )));
    }

    let columns: Vec<&Column> = keys.iter().map(|k| k.column()).collect();
    let groups = group_rows(&columns, ctx);
    debug!(rows = first.len(), groups = groups.len(), keys = keys.len(), "grouped rows");

    let key_values = keys.iter().map(|k| k.take(&groups.first_rows)).collect();
    Ok((groups, key_values))
}

/// First occurrence of each distinct row, in input order. Nulls compare
/// equal to each other.
pub fn distinct_rows(df: &DataFrame, ctx: &ExecutionContext) -> Result<DataFrame> {
    if df.width() == 0 {
        return Ok(df.clone());
    }
    let (groups, columns) = group_keys(df.columns(), ctx)?;
    debug!(rows = df.height(), distinct = groups.len(), "dropped duplicate rows");
    DataFrame::new(columns)
}

/// Reduces `values` once per group. The result keeps the name of `values`.
pub fn aggregate_groups(func: AggFunc, values: &Series, groups: &Groups) -> Result<Series> {
    let column = values.column();
    if column.len() != groups.row_groups.len() {
        return Err(Error::Shape(format!(
            "aggregation input has {} rows but {} rows were grouped",
            column.len(),
            groups.row_groups.len()
        )));
    }

    let out = match func {
        AggFunc::Count => {
            let counts = valid_counts(column, groups);
            Column::from_vec(counts.into_iter().map(|c| c as i64).collect::<Vec<_>>())
        }
        AggFunc::Sum => match column.data() {
            ColumnData::Int64(v) => Column::from_vec(grouped_sum(v, column, groups)),
            ColumnData::Float32(v) => Column::from_vec(grouped_sum(v, column, groups)),
            ColumnData::Float64(v) => Column::from_vec(grouped_sum(v, column, groups)),
            ColumnData::Boolean(v) => {
                let mut trues = vec![0i64; groups.len()];
                for (row, &g) in groups.row_groups.iter().enumerate() {
                    if column.is_valid(row) && v[row] {
                        trues[g] += 1;
                    }
                }
                Column::from_vec(trues)
            }
            ColumnData::Utf8(_) => return Err(Error::Type("cannot sum Utf8".to_string())),
        },
        AggFunc::Mean => {
            let (sums, counts) = float_sums(column, groups, func)?;
            Column::from_options(
                sums.iter()
                    .zip(&counts)
                    .map(|(&s, &c)| (c > 0).then(|| s / c as f64))
                    .collect(),
            )
        }
        AggFunc::Var => Column::from_options(grouped_var(column, groups, func)?),
        AggFunc::Std => Column::from_options(
            grouped_var(column, groups, func)?
                .into_iter()
                .map(|v| v.map(f64::sqrt))
                .collect(),
        ),
        AggFunc::Median => Column::from_options(grouped_quantile(column, groups, func, 0.5)?),
        AggFunc::Quantile(q) => Column::from_options(grouped_quantile(column, groups, func, q)?),
        AggFunc::Min => column.take_opt(&arg_extreme(column, groups, Ordering::Less)),
        AggFunc::Max => column.take_opt(&arg_extreme(column, groups, Ordering::Greater)),
        AggFunc::First => column.take(&groups.first_rows),
        AggFunc::Last => {
            let mut last = groups.first_rows.clone();
            for (row, &g) in groups.row_groups.iter().enumerate() {
                last[g] = row;
            }
            column.take(&last)
        }
    };
    Ok(values.with_column(out))
}

fn valid_counts(column: &Column, groups: &Groups) -> Vec<usize> {
    let mut counts = vec![0usize; groups.len()];
    for (row, &g) in groups.row_groups.iter().enumerate() {
        if column.is_valid(row) {
            counts[g] += 1;
        }
    }
    counts
}

/// Running sums in the column's own type; an all-null group sums to zero.
fn grouped_sum<T: NumericNative>(values: &[T], column: &Column, groups: &Groups) -> Vec<T> {
    let mut sums = vec![T::zero(); groups.len()];
    for (row, &g) in groups.row_groups.iter().enumerate() {
        if column.is_valid(row) {
            sums[g] = sums[g].plus(values[row]);
        }
    }
    sums
}

fn float_sums_of<T: NumericNative>(values: &[T], column: &Column, groups: &Groups) -> (Vec<f64>, Vec<usize>) {
    let mut sums = vec![0.0; groups.len()];
    let mut counts = vec![0usize; groups.len()];
    for (row, &g) in groups.row_groups.iter().enumerate() {
        if column.is_valid(row) {
            sums[g] += values[row].to_f64();
            counts[g] += 1;
        }
    }
    (sums, counts)
}

/// Per-group `f64` sums and valid counts. Booleans count as 0/1.
fn float_sums(column: &Column, groups: &Groups, func: AggFunc) -> Result<(Vec<f64>, Vec<usize>)> {
    match column.data() {
        ColumnData::Int64(v) => Ok(float_sums_of(v, column, groups)),
        ColumnData::Float32(v) => Ok(float_sums_of(v, column, groups)),
        ColumnData::Float64(v) => Ok(float_sums_of(v, column, groups)),
        ColumnData::Boolean(_) => float_sums(&column.cast(DataType::Int64)?, groups, func),
        ColumnData::Utf8(_) => Err(Error::Type(format!("cannot take {} of Utf8", func.name()))),
    }
}

/// Sample variance per group, from the group means in a second pass.
fn grouped_var(column: &Column, groups: &Groups, func: AggFunc) -> Result<Vec<Option<f64>>> {
    let (sums, counts) = float_sums(column, groups, func)?;
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();

    fn squared_deviations<T: NumericNative>(
        values: &[T],
        column: &Column,
        groups: &Groups,
        means: &[f64],
    ) -> Vec<f64> {
        let mut acc = vec![0.0; means.len()];
        for (row, &g) in groups.row_groups.iter().enumerate() {
            if column.is_valid(row) {
                let d = values[row].to_f64() - means[g];
                acc[g] += d * d;
            }
        }
        acc
    }

    let deviations = match column.data() {
        ColumnData::Int64(v) => squared_deviations(v, column, groups, &means),
        ColumnData::Float32(v) => squared_deviations(v, column, groups, &means),
        ColumnData::Float64(v) => squared_deviations(v, column, groups, &means),
        _ => return Err(Error::Type(format!("cannot take {} of {}", func.name(), column.data_type()))),
    };
    Ok(deviations
        .into_iter()
        .zip(counts)
        .map(|(d, c)| (c >= 2).then(|| d / (c - 1) as f64))
        .collect())
}

/// Interpolated quantile of each group's valid values.
fn grouped_quantile(column: &Column, groups: &Groups, func: AggFunc, q: f64) -> Result<Vec<Option<f64>>> {
    VectorizedOps::check_quantile(q)?;

    fn bucket<T: NumericNative>(values: &[T], column: &Column, groups: &Groups) -> Vec<Vec<f64>> {
        let mut buckets = vec![Vec::new(); groups.len()];
        for (row, &g) in groups.row_groups.iter().enumerate() {
            if column.is_valid(row) {
                buckets[g].push(values[row].to_f64());
            }
        }
        buckets
    }

    let buckets = match column.data() {
        ColumnData::Int64(v) => bucket(v, column, groups),
        ColumnData::Float32(v) => bucket(v, column, groups),
        ColumnData::Float64(v) => bucket(v, column, groups),
        _ => return Err(Error::Type(format!("cannot take {} of {}", func.name(), column.data_type()))),
    };
    Ok(buckets
        .into_iter()
        .map(|mut values| VectorizedOps::quantile(&mut values, q))
        .collect())
}

/// Row of the smallest (`Less`) or largest (`Greater`) valid value in each
/// group; ties keep the earliest row.
fn arg_extreme(column: &Column, groups: &Groups, keep: Ordering) -> Vec<Option<usize>> {
    let cmp = RowCmp::new(column);
    let mut best: Vec<Option<usize>> = vec![None; groups.len()];
    for (row, &g) in groups.row_groups.iter().enumerate() {
        if !column.is_valid(row) {
            continue;
        }
        match best[g] {
            Some(current) if cmp.compare(row, current) != keep => {}
            _ => best[g] = Some(row),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::Scalar;

    fn groups_of(keys: &Series) -> Groups {
        group_keys(std::slice::from_ref(keys), &ExecutionContext::sequential())
            .unwrap()
            .0
    }

    #[test]
    fn test_first_occurrence_order() {
        let keys = Series::new("k", ["A", "B", "A"]).unwrap();
        let (groups, out) = group_keys(&[keys], &ExecutionContext::sequential()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(out[0], Series::new("k", ["A", "B"]).unwrap());
    }

    #[test]
    fn test_empty_key_set_is_shape_error() {
        let err = group_keys(&[], &ExecutionContext::sequential()).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn test_sum_count_mean() {
        let keys = Series::new("k", ["a", "b", "a", "b"]).unwrap();
        let values = Series::new("v", [Some(1), None, Some(3), None]).unwrap();
        let groups = groups_of(&keys);

        let sum = aggregate_groups(AggFunc::Sum, &values, &groups).unwrap();
        assert_eq!(sum.to_vec::<i64>().unwrap(), vec![Some(4), Some(0)]);
        let count = aggregate_groups(AggFunc::Count, &values, &groups).unwrap();
        assert_eq!(count.to_vec::<i64>().unwrap(), vec![Some(2), Some(0)]);
        let mean = aggregate_groups(AggFunc::Mean, &values, &groups).unwrap();
        assert_eq!(mean.to_vec::<f64>().unwrap(), vec![Some(2.0), None]);
        assert_eq!(mean.name(), "v");
    }

    #[test]
    fn test_min_max_first_last() {
        let keys = Series::new("k", [1, 1, 2, 1]).unwrap();
        let values = Series::new("v", ["m", "c", "x", "z"]).unwrap();
        let groups = groups_of(&keys);
        let min = aggregate_groups(AggFunc::Min, &values, &groups).unwrap();
        assert_eq!(min.get(0), Scalar::from("c"));
        let max = aggregate_groups(AggFunc::Max, &values, &groups).unwrap();
        assert_eq!(max.get(0), Scalar::from("z"));
        let first = aggregate_groups(AggFunc::First, &values, &groups).unwrap();
        assert_eq!(first.get(0), Scalar::from("m"));
        let last = aggregate_groups(AggFunc::Last, &values, &groups).unwrap();
        assert_eq!(last.get(0), Scalar::from("z"));
        assert_eq!(last.get(1), Scalar::from("x"));
    }

    #[test]
    fn test_var_and_std() {
        let keys = Series::new("k", [1, 1, 1, 2]).unwrap();
        let values = Series::new("v", [2.0, 4.0, 6.0, 1.0]).unwrap();
        let groups = groups_of(&keys);
        let var = aggregate_groups(AggFunc::Var, &values, &groups).unwrap();
        assert_eq!(var.to_vec::<f64>().unwrap(), vec![Some(4.0), None]);
        let std = aggregate_groups(AggFunc::Std, &values, &groups).unwrap();
        assert_eq!(std.get(0), Scalar::Float64(2.0));
    }

    #[test]
    fn test_bool_sum_counts_trues() {
        let keys = Series::new("k", [1, 2, 1]).unwrap();
        let values = Series::new("b", [true, true, true]).unwrap();
        let sum = aggregate_groups(AggFunc::Sum, &values, &groups_of(&keys)).unwrap();
        assert_eq!(sum.to_vec::<i64>().unwrap(), vec![Some(2), Some(1)]);
        let strings = Series::new("s", ["x", "y", "z"]).unwrap();
        assert!(aggregate_groups(AggFunc::Sum, &strings, &groups_of(&keys)).is_err());
    }

    #[test]
    fn test_median_and_quantile_per_group() {
        let keys = Series::new("k", ["a", "b", "a", "a", "b", "c"]).unwrap();
        let values = Series::new("v", [Some(1), Some(5), None, Some(3), Some(7), None]).unwrap();
        let groups = groups_of(&keys);

        let median = aggregate_groups(AggFunc::Median, &values, &groups).unwrap();
        assert_eq!(median.to_vec::<f64>().unwrap(), vec![Some(2.0), Some(6.0), None]);
        let q = aggregate_groups(AggFunc::Quantile(0.25), &values, &groups).unwrap();
        assert_eq!(q.to_vec::<f64>().unwrap(), vec![Some(1.5), Some(5.5), None]);
        assert_eq!(q.name(), "v");

        let err = aggregate_groups(AggFunc::Quantile(1.5), &values, &groups).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let strings = Series::new("s", ["x", "y", "z", "w", "u", "t"]).unwrap();
        let err = aggregate_groups(AggFunc::Median, &strings, &groups).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_distinct_rows_keeps_first_occurrence() {
        let df = DataFrame::new(vec![
            Series::new("k", [Some(1), None, Some(1), None, Some(2)]).unwrap(),
            Series::new("s", ["a", "b", "a", "b", "a"]).unwrap(),
        ])
        .unwrap();
        let out = distinct_rows(&df, &ExecutionContext::sequential()).unwrap();
        assert_eq!(out.height(), 3);
        assert_eq!(
            out.column("k").unwrap().to_vec::<i64>().unwrap(),
            vec![Some(1), None, Some(2)]
        );
        assert_eq!(out.column("s").unwrap().get(1), Scalar::from("b"));

        let empty = DataFrame::new(vec![]).unwrap();
        assert_eq!(distinct_rows(&empty, &ExecutionContext::sequential()).unwrap().width(), 0);
    }
}
