//! Sequential window transforms. Every function preserves input length and
//! the input series name.

use super::sort::RowCmp;
use crate::expr::WindowFunc;
use keel_core::{Column, ColumnData, DataType, Error, NumericNative, Result, Scalar, Series};
use std::cmp::Ordering;
use std::collections::VecDeque;

pub fn apply_window(func: &WindowFunc, series: &Series) -> Result<Series> {
    match func {
        WindowFunc::Lag { periods, default } => lag(series, *periods, default),
        WindowFunc::Lead { periods, default } => lead(series, *periods, default),
        WindowFunc::Diff { periods } => diff(series, *periods),
        WindowFunc::PctChange => pct_change(series),
        WindowFunc::CumSum => cum_sum(series),
        WindowFunc::CumMin => cum_extreme(series, Ordering::Less),
        WindowFunc::CumMax => cum_extreme(series, Ordering::Greater),
        WindowFunc::RollingSum { window, min_periods } => rolling_sum(series, *window, *min_periods),
        WindowFunc::RollingMean { window, min_periods } => rolling_mean(series, *window, *min_periods),
        WindowFunc::RollingMin { window, min_periods } => {
            rolling_extreme(series, *window, *min_periods, Ordering::Less)
        }
        WindowFunc::RollingMax { window, min_periods } => {
            rolling_extreme(series, *window, *min_periods, Ordering::Greater)
        }
    }
}

/// Moves values `periods` positions later. The first `periods` rows take
/// `default`.
pub fn lag(series: &Series, periods: usize, default: &Scalar) -> Result<Series> {
    shift_from(series, default, |i| i.checked_sub(periods))
}

/// Moves values `periods` positions earlier. The last `periods` rows take
/// `default`.
pub fn lead(series: &Series, periods: usize, default: &Scalar) -> Result<Series> {
    let len = series.len();
    shift_from(series, default, |i| i.checked_add(periods).filter(|&src| src < len))
}

/// Row `i` of the output is row `source(i)` of the input, or `default`
/// when there is none.
fn shift_from<F>(series: &Series, default: &Scalar, source: F) -> Result<Series>
where
    F: Fn(usize) -> Option<usize>,
{
    let len = series.len();
    let default_col = Column::from_scalar(default, series.data_type(), 1)?;
    let values = series.column().append(&default_col)?;
    let indices: Vec<Option<usize>> = (0..len).map(|i| Some(source(i).unwrap_or(len))).collect();
    Ok(series.with_column(values.take_opt(&indices)))
}

fn numeric_error(func: &str, data_type: DataType) -> Error {
    Error::Type(format!("{} requires a numeric input, got {}", func, data_type))
}

/// `value[i] - value[i - periods]`; null where either side is missing.
pub fn diff(series: &Series, periods: usize) -> Result<Series> {
    fn kernel<T: NumericNative>(values: &[T], column: &Column, periods: usize) -> Column {
        Column::from_options(
            (0..values.len())
                .map(|i| {
                    let j = i.checked_sub(periods)?;
                    (column.is_valid(i) && column.is_valid(j)).then(|| values[i].minus(values[j]))
                })
                .collect(),
        )
    }

    let column = series.column();
    let out = match column.data() {
        ColumnData::Int64(v) => kernel(v, column, periods),
        ColumnData::Float32(v) => kernel(v, column, periods),
        ColumnData::Float64(v) => kernel(v, column, periods),
        _ => return Err(numeric_error("diff", column.data_type())),
    };
    Ok(series.with_column(out))
}

/// Relative change from the previous row as Float64. A zero or missing
/// previous value gives null.
pub fn pct_change(series: &Series) -> Result<Series> {
    fn kernel<T: NumericNative>(values: &[T], column: &Column) -> Column {
        Column::from_options(
            (0..values.len())
                .map(|i| {
                    let j = i.checked_sub(1)?;
                    if !column.is_valid(i) || !column.is_valid(j) {
                        return None;
                    }
                    let prev = values[j].to_f64();
                    (prev != 0.0).then(|| (values[i].to_f64() - prev) / prev)
                })
                .collect(),
        )
    }

    let column = series.column();
    let out = match column.data() {
        ColumnData::Int64(v) => kernel(v, column),
        ColumnData::Float32(v) => kernel(v, column),
        ColumnData::Float64(v) => kernel(v, column),
        ColumnData::Boolean(_) => return pct_change(&series.cast(DataType::Int64)?),
        ColumnData::Utf8(_) => return Err(numeric_error("pct_change", DataType::Utf8)),
    };
    Ok(series.with_column(out))
}

/// Running sum; null rows stay null and do not reset the total.
pub fn cum_sum(series: &Series) -> Result<Series> {
    fn kernel<T: NumericNative>(values: &[T], column: &Column) -> Column {
        let mut total = T::zero();
        Column::from_options(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    column.is_valid(i).then(|| {
                        total = total.plus(v);
                        total
                    })
                })
                .collect(),
        )
    }

    let column = series.column();
    let out = match column.data() {
        ColumnData::Int64(v) => kernel(v, column),
        ColumnData::Float32(v) => kernel(v, column),
        ColumnData::Float64(v) => kernel(v, column),
        ColumnData::Boolean(_) => return cum_sum(&series.cast(DataType::Int64)?),
        ColumnData::Utf8(_) => return Err(numeric_error("cum_sum", DataType::Utf8)),
    };
    Ok(series.with_column(out))
}

/// Running minimum (`Less`) or maximum (`Greater`) over valid values.
pub fn cum_extreme(series: &Series, keep: Ordering) -> Result<Series> {
    let column = series.column();
    let cmp = RowCmp::new(column);
    let mut best: Option<usize> = None;
    let indices: Vec<Option<usize>> = (0..column.len())
        .map(|i| {
            if !column.is_valid(i) {
                return None;
            }
            match best {
                Some(b) if cmp.compare(i, b) != keep => {}
                _ => best = Some(i),
            }
            best
        })
        .collect();
    Ok(series.with_column(column.take_opt(&indices)))
}

fn validate_window(window: usize, min_periods: usize) -> Result<()> {
    if window == 0 {
        return Err(Error::InvalidArgument("window size must be at least 1".to_string()));
    }
    if min_periods == 0 || min_periods > window {
        return Err(Error::InvalidArgument(format!(
            "min_periods must be between 1 and the window size {}, got {}",
            window, min_periods
        )));
    }
    Ok(())
}

/// Incrementally maintained window state over row indices.
trait WindowState {
    type Output;
    fn push(&mut self, row: usize);
    fn pop(&mut self, row: usize);
    fn finish(&self, count: usize) -> Self::Output;
    /// Called when the window holds no valid rows.
    fn clear(&mut self) {}
}

/// Drives `state` across the column: each step adds the entering row and
/// removes the leaving one.
fn rolling<S: WindowState>(column: &Column, window: usize, min_periods: usize, mut state: S) -> Vec<Option<S::Output>> {
    let mut count = 0usize;
    (0..column.len())
        .map(|i| {
            if column.is_valid(i) {
                state.push(i);
                count += 1;
            }
            if i >= window && column.is_valid(i - window) {
                state.pop(i - window);
                count -= 1;
                if count == 0 {
                    state.clear();
                }
            }
            (count >= min_periods).then(|| state.finish(count))
        })
        .collect()
}

struct IntSum<'a> {
    values: &'a [i64],
    sum: i64,
}

impl WindowState for IntSum<'_> {
    type Output = i64;

    fn push(&mut self, row: usize) {
        self.sum = self.sum.wrapping_add(self.values[row]);
    }

    fn pop(&mut self, row: usize) {
        self.sum = self.sum.wrapping_sub(self.values[row]);
    }

    fn finish(&self, _count: usize) -> i64 {
        self.sum
    }
}

/// Float window sum with Neumaier compensation, so a large value leaving
/// the window does not wipe out the small ones that remain. Non-finite
/// values are counted rather than added.
struct FloatSum<'a, T> {
    values: &'a [T],
    sum: f64,
    compensation: f64,
    nan: usize,
    pos_inf: usize,
    neg_inf: usize,
}

impl<'a, T: NumericNative> FloatSum<'a, T> {
    fn new(values: &'a [T]) -> Self {
        Self {
            values,
            sum: 0.0,
            compensation: 0.0,
            nan: 0,
            pos_inf: 0,
            neg_inf: 0,
        }
    }

    fn update(&mut self, row: usize, sign: f64, step: isize) {
        let v = self.values[row].to_f64();
        let bump = |n: &mut usize| *n = (*n as isize + step) as usize;
        if v.is_nan() {
            bump(&mut self.nan);
        } else if v == f64::INFINITY {
            bump(&mut self.pos_inf);
        } else if v == f64::NEG_INFINITY {
            bump(&mut self.neg_inf);
        } else {
            self.add(sign * v);
        }
    }

    fn add(&mut self, v: f64) {
        let t = self.sum + v;
        if self.sum.abs() >= v.abs() {
            self.compensation += (self.sum - t) + v;
        } else {
            self.compensation += (v - t) + self.sum;
        }
        self.sum = t;
    }
}

impl<T: NumericNative> WindowState for FloatSum<'_, T> {
    type Output = f64;

    fn push(&mut self, row: usize) {
        self.update(row, 1.0, 1);
    }

    fn pop(&mut self, row: usize) {
        self.update(row, -1.0, -1);
    }

    fn clear(&mut self) {
        self.sum = 0.0;
        self.compensation = 0.0;
    }

    fn finish(&self, _count: usize) -> f64 {
        if self.nan > 0 || (self.pos_inf > 0 && self.neg_inf > 0) {
            f64::NAN
        } else if self.pos_inf > 0 {
            f64::INFINITY
        } else if self.neg_inf > 0 {
            f64::NEG_INFINITY
        } else {
            self.sum + self.compensation
        }
    }
}

/// Sum of the valid values among the last `window` rows.
pub fn rolling_sum(series: &Series, window: usize, min_periods: usize) -> Result<Series> {
    validate_window(window, min_periods)?;
    let column = series.column();
    let out = match column.data() {
        ColumnData::Int64(v) => Column::from_options(rolling(column, window, min_periods, IntSum { values: v, sum: 0 })),
        ColumnData::Float64(v) => Column::from_options(rolling(column, window, min_periods, FloatSum::new(v))),
        ColumnData::Float32(v) => Column::from_options(
            rolling(column, window, min_periods, FloatSum::new(v))
                .into_iter()
                .map(|s| s.map(|s| s as f32))
                .collect(),
        ),
        ColumnData::Boolean(_) => return rolling_sum(&series.cast(DataType::Int64)?, window, min_periods),
        ColumnData::Utf8(_) => return Err(numeric_error("rolling_sum", DataType::Utf8)),
    };
    Ok(series.with_column(out))
}

/// Mean of the valid values among the last `window` rows, as Float64.
pub fn rolling_mean(series: &Series, window: usize, min_periods: usize) -> Result<Series> {
    validate_window(window, min_periods)?;
    let column = series.column();
    let means: Vec<Option<f64>> = match column.data() {
        ColumnData::Int64(v) => {
            let state = MeanOf(IntSum { values: v, sum: 0 });
            rolling(column, window, min_periods, state)
        }
        ColumnData::Float64(v) => rolling(column, window, min_periods, MeanOf(FloatSum::new(v))),
        ColumnData::Float32(v) => rolling(column, window, min_periods, MeanOf(FloatSum::new(v))),
        ColumnData::Boolean(_) => return rolling_mean(&series.cast(DataType::Int64)?, window, min_periods),
        ColumnData::Utf8(_) => return Err(numeric_error("rolling_mean", DataType::Utf8)),
    };
    Ok(series.with_column(Column::from_options(means)))
}

struct MeanOf<S>(S);

impl<S> WindowState for MeanOf<S>
where
    S: WindowState,
    S::Output: Into<SumValue>,
{
    type Output = f64;

    fn push(&mut self, row: usize) {
        self.0.push(row);
    }

    fn pop(&mut self, row: usize) {
        self.0.pop(row);
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn finish(&self, count: usize) -> f64 {
        let SumValue(sum) = self.0.finish(count).into();
        sum / count as f64
    }
}

struct SumValue(f64);

impl From<i64> for SumValue {
    fn from(v: i64) -> Self {
        SumValue(v as f64)
    }
}

impl From<f64> for SumValue {
    fn from(v: f64) -> Self {
        SumValue(v)
    }
}

/// Minimum (`Less`) or maximum (`Greater`) over the last `window` rows,
/// using a monotonic deque of candidate rows.
pub fn rolling_extreme(series: &Series, window: usize, min_periods: usize, keep: Ordering) -> Result<Series> {
    validate_window(window, min_periods)?;
    let column = series.column();
    let cmp = RowCmp::new(column);
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut count = 0usize;

    let indices: Vec<Option<usize>> = (0..column.len())
        .map(|i| {
            if column.is_valid(i) {
                while let Some(&back) = deque.back() {
                    if cmp.compare(back, i) == keep {
                        break;
                    }
                    deque.pop_back();
                }
                deque.push_back(i);
                count += 1;
            }
            if i >= window && column.is_valid(i - window) {
                count -= 1;
            }
            while deque.front().map_or(false, |&front| i - front >= window) {
                deque.pop_front();
            }
            if count >= min_periods {
                deque.front().copied()
            } else {
                None
            }
        })
        .collect();
    Ok(series.with_column(column.take_opt(&indices)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[Option<i64>]) -> Series {
        Series::new("x", values.to_vec()).unwrap()
    }

    #[test]
    fn test_lag_and_lead_with_default() {
        let s = Series::new("x", [1, 2, 3]).unwrap();
        let lagged = lag(&s, 1, &Scalar::Int64(0)).unwrap();
        assert_eq!(lagged.to_vec::<i64>().unwrap(), vec![Some(0), Some(1), Some(2)]);
        let led = lead(&s, 2, &Scalar::Null).unwrap();
        assert_eq!(led.to_vec::<i64>().unwrap(), vec![Some(3), None, None]);
        assert_eq!(led.name(), "x");
        assert!(lag(&s, 1, &Scalar::from("a")).is_err());
    }

    #[test]
    fn test_shift_past_the_end_is_all_default() {
        let s = Series::new("x", [1, 2, 3]).unwrap();
        let zero = Scalar::Int64(0);
        for periods in [3, 4, 1usize << 63, usize::MAX] {
            assert_eq!(lag(&s, periods, &zero).unwrap().to_vec::<i64>().unwrap(), vec![Some(0); 3]);
            assert_eq!(lead(&s, periods, &zero).unwrap().to_vec::<i64>().unwrap(), vec![Some(0); 3]);
        }
        let func = WindowFunc::Lead {
            periods: usize::MAX,
            default: Scalar::Int64(-1),
        };
        assert_eq!(apply_window(&func, &s).unwrap().to_vec::<i64>().unwrap(), vec![Some(-1); 3]);
    }

    #[test]
    fn test_diff_and_pct_change() {
        let s = ints(&[Some(1), Some(3), None, Some(10)]);
        assert_eq!(diff(&s, 1).unwrap().to_vec::<i64>().unwrap(), vec![None, Some(2), None, None]);
        assert_eq!(diff(&s, 3).unwrap().to_vec::<i64>().unwrap(), vec![None, None, None, Some(9)]);
        let p = Series::new("p", [0.0, 2.0, 3.0]).unwrap();
        assert_eq!(pct_change(&p).unwrap().to_vec::<f64>().unwrap(), vec![None, None, Some(0.5)]);
    }

    #[test]
    fn test_cumulative() {
        let s = ints(&[Some(2), None, Some(1), Some(5)]);
        assert_eq!(cum_sum(&s).unwrap().to_vec::<i64>().unwrap(), vec![Some(2), None, Some(3), Some(8)]);
        let min = cum_extreme(&s, Ordering::Less).unwrap();
        assert_eq!(min.to_vec::<i64>().unwrap(), vec![Some(2), None, Some(1), Some(1)]);
        let max = cum_extreme(&s, Ordering::Greater).unwrap();
        assert_eq!(max.to_vec::<i64>().unwrap(), vec![Some(2), None, Some(2), Some(5)]);
    }

    #[test]
    fn test_rolling_mean_partial_windows() {
        let s = Series::new("x", [1, 2, 3, 4]).unwrap();
        let mean = rolling_mean(&s, 3, 1).unwrap();
        assert_eq!(mean.to_vec::<f64>().unwrap(), vec![Some(1.0), Some(1.5), Some(2.0), Some(3.0)]);
        assert_eq!(mean.data_type(), DataType::Float64);
    }

    #[test]
    fn test_rolling_sum_min_periods_and_nulls() {
        let s = ints(&[Some(1), None, Some(3), Some(4), None]);
        let sum = rolling_sum(&s, 2, 2).unwrap();
        assert_eq!(sum.to_vec::<i64>().unwrap(), vec![None, None, None, Some(7), None]);
        let sum = rolling_sum(&s, 2, 1).unwrap();
        assert_eq!(sum.to_vec::<i64>().unwrap(), vec![Some(1), Some(1), Some(3), Some(7), Some(4)]);
    }

    #[test]
    fn test_rolling_sum_recovers_after_infinity_leaves() {
        let s = Series::new("x", [1.0, f64::INFINITY, 2.0, 3.0]).unwrap();
        let sum = rolling_sum(&s, 2, 1).unwrap();
        assert_eq!(
            sum.to_vec::<f64>().unwrap(),
            vec![Some(1.0), Some(f64::INFINITY), Some(f64::INFINITY), Some(5.0)]
        );
    }

    #[test]
    fn test_rolling_extremes() {
        let s = Series::new("x", [3, 1, 4, 1, 5, 9, 2]).unwrap();
        let min = rolling_extreme(&s, 3, 1, Ordering::Less).unwrap();
        assert_eq!(
            min.to_vec::<i64>().unwrap(),
            vec![Some(3), Some(1), Some(1), Some(1), Some(1), Some(1), Some(2)]
        );
        let max = rolling_extreme(&s, 3, 1, Ordering::Greater).unwrap();
        assert_eq!(
            max.to_vec::<i64>().unwrap(),
            vec![Some(3), Some(3), Some(4), Some(4), Some(5), Some(9), Some(9)]
        );
    }

    #[test]
    fn test_float_rolling_sum_survives_large_values_leaving() {
        let s = Series::new("x", [1e16, 1.0, 1.0]).unwrap();
        assert_eq!(
            rolling_sum(&s, 1, 1).unwrap().to_vec::<f64>().unwrap(),
            vec![Some(1e16), Some(1.0), Some(1.0)]
        );
        let s = Series::new("x", [1e16, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(
            rolling_sum(&s, 2, 1).unwrap().to_vec::<f64>().unwrap(),
            vec![Some(1e16), Some(1e16 + 1.0), Some(2.0), Some(2.0)]
        );
        let mean = rolling_mean(&s, 1, 1).unwrap();
        assert_eq!(mean.get(3), Scalar::Float64(1.0));
    }

    #[test]
    fn test_float_rolling_sum_restarts_after_null_gap() {
        let s = Series::new("x", [Some(0.1), Some(0.2), None, None, Some(0.3)]).unwrap();
        let sum = rolling_sum(&s, 2, 1).unwrap().to_vec::<f64>().unwrap();
        assert_eq!(sum[3], None);
        assert_eq!(sum[4], Some(0.3));
    }

    #[test]
    fn test_windows_longer_than_series() {
        let s = Series::new("x", [1, 3, 2]).unwrap();
        let max = rolling_extreme(&s, usize::MAX, 1, Ordering::Greater).unwrap();
        assert_eq!(max.to_vec::<i64>().unwrap(), vec![Some(1), Some(3), Some(3)]);
        let min = rolling_extreme(&s, usize::MAX, 1, Ordering::Less).unwrap();
        assert_eq!(min.to_vec::<i64>().unwrap(), vec![Some(1), Some(1), Some(1)]);
        let sum = rolling_sum(&s, usize::MAX, 1).unwrap();
        assert_eq!(sum.to_vec::<i64>().unwrap(), vec![Some(1), Some(4), Some(6)]);
    }

    proptest::proptest! {
        #[test]
        fn prop_rolling_extremes_match_brute_force(
            values in proptest::collection::vec(proptest::option::weighted(0.8, -50i64..50), 0..80),
            window in 1usize..10,
        ) {
            let s = ints(&values);
            let max = rolling_extreme(&s, window, 1, Ordering::Greater).unwrap().to_vec::<i64>().unwrap();
            let min = rolling_extreme(&s, window, 1, Ordering::Less).unwrap().to_vec::<i64>().unwrap();
            for i in 0..values.len() {
                let start = (i + 1).saturating_sub(window);
                let seen = values[start..=i].iter().flatten();
                proptest::prop_assert_eq!(max[i], seen.clone().max().copied());
                proptest::prop_assert_eq!(min[i], seen.min().copied());
            }
        }

        #[test]
        fn prop_float_rolling_sum_matches_window_sum(
            values in proptest::collection::vec(-1000i32..1000, 1..80),
            window in 1usize..10,
        ) {
            // Quarter steps are exact in f64, so any summation order agrees.
            let floats: Vec<f64> = values.iter().map(|&v| v as f64 * 0.25).collect();
            let sums = rolling_sum(&Series::new("x", floats.clone()).unwrap(), window, 1)
                .unwrap()
                .to_vec::<f64>()
                .unwrap();
            for i in 0..floats.len() {
                let start = (i + 1).saturating_sub(window);
                proptest::prop_assert_eq!(sums[i], Some(floats[start..=i].iter().sum::<f64>()));
            }
        }
    }

    #[test]
    fn test_invalid_window_arguments() {
        let s = Series::new("x", [1, 2]).unwrap();
        assert!(matches!(rolling_sum(&s, 0, 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(rolling_mean(&s, 2, 3), Err(Error::InvalidArgument(_))));
        assert!(matches!(rolling_extreme(&s, 2, 0, Ordering::Less), Err(Error::InvalidArgument(_))));
    }
}
