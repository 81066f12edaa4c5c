use crate::bitmap::{Bitmap, MutableBitmap};
use crate::column::{NativeType, NumericNative};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::ops::Range;

/// Kernels over contiguous buffers.
///
/// Reductions take the validity bitmap and a row range so callers can split a
/// column into chunks; elementwise kernels broadcast a length-1 operand.
pub struct VectorizedOps;

impl VectorizedOps {
    /// Sum of the valid values in `range`, and how many there were.
    pub fn sum<T: NumericNative>(
        values: &[T],
        validity: Option<&Bitmap>,
        range: Range<usize>,
    ) -> (T, usize) {
        match validity {
            None => {
                let n = range.len();
                let sum = values[range].iter().fold(T::zero(), |acc, v| acc.plus(*v));
                (sum, n)
            }
            Some(bits) => range.fold((T::zero(), 0), |(acc, n), i| {
                if bits.get(i) {
                    (acc.plus(values[i]), n + 1)
                } else {
                    (acc, n)
                }
            }),
        }
    }

    /// Sum of squared deviations from `mean` over the valid values in `range`.
    pub fn sum_squared_deviation<T: NumericNative>(
        values: &[T],
        validity: Option<&Bitmap>,
        range: Range<usize>,
        mean: f64,
    ) -> f64 {
        range
            .filter(|&i| validity.map_or(true, |b| b.get(i)))
            .map(|i| {
                let d = values[i].to_f64() - mean;
                d * d
            })
            .sum()
    }

    pub fn min<T: NativeType>(
        values: &[T],
        validity: Option<&Bitmap>,
        range: Range<usize>,
    ) -> Option<T> {
        Self::extreme(values, validity, range, Ordering::Less)
    }

    pub fn max<T: NativeType>(
        values: &[T],
        validity: Option<&Bitmap>,
        range: Range<usize>,
    ) -> Option<T> {
        Self::extreme(values, validity, range, Ordering::Greater)
    }

    fn extreme<T: NativeType>(
        values: &[T],
        validity: Option<&Bitmap>,
        range: Range<usize>,
        keep: Ordering,
    ) -> Option<T> {
        range
            .filter(|&i| validity.map_or(true, |b| b.get(i)))
            .map(|i| values[i])
            .reduce(|best, v| if v.total_cmp(&best) == keep { v } else { best })
    }

    /// `q` quantile of `values` with linear interpolation between the two
    /// nearest ranks. Sorts `values` in place; `None` when it is empty.
    pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        values.sort_unstable_by(f64::total_cmp);
        let pos = q * (values.len() - 1) as f64;
        let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
        if lo == hi {
            return Some(values[lo]);
        }
        Some(values[lo] + (values[hi] - values[lo]) * (pos - lo as f64))
    }

    pub fn check_quantile(q: f64) -> Result<()> {
        if (0.0..=1.0).contains(&q) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!("quantile must be between 0 and 1, got {}", q)))
        }
    }

    /// Combines two optional partials, keeping the one ordered as `keep`.
    pub fn pick<T: NativeType>(a: Option<T>, b: Option<T>, keep: Ordering) -> Option<T> {
        match (a, b) {
            (Some(x), Some(y)) => Some(if y.total_cmp(&x) == keep { y } else { x }),
            (x, None) => x,
            (None, y) => y,
        }
    }

    /// Elementwise `f(lhs[i], rhs[i])`; a length-1 side is broadcast.
    pub fn binary<T, U, F>(lhs: &[T], rhs: &[T], f: F) -> Vec<U>
    where
        T: Copy,
        F: Fn(T, T) -> U,
    {
        match (lhs.len(), rhs.len()) {
            (1, n) if n != 1 => {
                let l = lhs[0];
                rhs.iter().map(|&r| f(l, r)).collect()
            }
            (n, 1) if n != 1 => {
                let r = rhs[0];
                lhs.iter().map(|&l| f(l, r)).collect()
            }
            _ => lhs.iter().zip(rhs.iter()).map(|(&l, &r)| f(l, r)).collect(),
        }
    }

    pub fn unary<T, U, F>(values: &[T], f: F) -> Vec<U>
    where
        T: Copy,
        F: Fn(T) -> U,
    {
        values.iter().map(|&v| f(v)).collect()
    }

    /// Elementwise op against a scalar, e.g. add-by-scalar or compare-to-scalar.
    pub fn scalar<T, U, F>(values: &[T], scalar: T, f: F) -> Vec<U>
    where
        T: Copy,
        F: Fn(T, T) -> U,
    {
        values.iter().map(|&v| f(v, scalar)).collect()
    }

    /// Validity of a binary result of length `len`: a slot is valid only when
    /// both (possibly broadcast) inputs are valid.
    pub fn combine_validity(
        lhs: Option<&Bitmap>,
        lhs_len: usize,
        rhs: Option<&Bitmap>,
        rhs_len: usize,
        len: usize,
    ) -> Option<Bitmap> {
        if lhs.is_none() && rhs.is_none() {
            return None;
        }
        let at = |bits: Option<&Bitmap>, bits_len: usize, i: usize| {
            bits.map_or(true, |b| b.get(if bits_len == 1 { 0 } else { i }))
        };
        let mut out = MutableBitmap::with_capacity(len);
        for i in 0..len {
            out.push(at(lhs, lhs_len, i) && at(rhs, rhs_len, i));
        }
        out.into_validity()
    }
}
