use crate::bitmap::Bitmap;
use crate::column::{Column, ColumnData, NativeType, NumericNative};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field};
use crate::types::Scalar;
use crate::vectorized::VectorizedOps;
use std::cmp::Ordering;

/// Values that can become the storage of a [`Series`].
pub trait IntoColumn {
    fn into_column(self) -> Column;
}

impl IntoColumn for Column {
    fn into_column(self) -> Column {
        self
    }
}

macro_rules! impl_into_column_native {
    ($($t:ty),*) => {$(
        impl IntoColumn for Vec<$t> {
            fn into_column(self) -> Column {
                Column::from_vec(self)
            }
        }

        impl IntoColumn for Vec<Option<$t>> {
            fn into_column(self) -> Column {
                Column::from_options(self)
            }
        }

        impl<const N: usize> IntoColumn for [$t; N] {
            fn into_column(self) -> Column {
                Column::from_vec(self.to_vec())
            }
        }

        impl<const N: usize> IntoColumn for [Option<$t>; N] {
            fn into_column(self) -> Column {
                Column::from_options(self.to_vec())
            }
        }
    )*};
}

impl_into_column_native!(i64, f32, f64, bool);

// Unsuffixed integer literals infer as i32; store them as Int64.
impl IntoColumn for Vec<i32> {
    fn into_column(self) -> Column {
        Column::from_vec(self.into_iter().map(i64::from).collect::<Vec<_>>())
    }
}

impl IntoColumn for Vec<Option<i32>> {
    fn into_column(self) -> Column {
        Column::from_options(self.into_iter().map(|v| v.map(i64::from)).collect())
    }
}

impl<const N: usize> IntoColumn for [i32; N] {
    fn into_column(self) -> Column {
        self.to_vec().into_column()
    }
}

impl<const N: usize> IntoColumn for [Option<i32>; N] {
    fn into_column(self) -> Column {
        self.to_vec().into_column()
    }
}

impl<'a> IntoColumn for Vec<&'a str> {
    fn into_column(self) -> Column {
        Column::from_strs(&self)
    }
}

impl<'a> IntoColumn for Vec<Option<&'a str>> {
    fn into_column(self) -> Column {
        Column::from_opt_strs(&self)
    }
}

impl<'a, const N: usize> IntoColumn for [&'a str; N] {
    fn into_column(self) -> Column {
        Column::from_strs(&self)
    }
}

impl<'a, const N: usize> IntoColumn for [Option<&'a str>; N] {
    fn into_column(self) -> Column {
        Column::from_opt_strs(&self)
    }
}

impl IntoColumn for Vec<String> {
    fn into_column(self) -> Column {
        Column::from_strs(&self)
    }
}

impl IntoColumn for Vec<Option<String>> {
    fn into_column(self) -> Column {
        Column::from_opt_strs(&self)
    }
}

/// A named column.
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    column: Column,
}

impl Series {
    /// Fails with a schema error when `name` is empty.
    pub fn new(name: impl Into<String>, values: impl IntoColumn) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Schema("series name cannot be empty".to_string()));
        }
        Ok(Self {
            name,
            column: values.into_column(),
        })
    }

    /// Builds a series of `data_type` from scalars, optionally masking rows
    /// out with an explicit validity (`false` = null).
    pub fn from_scalars(
        name: impl Into<String>,
        data_type: DataType,
        values: &[Scalar],
        validity: Option<&[bool]>,
    ) -> Result<Self> {
        let column = Column::from_scalars(data_type, values)?;
        let column = match validity {
            None => column,
            Some(mask) => {
                if mask.len() != values.len() {
                    return Err(Error::Shape(format!(
                        "validity has {} entries but {} values were given",
                        mask.len(),
                        values.len()
                    )));
                }
                let merged = VectorizedOps::combine_validity(
                    column.validity(),
                    column.len(),
                    Some(&Bitmap::from_bools(mask)),
                    mask.len(),
                    column.len(),
                );
                Column::new(column.data().clone(), merged)?
            }
        };
        Self::new(name, column)
    }

    pub fn full_null(name: impl Into<String>, data_type: DataType, len: usize) -> Result<Self> {
        Self::new(name, Column::full_null(data_type, len))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&self, name: impl Into<String>) -> Result<Series> {
        Series::new(name, self.column.clone())
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn into_column(self) -> Column {
        self.column
    }

    pub fn field(&self) -> Field {
        Field {
            name: self.name.clone(),
            data_type: self.data_type(),
            nullable: self.null_count() > 0,
        }
    }

    pub fn len(&self) -> usize {
        self.column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    pub fn data_type(&self) -> DataType {
        self.column.data_type()
    }

    pub fn null_count(&self) -> usize {
        self.column.null_count()
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.column.is_valid(i)
    }

    pub fn get(&self, i: usize) -> Scalar {
        self.column.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        self.column.iter()
    }

    /// Values as `Option<T>`, or a type error if `T` is not this series' kind.
    pub fn to_vec<T: NativeType>(&self) -> Result<Vec<Option<T>>> {
        let values = self
            .column
            .as_native::<T>()
            .ok_or_else(|| Error::data_type(T::DATA_TYPE, self.data_type()))?;
        Ok((0..self.len())
            .map(|i| self.is_valid(i).then(|| values[i]))
            .collect())
    }

    pub fn with_column(&self, column: Column) -> Series {
        Series {
            name: self.name.clone(),
            column,
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<Series> {
        Ok(self.with_column(self.column.slice(offset, len)?))
    }

    pub fn head(&self, n: usize) -> Series {
        let n = n.min(self.len());
        self.slice(0, n).unwrap_or_else(|_| self.clone())
    }

    pub fn tail(&self, n: usize) -> Series {
        let n = n.min(self.len());
        self.slice(self.len() - n, n)
            .unwrap_or_else(|_| self.clone())
    }

    /// Keeps rows where `mask` is true; null mask entries drop the row.
    pub fn filter(&self, mask: &Series) -> Result<Series> {
        Ok(self.with_column(self.column.filter(mask.column())?))
    }

    pub fn take(&self, indices: &[usize]) -> Series {
        self.with_column(self.column.take(indices))
    }

    pub fn take_opt(&self, indices: &[Option<usize>]) -> Series {
        self.with_column(self.column.take_opt(indices))
    }

    pub fn cast(&self, data_type: DataType) -> Result<Series> {
        Ok(self.with_column(self.column.cast(data_type)?))
    }

    // ---- reductions ----

    pub fn sum(&self) -> Result<Scalar> {
        self.sum_with(&ExecutionContext::default())
    }

    /// Sum of the valid values; an all-null or empty series sums to zero.
    pub fn sum_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        let validity = self.column.validity();
        match self.column.data() {
            ColumnData::Int64(b) => Ok(Scalar::Int64(sum_native(b, validity, ctx).0)),
            ColumnData::Float32(b) => Ok(Scalar::Float32(sum_native(b, validity, ctx).0)),
            ColumnData::Float64(b) => Ok(Scalar::Float64(sum_native(b, validity, ctx).0)),
            ColumnData::Boolean(b) => Ok(Scalar::Int64(count_true(b, validity, ctx) as i64)),
            ColumnData::Utf8(_) => Err(Error::Type(format!(
                "cannot sum series '{}' of type Utf8",
                self.name
            ))),
        }
    }

    pub fn mean(&self) -> Result<Scalar> {
        self.mean_with(&ExecutionContext::default())
    }

    /// `sum / count` over valid values; null when there are none.
    pub fn mean_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        let validity = self.column.validity();
        let (sum, count) = match self.column.data() {
            ColumnData::Int64(b) => sum_f64(b, validity, ctx),
            ColumnData::Float32(b) => sum_f64(b, validity, ctx),
            ColumnData::Float64(b) => sum_f64(b, validity, ctx),
            ColumnData::Boolean(b) => (
                count_true(b, validity, ctx) as f64,
                self.len() - self.null_count(),
            ),
            ColumnData::Utf8(_) => {
                return Err(Error::Type(format!(
                    "cannot take the mean of series '{}' of type Utf8",
                    self.name
                )))
            }
        };
        Ok(if count == 0 {
            Scalar::Null
        } else {
            Scalar::Float64(sum / count as f64)
        })
    }

    pub fn min(&self) -> Result<Scalar> {
        self.min_with(&ExecutionContext::default())
    }

    pub fn min_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        Ok(self.extreme(ctx, Ordering::Less))
    }

    pub fn max(&self) -> Result<Scalar> {
        self.max_with(&ExecutionContext::default())
    }

    pub fn max_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        Ok(self.extreme(ctx, Ordering::Greater))
    }

    fn extreme(&self, ctx: &ExecutionContext, keep: Ordering) -> Scalar {
        let validity = self.column.validity();
        match self.column.data() {
            ColumnData::Int64(b) => extreme_native(b, validity, ctx, keep),
            ColumnData::Float32(b) => extreme_native(b, validity, ctx, keep),
            ColumnData::Float64(b) => extreme_native(b, validity, ctx, keep),
            ColumnData::Boolean(b) => extreme_native(b, validity, ctx, keep),
            ColumnData::Utf8(s) => (0..s.len())
                .filter(|&i| self.is_valid(i))
                .map(|i| s.value(i))
                .reduce(|best, v| if v.cmp(best) == keep { v } else { best })
                .map_or(Scalar::Null, |v| Scalar::Utf8(v.to_string())),
        }
    }

    /// Number of valid values.
    pub fn count(&self) -> usize {
        self.len() - self.null_count()
    }

    pub fn var(&self) -> Result<Scalar> {
        self.var_with(&ExecutionContext::default())
    }

    /// Sample variance (ddof = 1); null with fewer than two valid values.
    pub fn var_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        let validity = self.column.validity();
        let var = match self.column.data() {
            ColumnData::Int64(b) => var_native(b, validity, ctx),
            ColumnData::Float32(b) => var_native(b, validity, ctx),
            ColumnData::Float64(b) => var_native(b, validity, ctx),
            ColumnData::Boolean(_) | ColumnData::Utf8(_) => {
                return Err(Error::Type(format!(
                    "variance requires a numeric series, '{}' is {}",
                    self.name,
                    self.data_type()
                )))
            }
        };
        Ok(var.map_or(Scalar::Null, Scalar::Float64))
    }

    pub fn std(&self) -> Result<Scalar> {
        self.std_with(&ExecutionContext::default())
    }

    pub fn std_with(&self, ctx: &ExecutionContext) -> Result<Scalar> {
        Ok(match self.var_with(ctx)? {
            Scalar::Float64(v) => Scalar::Float64(v.sqrt()),
            other => other,
        })
    }

    /// Linearly interpolated quantile of the valid values as Float64; null
    /// when there are none. `q` must lie in `[0, 1]`.
    pub fn quantile(&self, q: f64) -> Result<Scalar> {
        VectorizedOps::check_quantile(q)?;
        let mut values = match self.column.data() {
            ColumnData::Int64(b) => valid_f64(b, self.column.validity()),
            ColumnData::Float32(b) => valid_f64(b, self.column.validity()),
            ColumnData::Float64(b) => valid_f64(b, self.column.validity()),
            ColumnData::Boolean(_) | ColumnData::Utf8(_) => {
                return Err(Error::Type(format!(
                    "quantile requires a numeric series, '{}' is {}",
                    self.name,
                    self.data_type()
                )))
            }
        };
        Ok(VectorizedOps::quantile(&mut values, q).map_or(Scalar::Null, Scalar::Float64))
    }

    pub fn median(&self) -> Result<Scalar> {
        self.quantile(0.5)
    }

    /// Value of the first row (possibly null); null for an empty series.
    pub fn first(&self) -> Scalar {
        self.get(0)
    }

    pub fn last(&self) -> Scalar {
        match self.len() {
            0 => Scalar::Null,
            n => self.get(n - 1),
        }
    }
}

/// Same name and same values, nulls included.
impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.column == other.column
    }
}

fn valid_f64<T: NumericNative>(values: &[T], validity: Option<&Bitmap>) -> Vec<f64> {
    (0..values.len())
        .filter(|&i| validity.map_or(true, |b| b.get(i)))
        .map(|i| values[i].to_f64())
        .collect()
}

fn sum_native<T: NumericNative>(
    values: &[T],
    validity: Option<&Bitmap>,
    ctx: &ExecutionContext,
) -> (T, usize) {
    ctx.reduce(
        values.len(),
        (T::zero(), 0),
        |range| VectorizedOps::sum(values, validity, range),
        |(a, n), (b, m)| (a.plus(b), n + m),
    )
}

fn sum_f64<T: NumericNative>(
    values: &[T],
    validity: Option<&Bitmap>,
    ctx: &ExecutionContext,
) -> (f64, usize) {
    ctx.reduce(
        values.len(),
        (0.0, 0),
        |range| {
            let (sum, n) = VectorizedOps::sum(values, validity, range);
            (sum.to_f64(), n)
        },
        |(a, n), (b, m)| (a + b, n + m),
    )
}

fn count_true(values: &[bool], validity: Option<&Bitmap>, ctx: &ExecutionContext) -> usize {
    ctx.reduce(
        values.len(),
        0,
        |range| {
            range
                .filter(|&i| values[i] && validity.map_or(true, |b| b.get(i)))
                .count()
        },
        |a, b| a + b,
    )
}

fn extreme_native<T: NativeType>(
    values: &[T],
    validity: Option<&Bitmap>,
    ctx: &ExecutionContext,
    keep: Ordering,
) -> Scalar {
    ctx.reduce(
        values.len(),
        None,
        |range| match keep {
            Ordering::Less => VectorizedOps::min(values, validity, range),
            _ => VectorizedOps::max(values, validity, range),
        },
        |a, b| VectorizedOps::pick(a, b, keep),
    )
    .map_or(Scalar::Null, T::to_scalar)
}

fn var_native<T: NumericNative>(
    values: &[T],
    validity: Option<&Bitmap>,
    ctx: &ExecutionContext,
) -> Option<f64> {
    let (sum, count) = sum_f64(values, validity, ctx);
    if count < 2 {
        return None;
    }
    let mean = sum / count as f64;
    let squares = ctx.reduce(
        values.len(),
        0.0,
        |range| VectorizedOps::sum_squared_deviation(values, validity, range, mean),
        |a, b| a + b,
    );
    Some(squares / (count - 1) as f64)
}
