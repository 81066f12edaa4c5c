use crate::bitmap::{Bitmap, MutableBitmap};
use crate::buffer::{Buffer, Utf8Buffer, Utf8BufferBuilder};
use crate::error::{Error, Result};
use crate::schema::DataType;
use crate::types::Scalar;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Expands `$prim` once per primitive variant (binding the typed buffer to
/// `$buf`) and `$utf8` for the string variant, so every kind gets its own
/// monomorphized code path.
macro_rules! dispatch {
    ($data:expr, $buf:ident => $prim:expr, $strings:ident => $utf8:expr) => {
        match $data {
            $crate::column::ColumnData::Int64($buf) => $prim,
            $crate::column::ColumnData::Float32($buf) => $prim,
            $crate::column::ColumnData::Float64($buf) => $prim,
            $crate::column::ColumnData::Boolean($buf) => $prim,
            $crate::column::ColumnData::Utf8($strings) => $utf8,
        }
    };
}

pub(crate) use dispatch;

/// Rust types that back a fixed-width column kind.
pub trait NativeType: Copy + Default + PartialOrd + Send + Sync + Debug + 'static {
    const DATA_TYPE: DataType;

    fn into_data(buffer: Buffer<Self>) -> ColumnData;

    fn buffer(data: &ColumnData) -> Option<&Buffer<Self>>;

    fn to_scalar(self) -> Scalar;

    fn from_scalar(value: &Scalar) -> Option<Self>;

    /// Total order; for floats this is IEEE `totalOrder`.
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Hashable bit pattern, equal for values that compare equal as keys.
    fn key_bits(self) -> u64;
}

/// Fixed-width kinds that support arithmetic.
pub trait NumericNative: NativeType {
    fn zero() -> Self;
    fn plus(self, rhs: Self) -> Self;
    fn minus(self, rhs: Self) -> Self;
    fn times(self, rhs: Self) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl NativeType for i64 {
    const DATA_TYPE: DataType = DataType::Int64;

    fn into_data(buffer: Buffer<Self>) -> ColumnData {
        ColumnData::Int64(buffer)
    }

    fn buffer(data: &ColumnData) -> Option<&Buffer<Self>> {
        match data {
            ColumnData::Int64(b) => Some(b),
            _ => None,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Int64(self)
    }

    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn key_bits(self) -> u64 {
        self as u64
    }
}

impl NumericNative for i64 {
    fn zero() -> Self {
        0
    }
    fn plus(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
    fn minus(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }
    fn times(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as i64
    }
}

impl NativeType for f64 {
    const DATA_TYPE: DataType = DataType::Float64;

    fn into_data(buffer: Buffer<Self>) -> ColumnData {
        ColumnData::Float64(buffer)
    }

    fn buffer(data: &ColumnData) -> Option<&Buffer<Self>> {
        match data {
            ColumnData::Float64(b) => Some(b),
            _ => None,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float64(self)
    }

    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Float64(v) => Some(*v),
            Scalar::Float32(v) => Some(*v as f64),
            Scalar::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    fn key_bits(self) -> u64 {
        crate::types::canonical_f64_bits(self)
    }
}

impl NumericNative for f64 {
    fn zero() -> Self {
        0.0
    }
    fn plus(self, rhs: Self) -> Self {
        self + rhs
    }
    fn minus(self, rhs: Self) -> Self {
        self - rhs
    }
    fn times(self, rhs: Self) -> Self {
        self * rhs
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl NativeType for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    fn into_data(buffer: Buffer<Self>) -> ColumnData {
        ColumnData::Float32(buffer)
    }

    fn buffer(data: &ColumnData) -> Option<&Buffer<Self>> {
        match data {
            ColumnData::Float32(b) => Some(b),
            _ => None,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float32(self)
    }

    fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Float32(v) => Some(*v),
            Scalar::Float64(v) => Some(*v as f32),
            Scalar::Int64(v) => Some(*v as f32),
            _ => None,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    fn key_bits(self) -> u64 {
        crate::types::canonical_f64_bits(self as f64)
    }
}

impl NumericNative for f32 {
    fn zero() -> Self {
        0.0
    }
    fn plus(self, rhs: Self) -> Self {
        self + rhs
    }
    fn minus(self, rhs: Self) -> Self {
        self - rhs
    }
    fn times(self, rhs: Self) -> Self {
        self * rhs
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl NativeType for bool {
    const DATA_TYPE: DataType = DataType::Boolean;

    fn into_data(buffer: Buffer<Self>) -> ColumnData {
        ColumnData::Boolean(buffer)
    }

    fn buffer(data: &ColumnData) -> Option<&Buffer<Self>> {
        match data {
            ColumnData::Boolean(b) => Some(b),
            _ => None,
        }
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Boolean(self)
    }

    fn from_scalar(value: &Scalar) -> Option<Self> {
        value.as_bool()
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn key_bits(self) -> u64 {
        self as u64
    }
}

/// Typed storage of a column, without validity.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Int64(Buffer<i64>),
    Float32(Buffer<f32>),
    Float64(Buffer<f64>),
    Boolean(Buffer<bool>),
    Utf8(Utf8Buffer),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        dispatch!(self, b => b.len(), s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Boolean(_) => DataType::Boolean,
            ColumnData::Utf8(_) => DataType::Utf8,
        }
    }
}

/// A typed, immutable buffer plus its validity bitmap.
///
/// `validity == None` means every slot is valid. A present bitmap always has
/// at least one unset bit and exactly `len` bits.
#[derive(Debug, Clone)]
pub struct Column {
    data: ColumnData,
    validity: Option<Bitmap>,
}

impl Column {
    pub fn new(data: ColumnData, validity: Option<Bitmap>) -> Result<Self> {
        if let Some(bitmap) = &validity {
            if bitmap.len() != data.len() {
                return Err(Error::Shape(format!(
                    "validity has {} entries but column has {} values",
                    bitmap.len(),
                    data.len()
                )));
            }
        }
        Ok(Self::from_parts(data, validity))
    }

    /// Caller guarantees the lengths already agree.
    pub(crate) fn from_parts(data: ColumnData, validity: Option<Bitmap>) -> Self {
        debug_assert!(validity.as_ref().map_or(true, |v| v.len() == data.len()));
        Self {
            data,
            validity: validity.filter(|v| v.unset_bits() > 0),
        }
    }

    pub fn from_vec<T: NativeType>(values: Vec<T>) -> Self {
        Self::from_parts(T::into_data(values.into()), None)
    }

    pub fn from_options<T: NativeType>(values: Vec<Option<T>>) -> Self {
        let mut validity = MutableBitmap::with_capacity(values.len());
        let values: Vec<T> = values
            .into_iter()
            .map(|v| {
                validity.push(v.is_some());
                v.unwrap_or_default()
            })
            .collect();
        Self::from_parts(T::into_data(values.into()), validity.into_validity())
    }

    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        let strings: Utf8Buffer = values.iter().map(|s| s.as_ref()).collect();
        Self::from_parts(ColumnData::Utf8(strings), None)
    }

    pub fn from_opt_strs<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let mut builder = Utf8BufferBuilder::with_capacity(values.len());
        let mut validity = MutableBitmap::with_capacity(values.len());
        for value in values {
            builder.push(value.as_ref().map_or("", |s| s.as_ref()));
            validity.push(value.is_some());
        }
        Self::from_parts(ColumnData::Utf8(builder.finish()), validity.into_validity())
    }

    pub fn full_null(data_type: DataType, len: usize) -> Self {
        let data = match data_type {
            DataType::Int64 => ColumnData::Int64(vec![0; len].into()),
            DataType::Float32 => ColumnData::Float32(vec![0.0; len].into()),
            DataType::Float64 => ColumnData::Float64(vec![0.0; len].into()),
            DataType::Boolean => ColumnData::Boolean(vec![false; len].into()),
            DataType::Utf8 => ColumnData::Utf8(std::iter::repeat("").take(len).collect()),
        };
        let validity = (len > 0).then(|| Bitmap::new_unset(len));
        Self::from_parts(data, validity)
    }

    /// Builds a column of `data_type` from scalars. Int64 scalars are accepted
    /// into float columns; any other mismatch is a type error.
    pub fn from_scalars(data_type: DataType, values: &[Scalar]) -> Result<Self> {
        fn native<T: NativeType>(values: &[Scalar]) -> Result<Column> {
            let converted = values
                .iter()
                .map(|v| match v {
                    Scalar::Null => Ok(None),
                    other => T::from_scalar(other).map(Some).ok_or_else(|| {
                        Error::data_type(
                            T::DATA_TYPE,
                            other.data_type().map_or("Null".to_string(), |d| d.to_string()),
                        )
                    }),
                })
                .collect::<Result<Vec<Option<T>>>>()?;
            Ok(Column::from_options(converted))
        }

        match data_type {
            DataType::Int64 => native::<i64>(values),
            DataType::Float32 => native::<f32>(values),
            DataType::Float64 => native::<f64>(values),
            DataType::Boolean => native::<bool>(values),
            DataType::Utf8 => {
                let strings = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => Ok(None),
                        Scalar::Utf8(s) => Ok(Some(s.as_str())),
                        other => Err(Error::data_type(
                            DataType::Utf8,
                            other.data_type().map_or("Null".to_string(), |d| d.to_string()),
                        )),
                    })
                    .collect::<Result<Vec<Option<&str>>>>()?;
                Ok(Column::from_opt_strs(&strings))
            }
        }
    }

    /// Repeats `value` `len` times.
    pub fn from_scalar(value: &Scalar, data_type: DataType, len: usize) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::full_null(data_type, len));
        }
        Self::from_scalars(data_type, std::slice::from_ref(value)).map(|c| c.take(&vec![0; len]))
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> Option<&Bitmap> {
        self.validity.as_ref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn null_count(&self) -> usize {
        self.validity.as_ref().map_or(0, |v| v.unset_bits())
    }

    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        self.validity.as_ref().map_or(true, |v| v.get(i))
    }

    pub fn get(&self, i: usize) -> Scalar {
        if i >= self.len() || !self.is_valid(i) {
            return Scalar::Null;
        }
        dispatch!(&self.data, b => b[i].to_scalar(), s => Scalar::Utf8(s.value(i).to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn as_native<T: NativeType>(&self) -> Option<&Buffer<T>> {
        T::buffer(&self.data)
    }

    pub fn as_utf8(&self) -> Option<&Utf8Buffer> {
        match &self.data {
            ColumnData::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Zero-copy view of `len` rows starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Column> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| {
                Error::Shape(format!(
                    "slice {}..{} out of bounds for length {}",
                    offset,
                    offset.saturating_add(len),
                    self.len()
                ))
            })?;
        debug_assert!(end <= self.len());
        let data = match &self.data {
            ColumnData::Int64(b) => ColumnData::Int64(b.slice(offset, len)),
            ColumnData::Float32(b) => ColumnData::Float32(b.slice(offset, len)),
            ColumnData::Float64(b) => ColumnData::Float64(b.slice(offset, len)),
            ColumnData::Boolean(b) => ColumnData::Boolean(b.slice(offset, len)),
            ColumnData::Utf8(s) => ColumnData::Utf8(s.slice(offset, len)),
        };
        let validity = self.validity.as_ref().map(|v| v.slice(offset, len));
        Ok(Self::from_parts(data, validity))
    }

    /// Gathers rows by index. Indices must be in bounds.
    pub fn take(&self, indices: &[usize]) -> Column {
        fn gather<T: NativeType>(values: &Buffer<T>, indices: &[usize]) -> ColumnData {
            T::into_data(indices.iter().map(|&i| values[i]).collect::<Vec<_>>().into())
        }

        let data = dispatch!(&self.data, b => gather(b, indices), s => {
            ColumnData::Utf8(indices.iter().map(|&i| s.value(i)).collect())
        });
        let validity = self.validity.as_ref().map(|v| {
            let mut out = MutableBitmap::with_capacity(indices.len());
            for &i in indices {
                out.push(v.get(i));
            }
            out.freeze()
        });
        Self::from_parts(data, validity)
    }

    /// Gathers rows by optional index; `None` produces a null slot.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Column {
        fn gather<T: NativeType>(values: &Buffer<T>, indices: &[Option<usize>]) -> ColumnData {
            T::into_data(
                indices
                    .iter()
                    .map(|i| i.map_or_else(T::default, |i| values[i]))
                    .collect::<Vec<_>>()
                    .into(),
            )
        }

        let data = dispatch!(&self.data, b => gather(b, indices), s => {
            ColumnData::Utf8(indices.iter().map(|i| i.map_or("", |i| s.value(i))).collect())
        });
        let mut validity = MutableBitmap::with_capacity(indices.len());
        for i in indices {
            validity.push(i.map_or(false, |i| self.is_valid(i)));
        }
        Self::from_parts(data, validity.into_validity())
    }

    /// New column holding the rows of `self` followed by the rows of `other`.
    pub fn append(&self, other: &Column) -> Result<Column> {
        fn concat<T: NativeType>(a: &[T], b: &[T]) -> ColumnData {
            T::into_data([a, b].concat().into())
        }

        let data = match (&self.data, &other.data) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => concat(a, b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => concat(a, b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => concat(a, b),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => concat(a, b),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => ColumnData::Utf8(a.iter().chain(b.iter()).collect()),
            _ => return Err(Error::data_type(self.data_type(), other.data_type())),
        };
        let validity = if self.validity.is_none() && other.validity.is_none() {
            None
        } else {
            let mut bits = MutableBitmap::with_capacity(self.len() + other.len());
            for i in 0..self.len() {
                bits.push(self.is_valid(i));
            }
            for i in 0..other.len() {
                bits.push(other.is_valid(i));
            }
            Some(bits.freeze())
        };
        Ok(Self::from_parts(data, validity))
    }

    /// Keeps rows whose mask entry is `true`; null mask entries drop the row.
    pub fn filter(&self, mask: &Column) -> Result<Column> {
        let indices = mask_indices(mask, self.len())?;
        if indices.len() == self.len() {
            return Ok(self.clone());
        }
        Ok(self.take(&indices))
    }

    pub fn cast(&self, data_type: DataType) -> Result<Column> {
        if data_type == self.data_type() {
            return Ok(self.clone());
        }
        let source = self.data_type();
        let scalars: Vec<Scalar> = self
            .iter()
            .map(|v| cast_scalar(v, data_type))
            .collect::<Result<_>>()
            .map_err(|_| Error::Type(format!("cannot cast {} to {}", source, data_type)))?;
        Column::from_scalars(data_type, &scalars)
    }

    /// True when both columns view the same value storage.
    pub fn shares_storage(&self, other: &Column) -> bool {
        match (&self.data, &other.data) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.shares_storage(b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.shares_storage(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.shares_storage(b),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => a.shares_storage(b),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => a.shares_storage(b),
            _ => false,
        }
    }
}

/// Equal when lengths, dtypes and every slot (nulls included) agree.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.data_type() == other.data_type()
            && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

/// Row indices where a boolean mask is valid and `true`.
pub fn mask_indices(mask: &Column, expected_len: usize) -> Result<Vec<usize>> {
    let values = mask
        .as_native::<bool>()
        .ok_or_else(|| Error::data_type(DataType::Boolean, mask.data_type()))?;
    if mask.len() != expected_len {
        return Err(Error::Shape(format!(
            "mask has {} entries but column has {} rows",
            mask.len(),
            expected_len
        )));
    }
    Ok((0..values.len())
        .filter(|&i| values[i] && mask.is_valid(i))
        .collect())
}

fn cast_scalar(value: Scalar, to: DataType) -> Result<Scalar> {
    let cast = match (value, to) {
        (Scalar::Null, _) => Scalar::Null,
        (Scalar::Utf8(s), DataType::Utf8) => Scalar::Utf8(s),
        (v, DataType::Utf8) => Scalar::Utf8(v.to_string()),
        (Scalar::Utf8(s), DataType::Int64) => s.trim().parse::<i64>().map_or(Scalar::Null, Scalar::Int64),
        (Scalar::Utf8(s), DataType::Float64) => s.trim().parse::<f64>().map_or(Scalar::Null, Scalar::Float64),
        (Scalar::Utf8(s), DataType::Float32) => s.trim().parse::<f32>().map_or(Scalar::Null, Scalar::Float32),
        (Scalar::Utf8(s), DataType::Boolean) => match s.trim() {
            "true" => Scalar::Boolean(true),
            "false" => Scalar::Boolean(false),
            _ => Scalar::Null,
        },
        (v, DataType::Boolean) => v
            .as_f64()
            .map(|f| Scalar::Boolean(f != 0.0))
            .ok_or_else(|| Error::Type("unsupported cast to Boolean".into()))?,
        (v, DataType::Int64) => match v.as_f64() {
            Some(f) if f.is_nan() => Scalar::Null,
            _ => v.as_i64().map_or(Scalar::Null, Scalar::Int64),
        },
        (v, DataType::Float64) => v.as_f64().map_or(Scalar::Null, Scalar::Float64),
        (v, DataType::Float32) => v.as_f64().map_or(Scalar::Null, |f| Scalar::Float32(f as f32)),
    };
    Ok(cast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_len_and_type() {
        let col = Column::from_vec(vec![1i64, 2, 3, 4, 5]);
        assert_eq!(col.len(), 5);
        assert_eq!(col.data_type(), DataType::Int64);

        let col = Column::from_strs(&["a", "b"]);
        assert_eq!(col.len(), 2);
        assert_eq!(col.data_type(), DataType::Utf8);

        let col = Column::from_vec(vec![true, false, true]);
        assert_eq!(col.data_type(), DataType::Boolean);
    }

    #[test]
    fn test_validity_length_must_match() {
        let data = ColumnData::Int64(vec![1, 2, 3].into());
        let result = Column::new(data, Some(Bitmap::from_bools(&[true, false])));
        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn test_nulls_round_trip_through_get() {
        let col = Column::from_options(vec![Some(1.5f64), None, Some(3.0)]);
        assert_eq!(col.null_count(), 1);
        assert_eq!(col.get(0), Scalar::Float64(1.5));
        assert_eq!(col.get(1), Scalar::Null);
        assert!(!col.is_valid(1));
    }

    #[test]
    fn test_slice_is_zero_copy() {
        let col = Column::from_options(vec![Some(1i64), None, Some(3), Some(4)]);
        let sliced = col.slice(1, 2).unwrap();
        assert_eq!(sliced.iter().collect::<Vec<_>>(), vec![Scalar::Null, Scalar::Int64(3)]);
        assert!(sliced.shares_storage(&col));
        assert!(matches!(col.slice(3, 2), Err(Error::Shape(_))));
    }

    #[test]
    fn test_filter_drops_null_mask_entries() {
        let col = Column::from_strs(&["a", "b", "c"]);
        let mask = Column::from_options(vec![Some(true), None, Some(false)]);
        let filtered = col.filter(&mask).unwrap();
        assert_eq!(filtered, Column::from_strs(&["a"]));
    }

    #[test]
    fn test_take_opt_inserts_nulls() {
        let col = Column::from_vec(vec![10i64, 20, 30]);
        let taken = col.take_opt(&[Some(2), None, Some(0)]);
        assert_eq!(
            taken.iter().collect::<Vec<_>>(),
            vec![Scalar::Int64(30), Scalar::Null, Scalar::Int64(10)]
        );
    }

    #[test]
    fn test_from_scalars_type_checks() {
        let col = Column::from_scalars(DataType::Float64, &[Scalar::Int64(1), Scalar::Null]).unwrap();
        assert_eq!(col.get(0), Scalar::Float64(1.0));
        let err = Column::from_scalars(DataType::Int64, &[Scalar::from("x")]);
        assert!(matches!(err, Err(Error::InvalidDataType { .. })));
    }

    #[test]
    fn test_cast() {
        let col = Column::from_strs(&["1", "x", " 3 "]);
        let cast = col.cast(DataType::Int64).unwrap();
        assert_eq!(
            cast.iter().collect::<Vec<_>>(),
            vec![Scalar::Int64(1), Scalar::Null, Scalar::Int64(3)]
        );
        let floats = Column::from_vec(vec![1i64, 2]).cast(DataType::Float64).unwrap();
        assert_eq!(floats, Column::from_vec(vec![1.0f64, 2.0]));
        let strings = Column::from_vec(vec![true]).cast(DataType::Utf8).unwrap();
        assert_eq!(strings, Column::from_strs(&["true"]));
    }

    #[test]
    fn test_full_null() {
        let col = Column::full_null(DataType::Utf8, 3);
        assert_eq!(col.null_count(), 3);
        assert!(col.iter().all(|v| v.is_null()));
        assert_eq!(Column::full_null(DataType::Int64, 0).null_count(), 0);
    }

    #[test]
    fn test_append_keeps_validity() {
        let a = Column::from_vec(vec![1i64, 2]);
        let b = Column::from_options(vec![None, Some(4i64)]);
        let joined = a.append(&b).unwrap();
        assert_eq!(joined, Column::from_options(vec![Some(1i64), Some(2), None, Some(4)]));
        assert!(a.append(&Column::from_strs(&["x"])).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_take_matches_get(values in proptest::collection::vec(proptest::option::of(-1000i64..1000), 1..64), picks in proptest::collection::vec(0usize..64, 0..32)) {
            let col = Column::from_options(values.clone());
            let indices: Vec<usize> = picks.into_iter().map(|i| i % values.len()).collect();
            let taken = col.take(&indices);
            for (out, &i) in indices.iter().enumerate() {
                proptest::prop_assert_eq!(taken.get(out), Scalar::from(values[i]));
            }
        }

        #[test]
        fn prop_slice_is_a_view(values in proptest::collection::vec(proptest::num::f64::NORMAL, 0..64), offset in 0usize..64, len in 0usize..64) {
            let col = Column::from_vec(values.clone());
            match col.slice(offset, len) {
                Ok(view) => {
                    proptest::prop_assert!(offset + len <= values.len());
                    proptest::prop_assert_eq!(view.len(), len);
                    for i in 0..len {
                        proptest::prop_assert_eq!(view.get(i), Scalar::Float64(values[offset + i]));
                    }
                }
                Err(_) => proptest::prop_assert!(offset + len > values.len()),
            }
        }
    }
}
