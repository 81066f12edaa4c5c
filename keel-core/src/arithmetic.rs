use crate::column::{Column, ColumnData, NativeType, NumericNative};
use crate::error::{Error, Result};
use crate::schema::DataType;
use crate::series::Series;
use crate::types::Scalar;
use crate::vectorized::VectorizedOps;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    #[inline]
    fn apply<T: PartialOrd + ?Sized>(self, a: &T, b: &T) -> bool {
        match self {
            ComparisonOp::Eq => a == b,
            ComparisonOp::NotEq => a != b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::LtEq => a <= b,
            ComparisonOp::Gt => a > b,
            ComparisonOp::GtEq => a >= b,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        })
    }
}

impl Series {
    /// Length of a binary result. Both operands must have the same length.
    fn binary_len(&self, rhs: &Series) -> Result<usize> {
        if self.len() != rhs.len() {
            return Err(Error::Shape(format!(
                "operands '{}' ({} rows) and '{}' ({} rows) differ in length",
                self.name(),
                self.len(),
                rhs.name(),
                rhs.len()
            )));
        }
        Ok(self.len())
    }

    /// Elementwise arithmetic. Mixed integer/float operands promote to float;
    /// division always produces Float64. Null in either operand gives null.
    pub fn arithmetic(&self, op: ArithmeticOp, rhs: &Series) -> Result<Series> {
        let len = self.binary_len(rhs)?;
        let supertype = self
            .data_type()
            .numeric_supertype(&rhs.data_type())
            .ok_or_else(|| {
                Error::Type(format!(
                    "cannot apply '{}' to {} and {}",
                    op,
                    self.data_type(),
                    rhs.data_type()
                ))
            })?;
        let target = match op {
            ArithmeticOp::Div => DataType::Float64,
            _ => supertype,
        };

        let lhs = self.column().cast(target)?;
        let rhs = rhs.column().cast(target)?;
        let data = match target {
            DataType::Int64 => arithmetic_native::<i64>(&lhs, &rhs, op)?,
            DataType::Float32 => arithmetic_native::<f32>(&lhs, &rhs, op)?,
            DataType::Float64 => arithmetic_native::<f64>(&lhs, &rhs, op)?,
            other => return Err(Error::Type(format!("'{}' is undefined for {}", op, other))),
        };
        let validity = VectorizedOps::combine_validity(
            lhs.validity(),
            lhs.len(),
            rhs.validity(),
            rhs.len(),
            len,
        );
        Ok(self.with_column(Column::new(data, validity)?))
    }

    pub fn add(&self, rhs: &Series) -> Result<Series> {
        self.arithmetic(ArithmeticOp::Add, rhs)
    }

    pub fn sub(&self, rhs: &Series) -> Result<Series> {
        self.arithmetic(ArithmeticOp::Sub, rhs)
    }

    pub fn mul(&self, rhs: &Series) -> Result<Series> {
        self.arithmetic(ArithmeticOp::Mul, rhs)
    }

    pub fn div(&self, rhs: &Series) -> Result<Series> {
        self.arithmetic(ArithmeticOp::Div, rhs)
    }

    /// Elementwise comparison producing a Boolean series; any null operand
    /// yields null.
    pub fn compare(&self, op: ComparisonOp, rhs: &Series) -> Result<Series> {
        let len = self.binary_len(rhs)?;
        let target = self
            .data_type()
            .comparison_supertype(&rhs.data_type())
            .ok_or_else(|| {
                Error::Type(format!(
                    "cannot compare {} with {}",
                    self.data_type(),
                    rhs.data_type()
                ))
            })?;

        let lhs = self.column().cast(target)?;
        let rhs = rhs.column().cast(target)?;
        let values = match (lhs.data(), rhs.data()) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => compare_native(a, b, op),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => compare_native(a, b, op),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => compare_native(a, b, op),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => compare_native(a, b, op),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => {
                (0..len).map(|i| op.apply(a.value(i), b.value(i))).collect()
            }
            _ => {
                return Err(Error::Type(format!(
                    "cannot compare {} with {}",
                    lhs.data_type(),
                    rhs.data_type()
                )))
            }
        };
        let validity = VectorizedOps::combine_validity(
            lhs.validity(),
            lhs.len(),
            rhs.validity(),
            rhs.len(),
            len,
        );
        Ok(self.with_column(Column::new(ColumnData::Boolean(values.into()), validity)?))
    }

    pub fn equal(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::Eq, rhs)
    }

    pub fn not_equal(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::NotEq, rhs)
    }

    pub fn lt(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::Lt, rhs)
    }

    pub fn lt_eq(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::LtEq, rhs)
    }

    pub fn gt(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::Gt, rhs)
    }

    pub fn gt_eq(&self, rhs: &Series) -> Result<Series> {
        self.compare(ComparisonOp::GtEq, rhs)
    }

    fn boolean_values(&self) -> Result<&[bool]> {
        self.column()
            .as_native::<bool>()
            .map(|b| b.as_slice())
            .ok_or_else(|| Error::data_type(DataType::Boolean, self.data_type()))
    }

    fn kleene(&self, rhs: &Series, is_and: bool) -> Result<Series> {
        let len = self.binary_len(rhs)?;
        let a = self.boolean_values()?;
        let b = rhs.boolean_values()?;
        let at = |s: &Series, v: &[bool], i: usize| s.is_valid(i).then(|| v[i]);
        let out: Vec<Option<bool>> = (0..len)
            .map(|i| {
                let (l, r) = (at(self, a, i), at(rhs, b, i));
                if is_and {
                    match (l, r) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    }
                } else {
                    match (l, r) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    }
                }
            })
            .collect();
        Ok(self.with_column(Column::from_options(out)))
    }

    /// Kleene AND: `false AND null` is false.
    pub fn and(&self, rhs: &Series) -> Result<Series> {
        self.kleene(rhs, true)
    }

    /// Kleene OR: `true OR null` is true.
    pub fn or(&self, rhs: &Series) -> Result<Series> {
        self.kleene(rhs, false)
    }

    pub fn not(&self) -> Result<Series> {
        let values = VectorizedOps::unary(self.boolean_values()?, |v: bool| !v);
        let column = Column::new(
            ColumnData::Boolean(values.into()),
            self.column().validity().cloned(),
        )?;
        Ok(self.with_column(column))
    }

    pub fn neg(&self) -> Result<Series> {
        let data = match self.column().data() {
            ColumnData::Int64(b) => ColumnData::Int64(VectorizedOps::unary(b, i64::wrapping_neg).into()),
            ColumnData::Float32(b) => ColumnData::Float32(VectorizedOps::unary(b, |v: f32| -v).into()),
            ColumnData::Float64(b) => ColumnData::Float64(VectorizedOps::unary(b, |v: f64| -v).into()),
            _ => {
                return Err(Error::Type(format!(
                    "cannot negate series '{}' of type {}",
                    self.name(),
                    self.data_type()
                )))
            }
        };
        let column = Column::new(data, self.column().validity().cloned())?;
        Ok(self.with_column(column))
    }

    pub fn is_null(&self) -> Series {
        let mask: Vec<bool> = (0..self.len()).map(|i| !self.is_valid(i)).collect();
        self.with_column(Column::from_vec(mask))
    }

    pub fn is_not_null(&self) -> Series {
        let mask: Vec<bool> = (0..self.len()).map(|i| self.is_valid(i)).collect();
        self.with_column(Column::from_vec(mask))
    }

    /// Replaces nulls with `value`, which must fit this series' type.
    pub fn fill_null(&self, value: &Scalar) -> Result<Series> {
        if value.is_null() || self.null_count() == 0 {
            return Ok(self.clone());
        }
        let values: Vec<Scalar> = self
            .iter()
            .map(|v| if v.is_null() { value.clone() } else { v })
            .collect();
        Ok(self.with_column(Column::from_scalars(self.data_type(), &values)?))
    }
}

fn arithmetic_native<T: NumericNative>(
    lhs: &Column,
    rhs: &Column,
    op: ArithmeticOp,
) -> Result<ColumnData> {
    let (a, b) = match (lhs.as_native::<T>(), rhs.as_native::<T>()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(Error::data_type(T::DATA_TYPE, lhs.data_type())),
    };
    let out = match op {
        ArithmeticOp::Add => VectorizedOps::binary(a, b, T::plus),
        ArithmeticOp::Sub => VectorizedOps::binary(a, b, T::minus),
        ArithmeticOp::Mul => VectorizedOps::binary(a, b, T::times),
        ArithmeticOp::Div => VectorizedOps::binary(a, b, |x: T, y: T| {
            T::from_f64(x.to_f64() / y.to_f64())
        }),
    };
    Ok(T::into_data(out.into()))
}

fn compare_native<T: NativeType>(a: &[T], b: &[T], op: ComparisonOp) -> Vec<bool> {
    VectorizedOps::binary(a, b, |x: T, y: T| op.apply(&x, &y))
}
