use keel_core::{ArithmeticOp, ComparisonOp, DataFrame, DataType, Result, Scalar, Series};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Arithmetic(op) => write!(f, "{}", op),
            BinaryOp::Comparison(op) => write!(f, "{}", op),
            BinaryOp::And => f.write_str("&"),
            BinaryOp::Or => f.write_str("|"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AggFunc {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    First,
    Last,
    Std,
    Var,
    Median,
    /// Linearly interpolated quantile, `0 <= q <= 1`.
    Quantile(f64),
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::First => "first",
            AggFunc::Last => "last",
            AggFunc::Std => "std",
            AggFunc::Var => "var",
            AggFunc::Median => "median",
            AggFunc::Quantile(_) => "quantile",
        }
    }
}

/// Sequential transforms over one series; output length equals input length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowFunc {
    Lag { periods: usize, default: Scalar },
    Lead { periods: usize, default: Scalar },
    Diff { periods: usize },
    PctChange,
    CumSum,
    CumMin,
    CumMax,
    RollingSum { window: usize, min_periods: usize },
    RollingMean { window: usize, min_periods: usize },
    RollingMin { window: usize, min_periods: usize },
    RollingMax { window: usize, min_periods: usize },
}

impl fmt::Display for WindowFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunc::Lag { periods, default } => write!(f, "lag({}, {})", periods, default),
            WindowFunc::Lead { periods, default } => write!(f, "lead({}, {})", periods, default),
            WindowFunc::Diff { periods } => write!(f, "diff({})", periods),
            WindowFunc::PctChange => f.write_str("pct_change()"),
            WindowFunc::CumSum => f.write_str("cum_sum()"),
            WindowFunc::CumMin => f.write_str("cum_min()"),
            WindowFunc::CumMax => f.write_str("cum_max()"),
            WindowFunc::RollingSum { window, min_periods } => {
                write!(f, "rolling_sum({}, {})", window, min_periods)
            }
            WindowFunc::RollingMean { window, min_periods } => {
                write!(f, "rolling_mean({}, {})", window, min_periods)
            }
            WindowFunc::RollingMin { window, min_periods } => {
                write!(f, "rolling_min({}, {})", window, min_periods)
            }
            WindowFunc::RollingMax { window, min_periods } => {
                write!(f, "rolling_max({}, {})", window, min_periods)
            }
        }
    }
}

/// User-facing expression tree.
///
/// Plans intern expressions into an arena (see [`crate::arena`]); this type is
/// only the builder surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(Scalar),
    Alias(Box<Expr>, String),
    Unary {
        op: UnaryOp,
        input: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Agg {
        func: AggFunc,
        input: Box<Expr>,
    },
    Window {
        func: WindowFunc,
        input: Box<Expr>,
    },
    Cast {
        input: Box<Expr>,
        data_type: DataType,
    },
    FillNull {
        input: Box<Expr>,
        value: Scalar,
    },
}

/// Reference to a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// A constant; broadcast to the frame height where needed.
pub fn lit(value: impl Into<Scalar>) -> Expr {
    Expr::Literal(value.into())
}

/// Null literal of a specific type.
pub fn lit_null(data_type: DataType) -> Expr {
    Expr::Literal(Scalar::Null).cast(data_type)
}

impl Expr {
    fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        }
    }

    fn unary(self, op: UnaryOp) -> Expr {
        Expr::Unary {
            op,
            input: Box::new(self),
        }
    }

    fn agg(self, func: AggFunc) -> Expr {
        Expr::Agg {
            func,
            input: Box::new(self),
        }
    }

    fn window(self, func: WindowFunc) -> Expr {
        Expr::Window {
            func,
            input: Box::new(self),
        }
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias(Box::new(self), name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::Eq), rhs)
    }

    pub fn neq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::NotEq), rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::Lt), rhs)
    }

    pub fn lt_eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::LtEq), rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::Gt), rhs)
    }

    pub fn gt_eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Comparison(ComparisonOp::GtEq), rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        self.unary(UnaryOp::Not)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Expr {
        self.unary(UnaryOp::Neg)
    }

    pub fn is_null(self) -> Expr {
        self.unary(UnaryOp::IsNull)
    }

    pub fn is_not_null(self) -> Expr {
        self.unary(UnaryOp::IsNotNull)
    }

    pub fn cast(self, data_type: DataType) -> Expr {
        Expr::Cast {
            input: Box::new(self),
            data_type,
        }
    }

    pub fn fill_null(self, value: impl Into<Scalar>) -> Expr {
        Expr::FillNull {
            input: Box::new(self),
            value: value.into(),
        }
    }

    pub fn sum(self) -> Expr {
        self.agg(AggFunc::Sum)
    }

    pub fn mean(self) -> Expr {
        self.agg(AggFunc::Mean)
    }

    pub fn min(self) -> Expr {
        self.agg(AggFunc::Min)
    }

    pub fn max(self) -> Expr {
        self.agg(AggFunc::Max)
    }

    pub fn count(self) -> Expr {
        self.agg(AggFunc::Count)
    }

    pub fn first(self) -> Expr {
        self.agg(AggFunc::First)
    }

    pub fn last(self) -> Expr {
        self.agg(AggFunc::Last)
    }

    pub fn std(self) -> Expr {
        self.agg(AggFunc::Std)
    }

    pub fn var(self) -> Expr {
        self.agg(AggFunc::Var)
    }

    pub fn median(self) -> Expr {
        self.agg(AggFunc::Median)
    }

    /// Quantile `q` of the valid values, interpolating between neighbours.
    /// `q` outside `[0, 1]` fails when the plan is checked.
    pub fn quantile(self, q: f64) -> Expr {
        self.agg(AggFunc::Quantile(q))
    }

    /// Value `periods` rows earlier; the first `periods` rows get `default`.
    pub fn lag(self, periods: usize, default: impl Into<Scalar>) -> Expr {
        self.window(WindowFunc::Lag {
            periods,
            default: default.into(),
        })
    }

    /// Value `periods` rows later; the last `periods` rows get `default`.
    pub fn lead(self, periods: usize, default: impl Into<Scalar>) -> Expr {
        self.window(WindowFunc::Lead {
            periods,
            default: default.into(),
        })
    }

    pub fn diff(self) -> Expr {
        self.diff_n(1)
    }

    pub fn diff_n(self, periods: usize) -> Expr {
        self.window(WindowFunc::Diff { periods })
    }

    pub fn pct_change(self) -> Expr {
        self.window(WindowFunc::PctChange)
    }

    pub fn cum_sum(self) -> Expr {
        self.window(WindowFunc::CumSum)
    }

    pub fn cum_min(self) -> Expr {
        self.window(WindowFunc::CumMin)
    }

    pub fn cum_max(self) -> Expr {
        self.window(WindowFunc::CumMax)
    }

    pub fn rolling_sum(self, window: usize, min_periods: usize) -> Expr {
        self.window(WindowFunc::RollingSum { window, min_periods })
    }

    pub fn rolling_mean(self, window: usize, min_periods: usize) -> Expr {
        self.window(WindowFunc::RollingMean { window, min_periods })
    }

    pub fn rolling_min(self, window: usize, min_periods: usize) -> Expr {
        self.window(WindowFunc::RollingMin { window, min_periods })
    }

    pub fn rolling_max(self, window: usize, min_periods: usize) -> Expr {
        self.window(WindowFunc::RollingMax { window, min_periods })
    }

    /// Name of the series this expression produces: the alias if any, else
    /// the left-most column reference, else `"literal"`.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Alias(_, name) => name.clone(),
            _ => self
                .first_column()
                .unwrap_or("literal")
                .to_string(),
        }
    }

    fn first_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            Expr::Literal(_) => None,
            Expr::Alias(input, _)
            | Expr::Unary { input, .. }
            | Expr::Agg { input, .. }
            | Expr::Window { input, .. }
            | Expr::Cast { input, .. }
            | Expr::FillNull { input, .. } => input.first_column(),
            Expr::Binary { left, right, .. } => {
                left.first_column().or_else(|| right.first_column())
            }
        }
    }

    /// Evaluates against `df` on the default execution context.
    pub fn evaluate(&self, df: &DataFrame) -> Result<Series> {
        crate::eval::evaluate(self, df)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Arithmetic(ArithmeticOp::Add), rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Arithmetic(ArithmeticOp::Sub), rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Arithmetic(ArithmeticOp::Mul), rhs)
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Arithmetic(ArithmeticOp::Div), rhs)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        col(name)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "col({:?})", name),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Alias(input, name) => write!(f, "{}.alias({:?})", input, name),
            Expr::Unary { op, input } => match op {
                UnaryOp::Not => write!(f, "!{}", input),
                UnaryOp::Neg => write!(f, "-{}", input),
                UnaryOp::IsNull => write!(f, "{}.is_null()", input),
                UnaryOp::IsNotNull => write!(f, "{}.is_not_null()", input),
            },
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Agg {
                func: AggFunc::Quantile(q),
                input,
            } => write!(f, "{}.quantile({})", input, q),
            Expr::Agg { func, input } => write!(f, "{}.{}()", input, func.name()),
            Expr::Window { func, input } => write!(f, "{}.{}", input, func),
            Expr::Cast { input, data_type } => write!(f, "{}.cast({})", input, data_type),
            Expr::FillNull { input, value } => write!(f, "{}.fill_null({})", input, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name() {
        assert_eq!(col("a").output_name(), "a");
        assert_eq!((lit(1) + col("b")).output_name(), "b");
        assert_eq!(lit(1).output_name(), "literal");
        assert_eq!(col("a").sum().alias("total").output_name(), "total");
        assert_eq!(col("x").rolling_mean(3, 1).output_name(), "x");
    }

    #[test]
    fn test_display() {
        let e = col("a").gt(lit(1)).and(col("b").is_null());
        assert_eq!(e.to_string(), "((col(\"a\") > 1) & col(\"b\").is_null())");
        assert_eq!(col("v").sum().to_string(), "col(\"v\").sum()");
        assert_eq!(
            col("v").rolling_sum(3, 1).to_string(),
            "col(\"v\").rolling_sum(3, 1)"
        );
    }

    #[test]
    fn test_expr_json_shape() {
        let e = col("price").gt(lit(2.5)).and(col("units").rolling_sum(3, 1).is_not_null());
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"RollingSum\""));
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_operators_build_binary_nodes() {
        let e = col("a") * lit(2) - col("b") / lit(4.0);
        match e {
            Expr::Binary { op, .. } => {
                assert_eq!(op, BinaryOp::Arithmetic(ArithmeticOp::Sub));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
