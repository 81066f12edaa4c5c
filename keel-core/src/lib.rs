pub mod error;
pub mod schema;
pub mod types;
pub mod bitmap;
pub mod buffer;
pub mod column;
pub mod series;
pub mod arithmetic;
pub mod dataframe;
pub mod vectorized;
pub mod context;
pub mod config;

pub use error::{Error, ErrorKind, Result};
pub use schema::{DataType, Field, Schema, SchemaRef};
pub use types::Scalar;
pub use bitmap::Bitmap;
pub use column::{Column, ColumnData, NativeType, NumericNative};
pub use series::{IntoColumn, Series};
pub use arithmetic::{ArithmeticOp, ComparisonOp};
pub use dataframe::DataFrame;
pub use vectorized::VectorizedOps;
pub use context::ExecutionContext;
pub use config::{EngineConfig, ExecutionConfig, JoinConfig, OptimizerConfig};
