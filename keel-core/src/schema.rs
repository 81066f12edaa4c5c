use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Primitive kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int64,
    Float32,
    Float64,
    Boolean,
    Utf8,
}

impl DataType {
    pub fn size(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::Utf8 => None,
        }
    }

    pub fn is_fixed_size(&self) -> bool {
        self.size().is_some()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float32 | DataType::Float64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Type both operands of a numeric binary operation are promoted to.
    ///
    /// Mixed integer/float promotes to float; two floats of different width
    /// promote to the wider one. Booleans participate as integers.
    pub fn numeric_supertype(&self, other: &DataType) -> Option<DataType> {
        use DataType::*;
        match (self, other) {
            (Utf8, _) | (_, Utf8) => None,
            (Float64, _) | (_, Float64) => Some(Float64),
            (Float32, Int64) | (Int64, Float32) => Some(Float64),
            (Float32, _) | (_, Float32) => Some(Float32),
            _ => Some(Int64),
        }
    }

    /// Type two operands are compared as, if they are comparable at all.
    pub fn comparison_supertype(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (DataType::Utf8, DataType::Utf8) => Some(DataType::Utf8),
            (DataType::Boolean, DataType::Boolean) => Some(DataType::Boolean),
            (DataType::Utf8, _) | (_, DataType::Utf8) => None,
            (a, b) => a.numeric_supertype(b),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::Boolean => "Boolean",
            DataType::Utf8 => "Utf8",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

pub type SchemaRef = Arc<Schema>;

/// Ordered mapping from column name to dtype.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    #[serde(skip)]
    pub field_map: HashMap<String, usize>,
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct SchemaHelper {
            fields: Vec<Field>,
        }

        let helper = SchemaHelper::deserialize(deserializer)?;
        Schema::try_new(helper.fields).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Schema {
    /// Build a schema, keeping the last index for a repeated name.
    /// Use [`Schema::try_new`] when duplicates must be rejected.
    pub fn new(fields: Vec<Field>) -> Self {
        let field_map: HashMap<String, usize> = fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.name.clone(), idx))
            .collect();

        Self { fields, field_map }
    }

    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let schema = Self::new(fields);
        if schema.field_map.len() != schema.fields.len() {
            let mut seen = std::collections::HashSet::new();
            let dup = schema
                .fields
                .iter()
                .find(|f| !seen.insert(f.name.as_str()))
                .map(|f| f.name.clone())
                .unwrap_or_default();
            return Err(Error::Schema(format!("duplicate column name: {}", dup)));
        }
        Ok(schema)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_map.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index(name).map(|idx| &self.fields[idx])
    }

    pub fn try_field(&self, name: &str) -> Result<&Field> {
        self.field(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field_map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends `field`, replacing any existing field of the same name in place.
    pub fn with_field(&self, field: Field) -> Schema {
        let mut fields = self.fields.clone();
        match self.field_index(&field.name) {
            Some(idx) => fields[idx] = field,
            None => fields.push(field),
        }
        Schema::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.data_type)?;
        }
        write!(f, "}}")
    }
}
