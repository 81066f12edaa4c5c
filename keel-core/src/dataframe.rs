use crate::error::{Error, Result};
use crate::schema::{Schema, SchemaRef};
use crate::series::Series;
use crate::types::Scalar;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Rows shown by `Display` before the table is elided.
const DISPLAY_ROWS: usize = 10;

/// Ordered, uniquely named, equal-length columns.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    columns: Vec<Series>,
}

/// Builds a [`DataFrame`] from `name => values` pairs.
///
/// ```
/// use keel_core::df;
/// let frame = df!("id" => [1, 2], "name" => ["a", "b"]).unwrap();
/// assert_eq!(frame.height(), 2);
/// ```
#[macro_export]
macro_rules! df {
    ($($name:expr => $values:expr),* $(,)?) => {
        (|| -> $crate::error::Result<$crate::dataframe::DataFrame> {
            $crate::dataframe::DataFrame::new(vec![
                $($crate::series::Series::new($name, $values)?),*
            ])
        })()
    };
}

impl DataFrame {
    /// Fails on duplicate names or differing column lengths.
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for series in &columns {
            if !seen.insert(series.name()) {
                return Err(Error::Schema(format!(
                    "duplicate column name: {}",
                    series.name()
                )));
            }
        }
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|s| s.len() != first.len()) {
                return Err(Error::Schema(format!(
                    "column '{}' has {} rows but '{}' has {}",
                    bad.name(),
                    bad.len(),
                    first.name(),
                    first.len()
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |s| s.len())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(self.columns.iter().map(|s| s.field()).collect()))
    }

    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Series> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|s| s.name()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|s| s.name() == name)
    }

    pub fn column(&self, name: &str) -> Result<&Series> {
        self.column_index(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Columns in the requested order. Storage is shared, not copied.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<DataFrame> {
        let columns = names
            .iter()
            .map(|n| self.column(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        DataFrame::new(columns)
    }

    pub fn drop(&self, name: &str) -> Result<DataFrame> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        let mut columns = self.columns.clone();
        columns.remove(idx);
        Ok(Self { columns })
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<DataFrame> {
        let idx = self
            .column_index(from)
            .ok_or_else(|| Error::ColumnNotFound(from.to_string()))?;
        let mut columns = self.columns.clone();
        columns[idx] = columns[idx].rename(to)?;
        DataFrame::new(columns)
    }

    /// Adds `series`, replacing a same-named column in place.
    pub fn with_column(&self, series: Series) -> Result<DataFrame> {
        let mut columns = self.columns.clone();
        match self.column_index(series.name()) {
            Some(idx) => columns[idx] = series,
            None => columns.push(series),
        }
        DataFrame::new(columns)
    }

    /// Keeps rows where `mask` is true; null mask entries drop the row.
    pub fn filter(&self, mask: &Series) -> Result<DataFrame> {
        let indices = crate::column::mask_indices(mask.column(), self.height())?;
        if indices.len() == self.height() {
            return Ok(self.clone());
        }
        Ok(self.take(&indices))
    }

    /// Rows `offset..offset + len`, clamped to the frame.
    pub fn slice(&self, offset: usize, len: usize) -> DataFrame {
        let offset = offset.min(self.height());
        let len = len.min(self.height() - offset);
        let columns = self
            .columns
            .iter()
            .map(|s| s.slice(offset, len).unwrap_or_else(|_| s.clone()))
            .collect();
        Self { columns }
    }

    pub fn head(&self, n: usize) -> DataFrame {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> DataFrame {
        let n = n.min(self.height());
        self.slice(self.height() - n, n)
    }

    /// Gathers rows by index. Indices must be in bounds.
    pub fn take(&self, indices: &[usize]) -> DataFrame {
        Self {
            columns: self.columns.iter().map(|s| s.take(indices)).collect(),
        }
    }

    /// Gathers rows by optional index; `None` yields an all-null row.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> DataFrame {
        Self {
            columns: self.columns.iter().map(|s| s.take_opt(indices)).collect(),
        }
    }

    pub fn get_row(&self, i: usize) -> Result<Vec<Scalar>> {
        if i >= self.height() {
            return Err(Error::Shape(format!(
                "row {} out of bounds for height {}",
                i,
                self.height()
            )));
        }
        Ok(self.columns.iter().map(|s| s.get(i)).collect())
    }

    /// Appends the columns of `other`; names must stay unique.
    pub fn hstack(&self, other: &[Series]) -> Result<DataFrame> {
        let mut columns = self.columns.clone();
        columns.extend(other.iter().cloned());
        DataFrame::new(columns)
    }
}

/// Content equality: column order is not significant.
impl PartialEq for DataFrame {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self
                .columns
                .iter()
                .all(|s| other.column(s.name()).map_or(false, |o| o == s))
    }
}

fn cell(value: &Scalar) -> String {
    match value {
        Scalar::Utf8(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (height, width) = self.shape();
        writeln!(f, "shape: ({}, {})", height, width)?;
        if width == 0 {
            return Ok(());
        }

        let shown: Vec<usize> = if height > DISPLAY_ROWS {
            (0..DISPLAY_ROWS / 2)
                .chain(height - DISPLAY_ROWS / 2..height)
                .collect()
        } else {
            (0..height).collect()
        };

        let header: Vec<String> = self.columns.iter().map(|s| s.name().to_string()).collect();
        let dtypes: Vec<String> = self.columns.iter().map(|s| s.data_type().to_string()).collect();
        let rows: Vec<Vec<String>> = shown
            .iter()
            .map(|&i| self.columns.iter().map(|s| cell(&s.get(i))).collect())
            .collect();

        let widths: Vec<usize> = (0..width)
            .map(|c| {
                rows.iter()
                    .map(|r| r[c].chars().count())
                    .chain([header[c].chars().count(), dtypes[c].chars().count(), 3])
                    .max()
                    .unwrap_or(3)
            })
            .collect();

        let rule = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
            writeln!(f, "+{}+", parts.join("+"))
        };
        let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let parts: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!(" {:<width$} ", c, width = w))
                .collect();
            writeln!(f, "|{}|", parts.join("|"))
        };

        rule(f)?;
        line(f, &header)?;
        line(f, &dtypes)?;
        rule(f)?;
        for (n, row) in rows.iter().enumerate() {
            if height > DISPLAY_ROWS && n == DISPLAY_ROWS / 2 {
                let gap: Vec<String> = (0..width).map(|_| "…".to_string()).collect();
                line(f, &gap)?;
            }
            line(f, row)?;
        }
        rule(f)
    }
}
