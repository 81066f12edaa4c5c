use keel_core::buffer::Utf8Buffer;
use keel_core::{Column, ColumnData, DataFrame, Error, ExecutionContext, Result, Series};
use rayon::slice::ParallelSliceMut;
use std::cmp::Ordering;
use tracing::debug;

/// Row comparator over the valid slots of one column.
pub(crate) enum RowCmp<'a> {
    Int64(&'a [i64]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
    Boolean(&'a [bool]),
    Utf8(&'a Utf8Buffer),
}

impl<'a> RowCmp<'a> {
    pub(crate) fn new(column: &'a Column) -> Self {
        match column.data() {
            ColumnData::Int64(v) => RowCmp::Int64(v),
            ColumnData::Float32(v) => RowCmp::Float32(v),
            ColumnData::Float64(v) => RowCmp::Float64(v),
            ColumnData::Boolean(v) => RowCmp::Boolean(v),
            ColumnData::Utf8(s) => RowCmp::Utf8(s),
        }
    }

    /// Compares rows `i` and `j`; both must be valid.
    #[inline]
    pub(crate) fn compare(&self, i: usize, j: usize) -> Ordering {
        match self {
            RowCmp::Int64(v) => v[i].cmp(&v[j]),
            RowCmp::Float32(v) => v[i].total_cmp(&v[j]),
            RowCmp::Float64(v) => v[i].total_cmp(&v[j]),
            RowCmp::Boolean(v) => v[i].cmp(&v[j]),
            RowCmp::Utf8(s) => s.value(i).cmp(s.value(j)),
        }
    }
}

struct SortKey<'a> {
    column: &'a Column,
    cmp: RowCmp<'a>,
    descending: bool,
}

impl SortKey<'_> {
    /// Nulls sort last in either direction.
    #[inline]
    fn compare(&self, a: usize, b: usize) -> Ordering {
        match (self.column.is_valid(a), self.column.is_valid(b)) {
            (true, true) => {
                let ord = self.cmp.compare(a, b);
                if self.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        }
    }
}

/// Stable ordering of row indices by `keys`, earlier keys taking precedence.
pub fn sort_indices(keys: &[&Series], descending: &[bool], ctx: &ExecutionContext) -> Result<Vec<usize>> {
    let first = keys
        .first()
        .ok_or_else(|| Error::Shape("sort requires at least one key".to_string()))?;
    if descending.len() != keys.len() {
        return Err(Error::Shape(format!(
            "{} sort keys but {} directions",
            keys.len(),
            descending.len()
        )));
    }
    let len = first.len();
    let keys: Vec<SortKey<'_>> = keys
        .iter()
        .zip(descending)
        .map(|(s, &descending)| SortKey {
            column: s.column(),
            cmp: RowCmp::new(s.column()),
            descending,
        })
        .collect();

    let compare = |a: &usize, b: &usize| {
        keys.iter()
            .map(|k| k.compare(*a, *b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    };

    let mut indices: Vec<usize> = (0..len).collect();
    if ctx.should_parallelize(len) {
        debug!(rows = len, keys = keys.len(), "parallel sort");
        ctx.install(|| indices.par_sort_by(compare));
    } else {
        indices.sort_by(compare);
    }
    Ok(indices)
}

/// Reorders every column of `df` by the named keys.
pub fn sort_frame(df: &DataFrame, by: &[String], descending: &[bool], ctx: &ExecutionContext) -> Result<DataFrame> {
    let keys = by
        .iter()
        .map(|name| df.column(name))
        .collect::<Result<Vec<_>>>()?;
    let indices = sort_indices(&keys, descending, ctx)?;
    Ok(df.take(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{df, ExecutionConfig, Scalar};

    #[test]
    fn test_sort_nulls_last_both_directions() {
        let s = Series::new("a", [Some(2), None, Some(1), Some(3)]).unwrap();
        let ctx = ExecutionContext::sequential();
        assert_eq!(sort_indices(&[&s], &[false], &ctx).unwrap(), vec![2, 0, 3, 1]);
        assert_eq!(sort_indices(&[&s], &[true], &ctx).unwrap(), vec![3, 0, 2, 1]);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let frame = df!(
            "g" => ["b", "a", "b", "a"],
            "v" => [1, 2, 1, 1],
            "row" => [0, 1, 2, 3],
        )
        .unwrap();
        let sorted = sort_frame(
            &frame,
            &["g".to_string(), "v".to_string()],
            &[false, false],
            &ExecutionContext::sequential(),
        )
        .unwrap();
        let rows: Vec<Scalar> = sorted.column("row").unwrap().iter().collect();
        assert_eq!(rows, vec![Scalar::Int64(3), Scalar::Int64(1), Scalar::Int64(0), Scalar::Int64(2)]);
    }

    #[test]
    fn test_parallel_sort_matches_sequential() {
        let values: Vec<f64> = (0..5000).map(|i| ((i * 37) % 101) as f64).collect();
        let s = Series::new("x", values).unwrap();
        let par = ExecutionContext::new(&ExecutionConfig {
            max_workers: Some(4),
            min_rows_for_parallel: 16,
            ..ExecutionConfig::default()
        })
        .unwrap();
        let seq = sort_indices(&[&s], &[false], &ExecutionContext::sequential()).unwrap();
        assert_eq!(seq, sort_indices(&[&s], &[false], &par).unwrap());
    }

    #[test]
    fn test_sort_requires_keys() {
        let ctx = ExecutionContext::sequential();
        assert!(matches!(sort_indices(&[], &[], &ctx), Err(Error::Shape(_))));
    }
}
