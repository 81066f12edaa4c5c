use super::hashing::{has_null, hash_rows, rows_equal, JoinTable};
use crate::plan::{join_right_columns, validate_join_keys, JoinKind};
use keel_core::{Column, DataFrame, ExecutionContext, Result};
use tracing::debug;

/// Equality hash join. The right frame is the build side; output rows follow
/// left row order, and matches for one left row follow right row order.
///
/// Null keys never match. Right key columns named like their left key are
/// dropped; other right columns colliding with a left name get `suffix`.
pub fn hash_join(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &[String],
    right_on: &[String],
    kind: JoinKind,
    suffix: &str,
    ctx: &ExecutionContext,
) -> Result<DataFrame> {
    let left_schema = left.schema();
    let right_schema = right.schema();
    validate_join_keys(&left_schema, &right_schema, left_on, right_on)?;

    let left_keys = key_columns(left, left_on)?;
    let right_keys = key_columns(right, right_on)?;

    let right_hashes = hash_rows(&right_keys, ctx);
    let table = JoinTable::build(&right_keys, &right_hashes, ctx);
    let left_hashes = hash_rows(&left_keys, ctx);

    let chunks = ctx.map_chunks(left.height(), |range| {
        let mut left_rows = Vec::with_capacity(range.len());
        let mut right_rows = Vec::with_capacity(range.len());
        for row in range {
            let mut matched = false;
            if !has_null(&left_keys, row) {
                table.for_each_candidate(left_hashes[row], |candidate| {
                    if rows_equal(&left_keys, row, &right_keys, candidate) {
                        left_rows.push(row);
                        right_rows.push(Some(candidate));
                        matched = true;
                    }
                });
            }
            if !matched && kind == JoinKind::Left {
                left_rows.push(row);
                right_rows.push(None);
            }
        }
        (left_rows, right_rows)
    });

    let total: usize = chunks.iter().map(|(l, _)| l.len()).sum();
    let mut left_rows = Vec::with_capacity(total);
    let mut right_rows = Vec::with_capacity(total);
    for (l, r) in chunks {
        left_rows.extend(l);
        right_rows.extend(r);
    }
    debug!(
        left = left.height(),
        right = right.height(),
        output = total,
        ?kind,
        "hash join"
    );

    let mut columns = left.take(&left_rows).into_columns();
    for (name, out_name) in join_right_columns(&left_schema, &right_schema, left_on, right_on, suffix) {
        let series = right.column(&name)?.take_opt(&right_rows);
        columns.push(if out_name == name { series } else { series.rename(out_name)? });
    }
    DataFrame::new(columns)
}

fn key_columns<'a>(df: &'a DataFrame, names: &[String]) -> Result<Vec<&'a Column>> {
    names
        .iter()
        .map(|name| df.column(name).map(|s| s.column()))
        .collect()
}
