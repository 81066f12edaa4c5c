use ahash::{AHashMap, RandomState};
use keel_core::{Column, ColumnData, ExecutionContext, NativeType};
use std::ops::Range;
use tracing::trace;

/// Hash contributed by a null slot; nulls in the same key position collide
/// on purpose and are then compared equal.
const NULL_HASH: u64 = 0x9e37_79b9_7f4a_7c15;
const ROW_SEED: u64 = 0x51_7cc1_b727_220a;
const NONE: usize = usize::MAX;

/// Fixed seeds so row hashes, and therefore partition assignment, are stable
/// across runs.
fn hasher() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

/// Order-sensitive combine: `(a, b)` and `(b, a)` give different results.
#[inline]
fn mix(acc: u64, h: u64) -> u64 {
    (acc.rotate_left(23) ^ h).wrapping_mul(0x2545_f491_4f6c_dd1d)
}

/// Composite hash of every row over `keys`.
pub fn hash_rows(keys: &[&Column], ctx: &ExecutionContext) -> Vec<u64> {
    let len = keys.first().map_or(0, |c| c.len());
    let state = hasher();
    ctx.map_chunks(len, |range| {
        let mut hashes = vec![ROW_SEED; range.len()];
        for column in keys {
            hash_column(column, &state, range.clone(), &mut hashes);
        }
        hashes
    })
    .concat()
}

fn hash_column(column: &Column, state: &RandomState, range: Range<usize>, out: &mut [u64]) {
    match column.data() {
        ColumnData::Int64(v) => hash_native(v, column, state, range, out),
        ColumnData::Float32(v) => hash_native(v, column, state, range, out),
        ColumnData::Float64(v) => hash_native(v, column, state, range, out),
        ColumnData::Boolean(v) => hash_native(v, column, state, range, out),
        ColumnData::Utf8(s) => {
            for (acc, i) in out.iter_mut().zip(range) {
                let h = if column.is_valid(i) {
                    state.hash_one(s.value(i))
                } else {
                    NULL_HASH
                };
                *acc = mix(*acc, h);
            }
        }
    }
}

fn hash_native<T: NativeType>(
    values: &[T],
    column: &Column,
    state: &RandomState,
    range: Range<usize>,
    out: &mut [u64],
) {
    for (acc, i) in out.iter_mut().zip(range) {
        let h = if column.is_valid(i) {
            state.hash_one(values[i].key_bits())
        } else {
            NULL_HASH
        };
        *acc = mix(*acc, h);
    }
}

/// Key equality; two nulls are equal, floats compare by canonical bits.
#[inline]
pub fn values_equal(a: &Column, i: usize, b: &Column, j: usize) -> bool {
    match (a.is_valid(i), b.is_valid(j)) {
        (false, false) => true,
        (true, true) => match (a.data(), b.data()) {
            (ColumnData::Int64(x), ColumnData::Int64(y)) => x[i] == y[j],
            (ColumnData::Float32(x), ColumnData::Float32(y)) => x[i].key_bits() == y[j].key_bits(),
            (ColumnData::Float64(x), ColumnData::Float64(y)) => x[i].key_bits() == y[j].key_bits(),
            (ColumnData::Boolean(x), ColumnData::Boolean(y)) => x[i] == y[j],
            (ColumnData::Utf8(x), ColumnData::Utf8(y)) => x.value(i) == y.value(j),
            _ => false,
        },
        _ => false,
    }
}

#[inline]
pub fn rows_equal(a: &[&Column], i: usize, b: &[&Column], j: usize) -> bool {
    a.iter().zip(b).all(|(x, y)| values_equal(x, i, y, j))
}

#[inline]
pub fn has_null(keys: &[&Column], row: usize) -> bool {
    keys.iter().any(|c| !c.is_valid(row))
}

#[inline]
fn partition_of(hash: u64, partitions: usize) -> usize {
    debug_assert!(partitions.is_power_of_two());
    (hash >> 40) as usize & (partitions - 1)
}

/// Row-to-group assignment, groups numbered in first-occurrence order.
#[derive(Debug, Clone, Default)]
pub struct Groups {
    /// Group id of every input row.
    pub row_groups: Vec<usize>,
    /// First row of each group.
    pub first_rows: Vec<usize>,
}

impl Groups {
    pub fn len(&self) -> usize {
        self.first_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_rows.is_empty()
    }
}

struct PartitionGroups {
    rows: Vec<usize>,
    row_groups: Vec<usize>,
    first_rows: Vec<usize>,
}

/// Assigns every row to a group of equal keys.
///
/// Large inputs are split into hash partitions built on separate workers;
/// partition-local groups are then renumbered by first row, so the result is
/// the same for any worker count.
pub fn group_rows(keys: &[&Column], ctx: &ExecutionContext) -> Groups {
    let len = keys.first().map_or(0, |c| c.len());
    let hashes = hash_rows(keys, ctx);
    let partitions = ctx.partition_count(len);

    if partitions <= 1 {
        let local = build_groups(keys, &hashes, None);
        return Groups {
            row_groups: local.row_groups,
            first_rows: local.first_rows,
        };
    }

    let locals = ctx.map_partitions(partitions, |p| build_groups(keys, &hashes, Some((p, partitions))));

    let mut order: Vec<(usize, usize, usize)> = locals
        .iter()
        .enumerate()
        .flat_map(|(p, local)| {
            local
                .first_rows
                .iter()
                .enumerate()
                .map(move |(g, &row)| (row, p, g))
        })
        .collect();
    order.sort_unstable();

    let mut remap: Vec<Vec<usize>> = locals.iter().map(|l| vec![0; l.first_rows.len()]).collect();
    let mut first_rows = Vec::with_capacity(order.len());
    for (global, &(row, p, g)) in order.iter().enumerate() {
        remap[p][g] = global;
        first_rows.push(row);
    }

    let mut row_groups = vec![0; len];
    for (p, local) in locals.iter().enumerate() {
        for (&row, &g) in local.rows.iter().zip(&local.row_groups) {
            row_groups[row] = remap[p][g];
        }
    }

    trace!(partitions, groups = first_rows.len(), "merged partitioned group tables");
    Groups {
        row_groups,
        first_rows,
    }
}

fn build_groups(keys: &[&Column], hashes: &[u64], partition: Option<(usize, usize)>) -> PartitionGroups {
    let mut heads: AHashMap<u64, usize> = AHashMap::new();
    let mut next: Vec<usize> = Vec::new();
    let mut first_rows: Vec<usize> = Vec::new();
    let mut rows = Vec::new();
    let mut row_groups = Vec::new();

    for (row, &h) in hashes.iter().enumerate() {
        if let Some((p, parts)) = partition {
            if partition_of(h, parts) != p {
                continue;
            }
        }
        let head = heads.get(&h).copied().unwrap_or(NONE);
        let mut candidate = head;
        while candidate != NONE && !rows_equal(keys, first_rows[candidate], keys, row) {
            candidate = next[candidate];
        }
        let group = if candidate != NONE {
            candidate
        } else {
            let g = first_rows.len();
            first_rows.push(row);
            next.push(head);
            heads.insert(h, g);
            g
        };
        rows.push(row);
        row_groups.push(group);
    }

    PartitionGroups {
        rows,
        row_groups,
        first_rows,
    }
}

struct PartitionTable {
    heads: AHashMap<u64, usize>,
    next: Vec<usize>,
    rows: Vec<usize>,
}

/// Hash table over the build side of a join, with chained buckets.
///
/// Rows with a null key are never inserted. Candidates for a hash are
/// produced in ascending row order.
pub struct JoinTable {
    partitions: Vec<PartitionTable>,
}

impl JoinTable {
    pub fn build(keys: &[&Column], hashes: &[u64], ctx: &ExecutionContext) -> Self {
        let parts = ctx.partition_count(hashes.len());
        let partitions = ctx.map_partitions(parts, |p| {
            let mut table = PartitionTable {
                heads: AHashMap::new(),
                next: Vec::new(),
                rows: Vec::new(),
            };
            // Insert back to front so each chain reads in ascending row order.
            for row in (0..hashes.len()).rev() {
                let h = hashes[row];
                if (parts > 1 && partition_of(h, parts) != p) || has_null(keys, row) {
                    continue;
                }
                let slot = table.rows.len();
                table.rows.push(row);
                table.next.push(table.heads.get(&h).copied().unwrap_or(NONE));
                table.heads.insert(h, slot);
            }
            table
        });
        trace!(partitions = partitions.len(), rows = hashes.len(), "built join table");
        Self { partitions }
    }

    /// Calls `f` with every build row whose hash equals `hash`.
    #[inline]
    pub fn for_each_candidate<F: FnMut(usize)>(&self, hash: u64, mut f: F) {
        let parts = self.partitions.len();
        let table = if parts > 1 {
            &self.partitions[partition_of(hash, parts)]
        } else {
            &self.partitions[0]
        };
        let mut slot = table.heads.get(&hash).copied().unwrap_or(NONE);
        while slot != NONE {
            f(table.rows[slot]);
            slot = table.next[slot];
        }
    }
}
