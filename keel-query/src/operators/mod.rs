//! Physical engines: hashing, grouping, joins, sorting and windows.

pub mod groupby;
pub mod hashing;
pub mod join;
pub mod sort;
pub mod window;

pub use groupby::{aggregate_groups, distinct_rows, group_keys};
pub use hashing::Groups;
pub use join::hash_join;
pub use sort::{sort_frame, sort_indices};
pub use window::apply_window;
