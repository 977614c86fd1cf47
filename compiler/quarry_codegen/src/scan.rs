//! Scans over tile-group storage.
//!
//! [`Table::generate_scan`] loops over a range of tile groups. For each one
//! [`TileGroup::generate_tuple_scan`] resolves the column layouts once and
//! then hands the rows to a [`ScanCallback`] in batches.

mod table;
mod tile_group;

pub use table::Table;
pub use tile_group::{ScanCallback, TileGroup, TileGroupAccess, TileGroupRow};
