//! In-memory tile-group storage read by generated scans.
//!
//! A [`Table`] is a list of [`TileGroup`]s. A tile group stores a fixed
//! number of rows for every column, either column-major (each column is a
//! dense array, stride = column width) or row-major (one array of rows,
//! stride = row width). Generated code asks for one [`ColumnLayoutInfo`]
//! per column and addresses row `tid` of column `c` as
//! `column + tid * stride`.
//!
//! Variable-length columns hold a 12-byte slot: an 8-byte data pointer
//! followed by a 4-byte length. A null pointer is SQL NULL. The bytes behind
//! the pointer are owned by the tile group.

/// Width of a variable-length column slot.
pub const VARLEN_SLOT_SIZE: u32 = 12;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ColumnLayoutInfo {
    pub column: *mut u8,
    pub stride: u32,
    pub is_columnar: bool,
}

/// Physical arrangement of a tile group's bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Columnar,
    RowMajor,
}

/// One column value handed to [`TileGroupBuilder::push_row`].
#[derive(Clone, Copy, Debug)]
pub enum Datum<'a> {
    /// Raw little-endian bytes; must match the column width.
    Fixed(&'a [u8]),
    /// Variable-length bytes, `None` for NULL.
    Varlen(Option<&'a [u8]>),
}

pub struct TileGroup {
    id: u32,
    num_tuples: u32,
    layout: Layout,
    widths: Vec<u32>,
    /// Column-major: one array per column. Row-major: a single array.
    data: Vec<Vec<u8>>,
    heap: Vec<Box<[u8]>>,
}

impl TileGroup {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn num_tuples(&self) -> u32 {
        self.num_tuples
    }

    pub fn num_columns(&self) -> usize {
        self.widths.len()
    }

    fn row_width(&self) -> u32 {
        self.widths.iter().sum()
    }

    /// Layout of every column, in column order.
    pub fn column_layouts(&mut self) -> Vec<ColumnLayoutInfo> {
        match self.layout {
            Layout::Columnar => self
                .data
                .iter_mut()
                .zip(&self.widths)
                .map(|(column, &width)| ColumnLayoutInfo {
                    column: column.as_mut_ptr(),
                    stride: width,
                    is_columnar: true,
                })
                .collect(),
            Layout::RowMajor => {
                let stride = self.row_width();
                let base = self.data.first_mut().map_or(std::ptr::null_mut(), Vec::as_mut_ptr);
                let mut offset = 0usize;
                self.widths
                    .iter()
                    .map(|&width| {
                        let info = ColumnLayoutInfo {
                            column: base.wrapping_add(offset),
                            stride,
                            is_columnar: false,
                        };
                        offset += width as usize;
                        info
                    })
                    .collect()
            }
        }
    }
}

pub struct TileGroupBuilder {
    group: TileGroup,
}

impl TileGroupBuilder {
    /// `widths` gives the byte width of each column. Use
    /// [`VARLEN_SLOT_SIZE`] for variable-length columns.
    pub fn new(id: u32, layout: Layout, widths: Vec<u32>) -> Self {
        let data = match layout {
            Layout::Columnar => vec![Vec::new(); widths.len()],
            Layout::RowMajor => vec![Vec::new()],
        };
        TileGroupBuilder {
            group: TileGroup {
                id,
                num_tuples: 0,
                layout,
                widths,
                data,
                heap: Vec::new(),
            },
        }
    }

    fn encode(&mut self, datum: Datum<'_>, width: u32) -> Vec<u8> {
        match datum {
            Datum::Fixed(bytes) => {
                assert_eq!(bytes.len(), width as usize, "fixed-width datum does not match column width");
                bytes.to_vec()
            }
            Datum::Varlen(value) => {
                assert_eq!(width, VARLEN_SLOT_SIZE, "varlen datum in a fixed-width column");
                let (ptr, len) = match value {
                    Some(bytes) => {
                        let mut owned: Box<[u8]> = bytes.into();
                        let slot = (owned.as_mut_ptr() as u64, bytes.len() as u32);
                        self.group.heap.push(owned);
                        slot
                    }
                    None => (0, 0),
                };
                let mut slot = ptr.to_le_bytes().to_vec();
                slot.extend_from_slice(&len.to_le_bytes());
                slot
            }
        }
    }

    pub fn push_row(&mut self, row: &[Datum<'_>]) -> &mut Self {
        assert_eq!(row.len(), self.group.widths.len(), "row arity does not match column count");
        let widths = self.group.widths.clone();
        for (col, (&datum, &width)) in row.iter().zip(&widths).enumerate() {
            let bytes = self.encode(datum, width);
            let target = match self.group.layout {
                Layout::Columnar => col,
                Layout::RowMajor => 0,
            };
            self.group.data[target].extend_from_slice(&bytes);
        }
        self.group.num_tuples += 1;
        self
    }

    pub fn build(self) -> TileGroup {
        tracing::trace!(
            id = self.group.id,
            tuples = self.group.num_tuples,
            layout = ?self.group.layout,
            "built tile group"
        );
        self.group
    }
}

#[derive(Default)]
pub struct Table {
    tile_groups: Vec<TileGroup>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tile_group(&mut self, tile_group: TileGroup) {
        self.tile_groups.push(tile_group);
    }

    pub fn tile_groups(&self) -> &[TileGroup] {
        &self.tile_groups
    }

    pub fn num_tuples(&self) -> u64 {
        self.tile_groups.iter().map(|tg| u64::from(tg.num_tuples)).sum()
    }
}

#[no_mangle]
pub extern "C" fn quarry_table_tile_group_count(table: *const Table) -> u32 {
    // SAFETY: generated code passes a live table
    unsafe { &*table }.tile_groups.len() as u32
}

#[no_mangle]
pub extern "C" fn quarry_table_tile_group(table: *mut Table, index: u32) -> *mut TileGroup {
    // SAFETY: generated code passes a live table
    let table = unsafe { &mut *table };
    table
        .tile_groups
        .get_mut(index as usize)
        .map_or(std::ptr::null_mut(), |tg| tg as *mut TileGroup)
}

#[no_mangle]
pub extern "C" fn quarry_tile_group_id(tile_group: *const TileGroup) -> u32 {
    // SAFETY: pointer came from quarry_table_tile_group
    unsafe { &*tile_group }.id
}

#[no_mangle]
pub extern "C" fn quarry_tile_group_num_tuples(tile_group: *const TileGroup) -> u32 {
    // SAFETY: pointer came from quarry_table_tile_group
    unsafe { &*tile_group }.num_tuples
}

/// Fill `infos[0..num_cols]` with the layout of the first `num_cols` columns.
#[no_mangle]
pub extern "C" fn quarry_tile_group_column_layouts(
    tile_group: *mut TileGroup,
    infos: *mut ColumnLayoutInfo,
    num_cols: u32,
) {
    // SAFETY: pointer came from quarry_table_tile_group
    let tile_group = unsafe { &mut *tile_group };
    assert!(
        num_cols as usize <= tile_group.num_columns(),
        "scan requested more columns than the tile group has"
    );
    for (i, info) in tile_group.column_layouts().into_iter().take(num_cols as usize).enumerate() {
        // SAFETY: generated code sized `infos` for num_cols entries
        unsafe { infos.add(i).write(info) };
    }
}
