mod grid;
mod selection;
mod transforms;

pub(crate) use grid::plain_cell;
pub use grid::{CellAddr, GridError, GridRect, Slot, TableGrid};
pub use selection::{SelectionMode, SelectionShape, TableSelection, classify, expand_to_closed};
pub use transforms::{
    can_split, delete_column, delete_row, delete_table, insert_column, insert_row, insert_table,
    merge_cells, set_cell_align, set_cell_background, set_cell_borders, set_column_width,
    split_cell, table_node,
};
