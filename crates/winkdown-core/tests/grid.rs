use pretty_assertions::assert_eq;
use winkdown_core::table::{
    CellAddr, GridError, GridRect, SelectionShape, Slot, TableGrid, classify, expand_to_closed,
};
use winkdown_core::{CellAttrs, ElementKind, ElementNode, Node, TableAttrs};

fn cell(row_span: usize, col_span: usize) -> Node {
    Node::element(
        ElementKind::TableCell(CellAttrs::spanned(row_span, col_span)),
        vec![Node::paragraph("")],
    )
}

fn row(cells: Vec<Node>) -> Node {
    Node::element(ElementKind::TableRow, cells)
}

fn table(rows: Vec<Node>) -> ElementNode {
    ElementNode {
        kind: ElementKind::Table(TableAttrs::default()),
        children: rows,
    }
}

fn addr(row: usize, cell: usize) -> CellAddr {
    CellAddr { row, cell }
}

/// Row 0: A (2 wide), B. Row 1: C (2 tall), D, E. Row 2: F, G.
fn spanning_table() -> ElementNode {
    table(vec![
        row(vec![cell(1, 2), cell(1, 1)]),
        row(vec![cell(2, 1), cell(1, 1), cell(1, 1)]),
        row(vec![cell(1, 1), cell(1, 1)]),
    ])
}

#[test]
fn plain_table_resolves_one_anchor_per_position() {
    let t = table(vec![
        row(vec![cell(1, 1), cell(1, 1), cell(1, 1)]),
        row(vec![cell(1, 1), cell(1, 1), cell(1, 1)]),
    ]);
    let grid = TableGrid::resolve(&t).unwrap();

    assert_eq!((grid.rows(), grid.cols()), (2, 3));
    assert!(grid.is_complete());
    for r in 0..2 {
        for c in 0..3 {
            assert_eq!(grid.slot(r, c), Some(Slot::Anchor(addr(r, c))));
        }
    }
}

#[test]
fn spans_cover_positions_and_shift_later_cells() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();

    assert_eq!((grid.rows(), grid.cols()), (3, 3));
    assert!(grid.is_complete());
    assert_eq!(grid.slot(0, 0), Some(Slot::Anchor(addr(0, 0))));
    assert_eq!(grid.slot(0, 1), Some(Slot::Covered(addr(0, 0))));
    assert_eq!(grid.slot(2, 0), Some(Slot::Covered(addr(1, 0))));
    assert_eq!(grid.owner_at(2, 1), Some(addr(2, 0)));

    assert_eq!(grid.rect(addr(0, 0)), Some(GridRect::new(0, 0, 1, 2)));
    assert_eq!(grid.rect(addr(1, 0)), Some(GridRect::new(1, 0, 2, 1)));
    assert_eq!(grid.rect(addr(2, 0)), Some(GridRect::new(2, 1, 1, 1)));
    assert_eq!(grid.rect(addr(2, 1)), Some(GridRect::new(2, 2, 1, 1)));
    assert_eq!(grid.anchors().count(), 7);
}

#[test]
fn every_position_has_exactly_one_owner() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();
    for r in 0..grid.rows() {
        for c in 0..grid.cols() {
            let owners: Vec<CellAddr> = grid
                .anchors()
                .filter(|(_, rect)| rect.contains_pos(r, c))
                .map(|(a, _)| a)
                .collect();
            assert_eq!(owners, vec![grid.owner_at(r, c).unwrap()]);
        }
    }
}

#[test]
fn ragged_rows_leave_gaps() {
    let t = table(vec![
        row(vec![cell(1, 1), cell(1, 1)]),
        row(vec![cell(1, 1)]),
    ]);
    let grid = TableGrid::resolve(&t).unwrap();

    assert!(!grid.is_complete());
    assert_eq!(grid.gaps(), vec![(1, 1)]);
}

#[test]
fn addr_of_maps_cell_paths_of_the_table_only() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();

    assert_eq!(grid.addr_of(&[4], &[4, 1, 2]), Some(addr(1, 2)));
    assert_eq!(grid.addr_of(&[4], &[4, 1, 3]), None);
    assert_eq!(grid.addr_of(&[4], &[5, 1, 2]), None);
    assert_eq!(grid.addr_of(&[4], &[4, 1, 2, 0]), None);
    assert_eq!(TableGrid::cell_path(&[4], addr(2, 1)), vec![4, 2, 1]);
}

#[test]
fn zero_span_is_a_contract_failure() {
    let t = table(vec![row(vec![cell(1, 1), cell(1, 0)])]);
    assert_eq!(
        TableGrid::resolve(&t),
        Err(GridError::ZeroSpan { row: 0, cell: 1 })
    );
}

#[test]
fn cell_crossing_a_vertical_span_is_an_overlap() {
    let t = table(vec![
        row(vec![cell(1, 1), cell(2, 1)]),
        row(vec![cell(1, 2)]),
    ]);
    assert_eq!(
        TableGrid::resolve(&t),
        Err(GridError::Overlap {
            row: 1,
            cell: 0,
            col: 1
        })
    );
}

#[test]
fn row_span_past_the_last_row_is_rejected() {
    let t = table(vec![row(vec![cell(2, 1)])]);
    assert_eq!(
        TableGrid::resolve(&t),
        Err(GridError::RowSpanOverflow { row: 0, cell: 0 })
    );
}

#[test]
fn non_row_children_are_rejected() {
    let t = table(vec![Node::paragraph("stray")]);
    assert_eq!(TableGrid::resolve(&t), Err(GridError::NotARow { row: 0 }));

    let paragraph = ElementNode {
        kind: ElementKind::Paragraph,
        children: vec![Node::text("")],
    };
    assert_eq!(TableGrid::resolve(&paragraph), Err(GridError::NotATable));
}

#[test]
fn expansion_grows_until_no_region_sticks_out() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();

    // A (0,0 2 wide) to D (1,1) pulls in C, which runs down to row 2.
    let start = GridRect::new(0, 0, 1, 2).union(&GridRect::single(1, 1));
    assert_eq!(expand_to_closed(&grid, start), GridRect::new(0, 0, 3, 2));

    // B (0,2) to D (1,1) touches A and then C, ending with the whole table.
    let start = GridRect::single(0, 2).union(&GridRect::single(1, 1));
    assert_eq!(expand_to_closed(&grid, start), GridRect::new(0, 0, 3, 3));
}

#[test]
fn expansion_is_idempotent() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();
    for start in [
        GridRect::single(1, 1),
        GridRect::new(1, 1, 1, 2),
        GridRect::new(0, 0, 1, 1),
        GridRect::new(0, 1, 2, 2),
    ] {
        let closed = expand_to_closed(&grid, start);
        assert!(closed.contains(&start));
        assert_eq!(expand_to_closed(&grid, closed), closed);
    }
}

#[test]
fn classify_tells_tiled_rectangles_from_irregular_sets() {
    let grid = TableGrid::resolve(&spanning_table()).unwrap();

    assert_eq!(
        classify(&grid, &[addr(1, 1), addr(1, 2)]),
        SelectionShape::Rectangle(GridRect::new(1, 1, 1, 2))
    );
    assert_eq!(
        classify(&grid, &[addr(0, 0), addr(0, 1)]),
        SelectionShape::Rectangle(GridRect::new(0, 0, 1, 3))
    );
    // B and D sit on a diagonal.
    assert_eq!(
        classify(&grid, &[addr(0, 1), addr(1, 1)]),
        SelectionShape::Irregular
    );
    assert_eq!(classify(&grid, &[]), SelectionShape::Irregular);
}
