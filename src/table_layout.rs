//! WriteNow-style table auto-layout (§4.8): recovers a logical
//! `(row, col, rowspan, colspan)` grid from an unstructured list of cell
//! bounding boxes, the way formats with no explicit grid model (WriteNow,
//! and several MacWrite Pro table variants) store their tables.
//!
//! Grounded on
//! `examples/original_source/src/lib/IMWAWTableHelper.cxx`'s
//! `buildStructures`/`sendTable`: merge nearby edges into grid lines
//! (within a small pixel tolerance), locate each cell's span against that
//! grid, then walk row-major emitting only occupied positions.

use crate::error::{MwawError, Result};
use crate::types::Box2;

/// Coordinates within this distance are considered the same grid line
/// (§4.8 step 1, `IMWAWTableHelper`'s hard-coded "2 pixel ok").
const GRID_TOLERANCE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnplacedCell {
    pub id: usize,
    pub bbox: Box2<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedCell {
    pub id: usize,
    pub col: u32,
    pub row: u32,
    pub colspan: u32,
    pub rowspan: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub column_widths: Vec<f64>,
    pub row_heights: Vec<f64>,
    /// In row-major emission order: `open_table_row` then, for each
    /// occupied position, `open_table_cell` — unoccupied positions are
    /// simply absent, per §4.8 step 4.
    pub cells: Vec<PlacedCell>,
}

/// Merges a raw edge-coordinate list into grid lines: a new line starts
/// whenever an edge is more than [`GRID_TOLERANCE`] past the last one.
fn grid_lines(mut edges: Vec<f64>) -> Vec<f64> {
    edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut lines: Vec<f64> = Vec::new();
    for edge in edges {
        match lines.last() {
            Some(&last) if edge - last <= GRID_TOLERANCE => {}
            _ => lines.push(edge),
        }
    }
    lines
}

/// The largest grid-line index whose position is `<= value` within
/// tolerance (§4.8 step 2's "start index").
fn start_index(lines: &[f64], value: f64) -> Option<usize> {
    let mut found = None;
    for (i, &line) in lines.iter().enumerate() {
        if line <= value + GRID_TOLERANCE {
            found = Some(i);
        } else {
            break;
        }
    }
    found
}

/// The smallest grid-line index whose position is `>= value` within
/// tolerance (§4.8 step 2's "end index").
fn end_index(lines: &[f64], value: f64) -> Option<usize> {
    lines
        .iter()
        .position(|&line| line >= value - GRID_TOLERANCE)
}

/// Computes the logical grid for `cells`. A zero span on an axis where the
/// cell's own bounding box is non-degenerate is a malformed table — the
/// whole table is rejected rather than partially laid out, matching
/// `IMWAWTableHelper::buildStructures`'s all-or-nothing return value.
pub fn layout(cells: &[UnplacedCell]) -> Result<TableLayout> {
    if cells.is_empty() {
        return Err(MwawError::malformed_zone("table has no cells"));
    }

    let mut edges_x = Vec::with_capacity(cells.len() * 2);
    let mut edges_y = Vec::with_capacity(cells.len() * 2);
    for cell in cells {
        edges_x.push(cell.bbox.min().x);
        edges_x.push(cell.bbox.max().x);
        edges_y.push(cell.bbox.min().y);
        edges_y.push(cell.bbox.max().y);
    }
    let cols = grid_lines(edges_x);
    let rows = grid_lines(edges_y);

    let mut placed = Vec::with_capacity(cells.len());
    for cell in cells {
        let col_start = start_index(&cols, cell.bbox.min().x)
            .ok_or_else(|| MwawError::malformed_zone("cell has no matching column grid line"))?;
        let col_end = end_index(&cols, cell.bbox.max().x)
            .ok_or_else(|| MwawError::malformed_zone("cell has no matching column grid line"))?;
        let row_start = start_index(&rows, cell.bbox.min().y)
            .ok_or_else(|| MwawError::malformed_zone("cell has no matching row grid line"))?;
        let row_end = end_index(&rows, cell.bbox.max().y)
            .ok_or_else(|| MwawError::malformed_zone("cell has no matching row grid line"))?;

        let colspan = col_end.checked_sub(col_start).ok_or_else(|| {
            MwawError::malformed_zone("cell's column end precedes its start")
        })?;
        let rowspan = row_end.checked_sub(row_start).ok_or_else(|| {
            MwawError::malformed_zone("cell's row end precedes its start")
        })?;

        if colspan == 0 && cell.bbox.width() > GRID_TOLERANCE {
            return Err(MwawError::malformed_zone(format!(
                "cell {} has zero column span despite non-degenerate width",
                cell.id
            )));
        }
        if rowspan == 0 && cell.bbox.height() > GRID_TOLERANCE {
            return Err(MwawError::malformed_zone(format!(
                "cell {} has zero row span despite non-degenerate height",
                cell.id
            )));
        }

        placed.push(PlacedCell {
            id: cell.id,
            col: col_start as u32,
            row: row_start as u32,
            colspan: colspan.max(1) as u32,
            rowspan: rowspan.max(1) as u32,
        });
    }

    let num_cols = cols.len().saturating_sub(1);
    let num_rows = rows.len().saturating_sub(1);
    let mut occupied = vec![false; num_cols * num_rows];
    for cell in &placed {
        for r in cell.row..cell.row + cell.rowspan {
            for c in cell.col..cell.col + cell.colspan {
                if r as usize >= num_rows || c as usize >= num_cols {
                    return Err(MwawError::malformed_zone(format!(
                        "cell {} spans outside the computed grid",
                        cell.id
                    )));
                }
                let slot = &mut occupied[r as usize * num_cols + c as usize];
                if *slot {
                    return Err(MwawError::malformed_zone(format!(
                        "cell {} overlaps an already-occupied grid position",
                        cell.id
                    )));
                }
                *slot = true;
            }
        }
    }

    placed.sort_by_key(|c| (c.row, c.col));

    let column_widths: Vec<f64> = cols.windows(2).map(|w| w[1] - w[0]).collect();
    let row_heights: Vec<f64> = rows.windows(2).map(|w| w[1] - w[0]).collect();

    Ok(TableLayout {
        column_widths,
        row_heights,
        cells: placed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn cell(id: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> UnplacedCell {
        UnplacedCell {
            id,
            bbox: Box2::new(Vec2::new(x0, y0), Vec2::new(x1, y1)),
        }
    }

    #[test]
    fn two_by_two_grid_lays_out_cleanly() {
        let cells = vec![
            cell(0, 0.0, 0.0, 100.0, 50.0),
            cell(1, 100.0, 0.0, 200.0, 50.0),
            cell(2, 0.0, 50.0, 100.0, 100.0),
            cell(3, 100.0, 50.0, 200.0, 100.0),
        ];
        let layout = layout(&cells).unwrap();
        assert_eq!(layout.column_widths, vec![100.0, 100.0]);
        assert_eq!(layout.row_heights, vec![50.0, 50.0]);
        assert_eq!(layout.cells.len(), 4);
        assert!(layout.cells.iter().all(|c| c.colspan == 1 && c.rowspan == 1));
    }

    #[test]
    fn merged_cell_spans_two_columns() {
        let cells = vec![
            cell(0, 0.0, 0.0, 200.0, 50.0),
            cell(1, 0.0, 50.0, 100.0, 100.0),
            cell(2, 100.0, 50.0, 200.0, 100.0),
        ];
        let layout = layout(&cells).unwrap();
        let spanning = layout.cells.iter().find(|c| c.id == 0).unwrap();
        assert_eq!(spanning.colspan, 2);
        assert_eq!(spanning.rowspan, 1);
    }

    #[test]
    fn nearby_edges_merge_within_tolerance() {
        let cells = vec![
            cell(0, 0.0, 0.0, 100.0, 50.0),
            cell(1, 101.5, 0.0, 200.0, 50.0),
        ];
        let layout = layout(&cells).unwrap();
        assert_eq!(layout.column_widths.len(), 2);
    }

    #[test]
    fn overlapping_cells_are_rejected() {
        let cells = vec![
            cell(0, 0.0, 0.0, 100.0, 100.0),
            cell(1, 0.0, 0.0, 100.0, 100.0),
        ];
        assert!(layout(&cells).is_err());
    }

    #[test]
    fn empty_cell_list_is_rejected() {
        assert!(layout(&[]).is_err());
    }
}
