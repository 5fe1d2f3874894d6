//! Line locator: find a lane line inside a thin horizontal strip.
//!
//! The search is a cumulative-sum scan rather than a curve fit:
//!
//! 1. Sum the strip's foreground pixels per column.
//! 2. Accumulate those sums from strip column 0 outward.
//! 3. If the total does not exceed `min_pixels`, no line is present.
//! 4. Otherwise the boundary is the first column where the running
//!    total strictly exceeds `min_pixels`.
//! 5. The line position is the mean column of every foreground pixel in
//!    columns `[0, boundary)`. An empty span (e.g. `boundary == 0`) has
//!    no mean and is reported as a failed search.
//!
//! Strip column 0 is whichever image column the [`Strip`] maps there,
//! so the same scan finds the line nearest an anchor when the strip's
//! columns are reversed.

use std::ops::Range;

use crate::types::{Mask, PipelineError};

/// Order in which image columns map onto strip columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrder {
    /// Strip column 0 is the leftmost image column of the range.
    Forward,
    /// Strip column 0 is the rightmost image column of the range.
    Reversed,
}

/// Read-only view of `rows × columns` of a [`Mask`].
///
/// Rows are flipped so that strip row 0 is the band's bottom row, the
/// one nearest the vehicle. Columns follow the chosen [`ColumnOrder`].
#[derive(Debug, Clone)]
pub struct Strip<'a> {
    mask: &'a Mask,
    rows: Range<u32>,
    columns: Range<u32>,
    order: ColumnOrder,
}

impl<'a> Strip<'a> {
    /// Create a strip view, clipping both ranges to the mask bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyStrip`] if the clipped strip has
    /// zero width or zero height.
    pub fn new(
        mask: &'a Mask,
        rows: Range<u32>,
        columns: Range<u32>,
        order: ColumnOrder,
    ) -> Result<Self, PipelineError> {
        let clipped_rows = rows.start.min(mask.height())..rows.end.min(mask.height());
        let clipped_columns = columns.start.min(mask.width())..columns.end.min(mask.width());
        if clipped_rows.is_empty() || clipped_columns.is_empty() {
            return Err(PipelineError::EmptyStrip { rows, columns });
        }
        Ok(Self {
            mask,
            rows: clipped_rows,
            columns: clipped_columns,
            order,
        })
    }

    /// Strip width in columns.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.columns.end - self.columns.start
    }

    /// Strip height in rows.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.rows.end - self.rows.start
    }

    /// Image column that strip column `col` maps to.
    #[must_use]
    pub fn image_column(&self, col: u32) -> u32 {
        match self.order {
            ColumnOrder::Forward => self.columns.start + col,
            ColumnOrder::Reversed => self.columns.end - 1 - col,
        }
    }

    /// Image row that strip row `row` maps to.
    #[must_use]
    pub fn image_row(&self, row: u32) -> u32 {
        self.rows.end - 1 - row
    }

    /// Whether the strip pixel at `(col, row)` is foreground.
    #[must_use]
    pub fn is_foreground(&self, col: u32, row: u32) -> bool {
        self.mask
            .is_foreground(self.image_column(col), self.image_row(row))
    }

    /// Foreground pixel count per strip column.
    #[must_use]
    pub fn column_sums(&self) -> Vec<u64> {
        (0..self.width())
            .map(|col| {
                (0..self.height())
                    .filter(|&row| self.is_foreground(col, row))
                    .count() as u64
            })
            .collect()
    }
}

/// Result of [`locate_line`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    /// Foreground pixels in the whole strip.
    pub total_pixels: u64,
    /// First strip column at which the running total exceeds the floor.
    pub boundary_index: Option<usize>,
    /// Mean strip column of the foreground pixels in `[0, boundary)`.
    pub mean_offset: Option<f64>,
}

impl LineSearch {
    /// Whether a line position was found.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.mean_offset.is_some()
    }
}

/// Locate a lane line in `strip`, rejecting strips with `min_pixels`
/// or fewer foreground pixels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn locate_line(strip: &Strip<'_>, min_pixels: u64) -> LineSearch {
    let sums = strip.column_sums();

    let mut running = 0u64;
    let cumulative: Vec<u64> = sums
        .iter()
        .map(|&s| {
            running += s;
            running
        })
        .collect();

    let total_pixels = cumulative.last().copied().unwrap_or(0);
    if total_pixels <= min_pixels {
        return LineSearch {
            total_pixels,
            boundary_index: None,
            mean_offset: None,
        };
    }

    let boundary = cumulative.iter().position(|&c| c > min_pixels);

    let mean_offset = boundary.and_then(|b| {
        let (count, weighted) = sums[..b]
            .iter()
            .enumerate()
            .fold((0u64, 0u64), |(n, w), (col, &s)| (n + s, w + s * col as u64));
        (count > 0).then(|| weighted as f64 / count as f64)
    });

    LineSearch {
        total_pixels,
        boundary_index: boundary,
        mean_offset,
    }
}
