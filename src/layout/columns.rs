//! Page geometry and column cursors.
//!
//! Placement is threaded through [`Columns`] values: each step takes the
//! current state and returns the next one, nothing is mutated in place.

use serde::Serialize;

/// Number of content columns on a page.
pub const COLUMN_COUNT: usize = 3;

/// Vertically stacked pages of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageGeometry {
    pub width: i64,
    pub height: i64,
    pub margin: i64,
    pub column_gap: i64,
    /// Height reserved at the top of the first page for the cartouche
    pub cartouche_height: i64,
    /// Gap between stacked blocks
    pub gap: i64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 1654,
            height: 1169,
            margin: 20,
            column_gap: 30,
            cartouche_height: 50,
            gap: 20,
        }
    }
}

impl PageGeometry {
    /// Width available between the side margins.
    pub fn content_width(&self) -> i64 {
        self.width - 2 * self.margin
    }

    pub fn column_width(&self) -> i64 {
        let n = COLUMN_COUNT as i64;
        (self.content_width() - (n - 1) * self.column_gap) / n
    }

    pub fn column_x(&self, column: usize) -> i64 {
        self.margin + column as i64 * (self.column_width() + self.column_gap)
    }

    /// Page index holding `y`.
    pub fn page_of(&self, y: i64) -> i64 {
        y.div_euclid(self.height).max(0)
    }

    /// First usable y on a page.
    pub fn body_top(&self, page: i64) -> i64 {
        if page <= 0 {
            self.margin + self.cartouche_height + self.gap
        } else {
            page * self.height + self.margin
        }
    }

    /// Last usable y on a page.
    pub fn body_bottom(&self, page: i64) -> i64 {
        (page.max(0) + 1) * self.height - self.margin
    }

    /// Height of the body of any page after the first.
    pub fn full_body_height(&self) -> i64 {
        self.height - 2 * self.margin
    }

    /// Move `y` out of a top margin onto the body of its page.
    pub fn normalize(&self, y: i64) -> i64 {
        let top = self.body_top(self.page_of(y));
        y.max(top)
    }

    /// Whether a block of height `h` starting at `y` ends on the same page.
    pub fn fits(&self, y: i64, h: i64) -> bool {
        y + h <= self.body_bottom(self.page_of(y))
    }

    /// Top coordinate for a block of height `h` wanting to start at `y`.
    ///
    /// A block that would cross the page bottom moves to the next page top,
    /// unless no page body could ever hold it, in which case it stays.
    pub fn place(&self, y: i64, h: i64) -> i64 {
        let y = self.normalize(y);
        if self.fits(y, h) || h > self.full_body_height() {
            y
        } else {
            self.body_top(self.page_of(y) + 1)
        }
    }

    /// Number of pages needed to reach `bottom`.
    pub fn pages_for(&self, bottom: i64) -> i64 {
        self.page_of((bottom - 1).max(0)) + 1
    }
}

/// Next free y of each column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    cursors: [i64; COLUMN_COUNT],
}

impl Columns {
    pub fn starting_at(y: i64) -> Self {
        Self {
            cursors: [y; COLUMN_COUNT],
        }
    }

    pub fn cursor(&self, column: usize) -> i64 {
        self.cursors[column]
    }

    /// Column with the least accumulated height, lowest index on ties.
    pub fn shortest(&self) -> usize {
        let mut best = 0;
        for (i, y) in self.cursors.iter().enumerate() {
            if *y < self.cursors[best] {
                best = i;
            }
        }
        best
    }

    /// State after a block ending at `bottom` was placed in `column`.
    pub fn advanced(self, column: usize, bottom: i64) -> Self {
        let mut cursors = self.cursors;
        cursors[column] = bottom;
        Self { cursors }
    }

    /// Lowest cursor across all columns.
    pub fn max_bottom(&self) -> i64 {
        self.cursors.iter().copied().max().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let g = PageGeometry::default();
        assert_eq!(g.column_width(), 518);
        assert_eq!(g.column_x(0), 20);
        assert_eq!(g.column_x(2), 20 + 2 * (518 + 30));
        assert_eq!(g.body_top(0), 90);
        assert_eq!(g.body_top(1), 1189);
        assert_eq!(g.body_bottom(0), 1149);
    }

    #[test]
    fn test_place_moves_to_next_page() {
        let g = PageGeometry::default();
        assert_eq!(g.place(1000, 100), 1000);
        assert_eq!(g.place(1100, 100), g.body_top(1));
        // top margin of page 1 is skipped
        assert_eq!(g.place(1170, 10), g.body_top(1));
    }

    #[test]
    fn test_place_keeps_oversized_blocks() {
        let g = PageGeometry::default();
        let huge = g.full_body_height() + 1;
        assert_eq!(g.place(500, huge), 500);
        // fits a fresh page but not the first page body
        let tall = g.full_body_height();
        assert_eq!(g.place(g.body_top(0), tall), g.body_top(1));
    }

    #[test]
    fn test_shortest_column_ties_to_lowest_index() {
        let c = Columns::starting_at(90);
        assert_eq!(c.shortest(), 0);
        let c = c.advanced(0, 300).advanced(1, 200);
        assert_eq!(c.shortest(), 2);
        let c = c.advanced(2, 200);
        assert_eq!(c.shortest(), 1);
        assert_eq!(c.max_bottom(), 300);
    }

    #[test]
    fn test_pages_for() {
        let g = PageGeometry::default();
        assert_eq!(g.pages_for(0), 1);
        assert_eq!(g.pages_for(1169), 1);
        assert_eq!(g.pages_for(1170), 2);
    }
}
