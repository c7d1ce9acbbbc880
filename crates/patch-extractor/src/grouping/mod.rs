//! Merging nearby windows into shared reads.
//!
//! Reading one rectangle that covers several overlapping windows is cheaper
//! than reading each separately, as long as the union does not drag in much
//! more area than it saves. The grouper merges greedily over an R-tree and
//! caps merged rectangles at `max_patch_size` pixels per side.

mod index;

pub use index::SpatialIndex;

use ndarray::{s, Array3, ArrayView3};
use projection::CoordinateTransformer;

use crate::error::{ExtractError, Result};
use crate::reader::warp;
use crate::types::{PixelWindow, Window};

/// Default cap on a merged window's width and height in pixels.
pub const MAX_PATCH_SIZE: i64 = 2048;

/// A merged read region and the windows it serves.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowGroup {
    /// Smallest rectangle covering every member.
    pub window: PixelWindow,
    /// Per-point windows, in the order they joined.
    pub members: Vec<Window>,
}

impl WindowGroup {
    /// Start a group from a single window.
    pub fn new(seed: Window) -> Self {
        Self {
            window: seed.pixels,
            members: vec![seed],
        }
    }

    /// Add a member, growing the bounding rectangle to cover it.
    pub fn add_window(&mut self, window: Window) {
        self.window = self.window.expand(&window.pixels);
        self.members.push(window);
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Pixels read for this group.
    pub fn area(&self) -> i64 {
        self.window.area()
    }

    /// Pixels that reading every member on its own would cost.
    pub fn member_area(&self) -> i64 {
        self.members.iter().map(Window::area).sum()
    }

    /// Offset and size of `member` inside a `rows` x `cols` group buffer,
    /// as (row, col, height, width).
    fn member_slice(
        &self,
        member: &Window,
        rows: usize,
        cols: usize,
    ) -> Result<(usize, usize, usize, usize)> {
        let col_off = member.pixels.column - self.window.column;
        let row_off = member.pixels.row - self.window.row;
        let fits = col_off >= 0
            && row_off >= 0
            && col_off + member.pixels.width <= cols as i64
            && row_off + member.pixels.height <= rows as i64;
        if !fits {
            return Err(ExtractError::internal(format!(
                "window {} ({}) at offset ({col_off}, {row_off}) exceeds group buffer of {cols}x{rows}",
                member.window_id, member.pixels
            )));
        }
        Ok((
            row_off as usize,
            col_off as usize,
            member.pixels.height as usize,
            member.pixels.width as usize,
        ))
    }

    /// Cut every member out of the group's `[band, row, col]` buffer and
    /// warp it into its square target patch.
    ///
    /// Yields one `[band, row, col]` image per member, in member order.
    /// A member that does not fit in the buffer is an
    /// [`ExtractError::InternalConsistency`] error.
    pub fn extract_images(
        &self,
        buffer: ArrayView3<'_, u8>,
        transformer: &CoordinateTransformer,
    ) -> Result<Vec<(String, Array3<u8>)>> {
        let (_, rows, cols) = buffer.dim();
        self.members
            .iter()
            .map(|member| {
                let (row, col, height, width) = self.member_slice(member, rows, cols)?;
                let source = buffer.slice(s![.., row..row + height, col..col + width]);
                let image = warp::reproject(source, member, transformer)?;
                Ok((member.window_id.clone(), image))
            })
            .collect()
    }
}

/// Greedy window merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGrouper {
    max_patch_size: i64,
}

impl Default for WindowGrouper {
    fn default() -> Self {
        Self::new(MAX_PATCH_SIZE)
    }
}

impl WindowGrouper {
    /// Create a grouper capping merged windows at `max_patch_size` per side.
    pub fn new(max_patch_size: i64) -> Self {
        Self { max_patch_size }
    }

    /// The merge size cap.
    pub fn max_patch_size(&self) -> i64 {
        self.max_patch_size
    }

    /// Partition `windows` into groups.
    ///
    /// Seeds are taken in input order. Each pass re-queries the index with
    /// the group's current rectangle, so windows reachable through earlier
    /// merges can join too. A candidate joins only if the merged rectangle
    /// stays within the size cap and is strictly smaller than the group and
    /// the candidate read separately.
    ///
    /// Every input window lands in exactly one group. A single window larger
    /// than the cap still becomes its own group.
    pub fn group(&self, windows: Vec<Window>) -> Vec<WindowGroup> {
        let index = SpatialIndex::build(windows.iter().map(|w| &w.pixels));
        let rects: Vec<PixelWindow> = windows.iter().map(|w| w.pixels).collect();
        let mut slots: Vec<Option<Window>> = windows.into_iter().map(Some).collect();
        let mut grouped = vec![false; slots.len()];
        let mut groups = Vec::new();

        for seed in 0..slots.len() {
            let Some(seed_window) = slots[seed].take() else {
                continue;
            };
            grouped[seed] = true;
            let mut group = WindowGroup::new(seed_window);

            loop {
                let mut changed = false;
                for candidate in index.query(&group.window) {
                    if grouped[candidate] {
                        continue;
                    }
                    let rect = &rects[candidate];
                    let expanded = group.window.expand(rect);
                    if expanded.width > self.max_patch_size
                        || expanded.height > self.max_patch_size
                    {
                        continue;
                    }
                    let savings = group.window.area() + rect.area() - expanded.area();
                    if savings <= 0 {
                        continue;
                    }
                    if let Some(window) = slots[candidate].take() {
                        group.add_window(window);
                        grouped[candidate] = true;
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            tracing::trace!(
                window = %group.window,
                members = group.len(),
                "Built window group"
            );
            groups.push(group);
        }

        groups
    }
}

/// Group `windows` with a [`WindowGrouper`] capped at `max_patch_size`.
pub fn group_windows(windows: Vec<Window>, max_patch_size: i64) -> Vec<WindowGroup> {
    WindowGrouper::new(max_patch_size).group(windows)
}
