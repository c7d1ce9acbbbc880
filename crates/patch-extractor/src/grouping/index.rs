//! R-tree over window pixel extents.

use rstar::{RTree, RTreeObject, AABB};

use crate::types::PixelWindow;

#[derive(Debug, Clone)]
struct WindowBox {
    idx: usize,
    env: AABB<[i64; 2]>,
}

impl RTreeObject for WindowBox {
    type Envelope = AABB<[i64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

fn envelope(window: &PixelWindow) -> AABB<[i64; 2]> {
    let (min_col, min_row, max_col, max_row) = window.extents();
    AABB::from_corners([min_col, min_row], [max_col, max_row])
}

/// Read-only index from pixel rectangles to their position in the input.
///
/// Extents are treated as closed, so rectangles that only share an edge
/// are reported as intersecting.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<WindowBox>,
}

impl SpatialIndex {
    /// Bulk-load an index; each rectangle is keyed by its iteration order.
    pub fn build<'a>(windows: impl IntoIterator<Item = &'a PixelWindow>) -> Self {
        let boxes: Vec<WindowBox> = windows
            .into_iter()
            .enumerate()
            .map(|(idx, window)| WindowBox {
                idx,
                env: envelope(window),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(boxes),
        }
    }

    /// Indices of all rectangles intersecting `window`, ascending.
    pub fn query(&self, window: &PixelWindow) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(window))
            .map(|b| b.idx)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Number of indexed rectangles.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
