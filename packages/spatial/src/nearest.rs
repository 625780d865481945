//! R-tree nearest-neighbour lookup over projected points.

use rstar::RTree;
use rstar::primitives::GeomWithData;

type Entry<T> = GeomWithData<[f64; 2], T>;

/// Nearest-point index over metric (projected) coordinates.
///
/// Built once and queried for every census cell.
pub struct NearestIndex<T> {
    tree: RTree<Entry<T>>,
}

impl<T> NearestIndex<T> {
    /// Bulk-loads the index from `(x, y, payload)` triples.
    #[must_use]
    pub fn new(points: impl IntoIterator<Item = (f64, f64, T)>) -> Self {
        let entries = points
            .into_iter()
            .map(|(x, y, data)| GeomWithData::new([x, y], data))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Payload of the point closest to `(x, y)`, or `None` if the index is
    /// empty.
    #[must_use]
    pub fn nearest(&self, x: f64, y: f64) -> Option<&T> {
        self.tree.nearest_neighbor(&[x, y]).map(|entry| &entry.data)
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
