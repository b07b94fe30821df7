//! Cluster trees and block cluster trees
//!
//! Clusters are stored in an arena. Every cluster owns a contiguous range of
//! a permutation of the DOFs, so the DOFs of a cluster are a slice.
use std::ops::Range;

/// Axis aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: [f64; 3],
    max: [f64; 3],
}

impl BoundingBox {
    /// The smallest box containing a set of points
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in points {
            for d in 0..3 {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }
        Self { min, max }
    }

    /// Lower corner
    pub fn min(&self) -> &[f64; 3] {
        &self.min
    }

    /// Upper corner
    pub fn max(&self) -> &[f64; 3] {
        &self.max
    }

    /// Length of the diagonal
    pub fn diameter(&self) -> f64 {
        (0..3)
            .map(|d| (self.max[d] - self.min[d]).max(0.0).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Distance between two boxes, zero if they overlap
    pub fn distance(&self, other: &BoundingBox) -> f64 {
        (0..3)
            .map(|d| {
                let gap = (other.min[d] - self.max[d]).max(self.min[d] - other.max[d]);
                gap.max(0.0).powi(2)
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Index of the longest side
    pub fn longest_axis(&self) -> usize {
        let mut axis = 0;
        for d in 1..3 {
            if self.max[d] - self.min[d] > self.max[axis] - self.min[axis] {
                axis = d;
            }
        }
        axis
    }
}

/// A node of a cluster tree
#[derive(Debug, Clone)]
pub struct ClusterNode {
    range: Range<usize>,
    bounding_box: BoundingBox,
    children: Option<[usize; 2]>,
    level: usize,
}

impl ClusterNode {
    /// Positions of the DOFs of this cluster in the permutation
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
    /// Number of DOFs
    pub fn size(&self) -> usize {
        self.range.len()
    }
    /// Bounding box of the DOF positions
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }
    /// Indices of the two children, if this is not a leaf
    pub fn children(&self) -> Option<[usize; 2]> {
        self.children
    }
    /// Check if this is a leaf
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
    /// Depth in the tree
    pub fn level(&self) -> usize {
        self.level
    }
}

/// Binary cluster tree over a set of points
///
/// Clusters are bisected at the midpoint of the longest side of their
/// bounding box. If that leaves one half empty, the median is used instead.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    nodes: Vec<ClusterNode>,
    permutation: Vec<usize>,
    positions: Vec<usize>,
}

impl ClusterTree {
    /// Create new
    pub fn new(points: &[[f64; 3]], leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let mut permutation = (0..points.len()).collect::<Vec<_>>();
        let mut nodes = vec![ClusterNode {
            range: 0..points.len(),
            bounding_box: BoundingBox::from_points(points),
            children: None,
            level: 0,
        }];

        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            let node = &nodes[index];
            if node.size() <= leaf_size {
                continue;
            }
            let range = node.range();
            let level = node.level;
            let axis = node.bounding_box.longest_axis();
            let bbox = node.bounding_box;
            let indices = &mut permutation[range.clone()];

            let midpoint = 0.5 * (bbox.min[axis] + bbox.max[axis]);
            let mut split = partition(indices, |i| points[i][axis] < midpoint);
            if split == 0 || split == indices.len() {
                indices.sort_by(|a, b| points[*a][axis].total_cmp(&points[*b][axis]));
                split = indices.len() / 2;
            }

            let first = range.start..range.start + split;
            let second = range.start + split..range.end;
            let mut children = [0; 2];
            for (child, r) in children.iter_mut().zip([first, second]) {
                *child = nodes.len();
                nodes.push(ClusterNode {
                    bounding_box: BoundingBox::from_points(
                        permutation[r.clone()].iter().map(|i| &points[*i]),
                    ),
                    range: r,
                    children: None,
                    level: level + 1,
                });
                stack.push(*child);
            }
            nodes[index].children = Some(children);
        }

        let mut positions = vec![0; points.len()];
        for (position, index) in permutation.iter().enumerate() {
            positions[*index] = position;
        }

        Self {
            nodes,
            permutation,
            positions,
        }
    }

    /// Index of the root node
    pub fn root(&self) -> usize {
        0
    }

    /// A node
    pub fn node(&self, index: usize) -> &ClusterNode {
        &self.nodes[index]
    }

    /// Number of nodes
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of points
    pub fn size(&self) -> usize {
        self.permutation.len()
    }

    /// The DOFs in the order of the tree
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Position of each DOF in the permutation
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// The DOFs of a node
    pub fn indices(&self, node: usize) -> &[usize] {
        &self.permutation[self.nodes[node].range()]
    }

    /// Indices of all nodes that are not leaves
    pub fn internal_nodes(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|i| !self.nodes[*i].is_leaf())
            .collect()
    }
}

/// Move the entries satisfying `pred` to the front and return how many there are
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut split = 0;
    for i in 0..indices.len() {
        if pred(indices[i]) {
            indices.swap(i, split);
            split += 1;
        }
    }
    split
}

/// A leaf of a block cluster tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockNode {
    /// Node of the row tree
    pub row: usize,
    /// Node of the column tree
    pub col: usize,
    /// True if the block is well separated and can be compressed
    pub admissible: bool,
}

/// Partition of a matrix into admissible and inadmissible blocks
#[derive(Debug, Clone)]
pub struct BlockClusterTree {
    blocks: Vec<BlockNode>,
}

impl BlockClusterTree {
    /// Create new using the standard admissibility condition `min(diam) <= eta * dist`
    pub fn new(row_tree: &ClusterTree, col_tree: &ClusterTree, eta: f64) -> Self {
        let mut blocks = vec![];
        let mut stack = vec![(row_tree.root(), col_tree.root())];
        while let Some((row, col)) = stack.pop() {
            let row_node = row_tree.node(row);
            let col_node = col_tree.node(col);
            if row_node.size() == 0 || col_node.size() == 0 {
                continue;
            }
            let dist = row_node.bounding_box().distance(col_node.bounding_box());
            let diam = f64::min(
                row_node.bounding_box().diameter(),
                col_node.bounding_box().diameter(),
            );
            if dist > 0.0 && diam <= eta * dist {
                blocks.push(BlockNode {
                    row,
                    col,
                    admissible: true,
                });
                continue;
            }
            match (row_node.children(), col_node.children()) {
                (None, None) => blocks.push(BlockNode {
                    row,
                    col,
                    admissible: false,
                }),
                (Some(rc), None) => stack.extend(rc.iter().map(|r| (*r, col))),
                (None, Some(cc)) => stack.extend(cc.iter().map(|c| (row, *c))),
                (Some(rc), Some(cc)) => {
                    for r in rc {
                        for c in cc {
                            stack.push((r, c));
                        }
                    }
                }
            }
        }
        Self { blocks }
    }

    /// The blocks
    pub fn blocks(&self) -> &[BlockNode] {
        &self.blocks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::shapes::regular_sphere;
    use approx::assert_relative_eq;

    fn sphere_points() -> Vec<[f64; 3]> {
        regular_sphere(3).vertices().to_vec()
    }

    #[test]
    fn test_bounding_box() {
        let a = BoundingBox::from_points(&[[0.0, 0.0, 0.0], [1.0, 2.0, 2.0]]);
        let b = BoundingBox::from_points(&[[4.0, 0.0, 0.0], [5.0, 1.0, 1.0]]);
        assert_relative_eq!(a.diameter(), 3.0);
        assert_relative_eq!(a.distance(&b), 3.0);
        assert_relative_eq!(a.distance(&a), 0.0);
        assert_eq!(a.longest_axis(), 1);
    }

    #[test]
    fn test_cluster_tree() {
        let points = sphere_points();
        let tree = ClusterTree::new(&points, 16);
        let mut sorted = tree.permutation().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..points.len()).collect::<Vec<_>>());
        for (dof, position) in tree.positions().iter().enumerate() {
            assert_eq!(tree.permutation()[*position], dof);
        }
        for index in 0..tree.number_of_nodes() {
            let node = tree.node(index);
            match node.children() {
                None => assert!(node.size() <= 16),
                Some([a, b]) => {
                    assert!(tree.node(a).size() > 0 && tree.node(b).size() > 0);
                    assert_eq!(tree.node(a).range().start, node.range().start);
                    assert_eq!(tree.node(a).range().end, tree.node(b).range().start);
                    assert_eq!(tree.node(b).range().end, node.range().end);
                }
            }
            for i in tree.indices(index) {
                for d in 0..3 {
                    assert!(points[*i][d] >= node.bounding_box().min()[d]);
                    assert!(points[*i][d] <= node.bounding_box().max()[d]);
                }
            }
        }
    }

    #[test]
    fn test_coincident_points() {
        let points = vec![[1.0, 1.0, 1.0]; 10];
        let tree = ClusterTree::new(&points, 3);
        for index in 0..tree.number_of_nodes() {
            assert!(tree.node(index).size() > 0);
        }
    }

    #[test]
    fn test_blocks_cover_matrix() {
        let points = sphere_points();
        let tree = ClusterTree::new(&points, 16);
        let blocks = BlockClusterTree::new(&tree, &tree, 1.2);
        let n = points.len();
        let mut covered = vec![0u8; n * n];
        for block in blocks.blocks() {
            for i in tree.node(block.row).range() {
                for j in tree.node(block.col).range() {
                    covered[i + n * j] += 1;
                }
            }
        }
        assert!(covered.iter().all(|c| *c == 1));
        assert!(blocks.blocks().iter().any(|b| b.admissible));
        assert!(blocks.blocks().iter().any(|b| !b.admissible));
    }
}
