use crate::error::J2kError;
use crate::jpeg2000::bit_io::PacketBitReader;

/// Value held by a node that has not been resolved yet.
const UNRESOLVED: u32 = u32::MAX;

/// Tag Tree for JPEG 2000 Packet Header decoding (B.10.2).
/// Represents a quad-tree over a grid of codeblocks, used for inclusion and
/// zero bit-plane information.
pub struct TagTree {
    nodes: Vec<TagTreeNode>,
    leaf_width: usize,
    leaf_height: usize,
}

#[derive(Clone, Debug)]
struct TagTreeNode {
    value: u32,
    low: u32,
    parent_index: Option<usize>,
}

impl Default for TagTreeNode {
    fn default() -> Self {
        Self {
            value: UNRESOLVED,
            low: 0,
            parent_index: None,
        }
    }
}

impl TagTree {
    /// Create a new TagTree for a grid of `w` x `h` leaves.
    pub fn new(w: usize, h: usize) -> Self {
        let mut nodes = vec![TagTreeNode::default(); w * h];

        let mut level_start = 0;
        let mut level_w = w;
        let mut level_h = h;

        // Build levels up to root
        while level_w > 1 || level_h > 1 {
            let next_w = level_w.div_ceil(2);
            let next_h = level_h.div_ceil(2);
            let next_start = nodes.len();
            nodes.resize(next_start + next_w * next_h, TagTreeNode::default());

            for y in 0..level_h {
                for x in 0..level_w {
                    let parent = next_start + (y / 2) * next_w + x / 2;
                    nodes[level_start + y * level_w + x].parent_index = Some(parent);
                }
            }

            level_start = next_start;
            level_w = next_w;
            level_h = next_h;
        }

        Self {
            nodes,
            leaf_width: w,
            leaf_height: h,
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_width * self.leaf_height
    }

    /// Decode the value of `leaf` (raster index) up to `threshold`.
    ///
    /// Returns `None` while the value is still known only to exceed
    /// `threshold`. Bits answered by earlier calls are never read again.
    pub fn decode(
        &mut self,
        reader: &mut PacketBitReader,
        leaf: usize,
        threshold: u32,
    ) -> Result<Option<u32>, J2kError> {
        if leaf >= self.leaf_count() {
            return Err(J2kError::InvalidTagTreeLeaf(leaf));
        }

        let mut path = Vec::new();
        let mut idx = Some(leaf);
        while let Some(i) = idx {
            path.push(i);
            idx = self.nodes[i].parent_index;
        }

        let mut low = 0;
        for &i in path.iter().rev() {
            let node = &mut self.nodes[i];
            low = low.max(node.low);
            while low <= threshold && low < node.value {
                if reader.read_bit()? == 1 {
                    node.value = low;
                } else {
                    low += 1;
                }
            }
            node.low = low;
        }

        let value = self.nodes[leaf].value;
        Ok((value != UNRESOLVED).then_some(value))
    }
}
