// 2.2: order tree. crit-bit tree over 128-bit keys, stored in a fixed-capacity slab.
// a book side keeps two roots (fixed, oracle-pegged) over one shared slab.
// inner nodes cache the earliest expiry of each subtree so expired orders are found without a scan.

use serde::{Deserialize, Serialize};

use super::nodes::{InnerNode, LeafNode, Node, NodeHandle};
use super::BookError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTreeRoot {
    pub maybe_node: Option<NodeHandle>,
    pub leaf_count: u32,
}

/// Slab of nodes with an intrusive free list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTreeNodes {
    nodes: Vec<Node>,
    capacity: u32,
    free_list_head: Option<NodeHandle>,
    free_list_len: u32,
}

impl OrderTreeNodes {
    pub fn new(capacity: u32) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity as usize),
            capacity,
            free_list_head: None,
            free_list_len: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slots that can still be handed out.
    pub fn free_slots(&self) -> u32 {
        self.capacity - self.nodes.len() as u32 + self.free_list_len
    }

    /// A non-empty tree needs two slots (leaf + inner) per insert.
    pub fn is_full(&self) -> bool {
        self.free_slots() < 2
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle as usize)
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle as usize)
    }

    pub fn leaf(&self, handle: NodeHandle) -> Option<&LeafNode> {
        self.node(handle).and_then(Node::as_leaf)
    }

    pub fn leaf_mut(&mut self, handle: NodeHandle) -> Option<&mut LeafNode> {
        self.node_mut(handle).and_then(Node::as_leaf_mut)
    }

    fn alloc(&mut self, node: Node) -> Result<NodeHandle, BookError> {
        if let Some(handle) = self.free_list_head {
            let next = match self.nodes[handle as usize] {
                Node::Free { next } => next,
                _ => return Err(BookError::Corrupted("free list points at a live node")),
            };
            self.nodes[handle as usize] = node;
            self.free_list_head = next;
            self.free_list_len -= 1;
            return Ok(handle);
        }
        if self.nodes.len() as u32 >= self.capacity {
            return Err(BookError::BookFull {
                capacity: self.capacity,
            });
        }
        self.nodes.push(node);
        Ok(self.nodes.len() as NodeHandle - 1)
    }

    fn free(&mut self, handle: NodeHandle) -> Option<Node> {
        let slot = self.nodes.get_mut(handle as usize)?;
        let old = std::mem::replace(
            slot,
            Node::Free {
                next: self.free_list_head,
            },
        );
        self.free_list_head = Some(handle);
        self.free_list_len += 1;
        Some(old)
    }

    /// Insert a leaf. If the key already exists the leaf is replaced and the old one returned.
    /// Fails with BookFull before touching anything if the slab lacks room.
    pub fn insert_leaf(
        &mut self,
        root: &mut OrderTreeRoot,
        new_leaf: &LeafNode,
    ) -> Result<(NodeHandle, Option<LeafNode>), BookError> {
        let Some(mut parent_handle) = root.maybe_node else {
            let handle = self.alloc(Node::Leaf(*new_leaf))?;
            root.maybe_node = Some(handle);
            root.leaf_count = 1;
            return Ok((handle, None));
        };

        if self.is_full() && self.find_by_key(root, new_leaf.key).is_none() {
            return Err(BookError::BookFull {
                capacity: self.capacity,
            });
        }

        let new_key = new_leaf.key;
        let mut stack: Vec<(NodeHandle, bool)> = Vec::new();
        loop {
            let parent_contents = *self
                .node(parent_handle)
                .ok_or(BookError::Corrupted("dangling child handle"))?;
            let parent_key = parent_contents
                .key()
                .ok_or(BookError::Corrupted("tree edge into a free slot"))?;

            if parent_key == new_key {
                if let Node::Leaf(old_leaf) = parent_contents {
                    self.nodes[parent_handle as usize] = Node::Leaf(*new_leaf);
                    self.refresh_expiry_path(&stack);
                    return Ok((parent_handle, Some(old_leaf)));
                }
            }

            let shared_prefix_len = (parent_key ^ new_key).leading_zeros();
            if let Node::Inner(inner) = parent_contents {
                if shared_prefix_len >= inner.prefix_len {
                    let (child, crit_bit) = inner.walk_down(new_key);
                    stack.push((parent_handle, crit_bit));
                    parent_handle = child;
                    continue;
                }
            }

            // the new leaf splits off here: the parent slot becomes an inner node
            // over the new leaf and a copy of the old parent
            let crit_bit_mask = 1u128 << (127 - shared_prefix_len);
            let new_leaf_crit_bit = (crit_bit_mask & new_key) != 0;
            let old_parent_crit_bit = !new_leaf_crit_bit;

            let new_leaf_handle = self.alloc(Node::Leaf(*new_leaf))?;
            let moved_parent_handle = match self.alloc(parent_contents) {
                Ok(handle) => handle,
                Err(err) => {
                    self.free(new_leaf_handle);
                    return Err(err);
                }
            };

            let mut new_parent = InnerNode::new(shared_prefix_len, new_key);
            new_parent.children[new_leaf_crit_bit as usize] = new_leaf_handle;
            new_parent.children[old_parent_crit_bit as usize] = moved_parent_handle;
            new_parent.child_earliest_expiry[new_leaf_crit_bit as usize] = new_leaf.expiry();
            new_parent.child_earliest_expiry[old_parent_crit_bit as usize] =
                parent_contents.earliest_expiry();
            self.nodes[parent_handle as usize] = Node::Inner(new_parent);

            root.leaf_count += 1;
            self.refresh_expiry_path(&stack);
            return Ok((new_leaf_handle, None));
        }
    }

    /// Remove the leaf with `search_key`, splicing its sibling into the parent slot.
    pub fn remove_by_key(&mut self, root: &mut OrderTreeRoot, search_key: u128) -> Option<LeafNode> {
        let mut parent_handle = root.maybe_node?;

        if let Node::Leaf(leaf) = *self.node(parent_handle)? {
            if leaf.key != search_key {
                return None;
            }
            root.maybe_node = None;
            root.leaf_count = 0;
            self.free(parent_handle);
            return Some(leaf);
        }

        let mut stack: Vec<(NodeHandle, bool)> = Vec::new();
        let (leaf_handle, leaf) = loop {
            let inner = *self.node(parent_handle)?.as_inner()?;
            let (child_handle, crit_bit) = inner.walk_down(search_key);
            stack.push((parent_handle, crit_bit));
            match *self.node(child_handle)? {
                Node::Inner(_) => parent_handle = child_handle,
                Node::Leaf(leaf) if leaf.key == search_key => break (child_handle, leaf),
                _ => return None,
            }
        };

        let (parent_handle, crit_bit) = stack.pop()?;
        let parent = *self.node(parent_handle)?.as_inner()?;
        let sibling_handle = parent.children[!crit_bit as usize];
        let sibling = self.free(sibling_handle)?;
        self.nodes[parent_handle as usize] = sibling;
        self.free(leaf_handle);
        root.leaf_count -= 1;
        self.refresh_expiry_path(&stack);
        Some(leaf)
    }

    // recompute cached child expiries from the deepest inner node back up to the root
    fn refresh_expiry_path(&mut self, stack: &[(NodeHandle, bool)]) {
        for &(handle, crit_bit) in stack.iter().rev() {
            let Some(inner) = self.node(handle).and_then(Node::as_inner) else {
                continue;
            };
            let child = inner.children[crit_bit as usize];
            let expiry = self.node(child).map_or(u64::MAX, Node::earliest_expiry);
            if let Some(Node::Inner(inner)) = self.node_mut(handle) {
                inner.child_earliest_expiry[crit_bit as usize] = expiry;
            }
        }
    }

    pub fn find_by_key(&self, root: &OrderTreeRoot, search_key: u128) -> Option<NodeHandle> {
        let mut handle = root.maybe_node?;
        loop {
            match self.node(handle)? {
                Node::Inner(inner) => handle = inner.walk_down(search_key).0,
                Node::Leaf(leaf) if leaf.key == search_key => return Some(handle),
                _ => return None,
            }
        }
    }

    fn extreme_leaf(&self, root: &OrderTreeRoot, child: usize) -> Option<(NodeHandle, &LeafNode)> {
        let mut handle = root.maybe_node?;
        loop {
            match self.node(handle)? {
                Node::Inner(inner) => handle = inner.children[child],
                Node::Leaf(leaf) => return Some((handle, leaf)),
                _ => return None,
            }
        }
    }

    pub fn min_leaf(&self, root: &OrderTreeRoot) -> Option<(NodeHandle, &LeafNode)> {
        self.extreme_leaf(root, 0)
    }

    pub fn max_leaf(&self, root: &OrderTreeRoot) -> Option<(NodeHandle, &LeafNode)> {
        self.extreme_leaf(root, 1)
    }

    /// The leaf with the earliest expiry, following the cached subtree minimums.
    pub fn find_earliest_expiry(&self, root: &OrderTreeRoot) -> Option<(NodeHandle, u64)> {
        let mut handle = root.maybe_node?;
        loop {
            match self.node(handle)? {
                Node::Inner(inner) => {
                    let pick = if inner.child_earliest_expiry[1] < inner.child_earliest_expiry[0] {
                        1
                    } else {
                        0
                    };
                    handle = inner.children[pick];
                }
                Node::Leaf(leaf) => return Some((handle, leaf.expiry())),
                _ => return None,
            }
        }
    }

    /// Remove one order whose time in force has run out, if any.
    pub fn remove_one_expired(&mut self, root: &mut OrderTreeRoot, now: u64) -> Option<LeafNode> {
        let (handle, expiry) = self.find_earliest_expiry(root)?;
        if now <= expiry {
            return None;
        }
        let key = self.leaf(handle)?.key;
        self.remove_by_key(root, key)
    }

    /// Leaves in key order: ascending for asks, descending for bids.
    pub fn iter(&self, root: &OrderTreeRoot, ascending: bool) -> OrderTreeIter<'_> {
        OrderTreeIter::new(self, root, ascending)
    }
}

/// In-order walk over one tree. Holds the inner nodes whose far side is still pending.
pub struct OrderTreeIter<'a> {
    nodes: &'a OrderTreeNodes,
    stack: Vec<&'a InnerNode>,
    next_leaf: Option<(NodeHandle, &'a LeafNode)>,
    left: usize,
    right: usize,
}

impl<'a> OrderTreeIter<'a> {
    fn new(nodes: &'a OrderTreeNodes, root: &OrderTreeRoot, ascending: bool) -> Self {
        let (left, right) = if ascending { (0, 1) } else { (1, 0) };
        let mut iter = Self {
            nodes,
            stack: Vec::new(),
            next_leaf: None,
            left,
            right,
        };
        if let Some(start) = root.maybe_node {
            iter.next_leaf = iter.find_leftmost_leaf(start);
        }
        iter
    }

    pub fn peek(&self) -> Option<(NodeHandle, &'a LeafNode)> {
        self.next_leaf
    }

    fn find_leftmost_leaf(&mut self, start: NodeHandle) -> Option<(NodeHandle, &'a LeafNode)> {
        let nodes = self.nodes;
        let mut current = start;
        loop {
            match nodes.node(current)? {
                Node::Inner(inner) => {
                    self.stack.push(inner);
                    current = inner.children[self.left];
                }
                Node::Leaf(leaf) => return Some((current, leaf)),
                _ => return None,
            }
        }
    }
}

impl<'a> Iterator for OrderTreeIter<'a> {
    type Item = (NodeHandle, &'a LeafNode);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next_leaf.take()?;
        self.next_leaf = match self.stack.pop() {
            Some(inner) => self.find_leftmost_leaf(inner.children[self.right]),
            None => None,
        };
        Some(current)
    }
}
