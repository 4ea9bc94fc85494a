//! Growing binary-tree rectangle packer.
//!
//! Blocks are sorted by their longest side (then area, then input order) and
//! placed into a tree of free regions. When a block fits nowhere the root is
//! grown to the right or downwards, picking the direction that keeps the
//! bounds closest to a square. The result is deterministic for a given input
//! order.

use crate::error::PackingError;

/// A rectangle to be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackInput<Id> {
    pub id: Id,
    pub width: u32,
    pub height: u32,
}

/// A placed rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedRect<Id> {
    pub id: Id,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl<Id> PackedRect<Id> {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// `true` if the interiors of the two rectangles intersect.
    pub fn overlaps<Other>(&self, other: &PackedRect<Other>) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Size of the area enclosing every packed rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AtlasBounds {
    pub width: u32,
    pub height: u32,
}

impl AtlasBounds {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains<Id>(&self, rect: &PackedRect<Id>) -> bool {
        rect.right() <= self.width && rect.bottom() <= self.height
    }
}

/// Result of [`pack`]. `rects` are in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packing<Id> {
    pub bounds: AtlasBounds,
    pub rects: Vec<PackedRect<Id>>,
}

/// Packs `inputs` without overlap.
///
/// An empty input yields zero bounds. Fails if any input has a zero
/// dimension.
pub fn pack<Id: Copy>(inputs: &[PackInput<Id>]) -> Result<Packing<Id>, PackingError> {
    if let Some((index, input)) = inputs
        .iter()
        .enumerate()
        .find(|(_, input)| input.width == 0 || input.height == 0)
    {
        return Err(PackingError::NonPositiveSize {
            index,
            width: input.width,
            height: input.height,
        });
    }

    let mut order: Vec<usize> = (0..inputs.len()).collect();
    // stable: equal keys keep input order
    order.sort_by(|&a, &b| {
        let (a, b) = (&inputs[a], &inputs[b]);
        let key = |r: &PackInput<Id>| (r.width.max(r.height), r.width as u64 * r.height as u64);
        key(b).cmp(&key(a))
    });

    let Some(&first) = order.first() else {
        return Ok(Packing {
            bounds: AtlasBounds::default(),
            rects: Vec::new(),
        });
    };

    let mut tree = Tree::new(inputs[first].width, inputs[first].height);
    let mut positions = vec![[0u32; 2]; inputs.len()];

    for &index in &order {
        let PackInput { width, height, .. } = inputs[index];
        let position = match tree.find(tree.root, width, height) {
            Some(node) => tree.split(node, width, height),
            None => tree.grow(width, height),
        };
        positions[index] = position;
    }

    let root = &tree.nodes[tree.root];
    let bounds = AtlasBounds {
        width: root.width,
        height: root.height,
    };
    let rects = inputs
        .iter()
        .zip(positions)
        .map(|(input, [x, y])| PackedRect {
            id: input.id,
            x,
            y,
            width: input.width,
            height: input.height,
        })
        .collect();

    Ok(Packing { bounds, rects })
}

#[derive(Clone, Copy)]
struct Node {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    used: bool,
    right: Option<usize>,
    down: Option<usize>,
}

impl Node {
    fn free(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            used: false,
            right: None,
            down: None,
        }
    }
}

/// Arena-backed packing tree.
struct Tree {
    nodes: Vec<Node>,
    root: usize,
}

impl Tree {
    fn new(width: u32, height: u32) -> Self {
        Self {
            nodes: vec![Node::free(0, 0, width, height)],
            root: 0,
        }
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Depth-first search for a free node, right subtree first.
    fn find(&self, start: usize, width: u32, height: u32) -> Option<usize> {
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.used {
                // pushed in reverse so `right` is visited before `down`
                stack.extend(node.down);
                stack.extend(node.right);
            } else if width <= node.width && height <= node.height {
                return Some(index);
            }
        }
        None
    }

    fn split(&mut self, index: usize, width: u32, height: u32) -> [u32; 2] {
        let node = self.nodes[index];
        let down = self.push(Node::free(
            node.x,
            node.y + height,
            node.width,
            node.height - height,
        ));
        let right = self.push(Node::free(
            node.x + width,
            node.y,
            node.width - width,
            height,
        ));

        let node = &mut self.nodes[index];
        node.used = true;
        node.down = Some(down);
        node.right = Some(right);
        [node.x, node.y]
    }

    fn grow(&mut self, width: u32, height: u32) -> [u32; 2] {
        let root = self.nodes[self.root];
        let can_grow_down = width <= root.width;
        let can_grow_right = height <= root.height;

        let should_grow_right = can_grow_right && root.height >= root.width + width;
        let should_grow_down = can_grow_down && root.width >= root.height + height;

        if should_grow_right {
            self.grow_right(width, height)
        } else if should_grow_down {
            self.grow_down(width, height)
        } else if can_grow_right {
            self.grow_right(width, height)
        } else {
            // Sorting by longest side guarantees one direction is possible.
            debug_assert!(can_grow_down);
            self.grow_down(width, height)
        }
    }

    fn grow_right(&mut self, width: u32, height: u32) -> [u32; 2] {
        let old = self.nodes[self.root];
        let right = self.push(Node::free(old.width, 0, width, old.height));
        self.root = self.push(Node {
            x: 0,
            y: 0,
            width: old.width + width,
            height: old.height,
            used: true,
            right: Some(right),
            down: Some(self.root),
        });
        self.place_after_grow(width, height)
    }

    fn grow_down(&mut self, width: u32, height: u32) -> [u32; 2] {
        let old = self.nodes[self.root];
        let down = self.push(Node::free(0, old.height, old.width, height));
        self.root = self.push(Node {
            x: 0,
            y: 0,
            width: old.width,
            height: old.height + height,
            used: true,
            right: Some(self.root),
            down: Some(down),
        });
        self.place_after_grow(width, height)
    }

    fn place_after_grow(&mut self, width: u32, height: u32) -> [u32; 2] {
        match self.find(self.root, width, height) {
            Some(node) => self.split(node, width, height),
            // the freshly grown strip always fits the block
            None => unreachable!("grown packing tree has no room for {width}x{height}"),
        }
    }
}
