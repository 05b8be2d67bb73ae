//! Worker registry
//!
//! Insertion-ordered, doubly-linked list threaded through a slab arena.
//! Links are slot indices rather than pointers, and every handle carries
//! the generation of the slot it was issued for, so a handle kept past
//! removal can never reach whatever later reuses the slot.
//!
//! The registry is single-writer: only the accept loop appends, removes and
//! sweeps. Nothing in here is synchronized.
//!
//! | operation | cost |
//! |-----------|------|
//! | `append`  | O(1) |
//! | `remove`  | O(1) |
//! | `sweep`   | O(n) |

use core::fmt;

/// Stable handle to one registry node
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Insertion-ordered registry of live values
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    /// LIFO stack of vacant slot indices
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Registry<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link `value` at the tail
    pub fn append(&mut self, value: T) -> NodeId {
        let node = Node {
            value,
            prev: self.tail,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                index
            }
        };

        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        NodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Unlink the node behind `id`, handing its value back
    ///
    /// `None` if `id` is stale or was never issued by this registry.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation || slot.node.is_none() {
            return None;
        }
        Some(self.unlink(id.index))
    }

    /// Borrow the value behind `id`
    pub fn get(&self, id: NodeId) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref().map(|n| &n.value)
    }

    /// Handle of the oldest node
    pub fn head(&self) -> Option<NodeId> {
        self.head.map(|index| self.id_of(index))
    }

    /// Handle of the newest node
    pub fn tail(&self) -> Option<NodeId> {
        self.tail.map(|index| self.id_of(index))
    }

    /// Walk head to tail
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            registry: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// One pass head to tail, detaching every value `is_done` accepts
    ///
    /// The successor link is read before a node is unlinked, so removal
    /// never derails the walk. Detached values come back in list order.
    pub fn sweep<F>(&mut self, mut is_done: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut detached = Vec::new();
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let node = self.node(index);
            cursor = node.next;
            if is_done(&node.value) {
                detached.push(self.unlink(index));
            }
        }

        detached
    }

    fn unlink(&mut self, index: u32) -> T {
        let slot = &mut self.slots[index as usize];
        let node = match slot.node.take() {
            Some(node) => node,
            None => unreachable!("unlink of vacant slot {}", index),
        };
        slot.generation = slot.generation.wrapping_add(1);

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free.push(index);
        self.len -= 1;
        node.value
    }

    fn id_of(&self, index: u32) -> NodeId {
        NodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn node(&self, index: u32) -> &Node<T> {
        match &self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("link to vacant slot {}", index),
        }
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<T> {
        match &mut self.slots[index as usize].node {
            Some(node) => node,
            None => unreachable!("link to vacant slot {}", index),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Head-to-tail iterator over a [`Registry`]
pub struct Iter<'a, T> {
    registry: &'a Registry<T>,
    cursor: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let index = self.cursor?;
        let node = self.registry.node(index);
        self.cursor = node.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> ExactSizeIterator for Iter<'a, T> {}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
