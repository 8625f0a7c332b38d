use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the transform hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sequence counter handing out node ids.
///
/// Owned by whoever builds the tree and passed in at construction, so two
/// trees never share hidden global state and tests can predict ids.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// Id the next call will return, without consuming it.
    pub fn peek(&self) -> NodeId {
        NodeId(self.next)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_unique() {
        let mut ids = IdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
    }

    #[test]
    fn generators_are_independent() {
        let mut a = IdGenerator::starting_at(10);
        let mut b = IdGenerator::starting_at(10);
        assert_eq!(a.next_id(), b.next_id());
        assert_eq!(a.peek(), NodeId(11));
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
