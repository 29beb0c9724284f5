//! Servers and the tree they are arranged in

use crate::{Error, Result};
use unlynx_curve::keys::PublicKey;

/// A server taking part in the cothority
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Unique name of the server
    pub name: String,
    /// Its share of the collective key
    pub public: PublicKey,
}

/// An ordered list of servers
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    /// The servers, the first one being the root
    pub list: Vec<ServerIdentity>,
}

impl Roster {
    /// Creates a roster from its servers
    pub fn new(list: Vec<ServerIdentity>) -> Self {
        Self { list }
    }

    /// The collective public key of all servers
    pub fn aggregate(&self) -> PublicKey {
        PublicKey::collective(self.list.iter().map(|s| &s.public))
    }

    /// Position of a server in the roster
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.list.iter().position(|s| s.name == name)
    }

    /// Number of servers
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the roster has no server
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// The same servers with `root` moved first
    ///
    /// Also returns the original position of each server of the new roster.
    pub fn rooted_at(&self, root: usize) -> Result<(Roster, Vec<usize>)> {
        if root >= self.list.len() {
            return Err(Error::InvalidTree("root outside the roster"));
        }
        let order: Vec<_> = std::iter::once(root)
            .chain((0..self.list.len()).filter(|&i| i != root))
            .collect();
        let list = order.iter().map(|&i| self.list[i].clone()).collect();
        Ok((Roster::new(list), order))
    }
}

/// A complete tree over the nodes `0..n`, rooted at 0
///
/// Node `i` has children `b·i + 1 ..= b·i + b` for branching factor `b`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    size: usize,
    branching: usize,
    pre_order: Vec<usize>,
}

impl Tree {
    /// Creates a tree of `size` nodes
    pub fn new(size: usize, branching: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidTree("no nodes"));
        }
        if branching == 0 {
            return Err(Error::InvalidTree("zero branching factor"));
        }
        let mut tree = Self {
            size,
            branching,
            pre_order: Vec::with_capacity(size),
        };
        let mut stack = vec![0];
        while let Some(i) = stack.pop() {
            tree.pre_order.push(i);
            stack.extend(tree.children(i).into_iter().rev());
        }
        Ok(tree)
    }

    /// A binary tree over the servers of a roster
    pub fn binary(roster: &Roster) -> Result<Self> {
        Self::new(roster.len(), 2)
    }

    /// Number of nodes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Parent of a node, `None` for the root
    pub fn parent(&self, i: usize) -> Option<usize> {
        if i == 0 || i >= self.size {
            None
        } else {
            Some((i - 1) / self.branching)
        }
    }

    /// Children of a node
    pub fn children(&self, i: usize) -> Vec<usize> {
        let first = i * self.branching + 1;
        (first..first + self.branching)
            .filter(|&c| c < self.size)
            .collect()
    }

    /// Whether a node has no children
    pub fn is_leaf(&self, i: usize) -> bool {
        self.children(i).is_empty()
    }

    /// Nodes in pre-order, root first
    pub fn pre_order(&self) -> &[usize] {
        &self.pre_order
    }

    fn circuit_position(&self, i: usize) -> usize {
        self.pre_order.iter().position(|&n| n == i).unwrap_or(0)
    }

    /// Next node on the circuit through all nodes in pre-order
    pub fn circuit_next(&self, i: usize) -> usize {
        self.pre_order[(self.circuit_position(i) + 1) % self.size]
    }

    /// Previous node on the circuit through all nodes in pre-order
    pub fn circuit_prev(&self, i: usize) -> usize {
        self.pre_order[(self.circuit_position(i) + self.size - 1) % self.size]
    }
}
