use std::collections::{HashMap, HashSet};

use super::node::{Atom, Node, NodeArena, NodeIdx};

/// A structure that's been serialized into a plain tree. Nodes with multiple
/// in-pointers are duplicated, and an arc leading back into its own ancestors is dropped.
/// IMPORTANT: **top** and absent values are /stripped out/. They will not be present in
/// the serialized tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedNode {
  Atom(Atom),
  /// An unbound variable, by name
  Var(String),
  Edged(HashMap<String, SerializedNode>),
}

impl SerializedNode {
  pub fn as_atom(&self) -> Option<&Atom> {
    match self {
      Self::Atom(a) => Some(a),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Atom(Atom::Str(s)) => Some(s.as_str()),
      _ => None,
    }
  }

  pub fn as_edged(&self) -> Option<&HashMap<String, SerializedNode>> {
    match self {
      Self::Edged(map) => Some(map),
      _ => None,
    }
  }

  pub fn into_edged(self) -> Option<HashMap<String, SerializedNode>> {
    match self {
      Self::Edged(map) => Some(map),
      _ => None,
    }
  }

  pub fn get_path(&self, path: &[&str]) -> Option<&SerializedNode> {
    let mut node = self;
    let mut path = path;
    while !path.is_empty() {
      node = node.as_edged()?.get(path[0])?;
      path = &path[1..];
    }
    Some(node)
  }

  pub fn get_path_str(&self, path: &[&str]) -> Option<&str> {
    self.get_path(path).and_then(Self::as_str)
  }

  /// Create a SerializedNode from a NodeArena and NodeIdx
  pub fn from_node(arena: &NodeArena, idx: NodeIdx) -> Option<Self> {
    Self::from_node_within(arena, idx, &mut HashSet::new())
  }

  fn from_node_within(
    arena: &NodeArena,
    idx: NodeIdx,
    ancestors: &mut HashSet<NodeIdx>,
  ) -> Option<Self> {
    let idx = match arena.value_of(idx) {
      Some(value) => value,
      None => arena.forwarded_self(idx),
    };
    match arena.get(idx) {
      Node::Top | Node::Atom(Atom::Absent) | Node::Forwarded(_) => None,
      Node::Atom(a) => Some(SerializedNode::Atom(a.clone())),
      Node::Var(v) => Some(SerializedNode::Var(v.name.clone())),
      Node::Edged(edges) => {
        if !ancestors.insert(idx) {
          return None;
        }
        let mut map: HashMap<String, SerializedNode> = HashMap::new();
        for (k, v) in edges.iter() {
          if let Some(value) = Self::from_node_within(arena, *v, ancestors) {
            map.insert(k.to_string(), value);
          }
        }
        ancestors.remove(&idx);
        if map.is_empty() {
          None
        } else {
          Some(SerializedNode::Edged(map))
        }
      }
    }
  }
}

impl From<&str> for SerializedNode {
  fn from(s: &str) -> Self {
    Self::Atom(Atom::from(s))
  }
}

impl From<String> for SerializedNode {
  fn from(s: String) -> Self {
    Self::Atom(Atom::Str(s))
  }
}

impl From<i64> for SerializedNode {
  fn from(i: i64) -> Self {
    Self::Atom(Atom::Int(i))
  }
}

impl From<bool> for SerializedNode {
  fn from(b: bool) -> Self {
    Self::Atom(Atom::Bool(b))
  }
}

impl From<HashMap<String, SerializedNode>> for SerializedNode {
  fn from(hm: HashMap<String, SerializedNode>) -> Self {
    Self::Edged(hm)
  }
}

impl<S: Into<String>> From<Vec<(S, SerializedNode)>> for SerializedNode {
  fn from(pairs: Vec<(S, SerializedNode)>) -> Self {
    Self::Edged(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }
}
