use std::collections::HashMap;
use std::fmt;

use super::unify::{MergeMemo, UnificationFailure};
use super::variable::Variable;

/// Index type for the node arena
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub u32);

/// Unpacked representation of a feature, that NodeArena::alloc_from_features can turn into a Node
#[derive(Debug)]
pub struct Feature {
  /// Dotted path where each segment will be a node: "a.b.c" -> [a=[b=[c=...]]]
  pub path: String,
  /// Unique string that will link features into a reentrant node, or None
  pub tag: Option<String>,
  /// What will end up at `path`. Will be unified with any other feature values with the same tag.
  pub value: NodeIdx,
}

/// An atomic value. Atoms only unify with an equal atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Atom {
  Str(String),
  Int(i64),
  Bool(bool),
  /// Value given to a required feature that was never specified
  Absent,
}

impl Atom {
  pub fn is_absent(&self) -> bool {
    matches!(self, Self::Absent)
  }
}

impl From<&str> for Atom {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for Atom {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<i64> for Atom {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

impl From<bool> for Atom {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl fmt::Display for Atom {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Str(s) if is_bare_symbol(s) => write!(f, "{}", s),
      Self::Str(s) => {
        write!(f, "'")?;
        for c in s.chars() {
          if c == '\'' || c == '\\' {
            write!(f, "\\")?;
          }
          write!(f, "{}", c)?;
        }
        write!(f, "'")
      }
      Self::Int(i) => write!(f, "{}", i),
      Self::Bool(true) => write!(f, "True"),
      Self::Bool(false) => write!(f, "False"),
      Self::Absent => write!(f, "None"),
    }
  }
}

/// Strings that can be printed without quotes and still read back as the same string
fn is_bare_symbol(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    && !matches!(s, "True" | "False" | "None")
}

/// A node in the feature structure graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
  /// Top can unify with anything
  Top,
  /// An atomic value, such as "nom" in [case=nom]
  Atom(Atom),
  /// A unification variable, possibly bound or aliased to another variable
  Var(Variable),
  /// An arc-containing node with arcs to other NodeIdxs
  Edged(HashMap<String, NodeIdx>),
  /// A node that has been forwarded to another node through unification.
  /// Before using a node, it should be dereferenced to resolve its forward
  Forwarded(NodeIdx),
}

impl Node {
  fn new_edged() -> Self {
    Self::Edged(HashMap::new())
  }

  pub fn is_top(&self) -> bool {
    matches!(self, Self::Top)
  }

  pub fn atom(&self) -> Option<&Atom> {
    match self {
      Self::Atom(a) => Some(a),
      _ => None,
    }
  }

  pub fn var(&self) -> Option<&Variable> {
    match self {
      Self::Var(v) => Some(v),
      _ => None,
    }
  }

  pub fn edged(&self) -> Option<&HashMap<String, NodeIdx>> {
    match self {
      Self::Edged(v) => Some(v),
      _ => None,
    }
  }

  fn edged_mut(&mut self) -> Option<&mut HashMap<String, NodeIdx>> {
    match self {
      Self::Edged(v) => Some(v),
      _ => None,
    }
  }

  pub(crate) fn kind(&self) -> NodeKind {
    match self {
      Self::Top => NodeKind::Top,
      Self::Atom(_) => NodeKind::Atom,
      Self::Var(_) => NodeKind::Var,
      Self::Edged(_) => NodeKind::Edged,
      Self::Forwarded(_) => NodeKind::Forwarded,
    }
  }
}

/// Payload-free tag of a Node, so match arms can mutate the arena
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
  Top,
  Atom,
  Var,
  Edged,
  Forwarded,
}

/// Old contents of nodes overwritten since a checkpoint, so a failed unification
/// can put the arena back the way it found it
#[derive(Debug, Clone, Default)]
struct Journal {
  watermark: usize,
  entries: Vec<(NodeIdx, Node)>,
}

/// An arena that stores all nodes and provides methods to operate on them
#[derive(Debug, Default, Clone)]
pub struct NodeArena {
  nodes: Vec<Node>,
  next_var_id: u64,
  journals: Vec<Journal>,
}

impl NodeArena {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn alloc(&mut self, node: Node) -> NodeIdx {
    let idx = self.nodes.len() as u32;
    self.nodes.push(node);
    NodeIdx(idx)
  }

  pub fn alloc_top(&mut self) -> NodeIdx {
    self.alloc(Node::Top)
  }

  pub fn alloc_atom(&mut self, atom: impl Into<Atom>) -> NodeIdx {
    self.alloc(Node::Atom(atom.into()))
  }

  pub fn alloc_str(&mut self, s: impl Into<String>) -> NodeIdx {
    self.alloc(Node::Atom(Atom::Str(s.into())))
  }

  pub fn alloc_edged(&mut self) -> NodeIdx {
    self.alloc(Node::new_edged())
  }

  pub(crate) fn next_var_id(&mut self) -> u64 {
    let id = self.next_var_id;
    self.next_var_id += 1;
    id
  }

  /// Creates a Node from a list of (name, noderef) features. Names CANNOT be dotted!
  pub fn alloc_from_edges<I>(&mut self, edges: I) -> Result<NodeIdx, UnificationFailure>
  where
    I: IntoIterator<Item = (String, NodeIdx)>,
  {
    let node = self.alloc_edged();

    for (label, target) in edges {
      if label.contains('.') {
        return Err(UnificationFailure::new(format!(
          "alloc_from_edges cannot take dotted path {}",
          label
        )));
      }

      self.push_edge(node, label, target)?;
    }

    Ok(node)
  }

  /// Builds a structure from dotted paths. Features sharing a tag end up on one reentrant node.
  pub fn alloc_from_features<I>(&mut self, paths: I) -> Result<NodeIdx, UnificationFailure>
  where
    I: IntoIterator<Item = Feature>,
  {
    let root = self.alloc_edged();

    let mut tags: HashMap<String, NodeIdx> = HashMap::new();
    for Feature { value, tag, path } in paths {
      let value = match tag {
        Some(tag) => match tags.get(&tag) {
          Some(&tagged) => self.merge(tagged, value, &mut MergeMemo::new())?,
          None => {
            tags.insert(tag, value);
            value
          }
        },
        None => value,
      };

      let mut current = root;
      let mut parts = path.split('.').peekable();
      while let Some(next) = parts.next() {
        if parts.peek().is_none() {
          self.push_edge(current, next.to_string(), value)?;
        } else {
          let child = match self.arc(current, next) {
            Some(existing) => existing,
            None => {
              let new = self.alloc_edged();
              self.push_edge(current, next.to_string(), new)?;
              new
            }
          };
          current = child;
        }
      }
    }

    Ok(root)
  }

  /// Get an idx. Assumes valid, panics on OOB
  pub fn get(&self, idx: NodeIdx) -> &Node {
    self.nodes.get(idx.0 as usize).expect("Invalid NodeIdx")
  }

  /// Overwrites a node, remembering the old contents if a checkpoint is open
  pub fn replace(&mut self, idx: NodeIdx, node: Node) -> Node {
    let old = std::mem::replace(&mut self.nodes[idx.0 as usize], node);
    self.record(idx, &old);
    old
  }

  fn record(&mut self, idx: NodeIdx, old: &Node) {
    if let Some(journal) = self.journals.last_mut() {
      if (idx.0 as usize) < journal.watermark {
        journal.entries.push((idx, old.clone()));
      }
    }
  }

  /// Mutable access to a node, journaled like `replace`
  fn touch(&mut self, idx: NodeIdx) -> &mut Node {
    let journaled = self
      .journals
      .last()
      .is_some_and(|journal| (idx.0 as usize) < journal.watermark);
    if journaled {
      let old = self.nodes[idx.0 as usize].clone();
      self.record(idx, &old);
    }
    &mut self.nodes[idx.0 as usize]
  }

  /// Starts a speculative section that `commit` keeps or `rollback` undoes.
  /// Checkpoints nest.
  pub(crate) fn checkpoint(&mut self) {
    self.journals.push(Journal {
      watermark: self.nodes.len(),
      entries: Vec::new(),
    });
  }

  pub(crate) fn commit(&mut self) {
    if let Some(journal) = self.journals.pop() {
      if let Some(parent) = self.journals.last_mut() {
        let watermark = parent.watermark;
        parent.entries.extend(
          journal
            .entries
            .into_iter()
            .filter(|(idx, _)| (idx.0 as usize) < watermark),
        );
      }
    }
  }

  pub(crate) fn rollback(&mut self) {
    if let Some(journal) = self.journals.pop() {
      for (idx, node) in journal.entries.into_iter().rev() {
        self.nodes[idx.0 as usize] = node;
      }
      self.nodes.truncate(journal.watermark);
    }
  }

  /// Runs `f` and then discards every change it made to the arena
  pub(crate) fn speculate<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
    self.checkpoint();
    let result = f(self);
    self.rollback();
    result
  }

  /// Runs `f`, keeping its changes to the arena only if it succeeds
  pub(crate) fn transact<T, E>(
    &mut self,
    f: impl FnOnce(&mut Self) -> Result<T, E>,
  ) -> Result<T, E> {
    self.checkpoint();
    let result = f(self);
    match result {
      Ok(_) => self.commit(),
      Err(_) => self.rollback(),
    }
    result
  }

  pub fn forward_to(&mut self, target: NodeIdx, to: NodeIdx) {
    self.replace(target, Node::Forwarded(to));
  }

  pub fn dereference(&self, mut idx: NodeIdx) -> NodeIdx {
    while let Node::Forwarded(r) = self.get(idx) {
      idx = *r;
    }
    idx
  }

  /// The node at the end of idx's forwarding chain
  pub fn resolve(&self, idx: NodeIdx) -> &Node {
    self.get(self.dereference(idx))
  }

  pub(crate) fn kind(&self, idx: NodeIdx) -> NodeKind {
    self.resolve(idx).kind()
  }

  pub fn is_top(&self, n: NodeIdx) -> bool {
    self.resolve(n).is_top()
  }

  pub fn is_atom(&self, n: NodeIdx) -> bool {
    self.atom(n).is_some()
  }

  pub fn is_var(&self, n: NodeIdx) -> bool {
    self.resolve(n).var().is_some()
  }

  pub fn is_edged(&self, n: NodeIdx) -> bool {
    self.arcs(n).is_some()
  }

  pub fn atom(&self, n: NodeIdx) -> Option<&Atom> {
    self.resolve(n).atom()
  }

  pub fn arcs(&self, n: NodeIdx) -> Option<&HashMap<String, NodeIdx>> {
    self.resolve(n).edged()
  }

  /// The target of the arc `label` leaving n, if n is edged and has one
  pub fn arc(&self, n: NodeIdx, label: &str) -> Option<NodeIdx> {
    self.arcs(n)?.get(label).map(|&t| self.dereference(t))
  }

  pub fn get_path(&self, n: NodeIdx, path: &[&str]) -> Option<NodeIdx> {
    let mut node = self.dereference(n);
    for label in path {
      node = self.arc(node, label)?;
    }
    Some(node)
  }

  /// Sets an arc without looking at what was there before. Top becomes an empty mapping first.
  pub(crate) fn set_arc(
    &mut self,
    parent: NodeIdx,
    label: String,
    target: NodeIdx,
  ) -> Result<(), UnificationFailure> {
    let parent = self.dereference(parent);
    let node = self.touch(parent);

    if node.is_top() {
      *node = Node::new_edged();
    }

    match node.edged_mut() {
      Some(arcs) => {
        arcs.insert(label, target);
        Ok(())
      }
      None => Err(UnificationFailure::new(format!(
        "cannot add feature {} to a non-mapping value",
        label
      ))),
    }
  }

  /// Adds an arc, unifying with whatever is already under that label
  pub fn push_edge(
    &mut self,
    parent: NodeIdx,
    label: String,
    target: NodeIdx,
  ) -> Result<(), UnificationFailure> {
    self.attach(parent, label, target, &mut MergeMemo::new())
  }

  pub(crate) fn attach(
    &mut self,
    parent: NodeIdx,
    label: String,
    target: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<(), UnificationFailure> {
    match self.arc(parent, &label) {
      Some(existing) => {
        let merged = self.merge(existing, target, memo)?;
        self.set_arc(parent, label, merged)
      }
      None => self.set_arc(parent, label, target),
    }
  }

  /// A new mapping holding every arc of `idx` except those whose label starts with `prefix`.
  /// Targets are shared, not copied.
  pub fn without_arcs(&mut self, idx: NodeIdx, prefix: &str) -> NodeIdx {
    let kept = self
      .arcs(idx)
      .map(|arcs| {
        arcs
          .iter()
          .filter(|(label, _)| !label.starts_with(prefix))
          .map(|(label, target)| (label.clone(), *target))
          .collect::<HashMap<_, _>>()
      })
      .unwrap_or_default();
    self.alloc(Node::Edged(kept))
  }

  /// A new mapping holding every arc of `idx`, with `label` pointed at `target`
  pub fn with_arc(&mut self, idx: NodeIdx, label: &str, target: NodeIdx) -> NodeIdx {
    let mut arcs = self.arcs(idx).cloned().unwrap_or_default();
    arcs.insert(label.to_string(), target);
    self.alloc(Node::Edged(arcs))
  }

  pub(crate) fn set_var_value(&mut self, var: NodeIdx, value: Option<NodeIdx>) {
    let var = self.dereference(var);
    if let Node::Var(v) = self.touch(var) {
      v.value = value;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rollback_restores_arena() {
    let mut arena = NodeArena::new();
    let root = arena.alloc_edged();
    let one = arena.alloc_atom(1i64);
    arena.push_edge(root, "a".to_string(), one).unwrap();
    let before = arena.len();

    arena.checkpoint();
    let two = arena.alloc_atom(2i64);
    arena.set_arc(root, "b".to_string(), two).unwrap();
    arena.forward_to(one, two);
    arena.rollback();

    assert_eq!(arena.len(), before);
    assert_eq!(arena.arcs(root).unwrap().len(), 1);
    assert_eq!(arena.atom(one), Some(&Atom::Int(1)));
  }

  #[test]
  fn test_nested_commit_then_rollback() {
    let mut arena = NodeArena::new();
    let root = arena.alloc_edged();

    arena.checkpoint();
    arena.checkpoint();
    let x = arena.alloc_str("x");
    arena.set_arc(root, "a".to_string(), x).unwrap();
    arena.commit();
    assert!(arena.arc(root, "a").is_some());
    arena.rollback();

    assert!(arena.arc(root, "a").is_none());
    assert_eq!(arena.len(), 1);
  }

  #[test]
  fn test_get_path_follows_forwards() {
    let mut arena = NodeArena::new();
    let root = arena.alloc_edged();
    let inner = arena.alloc_edged();
    let other = arena.alloc_edged();
    let leaf = arena.alloc_str("sg");
    arena.push_edge(other, "num".to_string(), leaf).unwrap();
    arena.push_edge(root, "agr".to_string(), inner).unwrap();
    arena.forward_to(inner, other);

    let found = arena.get_path(root, &["agr", "num"]).unwrap();
    assert_eq!(arena.atom(found), Some(&Atom::from("sg")));
  }

  #[test]
  fn test_bare_symbols() {
    assert_eq!(Atom::from("sg").to_string(), "sg");
    assert_eq!(Atom::from("3rd").to_string(), "'3rd'");
    assert_eq!(Atom::from("it's").to_string(), "'it\\'s'");
    assert_eq!(Atom::from("True").to_string(), "'True'");
    assert_eq!(Atom::Bool(true).to_string(), "True");
  }
}
