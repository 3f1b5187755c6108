use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use fnv::FnvHasher;

use crate::featurestructure::NodeIdx;
use crate::rules::{Production, Symbol};

/// Label prefix under which a production's features describe its rhs categories
pub const CHILD_PREFIX: &str = "child-";

/// The arc holding the features of the `idx`-th rhs element
pub fn child_label(idx: usize) -> String {
  format!("{}{}", CHILD_PREFIX, idx)
}

/// A production with a dot marking how much of its rhs has been matched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LR0 {
  pub production: Rc<Production>,
  pub pos: usize,
}

impl LR0 {
  pub fn new(production: &Rc<Production>) -> Self {
    Self {
      production: production.clone(),
      pos: 0,
    }
  }

  pub fn is_active(&self) -> bool {
    self.pos < self.production.len()
  }

  pub fn is_complete(&self) -> bool {
    !self.is_active()
  }

  pub fn advance(&self) -> Self {
    debug_assert!(self.is_active());
    Self {
      production: self.production.clone(),
      pos: self.pos + 1,
    }
  }

  pub fn next_symbol(&self) -> Option<&Symbol> {
    self.production.rhs.get(self.pos)
  }
}

impl fmt::Display for LR0 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.production.lhs)?;
    for (idx, symbol) in self.production.rhs.iter().enumerate() {
      if idx == self.pos {
        write!(f, " *")?;
      }
      write!(f, " {}", symbol)?;
    }
    if !self.is_active() {
      write!(f, " *")?;
    }
    Ok(())
  }
}

/// A feature structure in the chart's arena, with its fingerprint. Two `Features` are
/// equal when their fingerprints are, whatever nodes they live in.
#[derive(Debug, Clone)]
pub struct Features {
  pub idx: NodeIdx,
  pub key: Rc<str>,
}

impl Features {
  pub fn new(idx: NodeIdx, key: Rc<str>) -> Self {
    Self { idx, key }
  }
}

impl PartialEq for Features {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key
  }
}

impl Eq for Features {}

impl Hash for Features {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.key.hash(state);
  }
}

/// What fills one matched rhs slot of an edge: a category (or a word) over a span,
/// with the features it was found with. The parse forest looks the slot back up in the chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildDesc {
  pub symbol: Symbol,
  pub span: (usize, usize),
  pub key: Option<Rc<str>>,
}

/// A word of the input, covering itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafEdge {
  pub token: Symbol,
  pub index: usize,
}

/// A hypothesis that `lr0`'s matched part covers `span`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEdge {
  pub lr0: LR0,
  pub span: (usize, usize),
  pub children: Vec<ChildDesc>,
  pub features: Option<Features>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Edge {
  Leaf(LeafEdge),
  Tree(TreeEdge),
}

impl Edge {
  pub fn leaf(token: &str, index: usize) -> Self {
    Self::Leaf(LeafEdge {
      token: Symbol::terminal(token),
      index,
    })
  }

  /// A dot-0, zero-width edge for `production` at `index`
  pub fn seed(production: &Rc<Production>, index: usize, features: Option<Features>) -> Self {
    Self::Tree(TreeEdge {
      lr0: LR0::new(production),
      span: (index, index),
      children: Vec::new(),
      features,
    })
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Leaf(l) => (l.index, l.index + 1),
      Self::Tree(t) => t.span,
    }
  }

  pub fn start(&self) -> usize {
    self.span().0
  }

  pub fn end(&self) -> usize {
    self.span().1
  }

  /// The category a complete edge provides. For a leaf, the word itself.
  pub fn lhs(&self) -> &Symbol {
    match self {
      Self::Leaf(l) => &l.token,
      Self::Tree(t) => &t.lr0.production.lhs,
    }
  }

  pub fn next_symbol(&self) -> Option<&Symbol> {
    match self {
      Self::Leaf(_) => None,
      Self::Tree(t) => t.lr0.next_symbol(),
    }
  }

  pub fn is_complete(&self) -> bool {
    match self {
      Self::Leaf(_) => true,
      Self::Tree(t) => t.lr0.is_complete(),
    }
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn dot(&self) -> usize {
    match self {
      Self::Leaf(_) => 0,
      Self::Tree(t) => t.lr0.pos,
    }
  }

  pub fn production(&self) -> Option<&Rc<Production>> {
    match self {
      Self::Leaf(_) => None,
      Self::Tree(t) => Some(&t.lr0.production),
    }
  }

  pub fn features(&self) -> Option<&Features> {
    match self {
      Self::Leaf(_) => None,
      Self::Tree(t) => t.features.as_ref(),
    }
  }

  pub fn children(&self) -> &[ChildDesc] {
    match self {
      Self::Leaf(_) => &[],
      Self::Tree(t) => &t.children,
    }
  }

  /// How this edge fills an rhs slot of another edge
  pub fn description(&self) -> ChildDesc {
    ChildDesc {
      symbol: self.lhs().clone(),
      span: self.span(),
      key: self.features().map(|f| f.key.clone()),
    }
  }

  /// Hash of everything but the feature structure
  pub fn structure_hash(&self) -> u64 {
    let mut hasher = FnvHasher::default();
    match self {
      Self::Leaf(l) => l.hash(&mut hasher),
      Self::Tree(t) => {
        t.lr0.hash(&mut hasher);
        t.span.hash(&mut hasher);
        for child in t.children.iter() {
          child.symbol.hash(&mut hasher);
          child.span.hash(&mut hasher);
        }
      }
    }
    hasher.finish()
  }

  /// Equal up to feature structures, both on the edge and on its children
  pub fn same_structure(&self, other: &Edge) -> bool {
    match (self, other) {
      (Self::Leaf(a), Self::Leaf(b)) => a == b,
      (Self::Tree(a), Self::Tree(b)) => {
        a.lr0 == b.lr0
          && a.span == b.span
          && a.children.len() == b.children.len()
          && a
            .children
            .iter()
            .zip(b.children.iter())
            .all(|(x, y)| x.symbol == y.symbol && x.span == y.span)
      }
      _ => false,
    }
  }
}

impl fmt::Display for Edge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(l) => write!(f, "[{}:{}] {}", l.index, l.index + 1, l.token),
      Self::Tree(t) => write!(f, "[{}:{}] {}", t.span.0, t.span.1, t.lr0),
    }
  }
}

/// A shared edge with its hash computed once
#[derive(Debug, Clone)]
pub struct EdgeRef {
  inner: Rc<Edge>,
  hash: u64,
}

impl EdgeRef {
  pub fn new(edge: Edge) -> Self {
    let mut hasher = FnvHasher::default();
    edge.hash(&mut hasher);
    Self {
      hash: hasher.finish(),
      inner: Rc::new(edge),
    }
  }

  pub fn edge(&self) -> &Edge {
    &self.inner
  }
}

impl From<Edge> for EdgeRef {
  fn from(edge: Edge) -> Self {
    Self::new(edge)
  }
}

impl Deref for EdgeRef {
  type Target = Edge;

  fn deref(&self) -> &Edge {
    &self.inner
  }
}

impl PartialEq for EdgeRef {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash && (Rc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner)
  }
}

impl Eq for EdgeRef {}

impl Hash for EdgeRef {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.hash.hash(state);
  }
}

impl fmt::Display for EdgeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.inner)
  }
}
