use std::fmt;

use fnv::FnvHashMap;
use indexmap::IndexSet;
use itertools::Itertools;

use crate::edge::{ChildDesc, Edge, EdgeRef};
use crate::featurestructure::NodeArena;
use crate::forest::ParseForest;
use crate::rules::Symbol;

/// What happened to an edge offered to the chart
#[derive(Debug, Clone)]
pub enum Insertion {
  Inserted(EdgeRef),
  /// An equal edge was already there
  Duplicate,
  /// A structurally equal edge with more general features was already there
  Subsumed,
}

impl Insertion {
  pub fn is_inserted(&self) -> bool {
    matches!(self, Self::Inserted(_))
  }
}

/// The deduplicated, indexed set of edges over one input. Owns the arena holding
/// the edges' feature structures.
#[derive(Debug)]
pub struct Chart {
  tokens: Vec<String>,
  arena: NodeArena,
  edges: IndexSet<EdgeRef>,
  /// complete edges (and leaves) by (start, lhs)
  complete_index: FnvHashMap<(usize, Symbol), Vec<usize>>,
  /// incomplete edges by (end, next symbol)
  incomplete_index: FnvHashMap<(usize, Symbol), Vec<usize>>,
  /// complete tree edges by (start, end, lhs)
  span_index: FnvHashMap<(usize, usize, Symbol), Vec<usize>>,
  /// edges by everything but their features, for subsumption checks
  structure_index: FnvHashMap<u64, Vec<usize>>,
  subsumption: bool,
}

impl Chart {
  /// `arena` must hold every feature structure the edges will refer to, usually a
  /// copy of the grammar's arena
  pub fn new<S: AsRef<str>>(tokens: &[S], arena: NodeArena) -> Self {
    Self {
      tokens: tokens.iter().map(|t| t.as_ref().to_string()).collect(),
      arena,
      edges: IndexSet::new(),
      complete_index: FnvHashMap::default(),
      incomplete_index: FnvHashMap::default(),
      span_index: FnvHashMap::default(),
      structure_index: FnvHashMap::default(),
      subsumption: false,
    }
  }

  /// Reject edges whose features are no more specific than those of a structurally
  /// equal edge already in the chart. Off by default: it can drop alternative bindings.
  pub fn with_subsumption(mut self, subsumption: bool) -> Self {
    self.subsumption = subsumption;
    self
  }

  pub fn num_leaves(&self) -> usize {
    self.tokens.len()
  }

  pub fn leaf(&self, index: usize) -> Option<&str> {
    self.tokens.get(index).map(String::as_str)
  }

  pub fn leaves(&self) -> &[String] {
    &self.tokens
  }

  pub fn arena(&self) -> &NodeArena {
    &self.arena
  }

  pub fn arena_mut(&mut self) -> &mut NodeArena {
    &mut self.arena
  }

  pub fn len(&self) -> usize {
    self.edges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }

  pub fn edges(&self) -> impl Iterator<Item = &EdgeRef> + '_ {
    self.edges.iter()
  }

  pub fn contains(&self, edge: &Edge) -> bool {
    self.edges.contains(&EdgeRef::new(edge.clone()))
  }

  /// False if the edge was already present or was subsumed
  pub fn insert(&mut self, edge: Edge) -> bool {
    self.insert_edge(edge).is_inserted()
  }

  pub fn insert_edge(&mut self, edge: Edge) -> Insertion {
    let edge = EdgeRef::new(edge);
    if self.edges.contains(&edge) {
      return Insertion::Duplicate;
    }

    let structure = edge.structure_hash();
    if self.subsumption && self.is_subsumed(&edge, structure) {
      return Insertion::Subsumed;
    }

    let (idx, _) = self.edges.insert_full(edge.clone());

    if edge.is_complete() {
      self
        .complete_index
        .entry((edge.start(), edge.lhs().clone()))
        .or_default()
        .push(idx);
      if !edge.is_leaf() {
        self
          .span_index
          .entry((edge.start(), edge.end(), edge.lhs().clone()))
          .or_default()
          .push(idx);
      }
    } else if let Some(next) = edge.next_symbol() {
      self
        .incomplete_index
        .entry((edge.end(), next.clone()))
        .or_default()
        .push(idx);
    }
    self.structure_index.entry(structure).or_default().push(idx);

    Insertion::Inserted(edge)
  }

  fn is_subsumed(&mut self, edge: &EdgeRef, structure: u64) -> bool {
    let Some(candidates) = self.structure_index.get(&structure) else {
      return false;
    };

    for &idx in candidates {
      let Some(other) = self.edges.get_index(idx) else {
        continue;
      };
      if !other.same_structure(edge) {
        continue;
      }
      match (other.features(), edge.features()) {
        // no features constrain nothing, so they are the most general
        (None, _) => return true,
        (Some(_), None) => {}
        (Some(general), Some(specific)) => {
          if self.arena.subsumes(general.idx, specific.idx) {
            return true;
          }
        }
      }
    }

    false
  }

  fn lookup(&self, idxs: Option<&Vec<usize>>) -> Vec<EdgeRef> {
    idxs
      .into_iter()
      .flatten()
      .filter_map(|&idx| self.edges.get_index(idx).cloned())
      .collect()
  }

  /// Complete edges, leaves included, optionally restricted by start and lhs
  pub fn complete_edges(&self, start: Option<usize>, lhs: Option<&Symbol>) -> Vec<EdgeRef> {
    match (start, lhs) {
      (Some(start), Some(lhs)) => self.lookup(self.complete_index.get(&(start, lhs.clone()))),
      _ => self
        .edges
        .iter()
        .filter(|e| e.is_complete())
        .filter(|e| start.is_none_or(|s| e.start() == s))
        .filter(|e| lhs.is_none_or(|l| e.lhs() == l))
        .cloned()
        .collect(),
    }
  }

  /// Incomplete edges, optionally restricted by end and the next symbol they need
  pub fn incomplete_edges(&self, end: Option<usize>, next: Option<&Symbol>) -> Vec<EdgeRef> {
    match (end, next) {
      (Some(end), Some(next)) => self.lookup(self.incomplete_index.get(&(end, next.clone()))),
      _ => self
        .edges
        .iter()
        .filter(|e| !e.is_complete())
        .filter(|e| end.is_none_or(|x| e.end() == x))
        .filter(|e| next.is_none_or(|n| e.next_symbol() == Some(n)))
        .cloned()
        .collect(),
    }
  }

  /// Complete tree edges for `lhs` covering exactly `start..end`
  pub fn edges_spanning(&self, start: usize, end: usize, lhs: &Symbol) -> Vec<EdgeRef> {
    self.lookup(self.span_index.get(&(start, end, lhs.clone())))
  }

  /// Complete edges for `symbol` covering the whole input
  pub fn root_edges(&self, symbol: &str) -> Vec<EdgeRef> {
    self.edges_spanning(0, self.num_leaves(), &Symbol::nonterminal(symbol))
  }

  /// The trees of every complete `symbol` edge covering the whole input
  pub fn parses(&self, symbol: &str) -> ParseForest<'_> {
    ParseForest::roots(
      self,
      ChildDesc {
        symbol: Symbol::nonterminal(symbol),
        span: (0, self.num_leaves()),
        key: None,
      },
    )
  }

  /// `[s:e] LHS -> a * b // [features]`
  pub fn display_edge(&self, edge: &Edge) -> String {
    match edge.features() {
      Some(features) => format!("{} // {}", edge, self.arena.display(features.idx)),
      None => edge.to_string(),
    }
  }

  fn default_width(&self) -> usize {
    (50 / (self.num_leaves() + 1)).max(2)
  }

  /// The input words laid out to line up with `pretty_format_edge`
  pub fn pretty_format_leaves(&self, width: Option<usize>) -> String {
    let width = width.unwrap_or_else(|| self.default_width()).max(2);
    let cells = self
      .tokens
      .iter()
      .map(|t| {
        let t = t.chars().take(width - 1).collect::<String>();
        format!("{:^w$}", t, w = width - 1)
      })
      .join(".");
    format!("|.{}.|", cells)
  }

  /// One line drawing the edge's span over the input, followed by the edge itself
  pub fn pretty_format_edge(&self, edge: &Edge, width: Option<usize>) -> String {
    let width = width.unwrap_or_else(|| self.default_width()).max(2);
    let (start, end) = edge.span();

    let mut output = format!("|{}", format!(".{}", " ".repeat(width - 1)).repeat(start));
    if start == end {
      if edge.is_complete() {
        output.push('#');
      } else {
        output.push('>');
      }
    } else {
      let fill = width * (end - start - 1) + (width - 1);
      let (line, close) = if !edge.is_complete() {
        ('-', '>')
      } else if start == 0 && end == self.num_leaves() {
        ('=', ']')
      } else {
        ('-', ']')
      };
      output.push('[');
      output.extend(std::iter::repeat_n(line, fill));
      output.push(close);
    }
    output += &format!("{}.", " ".repeat(width - 1)).repeat(self.num_leaves() - end);
    output.push_str("| ");
    output.push_str(&self.display_edge(edge));

    output
  }

  /// The leaves, then every edge in insertion order
  pub fn pretty_format(&self, width: Option<usize>) -> String {
    std::iter::once(self.pretty_format_leaves(width))
      .chain(self.edges.iter().map(|e| self.pretty_format_edge(e, width)))
      .join("\n")
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for edge in self.edges.iter() {
      writeln!(f, "{}", self.display_edge(edge))?;
    }
    Ok(())
  }
}
