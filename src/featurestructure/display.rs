use std::collections::HashMap;
use std::fmt::{self, Write};

use super::node::{Atom, Node, NodeArena, NodeIdx};
use crate::parse_grammar::TOP_STR;

/// Helper struct for displaying a node in the bracketed text form
#[derive(Clone)]
pub struct NodeDisplay<'a> {
  pub arena: &'a NodeArena,
  pub idx: NodeIdx,
}

impl fmt::Display for NodeDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Printer::new(self.arena, self.idx, Style::Display).write_node(f, self.idx)
  }
}

impl NodeArena {
  /// Display a NodeIdx
  pub fn display(&self, idx: NodeIdx) -> NodeDisplay<'_> {
    NodeDisplay { arena: self, idx }
  }

  /// Canonical text for `idx`: sorted features, reentrance numbered by first visit,
  /// variables numbered by first visit instead of named, and no unconstrained or
  /// absent values. Two structures with the same fingerprint are interchangeable.
  pub fn fingerprint(&self, idx: NodeIdx) -> String {
    let mut s = String::new();
    // writing into a String cannot fail
    let _ = Printer::new(self, idx, Style::Fingerprint).write_node(&mut s, idx);
    s
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Style {
  Display,
  Fingerprint,
}

struct Printer<'a> {
  arena: &'a NodeArena,
  style: Style,
  counts: HashMap<NodeIdx, usize>,
  printed: HashMap<NodeIdx, usize>,
  vars: HashMap<NodeIdx, usize>,
}

impl<'a> Printer<'a> {
  fn new(arena: &'a NodeArena, root: NodeIdx, style: Style) -> Self {
    let mut counts = HashMap::new();
    count_in_pointers(arena, root, &mut counts);
    Self {
      arena,
      style,
      counts,
      printed: HashMap::new(),
      vars: HashMap::new(),
    }
  }

  /// Follows forwards and bound variables to the node that should be printed
  fn target(&self, idx: NodeIdx) -> NodeIdx {
    resolve_target(self.arena, idx)
  }

  /// Only structures and tops carry identity worth marking
  fn is_shared(&self, idx: NodeIdx) -> bool {
    matches!(self.arena.get(idx), Node::Edged(_) | Node::Top)
      && self.counts.get(&idx).copied().unwrap_or(0) > 1
  }

  /// Values a structure can drop without changing what it means
  fn is_silent(&self, idx: NodeIdx) -> bool {
    match self.arena.get(idx) {
      Node::Atom(Atom::Absent) => true,
      Node::Top => self.style == Style::Fingerprint && !self.is_shared(idx),
      _ => false,
    }
  }

  fn write_node<W: Write>(&mut self, w: &mut W, idx: NodeIdx) -> fmt::Result {
    let arena = self.arena;
    let idx = self.target(idx);

    if let Some(id) = self.printed.get(&idx) {
      return write!(w, "->({})", id);
    }
    if self.is_shared(idx) {
      let id = self.printed.len() + 1;
      self.printed.insert(idx, id);
      write!(w, "({})", id)?;
    }

    match arena.get(idx) {
      Node::Top => write!(w, "{}", TOP_STR),
      Node::Atom(a) => write!(w, "{}", a),
      Node::Var(var) => match self.style {
        Style::Display => write!(w, "?{}", var.name),
        Style::Fingerprint => {
          let next = self.vars.len() + 1;
          let n = *self.vars.entry(idx).or_insert(next);
          write!(w, "?{}", n)
        }
      },
      Node::Edged(arcs) => {
        let mut arcs = arcs
          .iter()
          .map(|(label, target)| (label.as_str(), self.target(*target)))
          .collect::<Vec<_>>();
        arcs.sort_unstable();

        write!(w, "[")?;
        let mut first = true;
        for (label, target) in arcs {
          if self.is_silent(target) {
            continue;
          }
          if !first {
            write!(w, ", ")?;
          }
          first = false;

          match arena.get(target) {
            Node::Atom(Atom::Bool(true)) => write!(w, "+{}", label)?,
            Node::Atom(Atom::Bool(false)) => write!(w, "-{}", label)?,
            _ if self.printed.contains_key(&target) => {
              write!(w, "{}", label)?;
              self.write_node(w, target)?;
            }
            _ => {
              write!(w, "{}=", label)?;
              self.write_node(w, target)?;
            }
          }
        }
        write!(w, "]")
      }
      Node::Forwarded(_) => unreachable!("forward survived dereference"),
    }
  }
}

/// Where a slot holding `idx` really points: past forwards and bound variables
fn resolve_target(arena: &NodeArena, idx: NodeIdx) -> NodeIdx {
  match arena.value_of(idx) {
    Some(value) => value,
    None => arena.forwarded_self(idx),
  }
}

/// Counts how many arcs reach each node
fn count_in_pointers(arena: &NodeArena, idx: NodeIdx, seen: &mut HashMap<NodeIdx, usize>) {
  let idx = resolve_target(arena, idx);
  let count = seen.entry(idx).or_insert(0);
  *count += 1;
  if *count > 1 {
    return;
  }

  if let Node::Edged(arcs) = arena.get(idx) {
    for value in arcs.values() {
      count_in_pointers(arena, *value, seen);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_sorted_and_quoted() {
    let mut arena = NodeArena::new();
    let fs = arena
      .parse_fs("[num='pl', case=nom, per=3, word='the dog']")
      .unwrap();
    assert_eq!(
      arena.display(fs).to_string(),
      "[case=nom, num=pl, per=3, word='the dog']"
    );
  }

  #[test]
  fn test_display_reentrance_markers() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("[b=(1)[c=x], a->(1), d=[e->(1)]]").unwrap();
    assert_eq!(
      arena.display(fs).to_string(),
      "[a=(1)[c=x], b->(1), d=[e->(1)]]"
    );
  }

  #[test]
  fn test_display_cycle() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("(1)[self->(1), name=loop]").unwrap();
    assert_eq!(arena.display(fs).to_string(), "(1)[name=loop, self->(1)]");
  }

  #[test]
  fn test_display_booleans_and_variables() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("[+fin, -aux, agr=?x]").unwrap();
    assert_eq!(arena.display(fs).to_string(), "[agr=?x, -aux, +fin]");
  }

  #[test]
  fn test_fingerprint_ignores_variable_names() {
    let mut arena = NodeArena::new();
    let a = arena.parse_fs("[a=?x, b=?x, c=?y]").unwrap();
    let b = arena.parse_fs("[a=?p, b=?p, c=?q]").unwrap();
    let c = arena.parse_fs("[a=?p, b=?q, c=?q]").unwrap();
    assert_eq!(arena.fingerprint(a), arena.fingerprint(b));
    assert_ne!(arena.fingerprint(a), arena.fingerprint(c));
  }

  #[test]
  fn test_fingerprint_drops_unconstrained_values() {
    let mut arena = NodeArena::new();
    let a = arena.parse_fs("[a=**top**, b=1]").unwrap();
    let b = arena.parse_fs("[b=1]").unwrap();
    let shared = arena.parse_fs("[a=(1)**top**, c->(1), b=1]").unwrap();
    assert_eq!(arena.fingerprint(a), arena.fingerprint(b));
    assert_ne!(arena.fingerprint(shared), arena.fingerprint(b));
  }
}
