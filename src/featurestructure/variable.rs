use std::collections::HashMap;
use std::collections::hash_map;

use super::node::{Node, NodeArena, NodeIdx};
use super::unify::{MergeMemo, UnificationFailure};

/// A unification variable. Lives in the arena as a `Node::Var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  /// Unique within the arena that allocated it, never reused
  pub id: u64,
  pub name: String,
  /// Empty, a concrete value, or another variable node (an alias)
  pub value: Option<NodeIdx>,
}

/// Maps variable names to the nodes they stand for. After a unification an entry
/// holds either a concrete value or the variable it was aliased to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
  vars: HashMap<String, NodeIdx>,
}

impl Bindings {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn get(&self, name: &str) -> Option<NodeIdx> {
    self.vars.get(name).copied()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: NodeIdx) -> Option<NodeIdx> {
    self.vars.insert(name.into(), value)
  }

  pub fn remove(&mut self, name: &str) -> Option<NodeIdx> {
    self.vars.remove(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.vars.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  pub fn iter(&self) -> hash_map::Iter<'_, String, NodeIdx> {
    self.vars.iter()
  }

  /// Variable names in sorted order
  pub fn names(&self) -> Vec<&str> {
    let mut names = self.vars.keys().map(String::as_str).collect::<Vec<_>>();
    names.sort_unstable();
    names
  }

  pub(crate) fn entries(&self) -> Vec<(String, NodeIdx)> {
    self.vars.iter().map(|(k, v)| (k.clone(), *v)).collect()
  }
}

impl NodeArena {
  /// Allocates an unbound variable. Without a name, the variable is named after its id.
  pub fn new_variable(&mut self, name: Option<&str>) -> NodeIdx {
    let id = self.next_var_id();
    let name = name.map(str::to_string).unwrap_or_else(|| id.to_string());
    self.alloc(Node::Var(Variable {
      id,
      name,
      value: None,
    }))
  }

  pub(crate) fn alloc_var(&mut self, name: String, value: Option<NodeIdx>) -> NodeIdx {
    let id = self.next_var_id();
    self.alloc(Node::Var(Variable { id, name, value }))
  }

  pub fn variable(&self, idx: NodeIdx) -> Option<&Variable> {
    self.resolve(idx).var()
  }

  /// Follows the alias chain from `var`. Returns the concrete value at its end,
  /// or None if it ends in an unbound variable. A non-variable is its own value.
  pub fn value_of(&self, var: NodeIdx) -> Option<NodeIdx> {
    let mut idx = self.dereference(var);
    loop {
      match self.get(idx) {
        Node::Var(Variable { value: Some(next), .. }) => idx = self.dereference(*next),
        Node::Var(Variable { value: None, .. }) => return None,
        _ => return Some(idx),
      }
    }
  }

  /// The last variable of `var`'s alias chain
  pub fn forwarded_self(&self, var: NodeIdx) -> NodeIdx {
    let mut idx = self.dereference(var);
    while let Node::Var(Variable {
      value: Some(next), ..
    }) = self.get(idx)
    {
      let next = self.dereference(*next);
      if !self.is_var(next) {
        break;
      }
      idx = next;
    }
    idx
  }

  /// Binds `var` to `value`. An alias passes the bind on to its target, and an
  /// already-bound variable keeps the unification of its old and new values.
  /// On failure neither `var` nor `value` is changed.
  pub fn bind(&mut self, var: NodeIdx, value: NodeIdx) -> Result<(), UnificationFailure> {
    self.transact(|arena| arena.bind_memo(var, value, &mut MergeMemo::new()))
  }

  pub(crate) fn bind_memo(
    &mut self,
    var: NodeIdx,
    value: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<(), UnificationFailure> {
    let var = self.dereference(var);
    let value = self.dereference(value);
    if self.is_var(value) {
      return self.alias_memo(var, value, memo).map(|_| ());
    }

    let current = match self.get(var) {
      Node::Var(v) => v.value,
      _ => {
        return Err(UnificationFailure::new(format!(
          "cannot bind {}, it is not a variable",
          self.display(var)
        )));
      }
    };

    match current {
      Some(target) if self.is_var(target) => self.bind_memo(target, value, memo),
      Some(existing) => {
        let unified = self.merge(existing, value, memo)?;
        self.set_var_value(var, Some(unified));
        Ok(())
      }
      None => {
        self.set_var_value(var, Some(value));
        Ok(())
      }
    }
  }

  /// Makes `var` an alias of `other`, handing any value `var` had over to `other`.
  /// Returns `other`.
  pub fn alias_to(&mut self, var: NodeIdx, other: NodeIdx) -> Result<NodeIdx, UnificationFailure> {
    self.transact(|arena| arena.alias_memo(var, other, &mut MergeMemo::new()))
  }

  pub(crate) fn alias_memo(
    &mut self,
    var: NodeIdx,
    other: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<NodeIdx, UnificationFailure> {
    let var = self.forwarded_self(var);
    let other = self.forwarded_self(other);
    if var == other {
      return Ok(other);
    }

    if let Some(value) = self.value_of(var) {
      self.bind_memo(other, value, memo)?;
    }
    self.set_var_value(var, Some(other));
    Ok(other)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::featurestructure::Atom;

  #[test]
  fn test_unnamed_variables_use_their_id() {
    let mut arena = NodeArena::new();
    let a = arena.new_variable(None);
    let b = arena.new_variable(None);
    let a = arena.variable(a).unwrap();
    let b = arena.variable(b).unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(a.name, a.id.to_string());
  }

  #[test]
  fn test_bind_and_value_of() {
    let mut arena = NodeArena::new();
    let x = arena.new_variable(Some("x"));
    assert_eq!(arena.value_of(x), None);

    let five = arena.alloc_atom(5i64);
    arena.bind(x, five).unwrap();
    assert_eq!(arena.value_of(x), Some(five));

    // binding again to an equal value is fine, to a different one is not
    let other_five = arena.alloc_atom(5i64);
    arena.bind(x, other_five).unwrap();
    let six = arena.alloc_atom(6i64);
    assert!(arena.bind(x, six).is_err());
    assert_eq!(arena.atom(arena.value_of(x).unwrap()), Some(&Atom::Int(5)));
  }

  #[test]
  fn test_failed_bind_leaves_both_sides_alone() {
    let mut arena = NodeArena::new();
    let x = arena.new_variable(Some("x"));
    let old = arena.parse_fs("[a=1]").unwrap();
    arena.bind(x, old).unwrap();

    let clash = arena.parse_fs("[a=2, b=3]").unwrap();
    let len = arena.len();
    assert!(arena.bind(x, clash).is_err());
    assert_eq!(arena.display(clash).to_string(), "[a=2, b=3]");
    assert_eq!(arena.display(arena.value_of(x).unwrap()).to_string(), "[a=1]");
    assert_eq!(arena.len(), len);

    // same through an alias: neither variable moves
    let y = arena.new_variable(Some("y"));
    arena.bind(y, clash).unwrap();
    assert!(arena.alias_to(x, y).is_err());
    assert_eq!(arena.forwarded_self(x), x);
    assert_eq!(arena.display(arena.value_of(x).unwrap()).to_string(), "[a=1]");
    assert_eq!(arena.display(arena.value_of(y).unwrap()).to_string(), "[a=2, b=3]");
  }

  #[test]
  fn test_alias_chain() {
    let mut arena = NodeArena::new();
    let x = arena.new_variable(Some("x"));
    let y = arena.new_variable(Some("y"));
    let z = arena.new_variable(Some("z"));

    assert_eq!(arena.alias_to(x, y).unwrap(), y);
    assert_eq!(arena.alias_to(y, z).unwrap(), z);
    assert_eq!(arena.forwarded_self(x), z);

    // binding through an alias lands on the end of the chain
    let sg = arena.alloc_str("sg");
    arena.bind(x, sg).unwrap();
    assert_eq!(arena.value_of(z), Some(sg));
    assert_eq!(arena.value_of(x), Some(sg));

    // aliasing a variable to itself through the chain is a no-op
    assert_eq!(arena.alias_to(z, x).unwrap(), z);
    assert_eq!(arena.value_of(y), Some(sg));
  }

  #[test]
  fn test_alias_carries_value() {
    let mut arena = NodeArena::new();
    let x = arena.new_variable(Some("x"));
    let y = arena.new_variable(Some("y"));
    let pl = arena.alloc_str("pl");
    arena.bind(x, pl).unwrap();

    arena.alias_to(x, y).unwrap();
    assert_eq!(arena.value_of(y), Some(pl));
    assert_eq!(arena.forwarded_self(x), y);
  }
}
