use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;

use super::node::{Node, NodeArena, NodeIdx, NodeKind};
use super::variable::{Bindings, Variable};

/// Memo of finished merges, keyed by the pair of nodes that were merged
pub(crate) type MergeMemo = HashMap<(NodeIdx, NodeIdx), NodeIdx>;

/// Memo of the isolating copy, from original node to its copy
type CopyMemo = HashMap<NodeIdx, NodeIdx>;

/// Two values could not be reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnificationFailure {
  message: String,
}

impl UnificationFailure {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

impl fmt::Display for UnificationFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unification failure: {}", self.message)
  }
}

impl Error for UnificationFailure {}

/// Where the variables of each side of a unification are looked up and recorded
#[derive(Debug)]
pub enum BindingScope<'b> {
  /// Two private stores, thrown away afterwards. Same-named variables on each side are unrelated.
  Fresh,
  /// One store for both sides. Same-named variables on each side are the same variable.
  Shared(&'b mut Bindings),
  /// One store per side
  Separate(&'b mut Bindings, &'b mut Bindings),
}

impl NodeArena {
  /// Unifies two structures using fresh, independent binding stores.
  /// The inputs are never modified; the result is a new structure.
  pub fn unify(&mut self, a: NodeIdx, b: NodeIdx) -> Result<NodeIdx, UnificationFailure> {
    self.unify_scoped(a, b, BindingScope::Fresh)
  }

  /// Unifies with one binding store shared by both sides
  pub fn unify_with(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    bindings: &mut Bindings,
  ) -> Result<NodeIdx, UnificationFailure> {
    self.unify_scoped(a, b, BindingScope::Shared(bindings))
  }

  /// Unifies with a binding store per side
  pub fn unify_separate(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    bindings_a: &mut Bindings,
    bindings_b: &mut Bindings,
  ) -> Result<NodeIdx, UnificationFailure> {
    self.unify_scoped(a, b, BindingScope::Separate(bindings_a, bindings_b))
  }

  /// Copies both inputs, merges the copies destructively, then cleans up forwards and
  /// bound variables in the result and in the stores. On failure the arena and the
  /// stores are left exactly as they were.
  pub fn unify_scoped(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    scope: BindingScope<'_>,
  ) -> Result<NodeIdx, UnificationFailure> {
    let mut fresh_a = Bindings::new();
    let mut fresh_b = Bindings::new();
    let (store_a, mut store_b) = match scope {
      BindingScope::Fresh => (&mut fresh_a, Some(&mut fresh_b)),
      BindingScope::Shared(store) => (store, None),
      BindingScope::Separate(store_a, store_b) => (store_a, Some(store_b)),
    };

    let saved_a = store_a.clone();
    let saved_b = store_b.as_deref().cloned();

    self.checkpoint();
    match self.unify_stores(a, b, store_a, store_b.as_deref_mut()) {
      Ok(result) => {
        self.commit();
        Ok(result)
      }
      Err(failure) => {
        self.rollback();
        *store_a = saved_a;
        if let (Some(store_b), Some(saved_b)) = (store_b, saved_b) {
          *store_b = saved_b;
        }
        tracing::trace!("{}", failure);
        Err(failure)
      }
    }
  }

  fn unify_stores(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    store_a: &mut Bindings,
    mut store_b: Option<&mut Bindings>,
  ) -> Result<NodeIdx, UnificationFailure> {
    // isolating copy, one memo for both sides so sharing across a and b survives
    let mut copies = CopyMemo::new();
    let a = self.copy_and_bind(a, store_a, &mut copies)?;
    let b = match store_b.as_deref_mut() {
      Some(store) => self.copy_and_bind(b, store, &mut copies)?,
      None => self.copy_and_bind(b, store_a, &mut copies)?,
    };
    self.relink_bindings(store_a, &copies);
    if let Some(store) = store_b.as_deref_mut() {
      self.relink_bindings(store, &copies);
    }

    let merged = self.merge(a, b, &mut MergeMemo::new())?;

    let mut visited = HashSet::new();
    self.resolve_forwards(merged, &mut visited);
    self.resolve_binding_forwards(store_a, &mut visited);
    if let Some(store) = store_b.as_deref_mut() {
      self.resolve_binding_forwards(store, &mut visited);
    }

    let mut visited = HashSet::new();
    let result = self.collapse(merged, &mut visited);
    self.collapse_bindings(store_a, &mut visited);
    if let Some(store) = store_b.as_deref_mut() {
      self.collapse_bindings(store, &mut visited);
    }

    Ok(result)
  }

  /// Deep-copies `idx`. Each variable is replaced by the one `store` has under its name,
  /// which is created (with a copy of the original's value) if the store lacks it.
  fn copy_and_bind(
    &mut self,
    idx: NodeIdx,
    store: &mut Bindings,
    memo: &mut CopyMemo,
  ) -> Result<NodeIdx, UnificationFailure> {
    let idx = self.dereference(idx);
    if let Some(&copy) = memo.get(&idx) {
      return Ok(copy);
    }

    match self.get(idx).clone() {
      Node::Top => {
        let copy = self.alloc_top();
        memo.insert(idx, copy);
        Ok(copy)
      }
      Node::Atom(_) => {
        memo.insert(idx, idx);
        Ok(idx)
      }
      Node::Var(var) => {
        let value = self.value_of(idx);
        match store.get(&var.name) {
          Some(existing) => {
            memo.insert(idx, existing);
            if let Some(value) = value {
              let value = self.copy_and_bind(value, store, memo)?;
              if self.is_var(existing) {
                self.bind(existing, value)?;
              } else {
                self.merge(existing, value, &mut MergeMemo::new())?;
              }
            }
            Ok(existing)
          }
          None => {
            let fresh = self.alloc_var(var.name.clone(), None);
            store.insert(var.name, fresh);
            memo.insert(idx, fresh);
            if let Some(value) = value {
              let value = self.copy_and_bind(value, store, memo)?;
              self.set_var_value(fresh, Some(value));
            }
            Ok(fresh)
          }
        }
      }
      Node::Edged(arcs) => {
        let copy = self.alloc_edged();
        memo.insert(idx, copy);
        let mut arcs = arcs.into_iter().collect::<Vec<_>>();
        arcs.sort_unstable();
        for (label, target) in arcs {
          let target = self.copy_and_bind(target, store, memo)?;
          self.set_arc(copy, label, target)?;
        }
        Ok(copy)
      }
      Node::Forwarded(_) => unreachable!("forward survived dereference"),
    }
  }

  /// Store entries that pointed into an input now point at the copy of that node
  fn relink_bindings(&self, store: &mut Bindings, copies: &CopyMemo) {
    for (name, idx) in store.entries() {
      if let Some(&copy) = copies.get(&self.dereference(idx)) {
        store.insert(name, copy);
      }
    }
  }

  /// Destructive merge of two nodes. Returns the canonical merged node.
  pub(crate) fn merge(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<NodeIdx, UnificationFailure> {
    let a = self.dereference(a);
    let b = self.dereference(b);
    if a == b {
      return Ok(a);
    }
    if let Some(&merged) = memo.get(&(a, b)) {
      return Ok(self.dereference(merged));
    }

    let merged = self.merge_nodes(a, b, memo)?;
    memo.insert((a, b), merged);
    Ok(merged)
  }

  fn merge_nodes(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<NodeIdx, UnificationFailure> {
    match (self.kind(a), self.kind(b)) {
      (NodeKind::Top, _) => {
        self.forward_to(a, b);
        Ok(b)
      }
      (_, NodeKind::Top) => {
        self.forward_to(b, a);
        Ok(a)
      }
      (NodeKind::Var, NodeKind::Var) => self.alias_memo(a, b, memo),
      (NodeKind::Var, _) => {
        self.bind_memo(a, b, memo)?;
        Ok(a)
      }
      (_, NodeKind::Var) => {
        self.bind_memo(b, a, memo)?;
        Ok(b)
      }
      (NodeKind::Atom, NodeKind::Atom) => {
        if self.atom(a) == self.atom(b) {
          Ok(a)
        } else {
          Err(UnificationFailure::new(format!(
            "{} & {}",
            self.display(a),
            self.display(b)
          )))
        }
      }
      (NodeKind::Edged, NodeKind::Edged) => self.merge_edged(a, b, memo),
      _ => Err(UnificationFailure::new(format!(
        "{} & {}",
        self.display(a),
        self.display(b)
      ))),
    }
  }

  /// b is forwarded to a before its arcs are merged in, so cycles through b land on a
  fn merge_edged(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    memo: &mut MergeMemo,
  ) -> Result<NodeIdx, UnificationFailure> {
    let Node::Edged(arcs) = self.replace(b, Node::Forwarded(a)) else {
      return Err(UnificationFailure::new("expected a mapping"));
    };

    let mut arcs = arcs.into_iter().collect::<Vec<_>>();
    arcs.sort_unstable();
    for (label, target) in arcs {
      self.attach(a, label, target, memo)?;
    }

    Ok(self.dereference(a))
  }

  /// Points every arc and variable reachable from `idx` straight at its canonical node
  fn resolve_forwards(&mut self, idx: NodeIdx, visited: &mut HashSet<NodeIdx>) {
    let idx = self.dereference(idx);
    if !visited.insert(idx) {
      return;
    }

    match self.get(idx).clone() {
      Node::Edged(arcs) => {
        for (label, target) in arcs {
          let resolved = self.dereference(target);
          if resolved != target {
            // idx is edged, so this cannot fail
            let _ = self.set_arc(idx, label, resolved);
          }
          self.resolve_forwards(resolved, visited);
        }
      }
      Node::Var(var) => {
        if let Some(value) = var.value {
          let resolved = self.dereference(value);
          if resolved != value {
            self.set_var_value(idx, Some(resolved));
          }
          self.resolve_forwards(resolved, visited);
        }
      }
      _ => {}
    }
  }

  fn resolve_binding_forwards(&mut self, store: &mut Bindings, visited: &mut HashSet<NodeIdx>) {
    for (name, idx) in store.entries() {
      let resolved = self.dereference(idx);
      if resolved != idx {
        store.insert(name, resolved);
      }
      self.resolve_forwards(resolved, visited);
    }
  }

  /// Replaces bound variables by their values throughout the structure. Returns what
  /// should stand in the slot that held `idx`.
  fn collapse(&mut self, idx: NodeIdx, visited: &mut HashSet<NodeIdx>) -> NodeIdx {
    let idx = self.dereference(idx);
    let idx = if self.is_var(idx) {
      match self.value_of(idx) {
        Some(value) => value,
        None => return self.forwarded_self(idx),
      }
    } else {
      idx
    };

    if visited.insert(idx) {
      if let Node::Edged(arcs) = self.get(idx).clone() {
        for (label, target) in arcs {
          let collapsed = self.collapse(target, visited);
          if collapsed != target {
            // idx is edged, so this cannot fail
            let _ = self.set_arc(idx, label, collapsed);
          }
        }
      }
    }

    idx
  }

  /// Like collapse, and also drops entries that are still unbound under their own name
  fn collapse_bindings(&mut self, store: &mut Bindings, visited: &mut HashSet<NodeIdx>) {
    for (name, idx) in store.entries() {
      let idx = self.dereference(idx);
      if self.is_var(idx) && self.value_of(idx).is_none() {
        let var = self.forwarded_self(idx);
        if self.variable(var).is_some_and(|v| v.name == name) {
          store.remove(&name);
        } else {
          store.insert(name, var);
        }
      } else {
        let collapsed = self.collapse(idx, visited);
        store.insert(name, collapsed);
      }
    }
  }

  /// True if `general` carries no information that `specific` lacks, i.e. unifying the
  /// two gives back `specific`. Leaves the arena untouched.
  pub fn subsumes(&mut self, general: NodeIdx, specific: NodeIdx) -> bool {
    self.speculate(|arena| match arena.unify(specific, general) {
      Ok(result) => arena.fingerprint(result) == arena.fingerprint(specific),
      Err(_) => false,
    })
  }

  /// Reentrance-preserving structural equality, blind to variable names
  pub fn equivalent(&self, a: NodeIdx, b: NodeIdx) -> bool {
    self.fingerprint(a) == self.fingerprint(b)
  }

  /// Deep copy in which every unbound variable gets a new, arena-unique name, so the
  /// copy can meet structures built from the same rules without name clashes
  pub fn freshen(&mut self, idx: NodeIdx) -> NodeIdx {
    self.freshen_node(idx, &mut CopyMemo::new())
  }

  fn freshen_node(&mut self, idx: NodeIdx, memo: &mut CopyMemo) -> NodeIdx {
    let idx = self.dereference(idx);
    let idx = match self.value_of(idx) {
      Some(value) => value,
      None => self.forwarded_self(idx),
    };
    if let Some(&copy) = memo.get(&idx) {
      return copy;
    }

    match self.get(idx).clone() {
      Node::Var(var) => {
        let id = self.next_var_id();
        let base = var.name.split_once('#').map_or(var.name.as_str(), |(base, _)| base);
        let base = if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
          "v"
        } else {
          base
        };
        // `#` can't appear in a variable read from text, so fresh names never meet rule names
        let copy = self.alloc(Node::Var(Variable {
          id,
          name: format!("{}#{}", base, id),
          value: None,
        }));
        memo.insert(idx, copy);
        copy
      }
      Node::Edged(arcs) => {
        let copy = self.alloc_edged();
        memo.insert(idx, copy);
        let mut arcs = arcs.into_iter().collect::<Vec<_>>();
        arcs.sort_unstable();
        let arcs = arcs
          .into_iter()
          .map(|(label, target)| (label, self.freshen_node(target, memo)))
          .collect();
        self.replace(copy, Node::Edged(arcs));
        copy
      }
      Node::Top => {
        let copy = self.alloc_top();
        memo.insert(idx, copy);
        copy
      }
      _ => {
        memo.insert(idx, idx);
        idx
      }
    }
  }
}
