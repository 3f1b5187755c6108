use std::collections::BTreeSet;
use std::collections::btree_set;

use super::node::{Atom, NodeArena, NodeIdx};
use super::unify::UnificationFailure;

/// Feature names a grammar category always carries. A required feature nobody gave a
/// value holds `Atom::Absent`, so it clashes with any concrete value on the other side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFeatures(BTreeSet<String>);

impl RequiredFeatures {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn insert(&mut self, name: impl Into<String>) -> bool {
    self.0.insert(name.into())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains(name)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> btree_set::Iter<'_, String> {
    self.0.iter()
  }
}

impl<S: Into<String>> FromIterator<S> for RequiredFeatures {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self(iter.into_iter().map(Into::into).collect())
  }
}

impl NodeArena {
  /// A structure holding `Absent` for every required feature `idx` lacks, or None when
  /// nothing is missing. Non-mapping values are left alone.
  fn required_padding(
    &mut self,
    idx: Option<NodeIdx>,
    required: &RequiredFeatures,
  ) -> Option<NodeIdx> {
    let missing = match idx {
      Some(idx) if self.is_edged(idx) => required
        .iter()
        .filter(|name| self.arc(idx, name).is_none())
        .cloned()
        .collect::<Vec<_>>(),
      Some(idx) if !self.is_top(idx) => return None,
      _ => required.iter().cloned().collect(),
    };
    if missing.is_empty() {
      return None;
    }

    let pad = self.alloc_edged();
    for name in missing {
      let absent = self.alloc_atom(Atom::Absent);
      // pad is a fresh mapping, nothing to clash with
      let _ = self.set_arc(pad, name, absent);
    }
    Some(pad)
  }

  /// `idx` with every missing required feature filled in as `Absent`
  pub fn with_required_defaults(
    &mut self,
    idx: NodeIdx,
    required: &RequiredFeatures,
  ) -> Result<NodeIdx, UnificationFailure> {
    match self.required_padding(Some(idx), required) {
      Some(pad) => self.unify(idx, pad),
      None => Ok(idx),
    }
  }

  /// Unifies two categories, treating the required features as present on both
  pub fn unify_with_required(
    &mut self,
    a: NodeIdx,
    b: NodeIdx,
    required: &RequiredFeatures,
  ) -> Result<NodeIdx, UnificationFailure> {
    let a = self.with_required_defaults(a, required)?;
    let b = self.with_required_defaults(b, required)?;
    self.unify(a, b)
  }

  /// Unifies `found` into the `label` slot of `host`, where the slot and `found` are
  /// both categories with the given required features. Sharing between the slot and
  /// the rest of `host` is kept.
  pub fn unify_slot(
    &mut self,
    host: NodeIdx,
    label: &str,
    found: NodeIdx,
    required: &RequiredFeatures,
  ) -> Result<NodeIdx, UnificationFailure> {
    let mut host = host;
    let mut found = found;
    if !required.is_empty() {
      let expected = self.arc(host, label);
      if let Some(pad) = self.required_padding(expected, required) {
        let wrapper = self.alloc_from_edges([(label.to_string(), pad)])?;
        host = self.unify(host, wrapper)?;
      }
      found = self.with_required_defaults(found, required)?;
    }

    let wrapper = self.alloc_from_edges([(label.to_string(), found)])?;
    self.unify(host, wrapper)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn required(names: &[&str]) -> RequiredFeatures {
    names.iter().copied().collect()
  }

  #[test]
  fn test_both_lacking_required_feature_unify() {
    let mut arena = NodeArena::new();
    let a = arena.parse_fs("[case=nom]").unwrap();
    let b = arena.parse_fs("[]").unwrap();
    let result = arena.unify_with_required(a, b, &required(&["agr"])).unwrap();
    let gold = arena.parse_fs("[case=nom]").unwrap();
    // an absent required value prints and compares like an unspecified one
    assert!(arena.equivalent(result, gold));
  }

  #[test]
  fn test_missing_required_feature_blocks_concrete_value() {
    let mut arena = NodeArena::new();
    let a = arena.parse_fs("[case=nom]").unwrap();
    let b = arena.parse_fs("[agr=sg]").unwrap();
    // plain unification lets the missing feature through
    assert!(arena.unify(a, b).is_ok());
    assert!(arena.unify_with_required(a, b, &required(&["agr"])).is_err());
    // features that are not required still default to anything
    assert!(arena.unify_with_required(a, b, &required(&["num"])).is_ok());
  }

  #[test]
  fn test_unify_slot_keeps_sharing() {
    let mut arena = NodeArena::new();
    let host = arena.parse_fs("[agr=?a, child-0=[agr=?a]]").unwrap();
    let found = arena.parse_fs("[agr=pl]").unwrap();
    let result = arena
      .unify_slot(host, "child-0", found, &RequiredFeatures::new())
      .unwrap();
    let agr = arena.arc(result, "agr").unwrap();
    assert_eq!(arena.atom(agr), Some(&Atom::from("pl")));
    assert_eq!(arena.get_path(result, &["child-0", "agr"]), Some(agr));
  }

  #[test]
  fn test_unify_slot_with_required() {
    let mut arena = NodeArena::new();
    let host = arena.parse_fs("[child-0=[case=nom]]").unwrap();
    let plural = arena.parse_fs("[agr=pl]").unwrap();
    let bare = arena.parse_fs("[case=nom]").unwrap();
    let agr = required(&["agr"]);

    assert!(arena.unify_slot(host, "child-0", plural, &agr).is_err());
    assert!(arena.unify_slot(host, "child-0", bare, &agr).is_ok());
    assert!(
      arena
        .unify_slot(host, "child-0", plural, &RequiredFeatures::new())
        .is_ok()
    );
  }
}
