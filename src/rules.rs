use std::fmt;
use std::hash::{Hash, Hasher};

use crate::featurestructure::NodeIdx;

/// One element of a production: a word that must appear in the input, or a category
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
  Terminal(String),
  Nonterminal(String),
}

impl Symbol {
  pub fn terminal(s: impl Into<String>) -> Self {
    Self::Terminal(s.into())
  }

  pub fn nonterminal(s: impl Into<String>) -> Self {
    Self::Nonterminal(s.into())
  }

  pub fn name(&self) -> &str {
    match self {
      Self::Terminal(s) => s,
      Self::Nonterminal(s) => s,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Terminal(_))
  }

  pub fn is_nonterminal(&self) -> bool {
    matches!(self, Self::Nonterminal(_))
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Terminal(s) => write!(f, "'{}'", s),
      Self::Nonterminal(s) => write!(f, "{}", s),
    }
  }
}

/// `lhs -> rhs...`, optionally carrying a feature structure and a weight.
/// The feature structure lives in the owning grammar's arena. It describes the lhs
/// category at the top level and the i-th rhs category under `child-i`.
#[derive(Debug, Clone)]
pub struct Production {
  pub lhs: Symbol,
  pub rhs: Vec<Symbol>,
  pub features: Option<NodeIdx>,
  pub weight: Option<f64>,
}

impl Production {
  pub fn new(lhs: &str, rhs: Vec<Symbol>) -> Self {
    Self {
      lhs: Symbol::nonterminal(lhs),
      rhs,
      features: None,
      weight: None,
    }
  }

  pub fn with_features(mut self, features: NodeIdx) -> Self {
    self.features = Some(features);
    self
  }

  pub fn with_weight(mut self, weight: f64) -> Self {
    self.weight = Some(weight);
    self
  }

  pub fn lhs_name(&self) -> &str {
    self.lhs.name()
  }

  pub fn len(&self) -> usize {
    self.rhs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rhs.is_empty()
  }

  /// A production rewriting straight to one word, e.g. `N -> 'dog'`
  pub fn is_lexical(&self) -> bool {
    self.rhs.len() == 1 && self.rhs[0].is_terminal()
  }
}

// equality is structural, and ignores the attached feature structure
impl PartialEq for Production {
  fn eq(&self, other: &Self) -> bool {
    self.lhs == other.lhs
      && self.rhs == other.rhs
      && self.weight.map(f64::to_bits) == other.weight.map(f64::to_bits)
  }
}

impl Eq for Production {}

impl Hash for Production {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.lhs.hash(state);
    self.rhs.hash(state);
    self.weight.map(f64::to_bits).hash(state);
  }
}

impl fmt::Display for Production {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ->", self.lhs)?;
    for symbol in self.rhs.iter() {
      write!(f, " {}", symbol)?;
    }
    if let Some(weight) = self.weight {
      write!(f, " [{}]", weight)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_production_display() {
    let p = Production::new(
      "VP",
      vec![Symbol::nonterminal("V"), Symbol::terminal("to"), Symbol::nonterminal("VP")],
    );
    assert_eq!(p.to_string(), "VP -> V 'to' VP");
    assert_eq!(p.with_weight(0.5).to_string(), "VP -> V 'to' VP [0.5]");
  }

  #[test]
  fn test_structural_equality() {
    let a = Production::new("N", vec![Symbol::terminal("dog")]);
    let b = Production::new("N", vec![Symbol::terminal("dog")]).with_features(NodeIdx(3));
    assert_eq!(a, b);
    assert!(a.is_lexical());
    assert_ne!(a.clone().with_weight(0.3), b.with_weight(0.7));
    assert_ne!(a, Production::new("N", vec![Symbol::nonterminal("dog")]));
  }
}
