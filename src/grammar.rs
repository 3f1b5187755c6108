use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::edge::Features;
use crate::featurestructure::{NodeArena, NodeIdx, RequiredFeatures};
use crate::rules::{Production, Symbol};

/// How far the weights of one lhs may stray from 1 in a weighted grammar
pub const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GrammarError {
  WeightsDoNotSumToOne { lhs: String, total: f64 },
  MissingWeight { production: String },
  InvalidWeight { production: String, weight: f64 },
}

impl fmt::Display for GrammarError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::WeightsDoNotSumToOne { lhs, total } => {
        write!(f, "weights of productions for {} sum to {}, not 1", lhs, total)
      }
      Self::MissingWeight { production } => {
        write!(f, "production {} has no weight", production)
      }
      Self::InvalidWeight { production, weight } => {
        write!(f, "production {} has invalid weight {}", production, weight)
      }
    }
  }
}

impl Error for GrammarError {}

/// An indexed, read-only set of productions. The grammar owns the arena holding its
/// productions' feature structures; a parse works on a copy of that arena.
#[derive(Debug, Clone)]
pub struct Grammar {
  start: String,
  productions: Vec<Rc<Production>>,
  lhs_index: FnvHashMap<String, Vec<usize>>,
  rhs_index: FnvHashMap<Symbol, Vec<usize>>,
  lexical_index: FnvHashMap<String, Vec<usize>>,
  lexicon: HashMap<String, BTreeSet<String>>,
  parts_of_speech: HashSet<String>,
  feature_keys: HashMap<NodeIdx, Rc<str>>,
  required: RequiredFeatures,
  arena: NodeArena,
}

impl Grammar {
  /// Builds the indices. Nothing is validated.
  pub fn new(start: impl Into<String>, productions: Vec<Production>, arena: NodeArena) -> Self {
    let productions = productions.into_iter().map(Rc::new).collect::<Vec<_>>();

    let mut lhs_index: FnvHashMap<String, Vec<usize>> = FnvHashMap::default();
    let mut rhs_index: FnvHashMap<Symbol, Vec<usize>> = FnvHashMap::default();
    let mut lexical_index: FnvHashMap<String, Vec<usize>> = FnvHashMap::default();
    let mut lexicon: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut parts_of_speech = HashSet::new();
    let mut feature_keys = HashMap::new();

    for (idx, prod) in productions.iter().enumerate() {
      lhs_index
        .entry(prod.lhs_name().to_string())
        .or_default()
        .push(idx);

      if let Some(first) = prod.rhs.first() {
        rhs_index.entry(first.clone()).or_default().push(idx);
      }

      if prod.is_lexical() {
        let word = prod.rhs[0].name().to_string();
        lexicon
          .entry(word.clone())
          .or_default()
          .insert(prod.lhs_name().to_string());
        lexical_index.entry(word).or_default().push(idx);
        parts_of_speech.insert(prod.lhs_name().to_string());
      }

      if let Some(features) = prod.features {
        feature_keys
          .entry(features)
          .or_insert_with(|| Rc::from(arena.fingerprint(features)));
      }
    }

    Self {
      start: start.into(),
      productions,
      lhs_index,
      rhs_index,
      lexical_index,
      lexicon,
      parts_of_speech,
      feature_keys,
      required: RequiredFeatures::new(),
      arena,
    }
  }

  /// Like `new`, but every production must carry a weight in [0, 1], and the weights
  /// of each lhs must sum to 1 within EPSILON
  pub fn new_weighted(
    start: impl Into<String>,
    productions: Vec<Production>,
    arena: NodeArena,
  ) -> Result<Self, GrammarError> {
    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for prod in productions.iter() {
      let weight = prod.weight.ok_or_else(|| GrammarError::MissingWeight {
        production: prod.to_string(),
      })?;
      if !(0.0..=1.0).contains(&weight) {
        return Err(GrammarError::InvalidWeight {
          production: prod.to_string(),
          weight,
        });
      }
      *totals.entry(prod.lhs_name()).or_insert(0.0) += weight;
    }

    for (lhs, &total) in totals.iter() {
      if !((1.0 - EPSILON) < total && total < (1.0 + EPSILON)) {
        return Err(GrammarError::WeightsDoNotSumToOne {
          lhs: lhs.to_string(),
          total,
        });
      }
    }

    Ok(Self::new(start, productions, arena))
  }

  /// Estimates a weighted grammar from a multiset of productions, such as the productions
  /// read off a treebank: weight(A -> B C) = count(A -> B C) / count(A -> *).
  /// Any weights already on `productions` are ignored.
  pub fn induce(
    start: impl Into<String>,
    productions: Vec<Production>,
    arena: NodeArena,
  ) -> Result<Self, GrammarError> {
    let mut counts: IndexMap<Production, usize> = IndexMap::new();
    let mut lhs_counts: HashMap<Symbol, usize> = HashMap::new();
    for mut prod in productions {
      prod.weight = None;
      *lhs_counts.entry(prod.lhs.clone()).or_insert(0) += 1;
      *counts.entry(prod).or_insert(0) += 1;
    }

    let weighted = counts
      .into_iter()
      .map(|(prod, count)| {
        let total = lhs_counts.get(&prod.lhs).copied().unwrap_or(count);
        prod.with_weight(count as f64 / total as f64)
      })
      .collect();

    Self::new_weighted(start, weighted, arena)
  }

  /// Declares features every category carries, see `RequiredFeatures`
  pub fn with_required_features(mut self, required: RequiredFeatures) -> Self {
    self.required = required;
    self
  }

  pub fn start(&self) -> &str {
    &self.start
  }

  pub fn start_symbol(&self) -> Symbol {
    Symbol::nonterminal(self.start.clone())
  }

  pub fn len(&self) -> usize {
    self.productions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.productions.is_empty()
  }

  /// Productions with the given lhs and/or first rhs element, in declaration order
  pub fn productions(&self, lhs: Option<&str>, rhs_first: Option<&Symbol>) -> Vec<&Rc<Production>> {
    let candidates: Box<dyn Iterator<Item = usize> + '_> = match (lhs, rhs_first) {
      (Some(lhs), _) => Box::new(self.lhs_index.get(lhs).into_iter().flatten().copied()),
      (None, Some(first)) => Box::new(self.rhs_index.get(first).into_iter().flatten().copied()),
      (None, None) => Box::new(0..self.productions.len()),
    };

    candidates
      .map(|idx| &self.productions[idx])
      .filter(|prod| rhs_first.is_none() || prod.rhs.first() == rhs_first)
      .collect()
  }

  /// Word to the categories that rewrite straight to it, or None for a grammar
  /// without lexical productions
  pub fn lexicon(&self) -> Option<&HashMap<String, BTreeSet<String>>> {
    if self.lexicon.is_empty() {
      None
    } else {
      Some(&self.lexicon)
    }
  }

  /// True if some lexical production rewrites `nonterminal` to a word
  pub fn is_part_of_speech(&self, nonterminal: &str) -> bool {
    self.parts_of_speech.contains(nonterminal)
  }

  /// The lexical productions for `word`, in declaration order
  pub fn lexical_productions(&self, word: &str) -> impl Iterator<Item = &Rc<Production>> + '_ {
    self
      .lexical_index
      .get(word)
      .into_iter()
      .flatten()
      .map(move |&idx| &self.productions[idx])
  }

  pub fn arena(&self) -> &NodeArena {
    &self.arena
  }

  /// The feature structure of a production with its canonical key
  pub fn features_of(&self, production: &Production) -> Option<Features> {
    let idx = production.features?;
    let key = self.feature_keys.get(&idx)?;
    Some(Features::new(idx, key.clone()))
  }

  pub fn required_features(&self) -> &RequiredFeatures {
    &self.required
  }

  pub fn is_weighted(&self) -> bool {
    !self.productions.is_empty() && self.productions.iter().all(|p| p.weight.is_some())
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "//** start: {}", self.start)?;
    if !self.required.is_empty() {
      write!(f, "//** required:")?;
      for name in self.required.iter() {
        write!(f, " {}", name)?;
      }
      writeln!(f)?;
    }

    for prod in self.productions.iter() {
      write!(f, "{}", prod)?;
      if let Some(features) = prod.features {
        write!(f, " {}", self.arena.display(features))?;
      }
      writeln!(f)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn nt(s: &str) -> Symbol {
    Symbol::nonterminal(s)
  }

  fn t(s: &str) -> Symbol {
    Symbol::terminal(s)
  }

  fn toy() -> Grammar {
    Grammar::new(
      "S",
      vec![
        Production::new("S", vec![nt("NP"), nt("VP")]),
        Production::new("NP", vec![nt("Det"), nt("N")]),
        Production::new("NP", vec![nt("NP"), nt("PP")]),
        Production::new("VP", vec![nt("V"), nt("NP")]),
        Production::new("Det", vec![t("the")]),
        Production::new("N", vec![t("saw")]),
        Production::new("V", vec![t("saw")]),
      ],
      NodeArena::new(),
    )
  }

  #[test]
  fn test_productions_filtering() {
    let g = toy();
    assert_eq!(g.len(), 7);
    assert_eq!(g.productions(None, None).len(), 7);

    let nps = g.productions(Some("NP"), None);
    assert_eq!(nps.len(), 2);
    assert_eq!(nps[0].rhs, vec![nt("Det"), nt("N")]);
    assert_eq!(nps[1].rhs, vec![nt("NP"), nt("PP")]);

    let np_first = g.productions(None, Some(&nt("NP")));
    assert_eq!(np_first.len(), 2);
    assert_eq!(np_first[0].lhs_name(), "S");
    assert_eq!(np_first[1].lhs_name(), "NP");

    let both = g.productions(Some("NP"), Some(&nt("NP")));
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].rhs[1], nt("PP"));

    assert!(g.productions(Some("PP"), None).is_empty());
    assert!(g.productions(Some("S"), Some(&nt("VP"))).is_empty());
  }

  #[test]
  fn test_lexicon() {
    let g = toy();
    let lexicon = g.lexicon().unwrap();
    let saw = lexicon.get("saw").unwrap();
    assert_eq!(saw.iter().collect::<Vec<_>>(), vec!["N", "V"]);
    assert!(g.is_part_of_speech("Det"));
    assert!(!g.is_part_of_speech("NP"));
    assert_eq!(g.lexical_productions("saw").count(), 2);
    assert_eq!(g.lexical_productions("telescope").count(), 0);

    let no_words = Grammar::new(
      "S",
      vec![Production::new("S", vec![nt("A")])],
      NodeArena::new(),
    );
    assert!(no_words.lexicon().is_none());
  }

  #[test]
  fn test_weighted_validation() {
    let ok = Grammar::new_weighted(
      "S",
      vec![
        Production::new("S", vec![nt("A")]).with_weight(0.6),
        Production::new("S", vec![nt("B")]).with_weight(0.395),
        Production::new("A", vec![t("a")]).with_weight(1.0),
        Production::new("B", vec![t("b")]).with_weight(1.0),
      ],
      NodeArena::new(),
    );
    assert!(ok.unwrap().is_weighted());

    let short = Grammar::new_weighted(
      "S",
      vec![
        Production::new("S", vec![nt("A")]).with_weight(0.6),
        Production::new("S", vec![nt("B")]).with_weight(0.3),
      ],
      NodeArena::new(),
    );
    match short {
      Err(GrammarError::WeightsDoNotSumToOne { lhs, total }) => {
        assert_eq!(lhs, "S");
        assert!((total - 0.9).abs() < 1e-9);
      }
      other => panic!("unexpected {:?}", other),
    }

    let missing = Grammar::new_weighted(
      "S",
      vec![Production::new("S", vec![nt("A")])],
      NodeArena::new(),
    );
    assert_eq!(
      missing.unwrap_err(),
      GrammarError::MissingWeight {
        production: "S -> A".to_string()
      }
    );

    let negative = Grammar::new_weighted(
      "S",
      vec![
        Production::new("S", vec![nt("A")]).with_weight(1.5),
        Production::new("S", vec![nt("B")]).with_weight(-0.5),
      ],
      NodeArena::new(),
    );
    assert!(matches!(negative, Err(GrammarError::InvalidWeight { .. })));
  }

  #[test]
  fn test_induce() {
    let observed = vec![
      Production::new("S", vec![nt("NP"), nt("VP")]),
      Production::new("NP", vec![t("john")]),
      Production::new("NP", vec![t("john")]),
      Production::new("NP", vec![t("mary")]),
      Production::new("S", vec![nt("NP"), nt("VP")]),
      Production::new("NP", vec![nt("Det"), nt("N")]).with_weight(0.2),
    ];
    let g = Grammar::induce("S", observed, NodeArena::new()).unwrap();
    assert_eq!(g.len(), 4);

    let nps = g.productions(Some("NP"), None);
    assert_eq!(nps[0].weight, Some(0.5));
    assert_eq!(nps[1].weight, Some(0.25));
    assert_eq!(nps[2].weight, Some(0.25));
    assert_eq!(g.productions(Some("S"), None)[0].weight, Some(1.0));
  }

  #[test]
  fn test_display() {
    let g = Grammar::new(
      "S",
      vec![
        Production::new("S", vec![nt("NP"), nt("VP")]),
        Production::new("NP", vec![t("john")]).with_weight(1.0),
      ],
      NodeArena::new(),
    );
    assert_eq!(
      g.to_string(),
      "//** start: S\nS -> NP VP\nNP -> 'john' [1]\n"
    );
  }
}
