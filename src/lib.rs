#[macro_use]
extern crate lazy_static;

pub mod bottom_up;
pub mod chart;
pub mod earley;
pub mod edge;
pub mod featurestructure;
pub mod forest;
pub mod grammar;
pub mod parse_grammar;
pub mod rules;
pub mod syntree;
pub mod utils;

pub use crate::bottom_up::{bottom_up_strategy, left_corner_strategy};
pub use crate::chart::{Chart, Insertion};
pub use crate::earley::{default_strategy, ChartRule, EarleyParser, ParseError, ParserOptions};
pub use crate::edge::{Edge, EdgeRef};
pub use crate::featurestructure::{NodeArena, NodeIdx, RequiredFeatures, SerializedNode};
pub use crate::forest::{ParseForest, ParseTree};
pub use crate::grammar::{Grammar, GrammarError};
pub use crate::rules::{Production, Symbol};
pub use crate::utils::Err;

impl Grammar {
  /// Fills a chart for `input` with the default rules and options
  pub fn parse_chart<S: AsRef<str>>(&self, input: &[S]) -> Result<Chart, ParseError> {
    EarleyParser::new(self).chart_parse(input)
  }

  /// Each distinct tree over all of `input`, with the features of the start-symbol
  /// edges covering it
  pub fn parse<S: AsRef<str>>(
    &self,
    input: &[S],
  ) -> Result<(Vec<ParseTree>, Vec<SerializedNode>), ParseError> {
    let chart = self.parse_chart(input)?;
    let trees = chart.parses(self.start()).into_iter().collect::<Vec<_>>();
    let features = chart
      .root_edges(self.start())
      .iter()
      .filter_map(|e| e.features())
      .filter_map(|f| SerializedNode::from_node(chart.arena(), f.idx))
      .collect();
    Ok((trees, features))
  }

  /// The most probable tree over all of `input` and its probability, for a weighted grammar
  pub fn best_parse<S: AsRef<str>>(
    &self,
    input: &[S],
  ) -> Result<Option<(ParseTree, f64)>, ParseError> {
    let chart = self.parse_chart(input)?;
    Ok(chart.parses(self.start()).best())
  }
}

#[test]
fn test_unification_blocking() {
  let g: Grammar = r#"
    S -> N[ case: nom, pron: #1 ] TV N[ case: acc, needs_pron: #1 ];
    TV -> likes;
    N[ case: nom, pron: she ] -> she;
    N[ case: nom, pron: he ] -> he;
    N[ case: acc, pron: he ] -> him;
    N[ case: acc, pron: ref, needs_pron: he ] -> himself;
  "#
  .parse()
  .unwrap();

  let count = |s: &str| g.parse(&s.split(' ').collect::<Vec<_>>()).unwrap().0.len();

  assert_eq!(count("he likes himself"), 1);
  assert_eq!(count("he likes him"), 1);
  assert_eq!(count("she likes him"), 1);

  assert_eq!(count("himself likes himself"), 0);
  assert_eq!(count("she likes himself"), 0);
  assert_eq!(count("himself likes him"), 0);
}

#[test]
fn test_root_features_reported() {
  let g: Grammar = r#"
    S[ tense: #t ] -> N V[ tense: #t ];
    N -> they;
    V[ tense: past ] -> slept;
    V[ tense: present ] -> sleep;
  "#
  .parse()
  .unwrap();

  let (trees, features) = g.parse(&["they", "slept"]).unwrap();
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].bracketed(), "(S (N they) (V slept))");
  assert_eq!(features.len(), 1);
  assert_eq!(features[0].get_path_str(&["tense"]), Some("past"));
}

#[test]
fn test_best_parse() {
  let g: Grammar = include_str!("../grammars/no-features.fgr").parse().unwrap();
  let (tree, p) = g.best_parse(&["the", "dog", "sleeps"]).unwrap().unwrap();
  assert_eq!(tree.bracketed(), "(S (NP (Det the) (N dog)) (VP (V sleeps)))");
  // 0.6 * 0.8 * 0.5 * 0.3 * 0.4
  assert!((p - 0.0288).abs() < 1e-9, "{}", p);

  assert!(g.best_parse(&["dog", "the"]).unwrap().is_none());
}

#[test]
fn test_rule_variables_ending_in_digits() {
  // renamed variables must never meet a rule's own ?pN, whatever N is
  for n in 0..60 {
    let g: Grammar = format!(
      "S[w: ?w, z: ?p{n}] -> A[w: ?w] B[v: ?p{n}]; A[w: ?p] -> a; B[v: x] -> b;"
    )
    .parse()
    .unwrap();

    let (trees, features) = g.parse(&["a", "b"]).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].get_path_str(&["z"]), Some("x"), "?p{}", n);
    assert_eq!(features[0].get_path_str(&["w"]), None, "?p{}", n);
  }
}
