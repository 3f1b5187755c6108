use std::error::Error;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, debug_span, trace};

use crate::chart::{Chart, Insertion};
use crate::edge::{child_label, Edge, EdgeRef, Features, LR0, TreeEdge, CHILD_PREFIX};
use crate::featurestructure::{NodeArena, NodeIdx};
use crate::forest::ParseTree;
use crate::grammar::Grammar;
use crate::rules::{Production, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
  /// The agenda was still busy after this many steps
  StepLimitExceeded { limit: usize },
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::StepLimitExceeded { limit } => {
        write!(f, "gave up after {} parser steps", limit)
      }
    }
  }
}

impl Error for ParseError {}

#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
  /// Drop edges that a more general edge already in the chart covers
  pub subsumption: bool,
  /// Maximum number of agenda items to process
  pub step_limit: Option<usize>,
}

impl ParserOptions {
  pub fn with_subsumption(mut self, subsumption: bool) -> Self {
    self.subsumption = subsumption;
    self
  }

  pub fn with_step_limit(mut self, limit: usize) -> Self {
    self.step_limit = Some(limit);
    self
  }
}

/// An inference rule: given an edge just added to the chart, the edges it licenses.
/// Rules may allocate in the chart's arena but never insert edges themselves.
pub trait ChartRule {
  fn name(&self) -> &'static str;

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge>;

  /// Edges the rule adds once, before the agenda runs
  fn initial_edges(&self, _chart: &mut Chart, _grammar: &Grammar) -> Vec<Edge> {
    Vec::new()
  }
}

/// The features a complete edge exposes to its parents: the production's own
/// category, without the per-child arcs, with its variables renamed apart
fn category_features(arena: &mut NodeArena, idx: NodeIdx) -> Features {
  let category = arena.without_arcs(idx, CHILD_PREFIX);
  let fresh = arena.freshen(category);
  let key = Rc::from(arena.fingerprint(fresh));
  Features::new(fresh, key)
}

fn keyed(arena: &NodeArena, idx: NodeIdx) -> Features {
  Features::new(idx, Rc::from(arena.fingerprint(idx)))
}

/// A dot-0 edge for `production` at `index`. Empty productions are complete at once,
/// so they get their category features right away.
pub(crate) fn seed(
  chart: &mut Chart,
  grammar: &Grammar,
  production: &Rc<Production>,
  index: usize,
) -> Edge {
  let features = match grammar.features_of(production) {
    Some(features) if production.is_empty() => {
      Some(category_features(chart.arena_mut(), features.idx))
    }
    features => features,
  };
  Edge::seed(production, index, features)
}

/// The edges every parse starts from: one per word, and a seed for each production of
/// the start symbol at position 0
pub struct Initializer;

impl Initializer {
  pub fn initial_edges(&self, chart: &mut Chart, grammar: &Grammar) -> Vec<Edge> {
    let mut edges = chart
      .leaves()
      .iter()
      .enumerate()
      .map(|(idx, word)| Edge::leaf(word, idx))
      .collect::<Vec<_>>();

    for production in grammar.productions(Some(grammar.start()), None) {
      edges.push(seed(chart, grammar, production, 0));
    }

    edges
  }
}

/// Hypothesizes the phrasal productions for a nonterminal an edge is waiting on
pub struct Predictor;

impl ChartRule for Predictor {
  fn name(&self) -> &'static str {
    "predictor"
  }

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge> {
    let Some(Symbol::Nonterminal(needed)) = edge.next_symbol() else {
      return Vec::new();
    };

    grammar
      .productions(Some(needed), None)
      .into_iter()
      .filter(|p| !p.is_lexical())
      .map(|p| seed(chart, grammar, p, edge.end()))
      .collect()
  }
}

/// Looks the next word up in the lexicon when an edge is waiting on a part of speech
pub struct Scanner;

impl ChartRule for Scanner {
  fn name(&self) -> &'static str {
    "scanner"
  }

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge> {
    let Some(Symbol::Nonterminal(needed)) = edge.next_symbol() else {
      return Vec::new();
    };
    if !grammar.is_part_of_speech(needed) {
      return Vec::new();
    }
    let index = edge.end();
    let Some(word) = chart.leaf(index).map(str::to_string) else {
      return Vec::new();
    };

    let expected = edge
      .features()
      .and_then(|f| chart.arena().arc(f.idx, &child_label(edge.dot())));
    let required = grammar.required_features();

    let mut found = Vec::new();
    for production in grammar.lexical_productions(&word) {
      if production.lhs_name() != needed {
        continue;
      }

      let category = grammar.features_of(production).map(|f| f.idx);
      let features = match (expected, category) {
        (None, None) => None,
        (expected, category) => {
          let arena = chart.arena_mut();
          let category = match category {
            Some(idx) => arena.freshen(idx),
            None => arena.alloc_edged(),
          };
          let unified = match expected {
            Some(expected) => arena.unify_with_required(expected, category, required),
            None => arena.with_required_defaults(category, required),
          };
          match unified {
            Ok(idx) => Some(category_features(arena, idx)),
            Err(e) => {
              trace!(word = %word, production = %production, "scan blocked: {}", e);
              continue;
            }
          }
        }
      };

      found.push(Edge::Tree(TreeEdge {
        lr0: LR0::new(production).advance(),
        span: (index, index + 1),
        children: vec![Edge::leaf(&word, index).description()],
        features,
      }));
    }

    found
  }
}

/// The fundamental rule, run from whichever side was just added: an edge waiting on
/// `B` at `j` combines with a complete `B` edge starting at `j`
pub struct Completer;

impl Completer {
  pub(crate) fn combine(
    &self,
    chart: &mut Chart,
    grammar: &Grammar,
    waiting: &EdgeRef,
    found: &EdgeRef,
  ) -> Option<Edge> {
    let Edge::Tree(left) = waiting.edge() else {
      return None;
    };

    let required = grammar.required_features();
    let features = match (left.features.as_ref(), found.features()) {
      (None, _) => None,
      (Some(lf), _) if found.is_leaf() => Some(lf.idx),
      (Some(lf), None) if required.is_empty() => Some(lf.idx),
      (Some(lf), rf) => {
        let label = child_label(left.lr0.pos);
        let arena = chart.arena_mut();
        // a featureless category still lacks every required feature
        let rf = match rf {
          Some(rf) => rf.idx,
          None => arena.alloc_edged(),
        };
        match arena.unify_slot(lf.idx, &label, rf, required) {
          Ok(idx) => Some(idx),
          Err(e) => {
            trace!(waiting = %waiting, found = %found, "completion blocked: {}", e);
            return None;
          }
        }
      }
    };

    let lr0 = left.lr0.advance();
    let features = features.map(|idx| {
      if lr0.is_complete() {
        category_features(chart.arena_mut(), idx)
      } else {
        keyed(chart.arena(), idx)
      }
    });

    let mut children = left.children.clone();
    children.push(found.description());

    Some(Edge::Tree(TreeEdge {
      lr0,
      span: (left.span.0, found.end()),
      children,
      features,
    }))
  }
}

impl ChartRule for Completer {
  fn name(&self) -> &'static str {
    "completer"
  }

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge> {
    if edge.is_complete() {
      chart
        .incomplete_edges(Some(edge.start()), Some(edge.lhs()))
        .iter()
        .filter_map(|waiting| self.combine(chart, grammar, waiting, edge))
        .collect()
    } else if let Some(next) = edge.next_symbol() {
      chart
        .complete_edges(Some(edge.end()), Some(next))
        .iter()
        .filter_map(|found| self.combine(chart, grammar, edge, found))
        .collect()
    } else {
      Vec::new()
    }
  }
}

pub fn default_strategy() -> Vec<Box<dyn ChartRule>> {
  vec![Box::new(Predictor), Box::new(Scanner), Box::new(Completer)]
}

/// Agenda-driven Earley parsing over a feature grammar
pub struct EarleyParser<'g> {
  grammar: &'g Grammar,
  strategy: Vec<Box<dyn ChartRule>>,
  options: ParserOptions,
}

impl<'g> EarleyParser<'g> {
  pub fn new(grammar: &'g Grammar) -> Self {
    Self {
      grammar,
      strategy: default_strategy(),
      options: ParserOptions::default(),
    }
  }

  pub fn with_options(mut self, options: ParserOptions) -> Self {
    self.options = options;
    self
  }

  pub fn with_strategy(mut self, strategy: Vec<Box<dyn ChartRule>>) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn grammar(&self) -> &'g Grammar {
    self.grammar
  }

  /// Runs the rules to a fixpoint and returns the filled chart
  pub fn chart_parse<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Chart, ParseError> {
    let span = debug_span!("chart_parse", tokens = tokens.len());
    let _enter = span.enter();

    let mut chart =
      Chart::new(tokens, self.grammar.arena().clone()).with_subsumption(self.options.subsumption);

    let mut agenda = Initializer
      .initial_edges(&mut chart, self.grammar)
      .into_iter()
      .map(|e| (e, "initializer"))
      .collect::<Vec<_>>();
    for r in self.strategy.iter() {
      let name = r.name();
      agenda.extend(r.initial_edges(&mut chart, self.grammar).into_iter().map(|e| (e, name)));
    }

    let mut steps = 0;
    while let Some((edge, rule)) = agenda.pop() {
      steps += 1;
      if let Some(limit) = self.options.step_limit {
        if steps > limit {
          debug!(limit, edges = chart.len(), "step limit exceeded");
          return Err(ParseError::StepLimitExceeded { limit });
        }
      }

      let edge = match chart.insert_edge(edge) {
        Insertion::Inserted(edge) => edge,
        Insertion::Duplicate => continue,
        Insertion::Subsumed => {
          trace!(rule, "subsumed");
          continue;
        }
      };
      trace!(rule, "{}", chart.display_edge(&edge));

      for r in self.strategy.iter() {
        let name = r.name();
        agenda.extend(r.apply(&mut chart, self.grammar, &edge).into_iter().map(|e| (e, name)));
      }
    }

    debug!(steps, edges = chart.len(), "chart complete");
    Ok(chart)
  }

  /// Every distinct tree for the start symbol over the whole input
  pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<ParseTree>, ParseError> {
    let chart = self.chart_parse(tokens)?;
    let trees = chart.parses(self.grammar.start()).into_iter().collect();
    Ok(trees)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::featurestructure::SerializedNode;

  fn bracketed(trees: &[ParseTree]) -> Vec<String> {
    let mut out = trees.iter().map(|t| t.bracketed()).collect::<Vec<_>>();
    out.sort();
    out
  }

  #[test]
  fn test_plain_cfg() {
    let g: Grammar = r#"
      S -> NP VP;
      NP -> 'John';
      VP -> 'runs';
    "#
    .parse()
    .unwrap();

    let parser = EarleyParser::new(&g);
    let trees = parser.parse(&["John", "runs"]).unwrap();
    assert_eq!(bracketed(&trees), vec!["(S (NP John) (VP runs))"]);

    assert!(parser.parse(&["runs", "John"]).unwrap().is_empty());
    assert!(parser.parse(&["John"]).unwrap().is_empty());
    assert!(parser.parse(&["John", "runs", "runs"]).unwrap().is_empty());
  }

  #[test]
  fn test_pp_attachment() {
    let g: Grammar = include_str!("../grammars/pp-attachment.fgr").parse().unwrap();
    let parser = EarleyParser::new(&g);

    let trees = parser
      .parse(&["I", "saw", "the", "man", "with", "the", "telescope"])
      .unwrap();
    assert_eq!(
      bracketed(&trees),
      vec![
        "(S (NP I) (VP (V saw) (NP (NP (Det the) (N man)) (PP (P with) (NP (Det the) (N telescope))))))",
        "(S (NP I) (VP (VP (V saw) (NP (Det the) (N man))) (PP (P with) (NP (Det the) (N telescope)))))",
      ]
    );
  }

  #[test]
  fn test_terminals_inside_rules() {
    let g: Grammar = r#"
      S -> NP VP;
      NP -> 'they';
      VP -> V 'to' VP | V;
      V -> want | sleep;
    "#
    .parse()
    .unwrap();

    let trees = EarleyParser::new(&g).parse(&["they", "want", "to", "sleep"]).unwrap();
    assert_eq!(
      bracketed(&trees),
      vec!["(S (NP they) (VP (V want) to (VP (V sleep))))"]
    );
  }

  #[test]
  fn test_agreement() {
    let g: Grammar = include_str!("../grammars/agreement.fgr").parse().unwrap();
    let parser = EarleyParser::new(&g);

    let trees = parser.parse(&["these", "dogs", "eat", "the", "cookie"]).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(
      trees[0].bracketed(),
      "(S (NP (Det these) (N dogs)) (VP (TV eat) (NP (Det the) (N cookie))))"
    );

    assert!(parser.parse(&["these", "dog", "eats", "the", "cookie"]).unwrap().is_empty());
    assert!(parser.parse(&["this", "dog", "eat", "the", "cookie"]).unwrap().is_empty());
    assert_eq!(parser.parse(&["john", "barks"]).unwrap().len(), 1);
    assert!(parser.parse(&["john", "bark"]).unwrap().is_empty());
  }

  #[test]
  fn test_root_features() {
    let g: Grammar = include_str!("../grammars/agreement.fgr").parse().unwrap();
    let chart = EarleyParser::new(&g)
      .chart_parse(&["the", "dogs", "bark"])
      .unwrap();

    let roots = chart.root_edges("S");
    assert_eq!(roots.len(), 1);
    let features = roots[0].features().unwrap();
    let fs = SerializedNode::from_node(chart.arena(), features.idx).unwrap();
    assert_eq!(fs.get_path_str(&["agr"]), Some("pl"));
    assert!(fs.get_path(&["child-0"]).is_none());
  }

  #[test]
  fn test_variables_renamed_apart() {
    // both NPs come from the same rule, so their ?n must not be confused
    let g: Grammar = r#"
      S -> NP[num: sg] V NP[num: pl];
      NP[num: ?n] -> Det[num: ?n] N[num: ?n];
      Det -> the;
      N[num: sg] -> dog;
      N[num: pl] -> cats;
      V -> sees;
    "#
    .parse()
    .unwrap();
    let parser = EarleyParser::new(&g);
    assert_eq!(parser.parse(&["the", "dog", "sees", "the", "cats"]).unwrap().len(), 1);
    assert!(parser.parse(&["the", "cats", "sees", "the", "dog"]).unwrap().is_empty());
  }

  #[test]
  fn test_epsilon_and_left_recursion() {
    let g: Grammar = r#"
      S -> A S B;
      S -> ;
      A -> a;
      B -> b;
      L -> L x;
      L -> x;
    "#
    .parse()
    .unwrap();
    let parser = EarleyParser::new(&g);
    assert_eq!(bracketed(&parser.parse(&[] as &[&str]).unwrap()), vec!["(S)"]);
    assert_eq!(
      bracketed(&parser.parse(&["a", "a", "b", "b"]).unwrap()),
      vec!["(S (A a) (S (A a) (S) (B b)) (B b))"]
    );
    assert!(parser.parse(&["a", "b", "b"]).unwrap().is_empty());

    let g: Grammar = "%start L; L -> L x; L -> x;".parse().unwrap();
    let trees = EarleyParser::new(&g).parse(&["x", "x", "x"]).unwrap();
    assert_eq!(bracketed(&trees), vec!["(L (L (L x) x) x)"]);
  }

  #[test]
  fn test_required_features() {
    let src = r#"
      %required case;
      S -> Pro Verb;
      Pro[case: nom] -> he;
      Pro -> it;
      Verb -> runs;
      O -> Pro[case: acc];
    "#;
    let g: Grammar = src.parse().unwrap();
    let parser = EarleyParser::new(&g);
    // "it" has no case at all, which the absent default keeps apart from nom
    assert_eq!(parser.parse(&["he", "runs"]).unwrap().len(), 1);
    assert_eq!(parser.parse(&["it", "runs"]).unwrap().len(), 1);

    let g: Grammar = format!("{}\n%start O;", src).parse().unwrap();
    let parser = EarleyParser::new(&g);
    assert!(parser.parse(&["he"]).unwrap().is_empty());
    assert!(parser.parse(&["it"]).unwrap().is_empty());
  }

  #[test]
  fn test_chart_dedup_during_parse() {
    let g: Grammar = include_str!("../grammars/pp-attachment.fgr").parse().unwrap();
    let mut chart = EarleyParser::new(&g)
      .chart_parse(&["I", "saw", "the", "man"])
      .unwrap();

    let len = chart.len();
    let edges = chart.edges().map(|e| e.edge().clone()).collect::<Vec<_>>();
    for edge in edges {
      assert!(!chart.insert(edge));
    }
    assert_eq!(chart.len(), len);
    assert_eq!(chart.root_edges("S").len(), 1);
  }

  #[test]
  fn test_step_limit() {
    let g: Grammar = include_str!("../grammars/pp-attachment.fgr").parse().unwrap();
    let tokens = ["I", "saw", "the", "man", "with", "the", "telescope"];

    let limited = EarleyParser::new(&g).with_options(ParserOptions::default().with_step_limit(10));
    assert_eq!(
      limited.parse(&tokens).unwrap_err(),
      ParseError::StepLimitExceeded { limit: 10 }
    );

    let roomy =
      EarleyParser::new(&g).with_options(ParserOptions::default().with_step_limit(100_000));
    assert_eq!(roomy.parse(&tokens).unwrap().len(), 2);
  }

  #[test]
  fn test_subsumption_keeps_parses() {
    let g: Grammar = include_str!("../grammars/agreement.fgr").parse().unwrap();
    let tokens = ["the", "dogs", "eat", "the", "cookie"];

    let plain = EarleyParser::new(&g).chart_parse(&tokens).unwrap();
    let pruned = EarleyParser::new(&g)
      .with_options(ParserOptions::default().with_subsumption(true))
      .chart_parse(&tokens)
      .unwrap();

    assert!(pruned.len() <= plain.len());
    let trees = pruned.parses("S").into_iter().collect::<Vec<_>>();
    assert_eq!(trees.len(), 1);
  }

  #[test]
  fn test_custom_strategy() {
    let g: Grammar = "S -> NP VP; NP -> 'John'; VP -> 'runs';".parse().unwrap();
    // without the scanner, parts of speech are never found
    let parser = EarleyParser::new(&g)
      .with_strategy(vec![Box::new(Predictor), Box::new(Completer)]);
    assert!(parser.parse(&["John", "runs"]).unwrap().is_empty());
  }
}
