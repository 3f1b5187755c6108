use crate::chart::Chart;
use crate::earley::{seed, ChartRule, Completer};
use crate::edge::{Edge, EdgeRef};
use crate::grammar::Grammar;

/// Starts every production whose first rhs symbol a complete edge provides, at the
/// start of that edge. Words are complete edges too, so this also covers the lexicon.
pub struct BottomUpPredictor;

impl ChartRule for BottomUpPredictor {
  fn name(&self) -> &'static str {
    "bottom-up predictor"
  }

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge> {
    if !edge.is_complete() {
      return Vec::new();
    }

    grammar
      .productions(None, Some(edge.lhs()))
      .into_iter()
      .map(|p| seed(chart, grammar, p, edge.start()))
      .collect()
  }
}

/// Like [`BottomUpPredictor`], but moves the new edge straight over its left corner, so
/// dot-0 edges never reach the chart
pub struct LeftCornerPredictor;

impl ChartRule for LeftCornerPredictor {
  fn name(&self) -> &'static str {
    "left-corner predictor"
  }

  fn apply(&self, chart: &mut Chart, grammar: &Grammar, edge: &EdgeRef) -> Vec<Edge> {
    if !edge.is_complete() {
      return Vec::new();
    }

    let mut found = Vec::new();
    for production in grammar.productions(None, Some(edge.lhs())) {
      let waiting = EdgeRef::new(seed(chart, grammar, production, edge.start()));
      if let Some(combined) = Completer.combine(chart, grammar, &waiting, edge) {
        found.push(combined);
      }
    }
    found
  }
}

/// Empty productions are never anyone's left corner, so they are placed at every
/// position up front
pub struct EmptyPredictor;

impl ChartRule for EmptyPredictor {
  fn name(&self) -> &'static str {
    "empty predictor"
  }

  fn apply(&self, _chart: &mut Chart, _grammar: &Grammar, _edge: &EdgeRef) -> Vec<Edge> {
    Vec::new()
  }

  fn initial_edges(&self, chart: &mut Chart, grammar: &Grammar) -> Vec<Edge> {
    let empty = grammar
      .productions(None, None)
      .into_iter()
      .filter(|p| p.is_empty())
      .collect::<Vec<_>>();

    let mut edges = Vec::new();
    for index in 0..=chart.num_leaves() {
      for production in empty.iter() {
        edges.push(seed(chart, grammar, production, index));
      }
    }
    edges
  }
}

/// Builds constituents from the words up, predicting a rule once its first child is found
pub fn bottom_up_strategy() -> Vec<Box<dyn ChartRule>> {
  vec![Box::new(EmptyPredictor), Box::new(BottomUpPredictor), Box::new(Completer)]
}

/// Bottom-up, with prediction and the first completion done in one step
pub fn left_corner_strategy() -> Vec<Box<dyn ChartRule>> {
  vec![Box::new(EmptyPredictor), Box::new(LeftCornerPredictor), Box::new(Completer)]
}
