use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::chart::Chart;
use crate::edge::{ChildDesc, EdgeRef};
use crate::rules::Symbol;
use crate::syntree::{Constituent, SynTree, Word};

/// Branches are labeled with category names, leaves with the words of the input
pub type ParseTree = SynTree<String, String>;

/// The derivation path from a root down to the slot being expanded. A slot that is
/// already on the path would only ever rebuild itself, so it yields no trees.
struct Path {
  desc: ChildDesc,
  parent: Option<Rc<Path>>,
}

fn on_path(path: &Option<Rc<Path>>, desc: &ChildDesc) -> bool {
  let mut cur = path.as_deref();
  while let Some(link) = cur {
    if &link.desc == desc {
      return true;
    }
    cur = link.parent.as_deref();
  }
  false
}

/// All trees the chart holds for one category over one span. Nothing is built until
/// the trees are iterated, so a highly ambiguous chart can be sampled cheaply.
pub struct ParseForest<'c> {
  chart: &'c Chart,
  desc: ChildDesc,
  exact: bool,
}

impl<'c> ParseForest<'c> {
  /// The trees for exactly the edges `desc` describes, features included
  pub fn new(chart: &'c Chart, desc: ChildDesc) -> Self {
    Self {
      chart,
      desc,
      exact: true,
    }
  }

  /// The trees for every edge matching `desc`'s category and span, whatever its features
  pub(crate) fn roots(chart: &'c Chart, desc: ChildDesc) -> Self {
    Self {
      chart,
      desc,
      exact: false,
    }
  }

  pub fn trees(&self) -> Trees<'c> {
    Trees::new(self.chart, self.desc.clone(), self.exact, None)
  }

  pub fn is_empty(&self) -> bool {
    self.trees().next().is_none()
  }

  /// The most probable tree and its probability, the product of the weights of the
  /// productions it uses. None if the grammar is unweighted or the forest is empty.
  pub fn best(&self) -> Option<(ParseTree, f64)> {
    let table = viterbi(self.chart)?;
    let (start, end) = self.desc.span;
    self
      .chart
      .edges_spanning(start, end, &self.desc.symbol)
      .iter()
      .filter(|e| !self.exact || e.features().map(|f| &f.key) == self.desc.key.as_ref())
      .filter_map(|e| table.get(&e.description()))
      .max_by(|a, b| a.0.total_cmp(&b.0))
      .map(|(p, tree)| (tree.clone(), *p))
  }
}

type ViterbiTable = HashMap<ChildDesc, (f64, ParseTree)>;

/// Best probability and tree for every complete category in the chart. Edges are
/// relaxed until nothing improves; weights are at most 1, so going round a cycle never
/// beats the path without it.
fn viterbi(chart: &Chart) -> Option<ViterbiTable> {
  let mut complete = Vec::new();
  for edge in chart.edges().filter(|e| !e.is_leaf() && e.is_complete()) {
    let weight = edge.production()?.weight?;
    complete.push((edge, weight));
  }

  let mut table = ViterbiTable::new();
  let mut changed = true;
  while changed {
    changed = false;
    for (edge, weight) in complete.iter() {
      let Some((p, children)) = best_children(&table, edge.children()) else {
        continue;
      };
      let p = weight * p;
      let desc = edge.description();
      if table.get(&desc).is_none_or(|(q, _)| p > *q) {
        let label = Constituent {
          value: edge.lhs().name().to_string(),
          span: edge.span(),
        };
        table.insert(desc, (p, SynTree::Branch(label, children)));
        changed = true;
      }
    }
  }

  Some(table)
}

/// None until every nonterminal slot has an entry
fn best_children(table: &ViterbiTable, slots: &[ChildDesc]) -> Option<(f64, Vec<ParseTree>)> {
  let mut p = 1.0;
  let mut trees = Vec::with_capacity(slots.len());
  for slot in slots {
    match &slot.symbol {
      Symbol::Terminal(token) => trees.push(SynTree::Leaf(Word {
        value: token.clone(),
        span: slot.span,
      })),
      Symbol::Nonterminal(_) => {
        let (q, tree) = table.get(slot)?;
        p *= q;
        trees.push(tree.clone());
      }
    }
  }
  Some((p, trees))
}

impl<'c> IntoIterator for &ParseForest<'c> {
  type Item = ParseTree;
  type IntoIter = Trees<'c>;

  fn into_iter(self) -> Self::IntoIter {
    self.trees()
  }
}

impl<'c> IntoIterator for ParseForest<'c> {
  type Item = ParseTree;
  type IntoIter = Trees<'c>;

  fn into_iter(self) -> Self::IntoIter {
    self.trees()
  }
}

/// Lazily yields each distinct tree for one slot, trying the chart's matching edges in turn
pub struct Trees<'c> {
  chart: &'c Chart,
  path: Option<Rc<Path>>,
  leaf: Option<ParseTree>,
  candidates: std::vec::IntoIter<EdgeRef>,
  current: Option<Expansion<'c>>,
  seen: HashSet<ParseTree>,
}

impl<'c> Trees<'c> {
  fn new(chart: &'c Chart, desc: ChildDesc, exact: bool, parent: Option<Rc<Path>>) -> Self {
    let cyclic = on_path(&parent, &desc);
    let (start, end) = desc.span;

    let mut leaf = None;
    let mut candidates = Vec::new();
    if !cyclic {
      match &desc.symbol {
        Symbol::Terminal(token) => {
          if end == start + 1 && chart.leaf(start) == Some(token.as_str()) {
            leaf = Some(SynTree::Leaf(Word {
              value: token.clone(),
              span: desc.span,
            }));
          }
        }
        Symbol::Nonterminal(_) => {
          candidates = chart
            .edges_spanning(start, end, &desc.symbol)
            .into_iter()
            .filter(|e| !exact || e.features().map(|f| &f.key) == desc.key.as_ref())
            .collect();
        }
      }
    }

    Self {
      chart,
      path: Some(Rc::new(Path { desc, parent })),
      leaf,
      candidates: candidates.into_iter(),
      current: None,
      seen: HashSet::new(),
    }
  }
}

impl Iterator for Trees<'_> {
  type Item = ParseTree;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(leaf) = self.leaf.take() {
      return Some(leaf);
    }

    loop {
      if let Some(expansion) = self.current.as_mut() {
        match expansion.next() {
          Some(tree) => {
            // different edges (e.g. differing only in features) can give the same tree
            if self.seen.insert(tree.clone()) {
              return Some(tree);
            }
            continue;
          }
          None => self.current = None,
        }
      }

      let edge = self.candidates.next()?;
      self.current = Some(Expansion::new(self.chart, &edge, self.path.clone()));
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
  NotStarted,
  Running,
  Done,
}

/// Every combination of subtrees for one edge's children, enumerated odometer-style
/// with the last child turning fastest
struct Expansion<'c> {
  chart: &'c Chart,
  label: Constituent<String>,
  slots: Vec<ChildDesc>,
  path: Option<Rc<Path>>,
  cursors: Vec<Trees<'c>>,
  current: Vec<ParseTree>,
  progress: Progress,
}

impl<'c> Expansion<'c> {
  fn new(chart: &'c Chart, edge: &EdgeRef, path: Option<Rc<Path>>) -> Self {
    Self {
      chart,
      label: Constituent {
        value: edge.lhs().name().to_string(),
        span: edge.span(),
      },
      slots: edge.children().to_vec(),
      path,
      cursors: Vec::new(),
      current: Vec::new(),
      progress: Progress::NotStarted,
    }
  }

  fn cursor(&self, slot: usize) -> Trees<'c> {
    Trees::new(self.chart, self.slots[slot].clone(), true, self.path.clone())
  }

  /// Restarts the cursors of every slot from `from` on. False if one has nothing.
  fn restart_from(&mut self, from: usize) -> bool {
    self.cursors.truncate(from);
    self.current.truncate(from);
    for slot in from..self.slots.len() {
      let mut cursor = self.cursor(slot);
      match cursor.next() {
        Some(tree) => {
          self.cursors.push(cursor);
          self.current.push(tree);
        }
        None => return false,
      }
    }
    true
  }

  fn tree(&self) -> ParseTree {
    SynTree::Branch(self.label.clone(), self.current.clone())
  }
}

impl Iterator for Expansion<'_> {
  type Item = ParseTree;

  fn next(&mut self) -> Option<Self::Item> {
    match self.progress {
      Progress::Done => None,
      Progress::NotStarted => {
        if self.restart_from(0) {
          self.progress = Progress::Running;
          Some(self.tree())
        } else {
          self.progress = Progress::Done;
          None
        }
      }
      Progress::Running => {
        let mut slot = self.slots.len();
        loop {
          if slot == 0 {
            self.progress = Progress::Done;
            return None;
          }
          slot -= 1;
          if let Some(tree) = self.cursors[slot].next() {
            self.current[slot] = tree;
            break;
          }
        }

        if self.restart_from(slot + 1) {
          Some(self.tree())
        } else {
          self.progress = Progress::Done;
          None
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::earley::EarleyParser;
  use crate::grammar::Grammar;

  fn catalan(n: usize) -> usize {
    (0..n).fold(1, |c, i| c * 2 * (2 * i + 1) / (i + 2))
  }

  #[test]
  fn test_ambiguous_counts() {
    let g: Grammar = "S -> S S; S -> x;".parse().unwrap();
    let parser = EarleyParser::new(&g);

    for n in 1..=6 {
      let tokens = vec!["x"; n];
      let trees = parser.parse(&tokens).unwrap();
      assert_eq!(trees.len(), catalan(n - 1), "{} tokens", n);

      let distinct = trees.iter().collect::<HashSet<_>>();
      assert_eq!(distinct.len(), trees.len());
      for tree in trees.iter() {
        assert_eq!(tree.leaves().len(), n);
        assert_eq!(tree.span(), (0, n));
      }
    }
  }

  #[test]
  fn test_lazy() {
    let g: Grammar = "S -> S S; S -> x;".parse().unwrap();
    let chart = EarleyParser::new(&g).chart_parse(&vec!["x"; 12]).unwrap();

    let forest = chart.parses("S");
    assert!(!forest.is_empty());
    let first = forest.trees().take(3).collect::<Vec<_>>();
    assert_eq!(first.len(), 3);
    assert_ne!(first[0], first[1]);
  }

  #[test]
  fn test_unary_cycle_terminates() {
    let g: Grammar = "S -> A; A -> S; A -> x;".parse().unwrap();
    let trees = EarleyParser::new(&g).parse(&["x"]).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].bracketed(), "(S (A x))");
  }

  #[test]
  fn test_no_parse() {
    let g: Grammar = "S -> S S; S -> x;".parse().unwrap();
    let chart = EarleyParser::new(&g).chart_parse(&["x", "y"]).unwrap();
    assert!(chart.parses("S").is_empty());
    assert_eq!((&chart.parses("S")).into_iter().count(), 0);
    assert!(chart.parses("T").is_empty());
  }

  #[test]
  fn test_best_parse() {
    let g: Grammar = include_str!("../grammars/no-features.fgr").parse().unwrap();
    let chart = EarleyParser::new(&g)
      .chart_parse(&["Kim", "sees", "the", "cat"])
      .unwrap();
    let (tree, p) = chart.parses("S").best().unwrap();
    assert_eq!(tree.bracketed(), "(S (NP Kim) (VP (V sees) (NP (Det the) (N cat))))");
    // 0.4 * 0.7 * 0.6 * 0.6 * 0.8 * 0.5
    assert!((p - 0.04032).abs() < 1e-9, "{}", p);

    let chart = EarleyParser::new(&g).chart_parse(&["Kim", "sleeps"]).unwrap();
    let (_, p) = chart.parses("S").best().unwrap();
    assert!((p - 0.4 * 0.3 * 0.4).abs() < 1e-9, "{}", p);

    let chart = EarleyParser::new(&g).chart_parse(&["sleeps", "Kim"]).unwrap();
    assert!(chart.parses("S").best().is_none());
  }

  #[test]
  fn test_best_parse_picks_likelier_attachment() {
    let g: Grammar = r#"
      S   -> NP VP (1.0);
      VP  -> V NP (0.6) | VP PP (0.4);
      NP  -> NP PP (0.2) | 'I' (0.3) | Det N (0.5);
      PP  -> P NP (1.0);
      V   -> saw (1.0);
      Det -> the (1.0);
      N   -> man (0.5) | telescope (0.5);
      P   -> with (1.0);
    "#
    .parse()
    .unwrap();
    let chart = EarleyParser::new(&g)
      .chart_parse(&["I", "saw", "the", "man", "with", "the", "telescope"])
      .unwrap();
    assert_eq!(chart.parses("S").into_iter().count(), 2);

    let (tree, p) = chart.parses("S").best().unwrap();
    assert_eq!(
      tree.bracketed(),
      "(S (NP I) (VP (VP (V saw) (NP (Det the) (N man))) (PP (P with) (NP (Det the) (N telescope)))))"
    );
    assert!((p - 0.0045).abs() < 1e-9, "{}", p);
  }

  #[test]
  fn test_best_parse_needs_weights() {
    let g: Grammar = "S -> S S; S -> x;".parse().unwrap();
    let chart = EarleyParser::new(&g).chart_parse(&["x", "x"]).unwrap();
    assert!(!chart.parses("S").is_empty());
    assert!(chart.parses("S").best().is_none());
  }

  #[test]
  fn test_subtree_forest() {
    let g: Grammar = include_str!("../grammars/pp-attachment.fgr").parse().unwrap();
    let chart = EarleyParser::new(&g)
      .chart_parse(&["I", "saw", "the", "man", "with", "the", "telescope"])
      .unwrap();

    let edges = chart.edges_spanning(1, 7, &Symbol::nonterminal("VP"));
    assert_eq!(edges.len(), 2);
    // featureless edges are told apart only by category and span
    let trees = ParseForest::new(&chart, edges[0].description())
      .into_iter()
      .collect::<Vec<_>>();
    assert_eq!(trees.len(), 2);
    for tree in trees.iter() {
      assert_eq!(tree.leaves(), vec!["saw", "the", "man", "with", "the", "telescope"]);
    }

    let np = chart.edges_spanning(2, 7, &Symbol::nonterminal("NP"));
    assert_eq!(np.len(), 1);
    let trees = ParseForest::new(&chart, np[0].description()).into_iter().collect::<Vec<_>>();
    assert_eq!(
      trees.iter().map(|t| t.bracketed()).collect::<Vec<_>>(),
      vec!["(NP (NP (Det the) (N man)) (PP (P with) (NP (Det the) (N telescope))))"]
    );
  }
}
