use regex::Regex;
/// Simple recursive-descent parsing of grammar files
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::featurestructure::{Atom, Feature, NodeArena, NodeIdx, RequiredFeatures};
use crate::grammar::Grammar;
use crate::rules::{Production, Symbol};
use crate::Err;

pub const TOP_STR: &str = "**top**";

/// Parses a grammar like
///
/// ```text
/// %start S;
/// %required case;
/// S -> NP[num: #n] VP[num: #n];
/// NP[num: ?n] -> Det[num: ?n] N[num: ?n] | 'John';
/// N[num: sg] -> dog (0.5);
/// ```
///
/// Without a `%start`, the first rule's symbol is the start symbol. If any production
/// has a weight, all must, and the grammar is checked as a weighted grammar.
impl FromStr for Grammar {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (items, s) = parse_items(s)?;
    if !s.is_empty() {
      return Err(format!("trailing input: {}", s).into());
    }

    let mut start: Option<String> = None;
    let mut required = RequiredFeatures::new();
    let mut arena = NodeArena::new();
    let mut productions = Vec::new();
    for item in items {
      match item {
        Item::Start(name) => {
          if let Some(prev) = start.replace(name) {
            return Err(format!("start symbol declared twice (first as {})", prev).into());
          }
        }
        Item::Required(names) => {
          for name in names {
            required.insert(name);
          }
        }
        Item::Rule(rule) => {
          for alternative in rule.alternatives.iter() {
            productions.push(build_production(&mut arena, &rule, alternative)?);
          }
        }
      }
    }

    if productions.is_empty() {
      return Err("empty ruleset".into());
    }
    let start = match start {
      Some(start) => start,
      None => productions[0].lhs_name().to_string(),
    };

    let grammar = if productions.iter().any(|p| p.weight.is_some()) {
      Grammar::new_weighted(start, productions, arena)?
    } else {
      Grammar::new(start, productions, arena)
    };
    Ok(grammar.with_required_features(required))
  }
}

impl Grammar {
  pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Err> {
    fs::read_to_string(path)?.parse()
  }
}

pub(crate) type Infallible<'a, T> = (T, &'a str);
pub(crate) type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

pub(crate) use regex_static;

/// Try to consume a regex, returning None if it doesn't match
pub(crate) fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
pub(crate) fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
pub(crate) fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
pub(crate) fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, s).into())
  }
}

/// Skips any run of whitespace and // comments
pub(crate) fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"^(\s|//[^\n]*)*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// The contents of a single- or double-quoted string, with backslash escapes resolved
pub(crate) fn unquote(s: &str) -> String {
  let inner = &s[1..s.len() - 1];
  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      if let Some(escaped) = chars.next() {
        out.push(escaped);
      }
    } else {
      out.push(c);
    }
  }
  out
}

/// What a feature path is set to, before it is allocated
#[derive(Debug, Clone, PartialEq)]
enum ValueSpec {
  Top,
  Atom(Atom),
  Var(String),
}

#[derive(Debug, Clone, PartialEq)]
struct FeatureSpec {
  path: String,
  tag: Option<String>,
  value: ValueSpec,
}

#[derive(Debug, Clone, PartialEq)]
struct Alternative {
  elements: Vec<(Symbol, Vec<FeatureSpec>)>,
  weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct RuleSpec {
  lhs: String,
  features: Vec<FeatureSpec>,
  alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
  Start(String),
  Required(Vec<String>),
  Rule(RuleSpec),
}

/// Tries to parse a name made of letters, numbers, - and _
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"^[a-zA-Z0-9\-_]+");
  needed_re(&NAME, s).map_err(|err| format!("name: {}", err).into())
}

/// Tries to parse a name made of dotted segments (foo.bar.c.d)
fn parse_dotted(s: &str) -> ParseResult<'_, &str> {
  regex_static!(DOTTED, r"^[a-zA-Z0-9\-_]+(\.[a-zA-Z0-9\-_]+)*");
  needed_re(&DOTTED, s).map_err(|e| format!("dotted name: {}", e).into())
}

/// Parses an optional #tag
fn parse_tag(s: &str) -> ParseResult<'_, Option<String>> {
  let (hash, s) = optional_char('#', s);
  if hash.is_none() {
    Ok((None, s))
  } else {
    let s = skip_whitespace(s);
    let (name, s) = parse_name(s).map_err(|e| -> Err { format!("tag: {}", e).into() })?;
    Ok((Some(name.to_string()), s))
  }
}

/// Parses a value with an optional tag: #tag value
fn parse_feature_value(s: &str) -> ParseResult<'_, (Option<String>, ValueSpec)> {
  regex_static!(VARIABLE, r"^\?[a-zA-Z_][a-zA-Z0-9_]*");
  regex_static!(INT, r"^-?[0-9]+\b");
  regex_static!(QUOTED, r#"^('([^'\\]|\\.)*'|"([^"\\]|\\.)*")"#);
  regex_static!(VALUE, r"^[a-zA-Z0-9\-_]+");

  let (tag, s) = parse_tag(s)?;
  let s = skip_whitespace(s);

  if let Some(rest) = s.strip_prefix(TOP_STR) {
    return Ok(((tag, ValueSpec::Top), rest));
  }
  if let (Some(m), rest) = optional_re(&VARIABLE, s) {
    return Ok(((tag, ValueSpec::Var(m[1..].to_string())), rest));
  }
  if let (Some(m), rest) = optional_re(&INT, s) {
    let i = m
      .parse::<i64>()
      .map_err(|e| -> Err { format!("integer {}: {}", m, e).into() })?;
    return Ok(((tag, ValueSpec::Atom(Atom::Int(i))), rest));
  }
  if let (Some(m), rest) = optional_re(&QUOTED, s) {
    return Ok(((tag, ValueSpec::Atom(Atom::Str(unquote(m)))), rest));
  }
  if let (Some(m), rest) = optional_re(&VALUE, s) {
    return Ok(((tag, ValueSpec::Atom(Atom::Str(m.to_string()))), rest));
  }

  if tag.is_some() {
    Ok(((tag, ValueSpec::Top), s))
  } else {
    Err(format!("feature needs tag or value at {}", s).into())
  }
}

/// `name: value` or `+name` / `-name`
fn parse_feature(s: &str) -> ParseResult<'_, FeatureSpec> {
  if let Some(sign) = s.chars().next().filter(|&c| c == '+' || c == '-') {
    let (name, s) = parse_dotted(&s[1..]).map_err(|e| format!("boolean feature: {}", e))?;
    let s = skip_whitespace(s);
    let (_, s) = optional_char(',', s);
    return Ok((
      FeatureSpec {
        path: name.to_string(),
        tag: None,
        value: ValueSpec::Atom(Atom::Bool(sign == '+')),
      },
      s,
    ));
  }

  let (name, s) = parse_dotted(s).map_err(|e| format!("feature name: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(':', s)?;
  let s = skip_whitespace(s);
  let ((tag, value), s) = parse_feature_value(s).map_err(|e| format!("feature value: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = optional_char(',', s);

  Ok((
    FeatureSpec {
      path: name.to_string(),
      tag,
      value,
    },
    s,
  ))
}

fn parse_featurestructure(s: &str) -> ParseResult<'_, Vec<FeatureSpec>> {
  let mut pairs = Vec::new();
  let mut rem = needed_char('[', s)?.1;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), rem) = optional_char(']', rem) {
      return Ok((pairs, rem));
    }
    let (feature, s) = parse_feature(rem)?;
    pairs.push(feature);
    rem = s;
  }
}

/// One rhs element: a quoted or lower-case word, or a category with optional features
fn parse_element(s: &str) -> ParseResult<'_, (Symbol, Vec<FeatureSpec>)> {
  regex_static!(QUOTED, r#"^('([^'\\]|\\.)*'|"([^"\\]|\\.)*")"#);

  if let (Some(m), s) = optional_re(&QUOTED, s) {
    return Ok(((Symbol::terminal(unquote(m)), Vec::new()), s));
  }

  let (name, s) = parse_name(s).map_err(|e| -> Err { format!("symbol: {}", e).into() })?;
  let s = skip_whitespace(s);
  let (features, s) = if s.starts_with('[') {
    parse_featurestructure(s)?
  } else {
    (Vec::new(), s)
  };

  if name.starts_with(|c: char| c.is_lowercase()) {
    if !features.is_empty() {
      Err(format!("terminal (lower-case) cannot have features: {} {}", name, s).into())
    } else {
      Ok(((Symbol::terminal(name), features), s))
    }
  } else {
    Ok(((Symbol::nonterminal(name), features), s))
  }
}

/// A weight in parentheses, e.g. `(0.25)`
fn parse_weight(s: &str) -> ParseResult<'_, Option<f64>> {
  regex_static!(WEIGHT, r"^\(\s*[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?\s*\)");

  match optional_re(&WEIGHT, s) {
    (Some(m), rest) => {
      let number = m.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
      let weight = number
        .parse::<f64>()
        .map_err(|e| -> Err { format!("weight {}: {}", number, e).into() })?;
      Ok((Some(weight), rest))
    }
    (None, rest) => Ok((None, rest)),
  }
}

/// Symbol, alternatives separated by `|`, terminated by `;`
fn parse_rule(s: &str) -> ParseResult<'_, RuleSpec> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "^->");

  let ((symbol, features), s) =
    parse_element(s).map_err(|e| -> Err { format!("rule symbol: {}", e).into() })?;
  let lhs = match symbol {
    Symbol::Nonterminal(lhs) => lhs,
    Symbol::Terminal(w) => {
      return Err(format!("expected symbol, got terminal {}: {}", w, s).into());
    }
  };
  let s = skip_whitespace(s);
  let (_, s) = needed_re(&ARROW, s).map_err(|e| -> Err { format!("rule arrow: {}", e).into() })?;

  let mut alternatives = Vec::new();
  let mut elements = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    let (weight, s) = parse_weight(rem)?;
    let s = skip_whitespace(s);

    if let (Some(_), s) = optional_char(';', s) {
      alternatives.push(Alternative {
        elements: std::mem::take(&mut elements),
        weight,
      });
      rem = s;
      break;
    }
    if let (Some(_), s) = optional_char('|', s) {
      alternatives.push(Alternative {
        elements: std::mem::take(&mut elements),
        weight,
      });
      rem = s;
      continue;
    }
    if weight.is_some() {
      return Err(format!("expected | or ; after weight at {}", s).into());
    }
    if rem.is_empty() {
      return Err(format!("rule for {} is missing its ;", lhs).into());
    }

    let (element, s) =
      parse_element(rem).map_err(|e| -> Err { format!("rule production: {}", e).into() })?;
    elements.push(element);
    rem = s;
  }

  Ok((
    RuleSpec {
      lhs,
      features,
      alternatives,
    },
    rem,
  ))
}

/// `%start S;` or `%required a b c;`
fn parse_directive(s: &str) -> ParseResult<'_, Item> {
  let (_, s) = needed_char('%', s)?;
  let (name, s) = parse_name(s).map_err(|e| -> Err { format!("directive: {}", e).into() })?;

  let mut args = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(';', rem) {
      rem = s;
      break;
    }
    let (arg, s) = parse_name(rem).map_err(|e| -> Err { format!("%{}: {}", name, e).into() })?;
    args.push(arg.to_string());
    rem = s;
  }

  match name {
    "start" if args.len() == 1 => Ok((Item::Start(args.remove(0)), rem)),
    "start" => Err(format!("%start takes one symbol, got {:?}", args).into()),
    "required" => Ok((Item::Required(args), rem)),
    _ => Err(format!("unknown directive %{}", name).into()),
  }
}

fn parse_items(s: &str) -> ParseResult<'_, Vec<Item>> {
  let mut items = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((items, rem));
    }
    let (item, s) = if rem.starts_with('%') {
      parse_directive(rem)?
    } else {
      let (rule, s) = parse_rule(rem)?;
      (Item::Rule(rule), s)
    };
    items.push(item);
    rem = s;
  }
}

/// We want rules to be able to access their child features, and to be able to
/// unify between them
/// So we have the rule symbol "adopt" the features of its children, copying the
/// child features into child-0.(...), child-1.(...), etc.
///
/// We could try to implement this when constructing the rule, but it's easier
/// to do as a simple AST transform.
fn adopt_child_features(
  mut rule_features: Vec<FeatureSpec>,
  elements: &[(Symbol, Vec<FeatureSpec>)],
) -> (Vec<FeatureSpec>, Vec<Symbol>) {
  let mut rhs = Vec::with_capacity(elements.len());

  for (idx, (symbol, features)) in elements.iter().enumerate() {
    rhs.push(symbol.clone());
    let prefix = format!("{}.", crate::edge::child_label(idx));
    for feature in features.iter() {
      rule_features.push(FeatureSpec {
        path: prefix.clone() + &feature.path,
        tag: feature.tag.clone(),
        value: feature.value.clone(),
      });
    }
  }

  (rule_features, rhs)
}

/// Allocates one alternative of a rule. Variables are shared within the production,
/// never across productions.
fn build_production(
  arena: &mut NodeArena,
  rule: &RuleSpec,
  alternative: &Alternative,
) -> Result<Production, Err> {
  let (specs, rhs) = adopt_child_features(rule.features.clone(), &alternative.elements);
  let mut production = Production::new(&rule.lhs, rhs);

  if !specs.is_empty() {
    let mut vars: HashMap<String, NodeIdx> = HashMap::new();
    let mut features = Vec::with_capacity(specs.len());
    for spec in specs {
      let value = match spec.value {
        ValueSpec::Top => arena.alloc_top(),
        ValueSpec::Atom(atom) => arena.alloc_atom(atom),
        ValueSpec::Var(name) => match vars.get(&name) {
          Some(&idx) => idx,
          None => {
            let idx = arena.new_variable(Some(&name));
            vars.insert(name, idx);
            idx
          }
        },
      };
      features.push(Feature {
        path: spec.path,
        tag: spec.tag,
        value,
      });
    }
    let idx = arena
      .alloc_from_features(features)
      .map_err(|e| -> Err { format!("features of {}: {}", production, e).into() })?;
    production = production.with_features(idx);
  }

  if let Some(weight) = alternative.weight {
    production = production.with_weight(weight);
  }
  Ok(production)
}
