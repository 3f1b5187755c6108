use std::collections::HashMap;

use regex::Regex;

use super::node::{Atom, NodeArena, NodeIdx};
use super::unify::MergeMemo;
use crate::parse_grammar::{
  ParseResult, TOP_STR, needed_char, needed_re, optional_char, optional_re, regex_static,
  skip_whitespace, unquote,
};
use crate::utils::Err;

impl NodeArena {
  /// Parses the bracketed text form into a new structure, e.g.
  /// `[agr=(1)[num=sg], subj=[agr->(1)], tense=?t, +fin]`.
  /// Variables with the same name within one text are the same variable.
  pub fn parse_fs(&mut self, s: &str) -> Result<NodeIdx, Err> {
    let mut reader = Reader {
      arena: self,
      tags: HashMap::new(),
      vars: HashMap::new(),
    };
    let (idx, rest) = reader.value(skip_whitespace(s))?;
    let rest = skip_whitespace(rest);
    if rest.is_empty() {
      Ok(idx)
    } else {
      Err(format!("trailing input after feature structure: {}", rest).into())
    }
  }
}

struct Reader<'a> {
  arena: &'a mut NodeArena,
  tags: HashMap<String, NodeIdx>,
  vars: HashMap<String, NodeIdx>,
}

/// The digits out of `(12)` or `->(12)`
fn tag_id(s: &str) -> &str {
  s.trim_matches(|c: char| !c.is_ascii_digit())
}

impl Reader<'_> {
  fn value<'s>(&mut self, s: &'s str) -> ParseResult<'s, NodeIdx> {
    regex_static!(REFERENCE, r"^->\s*\(\s*[0-9]+\s*\)");
    regex_static!(TAG, r"^\(\s*[0-9]+\s*\)");
    regex_static!(VARIABLE, r"^\?[a-zA-Z_][a-zA-Z0-9_]*");
    regex_static!(INT, r"^-?[0-9]+");
    regex_static!(QUOTED, r#"^('([^'\\]|\\.)*'|"([^"\\]|\\.)*")"#);
    regex_static!(SYMBOL, r"^[a-zA-Z_][a-zA-Z0-9_\-]*");

    if let (Some(m), rest) = optional_re(&REFERENCE, s) {
      return match self.tags.get(tag_id(m)) {
        Some(&idx) => Ok((idx, rest)),
        None => Err(format!("reference to undefined ({}) at {}", tag_id(m), s).into()),
      };
    }

    if let (Some(m), rest) = optional_re(&TAG, s) {
      let id = tag_id(m).to_string();
      if self.tags.contains_key(&id) {
        return Err(format!("duplicate ({}) at {}", id, s).into());
      }
      // stands in for the value while it is being read, so the value can refer to itself
      let placeholder = self.arena.alloc_top();
      self.tags.insert(id, placeholder);
      let (value, rest) = self.value(skip_whitespace(rest))?;
      let merged = self.arena.merge(placeholder, value, &mut MergeMemo::new())?;
      return Ok((merged, rest));
    }

    if s.starts_with('[') {
      return self.structure(s);
    }

    if let Some(rest) = s.strip_prefix(TOP_STR) {
      return Ok((self.arena.alloc_top(), rest));
    }

    if let (Some(m), rest) = optional_re(&VARIABLE, s) {
      let name = &m[1..];
      let idx = match self.vars.get(name) {
        Some(&idx) => idx,
        None => {
          let idx = self.arena.new_variable(Some(name));
          self.vars.insert(name.to_string(), idx);
          idx
        }
      };
      return Ok((idx, rest));
    }

    if let (Some(m), rest) = optional_re(&INT, s) {
      let i = m
        .parse::<i64>()
        .map_err(|e| -> Err { format!("integer {}: {}", m, e).into() })?;
      return Ok((self.arena.alloc_atom(i), rest));
    }

    if let (Some(m), rest) = optional_re(&QUOTED, s) {
      return Ok((self.arena.alloc_str(unquote(m)), rest));
    }

    let (m, rest) = needed_re(&SYMBOL, s).map_err(|e| -> Err { format!("value: {}", e).into() })?;
    let atom = match m {
      "True" => Atom::Bool(true),
      "False" => Atom::Bool(false),
      "None" => Atom::Absent,
      _ => Atom::Str(m.to_string()),
    };
    Ok((self.arena.alloc_atom(atom), rest))
  }

  fn structure<'s>(&mut self, s: &'s str) -> ParseResult<'s, NodeIdx> {
    let node = self.arena.alloc_edged();
    let mut rem = needed_char('[', s)?.1;
    loop {
      rem = skip_whitespace(rem);
      if let (Some(_), rest) = optional_char(']', rem) {
        return Ok((node, rest));
      }

      rem = skip_whitespace(self.feature(node, rem)?);
      match optional_char(',', rem) {
        (Some(_), rest) => rem = rest,
        (None, rest) => {
          let (_, rest) = needed_char(']', skip_whitespace(rest))?;
          return Ok((node, rest));
        }
      }
    }
  }

  /// One `name=value`, `name->(k)`, `+name` or `-name` entry of a structure
  fn feature<'s>(&mut self, node: NodeIdx, s: &'s str) -> Result<&'s str, Err> {
    // a `-` inside a name must be followed by a name character, so `b->(1)` reads as `b`
    regex_static!(BOOLEAN, r"^[+\-][a-zA-Z_]([a-zA-Z0-9_]|-[a-zA-Z0-9_])*");
    regex_static!(NAME, r"^[a-zA-Z_]([a-zA-Z0-9_]|-[a-zA-Z0-9_])*");

    if let (Some(m), rest) = optional_re(&BOOLEAN, s) {
      let value = self.arena.alloc_atom(m.starts_with('+'));
      self.arena.push_edge(node, m[1..].to_string(), value)?;
      return Ok(rest);
    }

    let (name, rest) =
      needed_re(&NAME, s).map_err(|e| -> Err { format!("feature name: {}", e).into() })?;
    let rest = skip_whitespace(rest);
    let rest = if rest.starts_with("->") {
      rest
    } else {
      skip_whitespace(needed_char('=', rest)?.1)
    };

    let (value, rest) = self.value(rest)?;
    self.arena.push_edge(node, name.to_string(), value)?;
    Ok(rest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::featurestructure::SerializedNode;

  #[test]
  fn test_parse_values() {
    let mut arena = NodeArena::new();
    let fs = arena
      .parse_fs("[ s = 'it\\'s', n = -4, b = True, sym = nom, nested = [ x = \"y z\" ] ]")
      .unwrap();

    assert_eq!(arena.atom(arena.arc(fs, "s").unwrap()), Some(&Atom::from("it's")));
    assert_eq!(arena.atom(arena.arc(fs, "n").unwrap()), Some(&Atom::Int(-4)));
    assert_eq!(arena.atom(arena.arc(fs, "b").unwrap()), Some(&Atom::Bool(true)));
    assert_eq!(arena.atom(arena.arc(fs, "sym").unwrap()), Some(&Atom::from("nom")));
    let x = arena.get_path(fs, &["nested", "x"]).unwrap();
    assert_eq!(arena.atom(x), Some(&Atom::from("y z")));
  }

  #[test]
  fn test_parse_reentrance() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("[a=(1)[b=c], d->(1), e=[f->(1)]]").unwrap();
    let a = arena.arc(fs, "a").unwrap();
    assert_eq!(arena.arc(fs, "d"), Some(a));
    assert_eq!(arena.get_path(fs, &["e", "f"]), Some(a));
  }

  #[test]
  fn test_hyphenated_names_next_to_references() {
    let mut arena = NodeArena::new();
    let fs = arena
      .parse_fs("[head-agr=(1)[num=sg], subj-agr->(1), +is-aux, b->(1)]")
      .unwrap();
    let agr = arena.arc(fs, "head-agr").unwrap();
    assert_eq!(arena.arc(fs, "subj-agr"), Some(agr));
    assert_eq!(arena.arc(fs, "b"), Some(agr));
    assert!(arena.arc(fs, "b-").is_none());

    let shown = arena.display(fs).to_string();
    assert_eq!(shown, "[b=(1)[num=sg], head-agr->(1), +is-aux, subj-agr->(1)]");
    let again = arena.parse_fs(&shown).unwrap();
    assert!(arena.equivalent(fs, again));

    // a trailing hyphen is not part of a name
    assert!(arena.parse_fs("[a-=1]").is_err());
  }

  #[test]
  fn test_parse_shared_variables() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("[a=?x, b=?x, c=?y]").unwrap();
    assert_eq!(arena.arc(fs, "a"), arena.arc(fs, "b"));
    assert_ne!(arena.arc(fs, "a"), arena.arc(fs, "c"));
    let x = arena.variable(arena.arc(fs, "a").unwrap()).unwrap();
    assert_eq!(x.name, "x");
  }

  #[test]
  fn test_parse_boolean_shorthand() {
    let mut arena = NodeArena::new();
    let fs = arena.parse_fs("[+fin, -aux]").unwrap();
    let gold = SerializedNode::from(vec![
      ("fin", SerializedNode::from(true)),
      ("aux", SerializedNode::from(false)),
    ]);
    assert_eq!(SerializedNode::from_node(&arena, fs), Some(gold));
  }

  #[test]
  fn test_parse_errors() {
    let mut arena = NodeArena::new();
    assert!(arena.parse_fs("[a->(1)]").is_err());
    assert!(arena.parse_fs("[a=1").is_err());
    assert!(arena.parse_fs("[a=1] extra").is_err());
    assert!(arena.parse_fs("[a=(1)[], b=(1)[]]").is_err());
    // the same feature twice must unify
    assert!(arena.parse_fs("[a=1, a=2]").is_err());
    assert!(arena.parse_fs("[a=1, a=1]").is_ok());
  }

  #[test]
  fn test_display_round_trip() {
    let mut arena = NodeArena::new();
    let src = "[agr=(1)[num=sg, per=3], head=[agr->(1)], -inv, tense=?t, word='New York']";
    let fs = arena.parse_fs(src).unwrap();
    let printed = arena.display(fs).to_string();
    let reparsed = arena.parse_fs(&printed).unwrap();
    assert!(arena.equivalent(fs, reparsed));
    assert_eq!(printed, arena.display(reparsed).to_string());
  }
}
