use std::fmt;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: (usize, usize),
}

impl<T> fmt::Display for Constituent<T>
where
  T: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: (usize, usize),
}

impl<U> fmt::Display for Word<U>
where
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.span.0, self.span.1, self.value)
  }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

impl<T, U> SynTree<T, U> {
  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn is_branch(&self) -> bool {
    matches!(self, Self::Branch(_, _))
  }

  pub fn get_leaf(&self) -> Option<&Word<U>> {
    match self {
      Self::Leaf(w) => Some(w),
      _ => None,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }

  /// The words under this tree, left to right
  pub fn leaves(&self) -> Vec<&U> {
    match self {
      Self::Leaf(w) => vec![&w.value],
      Self::Branch(_, children) => children.iter().flat_map(|c| c.leaves()).collect(),
    }
  }
}

impl<T, U> SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  /// Single-line rendering, e.g. `(S (NP John) (VP runs))`
  pub fn bracketed(&self) -> String {
    match self {
      Self::Leaf(w) => w.value.to_string(),
      Self::Branch(c, children) => {
        let mut out = format!("({}", c.value);
        for child in children.iter() {
          out.push(' ');
          out.push_str(&child.bracketed());
        }
        out.push(')');
        out
      }
    }
  }
}

impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(t) => write!(f, "{}", t),
      Self::Branch(t, ts) => {
        write!(f, "({}", t)?;
        if ts.len() == 1 {
          write!(f, " ({}))", ts[0])
        } else {
          for t in ts.iter() {
            let fmt = format!("{}", t);
            for line in fmt.lines() {
              write!(f, "\n  {}", line)?;
            }
          }
          write!(f, ")")
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn word(value: &str, at: usize) -> SynTree<String, String> {
    SynTree::Leaf(Word {
      value: value.to_string(),
      span: (at, at + 1),
    })
  }

  fn branch(
    value: &str,
    span: (usize, usize),
    children: Vec<SynTree<String, String>>,
  ) -> SynTree<String, String> {
    SynTree::Branch(
      Constituent {
        value: value.to_string(),
        span,
      },
      children,
    )
  }

  #[test]
  fn test_renderings() {
    let tree = branch(
      "S",
      (0, 2),
      vec![
        branch("NP", (0, 1), vec![word("John", 0)]),
        branch("VP", (1, 2), vec![word("runs", 1)]),
      ],
    );

    assert_eq!(tree.bracketed(), "(S (NP John) (VP runs))");
    assert_eq!(
      tree.to_string(),
      "(0..2: S\n  (0..1: NP (0..1: John))\n  (1..2: VP (1..2: runs)))"
    );
    assert_eq!(tree.leaves(), vec!["John", "runs"]);
    assert_eq!(tree.span(), (0, 2));
    assert_eq!(branch("S", (0, 0), Vec::new()).bracketed(), "(S)");
  }
}
