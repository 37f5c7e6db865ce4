//! LIKE pattern tokens plus the matching, containment and disjointness
//! relations the minimizer and the store compiler derive don't-cares from.

use std::collections::{HashMap, HashSet, VecDeque};

///
/// CaseFold
/// Case mapping applied to the left-hand side before matching.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CaseFold {
    Upper,
    Lower,
}

impl CaseFold {
    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Upper => "UPPER",
            Self::Lower => "LOWER",
        }
    }

    #[must_use]
    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "UPPER" => Some(Self::Upper),
            "LOWER" => Some(Self::Lower),
            _ => None,
        }
    }

    #[must_use]
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Upper => text.to_uppercase(),
            Self::Lower => text.to_lowercase(),
        }
    }

    // Whether `c` can appear in folded output.
    fn produces(self, c: char) -> bool {
        let mapped: String = match self {
            Self::Upper => c.to_uppercase().collect(),
            Self::Lower => c.to_lowercase().collect(),
        };
        let mut chars = mapped.chars();

        chars.next() == Some(c) && chars.next().is_none()
    }
}

///
/// LikeToken
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum LikeToken {
    Char(char),
    /// `_`
    One,
    /// `%`
    Any,
}

///
/// LikePattern
/// Pre-tokenized LIKE pattern; consecutive `%` collapse.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct LikePattern {
    tokens: Vec<LikeToken>,
}

impl LikePattern {
    pub(crate) fn parse(pattern: &str, escape: Option<char>) -> Self {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let token = if Some(c) == escape {
                // A trailing escape stands for itself.
                LikeToken::Char(chars.next().unwrap_or(c))
            } else {
                match c {
                    '%' => LikeToken::Any,
                    '_' => LikeToken::One,
                    other => LikeToken::Char(other),
                }
            };
            if token == LikeToken::Any && tokens.last() == Some(&LikeToken::Any) {
                continue;
            }
            tokens.push(token);
        }

        Self { tokens }
    }

    /// Text form with `\` as escape when a literal `%`, `_` or `\` occurs.
    pub(crate) fn render(&self) -> (String, Option<char>) {
        let needs_escape = self
            .tokens
            .iter()
            .any(|t| matches!(t, LikeToken::Char('%' | '_' | '\\')));
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                LikeToken::Any => out.push('%'),
                LikeToken::One => out.push('_'),
                LikeToken::Char(c @ ('%' | '_' | '\\')) if needs_escape => {
                    out.push('\\');
                    out.push(*c);
                }
                LikeToken::Char(c) => out.push(*c),
            }
        }

        (out, needs_escape.then_some('\\'))
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();

        // reachable[j]: pattern prefix matches text prefix of length j
        let mut reachable = vec![false; n + 1];
        reachable[0] = true;
        for token in &self.tokens {
            let mut next = vec![false; n + 1];
            match token {
                LikeToken::Any => {
                    let mut seen = false;
                    for j in 0..=n {
                        seen |= reachable[j];
                        next[j] = seen;
                    }
                }
                LikeToken::One => {
                    for j in 0..n {
                        next[j + 1] = reachable[j];
                    }
                }
                LikeToken::Char(c) => {
                    for j in 0..n {
                        next[j + 1] = reachable[j] && chars[j] == *c;
                    }
                }
            }
            reachable = next;
        }

        reachable[n]
    }

    /// `false` when a literal character can never occur in folded text, so
    /// the folded match is a contradiction.
    pub(crate) fn consistent_with(&self, fold: CaseFold) -> bool {
        self.tokens.iter().all(|t| match t {
            LikeToken::Char(c) => fold.produces(*c),
            _ => true,
        })
    }

    /// Sound containment: `true` only if every string matching `other`
    /// matches `self`.
    pub(crate) fn contains(&self, other: &Self) -> bool {
        let mut memo = HashMap::new();
        covers_from(&self.tokens, &other.tokens, 0, 0, &mut memo)
    }

    /// Exact disjointness: no string matches both patterns.
    pub(crate) fn is_disjoint(&self, other: &Self) -> bool {
        let (a, b) = (&self.tokens, &other.tokens);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        push_closure(a, b, (0, 0), &mut seen, &mut queue);

        while let Some((i, j)) = queue.pop_front() {
            if i == a.len() && j == b.len() {
                return false;
            }
            let (Some(ta), Some(tb)) = (a.get(i), b.get(j)) else {
                continue;
            };
            let compatible = match (ta, tb) {
                (LikeToken::Char(x), LikeToken::Char(y)) => x == y,
                _ => true,
            };
            if compatible {
                let ni = if *ta == LikeToken::Any { i } else { i + 1 };
                let nj = if *tb == LikeToken::Any { j } else { j + 1 };
                push_closure(a, b, (ni, nj), &mut seen, &mut queue);
            }
        }

        true
    }

    /// Anchored regular expression with the same match set.
    pub(crate) fn to_regex(&self) -> String {
        let mut out = String::from("^");
        for token in &self.tokens {
            match token {
                LikeToken::Any => out.push_str("[\\s\\S]*"),
                LikeToken::One => out.push_str("[\\s\\S]"),
                LikeToken::Char(c) => {
                    if "\\^$.|?*+()[]{}/".contains(*c) {
                        out.push('\\');
                    }
                    out.push(*c);
                }
            }
        }
        match self.tokens.last() {
            Some(LikeToken::Any) => {
                // trailing wildcard needs no anchor
                out.truncate(out.len() - "[\\s\\S]*".len());
            }
            _ => out.push('$'),
        }

        out
    }
}

// States reachable by letting `%` tokens match the empty string.
fn push_closure(
    a: &[LikeToken],
    b: &[LikeToken],
    start: (usize, usize),
    seen: &mut HashSet<(usize, usize)>,
    queue: &mut VecDeque<(usize, usize)>,
) {
    let mut stack = vec![start];
    while let Some((i, j)) = stack.pop() {
        if !seen.insert((i, j)) {
            continue;
        }
        queue.push_back((i, j));
        if a.get(i) == Some(&LikeToken::Any) {
            stack.push((i + 1, j));
        }
        if b.get(j) == Some(&LikeToken::Any) {
            stack.push((i, j + 1));
        }
    }
}

fn covers_from(
    outer: &[LikeToken],
    inner: &[LikeToken],
    i: usize,
    j: usize,
    memo: &mut HashMap<(usize, usize), bool>,
) -> bool {
    if let Some(hit) = memo.get(&(i, j)) {
        return *hit;
    }

    let result = match (outer.get(i), inner.get(j)) {
        (_, None) => outer[i..].iter().all(|t| *t == LikeToken::Any),
        (None, Some(_)) => false,
        (Some(LikeToken::Any), Some(LikeToken::Any)) => {
            covers_from(outer, inner, i, j + 1, memo) || covers_from(outer, inner, i + 1, j, memo)
        }
        (Some(LikeToken::Any), Some(_)) => {
            covers_from(outer, inner, i + 1, j, memo) || covers_from(outer, inner, i, j + 1, memo)
        }
        (Some(_), Some(LikeToken::Any)) => false,
        (Some(LikeToken::One), Some(_)) => covers_from(outer, inner, i + 1, j + 1, memo),
        (Some(LikeToken::Char(x)), Some(LikeToken::Char(y))) => {
            x == y && covers_from(outer, inner, i + 1, j + 1, memo)
        }
        (Some(LikeToken::Char(_)), Some(LikeToken::One)) => false,
    };
    memo.insert((i, j), result);

    result
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(p: &str) -> LikePattern {
        LikePattern::parse(p, None)
    }

    #[test]
    fn matches_wildcards_and_escapes() {
        assert!(pat("ab%").matches("abc"));
        assert!(pat("ab%").matches("ab"));
        assert!(pat("a_c").matches("abc"));
        assert!(!pat("a_c").matches("ac"));
        assert!(pat("%").matches(""));
        assert!(LikePattern::parse("100!%", Some('!')).matches("100%"));
        assert!(!LikePattern::parse("100!%", Some('!')).matches("1000"));
    }

    #[test]
    fn containment_is_sound_for_prefix_patterns() {
        assert!(pat("a%").contains(&pat("ab%")));
        assert!(pat("a%").contains(&pat("abc")));
        assert!(pat("%").contains(&pat("x_y%")));
        assert!(pat("a_c").contains(&pat("abc")));
        assert!(!pat("ab%").contains(&pat("a%")));
        assert!(!pat("abc").contains(&pat("a_c")));
    }

    #[test]
    fn disjointness_tracks_shared_matches() {
        assert!(pat("a%").is_disjoint(&pat("b%")));
        assert!(pat("abc").is_disjoint(&pat("ab")));
        assert!(!pat("a%").is_disjoint(&pat("%c")));
        assert!(!pat("%x%").is_disjoint(&pat("_")));
        assert!(pat("__").is_disjoint(&pat("___%")));
    }

    #[test]
    fn regex_is_anchored_except_after_trailing_wildcard() {
        assert_eq!(pat("ab%").to_regex(), "^ab");
        assert_eq!(pat("a.b").to_regex(), "^a\\.b$");
        assert_eq!(pat("%x_").to_regex(), "^[\\s\\S]*x[\\s\\S]$");
    }

    #[test]
    fn render_escapes_literal_wildcards() {
        let p = LikePattern::parse("50!%%", Some('!'));
        assert_eq!(p.render(), ("50\\%%".to_string(), Some('\\')));
        assert_eq!(LikePattern::parse(&p.render().0, Some('\\')), p);
        assert_eq!(pat("a%b").render(), ("a%b".to_string(), None));
    }

    #[test]
    fn fold_consistency_rejects_unproducible_characters() {
        assert!(pat("ABC%").consistent_with(CaseFold::Upper));
        assert!(!pat("aBC%").consistent_with(CaseFold::Upper));
        assert!(pat("abc_1").consistent_with(CaseFold::Lower));
        assert!(!pat("Abc").consistent_with(CaseFold::Lower));
    }
}
