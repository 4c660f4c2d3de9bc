//! A small query-string language evaluated against analysed documents.
//!
//! Supported syntax: whitespace-separated clauses (default operator OR),
//! `+term` / `AND` for required clauses, `-term` / `NOT term` for prohibited
//! ones, `field:term`, `"quoted phrases"`, `prefix*`, and `*` / `*:*` to
//! match everything. A wildcard after a stem that analyses to several tokens
//! (`o'con*`) matches those tokens in order, the last one as a prefix.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("Unterminated quoted phrase in query '{0}'")]
    UnterminatedPhrase(String),
}

/// Field name -> analysed tokens, in document order.
pub type AnalyzedFields = HashMap<String, Vec<String>>;

/// Lowercases `text` and splits it on anything that is not alphanumeric.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
enum Matcher {
    All,
    Term(String),
    Prefix(String),
    Phrase(Vec<String>),
    /// Consecutive tokens where only the last one is a prefix.
    PhrasePrefix(Vec<String>),
}

impl Matcher {
    fn matches(&self, tokens: &[String]) -> bool {
        match self {
            Matcher::All => !tokens.is_empty(),
            Matcher::Term(term) => tokens.iter().any(|token| token == term),
            Matcher::Prefix(prefix) => tokens.iter().any(|token| token.starts_with(prefix.as_str())),
            Matcher::Phrase(words) => tokens
                .windows(words.len())
                .any(|window| window == words.as_slice()),
            Matcher::PhrasePrefix(words) => {
                let Some((last, leading)) = words.split_last() else {
                    return false;
                };
                tokens.windows(words.len()).any(|window| {
                    window[..leading.len()] == *leading
                        && window[leading.len()].starts_with(last.as_str())
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    occur: Occur,
    field: Option<String>,
    matcher: Matcher,
}

impl Clause {
    fn matches(&self, doc: &AnalyzedFields) -> bool {
        match &self.field {
            Some(field) => doc
                .get(field)
                .is_some_and(|tokens| self.matcher.matches(tokens)),
            None if self.matcher == Matcher::All => true,
            None => doc.values().any(|tokens| self.matcher.matches(tokens)),
        }
    }
}

/// One whitespace-delimited piece of the raw query.
#[derive(Debug, PartialEq)]
struct RawToken {
    prefix: Option<char>,
    field: Option<String>,
    text: String,
    quoted: bool,
}

impl RawToken {
    fn keyword(&self) -> Option<&str> {
        if self.prefix.is_some() || self.field.is_some() || self.quoted {
            return None;
        }
        match self.text.as_str() {
            "AND" | "OR" | "NOT" => Some(self.text.as_str()),
            _ => None,
        }
    }
}

/// A parsed query-string expression.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryString {
    clauses: Vec<Clause>,
}

impl QueryString {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(raw)?;
        let mut clauses: Vec<Clause> = Vec::new();
        let mut pending_and = false;
        let mut pending_not = false;

        for token in tokens {
            match token.keyword() {
                Some("AND") => {
                    if let Some(last) = clauses.last_mut() {
                        if last.occur == Occur::Should {
                            last.occur = Occur::Must;
                        }
                    }
                    pending_and = true;
                    continue;
                }
                Some("NOT") => {
                    pending_not = true;
                    continue;
                }
                Some(_) => continue, // OR is the default operator
                None => {}
            }

            let mut occur = match token.prefix {
                Some('+') => Occur::Must,
                Some('-') => Occur::MustNot,
                _ => Occur::Should,
            };
            if pending_not {
                occur = Occur::MustNot;
            } else if pending_and && occur == Occur::Should {
                occur = Occur::Must;
            }
            pending_and = false;
            pending_not = false;

            if let Some(matcher) = build_matcher(&token.text, token.quoted) {
                clauses.push(Clause {
                    occur,
                    field: token.field,
                    matcher,
                });
            }
        }

        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Scores `doc` against the query, or returns `None` if it does not match.
    /// The score is the number of positive clauses that matched.
    pub fn score(&self, doc: &AnalyzedFields) -> Option<usize> {
        if self.clauses.is_empty() {
            return None;
        }

        let mut score = 0;
        let mut has_must = false;
        let mut has_should = false;
        let mut should_matched = false;

        for clause in &self.clauses {
            let hit = clause.matches(doc);
            match clause.occur {
                Occur::MustNot if hit => return None,
                Occur::MustNot => {}
                Occur::Must => {
                    if !hit {
                        return None;
                    }
                    has_must = true;
                    score += 1;
                }
                Occur::Should => {
                    has_should = true;
                    if hit {
                        should_matched = true;
                        score += 1;
                    }
                }
            }
        }

        if has_must || should_matched || !has_should {
            Some(score)
        } else {
            None
        }
    }
}

fn build_matcher(text: &str, quoted: bool) -> Option<Matcher> {
    if !quoted {
        if text == "*" {
            return Some(Matcher::All);
        }
        if let Some(stem) = text.strip_suffix('*') {
            let mut tokens = analyze(stem);
            return match tokens.len() {
                0 => None,
                1 => tokens.pop().map(Matcher::Prefix),
                _ => Some(Matcher::PhrasePrefix(tokens)),
            };
        }
    }

    let mut tokens = analyze(text);
    match tokens.len() {
        0 => None,
        1 => tokens.pop().map(Matcher::Term),
        _ => Some(Matcher::Phrase(tokens)),
    }
}

fn tokenize(raw: &str) -> Result<Vec<RawToken>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut prefix = None;
        if first == '+' || first == '-' {
            chars.next();
            match chars.peek() {
                Some(c) if !c.is_whitespace() => prefix = Some(first),
                // A lone operator character carries nothing to search for.
                _ => continue,
            }
        }

        let mut field = None;
        let mut text = String::new();
        let mut quoted = false;

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '"' => {
                    let mut phrase = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '"' {
                            closed = true;
                            break;
                        }
                        phrase.push(inner);
                    }
                    if !closed {
                        return Err(QueryError::UnterminatedPhrase(raw.to_string()));
                    }
                    text.push_str(&phrase);
                    quoted = true;
                }
                ':' if field.is_none() && !quoted && !text.is_empty() => {
                    field = Some(std::mem::take(&mut text));
                }
                other => text.push(other),
            }
        }

        // `*:*` addresses every field.
        if field.as_deref() == Some("*") {
            field = None;
        }

        tokens.push(RawToken {
            prefix,
            field,
            text,
            quoted,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, id: &str) -> AnalyzedFields {
        HashMap::from([
            ("name".to_string(), analyze(name)),
            ("id".to_string(), analyze(id)),
        ])
    }

    fn matches(query: &str, d: &AnalyzedFields) -> bool {
        QueryString::parse(query).unwrap().score(d).is_some()
    }

    #[test]
    fn analyze_lowercases_and_splits_on_punctuation() {
        assert_eq!(analyze("George Orwell-Blair, Jr."), vec!["george", "orwell", "blair", "jr"]);
        assert!(analyze("  --  ").is_empty());
    }

    #[test]
    fn single_term_matches_any_field_case_insensitively() {
        let d = doc("George Orwell", "1");
        assert!(matches("orwell", &d));
        assert!(matches("ORWELL", &d));
        assert!(matches("1", &d));
        assert!(!matches("huxley", &d));
    }

    #[test]
    fn terms_default_to_or() {
        let d = doc("George Orwell", "1");
        assert!(matches("huxley orwell", &d));
        assert_eq!(QueryString::parse("huxley orwell george").unwrap().score(&d), Some(2));
    }

    #[test]
    fn and_plus_and_minus_operators() {
        let d = doc("George Orwell", "1");
        assert!(matches("george AND orwell", &d));
        assert!(!matches("george AND huxley", &d));
        assert!(!matches("+huxley orwell", &d));
        assert!(!matches("orwell -george", &d));
        assert!(!matches("orwell AND NOT george", &d));
        assert!(matches("orwell OR huxley", &d));
    }

    #[test]
    fn field_qualified_terms_only_look_at_that_field() {
        let d = doc("George Orwell", "12");
        assert!(matches("id:12", &d));
        assert!(!matches("id:orwell", &d));
        assert!(matches("name:orwell", &d));
        assert!(!matches("books:orwell", &d));
    }

    #[test]
    fn phrases_require_consecutive_tokens() {
        let d = doc("George Orwell", "1");
        assert!(matches("\"george orwell\"", &d));
        assert!(!matches("\"orwell george\"", &d));
        assert!(matches("name:\"George Orwell\"", &d));
    }

    #[test]
    fn prefix_and_match_all() {
        let d = doc("George Orwell", "1");
        assert!(matches("orw*", &d));
        assert!(!matches("hux*", &d));
        assert!(matches("*", &d));
        assert!(matches("*:*", &d));
        assert!(matches("name:*", &d));
    }

    #[test]
    fn wildcard_after_multi_token_stem_keeps_prefix_on_last_token() {
        let d = doc("Flannery O'Connor", "1");
        assert!(matches("o'con*", &d));
        assert!(matches("name:o'connor*", &d));
        assert!(!matches("o'conx*", &d));
        assert!(!matches("connor'o*", &d));
    }

    #[test]
    fn only_prohibited_clauses_match_everything_else() {
        assert!(matches("-huxley", &doc("George Orwell", "1")));
        assert!(!matches("-orwell", &doc("George Orwell", "1")));
    }

    #[test]
    fn unterminated_phrase_is_an_error() {
        assert_eq!(
            QueryString::parse("\"george orwell"),
            Err(QueryError::UnterminatedPhrase("\"george orwell".to_string()))
        );
    }

    #[test]
    fn query_of_only_operators_matches_nothing() {
        let parsed = QueryString::parse("AND OR -").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.score(&doc("George Orwell", "1")), None);
    }
}
