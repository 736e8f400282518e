//! Selection queries for the bundled note stores.
//!
//! A small subset of a flashcard browser's search grammar: whitespace
//! separated terms that must all hold, optional `-` negation, quoting, and
//! `tag:`, `deck:`, `note:` and `<field>:` prefixes. Bare words match
//! anywhere in any field.

use crate::error::AppError;
use crate::note::Note;
use lazy_static::lazy_static;
use regex::Regex;

pub const QUERY_HELP: &str = "\
Enter a search query (leave blank = all notes)

Examples:
  deck:Endocrinology        → notes in the deck
  tag:PCOS                  → notes with this tag
  deck:\"Year 4 Medicine\" tag:\"heart failure\"

Use quotes for names with spaces, * as a wildcard and a leading - to negate a term.";

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r#"(-?)((?:[^\s"]+|"[^"]*")+)"#).unwrap();
}

#[derive(Debug, Clone)]
enum Matcher {
    Tag(Regex),
    Deck(Regex),
    NoteType(Regex),
    Field { name: String, pattern: Regex },
    Text(Regex),
}

#[derive(Debug, Clone)]
struct Term {
    negated: bool,
    matcher: Matcher,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    terms: Vec<Term>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        if input.matches('"').count() % 2 != 0 {
            return Err(AppError::Query(format!("unbalanced quotes in {:?}", input)));
        }

        let mut terms = Vec::new();
        for cap in TOKEN.captures_iter(input) {
            let negated = !cap[1].is_empty();
            let raw = &cap[2];

            if !negated && raw.eq_ignore_ascii_case("and") {
                continue;
            }
            if raw.eq_ignore_ascii_case("or") {
                return Err(AppError::Query("`or` is not supported".to_string()));
            }

            terms.push(Term {
                negated,
                matcher: parse_term(raw)?,
            });
        }

        log::trace!("Parsed query {:?} into {} terms", input, terms.len());
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, note: &Note) -> bool {
        self.terms
            .iter()
            .all(|term| term.matcher.matches(note) != term.negated)
    }
}

impl Matcher {
    fn matches(&self, note: &Note) -> bool {
        match self {
            Matcher::Tag(pattern) => note.tags.iter().any(|t| pattern.is_match(t)),
            Matcher::Deck(pattern) => pattern.is_match(&note.deck),
            Matcher::NoteType(pattern) => pattern.is_match(&note.note_type),
            Matcher::Field { name, pattern } => note
                .field(name)
                .map(|f| pattern.is_match(f.text()))
                .unwrap_or(false),
            Matcher::Text(pattern) => note.field_texts().any(|t| pattern.is_match(t)),
        }
    }
}

fn parse_term(raw: &str) -> Result<Matcher, AppError> {
    if !raw.starts_with('"') {
        if let Some((prefix, value)) = raw.split_once(':') {
            let value = unquote(value);
            if value.is_empty() {
                return Err(AppError::Query(format!("missing value after {:?}", prefix)));
            }
            let matcher = match prefix.to_ascii_lowercase().as_str() {
                "tag" => Matcher::Tag(hierarchy_glob(&value)?),
                "deck" => Matcher::Deck(hierarchy_glob(&value)?),
                "note" => Matcher::NoteType(glob(&value, true)?),
                _ => Matcher::Field {
                    name: unquote(prefix),
                    pattern: glob(&value, true)?,
                },
            };
            return Ok(matcher);
        }
    }

    let text = unquote(raw);
    if text.is_empty() {
        return Err(AppError::Query("empty search term".to_string()));
    }
    Ok(Matcher::Text(glob(&text, false)?))
}

fn unquote(raw: &str) -> String {
    raw.replace('"', "")
}

fn wildcard_body(value: &str) -> String {
    value
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

fn glob(value: &str, anchored: bool) -> Result<Regex, AppError> {
    let body = wildcard_body(value);
    let pattern = if anchored {
        format!("(?is)^{}$", body)
    } else {
        format!("(?is){}", body)
    };
    Ok(Regex::new(&pattern)?)
}

/// `Parent` also matches `Parent::Child`.
fn hierarchy_glob(value: &str) -> Result<Regex, AppError> {
    Ok(Regex::new(&format!("(?is)^{}(::.*)?$", wildcard_body(value)))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Note {
        Note::new(1)
            .with_deck("Year 4 Medicine::Cardiology")
            .with_field("Front", "Which echo finding suggests tamponade?")
            .with_field("Back", "Diastolic collapse")
            .with_tag("heart_failure")
            .with_tag("PCOS::Imaging")
    }

    fn hit(query: &str) -> bool {
        Query::parse(query).unwrap().matches(&sample())
    }

    #[test]
    fn blank_query_matches_everything() {
        let query = Query::parse("   ").unwrap();
        assert!(query.is_empty());
        assert!(query.matches(&sample()));
    }

    #[test]
    fn tags_match_case_insensitively_and_by_parent() {
        assert!(hit("tag:HEART_FAILURE"));
        assert!(hit("tag:pcos"));
        assert!(hit("tag:pcos::imaging"));
        assert!(hit("tag:heart*"));
        assert!(!hit("tag:heart"));
    }

    #[test]
    fn quoted_deck_names_and_sub_decks() {
        assert!(hit(r#"deck:"Year 4 Medicine""#));
        assert!(hit(r#"deck:"year 4 medicine::cardiology""#));
        assert!(!hit("deck:Endocrinology"));
    }

    #[test]
    fn terms_are_combined_with_and() {
        assert!(hit(r#"deck:"Year 4 Medicine" tag:heart_failure"#));
        assert!(!hit(r#"deck:"Year 4 Medicine" tag:renal"#));
        assert!(hit("echo and tamponade"));
    }

    #[test]
    fn negation() {
        assert!(hit("-tag:renal"));
        assert!(!hit("-echo"));
    }

    #[test]
    fn bare_words_and_phrases_search_all_fields() {
        assert!(hit("ECHO"));
        assert!(hit(r#""diastolic collapse""#));
        assert!(hit("tampon*"));
        assert!(!hit("mri"));
    }

    #[test]
    fn field_terms_match_whole_field_text() {
        assert!(hit("back:*collapse"));
        assert!(hit(r#"back:"diastolic collapse""#));
        assert!(!hit("back:diastolic"));
        assert!(!hit("extra:*"));
    }

    #[test]
    fn malformed_queries_are_rejected() {
        assert!(matches!(Query::parse(r#"deck:"open"#), Err(AppError::Query(_))));
        assert!(matches!(Query::parse("tag:"), Err(AppError::Query(_))));
        assert!(matches!(Query::parse("echo or mri"), Err(AppError::Query(_))));
    }
}
