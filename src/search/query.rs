//! Query parsing: free text in, terms, phrases, and implicit filters out.
//!
//! Parsing never fails; the worst input yields an empty [`ParsedQuery`].
//! Implicit-filter extraction is table-driven so new categories are data
//! additions, not code changes.

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{normalize_keeping_quotes, tokenize};

/// Parsed form of one query string. Ephemeral, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Deduplicated search terms, first-seen order.
    pub terms: Vec<String>,
    /// Quoted phrases, in order of appearance.
    pub phrases: Vec<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub company_size: Option<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.phrases.is_empty()
    }
}

static QUOTED_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("valid regex"));

struct Dictionary {
    entries: Vec<(Regex, &'static str)>,
}

impl Dictionary {
    fn new(table: &[(&str, &'static str)]) -> Self {
        let entries = table
            .iter()
            .map(|(pattern, value)| {
                (
                    Regex::new(&format!(r"\b(?:{pattern})\b")).expect("valid dictionary pattern"),
                    *value,
                )
            })
            .collect();
        Dictionary { entries }
    }

    /// First matching entry wins; no match is not an error.
    fn lookup(&self, text: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, value)| (*value).to_string())
    }
}

static INDUSTRY_HINTS: Lazy<Dictionary> = Lazy::new(|| {
    Dictionary::new(&[
        ("tech|technology|software|it", "Technology"),
        ("ecommerce|e-commerce|retail|commerce", "E-commerce"),
        ("finance|financial|bank|banking", "Finance"),
        ("health|healthcare|medical", "Healthcare"),
        ("education|educational|school", "Education"),
        ("manufacturing|industrial", "Manufacturing"),
    ])
});

static LOCATION_HINTS: Lazy<Dictionary> = Lazy::new(|| {
    Dictionary::new(&[
        ("são paulo|sao paulo|sp", "São Paulo"),
        ("rio de janeiro|rio|rj", "Rio de Janeiro"),
        ("belo horizonte|bh|minas", "Belo Horizonte"),
        ("brasília|brasilia|df", "Brasília"),
        ("salvador|bahia|ba", "Salvador"),
    ])
});

static SIZE_HINTS: Lazy<Dictionary> = Lazy::new(|| {
    Dictionary::new(&[
        ("startup|small", "1-10"),
        ("medium|mid-size", "11-50"),
        ("large|big", "51-200"),
        ("enterprise|corporation|multinational", "200+"),
    ])
});

#[derive(Debug, Default)]
pub struct QueryProcessor;

impl QueryProcessor {
    pub fn new() -> Self {
        QueryProcessor
    }

    pub fn parse(&self, query_text: &str) -> ParsedQuery {
        if query_text.trim().is_empty() {
            return ParsedQuery::default();
        }

        let clean = normalize_keeping_quotes(query_text);

        let phrases: Vec<String> = QUOTED_PHRASE
            .captures_iter(&clean)
            .map(|c| c[1].trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        // Phrases are removed before term extraction so quoted words are not
        // double-counted as loose terms.
        let without_phrases = QUOTED_PHRASE.replace_all(&clean, " ");
        let terms = tokenize(&without_phrases);

        ParsedQuery {
            terms,
            phrases,
            industry: INDUSTRY_HINTS.lookup(&clean),
            location: LOCATION_HINTS.lookup(&clean),
            company_size: SIZE_HINTS.lookup(&clean),
        }
    }
}
