//! Query classification
//!
//! Decides which entity categories a raw query targets and how it is rewritten
//! into FTS5 match syntax. Classification is a pure function of the input text.

use crate::interface::Category;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Inputs with fewer characters are rejected
pub const MIN_QUERY_LEN: usize = 2;

/// Catalog numbers are four digits wide; anything shorter is a prefix
pub const FULL_CATALOG_DIGITS: usize = 4;

/// Inputs this short are too ambiguous to trust the index alone
const LOW_CONFIDENCE_MAX_LEN: usize = 3;

/// Department letters, optional space, catalog number, optional suffix letter (lab sections)
static COURSE_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z]{2,4})\s?(\d{1,4})([a-z]?)$").unwrap()
});

static DEPARTMENT_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2,4}$").unwrap()
});

/// Two to four words made of name characters, e.g. `smith, john` or `mary o'neil`
static PERSON_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\p{L}[\p{L}.'\-]*,?(?: \p{L}[\p{L}.'\-]*,?){1,3}$").unwrap()
});

static ALPHA_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\p{L}{3,}$").unwrap()
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Query is empty")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryCategory {
    CourseCodeExact,
    CourseCodePartial,
    DepartmentPrefix,
    PersonName,
    FreeText,
}

impl QueryCategory {
    /// Categories to search, in response order
    pub fn targets(&self) -> &'static [Category] {
        match self {
            QueryCategory::CourseCodeExact | QueryCategory::CourseCodePartial => &[Category::Course],
            QueryCategory::DepartmentPrefix => {
                &[Category::Department, Category::Course, Category::Professor]
            }
            QueryCategory::PersonName => {
                &[Category::Professor, Category::Course, Category::Department]
            }
            QueryCategory::FreeText => &[Category::Course, Category::Professor, Category::Department],
        }
    }
}

/// Structured match pattern, rendered to FTS5 syntax per target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    /// Full code, matched both compact and spaced: `"cs1301" OR "cs 1301"`
    CourseCode { dept: String, number: String },
    /// Department anchored, number as prefix: `dept_abbr : "cs" AND course_num : "13"*`
    CoursePrefix { dept: String, number_prefix: String },
    /// Token prefix: `"chem"*`
    Prefix(String),
    /// Exact phrase: `"intro to computing"`
    Phrase(String),
}

impl MatchPattern {
    pub fn fts_expression(&self, target: Category) -> String {
        match self {
            MatchPattern::CourseCode { dept, number } => format!(
                "{} OR {}",
                quote(&format!("{}{}", dept, number)),
                quote(&format!("{} {}", dept, number))
            ),
            MatchPattern::CoursePrefix { dept, number_prefix } => match target {
                Category::Course => format!(
                    "dept_abbr : {} AND course_num : {}*",
                    quote(dept),
                    quote(number_prefix)
                ),
                _ => format!("{}*", quote(dept)),
            },
            MatchPattern::Prefix(term) => match target {
                Category::Professor => format!("name : {}*", quote(term)),
                _ => format!("{}*", quote(term)),
            },
            MatchPattern::Phrase(phrase) => quote(phrase),
        }
    }
}

/// FTS5 string literal: wrap in double quotes, double any embedded quote
fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// A classified query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    normalized: String,
    category: QueryCategory,
    pattern: MatchPattern,
    low_confidence: bool,
}

impl SearchQuery {
    /// Trimmed, lowercased, whitespace runs collapsed
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Normalized text with all whitespace removed, for substring comparison
    pub fn compact(&self) -> String {
        self.normalized.split_whitespace().collect()
    }

    pub fn category(&self) -> QueryCategory {
        self.category
    }

    pub fn pattern(&self) -> &MatchPattern {
        &self.pattern
    }

    pub fn targets(&self) -> &'static [Category] {
        self.category.targets()
    }

    /// Low-confidence queries merge substring rows with indexed rows
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence
    }

    /// Person names also match with the last token moved first, so
    /// `john smith` finds a professor stored as `Smith, John`.
    pub fn fts_expression(&self, target: Category) -> String {
        let expression = self.pattern.fts_expression(target);
        match (&self.pattern, self.category, target) {
            (MatchPattern::Phrase(phrase), QueryCategory::PersonName, Category::Professor) => {
                match surname_first(phrase) {
                    Some(swapped) => format!("{} OR {}", expression, quote(&swapped)),
                    None => expression,
                }
            }
            _ => expression,
        }
    }
}

/// `john a smith` -> `smith john a`; `None` when the order would not change
fn surname_first(phrase: &str) -> Option<String> {
    let mut tokens: Vec<&str> = phrase
        .split_whitespace()
        .map(|t| t.trim_end_matches(','))
        .filter(|t| !t.is_empty())
        .collect();
    let last = tokens.pop()?;
    if tokens.is_empty() {
        return None;
    }
    tokens.insert(0, last);
    let swapped = tokens.join(" ");
    (swapped != phrase.replace(',', "")).then_some(swapped)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Too short to search; answered with empty groups
    Rejected,
    Query(SearchQuery),
}

/// Lowercase, trim, and collapse internal whitespace
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 2-4 letters and nothing else, e.g. `CS` or `chem`
pub fn is_department_prefix_shape(raw: &str) -> bool {
    DEPARTMENT_PREFIX_REGEX.is_match(&normalize(raw))
}

pub fn classify(raw: &str) -> Result<Classification, ClassifyError> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(ClassifyError::Empty);
    }

    let char_count = normalized.chars().count();
    if char_count < MIN_QUERY_LEN && !DEPARTMENT_PREFIX_REGEX.is_match(&normalized) {
        return Ok(Classification::Rejected);
    }

    let (category, pattern) = classify_shape(&normalized);
    let low_confidence =
        category == QueryCategory::DepartmentPrefix || char_count <= LOW_CONFIDENCE_MAX_LEN;

    Ok(Classification::Query(SearchQuery {
        normalized,
        category,
        pattern,
        low_confidence,
    }))
}

fn classify_shape(normalized: &str) -> (QueryCategory, MatchPattern) {
    if let Some(caps) = COURSE_CODE_REGEX.captures(normalized) {
        let dept = caps[1].to_string();
        let digits = &caps[2];
        let suffix = &caps[3];

        if digits.len() == FULL_CATALOG_DIGITS {
            let number = format!("{}{}", digits, suffix);
            return (QueryCategory::CourseCodeExact, MatchPattern::CourseCode { dept, number });
        }
        if suffix.is_empty() {
            let number_prefix = digits.to_string();
            return (
                QueryCategory::CourseCodePartial,
                MatchPattern::CoursePrefix { dept, number_prefix },
            );
        }
    }

    if DEPARTMENT_PREFIX_REGEX.is_match(normalized) {
        return (QueryCategory::DepartmentPrefix, MatchPattern::Prefix(normalized.to_string()));
    }

    if normalized.contains(' ') {
        let category = if PERSON_NAME_REGEX.is_match(normalized) {
            QueryCategory::PersonName
        } else {
            QueryCategory::FreeText
        };
        return (category, MatchPattern::Phrase(normalized.to_string()));
    }

    if ALPHA_TOKEN_REGEX.is_match(normalized) {
        return (QueryCategory::FreeText, MatchPattern::Prefix(normalized.to_string()));
    }

    (QueryCategory::FreeText, MatchPattern::Phrase(normalized.to_string()))
}
