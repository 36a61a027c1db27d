// Query sanitization for the search and KAG query surfaces.
//
// Search queries cross the HTTP boundary as untrusted input; this module
// strips injection-style payloads before they reach the lexical index or the
// graph query engine, while preserving wildcard search semantics.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const MAX_QUERY_LENGTH: usize = 1024;
const MAX_QUERY_TERMS: usize = 50;
const MAX_TERM_LENGTH: usize = 100;

const RESERVED_CHARS: &[char] = &['<', '>', '&', '"', '\'', '\0', '\r', '\n', '\t'];

static SQL_INJECTION_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(union|select|insert|update|delete|drop|create|alter|exec|execute|script|javascript|eval|onload|onerror|onclick|<script|<iframe|<object|<embed|<link)")
        .expect("valid regex")
});

static COMMAND_INJECTION_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\||;|&&|\|\||`|\$\(|<\(|>\(|\$\{)").expect("valid regex"));

static PATH_TRAVERSAL_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\.\.\/|\.\.\\|%2e%2e|%252e%252e)").expect("valid regex"));

static LDAP_INJECTION_PATTERNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[()\\,=]").expect("valid regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not", "on",
        "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we",
        "say", "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their",
        "what", "so", "up", "out", "if", "about", "who", "get", "which", "go", "me", "when",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone)]
pub struct SanitizedQuery {
    pub text: String,
    pub terms: Vec<String>,
    pub was_modified: bool,
    pub warnings: Vec<String>,
}

impl SanitizedQuery {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() || self.text == "*"
    }

    pub fn is_wildcard(&self) -> bool {
        self.text == "*"
    }
}

/// Sanitizes a raw search or `kag_query` query string.
pub fn sanitize_search_query(query: &str) -> Result<SanitizedQuery> {
    let original = query.to_string();

    if query.len() > MAX_QUERY_LENGTH {
        bail!("query exceeds maximum length of {MAX_QUERY_LENGTH} characters");
    }
    if query.contains('\0') {
        bail!("query contains null bytes");
    }

    let mut warnings = Vec::new();
    let mut sanitized = query
        .chars()
        .map(|c| if c.is_control() && c != ' ' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for (pattern, label) in [
        (&*SQL_INJECTION_PATTERNS, "SQL-like"),
        (&*COMMAND_INJECTION_PATTERNS, "shell-like"),
        (&*PATH_TRAVERSAL_PATTERNS, "path traversal"),
    ] {
        if pattern.is_match(&sanitized) {
            warnings.push(format!("{label} patterns removed"));
            sanitized = pattern.replace_all(&sanitized, "").to_string();
        }
    }

    if LDAP_INJECTION_PATTERNS.is_match(&sanitized) {
        warnings.push("special characters removed".to_string());
        sanitized = LDAP_INJECTION_PATTERNS.replace_all(&sanitized, " ").to_string();
    }

    let mut clean = String::with_capacity(sanitized.len());
    for c in sanitized.chars() {
        if RESERVED_CHARS.contains(&c) {
            clean.push(' ');
        } else {
            clean.push(c);
        }
    }
    sanitized = clean.split_whitespace().collect::<Vec<_>>().join(" ");

    let terms: Vec<String> = sanitized
        .split_whitespace()
        .filter(|term| {
            let non_wildcard: String = term.chars().filter(|&c| c != '*').collect();
            if term.contains('*') {
                *term == "*" || (!non_wildcard.is_empty() && non_wildcard.len() <= MAX_TERM_LENGTH)
            } else {
                !term.is_empty() && term.len() <= MAX_TERM_LENGTH
            }
        })
        .take(MAX_QUERY_TERMS)
        .map(String::from)
        .collect();

    let final_text = if terms.is_empty() && query.trim() == "*" { "*".to_string() } else { terms.join(" ") };

    if final_text.is_empty() && query.trim() != "*" {
        bail!("query became empty after sanitization");
    }

    Ok(SanitizedQuery { was_modified: original != final_text, text: final_text, terms, warnings })
}

pub fn sanitize_tag(tag: &str) -> Result<String> {
    if tag.len() > 50 {
        bail!("tag exceeds maximum length of 50 characters");
    }
    if !tag.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        bail!("tag contains invalid characters");
    }
    Ok(tag.to_lowercase())
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

pub fn filter_stop_words(terms: &[String]) -> Vec<String> {
    terms.iter().filter(|term| !is_stop_word(term)).cloned().collect()
}
