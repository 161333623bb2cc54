//! Competitor name normalization
//!
//! Sources disagree on name order: some print "SMITH John", others
//! "John Smith". Normalizers map both to one comparable form.

use std::sync::Arc;

use crate::config::NameFormat;

/// Maps a raw competitor name to a comparable key
pub trait NameNormalizer: Send + Sync {
    fn normalize(&self, name: &str) -> String;

    fn matches(&self, a: &str, b: &str) -> bool {
        let a = self.normalize(a);
        !a.is_empty() && a == self.normalize(b)
    }
}

/// Detects leading all-caps surname tokens and moves them to the end
///
/// "SMITH John" and "John SMITH" both become "john smith". Punctuation other
/// than hyphens and apostrophes is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapitalizationNormalizer;

/// Lowercases and collapses whitespace, nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct CaseFoldNormalizer;

fn tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'')
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_upper_token(token: &str) -> bool {
    let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
    // Single initials ("J.") are not surnames
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

impl NameNormalizer for CapitalizationNormalizer {
    fn normalize(&self, name: &str) -> String {
        let tokens = tokens(name);
        let leading_upper = tokens.iter().take_while(|t| is_upper_token(t)).count();

        let ordered: Vec<&String> = if leading_upper > 0 && leading_upper < tokens.len() {
            tokens[leading_upper..]
                .iter()
                .chain(tokens[..leading_upper].iter())
                .collect()
        } else {
            tokens.iter().collect()
        };

        ordered
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl NameNormalizer for CaseFoldNormalizer {
    fn normalize(&self, name: &str) -> String {
        name.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn normalizer_for(format: NameFormat) -> Arc<dyn NameNormalizer> {
    match format {
        NameFormat::Capitalization => Arc::new(CapitalizationNormalizer),
        NameFormat::CaseFold => Arc::new(CaseFoldNormalizer),
    }
}
