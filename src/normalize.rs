//! Value normalizer.
//!
//! Facts arrive from an LLM extractor and from case metadata, and rules are
//! authored by hand, so the same boolean shows up as `true`, `1`, `"1"`,
//! `"sim"` or `"yes"`. Every comparison runs both sides through
//! [`normalize_bool`] first so those spellings collapse into one domain.
//! Numeric comparisons parse both sides with [`parse_number`] instead.

use std::collections::HashSet;

use lazy_static::lazy_static;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::value::Literal;

lazy_static! {
    static ref TRUE_TOKENS: HashSet<&'static str> = ["1", "true", "sim", "yes"].into_iter().collect();
    static ref FALSE_TOKENS: HashSet<&'static str> = ["0", "false", "nao", "no"].into_iter().collect();
}

/// Trimmed, lowercased, with diacritics stripped (`"Não"` becomes `"nao"`).
pub fn fold_text(text: &str) -> String {
    text.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Map a boolean-ish spelling onto `Literal::Bool`; anything else is returned unchanged.
pub fn normalize_bool(value: &Literal) -> Literal {
    match value {
        Literal::Number(n) if *n == 1.0 => Literal::Bool(true),
        Literal::Number(n) if *n == 0.0 => Literal::Bool(false),
        Literal::String(s) => {
            let folded = fold_text(s);
            if TRUE_TOKENS.contains(folded.as_str()) {
                Literal::Bool(true)
            } else if FALSE_TOKENS.contains(folded.as_str()) {
                Literal::Bool(false)
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

/// Normalize a rule literal at authoring time, descending into lists.
pub fn normalize_literal(value: &Literal) -> Literal {
    match value {
        Literal::List(items) => Literal::List(items.iter().map(normalize_bool).collect()),
        other => normalize_bool(other),
    }
}

/// Best-effort numeric reading. Booleans read as `1`/`0`, strings are
/// trimmed and may use a comma as decimal separator.
pub fn parse_number(value: &Literal) -> Option<f64> {
    let n = match value {
        Literal::Number(n) => *n,
        Literal::Bool(b) => f64::from(u8::from(*b)),
        Literal::String(s) => {
            let trimmed = s.trim();
            let parsed = trimmed.parse::<f64>().ok().or_else(|| {
                if trimmed.contains(',') && !trimmed.contains('.') {
                    trimmed.replace(',', ".").parse::<f64>().ok()
                } else {
                    None
                }
            });
            parsed?
        }
        Literal::List(_) | Literal::Null => return None,
    };
    n.is_finite().then_some(n)
}

/// Equality after normalization.
///
/// Strings compare case- and diacritic-insensitively; a string that reads as
/// a number equals that number, or `1`/`0` against a boolean. Lists are
/// equal element-wise.
pub fn values_equal(left: &Literal, right: &Literal) -> bool {
    match (normalize_bool(left), normalize_bool(right)) {
        (Literal::Bool(a), Literal::Bool(b)) => a == b,
        (Literal::Number(a), Literal::Number(b)) => a == b,
        (Literal::String(a), Literal::String(b)) => fold_text(&a) == fold_text(&b),
        (Literal::Number(a), s @ Literal::String(_)) | (s @ Literal::String(_), Literal::Number(a)) => {
            parse_number(&s) == Some(a)
        }
        // `1` and `0` normalize to booleans, so `"1.0"` has to meet them here.
        (b @ Literal::Bool(_), s @ Literal::String(_)) | (s @ Literal::String(_), b @ Literal::Bool(_)) => {
            parse_number(&s).is_some_and(|n| parse_number(&b) == Some(n))
        }
        (Literal::List(a), Literal::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => false,
    }
}

/// Membership test used by `in_list`: a list fact matches when any of its
/// elements is a member.
pub fn in_list(actual: &Literal, candidates: &Literal) -> bool {
    let candidates = candidates.as_slice();
    match actual {
        Literal::List(items) => items
            .iter()
            .any(|item| candidates.iter().any(|c| values_equal(item, c))),
        scalar => candidates.iter().any(|c| values_equal(scalar, c)),
    }
}
