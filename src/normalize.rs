//! Name normalization.
//!
//! The normalized key is used only for matching, never for display. It is a
//! pure function of its input: lowercase, whitespace collapsed, trailing
//! possessives removed, and a closed punctuation set stripped while keeping
//! hyphens that join two word parts ("Smith-Jones").

use std::sync::OnceLock;

use regex::Regex;

/// Characters removed from names. Hyphens are handled separately.
const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '"', '\'', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '(',
    ')', '[', ']', '{', '}', '<', '>', '/', '\\', '|', '*', '~', '`', '^', '#', '@', '$', '%', '+',
    '=', '_', '&',
];

/// Apostrophes survive the trailing trim so possessives can be recognized.
const APOSTROPHES: &[char] = &['\'', '\u{2019}'];

/// En and em dashes are folded onto the ASCII hyphen before hyphen handling.
const DASHES: &[char] = &['\u{2010}', '\u{2011}', '\u{2013}', '\u{2014}'];

static POSSESSIVE: OnceLock<Regex> = OnceLock::new();

fn possessive() -> &'static Regex {
    // `s'` plurals lose only the apostrophe, which the punctuation pass
    // would remove anyway.
    POSSESSIVE.get_or_init(|| Regex::new(r"['\u{2019}]s?$").expect("possessive pattern is valid"))
}

/// Normalizes an entity name into its matching key.
///
/// Total and panic-free for any input; an empty or punctuation-only name
/// yields an empty key, which callers must reject.
///
/// # Examples
///
/// ```
/// use entigraph::normalize::normalize;
///
/// assert_eq!(normalize("  The   FBI's "), "the fbi");
/// assert_eq!(normalize("Jean-Paul Sartre"), "jean-paul sartre");
/// assert_eq!(normalize("U.S.A."), "usa");
/// assert_eq!(normalize(""), "");
/// ```
#[must_use]
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut key = String::with_capacity(lowered.len());

    for word in lowered.split_whitespace() {
        let word = word.trim_end_matches(|c: char| {
            (STRIPPED_PUNCTUATION.contains(&c) && !APOSTROPHES.contains(&c))
                || c == '-'
                || DASHES.contains(&c)
        });
        let word = possessive().replace(word, "");
        let cleaned = clean_word(&word);
        if cleaned.is_empty() {
            continue;
        }
        if !key.is_empty() {
            key.push(' ');
        }
        key.push_str(&cleaned);
    }

    key
}

/// Strips punctuation from one word and keeps only internal hyphens.
fn clean_word(word: &str) -> String {
    let stripped: String = word
        .chars()
        .map(|c| if DASHES.contains(&c) { '-' } else { c })
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();

    stripped
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Splits a normalized key into its tokens.
#[must_use]
pub fn tokens(key: &str) -> impl Iterator<Item = &str> {
    key.split(' ').filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Acme Corp  "), "acme corp");
        assert_eq!(normalize("THE FBI"), "the fbi");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("New \t York\n  City"), "new york city");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("Acme, Inc."), "acme inc");
        assert_eq!(normalize("(Reuters)"), "reuters");
        assert_eq!(normalize("\"Deep Throat\""), "deep throat");
        assert_eq!(normalize("AT&T"), "att");
    }

    #[test]
    fn test_normalize_keeps_internal_hyphens() {
        assert_eq!(normalize("Smith-Jones"), "smith-jones");
        assert_eq!(normalize("--Smith--Jones--"), "smith-jones");
        assert_eq!(normalize("Smith - Jones"), "smith jones");
        assert_eq!(normalize("Smith\u{2013}Jones"), "smith-jones");
    }

    #[test]
    fn test_normalize_strips_possessives() {
        assert_eq!(normalize("Smith's"), "smith");
        assert_eq!(normalize("Nobel\u{2019}s prize"), "nobel prize");
        assert_eq!(normalize("The Smiths'"), "the smiths");
        assert_eq!(normalize("O'Neil"), "oneil");
    }

    #[test]
    fn test_normalize_possessive_before_punctuation() {
        assert_eq!(normalize("Smith's."), "smith");
        assert_eq!(normalize("Smith's,"), "smith");
        assert_eq!(normalize("(The FBI's)"), "the fbi");
        assert_eq!(normalize("\"Nobel\u{2019}s\""), "nobel");
        assert_eq!(normalize("The Smiths'."), "the smiths");
        assert_eq!(normalize("Smith's."), normalize("Smith's"));
    }

    #[test]
    fn test_normalize_empty_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("... !!"), "");
        assert_eq!(normalize("-"), "");
    }

    #[test]
    fn test_normalize_unicode_lowercase() {
        assert_eq!(normalize("ÉCOLE Normale"), "école normale");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in [
            "The FBI's",
            "(Smith's.)",
            "Jean-Paul  Sartre",
            "U.S. Dept. of State",
            "ÉCOLE",
        ] {
            let once = normalize(name);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let a = normalize("Ada Lovelace's");
        let b = normalize("Ada Lovelace's");
        assert_eq!(a, b);
    }

    #[test]
    fn test_tokens() {
        let key = normalize("Grace  Hopper");
        assert_eq!(tokens(&key).collect::<Vec<_>>(), vec!["grace", "hopper"]);
        assert_eq!(tokens("").count(), 0);
    }
}
