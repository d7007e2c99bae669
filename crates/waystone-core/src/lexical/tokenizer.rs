//! Query/document tokenization for the lexical index.
//!
//! Lowercases, folds common Latin diacritics to their base letter, and
//! splits on anything non-alphanumeric. Single-character tokens are kept:
//! short prefixes matter for search-as-you-type.

/// Folds an accented Latin character to its base letter.
///
/// Covers the Latin-1 range plus a few common extensions; anything else
/// passes through unchanged. Input is expected to be lowercased already.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'ł' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
        'ř' => 'r',
        'ś' | 'š' => 's',
        'ť' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Tokenizes `text` into lowercase, diacritic-folded terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.to_lowercase().chars().map(fold_diacritic) {
        if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Normalizes a single term (tag names, single-token lookups).
pub fn normalize_term(term: &str) -> String {
    term.to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_alphanumeric())
        .collect()
}
