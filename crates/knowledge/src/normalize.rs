//! Text normalization for mixed French and Arabic input.
//!
//! The same functions run over corpus text at indexing time and over user
//! queries at search time, so any change here requires re-indexing.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics, collapse whitespace.
///
/// `"  Été  "` becomes `"ete"`.
pub fn normalize_latin(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    collapse_whitespace(&stripped)
}

/// Fold Arabic orthographic variants and remove vowel marks.
///
/// - alif variants `إ أ آ ٱ` become `ا`
/// - `ى` becomes `ي`
/// - hamza carriers `ؤ`, `ئ` become `و`, `ي`
/// - `ة` becomes `ه`
/// - harakat (U+064B..=U+065F) and tatweel (U+0640) are removed
///
/// Whitespace is left as is.
pub fn normalize_arabic(text: &str) -> String {
    text.chars().filter_map(fold_arabic).collect()
}

/// Full pipeline used for embedding input and queries.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter_map(fold_arabic)
        .collect();

    // Last, so that removed marks cannot leave double spaces behind
    collapse_whitespace(&folded)
}

fn fold_arabic(c: char) -> Option<char> {
    match c {
        'إ' | 'أ' | 'آ' | 'ٱ' => Some('ا'),
        'ى' => Some('ي'),
        'ؤ' => Some('و'),
        'ئ' => Some('ي'),
        'ة' => Some('ه'),
        '\u{064B}'..='\u{065F}' | '\u{0640}' => None,
        other => Some(other),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_strips_accents_and_case() {
        assert_eq!(normalize_latin("  Jeûne   ÉPREUVE\tCœur "), "jeune epreuve cœur");
        assert_eq!(normalize_latin("Ṣalāt"), "salat");
    }

    #[test]
    fn test_arabic_folding() {
        assert_eq!(normalize_arabic("إِيمَان"), "ايمان");
        assert_eq!(normalize_arabic("أُمَّة"), "امه");
        assert_eq!(normalize_arabic("عِيسَى"), "عيسي");
        assert_eq!(normalize_arabic("مُؤْمِن"), "مومن");
        assert_eq!(normalize_arabic("الصَّـــبْر"), "الصبر");
    }

    #[test]
    fn test_arabic_keeps_whitespace() {
        assert_eq!(normalize_arabic("ا  ب"), "ا  ب");
    }

    #[test]
    fn test_normalize_text_mixed() {
        assert_eq!(
            normalize_text("La Patience  (الصَّبْر) dans l'épreuve"),
            "la patience (الصبر) dans l'epreuve"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Que dit le Coran sur le jeûne ?",
            "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ",
            "word ـ word",
            "  Mixed  Été  إِنَّ  ",
            "",
        ];

        for sample in samples {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", sample);
            assert_eq!(normalize_latin(&normalize_latin(sample)), normalize_latin(sample));
            assert_eq!(normalize_arabic(&normalize_arabic(sample)), normalize_arabic(sample));
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_latin("   "), "");
        assert_eq!(normalize_arabic(""), "");
    }
}
