//! Comparaison des codes de linha
//!
//! L'amont n'est pas cohérent sur le zéro-padding ("0.123", "123", "0123").
//! Deux codes correspondent si leurs formes normalisées (trim + majuscules)
//! sont égales, ou si leurs formes "chiffres seuls" sans zéros de tête le sont.

/// Trim + majuscules
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Chiffres seuls, zéros de tête retirés ("0.123" -> "123")
pub fn digits_only(code: &str) -> String {
    let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.trim_start_matches('0').to_string()
}

/// Vrai si les deux codes désignent la même linha
pub fn codes_match(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    let (da, db) = (digits_only(&na), digits_only(&nb));
    !da.is_empty() && da == db
}

/// Vrai si l'un des candidats correspond au code cherché
pub fn any_matches<'a, I>(candidates: I, target: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().any(|c| codes_match(c, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_padding() {
        assert!(codes_match("0.123", "123"));
        assert!(codes_match("0.123", "0123"));
        assert!(!codes_match("0.123", "1230"));
    }

    #[test]
    fn test_raw_equality() {
        assert!(codes_match(" 110.1 ", "110.1"));
        assert!(codes_match("abc", "ABC"));
        assert!(!codes_match("ABC", "ABD"));
    }

    #[test]
    fn test_empty_never_matches() {
        assert!(!codes_match("", ""));
        assert!(!codes_match("  ", "123"));
    }

    #[test]
    fn test_only_zeros() {
        // "0" et "000" n'ont pas de chiffres significatifs, seule l'égalité brute compte
        assert!(!codes_match("0", "000"));
        assert!(codes_match("0", "0"));
    }

    #[test]
    fn test_letters_without_digits() {
        assert!(!codes_match("EXPRESSO", "EIXO"));
    }

    #[test]
    fn test_any_matches() {
        assert!(any_matches(["0.110", "X"], "110"));
        assert!(!any_matches(Vec::<&str>::new(), "110"));
    }
}
