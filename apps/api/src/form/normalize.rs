//! Field name normalizer — raw form-field identifiers to stable lookup keys.
//!
//! Raw names come from PDF AcroForm dictionaries and from oracle output, so
//! they carry PDF string/name escapes, hierarchy punctuation and mixed case.
//! The output alphabet is `[a-z0-9_]`, which makes the function idempotent.

/// Escapes that encode a literal underscore (octal string escape, name hex escape).
const UNDERSCORE_ESCAPES: &[&str] = &["\\137", "#5f", "#5F"];

/// Escapes that carry no content: line continuations and NUL padding.
const DELETED_ESCAPES: &[&str] = &["\\\r\n", "\\\n", "\\\r", "\\000", "#00"];

pub fn normalize_field_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut name = unwrapped.to_string();
    for escape in DELETED_ESCAPES {
        name = name.replace(escape, "");
    }
    for escape in UNDERSCORE_ESCAPES {
        name = name.replace(escape, "_");
    }

    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acroform_hierarchy_name() {
        assert_eq!(
            normalize_field_name("form1[0].#subform[0].Pt1Line1a_FamilyName[0]"),
            "form1_0___subform_0__pt1line1a_familyname_0_"
        );
    }

    #[test]
    fn test_enclosing_parentheses_stripped_once() {
        assert_eq!(normalize_field_name("(Salary Amount)"), "salary_amount");
        assert_eq!(normalize_field_name("((x))"), "_x_");
    }

    #[test]
    fn test_underscore_escapes() {
        assert_eq!(normalize_field_name("salary\\137amount"), "salary_amount");
        assert_eq!(normalize_field_name("salary#5Famount"), "salary_amount");
    }

    #[test]
    fn test_deleted_escapes() {
        assert_eq!(normalize_field_name("publi\\\ncations"), "publications");
        assert_eq!(normalize_field_name("award#00name"), "awardname");
    }

    #[test]
    fn test_non_ascii_becomes_underscore() {
        assert_eq!(normalize_field_name("Name–Given"), "name_given");
    }

    #[test]
    fn test_idempotent_over_samples() {
        let samples = [
            "",
            "(",
            "()",
            "(a)",
            "Pt5Line7_Salary[0]",
            "\\137\\137",
            "##5f5F",
            "(\\000)",
            "ÄÖÜ straße",
            "form1[0].#subform[3].P5_Line3a_CityTown[0]",
            "  padded name  ",
        ];
        for sample in samples {
            let once = normalize_field_name(sample);
            assert_eq!(normalize_field_name(&once), once, "not idempotent for {sample:?}");
        }
    }
}
