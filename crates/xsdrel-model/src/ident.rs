//! Identifier sanitation for translating XSD names into SQL identifiers.
//!
//! Every function here is total and deterministic: the same input always
//! produces the same output, with no dependency on anything outside the
//! string itself.

/// Replace every non-alphanumeric character with `_`, trim leading/trailing
/// `_`, fall back to `"Id"` on empty input, and prefix a leading digit with
/// `N_` (SQL Server identifiers cannot start with a digit).
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        return "Id".to_string();
    }

    if trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        format!("N_{trimmed}")
    } else {
        trimmed
    }
}

/// Split on `_`, `-`, and space, and PascalCase the result: uppercase the
/// first letter of every part, keep the rest as written, and concatenate.
pub fn pascal(s: &str) -> String {
    s.split(|c| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Render a SQL Server bracket-qualified two-part name: `[schema].[name]`.
pub fn qualify(schema: &str, name: &str) -> String {
    format!("[{schema}].[{name}]")
}

/// `pascal(sanitize(raw))`, the composition used whenever an XSD local name
/// becomes a table or column name.
pub fn pascal_sanitized(raw: &str) -> String {
    pascal(&sanitize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_alphanumeric() {
        assert_eq!(sanitize("foo.bar-baz"), "foo_bar_baz");
    }

    #[test]
    fn sanitize_trims_underscores() {
        assert_eq!(sanitize("__foo__"), "foo");
    }

    #[test]
    fn sanitize_empty_becomes_id() {
        assert_eq!(sanitize(""), "Id");
        assert_eq!(sanitize("___"), "Id");
    }

    #[test]
    fn sanitize_prefixes_leading_digit() {
        assert_eq!(sanitize("123abc"), "N_123abc");
    }

    #[test]
    fn pascal_splits_on_separators() {
        assert_eq!(pascal("root_item"), "RootItem");
        assert_eq!(pascal("root-item name"), "RootItemName");
    }

    #[test]
    fn pascal_is_idempotent_on_already_pascal_input() {
        assert_eq!(pascal("RootItem"), "RootItem");
    }

    #[test]
    fn qualify_brackets_both_parts() {
        assert_eq!(qualify("xsd", "Root"), "[xsd].[Root]");
    }

    #[test]
    fn pascal_sanitized_composes() {
        assert_eq!(pascal_sanitized("root.item-id"), "RootItemId");
    }

    proptest::proptest! {
        #[test]
        fn sanitize_never_empty(s in ".*") {
            assert!(!sanitize(&s).is_empty());
        }

        #[test]
        fn sanitize_never_starts_with_digit(s in ".*") {
            let out = sanitize(&s);
            assert!(!out.chars().next().unwrap().is_ascii_digit());
        }

        #[test]
        fn sanitize_is_deterministic(s in ".*") {
            assert_eq!(sanitize(&s), sanitize(&s));
        }
    }
}
