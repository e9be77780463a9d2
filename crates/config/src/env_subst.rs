/// Expand `${ENV_VAR}` placeholders in raw config text.
///
/// Placeholders naming an unset variable are kept verbatim so the parse
/// error (if any) points at the original text.
pub fn substitute_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Unterminated or empty placeholder.
                out.push_str("${");
                rest = after;
            },
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CHAINSCOPE_TEST_CHROME" => Some("/opt/chrome".into()),
            "POOL" => Some("4".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variables() {
        assert_eq!(
            expand_with(
                "chrome_path = \"${CHAINSCOPE_TEST_CHROME}\"\npool_size = ${POOL}",
                lookup
            ),
            "chrome_path = \"/opt/chrome\"\npool_size = 4"
        );
    }

    #[test]
    fn keeps_unknown_placeholder() {
        assert_eq!(expand_with("x = ${NOPE_XYZ}", lookup), "x = ${NOPE_XYZ}");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(expand_with("a ${POOL", lookup), "a ${POOL");
        assert_eq!(expand_with("${}", lookup), "${}");
    }

    #[test]
    fn symbol_prefix_dollar_is_untouched() {
        assert_eq!(expand_with("symbol = \"$SPX\"", lookup), "symbol = \"$SPX\"");
    }
}
