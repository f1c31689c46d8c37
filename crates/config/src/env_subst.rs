/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders.
///
/// A variable that is unset falls back to its default when one is given;
/// otherwise the placeholder is left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// [`substitute_env`] with a custom lookup, testable without touching the
/// process environment.
pub fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next(); // consume '{'
        let mut body = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            body.push(c);
        }
        if !closed || body.is_empty() {
            // Malformed: emit literal.
            result.push_str("${");
            result.push_str(&body);
            continue;
        }

        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body.as_str(), None),
        };
        match lookup(name).or_else(|| default.map(str::to_string)) {
            Some(value) => result.push_str(&value),
            None => {
                result.push_str("${");
                result.push_str(&body);
                result.push('}');
            },
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CHATRELAY_TOKEN" => Some("123:abc".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[rstest]
    #[case("token = \"${CHATRELAY_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${CHATRELAY_MISSING}", "${CHATRELAY_MISSING}")]
    #[case("${CHATRELAY_MISSING:-fallback}", "fallback")]
    #[case("${CHATRELAY_TOKEN:-fallback}", "123:abc")]
    #[case("${CHATRELAY_MISSING:-}", "")]
    #[case("[${EMPTY}]", "[]")]
    #[case("cost: $5 ${", "cost: $5 ${")]
    #[case("${}", "${")]
    #[case("plain text", "plain text")]
    fn substitutes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }
}
