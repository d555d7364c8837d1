//! Whitespace tokenizer that preserves quoted substrings.

/// Split `input` on whitespace, keeping single- or double-quoted substrings
/// as one token (quotes stripped). An unterminated quote consumes the rest
/// of the input.
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("mv a b"), vec!["mv", "a", "b"]);
    }

    #[test]
    fn preserves_double_quoted_substrings() {
        assert_eq!(
            tokenize("FIND \"two words\" rest"),
            vec!["FIND", "two words", "rest"]
        );
    }

    #[test]
    fn preserves_single_quoted_substrings() {
        assert_eq!(tokenize("echo 'hello world'"), vec!["echo", "hello world"]);
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(tokenize("  ls   -la  "), vec!["ls", "-la"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn unterminated_quote_consumes_rest() {
        assert_eq!(tokenize("echo \"half done"), vec!["echo", "half done"]);
    }
}
