//! Gateway utility functions.

/// Expand `${VAR}` patterns in a string with values from `lookup`.
///
/// Unknown variables are replaced with an empty string.
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            if let Some(val) = lookup(&var_name) {
                result.push_str(&val);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// [`expand_vars`] against the process environment.
pub fn expand_env_vars(input: &str) -> String {
    expand_vars(input, |name| std::env::var(name).ok())
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn split_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// PEM material passed through environment variables often has its
/// newlines escaped as a literal `\n`.
pub fn unescape_newlines(input: &str) -> String {
    input.replace("\\n", "\n")
}
