//! Shell quoting helpers

/// Wrap `s` in single quotes, escaping embedded single quotes as `'\''`
pub fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Wrap `s` in double quotes. `$` expansion is kept; `\`, `"` and `` ` ``
/// are escaped.
pub fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Leave plain words alone, double-quote anything else
pub fn word(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | '+' | '='));
    if plain {
        s.to_string()
    } else {
        double_quote(s)
    }
}
