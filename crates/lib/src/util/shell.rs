//! POSIX shell quoting for displaying and exporting argument vectors.

/// Quote `arg` so a POSIX shell reads it back as a single word.
pub fn quote(arg: &str) -> String {
  let safe = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ',' | ':' | '=' | '+' | '@' | '%'));
  if safe {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}

/// Quote and join an argument vector.
pub fn join(argv: &[String]) -> String {
  argv.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ")
}
