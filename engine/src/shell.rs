//! POSIX shell quoting for generated command lines.

/// Quote `arg` for a POSIX shell only when it contains characters the shell
/// would interpret.
pub fn shell_escape_arg(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        arg.to_string()
    } else {
        shell_quote(arg)
    }
}

/// Always single-quote; embedded single quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Escape each argument and join them with spaces.
pub fn shell_join<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| shell_escape_arg(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join command lines with trailing ` \` continuations.
pub fn continuation_lines(parts: &[String]) -> Vec<String> {
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(index, part)| {
            if index == last {
                part.clone()
            } else {
                format!("{part} \\")
            }
        })
        .collect()
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
}
