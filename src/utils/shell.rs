//! Quoting helpers for remote command assembly.

/// Single-quote a value for a POSIX shell. Embedded single quotes become
/// `'\''`.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Double-quote a path for cmd.exe. Paths with embedded quotes are rejected
/// upstream, so stripping them here is only a backstop.
pub fn cmd_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', ""))
}

/// Single-quote a value for a PowerShell string literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
