//! Line-level handling of authorized_keys content.
//!
//! Key lines have the form `<algorithm> <base64-blob> [comment]`, optionally
//! preceded by an options field. Two lines install the same key when their
//! algorithm and blob match; the comment field does not participate in the
//! comparison.

/// Algorithm and blob of one key line, with options and comment stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLine<'a> {
    pub algorithm: &'a str,
    pub blob: &'a str,
}

/// Parse an authorized_keys line into its identifying fields. Returns `None`
/// for blank lines, comments, and anything that does not look like a key.
pub fn parse_key_line(line: &str) -> Option<KeyLine<'_>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let first = fields.next()?;
    let second = fields.next()?;

    // An options field (e.g. `no-pty,command="..."`) shifts the key type to
    // the second field.
    if is_key_type(first) {
        Some(KeyLine {
            algorithm: first,
            blob: second,
        })
    } else if is_key_type(second) {
        let blob = fields.next()?;
        Some(KeyLine {
            algorithm: second,
            blob,
        })
    } else {
        None
    }
}

fn is_key_type(field: &str) -> bool {
    field.starts_with("ssh-")
        || field.starts_with("ecdsa-")
        || field.starts_with("sk-ssh-")
        || field.starts_with("sk-ecdsa-")
}

/// Whether `content` already contains a line installing the same key as
/// `public_key_line`. Trailing whitespace and comment-only differences do
/// not count as differences.
pub fn contains_key(content: &str, public_key_line: &str) -> bool {
    let needle = match parse_key_line(public_key_line) {
        Some(k) => k,
        None => return false,
    };
    content
        .lines()
        .filter_map(parse_key_line)
        .any(|k| k == needle)
}

/// Number of key lines (ignoring blanks and comments) in the store.
pub fn count_keys(content: &str) -> usize {
    content.lines().filter_map(parse_key_line).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFlXOQk34tnLe4gTVThVboRl89gl4sC9wNcw+PtGp1Mk alice@example";
    const KEY_B: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl bob@example";

    #[test]
    fn parses_plain_key_line() {
        let parsed = parse_key_line(KEY_A).unwrap();
        assert_eq!(parsed.algorithm, "ssh-ed25519");
        assert!(parsed.blob.starts_with("AAAAC3"));
    }

    #[test]
    fn parses_line_with_options_field() {
        let line = format!("no-pty,command=\"/usr/bin/true\" {}", KEY_A);
        let parsed = parse_key_line(&line).unwrap();
        assert_eq!(parsed.algorithm, "ssh-ed25519");
    }

    #[test]
    fn ignores_blanks_and_comments() {
        assert!(parse_key_line("").is_none());
        assert!(parse_key_line("   ").is_none());
        assert!(parse_key_line("# a comment").is_none());
        assert!(parse_key_line("not a key line").is_none());
    }

    #[test]
    fn match_ignores_comment_and_trailing_whitespace() {
        let content = format!("{}\n", KEY_B);
        assert!(!contains_key(&content, KEY_A));

        let same_key_other_comment = KEY_A.replace("alice@example", "alice@laptop");
        let content = format!("{}  \n{}\n", KEY_A, KEY_B);
        assert!(contains_key(&content, &same_key_other_comment));
    }

    #[test]
    fn counts_only_key_lines() {
        let content = format!("# header\n\n{}\n{}\n", KEY_A, KEY_B);
        assert_eq!(count_keys(&content), 2);
    }
}
