use crate::models::{DeployError, DeployResult};

/// Validate a hostname before it is spliced into remote command lines.
/// Only hostname-safe characters are allowed, which also rules out shell
/// metacharacters.
pub fn validate_hostname(hostname: &str) -> DeployResult<()> {
    if hostname.is_empty() {
        return Err(DeployError::InvalidTarget {
            message: "Hostname cannot be empty".to_string(),
        });
    }

    if hostname.len() > 255 {
        return Err(DeployError::InvalidTarget {
            message: "Hostname too long".to_string(),
        });
    }

    // Letters, digits, dots, hyphens, underscores, plus colon/brackets for IPv6
    let is_valid = hostname.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c == '.'
            || c == '-'
            || c == '_'
            || c == ':'
            || c == '['
            || c == ']'
    });

    if !is_valid {
        return Err(DeployError::InvalidTarget {
            message: format!("Hostname contains invalid characters: {}", hostname),
        });
    }

    Ok(())
}
