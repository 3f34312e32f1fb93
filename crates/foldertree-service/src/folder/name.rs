//! Folder name rules.

use foldertree_core::config::TreeConfig;
use foldertree_core::error::AppError;
use foldertree_core::result::AppResult;

/// Check a folder name against the workspace naming rules and return it
/// trimmed.
///
/// A name must contain something other than whitespace, fit within
/// `max_name_length` characters and avoid the reserved characters, which
/// the search layer uses as filter delimiters.
pub fn validate_name(config: &TreeConfig, name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Folder name cannot be empty"));
    }
    let length = trimmed.chars().count();
    if length > config.max_name_length {
        return Err(AppError::validation(format!(
            "Folder name is {length} characters long, the limit is {}",
            config.max_name_length
        )));
    }
    if let Some(c) = trimmed.chars().find(|c| config.is_reserved(*c)) {
        return Err(AppError::validation(format!(
            "Folder name cannot contain '{c}'"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::validation(
            "Folder name cannot contain control characters",
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use foldertree_core::error::ErrorKind;

    use super::*;

    #[test]
    fn test_trims_valid_names() {
        let config = TreeConfig::default();
        assert_eq!(validate_name(&config, "  Reports ").unwrap(), "Reports");
    }

    #[test]
    fn test_rejects_blank_and_reserved() {
        let config = TreeConfig::default();
        for bad in ["", "   ", "a,b", "x|y", "tab\tname"] {
            let err = validate_name(&config, bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{bad:?}");
        }
    }

    #[test]
    fn test_length_counts_characters() {
        let config = TreeConfig {
            max_name_length: 3,
            ..TreeConfig::default()
        };
        assert!(validate_name(&config, "äöü").is_ok());
        assert!(validate_name(&config, "abcd").is_err());
    }
}
