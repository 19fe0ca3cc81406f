//! Input validation limits for security and resource protection

use crate::error::{Error, Result};

/// Maximum length for entity names (256 chars)
pub const MAX_ENTITY_NAME_LEN: usize = 256;

/// Smallest accepted page size
pub const MIN_LIMIT: i64 = 1;

/// Largest accepted page size (1,000,000)
pub const MAX_LIMIT: i64 = 1_000_000;

/// Depth cap applied by boundary layers before calling the lineage engine (50)
pub const MAX_LINEAGE_DEPTH: i32 = 50;

/// Validate an entity's local name
///
/// Dots are reserved as the FQN separator.
pub fn validate_entity_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidEntityName("Entity name cannot be empty".into()));
    }
    if name.len() > MAX_ENTITY_NAME_LEN {
        return Err(Error::InvalidEntityName(format!(
            "Entity name too long: {} chars (max {})",
            name.len(),
            MAX_ENTITY_NAME_LEN
        )));
    }
    if name.contains('.') {
        return Err(Error::InvalidEntityName(format!(
            "Entity name {} must not contain '.'",
            name
        )));
    }
    Ok(())
}

/// Validate a page size, returning it as a usize
pub fn validate_limit(limit: i64) -> Result<usize> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(Error::InvalidLimit {
            limit,
            min: MIN_LIMIT,
            max: MAX_LIMIT,
        });
    }
    Ok(limit as usize)
}

/// Validate a traversal depth, returning it as a usize
pub fn validate_depth(direction: &'static str, depth: i32) -> Result<usize> {
    usize::try_from(depth).map_err(|_| Error::InvalidDepth { direction, depth })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_entity_name() {
        assert!(validate_entity_name("dim_address").is_ok());
        assert!(validate_entity_name("").is_err());
        assert!(validate_entity_name("   ").is_err());
        assert!(validate_entity_name("a.b").is_err());
        assert!(validate_entity_name(&"x".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(MAX_LIMIT).unwrap(), 1_000_000);
        assert_eq!(validate_limit(0).unwrap_err().kind(), ErrorKind::InvalidLimit);
    }

    #[test]
    fn test_validate_depth() {
        assert_eq!(validate_depth("upstream", 0).unwrap(), 0);
        let err = validate_depth("downstream", -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDepth);
        assert_eq!(
            err.to_string(),
            "Invalid downstream depth -1: must not be negative"
        );
    }
}
