use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Field length limits carried over from the catalog schema.
pub const CATEGORY_NAME_MAX: usize = 25;
pub const ITEM_NAME_MAX: usize = 80;
pub const ITEM_DESCRIPTION_MAX: usize = 250;

/// A user known to the catalog. Created on first successful identity
/// verification for a previously-unseen email; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Immutable in this scope: no edit or delete path exists for categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: i64,
    /// Set at creation and never reassigned.
    pub owner_id: i64,
    /// Creation time in epoch milliseconds; newest-first ordering key.
    pub created_at: i64,
}

/// Fields supplied when creating a new item. The owner comes from the
/// authenticated session, never from the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: i64,
}

/// Partial update for an existing item. Absent or empty fields leave the
/// stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

pub fn validate_category_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if len == 0 || len > CATEGORY_NAME_MAX {
        return Err(AppError::validation(
            "category_name_length".to_string(),
            format!("category name must be between 1 and {} characters", CATEGORY_NAME_MAX),
        ));
    }
    Ok(())
}

/// Validate item name and description together, before any store mutation.
pub fn validate_item_fields(name: &str, description: Option<&str>) -> AppResult<()> {
    let name_len = name.chars().count();
    if name_len == 0 || name_len > ITEM_NAME_MAX {
        return Err(AppError::validation(
            "item_name_length".to_string(),
            format!("name field must not be empty or larger than {} characters", ITEM_NAME_MAX),
        ));
    }
    if let Some(desc) = description {
        if desc.chars().count() > ITEM_DESCRIPTION_MAX {
            return Err(AppError::validation(
                "item_description_length".to_string(),
                format!("description field must not be larger than {} characters", ITEM_DESCRIPTION_MAX),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_name_bounds() {
        assert!(validate_item_fields("", None).is_err());
        assert!(validate_item_fields("Peach", None).is_ok());
        assert!(validate_item_fields(&"x".repeat(ITEM_NAME_MAX), None).is_ok());
        assert!(validate_item_fields(&"x".repeat(ITEM_NAME_MAX + 1), None).is_err());
    }

    #[test]
    fn item_description_bounds() {
        assert!(validate_item_fields("Pear", Some(&"d".repeat(ITEM_DESCRIPTION_MAX))).is_ok());
        let err = validate_item_fields("Pear", Some(&"d".repeat(ITEM_DESCRIPTION_MAX + 1))).unwrap_err();
        assert_eq!(err.code_str(), "item_description_length");
    }

    #[test]
    fn category_name_bounds() {
        assert!(validate_category_name("Trees").is_ok());
        assert!(validate_category_name("").is_err());
        assert!(validate_category_name(&"c".repeat(CATEGORY_NAME_MAX + 1)).is_err());
    }

    #[test]
    fn lengths_count_chars_not_bytes() {
        // 80 multibyte characters are still within the name limit
        let name: String = "é".repeat(ITEM_NAME_MAX);
        assert!(validate_item_fields(&name, None).is_ok());
    }
}
