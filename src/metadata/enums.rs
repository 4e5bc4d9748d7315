use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub key: String,
    pub display_name: HashMap<String, String>,
    pub sort_order: i32,
}

impl EnumMember {
    pub fn new(key: impl Into<String>, sort_order: i32) -> Self {
        Self {
            key: key.into(),
            display_name: HashMap::new(),
            sort_order,
        }
    }
}

/// Named value set referenced by enum fields. Members are stored by key;
/// multi-select fields persist a comma-joined key list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub id: Uuid,
    pub name: String,
    pub is_enabled: bool,
    pub members: Vec<EnumMember>,
}

impl EnumDefinition {
    pub fn new(name: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_enabled: true,
            members: keys
                .iter()
                .enumerate()
                .map(|(i, key)| EnumMember::new(*key, i as i32))
                .collect(),
        }
    }

    pub fn has_member(&self, key: &str) -> bool {
        self.members.iter().any(|m| m.key == key)
    }

    /// Validate a stored value: a single key, or a comma-joined key list
    /// for multi-select fields.
    pub fn accepts(&self, stored: &str, multi_select: bool) -> bool {
        if multi_select {
            stored
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .all(|k| self.has_member(k))
        } else {
            self.has_member(stored)
        }
    }
}
