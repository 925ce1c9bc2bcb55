//! Response Shaper / Transform (SPEC_FULL.md §4.8). Projects a `serde_json`
//! representation of an entity according to include/exclude flags and
//! masks credential-shaped fields regardless of what the caller asked for
//! — grounded on the query-parameter surface in spec.md §6 (`include_*`,
//! `exclude_*`, `mask_sensitive`, `include_timestamps`).

use std::collections::HashSet;

use serde_json::Value;

/// Field names masked unconditionally; a caller cannot opt out of this via
/// `mask_sensitive=false` — that flag only controls *additional* masking.
const ALWAYS_MASKED_FIELDS: &[&str] = &["password_hash", "pin_hash", "api_key_hash"];

#[derive(Debug, Clone)]
pub struct ProjectionSpec {
    pub include: HashSet<String>,
    pub exclude: HashSet<String>,
    pub mask_sensitive: bool,
    pub include_timestamps: bool,
}

impl Default for ProjectionSpec {
    fn default() -> Self {
        Self {
            include: HashSet::new(),
            exclude: HashSet::new(),
            mask_sensitive: true,
            include_timestamps: true,
        }
    }
}

impl ProjectionSpec {
    /// Expands the legacy `include=a,b,c` query parameter form into the
    /// structured `include` set.
    pub fn with_legacy_include(mut self, legacy: &str) -> Self {
        self.include.extend(legacy.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        self
    }
}

pub struct Shaper;

const TIMESTAMP_FIELDS: &[&str] = &["created_at", "updated_at", "deleted_at"];

impl Shaper {
    /// Projects a JSON object per `spec`. Non-object values pass through
    /// unchanged (there is nothing to project).
    pub fn project(value: Value, spec: &ProjectionSpec) -> Value {
        let Value::Object(mut map) = value else {
            return value;
        };

        for field in ALWAYS_MASKED_FIELDS {
            if map.contains_key(*field) {
                map.insert(field.to_string(), Value::String("***".to_string()));
            }
        }

        if spec.mask_sensitive {
            for field in ["email", "phone_number"] {
                if let Some(Value::String(s)) = map.get(field) {
                    map.insert(field.to_string(), Value::String(mask_middle(s)));
                }
            }
        }

        if !spec.include_timestamps {
            for field in TIMESTAMP_FIELDS {
                map.remove(*field);
            }
        }

        for field in &spec.exclude {
            map.remove(field);
        }

        if !spec.include.is_empty() {
            map.retain(|key, _| spec.include.contains(key) || key == "id");
        }

        Value::Object(map)
    }

    pub fn project_many(values: Vec<Value>, spec: &ProjectionSpec) -> Vec<Value> {
        values.into_iter().map(|v| Self::project(v, spec)).collect()
    }
}

fn mask_middle(value: &str) -> String {
    let len = value.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let chars: Vec<char> = value.chars().collect();
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(len - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_fields_are_masked_even_when_not_asked_for() {
        let value = json!({"id": "1", "password_hash": "$argon2id$...", "username": "alice"});
        let spec = ProjectionSpec { mask_sensitive: false, ..Default::default() };
        let projected = Shaper::project(value, &spec);
        assert_eq!(projected["password_hash"], json!("***"));
        assert_eq!(projected["username"], json!("alice"));
    }

    #[test]
    fn include_set_keeps_only_named_fields_plus_id() {
        let value = json!({"id": "1", "username": "alice", "email": "a@b.com", "status": "active"});
        let mut spec = ProjectionSpec::default();
        spec.include.insert("username".to_string());
        let projected = Shaper::project(value, &spec);
        assert_eq!(projected.as_object().unwrap().len(), 2);
        assert!(projected.get("status").is_none());
    }

    #[test]
    fn legacy_include_param_expands_into_the_include_set() {
        let spec = ProjectionSpec::default().with_legacy_include("username, email");
        assert!(spec.include.contains("username"));
        assert!(spec.include.contains("email"));
    }
}
