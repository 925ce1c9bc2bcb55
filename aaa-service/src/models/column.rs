//! Named column sets within a table resource — the grain the Column
//! Resolver (`services::columns`) checks bindings' caveats against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnGroup {
    pub id: Uuid,
    pub table_name: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ColumnGroup {
    pub fn new(table_name: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            table_name,
            name,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMember {
    pub id: Uuid,
    pub column_group_id: Uuid,
    pub column_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ColumnMember {
    pub fn new(column_group_id: Uuid, column_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            column_group_id,
            column_name,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
