//! Queryable fields of each collection and the legacy spellings that map
//! onto them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Text,
    Bool,
    Number,
    Timestamp,
    /// A set of strings; equality means membership.
    Tags,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Document key, as emitted in responses.
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// A relation that `populate` can expand.
pub struct RelationDef {
    pub path: &'static str,
    pub target: &'static Schema,
}

impl fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDef")
            .field("path", &self.path)
            .field("target", &self.target.collection)
            .finish()
    }
}

/// Relations are statics; identity is equality.
impl PartialEq for RelationDef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[derive(Debug)]
pub struct Schema {
    pub collection: &'static str,
    pub fields: &'static [FieldDef],
    pub aliases: &'static [(&'static str, &'static str)],
    pub relations: &'static [RelationDef],
    /// Emitted in documents but not stored as a column (e.g. back-references).
    pub virtual_fields: &'static [&'static str],
    /// `status` and `completed` are two spellings of one fact.
    pub completion_synonyms: bool,
}

impl Schema {
    /// Fold a legacy spelling onto its canonical field name.
    pub fn canonical<'a>(&self, key: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(key)
    }

    pub fn field(&self, key: &str) -> Option<&'static FieldDef> {
        let key = self.canonical(key);
        self.fields.iter().find(|f| f.name == key)
    }

    pub fn relation(&self, path: &str) -> Option<&'static RelationDef> {
        let path = self.canonical(path);
        self.relations.iter().find(|r| r.path == path)
    }

    /// Canonical document key for anything a projection may mention.
    pub fn document_key(&self, key: &str) -> Option<&'static str> {
        let key = self.canonical(key);
        self.field(key).map(|f| f.name).or_else(|| {
            self.virtual_fields.iter().copied().find(|v| *v == key)
        })
    }
}

const fn field(name: &'static str, column: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, column, kind }
}

pub static TASKS: Schema = Schema {
    collection: "tasks",
    fields: &[
        field("_id", "id", FieldKind::Id),
        field("name", "name", FieldKind::Text),
        field("description", "description", FieldKind::Text),
        field("status", "status", FieldKind::Text),
        field("completed", "completed", FieldKind::Bool),
        field("priority", "priority", FieldKind::Text),
        field("deadline", "deadline", FieldKind::Timestamp),
        field("completedAt", "completed_at", FieldKind::Timestamp),
        field("assignedUser", "assigned_user", FieldKind::Id),
        field("assignedUserName", "assigned_user_name", FieldKind::Text),
        field("tags", "tags", FieldKind::Tags),
        field("estimatedHours", "estimated_hours", FieldKind::Number),
        field("actualHours", "actual_hours", FieldKind::Number),
        field("createdAt", "created_at", FieldKind::Timestamp),
        field("updatedAt", "updated_at", FieldKind::Timestamp),
    ],
    aliases: &[
        ("id", "_id"),
        ("title", "name"),
        ("dueDate", "deadline"),
        ("userId", "assignedUser"),
        ("userName", "assignedUserName"),
    ],
    relations: &[RelationDef {
        path: "assignedUser",
        target: &USERS,
    }],
    virtual_fields: &[],
    completion_synonyms: true,
};

pub static USERS: Schema = Schema {
    collection: "users",
    fields: &[
        field("_id", "id", FieldKind::Id),
        field("name", "name", FieldKind::Text),
        field("email", "email", FieldKind::Text),
        field("age", "age", FieldKind::Number),
        field("role", "role", FieldKind::Text),
        field("isActive", "is_active", FieldKind::Bool),
        field("phoneNumber", "phone_number", FieldKind::Text),
        field("address", "address", FieldKind::Text),
        field("createdAt", "created_at", FieldKind::Timestamp),
        field("updatedAt", "updated_at", FieldKind::Timestamp),
    ],
    aliases: &[("id", "_id")],
    relations: &[RelationDef {
        path: "pendingTasks",
        target: &TASKS,
    }],
    virtual_fields: &["pendingTasks"],
    completion_synonyms: false,
};
