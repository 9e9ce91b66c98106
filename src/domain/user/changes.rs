//! Field-level change tracking for updates

use serde::Serialize;

use super::entity::UserRecord;

/// A scalar field whose old and new values can be compared
pub struct TrackedField<T> {
    pub name: &'static str,
    pub get: fn(&T) -> &str,
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

/// Changed fields in the order they were compared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, old: impl Into<String>, new: impl Into<String>) {
        self.entries.push(FieldChange {
            field,
            old: old.into(),
            new: new.into(),
        });
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.entries.iter().find(|c| c.field == field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|c| c.field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compare `old` and `new` over `fields`, recording every field whose value differs
pub fn diff_fields<T>(fields: &[TrackedField<T>], old: &T, new: &T) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for field in fields {
        let (before, after) = ((field.get)(old), (field.get)(new));
        if before != after {
            changes.add(field.name, before, after);
        }
    }

    changes
}

impl UserRecord {
    /// Mutable scalar fields; timestamps are deliberately not tracked
    pub const TRACKED_FIELDS: [TrackedField<UserRecord>; 5] = [
        TrackedField {
            name: "FirstName",
            get: |u| u.first_name.as_str(),
        },
        TrackedField {
            name: "LastName",
            get: |u| u.last_name.as_str(),
        },
        TrackedField {
            name: "Nickname",
            get: |u| u.nickname.as_str(),
        },
        TrackedField {
            name: "Email",
            get: |u| u.email.as_str(),
        },
        TrackedField {
            name: "Country",
            get: |u| u.country.as_str(),
        },
    ];

    /// Changes from `self` (the prior state) to `updated`
    pub fn changes_to(&self, updated: &UserRecord) -> ChangeSet {
        diff_fields(&Self::TRACKED_FIELDS, self, updated)
    }
}
