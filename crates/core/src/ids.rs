use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Server-assigned identifiers travel as opaque strings. The empty string is
/// the identity of a record that has not been created yet.
macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh time-ordered identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let short = self.0.get(..8).unwrap_or(&self.0);
                write!(f, "{}({})", stringify!($name), short)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(RecordId);
string_id!(RevisionId);

impl RecordId {
    pub fn unsaved() -> Self {
        Self(String::new())
    }

    pub fn is_unsaved(&self) -> bool {
        self.0.is_empty()
    }
}

pub const NEW_DRAFT_KEY: &str = "new";

/// Storage key for a draft: one slot per saved record plus a shared slot for
/// the record being created.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum DraftKey {
    New,
    Record(RecordId),
}

impl DraftKey {
    pub fn for_record(id: &RecordId) -> Self {
        if id.is_unsaved() {
            Self::New
        } else {
            Self::Record(id.clone())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::New => NEW_DRAFT_KEY,
            Self::Record(id) => id.as_str(),
        }
    }
}

impl fmt::Debug for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DraftKey({})", self.as_str())
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsaved_record_maps_to_new_key() {
        assert_eq!(DraftKey::for_record(&RecordId::unsaved()), DraftKey::New);
        assert_eq!(DraftKey::New.as_str(), "new");

        let id = RecordId::new("64f0c2");
        assert_eq!(DraftKey::for_record(&id).as_str(), "64f0c2");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = RevisionId::generate();
        let b = RevisionId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RecordId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
