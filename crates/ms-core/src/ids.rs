//! Catalog entity identifiers.
//!
//! Every persisted row is keyed by a random UUID stored as text. Each table
//! gets its own newtype so a `MediaId` can never be passed where a
//! `LibraryPathId` is expected, and each knows the entity name used in
//! "not found" errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An identifier for one kind of catalog entity.
pub trait EntityId: Copy + fmt::Display {
    /// Human-readable entity name, e.g. `"library path"`.
    const ENTITY: &'static str;

    fn from_uuid(uuid: Uuid) -> Self;

    fn uuid(&self) -> Uuid;
}

macro_rules! entity_ids {
    ($($(#[doc = $doc:expr])* $name:ident => $entity:literal),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl EntityId for $name {
                const ENTITY: &'static str = $entity;

                fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                fn uuid(&self) -> Uuid {
                    self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }
        )+
    };
}

entity_ids! {
    /// A row in the job queue.
    JobId => "job",
    LibraryId => "library",
    /// A watched root directory of a library.
    LibraryPathId => "library path",
    /// A catalogued file. A file that is removed and re-added gets a new id.
    MediaId => "media",
    ImageId => "image",
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn text_form_round_trips() {
        let id = JobId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<LibraryPathId>().is_err());
    }

    #[test]
    fn serde_is_the_bare_string() {
        let id = ImageId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<ImageId>(&json).unwrap(), id);
    }

    #[test]
    fn entity_names() {
        assert_eq!(MediaId::ENTITY, "media");
        assert_eq!(LibraryPathId::ENTITY, "library path");
        assert_eq!(JobId::ENTITY, "job");
    }

    #[test]
    fn uuid_access_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = MediaId::from_uuid(uuid);
        assert_eq!(id.uuid(), uuid);
        let set: HashSet<_> = [id, id, MediaId::new()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
