//! Entity references and naming.
//!
//! Every axiom is anchored on an [`EntityRef`]: a named class, individual,
//! property or datatype living inside some fact store. References are plain
//! values; they carry no link to the store they came from. Binding a reference
//! to a store is the job of [`crate::ground::Ground`].

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum accepted length of an entity name.
pub const MAX_NAME_LEN: usize = 512;

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:#/\-]*$").expect("entity name pattern is a valid regex")
    })
}

/// Classification of the entities a fact store can describe.
///
/// The declaration order is significant: it is the primary key of the total
/// order on [`EntityRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A class (concept).
    Class,
    /// A named individual.
    Individual,
    /// A property relating individuals to individuals.
    ObjectProperty,
    /// A property relating individuals to literal values.
    DataProperty,
    /// A literal datatype.
    Datatype,
}

impl EntityKind {
    /// Returns true for object and data properties.
    #[must_use]
    pub const fn is_property(self) -> bool {
        matches!(self, Self::ObjectProperty | Self::DataProperty)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Individual => write!(f, "individual"),
            Self::ObjectProperty => write!(f, "object_property"),
            Self::DataProperty => write!(f, "data_property"),
            Self::Datatype => write!(f, "datatype"),
        }
    }
}

/// A reference to one named entity.
///
/// References are ordered by kind and then by name. That order is what the
/// singleton tie-break uses, so it must stay stable.
///
/// # Examples
///
/// ```
/// use axiomsync::{EntityKind, EntityRef};
///
/// let sphere = EntityRef::class("Sphere").unwrap();
/// assert_eq!(sphere.kind, EntityKind::Class);
/// assert_eq!(sphere.to_string(), "class:Sphere");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// What sort of entity this is.
    pub kind: EntityKind,
    /// The entity's name inside its store.
    pub name: String,
}

impl EntityRef {
    /// Creates a reference after validating the name.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { kind, name })
    }

    /// Creates a class reference.
    pub fn class(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityKind::Class, name)
    }

    /// Creates an individual reference.
    pub fn individual(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityKind::Individual, name)
    }

    /// Creates an object property reference.
    pub fn object_property(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityKind::ObjectProperty, name)
    }

    /// Creates a data property reference.
    pub fn data_property(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityKind::DataProperty, name)
    }

    /// Creates a datatype reference.
    pub fn datatype(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityKind::Datatype, name)
    }

    /// Returns the same name re-tagged with another kind.
    #[must_use]
    pub fn with_kind(&self, kind: EntityKind) -> Self {
        Self {
            kind,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Checks that `name` can identify an entity.
///
/// Names are trimmed by callers, never here: a name with surrounding
/// whitespace is rejected.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyEntityName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidEntityName {
            name: name.chars().take(32).collect(),
            reason: format!("exceeds maximum length of {MAX_NAME_LEN}"),
        });
    }
    if !name_pattern().is_match(name) {
        return Err(ValidationError::InvalidEntityName {
            name: name.to_string(),
            reason: "must start with a letter or '_' and contain no whitespace".to_string(),
        });
    }
    Ok(())
}
