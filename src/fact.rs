//! Fact kinds and the values they relate.
//!
//! A fact kind names one relation a capability reconciles (sub-entity,
//! equivalence, domain restriction, ...). Each kind relates its subject either
//! to other entities or to [`Restriction`] expressions; [`FactValue`] is the
//! bridge between those typed values and the type-erased [`AxiomValue`] that
//! crosses the store boundary.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, EntityRef};

/// A relation type reconciled independently of the others.
///
/// The declaration order is the order in which a full descriptor runs its
/// capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Entities subsumed by the subject.
    Sub,
    /// Entities subsuming the subject.
    Super,
    /// Entities equivalent to the subject (same-as, for individuals).
    Equivalent,
    /// Entities disjoint with the subject (different-from, for individuals).
    Disjoint,
    /// Inverse object properties.
    Inverse,
    /// Classes an individual belongs to.
    Type,
    /// Individuals belonging to a class.
    Instance,
    /// Domain restrictions of a property.
    Domain,
    /// Range restrictions of a property.
    Range,
}

impl FactKind {
    /// Every fact kind, in declared order.
    pub const ALL: [Self; 9] = [
        Self::Sub,
        Self::Super,
        Self::Equivalent,
        Self::Disjoint,
        Self::Inverse,
        Self::Type,
        Self::Instance,
        Self::Domain,
        Self::Range,
    ];

    /// The shape of the values this kind relates its subject to.
    #[must_use]
    pub const fn shape(self) -> ValueShape {
        match self {
            Self::Domain | Self::Range => ValueShape::Restriction,
            _ => ValueShape::Entity,
        }
    }

    /// The kind that records the same fact from the value's side.
    ///
    /// Writing `subject -[kind]-> value` also writes
    /// `value -[mirror]-> subject` so that either side reads back the fact.
    #[must_use]
    pub const fn mirror(self) -> Option<Self> {
        match self {
            Self::Sub => Some(Self::Super),
            Self::Super => Some(Self::Sub),
            Self::Equivalent => Some(Self::Equivalent),
            Self::Disjoint => Some(Self::Disjoint),
            Self::Inverse => Some(Self::Inverse),
            Self::Type => Some(Self::Instance),
            Self::Instance => Some(Self::Type),
            Self::Domain | Self::Range => None,
        }
    }

    /// True if query results must not contain the subject itself.
    #[must_use]
    pub const fn excludes_subject(self) -> bool {
        matches!(self, Self::Equivalent | Self::Disjoint)
    }

    /// True if this kind can describe a subject of the given entity kind.
    #[must_use]
    pub const fn applies_to(self, subject: EntityKind) -> bool {
        use EntityKind as K;
        match self {
            Self::Sub | Self::Super => {
                matches!(subject, K::Class | K::ObjectProperty | K::DataProperty)
            }
            Self::Equivalent | Self::Disjoint => !matches!(subject, K::Datatype),
            Self::Inverse => matches!(subject, K::ObjectProperty),
            Self::Type => matches!(subject, K::Individual),
            Self::Instance => matches!(subject, K::Class),
            Self::Domain | Self::Range => subject.is_property(),
        }
    }

    /// The entity kind of related values, for entity-shaped kinds.
    #[must_use]
    pub const fn related_kind(self, subject: EntityKind) -> Option<EntityKind> {
        match self {
            Self::Sub | Self::Super | Self::Equivalent | Self::Disjoint | Self::Inverse => {
                Some(subject)
            }
            Self::Type => Some(EntityKind::Class),
            Self::Instance => Some(EntityKind::Individual),
            Self::Domain | Self::Range => None,
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sub => "sub",
            Self::Super => "super",
            Self::Equivalent => "equivalent",
            Self::Disjoint => "disjoint",
            Self::Inverse => "inverse",
            Self::Type => "type",
            Self::Instance => "instance",
            Self::Domain => "domain",
            Self::Range => "range",
        };
        f.write_str(s)
    }
}

/// The two families of values a fact can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// Plain entity references.
    Entity,
    /// Restriction expressions.
    Restriction,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Restriction => write!(f, "restriction"),
        }
    }
}

/// The quantifier of a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "cardinality")]
pub enum RestrictionKind {
    /// Plain class (or datatype) membership; no property.
    Class,
    /// Existential: some value through the property.
    Some,
    /// Universal: only values through the property.
    Only,
    /// At least `n` values.
    Min(u32),
    /// At most `n` values.
    Max(u32),
    /// Exactly `n` values.
    Exact(u32),
}

/// A domain or range restriction.
///
/// This is a plain value: constructing the store-specific expression it
/// stands for is the store's concern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Restriction {
    /// The quantifier.
    pub kind: RestrictionKind,
    /// The restricted property; `None` for plain class restrictions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<EntityRef>,
    /// The class or datatype the restriction ranges over.
    pub filler: EntityRef,
}

impl Restriction {
    /// A plain class (or datatype) restriction.
    #[must_use]
    pub const fn class(filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Class,
            property: None,
            filler,
        }
    }

    /// An existential restriction.
    #[must_use]
    pub const fn some(property: EntityRef, filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Some,
            property: Some(property),
            filler,
        }
    }

    /// A universal restriction.
    #[must_use]
    pub const fn only(property: EntityRef, filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Only,
            property: Some(property),
            filler,
        }
    }

    /// A minimum cardinality restriction.
    #[must_use]
    pub const fn min(property: EntityRef, cardinality: u32, filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Min(cardinality),
            property: Some(property),
            filler,
        }
    }

    /// A maximum cardinality restriction.
    #[must_use]
    pub const fn max(property: EntityRef, cardinality: u32, filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Max(cardinality),
            property: Some(property),
            filler,
        }
    }

    /// An exact cardinality restriction.
    #[must_use]
    pub const fn exact(property: EntityRef, cardinality: u32, filler: EntityRef) -> Self {
        Self {
            kind: RestrictionKind::Exact(cardinality),
            property: Some(property),
            filler,
        }
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filler = &self.filler.name;
        let Some(property) = &self.property else {
            return write!(f, "{filler}");
        };
        let property = &property.name;
        match self.kind {
            RestrictionKind::Class => write!(f, "{filler}"),
            RestrictionKind::Some => write!(f, "{property} some {filler}"),
            RestrictionKind::Only => write!(f, "{property} only {filler}"),
            RestrictionKind::Min(n) => write!(f, "{property} min {n} {filler}"),
            RestrictionKind::Max(n) => write!(f, "{property} max {n} {filler}"),
            RestrictionKind::Exact(n) => write!(f, "{property} exactly {n} {filler}"),
        }
    }
}

/// Type-erased fact value, as exchanged with a fact store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxiomValue {
    /// An entity reference.
    Entity(EntityRef),
    /// A restriction expression.
    Restriction(Restriction),
}

impl AxiomValue {
    /// The shape of this value.
    #[must_use]
    pub const fn shape(&self) -> ValueShape {
        match self {
            Self::Entity(_) => ValueShape::Entity,
            Self::Restriction(_) => ValueShape::Restriction,
        }
    }

    /// Returns the entity reference, if this value is one.
    #[must_use]
    pub const fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(e) => Some(e),
            Self::Restriction(_) => None,
        }
    }
}

impl fmt::Display for AxiomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "{e}"),
            Self::Restriction(r) => write!(f, "{r}"),
        }
    }
}

impl From<EntityRef> for AxiomValue {
    fn from(value: EntityRef) -> Self {
        Self::Entity(value)
    }
}

impl From<Restriction> for AxiomValue {
    fn from(value: Restriction) -> Self {
        Self::Restriction(value)
    }
}

/// A value type a capability can hold in its local entity set.
pub trait FactValue:
    Clone + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The shape this type encodes to.
    const SHAPE: ValueShape;

    /// Erases the type.
    fn to_axiom(&self) -> AxiomValue;

    /// Recovers the typed value; `None` if the shape does not match.
    fn from_axiom(value: AxiomValue) -> Option<Self>;
}

impl FactValue for EntityRef {
    const SHAPE: ValueShape = ValueShape::Entity;

    fn to_axiom(&self) -> AxiomValue {
        AxiomValue::Entity(self.clone())
    }

    fn from_axiom(value: AxiomValue) -> Option<Self> {
        match value {
            AxiomValue::Entity(e) => Some(e),
            AxiomValue::Restriction(_) => None,
        }
    }
}

impl FactValue for Restriction {
    const SHAPE: ValueShape = ValueShape::Restriction;

    fn to_axiom(&self) -> AxiomValue {
        AxiomValue::Restriction(self.clone())
    }

    fn from_axiom(value: AxiomValue) -> Option<Self> {
        match value {
            AxiomValue::Restriction(r) => Some(r),
            AxiomValue::Entity(_) => None,
        }
    }
}

/// Logical characteristics a property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    /// At most one value per subject.
    Functional,
    /// At most one subject per value.
    InverseFunctional,
    /// Closed under chaining.
    Transitive,
    /// Holds in both directions.
    Symmetric,
    /// Never holds in both directions.
    Asymmetric,
    /// Relates every individual to itself.
    Reflexive,
    /// Never relates an individual to itself.
    Irreflexive,
}

impl Characteristic {
    /// True if a property of the given kind can carry this characteristic.
    #[must_use]
    pub const fn applies_to(self, kind: EntityKind) -> bool {
        match self {
            Self::Functional => kind.is_property(),
            _ => matches!(kind, EntityKind::ObjectProperty),
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Functional => "functional",
            Self::InverseFunctional => "inverse_functional",
            Self::Transitive => "transitive",
            Self::Symmetric => "symmetric",
            Self::Asymmetric => "asymmetric",
            Self::Reflexive => "reflexive",
            Self::Irreflexive => "irreflexive",
        };
        f.write_str(s)
    }
}
