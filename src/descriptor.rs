//! Composite descriptors.
//!
//! A [`CompositeDescriptor`] owns several capabilities over one ground and
//! drives them in insertion order. A capability that fails contributes its
//! `Failed` intents and the rest still run. Two composites are equal when
//! their grounds are.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;

use crate::capability::{Capability, Descriptor, Reconcile};
use crate::config::SyncConfig;
use crate::entity::EntityRef;
use crate::error::{AxiomResult, ValidationError};
use crate::fact::{Characteristic, FactKind, Restriction, ValueShape};
use crate::ground::Ground;
use crate::intent::{IntentKind, MappingIntent};

fn capability_for(
    kind: FactKind,
    ground: &Arc<Ground>,
    config: &Arc<SyncConfig>,
) -> Result<Box<dyn Reconcile>, ValidationError> {
    let ground = Arc::clone(ground);
    let config = Arc::clone(config);
    Ok(match kind.shape() {
        ValueShape::Entity => Box::new(Capability::<EntityRef>::new(kind, ground, config)?),
        ValueShape::Restriction => Box::new(Capability::<Restriction>::new(kind, ground, config)?),
    })
}

/// A descriptor made of per-kind capabilities sharing one ground.
#[derive(Debug)]
pub struct CompositeDescriptor {
    ground: Arc<Ground>,
    config: Arc<SyncConfig>,
    capabilities: Vec<Box<dyn Reconcile>>,
}

impl CompositeDescriptor {
    /// A descriptor with no capabilities and the default configuration.
    #[must_use]
    pub fn new(ground: Ground) -> Self {
        Self::with_config(ground, Arc::new(SyncConfig::default()))
    }

    /// A descriptor with no capabilities.
    #[must_use]
    pub fn with_config(ground: Ground, config: Arc<SyncConfig>) -> Self {
        Self {
            ground: Arc::new(ground),
            config,
            capabilities: Vec::new(),
        }
    }

    /// Sub and super capabilities.
    pub fn hierarchical(ground: Ground) -> Result<Self, ValidationError> {
        Self::new(ground).with_kinds(&[FactKind::Sub, FactKind::Super])
    }

    /// Every fact kind applicable to the ground's entity kind, in declared
    /// order.
    #[must_use]
    pub fn full(ground: Ground) -> Self {
        Self::full_with_config(ground, Arc::new(SyncConfig::default()))
    }

    /// Like [`Self::full`], with an explicit configuration.
    #[must_use]
    pub fn full_with_config(ground: Ground, config: Arc<SyncConfig>) -> Self {
        let mut descriptor = Self::with_config(ground, config);
        let subject = descriptor.ground.entity().kind;
        descriptor.capabilities = FactKind::ALL
            .iter()
            .filter(|kind| kind.applies_to(subject))
            .filter_map(|&kind| capability_for(kind, &descriptor.ground, &descriptor.config).ok())
            .collect();
        descriptor
    }

    /// Adds one capability per kind.
    pub fn with_kinds(mut self, kinds: &[FactKind]) -> Result<Self, ValidationError> {
        for &kind in kinds {
            self.add_kind(kind)?;
        }
        Ok(self)
    }

    /// Adds a capability for `kind`, typed by the kind's value shape.
    pub fn add_kind(&mut self, kind: FactKind) -> Result<(), ValidationError> {
        let capability = capability_for(kind, &self.ground, &self.config)?;
        self.push(capability)
    }

    /// Adds a prebuilt capability. It must share this descriptor's ground,
    /// and its kind must not be present yet.
    pub fn push(&mut self, capability: Box<dyn Reconcile>) -> Result<(), ValidationError> {
        if capability.ground() != self.ground.as_ref() {
            return Err(ValidationError::GroundMismatch {
                expected: self.ground.to_string(),
                actual: capability.ground().to_string(),
            });
        }
        let kind = capability.fact_kind();
        if self.has_kind(kind) {
            return Err(ValidationError::DuplicateCapability { kind });
        }
        self.capabilities.push(capability);
        Ok(())
    }

    /// The configuration shared by the capabilities.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fact kinds in insertion order.
    #[must_use]
    pub fn kinds(&self) -> Vec<FactKind> {
        self.capabilities.iter().map(|c| c.fact_kind()).collect()
    }

    /// Returns true if a capability for `kind` is present.
    #[must_use]
    pub fn has_kind(&self, kind: FactKind) -> bool {
        self.capabilities.iter().any(|c| c.fact_kind() == kind)
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Returns true if there are no capabilities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    fn find(&self, kind: FactKind) -> Option<&(dyn Reconcile + 'static)> {
        self.capabilities
            .iter()
            .find(|c| c.fact_kind() == kind)
            .map(AsRef::as_ref)
    }

    fn find_mut(&mut self, kind: FactKind) -> Option<&mut (dyn Reconcile + 'static)> {
        self.capabilities
            .iter_mut()
            .find(|c| c.fact_kind() == kind)
            .map(AsMut::as_mut)
    }

    /// Entity-valued capability for `kind`.
    #[must_use]
    pub fn links(&self, kind: FactKind) -> Option<&Capability<EntityRef>> {
        self.find(kind)?.as_any().downcast_ref()
    }

    /// Mutable entity-valued capability for `kind`.
    pub fn links_mut(&mut self, kind: FactKind) -> Option<&mut Capability<EntityRef>> {
        self.find_mut(kind)?.as_any_mut().downcast_mut()
    }

    /// Restriction-valued capability for `kind`.
    #[must_use]
    pub fn restrictions(&self, kind: FactKind) -> Option<&Capability<Restriction>> {
        self.find(kind)?.as_any().downcast_ref()
    }

    /// Mutable restriction-valued capability for `kind`.
    pub fn restrictions_mut(&mut self, kind: FactKind) -> Option<&mut Capability<Restriction>> {
        self.find_mut(kind)?.as_any_mut().downcast_mut()
    }

    /// Switches singleton mode for `kind`. Returns false if the kind is
    /// absent.
    pub fn set_singleton(&mut self, kind: FactKind, singleton: bool) -> bool {
        match self.find_mut(kind) {
            Some(capability) => {
                capability.set_singleton(singleton);
                true
            }
            None => false,
        }
    }

    /// One level of expansion along `kind`; empty if the kind is absent.
    pub fn build_related<D, F>(&self, kind: FactKind, factory: F) -> Vec<D>
    where
        D: Descriptor,
        F: FnMut(Ground) -> D,
    {
        self.links(kind)
            .map(|c| c.build_related(factory))
            .unwrap_or_default()
    }

    /// Sets or clears a property characteristic in the store.
    ///
    /// Characteristics are flags, not sets, so they bypass the diff and go
    /// straight to the store under the session lock.
    pub fn set_characteristic(
        &self,
        characteristic: Characteristic,
        enabled: bool,
    ) -> AxiomResult<bool> {
        let context = self.ground.context();
        let _session = context.session()?;
        let changed =
            context
                .store()
                .set_characteristic(self.ground.entity(), characteristic, enabled)?;
        debug!(
            subject = %self.ground.entity(),
            %characteristic,
            enabled,
            changed,
            "set characteristic"
        );
        Ok(changed)
    }

    /// Characteristics the store records for the grounded property.
    pub fn characteristics(&self) -> AxiomResult<BTreeSet<Characteristic>> {
        let context = self.ground.context();
        let _session = context.session()?;
        Ok(context.store().characteristics(self.ground.entity())?)
    }

    fn run(&mut self, write: bool) -> Vec<MappingIntent> {
        let direction = if write { "write" } else { "read" };
        let mut intents = Vec::new();
        for capability in &mut self.capabilities {
            let produced = if write {
                capability.write_axioms()
            } else {
                capability.read_axioms()
            };
            intents.extend(produced);
        }
        debug!(
            ground = %self.ground,
            direction,
            capabilities = self.capabilities.len(),
            changes = intents.iter().filter(|i| i.is_change()).count(),
            failed = intents.iter().filter(|i| i.kind == IntentKind::Failed).count(),
            "descriptor synchronised"
        );
        intents
    }
}

impl Descriptor for CompositeDescriptor {
    fn ground(&self) -> &Ground {
        &self.ground
    }

    fn read_axioms(&mut self) -> Vec<MappingIntent> {
        self.run(false)
    }

    fn write_axioms(&mut self) -> Vec<MappingIntent> {
        self.run(true)
    }
}

impl PartialEq for CompositeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.ground == other.ground
    }
}

impl Eq for CompositeDescriptor {}

impl Hash for CompositeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ground.hash(state);
    }
}

impl fmt::Display for CompositeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.ground)?;
        for (i, capability) in self.capabilities.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}: {}", capability.fact_kind(), capability.local_summary())?;
        }
        f.write_str(" }")
    }
}
