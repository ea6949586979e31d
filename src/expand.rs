//! Bounded multi-level descriptor expansion.
//!
//! [`DescriptorArena::expand`] walks the related-entity graph breadth-first
//! from a root descriptor. Descriptors live in one arena keyed by
//! [`GroundKey`]; an entity reached twice gets an edge to the existing
//! descriptor instead of a new one, so cycles terminate. The walk also stops
//! at the configured depth and descriptor count, in which case the arena is
//! marked truncated.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::capability::Descriptor;
use crate::config::ExpansionBounds;
use crate::descriptor::CompositeDescriptor;
use crate::error::ValidationError;
use crate::fact::FactKind;
use crate::ground::{Ground, GroundKey};
use crate::intent::MappingIntent;

/// Position of a descriptor in its arena. The root is always 0.
pub type DescriptorIndex = usize;

/// A related-entity link followed (or found) during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpansionEdge {
    /// Descriptor whose capability held the related entity.
    pub from: DescriptorIndex,
    /// Fact kind of that capability.
    pub kind: FactKind,
    /// Descriptor of the related entity.
    pub to: DescriptorIndex,
}

#[derive(Debug)]
struct Node {
    descriptor: CompositeDescriptor,
    depth: usize,
}

/// Arena of descriptors produced by one expansion.
#[derive(Debug)]
pub struct DescriptorArena {
    nodes: Vec<Node>,
    index: HashMap<GroundKey, DescriptorIndex>,
    edges: Vec<ExpansionEdge>,
    intents: Vec<MappingIntent>,
    truncated: bool,
}

impl DescriptorArena {
    /// Expand `root` along `kinds` within `bounds`.
    ///
    /// The root is used as is. Every descriptor the factory builds is read
    /// once; the intents of those reads are kept in [`Self::intents`]. The
    /// factory receives the ground to describe and must build the descriptor
    /// on that ground.
    pub fn expand<F>(
        root: CompositeDescriptor,
        kinds: &[FactKind],
        bounds: ExpansionBounds,
        mut factory: F,
    ) -> Result<Self, ValidationError>
    where
        F: FnMut(Ground) -> CompositeDescriptor,
    {
        bounds.validate()?;

        let mut arena = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            intents: Vec::new(),
            truncated: false,
        };
        arena.insert(root.ground().key(), root, 0);

        let mut queue = VecDeque::from([0]);
        while let Some(from) = queue.pop_front() {
            let depth = arena.nodes[from].depth;
            if depth >= bounds.max_depth {
                if arena.has_unvisited_links(from, kinds) {
                    arena.truncated = true;
                }
                continue;
            }

            for (kind, ground) in arena.related(from, kinds) {
                let key = ground.key();
                if let Some(&to) = arena.index.get(&key) {
                    arena.edges.push(ExpansionEdge { from, kind, to });
                    continue;
                }
                if arena.nodes.len() >= bounds.max_descriptors {
                    arena.truncated = true;
                    continue;
                }

                let mut descriptor = factory(ground);
                arena.intents.extend(descriptor.read_axioms());
                let to = arena.insert(key, descriptor, depth + 1);
                arena.edges.push(ExpansionEdge { from, kind, to });
                queue.push_back(to);
            }
        }

        debug!(
            root = %arena.nodes[0].descriptor.ground(),
            descriptors = arena.nodes.len(),
            edges = arena.edges.len(),
            truncated = arena.truncated,
            "expanded descriptors"
        );
        Ok(arena)
    }

    /// Expand with the bounds of the root's configuration.
    pub fn expand_default<F>(
        root: CompositeDescriptor,
        kinds: &[FactKind],
        factory: F,
    ) -> Result<Self, ValidationError>
    where
        F: FnMut(Ground) -> CompositeDescriptor,
    {
        let bounds = root.config().expansion;
        Self::expand(root, kinds, bounds, factory)
    }

    fn insert(&mut self, key: GroundKey, descriptor: CompositeDescriptor, depth: usize) -> DescriptorIndex {
        let idx = self.nodes.len();
        self.nodes.push(Node { descriptor, depth });
        self.index.insert(key, idx);
        idx
    }

    fn related(&self, from: DescriptorIndex, kinds: &[FactKind]) -> Vec<(FactKind, Ground)> {
        let descriptor = &self.nodes[from].descriptor;
        kinds
            .iter()
            .filter_map(|&kind| descriptor.links(kind).map(|c| (kind, c)))
            .flat_map(|(kind, capability)| {
                capability
                    .get()
                    .iter()
                    .map(move |entity| (kind, descriptor.ground().regrounded(entity.clone())))
            })
            .collect()
    }

    fn has_unvisited_links(&self, from: DescriptorIndex, kinds: &[FactKind]) -> bool {
        self.related(from, kinds)
            .iter()
            .any(|(_, ground)| !self.index.contains_key(&ground.key()))
    }

    /// The root descriptor.
    #[must_use]
    pub fn root(&self) -> &CompositeDescriptor {
        &self.nodes[0].descriptor
    }

    /// Number of descriptors, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: an arena holds at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Descriptor at `idx`.
    #[must_use]
    pub fn get(&self, idx: DescriptorIndex) -> Option<&CompositeDescriptor> {
        self.nodes.get(idx).map(|n| &n.descriptor)
    }

    /// Mutable descriptor at `idx`.
    pub fn get_mut(&mut self, idx: DescriptorIndex) -> Option<&mut CompositeDescriptor> {
        self.nodes.get_mut(idx).map(|n| &mut n.descriptor)
    }

    /// Index of the descriptor for `key`.
    #[must_use]
    pub fn index_of(&self, key: &GroundKey) -> Option<DescriptorIndex> {
        self.index.get(key).copied()
    }

    /// Descriptor for `key`.
    #[must_use]
    pub fn get_by_key(&self, key: &GroundKey) -> Option<&CompositeDescriptor> {
        self.index_of(key).and_then(|idx| self.get(idx))
    }

    /// Distance of `idx` from the root.
    #[must_use]
    pub fn depth(&self, idx: DescriptorIndex) -> Option<usize> {
        self.nodes.get(idx).map(|n| n.depth)
    }

    /// Every link followed or found, in discovery order.
    #[must_use]
    pub fn edges(&self) -> &[ExpansionEdge] {
        &self.edges
    }

    /// Intents of the reads performed on new descriptors.
    #[must_use]
    pub fn intents(&self) -> &[MappingIntent] {
        &self.intents
    }

    /// True if the bounds cut the walk short.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Descriptors in insertion (breadth-first) order.
    pub fn iter(&self) -> impl Iterator<Item = (DescriptorIndex, &CompositeDescriptor)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i, &n.descriptor))
    }

    /// Consumes the arena, returning descriptors in insertion order.
    #[must_use]
    pub fn into_descriptors(self) -> Vec<CompositeDescriptor> {
        self.nodes.into_iter().map(|n| n.descriptor).collect()
    }
}
