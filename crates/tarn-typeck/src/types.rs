use la_arena::Idx;
use smol_str::SmolStr;
use std::collections::HashMap;

use crate::defs::{ClassDef, ConstraintSet};

// ── ID types ──────────────────────────────────────────────────────

pub type TypeId = Idx<TypeNode>;
pub type RegionId = Idx<RegionNode>;
pub type InfoId = Idx<TypeInfo>;
pub type FrameId = Idx<Frame>;
pub type ClassId = Idx<ClassDef>;

// ── Type nodes ────────────────────────────────────────────────────

/// A node in the type graph. Node identity (arena id equality) is
/// meaningful: two structurally equal nodes are distinct types unless
/// one is reachable from the other through a `solve` link.
#[derive(Debug, Clone)]
pub enum TypeNode {
    /// A declared base type.
    Base { name: SmolStr },
    /// Function type. `base` points at the registered `fn` base node
    /// so the type table can be consulted by name.
    Function {
        base: TypeId,
        param: TypeId,
        ret: TypeId,
    },
    /// A unification variable. Once `solve` is set, every observation
    /// must walk through it first.
    Variable {
        constraints: ConstraintSet,
        solve: Option<TypeId>,
        depth: usize,
    },
    /// A bound parameter of a generic scheme; `index` is its slot in
    /// the scheme's parameter list.
    Param {
        constraints: ConstraintSet,
        index: usize,
    },
    /// Type-as-class existential: some value whose static type
    /// implements `classes`, stored at `region`. Behaves as a
    /// restricted supertype.
    Dyn {
        classes: ConstraintSet,
        region: RegionId,
    },
    /// Reference to a value of `referent` living at `region`. `base`
    /// points at the registered `ref` base node.
    Ref {
        base: TypeId,
        referent: TypeId,
        region: RegionId,
    },
}

// ── Region nodes ──────────────────────────────────────────────────

/// Where a value lives. Ordered as a lattice: `Temporary` is the
/// bottom element, `Scope` regions are ordered by lexical
/// containment, variables stand for an as-yet-unknown region.
#[derive(Debug, Clone, Copy)]
pub enum RegionNode {
    /// Storage belonging to a specific environment frame.
    Scope { frame: FrameId },
    /// Temporary (unnamed) storage.
    Temporary,
    /// A unification variable over regions.
    Variable { solve: Option<RegionId>, depth: usize },
    /// A bound region parameter of a generic scheme.
    Param { index: usize },
}

// ── Schemes and bindings ──────────────────────────────────────────

/// A generic scheme: `Param` nodes in `body` whose index points into
/// `type_params`/`region_params` are the scheme's own parameters.
#[derive(Debug, Clone)]
pub struct Scheme {
    pub type_params: Vec<TypeId>,
    pub region_params: Vec<RegionId>,
    pub body: TypeId,
}

/// What an identifier resolves to: a monomorphic type or a scheme.
#[derive(Debug, Clone)]
pub enum Binding {
    Mono(TypeId),
    Poly(Scheme),
}

/// A binding together with the region where the *identifier* (not
/// its type) lives. Stored in an arena because the inference walks
/// mutate infos in place.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub binding: Binding,
    pub region: RegionId,
}

// ── Environment frames ────────────────────────────────────────────

/// One lexical scope frame. Frames are never removed from their
/// arena, so a `Scope` region that outlives its frame stays
/// comparable; the dangling checks reject it before it can be used.
#[derive(Debug, Clone)]
pub struct Frame {
    pub parent: Option<FrameId>,
    pub depth: usize,
    pub bindings: HashMap<SmolStr, InfoId>,
}
