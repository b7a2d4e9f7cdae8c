use la_arena::Arena;
use smol_str::SmolStr;

use crate::error::{Result, TypeError};
use crate::types::{Binding, ClassId, TypeId};

// ── Stored definitions ────────────────────────────────────────────

/// A type class. Classes have identity: one arena entry per declared
/// class, and every reference to it goes through its `ClassId`.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: SmolStr,
    /// Classes this class inherits from.
    pub bases: ConstraintSet,
    /// The distinguished `Param` standing for the implementing type
    /// inside method signatures. Always constraint-free, index 0.
    pub self_param: TypeId,
    /// Method name → signature. The first argument of every method is
    /// `self_param`.
    pub methods: Vec<(SmolStr, Binding)>,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&Binding> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }
}

/// An entry in the type table: the type (or scheme, for `fn`/`ref`)
/// registered under a base name, plus the classes it implements.
#[derive(Debug, Clone)]
pub struct TypeData {
    pub binding: Binding,
    pub classes: ConstraintSet,
}

/// `this` implements `target`: identity, or reachable through bases.
pub fn derived(classes: &Arena<ClassDef>, this: ClassId, target: ClassId) -> bool {
    if this == target {
        return true;
    }
    classes[this]
        .bases
        .list
        .iter()
        .any(|&base| derived(classes, base, target))
}

// ── Constraint sets ───────────────────────────────────────────────

/// An insertion-ordered set of classes with subsumption: no element
/// is a proper ancestor of another, and duplicates are absorbed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    pub list: Vec<ClassId>,
}

/// Result of a method lookup through a constraint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHit {
    pub class: ClassId,
    /// The defining class was reached through the bases of an
    /// element rather than being in the set itself.
    pub via_base: bool,
}

impl ConstraintSet {
    pub fn new(list: Vec<ClassId>) -> Self {
        Self { list }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// True if some element is `class` or a descendant of it.
    pub fn has(&self, classes: &Arena<ClassDef>, class: ClassId) -> bool {
        self.list.iter().any(|&c| derived(classes, c, class))
    }

    /// Merge `extra` into the set, keeping only the strongest
    /// constraints: a class already subsumed by an element is
    /// skipped, a class subsuming existing elements replaces the
    /// first of them and absorbs the rest, anything else appends.
    pub fn merge(&mut self, classes: &Arena<ClassDef>, extra: &[ClassId]) {
        for &c in extra {
            if self.list.iter().any(|&e| derived(classes, e, c)) {
                continue;
            }
            if let Some(pos) = self.list.iter().position(|&e| derived(classes, c, e)) {
                self.list[pos] = c;
                let mut i = pos + 1;
                while i < self.list.len() {
                    if derived(classes, c, self.list[i]) {
                        self.list.remove(i);
                    } else {
                        i += 1;
                    }
                }
            } else {
                self.list.push(c);
            }
        }
    }

    /// Find the class providing method `name`, searching elements in
    /// order and their bases transitively. A descendant's definition
    /// shadows its ancestors'; two unrelated definitions are an
    /// ambiguity error.
    pub fn lookup_method(
        &self,
        classes: &Arena<ClassDef>,
        name: &str,
    ) -> Result<Option<MethodHit>> {
        for (i, &candidate) in self.list.iter().enumerate() {
            let hit = if classes[candidate].method(name).is_some() {
                Some(MethodHit {
                    class: candidate,
                    via_base: false,
                })
            } else {
                classes[candidate]
                    .bases
                    .lookup_method(classes, name)?
                    .map(|h| MethodHit {
                        class: h.class,
                        via_base: true,
                    })
            };

            let Some(mut hit) = hit else { continue };

            // A later element may redefine the method; prefer it when
            // it is a descendant of the first definer, reject it when
            // the two are unrelated.
            for &other in &self.list[i + 1..] {
                if derived(classes, hit.class, other) {
                    continue;
                }
                if classes[other].method(name).is_some() {
                    if derived(classes, other, hit.class) {
                        hit = MethodHit {
                            class: other,
                            via_base: false,
                        };
                    } else {
                        return Err(TypeError::AmbiguousMethod { name: name.into() });
                    }
                }
            }
            return Ok(Some(hit));
        }
        Ok(None)
    }
}
