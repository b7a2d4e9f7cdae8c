use std::mem::discriminant;

use crate::checker::TypeChecker;
use crate::error::{Result, TypeError};
use crate::types::{Binding, ClassId, FrameId, InfoId, TypeId, TypeNode};

// ── Implicit casts ───────────────────────────────────────────────

/// What widening, if any, unification had to perform. A non-`None`
/// result tells a downstream elaborator to insert an explicit cast at
/// this point; no AST rewriting happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    None,
    /// A value was accepted where a reference was expected.
    Reference,
    /// A concrete type was accepted where a class existential was
    /// expected.
    Dyn,
}

fn sorted_ids(list: &[ClassId]) -> Vec<u32> {
    let mut ids: Vec<u32> = list.iter().map(|&c| c.into_raw().into()).collect();
    ids.sort_unstable();
    ids
}

impl TypeChecker<'_> {
    /// Does `var` occur in `t`? Scans function and reference
    /// children; solved variables contribute through their solution.
    pub(crate) fn occurs(&mut self, var: TypeId, t: TypeId) -> bool {
        let t = self.repr(t);
        if t == var {
            return true;
        }
        match self.types[t].clone() {
            TypeNode::Function { param, ret, .. } => {
                self.occurs(var, param) || self.occurs(var, ret)
            }
            TypeNode::Ref { referent, .. } => self.occurs(var, referent),
            _ => false,
        }
    }

    /// Destructive unification of two types. Implicit casts, when
    /// enabled, are performed in the `a <- b` direction.
    pub(crate) fn unify_type(&mut self, a: TypeId, b: TypeId, implicit_cast: bool) -> Result<Cast> {
        let a = self.repr(a);
        let b = self.repr(b);
        if a == b {
            return Ok(Cast::None);
        }
        log::trace!("unify {:?} ~ {:?} (implicit_cast={})", a, b, implicit_cast);

        let a_is_var = matches!(self.types[a], TypeNode::Variable { .. });
        let b_is_var = matches!(self.types[b], TypeNode::Variable { .. });

        if a_is_var && b_is_var {
            // Link the deeper variable to the shallower one so the
            // survivor belongs to the outer scope.
            let depth_of = |ck: &Self, t: TypeId| match ck.types[t] {
                TypeNode::Variable { depth, .. } => depth,
                _ => unreachable!(),
            };
            let (survivor, dying) = if depth_of(self, a) < depth_of(self, b) {
                (a, b)
            } else {
                (b, a)
            };
            let absorbed = match &self.types[dying] {
                TypeNode::Variable { constraints, .. } => constraints.list.clone(),
                _ => unreachable!(),
            };
            if let TypeNode::Variable { constraints, .. } = &mut self.types[survivor] {
                constraints.merge(&self.classes, &absorbed);
            }
            if let TypeNode::Variable { solve, .. } = &mut self.types[dying] {
                *solve = Some(survivor);
            }
            return Ok(Cast::None);
        }

        if a_is_var {
            if self.occurs(a, b) {
                return Err(TypeError::Recursive {
                    ty: self.display_type(b),
                });
            }
            let wanted = match &self.types[a] {
                TypeNode::Variable { constraints, .. } => constraints.list.clone(),
                _ => unreachable!(),
            };
            self.apply_constraint(b, &wanted)?;
            if let TypeNode::Variable { solve, .. } = &mut self.types[a] {
                *solve = Some(b);
            }
            return Ok(Cast::None);
        }

        if b_is_var {
            if self.occurs(b, a) {
                return Err(TypeError::Recursive {
                    ty: self.display_type(a),
                });
            }
            let wanted = match &self.types[b] {
                TypeNode::Variable { constraints, .. } => constraints.list.clone(),
                _ => unreachable!(),
            };
            self.apply_constraint(a, &wanted)?;
            if let TypeNode::Variable { solve, .. } = &mut self.types[b] {
                *solve = Some(a);
            }
            return Ok(Cast::None);
        }

        match (self.types[a].clone(), self.types[b].clone()) {
            (
                TypeNode::Function {
                    param: p1, ret: r1, ..
                },
                TypeNode::Function {
                    param: p2, ret: r2, ..
                },
            ) => {
                // Parameter and result could be contra-/covariant
                // under `b <: a`, but the representations are not
                // interchangeable, so functions stay invariant.
                self.unify_type(p1, p2, false)?;
                self.unify_type(r1, r2, false)?;
                Ok(Cast::None)
            }
            (
                TypeNode::Dyn {
                    classes: c1,
                    region: rg1,
                },
                TypeNode::Dyn {
                    classes: c2,
                    region: rg2,
                },
            ) if implicit_cast => {
                // Order-insensitive comparison on registration ids.
                let widened = sorted_ids(&c1.list) != sorted_ids(&c2.list);
                if widened {
                    self.apply_constraint(b, &c1.list)?;
                }
                match self.convert_region(rg1, rg2) {
                    Some(r) => {
                        if let TypeNode::Dyn { region, .. } = &mut self.types[b] {
                            *region = r;
                        }
                    }
                    None => {
                        return Err(TypeError::RegionMismatch {
                            dst: self.display_type(a),
                            src: self.display_type(b),
                        })
                    }
                }
                Ok(if widened { Cast::Dyn } else { Cast::None })
            }
            (
                TypeNode::Ref {
                    referent: t1,
                    region: rg1,
                    ..
                },
                TypeNode::Ref {
                    referent: t2,
                    region: rg2,
                    ..
                },
            ) => {
                self.unify_type(t1, t2, false)?;
                match self.convert_region(rg1, rg2) {
                    Some(r) => {
                        if let TypeNode::Ref { region, .. } = &mut self.types[b] {
                            *region = r;
                        }
                    }
                    None => {
                        return Err(TypeError::RegionMismatch {
                            dst: self.display_type(a),
                            src: self.display_type(b),
                        })
                    }
                }
                Ok(Cast::None)
            }
            _ => Err(TypeError::Mismatch {
                expected: self.display_type(a),
                found: self.display_type(b),
            }),
        }
    }

    /// Unification where the source carries its info, so a value can
    /// be promoted into an expected reference or class existential
    /// and the source's region installed into it.
    pub(crate) fn unify_with_ref(&mut self, dst: TypeId, src: InfoId) -> Result<Cast> {
        let dst = self.repr(dst);
        let src_ty = self.repr(self.mono(src));
        self.infos[src].binding = Binding::Mono(src_ty);

        let differ = discriminant(&self.types[dst]) != discriminant(&self.types[src_ty]);
        let src_is_var = matches!(self.types[src_ty], TypeNode::Variable { .. });
        if differ && !src_is_var {
            if let TypeNode::Dyn { classes, region } = self.types[dst].clone() {
                self.apply_constraint(src_ty, &classes.list)?;
                let src_region = self.infos[src].region;
                match self.convert_region(src_region, region) {
                    Some(r) => {
                        if let TypeNode::Dyn { region, .. } = &mut self.types[dst] {
                            *region = r;
                        }
                    }
                    None => {
                        return Err(TypeError::RegionMismatch {
                            dst: self.display_type(dst),
                            src: self.display_type(src_ty),
                        })
                    }
                }
                return Ok(Cast::Dyn);
            }
            if let TypeNode::Ref {
                referent, region, ..
            } = self.types[dst].clone()
            {
                // The referent itself does not cast implicitly.
                self.unify_type(referent, src_ty, false)?;
                let src_region = self.infos[src].region;
                match self.convert_region(src_region, region) {
                    Some(r) => {
                        if let TypeNode::Ref { region, .. } = &mut self.types[dst] {
                            *region = r;
                        }
                    }
                    None => {
                        return Err(TypeError::RegionMismatch {
                            dst: self.display_type(dst),
                            src: self.display_type(src_ty),
                        })
                    }
                }
                return Ok(Cast::Reference);
            }
        }

        self.unify_type(dst, src_ty, true)
    }

    /// Unify an expected callee type against an argument/result pair,
    /// threading each side through `unify_with_ref` so it gets its
    /// own implicit-cast treatment.
    pub(crate) fn unify_function(
        &mut self,
        frame: FrameId,
        expected: TypeId,
        param: InfoId,
        ret: InfoId,
    ) -> Result<(Cast, Cast)> {
        let expected = self.repr(expected);
        match self.types[expected].clone() {
            TypeNode::Function {
                param: p, ret: r, ..
            } => {
                let c1 = self.unify_with_ref(p, param)?;
                let c2 = self.unify_with_ref(r, ret)?;
                Ok((c1, c2))
            }
            _ => {
                let pt = self.mono(param);
                let rt = self.mono(ret);
                let scheme = self.fn_scheme.clone();
                let fn_ty = self.instantiate(frame, scheme, vec![Some(pt), Some(rt)])?;
                self.unify_type(expected, fn_ty, false)?;
                Ok((Cast::None, Cast::None))
            }
        }
    }
}
