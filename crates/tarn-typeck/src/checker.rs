use la_arena::{Arena, ArenaMap};
use smol_str::SmolStr;
use std::collections::HashMap;

use tarn_ast::{ExprId, Module, TypeExpr, TypeExprId};

use crate::defs::{ClassDef, ConstraintSet, TypeData};
use crate::error::{Result, TypeError};
use crate::types::{
    Binding, ClassId, Frame, FrameId, InfoId, RegionId, RegionNode, Scheme, TypeId, TypeInfo,
    TypeNode,
};

// ── The checker ──────────────────────────────────────────────────

/// The inference engine: owns every node arena, the environment frame
/// chain, and the type/class registry. One checker runs one inference
/// pass over one module; the registry is populated up front and (apart
/// from `implement_class`) frozen during inference.
pub struct TypeChecker<'a> {
    pub(crate) module: &'a Module,

    // Node arenas. Arena ids are node identity: two structurally
    // equal nodes at different ids are different types.
    pub(crate) types: Arena<TypeNode>,
    pub(crate) regions: Arena<RegionNode>,
    pub(crate) infos: Arena<TypeInfo>,
    pub(crate) frames: Arena<Frame>,
    pub(crate) classes: Arena<ClassDef>,

    root: FrameId,

    // Registry
    pub(crate) type_table: HashMap<SmolStr, TypeData>,
    pub(crate) class_table: HashMap<SmolStr, ClassId>,
    pub(crate) fn_scheme: Scheme,
    pub(crate) ref_scheme: Scheme,

    /// Maps declared type-parameter names to their `Param` nodes
    /// while the binding that declares them is being inferred.
    pub(crate) type_param_scope: HashMap<SmolStr, TypeId>,

    /// The inferred info for every visited expression.
    pub(crate) expr_types: ArenaMap<ExprId, InfoId>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(module: &'a Module) -> Self {
        let mut types = Arena::new();
        let mut regions = Arena::new();
        let mut frames = Arena::new();
        let mut type_table = HashMap::new();

        let root = frames.alloc(Frame {
            parent: None,
            depth: 1,
            bindings: HashMap::new(),
        });

        // The `fn` base and its scheme `'a -> 'b`; every function
        // type is an instantiation of it.
        let fn_base = types.alloc(TypeNode::Base { name: "fn".into() });
        let p0 = types.alloc(TypeNode::Param {
            constraints: ConstraintSet::default(),
            index: 0,
        });
        let p1 = types.alloc(TypeNode::Param {
            constraints: ConstraintSet::default(),
            index: 1,
        });
        let fn_body = types.alloc(TypeNode::Function {
            base: fn_base,
            param: p0,
            ret: p1,
        });
        let fn_scheme = Scheme {
            type_params: vec![p0, p1],
            region_params: Vec::new(),
            body: fn_body,
        };
        type_table.insert(
            SmolStr::new("fn"),
            TypeData {
                binding: Binding::Poly(fn_scheme.clone()),
                classes: ConstraintSet::default(),
            },
        );

        // The `ref` base and its scheme `'a& at 'r`.
        let ref_base = types.alloc(TypeNode::Base { name: "ref".into() });
        let rp = types.alloc(TypeNode::Param {
            constraints: ConstraintSet::default(),
            index: 0,
        });
        let rr = regions.alloc(RegionNode::Param { index: 0 });
        let ref_body = types.alloc(TypeNode::Ref {
            base: ref_base,
            referent: rp,
            region: rr,
        });
        let ref_scheme = Scheme {
            type_params: vec![rp],
            region_params: vec![rr],
            body: ref_body,
        };
        type_table.insert(
            SmolStr::new("ref"),
            TypeData {
                binding: Binding::Poly(ref_scheme.clone()),
                classes: ConstraintSet::default(),
            },
        );

        Self {
            module,
            types,
            regions,
            infos: Arena::new(),
            frames,
            classes: Arena::new(),
            root,
            type_table,
            class_table: HashMap::new(),
            fn_scheme,
            ref_scheme,
            type_param_scope: HashMap::new(),
            expr_types: ArenaMap::default(),
        }
    }

    /// The inferred info recorded for an expression, if it was
    /// visited.
    pub fn type_of(&self, expr: ExprId) -> Option<InfoId> {
        self.expr_types.get(expr).copied()
    }

    // ── Environment frames ───────────────────────────────────────

    pub fn root(&self) -> FrameId {
        self.root
    }

    pub fn push_frame(&mut self, parent: FrameId) -> FrameId {
        let depth = self.frames[parent].depth + 1;
        self.frames.alloc(Frame {
            parent: Some(parent),
            depth,
            bindings: HashMap::new(),
        })
    }

    pub fn bind(&mut self, frame: FrameId, name: SmolStr, info: InfoId) {
        self.frames[frame].bindings.insert(name, info);
    }

    /// Look a name up through the frame chain.
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<InfoId> {
        let mut cur = Some(frame);
        while let Some(f) = cur {
            if let Some(&info) = self.frames[f].bindings.get(name) {
                return Some(info);
            }
            cur = self.frames[f].parent;
        }
        None
    }

    /// True if `outer` is `inner` or one of its ancestors.
    pub(crate) fn frame_encloses(&self, outer: FrameId, inner: FrameId) -> bool {
        let target = self.frames[outer].depth;
        if target > self.frames[inner].depth {
            return false;
        }
        let mut cur = inner;
        while self.frames[cur].depth != target {
            match self.frames[cur].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
        cur == outer
    }

    // ── Node factory ─────────────────────────────────────────────

    pub fn fresh_var(&mut self, frame: FrameId) -> TypeId {
        let depth = self.frames[frame].depth;
        self.types.alloc(TypeNode::Variable {
            constraints: ConstraintSet::default(),
            solve: None,
            depth,
        })
    }

    pub fn fresh_region_var(&mut self, frame: FrameId) -> RegionId {
        let depth = self.frames[frame].depth;
        self.regions.alloc(RegionNode::Variable { solve: None, depth })
    }

    /// A region naming the storage of `frame` itself.
    pub fn base_region(&mut self, frame: FrameId) -> RegionId {
        self.regions.alloc(RegionNode::Scope { frame })
    }

    pub fn temp_region(&mut self) -> RegionId {
        self.regions.alloc(RegionNode::Temporary)
    }

    pub fn new_info(&mut self, binding: Binding, region: RegionId) -> InfoId {
        self.infos.alloc(TypeInfo { binding, region })
    }

    pub fn info(&self, id: InfoId) -> &TypeInfo {
        &self.infos[id]
    }

    /// The monomorphic type of an info. Infos flowing through
    /// unification are monomorphic by construction.
    pub(crate) fn mono(&self, info: InfoId) -> TypeId {
        match self.infos[info].binding {
            Binding::Mono(t) => t,
            Binding::Poly(_) => unreachable!("generic binding reached unification"),
        }
    }

    // ── Solve-chain walks ────────────────────────────────────────

    /// Follow (and compress) the solve chain of a type variable.
    pub(crate) fn repr(&mut self, t: TypeId) -> TypeId {
        let next = match &self.types[t] {
            TypeNode::Variable { solve: Some(s), .. } => Some(*s),
            _ => None,
        };
        match next {
            Some(s) => {
                let tail = self.repr(s);
                if let TypeNode::Variable { solve, .. } = &mut self.types[t] {
                    *solve = Some(tail);
                }
                tail
            }
            None => t,
        }
    }

    /// Follow the solve chain of a region variable.
    pub(crate) fn repr_region(&mut self, r: RegionId) -> RegionId {
        let next = match self.regions[r] {
            RegionNode::Variable { solve: Some(s), .. } => Some(s),
            _ => None,
        };
        match next {
            Some(s) => {
                let tail = self.repr_region(s);
                if let RegionNode::Variable { solve, .. } = &mut self.regions[r] {
                    *solve = Some(tail);
                }
                tail
            }
            None => r,
        }
    }

    /// Peel any number of outer references, solving as it goes.
    pub(crate) fn unwrap_ref(&mut self, t: TypeId) -> TypeId {
        let mut t = self.repr(t);
        loop {
            let referent = match &self.types[t] {
                TypeNode::Ref { referent, .. } => Some(*referent),
                _ => None,
            };
            match referent {
                Some(inner) => {
                    let inner = self.repr(inner);
                    if let TypeNode::Ref { referent, .. } = &mut self.types[t] {
                        *referent = inner;
                    }
                    t = inner;
                }
                None => return t,
            }
        }
    }

    // ── Region lattice ───────────────────────────────────────────

    /// True if `region` is temporary storage or storage of a frame
    /// enclosing-or-equal to `frame`.
    pub(crate) fn includes(&mut self, frame: FrameId, region: RegionId) -> bool {
        let region = self.repr_region(region);
        match self.regions[region] {
            RegionNode::Temporary => true,
            RegionNode::Scope { frame: rframe } => self.frame_encloses(rframe, frame),
            _ => false,
        }
    }

    /// Coerce `src` into `dst` ("place the source where the
    /// destination expects it"). Not symmetric: with variables at the
    /// top and `Temporary` at the bottom of the lattice, this only
    /// ever strengthens `src` toward `dst`. Returns the canonical
    /// region on success; callers patch the slot `src` came from.
    pub(crate) fn convert_region(&mut self, dst: RegionId, src: RegionId) -> Option<RegionId> {
        let dst = self.repr_region(dst);
        let src = self.repr_region(src);
        match (self.regions[dst], self.regions[src]) {
            // Converting into the bottom element always succeeds.
            (RegionNode::Temporary, _) => {
                if let RegionNode::Variable { solve, .. } = &mut self.regions[src] {
                    *solve = Some(dst);
                }
                Some(dst)
            }
            // A temporary source fits nowhere else.
            (_, RegionNode::Temporary) => None,
            (_, RegionNode::Variable { .. }) => {
                if let RegionNode::Variable { solve, .. } = &mut self.regions[src] {
                    *solve = Some(dst);
                }
                Some(dst)
            }
            // A non-variable source cannot supply an unknown region.
            (RegionNode::Variable { .. }, _) => None,
            // Scheme parameters only convert to themselves.
            (RegionNode::Param { .. }, _) | (_, RegionNode::Param { .. }) => {
                (dst == src).then_some(dst)
            }
            // A scoped source must outlive the destination scope.
            (RegionNode::Scope { frame: dframe }, RegionNode::Scope { frame: sframe }) => {
                self.frame_encloses(sframe, dframe).then_some(dst)
            }
        }
    }

    // ── Registry ─────────────────────────────────────────────────

    /// Declare a primitive base type.
    pub fn declare_base(&mut self, name: &str) -> Result<TypeId> {
        let name = SmolStr::new(name);
        if self.type_table.contains_key(&name) {
            return Err(TypeError::DuplicateType { name });
        }
        let id = self.types.alloc(TypeNode::Base { name: name.clone() });
        log::debug!("declared base type '{}'", name);
        self.type_table.insert(
            name,
            TypeData {
                binding: Binding::Mono(id),
                classes: ConstraintSet::default(),
            },
        );
        Ok(id)
    }

    /// Declare a class with its base classes and method signatures.
    /// `SelfTy` inside a signature stands for the implementing type;
    /// signatures containing `Infer` holes become generic methods.
    pub fn declare_class(
        &mut self,
        name: &str,
        bases: &[&str],
        methods: &[(&str, TypeExprId)],
    ) -> Result<ClassId> {
        let name = SmolStr::new(name);
        if self.class_table.contains_key(&name) {
            return Err(TypeError::DuplicateClass { name });
        }
        let mut base_set = ConstraintSet::default();
        for base in bases {
            let id = self.class_id(base)?;
            base_set.merge(&self.classes, &[id]);
        }

        let self_param = self.types.alloc(TypeNode::Param {
            constraints: ConstraintSet::default(),
            index: 0,
        });

        // Signatures resolve one level below the root so their holes
        // generalize into method-level parameters.
        let sig_frame = self.push_frame(self.root);
        let mut sigs = Vec::with_capacity(methods.len());
        for (mname, te) in methods {
            let ty = self.resolve_type_with_self(sig_frame, *te, Some(self_param))?;
            let binding = self.generalize(self.root, ty, Vec::new());
            let body = match &binding {
                Binding::Mono(t) => *t,
                Binding::Poly(s) => s.body,
            };
            let body = self.repr(body);
            if !matches!(self.types[body], TypeNode::Function { .. }) {
                return Err(TypeError::MethodNotFunction {
                    name: SmolStr::new(*mname),
                });
            }
            sigs.push((SmolStr::new(*mname), binding));
        }

        let id = self.classes.alloc(ClassDef {
            name: name.clone(),
            bases: base_set,
            self_param,
            methods: sigs,
        });
        log::debug!("declared class '{}'", name);
        self.class_table.insert(name, id);
        Ok(id)
    }

    /// Record that a declared base type implements `class_name`. The
    /// single registry mutation allowed after declaration time.
    pub fn implement_class(&mut self, type_name: &str, class_name: &str) -> Result<()> {
        let class = self.class_id(class_name)?;
        let data = self
            .type_table
            .get_mut(type_name)
            .ok_or_else(|| TypeError::UnknownType {
                name: SmolStr::new(type_name),
            })?;
        data.classes.list.push(class);
        log::debug!("'{}' now implements '{}'", type_name, class_name);
        Ok(())
    }

    pub fn class_id(&self, name: &str) -> Result<ClassId> {
        self.class_table
            .get(name)
            .copied()
            .ok_or_else(|| TypeError::UnknownClass {
                name: SmolStr::new(name),
            })
    }

    // ── Annotation resolution ────────────────────────────────────

    /// Resolve a syntactic annotation in `frame`: fresh variables and
    /// regions are introduced at that frame's depth.
    pub fn resolve_type(&mut self, frame: FrameId, te: TypeExprId) -> Result<TypeId> {
        self.resolve_type_with_self(frame, te, None)
    }

    fn resolve_type_with_self(
        &mut self,
        frame: FrameId,
        te: TypeExprId,
        self_ty: Option<TypeId>,
    ) -> Result<TypeId> {
        match self.module.type_exprs[te].clone() {
            TypeExpr::Named(name) => match self.type_table.get(&name) {
                Some(TypeData {
                    binding: Binding::Mono(t),
                    ..
                }) => Ok(*t),
                _ => Err(TypeError::UnknownType { name }),
            },
            TypeExpr::Fn { param, ret } => {
                let p = self.resolve_type_with_self(frame, param, self_ty)?;
                let r = self.resolve_type_with_self(frame, ret, self_ty)?;
                let scheme = self.fn_scheme.clone();
                self.instantiate(frame, scheme, vec![Some(p), Some(r)])
            }
            TypeExpr::Ref(inner) => {
                let t = self.resolve_type_with_self(frame, inner, self_ty)?;
                let scheme = self.ref_scheme.clone();
                self.instantiate(frame, scheme, vec![Some(t)])
            }
            TypeExpr::Classes(names) => {
                let mut set = ConstraintSet::default();
                for name in &names {
                    let id = self.class_id(name)?;
                    set.merge(&self.classes, &[id]);
                }
                let region = self.fresh_region_var(frame);
                Ok(self.types.alloc(TypeNode::Dyn {
                    classes: set,
                    region,
                }))
            }
            TypeExpr::ParamRef(name) => self
                .type_param_scope
                .get(&name)
                .copied()
                .ok_or(TypeError::UnknownTypeParam { name }),
            TypeExpr::SelfTy => self_ty.ok_or(TypeError::SelfOutsideClass),
            TypeExpr::Infer => Ok(self.fresh_var(frame)),
        }
    }

    // ── Class lists and constraint application ───────────────────

    /// The name a type is registered under, when it has one.
    pub(crate) fn type_name(&self, t: TypeId) -> Option<&SmolStr> {
        match &self.types[t] {
            TypeNode::Base { name } => Some(name),
            TypeNode::Function { base, .. } | TypeNode::Ref { base, .. } => self.type_name(*base),
            _ => None,
        }
    }

    /// The classes a type implements: its own constraint set for
    /// variables and scheme parameters, the carried set for
    /// existentials, the referent's for references, and the registry
    /// entry for named types.
    pub(crate) fn class_list(&self, t: TypeId) -> ConstraintSet {
        match &self.types[t] {
            TypeNode::Variable { constraints, .. } | TypeNode::Param { constraints, .. } => {
                constraints.clone()
            }
            TypeNode::Dyn { classes, .. } => classes.clone(),
            TypeNode::Ref { referent, .. } => self.class_list(*referent),
            _ => {
                let name = self.type_name(t).unwrap();
                self.type_table[name].classes.clone()
            }
        }
    }

    /// Require `t` to implement all of `wanted`. Variables absorb the
    /// classes into their constraint set; every other type must
    /// already satisfy them.
    pub(crate) fn apply_constraint(&mut self, t: TypeId, wanted: &[ClassId]) -> Result<()> {
        let t = self.unwrap_ref(t);
        if matches!(self.types[t], TypeNode::Variable { .. }) {
            if let TypeNode::Variable { constraints, .. } = &mut self.types[t] {
                constraints.merge(&self.classes, wanted);
            }
            return Ok(());
        }

        let implemented = self.class_list(t);
        for &want in wanted {
            if !implemented.has(&self.classes, want) {
                let class = self.classes[want].name.clone();
                return Err(if matches!(self.types[t], TypeNode::Param { .. }) {
                    TypeError::ParamNeedsConstraint { class }
                } else {
                    TypeError::MissingClass {
                        ty: self.display_type(t),
                        class,
                    }
                });
            }
        }
        Ok(())
    }

    // ── Generalization ───────────────────────────────────────────

    /// Promote the free variables of `t` (those deeper than `frame`)
    /// to scheme parameters. `pre_params` fixes the slots of
    /// parameters the caller declared up front.
    pub fn generalize(&mut self, frame: FrameId, t: TypeId, pre_params: Vec<TypeId>) -> Binding {
        let depth = self.frames[frame].depth;
        let mut vals = pre_params;
        let mut region_vals = Vec::new();
        let body = self.generalize_ty(depth, t, &mut vals, &mut region_vals);
        if vals.is_empty() && region_vals.is_empty() {
            Binding::Mono(body)
        } else {
            log::debug!(
                "generalized over {} type and {} region parameters",
                vals.len(),
                region_vals.len()
            );
            Binding::Poly(Scheme {
                type_params: vals,
                region_params: region_vals,
                body,
            })
        }
    }

    fn generalize_ty(
        &mut self,
        depth: usize,
        t: TypeId,
        vals: &mut Vec<TypeId>,
        region_vals: &mut Vec<RegionId>,
    ) -> TypeId {
        let t = self.repr(t);
        match self.types[t].clone() {
            TypeNode::Base { .. } | TypeNode::Param { .. } => t,
            TypeNode::Function { param, ret, .. } => {
                let gp = self.generalize_ty(depth, param, vals, region_vals);
                let gr = self.generalize_ty(depth, ret, vals, region_vals);
                if let TypeNode::Function { param, ret, .. } = &mut self.types[t] {
                    *param = gp;
                    *ret = gr;
                }
                t
            }
            TypeNode::Variable { depth: var_depth, .. } if depth < var_depth => {
                // Free: promote to a parameter, carrying the
                // accumulated constraints over. The solve link makes
                // later visits canonicalize to the same parameter.
                let constraints = match &mut self.types[t] {
                    TypeNode::Variable { constraints, .. } => std::mem::take(constraints),
                    _ => unreachable!(),
                };
                let p = self.types.alloc(TypeNode::Param {
                    constraints,
                    index: vals.len(),
                });
                if let TypeNode::Variable { solve, .. } = &mut self.types[t] {
                    *solve = Some(p);
                }
                vals.push(p);
                p
            }
            TypeNode::Variable { .. } => t,
            TypeNode::Dyn { region, .. } => {
                let gr = self.generalize_region(depth, region, region_vals);
                if let TypeNode::Dyn { region, .. } = &mut self.types[t] {
                    *region = gr;
                }
                t
            }
            TypeNode::Ref {
                referent, region, ..
            } => {
                let gt = self.generalize_ty(depth, referent, vals, region_vals);
                let gr = self.generalize_region(depth, region, region_vals);
                if let TypeNode::Ref {
                    referent, region, ..
                } = &mut self.types[t]
                {
                    *referent = gt;
                    *region = gr;
                }
                t
            }
        }
    }

    fn generalize_region(
        &mut self,
        depth: usize,
        region: RegionId,
        region_vals: &mut Vec<RegionId>,
    ) -> RegionId {
        let region = self.repr_region(region);
        match self.regions[region] {
            RegionNode::Variable {
                depth: var_depth, ..
            } if depth < var_depth => {
                let p = self.regions.alloc(RegionNode::Param {
                    index: region_vals.len(),
                });
                if let RegionNode::Variable { solve, .. } = &mut self.regions[region] {
                    *solve = Some(p);
                }
                region_vals.push(p);
                p
            }
            _ => region,
        }
    }

    // ── Instantiation ────────────────────────────────────────────

    /// Copy a scheme body, substituting fresh variables (or the
    /// supplied arguments) for its parameters. Unsubstituted subtrees
    /// are shared, not copied, so node identity is preserved where it
    /// can be.
    pub(crate) fn instantiate(
        &mut self,
        frame: FrameId,
        scheme: Scheme,
        args: Vec<Option<TypeId>>,
    ) -> Result<TypeId> {
        let depth = self.frames[frame].depth;
        let mut supplied = args;
        supplied.resize(scheme.type_params.len(), None);

        let mut vals = Vec::with_capacity(scheme.type_params.len());
        for (&param, arg) in scheme.type_params.iter().zip(supplied) {
            let constraints = match &self.types[param] {
                TypeNode::Param { constraints, .. } => constraints.clone(),
                _ => unreachable!("scheme parameter is not a Param node"),
            };
            match arg {
                None => vals.push(self.types.alloc(TypeNode::Variable {
                    constraints,
                    solve: None,
                    depth,
                })),
                Some(arg) => {
                    self.apply_constraint(arg, &constraints.list)?;
                    vals.push(arg);
                }
            }
        }
        let region_vals: Vec<RegionId> = scheme
            .region_params
            .iter()
            .map(|_| self.regions.alloc(RegionNode::Variable { solve: None, depth }))
            .collect();

        Ok(self.instantiate_ty(
            scheme.body,
            &scheme.type_params,
            &vals,
            &scheme.region_params,
            &region_vals,
        ))
    }

    fn instantiate_ty(
        &mut self,
        t: TypeId,
        params: &[TypeId],
        vals: &[TypeId],
        region_params: &[RegionId],
        region_vals: &[RegionId],
    ) -> TypeId {
        match self.types[t].clone() {
            // Variables belong to an outer scope; bases are shared.
            TypeNode::Base { .. } | TypeNode::Variable { .. } => t,
            TypeNode::Param { index, .. } => {
                if index < params.len() && params[index] == t {
                    vals[index]
                } else {
                    t
                }
            }
            TypeNode::Function { base, param, ret } => {
                let ip = self.instantiate_ty(param, params, vals, region_params, region_vals);
                let ir = self.instantiate_ty(ret, params, vals, region_params, region_vals);
                if ip == param && ir == ret {
                    t
                } else {
                    self.types.alloc(TypeNode::Function {
                        base,
                        param: ip,
                        ret: ir,
                    })
                }
            }
            TypeNode::Dyn { classes, region } => {
                let ir = self.instantiate_region(region, region_params, region_vals);
                if ir == region {
                    t
                } else {
                    self.types.alloc(TypeNode::Dyn {
                        classes,
                        region: ir,
                    })
                }
            }
            TypeNode::Ref {
                base,
                referent,
                region,
            } => {
                let it = self.instantiate_ty(referent, params, vals, region_params, region_vals);
                let ir = self.instantiate_region(region, region_params, region_vals);
                if it == referent && ir == region {
                    t
                } else {
                    self.types.alloc(TypeNode::Ref {
                        base,
                        referent: it,
                        region: ir,
                    })
                }
            }
        }
    }

    fn instantiate_region(
        &mut self,
        r: RegionId,
        region_params: &[RegionId],
        region_vals: &[RegionId],
    ) -> RegionId {
        match self.regions[r] {
            RegionNode::Param { index } if index < region_params.len() && region_params[index] == r => {
                region_vals[index]
            }
            _ => r,
        }
    }
}
