use smol_str::SmolStr;

use tarn_ast::{Expr, ExprId, TypeParamDecl};

use crate::checker::TypeChecker;
use crate::defs::ConstraintSet;
use crate::error::{Result, TypeError};
use crate::types::{Binding, ClassId, FrameId, InfoId, RegionNode, Scheme, TypeId, TypeNode};
use crate::unify::Cast;

impl TypeChecker<'_> {
    // ── Algorithm J: bottom-up synthesis ─────────────────────────

    /// Infer the type of `expr` in `frame`, synthesizing bottom-up.
    pub fn infer(&mut self, frame: FrameId, expr: ExprId) -> Result<InfoId> {
        let info = match self.module.exprs[expr].clone() {
            Expr::Constant { ty } => {
                let t = self.resolve_type(frame, ty)?;
                let region = self.temp_region();
                self.new_info(Binding::Mono(t), region)
            }

            Expr::Ident { name } => {
                let Some(found) = self.lookup(frame, &name) else {
                    return Err(TypeError::UnknownIdentifier { name });
                };
                match self.info(found).binding.clone() {
                    Binding::Mono(_) => found,
                    Binding::Poly(scheme) => {
                        // Instances of a scheme are always temporaries.
                        let t = self.instantiate(frame, scheme, Vec::new())?;
                        let region = self.temp_region();
                        self.new_info(Binding::Mono(t), region)
                    }
                }
            }

            Expr::Lambda {
                param,
                annotation,
                body,
            } => {
                let child = self.push_frame(frame);
                let param_ty = match annotation {
                    Some(te) => self.resolve_type(child, te)?,
                    None => self.fresh_var(child),
                };
                let param_region = self.base_region(child);
                let param_info = self.new_info(Binding::Mono(param_ty), param_region);
                self.bind(child, param, param_info);

                let tau = self.infer(child, body)?;
                self.lambda_dangling_check(child, tau)?;

                let body_ty = self.mono(tau);
                let scheme = self.fn_scheme.clone();
                let fn_ty = self.instantiate(frame, scheme, vec![Some(param_ty), Some(body_ty)])?;
                let region = self.temp_region();
                self.new_info(Binding::Mono(fn_ty), region)
            }

            Expr::Apply { func, arg } => {
                let tau1 = self.infer(frame, func)?;
                let tau2 = self.infer(frame, arg)?;
                let result_ty = self.fresh_var(frame);
                let result_region = self.temp_region();
                let result = self.new_info(Binding::Mono(result_ty), result_region);
                let callee = self.mono(tau1);
                self.unify_function(frame, callee, tau2, result)?;
                result
            }

            Expr::Let {
                name,
                type_params,
                value,
                body,
            } => {
                let (pre, saved) = self.declare_type_params(&type_params)?;
                let inferred = self.infer(frame, value);
                self.restore_type_params(saved);
                let tau1 = inferred?;

                self.let_dangling_check(&name, tau1)?;
                if self.frames_contains(frame, &name) {
                    return Err(TypeError::DuplicateBinding { name });
                }
                let value_ty = self.mono(tau1);
                let binding = self.generalize(frame, value_ty, pre);
                let region = self.base_region(frame);
                let info = self.new_info(binding, region);
                self.bind(frame, name, info);

                self.infer(frame, body)?
            }

            Expr::Letrec {
                name,
                type_params,
                value,
                body,
            } => {
                if self.frames_contains(frame, &name) {
                    return Err(TypeError::DuplicateBinding { name });
                }
                let (pre, saved) = self.declare_type_params(&type_params)?;
                let rec_ty = self.fresh_var(frame);
                let rec_region = self.base_region(frame);
                let rec = self.new_info(Binding::Mono(rec_ty), rec_region);
                self.bind(frame, name.clone(), rec);

                let inferred = self.infer(frame, value);
                self.restore_type_params(saved);
                let tau1 = inferred?;

                // The right-hand side is a temporary, so only the
                // types unify; the binding keeps its own region.
                let bound = self.mono(rec);
                let value_ty = self.mono(tau1);
                self.unify_type(bound, value_ty, true)?;
                self.let_dangling_check(&name, rec)?;

                let binding = self.generalize(frame, value_ty, pre);
                self.infos[rec].binding = binding;

                self.infer(frame, body)?
            }

            Expr::MethodAccess { receiver, method } => {
                let tau = self.infer(frame, receiver)?;
                self.class_method_info(frame, tau, &method)?
            }

            Expr::Binary {
                class,
                method,
                lhs,
                rhs,
            } => {
                let class = self.class_id(&class)?;
                let tau1 = self.infer(frame, lhs)?;
                let lhs_ty = self.mono(tau1);
                self.apply_constraint(lhs_ty, &[class])?;
                let tau2 = self.infer(frame, rhs)?;

                let result_ty = self.fresh_var(frame);
                let result_region = self.temp_region();
                let result = self.new_info(Binding::Mono(result_ty), result_region);
                let op = self.instantiated_method(frame, class, &method, tau1)?;
                self.unify_function(frame, op, tau2, result)?;
                result
            }
        };
        self.expr_types.insert(expr, info);
        Ok(info)
    }

    // ── Algorithm M: top-down checking ───────────────────────────

    /// Check `expr` against the expected info `rho`, pushing the
    /// expectation down so it reaches subterms before their variables
    /// escape upward.
    pub fn check(&mut self, frame: FrameId, expr: ExprId, rho: InfoId) -> Result<()> {
        match self.module.exprs[expr].clone() {
            Expr::Constant { ty } => {
                let t = self.resolve_type(frame, ty)?;
                let region = self.temp_region();
                let lit = self.new_info(Binding::Mono(t), region);
                let expected = self.mono(rho);
                self.unify_with_ref(expected, lit)?;
                self.downgrade_to_temporary(rho);
            }

            Expr::Ident { name } => {
                let Some(found) = self.lookup(frame, &name) else {
                    return Err(TypeError::UnknownIdentifier { name });
                };
                match self.info(found).binding.clone() {
                    Binding::Mono(_) => {
                        let expected = self.mono(rho);
                        let cast = self.unify_with_ref(expected, found)?;
                        if cast == Cast::None {
                            // No widening happened, so the result
                            // lives wherever the binding lives.
                            self.infos[rho].region = self.infos[found].region;
                        } else {
                            self.downgrade_to_temporary(rho);
                        }
                    }
                    Binding::Poly(scheme) => {
                        let t = self.instantiate(frame, scheme, Vec::new())?;
                        let region = self.temp_region();
                        let inst = self.new_info(Binding::Mono(t), region);
                        let expected = self.mono(rho);
                        self.unify_with_ref(expected, inst)?;
                        self.downgrade_to_temporary(rho);
                    }
                }
            }

            Expr::Lambda {
                param,
                annotation,
                body,
            } => {
                let child = self.push_frame(frame);
                let param_ty = match annotation {
                    Some(te) => self.resolve_type(child, te)?,
                    None => self.fresh_var(child),
                };
                let param_region = self.base_region(child);
                let param_info = self.new_info(Binding::Mono(param_ty), param_region);

                let body_ty = self.fresh_var(child);
                let body_region = self.fresh_region_var(child);
                let body_info = self.new_info(Binding::Mono(body_ty), body_region);

                let expected = self.mono(rho);
                self.unify_function(frame, expected, param_info, body_info)?;

                self.bind(child, param, param_info);
                self.check(child, body, body_info)?;
                self.lambda_dangling_check(child, body_info)?;
            }

            Expr::Apply { func, arg } => {
                let arg_ty = self.fresh_var(frame);
                let arg_region = self.base_region(frame);
                let arg_info = self.new_info(Binding::Mono(arg_ty), arg_region);

                let expected = self.mono(rho);
                let scheme = self.fn_scheme.clone();
                let fn_ty = self.instantiate(frame, scheme, vec![Some(arg_ty), Some(expected)])?;
                let fn_region = self.base_region(frame);
                let fn_info = self.new_info(Binding::Mono(fn_ty), fn_region);

                self.check(frame, func, fn_info)?;
                self.check(frame, arg, arg_info)?;
            }

            Expr::Let {
                name,
                type_params,
                value,
                body,
            } => {
                let (pre, saved) = self.declare_type_params(&type_params)?;
                let value_ty = self.fresh_var(frame);
                let value_region = self.base_region(frame);
                let value_info = self.new_info(Binding::Mono(value_ty), value_region);
                let checked = self.check(frame, value, value_info);
                self.restore_type_params(saved);
                checked?;

                self.let_dangling_check(&name, value_info)?;
                if self.frames_contains(frame, &name) {
                    return Err(TypeError::DuplicateBinding { name });
                }
                let bound_ty = self.mono(value_info);
                let binding = self.generalize(frame, bound_ty, pre);
                let region = self.base_region(frame);
                let info = self.new_info(binding, region);
                self.bind(frame, name, info);

                self.check(frame, body, rho)?;
            }

            Expr::Letrec {
                name,
                type_params,
                value,
                body,
            } => {
                if self.frames_contains(frame, &name) {
                    return Err(TypeError::DuplicateBinding { name });
                }
                let (pre, saved) = self.declare_type_params(&type_params)?;
                let rec_ty = self.fresh_var(frame);
                let rec_region = self.base_region(frame);
                let rec = self.new_info(Binding::Mono(rec_ty), rec_region);
                let value_ty = self.fresh_var(frame);
                let value_region = self.temp_region();
                let value_info = self.new_info(Binding::Mono(value_ty), value_region);
                self.bind(frame, name.clone(), rec);

                let checked = self.check(frame, value, value_info);
                self.restore_type_params(saved);
                checked?;

                // The right-hand side is a temporary, so only the
                // types unify; the binding keeps its own region.
                let bound = self.mono(rec);
                let value_ty = self.mono(value_info);
                self.unify_type(bound, value_ty, true)?;
                self.let_dangling_check(&name, rec)?;

                let rec_repr = self.mono(rec);
                let binding = self.generalize(frame, rec_repr, pre);
                self.infos[rec].binding = binding;

                self.check(frame, body, rho)?;
            }

            Expr::MethodAccess { receiver, method } => {
                let recv_ty = self.fresh_var(frame);
                let recv_region = self.fresh_region_var(frame);
                let recv = self.new_info(Binding::Mono(recv_ty), recv_region);
                self.check(frame, receiver, recv)?;

                // Class methods are always temporaries.
                let m = self.class_method_info(frame, recv, &method)?;
                let expected = self.mono(rho);
                self.unify_with_ref(expected, m)?;
                self.downgrade_to_temporary(rho);
            }

            Expr::Binary {
                class,
                method,
                lhs,
                rhs,
            } => {
                let class = self.class_id(&class)?;
                let lhs_ty = self.fresh_var(frame);
                let lhs_region = self.fresh_region_var(frame);
                let lhs_info = self.new_info(Binding::Mono(lhs_ty), lhs_region);
                self.check(frame, lhs, lhs_info)?;
                let constrained = self.mono(lhs_info);
                self.apply_constraint(constrained, &[class])?;

                let rhs_ty = self.fresh_var(frame);
                let rhs_region = self.fresh_region_var(frame);
                let rhs_info = self.new_info(Binding::Mono(rhs_ty), rhs_region);
                let op = self.instantiated_method(frame, class, &method, lhs_info)?;
                self.unify_function(frame, op, rhs_info, rho)?;

                self.check(frame, rhs, rhs_info)?;
            }
        }
        self.expr_types.insert(expr, rho);
        Ok(())
    }

    // ── Class-method dispatch ────────────────────────────────────

    /// Resolve `method` through the receiver's class list and return
    /// its partially applied type as a temporary.
    fn class_method_info(&mut self, frame: FrameId, recv: InfoId, method: &str) -> Result<InfoId> {
        let recv_ty = self.mono(recv);
        let recv_ty = self.repr(recv_ty);
        let list = self.class_list(recv_ty);
        match list.lookup_method(&self.classes, method)? {
            Some(hit) => {
                let remainder = self.instantiated_method(frame, hit.class, method, recv)?;
                let region = self.temp_region();
                Ok(self.new_info(Binding::Mono(remainder), region))
            }
            None => Err(TypeError::MethodNotImplemented {
                name: SmolStr::new(method),
            }),
        }
    }

    /// Instantiate a class method for a receiver: freshen the method's
    /// own scheme, then the class's self parameter, and validate the
    /// receiver against the first argument (reference-vs-value calling
    /// included). Returns the curried remainder.
    fn instantiated_method(
        &mut self,
        frame: FrameId,
        class: ClassId,
        method: &str,
        recv: InfoId,
    ) -> Result<TypeId> {
        let Some(binding) = self.classes[class].method(method).cloned() else {
            return Err(TypeError::MethodNotImplemented {
                name: SmolStr::new(method),
            });
        };
        let self_param = self.classes[class].self_param;
        let body = match binding {
            Binding::Mono(t) => t,
            Binding::Poly(scheme) => self.instantiate(frame, scheme, Vec::new())?,
        };
        let wrapper = Scheme {
            type_params: vec![self_param],
            region_params: Vec::new(),
            body,
        };
        let f = self.instantiate(frame, wrapper, Vec::new())?;
        let (param, ret) = match self.types[f].clone() {
            TypeNode::Function { param, ret, .. } => (param, ret),
            _ => unreachable!("class methods are validated to be functions"),
        };
        self.unify_with_ref(param, recv)?;
        Ok(ret)
    }

    // ── Scope bookkeeping ────────────────────────────────────────

    fn frames_contains(&self, frame: FrameId, name: &str) -> bool {
        self.frames[frame].bindings.contains_key(name)
    }

    /// Allocate `Param` nodes for explicitly declared type parameters
    /// and bring their names into scope, returning the slots for
    /// generalization and the shadowed entries for restoration.
    fn declare_type_params(
        &mut self,
        decls: &[TypeParamDecl],
    ) -> Result<(Vec<TypeId>, Vec<(SmolStr, Option<TypeId>)>)> {
        let mut sets = Vec::with_capacity(decls.len());
        for decl in decls {
            let mut set = ConstraintSet::default();
            for class in &decl.classes {
                let id = self.class_id(class)?;
                set.merge(&self.classes, &[id]);
            }
            sets.push(set);
        }
        let mut pre = Vec::with_capacity(decls.len());
        let mut saved = Vec::with_capacity(decls.len());
        for (index, (decl, constraints)) in decls.iter().zip(sets).enumerate() {
            let p = self.types.alloc(TypeNode::Param { constraints, index });
            let shadowed = self.type_param_scope.insert(decl.name.clone(), p);
            saved.push((decl.name.clone(), shadowed));
            pre.push(p);
        }
        Ok((pre, saved))
    }

    fn restore_type_params(&mut self, saved: Vec<(SmolStr, Option<TypeId>)>) {
        for (name, shadowed) in saved.into_iter().rev() {
            match shadowed {
                Some(prev) => {
                    self.type_param_scope.insert(name, prev);
                }
                None => {
                    self.type_param_scope.remove(&name);
                }
            }
        }
    }

    // ── Dangling checks ──────────────────────────────────────────

    /// Reject a lambda whose result is a reference into the scope
    /// that is about to close.
    fn lambda_dangling_check(&mut self, child: FrameId, result: InfoId) -> Result<()> {
        let t = self.mono(result);
        let t = self.repr(t);
        self.infos[result].binding = Binding::Mono(t);
        if let TypeNode::Ref { region, .. } = self.types[t].clone() {
            if self.includes(child, region) {
                return Err(TypeError::DanglingReturn);
            }
        }
        Ok(())
    }

    /// Reject a binding whose value is a reference into temporary
    /// storage.
    fn let_dangling_check(&mut self, name: &SmolStr, bound: InfoId) -> Result<()> {
        let t = self.mono(bound);
        let t = self.repr(t);
        self.infos[bound].binding = Binding::Mono(t);
        if let TypeNode::Ref { region, .. } = self.types[t].clone() {
            let region = self.repr_region(region);
            if matches!(self.regions[region], RegionNode::Temporary) {
                return Err(TypeError::DanglingBinding { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Overwrite an expectation's region with temporary storage, the
    /// M-side treatment of literals, scheme instances, widened
    /// identifiers, and method accesses.
    fn downgrade_to_temporary(&mut self, rho: InfoId) {
        let region = self.infos[rho].region;
        self.regions[region] = RegionNode::Temporary;
    }
}
