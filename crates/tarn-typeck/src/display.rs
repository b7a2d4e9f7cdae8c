use std::collections::HashMap;

use crate::checker::TypeChecker;
use crate::defs::ConstraintSet;
use crate::types::{Binding, InfoId, RegionId, RegionNode, TypeId, TypeNode};

// ── Rendering ────────────────────────────────────────────────────

/// One rendering pass. Unsolved variables and regions are named
/// `a`..`z` in first-seen order within the pass, then `_`.
struct Printer<'a, 'm> {
    ck: &'a TypeChecker<'m>,
    vars: HashMap<TypeId, char>,
    region_names: HashMap<RegionId, char>,
    out: String,
}

fn next_name(used: usize) -> char {
    if used > 25 {
        '_'
    } else {
        (b'a' + used as u8) as char
    }
}

impl TypeChecker<'_> {
    /// Render a type: `?a` for unsolved variables, `'a` for scheme
    /// parameters, `: C` / `:(C1 + C2)` constraint suffixes, `:C` for
    /// class existentials, `T& at r` for references, `⊥` for
    /// temporary regions.
    pub fn display_type(&self, t: TypeId) -> String {
        let mut printer = Printer {
            ck: self,
            vars: HashMap::new(),
            region_names: HashMap::new(),
            out: String::new(),
        };
        printer.ty(t);
        printer.out
    }

    /// Render what an identifier is bound to; a scheme renders as its
    /// body, with parameters shown as `'a`, `'b`, ….
    pub fn display_info(&self, info: InfoId) -> String {
        match &self.info(info).binding {
            Binding::Mono(t) => self.display_type(*t),
            Binding::Poly(scheme) => self.display_type(scheme.body),
        }
    }
}

impl<'a> Printer<'a, '_> {
    /// Walk solve links without mutating; rendering never compresses.
    fn resolve(&self, mut t: TypeId) -> TypeId {
        loop {
            match &self.ck.types[t] {
                TypeNode::Variable { solve: Some(s), .. } => t = *s,
                _ => return t,
            }
        }
    }

    fn resolve_region(&self, mut r: RegionId) -> RegionId {
        loop {
            match self.ck.regions[r] {
                RegionNode::Variable { solve: Some(s), .. } => r = s,
                _ => return r,
            }
        }
    }

    fn ty(&mut self, t: TypeId) {
        let ck = self.ck;
        match &ck.types[t] {
            TypeNode::Base { name } => self.out.push_str(name),

            TypeNode::Function { param, ret, .. } => {
                // Only a literal function parameter needs parentheses.
                if matches!(ck.types[*param], TypeNode::Function { .. }) {
                    self.out.push('(');
                    self.ty(*param);
                    self.out.push(')');
                } else {
                    self.ty(*param);
                }
                self.out.push_str(" -> ");
                self.ty(*ret);
            }

            TypeNode::Variable { solve: Some(_), .. } => {
                let solved = self.resolve(t);
                self.ty(solved);
            }

            TypeNode::Variable { constraints, .. } => {
                let name = match self.vars.get(&t) {
                    Some(&c) => c,
                    None => {
                        let c = next_name(self.vars.len());
                        self.vars.insert(t, c);
                        c
                    }
                };
                self.out.push('?');
                self.out.push(name);
                self.constraint_suffix(constraints);
            }

            TypeNode::Param { constraints, index } => {
                let letter = b'a' as usize + index;
                self.out.push('\'');
                self.out.push(if letter <= b'z' as usize {
                    letter as u8 as char
                } else {
                    '_'
                });
                self.constraint_suffix(constraints);
            }

            TypeNode::Dyn { classes, region } => {
                match classes.list.len() {
                    0 => self.out.push_str("()"),
                    1 => {
                        self.out.push(':');
                        self.out.push_str(&ck.classes[classes.list[0]].name);
                    }
                    _ => {
                        self.out.push('(');
                        for (i, &class) in classes.list.iter().enumerate() {
                            if i > 0 {
                                self.out.push_str(" + ");
                            }
                            self.out.push(':');
                            self.out.push_str(&ck.classes[class].name);
                        }
                        self.out.push(')');
                    }
                }
                self.region(*region);
            }

            TypeNode::Ref {
                referent, region, ..
            } => {
                self.ty(*referent);
                self.out.push('&');
                self.region(*region);
            }
        }
    }

    fn region(&mut self, r: RegionId) {
        let r = self.resolve_region(r);
        if matches!(self.ck.regions[r], RegionNode::Temporary) {
            self.out.push_str(" at ⊥");
            return;
        }
        let name = match self.region_names.get(&r) {
            Some(&c) => c,
            None => {
                let c = next_name(self.region_names.len());
                self.region_names.insert(r, c);
                c
            }
        };
        self.out.push_str(" at ");
        self.out.push(name);
    }

    fn constraint_suffix(&mut self, constraints: &'a ConstraintSet) {
        match constraints.list.len() {
            0 => {}
            1 => {
                self.out.push_str(": ");
                self.out.push_str(&self.ck.classes[constraints.list[0]].name);
            }
            _ => {
                self.out.push_str(":(");
                for (i, &class) in constraints.list.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(" + ");
                    }
                    self.out.push_str(&self.ck.classes[class].name);
                }
                self.out.push(')');
            }
        }
    }
}
