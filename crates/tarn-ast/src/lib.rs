use la_arena::{Arena, Idx};
use smol_str::SmolStr;

// ── ID types ──────────────────────────────────────────────────────

pub type ExprId = Idx<Expr>;
pub type TypeExprId = Idx<TypeExpr>;

// ── Module ────────────────────────────────────────────────────────

/// A program assembled by a driver: expression and annotation arenas.
#[derive(Debug, Clone)]
pub struct Module {
    pub exprs: Arena<Expr>,
    pub type_exprs: Arena<TypeExpr>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            exprs: Arena::new(),
            type_exprs: Arena::new(),
        }
    }

    pub fn expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn ty(&mut self, ty: TypeExpr) -> TypeExprId {
        self.type_exprs.alloc(ty)
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

// ── Expressions ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal of a declared base type. The value itself is not
    /// carried; only its type matters to inference.
    Constant { ty: TypeExprId },
    /// A variable reference.
    Ident { name: SmolStr },
    /// Single-parameter abstraction, optionally annotated.
    Lambda {
        param: SmolStr,
        annotation: Option<TypeExprId>,
        body: ExprId,
    },
    /// Function application.
    Apply { func: ExprId, arg: ExprId },
    /// `let name<params...> = value in body`
    Let {
        name: SmolStr,
        type_params: Vec<TypeParamDecl>,
        value: ExprId,
        body: ExprId,
    },
    /// `letrec name<params...> = value in body`; `name` is visible
    /// inside `value`.
    Letrec {
        name: SmolStr,
        type_params: Vec<TypeParamDecl>,
        value: ExprId,
        body: ExprId,
    },
    /// `receiver.method` — class-method access, yielding the method
    /// partially applied to the receiver.
    MethodAccess { receiver: ExprId, method: SmolStr },
    /// A binary operation dispatched through a class method: the node
    /// names the class that defines the operation and the method that
    /// implements it (e.g. class `Add`, method `add`).
    Binary {
        class: SmolStr,
        method: SmolStr,
        lhs: ExprId,
        rhs: ExprId,
    },
}

/// An explicitly declared type parameter of a `let`/`letrec`, with
/// the classes it must implement.
#[derive(Debug, Clone)]
pub struct TypeParamDecl {
    pub name: SmolStr,
    pub classes: Vec<SmolStr>,
}

impl TypeParamDecl {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    pub fn with_classes(name: impl Into<SmolStr>, classes: Vec<SmolStr>) -> Self {
        Self {
            name: name.into(),
            classes,
        }
    }
}

// ── Type annotations ──────────────────────────────────────────────

/// A syntactic type, resolved to a type node by the checker in the
/// environment frame where the annotation is used.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    /// A declared base type, by name.
    Named(SmolStr),
    /// Function type.
    Fn { param: TypeExprId, ret: TypeExprId },
    /// Reference to a value of the inner type; the region is left to
    /// inference.
    Ref(TypeExprId),
    /// Type-as-class existential: some type implementing all the
    /// named classes.
    Classes(Vec<SmolStr>),
    /// A type parameter declared by the enclosing `let`/`letrec`.
    ParamRef(SmolStr),
    /// The implementing type inside a class-method signature.
    SelfTy,
    /// A fresh inference variable (`_`).
    Infer,
}
