use smol_str::SmolStr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TypeError>;

/// Fatal inference failures. Every error aborts the current inference
/// call; nothing is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: SmolStr },

    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("recursive unification: variable occurs in {ty}")]
    Recursive { ty: String },

    #[error("type {ty} does not implement class {class}")]
    MissingClass { ty: String, class: SmolStr },

    #[error("generic type parameter must declare constraint {class} up front")]
    ParamNeedsConstraint { class: SmolStr },

    #[error("class method is not unique: {name}")]
    AmbiguousMethod { name: SmolStr },

    #[error("class method not implemented: {name}")]
    MethodNotImplemented { name: SmolStr },

    #[error("identifier redefined in the same scope: {name}")]
    DuplicateBinding { name: SmolStr },

    #[error("dangling reference escapes the scope of its referent")]
    DanglingReturn,

    #[error("dangling reference bound to '{name}'")]
    DanglingBinding { name: SmolStr },

    #[error("incompatible regions: cannot place {src} into {dst}")]
    RegionMismatch { dst: String, src: String },

    // ── Registry and annotation resolution ────────────────────────
    #[error("type '{name}' is defined more than once")]
    DuplicateType { name: SmolStr },

    #[error("class '{name}' is defined more than once")]
    DuplicateClass { name: SmolStr },

    #[error("undefined type '{name}'")]
    UnknownType { name: SmolStr },

    #[error("undefined class '{name}'")]
    UnknownClass { name: SmolStr },

    #[error("undefined type parameter '{name}'")]
    UnknownTypeParam { name: SmolStr },

    #[error("class method '{name}' must be a function taking self first")]
    MethodNotFunction { name: SmolStr },

    #[error("'self' is only meaningful inside a class method signature")]
    SelfOutsideClass,
}
