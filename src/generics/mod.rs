// src/generics/mod.rs

pub mod environment;
pub mod out_of_context;
pub mod signature;
pub mod substitution;
pub mod ty;

pub use environment::{EnvId, EnvKind, GenericEnvironment, TypeContext};
pub use out_of_context::MapLocalArchetypesOutOfContext;
pub use signature::{GenericParam, GenericSignature, LayoutKind, Requirement};
pub use substitution::{Replacement, SubstitutionMap};
pub use ty::{ArchetypeTy, ConformanceRef, Ty};
