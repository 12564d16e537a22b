// src/transforms/mod.rs

pub mod recontextualize;

pub use recontextualize::{
    GenericSignatureWithCapturedEnvs, recontextualize_captured_local_archetypes,
};
