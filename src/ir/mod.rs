// src/ir/mod.rs

pub mod builder;
pub mod cloner;
pub mod function;
pub mod verifier;

pub use builder::InstBuilder;
pub use cloner::{FunctionCloner, NoRewrite, TypeRewriter};
pub use function::{
    ArgFlags, BasicBlock, BlockId, Function, InstId, InstKind, Instruction, Ownership, UseRef,
    ValueData, ValueDef, ValueId,
};
pub use verifier::{VerifyError, verify, verify_no_local_archetypes};
