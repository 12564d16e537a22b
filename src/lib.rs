// src/lib.rs
pub mod generics;
pub mod identity;
pub mod ir;
pub mod module;
pub mod transforms;
