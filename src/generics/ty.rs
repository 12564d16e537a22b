// src/generics/ty.rs
//
// The type grammar shared by the generics subsystem and the IR.
//
// Types appear in two positions:
// - interface position: generic parameters are `Ty::Param` (depth, index)
// - contextual position: parameters are resolved to `Ty::Archetype` values
//   bound by a concrete generic environment
//
// The enum is closed on purpose: substitution and the clone-with-rewrite
// visitor match exhaustively, so a new variant is a compile error everywhere
// a type-bearing field must be rewritten.

use crate::generics::environment::{EnvId, TypeContext};
use crate::generics::signature::GenericParam;
use crate::identity::{NameId, ProtocolId};

/// Identity of a type variable: the environment that binds it plus the
/// generic parameter it stands for. Whether the variable is primary or local
/// is a property of the owning environment, not of the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeTy {
    pub env: EnvId,
    pub param: GenericParam,
}

/// A protocol-conformance reference attached to a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConformanceRef {
    /// Conformance supplied abstractly by a generic requirement.
    Abstract(ProtocolId),
    /// Conformance of a known concrete type.
    Concrete { conforming: Ty, protocol: ProtocolId },
}

impl ConformanceRef {
    pub fn protocol(&self) -> ProtocolId {
        match self {
            ConformanceRef::Abstract(protocol) => *protocol,
            ConformanceRef::Concrete { protocol, .. } => *protocol,
        }
    }

    pub fn has_local_archetype(&self, ctx: &TypeContext) -> bool {
        match self {
            ConformanceRef::Abstract(_) => false,
            ConformanceRef::Concrete { conforming, .. } => conforming.has_local_archetype(ctx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Unit,
    Bool,
    Int64,
    Never,
    /// An interface-position generic parameter.
    Param(GenericParam),
    /// A contextual type variable bound by a generic environment.
    Archetype(ArchetypeTy),
    Nominal {
        name: NameId,
        args: Vec<Ty>,
    },
    Tuple(Vec<Ty>),
    Function {
        params: Vec<Ty>,
        ret: Box<Ty>,
    },
    Metatype(Box<Ty>),
    Existential(ProtocolId),
    Address(Box<Ty>),
}

impl Ty {
    pub fn metatype(instance: Ty) -> Ty {
        Ty::Metatype(Box::new(instance))
    }

    pub fn address(pointee: Ty) -> Ty {
        Ty::Address(Box::new(pointee))
    }

    pub fn function(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Whether any archetype bound by a non-primary environment occurs in
    /// this type.
    pub fn has_local_archetype(&self, ctx: &TypeContext) -> bool {
        match self {
            Ty::Unit | Ty::Bool | Ty::Int64 | Ty::Never | Ty::Param(_) | Ty::Existential(_) => {
                false
            }
            Ty::Archetype(archetype) => ctx.is_local_archetype(*archetype),
            Ty::Nominal { args, .. } => args.iter().any(|a| a.has_local_archetype(ctx)),
            Ty::Tuple(elems) => elems.iter().any(|e| e.has_local_archetype(ctx)),
            Ty::Function { params, ret } => {
                params.iter().any(|p| p.has_local_archetype(ctx)) || ret.has_local_archetype(ctx)
            }
            Ty::Metatype(instance) => instance.has_local_archetype(ctx),
            Ty::Address(pointee) => pointee.has_local_archetype(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::EnvKind;
    use crate::generics::signature::GenericSignature;

    #[test]
    fn local_archetype_query_recurses_through_structure() {
        let mut ctx = TypeContext::new();
        let base = GenericSignature::new(vec![GenericParam::new(0, 0)], Vec::new());
        let primary = ctx.create_primary_environment(base.clone());
        let opened_sig = GenericSignature::new(
            vec![GenericParam::new(0, 0), GenericParam::new(1, 0)],
            Vec::new(),
        );
        let opened =
            ctx.create_captured_environment(opened_sig, EnvKind::OpenedExistential, Some(primary));

        let primary_ty = ctx.map_param_into_context(primary, GenericParam::new(0, 0));
        let local_ty = ctx.map_param_into_context(opened, GenericParam::new(1, 0));

        assert!(!primary_ty.has_local_archetype(&ctx));
        assert!(local_ty.has_local_archetype(&ctx));
        assert!(Ty::Tuple(vec![Ty::Int64, Ty::address(local_ty)]).has_local_archetype(&ctx));
        assert!(!Ty::function(vec![primary_ty], Ty::Unit).has_local_archetype(&ctx));
    }
}
