// src/generics/environment.rs
//
// Generic environments bind a signature's parameters to concrete type
// variables (archetypes) usable inside one function body. The TypeContext
// owns every environment; environments are referenced by EnvId handles and
// never freed, so stale handles are impossible.

use crate::generics::signature::{GenericParam, GenericSignature};
use crate::generics::substitution::SubstitutionMap;
use crate::generics::ty::{ArchetypeTy, ConformanceRef, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(u32);

impl EnvId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    /// The environment of a function's own signature. Its archetypes are
    /// primary: valid for the whole body, no capture semantics.
    Primary,
    /// Introduced by opening an existential value.
    OpenedExistential,
    /// Introduced by unwrapping an opaque result type.
    OpaqueResult,
}

/// A concrete binding context for one signature.
///
/// A non-primary environment binds only its signature's innermost
/// parameters; outer depths delegate to `parent`. A primary environment
/// binds every parameter of its signature and has no parent.
#[derive(Debug, Clone)]
pub struct GenericEnvironment {
    signature: GenericSignature,
    kind: EnvKind,
    parent: Option<EnvId>,
}

impl GenericEnvironment {
    pub fn signature(&self) -> &GenericSignature {
        &self.signature
    }

    pub fn kind(&self) -> EnvKind {
        self.kind
    }

    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }
}

/// Arena of generic environments for one module.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    envs: Vec<GenericEnvironment>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_primary_environment(&mut self, signature: GenericSignature) -> EnvId {
        self.push(GenericEnvironment {
            signature,
            kind: EnvKind::Primary,
            parent: None,
        })
    }

    pub fn create_captured_environment(
        &mut self,
        signature: GenericSignature,
        kind: EnvKind,
        parent: Option<EnvId>,
    ) -> EnvId {
        assert!(
            kind != EnvKind::Primary,
            "captured environments must not be primary"
        );
        self.push(GenericEnvironment {
            signature,
            kind,
            parent,
        })
    }

    fn push(&mut self, env: GenericEnvironment) -> EnvId {
        let id = EnvId(self.envs.len() as u32);
        self.envs.push(env);
        id
    }

    pub fn env(&self, id: EnvId) -> &GenericEnvironment {
        &self.envs[id.0 as usize]
    }

    pub fn is_local_archetype(&self, archetype: ArchetypeTy) -> bool {
        self.env(archetype.env).kind != EnvKind::Primary
    }

    /// The parameters an environment itself introduces (as opposed to the
    /// outer parameters it delegates to its parent chain).
    pub fn introduced_params(&self, id: EnvId) -> &[GenericParam] {
        let env = self.env(id);
        match env.kind {
            EnvKind::Primary => env.signature.params(),
            _ => env.signature.innermost_params(),
        }
    }

    /// Resolve a generic parameter to the archetype bound by `env` or its
    /// parent chain. Fatal if no environment on the chain binds it.
    pub fn map_param_into_context(&self, env: EnvId, param: GenericParam) -> Ty {
        let mut current = env;
        loop {
            let e = self.env(current);
            let binds = match e.kind {
                EnvKind::Primary => e.signature.has_param(param),
                _ => {
                    e.signature.max_depth() == Some(param.depth) && e.signature.has_param(param)
                }
            };
            if binds {
                return Ty::Archetype(ArchetypeTy {
                    env: current,
                    param,
                });
            }
            match e.parent {
                Some(parent) => current = parent,
                None => panic!(
                    "generic parameter {param:?} is not bound by environment {env:?} or its parents"
                ),
            }
        }
    }

    /// Resolve an interface type into contextual form: every `Ty::Param`
    /// becomes the archetype bound by `env`'s chain. Archetypes already in
    /// contextual form pass through untouched.
    pub fn map_type_into_context(&self, env: EnvId, ty: &Ty) -> Ty {
        match ty {
            Ty::Unit | Ty::Bool | Ty::Int64 | Ty::Never | Ty::Existential(_) => ty.clone(),
            Ty::Param(param) => self.map_param_into_context(env, *param),
            Ty::Archetype(_) => ty.clone(),
            Ty::Nominal { name, args } => Ty::Nominal {
                name: *name,
                args: args
                    .iter()
                    .map(|a| self.map_type_into_context(env, a))
                    .collect(),
            },
            Ty::Tuple(elems) => Ty::Tuple(
                elems
                    .iter()
                    .map(|e| self.map_type_into_context(env, e))
                    .collect(),
            ),
            Ty::Function { params, ret } => Ty::Function {
                params: params
                    .iter()
                    .map(|p| self.map_type_into_context(env, p))
                    .collect(),
                ret: Box::new(self.map_type_into_context(env, ret)),
            },
            Ty::Metatype(instance) => Ty::metatype(self.map_type_into_context(env, instance)),
            Ty::Address(pointee) => Ty::address(self.map_type_into_context(env, pointee)),
        }
    }

    /// The identity-shaped substitution for an environment: each parameter
    /// of its signature maps to its own archetype, with the abstract
    /// conformances its requirements demand.
    pub fn forwarding_substitution(&self, env: EnvId) -> SubstitutionMap {
        let signature = self.env(env).signature.clone();
        let mut subs = SubstitutionMap::empty();
        for &param in signature.params() {
            let replacement = self.map_param_into_context(env, param);
            let conformances = signature
                .conformances_for(param)
                .map(ConformanceRef::Abstract)
                .collect();
            subs.insert(param, replacement, conformances);
        }
        subs
    }
}
