// src/generics/substitution.rs
//
// Substitution maps: total rewrites from one signature's parameters to
// types and conformances over another signature.
//
// A map carries two tables. Parameter entries handle interface parameters
// and primary archetypes (which project to their parameter). The local
// table carries registered archetype-to-archetype correspondences for
// captured local archetypes. Both are total over well-formed input: a
// missing entry is a compiler invariant violation, not a recoverable error.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::generics::environment::TypeContext;
use crate::generics::signature::GenericParam;
use crate::generics::ty::{ArchetypeTy, ConformanceRef, Ty};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub ty: Ty,
    pub conformances: SmallVec<[ConformanceRef; 2]>,
}

#[derive(Debug, Clone, Default)]
pub struct SubstitutionMap {
    entries: FxHashMap<GenericParam, Replacement>,
    local_archetypes: FxHashMap<ArchetypeTy, Ty>,
}

impl SubstitutionMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.local_archetypes.is_empty()
    }

    pub fn insert(
        &mut self,
        param: GenericParam,
        ty: Ty,
        conformances: SmallVec<[ConformanceRef; 2]>,
    ) {
        let prev = self.entries.insert(param, Replacement { ty, conformances });
        debug_assert!(prev.is_none(), "duplicate substitution entry for {param:?}");
    }

    pub fn replacement_for(&self, param: GenericParam) -> Option<&Replacement> {
        self.entries.get(&param)
    }

    /// Record the correspondence from a captured local archetype to the
    /// type (a primary archetype) that now stands for it. One-to-one within
    /// its domain.
    pub fn register_local_archetype(&mut self, archetype: ArchetypeTy, replacement: Ty) {
        let prev = self.local_archetypes.insert(archetype, replacement);
        assert!(
            prev.is_none(),
            "local archetype {archetype:?} registered twice"
        );
    }

    pub fn local_archetype_count(&self) -> usize {
        self.local_archetypes.len()
    }

    /// Whether any replacement in this map (parameter entries, their
    /// conformances, or registered local-archetype targets) mentions a
    /// local archetype. Keys are the domain and are not inspected.
    pub fn mentions_local_archetype(&self, ctx: &TypeContext) -> bool {
        self.entries.values().any(|replacement| {
            replacement.ty.has_local_archetype(ctx)
                || replacement
                    .conformances
                    .iter()
                    .any(|c| c.has_local_archetype(ctx))
        }) || self
            .local_archetypes
            .values()
            .any(|ty| ty.has_local_archetype(ctx))
    }

    fn param_replacement(&self, param: GenericParam) -> Ty {
        match self.entries.get(&param) {
            Some(replacement) => replacement.ty.clone(),
            None => panic!("substitution map has no entry for generic parameter {param:?}"),
        }
    }

    /// Rewrite a type through this substitution. Total for well-formed
    /// input; an unmapped local archetype is fatal because signature
    /// extension guarantees totality over every captured local archetype.
    pub fn subst_type(&self, ctx: &TypeContext, ty: &Ty) -> Ty {
        match ty {
            Ty::Unit | Ty::Bool | Ty::Int64 | Ty::Never | Ty::Existential(_) => ty.clone(),
            Ty::Param(param) => self.param_replacement(*param),
            Ty::Archetype(archetype) => {
                if let Some(replacement) = self.local_archetypes.get(archetype) {
                    return replacement.clone();
                }
                if ctx.is_local_archetype(*archetype) {
                    panic!(
                        "local archetype {archetype:?} has no correspondence; \
                         its environment was not captured"
                    );
                }
                // Primary archetypes project to their parameter and follow
                // the parameter entry.
                self.param_replacement(archetype.param)
            }
            Ty::Nominal { name, args } => Ty::Nominal {
                name: *name,
                args: args.iter().map(|a| self.subst_type(ctx, a)).collect(),
            },
            Ty::Tuple(elems) => {
                Ty::Tuple(elems.iter().map(|e| self.subst_type(ctx, e)).collect())
            }
            Ty::Function { params, ret } => Ty::Function {
                params: params.iter().map(|p| self.subst_type(ctx, p)).collect(),
                ret: Box::new(self.subst_type(ctx, ret)),
            },
            Ty::Metatype(instance) => Ty::metatype(self.subst_type(ctx, instance)),
            Ty::Address(pointee) => Ty::address(self.subst_type(ctx, pointee)),
        }
    }

    /// Rewrite a conformance reference attached to `ty`, consistent with
    /// `subst_type(ty)`. An abstract conformance stays abstract while the
    /// substituted type is still a type variable; it becomes concrete once
    /// the type does.
    pub fn subst_conformance(
        &self,
        ctx: &TypeContext,
        ty: &Ty,
        conformance: &ConformanceRef,
    ) -> ConformanceRef {
        match conformance {
            ConformanceRef::Abstract(protocol) => {
                let substituted = self.subst_type(ctx, ty);
                match substituted {
                    Ty::Param(_) | Ty::Archetype(_) => ConformanceRef::Abstract(*protocol),
                    _ => ConformanceRef::Concrete {
                        conforming: substituted,
                        protocol: *protocol,
                    },
                }
            }
            ConformanceRef::Concrete {
                conforming,
                protocol,
            } => ConformanceRef::Concrete {
                conforming: self.subst_type(ctx, conforming),
                protocol: *protocol,
            },
        }
    }

    /// Rewrite every entry of a nested substitution map (as found inside
    /// call-site instructions) through this one.
    pub fn subst_substitution_map(&self, ctx: &TypeContext, inner: &SubstitutionMap) -> Self {
        let mut out = SubstitutionMap::empty();
        for (&param, replacement) in &inner.entries {
            let ty = self.subst_type(ctx, &replacement.ty);
            let conformances = replacement
                .conformances
                .iter()
                .map(|c| self.subst_conformance(ctx, &replacement.ty, c))
                .collect();
            out.insert(param, ty, conformances);
        }
        for (&archetype, replacement) in &inner.local_archetypes {
            out.local_archetypes
                .insert(archetype, self.subst_type(ctx, replacement));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::EnvKind;
    use crate::generics::signature::GenericSignature;
    use crate::identity::NameTable;
    use smallvec::smallvec;

    fn param(depth: u32, index: u32) -> GenericParam {
        GenericParam::new(depth, index)
    }

    #[test]
    fn subst_rewrites_params_and_primary_archetypes() {
        let mut ctx = TypeContext::new();
        let sig = GenericSignature::new(vec![param(0, 0)], Vec::new());
        let env = ctx.create_primary_environment(sig);
        let archetype = ArchetypeTy {
            env,
            param: param(0, 0),
        };

        let mut subs = SubstitutionMap::empty();
        subs.insert(param(0, 0), Ty::Int64, smallvec![]);

        assert_eq!(subs.subst_type(&ctx, &Ty::Param(param(0, 0))), Ty::Int64);
        assert_eq!(subs.subst_type(&ctx, &Ty::Archetype(archetype)), Ty::Int64);
        assert_eq!(
            subs.subst_type(&ctx, &Ty::Tuple(vec![Ty::Bool, Ty::Param(param(0, 0))])),
            Ty::Tuple(vec![Ty::Bool, Ty::Int64])
        );
    }

    #[test]
    fn registered_local_archetypes_take_priority() {
        let mut ctx = TypeContext::new();
        let primary = ctx.create_primary_environment(GenericSignature::new(
            vec![param(0, 0)],
            Vec::new(),
        ));
        let opened_sig = GenericSignature::new(vec![param(0, 0), param(1, 0)], Vec::new());
        let opened =
            ctx.create_captured_environment(opened_sig, EnvKind::OpenedExistential, Some(primary));
        let local = ArchetypeTy {
            env: opened,
            param: param(1, 0),
        };

        let mut subs = SubstitutionMap::empty();
        subs.insert(param(0, 0), Ty::Param(param(0, 0)), smallvec![]);
        subs.register_local_archetype(local, Ty::Bool);

        assert_eq!(subs.subst_type(&ctx, &Ty::Archetype(local)), Ty::Bool);
        assert_eq!(subs.local_archetype_count(), 1);
    }

    #[test]
    #[should_panic(expected = "has no correspondence")]
    fn unmapped_local_archetype_is_fatal() {
        let mut ctx = TypeContext::new();
        let primary = ctx.create_primary_environment(GenericSignature::empty());
        let opened_sig = GenericSignature::new(vec![param(0, 0)], Vec::new());
        let opened =
            ctx.create_captured_environment(opened_sig, EnvKind::OpenedExistential, Some(primary));
        let local = ArchetypeTy {
            env: opened,
            param: param(0, 0),
        };

        let subs = SubstitutionMap::empty();
        subs.subst_type(&ctx, &Ty::Archetype(local));
    }

    #[test]
    fn abstract_conformance_concretizes_with_its_type() {
        let mut names = NameTable::new();
        let proto = names.intern_protocol("Drawable");
        let mut ctx = TypeContext::new();
        let _ = ctx.create_primary_environment(GenericSignature::empty());

        let mut subs = SubstitutionMap::empty();
        subs.insert(param(0, 0), Ty::Int64, smallvec![]);

        let conf = subs.subst_conformance(
            &ctx,
            &Ty::Param(param(0, 0)),
            &ConformanceRef::Abstract(proto),
        );
        assert_eq!(
            conf,
            ConformanceRef::Concrete {
                conforming: Ty::Int64,
                protocol: proto
            }
        );
    }

    #[test]
    fn nested_substitution_maps_are_rewritten_entrywise() {
        let mut ctx = TypeContext::new();
        let _ = ctx.create_primary_environment(GenericSignature::empty());

        // Call-site map: callee's T -> our U (param (0, 1)).
        let mut inner = SubstitutionMap::empty();
        inner.insert(param(0, 0), Ty::Param(param(0, 1)), smallvec![]);

        // Our map: U -> i64.
        let mut outer = SubstitutionMap::empty();
        outer.insert(param(0, 1), Ty::Int64, smallvec![]);

        let rewritten = outer.subst_substitution_map(&ctx, &inner);
        assert_eq!(rewritten.replacement_for(param(0, 0)).unwrap().ty, Ty::Int64);
    }
}
