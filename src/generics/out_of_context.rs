// src/generics/out_of_context.rs
//
// Projection of captured local archetypes to interface types over an
// extended signature, and construction of that extended signature.
//
// Given a base signature and an ordered list of captured environments, each
// captured environment's introduced parameters are assigned a fresh depth
// above the base signature, preserving order within each environment. The
// depth/index assignment is load-bearing: later lookups by other stages
// key off it, so the processing order here is part of the contract.

use crate::generics::environment::{EnvId, TypeContext};
use crate::generics::signature::{GenericParam, GenericSignature, Requirement};
use crate::generics::ty::{ArchetypeTy, Ty};

pub struct MapLocalArchetypesOutOfContext<'a> {
    base: &'a GenericSignature,
    captured_envs: &'a [EnvId],
}

impl<'a> MapLocalArchetypesOutOfContext<'a> {
    pub fn new(base: &'a GenericSignature, captured_envs: &'a [EnvId]) -> Self {
        Self {
            base,
            captured_envs,
        }
    }

    /// The extended-signature parameter standing for a captured local
    /// archetype: depth is the base signature's next depth plus the
    /// environment's position in the captured list, index is the
    /// archetype's position among that environment's introduced parameters.
    pub fn param_for_local(&self, ctx: &TypeContext, archetype: ArchetypeTy) -> GenericParam {
        let env_position = self
            .captured_envs
            .iter()
            .position(|&env| env == archetype.env)
            .unwrap_or_else(|| {
                panic!(
                    "archetype {archetype:?} belongs to an environment that was not captured"
                )
            });
        let introduced = ctx.introduced_params(archetype.env);
        let index = introduced
            .iter()
            .position(|&p| p == archetype.param)
            .unwrap_or_else(|| {
                panic!(
                    "archetype {archetype:?} is not introduced by its own environment"
                )
            });
        GenericParam::new(
            self.base.next_depth() + env_position as u32,
            index as u32,
        )
    }

    /// Project a contextual type to an interface type expressed purely over
    /// extended-signature parameters: captured local archetypes become
    /// their freshly assigned parameters, primary archetypes become the
    /// identically positioned base parameters.
    pub fn project(&self, ctx: &TypeContext, ty: &Ty) -> Ty {
        match ty {
            Ty::Unit | Ty::Bool | Ty::Int64 | Ty::Never | Ty::Existential(_) | Ty::Param(_) => {
                ty.clone()
            }
            Ty::Archetype(archetype) => {
                if ctx.is_local_archetype(*archetype) {
                    Ty::Param(self.param_for_local(ctx, *archetype))
                } else {
                    Ty::Param(archetype.param)
                }
            }
            Ty::Nominal { name, args } => Ty::Nominal {
                name: *name,
                args: args.iter().map(|a| self.project(ctx, a)).collect(),
            },
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| self.project(ctx, e)).collect()),
            Ty::Function { params, ret } => Ty::Function {
                params: params.iter().map(|p| self.project(ctx, p)).collect(),
                ret: Box::new(self.project(ctx, ret)),
            },
            Ty::Metatype(instance) => Ty::metatype(self.project(ctx, instance)),
            Ty::Address(pointee) => Ty::address(self.project(ctx, pointee)),
        }
    }

    /// The base signature extended with one parameter per captured local
    /// parameter, in captured-environment order, plus the captured
    /// environments' requirements re-expressed over the new parameters.
    pub fn extended_signature(&self, ctx: &TypeContext) -> GenericSignature {
        let mut params = self.base.params().to_vec();
        let mut requirements = self.base.requirements().to_vec();
        let mut appended = 0usize;

        for &env in self.captured_envs {
            let introduced = ctx.introduced_params(env);
            for &gp in introduced {
                let local = match ctx.map_param_into_context(env, gp) {
                    Ty::Archetype(archetype) => archetype,
                    other => panic!("captured parameter resolved to non-archetype {other:?}"),
                };
                params.push(self.param_for_local(ctx, local));
                appended += 1;
            }
            for req in ctx.env(env).signature().requirements() {
                if let Some(projected) = self.project_requirement(ctx, env, req) {
                    requirements.push(projected);
                }
            }
        }

        let total: usize = self
            .captured_envs
            .iter()
            .map(|&env| ctx.introduced_params(env).len())
            .sum();
        assert_eq!(
            appended, total,
            "appended parameter count must equal the captured local parameter count"
        );

        GenericSignature::new(params, requirements)
    }

    /// Requirements on a captured environment's own parameters, projected
    /// into extended-signature terms. Requirements purely over outer
    /// parameters are already part of the base signature and are skipped.
    fn project_requirement(
        &self,
        ctx: &TypeContext,
        env: EnvId,
        req: &Requirement,
    ) -> Option<Requirement> {
        let mentions_introduced = |ty: &Ty| {
            let contextual = ctx.map_type_into_context(env, ty);
            contextual.has_local_archetype(ctx)
        };
        let remap = |ty: &Ty| {
            let contextual = ctx.map_type_into_context(env, ty);
            self.project(ctx, &contextual)
        };
        match req {
            Requirement::Conformance { subject, protocol } => mentions_introduced(subject)
                .then(|| Requirement::Conformance {
                    subject: remap(subject),
                    protocol: *protocol,
                }),
            Requirement::SameType { lhs, rhs } => {
                (mentions_introduced(lhs) || mentions_introduced(rhs)).then(|| {
                    Requirement::SameType {
                        lhs: remap(lhs),
                        rhs: remap(rhs),
                    }
                })
            }
            Requirement::Layout { subject, kind } => {
                mentions_introduced(subject).then(|| Requirement::Layout {
                    subject: remap(subject),
                    kind: *kind,
                })
            }
        }
    }
}
