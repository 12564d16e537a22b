// src/transforms/recontextualize.rs
//! Captured-local-archetype recontextualization.
//!
//! Rewrites a function body so that every reference to a local archetype
//! captured from an enclosing scope (an opened existential or an unwrapped
//! opaque result) is replaced by a primary archetype of the function's own
//! signature, extended with one fresh parameter per captured local
//! parameter. The body is rebuilt under the extended environment by a
//! structural clone, then the old graph is torn down.
//!
//! The function's graph moves through three states: the original graph;
//! a dual-graph state where the rebuilt blocks are linked ahead of the old
//! ones and the old ones are unreachable from the entry; and the rebuilt
//! graph alone. Nothing outside this module observes the middle state.

use crate::generics::environment::{EnvId, TypeContext};
use crate::generics::out_of_context::MapLocalArchetypesOutOfContext;
use crate::generics::signature::GenericSignature;
use crate::generics::substitution::SubstitutionMap;
use crate::generics::ty::Ty;
use crate::ir::cloner::FunctionCloner;
use crate::ir::function::{Function, Ownership};
use crate::module::{FuncId, Module};

/// A function's base generic signature together with the type environments
/// it captures from enclosing scopes, in capture order. Produced by the
/// capture collector upstream of this pass.
#[derive(Debug, Clone)]
pub struct GenericSignatureWithCapturedEnvs {
    pub base: GenericSignature,
    pub captured_envs: Vec<EnvId>,
}

/// The extended signature, its materialized environment, and the combined
/// substitution: identity-shaped on the old primary parameters, a
/// correspondence on every captured local archetype.
struct SignatureExtension {
    extended_sig: GenericSignature,
    extended_env: EnvId,
    subs: SubstitutionMap,
}

impl SignatureExtension {
    fn new(ctx: &mut TypeContext, sig: &GenericSignatureWithCapturedEnvs) -> Self {
        assert!(
            !sig.captured_envs.is_empty(),
            "recontextualization requires at least one captured environment"
        );

        let map_out = MapLocalArchetypesOutOfContext::new(&sig.base, &sig.captured_envs);
        let extended_sig = map_out.extended_signature(ctx);
        let extended_env = ctx.create_primary_environment(extended_sig.clone());

        // Old primary parameters occupy the same depth and index in the
        // extended signature, so the forwarding substitution of the new
        // environment already maps them to primary archetypes in place.
        let mut subs = ctx.forwarding_substitution(extended_env);

        // Local archetypes map to parameters at the appended depths.
        let mut appended = 0usize;
        for &captured in &sig.captured_envs {
            for &gp in ctx.introduced_params(captured) {
                // The local archetype as the old body spells it.
                let orig = match ctx.map_param_into_context(captured, gp) {
                    Ty::Archetype(archetype) => archetype,
                    other => panic!("captured parameter bound to non-archetype {other:?}"),
                };
                debug_assert!(ctx.is_local_archetype(orig));

                // Its interface type over the extended signature, resolved
                // in the extended environment to a primary archetype.
                let interface = map_out.project(ctx, &Ty::Archetype(orig));
                let replacement = ctx.map_type_into_context(extended_env, &interface);
                match &replacement {
                    Ty::Archetype(archetype) if !ctx.is_local_archetype(*archetype) => {}
                    other => panic!("extension produced a non-primary replacement {other:?}"),
                }
                subs.register_local_archetype(orig, replacement);
                appended += 1;
            }
        }

        assert_eq!(
            extended_sig.param_count(),
            sig.base.param_count() + appended,
            "extended signature must append exactly one parameter per local parameter"
        );
        assert_eq!(subs.local_archetype_count(), appended);
        tracing::debug!(
            base_params = sig.base.param_count(),
            appended,
            "extended generic signature"
        );

        Self {
            extended_sig,
            extended_env,
            subs,
        }
    }
}

/// Rebuild `func`'s graph under the extended environment.
fn rebuild_body(func: &mut Function, ctx: &TypeContext, ext: &SignatureExtension) {
    // The blocks to discard once the new graph is in place.
    let old_blocks = func.layout().to_vec();
    let old_entry = func.entry_block();

    // All type resolution on newly created IR goes through the extended
    // environment from here on.
    func.set_env(ext.extended_env);

    // Clone the entry block's arguments with remapped types, preserving
    // ownership, declaration metadata, and convention flags.
    let new_entry = func.create_block();
    let old_args = func.block(old_entry).args().to_vec();
    let mut entry_args = Vec::with_capacity(old_args.len());
    for old_arg in old_args {
        let data = func.value(old_arg);
        let ty = ext.subs.subst_type(ctx, &data.ty);
        let (ownership, decl, flags) = (data.ownership, data.decl, data.flags);
        let new_arg = func.create_function_argument(new_entry, ty, ownership, decl, flags);
        entry_args.push(new_arg);
    }

    // Clone the remaining body.
    let mut cloner = FunctionCloner::new(&ext.subs);
    cloner.clone_body(func, ctx, old_entry, new_entry, &entry_args);

    // Expose the new graph: from here every caller iterating blocks from
    // the start sees only the rebuilt body.
    func.move_block_to_front(new_entry);

    // Tear down the old blocks. External references were redirected during
    // cloning, so remaining uses are confined to the old graph itself;
    // point them at undef and erase back-to-front so no transient
    // use-before-definition appears in the still-linked structure.
    for block in old_blocks {
        for arg in func.block(block).args().to_vec() {
            func.replace_all_uses_with_undef(arg);
            // Ownership obligations on a value about to disappear are
            // meaningless; clear them for the ownership verifier.
            func.set_ownership(arg, Ownership::None);
        }
        while let Some(inst) = func.last_inst(block) {
            func.replace_all_result_uses_with_undef(inst);
            func.erase_inst(inst);
        }
        func.erase_block(block);
    }

    debug_assert!(
        func.layout()
            .iter()
            .all(|&b| func.block(b).args().iter().all(|&a| !func
                .value_ty(a)
                .has_local_archetype(ctx))),
        "rebuilt graph still mentions local archetypes"
    );
}

/// Rewrite every captured local archetype in `func` to a primary archetype
/// of an extended signature, and install the extended environment as the
/// function's own.
///
/// No-op when `sig` captures nothing: the function's blocks, values, and
/// environment are left untouched.
#[tracing::instrument(skip_all, fields(func = func.index()))]
pub fn recontextualize_captured_local_archetypes(
    module: &mut Module,
    func: FuncId,
    sig: &GenericSignatureWithCapturedEnvs,
) {
    if sig.captured_envs.is_empty() {
        return;
    }

    let ext = SignatureExtension::new(&mut module.types, sig);
    let (ctx, function) = module.types_and_function_mut(func);
    rebuild_body(function, ctx, &ext);
    tracing::debug!(
        params = ext.extended_sig.param_count(),
        blocks = function.layout().len(),
        "recontextualized captured local archetypes"
    );

    // Definitions of the captured archetypes died with the old graph.
    module.reclaim_unresolved_local_archetype_definitions();
}
