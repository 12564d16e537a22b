// src/ir/verifier.rs
//
// Structural and ownership well-formedness checks, run by the surrounding
// pipeline after transforms. A transform that leaves the graph in a state
// this module rejects has a bug in its redirection or teardown step.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::generics::environment::TypeContext;
use crate::ir::function::{
    BlockId, Function, InstId, InstKind, Ownership, ValueDef, ValueId,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block {block:?} is empty")]
    EmptyBlock { block: BlockId },

    #[error("block {block:?} does not end with a terminator")]
    MissingTerminator { block: BlockId },

    #[error("terminator {inst:?} is not the last instruction of block {block:?}")]
    TerminatorNotLast { block: BlockId, inst: InstId },

    #[error("instruction {inst:?} uses value {value:?} defined in an unlinked block")]
    UseOfUnlinkedValue { inst: InstId, value: ValueId },

    #[error("branch {inst:?} passes {got} arguments to block {dest:?} expecting {expected}")]
    BranchArgCountMismatch {
        inst: InstId,
        dest: BlockId,
        expected: usize,
        got: usize,
    },

    #[error("branch {inst:?} argument {index} has the wrong type for block {dest:?}")]
    BranchArgTypeMismatch {
        inst: InstId,
        dest: BlockId,
        index: usize,
    },

    #[error("branch {inst:?} targets unlinked block {dest:?}")]
    BranchToUnlinkedBlock { inst: InstId, dest: BlockId },

    #[error("undef value {value:?} carries ownership")]
    UndefWithOwnership { value: ValueId },

    #[error("value {value:?} refers to a local archetype outside its defining region")]
    StrayLocalArchetype { value: ValueId },

    #[error("instruction {inst:?} mentions a local archetype in a type-bearing field")]
    LocalArchetypeInInstruction { inst: InstId },
}

/// Verify structural integrity of the linked graph: block shape, def/use
/// edges, branch arities and types, and the ownership rule the teardown
/// path relies on (undef sentinels carry no ownership).
pub fn verify(func: &Function) -> Result<(), VerifyError> {
    let linked: FxHashSet<BlockId> = func.layout().iter().copied().collect();

    for &block in func.layout() {
        let data = func.block(block);
        let Some(&last) = data.insts().last() else {
            return Err(VerifyError::EmptyBlock { block });
        };
        if !func.inst(last).kind.is_terminator() {
            return Err(VerifyError::MissingTerminator { block });
        }
        for &inst in &data.insts()[..data.insts().len() - 1] {
            if func.inst(inst).kind.is_terminator() {
                return Err(VerifyError::TerminatorNotLast { block, inst });
            }
        }

        for &inst in data.insts() {
            verify_operands(func, &linked, inst)?;
            verify_branch(func, &linked, inst)?;
        }
    }

    // Undef sentinels must not carry ownership obligations; the teardown
    // path depends on this when it redirects dead uses.
    for &block in func.layout() {
        for &inst in func.block(block).insts() {
            for &op in func.inst(inst).operands() {
                let value = func.value(op);
                if value.def == ValueDef::Undef && value.ownership != Ownership::None {
                    return Err(VerifyError::UndefWithOwnership { value: op });
                }
            }
        }
    }

    Ok(())
}

/// Additionally require that nothing in the linked graph mentions a local
/// archetype: neither value types nor the type-bearing fields inside
/// instructions (including nested call-site substitution maps). Holds
/// after recontextualization; does not hold for functions that
/// legitimately reference captured environments.
pub fn verify_no_local_archetypes(func: &Function, ctx: &TypeContext) -> Result<(), VerifyError> {
    verify(func)?;
    for &block in func.layout() {
        for &arg in func.block(block).args() {
            if func.value_ty(arg).has_local_archetype(ctx) {
                return Err(VerifyError::StrayLocalArchetype { value: arg });
            }
        }
        for &inst in func.block(block).insts() {
            if let Some(result) = func.inst_result(inst)
                && func.value_ty(result).has_local_archetype(ctx)
            {
                return Err(VerifyError::StrayLocalArchetype { value: result });
            }
            if inst_mentions_local_archetype(&func.inst(inst).kind, ctx) {
                return Err(VerifyError::LocalArchetypeInInstruction { inst });
            }
        }
    }
    Ok(())
}

/// Exhaustive walk over the type-bearing fields of an instruction. The
/// closed `InstKind` enum makes a new variant a compile error here.
fn inst_mentions_local_archetype(kind: &InstKind, ctx: &TypeContext) -> bool {
    match kind {
        InstKind::AllocStack { ty }
        | InstKind::Tuple { ty }
        | InstKind::TupleExtract { ty, .. }
        | InstKind::Metatype { ty }
        | InstKind::FunctionRef { ty, .. } => ty.has_local_archetype(ctx),
        InstKind::Apply { subs, result_ty } => {
            result_ty.has_local_archetype(ctx) || subs.mentions_local_archetype(ctx)
        }
        InstKind::OpenExistential { opened_ty } => opened_ty.has_local_archetype(ctx),
        InstKind::WitnessMethod {
            lookup_ty,
            conformance,
            ty,
            ..
        } => {
            lookup_ty.has_local_archetype(ctx)
                || ty.has_local_archetype(ctx)
                || conformance.has_local_archetype(ctx)
        }
        InstKind::DeallocStack
        | InstKind::CopyValue
        | InstKind::DestroyValue
        | InstKind::Br { .. }
        | InstKind::CondBr { .. }
        | InstKind::Return
        | InstKind::Unreachable => false,
    }
}

fn verify_operands(
    func: &Function,
    linked: &FxHashSet<BlockId>,
    inst: InstId,
) -> Result<(), VerifyError> {
    for &op in func.inst(inst).operands() {
        let def_block = match func.value(op).def {
            ValueDef::BlockArg { block, .. } => Some(block),
            ValueDef::InstResult(def) => Some(func.inst(def).parent()),
            ValueDef::Undef => None,
        };
        if let Some(block) = def_block
            && !linked.contains(&block)
        {
            return Err(VerifyError::UseOfUnlinkedValue { inst, value: op });
        }
    }
    Ok(())
}

fn verify_branch(
    func: &Function,
    linked: &FxHashSet<BlockId>,
    inst: InstId,
) -> Result<(), VerifyError> {
    let data = func.inst(inst);
    let check_edge = |dest: BlockId, args: &[ValueId]| -> Result<(), VerifyError> {
        if !linked.contains(&dest) {
            return Err(VerifyError::BranchToUnlinkedBlock { inst, dest });
        }
        let params = func.block(dest).args();
        if params.len() != args.len() {
            return Err(VerifyError::BranchArgCountMismatch {
                inst,
                dest,
                expected: params.len(),
                got: args.len(),
            });
        }
        for (index, (&arg, &param)) in args.iter().zip(params).enumerate() {
            if func.value_ty(arg) != func.value_ty(param) {
                return Err(VerifyError::BranchArgTypeMismatch { inst, dest, index });
            }
        }
        Ok(())
    };

    match &data.kind {
        InstKind::Br { dest } => check_edge(*dest, data.operands()),
        InstKind::CondBr {
            true_dest,
            false_dest,
            true_arg_count,
        } => {
            let (true_args, false_args) = data.operands()[1..].split_at(*true_arg_count);
            check_edge(*true_dest, true_args)?;
            check_edge(*false_dest, false_args)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::TypeContext;
    use crate::generics::signature::GenericSignature;
    use crate::generics::ty::Ty;
    use crate::identity::NameTable;
    use crate::ir::builder::InstBuilder;

    fn test_function() -> (Function, TypeContext) {
        let mut names = NameTable::new();
        let mut ctx = TypeContext::new();
        let env = ctx.create_primary_environment(GenericSignature::empty());
        (Function::new(names.intern("f"), env), ctx)
    }

    #[test]
    fn well_formed_function_verifies() {
        let (mut func, ctx) = test_function();
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);
        let exit = func.create_block();
        let exit_arg = func.add_block_arg(exit, Ty::Int64, Ownership::Owned);
        {
            let mut b = InstBuilder::new(&mut func, entry);
            b.br(exit, &[arg]);
            b.set_insertion_block(exit);
            b.ret(exit_arg);
        }
        assert_eq!(verify(&func), Ok(()));
        assert_eq!(verify_no_local_archetypes(&func, &ctx), Ok(()));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);
        let mut b = InstBuilder::new(&mut func, entry);
        b.copy_value(arg);
        assert_eq!(
            verify(&func),
            Err(VerifyError::MissingTerminator { block: entry })
        );
    }

    #[test]
    fn local_archetype_inside_instruction_fields_is_rejected() {
        let mut names = NameTable::new();
        let proto = names.intern_protocol("Measurable");
        let method = names.intern("measure");
        let mut ctx = TypeContext::new();
        let primary = ctx.create_primary_environment(GenericSignature::empty());
        let opened_sig = GenericSignature::new(
            vec![crate::generics::signature::GenericParam::new(0, 0)],
            Vec::new(),
        );
        let opened = ctx.create_captured_environment(
            opened_sig,
            crate::generics::environment::EnvKind::OpenedExistential,
            Some(primary),
        );
        let local = ctx.map_param_into_context(
            opened,
            crate::generics::signature::GenericParam::new(0, 0),
        );

        // Lookup type is local but the result type is not, so the
        // value-type walk alone would miss it.
        let mut func = Function::new(names.intern("f"), primary);
        let entry = func.create_block();
        {
            let mut b = InstBuilder::new(&mut func, entry);
            let witness = b.witness_method(
                local,
                crate::generics::ty::ConformanceRef::Abstract(proto),
                method,
                Ty::Int64,
            );
            b.ret(witness);
        }
        let inst = func.block(entry).insts()[0];
        assert_eq!(verify(&func), Ok(()));
        assert_eq!(
            verify_no_local_archetypes(&func, &ctx),
            Err(VerifyError::LocalArchetypeInInstruction { inst })
        );
    }

    #[test]
    fn local_archetype_in_nested_substitutions_is_rejected() {
        let mut names = NameTable::new();
        let mut ctx = TypeContext::new();
        let primary = ctx.create_primary_environment(GenericSignature::empty());
        let opened_sig = GenericSignature::new(
            vec![crate::generics::signature::GenericParam::new(0, 0)],
            Vec::new(),
        );
        let opened = ctx.create_captured_environment(
            opened_sig,
            crate::generics::environment::EnvKind::OpenedExistential,
            Some(primary),
        );
        let local = ctx.map_param_into_context(
            opened,
            crate::generics::signature::GenericParam::new(0, 0),
        );

        let mut func = Function::new(names.intern("f"), primary);
        let entry = func.create_block();
        {
            let mut b = InstBuilder::new(&mut func, entry);
            let callee = b.function_ref(names.intern("g"), Ty::function(vec![], Ty::Int64));
            let mut subs = crate::generics::substitution::SubstitutionMap::empty();
            subs.insert(
                crate::generics::signature::GenericParam::new(0, 0),
                local,
                smallvec::smallvec![],
            );
            let result = b.apply(callee, subs, &[], Ty::Int64);
            b.ret(result);
        }
        let inst = func.block(entry).insts()[1];
        assert_eq!(
            verify_no_local_archetypes(&func, &ctx),
            Err(VerifyError::LocalArchetypeInInstruction { inst })
        );
    }

    #[test]
    fn branch_arity_mismatch_is_rejected() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let exit = func.create_block();
        let _exit_arg = func.add_block_arg(exit, Ty::Int64, Ownership::Owned);
        {
            let mut b = InstBuilder::new(&mut func, entry);
            b.br(exit, &[]);
            b.set_insertion_block(exit);
            b.unreachable();
        }
        let inst = func.block(entry).insts()[0];
        assert_eq!(
            verify(&func),
            Err(VerifyError::BranchArgCountMismatch {
                inst,
                dest: exit,
                expected: 1,
                got: 0,
            })
        );
    }
}
