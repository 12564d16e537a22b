// src/ir/cloner.rs
//
// Structural clone-with-rewrite over a function body.
//
// The cloner walks every block reachable from a given entry block and
// re-emits it into fresh blocks, rewriting each instruction's type-bearing
// fields through a TypeRewriter and each operand through the old-to-new
// value map built incrementally along the way. Blocks are processed in
// discovery (breadth-first) order; a dominating definition is on every
// path to its uses, so it is always cloned before them.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::generics::environment::TypeContext;
use crate::generics::substitution::SubstitutionMap;
use crate::generics::ty::{ConformanceRef, Ty};
use crate::ir::function::{BlockId, Function, InstKind, ValueId};

/// Rewrite hooks applied to every type, conformance reference, and nested
/// substitution map encountered during cloning.
pub trait TypeRewriter {
    fn rewrite_type(&self, ctx: &TypeContext, ty: &Ty) -> Ty;
    fn rewrite_conformance(
        &self,
        ctx: &TypeContext,
        ty: &Ty,
        conformance: &ConformanceRef,
    ) -> ConformanceRef;
    fn rewrite_substitutions(&self, ctx: &TypeContext, subs: &SubstitutionMap)
    -> SubstitutionMap;
}

/// Identity rewriter: plain structural cloning.
pub struct NoRewrite;

impl TypeRewriter for NoRewrite {
    fn rewrite_type(&self, _ctx: &TypeContext, ty: &Ty) -> Ty {
        ty.clone()
    }

    fn rewrite_conformance(
        &self,
        _ctx: &TypeContext,
        _ty: &Ty,
        conformance: &ConformanceRef,
    ) -> ConformanceRef {
        conformance.clone()
    }

    fn rewrite_substitutions(
        &self,
        _ctx: &TypeContext,
        subs: &SubstitutionMap,
    ) -> SubstitutionMap {
        subs.clone()
    }
}

impl TypeRewriter for SubstitutionMap {
    fn rewrite_type(&self, ctx: &TypeContext, ty: &Ty) -> Ty {
        self.subst_type(ctx, ty)
    }

    fn rewrite_conformance(
        &self,
        ctx: &TypeContext,
        ty: &Ty,
        conformance: &ConformanceRef,
    ) -> ConformanceRef {
        self.subst_conformance(ctx, ty, conformance)
    }

    fn rewrite_substitutions(
        &self,
        ctx: &TypeContext,
        subs: &SubstitutionMap,
    ) -> SubstitutionMap {
        self.subst_substitution_map(ctx, subs)
    }
}

pub struct FunctionCloner<'r, R: TypeRewriter> {
    rewriter: &'r R,
    value_map: FxHashMap<ValueId, ValueId>,
    block_map: FxHashMap<BlockId, BlockId>,
    worklist: VecDeque<BlockId>,
}

impl<'r, R: TypeRewriter> FunctionCloner<'r, R> {
    pub fn new(rewriter: &'r R) -> Self {
        Self {
            rewriter,
            value_map: FxHashMap::default(),
            block_map: FxHashMap::default(),
            worklist: VecDeque::new(),
        }
    }

    /// The new value standing for `old` in the cloned graph.
    pub fn remapped_value(&self, old: ValueId) -> Option<ValueId> {
        self.value_map.get(&old).copied()
    }

    /// The new block standing for `old`, if `old` was reachable.
    pub fn remapped_block(&self, old: BlockId) -> Option<BlockId> {
        self.block_map.get(&old).copied()
    }

    /// Clone every block reachable from `old_entry` into new blocks,
    /// anchored at `new_entry` whose arguments `entry_args` positionally
    /// replace the old entry's arguments. `new_entry` must already carry
    /// its arguments; all other blocks get theirs created here.
    pub fn clone_body(
        &mut self,
        func: &mut Function,
        ctx: &TypeContext,
        old_entry: BlockId,
        new_entry: BlockId,
        entry_args: &[ValueId],
    ) {
        let old_args = func.block(old_entry).args().to_vec();
        assert_eq!(
            old_args.len(),
            entry_args.len(),
            "entry replacement arguments must match the old entry arity"
        );
        for (&old, &new) in old_args.iter().zip(entry_args) {
            self.value_map.insert(old, new);
        }
        self.block_map.insert(old_entry, new_entry);
        self.worklist.push_back(old_entry);

        let mut cloned_blocks = 0usize;
        while let Some(old_block) = self.worklist.pop_front() {
            let new_block = self.block_map[&old_block];
            for inst in func.block(old_block).insts().to_vec() {
                self.clone_inst(func, ctx, inst, new_block);
            }
            cloned_blocks += 1;
        }
        tracing::trace!(blocks = cloned_blocks, "cloned function body");
    }

    /// Map an old branch target, creating the new block (with rewritten
    /// argument types) and scheduling it on first discovery.
    fn map_block(&mut self, func: &mut Function, ctx: &TypeContext, old: BlockId) -> BlockId {
        if let Some(&mapped) = self.block_map.get(&old) {
            return mapped;
        }
        let new = func.create_block();
        for old_arg in func.block(old).args().to_vec() {
            let data = func.value(old_arg);
            let ty = self.rewriter.rewrite_type(ctx, &data.ty);
            let ownership = data.ownership;
            let new_arg = func.add_block_arg(new, ty, ownership);
            self.value_map.insert(old_arg, new_arg);
        }
        self.block_map.insert(old, new);
        self.worklist.push_back(old);
        new
    }

    fn map_value(&self, old: ValueId) -> ValueId {
        *self
            .value_map
            .get(&old)
            .unwrap_or_else(|| panic!("cloned instruction uses unmapped value {old:?}"))
    }

    fn clone_inst(
        &mut self,
        func: &mut Function,
        ctx: &TypeContext,
        inst: crate::ir::function::InstId,
        new_block: BlockId,
    ) {
        let old = func.inst(inst).clone();
        let operands: SmallVec<[ValueId; 2]> = old
            .operands()
            .iter()
            .map(|&op| self.map_value(op))
            .collect();

        let kind = match &old.kind {
            InstKind::AllocStack { ty } => InstKind::AllocStack {
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::DeallocStack => InstKind::DeallocStack,
            InstKind::CopyValue => InstKind::CopyValue,
            InstKind::DestroyValue => InstKind::DestroyValue,
            InstKind::Tuple { ty } => InstKind::Tuple {
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::TupleExtract { index, ty } => InstKind::TupleExtract {
                index: *index,
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::Metatype { ty } => InstKind::Metatype {
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::FunctionRef { name, ty } => InstKind::FunctionRef {
                name: *name,
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::Apply { subs, result_ty } => InstKind::Apply {
                subs: self.rewriter.rewrite_substitutions(ctx, subs),
                result_ty: self.rewriter.rewrite_type(ctx, result_ty),
            },
            InstKind::OpenExistential { opened_ty } => InstKind::OpenExistential {
                opened_ty: self.rewriter.rewrite_type(ctx, opened_ty),
            },
            InstKind::WitnessMethod {
                lookup_ty,
                conformance,
                name,
                ty,
            } => InstKind::WitnessMethod {
                lookup_ty: self.rewriter.rewrite_type(ctx, lookup_ty),
                conformance: self.rewriter.rewrite_conformance(ctx, lookup_ty, conformance),
                name: *name,
                ty: self.rewriter.rewrite_type(ctx, ty),
            },
            InstKind::Br { dest } => InstKind::Br {
                dest: self.map_block(func, ctx, *dest),
            },
            InstKind::CondBr {
                true_dest,
                false_dest,
                true_arg_count,
            } => InstKind::CondBr {
                true_dest: self.map_block(func, ctx, *true_dest),
                false_dest: self.map_block(func, ctx, *false_dest),
                true_arg_count: *true_arg_count,
            },
            InstKind::Return => InstKind::Return,
            InstKind::Unreachable => InstKind::Unreachable,
        };

        let result = old.result().map(|old_result| {
            let data = func.value(old_result);
            (
                self.rewriter.rewrite_type(ctx, &data.ty),
                data.ownership,
            )
        });

        let new_inst = func.create_inst(new_block, kind, operands, result);
        if let Some(old_result) = old.result() {
            let new_result = func
                .inst_result(new_inst)
                .expect("cloned instruction lost its result");
            self.value_map.insert(old_result, new_result);
        }
    }
}
