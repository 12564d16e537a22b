// src/ir/builder.rs
//
// Insertion-point style instruction builder. One method per instruction
// kind; result types and ownership are derived here so call sites stay
// declarative.

use smallvec::{SmallVec, smallvec};

use crate::generics::substitution::SubstitutionMap;
use crate::generics::ty::{ConformanceRef, Ty};
use crate::identity::NameId;
use crate::ir::function::{BlockId, Function, InstId, InstKind, Ownership, ValueId};

pub struct InstBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
}

impl<'f> InstBuilder<'f> {
    pub fn new(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block }
    }

    pub fn set_insertion_block(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn func(&mut self) -> &mut Function {
        self.func
    }

    fn emit(
        &mut self,
        kind: InstKind,
        operands: SmallVec<[ValueId; 2]>,
        result: Option<(Ty, Ownership)>,
    ) -> InstId {
        self.func.create_inst(self.block, kind, operands, result)
    }

    fn emit_value(
        &mut self,
        kind: InstKind,
        operands: SmallVec<[ValueId; 2]>,
        ty: Ty,
        ownership: Ownership,
    ) -> ValueId {
        let inst = self.emit(kind, operands, Some((ty, ownership)));
        self.func
            .inst_result(inst)
            .expect("instruction was created with a result")
    }

    pub fn alloc_stack(&mut self, ty: Ty) -> ValueId {
        let result_ty = Ty::address(ty.clone());
        self.emit_value(
            InstKind::AllocStack { ty },
            smallvec![],
            result_ty,
            Ownership::None,
        )
    }

    pub fn dealloc_stack(&mut self, addr: ValueId) -> InstId {
        self.emit(InstKind::DeallocStack, smallvec![addr], None)
    }

    pub fn copy_value(&mut self, value: ValueId) -> ValueId {
        let ty = self.func.value_ty(value).clone();
        self.emit_value(InstKind::CopyValue, smallvec![value], ty, Ownership::Owned)
    }

    pub fn destroy_value(&mut self, value: ValueId) -> InstId {
        self.emit(InstKind::DestroyValue, smallvec![value], None)
    }

    pub fn tuple(&mut self, elems: &[ValueId]) -> ValueId {
        let ty = Ty::Tuple(
            elems
                .iter()
                .map(|&e| self.func.value_ty(e).clone())
                .collect(),
        );
        self.emit_value(
            InstKind::Tuple { ty: ty.clone() },
            elems.iter().copied().collect(),
            ty,
            Ownership::Owned,
        )
    }

    pub fn tuple_extract(&mut self, tuple: ValueId, index: usize) -> ValueId {
        let ty = match self.func.value_ty(tuple) {
            Ty::Tuple(elems) => elems[index].clone(),
            other => panic!("tuple_extract of non-tuple type {other:?}"),
        };
        self.emit_value(
            InstKind::TupleExtract {
                index,
                ty: ty.clone(),
            },
            smallvec![tuple],
            ty,
            Ownership::Owned,
        )
    }

    pub fn metatype(&mut self, ty: Ty) -> ValueId {
        let result_ty = Ty::metatype(ty.clone());
        self.emit_value(
            InstKind::Metatype { ty },
            smallvec![],
            result_ty,
            Ownership::None,
        )
    }

    pub fn function_ref(&mut self, name: NameId, ty: Ty) -> ValueId {
        self.emit_value(
            InstKind::FunctionRef {
                name,
                ty: ty.clone(),
            },
            smallvec![],
            ty,
            Ownership::None,
        )
    }

    pub fn apply(
        &mut self,
        callee: ValueId,
        subs: SubstitutionMap,
        args: &[ValueId],
        result_ty: Ty,
    ) -> ValueId {
        let mut operands: SmallVec<[ValueId; 2]> = smallvec![callee];
        operands.extend(args.iter().copied());
        self.emit_value(
            InstKind::Apply {
                subs,
                result_ty: result_ty.clone(),
            },
            operands,
            result_ty,
            Ownership::Owned,
        )
    }

    pub fn open_existential(&mut self, operand: ValueId, opened_ty: Ty) -> ValueId {
        let archetype = match &opened_ty {
            Ty::Archetype(archetype) => Some(*archetype),
            _ => None,
        };
        let inst = self.emit(
            InstKind::OpenExistential {
                opened_ty: opened_ty.clone(),
            },
            smallvec![operand],
            Some((opened_ty, Ownership::Guaranteed)),
        );
        if let Some(archetype) = archetype {
            self.func.note_opened_archetype(archetype, inst);
        }
        self.func
            .inst_result(inst)
            .expect("instruction was created with a result")
    }

    pub fn witness_method(
        &mut self,
        lookup_ty: Ty,
        conformance: ConformanceRef,
        name: NameId,
        ty: Ty,
    ) -> ValueId {
        self.emit_value(
            InstKind::WitnessMethod {
                lookup_ty,
                conformance,
                name,
                ty: ty.clone(),
            },
            smallvec![],
            ty,
            Ownership::None,
        )
    }

    pub fn br(&mut self, dest: BlockId, args: &[ValueId]) -> InstId {
        self.emit(InstKind::Br { dest }, args.iter().copied().collect(), None)
    }

    pub fn cond_br(
        &mut self,
        cond: ValueId,
        true_dest: BlockId,
        true_args: &[ValueId],
        false_dest: BlockId,
        false_args: &[ValueId],
    ) -> InstId {
        let mut operands: SmallVec<[ValueId; 2]> = smallvec![cond];
        operands.extend(true_args.iter().copied());
        operands.extend(false_args.iter().copied());
        self.emit(
            InstKind::CondBr {
                true_dest,
                false_dest,
                true_arg_count: true_args.len(),
            },
            operands,
            None,
        )
    }

    pub fn ret(&mut self, value: ValueId) -> InstId {
        self.emit(InstKind::Return, smallvec![value], None)
    }

    pub fn unreachable(&mut self) -> InstId {
        self.emit(InstKind::Unreachable, smallvec![], None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::TypeContext;
    use crate::generics::signature::GenericSignature;
    use crate::identity::NameTable;

    #[test]
    fn builder_derives_result_types() {
        let mut names = NameTable::new();
        let mut ctx = TypeContext::new();
        let env = ctx.create_primary_environment(GenericSignature::empty());
        let mut func = Function::new(names.intern("f"), env);
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);

        let mut b = InstBuilder::new(&mut func, entry);
        let slot = b.alloc_stack(Ty::Int64);
        let pair = b.tuple(&[arg, arg]);
        let first = b.tuple_extract(pair, 0);
        b.dealloc_stack(slot);
        b.ret(first);

        assert_eq!(func.value_ty(slot), &Ty::address(Ty::Int64));
        assert_eq!(func.value_ty(pair), &Ty::Tuple(vec![Ty::Int64, Ty::Int64]));
        assert_eq!(func.value_ty(first), &Ty::Int64);
        assert_eq!(func.block(entry).insts().len(), 5);
    }
}
