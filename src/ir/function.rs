// src/ir/function.rs
//
// The function-level IR: basic blocks, instructions, and values with
// explicit def/use edges.
//
// Blocks, instructions, and values live in per-function arenas addressed by
// u32 handles. Erasure tombstones the slot instead of freeing it, so a
// stale handle is detected by the accessors rather than dangling. The block
// layout (linked order) is a separate vector; a block can exist in the
// arena while unlinked, which is exactly the transitional state the
// recontextualization pass moves through.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::generics::environment::EnvId;
use crate::generics::substitution::SubstitutionMap;
use crate::generics::ty::{ArchetypeTy, ConformanceRef, Ty};
use crate::identity::NameId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(u32);

impl InstId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Ownership classification of a value, checked by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Guaranteed,
    Unowned,
    None,
}

/// Calling-convention flags on function arguments, copied verbatim when a
/// body is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgFlags {
    pub no_implicit_copy: bool,
    pub closure_capture: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    BlockArg { block: BlockId, index: usize },
    InstResult(InstId),
    Undef,
}

/// One use of a value: which instruction, which operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseRef {
    pub inst: InstId,
    pub operand: usize,
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: Ty,
    pub ownership: Ownership,
    pub def: ValueDef,
    /// Declaration metadata; only populated for function arguments.
    pub decl: Option<NameId>,
    pub flags: ArgFlags,
    uses: Vec<UseRef>,
}

impl ValueData {
    pub fn uses(&self) -> &[UseRef] {
        &self.uses
    }
}

/// The closed instruction set. Operand values live in
/// `Instruction::operands`; each variant here carries only its type-bearing
/// fields and static payload, so the clone-with-rewrite visitor can match
/// exhaustively and rewrite every type, conformance, and nested
/// substitution map in one place.
#[derive(Debug, Clone)]
pub enum InstKind {
    /// Stack slot for a value of `ty`; result is an address.
    AllocStack { ty: Ty },
    /// Operand 0: the address from the paired AllocStack.
    DeallocStack,
    /// Operand 0: the value to copy; result has the same type.
    CopyValue,
    /// Operand 0: the value to end.
    DestroyValue,
    /// Operands: the elements; result is `ty` (a tuple type).
    Tuple { ty: Ty },
    /// Operand 0: a tuple; result is `ty`, the element at `index`.
    TupleExtract { index: usize, ty: Ty },
    /// Result is the metatype of `ty`.
    Metatype { ty: Ty },
    /// Reference to the function named `name` of type `ty`.
    FunctionRef { name: NameId, ty: Ty },
    /// Operand 0: callee; remaining operands: arguments. `subs` is the
    /// call-site substitution map for the callee's own signature.
    Apply {
        subs: SubstitutionMap,
        result_ty: Ty,
    },
    /// Operand 0: an existential value; result is `opened_ty`, a local
    /// archetype introduced by the open.
    OpenExistential { opened_ty: Ty },
    /// Method lookup through a conformance; result is `ty`.
    WitnessMethod {
        lookup_ty: Ty,
        conformance: ConformanceRef,
        name: NameId,
        ty: Ty,
    },
    /// Operands: arguments forwarded to `dest`'s block arguments.
    Br { dest: BlockId },
    /// Operand 0: condition; then `true_arg_count` operands for
    /// `true_dest`, the rest for `false_dest`.
    CondBr {
        true_dest: BlockId,
        false_dest: BlockId,
        true_arg_count: usize,
    },
    /// Operand 0: the returned value.
    Return,
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Return
                | InstKind::Unreachable
        )
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstKind,
    operands: SmallVec<[ValueId; 2]>,
    result: Option<ValueId>,
    parent: BlockId,
}

impl Instruction {
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn result(&self) -> Option<ValueId> {
        self.result
    }

    pub fn parent(&self) -> BlockId {
        self.parent
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    args: Vec<ValueId>,
    insts: Vec<InstId>,
}

impl BasicBlock {
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: NameId,
    env: EnvId,
    /// Linked blocks in order; index 0 is the entry block.
    layout: Vec<BlockId>,
    blocks: Vec<Option<BasicBlock>>,
    insts: Vec<Option<Instruction>>,
    values: Vec<Option<ValueData>>,
    /// Undef sentinels, interned per type.
    undefs: HashMap<Ty, ValueId>,
    /// Archetype definitions recorded by the builder, awaiting transfer
    /// into the module-level registry when the function is added.
    pending_archetype_defs: Vec<(ArchetypeTy, InstId)>,
}

impl Function {
    pub fn new(name: NameId, env: EnvId) -> Self {
        Self {
            name,
            env,
            layout: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
            undefs: HashMap::new(),
            pending_archetype_defs: Vec::new(),
        }
    }

    /// Record that `inst` defines `archetype`. Invoked by the builder when
    /// it emits an opening instruction; drained by `Module::add_function`.
    pub fn note_opened_archetype(&mut self, archetype: ArchetypeTy, inst: InstId) {
        self.pending_archetype_defs.push((archetype, inst));
    }

    pub fn take_pending_archetype_defs(&mut self) -> Vec<(ArchetypeTy, InstId)> {
        std::mem::take(&mut self.pending_archetype_defs)
    }

    pub fn env(&self) -> EnvId {
        self.env
    }

    /// Install a new declared environment. All subsequent type resolution
    /// on newly created IR goes through it.
    pub fn set_env(&mut self, env: EnvId) {
        self.env = env;
    }

    // === Blocks ===

    pub fn entry_block(&self) -> BlockId {
        *self
            .layout
            .first()
            .expect("function has no entry block")
    }

    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.0 as usize]
            .as_ref()
            .expect("block has been erased")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.0 as usize]
            .as_mut()
            .expect("block has been erased")
    }

    pub fn is_block_live(&self, id: BlockId) -> bool {
        self.blocks
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    /// Create a new block, linked at the end of the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BasicBlock::default()));
        self.layout.push(id);
        id
    }

    /// Make `block` the entry block without disturbing the relative order
    /// of the others.
    pub fn move_block_to_front(&mut self, block: BlockId) {
        let pos = self
            .layout
            .iter()
            .position(|&b| b == block)
            .expect("block is not linked");
        self.layout.remove(pos);
        self.layout.insert(0, block);
    }

    /// Erase an empty, argumentless-or-drained block. All arguments must
    /// already be use-free.
    pub fn erase_block(&mut self, block: BlockId) {
        let data = self.blocks[block.0 as usize]
            .take()
            .expect("block already erased");
        assert!(
            data.insts.is_empty(),
            "cannot erase a block that still holds instructions"
        );
        for arg in data.args {
            let value = self.values[arg.0 as usize]
                .take()
                .expect("block argument already erased");
            assert!(
                value.uses.is_empty(),
                "cannot erase a block argument that still has uses"
            );
        }
        let pos = self
            .layout
            .iter()
            .position(|&b| b == block)
            .expect("block is not linked");
        self.layout.remove(pos);
    }

    /// Successor blocks of `block`'s terminator, if it has one.
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        let mut out = SmallVec::new();
        if let Some(&last) = self.block(block).insts.last() {
            match &self.inst(last).kind {
                InstKind::Br { dest } => out.push(*dest),
                InstKind::CondBr {
                    true_dest,
                    false_dest,
                    ..
                } => {
                    out.push(*true_dest);
                    out.push(*false_dest);
                }
                _ => {}
            }
        }
        out
    }

    // === Values ===

    pub fn value(&self, id: ValueId) -> &ValueData {
        self.values[id.0 as usize]
            .as_ref()
            .expect("value has been erased")
    }

    fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        self.values[id.0 as usize]
            .as_mut()
            .expect("value has been erased")
    }

    pub fn is_value_live(&self, id: ValueId) -> bool {
        self.values
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub fn value_ty(&self, id: ValueId) -> &Ty {
        &self.value(id).ty
    }

    pub fn set_ownership(&mut self, id: ValueId, ownership: Ownership) {
        self.value_mut(id).ownership = ownership;
    }

    fn new_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Some(data));
        id
    }

    /// The undefined placeholder for `ty`, interned so repeated teardown
    /// of same-typed values shares one sentinel.
    pub fn undef(&mut self, ty: Ty) -> ValueId {
        if let Some(&id) = self.undefs.get(&ty) {
            return id;
        }
        let id = self.new_value(ValueData {
            ty: ty.clone(),
            ownership: Ownership::None,
            def: ValueDef::Undef,
            decl: None,
            flags: ArgFlags::default(),
            uses: Vec::new(),
        });
        self.undefs.insert(ty, id);
        id
    }

    /// Append a plain block argument.
    pub fn add_block_arg(&mut self, block: BlockId, ty: Ty, ownership: Ownership) -> ValueId {
        let index = self.block(block).args.len();
        let id = self.new_value(ValueData {
            ty,
            ownership,
            def: ValueDef::BlockArg { block, index },
            decl: None,
            flags: ArgFlags::default(),
            uses: Vec::new(),
        });
        self.block_mut(block).args.push(id);
        id
    }

    /// Append a function argument to the entry block, with declaration
    /// metadata and convention flags.
    pub fn create_function_argument(
        &mut self,
        block: BlockId,
        ty: Ty,
        ownership: Ownership,
        decl: Option<NameId>,
        flags: ArgFlags,
    ) -> ValueId {
        let id = self.add_block_arg(block, ty, ownership);
        let value = self.value_mut(id);
        value.decl = decl;
        value.flags = flags;
        id
    }

    /// Redirect every remaining use of `value` to the positional
    /// replacement `new`.
    pub fn replace_all_uses_with(&mut self, value: ValueId, new: ValueId) {
        debug_assert_ne!(value, new);
        let uses = std::mem::take(&mut self.value_mut(value).uses);
        for use_ref in &uses {
            let inst = self.insts[use_ref.inst.0 as usize]
                .as_mut()
                .expect("use of erased instruction");
            inst.operands[use_ref.operand] = new;
        }
        self.value_mut(new).uses.extend(uses);
    }

    /// Redirect every remaining use of `value` to the undefined
    /// placeholder of its type.
    pub fn replace_all_uses_with_undef(&mut self, value: ValueId) {
        if self.value(value).uses.is_empty() {
            return;
        }
        let ty = self.value(value).ty.clone();
        let undef = self.undef(ty);
        self.replace_all_uses_with(value, undef);
    }

    // === Instructions ===

    pub fn inst(&self, id: InstId) -> &Instruction {
        self.insts[id.0 as usize]
            .as_ref()
            .expect("instruction has been erased")
    }

    pub fn is_inst_live(&self, id: InstId) -> bool {
        self.insts
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub fn inst_result(&self, id: InstId) -> Option<ValueId> {
        self.inst(id).result
    }

    pub fn last_inst(&self, block: BlockId) -> Option<InstId> {
        self.block(block).insts.last().copied()
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.last_inst(block)
            .filter(|&id| self.inst(id).kind.is_terminator())
    }

    /// Append an instruction to `block`, wiring operand use edges and
    /// creating the result value if the instruction produces one.
    pub fn create_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        operands: SmallVec<[ValueId; 2]>,
        result: Option<(Ty, Ownership)>,
    ) -> InstId {
        debug_assert!(
            self.terminator(block).is_none(),
            "cannot append past a terminator"
        );
        let id = InstId(self.insts.len() as u32);
        for (slot, &operand) in operands.iter().enumerate() {
            self.value_mut(operand).uses.push(UseRef {
                inst: id,
                operand: slot,
            });
        }
        let result = result.map(|(ty, ownership)| {
            self.new_value(ValueData {
                ty,
                ownership,
                def: ValueDef::InstResult(id),
                decl: None,
                flags: ArgFlags::default(),
                uses: Vec::new(),
            })
        });
        self.insts.push(Some(Instruction {
            kind,
            operands,
            result,
            parent: block,
        }));
        self.block_mut(block).insts.push(id);
        id
    }

    /// Redirect remaining uses of the instruction's result to undef.
    pub fn replace_all_result_uses_with_undef(&mut self, id: InstId) {
        if let Some(result) = self.inst(id).result {
            self.replace_all_uses_with_undef(result);
        }
    }

    /// Unlink and tombstone an instruction. Its result must be use-free.
    pub fn erase_inst(&mut self, id: InstId) {
        let inst = self.insts[id.0 as usize]
            .take()
            .expect("instruction already erased");
        for (slot, operand) in inst.operands.iter().enumerate() {
            let value = self.value_mut(*operand);
            value
                .uses
                .retain(|u| !(u.inst == id && u.operand == slot));
        }
        if let Some(result) = inst.result {
            let value = self.values[result.0 as usize]
                .take()
                .expect("result value already erased");
            assert!(
                value.uses.is_empty(),
                "cannot erase an instruction whose result still has uses"
            );
        }
        self.block_mut(inst.parent)
            .insts
            .retain(|&i| i != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::TypeContext;
    use crate::generics::signature::GenericSignature;
    use crate::identity::NameTable;
    use smallvec::smallvec;

    fn test_function() -> (Function, TypeContext) {
        let mut names = NameTable::new();
        let mut ctx = TypeContext::new();
        let env = ctx.create_primary_environment(GenericSignature::empty());
        (Function::new(names.intern("f"), env), ctx)
    }

    #[test]
    fn def_use_edges_track_operands() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);

        let copy = func.create_inst(
            entry,
            InstKind::CopyValue,
            smallvec![arg],
            Some((Ty::Int64, Ownership::Owned)),
        );
        assert_eq!(func.value(arg).uses(), &[UseRef { inst: copy, operand: 0 }]);

        let result = func.inst_result(copy).unwrap();
        func.create_inst(entry, InstKind::Return, smallvec![result], None);
        assert_eq!(func.value(result).uses().len(), 1);
    }

    #[test]
    fn replace_all_uses_with_undef_redirects_and_clears() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);
        let copy = func.create_inst(
            entry,
            InstKind::CopyValue,
            smallvec![arg],
            Some((Ty::Int64, Ownership::Owned)),
        );

        func.replace_all_uses_with_undef(arg);
        assert!(func.value(arg).uses().is_empty());
        let operand = func.inst(copy).operands()[0];
        assert_eq!(func.value(operand).def, ValueDef::Undef);
        assert_eq!(func.value(operand).ownership, Ownership::None);

        // Interned per type.
        let again = func.undef(Ty::Int64);
        assert_eq!(again, operand);
    }

    #[test]
    fn erase_inst_unhooks_operand_uses() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let arg = func.add_block_arg(entry, Ty::Int64, Ownership::Owned);
        let copy = func.create_inst(
            entry,
            InstKind::CopyValue,
            smallvec![arg],
            Some((Ty::Int64, Ownership::Owned)),
        );

        func.erase_inst(copy);
        assert!(func.value(arg).uses().is_empty());
        assert!(!func.is_inst_live(copy));
        assert!(func.block(entry).insts().is_empty());
    }

    #[test]
    fn move_block_to_front_changes_entry() {
        let (mut func, _ctx) = test_function();
        let a = func.create_block();
        let b = func.create_block();
        assert_eq!(func.entry_block(), a);
        func.move_block_to_front(b);
        assert_eq!(func.entry_block(), b);
        assert_eq!(func.layout(), &[b, a]);
    }

    #[test]
    fn successors_follow_terminators() {
        let (mut func, _ctx) = test_function();
        let entry = func.create_block();
        let then_block = func.create_block();
        let else_block = func.create_block();
        let cond = func.add_block_arg(entry, Ty::Bool, Ownership::None);
        func.create_inst(
            entry,
            InstKind::CondBr {
                true_dest: then_block,
                false_dest: else_block,
                true_arg_count: 0,
            },
            smallvec![cond],
            None,
        );
        assert_eq!(func.successors(entry).as_slice(), &[then_block, else_block]);
        assert!(func.successors(then_block).is_empty());
    }
}
