// src/module.rs
//
// The module owns functions, the type-environment arena, and the registry
// of unresolved local-archetype definitions (instructions that define a
// local archetype referenced before its definition is seen). Transforms
// that discard such definitions notify the registry so it can reclaim the
// bookkeeping.

use rustc_hash::FxHashMap;

use crate::generics::environment::TypeContext;
use crate::generics::ty::ArchetypeTy;
use crate::identity::NameTable;
use crate::ir::function::{Function, InstId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// The defining instruction of a local archetype, if one exists in some
/// function of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalArchetypeDef {
    pub func: FuncId,
    pub inst: InstId,
}

#[derive(Debug, Default)]
pub struct Module {
    pub types: TypeContext,
    pub names: NameTable,
    functions: Vec<Function>,
    unresolved_local_archetype_defs: FxHashMap<ArchetypeTy, LocalArchetypeDef>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a function, transferring the archetype
    /// definitions its builder recorded into the registry. Definitions of
    /// primary archetypes are dropped here; only local ones need resolving.
    pub fn add_function(&mut self, mut func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        for (archetype, inst) in func.take_pending_archetype_defs() {
            if self.types.is_local_archetype(archetype) {
                self.note_local_archetype_def(archetype, id, inst);
            }
        }
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    /// Split borrow for transforms that rewrite a function while resolving
    /// types through the module's environment arena.
    pub fn types_and_function_mut(&mut self, id: FuncId) -> (&mut TypeContext, &mut Function) {
        (&mut self.types, &mut self.functions[id.0 as usize])
    }

    /// Record that `inst` in `func` defines `archetype`. Called when a
    /// defining instruction is materialized before all forward references
    /// to the archetype have been resolved.
    pub fn note_local_archetype_def(
        &mut self,
        archetype: ArchetypeTy,
        func: FuncId,
        inst: InstId,
    ) {
        debug_assert!(
            self.types.is_local_archetype(archetype),
            "primary archetypes have no local definition"
        );
        self.unresolved_local_archetype_defs
            .insert(archetype, LocalArchetypeDef { func, inst });
    }

    pub fn unresolved_local_archetype_def(
        &self,
        archetype: ArchetypeTy,
    ) -> Option<LocalArchetypeDef> {
        self.unresolved_local_archetype_defs
            .get(&archetype)
            .copied()
    }

    /// Drop registry entries whose defining instruction no longer exists.
    /// Transforms that erase local-archetype definitions call this once
    /// after they finish.
    pub fn reclaim_unresolved_local_archetype_definitions(&mut self) {
        let functions = &self.functions;
        let before = self.unresolved_local_archetype_defs.len();
        self.unresolved_local_archetype_defs
            .retain(|_, def| functions[def.func.0 as usize].is_inst_live(def.inst));
        let reclaimed = before - self.unresolved_local_archetype_defs.len();
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "reclaimed local archetype definitions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generics::environment::EnvKind;
    use crate::generics::signature::{GenericParam, GenericSignature};
    use crate::generics::ty::Ty;
    use crate::ir::builder::InstBuilder;
    use crate::ir::function::Ownership;

    #[test]
    fn reclaim_drops_entries_for_erased_definitions() {
        let mut module = Module::new();
        let names = &mut module.names;
        let proto = names.intern_protocol("Animal");
        let fname = names.intern("observe");

        let primary = module
            .types
            .create_primary_environment(GenericSignature::empty());
        let opened_sig = GenericSignature::new(vec![GenericParam::new(0, 0)], Vec::new());
        let opened = module.types.create_captured_environment(
            opened_sig,
            EnvKind::OpenedExistential,
            Some(primary),
        );
        let archetype = ArchetypeTy {
            env: opened,
            param: GenericParam::new(0, 0),
        };

        let mut func = Function::new(fname, primary);
        let entry = func.create_block();
        let existential = func.add_block_arg(entry, Ty::Existential(proto), Ownership::Guaranteed);
        let open = {
            let mut b = InstBuilder::new(&mut func, entry);
            let opened_value = b.open_existential(existential, Ty::Archetype(archetype));
            b.unreachable();
            match func.value(opened_value).def {
                crate::ir::function::ValueDef::InstResult(inst) => inst,
                _ => unreachable!(),
            }
        };
        // The builder recorded the definition; add_function transfers it
        // to the registry without any manual notification.
        let fid = module.add_function(func);
        assert_eq!(
            module.unresolved_local_archetype_def(archetype),
            Some(LocalArchetypeDef { func: fid, inst: open })
        );

        // Still live: reclaim keeps the entry.
        module.reclaim_unresolved_local_archetype_definitions();
        assert!(module.unresolved_local_archetype_def(archetype).is_some());

        let func = module.function_mut(fid);
        func.replace_all_result_uses_with_undef(open);
        func.erase_inst(open);
        module.reclaim_unresolved_local_archetype_definitions();
        assert!(module.unresolved_local_archetype_def(archetype).is_none());
    }

    #[test]
    fn primary_archetype_definitions_are_not_registered() {
        let mut module = Module::new();
        let proto = module.names.intern_protocol("Animal");
        let fname = module.names.intern("observe_primary");

        let sig = GenericSignature::new(vec![GenericParam::new(0, 0)], Vec::new());
        let primary = module.types.create_primary_environment(sig);
        let archetype = ArchetypeTy {
            env: primary,
            param: GenericParam::new(0, 0),
        };

        let mut func = Function::new(fname, primary);
        let entry = func.create_block();
        let existential = func.add_block_arg(entry, Ty::Existential(proto), Ownership::Guaranteed);
        {
            let mut b = InstBuilder::new(&mut func, entry);
            b.open_existential(existential, Ty::Archetype(archetype));
            b.unreachable();
        }
        module.add_function(func);
        assert!(module.unresolved_local_archetype_def(archetype).is_none());
    }
}
