// src/identity.rs
//
// Shared name interning for function, protocol, and nominal-type identities.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(u32);

impl NameId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Identity of a protocol declaration. Protocols are referenced by
/// conformance requirements and existential types; this crate never looks
/// inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(u32);

impl ProtocolId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: Vec<String>,
    name_lookup: FxHashMap<String, NameId>,
    protocols: Vec<String>,
    protocol_lookup: FxHashMap<String, ProtocolId>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(id) = self.name_lookup.get(name) {
            return *id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.name_lookup.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: NameId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn intern_protocol(&mut self, name: &str) -> ProtocolId {
        if let Some(id) = self.protocol_lookup.get(name) {
            return *id;
        }
        let id = ProtocolId(self.protocols.len() as u32);
        self.protocols.push(name.to_string());
        self.protocol_lookup.insert(name.to_string(), id);
        id
    }

    pub fn protocol_name(&self, id: ProtocolId) -> &str {
        &self.protocols[id.0 as usize]
    }
}
