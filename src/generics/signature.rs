// src/generics/signature.rs
//
// Generic signatures: ordered type parameters plus requirements over them.
// Signatures are immutable value types; extending one always builds a new
// signature rather than mutating in place.

use crate::generics::ty::Ty;
use crate::identity::ProtocolId;

/// An abstract generic parameter, identified by (depth, index).
///
/// Depths increase with nesting: a function's own declared parameters occupy
/// the lowest depths of its signature, and parameters introduced by captured
/// environments sit above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericParam {
    pub depth: u32,
    pub index: u32,
}

impl GenericParam {
    pub fn new(depth: u32, index: u32) -> Self {
        Self { depth, index }
    }
}

/// Layout constraint kinds. Carried structurally; this crate never solves
/// requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    Trivial,
    RefCounted,
}

/// A single requirement over the parameters of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirement {
    Conformance { subject: Ty, protocol: ProtocolId },
    SameType { lhs: Ty, rhs: Ty },
    Layout { subject: Ty, kind: LayoutKind },
}

/// An ordered set of generic parameters plus requirements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericSignature {
    params: Vec<GenericParam>,
    requirements: Vec<Requirement>,
}

impl GenericSignature {
    /// Build a signature. Parameters must be in canonical (depth, index)
    /// order; signatures are never reordered after construction.
    pub fn new(params: Vec<GenericParam>, requirements: Vec<Requirement>) -> Self {
        debug_assert!(
            params.windows(2).all(|w| w[0] < w[1]),
            "generic parameters must be in canonical (depth, index) order"
        );
        Self {
            params,
            requirements,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[GenericParam] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn has_param(&self, param: GenericParam) -> bool {
        self.params.binary_search(&param).is_ok()
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.params.last().map(|p| p.depth)
    }

    /// The depth a fresh nesting level would occupy.
    pub fn next_depth(&self) -> u32 {
        self.max_depth().map_or(0, |d| d + 1)
    }

    /// Parameters at the innermost (maximum) depth. For a captured
    /// environment's signature these are exactly the parameters that
    /// environment introduces.
    pub fn innermost_params(&self) -> &[GenericParam] {
        let Some(depth) = self.max_depth() else {
            return &[];
        };
        let start = self.params.partition_point(|p| p.depth < depth);
        &self.params[start..]
    }

    /// Abstract conformance protocols required of `param`, in requirement
    /// order.
    pub fn conformances_for(&self, param: GenericParam) -> impl Iterator<Item = ProtocolId> + '_ {
        self.requirements.iter().filter_map(move |req| match req {
            Requirement::Conformance { subject, protocol } if *subject == Ty::Param(param) => {
                Some(*protocol)
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_with_depths(depths: &[(u32, u32)]) -> GenericSignature {
        let params = depths
            .iter()
            .map(|&(d, i)| GenericParam::new(d, i))
            .collect();
        GenericSignature::new(params, Vec::new())
    }

    #[test]
    fn innermost_params_are_the_max_depth_suffix() {
        let sig = sig_with_depths(&[(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(
            sig.innermost_params(),
            &[GenericParam::new(1, 0), GenericParam::new(1, 1)]
        );
        assert_eq!(sig.next_depth(), 2);
    }

    #[test]
    fn empty_signature_has_no_innermost_params() {
        let sig = GenericSignature::empty();
        assert!(sig.innermost_params().is_empty());
        assert_eq!(sig.next_depth(), 0);
        assert_eq!(sig.max_depth(), None);
    }

    #[test]
    fn conformances_for_filters_by_subject() {
        let mut names = crate::identity::NameTable::new();
        let t = GenericParam::new(0, 0);
        let u = GenericParam::new(0, 1);
        let proto = names.intern_protocol("Stringable");
        let other = names.intern_protocol("Hashable");
        let sig = GenericSignature::new(
            vec![t, u],
            vec![
                Requirement::Conformance {
                    subject: Ty::Param(t),
                    protocol: proto,
                },
                Requirement::Conformance {
                    subject: Ty::Param(u),
                    protocol: other,
                },
            ],
        );
        assert_eq!(sig.conformances_for(t).collect::<Vec<_>>(), vec![proto]);
        assert_eq!(sig.conformances_for(u).collect::<Vec<_>>(), vec![other]);
    }
}
