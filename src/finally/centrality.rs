//! Centrality bookkeeping for one exploration branch

use std::collections::BTreeSet;

use crate::ir::SsaVarId;

/// Which outputs may differ between the finally body and a candidate copy, and
/// how freely comparison may start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CentralityState {
    allowable_outputs: BTreeSet<SsaVarId>,
    allows_central: bool,
    allows_non_starting_node: bool,
}

impl CentralityState {
    pub fn new(allows_central: bool, allows_non_starting_node: bool) -> Self {
        Self {
            allowable_outputs: BTreeSet::new(),
            allows_central,
            allows_non_starting_node,
        }
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = SsaVarId>) -> Self {
        self.allowable_outputs.extend(outputs);
        self
    }

    /// Independent copy for a forked branch
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Reconverging branches keep only what both allow
    pub fn merge(&mut self, other: &CentralityState) {
        self.allowable_outputs = self
            .allowable_outputs
            .intersection(&other.allowable_outputs)
            .copied()
            .collect();
        self.allows_central &= other.allows_central;
        self.allows_non_starting_node &= other.allows_non_starting_node;
    }

    pub fn add_allowable_output(&mut self, var: SsaVarId) {
        self.allowable_outputs.insert(var);
    }

    pub fn is_allowable_output(&self, var: SsaVarId) -> bool {
        self.allowable_outputs.contains(&var)
    }

    pub fn allowable_outputs(&self) -> &BTreeSet<SsaVarId> {
        &self.allowable_outputs
    }

    pub fn allows_central(&self) -> bool {
        self.allows_central
    }

    pub fn set_allows_central(&mut self, allows: bool) {
        self.allows_central = allows;
    }

    pub fn allows_non_starting_node(&self) -> bool {
        self.allows_non_starting_node
    }

    pub fn set_allows_non_starting_node(&mut self, allows: bool) {
        self.allows_non_starting_node = allows;
    }
}
