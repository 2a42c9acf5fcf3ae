use serde::{Deserialize, Serialize};

/// A physical receiver and the universes it owns, in the order given.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeDefinition {
    pub address: String,
    pub universes: Vec<u16>,
}

impl NodeDefinition {
    pub fn new(address: impl Into<String>, universes: Vec<u16>) -> Self {
        Self {
            address: address.into(),
            universes,
        }
    }
}
