//! Data types describing a computation: the circuit and which party provides / receives what.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named integer values, used both for the inputs of a party and for decoded outputs.
///
/// Values must be plain integers (JSON numbers without a fractional part).
pub type Values = BTreeMap<String, serde_json::Value>;

/// A boolean circuit in Bristol fashion together with the names of its inputs and outputs.
///
/// This is the format produced by circuit source compilers and can be deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    /// The circuit as Bristol fashion text.
    pub bristol: String,
    /// The named input and output wires of the circuit.
    pub info: CircuitInfo,
}

/// Maps the names of inputs and outputs to the first wire of the value in the circuit.
///
/// The tables are ordered maps, so the order in which they were built never matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInfo {
    /// Input name to the index of its first (most significant) wire.
    pub input_name_to_wire_index: BTreeMap<String, usize>,
    /// Output name to the index of its first (most significant) wire.
    pub output_name_to_wire_index: BTreeMap<String, usize>,
}

/// The inputs and outputs of a single party.
///
/// The position of a setting in the list of all settings is the index of the party in the
/// protocol, so all parties must agree on the same list in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySetting {
    /// The name used to address the party over the transport.
    pub name: String,
    /// The names of the circuit inputs provided by this party.
    pub inputs: Vec<String>,
    /// The names of the circuit outputs revealed to this party.
    pub outputs: Vec<String>,
}

impl PartySetting {
    /// Creates the setting for a party with the given inputs and outputs.
    pub fn new<I, O>(name: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            name: name.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}
