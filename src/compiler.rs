//! Lowers a Bristol circuit and the party settings into the circuit shape the engine expects.
//!
//! The lowered circuit
//!
//! - places the inputs of each party in one contiguous block, parties in settings order and the
//!   values of a party ordered by their original wire index,
//! - places all outputs in one block at the end of the wire range,
//! - only uses AND, XOR and INV gates (OR is rewritten using De Morgan, COPY becomes an alias or
//!   an XOR with a zero wire).
//!
//! Besides lowering, the compiler keeps the layout needed to turn named input values into bits and
//! output bits back into named values.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::{
    bristol::{self, FormatError, Gate, ParsedGate},
    codec::{EncodingError, decode_value, encode_value},
    data_types::{Circuit, PartySetting, Values},
    hash::SetupHash,
    lowered::{LoweredCircuit, LoweredGate},
};

mod wires;

use wires::{ConstantPool, WireAllocator, WireKind, WireRef};

/// Errors while compiling a circuit for a set of parties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The circuit text is malformed.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The settings do not fit the circuit.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Party settings that are inconsistent with each other or with the circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A computation needs at least two parties.
    #[error("at least 2 parties are required, found {0}")]
    TooFewParties(usize),
    /// Two parties share the same name.
    #[error("party `{0}` is listed more than once")]
    DuplicateParty(String),
    /// A party does not exist.
    #[error("unknown party `{0}`")]
    UnknownParty(String),
    /// A party declares an input that the circuit does not have.
    #[error("party `{party}` declares input `{name}`, which the circuit does not have")]
    UnknownInput {
        /// The declaring party.
        party: String,
        /// The unknown input.
        name: String,
    },
    /// An input is declared more than once, by one party or by several.
    #[error("input `{0}` is declared more than once")]
    DuplicateInput(String),
    /// An input of the circuit is not provided by any party.
    #[error("input `{0}` is not provided by any party")]
    UnassignedInput(String),
    /// A party declares an output that the circuit does not have.
    #[error("party `{party}` declares output `{name}`, which the circuit does not have")]
    UnknownOutput {
        /// The declaring party.
        party: String,
        /// The unknown output.
        name: String,
    },
    /// An output of the circuit is not revealed to any party.
    #[error("output `{0}` is not revealed to any party")]
    UndeclaredOutput(String),
    /// The engine cannot run with this many parties.
    #[error("the engine supports {min} to {max} parties, found {parties}")]
    UnsupportedPartyCount {
        /// The number of parties in the settings.
        parties: usize,
        /// The minimum supported by the engine.
        min: usize,
        /// The maximum supported by the engine.
        max: usize,
    },
    /// The settings could not be serialized for hashing.
    #[error("could not serialize the setup: {0}")]
    Serialization(String),
}

/// An output value and where its bits end up in the output block.
#[derive(Debug, Clone)]
struct OutputLayout {
    name: String,
    wire: usize,
    /// Positions relative to the start of the output block, `None` if the wire was never written
    /// as an output.
    positions: Vec<Option<usize>>,
}

/// A circuit lowered for a fixed list of parties.
///
/// Compiling is deterministic, so all parties compiling the same circuit and settings get the same
/// lowered circuit and the same [`SetupHash`].
#[derive(Debug, Clone)]
pub struct CircuitCompiler {
    settings: Vec<PartySetting>,
    lowered: LoweredCircuit,
    setup_hash: SetupHash,
    /// Per party, its inputs ordered by original wire index, with their widths.
    inputs: Vec<Vec<(String, usize)>>,
    outputs: Vec<OutputLayout>,
    wire_map: Vec<Option<usize>>,
}

impl CircuitCompiler {
    /// Validates `settings` against `circuit` and lowers the circuit.
    pub fn new(circuit: &Circuit, settings: &[PartySetting]) -> Result<Self, CompileError> {
        let bristol = bristol::parse(&circuit.bristol)?;
        check_settings(circuit, settings)?;
        let [_, input_line, output_line] = bristol.header_lines;
        let info = &circuit.info;

        let input_widths = widths_by_rank(
            &info.input_name_to_wire_index,
            &bristol.input_widths,
            input_line,
            "input",
        )?;
        let output_widths = widths_by_rank(
            &info.output_name_to_wire_index,
            &bristol.output_widths,
            output_line,
            "output",
        )?;

        let mut wire_map: Vec<Option<WireRef>> = vec![None; bristol.wire_count];
        let mut inputs = Vec::with_capacity(settings.len());
        let mut input_bits_per_party = Vec::with_capacity(settings.len());
        let mut next_input = 0;
        for setting in settings.iter() {
            let mut declared: Vec<(&str, usize)> = setting
                .inputs
                .iter()
                .map(|name| (name.as_str(), info.input_name_to_wire_index[name]))
                .collect();
            declared.sort_by_key(|(name, wire)| (*wire, *name));
            let mut layout = Vec::with_capacity(declared.len());
            let mut bits = 0;
            for (name, wire) in declared {
                let width = input_widths[name];
                for old in wire..wire.saturating_add(width) {
                    let slot = wire_map.get_mut(old).ok_or_else(|| {
                        FormatError::new(
                            input_line,
                            format!("input `{name}` extends beyond wire {}", bristol.wire_count),
                        )
                    })?;
                    if slot.is_some() {
                        return Err(FormatError::new(
                            input_line,
                            format!("input `{name}` overlaps another input at wire {old}"),
                        )
                        .into());
                    }
                    *slot = Some(WireRef::Final(next_input));
                    next_input += 1;
                }
                bits += width;
                layout.push((name.to_string(), width));
            }
            inputs.push(layout);
            input_bits_per_party.push(bits);
        }

        let first_output = info
            .output_name_to_wire_index
            .values()
            .copied()
            .min()
            .unwrap_or(bristol.wire_count);

        let mut alloc = WireAllocator::new(next_input);
        let mut constants = ConstantPool::default();
        let mut gates: Vec<LoweredGate<WireRef>> = Vec::with_capacity(bristol.gates.len());
        let mut seen_output = false;
        for &ParsedGate { line, gate } in bristol.gates.iter() {
            let kind = if gate.output() < first_output {
                WireKind::Normal
            } else {
                WireKind::Output
            };
            match kind {
                WireKind::Output => seen_output = true,
                WireKind::Normal if seen_output => {
                    return Err(FormatError::new(
                        line,
                        format!(
                            "gate writes wire {}, but an earlier gate already wrote an output wire",
                            gate.output()
                        ),
                    )
                    .into());
                }
                WireKind::Normal => {}
            }
            let operand = |wire: usize| {
                wire_map[wire].ok_or_else(|| {
                    FormatError::new(line, format!("wire {wire} is read before it is written"))
                })
            };
            let written = match gate {
                Gate::And { left, right, .. } => {
                    let (x, y) = (operand(left)?, operand(right)?);
                    let z = alloc.alloc(kind);
                    gates.push(LoweredGate::And(x, y, z));
                    z
                }
                Gate::Xor { left, right, .. } => {
                    let (x, y) = (operand(left)?, operand(right)?);
                    let z = alloc.alloc(kind);
                    gates.push(LoweredGate::Xor(x, y, z));
                    if x == y {
                        constants.offer_zero(z);
                    }
                    z
                }
                Gate::Not { input, .. } => {
                    let x = operand(input)?;
                    let z = alloc.alloc(kind);
                    gates.push(LoweredGate::Inv(x, z));
                    z
                }
                Gate::Or { left, right, .. } => {
                    // x | y = !(!x & !y)
                    let (x, y) = (operand(left)?, operand(right)?);
                    let not_x = alloc.normal();
                    let not_y = alloc.normal();
                    let and = alloc.normal();
                    let z = alloc.alloc(kind);
                    gates.extend([
                        LoweredGate::Inv(x, not_x),
                        LoweredGate::Inv(y, not_y),
                        LoweredGate::And(not_x, not_y, and),
                        LoweredGate::Inv(and, z),
                    ]);
                    z
                }
                Gate::Copy { input, .. } => {
                    let x = operand(input)?;
                    match kind {
                        WireKind::Normal => x,
                        WireKind::Output => {
                            let zero = constants.zero(&mut alloc, &mut gates);
                            let z = alloc.output();
                            gates.push(LoweredGate::Xor(x, zero, z));
                            z
                        }
                    }
                }
            };
            wire_map[gate.output()] = Some(written);
        }

        let output_bits = bristol.output_bits();
        if alloc.output_count() != output_bits {
            return Err(FormatError::new(
                output_line,
                format!(
                    "the header declares {output_bits} output bits, but gates write {} output wires",
                    alloc.output_count()
                ),
            )
            .into());
        }

        let resolution = alloc.finish();
        let gates: Vec<LoweredGate> = gates
            .into_iter()
            .map(|g| g.map(|w| resolution.resolve(w)))
            .collect();
        let wire_map: Vec<Option<usize>> = wire_map
            .into_iter()
            .map(|w| w.map(|w| resolution.resolve(w)))
            .collect();
        let lowered = LoweredCircuit {
            gates,
            wire_count: resolution.wire_count(),
            input_bits_per_party,
            output_bits,
        };

        let first_output_wire = lowered.first_output_wire();
        let mut outputs: Vec<OutputLayout> = info
            .output_name_to_wire_index
            .iter()
            .map(|(name, wire)| {
                let width = output_widths[name.as_str()];
                let positions = (*wire..wire.saturating_add(width))
                    .map(|old| {
                        wire_map
                            .get(old)
                            .copied()
                            .flatten()
                            .and_then(|new| new.checked_sub(first_output_wire))
                            .filter(|pos| *pos < output_bits)
                    })
                    .collect();
                OutputLayout {
                    name: name.clone(),
                    wire: *wire,
                    positions,
                }
            })
            .collect();
        outputs.sort_by_key(|o| o.wire);

        let setup_hash = SetupHash::new(circuit, settings)
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;

        debug!(
            parties = settings.len(),
            gates = lowered.gates.len(),
            and_gates = lowered.and_gates(),
            wires = lowered.wire_count,
            input_bits = lowered.input_bits(),
            output_bits,
            "compiled circuit"
        );

        Ok(Self {
            settings: settings.to_vec(),
            lowered,
            setup_hash,
            inputs,
            outputs,
            wire_map,
        })
    }

    /// The lowered circuit.
    pub fn lowered(&self) -> &LoweredCircuit {
        &self.lowered
    }

    /// The number of input bits of each party, in party order.
    pub fn input_bits_per_party(&self) -> &[usize] {
        self.lowered.input_bits_per_party()
    }

    /// The settings of all parties, in party order.
    pub fn settings(&self) -> &[PartySetting] {
        &self.settings
    }

    /// The hash of the circuit and settings that all parties must agree on.
    pub fn setup_hash(&self) -> SetupHash {
        self.setup_hash
    }

    /// The index of the party with the given name.
    pub fn party_index(&self, name: &str) -> Option<usize> {
        self.settings.iter().position(|s| s.name == name)
    }

    /// The lowered index of a wire of the original circuit, `None` for wires that are never
    /// written or only aliased away.
    pub fn new_wire(&self, old: usize) -> Option<usize> {
        self.wire_map.get(old).copied().flatten()
    }

    /// Encodes the inputs of `party` into the bits of its input block.
    ///
    /// Exactly the inputs declared by the party must be provided.
    pub fn encode_input(&self, party: &str, values: &Values) -> Result<Vec<bool>, EncodingError> {
        let index = self
            .party_index(party)
            .ok_or_else(|| EncodingError::UnknownParty(party.to_string()))?;
        let layout = &self.inputs[index];
        if let Some(name) = values
            .keys()
            .find(|name| !layout.iter().any(|(declared, _)| declared == *name))
        {
            return Err(EncodingError::UnexpectedInput {
                party: party.to_string(),
                name: name.clone(),
            });
        }
        let mut bits = Vec::with_capacity(self.lowered.input_bits_per_party[index]);
        for (name, width) in layout.iter() {
            let value = values
                .get(name)
                .ok_or_else(|| EncodingError::MissingInput {
                    party: party.to_string(),
                    name: name.clone(),
                })?;
            bits.extend(encode_value(name, value, *width)?);
        }
        Ok(bits)
    }

    /// Decodes the output block into all named outputs of the circuit.
    ///
    /// Outputs are decoded as unsigned 64-bit integers. An output wider than 64 bits only decodes
    /// if all of its bits above the lowest 64 are unset, otherwise this fails with
    /// [`EncodingError::OutputOverflow`].
    pub fn decode_output(&self, bits: &[bool]) -> Result<Values, EncodingError> {
        if bits.len() != self.lowered.output_bits {
            return Err(EncodingError::WrongBitCount {
                expected: self.lowered.output_bits,
                actual: bits.len(),
            });
        }
        let mut values = BTreeMap::new();
        for output in self.outputs.iter() {
            let mut value_bits = Vec::with_capacity(output.positions.len());
            for (i, pos) in output.positions.iter().enumerate() {
                let pos = pos.ok_or_else(|| EncodingError::UnmappedOutputWire {
                    name: output.name.clone(),
                    wire: output.wire + i,
                })?;
                value_bits.push(bits[pos]);
            }
            let value = decode_value(&output.name, value_bits)?;
            values.insert(output.name.clone(), Value::from(value));
        }
        Ok(values)
    }

    /// Evaluates the lowered circuit in plaintext, given the inputs of all parties in party order.
    pub fn eval(&self, inputs: &[Values]) -> Result<Values, EncodingError> {
        if inputs.len() != self.settings.len() {
            return Err(EncodingError::WrongPartyCount {
                expected: self.settings.len(),
                actual: inputs.len(),
            });
        }
        let mut bits = Vec::with_capacity(self.lowered.input_bits());
        for (setting, values) in self.settings.iter().zip(inputs) {
            bits.extend(self.encode_input(&setting.name, values)?);
        }
        let outputs = self.lowered.eval(&bits)?;
        self.decode_output(&outputs)
    }
}

fn check_settings(circuit: &Circuit, settings: &[PartySetting]) -> Result<(), SettingsError> {
    if settings.len() < 2 {
        return Err(SettingsError::TooFewParties(settings.len()));
    }
    let info = &circuit.info;
    let mut names = BTreeSet::new();
    let mut inputs = BTreeSet::new();
    let mut outputs = BTreeSet::new();
    for setting in settings.iter() {
        if !names.insert(setting.name.as_str()) {
            return Err(SettingsError::DuplicateParty(setting.name.clone()));
        }
        for name in setting.inputs.iter() {
            if !info.input_name_to_wire_index.contains_key(name) {
                return Err(SettingsError::UnknownInput {
                    party: setting.name.clone(),
                    name: name.clone(),
                });
            }
            if !inputs.insert(name.as_str()) {
                return Err(SettingsError::DuplicateInput(name.clone()));
            }
        }
        for name in setting.outputs.iter() {
            if !info.output_name_to_wire_index.contains_key(name) {
                return Err(SettingsError::UnknownOutput {
                    party: setting.name.clone(),
                    name: name.clone(),
                });
            }
            outputs.insert(name.as_str());
        }
    }
    if let Some(name) = info
        .input_name_to_wire_index
        .keys()
        .find(|name| !inputs.contains(name.as_str()))
    {
        return Err(SettingsError::UnassignedInput(name.clone()));
    }
    if let Some(name) = info
        .output_name_to_wire_index
        .keys()
        .find(|name| !outputs.contains(name.as_str()))
    {
        return Err(SettingsError::UndeclaredOutput(name.clone()));
    }
    Ok(())
}

/// Assigns the header widths to the named values, in order of their first wire.
fn widths_by_rank<'a>(
    names: &'a BTreeMap<String, usize>,
    widths: &[usize],
    line: usize,
    kind: &str,
) -> Result<HashMap<&'a str, usize>, FormatError> {
    if names.len() != widths.len() {
        return Err(FormatError::new(
            line,
            format!(
                "the header declares {} {kind}s, but {} {kind} names are given",
                widths.len(),
                names.len()
            ),
        ));
    }
    let mut ranked: Vec<(&str, usize)> = names.iter().map(|(n, w)| (n.as_str(), *w)).collect();
    ranked.sort_by_key(|(name, wire)| (*wire, *name));
    Ok(ranked
        .into_iter()
        .zip(widths.iter().copied())
        .map(|((name, _), width)| (name, width))
        .collect())
}
