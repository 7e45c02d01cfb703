//! The circuit in the shape expected by the engine: only AND, XOR and INV gates, inputs grouped by
//! party at the lowest wires and all outputs in one block at the highest wires.

use std::fmt;

use crate::codec::EncodingError;

/// A gate of the lowered circuit, `(inputs.., output)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweredGate<W = usize> {
    /// `output = left & right`
    And(W, W, W),
    /// `output = left ^ right`
    Xor(W, W, W),
    /// `output = !input`
    Inv(W, W),
}

impl<W: Copy> LoweredGate<W> {
    pub(crate) fn map<V>(self, f: impl Fn(W) -> V) -> LoweredGate<V> {
        match self {
            LoweredGate::And(x, y, z) => LoweredGate::And(f(x), f(y), f(z)),
            LoweredGate::Xor(x, y, z) => LoweredGate::Xor(f(x), f(y), f(z)),
            LoweredGate::Inv(x, z) => LoweredGate::Inv(f(x), f(z)),
        }
    }
}

impl fmt::Display for LoweredGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoweredGate::And(x, y, z) => write!(f, "2 1 {x} {y} {z} AND"),
            LoweredGate::Xor(x, y, z) => write!(f, "2 1 {x} {y} {z} XOR"),
            LoweredGate::Inv(x, z) => write!(f, "1 1 {x} {z} INV"),
        }
    }
}

/// A circuit that only uses AND, XOR and INV gates.
///
/// Wires `0..input_bits()` are the inputs, grouped by party in party order, and the last
/// `output_bits()` wires are the outputs. Its [`Display`](fmt::Display) implementation renders
/// the text format read by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredCircuit {
    pub(crate) gates: Vec<LoweredGate>,
    pub(crate) wire_count: usize,
    pub(crate) input_bits_per_party: Vec<usize>,
    pub(crate) output_bits: usize,
}

impl LoweredCircuit {
    /// The gates in evaluation order.
    pub fn gates(&self) -> &[LoweredGate] {
        &self.gates
    }

    /// The total number of wires.
    pub fn wire_count(&self) -> usize {
        self.wire_count
    }

    /// The number of input bits of each party, in party order.
    pub fn input_bits_per_party(&self) -> &[usize] {
        &self.input_bits_per_party
    }

    /// The number of input bits of all parties.
    pub fn input_bits(&self) -> usize {
        self.input_bits_per_party.iter().sum()
    }

    /// The number of output bits.
    pub fn output_bits(&self) -> usize {
        self.output_bits
    }

    /// The first wire of the output block.
    pub fn first_output_wire(&self) -> usize {
        self.wire_count - self.output_bits
    }

    /// Returns the number of AND gates, which dominate the cost of a secure evaluation.
    pub fn and_gates(&self) -> usize {
        self.gates
            .iter()
            .filter(|g| matches!(g, LoweredGate::And(..)))
            .count()
    }

    /// Evaluates the circuit in plaintext on the concatenated inputs of all parties and returns
    /// the output block.
    pub fn eval(&self, inputs: &[bool]) -> Result<Vec<bool>, EncodingError> {
        if inputs.len() != self.input_bits() {
            return Err(EncodingError::WrongBitCount {
                expected: self.input_bits(),
                actual: inputs.len(),
            });
        }
        let mut wires = vec![false; self.wire_count];
        wires[..inputs.len()].copy_from_slice(inputs);
        for gate in self.gates.iter() {
            match *gate {
                LoweredGate::And(x, y, z) => wires[z] = wires[x] & wires[y],
                LoweredGate::Xor(x, y, z) => wires[z] = wires[x] ^ wires[y],
                LoweredGate::Inv(x, z) => wires[z] = !wires[x],
            }
        }
        Ok(wires.split_off(self.first_output_wire()))
    }
}

impl fmt::Display for LoweredCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.gates.len(), self.wire_count)?;
        match self.input_bits_per_party[..] {
            [a, b] => writeln!(f, "{a} {b} {}", self.output_bits)?,
            // the second slot is only meaningful for two parties, the per party widths are
            // handed to the engine separately
            _ => writeln!(f, "{} 0 {}", self.input_bits(), self.output_bits)?,
        }
        for gate in self.gates.iter() {
            write!(f, "\n{gate}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_adder() -> LoweredCircuit {
        LoweredCircuit {
            gates: vec![LoweredGate::Xor(0, 1, 2), LoweredGate::And(0, 1, 3)],
            wire_count: 4,
            input_bits_per_party: vec![1, 1],
            output_bits: 2,
        }
    }

    #[test]
    fn renders_two_party_header() {
        assert_eq!(
            half_adder().to_string(),
            "2 4\n1 1 2\n\n2 1 0 1 2 XOR\n2 1 0 1 3 AND"
        );
    }

    #[test]
    fn renders_multi_party_header() {
        let circuit = LoweredCircuit {
            gates: vec![LoweredGate::Inv(2, 3)],
            wire_count: 4,
            input_bits_per_party: vec![1, 1, 1],
            output_bits: 1,
        };
        assert_eq!(circuit.to_string(), "1 4\n3 0 1\n\n1 1 2 3 INV");
    }

    #[test]
    fn evaluates_output_block() -> Result<(), EncodingError> {
        let circuit = half_adder();
        assert_eq!(circuit.eval(&[true, true])?, vec![false, true]);
        assert_eq!(circuit.eval(&[true, false])?, vec![true, false]);
        assert_eq!(circuit.and_gates(), 1);
        assert!(circuit.eval(&[true]).is_err());
        Ok(())
    }
}
