//! Conversion between named integer values and the bits fed into / read from the circuit.
//!
//! All values are encoded most significant bit first, at the fixed width declared in the
//! circuit header. Values that do not fit are truncated to the width, negative values are
//! encoded in two's complement.

use serde_json::Value;

/// Errors while encoding inputs or decoding outputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// No party with the given name exists.
    #[error("unknown party `{0}`")]
    UnknownParty(String),
    /// A declared input of the party was not provided.
    #[error("party `{party}` did not provide input `{name}`")]
    MissingInput {
        /// The party providing the inputs.
        party: String,
        /// The missing input.
        name: String,
    },
    /// An input was provided that the party did not declare.
    #[error("party `{party}` provided undeclared input `{name}`")]
    UnexpectedInput {
        /// The party providing the inputs.
        party: String,
        /// The undeclared input.
        name: String,
    },
    /// An input value is not a plain integer.
    #[error("input `{name}` must be an integer, found {value}")]
    NotAnInteger {
        /// The name of the input.
        name: String,
        /// The offending value.
        value: String,
    },
    /// The number of bits does not match the circuit.
    #[error("expected {expected} bits, found {actual}")]
    WrongBitCount {
        /// The number of bits expected by the circuit.
        expected: usize,
        /// The number of bits provided.
        actual: usize,
    },
    /// Inputs were provided for the wrong number of parties.
    #[error("expected inputs of {expected} parties, found {actual}")]
    WrongPartyCount {
        /// The number of parties in the settings.
        expected: usize,
        /// The number of input sets provided.
        actual: usize,
    },
    /// A wire of an output value was never written by the circuit.
    #[error("output `{name}` reads wire {wire}, which is not part of the output block")]
    UnmappedOutputWire {
        /// The name of the output.
        name: String,
        /// The original index of the wire.
        wire: usize,
    },
    /// An output value does not fit into 64 bits.
    #[error("output `{0}` does not fit into 64 bits")]
    OutputOverflow(String),
}

/// Encodes an integer value as `width` bits, most significant bit first.
pub(crate) fn encode_value(
    name: &str,
    value: &Value,
    width: usize,
) -> Result<Vec<bool>, EncodingError> {
    let int = integer(value).ok_or_else(|| EncodingError::NotAnInteger {
        name: name.to_string(),
        value: value.to_string(),
    })?;
    Ok((0..width)
        .map(|i| {
            let shift = width - 1 - i;
            if shift >= i128::BITS as usize {
                int < 0
            } else {
                (int >> shift) & 1 == 1
            }
        })
        .collect())
}

/// Decodes bits (most significant first) into an unsigned integer.
pub(crate) fn decode_value(
    name: &str,
    bits: impl IntoIterator<Item = bool>,
) -> Result<u64, EncodingError> {
    let mut value: u64 = 0;
    for bit in bits {
        if value >> 63 != 0 {
            return Err(EncodingError::OutputOverflow(name.to_string()));
        }
        value = (value << 1) | bit as u64;
    }
    Ok(value)
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        _ => None,
    }
}
