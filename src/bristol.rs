//! Parser for boolean circuits in [Bristol fashion](https://nigelsmart.github.io/MPC-Circuits/).
//!
//! The parser only checks the text itself (header consistency, arity, wire ranges). Whether the
//! gates are in a topological order is checked later, while the circuit is being lowered.

use std::str::FromStr;

/// A malformed circuit description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid circuit at line {line}: {reason}")]
pub struct FormatError {
    /// The 1-based line of the circuit text that caused the error.
    pub line: usize,
    /// A human readable description of the problem.
    pub reason: String,
}

impl FormatError {
    pub(crate) fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// A gate of a parsed circuit, referring to wires in the original numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// `output = left & right`
    And {
        /// First operand.
        left: usize,
        /// Second operand.
        right: usize,
        /// Wire written by the gate.
        output: usize,
    },
    /// `output = left ^ right`
    Xor {
        /// First operand.
        left: usize,
        /// Second operand.
        right: usize,
        /// Wire written by the gate.
        output: usize,
    },
    /// `output = left | right`
    Or {
        /// First operand.
        left: usize,
        /// Second operand.
        right: usize,
        /// Wire written by the gate.
        output: usize,
    },
    /// `output = !input`
    Not {
        /// Operand.
        input: usize,
        /// Wire written by the gate.
        output: usize,
    },
    /// `output = input`
    Copy {
        /// Operand.
        input: usize,
        /// Wire written by the gate.
        output: usize,
    },
}

impl Gate {
    /// The wire written by this gate.
    pub fn output(&self) -> usize {
        match *self {
            Gate::And { output, .. }
            | Gate::Xor { output, .. }
            | Gate::Or { output, .. }
            | Gate::Not { output, .. }
            | Gate::Copy { output, .. } => output,
        }
    }
}

/// A gate together with the line it was declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedGate {
    /// The 1-based line of the gate in the circuit text.
    pub line: usize,
    /// The gate itself.
    pub gate: Gate,
}

/// A circuit as described by the Bristol fashion header and gate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BristolCircuit {
    /// Number of wires, every wire index is in `0..wire_count`.
    pub wire_count: usize,
    /// Bit width of each input value, in order of the input wires.
    pub input_widths: Vec<usize>,
    /// Bit width of each output value, in order of the output wires.
    pub output_widths: Vec<usize>,
    /// The gates in emission order.
    pub gates: Vec<ParsedGate>,
    /// The lines of the header: wire count, input widths and output widths.
    pub(crate) header_lines: [usize; 3],
}

impl BristolCircuit {
    /// The sum of all input widths.
    pub fn input_bits(&self) -> usize {
        self.input_widths.iter().sum()
    }

    /// The sum of all output widths.
    pub fn output_bits(&self) -> usize {
        self.output_widths.iter().sum()
    }
}

impl FromStr for BristolCircuit {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a circuit in Bristol fashion.
///
/// Blank lines and surrounding whitespace are ignored. The text must contain exactly as many
/// gate lines as announced in the header.
pub fn parse(text: &str) -> Result<BristolCircuit, FormatError> {
    let end = text.lines().count().max(1);
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (first_line, header) = lines
        .next()
        .ok_or_else(|| FormatError::new(end, "missing header `<gates> <wires>`"))?;
    let header = tokens::<usize>(first_line, header)?;
    let [gate_count, wire_count] = header[..] else {
        return Err(FormatError::new(
            first_line,
            format!("expected `<gates> <wires>`, found {} numbers", header.len()),
        ));
    };

    let (input_line, inputs) = lines
        .next()
        .ok_or_else(|| FormatError::new(end, "missing input widths"))?;
    let input_widths = widths(input_line, inputs, "input")?;
    let (output_line, outputs) = lines
        .next()
        .ok_or_else(|| FormatError::new(end, "missing output widths"))?;
    let output_widths = widths(output_line, outputs, "output")?;

    let mut gates = vec![];
    for (line, text) in lines {
        if gates.len() == gate_count {
            return Err(FormatError::new(
                line,
                format!("expected {gate_count} gates, found more"),
            ));
        }
        let gate = parse_gate(line, text, wire_count)?;
        gates.push(ParsedGate { line, gate });
    }
    if gates.len() != gate_count {
        return Err(FormatError::new(
            end,
            format!("expected {gate_count} gates, found {}", gates.len()),
        ));
    }

    Ok(BristolCircuit {
        wire_count,
        input_widths,
        output_widths,
        gates,
        header_lines: [first_line, input_line, output_line],
    })
}

fn tokens<T: FromStr>(line: usize, text: &str) -> Result<Vec<T>, FormatError> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| FormatError::new(line, format!("`{token}` is not a number")))
        })
        .collect()
}

fn widths(line: usize, text: &str, kind: &str) -> Result<Vec<usize>, FormatError> {
    let nums = tokens::<usize>(line, text)?;
    let Some((&count, widths)) = nums.split_first() else {
        return Err(FormatError::new(line, format!("missing number of {kind}s")));
    };
    if widths.len() != count {
        return Err(FormatError::new(
            line,
            format!(
                "expected {count} {kind} widths, found {}",
                widths.len()
            ),
        ));
    }
    Ok(widths.to_vec())
}

fn parse_gate(line: usize, text: &str, wire_count: usize) -> Result<Gate, FormatError> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some((kind, nums)) = parts.split_last() else {
        return Err(FormatError::new(line, "empty gate"));
    };
    if nums.len() < 2 {
        return Err(FormatError::new(line, format!("incomplete gate `{text}`")));
    }
    let n_in = nums[0]
        .parse::<usize>()
        .map_err(|_| FormatError::new(line, format!("`{}` is not a number", nums[0])))?;
    let n_out = nums[1]
        .parse::<usize>()
        .map_err(|_| FormatError::new(line, format!("`{}` is not a number", nums[1])))?;
    let wires = tokens::<usize>(line, &nums[2..].join(" "))?;
    if wires.len() != n_in.saturating_add(n_out) {
        return Err(FormatError::new(
            line,
            format!(
                "gate declares {n_in} inputs and {n_out} outputs, but lists {} wires",
                wires.len()
            ),
        ));
    }
    if let Some(w) = wires.iter().find(|w| **w >= wire_count) {
        return Err(FormatError::new(
            line,
            format!("wire {w} is out of range, the circuit has {wire_count} wires"),
        ));
    }

    let gate = match (*kind, n_in, n_out) {
        ("AND", 2, 1) => Gate::And {
            left: wires[0],
            right: wires[1],
            output: wires[2],
        },
        ("XOR", 2, 1) => Gate::Xor {
            left: wires[0],
            right: wires[1],
            output: wires[2],
        },
        ("OR", 2, 1) => Gate::Or {
            left: wires[0],
            right: wires[1],
            output: wires[2],
        },
        ("NOT", 1, 1) => Gate::Not {
            input: wires[0],
            output: wires[1],
        },
        ("COPY", 1, 1) => Gate::Copy {
            input: wires[0],
            output: wires[1],
        },
        ("AND" | "XOR" | "OR", _, _) => {
            return Err(FormatError::new(
                line,
                format!("{kind} expects 2 inputs and 1 output, found {n_in} and {n_out}"),
            ));
        }
        ("NOT" | "COPY", _, _) => {
            return Err(FormatError::new(
                line,
                format!("{kind} expects 1 input and 1 output, found {n_in} and {n_out}"),
            ));
        }
        _ => {
            return Err(FormatError::new(
                line,
                format!("unsupported gate type `{kind}`"),
            ));
        }
    };
    Ok(gate)
}
