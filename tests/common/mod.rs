#![allow(dead_code)]

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use mpc_bridge::{
    Channel, Circuit, CircuitCompiler, CircuitInfo, Engine, EngineIo, EncodingError,
    LoweredCircuit, ProtocolError, Session, SessionError, Values,
};
use tokio::{sync::mpsc, time::timeout};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

pub fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// Builds Bristol circuits gate by gate. Values are most significant bit first, so bit `0` of a
/// value is its most significant bit.
#[derive(Debug, Default)]
pub struct BristolBuilder {
    wires: usize,
    gates: Vec<String>,
    inputs: Vec<(String, usize, usize)>,
}

impl BristolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the next input value, must be called before any gate is added.
    pub fn input(&mut self, name: &str, width: usize) -> Vec<usize> {
        assert!(self.gates.is_empty());
        let first = self.wires;
        self.wires += width;
        self.inputs.push((name.to_string(), first, width));
        (first..first + width).collect()
    }

    fn gate(&mut self, kind: &str, inputs: &[usize]) -> usize {
        let out = self.wires;
        self.wires += 1;
        let wires: Vec<String> = inputs.iter().map(|w| w.to_string()).collect();
        self.gates.push(format!(
            "{} 1 {} {out} {kind}",
            inputs.len(),
            wires.join(" ")
        ));
        out
    }

    pub fn and(&mut self, a: usize, b: usize) -> usize {
        self.gate("AND", &[a, b])
    }

    pub fn xor(&mut self, a: usize, b: usize) -> usize {
        self.gate("XOR", &[a, b])
    }

    pub fn or(&mut self, a: usize, b: usize) -> usize {
        self.gate("OR", &[a, b])
    }

    pub fn not(&mut self, a: usize) -> usize {
        self.gate("NOT", &[a])
    }

    pub fn copy(&mut self, a: usize) -> usize {
        self.gate("COPY", &[a])
    }

    /// `a + b` modulo `2^n`, both MSB first.
    pub fn add(&mut self, a: &[usize], b: &[usize]) -> Vec<usize> {
        assert_eq!(a.len(), b.len());
        let n = a.len();
        let mut sum = vec![0; n];
        let mut carry: Option<usize> = None;
        for i in (0..n).rev() {
            let t = self.xor(a[i], b[i]);
            sum[i] = match carry {
                None => t,
                Some(c) => self.xor(t, c),
            };
            if i > 0 {
                let both = self.and(a[i], b[i]);
                carry = Some(match carry {
                    None => both,
                    Some(c) => {
                        let propagated = self.and(c, t);
                        self.or(both, propagated)
                    }
                });
            }
        }
        sum
    }

    /// `a * b` modulo `2^n`, both MSB first.
    pub fn mul(&mut self, a: &[usize], b: &[usize]) -> Vec<usize> {
        assert_eq!(a.len(), b.len());
        let n = a.len();
        // least significant bit first from here on
        let a_lsb: Vec<usize> = a.iter().rev().copied().collect();
        let b_lsb: Vec<usize> = b.iter().rev().copied().collect();
        let mut acc: Vec<usize> = a_lsb.iter().map(|&x| self.and(x, b_lsb[0])).collect();
        for i in 1..n {
            let partial: Vec<usize> = (i..n).map(|j| self.and(a_lsb[j - i], b_lsb[i])).collect();
            let upper: Vec<usize> = acc[i..].iter().rev().copied().collect();
            let partial: Vec<usize> = partial.into_iter().rev().collect();
            let sum = self.add(&upper, &partial);
            for (k, w) in sum.into_iter().rev().enumerate() {
                acc[i + k] = w;
            }
        }
        acc.into_iter().rev().collect()
    }

    /// `max(a, b)` of unsigned values, both MSB first.
    pub fn max(&mut self, a: &[usize], b: &[usize]) -> Vec<usize> {
        assert_eq!(a.len(), b.len());
        let n = a.len();
        // carry out of b + !a + 1 is set iff b >= a
        let mut carry = None;
        for i in (0..n).rev() {
            let not_a = self.not(a[i]);
            carry = Some(match carry {
                None => self.or(b[i], not_a),
                Some(c) => {
                    let t = self.xor(b[i], not_a);
                    let both = self.and(b[i], not_a);
                    let propagated = self.and(c, t);
                    self.or(both, propagated)
                }
            });
        }
        let b_ge_a = carry.expect("values must have at least one bit");
        let a_gt_b = self.not(b_ge_a);
        (0..n)
            .map(|i| {
                let diff = self.xor(a[i], b[i]);
                let pick = self.and(a_gt_b, diff);
                self.xor(b[i], pick)
            })
            .collect()
    }

    /// Finishes the circuit. Outputs that are not already the last wires are copied there.
    pub fn build(mut self, outputs: &[(&str, Vec<usize>)]) -> Circuit {
        let all: Vec<usize> = outputs.iter().flat_map(|(_, w)| w.iter().copied()).collect();
        let first = self.wires - all.len().min(self.wires);
        let in_place = all.iter().copied().eq(first..self.wires);
        let mut output_name_to_wire_index = BTreeMap::new();
        let mut widths = vec![];
        let mut next = first;
        for (name, wires) in outputs {
            let start = if in_place {
                next
            } else {
                let copies: Vec<usize> = wires.iter().map(|w| self.copy(*w)).collect();
                copies.first().copied().unwrap_or(self.wires)
            };
            next += wires.len();
            output_name_to_wire_index.insert(name.to_string(), start);
            widths.push(wires.len().to_string());
        }
        let input_widths: Vec<String> = self.inputs.iter().map(|i| i.2.to_string()).collect();
        let bristol = format!(
            "{} {}\n{} {}\n{} {}\n\n{}\n",
            self.gates.len(),
            self.wires,
            self.inputs.len(),
            input_widths.join(" "),
            outputs.len(),
            widths.join(" "),
            self.gates.join("\n"),
        );
        Circuit {
            bristol,
            info: CircuitInfo {
                input_name_to_wire_index: self
                    .inputs
                    .into_iter()
                    .map(|(name, first, _)| (name, first))
                    .collect(),
                output_name_to_wire_index,
            },
        }
    }
}

pub fn values<const N: usize>(entries: [(&str, u64); N]) -> Values {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.into()))
        .collect()
}

/// Evaluates the lowered circuit by exchanging all inputs in the clear.
///
/// Inputs are sent on channel A in two messages per peer, the outputs are cross-checked on
/// channel B.
pub struct PlaintextEngine;

#[derive(Debug)]
pub enum PlaintextError {
    Protocol(ProtocolError),
    Encoding(EncodingError),
    OutputMismatch { peer: usize },
}

impl fmt::Display for PlaintextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "{e}"),
            Self::Encoding(e) => write!(f, "{e}"),
            Self::OutputMismatch { peer } => write!(f, "outputs differ from party {peer}"),
        }
    }
}

impl From<ProtocolError> for PlaintextError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<EncodingError> for PlaintextError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

fn to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.iter().map(|b| *b as u8).collect()
}

impl Engine for PlaintextEngine {
    type Error = PlaintextError;

    async fn run(
        &self,
        io: EngineIo,
        circuit: &LoweredCircuit,
        inputs: &[bool],
        input_bits_per_party: &[usize],
        party: usize,
        parties: usize,
    ) -> Result<Vec<bool>, Self::Error> {
        let peers: Vec<usize> = (0..parties).filter(|p| *p != party).collect();
        let (head, tail) = inputs.split_at(inputs.len() / 2);
        for &p in peers.iter() {
            io.send(p, Channel::A, &to_bytes(head))?;
            io.send(p, Channel::A, &to_bytes(tail))?;
        }
        let mut all = Vec::with_capacity(circuit.input_bits());
        for (p, bits) in input_bits_per_party.iter().enumerate() {
            if p == party {
                all.extend_from_slice(inputs);
            } else {
                let bytes = io.recv(p, Channel::A, *bits).await?;
                all.extend(bytes.iter().map(|b| *b == 1));
            }
        }
        let outputs = circuit.eval(&all)?;
        for &p in peers.iter() {
            io.send(p, Channel::B, &to_bytes(&outputs))?;
        }
        for &p in peers.iter() {
            let theirs = io.recv(p, Channel::B, outputs.len()).await?;
            if theirs != to_bytes(&outputs) {
                return Err(PlaintextError::OutputMismatch { peer: p });
            }
        }
        Ok(outputs)
    }
}

/// Runs one session per party over an in-memory network and returns their outputs.
pub async fn run_parties(
    compilers: Vec<Arc<CircuitCompiler>>,
    inputs: Vec<Values>,
) -> Vec<Result<Values, SessionError>> {
    let names: Vec<String> = compilers[0]
        .settings()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, String, Vec<u8>)>();
    let mut sessions = vec![];
    for ((name, compiler), inputs) in names.iter().zip(compilers).zip(inputs) {
        let tx = tx.clone();
        let from = name.clone();
        let transport = move |to: &str, msg: Vec<u8>| {
            let _ = tx.send((from.clone(), to.to_string(), msg));
        };
        let session = Session::start(compiler, name, &inputs, transport, PlaintextEngine)
            .expect("session should start");
        sessions.push(session);
    }
    let sessions = Arc::new(sessions);
    let router = tokio::spawn({
        let sessions = Arc::clone(&sessions);
        let names = names.clone();
        async move {
            while let Some((from, to, msg)) = rx.recv().await {
                let to = names.iter().position(|n| *n == to).expect("unknown receiver");
                sessions[to]
                    .handle_message(&from, &msg)
                    .expect("valid message");
            }
        }
    });
    let mut results = vec![];
    for session in sessions.iter() {
        let result = timeout(Duration::from_secs(30), session.output())
            .await
            .expect("session did not finish");
        results.push(result);
    }
    router.abort();
    results
}
