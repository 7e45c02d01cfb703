//! Wire allocation for the lowering pass.
//!
//! Output wires must end up in one block at the very end of the circuit, but the size of that
//! block is only known once all gates have been lowered. Output wires are therefore handed out as
//! [`OutputTicket`]s from their own counting space and resolved to final indices afterwards.

use crate::lowered::LoweredGate;

/// A wire of the lowered circuit while the circuit is still being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireRef {
    /// A wire whose final index is already known (inputs and intermediate wires).
    Final(usize),
    /// An output wire, placed in the output block once its size is known.
    Pending(OutputTicket),
}

/// The n-th output wire allocated during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutputTicket(usize);

/// Whether a lowered wire belongs to the output block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireKind {
    Normal,
    Output,
}

#[derive(Debug)]
pub(crate) struct WireAllocator {
    input_bits: usize,
    next_normal: usize,
    outputs: usize,
}

impl WireAllocator {
    /// Starts allocating right after the input block.
    pub(crate) fn new(input_bits: usize) -> Self {
        Self {
            input_bits,
            next_normal: input_bits,
            outputs: 0,
        }
    }

    pub(crate) fn alloc(&mut self, kind: WireKind) -> WireRef {
        match kind {
            WireKind::Normal => self.normal(),
            WireKind::Output => self.output(),
        }
    }

    pub(crate) fn normal(&mut self) -> WireRef {
        let w = WireRef::Final(self.next_normal);
        self.next_normal += 1;
        w
    }

    pub(crate) fn output(&mut self) -> WireRef {
        let w = WireRef::Pending(OutputTicket(self.outputs));
        self.outputs += 1;
        w
    }

    /// An existing input wire, if the circuit has any inputs.
    pub(crate) fn any_input(&self) -> Option<WireRef> {
        (self.input_bits > 0).then_some(WireRef::Final(0))
    }

    pub(crate) fn output_count(&self) -> usize {
        self.outputs
    }

    /// Fixes the position of the output block.
    pub(crate) fn finish(self) -> Resolution {
        Resolution {
            first_output: self.next_normal,
            outputs: self.outputs,
        }
    }
}

/// Maps [`WireRef`]s to their final indices, outputs are placed in allocation order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolution {
    first_output: usize,
    outputs: usize,
}

impl Resolution {
    pub(crate) fn resolve(&self, w: WireRef) -> usize {
        match w {
            WireRef::Final(w) => w,
            WireRef::Pending(OutputTicket(t)) => self.first_output + t,
        }
    }

    pub(crate) fn wire_count(&self) -> usize {
        self.first_output + self.outputs
    }
}

/// Constant wires materialized on demand while lowering.
#[derive(Debug, Default)]
pub(crate) struct ConstantPool {
    zero: Option<WireRef>,
}

impl ConstantPool {
    /// Remembers `w` as the zero wire, unless one is already known.
    pub(crate) fn offer_zero(&mut self, w: WireRef) {
        self.zero.get_or_insert(w);
    }

    /// Returns the zero wire, emitting `x ^ x` into `gates` the first time it is needed.
    pub(crate) fn zero(
        &mut self,
        alloc: &mut WireAllocator,
        gates: &mut Vec<LoweredGate<WireRef>>,
    ) -> WireRef {
        if let Some(zero) = self.zero {
            return zero;
        }
        let source = match alloc.any_input() {
            Some(w) => w,
            None => alloc.normal(),
        };
        let zero = alloc.normal();
        gates.push(LoweredGate::Xor(source, source, zero));
        self.zero = Some(zero);
        zero
    }
}
