//! The interface to the secure computation engine that evaluates the lowered circuit.

use std::{fmt, future::Future, ops::RangeInclusive, sync::Arc};

use crate::{
    channel::{Channel, ProtocolError, Tag},
    lowered::LoweredCircuit,
    session::Shared,
};

/// A secure computation engine evaluating a [`LoweredCircuit`] among several parties.
///
/// The engine is started once all parties have agreed on the setup. It talks to the other parties
/// only through the [`EngineIo`] it is given and must return the bits of the output block (see
/// [`LoweredCircuit::first_output_wire`]) in wire order.
pub trait Engine: Send + Sync + 'static {
    /// The error that can occur while running the engine. Its `Display` form is reported as
    /// [`SessionError::Engine`](crate::SessionError::Engine).
    type Error: fmt::Display + fmt::Debug + Send;

    /// The numbers of parties the engine can handle.
    fn supported_parties(&self) -> RangeInclusive<usize> {
        2..=usize::MAX
    }

    /// Runs the computation as party `party` of `parties`.
    ///
    /// `inputs` holds the input bits of the local party only, `input_bits_per_party` the sizes
    /// of the input blocks of all parties in party order.
    fn run(
        &self,
        io: EngineIo,
        circuit: &LoweredCircuit,
        inputs: &[bool],
        input_bits_per_party: &[usize],
        party: usize,
        parties: usize,
    ) -> impl Future<Output = Result<Vec<bool>, Self::Error>> + Send;
}

/// Byte channels to the other parties of a session, handed to the [`Engine`].
///
/// Parties are addressed by their index in the settings.
#[derive(Clone)]
pub struct EngineIo {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for EngineIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineIo")
            .field("party", &self.party())
            .field("parties", &self.parties())
            .finish()
    }
}

impl EngineIo {
    /// The index of the local party.
    pub fn party(&self) -> usize {
        self.shared.party
    }

    /// The number of parties.
    pub fn parties(&self) -> usize {
        self.shared.names.len()
    }

    /// Sends bytes to another party on the given channel.
    ///
    /// Sending to an invalid index fails the whole session.
    pub fn send(&self, to: usize, channel: Channel, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.shared.check_peer(to)?;
        self.shared.send_tagged(to, Tag::Engine(channel), bytes);
        Ok(())
    }

    /// Receives exactly `len` bytes from another party on the given channel, waiting until they
    /// have arrived.
    ///
    /// Receiving from an invalid index fails the whole session.
    pub async fn recv(
        &self,
        from: usize,
        channel: Channel,
        len: usize,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.shared.check_peer(from)?;
        Ok(self.shared.demux.pop(from, Tag::Engine(channel), len).await)
    }
}
