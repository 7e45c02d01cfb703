//! A single secure computation run by the local party.
//!
//! A [`Session`] first sends the [`SetupHash`] to every other party and checks the hashes it
//! receives back. Only if all of them match, the [`Engine`] is started. Messages from the other
//! parties are fed in through [`Session::handle_message`] and delivered to whichever step of the
//! session is waiting for them.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{FutureExt, future::try_join_all};
use tokio::{sync::watch, task::AbortHandle};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelDemux, ProtocolError, Tag},
    codec::EncodingError,
    compiler::{CircuitCompiler, SettingsError},
    data_types::Values,
    engine::{Engine, EngineIo},
    hash::SetupHash,
};


/// Delivers messages to the other parties.
///
/// Sending is fire-and-forget, the transport is responsible for delivering the messages in order.
pub trait Transport: Send + Sync + 'static {
    /// Sends `msg` to the party with the given name.
    fn send(&self, to: &str, msg: Vec<u8>);
}

impl<F> Transport for F
where
    F: Fn(&str, Vec<u8>) + Send + Sync + 'static,
{
    fn send(&self, to: &str, msg: Vec<u8>) {
        self(to, msg)
    }
}

/// The progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session has been created but nothing was sent yet.
    Created,
    /// The setup hash was sent to all other parties.
    HandshakeSent,
    /// The setup hashes of all other parties match the local one.
    HandshakeVerified,
    /// The engine is running.
    Computing,
    /// The output is available.
    Done,
    /// The session failed, see [`Session::output`] for the reason.
    Failed,
}

impl SessionState {
    fn is_final(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Errors that end a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session could not be set up for the local party.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The inputs or outputs could not be converted.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// Another party sent a malformed message, or the engine misused its channels.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Another party uses a different circuit or different settings.
    #[error(
        "the setup hash of party `{peer}` does not match, all parties must use the same circuit \
         and settings"
    )]
    SetupMismatch {
        /// The party whose hash did not match.
        peer: String,
    },
    /// The engine returned an error or panicked.
    #[error("engine error: {0}")]
    Engine(String),
    /// The session was stopped before it produced an output.
    #[error("the session was stopped before it produced an output")]
    Stopped,
}

type Settled = Option<Result<Values, SessionError>>;

/// State shared between the session handle, its worker task and the engine.
pub(crate) struct Shared {
    pub(crate) party: usize,
    pub(crate) names: Vec<String>,
    pub(crate) demux: ChannelDemux,
    transport: Box<dyn Transport>,
    state: Mutex<SessionState>,
    result: watch::Sender<Settled>,
}

impl Shared {
    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.names.len()).filter(|p| *p != self.party)
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *state;
        if current.is_final() {
            return;
        }
        debug!(party = self.party, from = ?current, to = ?next, "session state");
        *state = next;
    }

    /// Stores the result of the session, unless one was already stored.
    fn settle(&self, result: Result<Values, SessionError>) {
        let next = match &result {
            Ok(_) => SessionState::Done,
            Err(_) => SessionState::Failed,
        };
        let party = self.party;
        // the state changes before any waiter on the result is woken up
        self.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            match &result {
                Ok(_) => info!(party, "session finished"),
                Err(e) => warn!(party, "session failed: {e}"),
            }
            self.transition(next);
            *slot = Some(result);
            true
        });
    }

    /// Fails the session if `peer` is not another party.
    pub(crate) fn check_peer(&self, peer: usize) -> Result<(), ProtocolError> {
        if peer < self.names.len() && peer != self.party {
            Ok(())
        } else {
            let e = ProtocolError::InvalidParty(peer);
            self.settle(Err(e.clone().into()));
            Err(e)
        }
    }

    pub(crate) fn send_tagged(&self, to: usize, tag: Tag, bytes: &[u8]) {
        let mut msg = Vec::with_capacity(bytes.len() + 1);
        msg.push(tag.byte());
        msg.extend_from_slice(bytes);
        self.transport.send(&self.names[to], msg);
    }

    fn receive(&self, from: &str, msg: &[u8]) -> Result<(), ProtocolError> {
        let peer = self
            .names
            .iter()
            .position(|name| name == from)
            .filter(|p| *p != self.party)
            .ok_or_else(|| ProtocolError::UnknownPeer(from.to_string()))?;
        let (&tag, payload) = msg
            .split_first()
            .ok_or_else(|| ProtocolError::EmptyMessage(from.to_string()))?;
        let tag = Tag::from_byte(tag).ok_or_else(|| ProtocolError::UnknownChannel {
            from: from.to_string(),
            tag,
        })?;
        self.demux.push(peer, tag, payload);
        Ok(())
    }
}

/// Settles the session as stopped if the worker is dropped without a result, e.g. when it is
/// aborted or the engine panics.
struct StopGuard(Arc<Shared>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.settle(Err(SessionError::Stopped));
    }
}

/// A running computation of the local party.
///
/// Dropping the session stops it.
pub struct Session {
    shared: Arc<Shared>,
    worker: AbortHandle,
}

impl Session {
    /// Starts the session of party `name` with its `inputs`.
    ///
    /// Inputs are checked and encoded before anything is sent, so errors in the local inputs are
    /// reported here instead of failing the session later. The session runs in a background task.
    ///
    /// # Panics
    /// - If called outside of a tokio runtime.
    pub fn start<E: Engine>(
        compiler: Arc<CircuitCompiler>,
        name: &str,
        inputs: &Values,
        transport: impl Transport,
        engine: E,
    ) -> Result<Self, SessionError> {
        let parties = compiler.settings().len();
        let supported = engine.supported_parties();
        if !supported.contains(&parties) {
            return Err(SettingsError::UnsupportedPartyCount {
                parties,
                min: *supported.start(),
                max: *supported.end(),
            }
            .into());
        }
        let party = compiler
            .party_index(name)
            .ok_or_else(|| SettingsError::UnknownParty(name.to_string()))?;
        let inputs = compiler.encode_input(name, inputs)?;

        let shared = Arc::new(Shared {
            party,
            names: compiler.settings().iter().map(|s| s.name.clone()).collect(),
            demux: ChannelDemux::new(parties),
            transport: Box::new(transport),
            state: Mutex::new(SessionState::Created),
            result: watch::Sender::new(None),
        });
        info!(party, parties, name, "starting session");
        let guard = StopGuard(Arc::clone(&shared));
        let worker = tokio::spawn(run(guard, compiler, inputs, engine));
        Ok(Self {
            shared,
            worker: worker.abort_handle(),
        })
    }

    /// The index of the local party.
    pub fn party(&self) -> usize {
        self.shared.party
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Hands a message received from party `from` to the session.
    ///
    /// A message that does not come from another party of the session, or that is not tagged
    /// with a known channel, fails the session. Messages that arrive before anyone is waiting for
    /// them are kept until they are read.
    pub fn handle_message(&self, from: &str, msg: &[u8]) -> Result<(), ProtocolError> {
        self.shared.receive(from, msg).inspect_err(|e| {
            self.shared.settle(Err(e.clone().into()));
            self.worker.abort();
        })
    }

    /// Waits for the outputs revealed to the local party.
    pub async fn output(&self) -> Result<Values, SessionError> {
        let mut result = self.shared.result.subscribe();
        let settled = result
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::Stopped)?;
        (*settled).clone().unwrap_or(Err(SessionError::Stopped))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("party", &self.shared.party)
            .field("names", &self.shared.names)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run<E: Engine>(
    guard: StopGuard,
    compiler: Arc<CircuitCompiler>,
    inputs: Vec<bool>,
    engine: E,
) {
    let shared = &guard.0;
    let result = execute(shared, &compiler, &inputs, &engine).await;
    shared.settle(result);
}

async fn execute<E: Engine>(
    shared: &Arc<Shared>,
    compiler: &CircuitCompiler,
    inputs: &[bool],
    engine: &E,
) -> Result<Values, SessionError> {
    let hash = compiler.setup_hash();
    for peer in shared.peers() {
        shared.send_tagged(peer, Tag::Setup, hash.as_bytes());
    }
    shared.transition(SessionState::HandshakeSent);

    try_join_all(shared.peers().map(|peer| async move {
        let theirs = shared.demux.pop(peer, Tag::Setup, SetupHash::LEN).await;
        if hash.matches(&theirs) {
            debug!(party = shared.party, peer, "setup hash matches");
            Ok(())
        } else {
            Err(SessionError::SetupMismatch {
                peer: shared.names[peer].clone(),
            })
        }
    }))
    .await?;
    shared.transition(SessionState::HandshakeVerified);

    let lowered = compiler.lowered();
    let party = shared.party;
    let parties = shared.names.len();
    shared.transition(SessionState::Computing);
    info!(
        party,
        gates = lowered.gates().len(),
        and_gates = lowered.and_gates(),
        "running engine"
    );
    let io = EngineIo {
        shared: Arc::clone(shared),
    };
    let bits = AssertUnwindSafe(engine.run(
        io,
        lowered,
        inputs,
        lowered.input_bits_per_party(),
        party,
        parties,
    ))
    .catch_unwind()
    .await
    .map_err(|panic| {
        SessionError::Engine(format!("engine panicked: {}", panic_message(&*panic)))
    })?
    .map_err(|e| SessionError::Engine(e.to_string()))?;

    let mut outputs = compiler.decode_output(&bits)?;
    let revealed = &compiler.settings()[party].outputs;
    outputs.retain(|name, _| revealed.contains(name));
    Ok(outputs)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
