//! A bridge between boolean circuits in [Bristol fashion](https://nigelsmart.github.io/MPC-Circuits/)
//! with named inputs and outputs, and a secure multi-party computation engine that only understands
//! a restricted circuit shape.
//!
//! Parties describe which named inputs they provide and which named outputs they receive. This
//! crate lowers the circuit into the shape the engine expects, encodes and decodes the named
//! integer values, makes sure all parties agree on the same setup before anything secret is
//! exchanged, and multiplexes the engine's byte channels over a single message transport.
//!
//! ## Main Components
//!
//! * [`compiler`]: The [`CircuitCompiler`], which validates the party settings against the circuit
//!   and lowers it to a [`LoweredCircuit`].
//! * [`session`]: The [`Session`] of a single party, which runs the setup handshake and the engine.
//! * [`engine`]: The [`Engine`] trait to plug in the secure computation engine.
//! * [`channel`]: The logical byte channels available to the engine.
//! * [`bristol`]: A parser for Bristol fashion circuits.
//!
//! ## Basic Usage
//!
//! Every party
//!
//! 1. compiles the same [`Circuit`] with the same list of [`PartySetting`]s,
//! 2. starts a [`Session`] with its own inputs, a [`Transport`] that delivers messages to the
//!    other parties and an [`Engine`],
//! 3. passes every message it receives to [`Session::handle_message`],
//! 4. awaits [`Session::output`].
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use mpc_bridge::{CircuitCompiler, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let compiler = Arc::new(CircuitCompiler::new(&circuit, &settings)?);
//! let transport = move |to: &str, msg: Vec<u8>| network.send(to, msg);
//! let session = Session::start(compiler, "alice", &inputs, transport, engine)?;
//!
//! // for every message received from the network:
//! session.handle_message(&from, &msg)?;
//!
//! let outputs = session.output().await?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bristol;
pub mod channel;
pub mod compiler;
pub mod engine;
pub mod lowered;
pub mod session;

mod codec;
mod data_types;
mod hash;

pub use channel::{Channel, ProtocolError};
pub use codec::EncodingError;
pub use compiler::{CircuitCompiler, CompileError, SettingsError};
pub use data_types::{Circuit, CircuitInfo, PartySetting, Values};
pub use engine::{Engine, EngineIo};
pub use hash::SetupHash;
pub use lowered::{LoweredCircuit, LoweredGate};
pub use session::{Session, SessionError, SessionState, Transport};
