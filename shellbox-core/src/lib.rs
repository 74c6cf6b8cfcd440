//! Core types for the shellbox per-session command sandbox.
//!
//! Defines the domain types shared by the executor and the gateway:
//! session and environment identifiers, the environment state machine,
//! the multiplexed output framing, and execution results.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod demux;
pub mod environment;
pub mod error;
pub mod execution;
pub mod frame;
pub mod id;

pub use demux::{DemuxOutput, Demultiplexer, DEFAULT_OUTPUT_LIMIT};
pub use environment::{environment_name, EnvironmentStatus, NetworkMode, ResourceLimits};
pub use error::CoreError;
pub use execution::{trim_output, ExecutionResult};
pub use frame::{decode_frames, encode_frame, Frame, FrameDecoder, StreamKind};
pub use id::{EnvironmentId, ExecId, SessionId};
