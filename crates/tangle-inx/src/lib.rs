//! Node extension (INX) RPC gateway.
//!
//! Exposes the ledger to external extensions over a length-prefixed
//! postcard protocol on TCP:
//!
//! - [`InxServer`]: `ReadMilestone`, `ReadNodeStatus`, `ComputeWhiteFlag`
//!   and the two milestone streams, callable in-process or served with
//!   [`InxServer::serve`].
//! - [`InxClient`]: the matching client.
//! - [`stream_milestones`]: the per-call fan-out worker behind both
//!   streams.

mod client;
mod error;
mod materialize;
mod message;
mod server;
mod subscription;
pub mod transport;


pub use client::{InxClient, MilestoneStream};
pub use error::{InxError, StatusCode};
pub use materialize::{milestone_for_cached_milestone, milestone_for_index};
pub use message::{
    InxMilestone, InxRequest, InxResponse, MilestoneInfo, NodeStatus, WhiteFlagRequest,
    WhiteFlagResponse,
};
pub use server::InxServer;
pub use subscription::{MilestoneSink, stream_milestones};
