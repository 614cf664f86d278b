//! [`InxServer`]: the gateway operations and their TCP front end.

use std::net::SocketAddr;
use std::sync::Arc;

use tangle_engine::{ConfirmationKind, Tangle};
use tangle_types::MilestoneIndex;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::{InxError, StatusCode};
use crate::materialize::milestone_for_index;
use crate::message::{
    InxMilestone, InxRequest, InxResponse, NodeStatus, WhiteFlagRequest, WhiteFlagResponse,
};
use crate::subscription::{MilestoneSink, stream_milestones};
use crate::transport::{read_frame, write_frame};

/// The externally reachable service surface of the node.
///
/// Operations can be called directly (in-process) or served over TCP with
/// [`InxServer::serve`].
#[derive(Clone)]
pub struct InxServer {
    tangle: Arc<Tangle>,
}

impl InxServer {
    /// Create a server over `tangle`.
    pub fn new(tangle: Arc<Tangle>) -> Self {
        Self { tangle }
    }

    /// The tangle this server exposes.
    pub fn tangle(&self) -> &Arc<Tangle> {
        &self.tangle
    }

    // -------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------

    /// Read one confirmed milestone.
    ///
    /// Milestones above the confirmed index are reported as not found,
    /// even if already received.
    pub fn read_milestone(&self, index: MilestoneIndex) -> Result<InxMilestone, InxError> {
        let confirmed = self.tangle.confirmed_milestone_index();
        if index > confirmed {
            return Err(InxError::NotFound(format!(
                "milestone {index} not found (confirmed index is {confirmed})"
            )));
        }
        milestone_for_index(self.tangle.storage(), index)
    }

    /// Current sync status and milestone pointers.
    pub fn read_node_status(&self) -> NodeStatus {
        let status = self.tangle.sync_status();
        NodeStatus {
            is_synced: status.is_synced,
            latest_milestone_index: status.latest_milestone_index,
            confirmed_milestone_index: status.confirmed_milestone_index,
        }
    }

    /// Compute the merkle roots of a candidate milestone.
    pub async fn compute_white_flag(
        &self,
        request: WhiteFlagRequest,
    ) -> Result<WhiteFlagResponse, InxError> {
        let mutations = self
            .tangle
            .check_solidity_and_compute_white_flag_mutations(
                request.milestone_index,
                request.milestone_timestamp,
                request.parents,
                request.previous_milestone_id,
            )
            .await?;

        Ok(WhiteFlagResponse {
            confirmed_merkle_root: mutations.confirmed_merkle_root,
            applied_merkle_root: mutations.applied_merkle_root,
        })
    }

    /// Stream every newly received milestone into `sink` until `cancel`.
    pub async fn listen_to_latest_milestone<S>(
        &self,
        sink: S,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), InxError>
    where
        S: MilestoneSink + 'static,
    {
        stream_milestones(
            Arc::clone(&self.tangle),
            ConfirmationKind::LatestMilestoneChanged,
            sink,
            cancel,
        )
        .await
    }

    /// Stream every newly confirmed milestone into `sink` until `cancel`.
    pub async fn listen_to_confirmed_milestone<S>(
        &self,
        sink: S,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), InxError>
    where
        S: MilestoneSink + 'static,
    {
        stream_milestones(
            Arc::clone(&self.tangle),
            ConfirmationKind::ConfirmedMilestoneChanged,
            sink,
            cancel,
        )
        .await
    }

    // -------------------------------------------------------------------
    // TCP front end
    // -------------------------------------------------------------------

    /// Accept connections on `listener` until the node shuts down.
    pub async fn serve(self, listener: TcpListener) -> Result<(), InxError> {
        let mut shutdown = self.tangle.shutdown_signal();
        info!(addr = ?listener.local_addr().ok(), "INX server listening");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        info!("INX server stopped");
        Ok(())
    }

    /// Serve one client connection.
    ///
    /// Unary requests are answered in order. A listen request takes over
    /// the connection until the client closes its write side or the node
    /// shuts down.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "client connected");
        let (mut reader, mut writer) = stream.into_split();
        let mut shutdown = self.tangle.shutdown_signal();

        loop {
            let request: InxRequest = tokio::select! {
                _ = shutdown.changed() => break,
                frame = read_frame(&mut reader) => match frame {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%peer, error = %e, "failed to read request");
                        break;
                    }
                },
            };
            debug!(%peer, op = request.name(), "request received");

            let kind = match request {
                InxRequest::ListenToLatestMilestone => ConfirmationKind::LatestMilestoneChanged,
                InxRequest::ListenToConfirmedMilestone => {
                    ConfirmationKind::ConfirmedMilestoneChanged
                }
                unary => {
                    let op = unary.name();
                    let response = self.handle_unary(unary).await;
                    if let Err(e) = write_frame(&mut writer, &response).await {
                        warn!(%peer, op, error = %e, "failed to send response");
                        break;
                    }
                    continue;
                }
            };

            // The read half is only watched for the client hanging up from
            // here on.
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let watcher = tokio::spawn(async move {
                let mut buf = [0u8; 64];
                while let Ok(n) = reader.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
                let _ = cancel_tx.send(true);
            });

            let writer = Arc::new(Mutex::new(writer));
            let sink = FrameSink {
                writer: Arc::clone(&writer),
            };
            let result = match kind {
                ConfirmationKind::LatestMilestoneChanged => {
                    self.listen_to_latest_milestone(sink, cancel_rx).await
                }
                ConfirmationKind::ConfirmedMilestoneChanged => {
                    self.listen_to_confirmed_milestone(sink, cancel_rx).await
                }
            };
            watcher.abort();

            if let Err(e) = result {
                let response = InxResponse::Error {
                    code: e.code(),
                    message: e.message(),
                };
                let mut writer = writer.lock().await;
                if let Err(send_err) = write_frame(&mut *writer, &response).await {
                    debug!(%peer, error = %send_err, "could not report stream error");
                }
            }
            break;
        }

        debug!(%peer, "client disconnected");
    }

    async fn handle_unary(&self, request: InxRequest) -> InxResponse {
        let op = request.name();
        let result = match request {
            InxRequest::ReadMilestone { milestone_index } => self
                .read_milestone(milestone_index)
                .map(InxResponse::Milestone),
            InxRequest::ComputeWhiteFlag(req) => self
                .compute_white_flag(req)
                .await
                .map(InxResponse::WhiteFlag),
            InxRequest::ReadNodeStatus => Ok(InxResponse::NodeStatus(self.read_node_status())),
            InxRequest::ListenToLatestMilestone | InxRequest::ListenToConfirmedMilestone => {
                Err(InxError::InvalidArgument(format!("{op} is a streaming call")))
            }
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.code() == StatusCode::Internal {
                    error!(op, error = %e, "request failed");
                } else {
                    debug!(op, error = %e, "request failed");
                }
                InxResponse::Error {
                    code: e.code(),
                    message: format!("{op}: {}", e.message()),
                }
            }
        }
    }
}

/// Writes stream items as `Milestone` frames.
struct FrameSink {
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

#[async_trait::async_trait]
impl MilestoneSink for FrameSink {
    async fn send(&mut self, milestone: InxMilestone) -> Result<(), InxError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &InxResponse::Milestone(milestone)).await
    }
}
