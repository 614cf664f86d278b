//! TCP client for the gateway.

use tangle_types::MilestoneIndex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::InxError;
use crate::message::{
    InxMilestone, InxRequest, InxResponse, NodeStatus, WhiteFlagRequest, WhiteFlagResponse,
};
use crate::transport::{read_frame, write_frame};

/// A connection to an [`InxServer`](crate::InxServer).
///
/// Unary calls can be issued one after another on the same connection.
/// A listen call consumes the client and turns it into a
/// [`MilestoneStream`].
pub struct InxClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl InxClient {
    /// Connect to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, InxError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    async fn call(&mut self, request: InxRequest) -> Result<InxResponse, InxError> {
        debug!(op = request.name(), "sending request");
        write_frame(&mut self.writer, &request).await?;
        match read_frame(&mut self.reader).await? {
            Some(InxResponse::Error { code, message }) => Err(InxError::Remote { code, message }),
            Some(response) => Ok(response),
            None => Err(InxError::ConnectionClosed),
        }
    }

    /// Read one confirmed milestone.
    pub async fn read_milestone(&mut self, index: MilestoneIndex) -> Result<InxMilestone, InxError> {
        match self
            .call(InxRequest::ReadMilestone {
                milestone_index: index,
            })
            .await?
        {
            InxResponse::Milestone(milestone) => Ok(milestone),
            other => Err(unexpected(&other)),
        }
    }

    /// Read sync status and milestone pointers.
    pub async fn read_node_status(&mut self) -> Result<NodeStatus, InxError> {
        match self.call(InxRequest::ReadNodeStatus).await? {
            InxResponse::NodeStatus(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    /// Compute the merkle roots of a candidate milestone.
    pub async fn compute_white_flag(
        &mut self,
        request: WhiteFlagRequest,
    ) -> Result<WhiteFlagResponse, InxError> {
        match self.call(InxRequest::ComputeWhiteFlag(request)).await? {
            InxResponse::WhiteFlag(response) => Ok(response),
            other => Err(unexpected(&other)),
        }
    }

    /// Stream every milestone the node receives from now on.
    pub async fn listen_to_latest_milestone(self) -> Result<MilestoneStream, InxError> {
        self.listen(InxRequest::ListenToLatestMilestone).await
    }

    /// Stream every milestone the node confirms from now on.
    pub async fn listen_to_confirmed_milestone(self) -> Result<MilestoneStream, InxError> {
        self.listen(InxRequest::ListenToConfirmedMilestone).await
    }

    async fn listen(mut self, request: InxRequest) -> Result<MilestoneStream, InxError> {
        debug!(op = request.name(), "opening stream");
        write_frame(&mut self.writer, &request).await?;
        Ok(MilestoneStream {
            reader: self.reader,
            writer: Some(self.writer),
        })
    }
}

fn unexpected(response: &InxResponse) -> InxError {
    InxError::UnexpectedResponse(format!("{response:?}"))
}

/// Receiving side of a listen call.
pub struct MilestoneStream {
    reader: OwnedReadHalf,
    writer: Option<OwnedWriteHalf>,
}

impl MilestoneStream {
    /// Next milestone, or `None` once the server ended the stream.
    ///
    /// An error frame from the server is returned as
    /// [`InxError::Remote`]; the stream is over after it.
    pub async fn next(&mut self) -> Option<Result<InxMilestone, InxError>> {
        match read_frame(&mut self.reader).await {
            Ok(Some(InxResponse::Milestone(milestone))) => Some(Ok(milestone)),
            Ok(Some(InxResponse::Error { code, message })) => {
                Some(Err(InxError::Remote { code, message }))
            }
            Ok(Some(other)) => Some(Err(unexpected(&other))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Cancel the stream. The server detaches the subscriber and closes
    /// the connection; frames already in flight can still be read.
    pub async fn close(&mut self) -> Result<(), InxError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
