use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tracing::{debug, error};

use crate::{
    protocol::{self, ProtocolError},
    session::{DebugSession, SessionState},
};

/// Serves one debug session over a byte stream pair
pub struct DapServer {
    session: DebugSession,
}

impl DapServer {
    pub fn new(session: DebugSession) -> Self {
        Self { session }
    }

    /// Runs until the session finishes or the client closes the input stream
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is not valid DAP framing
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<SessionState, ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let handle = self.session.start();
        let requests = handle.requests;
        let mut outgoing = handle.outgoing;

        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            let mut seq: i64 = 1;
            while let Some(message) = outgoing.recv().await {
                let value = match message.to_json(seq) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Failed to serialize DAP message {message:?}: {e}");
                        continue;
                    }
                };
                if let Err(e) = protocol::write_message(&mut writer, &value).await {
                    error!("Failed to write DAP message: {e}");
                    break;
                }
                seq += 1;
            }
        });

        let read_result = loop {
            match protocol::read_message(&mut reader).await {
                Ok(Some(req)) => {
                    if requests.send(req).is_err() {
                        // the session finished after a disconnect
                        break Ok(());
                    }
                }
                Ok(None) => {
                    debug!("Client closed the input stream");
                    break Ok(());
                }
                Err(e) => {
                    error!("DAP server error: {e}");
                    break Err(e);
                }
            }
        };
        drop(requests);

        let state = handle.task.await.unwrap_or(SessionState::Terminated);
        // the writer drains once the session drops its sender
        let _ = writer_task.await;

        read_result.map(|()| state)
    }
}
