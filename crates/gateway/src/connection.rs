//! Per-connection frame loop: one task per TCP connection,
//! stateless between frames — each line carries its own session token, so
//! nothing here survives past the response it produced.

use std::sync::Arc;

use dispatch::{map_adapter::MapAdapter, orchestrator::RequestOrchestrator, store::Store};
use model::error::WireStatus;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::{
    handlers,
    protocol::{self, ResponseFrame},
};

pub async fn handle<S, M>(stream: TcpStream, orchestrator: Arc<RequestOrchestrator<S, M>>)
where
    S: Store,
    M: MapAdapter,
{
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(why) => {
                log::warn!("connection {peer:?} read error: {why}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match protocol::parse_line(&line) {
            Ok(frame) => handlers::handle_frame(&orchestrator, frame).await,
            Err(why) => ResponseFrame::error(0, WireStatus::InvalidInput, why.to_string()),
        };

        if let Err(why) = writer.write_all(response.to_line().as_bytes()).await {
            log::warn!("connection {peer:?} write error: {why}");
            break;
        }
    }
}
