//! Shared helpers for the in-crate tests.

use crate::host::{CommandExecutor, ExecutorError, HostControl};
use crate::protocol::{encode_frame, Packet};
use crate::session::ResponseSink;
use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames one packet the way a client would send it.
pub fn frame(packet: &Packet) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_frame(&packet.encode(), &mut buf);
    buf.to_vec()
}

pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) {
    writer.write_all(&frame(packet)).await.unwrap();
    writer.flush().await.unwrap();
}

pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Packet {
    let len = reader.read_i32_le().await.unwrap();
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.unwrap();
    Packet::decode(&body).unwrap().unwrap()
}

/// `echo <text>` writes `<text>`, `fail` errors, anything else is unknown.
pub struct EchoExecutor;

#[async_trait]
impl CommandExecutor for EchoExecutor {
    async fn execute(&self, sink: &mut ResponseSink, command: &str) -> Result<bool, ExecutorError> {
        match command.split_once(' ') {
            Some(("echo", text)) => {
                sink.send(text);
                Ok(true)
            }
            Some(("repeat", count)) => {
                let count: usize = count.parse().map_err(|_| ExecutorError::new("bad count"))?;
                sink.send("r".repeat(count));
                Ok(true)
            }
            _ if command == "fail" => Err(ExecutorError::new("executor failure")),
            _ => Ok(false),
        }
    }
}

/// Counts shutdown requests.
#[derive(Debug, Default)]
pub struct ShutdownCounter(AtomicUsize);

impl ShutdownCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl HostControl for ShutdownCounter {
    fn shutdown(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
