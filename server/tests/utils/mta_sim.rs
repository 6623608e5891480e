//! A minimal in-memory MTA simulator, driving a milter session over a
//! `tokio::io::duplex` pair instead of a real postfix + swaks pair.

use bytes::{BufMut, BytesMut};
use miltr_common::decoding::ServerCommand;
use miltr_common::encoding::Writable;
use miltr_server::{Error, Milter};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::compat::TokioAsyncReadCompatExt;

const BUFFER_SIZE: usize = 64 * 1024;

/// Drives the client-facing half of a simulated milter connection; the
/// server-facing half runs [`miltr_server::handle_connection`] on a
/// background task.
pub struct MtaSim {
    stream: DuplexStream,
}

impl MtaSim {
    /// Spawn `milter` on a background task wired up to a fresh simulated
    /// connection.
    pub fn spawn<M>(mut milter: M) -> (Self, tokio::task::JoinHandle<Result<(), Error<M::Error>>>)
    where
        M: Milter + Send + 'static,
    {
        let (client, server) = tokio::io::duplex(BUFFER_SIZE);
        let handle = tokio::spawn(async move {
            miltr_server::handle_connection(server.compat(), &mut milter, BUFFER_SIZE).await
        });
        (Self { stream: client }, handle)
    }

    /// Write a single command frame to the milter server.
    pub async fn send<W: Writable>(&mut self, command: &W) {
        let mut payload = BytesMut::new();
        command.write(&mut payload);

        let frame_len = 1 + payload.len();
        let mut frame = BytesMut::with_capacity(4 + frame_len);
        frame.put_u32(frame_len as u32);
        frame.put_u8(command.code());
        frame.extend_from_slice(&payload);

        self.stream
            .write_all(&frame)
            .await
            .expect("writing to the simulated connection failed");
    }

    /// Read back a single response frame, decoded as a [`ServerCommand`].
    ///
    /// Panics if the connection closes before a full frame arrives.
    pub async fn recv(&mut self) -> ServerCommand {
        let mut len_bytes = [0u8; 4];
        self.stream
            .read_exact(&mut len_bytes)
            .await
            .expect("connection closed before a response frame arrived");
        let len = u32::from_be_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .expect("connection closed mid-frame");

        ServerCommand::parse(BytesMut::from(&payload[..])).expect("malformed response frame")
    }

    /// Close the client's half, signalling EOF to the server loop.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
