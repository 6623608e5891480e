//! The concurrent accept loop.
//!
//! [`Server`] owns a [`Listener`], a factory producing a fresh [`Milter`] for
//! every accepted connection, and an optional set of panic handlers. Each
//! connection is driven to completion by [`crate::session::handle_connection`]
//! on its own task, so a slow or misbehaving session never blocks another.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use miltr_utils::{debug, error};

use crate::milter::Milter;
use crate::session;

/// How long to back off after a non-transient accept error, mirroring the
/// retry delay of the process this crate's accept loop is modeled on.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// Abstraction over the transport a [`Server`] accepts connections on.
///
/// Implemented for [`tokio::net::TcpListener`] and
/// [`tokio::net::UnixListener`]; implement it yourself to run over some other
/// bidirectional stream (e.g. TLS).
#[async_trait]
pub trait Listener: Send + Sync {
    /// The stream type produced for each accepted connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept a single incoming connection.
    ///
    /// # Errors
    /// Propagates whatever the underlying transport returns. Transient
    /// errors (the accept-queue momentarily empty, an interrupted syscall)
    /// are retried by the caller; anything else triggers a short backoff.
    async fn accept(&self) -> io::Result<Self::Stream>;
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = Compat<TcpStream>;

    async fn accept(&self) -> io::Result<Self::Stream> {
        let (stream, _peer) = Self::accept(self).await?;
        Ok(stream.compat())
    }
}

#[async_trait]
impl Listener for UnixListener {
    type Stream = Compat<UnixStream>;

    async fn accept(&self) -> io::Result<Self::Stream> {
        let (stream, _peer) = Self::accept(self).await?;
        Ok(stream.compat())
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// A handle to request a graceful shutdown of a running [`Server`].
///
/// Cloning is cheap; every clone controls the same server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    /// Stop accepting new connections.
    ///
    /// Sessions already in flight are left to finish; the corresponding
    /// [`Server::run`] future only resolves once they have all completed.
    pub fn close(&self) {
        self.shutdown.notify_waiters();
    }
}

/// The entry point to host a concurrent milter server.
///
/// Build one with [`Server::new`], register optional panic handlers with
/// [`Server::with_panic_handler`], then drive it with [`Server::run`].
pub struct Server<L, F> {
    listener: L,
    milter_factory: F,
    panic_handlers: Vec<Arc<dyn Fn(String) + Send + Sync>>,
    max_buffer_size: usize,
    shutdown: Arc<Notify>,
}

impl<L, M, F> Server<L, F>
where
    L: Listener,
    M: Milter + 'static,
    F: Fn() -> M + Send + Sync + 'static,
{
    /// Create a new server.
    ///
    /// `milter_factory` is called once per accepted connection to produce a
    /// fresh [`Milter`]; a session never shares its implementation with
    /// another session running concurrently.
    pub fn new(listener: L, milter_factory: F) -> Self {
        Self {
            listener,
            milter_factory,
            panic_handlers: Vec::new(),
            max_buffer_size: 2_usize.pow(16),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Override the maximum frame size accepted/emitted per session.
    /// Defaults to 64KiB.
    #[must_use]
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Register a panic handler.
    ///
    /// If at least one handler is registered, a session task that panics has
    /// its panic caught and reported to every registered handler as a
    /// message; the server keeps running. With no handlers registered (the
    /// default) a session panic is resumed on the task draining it, the same
    /// behavior as an unhandled panic anywhere else.
    #[must_use]
    pub fn with_panic_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(String) + Send + Sync + 'static,
    {
        self.panic_handlers.push(Arc::new(handler));
        self
    }

    /// Obtain a handle that can later be used to stop this server.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Run the accept loop until shut down via a [`ServerHandle`].
    ///
    /// # Errors
    /// Only returns an error if the listener itself cannot be polled at all;
    /// per-connection and accept errors are logged and retried.
    pub async fn run(self) -> io::Result<()>
    where
        M::Error: std::fmt::Debug,
    {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                () = self.shutdown.notified() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok(stream) => {
                            let mut milter = (self.milter_factory)();
                            let max_buffer_size = self.max_buffer_size;
                            sessions.spawn(async move {
                                session::handle_connection(stream, &mut milter, max_buffer_size).await
                            });
                        }
                        Err(err) if is_transient(&err) => continue,
                        Err(err) => {
                            error!("Failed to accept connection: {err}");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    self.handle_finished_session(finished);
                }
            }
        }

        while let Some(finished) = sessions.join_next().await {
            self.handle_finished_session(finished);
        }

        Ok(())
    }

    fn handle_finished_session(&self, result: Result<Result<(), crate::milter::Error<M::Error>>, JoinError>)
    where
        M::Error: std::fmt::Debug,
    {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("Session ended with an error: {err:?}"),
            Err(join_err) if join_err.is_panic() => {
                if self.panic_handlers.is_empty() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                let message = panic_message(&join_err);
                for handler in &self.panic_handlers {
                    handler(message.clone());
                }
            }
            Err(join_err) => debug!("Session task did not complete: {join_err}"),
        }
    }
}

fn panic_message(join_err: &JoinError) -> String {
    format!("{join_err}")
}
