use std::io;

use async_trait::async_trait;
use thiserror::Error;

use miltr_common::{
    actions::{Action, Continue},
    commands::{Connect, Header, Helo, Macro, Unknown},
    modifications::ModificationResponse,
    optneg::OptNeg,
    ProtocolError,
};

use crate::headers::HeaderMap;

/// A trait to implement a working milter server.
///
/// See examples on how to implement this. Every method is defaulted to a
/// trivial `Continue`/no-op, so a minimal implementation only needs to
/// override the handful of stages it actually cares about.
#[async_trait]
pub trait Milter: Send {
    /// A user error that might be returned handling this milter communication
    type Error: Send;

    /// Option negotiation for the connection between the miter client and server.
    #[doc(alias = "SMFIC_OPTNEG")]
    #[doc(alias = "xxfi_negotiate")]
    async fn option_negotiation(&mut self, theirs: OptNeg) -> Result<OptNeg, Error<Self::Error>> {
        let ours = OptNeg::default();
        let ours = ours
            .merge_compatible(&theirs)
            .map_err(ProtocolError::CompatibilityError)?;
        Ok(ours)
    }

    /// Called at the start of a connection, and again at the start of every
    /// mail (on `SMFIC_MAIL`) and whenever the current mail is aborted (on
    /// `SMFIC_ABORT`, with the same `mail_id` as before).
    ///
    /// Implementors owning accumulated per-mail state (headers seen so far,
    /// body bytes collected, recipients gathered) should reset it here.
    #[doc(alias = "SMFIC_ABORT")]
    #[doc(alias = "SMFIC_MAIL")]
    async fn init(&mut self, _session_id: &str, _mail_id: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called once, when the connection to the milter client is closing.
    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A macro sent by the milter client.
    #[doc(alias = "SMFIC_MACRO")]
    async fn macro_(&mut self, _macro: Macro) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Connection information about the smtp connection.
    #[doc(alias = "SMFIC_CONNECT")]
    #[doc(alias = "xxfi_connect")]
    async fn connect(&mut self, _connect_info: Connect) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// The helo name sent by the smtp client.
    #[doc(alias = "SMFIC_HELO")]
    #[doc(alias = "xxfi_helo")]
    async fn helo(&mut self, _helo: Helo) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// The sender this email is from.
    #[doc(alias = "SMFIC_MAIL")]
    #[doc(alias = "xxfi_envfrom")]
    async fn mail_from(&mut self, _sender: &str) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// A recipient to which this mail is to be transmitted to.
    ///
    /// `recipient` has already had its surrounding `<>` stripped and been
    /// lowercased, mirroring `mail_from`.
    #[doc(alias = "SMFIC_RCPT")]
    #[doc(alias = "xxfi_envrcpt")]
    async fn rcpt_to(&mut self, _recipient: &str) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// A single header with it's name and value.
    ///
    /// Header names are not unique and might be received multiple times.
    #[doc(alias = "SMFIC_HEADER")]
    #[doc(alias = "xxfi_header")]
    async fn header(&mut self, _header: Header) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// Called after all headers have been sent, with the accumulated headers
    /// of the current mail.
    #[doc(alias = "SMFIC_EOH")]
    #[doc(alias = "xxfi_eoh")]
    async fn headers(&mut self, _headers: &HeaderMap) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// A body chunk was received.
    ///
    /// This may be called multiple times until the whole body was transmitted.
    #[doc(alias = "SMFIC_BODY")]
    #[doc(alias = "xxfi_body")]
    async fn body_chunk(&mut self, _chunk: &[u8]) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// Called after all body parts have been received.
    ///
    /// This is the only stage at which to respond with modifications
    /// to the milter client.
    #[doc(alias = "SMFIC_BODYEOB")]
    #[doc(alias = "xxfi_eom")]
    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        Ok(ModificationResponse::empty_continue())
    }

    /// A command not matching any Code is received as `unknown`.
    #[doc(alias = "SMFIC_UNKNOWN")]
    #[doc(alias = "xxfi_unknown")]
    async fn unknown(&mut self, _cmd: Unknown) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    /// Called on quitting a connection from a milter client.
    #[doc(alias = "SMFIC_QUIT")]
    #[doc(alias = "xxfi_close")]
    async fn quit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called when the milter client is quitting this connection but intends
    /// to reconnect for further mails. Like [`Self::quit`], this still ends
    /// the current session; the MTA opens a fresh connection for the next
    /// one.
    #[doc(alias = "SMFIC_QUIT_NC")]
    async fn quit_nc(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// The main error for this crate encapsulating the different error cases.
#[derive(Debug, Error)]
pub enum Error<ImplError> {
    /// If IO breaks, this will return a [`Error::Io`],
    /// which is a simple [`std::io::Error`]. Check the underlying transport.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The Codec had problems de/encoding data. This might be
    /// a problem in the implementation or an incompatibility between this crate
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The milter trait implementation returned an error.
    /// This is plumbed through and returned to the call site.
    #[error(transparent)]
    Impl {
        /// The application error patched through
        source: ImplError,
    },
}

impl<AppError> Error<AppError> {
    pub(crate) fn from_app_error(source: AppError) -> Self {
        Self::Impl { source }
    }
}
