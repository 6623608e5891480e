//! The per-connection dispatch loop.
//!
//! Reads framed [`ClientCommand`]s off the wire, drives a [`Milter`]
//! implementation, and writes the resulting [`ServerMessage`]s back, honoring
//! option negotiation, macro accumulation and the no-reply phases negotiated
//! in `SMFIC_OPTNEG`.

use asynchronous_codec::Framed;
use futures::{AsyncRead, AsyncWrite, Future, SinkExt, StreamExt};

use miltr_common::{
    actions::{Action, Continue},
    commands::Command,
    decoding::ClientCommand,
    encoding::ServerMessage,
    optneg::{Capability, Protocol},
};
use miltr_utils::debug;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::codec::MilterCodec;
use crate::headers::HeaderMap;
use crate::ids;
use crate::milter::{Error, Milter};

/// Per-mail state accumulated between `SMFIC_MAIL` and either `SMFIC_ABORT`
/// or the end of the body.
#[derive(Debug, Default)]
struct MailState {
    headers: HeaderMap,
    macros: std::collections::HashMap<String, String>,
}

impl MailState {
    fn reset(&mut self) {
        self.headers.clear();
        self.macros.clear();
    }
}

/// Strip a leading/trailing `<`/`>` cutset and lowercase, matching the
/// envelope address normalization the MTA expects `MailFrom`/`RcptTo` to see.
fn normalize_address(raw: &str) -> String {
    raw.trim_matches(|c| c == '<' || c == '>').to_lowercase()
}

/// Drive a single milter connection to completion.
///
/// Returns once the client sends `SMFIC_QUIT` or `SMFIC_QUIT_NC`, the
/// transport reaches EOF, or an unrecoverable protocol/IO/implementation
/// error occurs. `SMFIC_QUIT_NC` still ends this session (and this
/// connection); the MTA is expected to open a new one for its next mail.
#[cfg_attr(feature = "tracing", instrument(skip_all))]
pub async fn handle_connection<RW, M>(
    socket: RW,
    milter: &mut M,
    max_buffer_size: usize,
) -> Result<(), Error<M::Error>>
where
    RW: AsyncRead + AsyncWrite + Unpin + Send,
    M: Milter,
{
    let mut codec = MilterCodec::new(max_buffer_size);
    let mut framed = Framed::new(socket, &mut codec);

    let session_id = ids::generate();
    let mut mail_id = String::new();
    let mut protocol = Protocol::empty();
    let mut capabilities = Capability::all();
    let mut mail = MailState::default();

    milter
        .init(&session_id, &mail_id)
        .await
        .map_err(Error::from_app_error)?;

    loop {
        let Some(command) = framed.next().await else {
            break;
        };
        let command = command?;
        debug!("Received {}", command);

        match command {
            ClientCommand::OptNeg(theirs) => {
                let ours = milter.option_negotiation(theirs).await?;
                protocol = ours.protocol;
                capabilities = ours.capabilities;
                framed.send(&ours.into()).await?;
            }

            ClientCommand::Macro(macro_) => {
                for (name, value) in macro_.macros() {
                    mail.macros.insert(
                        String::from_utf8_lossy(name).into_owned(),
                        String::from_utf8_lossy(value).into_owned(),
                    );
                }
                milter.macro_(macro_).await.map_err(Error::from_app_error)?;
            }

            ClientCommand::Connect(connect) => {
                let cmd = Command::Connect(connect.clone());
                respond(&mut framed, protocol, &cmd, milter.connect(connect)).await?;
            }

            ClientCommand::Helo(helo) => {
                let cmd = Command::Helo(helo.clone());
                respond(&mut framed, protocol, &cmd, milter.helo(helo)).await?;
            }

            ClientCommand::Mail(mail_cmd) => {
                mail_id = ids::generate();
                milter
                    .init(&session_id, &mail_id)
                    .await
                    .map_err(Error::from_app_error)?;

                let sender = normalize_address(&mail_cmd.sender());
                let cmd = Command::Mail(mail_cmd);
                respond(&mut framed, protocol, &cmd, milter.mail_from(&sender)).await?;
            }

            ClientCommand::Recipient(recipient) => {
                let address = normalize_address(&recipient.recipient());
                let cmd = Command::Recipient(recipient);
                respond(&mut framed, protocol, &cmd, milter.rcpt_to(&address)).await?;
            }

            ClientCommand::Header(header) => {
                mail.headers
                    .entry(header.name().into_owned())
                    .or_default()
                    .push(header.value().into_owned());

                let cmd = Command::Header(header.clone());
                respond(&mut framed, protocol, &cmd, milter.header(header)).await?;
            }

            ClientCommand::EndOfHeader(eoh) => {
                let cmd = Command::EndOfHeader(eoh);
                respond(&mut framed, protocol, &cmd, milter.headers(&mail.headers)).await?;
            }

            ClientCommand::Data(data) => {
                let cmd = Command::Data(data);
                if !protocol.should_skip_response(&cmd) {
                    let action: Action = Continue.into();
                    framed.send(&action.into()).await?;
                }
            }

            ClientCommand::Body(body) => {
                let cmd = Command::Body(body.clone());
                let action = milter
                    .body_chunk(body.as_bytes())
                    .await
                    .map_err(Error::from_app_error)?;
                let action = normalize_skip(action, protocol);

                if !protocol.should_skip_response(&cmd) {
                    framed.send(&action.into()).await?;
                }
            }

            ClientCommand::EndOfBody(_) => {
                let mut responses = milter.body().await.map_err(Error::from_app_error)?;
                responses.filter_mods_by_caps(capabilities);
                responses.split_oversized_bodies(protocol.max_body_chunk_size());

                let messages: Vec<ServerMessage> = responses.into();
                for message in messages {
                    framed.send(&message).await?;
                }

                mail.headers.clear();
            }

            ClientCommand::Unknown(unknown) => {
                let cmd = Command::Unknown(unknown.clone());
                respond(&mut framed, protocol, &cmd, milter.unknown(unknown)).await?;
            }

            ClientCommand::Abort(_) => {
                mail.reset();
                milter
                    .init(&session_id, &mail_id)
                    .await
                    .map_err(Error::from_app_error)?;
            }

            ClientCommand::Quit(_) => {
                milter.quit().await.map_err(Error::from_app_error)?;
                break;
            }

            ClientCommand::QuitNc(_) => {
                milter.quit_nc().await.map_err(Error::from_app_error)?;
                break;
            }
        }
    }

    milter.disconnect().await.map_err(Error::from_app_error)?;
    Ok(())
}

/// If the negotiated protocol doesn't advertise `SMFIP_SKIP` support, a
/// `Skip` verdict from [`Milter::body_chunk`] would confuse an MTA that
/// doesn't know the code; fall back to `Continue` in that case.
fn normalize_skip(action: Action, protocol: Protocol) -> Action {
    if matches!(action, Action::Skip(_)) && !protocol.contains(Protocol::SMFIP_SKIP) {
        Continue.into()
    } else {
        action
    }
}

/// Call the milter implementation, convert its result into an [`Action`],
/// and write the response frame unless the negotiated protocol suppresses a
/// reply for this command.
async fn respond<RW, E, A>(
    framed: &mut Framed<RW, &mut MilterCodec>,
    protocol: Protocol,
    command: &Command,
    result: impl Future<Output = Result<A, E>>,
) -> Result<(), Error<E>>
where
    RW: AsyncRead + AsyncWrite + Unpin,
    A: Into<Action>,
{
    let action: Action = result.await.map_err(Error::from_app_error)?.into();

    if !protocol.should_skip_response(command) {
        framed.send(&action.into()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_address_strips_brackets_and_lowercases() {
        assert_eq!(normalize_address("<Foo@Example.COM>"), "foo@example.com");
        assert_eq!(normalize_address("bare@example.com"), "bare@example.com");
    }

    #[test]
    fn normalize_skip_falls_back_to_continue_without_negotiated_skip() {
        let action = normalize_skip(miltr_common::actions::Skip.into(), Protocol::empty());
        assert!(matches!(action, Action::Continue(_)));
    }

    #[test]
    fn normalize_skip_keeps_skip_when_negotiated() {
        let action = normalize_skip(
            miltr_common::actions::Skip.into(),
            Protocol::SMFIP_SKIP,
        );
        assert!(matches!(action, Action::Skip(_)));
    }
}
