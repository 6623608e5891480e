//! Change the envelope sender

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{InvalidData, ProtocolError};
use miltr_utils::ByteParsing;

/// Change the envelope sender (`MAIL FROM`), optionally including new ESMTP
/// arguments.
///
/// Requires [`crate::optneg::Capability::SMFIF_CHGFROM`] to be negotiated.
#[derive(Debug, Clone)]
pub struct ChangeFrom {
    sender: BytesMut,
    esmtp_args: Option<BytesMut>,
}

impl ChangeFrom {
    const CODE: u8 = b'e';

    /// Change the sender to the given address, with optional ESMTP args.
    #[must_use]
    pub fn new(sender: &[u8], esmtp_args: Option<&[u8]>) -> Self {
        Self {
            sender: BytesMut::from_iter(sender),
            esmtp_args: esmtp_args.map(BytesMut::from_iter),
        }
    }

    /// The new sender address
    #[must_use]
    pub fn sender(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.sender)
    }

    /// The new ESMTP arguments, if any
    #[must_use]
    pub fn esmtp_args(&self) -> Option<Cow<str>> {
        self.esmtp_args.as_ref().map(|a| String::from_utf8_lossy(a))
    }
}

impl Parsable for ChangeFrom {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(sender) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received change-from package without null byte terminating sender",
                buffer,
            )
            .into());
        };

        let esmtp_args = if buffer.is_empty() { None } else { Some(buffer) };

        Ok(Self { sender, esmtp_args })
    }
}

impl Writable for ChangeFrom {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.sender);
        buffer.put_u8(0);
        if let Some(args) = &self.esmtp_args {
            buffer.extend_from_slice(args);
            buffer.put_u8(0);
        }
    }

    fn len(&self) -> usize {
        self.sender.len()
            + 1
            + self
                .esmtp_args
                .as_ref()
                .map(|a| a.len() + 1)
                .unwrap_or_default()
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_change_from_round_trip() {
        let mut buffer = BytesMut::new();
        let change_from = ChangeFrom::new(b"<new@example.com>", None);
        change_from.write(&mut buffer);

        assert_eq!(buffer.len(), change_from.len());

        let parsed = ChangeFrom::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.sender(), "<new@example.com>");
        assert_eq!(parsed.esmtp_args(), None);
    }
}
