//! Add or delete recipients

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{InvalidData, ProtocolError};
use miltr_utils::ByteParsing;

#[derive(Debug, Clone)]

///Does not change To in Header
pub struct AddRecipient {
    recipient: BytesMut,
}

impl AddRecipient {
    const CODE: u8 = b'+';

    /// Add the specified recipient
    #[must_use]
    pub fn new(recipient: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
        }
    }

    /// The recipient to add
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }
}

impl Parsable for AddRecipient {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received add recipient package without null byte terminating it",
                buffer,
            )
            .into());
        };

        Ok(Self { recipient })
    }
}

impl Writable for AddRecipient {
    ///buffer = recipients
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
/// Does not change To in Header
pub struct DeleteRecipient {
    recipient: BytesMut,
}

impl DeleteRecipient {
    const CODE: u8 = b'-';

    /// Delete the specified recipient
    #[must_use]
    pub fn new(recipient: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
        }
    }

    /// The (exact) recipient to be deleted
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }
}

impl Parsable for DeleteRecipient {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received delete recipient package without null byte terminating it",
                buffer,
            )
            .into());
        };

        Ok(Self { recipient })
    }
}

impl Writable for DeleteRecipient {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Add a recipient, including ESMTP arguments.
///
/// Requires [`crate::optneg::Capability::SMFIF_ADDRCPT_PAR`] to be negotiated;
/// otherwise prefer plain [`AddRecipient`].
#[derive(Debug, Clone)]
pub struct AddRecipientPar {
    recipient: BytesMut,
    esmtp_args: Option<BytesMut>,
}

impl AddRecipientPar {
    const CODE: u8 = b'2';

    /// Add the specified recipient, with optional ESMTP arguments.
    #[must_use]
    pub fn new(recipient: &[u8], esmtp_args: Option<&[u8]>) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
            esmtp_args: esmtp_args.map(BytesMut::from_iter),
        }
    }

    /// The recipient to add
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }

    /// The ESMTP arguments accompanying this recipient, if any
    #[must_use]
    pub fn esmtp_args(&self) -> Option<Cow<str>> {
        self.esmtp_args.as_ref().map(|a| String::from_utf8_lossy(a))
    }
}

impl Parsable for AddRecipientPar {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received add recipient (par) package without null byte terminating recipient",
                buffer,
            )
            .into());
        };

        let esmtp_args = if buffer.is_empty() { None } else { Some(buffer) };

        Ok(Self {
            recipient,
            esmtp_args,
        })
    }
}

impl Writable for AddRecipientPar {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
        if let Some(args) = &self.esmtp_args {
            buffer.extend_from_slice(args);
            buffer.put_u8(0);
        }
    }

    fn len(&self) -> usize {
        self.recipient.len()
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

    #[test]
    fn test_add_recipient_par_round_trip() {
        let mut buffer = BytesMut::new();
        let add_rcpt = AddRecipientPar::new(b"alex@gmail", Some(b"SIZE=100"));
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer.len(), add_rcpt.len());

        let parsed = AddRecipientPar::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.recipient(), "alex@gmail");
        assert_eq!(parsed.esmtp_args().as_deref(), Some("SIZE=100"));
    }

    #[test]
    fn test_add_recipient() {
        let mut buffer = BytesMut::new();
        let add_rcpt = AddRecipient {
            recipient: BytesMut::from("alex@gmail"),
        };
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer.len(), add_rcpt.len());
        assert_eq!(buffer, BytesMut::from("alex@gmail\0"));
    }

    #[test]
    fn test_delete_recipient() {
        let mut buffer = BytesMut::new();
        let add_rcpt = AddRecipient {
            recipient: BytesMut::from("alex@gmail"),
        };
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer.len(), add_rcpt.len());
        assert_eq!(buffer, BytesMut::from("alex@gmail\0"));
    }
}
