use std::borrow::Cow;

use bytes::{Buf, BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{error::STAGE_DECODING, NotEnoughData};
use crate::{InvalidData, ProtocolError};
use miltr_utils::ByteParsing;

/// Accept this mail without further filtering, skipping any remaining
/// phases of the current mail.
#[derive(Debug, Clone)]
pub struct Accept;

impl Accept {
    const CODE: u8 = b'a';
}

impl Parsable for Accept {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Accept {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// (Silently) discard this mail without forwarding it
#[derive(Debug, Clone)]
pub struct Discard;

impl Discard {
    const CODE: u8 = b'd';
}

impl Parsable for Discard {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Discard {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject this mail, informing the smtp client about it
#[derive(Debug, Clone)]
pub struct Reject;

impl Reject {
    const CODE: u8 = b'r';
}

impl Parsable for Reject {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Reject {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Return a tempfail code to the smtp client
#[derive(Debug, Clone)]
pub struct Tempfail;

impl Tempfail {
    const CODE: u8 = b't';
}

impl Parsable for Tempfail {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Tempfail {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Skip this mail processing
#[derive(Debug, Clone)]
pub struct Skip;

impl Skip {
    const CODE: u8 = b's';
}

impl Parsable for Skip {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Skip {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const SMTP_CODE_LENGTH: usize = 3;

/// Return a custom SMTP status code and message to the smtp client
#[derive(Debug, Clone)]
pub struct Replycode {
    code: SmtpCode,
    message: BytesMut,
}

impl Replycode {
    const CODE: u8 = b'y';

    /// Create a Replycode from a three digit smtp status code and message
    #[must_use]
    pub fn new<C: Into<SmtpCode>>(code: C, message: &str) -> Self {
        Self {
            code: code.into(),
            message: BytesMut::from(message.as_bytes()),
        }
    }

    /// The message associated with this reply code
    #[must_use]
    pub fn message(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.message)
    }

    /// The smtp return code
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code.value()
    }
}

impl Parsable for Replycode {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(code) = buffer.safe_split_to(SMTP_CODE_LENGTH) else {
            return Err(NotEnoughData::new(
                STAGE_DECODING,
                "Replycode",
                "Missing smtp status code",
                SMTP_CODE_LENGTH,
                buffer.len(),
                buffer,
            )
            .into());
        };
        let code = SmtpCode::parse(code)?;

        // A single space separates the code from the message, matching what
        // the MTA expects on the wire; tolerate its absence defensively.
        if buffer.first() == Some(&b' ') {
            buffer.advance(1);
        }

        let Some(message) = buffer.delimited(0) else {
            return Err(NotEnoughData::new(
                STAGE_DECODING,
                "Replycode",
                "Missing nullbyte delimiter after message",
                1,
                0,
                buffer,
            )
            .into());
        };

        Ok(Self { code, message })
    }
}

impl Writable for Replycode {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.put_slice(self.code.as_bytes());
        buffer.put_u8(b' ');
        buffer.put_slice(&self.message);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        SMTP_CODE_LENGTH + 1 + self.message.len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A three digit SMTP status code, e.g. `250` or `550`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmtpCode {
    value: u16,
    bytes: [u8; SMTP_CODE_LENGTH],
}

impl From<u16> for SmtpCode {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

impl SmtpCode {
    /// Create a new `SmtpCode` from a value in `100..=599`.
    #[must_use]
    pub fn new(value: u16) -> Self {
        let digits = format!("{value:03}");
        let mut bytes = [0_u8; SMTP_CODE_LENGTH];
        bytes.copy_from_slice(digits.as_bytes());

        Self { value, bytes }
    }

    fn parse(buffer: BytesMut) -> Result<Self, InvalidData> {
        let Ok(text) = std::str::from_utf8(&buffer) else {
            return Err(InvalidData {
                msg: "smtp status code is not valid utf8",
                offending_bytes: buffer,
            });
        };
        let Ok(value) = text.parse() else {
            return Err(InvalidData {
                msg: "smtp status code is not a number",
                offending_bytes: buffer,
            });
        };

        Ok(Self::new(value))
    }

    /// The numeric value of this code
    #[must_use]
    pub fn value(&self) -> u16 {
        self.value
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Buf;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_smtp_code_valid() {
        let input = BytesMut::from_iter(b"250");
        let code = SmtpCode::parse(input).expect("Failed parsing input");

        assert_eq!(code.value(), 250);
    }

    #[test]
    fn test_smtp_code_invalid() {
        let input = BytesMut::from_iter(b"abc");
        let _code = SmtpCode::parse(input).expect_err("Parsing did not error on invalid");
    }

    #[test]
    fn test_replycode_round_trip() {
        let reply = Replycode::new(550, "rejected for policy reasons");

        let mut buffer = BytesMut::new();
        reply.write(&mut buffer);

        assert_eq!(&buffer[0..4], b"550 ");

        let parsed = Replycode::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.code(), 550);
        assert_eq!(parsed.message(), "rejected for policy reasons");
    }
}
