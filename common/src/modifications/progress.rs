//! Tell the MTA that processing is still under way

use bytes::BytesMut;

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::ProtocolError;

/// Ask the MTA to reset its read timeout; sent while a filter is taking a
/// long time to decide on a verdict. Carries no payload.
#[derive(Debug, Clone)]
pub struct Progress;

impl Progress {
    const CODE: u8 = b'p';
}

impl Parsable for Progress {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Progress {
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
