//! Inbound line framing that survives bad lines.
//!
//! `FramedRead` stops for good after a decoder error, so lines that are too
//! long or not UTF-8 are yielded as `Rejected` items instead. `LinesCodec`
//! already skips the rest of an over-long line on the next call.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Text(String),
    /// A line that was dropped, with the reason
    Rejected(String),
}

pub struct InboundCodec {
    lines: LinesCodec,
}

impl InboundCodec {
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

fn recover(
    decoded: Result<Option<String>, LinesCodecError>,
) -> Result<Option<InboundLine>, LinesCodecError> {
    match decoded {
        Ok(line) => Ok(line.map(InboundLine::Text)),
        Err(e @ LinesCodecError::MaxLineLengthExceeded) => {
            Ok(Some(InboundLine::Rejected(e.to_string())))
        }
        // The offending line has been consumed already
        Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            Ok(Some(InboundLine::Rejected(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

impl Decoder for InboundCodec {
    type Item = InboundLine;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        recover(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        recover(self.lines.decode_eof(src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_lines() {
        let mut codec = InboundCodec::new(64);
        let mut buf = BytesMut::from("{\"type\":\"reload\"}\npartial");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Text("{\"type\":\"reload\"}".to_string()))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_long_line_rejected_then_next_line_read() {
        let mut codec = InboundCodec::new(8);
        let mut buf = BytesMut::from("0123456789abcdef");

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Rejected(_))
        ));

        buf.extend_from_slice(b"ghij\nok\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Text("ok".to_string()))
        );
    }

    #[test]
    fn test_invalid_utf8_rejected_then_next_line_read() {
        let mut codec = InboundCodec::new(64);
        let mut buf = BytesMut::from(&b"\xff\xfe\nok\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Rejected(_))
        ));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(InboundLine::Text("ok".to_string()))
        );
    }
}
