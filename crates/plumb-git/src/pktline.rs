//! Git pkt-line format implementation.
//!
//! The pkt-line format is used for all git protocol communication.
//! Each line is prefixed with a 4-character hex length that counts the
//! prefix itself, or "0000" for flush.

use crate::{GitError, Result};
use std::io::Write;

/// Length of the hex prefix.
const PREFIX_LEN: usize = 4;
/// Largest length a prefix can express.
const MAX_PKT_LEN: usize = 0xffff;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let len = data.len() + PREFIX_LEN;
                let mut result = format!("{:04x}", len).into_bytes();
                result.extend_from_slice(data);
                result
            }
            Self::Flush => b"0000".to_vec(),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Decodes pkt-lines from an in-memory buffer, tracking how much was consumed.
pub struct PktLineDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineDecoder<'a> {
    /// Creates a decoder positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Reads the next packet, or `None` once the buffer is exhausted.
    pub fn next_line(&mut self) -> Result<Option<PktLine>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }

        let prefix = rest
            .get(..PREFIX_LEN)
            .ok_or_else(|| GitError::InvalidPktLine("truncated length prefix".to_string()))?;
        let len = parse_length(prefix)?;

        if len == 0 {
            self.pos += PREFIX_LEN;
            return Ok(Some(PktLine::Flush));
        }
        if len < PREFIX_LEN {
            return Err(GitError::InvalidPktLine(format!(
                "length too small: {len}"
            )));
        }

        let payload = rest.get(PREFIX_LEN..len).ok_or_else(|| {
            GitError::InvalidPktLine(format!(
                "packet of {len} bytes but only {} remain",
                rest.len()
            ))
        })?;
        self.pos += len;
        Ok(Some(PktLine::Data(payload.to_vec())))
    }
}

fn parse_length(prefix: &[u8]) -> Result<usize> {
    if !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(GitError::InvalidPktLine(format!(
            "invalid length prefix: {:?}",
            String::from_utf8_lossy(prefix)
        )));
    }
    let text = std::str::from_utf8(prefix)
        .map_err(|_| GitError::InvalidPktLine("invalid length prefix".to_string()))?;
    usize::from_str_radix(text, 16)
        .map_err(|_| GitError::InvalidPktLine("invalid length".to_string()))
}

/// Decodes an entire buffer into packets.
pub fn decode_all(data: &[u8]) -> Result<Vec<PktLine>> {
    let mut decoder = PktLineDecoder::new(data);
    let mut packets = Vec::new();
    while let Some(pkt) = decoder.next_line()? {
        packets.push(pkt);
    }
    Ok(packets)
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        if let PktLine::Data(data) = pkt {
            if data.len() + PREFIX_LEN > MAX_PKT_LEN {
                return Err(GitError::InvalidPktLine(format!(
                    "payload of {} bytes does not fit in a packet",
                    data.len()
                )));
            }
        }
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pktline_encode() {
        assert_eq!(PktLine::from_string("hello\n").encode(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode(), b"0000");
    }

    #[test]
    fn test_pktline_empty_data() {
        let encoded = PktLine::Data(Vec::new()).encode();
        assert_eq!(encoded, b"0004");
    }

    #[test]
    fn test_decode_sequence() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("line2").unwrap();
        }

        let packets = decode_all(&buf).unwrap();
        assert_eq!(
            packets,
            vec![
                PktLine::from_string("line1\n"),
                PktLine::Flush,
                PktLine::from_string("line2\n"),
            ]
        );
    }

    #[test]
    fn test_decoder_tracks_position() {
        let mut buf = b"0008NAK\n".to_vec();
        buf.extend_from_slice(b"PACK....");

        let mut decoder = PktLineDecoder::new(&buf);
        assert_eq!(
            decoder.next_line().unwrap(),
            Some(PktLine::from_string("NAK\n"))
        );
        assert_eq!(decoder.position(), 8);
        assert!(decoder.remaining().starts_with(b"PACK"));
    }

    #[test]
    fn test_decode_uppercase_hex() {
        let line = format!("{:04X}{}", 30, "x".repeat(26));
        assert_eq!(decode_all(line.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_length_too_small() {
        assert!(decode_all(b"0003").is_err());
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(matches!(
            decode_all(b"zz12abc"),
            Err(GitError::InvalidPktLine(_))
        ));
        assert!(decode_all(b"+00a").is_err());
    }

    #[test]
    fn test_truncated_prefix() {
        assert!(decode_all(b"00").is_err());
    }

    #[test]
    fn test_truncated_payload() {
        assert!(decode_all(b"000ahel").is_err());
    }

    #[test]
    fn test_as_str() {
        assert_eq!(PktLine::from_string("hello\n").as_str(), Some("hello"));
        assert_eq!(PktLine::from_string("plain").as_str(), Some("plain"));
        assert!(PktLine::Data(vec![0xff, 0xfe]).as_str().is_none());
        assert!(PktLine::Flush.as_str().is_none());
    }

    #[test]
    fn test_write_line_keeps_single_newline() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("done\n").unwrap();
        }
        assert_eq!(buf, b"0009done\n");
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut writer = PktLineWriter::new(Vec::new());
        let data = vec![b'x'; MAX_PKT_LEN];
        assert!(writer.write(&PktLine::Data(data)).is_err());
        assert!(writer.into_inner().is_empty());
    }
}
