//! Progress messages sent to the daemon over the control socket.
//!
//! A frame is one raw percentage byte, the message text and a NUL terminator:
//! `[percentage, text.., 0]`. Frames never exceed [`FRAME_CAPACITY`] bytes.

/// Largest frame payload after the percentage byte, terminator included.
pub const MAX_CMD_LEN: usize = 63;
/// Longest message text a client may send.
pub const MAX_MESSAGE_LEN: usize = MAX_CMD_LEN - 1;
pub const FRAME_CAPACITY: usize = MAX_CMD_LEN + 1;
/// The percentage that ends the boot splash.
pub const COMPLETE: u8 = 100;

pub type Message = heapless::Vec<u8, MAX_MESSAGE_LEN>;
pub type Frame = heapless::Vec<u8, FRAME_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    PercentageOutOfRange(u8),
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::Empty => f.write_str("empty control frame"),
            ProtocolError::PercentageOutOfRange(value) => {
                write!(f, "percentage {value} is outside 0..=100")
            }
        }
    }
}

impl core::error::Error for ProtocolError {}

/// Last progress report received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootStatus {
    percentage: u8,
    message: Message,
}

impl BootStatus {
    pub fn new(percentage: u8, message: &[u8]) -> Result<Self, ProtocolError> {
        if percentage > COMPLETE {
            return Err(ProtocolError::PercentageOutOfRange(percentage));
        }
        let len = message.len().min(MAX_MESSAGE_LEN);
        let mut text = Message::new();
        // cannot fail, `len` is within capacity
        let _ = text.extend_from_slice(&message[..len]);
        Ok(Self {
            percentage,
            message: text,
        })
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    /// Raw message bytes. Not guaranteed to be UTF-8.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn is_complete(&self) -> bool {
        self.percentage == COMPLETE
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub status: BootStatus,
    /// Received length disagrees with the terminated text length.
    pub malformed: bool,
}

/// Decodes one received chunk. The text runs up to the first NUL; a chunk
/// whose length does not match `1 + text + 1` is still applied but flagged.
pub fn decode(chunk: &[u8]) -> Result<Update, ProtocolError> {
    let (&percentage, rest) = chunk.split_first().ok_or(ProtocolError::Empty)?;
    let text_len = memchr::memchr(0, rest).unwrap_or(rest.len());
    let malformed = rest.is_empty() || rest.len() - 1 != text_len;
    let status = BootStatus::new(percentage, &rest[..text_len])?;
    Ok(Update { status, malformed })
}

/// Splits a byte stream into frames at each NUL terminator.
///
/// Bytes after the last terminator are kept for the next [`feed`](Self::feed).
/// A frame that outgrows [`FRAME_CAPACITY`] is reported as is and the rest of it,
/// up to its terminator, is dropped.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    pending: Frame,
    overflowed: bool,
}

impl FrameAssembler {
    /// Decodes every frame completed by `bytes`, in order.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(Result<Update, ProtocolError>),
    {
        for &byte in bytes {
            if self.overflowed {
                self.overflowed = byte != 0;
                continue;
            }
            if self.pending.push(byte).is_err() {
                on_frame(decode(&self.pending));
                self.pending.clear();
                self.overflowed = byte != 0;
                continue;
            }
            // the first byte is the percentage, a zero there is 0%
            if byte == 0 && self.pending.len() > 1 {
                on_frame(decode(&self.pending));
                self.pending.clear();
            }
        }
    }

    /// Decodes an unterminated tail, if any, and resets.
    pub fn finish(&mut self) -> Option<Result<Update, ProtocolError>> {
        self.overflowed = false;
        if self.pending.is_empty() {
            return None;
        }
        let update = decode(&self.pending);
        self.pending.clear();
        Some(update)
    }
}

/// An encoded frame and whether the message had to be shortened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub frame: Frame,
    pub truncated: bool,
}

/// Builds the frame a client sends. Messages longer than [`MAX_MESSAGE_LEN`] are cut.
pub fn encode(percentage: u8, message: &[u8]) -> Result<Encoded, ProtocolError> {
    let status = BootStatus::new(percentage, message)?;
    let mut frame = Frame::new();
    // capacity is 1 + MAX_MESSAGE_LEN + 1
    let _ = frame.push(status.percentage);
    let _ = frame.extend_from_slice(status.message());
    let _ = frame.push(0);
    Ok(Encoded {
        frame,
        truncated: message.len() > MAX_MESSAGE_LEN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let encoded = encode(49, b"loading ssh").unwrap();
        assert!(!encoded.truncated);
        assert_eq!(&encoded.frame[..], b"\x31loading ssh\0");
    }

    #[test]
    fn encode_without_message() {
        let encoded = encode(0, b"").unwrap();
        assert_eq!(&encoded.frame[..], &[0, 0]);
    }

    #[test]
    fn encode_truncates_long_messages() {
        let long = [b'x'; 100];
        let encoded = encode(7, &long).unwrap();
        assert!(encoded.truncated);
        assert_eq!(encoded.frame.len(), FRAME_CAPACITY);
        assert_eq!(encoded.frame[FRAME_CAPACITY - 1], 0);
        assert_eq!(&encoded.frame[1..FRAME_CAPACITY - 1], &long[..MAX_MESSAGE_LEN]);
    }

    #[test]
    fn encode_rejects_out_of_range() {
        assert_eq!(encode(101, b"").err(), Some(ProtocolError::PercentageOutOfRange(101)));
    }

    #[test]
    fn decode_well_formed() {
        let update = decode(b"\x64done\0").unwrap();
        assert!(!update.malformed);
        assert!(update.status.is_complete());
        assert_eq!(update.status.message(), b"done");
    }

    #[test]
    fn decode_missing_terminator_still_applies() {
        let update = decode(b"\x20half").unwrap();
        assert!(update.malformed);
        assert_eq!(update.status.percentage(), 32);
        assert_eq!(update.status.message(), b"half");
    }

    #[test]
    fn decode_percentage_only() {
        let update = decode(&[55]).unwrap();
        assert!(update.malformed);
        assert_eq!(update.status.percentage(), 55);
        assert!(update.status.message().is_empty());
    }

    #[test]
    fn decode_embedded_nul() {
        let update = decode(b"\x0aab\0cd\0").unwrap();
        assert!(update.malformed);
        assert_eq!(update.status.message(), b"ab");
    }

    use alloc::vec::Vec;

    fn assemble(chunks: &[&[u8]]) -> (Vec<Result<Update, ProtocolError>>, FrameAssembler) {
        let mut assembler = FrameAssembler::default();
        let mut frames = Vec::new();
        for chunk in chunks {
            assembler.feed(chunk, |frame| frames.push(frame));
        }
        (frames, assembler)
    }

    #[test]
    fn frames_sharing_a_read_are_split() {
        let mut stream = encode(90, b"almost").unwrap().frame.to_vec();
        stream.extend_from_slice(&encode(100, b"done").unwrap().frame);
        let (frames, mut assembler) = assemble(&[&stream]);
        assert_eq!(frames.len(), 2);
        let last = frames[1].as_ref().unwrap();
        assert!(!last.malformed);
        assert!(last.status.is_complete());
        assert_eq!(last.status.message(), b"done");
        assert_eq!(frames[0].as_ref().unwrap().status.percentage(), 90);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn frames_split_across_reads_are_joined() {
        let (frames, _) = assemble(&[b"\x14wa", b"it", b"ing\0\x15"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().status.message(), b"waiting");
    }

    #[test]
    fn zero_percentage_is_not_a_terminator() {
        let (frames, _) = assemble(&[&[0, 0, 0, b'x', 0]]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().status.percentage(), 0);
        assert!(frames[0].as_ref().unwrap().status.message().is_empty());
        assert_eq!(frames[1].as_ref().unwrap().status.message(), b"x");
    }

    #[test]
    fn unterminated_tail_is_applied_on_finish() {
        let (frames, mut assembler) = assemble(&[b"\x30half"]);
        assert!(frames.is_empty());
        let update = assembler.finish().unwrap().unwrap();
        assert!(update.malformed);
        assert_eq!(update.status.percentage(), 48);
        assert_eq!(update.status.message(), b"half");
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn overlong_frame_is_cut_and_its_tail_dropped() {
        let mut stream = alloc::vec![40u8];
        stream.extend_from_slice(&[b'y'; 100]);
        stream.push(0);
        stream.extend_from_slice(b"\x64\0");
        let (frames, _) = assemble(&[&stream]);
        assert_eq!(frames.len(), 2);
        let cut = frames[0].as_ref().unwrap();
        assert!(cut.malformed);
        assert_eq!(cut.status.message().len(), MAX_MESSAGE_LEN);
        assert!(frames[1].as_ref().unwrap().status.is_complete());
    }

    #[test]
    fn decode_errors() {
        assert_eq!(decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(decode(&[200, 0]), Err(ProtocolError::PercentageOutOfRange(200)));
    }
}
