//! Frame boundaries for serial responses
//!
//! Devices either terminate replies with a delimiter byte (`#`, newline) or
//! answer with a fixed number of bytes. [`read_framed`] reads one frame of
//! either kind from any buffered async byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// How a single response frame is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Read until `delimiter` (inclusive) or until `max_len` bytes arrived.
    ///
    /// Hitting `max_len` first is not an error: the partial frame is returned
    /// without the delimiter so callers can tell the two cases apart.
    Delimited { delimiter: u8, max_len: usize },
    /// Read exactly this many bytes
    Fixed(usize),
}

impl Framing {
    /// Newline terminated text lines
    pub const fn line() -> Self {
        Framing::Delimited {
            delimiter: b'\n',
            max_len: 256,
        }
    }

    /// `#` terminated replies
    pub const fn hash() -> Self {
        Framing::Delimited {
            delimiter: b'#',
            max_len: 32,
        }
    }

    /// Whether `frame` ends with this framing's delimiter
    pub fn is_terminated(&self, frame: &[u8]) -> bool {
        match self {
            Framing::Delimited { delimiter, .. } => frame.last() == Some(delimiter),
            Framing::Fixed(len) => frame.len() == *len,
        }
    }

    /// Whether `frame` is a whole frame: delimited, full length, or at `max_len`
    pub fn is_complete(&self, frame: &[u8]) -> bool {
        match *self {
            Framing::Delimited { delimiter, max_len } => {
                frame.len() >= max_len || frame.last() == Some(&delimiter)
            }
            Framing::Fixed(len) => frame.len() >= len,
        }
    }

    /// Payload of a frame as text, without the delimiter and surrounding whitespace
    pub fn text(&self, frame: &[u8]) -> String {
        let payload = match self {
            Framing::Delimited { delimiter, .. } => {
                frame.strip_suffix(&[*delimiter]).unwrap_or(frame)
            }
            Framing::Fixed(_) => frame,
        };
        String::from_utf8_lossy(payload).trim().to_string()
    }
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends before any byte of the frame was
/// read. A stream ending mid-frame yields the bytes received so far.
pub async fn read_framed<R>(reader: &mut R, framing: &Framing) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut frame = Vec::new();
    read_framed_into(reader, framing, &mut frame).await?;
    if frame.is_empty() {
        Ok(None)
    } else {
        Ok(Some(frame))
    }
}

/// Continue reading the frame accumulated in `frame`.
///
/// Bytes move from the reader into `frame` only once they are in hand, so
/// dropping this future (a read timeout) loses nothing: calling it again with
/// the same buffer picks up where it stopped. Returns `true` once the frame is
/// complete and `false` when the stream ended first.
pub async fn read_framed_into<R>(
    reader: &mut R,
    framing: &Framing,
    frame: &mut Vec<u8>,
) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    loop {
        if framing.is_complete(frame) {
            return Ok(true);
        }

        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }

        let taken = match *framing {
            Framing::Fixed(len) => (len - frame.len()).min(available.len()),
            Framing::Delimited { delimiter, max_len } => {
                let room = (max_len - frame.len()).min(available.len());
                available[..room]
                    .iter()
                    .position(|b| *b == delimiter)
                    .map_or(room, |i| i + 1)
            }
        };
        frame.extend_from_slice(&available[..taken]);
        reader.consume(taken);
    }
}
