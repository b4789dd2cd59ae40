//! Text codec for STOMP 1.2 frames.
//!
//! Wire format:
//! ```text
//! COMMAND EOL
//! (header-name ":" header-value EOL)*
//! EOL
//! body NUL
//! ```
//! `EOL` is `\n` or `\r\n`.  Header names and values in every frame except
//! `CONNECT`/`CONNECTED` escape `\\`, `\n`, `\r` and `:` as `\\\\`, `\\n`,
//! `\\r` and `\\c`.  Bare EOLs between frames are heart-beats and are skipped.

use thiserror::Error;
use tracing::trace;

use crate::protocol::frame::{Command, Frame};

/// Largest frame accepted from the wire, body included.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input ends before a complete frame; wait for more data.
    #[error("insufficient data: no complete frame in {available} bytes")]
    InsufficientData { available: usize },

    /// The command line is not a STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// A header line has no `:` or uses an undefined escape sequence.
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),

    /// `content-length` is not a non-negative integer.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A frame, or the body announced by `content-length`, exceeds
    /// [`MAX_FRAME_SIZE`].
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// The body is not valid UTF-8 or is not NUL-terminated where
    /// `content-length` says it ends.
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// A SockJS envelope could not be parsed.
    #[error("malformed SockJS frame: {0}")]
    MalformedSockJs(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`] into its wire text, including the trailing NUL.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::{encode_frame, Frame};
///
/// let text = encode_frame(&Frame::unsubscribe("sub-0"));
/// assert_eq!(text, "UNSUBSCRIBE\nid:sub-0\n\n\0");
/// ```
pub fn encode_frame(frame: &Frame) -> String {
    let mut out = String::with_capacity(64 + frame.body.len());
    out.push_str(frame.command.as_str());
    out.push('\n');

    let escape = frame.command.escapes_headers();
    for (name, value) in &frame.headers {
        if escape {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

/// Decodes one [`Frame`] from the beginning of `input`.
///
/// Returns the frame and the number of bytes consumed (leading heart-beat
/// EOLs + the frame + its NUL terminator), so the caller can advance its
/// buffer.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if `input` holds only part of a
/// frame, and one of the other variants if the bytes are malformed.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::{decode_frame, Command};
///
/// let (frame, used) = decode_frame("\nRECEIPT\nreceipt-id:r-1\n\n\0").unwrap();
/// assert_eq!(frame.command, Command::Receipt);
/// assert_eq!(frame.header("receipt-id"), Some("r-1"));
/// assert_eq!(used, 26);
/// ```
pub fn decode_frame(input: &str) -> Result<(Frame, usize), ProtocolError> {
    let bytes = input.as_bytes();

    let mut pos = 0;
    while pos < bytes.len() && matches!(bytes[pos], b'\n' | b'\r') {
        pos += 1;
    }
    if pos == bytes.len() {
        return Err(insufficient(input));
    }

    let (command_line, next) = read_line(input, pos)?;
    let command: Command = command_line.parse()?;
    pos = next;

    let mut headers = Vec::new();
    loop {
        let (line, next) = read_line(input, pos)?;
        pos = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let (body, body_end) = match content_length {
        Some(len) => {
            if len > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge {
                    size: len,
                    limit: MAX_FRAME_SIZE,
                });
            }
            let end = pos
                .checked_add(len)
                .ok_or_else(|| ProtocolError::InvalidContentLength(len.to_string()))?;
            if bytes.len() <= end {
                return Err(insufficient(input));
            }
            if bytes[end] != 0 {
                return Err(ProtocolError::MalformedBody(format!(
                    "expected NUL after {len} body bytes"
                )));
            }
            let body = std::str::from_utf8(&bytes[pos..end])
                .map_err(|e| ProtocolError::MalformedBody(e.to_string()))?;
            (body, end)
        }
        None => match bytes[pos..].iter().position(|b| *b == 0) {
            Some(offset) => (&input[pos..pos + offset], pos + offset),
            None => return Err(insufficient(input)),
        },
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        body_end + 1,
    ))
}

// ── Streaming buffer ──────────────────────────────────────────────────────────

/// Accumulates transport text and yields complete frames in arrival order.
///
/// A single transport message may carry part of a frame, exactly one frame,
/// or several frames back to back.  Text is appended with [`push`] and frames
/// are drained with [`next_frame`] until it returns `Ok(None)`.
///
/// [`push`]: FrameBuffer::push
/// [`next_frame`]: FrameBuffer::next_frame
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly received text.
    pub fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    /// Removes and returns the next complete frame, if any.
    ///
    /// # Errors
    ///
    /// On a decode error other than insufficient data the buffer is cleared,
    /// since nothing after a corrupt frame can be resynchronised reliably.
    /// The same happens once more than [`MAX_FRAME_SIZE`] bytes are pending
    /// without completing a frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match decode_frame(&self.buf) {
            Ok((frame, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            Err(ProtocolError::InsufficientData { available }) if available > MAX_FRAME_SIZE => {
                self.buf.clear();
                Err(ProtocolError::FrameTooLarge {
                    size: available,
                    limit: MAX_FRAME_SIZE,
                })
            }
            Err(ProtocolError::InsufficientData { .. }) => {
                if self.buf.bytes().all(|b| matches!(b, b'\n' | b'\r')) {
                    if !self.buf.is_empty() {
                        trace!("skipping {} heart-beat byte(s)", self.buf.len());
                    }
                    self.buf.clear();
                }
                Ok(None)
            }
            Err(e) => {
                self.buf.clear();
                Err(e)
            }
        }
    }

    /// Number of buffered bytes not yet decoded.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn insufficient(input: &str) -> ProtocolError {
    ProtocolError::InsufficientData {
        available: input.len(),
    }
}

/// Returns the line starting at `start` (without its EOL) and the index just
/// past the `\n`.
fn read_line(input: &str, start: usize) -> Result<(&str, usize), ProtocolError> {
    let offset = input.as_bytes()[start..]
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| insufficient(input))?;
    let line = &input[start..start + offset];
    let line = line.strip_suffix('\r').unwrap_or(line);
    Ok((line, start + offset + 1))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::MalformedHeader(raw.to_string())),
        }
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
