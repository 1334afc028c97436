//! Reply framing shared by all drivers.
//!
//! Three wire shapes cover the supported instruments:
//!
//! - **Line**: text terminated by a fixed byte sequence (`\r\n`, `\r`, ...)
//! - **STX/ETX**: `STX body ETX [BCC]`, where BCC is the XOR of body and ETX
//! - **Length-prefixed**: big-endian `u16` length followed by that many bytes

use crate::error::{SpectroError, SpectroResult};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Start-of-text.
pub const STX: u8 = 0x02;
/// End-of-text.
pub const ETX: u8 = 0x03;
/// Largest frame accepted from an instrument.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// How a reply frame is delimited on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// The command has no reply.
    None,
    /// Text line ending in `terminator` (non-empty).
    Line {
        /// Terminator bytes, stripped from the returned frame.
        terminator: &'static [u8],
    },
    /// `STX body ETX`, optionally followed by an XOR block check byte.
    StxEtx {
        /// Whether a BCC byte follows ETX.
        checksum: bool,
    },
    /// Big-endian `u16` length prefix, then the body.
    LengthPrefixed,
}

/// XOR of all bytes.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrap `body` as `STX body ETX BCC`.
pub fn encode_stx_etx(body: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(body.len() + 3);
    frame.put_u8(STX);
    frame.put_slice(body);
    frame.put_u8(ETX);
    frame.put_u8(xor_checksum(body) ^ ETX);
    frame.freeze()
}

/// Prefix `body` with its big-endian `u16` length.
pub fn encode_length_prefixed(body: &[u8]) -> SpectroResult<Bytes> {
    let len = u16::try_from(body.len())
        .map_err(|_| SpectroError::Framing(format!("body of {} bytes too long", body.len())))?;
    let mut frame = BytesMut::with_capacity(body.len() + 2);
    frame.put_u16(len);
    frame.put_slice(body);
    Ok(frame.freeze())
}

fn map_eof(err: std::io::Error) -> SpectroError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        SpectroError::UnexpectedEof
    } else {
        SpectroError::Io(err)
    }
}

/// Read exactly one frame.
///
/// Returns the frame body with delimiters, length prefix and checksum removed.
/// `Framing::None` returns an empty frame without touching the reader.
pub async fn read_frame<R>(reader: &mut R, framing: &Framing) -> SpectroResult<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::None => Ok(Bytes::new()),
        Framing::Line { terminator } => read_line(reader, terminator).await,
        Framing::StxEtx { checksum } => read_stx_etx(reader, *checksum).await,
        Framing::LengthPrefixed => read_length_prefixed(reader).await,
    }
}

/// Append bytes up to and including `delim` to `buf`.
///
/// Fails with a framing error as soon as `buf` would grow past `limit`, so a
/// link streaming bytes without the delimiter never buffers more than that.
/// Returns 0 at end of stream.
async fn read_until_bounded<R>(
    reader: &mut R,
    delim: u8,
    buf: &mut Vec<u8>,
    limit: usize,
) -> SpectroResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(total);
        }
        let (found, used) = match available.iter().position(|&b| b == delim) {
            Some(i) => (true, i + 1),
            None => (false, available.len()),
        };
        if buf.len() + used > limit {
            reader.consume(used);
            return Err(SpectroError::Framing(format!(
                "frame exceeds {MAX_FRAME_LEN} bytes"
            )));
        }
        buf.extend_from_slice(&available[..used]);
        reader.consume(used);
        total += used;
        if found {
            return Ok(total);
        }
    }
}

async fn read_line<R>(reader: &mut R, terminator: &[u8]) -> SpectroResult<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let Some(&last) = terminator.last() else {
        return Err(SpectroError::Framing("empty line terminator".into()));
    };

    let limit = MAX_FRAME_LEN + terminator.len();
    let mut line = Vec::new();
    loop {
        let n = read_until_bounded(reader, last, &mut line, limit).await?;
        if n == 0 {
            return Err(SpectroError::UnexpectedEof);
        }
        if line.ends_with(terminator) {
            line.truncate(line.len() - terminator.len());
            if line.len() > MAX_FRAME_LEN {
                return Err(SpectroError::Framing(format!(
                    "line exceeds {MAX_FRAME_LEN} bytes"
                )));
            }
            return Ok(Bytes::from(line));
        }
    }
}

async fn read_stx_etx<R>(reader: &mut R, checksum: bool) -> SpectroResult<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    // Skip line noise until the start byte.
    let mut skipped = 0usize;
    loop {
        let b = reader.read_u8().await.map_err(map_eof)?;
        if b == STX {
            break;
        }
        skipped += 1;
        if skipped > MAX_FRAME_LEN {
            return Err(SpectroError::Framing("no STX found".into()));
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "Discarded bytes before STX");
    }

    let mut body = Vec::new();
    let n = read_until_bounded(reader, ETX, &mut body, MAX_FRAME_LEN + 1).await?;
    if n == 0 || body.last() != Some(&ETX) {
        return Err(SpectroError::UnexpectedEof);
    }
    body.pop();

    if checksum {
        let bcc = reader.read_u8().await.map_err(map_eof)?;
        let expected = xor_checksum(&body) ^ ETX;
        if bcc != expected {
            return Err(SpectroError::Framing(format!(
                "checksum mismatch: got {bcc:#04x}, expected {expected:#04x}"
            )));
        }
    }

    Ok(Bytes::from(body))
}

async fn read_length_prefixed<R>(reader: &mut R) -> SpectroResult<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let len = reader.read_u16().await.map_err(map_eof)? as usize;
    if len == 0 {
        return Err(SpectroError::Framing("zero-length frame".into()));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(map_eof)?;
    Ok(Bytes::from(body))
}
