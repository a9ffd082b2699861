//! Length-prefixed frame transport for the Copilot CLI server protocol.
//!
//! Each message on the wire is one frame:
//!
//! ```text
//! Content-Length: <decimal>\r\n
//! \r\n
//! <that many bytes of UTF-8 JSON>
//! ```
//!
//! Header names are matched case-insensitively and unknown header lines are
//! ignored. The writer always emits `\r\n` line endings; the reader also
//! tolerates bare `\n`. Both the stdio pipes of a spawned CLI process and a
//! TCP socket satisfy the same contract.

use crate::error::{Error, Result};
use log::trace;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{ChildStdin, ChildStdout};

/// Buffer size for the inbound reader (10MB). The CLI can emit very large
/// frames when sessions carry big tool results.
const READ_BUFFER_SIZE: usize = 10 * 1024 * 1024;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A bidirectional byte stream to the CLI server, pipe- or socket-backed.
pub(crate) struct Transport {
    pub reader: BufReader<BoxedReader>,
    pub writer: BoxedWriter,
}

impl Transport {
    /// Wrap the stdio pipes of a spawned CLI process.
    pub fn from_child_pipes(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, Box::new(stdout) as BoxedReader),
            writer: Box::new(stdin),
        }
    }

    /// Wrap a connected TCP socket.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, Box::new(read_half) as BoxedReader),
            writer: Box::new(write_half),
        }
    }
}

/// Read one frame, returning its body bytes.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary. A zero
/// `Content-Length` is legal and yields an empty body, which the caller must
/// skip. EOF in the middle of a header block or body is a transport fault.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if saw_header {
                return Err(Error::Protocol("truncated frame header".to_string()));
            }
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            // Blank line ends the header block.
            break;
        }
        saw_header = true;

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = Some(value.trim().parse::<usize>().map_err(|_| {
                    Error::Protocol(format!("invalid Content-Length header: {}", trimmed))
                })?);
            }
            // Unknown headers are tolerated and ignored.
        }
    }

    let len = content_length
        .ok_or_else(|| Error::Protocol("frame header missing Content-Length".to_string()))?;

    let mut body = vec![0u8; len];
    if len > 0 {
        use tokio::io::AsyncReadExt;
        reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Protocol("truncated frame body".to_string())
            } else {
                Error::Io(e)
            }
        })?;
    }

    trace!("[TRANSPORT] read frame ({} bytes)", len);
    Ok(Some(body))
}

/// Write one frame. The header and body go out as a single logical write;
/// callers serialize concurrent writers behind a mutex so frames never
/// interleave.
pub(crate) async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    trace!("[TRANSPORT] wrote frame ({} bytes)", body.len());
    Ok(())
}
