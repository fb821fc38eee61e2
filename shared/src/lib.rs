//! Wire protocol shared by the chat server and its clients.
//!
//! Every message on the TCP stream is a frame: one unsigned length byte followed
//! by exactly that many payload bytes. Text payloads always carry a trailing NUL,
//! so a frame holds at most 254 characters of text.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
pub const MAX_TEXT_LEN: usize = MAX_PAYLOAD_LEN - 1;
pub const TERMINATOR: u8 = 0;

pub const DEFAULT_PORT: u16 = 31337;
pub const DISCOVERY_PORT: u16 = 31337;
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("peer closed the connection")]
    Shutdown,
    #[error("connection lost: {0}")]
    Disconnected(#[from] io::Error),
    #[error("invalid payload length {0}, must be between 1 and 255")]
    InvalidLength(usize),
    #[error("text of {0} bytes does not fit in a frame (254 max)")]
    TextTooLong(usize),
    #[error("payload is missing its NUL terminator")]
    MissingTerminator,
}

/// EOF while a frame is in flight means the peer hung up cleanly.
fn classify(err: io::Error) -> FrameError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => FrameError::Shutdown,
        _ => FrameError::Disconnected(err),
    }
}

/// Appends the terminator to `text`, producing a payload of `text.len() + 1` bytes.
pub fn encode_text(text: &str) -> Result<Vec<u8>, FrameError> {
    if text.len() > MAX_TEXT_LEN {
        return Err(FrameError::TextTooLong(text.len()));
    }

    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(TERMINATOR);
    Ok(payload)
}

/// Validates and strips the terminator. Text ends at the first NUL in the payload.
pub fn decode_text(payload: &[u8]) -> Result<String, FrameError> {
    match payload.last() {
        Some(&TERMINATOR) => {}
        _ => return Err(FrameError::MissingTerminator),
    }

    let end = payload
        .iter()
        .position(|&b| b == TERMINATOR)
        .unwrap_or(payload.len());
    Ok(String::from_utf8_lossy(&payload[..end]).into_owned())
}

/// Prefixes `payload` with its length byte.
pub fn frame_bytes(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::InvalidLength(payload.len()));
    }

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads exactly one frame. A zero length byte yields an empty payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await.map_err(classify)? as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(classify)?;
    Ok(payload)
}

/// Writes the length byte and the whole payload, returning the bytes written.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = frame_bytes(payload)?;
    writer.write_all(&frame).await.map_err(classify)?;
    writer.flush().await.map_err(classify)?;
    Ok(frame.len())
}

pub async fn send_text<W>(writer: &mut W, text: &str) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_text(text)?;
    write_frame(writer, &payload).await
}

/// Accumulates raw stream bytes and hands out complete frame payloads in arrival order.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Removes the next complete frame, or returns None until `1 + len` bytes are buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let len = *self.pending.first()? as usize;
        if self.pending.len() < 1 + len {
            return None;
        }

        let payload = self.pending[1..=len].to_vec();
        self.pending.drain(..=len);
        Some(payload)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// The UDP discovery advertisement: `"ServerIP: <ip> Port: <port>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub ip: IpAddr,
    pub port: u16,
}

impl Announcement {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_end_matches(['\0', '\n', '\r']).strip_prefix("ServerIP: ")?;
        let (ip, port) = rest.split_once(" Port: ")?;
        Some(Self {
            ip: ip.trim().parse().ok()?,
            port: port.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerIP: {} Port: {}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_appends_terminator() {
        let payload = encode_text("hi").unwrap();
        assert_eq!(payload, vec![b'h', b'i', 0]);
    }

    #[test]
    fn test_encode_decode_boundaries() {
        for len in [0, 1, 100, MAX_TEXT_LEN] {
            let text = "x".repeat(len);
            let payload = encode_text(&text).unwrap();
            assert_eq!(payload.len(), len + 1);
            assert_eq!(decode_text(&payload).unwrap(), text);
        }
    }

    #[test]
    fn test_encode_rejects_oversized_text() {
        let text = "x".repeat(MAX_TEXT_LEN + 1);
        match encode_text(&text) {
            Err(FrameError::TextTooLong(len)) => assert_eq!(len, 255),
            other => panic!("expected TextTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_requires_terminator() {
        assert!(matches!(decode_text(b"hello"), Err(FrameError::MissingTerminator)));
        assert!(matches!(decode_text(b""), Err(FrameError::MissingTerminator)));
    }

    #[test]
    fn test_decode_stops_at_first_nul() {
        assert_eq!(decode_text(b"ab\0cd\0").unwrap(), "ab");
    }

    #[test]
    fn test_frame_bytes_length_bounds() {
        assert!(matches!(frame_bytes(&[]), Err(FrameError::InvalidLength(0))));
        assert!(matches!(
            frame_bytes(&[1u8; 256]),
            Err(FrameError::InvalidLength(256))
        ));

        let frame = frame_bytes(&[7u8; 255]).unwrap();
        assert_eq!(frame.len(), 256);
        assert_eq!(frame[0], 255);
    }

    #[test]
    fn test_frame_buffer_waits_for_complete_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&[3, b'a']);
        assert!(buffer.next_frame().is_none());

        buffer.extend(&[b'b', 0]);
        assert_eq!(buffer.next_frame().unwrap(), vec![b'a', b'b', 0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_buffer_drains_multiple_frames_in_order() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = frame_bytes(&encode_text("one").unwrap()).unwrap();
        bytes.extend(frame_bytes(&encode_text("two").unwrap()).unwrap());
        bytes.extend([5, b'p']);
        buffer.extend(&bytes);

        assert_eq!(decode_text(&buffer.next_frame().unwrap()).unwrap(), "one");
        assert_eq!(decode_text(&buffer.next_frame().unwrap()).unwrap(), "two");
        assert!(buffer.next_frame().is_none());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_frame_buffer_zero_length_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&[0, 1, 0]);
        assert_eq!(buffer.next_frame().unwrap(), Vec::<u8>::new());
        assert_eq!(buffer.next_frame().unwrap(), vec![0]);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_read_frame() {
        let mut stream = Builder::new().read(&[3, b'h', b'i', 0]).build();
        let payload = read_frame(&mut stream).await.unwrap();
        assert_eq!(decode_text(&payload).unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_reads() {
        let mut stream = Builder::new()
            .read(&[4])
            .read(b"ab")
            .read(b"c\0")
            .build();
        let payload = read_frame(&mut stream).await.unwrap();
        assert_eq!(payload, b"abc\0".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_empty_payload() {
        let mut stream = Builder::new().read(&[0]).build();
        assert!(read_frame(&mut stream).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_shutdown() {
        let mut stream = Builder::new().build();
        assert!(matches!(read_frame(&mut stream).await, Err(FrameError::Shutdown)));

        let mut truncated = Builder::new().read(&[5, b'a']).build();
        assert!(matches!(
            read_frame(&mut truncated).await,
            Err(FrameError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_error_is_disconnect() {
        let mut stream = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(FrameError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frame_retries_partial_writes() {
        let mut stream = Builder::new().write(&[3]).write(b"hi\0").build();
        let written = write_frame(&mut stream, b"hi\0").await.unwrap();
        assert_eq!(written, 4);
    }

    #[tokio::test]
    async fn test_write_frame_rejects_bad_lengths() {
        let mut stream = Builder::new().build();
        assert!(matches!(
            write_frame(&mut stream, &[]).await,
            Err(FrameError::InvalidLength(0))
        ));
        assert!(matches!(
            write_frame(&mut stream, &[b'x'; 300]).await,
            Err(FrameError::InvalidLength(300))
        ));
    }

    #[tokio::test]
    async fn test_send_text() {
        let mut stream = Builder::new().write(&[6, b'h', b'e', b'l', b'l', b'o', 0]).build();
        assert_eq!(send_text(&mut stream, "hello").await.unwrap(), 7);
    }

    #[test]
    fn test_announcement_format_and_parse() {
        let announcement = Announcement::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 31337);
        let text = announcement.to_string();
        assert_eq!(text, "ServerIP: 192.168.1.20 Port: 31337");
        assert_eq!(Announcement::parse(&text), Some(announcement));
        assert_eq!(
            announcement.addr(),
            "192.168.1.20:31337".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_announcement_parse_rejects_garbage() {
        assert_eq!(Announcement::parse("hello"), None);
        assert_eq!(Announcement::parse("ServerIP: nope Port: 1"), None);
        assert_eq!(Announcement::parse("ServerIP: 10.0.0.1 Port: 99999"), None);
    }
}
