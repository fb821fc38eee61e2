use log::{error, info, warn};
use shared::{decode_text, read_frame, send_text, Announcement, FrameError};
use std::error::Error;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{stdin, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};

/// Binds the discovery port and waits for the first valid announcement
pub async fn discover_server(
    discovery_port: u16,
    wait: Duration,
) -> Result<Announcement, Box<dyn Error>> {
    let socket = UdpSocket::bind(("0.0.0.0", discovery_port)).await?;
    info!("Listening for server announcements on UDP port {}", discovery_port);
    wait_for_announcement(&socket, wait).await
}

/// Reads datagrams until one parses as an announcement, skipping anything else
pub async fn wait_for_announcement(
    socket: &UdpSocket,
    wait: Duration,
) -> Result<Announcement, Box<dyn Error>> {
    let deadline = Instant::now() + wait;
    let mut buf = [0u8; 256];

    loop {
        let (len, from) = timeout_at(deadline, socket.recv_from(&mut buf))
            .await
            .map_err(|_| "no server announcement received")??;

        match Announcement::parse(&String::from_utf8_lossy(&buf[..len])) {
            Some(announcement) => {
                info!("Found server at {} (announced by {})", announcement.addr(), from);
                return Ok(announcement);
            }
            None => warn!("Ignoring unexpected datagram from {}", from),
        }
    }
}

pub struct ChatClient {
    server_addr: SocketAddr,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl ChatClient {
    pub async fn connect(server_addr: SocketAddr) -> Result<Self, Box<dyn Error>> {
        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        let (reader, writer) = stream.into_split();

        Ok(ChatClient {
            server_addr,
            reader,
            writer,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), FrameError> {
        send_text(&mut self.writer, line).await.map(|_| ())
    }

    pub async fn recv_text(&mut self) -> Result<String, FrameError> {
        let payload = read_frame(&mut self.reader).await?;
        decode_text(&payload)
    }

    /// Relays stdin lines to the server and prints every frame it sends back
    ///
    /// Returns when stdin closes or the server hangs up.
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        let ChatClient {
            mut reader,
            mut writer,
            ..
        } = self;

        // Frames are read on their own task since read_frame isn't cancel safe
        let mut printer = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await.and_then(|p| decode_text(&p)) {
                    Ok(text) => {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                    Err(FrameError::MissingTerminator) => warn!("Server sent a malformed frame"),
                    Err(FrameError::Shutdown) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Connection lost: {}", e);
                        break;
                    }
                }
            }
        });

        let mut lines = BufReader::new(stdin()).lines();

        loop {
            tokio::select! {
                _ = &mut printer => break,
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    let line = line.trim_end_matches('\r');
                    if line.is_empty() {
                        continue;
                    }

                    match send_text(&mut writer, line).await {
                        Ok(_) => {}
                        Err(FrameError::TextTooLong(len)) => {
                            warn!("Message is {} bytes, the limit is 254", len);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        let _ = writer.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{encode_text, frame_bytes};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wait_for_announcement_skips_noise() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        sender.send_to(b"not an announcement", target).await.unwrap();
        sender
            .send_to(b"ServerIP: 192.168.0.7 Port: 31337", target)
            .await
            .unwrap();

        let announcement = wait_for_announcement(&listener, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            announcement,
            Announcement::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 7)), 31337)
        );
    }

    #[tokio::test]
    async fn test_wait_for_announcement_times_out() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = wait_for_announcement(&listener, Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_client_exchanges_frames() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let (mut stream, _) = server.accept().await.unwrap();
            let welcome = frame_bytes(&encode_text("hello\n").unwrap()).unwrap();
            stream.write_all(&welcome).await.unwrap();

            let mut received = [0u8; 7];
            stream.read_exact(&mut received).await.unwrap();
            received
        });

        let mut client = ChatClient::connect(addr).await.unwrap();
        assert_eq!(client.server_addr(), addr);
        assert_eq!(client.recv_text().await.unwrap(), "hello\n");

        client.send_line("~help").await.unwrap();
        let received = peer.await.unwrap();
        assert_eq!(&received, b"\x06~help\0");
    }
}
