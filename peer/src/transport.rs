//! TCP transport tasks carrying length-prefixed frames between two peers

use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Largest accepted frame payload in bytes. Game messages are tiny, so
/// anything near this limit means a corrupt prefix or a hostile peer.
pub const MAX_FRAME: u32 = 64 * 1024;

/// Events reported by transport tasks to the session loop
///
/// Events carry no link identity: the loop owns at most one live link at a
/// time and swaps in a fresh event channel whenever it tears one down, so
/// stragglers from an abandoned link never reach it.
#[derive(Debug)]
pub enum TransportEvent {
    /// The listener accepted a connection (host side only).
    Incoming { peer: SocketAddr, link: Link },
    /// The link is open and ready to carry frames.
    Opened { peer: SocketAddr },
    /// One whole frame arrived.
    Data { bytes: Vec<u8> },
    /// The remote peer closed the link.
    Closed,
    /// The link failed.
    Error { message: String },
}

/// Sending half of a link
///
/// Frames are queued to the writer task and leave the socket in queue
/// order. Dropping every clone of a `Link` shuts the writer down, which
/// closes the connection.
#[derive(Debug, Clone)]
pub struct Link {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Link {
    /// Queues one frame. Returns false once the writer task is gone.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

/// Binds a listener and spawns the accept task (host side)
///
/// Resolves with the bound address as soon as the listener is up, so a
/// caller binding port zero learns the real port. The task accepts exactly
/// one connection and then drops the listener: this is a two-player game,
/// and refusing later dials at the OS level keeps the session loop from
/// ever seeing a second opponent.
pub async fn listen(
    bind: SocketAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind).await?;
    let local = listener.local_addr()?;
    info!("Listening on {}", local);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Accepted connection from {}", peer);
                    let (tx, rx) = mpsc::unbounded_channel();
                    // Incoming must reach the loop before the link's Opened
                    if events
                        .send(TransportEvent::Incoming {
                            peer,
                            link: Link { tx },
                        })
                        .is_err()
                    {
                        return;
                    }
                    let link_events = events.clone();
                    tokio::spawn(async move {
                        if link_events.send(TransportEvent::Opened { peer }).is_ok() {
                            run_link(stream, rx, link_events).await;
                        }
                    });
                    return;
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    });

    Ok(local)
}

/// Starts dialing the host (guest side)
///
/// Returns the link immediately; frames queued before the dial completes
/// are flushed once it does. The spawned task reports `Opened` on success
/// or `Error` if the dial fails.
pub fn connect(addr: SocketAddr, events: mpsc::UnboundedSender<TransportEvent>) -> Link {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if events.send(TransportEvent::Opened { peer: addr }).is_ok() {
                    run_link(stream, rx, events).await;
                }
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error {
                    message: format!("connect to {} failed: {}", addr, e),
                });
            }
        }
    });

    Link { tx }
}

/// Drives one open connection until either side is done
///
/// The writer drains the outbound queue; the reader turns the byte stream
/// back into frames and reports them. Ends when the queue closes, the
/// remote peer closes, the link errors, or the event channel is dropped.
async fn run_link(
    stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let writer_events = events.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = outbound.recv().await {
            if let Err(e) = write_frame(&mut writer, &bytes).await {
                let _ = writer_events.send(TransportEvent::Error {
                    message: format!("send failed: {}", e),
                });
                break;
            }
        }
    });

    loop {
        match read_frame(&mut reader).await {
            Ok(Some(bytes)) => {
                if events.send(TransportEvent::Data { bytes }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = events.send(TransportEvent::Closed);
                break;
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error {
                    message: format!("receive failed: {}", e),
                });
                break;
            }
        }
    }

    writer_task.abort();
}

/// Reads one frame. `Ok(None)` means the peer closed before a new frame
/// started; an EOF in the middle of a frame is an error.
async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).await?;
    Ok(Some(bytes))
}

async fn write_frame(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    if bytes.len() > MAX_FRAME as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("refusing to send {} byte frame", bytes.len()),
        ));
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    /// Brings up a connected host/guest pair on a loopback port.
    async fn connected_pair() -> (
        Link,
        mpsc::UnboundedReceiver<TransportEvent>,
        Link,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let (guest_tx, mut guest_rx) = mpsc::unbounded_channel();

        let addr = listen("127.0.0.1:0".parse().unwrap(), host_tx)
            .await
            .unwrap();
        let guest_link = connect(addr, guest_tx);

        let host_link = match next_event(&mut host_rx).await {
            TransportEvent::Incoming { link, .. } => link,
            other => panic!("Expected incoming connection, got {:?}", other),
        };
        assert!(matches!(
            next_event(&mut host_rx).await,
            TransportEvent::Opened { .. }
        ));
        assert!(matches!(
            next_event(&mut guest_rx).await,
            TransportEvent::Opened { .. }
        ));

        (host_link, host_rx, guest_link, guest_rx)
    }

    #[tokio::test]
    async fn test_frames_cross_in_both_directions() {
        let (host_link, mut host_rx, guest_link, mut guest_rx) = connected_pair().await;

        assert!(guest_link.send(b"from guest".to_vec()));
        match next_event(&mut host_rx).await {
            TransportEvent::Data { bytes } => assert_eq!(bytes, b"from guest"),
            other => panic!("Expected data, got {:?}", other),
        }

        assert!(host_link.send(b"from host".to_vec()));
        match next_event(&mut guest_rx).await {
            TransportEvent::Data { bytes } => assert_eq!(bytes, b"from host"),
            other => panic!("Expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_arrive_in_send_order() {
        let (_host_link, mut host_rx, guest_link, _guest_rx) = connected_pair().await;

        for i in 0u8..10 {
            assert!(guest_link.send(vec![i; 3]));
        }
        for i in 0u8..10 {
            match next_event(&mut host_rx).await {
                TransportEvent::Data { bytes } => assert_eq!(bytes, vec![i; 3]),
                other => panic!("Expected data, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_frame_roundtrip() {
        let (_host_link, mut host_rx, guest_link, _guest_rx) = connected_pair().await;

        assert!(guest_link.send(Vec::new()));
        match next_event(&mut host_rx).await {
            TransportEvent::Data { bytes } => assert!(bytes.is_empty()),
            other => panic!("Expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropping_link_closes_remote_side() {
        let (host_link, mut host_rx, guest_link, _guest_rx) = connected_pair().await;

        drop(guest_link);
        assert!(matches!(next_event(&mut host_rx).await, TransportEvent::Closed));

        // The host's writer is gone with the connection
        host_link.send(b"too late".to_vec());
    }

    #[tokio::test]
    async fn test_oversized_frame_prefix_is_an_error() {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let addr = listen("127.0.0.1:0".parse().unwrap(), host_tx)
            .await
            .unwrap();

        // Raw client claiming an absurd frame length
        let mut stream = TcpStream::connect(addr).await.unwrap();
        while !matches!(
            next_event(&mut host_rx).await,
            TransportEvent::Opened { .. }
        ) {}
        stream
            .write_all(&(MAX_FRAME + 1).to_le_bytes())
            .await
            .unwrap();

        match next_event(&mut host_rx).await {
            TransportEvent::Error { message } => assert!(message.contains("exceeds limit")),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_an_error() {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let addr = listen("127.0.0.1:0".parse().unwrap(), host_tx)
            .await
            .unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        while !matches!(
            next_event(&mut host_rx).await,
            TransportEvent::Opened { .. }
        ) {}
        // Promise 100 bytes, deliver 2, hang up
        stream.write_all(&100u32.to_le_bytes()).await.unwrap();
        stream.write_all(&[1, 2]).await.unwrap();
        drop(stream);

        match next_event(&mut host_rx).await {
            TransportEvent::Error { message } => assert!(message.contains("receive failed")),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_dial_is_refused() {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let addr = listen("127.0.0.1:0".parse().unwrap(), host_tx)
            .await
            .unwrap();

        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let _first = connect(addr, first_tx);
        assert!(matches!(
            next_event(&mut host_rx).await,
            TransportEvent::Incoming { .. }
        ));
        assert!(matches!(
            next_event(&mut first_rx).await,
            TransportEvent::Opened { .. }
        ));

        // The listener is gone after the first accept, so a later dial
        // fails outright instead of producing a second opponent.
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let _second = connect(addr, second_tx);
        match next_event(&mut second_rx).await {
            TransportEvent::Error { message } => assert!(message.contains("connect")),
            TransportEvent::Opened { .. } => {
                // Some platforms let the dial land in the accept backlog
                // before the listener closes; it must still die promptly.
                assert!(matches!(
                    next_event(&mut second_rx).await,
                    TransportEvent::Closed | TransportEvent::Error { .. }
                ));
            }
            other => panic!("Expected refusal, got {:?}", other),
        }
    }
}
