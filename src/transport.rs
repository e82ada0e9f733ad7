use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use thiserror::Error;
use tungstenite::{Message, WebSocket, client::IntoClientRequest};

use crate::types::Command;

pub const DEFAULT_ENDPOINT: &str = "ws://192.168.4.1/ws";

// How long to wait for the peer to answer our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Delivers a single command to the remote device.
pub trait Transport {
    fn send(&mut self, command: Command) -> Result<(), TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("failed to send message: {0}")]
    Send(#[from] tungstenite::Error),
}

/// Opens a fresh WebSocket connection for every command and closes it
/// right after the text frame is written.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: String,
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl WebSocketTransport {
    pub fn new(url: &str, connect_timeout: Option<Duration>) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let request = url
            .into_client_request()
            .map_err(|err| invalid(&err.to_string()))?;
        let uri = request.uri();
        match uri.scheme_str() {
            Some("ws") => {}
            Some("wss") => return Err(invalid("TLS endpoints are not supported")),
            _ => return Err(invalid("expected a ws:// URL")),
        }
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(80);

        Ok(Self {
            url: url.to_string(),
            host,
            port,
            connect_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            let attempt = match self.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    log::debug!("connect to {addr} failed: {err}");
                    last_err = Some(err);
                }
            }
        }

        Err(match last_err {
            Some(err) => TransportError::Connect(err),
            None => TransportError::Resolve {
                host: self.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            },
        })
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, command: Command) -> Result<(), TransportError> {
        let stream = self.connect()?;
        stream
            .set_read_timeout(self.connect_timeout)
            .and_then(|()| stream.set_write_timeout(self.connect_timeout))
            .map_err(TransportError::Connect)?;

        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidEndpoint {
                url: self.url.clone(),
                reason: err.to_string(),
            })?;
        let (mut socket, _response) = tungstenite::client(request, stream)
            .map_err(|err| TransportError::Handshake(err.to_string()))?;

        socket.send(Message::text(command.as_str()))?;
        close_quietly(&mut socket);
        Ok(())
    }
}

// The command already went out; a peer that botches the close handshake
// doesn't make the send a failure.
fn close_quietly(socket: &mut WebSocket<TcpStream>) {
    if let Err(err) = socket.get_ref().set_read_timeout(Some(CLOSE_TIMEOUT)) {
        log::debug!("failed to set close timeout: {err}");
    }
    if let Err(err) = socket.close(None) {
        log::debug!("failed to start close handshake: {err}");
        return;
    }
    loop {
        match socket.read() {
            Ok(_) => continue,
            Err(tungstenite::Error::ConnectionClosed) => break,
            Err(err) => {
                log::debug!("close handshake incomplete: {err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::mpsc, thread};

    use super::*;

    /// Accepts `connections` WebSocket clients and forwards each text frame.
    fn spawn_server(connections: usize) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for _ in 0..connections {
                let (stream, _) = listener.accept().unwrap();
                let mut socket = tungstenite::accept(stream).unwrap();
                loop {
                    match socket.read() {
                        Ok(Message::Text(text)) => tx.send(text).unwrap(),
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
            }
        });

        (url, rx)
    }

    #[test]
    fn sends_label_as_text_frame() {
        let (url, rx) = spawn_server(1);
        let mut transport = WebSocketTransport::new(&url, Some(Duration::from_secs(5))).unwrap();

        transport.send(Command::Forward).unwrap();

        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, "forward");
    }

    #[test]
    fn opens_one_connection_per_command() {
        let (url, rx) = spawn_server(2);
        let mut transport = WebSocketTransport::new(&url, None).unwrap();

        transport.send(Command::Left).unwrap();
        transport.send(Command::Stop).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((first.as_str(), second.as_str()), ("left", "stop"));
    }

    #[test]
    fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport =
            WebSocketTransport::new(&format!("ws://127.0.0.1:{port}/ws"), None).unwrap();
        let err = transport.send(Command::Right).unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "{err:?}");
    }

    #[test]
    fn rejects_unsupported_endpoints() {
        for url in ["wss://192.168.4.1/ws", "http://192.168.4.1/ws", "not a url"] {
            let err = WebSocketTransport::new(url, None).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{url}: {err:?}"
            );
        }
    }

    #[test]
    fn default_port_is_80() {
        let transport = WebSocketTransport::new(DEFAULT_ENDPOINT, None).unwrap();
        assert_eq!(transport.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!((transport.host.as_str(), transport.port), ("192.168.4.1", 80));
    }
}
