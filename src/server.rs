use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::asyn::AsyncSctpSocket;
use crate::config::Config;
use crate::dump::print_dump;
use crate::sctp::{SndInfo, SocketKind, SCTP_UNORDERED};
use crate::shutdown::ShutdownFlag;

/// How long a blocking wait may run before the shutdown flag is re-checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const LISTEN_BACKLOG: i32 = 2;

/// Fatal setup and runtime failures. Each one ends the process with a failure
/// status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to create socket: {0}")]
    Socket(#[source] io::Error),
    #[error("unable to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("unable to listen: {0}")]
    Listen(#[source] io::Error),
    #[error("error in accept(): {0}")]
    Accept(#[source] io::Error),
    #[error("error while receiving: {0}")]
    Recv(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// The server context: listening socket, receive buffer and resolved options.
///
/// The buffer capacity is fixed at startup and every receive reads into it;
/// the socket is owned here and closed exactly once when the server is
/// dropped.
pub struct Server {
    socket: AsyncSctpSocket,
    recvbuf: Vec<u8>,
    kind: SocketKind,
    echo: bool,
    verbose: bool,
    shutdown: ShutdownFlag,
}

impl Server {
    /// Creates the listening socket for the configured mode and binds the
    /// dual-stack wildcard address on the configured port.
    ///
    /// For sequenced-packet mode with verbose diagnostics this also
    /// subscribes to data io event notifications; a subscription failure only
    /// downgrades verbosity.
    pub fn bind(cfg: &Config, shutdown: ShutdownFlag) -> Result<Server> {
        debug!("creating {:?} socket", cfg.kind);
        let socket = AsyncSctpSocket::new(cfg.kind).map_err(ServerError::Socket)?;
        socket.set_v6only(false).map_err(ServerError::Socket)?;

        debug!("binding to port {}", cfg.port);
        let wildcard = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), cfg.port);
        socket.bind(wildcard).map_err(|source| ServerError::Bind {
            port: cfg.port,
            source,
        })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(ServerError::Listen)?;

        let mut verbose = cfg.verbose;
        if cfg.kind == SocketKind::SeqPacket && cfg.verbose {
            if let Err(e) = socket.subscribe_data_io() {
                warn!("unable to subscribe to SCTP data io events: {e}");
                verbose = false;
            }
        }

        Ok(Server {
            socket,
            recvbuf: vec![0u8; cfg.recvbuf_size as usize],
            kind: cfg.kind,
            echo: cfg.echo,
            verbose,
            shutdown,
        })
    }

    /// Local address of the listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves until the shutdown flag is set or a fatal error occurs.
    pub async fn run(&mut self) -> Result<()> {
        match self.kind {
            SocketKind::Stream => self.run_stream().await,
            SocketKind::SeqPacket => self.run_seqpacket().await,
        }
    }

    /// Stream mode: accept one association at a time and serve it to
    /// completion. An accept failure is fatal; a failed session is not.
    async fn run_stream(&mut self) -> Result<()> {
        while !self.shutdown.is_requested() {
            let (conn, peer) = match timeout(POLL_INTERVAL, self.socket.accept()).await {
                Err(_) => continue,
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => return Err(ServerError::Accept(e)),
            };
            match peer {
                Some(addr) => println!("Connection from {}", display_peer(addr)),
                None => println!("Connection from unknown"),
            }
            if let Err(e) = self.serve_session(&conn).await {
                error!("session ended with error: {e}");
            }
            // conn dropped here; the accepted socket is closed whether the
            // session succeeded or failed
        }
        Ok(())
    }

    /// One accepted association: wait for data, dump it, optionally echo it
    /// back, until the peer closes or shutdown is requested.
    async fn serve_session(&mut self, conn: &AsyncSctpSocket) -> io::Result<()> {
        while !self.shutdown.is_requested() {
            let msg = match timeout(POLL_INTERVAL, conn.recvmsg(&mut self.recvbuf)).await {
                Err(_) => continue,
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) if is_conn_reset(&e) => {
                    println!("Connection closed by the remote host");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
            };
            if msg.len == 0 {
                println!("Connection closed by the remote host");
                return Ok(());
            }
            debug!("received {} bytes", msg.len);
            print_dump("Received data", &self.recvbuf[..msg.len]);
            if self.echo {
                debug!("echoing data back");
                if let Err(e) = conn
                    .sendmsg(&self.recvbuf[..msg.len], &SndInfo::default(), None)
                    .await
                {
                    warn!("send failed while echoing received data: {e}");
                }
            }
        }
        Ok(())
    }

    /// Sequenced-packet mode: the listening socket itself carries the data.
    /// A closed association only prints a notice; the loop keeps serving
    /// other peers. A non-interrupted receive error is fatal.
    async fn run_seqpacket(&mut self) -> Result<()> {
        while !self.shutdown.is_requested() {
            let msg = match timeout(POLL_INTERVAL, self.socket.recvmsg(&mut self.recvbuf)).await {
                Err(_) => continue,
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) if is_conn_reset(&e) => {
                    println!("Connection closed by remote host");
                    continue;
                }
                Ok(Err(e)) => return Err(ServerError::Recv(e)),
            };
            if msg.notification {
                debug!("skipping event notification ({} bytes)", msg.len);
                continue;
            }
            if msg.len == 0 {
                println!("Connection closed by remote host");
                continue;
            }
            debug!("received {} bytes", msg.len);
            match msg.peer {
                Some(addr) => {
                    let addr = display_peer(addr);
                    println!(
                        "Packet from {}:{} with {} bytes of data",
                        addr.ip(),
                        addr.port(),
                        msg.len
                    );
                }
                None => println!("Packet from unknown with {} bytes of data", msg.len),
            }
            if self.verbose {
                let info = &msg.info;
                println!(
                    "\t stream: {} ppid: {} context: {}",
                    info.sinfo_stream,
                    u32::from_be(info.sinfo_ppid),
                    info.sinfo_context
                );
                println!(
                    "\t ssn: {} tsn: {} cumtsn: {} [{}]",
                    info.sinfo_ssn,
                    info.sinfo_tsn,
                    info.sinfo_cumtsn,
                    ordering_label(info.sinfo_flags)
                );
            }
            print_dump("Received data", &self.recvbuf[..msg.len]);
            if self.echo {
                debug!("echoing data back");
                // echo on the stream and with the PPID the message arrived with
                let info = SndInfo {
                    snd_sid: msg.info.sinfo_stream,
                    snd_ppid: msg.info.sinfo_ppid,
                    ..Default::default()
                };
                if let Err(e) = self
                    .socket
                    .sendmsg(&self.recvbuf[..msg.len], &info, msg.peer)
                    .await
                {
                    warn!("error while echoing data: {e}");
                }
            }
        }
        Ok(())
    }
}

fn is_conn_reset(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ECONNRESET)
}

/// Ordering indicator for the delivery metadata line.
fn ordering_label(sinfo_flags: u16) -> &'static str {
    if sinfo_flags & SCTP_UNORDERED != 0 {
        "unordered"
    } else {
        "ordered"
    }
}

/// Renders IPv4-mapped peers with their IPv4 form; native IPv6 peers pass
/// through unchanged.
fn display_peer(addr: SocketAddr) -> SocketAddr {
    if let IpAddr::V6(v6) = addr.ip() {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return SocketAddr::new(IpAddr::V4(v4), addr.port());
        }
    }
    addr
}
