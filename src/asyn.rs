use std::io::{Error, Result};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

use tokio::io::unix::AsyncFd;

use crate::sctp::{RecvMsg, SctpSocket, SndInfo, SocketKind};

/// Tokio wrapper around [`SctpSocket`].
///
/// The socket is switched to nonblocking mode on construction and every
/// operation retries transparently on `EWOULDBLOCK` (after waiting for
/// readiness) and on `EINTR`.
#[derive(Debug)]
pub struct AsyncSctpSocket {
    afd: AsyncFd<SctpSocket>,
}

fn is_eintr(e: &Error) -> bool {
    e.raw_os_error() == Some(libc::EINTR)
}

fn is_ewouldblock(e: &Error) -> bool {
    e.raw_os_error() == Some(libc::EWOULDBLOCK)
}

impl AsyncSctpSocket {
    pub fn new(kind: SocketKind) -> Result<Self> {
        let socket = SctpSocket::new(kind)?;
        socket.set_noblock()?;
        Ok(Self {
            afd: AsyncFd::new(socket)?,
        })
    }

    fn from_socket(socket: SctpSocket) -> Result<Self> {
        socket.set_noblock()?;
        Ok(Self {
            afd: AsyncFd::new(socket)?,
        })
    }

    pub fn set_v6only(&self, enable: bool) -> Result<()> {
        self.afd.get_ref().set_v6only(enable)
    }

    pub fn bind(&self, address: SocketAddr) -> Result<()> {
        self.afd.get_ref().bind(address)
    }

    pub fn listen(&self, backlog: i32) -> Result<()> {
        self.afd.get_ref().listen(backlog)
    }

    pub fn subscribe_data_io(&self) -> Result<()> {
        self.afd.get_ref().subscribe_data_io()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.afd.get_ref().local_addr()
    }

    pub fn shutdown(&self, how: std::net::Shutdown) -> Result<()> {
        self.afd.get_ref().shutdown(how)
    }

    pub async fn accept(&self) -> Result<(AsyncSctpSocket, Option<SocketAddr>)> {
        loop {
            match self.afd.get_ref().accept() {
                Ok((new, peer)) => return Ok((Self::from_socket(new)?, peer)),
                Err(e) if is_eintr(&e) => continue,
                Err(e) if is_ewouldblock(&e) => {
                    self.afd.readable().await?.clear_ready();
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn connect(&self, address: SocketAddr) -> Result<()> {
        match self.afd.get_ref().connect(address) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) => return Err(e),
        }
        let _guard = self.afd.writable().await?;

        let mut so_error: libc::c_int = 0;
        self.afd
            .get_ref()
            .getsockopt(libc::SOL_SOCKET, libc::SO_ERROR, &mut so_error)?;
        if so_error != 0 {
            Err(Error::from_raw_os_error(so_error))
        } else {
            Ok(())
        }
    }

    pub async fn sendmsg(
        &self,
        data: &[u8],
        info: &SndInfo,
        dst: Option<SocketAddr>,
    ) -> Result<usize> {
        loop {
            let mut guard = self.afd.writable().await?;
            match self.afd.get_ref().sendmsg(data, info, dst) {
                Err(e) if is_eintr(&e) => continue,
                Err(e) if is_ewouldblock(&e) => {
                    guard.clear_ready();
                    continue;
                }
                res => return res,
            }
        }
    }

    pub async fn recvmsg(&self, data: &mut [u8]) -> Result<RecvMsg> {
        loop {
            let mut guard = self.afd.readable().await?;
            match self.afd.get_ref().recvmsg(data) {
                Err(e) if is_eintr(&e) => continue,
                Err(e) if is_ewouldblock(&e) => {
                    guard.clear_ready();
                    continue;
                }
                res => return res,
            }
        }
    }
}

impl AsRawFd for AsyncSctpSocket {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.afd.as_raw_fd()
    }
}
