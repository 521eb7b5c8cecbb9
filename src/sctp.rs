use std::io::{Error, Result};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use os_socketaddr::OsSocketAddr;

const SOL_SCTP: libc::c_int = 132;

// setsockopt
const SCTP_EVENTS: libc::c_int = 11;

// cmsg types (RFC 6458)
const SCTP_SNDRCV: i32 = 1;
const SCTP_SNDINFO: i32 = 2;

/// Bit set in `sinfo_flags` when a message was delivered outside stream
/// ordering.
pub const SCTP_UNORDERED: u16 = 1;

/// Set in `msg_flags` when the read returned an event notification instead of
/// user data.
const MSG_NOTIFICATION: libc::c_int = 0x8000;

/// Socket type the server runs in, resolved once from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// One-to-one, connection oriented (`SOCK_STREAM`).
    Stream,
    /// One-to-many, message oriented (`SOCK_SEQPACKET`).
    SeqPacket,
}

impl SocketKind {
    fn as_raw(self) -> libc::c_int {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }
}

/// Per-message delivery metadata filled from the `SCTP_SNDRCV` ancillary data.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SndRcvInfo {
    pub sinfo_stream: u16,
    pub sinfo_ssn: u16,
    pub sinfo_flags: u16,
    pub sinfo_ppid: u32,
    pub sinfo_context: u32,
    pub sinfo_timetolive: u32,
    pub sinfo_tsn: u32,
    pub sinfo_cumtsn: u32,
    pub sinfo_assoc_id: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SndInfo {
    pub snd_sid: u16,
    pub snd_flags: u16,
    pub snd_ppid: u32,
    pub snd_context: u32,
    pub snd_assoc_id: i32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct SctpEventSubscribe {
    sctp_data_io_event: u8,
    sctp_association_event: u8,
    sctp_address_event: u8,
    sctp_send_failure_event: u8,
    sctp_peer_error_event: u8,
    sctp_shutdown_event: u8,
    sctp_partial_delivery_event: u8,
    sctp_adaptation_layer_event: u8,
    sctp_authentication_event: u8,
    sctp_sender_dry_event: u8,
    sctp_stream_reset_event: u8,
    sctp_assoc_reset_event: u8,
    sctp_stream_change_event: u8,
    sctp_send_failure_event_event: u8,
}

/// Outcome of one `recvmsg()` call.
#[derive(Debug)]
pub struct RecvMsg {
    /// Number of payload bytes read. Zero means the peer shut the
    /// association down.
    pub len: usize,
    /// Sender address, when the kernel reported one we can decode.
    pub peer: Option<SocketAddr>,
    /// Delivery metadata; all zeroes unless data io events are subscribed.
    pub info: SndRcvInfo,
    /// The message is an SCTP event notification, not user data.
    pub notification: bool,
}

fn handle_libc_error(err: i32) -> Result<()> {
    if err == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Thin owner of a kernel SCTP socket.
#[derive(Debug)]
pub struct SctpSocket {
    fd: RawFd,
}

impl SctpSocket {
    /// Creates an IPv6 SCTP socket of the given kind. With `set_v6only(false)`
    /// it also accepts IPv4-mapped peers.
    pub fn new(kind: SocketKind) -> Result<Self> {
        let fd = unsafe { libc::socket(libc::PF_INET6, kind.as_raw(), libc::IPPROTO_SCTP) };
        if fd == -1 {
            return Err(Error::last_os_error());
        }
        Ok(Self { fd })
    }

    fn setsockopt<T>(&self, level: libc::c_int, option: libc::c_int, value: T) -> Result<()> {
        handle_libc_error(unsafe {
            libc::setsockopt(
                self.fd,
                level,
                option,
                &value as *const T as *const libc::c_void,
                std::mem::size_of_val(&value) as libc::socklen_t,
            )
        })
    }

    pub(crate) fn getsockopt<T>(
        &self,
        level: libc::c_int,
        option: libc::c_int,
        value: &mut T,
    ) -> Result<()> {
        let mut n = std::mem::size_of::<T>() as libc::socklen_t;
        handle_libc_error(unsafe {
            libc::getsockopt(
                self.fd,
                level,
                option,
                value as *mut T as *mut libc::c_void,
                &mut n,
            )
        })
    }

    pub fn set_v6only(&self, enable: bool) -> Result<()> {
        let opt: libc::c_int = if enable { 1 } else { 0 };
        self.setsockopt(libc::IPPROTO_IPV6, libc::IPV6_V6ONLY, opt)
    }

    /// Subscribes to per-message delivery metadata (`sctp_data_io_event`),
    /// preserving any events already enabled on the socket.
    pub fn subscribe_data_io(&self) -> Result<()> {
        let mut events = SctpEventSubscribe::default();
        self.getsockopt(SOL_SCTP, SCTP_EVENTS, &mut events)?;
        events.sctp_data_io_event = 1;
        self.setsockopt(SOL_SCTP, SCTP_EVENTS, events)
    }

    pub fn set_noblock(&self) -> Result<()> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(Error::last_os_error());
        }
        let res = unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if res == -1 {
            Err(Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub fn bind(&self, address: SocketAddr) -> Result<()> {
        let ossockaddr: OsSocketAddr = address.into();
        let addrslice = ossockaddr.as_ref();
        handle_libc_error(unsafe {
            libc::bind(
                self.fd,
                addrslice.as_ptr() as *const libc::sockaddr,
                addrslice.len() as libc::socklen_t,
            )
        })
    }

    pub fn connect(&self, address: SocketAddr) -> Result<()> {
        let ossockaddr: OsSocketAddr = address.into();
        let addrslice = ossockaddr.as_ref();
        handle_libc_error(unsafe {
            libc::connect(
                self.fd,
                addrslice.as_ptr() as *const libc::sockaddr,
                addrslice.len() as libc::socklen_t,
            )
        })
    }

    pub fn listen(&self, backlog: i32) -> Result<()> {
        handle_libc_error(unsafe { libc::listen(self.fd, backlog) })
    }

    /// Accepts one pending association, returning the connected socket and
    /// the peer address when the kernel handed back one we can decode.
    pub fn accept(&self) -> Result<(SctpSocket, Option<SocketAddr>)> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let r = unsafe {
            libc::accept(
                self.fd,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if r < 0 {
            return Err(Error::last_os_error());
        }
        let peer = unsafe {
            OsSocketAddr::copy_from_raw(&storage as *const _ as *const libc::sockaddr, len)
        }
        .into_addr();
        Ok((SctpSocket { fd: r }, peer))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        handle_libc_error(unsafe {
            libc::getsockname(
                self.fd,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        })?;
        let osa = unsafe {
            OsSocketAddr::copy_from_raw(&storage as *const _ as *const libc::sockaddr, len)
        };
        match osa.into_addr() {
            Some(addr) => Ok(addr),
            None => Err(Error::new(
                std::io::ErrorKind::Other,
                "invalid socket address",
            )),
        }
    }

    /// Sends one message, carrying stream id and PPID in an `SCTP_SNDINFO`
    /// cmsg. A destination address is given only on one-to-many sockets where
    /// the message addresses the association implicitly.
    pub fn sendmsg(&self, data: &[u8], info: &SndInfo, dst: Option<SocketAddr>) -> Result<usize> {
        let mut iovec_item = libc::iovec {
            iov_base: data.as_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };
        // enough room on stack to avoid an extra allocation
        const SPACE: usize = 512;
        let hbuffer = [0u8; SPACE];

        // kept alive until sendmsg returns; msg_name points into it
        let dst_os: Option<OsSocketAddr> = dst.map(Into::into);

        // zeroed must be used to support linux-musl which has private padding
        let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
        msghdr.msg_iov = &mut iovec_item;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = &hbuffer as *const _ as *mut libc::c_void;
        msghdr.msg_controllen = SPACE as _;
        if let Some(os) = &dst_os {
            let slice = os.as_ref();
            msghdr.msg_name = slice.as_ptr() as *mut libc::c_void;
            msghdr.msg_namelen = slice.len() as libc::socklen_t;
        }
        unsafe {
            let hlen = libc::CMSG_LEN(std::mem::size_of::<SndInfo>() as u32) as _;
            let cmsg_hdr = libc::CMSG_FIRSTHDR(&msghdr);
            if !cmsg_hdr.is_null() {
                (*cmsg_hdr).cmsg_level = libc::IPPROTO_SCTP;
                (*cmsg_hdr).cmsg_type = SCTP_SNDINFO;
                (*cmsg_hdr).cmsg_len = hlen;

                std::ptr::copy(
                    std::ptr::addr_of!(*info) as *const _,
                    libc::CMSG_DATA(cmsg_hdr),
                    std::mem::size_of::<SndInfo>(),
                );
                msghdr.msg_controllen = hlen;
            }
        }
        let r = unsafe { libc::sendmsg(self.fd, &msghdr as *const _ as *mut libc::msghdr, 0) };
        if r < 0 {
            Err(Error::last_os_error())
        } else {
            Ok(r as usize)
        }
    }

    /// Reads one message, capturing the sender address and any `SCTP_SNDRCV`
    /// delivery metadata the kernel attached.
    pub fn recvmsg(&self, data: &mut [u8]) -> Result<RecvMsg> {
        let mut iovec_item = libc::iovec {
            iov_base: data.as_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };

        const SPACE: usize = 512;
        let hbuffer = [0u8; SPACE];
        let mut peer_storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

        let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
        msghdr.msg_name = &mut peer_storage as *mut _ as *mut libc::c_void;
        msghdr.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        msghdr.msg_iov = &mut iovec_item;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = &hbuffer as *const _ as *mut libc::c_void;
        msghdr.msg_controllen = SPACE as _;

        let r = unsafe { libc::recvmsg(self.fd, &mut msghdr, 0) };
        if r < 0 {
            return Err(Error::last_os_error());
        }

        let mut info = SndRcvInfo::default();
        unsafe {
            let mut cmsghdr = libc::CMSG_FIRSTHDR(&msghdr as *const libc::msghdr);
            while !cmsghdr.is_null() {
                if (*cmsghdr).cmsg_level == libc::IPPROTO_SCTP
                    && (*cmsghdr).cmsg_type == SCTP_SNDRCV
                {
                    let data = libc::CMSG_DATA(cmsghdr);
                    std::ptr::copy_nonoverlapping(
                        data as *const SndRcvInfo,
                        &mut info as *mut SndRcvInfo,
                        1,
                    );
                }
                cmsghdr = libc::CMSG_NXTHDR(&msghdr as *const libc::msghdr, cmsghdr);
            }
        }

        let peer = if msghdr.msg_namelen > 0 {
            unsafe {
                OsSocketAddr::copy_from_raw(
                    &peer_storage as *const _ as *const libc::sockaddr,
                    msghdr.msg_namelen,
                )
            }
            .into_addr()
        } else {
            None
        };

        Ok(RecvMsg {
            len: r as usize,
            peer,
            info,
            notification: msghdr.msg_flags & MSG_NOTIFICATION == MSG_NOTIFICATION,
        })
    }

    pub fn shutdown(&self, how: std::net::Shutdown) -> Result<()> {
        let flag = match how {
            std::net::Shutdown::Write => libc::SHUT_WR,
            std::net::Shutdown::Read => libc::SHUT_RD,
            std::net::Shutdown::Both => libc::SHUT_RDWR,
        };
        handle_libc_error(unsafe { libc::shutdown(self.fd, flag) })
    }
}

impl Drop for SctpSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl AsRawFd for SctpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_bit_is_lowest() {
        let info = SndRcvInfo {
            sinfo_flags: SCTP_UNORDERED,
            ..Default::default()
        };
        assert_ne!(info.sinfo_flags & SCTP_UNORDERED, 0);
        assert_eq!(SndRcvInfo::default().sinfo_flags & SCTP_UNORDERED, 0);
    }

    #[test]
    fn socket_kind_maps_to_raw_types() {
        assert_eq!(SocketKind::Stream.as_raw(), libc::SOCK_STREAM);
        assert_eq!(SocketKind::SeqPacket.as_raw(), libc::SOCK_SEQPACKET);
    }
}
