use clap::Parser;

use crate::sctp::SocketKind;

pub const DEFAULT_PORT: u16 = 2001;
pub const DEFAULT_RECVBUF_SIZE: u16 = 1024;

/// Diagnostic SCTP echo server.
///
/// Binds a listening SCTP socket, prints received data and, optionally,
/// per-message delivery metadata, and echoes payloads back to the sender.
#[derive(Parser, Debug)]
#[command(name = "sctp-echo", version, about)]
pub struct Args {
    /// Listen on local port <PORT>
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Size of the receive buffer in bytes
    #[arg(long = "buf", value_name = "SIZE", default_value_t = DEFAULT_RECVBUF_SIZE)]
    pub buf: u16,

    /// Use a SOCK_SEQPACKET socket instead of SOCK_STREAM
    #[arg(long)]
    pub seq: bool,

    /// Echo the received data back to the sender
    #[arg(long)]
    pub echo: bool,

    /// Print per-message delivery metadata
    #[arg(long)]
    pub verbose: bool,
}

/// Resolved server configuration. Built once from [`Args`]; never mutated
/// afterwards except for the verbose downgrade on event subscription failure.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub recvbuf_size: u16,
    pub kind: SocketKind,
    pub echo: bool,
    pub verbose: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            port: args.port,
            recvbuf_size: args.buf,
            kind: if args.seq {
                SocketKind::SeqPacket
            } else {
                SocketKind::Stream
            },
            echo: args.echo,
            verbose: args.verbose,
        }
    }
}
