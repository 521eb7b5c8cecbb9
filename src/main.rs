use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use sctp_echo::config::{Args, Config};
use sctp_echo::sctp::SocketKind;
use sctp_echo::server::Server;
use sctp_echo::shutdown::{self, ShutdownFlag};

/// Initializes the tracing subscriber for logging
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    let cfg = Config::from(args);

    // signal handling must be in place before any socket exists
    let flag = ShutdownFlag::new();
    if let Err(e) = shutdown::install_handlers(&flag) {
        error!("unable to set signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let mut server = match Server::bind(&cfg, flag) {
        Ok(server) => server,
        Err(e) => {
            error!("error while initializing the server: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mode = match cfg.kind {
        SocketKind::Stream => "stream",
        SocketKind::SeqPacket => "seqpacket",
    };
    info!("listening on port {} ({} mode)", cfg.port, mode);

    match server.run().await {
        Ok(()) => {
            info!("shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
