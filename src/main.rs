//! Headless client entry point
//!
//! Reads the persisted registration, signs in with the directory and runs
//! the full worker stack until Ctrl-C. Incoming calls are auto-accepted;
//! the GUI proper is an external collaborator and plugs in through the
//! same [`videolink::ui::Gui`] capability this binary stubs out.

use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use videolink::config::{ConfigStatus, Configuration};
use videolink::constants::SUPPORTED_PROTOCOLS;
use videolink::directory::DirectoryClient;
use videolink::error::DirectoryError;
use videolink::media::codec::PassthroughCodec;
use videolink::net;
use videolink::peer::{LocalPeer, ProtocolSet};
use videolink::ui::HeadlessGui;
use videolink::{Collaborators, VideoClient};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "videolink", about = "Peer-to-peer video calling client")]
struct Args {
    /// Logging verbosity (RUST_LOG still wins when set)
    #[arg(short = 'l', long = "log-level", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Directory service host
    #[arg(long, default_value = "vega.ii.uam.es")]
    directory_host: String,

    /// Directory service port
    #[arg(long, default_value_t = 8000)]
    directory_port: u16,

    /// Configuration file location
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Call this user as soon as the client is up
    #[arg(long)]
    call: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.as_filter().into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(Configuration::default_path);
    let mut configuration = Configuration::read(&config_path);
    let stored = match configuration.status {
        ConfigStatus::Loaded => configuration.stored.clone().context("configuration lost")?,
        ConfigStatus::NoFile => bail!(
            "no configuration file at {}; create one with a [Configuration] section \
             (nickname, password, tcp_port, udp_port, private_ip) to register",
            config_path.display()
        ),
        ConfigStatus::WrongFile | ConfigStatus::WrongPassword => bail!(
            "configuration at {} could not be used; fix or delete it to register again",
            config_path.display()
        ),
    };

    let ip = if stored.private_ip {
        net::private_ip().context("could not determine the private IP")?
    } else {
        net::public_ip().context("could not determine the public IP")?
    };
    let local = LocalPeer::new(
        stored.nickname.clone(),
        ip,
        stored.tcp_port,
        stored.udp_port,
        stored.password.clone(),
        ProtocolSet::parse(SUPPORTED_PROTOCOLS),
    );

    let directory = DirectoryClient::new(args.directory_host.clone(), args.directory_port);
    match directory.register(&local) {
        Ok(()) => {}
        Err(DirectoryError::RegisterFailed) => {
            configuration.mark_wrong_password();
            bail!(
                "the directory rejected the stored password for {}; register again",
                stored.nickname
            );
        }
        Err(e) => return Err(e).context("could not reach the directory"),
    }

    let gui = Arc::new(HeadlessGui::new(true));
    let mut client = VideoClient::new(
        local,
        directory,
        Collaborators {
            gui: gui.clone(),
            encoder: Arc::new(PassthroughCodec),
            decoder: Arc::new(PassthroughCodec),
            camera: None,
        },
    )?;
    client.start()?;
    client.refresh_users();

    if let Some(nick) = &args.call {
        client.call_start(nick);
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("could not install the Ctrl-C handler")?;

    tracing::info!("running; press Ctrl-C to quit");
    let _ = shutdown_rx.recv();

    client.stop();
    Ok(())
}
