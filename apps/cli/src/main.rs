use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ota_core::events::{OtaEvent, OtaObserver, TracingObserver};
use ota_core::session::{UpdateConfig, UpdateSession};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "ESP network firmware uploader", long_about = None)]
struct Args {
    /// Firmware image to upload
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Device identifier to look up over mDNS and to verify against
    #[arg(long)]
    espid: Option<String>,

    /// Device address (skips mDNS lookup)
    #[arg(long)]
    host: Option<String>,

    /// Digest auth user [default: ota]
    #[arg(long, env = "OTA_USER")]
    user: Option<String>,

    /// Digest auth password [default: empty]
    #[arg(long, env = "OTA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds to wait for the device to appear on mDNS [default: 10]
    #[arg(long)]
    timeout: Option<u64>,

    /// TOML file providing defaults for the options above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// File values first, then anything given on the command line or in the environment.
    fn into_config(self) -> Result<UpdateConfig> {
        let mut config = match &self.config {
            Some(path) => UpdateConfig::load_from_file(path)?,
            None => UpdateConfig::default(),
        };

        if let Some(firmware) = self.firmware {
            config.firmware_path = Some(firmware);
        }
        if let Some(espid) = self.espid {
            config.device_id = Some(espid);
        }
        if let Some(host) = self.host {
            config.host = Some(host);
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(timeout) = self.timeout {
            config.discovery_timeout_secs = timeout;
        }

        Ok(config)
    }
}

/// Prints the operator-facing progress lines; everything else goes to tracing.
struct ConsoleObserver;

impl OtaObserver for ConsoleObserver {
    fn on_event(&self, event: &OtaEvent) {
        match event {
            OtaEvent::DeviceResolved { device_id, address } => {
                println!("address of {device_id} is {address}");
            }
            OtaEvent::IdentityVerified { device_id } => {
                println!("ESP ID verified: {device_id}");
            }
            OtaEvent::NoFirmware => {
                println!("no firmware file specified");
            }
            OtaEvent::FirmwareLoaded { md5, .. } => {
                println!("firmware hash is md5={md5}");
            }
            OtaEvent::UploadResponse {
                status,
                reason,
                body,
            } => {
                println!("HTTP {} {}", status, reason.as_deref().unwrap_or(""));
                println!("{body}");
            }
            other => TracingObserver.on_event(other),
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting esp-ota...");

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let session = UpdateSession::with_observer(config, Arc::new(ConsoleObserver));

    match session.run() {
        Ok(outcome) => {
            let code = outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
