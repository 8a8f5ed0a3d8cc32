use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use rtu_master::cli::{run_command, Cli, Commands};
use rtu_master::modbus::transport::available_ports;
use rtu_master::modbus::{LogObserver, RecordingObserver};
use rtu_master::{AsyncRtuClient, Config, RtuClient, SerialTransport};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    // Override with command line arguments
    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.command == Commands::ListPorts {
        let ports = available_ports()?;
        if ports.is_empty() {
            println!("⚠️  No serial ports found");
        }
        for (index, port) in ports.iter().enumerate() {
            println!("{}. {}", index + 1, port);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    info!("🖥️  Modbus RTU master v{}", rtu_master::VERSION);

    let transport = SerialTransport::open(config.serial_settings()?)?;
    let client = RtuClient::with_config(transport, config.client_config());

    let recorder = Arc::new(RecordingObserver::new());
    if cli.trace {
        client.set_observer(recorder.clone());
    } else if cli.verbose {
        client.set_observer(Arc::new(LogObserver));
    }

    let client = AsyncRtuClient::new(client);
    let formatter = cli.format.formatter();

    let result = run_command(&cli.command, &client, formatter.as_ref()).await;
    if cli.trace {
        print!("{}", formatter.format_trace(&recorder.events()));
    }

    match result {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            Err(e)
        }
    }
}
