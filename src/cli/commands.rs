use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;

use crate::modbus::async_client::ModbusClientTrait;
use crate::modbus::protocol::u16s_to_be_bytes;
use crate::output::{HexFormatter, JsonFormatter, ResultFormatter, TextFormatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON for scripting
    Json,
    /// Raw data bytes as hex
    Hex,
}

impl OutputFormat {
    pub fn formatter(self) -> Box<dyn ResultFormatter> {
        match self {
            Self::Text => Box::new(TextFormatter),
            Self::Json => Box::new(JsonFormatter),
            Self::Hex => Box::new(HexFormatter),
        }
    }
}

/// Modbus RTU master command-line harness
#[derive(Parser, Debug)]
#[command(name = "rtu-master", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port (overrides the config file)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    pub baud: Option<u32>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Debug logging, including every frame on the wire
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the frames exchanged after the command completes
    #[arg(long)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List available serial ports
    ListPorts,
    /// Read coils (function 0x01)
    ReadCoils(ReadArgs),
    /// Read discrete inputs (function 0x02)
    ReadDiscrete(ReadArgs),
    /// Read holding registers (function 0x03)
    ReadHolding(ReadArgs),
    /// Read input registers (function 0x04)
    ReadInput(ReadArgs),
    /// Write a single coil (function 0x05)
    WriteCoil {
        slave: u8,
        address: u16,
        #[arg(action = clap::ArgAction::Set, value_parser = parse_coil_state)]
        state: bool,
    },
    /// Write a single holding register (function 0x06)
    WriteRegister {
        slave: u8,
        address: u16,
        #[arg(value_parser = parse_u16)]
        value: u16,
    },
    /// Write consecutive holding registers (function 0x10)
    WriteRegisters {
        slave: u8,
        address: u16,
        /// Comma-separated values, decimal or 0x-prefixed hex
        #[arg(value_delimiter = ',', value_parser = parse_u16, required = true)]
        values: Vec<u16>,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ReadArgs {
    pub slave: u8,
    pub address: u16,
    #[arg(default_value_t = 1)]
    pub quantity: u16,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid register value '{}': {}", s, e))
}

fn parse_coil_state(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("coil state must be on/off, got '{}'", other)),
    }
}

/// Runs one Modbus command and returns the rendered result.
pub async fn run_command(
    command: &Commands,
    client: &dyn ModbusClientTrait,
    formatter: &dyn ResultFormatter,
) -> anyhow::Result<String> {
    let output = match command {
        Commands::ListPorts => anyhow::bail!("list-ports does not talk to a slave"),
        Commands::ReadCoils(args) => {
            info!("🔍 Reading {} coils from slave {} at {}", args.quantity, args.slave, args.address);
            let packed = client.read_coils(args.slave, args.address, args.quantity).await?;
            formatter.format_bits(args.slave, args.address, args.quantity, &packed)
        }
        Commands::ReadDiscrete(args) => {
            info!(
                "🔍 Reading {} discrete inputs from slave {} at {}",
                args.quantity, args.slave, args.address
            );
            let packed = client
                .read_discrete_inputs(args.slave, args.address, args.quantity)
                .await?;
            formatter.format_bits(args.slave, args.address, args.quantity, &packed)
        }
        Commands::ReadHolding(args) => {
            info!(
                "📊 Reading {} holding registers from slave {} at {}",
                args.quantity, args.slave, args.address
            );
            let registers = client
                .read_holding_registers(args.slave, args.address, args.quantity)
                .await?;
            formatter.format_registers(args.slave, args.address, &registers)
        }
        Commands::ReadInput(args) => {
            info!(
                "📊 Reading {} input registers from slave {} at {}",
                args.quantity, args.slave, args.address
            );
            let registers = client
                .read_input_registers(args.slave, args.address, args.quantity)
                .await?;
            formatter.format_registers(args.slave, args.address, &registers)
        }
        Commands::WriteCoil {
            slave,
            address,
            state,
        } => {
            client.write_single_coil(*slave, *address, *state).await?;
            let description = format!("coil {} set {}", address, if *state { "ON" } else { "OFF" });
            formatter.format_write(*slave, &description)
        }
        Commands::WriteRegister {
            slave,
            address,
            value,
        } => {
            client.write_single_register(*slave, *address, *value).await?;
            formatter.format_write(*slave, &format!("register {} = {}", address, value))
        }
        Commands::WriteRegisters {
            slave,
            address,
            values,
        } => {
            let quantity = u16::try_from(values.len())?;
            client
                .write_multiple_registers(*slave, *address, quantity, u16s_to_be_bytes(values))
                .await?;
            formatter.format_write(*slave, &format!("{} registers from {}", quantity, address))
        }
    };
    Ok(output)
}
