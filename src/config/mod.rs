pub mod settings;

pub use settings::{ClientSettings, Config, ParityConfig, SerialConfig};
