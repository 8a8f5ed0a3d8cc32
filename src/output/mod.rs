pub mod formatters;

pub use formatters::{HexFormatter, JsonFormatter, ResultFormatter, TextFormatter};
