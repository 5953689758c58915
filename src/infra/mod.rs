pub mod db;
pub mod error;
pub mod http;
pub mod reader;
pub mod telemetry;
