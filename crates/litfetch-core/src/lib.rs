pub mod config;
pub mod error;
pub mod export;
pub mod models;

pub use config::{
    AppConfig, CredentialsConfig, ExportConfig, FulltextConfig, HttpConfig, MetadataConfig,
};
pub use error::{CoreError, ExitCode, Result};
pub use export::{read_identifiers_csv, read_records_csv, write_records_csv};
pub use models::*;
