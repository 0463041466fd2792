pub use app_error::{AppError, AppResult, ErrorKind};
pub use config::{BrowserConfig, GeneralConfig, LogConfig, ReaderConfig};
pub use session::BrowserSession;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod session;
mod tracing_config;
