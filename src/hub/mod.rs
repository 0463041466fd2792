pub use connection::{ConnectionStatus, HubConnection, HubDefinition};
pub use manager::HubConnectionManager;

mod connection;
mod manager;

/// Hub ids are `{namespace}/{name}`.
pub fn hub_id(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}
