mod config;
mod connector;
mod local;
mod rights;

pub use config::{ConfigError, Logon, ServerConfig, ServerProfiles};
pub use connector::{
    Connector, ConnectorError, Direction, EntryType, RemoteEntry, TransferRequest,
};
pub use local::LocalConnector;
pub use rights::{Rights, RightsError};
