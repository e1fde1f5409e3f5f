use rumqttc::{ConnectReturnCode, ConnectionError};
use std::time::Duration;
use thiserror::Error;

/// Broker-side failures of the message source
///
/// None of these are fatal once the bridge is running; the loop backs off and
/// reconnects with the same parameters.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Broker unreachable, connection reset or protocol failure
    #[error("broker connection failed: {0}")]
    Connection(#[source] ConnectionError),

    /// Broker refused the credentials
    #[error("broker rejected credentials: {0}")]
    Unauthorized(String),

    #[error("broker rejected subscription to '{0}'")]
    SubscriptionRejected(String),

    #[error("could not queue request: {0}")]
    Request(#[from] rumqttc::ClientError),

    #[error("no acknowledgement from broker within {0:?}")]
    Timeout(Duration),

    #[error("broker closed the session")]
    Closed,

    #[error("source is not connected")]
    NotConnected,
}

impl From<ConnectionError> for SourceError {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::ConnectionRefused(
                code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
            ) => SourceError::Unauthorized(format!("{:?}", code)),
            other => SourceError::Connection(other),
        }
    }
}
