//! Error types for routing operations

use thiserror::Error;

use quarry_registry::RegistryError;

/// Routing operation errors
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Repository {id} is not a proxy repository")]
    NotAProxyRepository { id: String },

    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

impl From<reqwest::Error> for RoutingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RoutingError::Timeout { seconds: 10 }
        } else if let Some(status) = e.status() {
            RoutingError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            RoutingError::Network {
                message: e.to_string(),
            }
        }
    }
}
