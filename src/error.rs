use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Metadata store error: {0}")]
    StoreError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many running instances: {running} of {limit}")]
    QuotaExceeded { running: usize, limit: usize },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid instance id {0:?}: must be at least 18 characters")]
    InvalidInstanceId(String),

    #[error("Resource creation failed: {resource_type} - {reason}")]
    ResourceCreationError {
        resource_type: String,
        reason: String,
    },
}

impl Error {
    /// HTTP status code this error surfaces as
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Unauthorized(_) => 401,
            Error::QuotaExceeded { .. } => 429,
            Error::BadRequest(_) => 400,
            Error::KubeError(kube::Error::Api(ae)) if ae.code == 404 => 404,
            _ => 500,
        }
    }

    /// True when the cluster reported that the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}
