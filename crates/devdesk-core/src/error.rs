pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("cannot launch service `{service}`: {source}")]
    Launch {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service `{service}` did not become ready in time")]
    DependencyTimeout { service: String },

    #[error("start of service `{service}` was interrupted by a stop request")]
    Interrupted { service: String },

    #[error("service `{0}` not found")]
    ServiceNotFound(String),
}
