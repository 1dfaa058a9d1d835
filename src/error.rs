use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WslDevError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("unsupported host architecture '{arch}'")]
    #[diagnostic(help("only amd64 (x86_64) and arm64 (aarch64) hosts are supported"))]
    UnsupportedArchitecture { arch: String },

    #[error("release '{release}' has no image for {arch}")]
    #[diagnostic(help("pick another release with --release"))]
    UnsupportedReleaseArchitecture { release: String, arch: String },

    #[error("instance '{id}' not found")]
    #[diagnostic(help("run `wsldev list` to see existing instances"))]
    InstanceNotFound { id: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("image download failed: {message}")]
    ImageDownload {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },

    #[error("cancelled")]
    Cancelled,
}
