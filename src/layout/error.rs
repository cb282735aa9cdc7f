use std::io;

/// A failed layout engine call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start layout engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("layout engine exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("layout engine I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed layout engine response: {0}")]
    Response(#[from] serde_json::Error),

    #[error("layout engine failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// The engine call failed; no partial layout exists.
    #[error("layout failed: {0}")]
    Engine(#[from] EngineError),
}
