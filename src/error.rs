use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot sample {requested} transitions, only {available} stored")]
    InsufficientSamples { requested: usize, available: usize },
    #[error("sample index {index} out of range for buffer of length {len}")]
    SampleIndex { index: usize, len: usize },
    #[error("saved agents {saved:?} do not match configured agents {configured:?}")]
    AgentMismatch {
        saved: BTreeSet<String>,
        configured: BTreeSet<String>,
    },
    #[error("unknown agent {0:?}")]
    UnknownAgent(String),
    #[error("expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("action {action} outside of {actions} discrete actions")]
    InvalidAction { action: usize, actions: usize },
    #[error("invalid parameter: {0}")]
    InvalidParams(String),
    #[error("render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
