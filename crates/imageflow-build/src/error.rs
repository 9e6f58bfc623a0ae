use imageflow_core::SizeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build configuration directory not found: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error("no build definitions (*.pkr.hcl) in {0}")]
    NoDefinitions(PathBuf),

    #[error("build definition not found: {0}")]
    DefinitionNotFound(PathBuf),

    #[error("invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("{image}: derived build requires a base artifact")]
    MissingBaseArtifact { image: String },

    #[error("base image not found: {0}")]
    BaseImageNotFound(PathBuf),

    #[error("{0} not found on PATH")]
    ToolNotFound(String),

    #[error("{stage} failed: `{command}` exited with {status}\n{output}")]
    BuildFailed {
        stage: String,
        command: String,
        status: String,
        output: String,
    },

    #[error("{stage}: expected exactly one disk image in {dir}, found {found}")]
    UnexpectedOutput {
        stage: String,
        dir: PathBuf,
        found: usize,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("size inspection failed for {path}: {message}")]
    InspectFailed { path: PathBuf, message: String },

    #[error(transparent)]
    Size(#[from] SizeError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Missing or malformed configuration, detected before any tool ran
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BuildError::ConfigDirNotFound(_)
                | BuildError::NoDefinitions(_)
                | BuildError::DefinitionNotFound(_)
                | BuildError::InvalidConfig(_)
                | BuildError::MissingBaseArtifact { .. }
                | BuildError::BaseImageNotFound(_)
        )
    }

    /// Attribute a tool failure to a pipeline stage
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            BuildError::BuildFailed {
                command,
                status,
                output,
                ..
            } => BuildError::BuildFailed {
                stage: stage.to_string(),
                command,
                status,
                output,
            },
            BuildError::UnexpectedOutput { dir, found, .. } => BuildError::UnexpectedOutput {
                stage: stage.to_string(),
                dir,
                found,
            },
            other => other,
        }
    }

    /// Error message with a hint on how to fix it
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DefinitionNotFound(path) => format!(
                "build definition not found: {}\n\
                 \n\
                 hint: check the image's `template` in imageflow.kdl",
                path.display()
            ),
            BuildError::ToolNotFound(tool) => format!(
                "{} not found on PATH\n\
                 \n\
                 hint: install it or pass its location explicitly",
                tool
            ),
            BuildError::MissingBaseArtifact { image } => format!(
                "{}: derived build requires a base artifact\n\
                 \n\
                 hint: run `imageflow build-base` first",
                image
            ),
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
