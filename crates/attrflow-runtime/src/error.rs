use attrflow_core::{AttrRef, InstanceId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("cyclic dependency on {target} (evaluation stack: {})", render_path(.path))]
    Cycle { target: AttrRef, path: Vec<AttrRef> },

    #[error("computation of {} failed: {message}", render_target(.target.as_ref()))]
    Compute {
        target: Option<AttrRef>,
        message: String,
    },

    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("cannot write derived attribute {target}")]
    DerivedWrite { target: AttrRef },

    #[error("{target} is not a derived attribute")]
    NotDerived { target: AttrRef },

    #[error("evaluation of {target} exceeds nesting limit {limit}")]
    DepthExceeded { target: AttrRef, limit: usize },

    #[error("invalid kind {kind}: {message}")]
    InvalidKind { kind: String, message: String },
}

impl EngineError {
    /// Failure raised from inside a compute function.
    ///
    /// The engine attaches the failing attribute when the error leaves the
    /// evaluation that produced it.
    #[must_use]
    pub fn compute(message: impl Into<String>) -> Self {
        Self::Compute {
            target: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKind {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Fill in the origin of a compute failure that does not carry one yet.
    #[must_use]
    pub(crate) fn attach(self, origin: &AttrRef) -> Self {
        match self {
            Self::Compute {
                target: None,
                message,
            } => Self::Compute {
                target: Some(origin.clone()),
                message,
            },
            other => other,
        }
    }

    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Errors caused by the shape of the dependency graph rather than by a
    /// compute function. These abort the whole evaluation chain.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Cycle { .. } | Self::DepthExceeded { .. })
    }
}

fn render_target(target: Option<&AttrRef>) -> String {
    target.map_or_else(|| "<unattributed>".to_string(), ToString::to_string)
}

fn render_path(path: &[AttrRef]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
