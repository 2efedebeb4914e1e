#![forbid(unsafe_code)]

//! Session configuration.

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Evaluate every derived attribute when an instance is created, so its
    /// dependency subscriptions exist before the first write arrives.
    /// Default: true.
    pub eager_on_create: bool,

    /// Maximum nesting of derived evaluations (a derived attribute reading a
    /// derived attribute reading ...). Exceeding it fails the evaluation
    /// instead of overflowing the stack.
    /// Default: 256.
    pub max_eval_depth: usize,

    /// Emit a `attrflow.evaluate` debug span around each evaluation.
    /// Default: true.
    pub trace_evaluations: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            eager_on_create: true,
            max_eval_depth: 256,
            trace_evaluations: true,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_eager_on_create(mut self, eager: bool) -> Self {
        self.eager_on_create = eager;
        self
    }

    #[must_use]
    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }

    #[must_use]
    pub fn with_trace_evaluations(mut self, trace: bool) -> Self {
        self.trace_evaluations = trace;
        self
    }
}
