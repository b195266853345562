use thiserror::Error;

#[derive(Debug, Error)]
pub enum FpError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse engine configuration '{file}': {source}")]
    ConfigParseError {
        source: toml::de::Error,
        file: String,
    },

    /// An analysis proposed a value that is not above the value already stored.
    #[error(
        "Monotonicity violation on `{epk}`: the proposed value {proposed} is not above the previous value {previous}."
    )]
    MonotonicityViolation {
        epk: String,
        previous: String,
        proposed: String,
    },

    /// A final value was overwritten by a different one.
    #[error(
        "The final value of `{epk}` cannot change: it is {previous} and {proposed} was proposed."
    )]
    FinalValueChanged {
        epk: String,
        previous: String,
        proposed: String,
    },

    /// The cycle resolver could not finalize any of the remaining open EPKs.
    #[error("Unresolvable deadlock between {} open EPKs: {}", epks.len(), epks.join(", "))]
    Deadlock { epks: Vec<String> },

    /// The value of an EPK strictly increased more often than its lattice height allows.
    #[error(
        "`{epk}` changed {changes} times although its lattice has height {height}; the lattice is not of finite height as declared."
    )]
    LatticeHeightExceeded {
        epk: String,
        height: usize,
        changes: usize,
    },

    #[error("`{epk}` was updated more than the configured limit of {limit} times.")]
    UpdateLimitExceeded { epk: String, limit: usize },

    #[error("A property kind named '{0}' is already registered")]
    DuplicateKind(String),

    #[error("An analysis computing '{0}' is already registered")]
    DuplicateAnalysis(String),

    #[error("No property kind with identifier {0} is registered in this store")]
    UnknownKind(u32),

    #[error("Property kind '{kind}' holds values of type `{expected}`, found `{found}`")]
    KindMismatch {
        kind: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Registration is only possible before the run starts (current phase: {phase})")]
    RegistrationClosed { phase: String },

    #[error("The run was cancelled with {open} EPKs still open")]
    Cancelled { open: usize },

    #[error("Analysis '{analysis}' panicked while computing `{epk}`")]
    AnalysisPanicked { analysis: String, epk: String },
}

pub type FpResult<T> = Result<T, FpError>;
