use thiserror::Error;

/// Invalid problem or mesh setup. Raised at initialize/validate time and never
/// recovered locally.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositiveCount { name: &'static str, value: usize },

    #[error(
        "Mesh interval fractions must start at -1, end at 1 and be strictly increasing; got {fractions:?}"
    )]
    MalformedMesh { fractions: Vec<f64> },

    #[error(
        "Mesh has {num_fractions} fractions and {num_intervals} interval degrees; need exactly one more fraction than intervals"
    )]
    MeshLengthMismatch {
        num_fractions: usize,
        num_intervals: usize,
    },

    #[error("Mesh interval {interval} has {num_points} points; allowed range is [{min}, {max}]")]
    IntervalPointsOutOfRange {
        interval: usize,
        num_points: usize,
        min: usize,
        max: usize,
    },

    #[error("Polynomial degree range [{min}, {max}] is invalid; allowed range is [{lb}, {ub}]")]
    DegreeRange {
        min: usize,
        max: usize,
        lb: usize,
        ub: usize,
    },

    #[error("Length of {name} is {got}, expected {expected}")]
    BoundLength {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{name} lower bound at index {idx} ({lower}) must be at least {tol} less than the upper bound ({upper})")]
    BoundsInverted {
        name: &'static str,
        idx: usize,
        lower: f64,
        upper: f64,
        tol: f64,
    },

    #[error("{name} guess at index {idx} ({guess}) must fall between the bounds [{lower}, {upper}]")]
    GuessOutOfBounds {
        name: &'static str,
        idx: usize,
        guess: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Tolerance {name} must be positive and finite, got {value}")]
    BadTolerance { name: &'static str, value: f64 },

    #[error("State stage points ({state}) must equal control stage points ({control})")]
    StageMismatch { state: usize, control: usize },

    #[error("Control mesh points ({control}) must equal the state mesh points ({state}) or one fewer")]
    ControlMeshMismatch { state: usize, control: usize },

    #[error("Decision variable {idx} needs finite bounds with upper > lower for bound-based scaling, got [{lower}, {upper}]")]
    UnscalableBounds { idx: usize, lower: f64, upper: f64 },

    #[error("Unknown scaling unit `{0}`")]
    UnknownUnit(String),

    #[error("Failed to parse transcription config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Length mismatch in {context}: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Index ({row}, {col}) out of range for a {nrows}x{ncols} matrix in {context}")]
    IndexOutOfRange {
        context: &'static str,
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("Block of {nnz} nonzeros does not fit in a {nrows}x{ncols} matrix")]
    TooManyNonZeros {
        nnz: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("LGR node iteration for {num_points} points did not converge within {max_iters} iterations")]
    LgrNotConverged { num_points: usize, max_iters: usize },

    #[error("Singular matrix in {context}")]
    SingularMatrix { context: &'static str },

    #[error("{0} must be initialized first")]
    NotInitialized(&'static str),

    #[error("User function failed in {context}: {source}")]
    UserFunction {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Argmin error: {0}")]
    ArgminError(#[from] argmin::core::Error),

    #[error("No solution found by the feasibility solve")]
    NoSolution,
}

impl TranscriptionError {
    pub(crate) fn length(context: &'static str, expected: usize, got: usize) -> Self {
        TranscriptionError::LengthMismatch {
            context,
            expected,
            got,
        }
    }

    pub(crate) fn shape(
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    ) -> Self {
        TranscriptionError::ShapeMismatch {
            context,
            expected,
            got,
        }
    }
}
