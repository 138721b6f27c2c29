use thiserror::Error;

/// The input table itself is unusable. User-correctable.
#[derive(Debug, Error)]
pub enum DataProcessingError {
    #[error("failed to read input table: {0}")]
    Unreadable(String),

    #[error("could not find a column containing '{keyword}'")]
    MissingColumn { keyword: &'static str },

    #[error("more than one column contains '{keyword}': {candidates:?}")]
    AmbiguousColumn {
        keyword: &'static str,
        candidates: Vec<String>,
    },

    #[error(
        "the table is empty or contains no numeric data after removing empty rows/columns \
         ({rows} rows, {columns} columns left)"
    )]
    EmptyAfterCleaning { rows: usize, columns: usize },

    #[error("columns contain only non-numeric data and could not be processed: {0:?}")]
    NonNumericColumns(Vec<String>),

    #[error(
        "outlier removal emptied the dataset ({rows} rows, contamination {contamination}); \
         the contamination setting might be too high or the data is very uniform"
    )]
    AllRowsRemoved { rows: usize, contamination: f64 },
}

/// The decomposition could not proceed on otherwise valid data.
#[derive(Debug, Error)]
pub enum PcaCalculationError {
    #[error("PCA requires at least 2 samples (rows), but received {samples}")]
    InsufficientSamples { samples: usize },

    #[error("cannot perform PCA with zero columns")]
    NoFeatures,

    #[error("non-numeric or missing value at row {row}, column '{column}'")]
    NonFiniteInput { row: usize, column: String },

    #[error(
        "PCA produced only {found} component(s), at least {required} are required; \
         the data may have insufficient variance or too few variables"
    )]
    TooFewComponents { found: usize, required: usize },

    #[error("decomposition failed: {0}")]
    Decomposition(String),
}

/// Reasons a loadings rotation was abandoned. Never fatal to a pipeline run.
#[derive(Debug, Error, PartialEq)]
pub enum RotationError {
    #[error("loadings matrix is empty")]
    EmptyLoadings,

    #[error("all loadings are zero")]
    AllZeroLoadings,

    #[error("need at least 2 components for rotation, got {0}")]
    TooFewComponents(usize),

    #[error("rotation produced non-finite loadings for variable {0}")]
    Degenerate(usize),

    #[error("rotation did not converge after {0} iterations")]
    NotConverged(usize),

    #[error("singular matrix during oblique rotation")]
    Singular,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("variance_threshold must be in (0, 1], got {0}")]
    VarianceThreshold(f64),

    #[error("contamination must be in [0, 0.5), got {0}")]
    Contamination(f64),

    #[error("min_significance must be >= 0, got {0}")]
    MinSignificance(f64),

    #[error("unknown rotation method '{0}', expected one of '', 'varimax', 'promax'")]
    RotationMethod(String),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("failed to read config: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataProcessingError),

    #[error(transparent)]
    Pca(#[from] PcaCalculationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
