use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParameterBindingError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported parameter type for `{name}`: {message}")]
    UnsupportedType { name: String, message: String },

    #[error("Unterminated string literal in report SQL")]
    UnterminatedLiteral,
}

#[derive(Debug, Error)]
pub enum ReportSourceError {
    #[error("Invalid cache key `{0}` (only letters, digits and underscore are allowed)")]
    InvalidKey(String),

    #[error("Parameter binding failed for report `{report}`: {source}")]
    Parameter {
        report: String,
        #[source]
        source: ParameterBindingError,
    },

    #[error("Report `{report}` is missing required edge column `{column}`")]
    MissingColumn { report: String, column: String },

    #[error("Invalid report definition: {0}")]
    Definition(String),

    #[error("Failed to read report file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse report YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
