use thiserror::Error;

/// Failures raised by the SBML reader/writer and the accessor registry.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("xml error: {0}")]
    Xml(String),

    #[error("{0}")]
    Structural(String),

    #[error("error when parsing SBML ({} problem(s)): {}", errors.len(), errors.join("; "))]
    Invalid { errors: Vec<String> },

    #[error("no creator `{creator}` on element `{kind}`")]
    UnknownCreator { kind: String, creator: String },

    #[error("no accessor `{accessor}` on element `{kind}`")]
    UnknownAccessor { kind: String, accessor: String },

    #[error("cannot invoke `{accessor}`: {reason}")]
    Invoke { accessor: String, reason: String },

    #[error("formula: {0}")]
    Formula(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ModelError {
    fn from(e: quick_xml::Error) -> Self {
        ModelError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ModelError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        ModelError::Xml(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid modelisation document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("modelisation entry is missing field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to connect to the database: {0}")]
    Connectivity(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unexpected value in result: {0}")]
    Decode(String),
}

impl From<neo4rs::Error> for StoreError {
    fn from(e: neo4rs::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

impl From<neo4rs::DeError> for StoreError {
    fn from(e: neo4rs::DeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Failures while rebuilding a model from database content.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
