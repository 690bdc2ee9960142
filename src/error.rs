use thiserror::Error;

pub type Result<T> = std::result::Result<T, DebtError>;

#[derive(Error, Debug)]
pub enum DebtError {
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid exclude pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("Unknown metric parser: {0}")]
    UnknownParser(String),
    #[error("Metric parser {parser} failed: {message}")]
    Computation { parser: String, message: String },
    #[error("Metric {0} emitted more than once for a single commit")]
    DuplicateMetric(String),
    #[error("Metric {0} is not declared by any registered parser")]
    UnknownMetric(String),
    #[error("Diff parse error: {0}")]
    DiffParse(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Diff tree to tree error: {0}")]
    DiffTreeToTree(#[from] Box<gix::repository::diff_tree_to_tree::Error>),
    #[error("Git discover error: {0}")]
    GitDiscover(#[from] Box<gix::discover::Error>),
}

impl DebtError {
    /// Build a computation error attributed to the named parser.
    pub fn computation(parser: impl Into<String>, message: impl Into<String>) -> Self {
        DebtError::Computation {
            parser: parser.into(),
            message: message.into(),
        }
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::object::find::existing::Error> for DebtError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        DebtError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for DebtError {
    fn from(err: gix::object::commit::Error) -> Self {
        DebtError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for DebtError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        DebtError::RefFind(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for DebtError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        DebtError::HeadPeel(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for DebtError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        DebtError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for DebtError {
    fn from(err: gix::objs::decode::Error) -> Self {
        DebtError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::repository::diff_tree_to_tree::Error> for DebtError {
    fn from(err: gix::repository::diff_tree_to_tree::Error) -> Self {
        DebtError::DiffTreeToTree(Box::new(err))
    }
}

impl From<gix::discover::Error> for DebtError {
    fn from(err: gix::discover::Error) -> Self {
        DebtError::GitDiscover(Box::new(err))
    }
}
