use std::path::PathBuf;
use thiserror::Error;

/// Structural problems found while enumerating a corpus.
///
/// `MissingDomainFile` and `MalformedInstanceId` only disqualify the one
/// instance they were raised for; `EmptyCorpus` and `Unreadable` are fatal.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("missing_domain_file: no domain definition for {instance} (tried {tried:?})")]
    MissingDomainFile {
        instance: PathBuf,
        tried: Vec<PathBuf>,
    },

    #[error("malformed_instance_id: no digits in instance file name {file_name}")]
    MalformedInstanceId { file_name: String },

    #[error("empty_corpus: {root} contains no domain directories")]
    EmptyCorpus { root: PathBuf },

    #[error("corpus_unreadable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CorpusError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CorpusError::EmptyCorpus { .. } | CorpusError::Unreadable { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool_unavailable: {role} command {command:?}: {reason}")]
    Unavailable {
        role: String,
        command: Vec<String>,
        reason: String,
    },
}

/// Why a single metric could not be read from a solver log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("log unreadable")]
    LogUnreadable,
    #[error("marker '{0}' absent")]
    MarkerAbsent(String),
    #[error("field {field} missing on marker line")]
    FieldMissing { field: usize },
    #[error("cannot parse '{token}'")]
    Parse { token: String },
}

#[derive(Debug, Error)]
#[error("malformed_result_line: {path}:{line}: {content:?}")]
pub struct ResultFileError {
    pub path: PathBuf,
    pub line: usize,
    pub content: String,
}
