use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported list action `{0}`")]
    UnsupportedAction(String),

    #[error("malformed list action `{action}`: {reason}")]
    MalformedAction { action: String, reason: String },

    #[error("mod references undeclared user input `{0}`")]
    UndeclaredInput(String),

    #[error("user input `{0}` is declared more than once")]
    DuplicateInput(String),

    #[error("user input `{input}` shares options with unknown input `{alias}`")]
    UnknownOptionAlias { input: String, alias: String },

    #[error("invalid selection for user input `{input}`: {reason}")]
    InvalidSelection { input: String, reason: String },

    #[error("user input `{0}` expands recursively")]
    RecursiveInput(String),

    #[error("invalid vpp path `{0}`: expected <archive>.vpp_pc\\<file>")]
    InvalidVppPath(String),

    #[error("cannot guess target for {path:?}: candidates {candidates:?}")]
    AmbiguousTarget {
        path: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("refusing to overwrite existing vanilla backup {0:?}")]
    VanillaBackupOverwrite(PathBuf),

    #[error("patch backup missing for {0:?}")]
    MissingPatchBackup(PathBuf),

    #[error("rollback requested for unmanaged file {0:?}")]
    UnmanagedRollback(PathBuf),

    #[error("invalid mod description: {0}")]
    InvalidModInfo(String),

    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("XML write error: {0}")]
    Write(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error on {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
