use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A filesystem path that does not live under the user root.
    #[error("path {path} is outside of root {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// An identifier that does not belong to the user namespace.
    #[error("identifier '{id}' is outside of the '{namespace}' namespace")]
    IdOutsideRoot { id: String, namespace: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
