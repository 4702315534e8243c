use crate::browser::AuthError;
use crate::client::ApiError;
use crate::credentials::CredentialError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a tool call can fail with. The tool layer turns each of these
/// into a `{"success": false, "error": ...}` result.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Authentication(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
