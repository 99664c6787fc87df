//! Credential resolution for the cloud export backend.
//!
//! Credentials are read from the environment at pre-flight time and kept in
//! [`SecretString`] so they never show up in `Debug` output or traces.

use secrecy::SecretString;

use crate::error::ConvertError;

pub const CLIENT_ID_ENV: &str = "PDF_SERVICES_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "PDF_SERVICES_CLIENT_SECRET";

/// Service-principal credentials for the cloud export API.
#[derive(Debug)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Credentials {
    /// Reads both credential values from the process environment.
    pub fn from_env() -> Result<Self, ConvertError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads both credential values through `lookup`.
    ///
    /// Every missing variable is reported at once so the user can fix the
    /// environment in one go.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConvertError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = resolve_env_secret(&lookup, CLIENT_ID_ENV);
        let client_secret = resolve_env_secret(&lookup, CLIENT_SECRET_ENV);

        match (client_id, client_secret) {
            (Some(id), Some(secret)) => Ok(Self {
                client_id: id,
                client_secret: SecretString::from(secret),
            }),
            (id, secret) => {
                let mut missing = Vec::new();
                if id.is_none() {
                    missing.push(CLIENT_ID_ENV.to_string());
                }
                if secret.is_none() {
                    missing.push(CLIENT_SECRET_ENV.to_string());
                }
                Err(ConvertError::MissingCredentials { missing })
            }
        }
    }
}

/// Returns the trimmed value of `name`, or `None` when unset or blank.
fn resolve_env_secret<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
