//! External validation call.
//!
//! One blocking `GET <base-url>?email=<value>` per validation, no retry. Any
//! transport failure or non-2xx status aborts the triggering operation. The
//! response body is not interpreted: a present body means the endpoint
//! answered.

use std::io;
use tracing::debug;

/// Header the endpoint expects.
pub const ACCEPT: &str = "application/json;odata=verbose";

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("validation endpoint returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("validation endpoint unreachable: {0}")]
    Transport(String),

    #[error("could not read validation response: {0}")]
    Body(#[from] io::Error),
}

/// The outbound call.
pub trait ExternalValidator {
    /// Send `value` and return the raw response body.
    ///
    /// # Errors
    ///
    /// Any transport or HTTP-level failure.
    fn fetch(&self, value: &str) -> Result<String, ValidatorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// The normalized value that was sent.
    pub value: String,
    /// Raw response body, `None` when the endpoint answered with nothing.
    pub body: Option<String>,
}

/// Trim `value` and send it.
///
/// # Errors
///
/// Propagates the validator's failure unchanged.
pub fn validate(
    validator: &dyn ExternalValidator,
    value: &str,
) -> Result<ValidationResult, ValidatorError> {
    let value = value.trim().to_string();
    let body = validator.fetch(&value)?;
    debug!(value = %value, body_len = body.len(), "validation endpoint answered");
    Ok(ValidationResult {
        value,
        body: (!body.is_empty()).then_some(body),
    })
}

/// `ureq`-backed validator.
pub struct HttpValidator {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpValidator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().user_agent("rollcall").build(),
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ExternalValidator for HttpValidator {
    fn fetch(&self, value: &str) -> Result<String, ValidatorError> {
        let response = self
            .agent
            .get(&self.base_url)
            .query("email", value)
            .set("Accept", ACCEPT)
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => ValidatorError::Status {
                    status,
                    url: response.get_url().to_string(),
                },
                ureq::Error::Transport(transport) => {
                    ValidatorError::Transport(transport.to_string())
                }
            })?;
        Ok(response.into_string()?)
    }
}

/// Validator used when validation is switched off in configuration; every
/// call answers with an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl ExternalValidator for NoopValidator {
    fn fetch(&self, _value: &str) -> Result<String, ValidatorError> {
        Ok(String::new())
    }
}
