//! Control port resolution
//!
//! The port is resolved exactly once when the supervisor starts. Failure is
//! not fatal: the supervisor keeps probing the default port.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no control port supplied")]
    Missing,

    #[error("invalid control port '{0}'")]
    Invalid(String),
}

/// Where the control port comes from
pub trait PortSource: Send + Sync {
    fn resolve(&self) -> Result<u16, PortError>;
}

/// Port given as a command line argument
#[derive(Debug, Clone)]
pub struct ArgPortSource {
    arg: Option<String>,
}

impl ArgPortSource {
    pub fn new(arg: Option<String>) -> Self {
        Self { arg }
    }
}

impl PortSource for ArgPortSource {
    fn resolve(&self) -> Result<u16, PortError> {
        let raw = self.arg.as_deref().ok_or(PortError::Missing)?;
        match raw.trim().parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(PortError::Invalid(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPortSource(pub u16);

impl PortSource for FixedPortSource {
    fn resolve(&self) -> Result<u16, PortError> {
        Ok(self.0)
    }
}

/// One-shot resolver; consuming `resolve` makes a second lookup impossible.
pub struct PortResolver {
    source: Box<dyn PortSource>,
}

impl PortResolver {
    pub fn new(source: impl PortSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn resolve(self) -> Option<u16> {
        match self.source.resolve() {
            Ok(port) => Some(port),
            Err(PortError::Missing) => {
                tracing::debug!("No control port supplied, keeping default");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Control port resolution failed, keeping default");
                None
            }
        }
    }
}
