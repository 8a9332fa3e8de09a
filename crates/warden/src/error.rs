use std::io;

/// Errors reported by supervisor operations.
#[derive(Debug)]
pub enum Error {
	/// Bad name, duplicate name, or a non-numeric value for a numeric field.
	/// No state was changed.
	Validation(String),
	/// The targeted record does not exist. No state was changed.
	NotFound(String),
	/// The launcher rejected or failed to spawn a command. The record was
	/// not created or updated.
	Launch(LaunchError),
	/// Signal delivery failed; the record keeps its prior state and the
	/// caller must not assume the process stopped.
	Stop(String),
	/// The store could not be written. Read-side corruption is recovered
	/// locally and never surfaces here.
	Persistence(String),
}

#[derive(Debug)]
pub enum LaunchError {
	/// The directory or the command's program/script does not exist or is
	/// not executable. The OS process table was not touched.
	InvalidCommand(String),
	/// The spawn itself failed.
	SpawnFailed(io::Error),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Validation(msg) => write!(f, "validation error: {}", msg),
			Error::NotFound(name) => write!(f, "process not found: {}", name),
			Error::Launch(e) => write!(f, "{}", e),
			Error::Stop(msg) => write!(f, "stop failed: {}", msg),
			Error::Persistence(msg) => write!(f, "persistence error: {}", msg),
		}
	}
}

impl std::fmt::Display for LaunchError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			LaunchError::InvalidCommand(msg) => write!(f, "invalid command: {}", msg),
			LaunchError::SpawnFailed(e) => write!(f, "spawn failed: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Launch(LaunchError::SpawnFailed(e)) => Some(e),
			_ => None,
		}
	}
}

impl std::error::Error for LaunchError {}

impl From<LaunchError> for Error {
	fn from(e: LaunchError) -> Self {
		Error::Launch(e)
	}
}
