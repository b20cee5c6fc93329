//! Subprocess plumbing shared by the adapters.

use std::process::{Command, Output};

use crate::error::SystemError;

/// Runs a command to completion, turning a non-zero exit into an error
/// carrying the captured stderr.
pub(crate) fn run(program: &str, args: &[&str]) -> Result<Output, SystemError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| SystemError::Io {
            path: program.into(),
            source,
        })?;

    if !output.status.success() {
        return Err(SystemError::Command {
            command: format!("{program} {}", args.join(" ")),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Copies a file preserving its permission bits.
pub(crate) fn copy_file(src: &std::path::Path, dst: &std::path::Path) -> Result<(), SystemError> {
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|source| SystemError::Io {
            path: dst.to_path_buf(),
            source,
        })
}
