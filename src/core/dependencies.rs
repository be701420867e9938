use tracing::debug;

use crate::error::BackupError;

/// Fail with the first program that cannot be found on the search path.
pub fn ensure_available<S: AsRef<str>>(programs: &[S]) -> Result<(), BackupError> {
    for program in programs {
        let program = program.as_ref();
        match which::which(program) {
            Ok(path) => debug!(program, path = %path.display(), "Found dependency"),
            Err(_) => {
                return Err(BackupError::DependencyMissing {
                    program: program.to_string(),
                });
            }
        }
    }
    Ok(())
}
