use crate::errors::InstallError;
use std::env;
use std::path::{Path, PathBuf};

/// Names the resource directory shipped with the host
pub const RESOURCE_ENV_VAR: &str = "PYRELAY_RESOURCE_PATH";

/// Default worker initialization script, relative to the resource directory
pub const CLIENT_INIT_SCRIPT: &str = "scripts/client_init.py";

/// The default worker initialization script from `PYRELAY_RESOURCE_PATH`
pub fn default_client_init() -> Result<PathBuf, InstallError> {
    match env::var_os(RESOURCE_ENV_VAR) {
        Some(dir) if !dir.is_empty() => Ok(client_init_in(Path::new(&dir))),
        _ => Err(InstallError::ResourcePathUnset {
            var: RESOURCE_ENV_VAR.to_string(),
        }),
    }
}

pub fn client_init_in(resource_dir: &Path) -> PathBuf {
    resource_dir.join(CLIENT_INIT_SCRIPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_init_location() {
        assert_eq!(
            client_init_in(Path::new("/opt/pyrelay")),
            PathBuf::from("/opt/pyrelay/scripts/client_init.py")
        );
    }

    #[test]
    fn test_unset_message_names_variable() {
        let err = InstallError::ResourcePathUnset {
            var: RESOURCE_ENV_VAR.to_string(),
        };
        assert!(err.to_string().starts_with("PYRELAY_RESOURCE_PATH was not found"));
    }
}
