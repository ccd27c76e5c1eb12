//! # Config Loader
//!
//! Locates configuration files in the usual places and deserialises them
//! from JSON into any `serde` type.
//!
//! ```no_run
//! use config_loader::{find_config_file, load_json};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AppConfig {
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), config_loader::ConfigError> {
//!     let path = find_config_file("app_config.json")?;
//!     let config: AppConfig = load_json(&path)?;
//!     println!("port {}", config.port);
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{ConfigError, Result};

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Reads a configuration file into a string without interpreting it.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Reads and deserialises a JSON configuration file.
///
/// Missing fields fall back to whatever `#[serde(default)]` the target
/// type declares.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = load_config_file(path)?;
    parse_json(&content, &path.display().to_string())
}

/// Deserialises JSON configuration held in memory.
///
/// # Arguments
/// * `content` - JSON text
/// * `origin` - Where the text came from, used in error messages
pub fn parse_json<T: DeserializeOwned>(content: &str, origin: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

/// Searches for a configuration file in common locations.
///
/// Order:
/// 1. `CONFIG_PATH` environment variable (if it names an existing file)
/// 2. `./config/{filename}`
/// 3. `./{filename}`
pub fn find_config_file(filename: &str) -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let path_buf = PathBuf::from(&path);
        if path_buf.is_file() {
            return Ok(path_buf);
        }
    }

    find_in(Path::new("."), filename)
}

fn find_in(root: &Path, filename: &str) -> Result<PathBuf> {
    let candidates = [root.join("config").join(filename), root.join(filename)];
    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| {
            ConfigError::FileNotFound(format!(
                "'{filename}' (searched {CONFIG_PATH_ENV}, ./config/{filename}, ./{filename})"
            ))
        })
}

/// Finds and reads a configuration file in one step.
pub fn find_and_load(filename: &str) -> Result<String> {
    let path = find_config_file(filename)?;
    load_config_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_file("/path/that/does/not/exist.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_json_applies_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "echo" }}"#).unwrap();

        let sample: Sample = load_json(file.path()).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "echo".to_string(),
                retries: 0
            }
        );
    }

    #[test]
    fn test_parse_json_reports_origin() {
        let err = parse_json::<Sample>("{ not json", "CONFIG").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref origin, .. } if origin == "CONFIG"));
        assert!(err.to_string().contains("CONFIG"));
    }

    #[test]
    fn test_find_prefers_config_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config").join("app.json"), "{}").unwrap();
        fs::write(dir.path().join("app.json"), "{}").unwrap();

        let found = find_in(dir.path(), "app.json").unwrap();
        assert_eq!(found, dir.path().join("config").join("app.json"));
    }

    #[test]
    fn test_find_falls_back_to_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.json"), "{}").unwrap();

        let found = find_in(dir.path(), "app.json").unwrap();
        assert_eq!(found, dir.path().join("app.json"));
    }

    #[test]
    #[serial]
    fn test_find_uses_config_path_env() {
        let file = NamedTempFile::new().unwrap();
        // SAFETY: serialised with the other tests touching the environment
        unsafe { env::set_var(CONFIG_PATH_ENV, file.path()) };
        let found = find_config_file("ignored.json");
        unsafe { env::remove_var(CONFIG_PATH_ENV) };

        assert_eq!(found.unwrap(), file.path());
    }

    #[test]
    #[serial]
    fn test_find_nonexistent_file() {
        let result = find_config_file("file_that_definitely_does_not_exist_12345.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
