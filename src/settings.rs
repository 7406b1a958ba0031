//! Optional YAML file with tool defaults. Command-line flags and their
//! environment variables take precedence over anything set here.
//!
//! ```yaml
//! stack_name: platform
//! roles_dir: ./roles
//! region: eu-west-1
//! profile: deployer
//! poll_interval_secs: 5
//! timeout_minutes: 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};
use validator::{Validate, ValidationError};

use crate::config::Error;
use crate::constants::{DEFAULT_ROLES_DIR, DEFAULT_SETTINGS_FILE, DEFAULT_STACK_NAME};

// Account suffix "-123456789012" leaves this much of CloudFormation's 128.
const MAX_BASE_STACK_NAME_LENGTH: usize = 115;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[validate(custom = "validate_base_stack_name")]
    pub stack_name: Option<String>,

    pub roles_dir: Option<PathBuf>,

    pub region: Option<String>,

    pub profile: Option<String>,

    #[validate(range(min = 1, max = 300))]
    pub poll_interval_secs: Option<u64>,

    #[validate(range(min = 1, max = 360))]
    pub timeout_minutes: Option<u64>,
}

impl Settings {
    pub fn stack_name(&self) -> &str {
        self.stack_name.as_deref().unwrap_or(DEFAULT_STACK_NAME)
    }

    pub fn roles_dir(&self) -> PathBuf {
        self.roles_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROLES_DIR))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(5))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.unwrap_or(30) * 60)
    }
}

/// Reads the settings file at `path`. Without an explicit path the default
/// file is used when it exists, otherwise built-in defaults apply.
pub fn load(path: Option<&Path>) -> Result<Settings, Error> {
    match path {
        Some(path) => parse(path),
        None => {
            let default_path = Path::new(DEFAULT_SETTINGS_FILE);
            if default_path.is_file() {
                parse(default_path)
            } else {
                Ok(Settings::default())
            }
        }
    }
}

pub fn parse(path: &Path) -> Result<Settings, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    // An empty file deserializes to `()` rather than a mapping.
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    match settings.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    return Ok(settings);
}

/// CloudFormation stack names start with a letter and contain only letters,
/// digits and hyphens.
pub fn validate_base_stack_name(name: &str) -> Result<(), ValidationError> {
    let mut characters = name.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() => (),
        _ => return Err(ValidationError::new("stack_name_start")),
    }
    if !characters.all(|character| character.is_ascii_alphanumeric() || character == '-') {
        return Err(ValidationError::new("stack_name_characters"));
    }
    if name.len() > MAX_BASE_STACK_NAME_LENGTH {
        return Err(ValidationError::new("stack_name_length"));
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{parse, validate_base_stack_name, Settings};
    use crate::config::Error;
    use tempfile::tempdir;

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");

        let result = parse(&file_path);
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "Not yaml: [").unwrap();

        let result = parse(&file_path);
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "stack: dev").unwrap();

        let result = parse(&file_path);
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn invalid_stack_name_fails_validation() {
        let settings = Settings {
            stack_name: Some(String::from("9-lives")),
            ..Settings::default()
        };
        let contents = serde_yaml::to_string(&settings).unwrap();

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", contents).unwrap();

        let result = parse(&file_path);
        match result.err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn parses_the_settings() {
        let settings = Settings {
            stack_name: Some(String::from("platform")),
            roles_dir: Some(PathBuf::from("./definitions")),
            region: Some(String::from("eu-west-1")),
            profile: None,
            poll_interval_secs: Some(2),
            timeout_minutes: None,
        };
        let contents = serde_yaml::to_string(&settings).unwrap();

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", contents).unwrap();

        let parsed = parse(&file_path).unwrap();
        assert_eq!(settings, parsed);
        assert_eq!("platform", parsed.stack_name());
        assert_eq!(Duration::from_secs(2), parsed.poll_interval());
        assert_eq!(Duration::from_secs(30 * 60), parsed.timeout());
    }

    #[test]
    fn empty_file_means_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.yaml");
        File::create(&file_path).unwrap();

        let parsed = parse(&file_path).unwrap();
        assert_eq!("dev", parsed.stack_name());
        assert_eq!(PathBuf::from("roles"), parsed.roles_dir());
    }

    #[test]
    fn base_stack_names() {
        assert_eq!(true, validate_base_stack_name("dev").is_ok());
        assert_eq!(true, validate_base_stack_name("oidc-roles-2").is_ok());
        assert_eq!(true, validate_base_stack_name("").is_err());
        assert_eq!(true, validate_base_stack_name("-dev").is_err());
        assert_eq!(true, validate_base_stack_name("dev_roles").is_err());
        assert_eq!(true, validate_base_stack_name(&"a".repeat(116)).is_err());
    }
}
