use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::constants::{
    ACCOUNT_ID_LENGTH, DEFAULT_AUDIENCE, DETAILS_FILE, INLINE_POLICY_PREFIX, INLINE_POLICY_SUFFIX,
    MANAGED_POLICIES_FILE, MAX_INLINE_POLICIES_PER_ROLE, MAX_MANAGED_POLICIES_PER_ROLE,
    MAX_LOGICAL_ID_LENGTH, MAX_POLICY_NAME_LENGTH, MAX_ROLE_NAME_LENGTH,
};
use crate::{resources, template};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Directory {0} not found")]
    DirectoryNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Wrong JSON type: {0}")]
    WrongType(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// `details.json` as it sits on disk, before the required keys are checked.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct DetailsFile {
    #[validate(required, length(min = 1))]
    role_name: Option<String>,

    #[validate(required, length(min = 1))]
    oidc_provider_url: Option<String>,

    #[validate(required, length(min = 1))]
    github_subject_claim: Option<String>,

    audience: Option<String>,

    description: Option<String>,

    /// Anything but a mapping of strings is ignored.
    #[serde(default)]
    tags: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDetails {
    pub role_name: String,
    pub oidc_provider_url: String,
    pub github_subject_claim: String,
    pub audience: Option<String>,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Fully loaded definition of one role in one account.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    pub account_id: String,
    /// Directory the role was loaded from, e.g. `DeployToStaging`.
    pub role_name_dir: String,
    pub details: RoleDetails,
    pub managed_policies: Vec<String>,
    /// Keyed by source file name, e.g. `inline-S3Access.json`.
    pub inline_policies: BTreeMap<String, Map<String, Value>>,
    path: PathBuf,
}

impl RoleConfig {
    pub fn new(
        base_dir: &Path,
        account_id: &str,
        role_name_dir: &str,
        details: RoleDetails,
        managed_policies: Vec<String>,
        inline_policies: BTreeMap<String, Map<String, Value>>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            role_name_dir: role_name_dir.to_string(),
            details,
            managed_policies,
            inline_policies,
            path: base_dir.join(account_id).join(role_name_dir),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.details.role_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audience(&self) -> &str {
        self.details.audience.as_deref().unwrap_or(DEFAULT_AUDIENCE)
    }

    /// Non-fatal findings against IAM quotas and naming rules.
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.role_name().len() > MAX_ROLE_NAME_LENGTH {
            warnings.push(format!(
                "role name '{}' is longer than {} characters",
                self.role_name(),
                MAX_ROLE_NAME_LENGTH
            ));
        }
        if self.managed_policies.len() > MAX_MANAGED_POLICIES_PER_ROLE {
            warnings.push(format!(
                "{} managed policies exceed the limit of {}",
                self.managed_policies.len(),
                MAX_MANAGED_POLICIES_PER_ROLE
            ));
        }
        if self.inline_policies.len() > MAX_INLINE_POLICIES_PER_ROLE {
            warnings.push(format!(
                "{} inline policies exceed the limit of {}",
                self.inline_policies.len(),
                MAX_INLINE_POLICIES_PER_ROLE
            ));
        }
        for policy_arn in &self.managed_policies {
            if !policy_arn.starts_with("arn:") {
                warnings.push(format!("managed policy '{}' is not an ARN", policy_arn));
            }
        }
        for file_name in self.inline_policies.keys() {
            let policy_name = format!(
                "{}-{}",
                self.role_name(),
                resources::inline_policy_name(file_name)
            );
            if policy_name.len() > MAX_POLICY_NAME_LENGTH {
                warnings.push(format!(
                    "inline policy name '{}' is longer than {} characters",
                    policy_name, MAX_POLICY_NAME_LENGTH
                ));
            }
        }

        let definition = resources::build(self);
        let resource_ids = template::resource_ids(&definition)
            .into_iter()
            .map(str::to_string);
        for id in resource_ids.chain(template::output_ids(&definition)) {
            if id.len() > MAX_LOGICAL_ID_LENGTH {
                warnings.push(format!(
                    "logical id '{}' is longer than {} characters",
                    id, MAX_LOGICAL_ID_LENGTH
                ));
            }
        }

        warnings
    }
}

impl std::fmt::Display for RoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RoleConfig(account_id={}, role_name_dir={}, name={})",
            self.account_id,
            self.role_name_dir,
            self.role_name()
        )
    }
}

/// An inline policy file that was left out of an otherwise valid role.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRole {
    pub config: RoleConfig,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleFailure {
    pub role_dir: String,
    pub error: Error,
}

/// Outcome of scanning one account directory. Roles that failed to load are
/// reported in `failures` instead of aborting the scan.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Discovery {
    pub roles: Vec<LoadedRole>,
    pub failures: Vec<RoleFailure>,
}

impl Discovery {
    pub fn configs(&self) -> Vec<RoleConfig> {
        self.roles.iter().map(|loaded| loaded.config.clone()).collect()
    }

    pub fn skipped_files(&self) -> impl Iterator<Item = &SkippedFile> {
        self.roles.iter().flat_map(|loaded| loaded.skipped.iter())
    }
}

pub fn validate_account_id(account_id: &str) -> Result<(), ValidationError> {
    if account_id.len() != ACCOUNT_ID_LENGTH {
        return Err(ValidationError::new("account_id_length"));
    }
    if !account_id.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ValidationError::new("account_id_digits"));
    }

    return Ok(());
}

/// Scans `base_dir/account_id` and loads every role directory in it, or only
/// `role_filter` when given. Never fails as a whole: a missing account
/// directory yields an empty result and broken roles land in `failures`.
pub fn discover(base_dir: &Path, account_id: &str, role_filter: Option<&str>) -> Discovery {
    info!(
        "Discovering role configurations in '{}' for account '{}'",
        base_dir.display(),
        account_id
    );
    let mut discovery = Discovery::default();

    let account_dir = base_dir.join(account_id);
    if !account_dir.is_dir() {
        error!("Account directory not found: {}", account_dir.display());
        return discovery;
    }

    let role_dirs = match role_filter {
        Some(role_dir) => vec![role_dir.to_string()],
        None => match subdirectories(&account_dir) {
            Ok(role_dirs) => role_dirs,
            Err(error) => {
                error!("Unable to list {}: {}", account_dir.display(), error);
                return discovery;
            }
        },
    };

    if role_dirs.is_empty() {
        warn!(
            "No role directories found to process in '{}'",
            account_dir.display()
        );
    }

    for role_dir in role_dirs {
        match load_role(base_dir, account_id, &role_dir) {
            Ok(loaded) => {
                info!(
                    "Successfully loaded configuration for: {}",
                    loaded.config.role_name()
                );
                discovery.roles.push(loaded);
            }
            Err(error) => {
                error!(
                    "Failed to load configuration for role directory '{}' in account '{}': {}",
                    role_dir, account_id, error
                );
                discovery.failures.push(RoleFailure { role_dir, error });
            }
        }
    }

    discovery
}

/// Loads a single, explicitly named role. Unlike `discover`, every problem is
/// returned as an error.
pub fn load_role(base_dir: &Path, account_id: &str, role_name_dir: &str) -> Result<LoadedRole, Error> {
    debug!(
        "Loading configuration for role '{}' in account '{}' from '{}'",
        role_name_dir,
        account_id,
        base_dir.display()
    );

    if validate_account_id(account_id).is_err() {
        return Err(Error::ValidationError(format!(
            "Account id '{}' must be exactly {} digits",
            account_id, ACCOUNT_ID_LENGTH
        )));
    }
    if !is_plain_name(role_name_dir) {
        return Err(Error::ValidationError(format!(
            "Role directory '{}' must be a single path component",
            role_name_dir
        )));
    }

    let role_dir = base_dir.join(account_id).join(role_name_dir);
    if !role_dir.is_dir() {
        return Err(Error::DirectoryNotFound(role_dir.display().to_string()));
    }

    let details = load_details(&role_dir.join(DETAILS_FILE))?;
    let managed_policies = load_managed_policies(&role_dir.join(MANAGED_POLICIES_FILE))?;
    let (inline_policies, skipped) = load_inline_policies(&role_dir)?;

    let config = RoleConfig::new(
        base_dir,
        account_id,
        role_name_dir,
        details,
        managed_policies,
        inline_policies,
    );

    return Ok(LoadedRole { config, skipped });
}

/// Account directories (12-digit names) directly under `base_dir`.
pub fn account_dirs(base_dir: &Path) -> Result<Vec<String>, Error> {
    let account_ids = subdirectories(base_dir)?
        .into_iter()
        .filter(|name| validate_account_id(name).is_ok())
        .collect();

    Ok(account_ids)
}

fn load_details(path: &Path) -> Result<RoleDetails, Error> {
    let value = read_json(path)?;
    if !value.is_object() {
        return Err(Error::WrongType(format!(
            "{} is not a valid JSON object",
            path.display()
        )));
    }

    let details: DetailsFile = match serde_json::from_value(value) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(format!("{}: {}", path.display(), error))),
    }?;

    if let Err(errors) = details.validate() {
        return Err(Error::ValidationError(format!(
            "Missing required fields in '{}': {}",
            path.display(),
            missing_fields(&errors).join(", ")
        )));
    }

    let DetailsFile {
        role_name: Some(role_name),
        oidc_provider_url: Some(oidc_provider_url),
        github_subject_claim: Some(github_subject_claim),
        audience,
        description,
        tags,
    } = details
    else {
        return Err(Error::ValidationError(format!(
            "Missing required fields in '{}'",
            path.display()
        )));
    };

    debug!("Successfully loaded config file: {}", path.display());
    Ok(RoleDetails {
        role_name,
        oidc_provider_url,
        github_subject_claim,
        audience,
        description,
        tags: role_tags(path, tags),
    })
}

fn role_tags(path: &Path, tags: Option<Value>) -> BTreeMap<String, String> {
    let tags = match tags {
        None | Some(Value::Null) => return BTreeMap::new(),
        Some(Value::Object(tags)) => tags,
        Some(_) => {
            warn!("Ignoring tags in '{}': not a JSON object", path.display());
            return BTreeMap::new();
        }
    };

    tags.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(value) => Some((key, value)),
            _ => {
                warn!(
                    "Ignoring tag '{}' in '{}': value is not a string",
                    key,
                    path.display()
                );
                None
            }
        })
        .collect()
}

fn load_managed_policies(path: &Path) -> Result<Vec<String>, Error> {
    let value = match read_json(path) {
        Ok(value) => value,
        Err(Error::FileNotFound(_)) => {
            debug!("Optional config file not found: {}", path.display());
            return Ok(Vec::new());
        }
        Err(error) => return Err(error),
    };

    if !value.is_array() {
        return Err(Error::WrongType(format!(
            "{} is not a valid JSON list",
            path.display()
        )));
    }

    serde_json::from_value(value)
        .map_err(|error| Error::ParsingError(format!("{}: {}", path.display(), error)))
}

type InlinePolicies = BTreeMap<String, Map<String, Value>>;

fn load_inline_policies(role_dir: &Path) -> Result<(InlinePolicies, Vec<SkippedFile>), Error> {
    let mut policies = BTreeMap::new();
    let mut skipped = Vec::new();

    let entries = fs::read_dir(role_dir)
        .map_err(|error| Error::Unknown(format!("{}: {}", role_dir.display(), error)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_inline_policy_file(file_name) || !path.is_file() {
            continue;
        }

        let document = read_json(&path).and_then(|value| match value {
            Value::Object(document) => Ok(document),
            _ => Err(Error::WrongType(format!(
                "{} is not a valid JSON object",
                path.display()
            ))),
        });

        match document {
            Ok(document) => {
                debug!("Loaded inline policy {}", path.display());
                policies.insert(file_name.to_string(), document);
            }
            Err(reason) => {
                warn!(
                    "Could not load inline policy '{}': {}. Skipping this policy.",
                    file_name, reason
                );
                skipped.push(SkippedFile { path, reason });
            }
        }
    }

    Ok((policies, skipped))
}

fn read_json(path: &Path) -> Result<Value, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(format!("{}: {}", path.display(), error))),
        },
    }?;

    match serde_json::from_str(&contents) {
        Ok(value) => Ok(value),
        Err(error) => Err(Error::ParsingError(format!("{}: {}", path.display(), error))),
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => {
                return Err(Error::DirectoryNotFound(dir.display().to_string()))
            }
            _ => return Err(Error::Unknown(format!("{}: {}", dir.display(), error))),
        },
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    Ok(names)
}

fn is_inline_policy_file(file_name: &str) -> bool {
    file_name.starts_with(INLINE_POLICY_PREFIX) && file_name.ends_with(INLINE_POLICY_SUFFIX)
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn missing_fields(errors: &ValidationErrors) -> Vec<&'static str> {
    let mut fields: Vec<&'static str> = errors
        .field_errors()
        .into_keys()
        .map(|field| match field {
            "role_name" => "roleName",
            "oidc_provider_url" => "oidcProviderUrl",
            "github_subject_claim" => "githubSubjectClaim",
            other => other,
        })
        .collect();
    fields.sort_unstable();
    fields
}
