//! Fixed values shared by the loader, the resource builder and the CLI.

/// Tags applied to every role before role-specific overrides.
pub const DEFAULT_TAGS: [(&str, &str); 4] = [
    ("ManagedBy", "OIDC-Role-Manager"),
    ("Environment", "Development"),
    ("Tool", "CloudFormation"),
    ("Purpose", "OIDC-GitHub-Integration"),
];

/// Tag carrying the on-disk location of the role definition. Never overridable.
pub const CONFIG_PATH_TAG: &str = "ConfigPath";
/// Tag carrying the target account id. Never overridable.
pub const ACCOUNT_ID_TAG: &str = "AccountId";

pub const DEFAULT_AUDIENCE: &str = "sts.amazonaws.com";
pub const SECURE_SCHEME: &str = "https://";

pub const DETAILS_FILE: &str = "details.json";
pub const MANAGED_POLICIES_FILE: &str = "managed-policies.json";
pub const INLINE_POLICY_PREFIX: &str = "inline-";
pub const INLINE_POLICY_SUFFIX: &str = ".json";

pub const DEFAULT_STACK_NAME: &str = "dev";
pub const DEFAULT_ROLES_DIR: &str = "roles";
pub const DEFAULT_SETTINGS_FILE: &str = "oidc-role-manager.yaml";

// IAM quotas, checked as warnings by `validate`.
pub const MAX_ROLE_NAME_LENGTH: usize = 64;
pub const MAX_POLICY_NAME_LENGTH: usize = 128;
pub const MAX_MANAGED_POLICIES_PER_ROLE: usize = 20;
pub const MAX_INLINE_POLICIES_PER_ROLE: usize = 10;
/// CloudFormation limit for resource and output logical ids.
pub const MAX_LOGICAL_ID_LENGTH: usize = 255;

pub const ACCOUNT_ID_LENGTH: usize = 12;
