//! Turns a loaded role into the resources that declare it: the role with its
//! trust policy and tags, one attachment per managed policy, one inline
//! policy per `inline-*.json` file.
//!
//! Nothing here talks to AWS. The same `RoleConfig` always produces the same
//! identifiers and the same documents, which is what lets the engine update
//! resources in place instead of replacing them.

use log::debug;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::config::RoleConfig;
use crate::constants::{
    ACCOUNT_ID_TAG, CONFIG_PATH_TAG, DEFAULT_TAGS, INLINE_POLICY_PREFIX, INLINE_POLICY_SUFFIX,
    SECURE_SCHEME,
};

/// Prefix of every logical id, keeps ids starting with a letter.
const LOGICAL_ID_PREFIX: &str = "Gha";
/// Escape character of the logical id encoding.
const ESCAPE: char = 'Z';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleResource {
    pub logical_id: String,
    pub role_name: String,
    pub description: Option<String>,
    pub assume_role_policy: Value,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedPolicyAttachment {
    pub logical_id: String,
    pub policy_arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlinePolicy {
    pub logical_id: String,
    pub policy_name: String,
    pub document: Map<String, Value>,
}

/// Desired state of one role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleDefinition {
    pub account_id: String,
    pub role: RoleResource,
    pub managed_policies: Vec<ManagedPolicyAttachment>,
    pub inline_policies: Vec<InlinePolicy>,
}

impl RoleDefinition {
    pub fn resource_count(&self) -> usize {
        1 + self.inline_policies.len()
    }
}

pub fn build(config: &RoleConfig) -> RoleDefinition {
    let role_name = config.role_name();
    let base = format!("{}-{}", config.account_id, role_name);

    let host = federation_host(&config.details.oidc_provider_url);
    let provider = provider_arn(&config.account_id, host);
    debug!("Constructed OIDC provider ARN: {}", provider);

    let role = RoleResource {
        logical_id: logical_id(&format!("{}-role", base)),
        role_name: role_name.to_string(),
        description: config.details.description.clone(),
        assume_role_policy: trust_policy(
            &provider,
            host,
            &config.details.github_subject_claim,
            config.audience(),
        ),
        tags: merge_tags(config),
    };

    let managed_policies = config
        .managed_policies
        .iter()
        .enumerate()
        .map(|(index, policy_arn)| ManagedPolicyAttachment {
            logical_id: logical_id(&format!("{}-managed-{}", base, index)),
            policy_arn: policy_arn.clone(),
        })
        .collect();

    let inline_policies = config
        .inline_policies
        .iter()
        .map(|(file_name, document)| {
            let name = inline_policy_name(file_name);
            InlinePolicy {
                logical_id: logical_id(&format!("{}-inline-{}", base, name)),
                policy_name: format!("{}-{}", role_name, name),
                document: document.clone(),
            }
        })
        .collect();

    debug!(
        "Defined resources for role {} in account {}",
        role_name, config.account_id
    );

    RoleDefinition {
        account_id: config.account_id.clone(),
        role,
        managed_policies,
        inline_policies,
    }
}

/// Issuer host used in the provider ARN and the condition keys.
pub fn federation_host(oidc_provider_url: &str) -> &str {
    oidc_provider_url
        .strip_prefix(SECURE_SCHEME)
        .unwrap_or(oidc_provider_url)
}

pub fn provider_arn(account_id: &str, host: &str) -> String {
    format!("arn:aws:iam::{}:oidc-provider/{}", account_id, host)
}

/// Web-identity trust policy bound to one issuer. Both `sub` and `aud` are
/// matched with `StringEquals`; widening either to a pattern match would let
/// other repositories or workflows assume the role.
pub fn trust_policy(provider_arn: &str, host: &str, subject_claim: &str, audience: &str) -> Value {
    let mut string_equals = Map::new();
    string_equals.insert(
        format!("{}:sub", host),
        Value::String(subject_claim.to_string()),
    );
    string_equals.insert(format!("{}:aud", host), Value::String(audience.to_string()));

    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Federated": provider_arn },
                "Action": "sts:AssumeRoleWithWebIdentity",
                "Condition": { "StringEquals": string_equals }
            }
        ]
    })
}

/// Default tags, overridden key by key by the role's own tags. The path and
/// account tags are applied last so a role cannot spoof them.
pub fn merge_tags(config: &RoleConfig) -> BTreeMap<String, String> {
    let mut tags: BTreeMap<String, String> = DEFAULT_TAGS
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    tags.extend(config.details.tags.clone());
    tags.insert(
        CONFIG_PATH_TAG.to_string(),
        config.path().display().to_string(),
    );
    tags.insert(ACCOUNT_ID_TAG.to_string(), config.account_id.clone());

    tags
}

/// `inline-CloudWatchLogs.json` -> `CloudWatchLogs`.
pub fn inline_policy_name(file_name: &str) -> &str {
    let name = file_name
        .strip_prefix(INLINE_POLICY_PREFIX)
        .unwrap_or(file_name);
    name.strip_suffix(INLINE_POLICY_SUFFIX).unwrap_or(name)
}

/// Encodes a readable resource name into the `[A-Za-z0-9]` alphabet of
/// CloudFormation logical ids. Every byte outside that alphabet, and the
/// escape character itself, becomes `Z` plus two hex digits, so distinct
/// names never share an id.
pub fn logical_id(name: &str) -> String {
    let mut id = String::from(LOGICAL_ID_PREFIX);
    for character in name.chars() {
        if character.is_ascii_alphanumeric() && character != ESCAPE {
            id.push(character);
            continue;
        }
        let mut buffer = [0u8; 4];
        for byte in character.encode_utf8(&mut buffer).bytes() {
            id.push(ESCAPE);
            id.push_str(&format!("{:02X}", byte));
        }
    }
    id
}
