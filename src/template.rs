//! CloudFormation program for one account stack.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::config::RoleConfig;
use crate::resources::{self, RoleDefinition};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const ROLE_RESOURCE_TYPE: &str = "AWS::IAM::Role";
pub const ROLE_POLICY_RESOURCE_TYPE: &str = "AWS::IAM::RolePolicy";

/// Declarations for every role, in input order.
pub fn definitions(roles: &[RoleConfig]) -> Vec<RoleDefinition> {
    roles.iter().map(resources::build).collect()
}

/// Logical ids `render` puts under `Resources` for one role.
pub fn resource_ids(definition: &RoleDefinition) -> Vec<&str> {
    let mut ids = vec![definition.role.logical_id.as_str()];
    ids.extend(
        definition
            .inline_policies
            .iter()
            .map(|policy| policy.logical_id.as_str()),
    );
    ids
}

/// Logical ids `render` puts under `Outputs` for one role.
pub fn output_ids(definition: &RoleDefinition) -> [String; 2] {
    let role = &definition.role.logical_id;
    [format!("{}Arn", role), format!("{}Name", role)]
}

/// Roles that cannot live in one template: IAM names clash case-insensitively
/// and logical ids must be unique or one declaration replaces the other.
pub fn conflicts(roles: &[RoleConfig]) -> Vec<String> {
    let mut found = Vec::new();
    let mut clashing_dirs = BTreeSet::new();

    let mut names: BTreeMap<String, &str> = BTreeMap::new();
    for role in roles {
        match names.entry(role.role_name().to_lowercase()) {
            Entry::Occupied(entry) => {
                found.push(format!(
                    "role name '{}' is declared by both {} and {}",
                    role.role_name(),
                    entry.get(),
                    role.role_name_dir
                ));
                clashing_dirs.insert(role.role_name_dir.as_str());
            }
            Entry::Vacant(entry) => {
                entry.insert(&role.role_name_dir);
            }
        }
    }

    let declared = definitions(roles);
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for (role, definition) in roles.iter().zip(&declared) {
        if clashing_dirs.contains(role.role_name_dir.as_str()) {
            continue;
        }
        for id in resource_ids(definition) {
            match owners.entry(id) {
                Entry::Occupied(entry) => found.push(format!(
                    "logical id {} is produced by both {} and {}",
                    id,
                    entry.get(),
                    role.role_name_dir
                )),
                Entry::Vacant(entry) => {
                    entry.insert(&role.role_name_dir);
                }
            }
        }
    }

    found
}

pub fn render(definitions: &[RoleDefinition]) -> Value {
    let mut resources = Map::new();
    let mut outputs = Map::new();

    for definition in definitions {
        let role = &definition.role;

        let tags: Vec<Value> = role
            .tags
            .iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect();

        let mut properties = Map::new();
        properties.insert("RoleName".into(), json!(role.role_name));
        properties.insert("AssumeRolePolicyDocument".into(), role.assume_role_policy.clone());
        properties.insert("Tags".into(), Value::Array(tags));
        if let Some(description) = &role.description {
            properties.insert("Description".into(), json!(description));
        }
        // CloudFormation attaches managed policies through the role itself;
        // each attachment's id is kept in the resource metadata.
        if !definition.managed_policies.is_empty() {
            let arns: Vec<&str> = definition
                .managed_policies
                .iter()
                .map(|attachment| attachment.policy_arn.as_str())
                .collect();
            properties.insert("ManagedPolicyArns".into(), json!(arns));
        }

        let attachments: Map<String, Value> = definition
            .managed_policies
            .iter()
            .map(|attachment| (attachment.logical_id.clone(), json!(attachment.policy_arn)))
            .collect();

        resources.insert(
            role.logical_id.clone(),
            json!({
                "Type": ROLE_RESOURCE_TYPE,
                "Properties": properties,
                "Metadata": {
                    "AccountId": definition.account_id,
                    "ManagedPolicyAttachments": attachments
                }
            }),
        );

        for policy in &definition.inline_policies {
            resources.insert(
                policy.logical_id.clone(),
                json!({
                    "Type": ROLE_POLICY_RESOURCE_TYPE,
                    "Properties": {
                        "PolicyName": policy.policy_name,
                        "PolicyDocument": policy.document,
                        "RoleName": { "Ref": role.logical_id }
                    }
                }),
            );
        }

        let [arn_output, name_output] = output_ids(definition);
        outputs.insert(
            arn_output,
            json!({
                "Description": format!("ARN of {}", role.role_name),
                "Value": { "Fn::GetAtt": [role.logical_id, "Arn"] }
            }),
        );
        outputs.insert(
            name_output,
            json!({
                "Description": format!("Name of {}", role.role_name),
                "Value": { "Ref": role.logical_id }
            }),
        );
    }

    json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": "GitHub Actions OIDC roles managed by oidc-role-manager",
        "Resources": resources,
        "Outputs": outputs
    })
}
