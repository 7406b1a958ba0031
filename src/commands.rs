use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use log::{info, warn};
use serde::Serialize;

use crate::config;
use crate::constants::ACCOUNT_ID_LENGTH;
use crate::stack::{self, ApplyOperation, DeployedStack, PreviewSummary, StackBackend};
use crate::template;
use crate::types::ExitCode;
use crate::writer::{self, Report};

/// Problems with the invocation itself, all reported as configuration errors.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid AWS account id '{0}': must be exactly {1} digits")]
    InvalidAccountId(String, usize),

    #[error("Roles directory {0} not found")]
    RolesDirNotFound(String),

    #[error(
        "{} role(s) failed to load for account {}: {}. Deploying without them would remove them from the stack",
        .failures.len(), .account_id, .failures.join("; ")
    )]
    RolesFailed {
        account_id: String,
        failures: Vec<String>,
    },

    #[error(
        "Roles of account {} cannot share one stack: {}",
        .account_id, .conflicts.join("; ")
    )]
    ConflictingRoles {
        account_id: String,
        conflicts: Vec<String>,
    },

    #[error("Refusing to {0} without confirmation: pass --auto-approve when not running interactively")]
    ConfirmationRequired(&'static str),
}

/// Answers a yes/no question put to the operator. The answer is awaited so
/// an interrupt can still win while nobody has replied.
pub type Confirm<'a> = dyn FnMut(String) -> BoxFuture<'static, Result<bool>> + 'a;

fn check_account_id(account_id: &str) -> Result<(), Error> {
    config::validate_account_id(account_id)
        .map_err(|_| Error::InvalidAccountId(account_id.to_string(), ACCOUNT_ID_LENGTH))
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub account_id: String,
    pub role_name: Option<String>,
    pub roles_dir: PathBuf,
    pub stack_name: String,
    pub dry_run: bool,
    pub auto_approve: bool,
    pub outputs_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    Preview,
    Deploy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangesSummary {
    #[serde(flatten)]
    pub preview: PreviewSummary,
    pub total_changes: usize,
}

impl From<PreviewSummary> for ChangesSummary {
    fn from(preview: PreviewSummary) -> Self {
        let total_changes = preview.total_changes();
        Self {
            preview,
            total_changes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<DeployMode>,
    pub account_id: String,
    pub stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub roles_processed: usize,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes_summary: Option<ChangesSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<ApplyOperation>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.roles.is_empty() {
            return writeln!(f, "No role configurations found for account {}", self.account_id);
        }
        if self.status == "cancelled" {
            return writeln!(f, "Deployment cancelled by user");
        }

        let heading = match self.deployment_mode {
            Some(DeployMode::Preview) => "Preview Summary:",
            _ => "Deployment successful!",
        };
        writeln!(f, "{}", heading)?;
        writeln!(f, "  Account: {}", self.account_id)?;
        writeln!(f, "  Stack: {}", self.stack_name)?;
        writeln!(f, "  Roles: {}", self.roles.len())?;
        for role in &self.roles {
            writeln!(f, "    - {}", role)?;
        }
        for skipped in &self.skipped_files {
            writeln!(f, "  Skipped: {}", skipped)?;
        }

        if let Some(summary) = &self.changes_summary {
            let preview = &summary.preview;
            writeln!(
                f,
                "  Changes: {} to create, {} to update, {} to delete, {} unchanged",
                preview.create, preview.update, preview.delete, preview.same
            )?;
            for change in &preview.changes {
                let replacement = if change.replacement { " (replacement)" } else { "" };
                writeln!(
                    f,
                    "    {} {} {}{}",
                    change.action, change.resource_type, change.logical_id, replacement
                )?;
            }
            writeln!(f, "Dry run preview completed. No changes were applied.")?;
        }

        if let Some(operation) = self.operation {
            let operation = match operation {
                ApplyOperation::Created => "created",
                ApplyOperation::Updated => "updated",
                ApplyOperation::Unchanged => "unchanged",
            };
            writeln!(f, "  Stack {}", operation)?;
        }
        if !self.outputs.is_empty() {
            writeln!(f, "Stack Outputs:")?;
            write!(f, "{}", writer::outputs_table(&self.outputs))?;
        }

        Ok(())
    }
}

impl Report for DeployReport {
    fn exit_code(&self) -> ExitCode {
        ExitCode::Success
    }
}

/// Discovers the account's roles and previews or applies them. `connect` is
/// only called once there is something to send to CloudFormation.
pub async fn deploy<B, F, Fut>(
    request: &DeployRequest,
    connect: F,
    confirm: &mut Confirm<'_>,
) -> Result<DeployReport>
where
    B: StackBackend,
    F: FnOnce() -> Fut,
    Fut: Future<Output = B>,
{
    check_account_id(&request.account_id)?;

    let discovery = config::discover(
        &request.roles_dir,
        &request.account_id,
        request.role_name.as_deref(),
    );
    if !discovery.failures.is_empty() {
        let failures = discovery
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.role_dir, failure.error))
            .collect();
        return Err(Error::RolesFailed {
            account_id: request.account_id.clone(),
            failures,
        }
        .into());
    }

    let roles = discovery.configs();
    let conflicts = template::conflicts(&roles);
    if !conflicts.is_empty() {
        return Err(Error::ConflictingRoles {
            account_id: request.account_id.clone(),
            conflicts,
        }
        .into());
    }

    let mut report = DeployReport {
        status: "success",
        deployment_mode: None,
        account_id: request.account_id.clone(),
        stack_name: request.stack_name.clone(),
        message: None,
        roles_processed: roles.len(),
        roles: roles.iter().map(|role| role.role_name().to_string()).collect(),
        skipped_files: discovery
            .skipped_files()
            .map(|skipped| format!("{} ({})", skipped.path.display(), skipped.reason))
            .collect(),
        changes_summary: None,
        operation: None,
        outputs: BTreeMap::new(),
    };

    if roles.is_empty() {
        report.message = Some(String::from("No role configurations found"));
        return Ok(report);
    }
    if let Some(role_name) = &request.role_name {
        warn!(
            "Only '{}' is included, any other role in {} will be removed",
            role_name, request.stack_name
        );
    }

    let backend = connect().await;

    if request.dry_run {
        info!("Generating deployment preview...");
        let preview = backend.preview(&roles).await.context("Preview failed")?;

        report.deployment_mode = Some(DeployMode::Preview);
        report.changes_summary = Some(preview.into());
        return Ok(report);
    }

    if !request.auto_approve {
        let question = format!(
            "Deploy {} role(s) to stack {}?",
            roles.len(),
            backend.stack_name()
        );
        if !confirm(question).await? {
            report.status = "cancelled";
            report.message = Some(String::from("Deployment cancelled by user"));
            return Ok(report);
        }
    }

    info!("Deploying resources...");
    let applied = backend.apply(&roles).await.context("Deployment failed")?;
    let outputs = backend
        .outputs()
        .await
        .context("Unable to read stack outputs")?;
    if let Some(path) = &request.outputs_file {
        writer::write_outputs(path, &outputs)
            .with_context(|| format!("Unable to write outputs to {}", path.display()))?;
    }

    report.deployment_mode = Some(DeployMode::Deploy);
    report.operation = Some(applied.operation);
    report.outputs = outputs;
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestroyReport {
    pub status: &'static str,
    pub account_id: String,
    pub stack_name: String,
    pub message: String,
}

impl fmt::Display for DestroyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        writeln!(f, "  Account: {}", self.account_id)
    }
}

impl Report for DestroyReport {
    fn exit_code(&self) -> ExitCode {
        match self.status {
            "not_found" => ExitCode::ConfigError,
            _ => ExitCode::Success,
        }
    }
}

pub async fn destroy<B: StackBackend + ?Sized>(
    account_id: &str,
    backend: &B,
    auto_approve: bool,
    confirm: &mut Confirm<'_>,
) -> Result<DestroyReport> {
    check_account_id(account_id)?;

    let report = |status, message: String| DestroyReport {
        status,
        account_id: account_id.to_string(),
        stack_name: backend.stack_name().to_string(),
        message,
    };
    let not_found = || {
        report(
            "not_found",
            format!("No stack found for account {}", account_id),
        )
    };

    if backend.info().await.context("Unable to read stack")?.is_none() {
        return Ok(not_found());
    }

    if !auto_approve {
        let question = format!(
            "Destroy every role in stack {}? This cannot be undone.",
            backend.stack_name()
        );
        if !confirm(question).await? {
            return Ok(report("cancelled", String::from("Destroy cancelled by user")));
        }
    }

    match backend.destroy().await.context("Destroy failed")? {
        true => Ok(report("success", String::from("Stack destroyed successfully"))),
        false => Ok(not_found()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub account_id: String,
    pub stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status == "not_found" {
            writeln!(f, "Stack {} not found", self.stack_name)?;
            return writeln!(f, "No resources deployed for account {}", self.account_id);
        }

        writeln!(f, "Stack: {}", self.stack_name)?;
        writeln!(f, "  Account: {}", self.account_id)?;
        writeln!(f, "  Status: {}", self.stack_status.as_deref().unwrap_or("UNKNOWN"))?;
        if let Some(reason) = &self.status_reason {
            writeln!(f, "  Reason: {}", reason)?;
        }
        writeln!(f, "  Last Update: {}", self.update_time.as_deref().unwrap_or("Unknown"))?;
        if self.outputs.is_empty() {
            return writeln!(f, "No outputs available");
        }
        writeln!(f, "Outputs:")?;
        write!(f, "{}", writer::outputs_table(&self.outputs))
    }
}

impl Report for StatusReport {
    fn exit_code(&self) -> ExitCode {
        match self.status {
            "not_found" => ExitCode::ConfigError,
            _ => ExitCode::Success,
        }
    }
}

pub async fn status<B: StackBackend + ?Sized>(
    account_id: &str,
    backend: &B,
    outputs_file: Option<&Path>,
) -> Result<StatusReport> {
    check_account_id(account_id)?;

    let mut report = StatusReport {
        status: "not_found",
        account_id: account_id.to_string(),
        stack_name: backend.stack_name().to_string(),
        stack_status: None,
        status_reason: None,
        update_time: None,
        outputs: BTreeMap::new(),
    };

    let Some(summary) = backend.info().await.context("Unable to read stack")? else {
        return Ok(report);
    };
    let outputs = backend
        .outputs()
        .await
        .context("Unable to read stack outputs")?;
    if let Some(path) = outputs_file {
        writer::write_outputs(path, &outputs)
            .with_context(|| format!("Unable to write outputs to {}", path.display()))?;
    }

    report.status = "found";
    report.stack_status = Some(summary.status);
    report.status_reason = summary.status_reason;
    report.update_time = summary.last_update;
    report.outputs = outputs;
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountValidation {
    pub account_id: String,
    pub valid_roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidateReport {
    pub status: &'static str,
    pub roles_dir: String,
    pub total_roles: usize,
    pub total_failures: usize,
    pub total_warnings: usize,
    pub accounts: Vec<AccountValidation>,
    #[serde(skip)]
    exit_code: ExitCode,
}

impl fmt::Display for ValidateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accounts.is_empty() {
            return writeln!(f, "No account directories found in {}", self.roles_dir);
        }

        for account in &self.accounts {
            writeln!(f, "Account {}:", account.account_id)?;
            for role in &account.valid_roles {
                writeln!(f, "  ok      {}", role)?;
            }
            for failure in &account.failures {
                writeln!(f, "  error   {}", failure)?;
            }
            for skipped in &account.skipped_files {
                writeln!(f, "  skipped {}", skipped)?;
            }
            for warning in &account.warnings {
                writeln!(f, "  warning {}", warning)?;
            }
        }
        writeln!(
            f,
            "{} valid role(s), {} failure(s), {} warning(s)",
            self.total_roles, self.total_failures, self.total_warnings
        )
    }
}

impl Report for ValidateReport {
    fn exit_code(&self) -> ExitCode {
        self.exit_code
    }
}

/// Loads every role of every account under `roles_dir` without touching AWS.
pub fn validate(roles_dir: &Path, strict: bool) -> Result<ValidateReport> {
    if !roles_dir.is_dir() {
        return Err(Error::RolesDirNotFound(roles_dir.display().to_string()).into());
    }

    let account_ids = config::account_dirs(roles_dir)
        .with_context(|| format!("Unable to list {}", roles_dir.display()))?;

    let mut accounts = Vec::new();
    for account_id in account_ids {
        let discovery = config::discover(roles_dir, &account_id, None);
        let mut failures: Vec<String> = discovery
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.role_dir, failure.error))
            .collect();
        failures.extend(template::conflicts(&discovery.configs()));

        let mut warnings = Vec::new();
        for loaded in &discovery.roles {
            for warning in loaded.config.lint() {
                warnings.push(format!("{}: {}", loaded.config.role_name_dir, warning));
            }
        }

        accounts.push(AccountValidation {
            valid_roles: discovery
                .roles
                .iter()
                .map(|loaded| loaded.config.role_name().to_string())
                .collect(),
            failures,
            skipped_files: discovery
                .skipped_files()
                .map(|skipped| format!("{} ({})", skipped.path.display(), skipped.reason))
                .collect(),
            warnings,
            account_id,
        });
    }

    let total_roles = accounts.iter().map(|account| account.valid_roles.len()).sum();
    let total_failures = accounts.iter().map(|account| account.failures.len()).sum();
    let total_warnings = accounts.iter().map(|account| account.warnings.len()).sum();

    let (status, exit_code) = if total_failures > 0 {
        ("error", ExitCode::ConfigError)
    } else if strict && total_warnings > 0 {
        ("warning", ExitCode::ValidationError)
    } else {
        ("success", ExitCode::Success)
    };

    Ok(ValidateReport {
        status,
        roles_dir: roles_dir.display().to_string(),
        total_roles,
        total_failures,
        total_warnings,
        accounts,
        exit_code,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListReport {
    pub status: &'static str,
    pub base_stack_name: String,
    pub total_stacks: usize,
    pub stacks: Vec<DeployedStack>,
}

impl fmt::Display for ListReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stacks.is_empty() {
            return writeln!(f, "No stacks found with base name '{}'", self.base_stack_name);
        }

        writeln!(f, "Found {} stack(s):", self.total_stacks)?;
        for deployed in &self.stacks {
            let resources = if deployed.has_resources { "Active" } else { "Empty" };
            writeln!(
                f,
                "  {}  {}  {}  {}  {}",
                deployed.account_id,
                deployed.stack_name,
                deployed.status,
                resources,
                deployed.last_update.as_deref().unwrap_or("Unknown")
            )?;
        }
        Ok(())
    }
}

impl Report for ListReport {
    fn exit_code(&self) -> ExitCode {
        ExitCode::Success
    }
}

pub async fn list_stacks(
    client: &aws_sdk_cloudformation::Client,
    base_stack_name: &str,
) -> Result<ListReport> {
    let stacks = stack::list_deployed(client, base_stack_name)
        .await
        .context("Unable to list stacks")?;

    Ok(list_report(base_stack_name, stacks))
}

fn list_report(base_stack_name: &str, stacks: Vec<DeployedStack>) -> ListReport {
    ListReport {
        status: if stacks.is_empty() { "no_stacks" } else { "success" },
        base_stack_name: base_stack_name.to_string(),
        total_stacks: stacks.len(),
        stacks,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use std::time::Duration;

    use futures::future::{self, BoxFuture, FutureExt};
    use tempfile::tempdir;

    use super::{
        deploy, destroy, list_report, status, validate, DeployMode, DeployRequest, Error,
    };
    use crate::config::RoleConfig;
    use crate::stack::{
        self, planned_creates, ApplyOperation, ApplySummary, DeployedStack, PreviewSummary,
        StackBackend, StackSummary,
    };
    use crate::template;
    use crate::types::ExitCode;
    use crate::writer::Report;

    const ACCOUNT: &str = "123456789012";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Preview(Vec<String>),
        Apply(Vec<String>),
        Destroy,
        Outputs,
        Info,
    }

    #[derive(Clone, Default)]
    struct FakeBackend {
        calls: Arc<Mutex<Vec<Call>>>,
        deployed: bool,
        fail_apply: bool,
    }

    impl FakeBackend {
        fn deployed() -> Self {
            Self {
                deployed: true,
                ..Self::default()
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn names(roles: &[RoleConfig]) -> Vec<String> {
        roles.iter().map(|role| role.role_name().to_string()).collect()
    }

    impl StackBackend for FakeBackend {
        fn stack_name(&self) -> &str {
            "dev-123456789012"
        }

        fn preview<'a>(
            &'a self,
            roles: &'a [RoleConfig],
        ) -> BoxFuture<'a, Result<PreviewSummary, stack::Error>> {
            self.record(Call::Preview(names(roles)));
            future::ready(Ok(planned_creates(&template::definitions(roles)))).boxed()
        }

        fn apply<'a>(
            &'a self,
            roles: &'a [RoleConfig],
        ) -> BoxFuture<'a, Result<ApplySummary, stack::Error>> {
            self.record(Call::Apply(names(roles)));
            let result = match self.fail_apply {
                true => Err(stack::Error::OperationFailed(String::from(
                    "dev-123456789012 ended in UPDATE_ROLLBACK_COMPLETE",
                ))),
                false => Ok(ApplySummary {
                    operation: ApplyOperation::Created,
                    status: String::from("CREATE_COMPLETE"),
                }),
            };
            future::ready(result).boxed()
        }

        fn destroy(&self) -> BoxFuture<'_, Result<bool, stack::Error>> {
            self.record(Call::Destroy);
            future::ready(Ok(self.deployed)).boxed()
        }

        fn outputs(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, stack::Error>> {
            self.record(Call::Outputs);
            let mut outputs = BTreeMap::new();
            if self.deployed {
                outputs.insert(
                    String::from("Gha123456789012Z2DDeployZ2DroleArn"),
                    String::from("arn:aws:iam::123456789012:role/Deploy"),
                );
            }
            future::ready(Ok(outputs)).boxed()
        }

        fn info(&self) -> BoxFuture<'_, Result<Option<StackSummary>, stack::Error>> {
            self.record(Call::Info);
            let summary = self.deployed.then(|| StackSummary {
                stack_name: String::from("dev-123456789012"),
                status: String::from("CREATE_COMPLETE"),
                status_reason: None,
                last_update: Some(String::from("2024-07-01T10:00:00Z")),
                output_count: 1,
            });
            future::ready(Ok(summary)).boxed()
        }
    }

    fn write_role(base: &Path, role_dir: &str, role_name: &str) {
        let dir = base.join(ACCOUNT).join(role_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("details.json"),
            format!(
                r#"{{
                    "roleName": "{}",
                    "oidcProviderUrl": "token.actions.githubusercontent.com",
                    "githubSubjectClaim": "repo:org/repo:ref:refs/heads/main"
                }}"#,
                role_name
            ),
        )
        .unwrap();
    }

    fn request(roles_dir: &Path) -> DeployRequest {
        DeployRequest {
            account_id: String::from(ACCOUNT),
            role_name: None,
            roles_dir: roles_dir.to_path_buf(),
            stack_name: String::from("dev-123456789012"),
            dry_run: false,
            auto_approve: true,
            outputs_file: None,
        }
    }

    fn approve(_question: String) -> BoxFuture<'static, anyhow::Result<bool>> {
        future::ready(Ok(true)).boxed()
    }

    fn decline(_question: String) -> BoxFuture<'static, anyhow::Result<bool>> {
        future::ready(Ok(false)).boxed()
    }

    fn unattended(_question: String) -> BoxFuture<'static, anyhow::Result<bool>> {
        future::ready(Err(Error::ConfirmationRequired("deploy").into())).boxed()
    }

    /// An operator who never answers.
    fn silent(_question: String) -> BoxFuture<'static, anyhow::Result<bool>> {
        future::pending().boxed()
    }

    #[tokio::test]
    async fn dry_run_previews_once_and_never_applies() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Staging", "GitHubActionsStaging");
        write_role(dir.path(), "Prod", "GitHubActionsProd");
        let backend = FakeBackend::default();

        let request = DeployRequest {
            dry_run: true,
            auto_approve: false,
            ..request(dir.path())
        };
        let connected = backend.clone();
        let report = deploy(&request, move || async move { connected }, &mut unattended)
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(1, calls.len());
        match &calls[0] {
            Call::Preview(roles) => {
                let mut roles = roles.clone();
                roles.sort();
                assert_eq!(vec!["GitHubActionsProd", "GitHubActionsStaging"], roles);
            }
            other => panic!("Expected a preview, got {:?}", other),
        }
        assert_eq!(ExitCode::Success, report.exit_code());
        assert_eq!(Some(DeployMode::Preview), report.deployment_mode);
        assert_eq!(2, report.changes_summary.unwrap().total_changes);
    }

    #[tokio::test]
    async fn missing_account_directory_is_not_an_error() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::default();

        let connected = backend.clone();
        let report = deploy(&request(dir.path()), move || async move { connected }, &mut approve)
            .await
            .unwrap();

        assert_eq!(ExitCode::Success, report.exit_code());
        assert_eq!(0, report.roles_processed);
        assert_eq!(Some(String::from("No role configurations found")), report.message);
        assert_eq!(true, backend.calls().is_empty());
        assert!(report.to_string().contains("No role configurations found"));
    }

    #[tokio::test]
    async fn apply_reports_outputs() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend::deployed();
        let outputs_file = dir.path().join("outputs.json");

        let request = DeployRequest {
            outputs_file: Some(outputs_file.clone()),
            ..request(dir.path())
        };
        let connected = backend.clone();
        let report = deploy(&request, move || async move { connected }, &mut unattended)
            .await
            .unwrap();

        assert_eq!(
            vec![Call::Apply(vec![String::from("Deploy")]), Call::Outputs],
            backend.calls()
        );
        assert_eq!(Some(DeployMode::Deploy), report.deployment_mode);
        assert_eq!(Some(ApplyOperation::Created), report.operation);
        assert_eq!(1, report.outputs.len());
        assert_eq!(true, outputs_file.is_file());
    }

    #[tokio::test]
    async fn declined_confirmation_cancels() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend::default();

        let request = DeployRequest {
            auto_approve: false,
            ..request(dir.path())
        };
        let connected = backend.clone();
        let report = deploy(&request, move || async move { connected }, &mut decline)
            .await
            .unwrap();

        assert_eq!("cancelled", report.status);
        assert_eq!(ExitCode::Success, report.exit_code());
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn unconfirmed_deploy_fails_without_a_terminal() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend::default();

        let request = DeployRequest {
            auto_approve: false,
            ..request(dir.path())
        };
        let connected = backend.clone();
        let error = deploy(&request, move || async move { connected }, &mut unattended)
            .await
            .unwrap_err();

        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn broken_role_aborts_deploy() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let broken = dir.path().join(ACCOUNT).join("Broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("details.json"), r#"{"roleName": "Broken"}"#).unwrap();
        let backend = FakeBackend::default();

        let connected = backend.clone();
        let error = deploy(&request(dir.path()), move || async move { connected }, &mut approve)
            .await
            .unwrap_err();

        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
        assert!(error.to_string().contains("Broken"));
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_requested_role_aborts_deploy() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend::default();

        let request = DeployRequest {
            role_name: Some(String::from("Missing")),
            ..request(dir.path())
        };
        let connected = backend.clone();
        let error = deploy(&request, move || async move { connected }, &mut approve)
            .await
            .unwrap_err();

        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn roles_sharing_a_name_abort_deploy() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "A", "Deploy");
        write_role(dir.path(), "B", "Deploy");
        let backend = FakeBackend::default();

        let connected = backend.clone();
        let error = deploy(&request(dir.path()), move || async move { connected }, &mut approve)
            .await
            .unwrap_err();

        match error.downcast_ref::<Error>() {
            Some(Error::ConflictingRoles { conflicts, .. }) => {
                assert_eq!(vec!["role name 'Deploy' is declared by both A and B"], *conflicts)
            }
            other => panic!("Expected `ConflictingRoles`, got {:?}", other),
        }
        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn waiting_for_confirmation_can_be_interrupted() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend::default();

        let request = DeployRequest {
            auto_approve: false,
            ..request(dir.path())
        };
        let connected = backend.clone();
        let mut confirm = silent;
        let interrupted = tokio::select! {
            _ = deploy(&request, move || async move { connected }, &mut confirm) => false,
            _ = tokio::time::sleep(Duration::from_millis(20)) => true,
        };

        assert_eq!(true, interrupted);
        assert_eq!(true, backend.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_account_id_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::default();

        let request = DeployRequest {
            account_id: String::from("12345"),
            ..request(dir.path())
        };
        let connected = backend.clone();
        let error = deploy(&request, move || async move { connected }, &mut approve)
            .await
            .unwrap_err();

        assert_eq!(
            Some(&Error::InvalidAccountId(String::from("12345"), 12)),
            error.downcast_ref::<Error>()
        );
        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
    }

    #[tokio::test]
    async fn engine_failures_are_provider_errors() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let backend = FakeBackend {
            fail_apply: true,
            ..FakeBackend::default()
        };

        let connected = backend.clone();
        let error = deploy(&request(dir.path()), move || async move { connected }, &mut approve)
            .await
            .unwrap_err();

        assert_eq!(ExitCode::ProviderError, ExitCode::for_error(&error));
        assert_eq!("Deployment failed", error.to_string());
    }

    #[tokio::test]
    async fn destroying_a_missing_stack_is_reported() {
        let backend = FakeBackend::default();

        let report = destroy(ACCOUNT, &backend, true, &mut approve).await.unwrap();

        assert_eq!("not_found", report.status);
        assert_eq!(ExitCode::ConfigError, report.exit_code());
        assert_eq!(vec![Call::Info], backend.calls());
    }

    #[tokio::test]
    async fn destroy_asks_first() {
        let backend = FakeBackend::deployed();

        let report = destroy(ACCOUNT, &backend, false, &mut decline).await.unwrap();
        assert_eq!("cancelled", report.status);
        assert_eq!(vec![Call::Info], backend.calls());

        let report = destroy(ACCOUNT, &backend, false, &mut approve).await.unwrap();
        assert_eq!("success", report.status);
        assert_eq!(ExitCode::Success, report.exit_code());
        assert_eq!(Some(&Call::Destroy), backend.calls().last());
    }

    #[tokio::test]
    async fn status_of_missing_stack() {
        let backend = FakeBackend::default();

        let report = status(ACCOUNT, &backend, None).await.unwrap();

        assert_eq!("not_found", report.status);
        assert_eq!(ExitCode::ConfigError, report.exit_code());
        assert_eq!(vec![Call::Info], backend.calls());
    }

    #[tokio::test]
    async fn status_of_deployed_stack() {
        let backend = FakeBackend::deployed();

        let report = status(ACCOUNT, &backend, None).await.unwrap();

        assert_eq!("found", report.status);
        assert_eq!(Some(String::from("CREATE_COMPLETE")), report.stack_status);
        assert_eq!(1, report.outputs.len());
        assert!(report.to_string().contains("arn:aws:iam::123456789012:role/Deploy"));
    }

    #[test]
    fn validation_reports_failures_and_lint() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "Deploy", "Deploy");
        let role_dir = dir.path().join(ACCOUNT).join("Deploy");
        fs::write(role_dir.join("managed-policies.json"), r#"["ReadOnlyAccess"]"#).unwrap();

        let report = validate(dir.path(), false).unwrap();
        assert_eq!("success", report.status);
        assert_eq!(1, report.total_warnings);

        let report = validate(dir.path(), true).unwrap();
        assert_eq!("warning", report.status);
        assert_eq!(ExitCode::ValidationError, report.exit_code());

        let broken = dir.path().join(ACCOUNT).join("Broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("details.json"), "{").unwrap();

        let report = validate(dir.path(), true).unwrap();
        assert_eq!("error", report.status);
        assert_eq!(1, report.total_roles);
        assert_eq!(1, report.total_failures);
        assert_eq!(ExitCode::ConfigError, report.exit_code());
    }

    #[test]
    fn validation_rejects_roles_sharing_a_name() {
        let dir = tempdir().unwrap();
        write_role(dir.path(), "A", "Deploy");
        write_role(dir.path(), "B", "Deploy");

        let report = validate(dir.path(), false).unwrap();
        assert_eq!("error", report.status);
        assert_eq!(1, report.total_failures);
        assert_eq!(
            vec!["role name 'Deploy' is declared by both A and B"],
            report.accounts[0].failures
        );
        assert_eq!(ExitCode::ConfigError, report.exit_code());
    }

    #[test]
    fn validation_needs_a_roles_directory() {
        let dir = tempdir().unwrap();

        let error = validate(&dir.path().join("missing"), false).unwrap_err();
        assert_eq!(ExitCode::ConfigError, ExitCode::for_error(&error));
    }

    #[test]
    fn empty_listing() {
        let report = list_report("dev", Vec::new());
        assert_eq!("no_stacks", report.status);
        assert!(report.to_string().contains("No stacks found with base name 'dev'"));

        let report = list_report(
            "dev",
            vec![DeployedStack {
                account_id: String::from(ACCOUNT),
                stack_name: String::from("dev-123456789012"),
                status: String::from("UPDATE_COMPLETE"),
                has_resources: true,
                output_count: 2,
                last_update: None,
            }],
        );
        assert_eq!("success", report.status);
        assert_eq!(1, report.total_stacks);
    }
}
