use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::primitives::{DateTime, DateTimeFormat};
use aws_sdk_cloudformation::types::{Capability, ChangeSetType, Stack as StackDescription};
use aws_types::region::Region;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, log, warn, Level};
use regex::Regex;
use serde::Serialize;

use crate::config::RoleConfig;
use crate::resources::RoleDefinition;
use crate::template::{self, ROLE_POLICY_RESOURCE_TYPE, ROLE_RESOURCE_TYPE};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Stack {0} not found")]
    NotFoundError(String),

    #[error("Stack operation failed: {0}")]
    OperationFailed(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("Template error: {0}")]
    Template(String),
}

/// Lines from the engine that carry no information for the operator.
const NOISE_MARKERS: [&str; 2] = ["REVIEW_IN_PROGRESS", "Resource creation Initiated"];
const ERROR_MARKERS: [&str; 4] = ["FAILED", "failed", "error:", "Error:"];
const WARNING_MARKERS: [&str; 4] = ["ROLLBACK", "SKIPPED", "warning:", "Warning:"];

const NO_CHANGES_MARKERS: [&str; 2] = [
    "No updates are to be performed",
    "didn't contain changes",
];

/// Deployment unit of one account. Distinct accounts never share a stack.
pub fn stack_name(base_stack_name: &str, account_id: &str) -> String {
    format!("{}-{}", base_stack_name, account_id)
}

pub fn stack_pattern(base_stack_name: &str) -> Result<Regex, Error> {
    Regex::new(&format!(r"^{}-(\d{{12}})$", regex::escape(base_stack_name)))
        .map_err(|error| Error::UnknownError(error.to_string()))
}

/// Inverse of [`stack_name`] for a compiled [`stack_pattern`].
pub fn account_from_stack_name(pattern: &Regex, stack_name: &str) -> Option<String> {
    pattern
        .captures(stack_name)
        .and_then(|captures| captures.get(1))
        .map(|account| account.as_str().to_string())
}

/// Log level for one line of engine progress, `None` for noise.
pub fn classify_event(line: &str) -> Option<Level> {
    if NOISE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return None;
    }
    if ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(Level::Error);
    }
    if WARNING_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(Level::Warn);
    }
    Some(Level::Debug)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlannedChange {
    pub action: String,
    pub logical_id: String,
    pub resource_type: String,
    pub replacement: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviewSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub same: usize,
    pub changes: Vec<PlannedChange>,
}

impl PreviewSummary {
    fn from_changes(changes: Vec<PlannedChange>, declared_resources: usize) -> Self {
        let count = |action: &str| changes.iter().filter(|change| change.action == action).count();
        let create = count("Add");
        let update = count("Modify");
        let delete = count("Remove");

        Self {
            create,
            update,
            delete,
            same: declared_resources.saturating_sub(create + update),
            changes,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// What a fresh stack would get: every declared resource is an `Add`.
pub fn planned_creates(definitions: &[RoleDefinition]) -> PreviewSummary {
    let mut changes = Vec::new();
    for definition in definitions {
        changes.push(PlannedChange {
            action: String::from("Add"),
            logical_id: definition.role.logical_id.clone(),
            resource_type: String::from(ROLE_RESOURCE_TYPE),
            replacement: false,
        });
        for policy in &definition.inline_policies {
            changes.push(PlannedChange {
                action: String::from("Add"),
                logical_id: policy.logical_id.clone(),
                resource_type: String::from(ROLE_POLICY_RESOURCE_TYPE),
                replacement: false,
            });
        }
    }

    let declared = changes.len();
    PreviewSummary::from_changes(changes, declared)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOperation {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplySummary {
    pub operation: ApplyOperation,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackSummary {
    pub stack_name: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub last_update: Option<String>,
    pub output_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployedStack {
    pub account_id: String,
    pub stack_name: String,
    pub status: String,
    pub has_resources: bool,
    pub output_count: usize,
    pub last_update: Option<String>,
}

/// Lifecycle of one account's deployment unit.
pub trait StackBackend {
    fn stack_name(&self) -> &str;

    /// Refreshes, then reports what `apply` would change. Never changes
    /// deployed resources.
    fn preview<'a>(&'a self, roles: &'a [RoleConfig]) -> BoxFuture<'a, Result<PreviewSummary, Error>>;

    /// Refreshes, then converges the stack onto `roles`.
    fn apply<'a>(&'a self, roles: &'a [RoleConfig]) -> BoxFuture<'a, Result<ApplySummary, Error>>;

    /// `Ok(false)` when there was no stack to destroy.
    fn destroy(&self) -> BoxFuture<'_, Result<bool, Error>>;

    /// Empty when the stack does not exist.
    fn outputs(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, Error>>;

    /// `None` when the stack does not exist.
    fn info(&self) -> BoxFuture<'_, Result<Option<StackSummary>, Error>>;
}

#[derive(Debug, Clone, Default)]
pub struct AwsOptions {
    pub region: Option<String>,
    pub profile: Option<String>,
}

pub async fn client(aws: &AwsOptions) -> aws_sdk_cloudformation::Client {
    let region = RegionProviderChain::first_try(aws.region.clone().map(Region::new))
        .or_default_provider();

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    let sdk_config = loader.load().await;

    aws_sdk_cloudformation::Client::new(&sdk_config)
}

pub struct CloudFormationStack {
    pub stack_name: String,

    client: aws_sdk_cloudformation::Client,
    poll_interval: Duration,
    timeout: Duration,
}

impl CloudFormationStack {
    pub fn new(
        client: aws_sdk_cloudformation::Client,
        stack_name: String,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        return Self {
            stack_name,
            client,
            poll_interval,
            timeout,
        };
    }

    async fn describe(&self, stack: &str) -> Result<Option<StackDescription>, Error> {
        let result = self.client.describe_stacks().stack_name(stack).send().await;

        let result = match result {
            Ok(data) => data,
            Err(err) if is_missing_stack(&err) => return Ok(None),
            Err(err) => return Err(sdk_error(err)),
        };

        let described = result.stacks().first().cloned();
        Ok(described.filter(|stack| {
            stack.stack_status().map(|status| status.as_str()) != Some("DELETE_COMPLETE")
        }))
    }

    async fn plan(&self, roles: &[RoleConfig]) -> Result<PreviewSummary, Error> {
        let definitions = template::definitions(roles);
        let template_body = template_body(&definitions)?;

        let Some(existing) = self.describe(&self.stack_name).await? else {
            info!(
                "Stack {} does not exist yet, every resource will be created",
                self.stack_name
            );
            return Ok(planned_creates(&definitions));
        };
        ensure_updatable(&self.stack_name, current_status(&existing)?)?;

        self.refresh().await?;

        info!("Generating preview...");
        let change_set_name = format!("{}-preview-{}", self.stack_name, unix_seconds());
        let created = self
            .client
            .create_change_set()
            .stack_name(&self.stack_name)
            .change_set_name(&change_set_name)
            .change_set_type(ChangeSetType::Update)
            .template_body(template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(sdk_error)?;
        let change_set = created.id().unwrap_or(&change_set_name).to_string();

        let changes = self.wait_for_change_set(&change_set).await;

        // The change set is only a vehicle for the diff.
        if let Err(err) = self
            .client
            .delete_change_set()
            .change_set_name(&change_set)
            .send()
            .await
        {
            warn!(
                "Unable to delete preview change set {}: {}",
                change_set,
                DisplayErrorContext(&err)
            );
        }

        let declared = definitions.iter().map(RoleDefinition::resource_count).sum();
        Ok(PreviewSummary::from_changes(changes?, declared))
    }

    async fn wait_for_change_set(&self, change_set: &str) -> Result<Vec<PlannedChange>, Error> {
        let started = Instant::now();
        loop {
            let described = self
                .client
                .describe_change_set()
                .change_set_name(change_set)
                .send()
                .await
                .map_err(sdk_error)?;

            let status = described.status().map(|status| status.as_str()).unwrap_or("");
            match status {
                "CREATE_COMPLETE" => return self.change_set_changes(change_set).await,
                "FAILED" => {
                    let reason = described.status_reason().unwrap_or("no reason given");
                    if NO_CHANGES_MARKERS.iter().any(|marker| reason.contains(marker)) {
                        return Ok(Vec::new());
                    }
                    return Err(Error::OperationFailed(format!(
                        "change set {} failed: {}",
                        change_set, reason
                    )));
                }
                _ => debug!("Change set {} is {}", change_set, status),
            }

            if started.elapsed() > self.timeout {
                return Err(Error::Timeout(self.timeout, format!("change set {}", change_set)));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn change_set_changes(&self, change_set: &str) -> Result<Vec<PlannedChange>, Error> {
        let mut changes = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_change_set()
                .change_set_name(change_set)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(sdk_error)?;

            for change in page.changes() {
                let Some(resource) = change.resource_change() else {
                    continue;
                };
                changes.push(PlannedChange {
                    action: resource
                        .action()
                        .map(|action| action.as_str().to_string())
                        .unwrap_or_default(),
                    logical_id: resource.logical_resource_id().unwrap_or_default().to_string(),
                    resource_type: resource.resource_type().unwrap_or_default().to_string(),
                    replacement: resource
                        .replacement()
                        .map(|replacement| replacement.as_str() == "True")
                        .unwrap_or(false),
                });
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(changes)
    }

    async fn deploy(&self, roles: &[RoleConfig]) -> Result<ApplySummary, Error> {
        let definitions = template::definitions(roles);
        let template_body = template_body(&definitions)?;
        let mut seen_events = HashSet::new();

        let existing = self.describe(&self.stack_name).await?;
        let (stack_id, operation) = match existing {
            None => {
                info!("Creating stack {}", self.stack_name);
                let created = self
                    .client
                    .create_stack()
                    .stack_name(&self.stack_name)
                    .template_body(template_body)
                    .capabilities(Capability::CapabilityNamedIam)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                let stack_id = created.stack_id().unwrap_or(&self.stack_name).to_string();
                (stack_id, ApplyOperation::Created)
            }
            Some(existing) => {
                let current = current_status(&existing)?.to_string();
                ensure_updatable(&self.stack_name, &current)?;
                self.refresh().await?;

                let stack_id = existing.stack_id().unwrap_or(&self.stack_name).to_string();
                self.stream_events(&stack_id, &mut seen_events, false).await?;

                info!("Applying changes...");
                let updated = self
                    .client
                    .update_stack()
                    .stack_name(&stack_id)
                    .template_body(template_body)
                    .capabilities(Capability::CapabilityNamedIam)
                    .send()
                    .await;
                if let Err(err) = updated {
                    let message = err.message().unwrap_or_default();
                    if NO_CHANGES_MARKERS.iter().any(|marker| message.contains(marker)) {
                        info!("Stack {} is already up to date", self.stack_name);
                        return Ok(ApplySummary {
                            operation: ApplyOperation::Unchanged,
                            status: current,
                        });
                    }
                    return Err(sdk_error(err));
                }
                (stack_id, ApplyOperation::Updated)
            }
        };

        let expected = match operation {
            ApplyOperation::Created => "CREATE_COMPLETE",
            _ => "UPDATE_COMPLETE",
        };
        let status = self.wait_for_stack(&stack_id, &mut seen_events).await?;
        if status.0 != expected {
            return Err(Error::OperationFailed(format!(
                "{} ended in {}: {}",
                self.stack_name,
                status.0,
                status.1.unwrap_or_default()
            )));
        }

        info!("Deployment completed successfully!");
        Ok(ApplySummary {
            operation,
            status: status.0,
        })
    }

    async fn delete(&self) -> Result<bool, Error> {
        let Some(existing) = self.describe(&self.stack_name).await? else {
            debug!("Stack {} does not exist, nothing to destroy", self.stack_name);
            return Ok(false);
        };

        let stack_id = existing.stack_id().unwrap_or(&self.stack_name).to_string();
        let mut seen_events = HashSet::new();
        self.stream_events(&stack_id, &mut seen_events, false).await?;

        warn!("Starting resource destruction...");
        self.client
            .delete_stack()
            .stack_name(&stack_id)
            .send()
            .await
            .map_err(sdk_error)?;

        let (status, reason) = self.wait_for_stack(&stack_id, &mut seen_events).await?;
        if status != "DELETE_COMPLETE" {
            return Err(Error::OperationFailed(format!(
                "{} ended in {}: {}",
                self.stack_name,
                status,
                reason.unwrap_or_default()
            )));
        }

        info!("Resources destroyed successfully!");
        Ok(true)
    }

    async fn get_outputs(&self) -> Result<BTreeMap<String, String>, Error> {
        let Some(stack) = self.describe(&self.stack_name).await? else {
            return Ok(BTreeMap::new());
        };

        return Ok(collect_outputs(&stack));
    }

    async fn summary(&self) -> Result<Option<StackSummary>, Error> {
        let Some(stack) = self.describe(&self.stack_name).await? else {
            return Ok(None);
        };

        Ok(Some(StackSummary {
            stack_name: stack.stack_name().unwrap_or(&self.stack_name).to_string(),
            status: current_status(&stack)?.to_string(),
            status_reason: stack.stack_status_reason().map(str::to_string),
            last_update: last_update(&stack),
            output_count: stack.outputs().len(),
        }))
    }

    /// Reconciles knowledge of the live resources with the stack's record by
    /// running drift detection. Drift is reported, the next apply overwrites it.
    async fn refresh(&self) -> Result<(), Error> {
        info!("Refreshing stack state...");
        let detection = match self
            .client
            .detect_stack_drift()
            .stack_name(&self.stack_name)
            .send()
            .await
        {
            Ok(data) => data,
            Err(err) if is_missing_stack(&err) => {
                return Err(Error::NotFoundError(self.stack_name.clone()))
            }
            Err(err) => return Err(sdk_error(err)),
        };
        let Some(detection_id) = detection.stack_drift_detection_id().map(str::to_string) else {
            return Err(Error::UnknownError(format!(
                "drift detection for {} returned no id",
                self.stack_name
            )));
        };

        let started = Instant::now();
        loop {
            let status = self
                .client
                .describe_stack_drift_detection_status()
                .stack_drift_detection_id(&detection_id)
                .send()
                .await
                .map_err(sdk_error)?;

            match status.detection_status().map(|detection| detection.as_str()) {
                None => {
                    return Err(Error::UnknownError(format!(
                        "drift detection {} reported no status",
                        detection_id
                    )))
                }
                Some("DETECTION_IN_PROGRESS") => {}
                Some("DETECTION_FAILED") => {
                    warn!(
                        "Drift detection for {} failed: {}",
                        self.stack_name,
                        status.detection_status_reason().unwrap_or("no reason given")
                    );
                    return Ok(());
                }
                Some(_) => {
                    let drift = status
                        .stack_drift_status()
                        .map(|drift| drift.as_str())
                        .unwrap_or("UNKNOWN");
                    if drift == "DRIFTED" {
                        warn!(
                            "Stack {} has drifted: {} resource(s) differ from the deployed template",
                            self.stack_name,
                            status.drifted_stack_resource_count().unwrap_or_default()
                        );
                    } else {
                        debug!("Stack {} drift status: {}", self.stack_name, drift);
                    }
                    return Ok(());
                }
            }

            if started.elapsed() > self.timeout {
                return Err(Error::Timeout(self.timeout, String::from("drift detection")));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Polls until the stack leaves its `*_IN_PROGRESS` state and returns the
    /// final status with its reason.
    async fn wait_for_stack(
        &self,
        stack_id: &str,
        seen_events: &mut HashSet<String>,
    ) -> Result<(String, Option<String>), Error> {
        let started = Instant::now();
        loop {
            self.stream_events(stack_id, seen_events, true).await?;

            // Deleted stacks stay visible by id, so `None` only shows up if
            // the stack vanished some other way.
            let result = self
                .client
                .describe_stacks()
                .stack_name(stack_id)
                .send()
                .await;
            let stack = match result {
                Ok(data) => data.stacks().first().cloned(),
                Err(err) if is_missing_stack(&err) => None,
                Err(err) => return Err(sdk_error(err)),
            };
            let Some(stack) = stack else {
                return Ok((String::from("DELETE_COMPLETE"), None));
            };

            let status = current_status(&stack)?.to_string();
            if !status.ends_with("_IN_PROGRESS") {
                return Ok((status, stack.stack_status_reason().map(str::to_string)));
            }

            if started.elapsed() > self.timeout {
                return Err(Error::Timeout(self.timeout, format!("stack {}", self.stack_name)));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Logs stack events not seen before, oldest first. With `emit` unset the
    /// events are only recorded, which hides history from earlier operations.
    async fn stream_events(
        &self,
        stack_id: &str,
        seen_events: &mut HashSet<String>,
        emit: bool,
    ) -> Result<(), Error> {
        let result = self
            .client
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await;
        let output = match result {
            Ok(data) => data,
            Err(err) if is_missing_stack(&err) => return Ok(()),
            Err(err) => return Err(sdk_error(err)),
        };

        for event in output.stack_events().iter().rev() {
            let Some(event_id) = event.event_id() else {
                continue;
            };
            if !seen_events.insert(event_id.to_string()) || !emit {
                continue;
            }

            let line = format!(
                "{} {} {} {}",
                event.logical_resource_id().unwrap_or("-"),
                event.resource_type().unwrap_or("-"),
                event
                    .resource_status()
                    .map(|status| status.as_str())
                    .unwrap_or("-"),
                event.resource_status_reason().unwrap_or("")
            );
            if let Some(level) = classify_event(&line) {
                log!(level, "CloudFormation: {}", line.trim_end());
            }
        }

        Ok(())
    }
}

impl StackBackend for CloudFormationStack {
    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn preview<'a>(&'a self, roles: &'a [RoleConfig]) -> BoxFuture<'a, Result<PreviewSummary, Error>> {
        self.plan(roles).boxed()
    }

    fn apply<'a>(&'a self, roles: &'a [RoleConfig]) -> BoxFuture<'a, Result<ApplySummary, Error>> {
        self.deploy(roles).boxed()
    }

    fn destroy(&self) -> BoxFuture<'_, Result<bool, Error>> {
        self.delete().boxed()
    }

    fn outputs(&self) -> BoxFuture<'_, Result<BTreeMap<String, String>, Error>> {
        self.get_outputs().boxed()
    }

    fn info(&self) -> BoxFuture<'_, Result<Option<StackSummary>, Error>> {
        self.summary().boxed()
    }
}

/// Every live stack named `{base_stack_name}-{account id}`, sorted by account.
pub async fn list_deployed(
    client: &aws_sdk_cloudformation::Client,
    base_stack_name: &str,
) -> Result<Vec<DeployedStack>, Error> {
    let pattern = stack_pattern(base_stack_name)?;
    let mut deployed = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = client
            .describe_stacks()
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(sdk_error)?;

        for stack in page.stacks() {
            let Some(name) = stack.stack_name() else {
                continue;
            };
            let Some(account_id) = account_from_stack_name(&pattern, name) else {
                continue;
            };
            let outputs = collect_outputs(stack);
            deployed.push(DeployedStack {
                account_id,
                stack_name: name.to_string(),
                status: current_status(stack)?.to_string(),
                has_resources: !outputs.is_empty(),
                output_count: outputs.len(),
                last_update: last_update(stack),
            });
        }

        match page.next_token() {
            Some(token) => next_token = Some(token.to_string()),
            None => break,
        }
    }

    deployed.sort_by(|left, right| left.account_id.cmp(&right.account_id));
    Ok(deployed)
}

/// Stacks that cannot take an update until someone intervenes.
pub fn ensure_updatable(stack_name: &str, status: &str) -> Result<(), Error> {
    match status {
        "ROLLBACK_COMPLETE" | "REVIEW_IN_PROGRESS" => Err(Error::OperationFailed(format!(
            "stack {} is in {} and must be destroyed before it can be deployed again",
            stack_name, status
        ))),
        failed if failed.ends_with("_FAILED") => {
            Err(Error::OperationFailed(format!(
                "stack {} is in {} and must be destroyed before it can be deployed again",
                stack_name, status
            )))
        }
        busy if busy.ends_with("_IN_PROGRESS") => Err(Error::OperationFailed(format!(
            "stack {} is busy ({})",
            stack_name, busy
        ))),
        _ => Ok(()),
    }
}

/// A described stack always carries a status; one without cannot be judged.
fn current_status(stack: &StackDescription) -> Result<&str, Error> {
    stack
        .stack_status()
        .map(|status| status.as_str())
        .ok_or_else(|| {
            Error::UnknownError(format!(
                "stack {} was described without a status",
                stack.stack_name().unwrap_or("-")
            ))
        })
}

fn template_body(definitions: &[RoleDefinition]) -> Result<String, Error> {
    serde_json::to_string(&template::render(definitions))
        .map_err(|error| Error::Template(error.to_string()))
}

fn collect_outputs(stack: &StackDescription) -> BTreeMap<String, String> {
    stack
        .outputs()
        .iter()
        .filter_map(|output| {
            let key = output.output_key()?;
            let value = output.output_value()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn last_update(stack: &StackDescription) -> Option<String> {
    stack
        .last_updated_time()
        .or(stack.creation_time())
        .and_then(|time: &DateTime| time.fmt(DateTimeFormat::DateTime).ok())
}

fn is_missing_stack<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.code() == Some("ValidationError")
        && err
            .message()
            .map(|message| message.contains("does not exist"))
            .unwrap_or(false)
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError { .. } => Error::ServiceError(message),
        _ => Error::UnknownError(message),
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
