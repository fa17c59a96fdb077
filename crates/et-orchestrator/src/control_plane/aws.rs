//! ECS and SSM through the AWS SDK

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ecs::config::{Credentials, Region};
use aws_sdk_ecs::error::DisplayErrorContext;

use et_core::config::TunnelConfig;
use et_core::traits::{
    ContainerInfo, ControlPlane, ExecuteCommandRequest, TaskDescription, TaskFailureInfo, TaskInfo,
};
use et_core::{ControlPlaneError, ExecSession};

/// Provider name attached to credentials given on the command line or in
/// the config file
const CREDENTIALS_PROVIDER: &str = "ecs-tunnel";

/// Control plane backed by the ECS and SSM APIs
#[derive(Debug, Clone)]
pub struct AwsControlPlane {
    ecs: aws_sdk_ecs::Client,
    ssm: aws_sdk_ssm::Client,
}

impl AwsControlPlane {
    /// Build clients from the default provider chain, overridden by the
    /// region, profile and credentials of `config`
    pub async fn from_config(config: &TunnelConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some((key_id, secret)) = config.credentials.key_pair() {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                config.credentials.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;
        tracing::debug!("AWS region: {:?}", sdk_config.region());
        Self::from_sdk_config(&sdk_config)
    }

    /// Build clients from an already loaded SDK configuration
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            ecs: aws_sdk_ecs::Client::new(sdk_config),
            ssm: aws_sdk_ssm::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    async fn describe_tasks(
        &self,
        cluster: &str,
        task: &str,
    ) -> Result<TaskDescription, ControlPlaneError> {
        let output = self
            .ecs
            .describe_tasks()
            .cluster(cluster)
            .tasks(task)
            .send()
            .await
            .map_err(|e| ControlPlaneError::new("DescribeTasks", DisplayErrorContext(&e).to_string()))?;

        let failures = output
            .failures()
            .iter()
            .map(|f| TaskFailureInfo {
                arn: f.arn().map(str::to_string),
                reason: f.reason().map(str::to_string),
            })
            .collect();

        let tasks = output
            .tasks()
            .iter()
            .map(|t| TaskInfo {
                containers: t
                    .containers()
                    .iter()
                    .map(|c| ContainerInfo {
                        name: c.name().map(str::to_string),
                        runtime_id: c.runtime_id().map(str::to_string),
                    })
                    .collect(),
            })
            .collect();

        Ok(TaskDescription { failures, tasks })
    }

    async fn execute_command(
        &self,
        request: ExecuteCommandRequest,
    ) -> Result<ExecSession, ControlPlaneError> {
        let output = self
            .ecs
            .execute_command()
            .cluster(request.cluster)
            .task(request.task)
            .command(request.command)
            .interactive(request.interactive)
            .set_container(request.container)
            .send()
            .await
            .map_err(|e| ControlPlaneError::new("ExecuteCommand", DisplayErrorContext(&e).to_string()))?;

        Ok(ExecSession {
            session_id: output
                .session()
                .and_then(|s| s.session_id())
                .map(str::to_string),
        })
    }

    async fn terminate_session(&self, session_id: &str) -> Result<(), ControlPlaneError> {
        self.ssm
            .terminate_session()
            .session_id(session_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ControlPlaneError::new("TerminateSession", DisplayErrorContext(&e).to_string()))
    }
}
