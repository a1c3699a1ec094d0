use aws_config::{BehaviorVersion, Region};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::Error,
    function::{self, lambda::LambdaConfigClient},
    invoke::lambda::LambdaInvoker,
    queue::sqs::SqsQueue,
    redrive::{Redriver, RunStatistics},
};

/// AWS-backed entry points for the redrive loop and the configuration tool.
pub struct Service {
    redriver: Redriver<SqsQueue, LambdaInvoker>,
    functions: LambdaConfigClient,
    config: Config,
}

#[bon::bon]
impl Service {
    #[builder]
    pub async fn connect_with(
        config: Config,
        sdk_config: Option<aws_config::SdkConfig>,
    ) -> eyre::Result<Self> {
        let sdk_config = match sdk_config {
            Some(sdk_config) => sdk_config,
            None => {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &config.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                if let Some(endpoint_url) = &config.endpoint_url {
                    loader = loader.endpoint_url(endpoint_url);
                }
                loader.load().await
            }
        };

        let sqs = aws_sdk_sqs::Client::new(&sdk_config);
        let lambda = aws_sdk_lambda::Client::new(&sdk_config);

        Ok(Self {
            redriver: Redriver::new(SqsQueue::new(sqs), LambdaInvoker::new(lambda.clone())),
            functions: LambdaConfigClient::new(lambda),
            config,
        })
    }

    /// Redrives `queue` into `function`, stopping early if `cancel` fires.
    pub async fn redrive(
        &self,
        queue: &str,
        function: &str,
        run_start_time: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics, Error> {
        let config = self.config.redrive_config(run_start_time);

        self.redriver
            .run_until_cancelled(queue, function, &config, cancel)
            .await
    }

    /// Sets one environment variable on `function`, retrying on update conflicts.
    pub async fn set_environment_variable(
        &self,
        function: &str,
        name: &str,
        value: &str,
    ) -> Result<u32, Error> {
        function::set_environment_variable(
            &self.functions,
            &self.config.retry_policy(),
            function,
            name,
            value,
        )
        .await
    }
}
