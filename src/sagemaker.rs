//! AWS naming and data upload for SageMaker training jobs.
//!
//! Account and region come from the `aws` CLI, so the host's normal AWS
//! profile configuration applies.

use crate::image::Image;
use crate::shell::{CommandRunner, CommandSpec, run_checked};
use anyhow::{Result, bail};
use std::path::Path;
use tracing::info;

pub const DEFAULT_INPUT_DIR: &str = "data";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SageMakerTarget {
    pub account: String,
    pub region: String,
}

impl SageMakerTarget {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Ask the AWS CLI for the caller's account and, unless `region` is
    /// given, the configured default region.
    pub fn resolve(runner: &dyn CommandRunner, region: Option<&str>) -> Result<Self> {
        let identity = CommandSpec::new("aws").args([
            "sts",
            "get-caller-identity",
            "--query",
            "Account",
            "--output",
            "text",
        ]);
        let account = single_value(
            run_checked(runner, &identity, false, "could not resolve the AWS account")?.stdout,
            "AWS account",
        )?;

        let region = match region {
            Some(region) => region.to_string(),
            None => {
                let spec = CommandSpec::new("aws").args(["configure", "get", "region"]);
                single_value(
                    run_checked(runner, &spec, false, "could not resolve the AWS region")?.stdout,
                    "AWS region",
                )?
            }
        };
        Ok(Self { account, region })
    }

    pub fn registry(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account, self.region)
    }

    /// Fully qualified ECR name of `image`.
    pub fn ecr_image_name(&self, image: &Image) -> String {
        format!("{}/{}", self.registry(), image.tagged_name())
    }

    /// Bucket the SageMaker SDK creates per account and region.
    pub fn default_bucket(&self) -> String {
        format!("sagemaker-{}-{}", self.region, self.account)
    }

    pub fn s3_prefix(image: &Image) -> String {
        format!("{}.docker-image", image.name())
    }

    pub fn data_uri(&self, image: &Image) -> String {
        format!("s3://{}/{}", self.default_bucket(), Self::s3_prefix(image))
    }

    /// Recursively upload `input_dir` under the image's prefix and return the
    /// S3 URI of the uploaded data.
    pub fn upload_data(
        &self,
        runner: &dyn CommandRunner,
        image: &Image,
        input_dir: &Path,
        verbose: bool,
    ) -> Result<String> {
        let uri = self.data_uri(image);
        let spec = CommandSpec::new("aws")
            .args(["s3", "cp", "--recursive"])
            .arg(input_dir)
            .arg(&uri);
        run_checked(runner, &spec, verbose, "uploading training data failed")?;
        info!(from = %input_dir.display(), to = %uri, "uploaded training data");
        Ok(uri)
    }
}

fn single_value(stdout: String, what: &str) -> Result<String> {
    let value = stdout.trim();
    if value.is_empty() || value == "None" {
        bail!("the aws CLI returned no {what}");
    }
    Ok(value.to_string())
}
