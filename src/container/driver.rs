use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::Config;
use bollard::container::CreateContainerOptions;
use bollard::container::DownloadFromContainerOptions;
use bollard::container::KillContainerOptions;
use bollard::container::LogsOptions;
use bollard::container::RemoveContainerOptions;
use bollard::container::WaitContainerOptions;
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::IndexerError;
use crate::error::Result;
use crate::util::docker::ImageName;

/// One parser container invocation (§4.5 "Contract per invocation").
#[derive(Debug, Clone)]
pub struct ParserInvocation {
    pub codebase_name: String,
    pub image: ImageName,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub runtime_options: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ParserInvocationOutcome {
    pub raw_json: serde_json::Value,
    pub container_name: String,
}

/// The collaborator `CODE_PARSING` depends on (`Arc<dyn ParserRunner>`), so
/// the task's per-language fan-out and skip-on-failure policy (§4.4) can be
/// exercised without a Docker daemon. Mirrors the `GraphSink`/`GraphWriter`
/// trait boundary in `graph::mod` — a plain `async_trait` with the real
/// implementation and a recording/scripted fake, not a mock framework
/// (§10.6 "fakes over mocks").
#[async_trait]
pub trait ParserRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &ParserInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ParserInvocationOutcome>;
}

/// Runs a parser image as a one-shot container against a read-only source
/// mount, per §4.5. Every container is named, never auto-removed by the
/// daemon, and explicitly removed by this driver whether the invocation
/// succeeded or not.
/// Cheap to clone: `bollard::Docker` is an `Arc`-backed client handle, so
/// the orchestrator hands every job's `CODE_PARSING` task its own value
/// without reconnecting to the daemon per job.
#[derive(Clone)]
pub struct ContainerParserDriver {
    docker: Docker,
    image_pull_timeout: Duration,
}

impl ContainerParserDriver {
    /// `docker_host` overrides the daemon address; bollard otherwise
    /// honors `DOCKER_HOST` the same way the `docker` CLI does.
    pub fn connect(docker_host: Option<&str>, image_pull_timeout: Duration) -> Result<Self> {
        let docker = match docker_host {
            Some(host) => Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
                .map_err(IndexerError::from)?,
            None => Docker::connect_with_local_defaults().map_err(IndexerError::from)?,
        };
        Ok(ContainerParserDriver {
            docker,
            image_pull_timeout,
        })
    }

    pub async fn run(
        &self,
        invocation: &ParserInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ParserInvocationOutcome> {
        self.ensure_preconditions(invocation)?;
        self.ensure_image(&invocation.image).await?;

        let container_name = format!(
            "codegraph-parser-{}-{}",
            invocation.codebase_name,
            Uuid::new_v4()
        );

        let create_result = self.create_and_start(invocation, &container_name).await;
        let container_id = match create_result {
            Ok(id) => id,
            Err(e) => return Err(e),
        };

        let outcome = self
            .await_completion(invocation, &container_name, cancellation)
            .await;

        // Always remove the container, success or failure (§4.5 "Post").
        if let Err(e) = self.remove_container(&container_name).await {
            tracing::warn!(container = %container_name, error = %e, "failed to remove parser container");
        }
        let _ = container_id;

        outcome.map(|raw_json| ParserInvocationOutcome {
            raw_json,
            container_name,
        })
    }

    fn ensure_preconditions(&self, invocation: &ParserInvocation) -> Result<()> {
        if !invocation.source_path.is_dir() {
            return Err(IndexerError::Container(format!(
                "source directory {} does not exist",
                invocation.source_path.display()
            )));
        }

        if let Some(parent) = invocation.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(IndexerError::Io)?;
            if let Err(e) = set_world_writable(parent) {
                tracing::warn!(dir = %parent.display(), error = %e, "chmod 777 on parser output directory failed");
            }
        }
        Ok(())
    }

    async fn ensure_image(&self, image: &ImageName) -> Result<()> {
        if self.docker.inspect_image(image.as_str()).await.is_ok() {
            return Ok(());
        }

        let pull = async {
            let mut stream = self.docker.create_image(
                Some(CreateImageOptions {
                    from_image: image.as_str(),
                    ..Default::default()
                }),
                None,
                None,
            );
            while let Some(progress) = stream.next().await {
                progress.map_err(IndexerError::from)?;
            }
            Ok::<(), IndexerError>(())
        };

        tokio::time::timeout(self.image_pull_timeout, pull)
            .await
            .map_err(|_| IndexerError::Timeout(format!("pulling image {image} timed out")))??;
        Ok(())
    }

    async fn create_and_start(
        &self,
        invocation: &ParserInvocation,
        container_name: &str,
    ) -> Result<String> {
        let bind = format!(
            "{}:/workspace:ro",
            invocation.source_path.display()
        );

        let config = Config {
            image: Some(invocation.image.as_str().to_string()),
            env: Some(vec![format!(
                "JAVA_OPTS={}",
                invocation.runtime_options.join(" ")
            )]),
            cmd: Some(vec![
                invocation.codebase_name.clone(),
                "/workspace".to_string(),
                "/tmp/parser-output.json".to_string(),
            ]),
            host_config: Some(HostConfig {
                binds: Some(vec![bind]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name,
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(IndexerError::from)?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(IndexerError::from)?;

        Ok(created.id)
    }

    async fn await_completion(
        &self,
        invocation: &ParserInvocation,
        container_name: &str,
        cancellation: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let wait = self
            .docker
            .wait_container(
                container_name,
                Some(WaitContainerOptions {
                    condition: "not-running",
                }),
            )
            .into_future();
        let timed_wait = tokio::time::timeout(invocation.timeout, wait);
        tokio::pin!(timed_wait);

        // Race the container's exit against the job's cancellation signal,
        // not just its own timeout (§4.7/§5 "observable suspension points").
        let exit_code = tokio::select! {
            result = &mut timed_wait => match result {
                Ok((Some(result), _)) => result.map_err(IndexerError::from)?.status_code,
                Ok((None, _)) => 0,
                Err(_) => {
                    tracing::warn!(container = %container_name, "parser container exceeded its timeout, sending SIGKILL");
                    let _ = self
                        .docker
                        .kill_container(
                            container_name,
                            Some(KillContainerOptions { signal: "SIGKILL" }),
                        )
                        .await;
                    return Err(IndexerError::Timeout(format!(
                        "parser container {container_name} exceeded its timeout"
                    )));
                }
            },
            _ = cancellation.cancelled() => {
                tracing::warn!(container = %container_name, "job cancelled, sending SIGKILL to parser container");
                let _ = self
                    .docker
                    .kill_container(
                        container_name,
                        Some(KillContainerOptions { signal: "SIGKILL" }),
                    )
                    .await;
                return Err(IndexerError::State(format!(
                    "job cancelled while waiting on parser container {container_name}"
                )));
            }
        };

        if exit_code != 0 {
            let diagnostic = self.tail_logs(container_name).await;
            return Err(IndexerError::Container(format!(
                "parser container {container_name} exited with status {exit_code}: {diagnostic}"
            )));
        }

        self.copy_result(container_name, &invocation.output_path).await
    }

    async fn tail_logs(&self, container_name: &str) -> String {
        let mut stream = self.docker.logs::<String>(
            container_name,
            Some(LogsOptions {
                stdout: true,
                stderr: true,
                tail: "50".to_string(),
                ..Default::default()
            }),
        );
        let mut lines = Vec::new();
        while let Some(Ok(chunk)) = stream.next().await {
            lines.push(chunk.to_string());
        }
        lines.join("")
    }

    /// Copies `/tmp/parser-output.json` out of the container to `output_path`
    /// on the host, parses it, then deletes the host copy (§4.5 "Post": "copy
    /// ... to outputPath ... the temporary output file on the host is deleted
    /// after read").
    async fn copy_result(&self, container_name: &str, output_path: &Path) -> Result<serde_json::Value> {
        let stream = self.docker.download_from_container(
            container_name,
            Some(DownloadFromContainerOptions {
                path: "/tmp/parser-output.json",
            }),
        );

        let bytes = stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .map_err(|e| IndexerError::Container(format!("copying parser output failed: {e}")))?;

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entries = archive
            .entries()
            .map_err(|e| IndexerError::Container(format!("reading output archive failed: {e}")))?;

        let entry = entries
            .next()
            .ok_or_else(|| IndexerError::Container("parser output archive was empty".into()))?
            .map_err(|e| IndexerError::Container(format!("reading output archive failed: {e}")))?;

        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .map_err(IndexerError::Io)?;

        std::fs::write(output_path, &contents).map_err(IndexerError::Io)?;

        let parsed = serde_json::from_str(&contents)
            .map_err(|e| IndexerError::Parse(format!("parser output was not valid JSON: {e}")));

        if let Err(e) = std::fs::remove_file(output_path) {
            tracing::warn!(path = %output_path.display(), error = %e, "failed to remove parser output file after read");
        }

        parsed
    }

    async fn remove_container(&self, container_name: &str) -> Result<()> {
        self.docker
            .remove_container(
                container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(IndexerError::from)
    }
}

#[async_trait]
impl ParserRunner for ContainerParserDriver {
    async fn run(
        &self,
        invocation: &ParserInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ParserInvocationOutcome> {
        ContainerParserDriver::run(self, invocation, cancellation).await
    }
}

#[cfg(unix)]
fn set_world_writable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o777);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_world_writable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// A scripted in-memory [`ParserRunner`], keyed by the image name an
/// invocation was built with — the same thing a real per-language
/// `ContainerConfig` entry maps a language onto — so a test can configure one
/// language's container to succeed and another's to fail, exercising
/// `CODE_PARSING`'s per-language skip policy (§4.4) without a Docker daemon.
#[derive(Default)]
pub struct FakeParserRunner {
    responses: Mutex<HashMap<String, std::result::Result<serde_json::Value, String>>>,
}

impl FakeParserRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&self, image: &str, raw_json: serde_json::Value) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(image.to_string(), Ok(raw_json));
    }

    pub fn fail(&self, image: &str, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(image.to_string(), Err(message.into()));
    }
}

#[async_trait]
impl ParserRunner for FakeParserRunner {
    async fn run(
        &self,
        invocation: &ParserInvocation,
        _cancellation: &CancellationToken,
    ) -> Result<ParserInvocationOutcome> {
        let key = invocation.image.as_str().to_string();
        let responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        match responses.get(&key) {
            Some(Ok(raw_json)) => Ok(ParserInvocationOutcome {
                raw_json: raw_json.clone(),
                container_name: format!("fake-{key}"),
            }),
            Some(Err(message)) => Err(IndexerError::Container(message.clone())),
            None => Err(IndexerError::Container(format!(
                "no fake response configured for image {key}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_runner_reports_per_image_success_and_failure() {
        let fake = FakeParserRunner::new();
        fake.succeed("java-parser:latest", serde_json::json!({"files": []}));
        fake.fail("ts-parser:latest", "parser crashed");

        let ok_invocation = ParserInvocation {
            codebase_name: "demo".into(),
            image: ImageName::from("java-parser:latest".to_string()),
            source_path: PathBuf::from("/tmp"),
            output_path: PathBuf::from("/tmp/out.json"),
            runtime_options: vec![],
            timeout: Duration::from_secs(1),
        };
        let outcome = fake.run(&ok_invocation, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.raw_json, serde_json::json!({"files": []}));

        let failing_invocation = ParserInvocation {
            image: ImageName::from("ts-parser:latest".to_string()),
            ..ok_invocation
        };
        let err = fake.run(&failing_invocation, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("parser crashed"));
    }
}
