//! End-to-end exercise of `CODE_PARSING` against a scripted `FakeParserRunner`
//! (no Docker daemon needed): per-language fan-out, the skip-one-language
//! policy, and the all-languages-failed fatal case (§4.4).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use codegraph_indexer::config::ContainerConfig;
use codegraph_indexer::config::EffectiveTaskConfig;
use codegraph_indexer::config::TaskConfigResolver;
use codegraph_indexer::config::TaskDefaults;
use codegraph_indexer::config::TaskOverrides;
use codegraph_indexer::container::FakeParserRunner;
use codegraph_indexer::container::ParserRunner;
use codegraph_indexer::error::Result as IndexerResult;
use codegraph_indexer::task::run_task;
use codegraph_indexer::task::JobContext;
use codegraph_indexer::task::JobType;
use codegraph_indexer::task::Task;
use codegraph_indexer::task::TaskName;
use codegraph_indexer::task::TaskOutcome;
use codegraph_indexer::task::TaskOutput;
use codegraph_indexer::tasks::CodeParsingTask;
use codegraph_indexer::util::progress::ProgressSink;

/// Stands in for `GIT_SYNC`, the same way `tests/graph_update.rs` precomputes
/// its upstream output rather than driving a real git checkout.
struct FixedGitSync {
    output: TaskOutput,
}

#[async_trait]
impl Task for FixedGitSync {
    fn name(&self) -> TaskName {
        TaskName::GitSync
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[]
    }

    async fn should_run(&self, _ctx: &JobContext) -> IndexerResult<bool> {
        Ok(true)
    }

    async fn validate(&self, _ctx: &JobContext) -> IndexerResult<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &JobContext, _config: EffectiveTaskConfig) -> IndexerResult<TaskOutput> {
        Ok(self.output.clone())
    }
}

fn container_config() -> ContainerConfig {
    toml::from_str(
        "[[languages]]\n\
         language = \"java\"\n\
         image = \"java-parser:latest\"\n\
         \n\
         [[languages]]\n\
         language = \"typescript\"\n\
         image = \"ts-parser:latest\"\n",
    )
    .expect("parses a two-language container config")
}

fn ctx() -> JobContext {
    JobContext::new(
        Uuid::new_v4(),
        "demo",
        "demo",
        "https://example.invalid/demo.git".to_string(),
        "main",
        JobType::Full,
        None,
        PathBuf::from("/tmp/work"),
        PathBuf::from("/tmp/store"),
        PathBuf::from("/tmp/tmp"),
    )
}

fn java_parser_json() -> serde_json::Value {
    json!({
        "codebaseName": "demo",
        "files": [{ "path": "src/Widget.java", "packageName": "com.acme" }],
        "classes": [
            {
                "name": "Widget",
                "fullyQualifiedName": "com.acme.Widget",
                "filePath": "src/Widget.java",
                "packageName": "com.acme"
            }
        ]
    })
}

async fn populate_git_sync(context: &JobContext, files_added: Vec<String>) {
    let defaults = TaskDefaults::default();
    let resolver = TaskConfigResolver::new(&defaults);
    let overrides = TaskOverrides::new();
    let progress = ProgressSink::default();

    run_task(
        &FixedGitSync {
            output: TaskOutput::GitSync {
                clone_path: PathBuf::from("/tmp/store"),
                commit_hash: "deadbeef".to_string(),
                files_added,
                files_changed: Vec::new(),
                files_deleted: Vec::new(),
            },
        },
        context,
        &overrides,
        &resolver,
        &progress,
    )
    .await;
}

async fn run(task: &CodeParsingTask, context: &JobContext) -> TaskOutcome {
    let defaults = TaskDefaults::default();
    let resolver = TaskConfigResolver::new(&defaults);
    let overrides = TaskOverrides::new();
    let progress = ProgressSink::default();
    run_task(task, context, &overrides, &resolver, &progress).await.outcome
}

#[tokio::test]
async fn one_failing_language_is_skipped_while_the_other_succeeds() {
    let fake = Arc::new(FakeParserRunner::new());
    fake.succeed("java-parser:latest", java_parser_json());
    fake.fail("ts-parser:latest", "parser crashed");
    let driver: Arc<dyn ParserRunner> = fake;

    let task = CodeParsingTask::new(driver, container_config(), 0);
    let context = ctx();
    populate_git_sync(&context, vec!["src/Widget.java".to_string(), "src/app.ts".to_string()]).await;

    match run(&task, &context).await {
        TaskOutcome::Succeeded(TaskOutput::CodeParsing {
            parsing_results,
            languages_stats,
            ..
        }) => {
            assert_eq!(parsing_results.len(), 1);
            assert!(languages_stats.contains_key("java"));
            assert!(!languages_stats.contains_key("typescript"));
        }
        other => panic!("expected CODE_PARSING to succeed with one language, got {other:?}"),
    }
}

#[tokio::test]
async fn every_language_failing_fails_the_task() {
    let fake = Arc::new(FakeParserRunner::new());
    fake.fail("java-parser:latest", "parser crashed");
    fake.fail("ts-parser:latest", "parser crashed");
    let driver: Arc<dyn ParserRunner> = fake;

    let task = CodeParsingTask::new(driver, container_config(), 0);
    let context = ctx();
    populate_git_sync(&context, vec!["src/Widget.java".to_string(), "src/app.ts".to_string()]).await;

    match run(&task, &context).await {
        TaskOutcome::Failed(_) => {}
        other => panic!("expected CODE_PARSING to fail when every language fails, got {other:?}"),
    }
}
