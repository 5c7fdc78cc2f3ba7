//! `CODE_PARSING` (§4.4): group the files `GIT_SYNC` touched by language,
//! run each language's parser container, and normalize the results.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::config::ContainerConfig;
use crate::config::EffectiveTaskConfig;
use crate::container::ParserInvocation;
use crate::container::ParserRunner;
use crate::container::SupportedLanguage;
use crate::error::IndexerError;
use crate::error::Result;
use crate::normalize;
use crate::task::JobContext;
use crate::task::Task;
use crate::task::TaskName;
use crate::task::TaskOutput;

pub struct CodeParsingTask {
    driver: Arc<dyn ParserRunner>,
    container_config: ContainerConfig,
    max_parallel_languages: usize,
}

impl CodeParsingTask {
    pub fn new(
        driver: Arc<dyn ParserRunner>,
        container_config: ContainerConfig,
        max_parallel_languages: usize,
    ) -> Self {
        CodeParsingTask {
            driver,
            container_config,
            max_parallel_languages,
        }
    }

    fn touched_files(ctx: &JobContext) -> Option<Vec<String>> {
        match ctx.output_of(TaskName::GitSync)? {
            TaskOutput::GitSync {
                files_added,
                files_changed,
                ..
            } => {
                let mut touched = files_added;
                touched.extend(files_changed);
                Some(touched)
            }
            _ => None,
        }
    }

    fn languages_touched(files: &[String]) -> HashSet<SupportedLanguage> {
        files
            .iter()
            .filter_map(|path| path.rsplit('.').next())
            .filter_map(SupportedLanguage::from_extension)
            .collect()
    }
}

#[async_trait]
impl Task for CodeParsingTask {
    fn name(&self) -> TaskName {
        TaskName::CodeParsing
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[TaskName::GitSync]
    }

    async fn should_run(&self, ctx: &JobContext) -> Result<bool> {
        Ok(Self::touched_files(ctx).map(|f| !f.is_empty()).unwrap_or(false))
    }

    async fn validate(&self, ctx: &JobContext) -> Result<()> {
        if Self::touched_files(ctx).is_none() {
            return Err(IndexerError::Validation(
                "CODE_PARSING requires GIT_SYNC's output".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, config: EffectiveTaskConfig) -> Result<TaskOutput> {
        let touched = Self::touched_files(ctx).unwrap_or_default();
        let languages: Vec<SupportedLanguage> = Self::languages_touched(&touched)
            .into_iter()
            .filter(|lang| self.container_config.image_for(*lang).is_some())
            .collect();

        if languages.is_empty() {
            return Err(IndexerError::Validation(
                "none of the touched files' languages have a configured parser image".into(),
            ));
        }

        let bound = if self.max_parallel_languages == 0 {
            languages.len().max(1)
        } else {
            self.max_parallel_languages
        };

        let mut in_flight = FuturesUnordered::new();
        let mut remaining = languages.into_iter();
        let mut parsing_results = Vec::new();
        let mut languages_stats = HashMap::new();
        let mut files_processed = 0u64;
        let mut symbols_extracted = 0u64;

        for lang in remaining.by_ref().take(bound) {
            in_flight.push(self.run_language(ctx, lang, config.timeout));
        }

        while let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok((lang, graph)) => {
                    symbols_extracted += graph.nodes.len() as u64;
                    languages_stats.insert(lang.as_str().to_string(), graph.nodes.len() as u64);
                    parsing_results.push(graph);
                }
                Err((lang, e)) => {
                    tracing::warn!(language = %lang, error = %e, "language parse failed, skipping");
                }
            }

            if let Some(lang) = remaining.next() {
                in_flight.push(self.run_language(ctx, lang, config.timeout));
            }
        }

        if parsing_results.is_empty() {
            return Err(IndexerError::Container(
                "every configured language failed to parse".into(),
            ));
        }

        files_processed = touched.len() as u64;

        Ok(TaskOutput::CodeParsing {
            files_processed,
            symbols_extracted,
            parsing_results,
            languages_stats,
        })
    }
}

impl CodeParsingTask {
    async fn run_language(
        &self,
        ctx: &JobContext,
        lang: SupportedLanguage,
        timeout: Duration,
    ) -> std::result::Result<(SupportedLanguage, normalize::NormalizedGraph), (SupportedLanguage, IndexerError)> {
        let lang_cfg = self
            .container_config
            .image_for(lang)
            .expect("caller only schedules configured languages");

        let invocation = ParserInvocation {
            codebase_name: ctx.codebase_name.clone(),
            image: lang_cfg.image.clone(),
            source_path: ctx.codebase_storage_path.clone(),
            output_path: ctx.temp_dir.join(format!("parser-output-{lang}.json")),
            runtime_options: lang_cfg.runtime_options.clone(),
            timeout,
        };

        let run_and_normalize = async {
            let outcome = self.driver.run(&invocation, &ctx.cancellation).await?;
            normalize::normalize(&ctx.codebase_name, lang, &outcome.raw_json)
        };

        run_and_normalize.await.map_err(|e| (lang, e)).map(|graph| (lang, graph))
    }
}
