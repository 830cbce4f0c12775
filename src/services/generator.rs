use crate::error::{GenerationError, PipelineError};
use crate::models::{
    Chapter, ChapterFailure, GenerationRequest, GenerationSession, Progress, StoryRequest,
};
use crate::services::llm::{CompletionClient, CompletionRequest};
use crate::services::outline::{ChapterTitles, MarkerRule, OutlineSections};
use crate::services::prompts::{self, ChapterPrompt, Language};
use crate::utils::{PREVIEW_CHARS, preview};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub language: Language,
    pub marker: MarkerRule,
    pub outline_max_tokens: u32,
    pub chapter_max_tokens: u32,
    pub story_max_tokens: u32,
    /// Pause after each chapter request, except the last one.
    pub chapter_delay: Duration,
    /// Chapter requests in flight at once. 1 means strictly sequential.
    pub chapter_concurrency: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let language = Language::default();
        GenerationSettings {
            language,
            marker: MarkerRule::for_language(language),
            outline_max_tokens: 4000,
            chapter_max_tokens: 4000,
            story_max_tokens: 10000,
            chapter_delay: Duration::from_millis(1000),
            chapter_concurrency: 1,
        }
    }
}

/// Drives the outline → titles → chapters pipeline against a completion service.
pub struct Generator {
    client: Arc<dyn CompletionClient>,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>, settings: GenerationSettings) -> Self {
        Generator { client, settings }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    async fn request(&self, prompt: String, max_tokens: u32) -> Result<String, GenerationError> {
        self.client
            .complete(CompletionRequest {
                system: self.settings.language.persona().to_string(),
                prompt,
                max_tokens,
            })
            .await
    }

    /// Requests a new outline. On failure the session is left untouched.
    pub async fn generate_outline(
        &self,
        session: &mut GenerationSession,
    ) -> Result<(), GenerationError> {
        let prompt = prompts::outline_prompt(self.settings.language, &session.request);
        match self.request(prompt, self.settings.outline_max_tokens).await {
            Ok(outline) => {
                tracing::info!(
                    title = %session.request.title,
                    bytes = outline.len(),
                    "outline generated"
                );
                session.set_outline(outline);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    title = %session.request.title,
                    error = %e,
                    preview = %e.preview(),
                    "outline generation failed"
                );
                Err(e)
            }
        }
    }

    /// Generates one chapter per title found in the session's outline.
    ///
    /// Chapters land in the session in outline order whatever the concurrency.
    /// A failed request leaves a chapter without content and a matching entry in
    /// `session.failures`; the remaining chapters are still requested.
    pub async fn generate_chapters<F>(
        &self,
        session: &mut GenerationSession,
        mut on_progress: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(Progress),
    {
        let outline = session
            .outline
            .clone()
            .ok_or(PipelineError::OutlineMissing)?;
        let titles: Vec<String> = ChapterTitles::new(&outline, &self.settings.marker)
            .iter()
            .map(str::to_string)
            .collect();
        let sections = OutlineSections::parse(&outline, self.settings.language);

        let total = titles.len();
        if total != session.request.chapter_count as usize {
            tracing::debug!(
                requested = session.request.chapter_count,
                found = total,
                "outline chapter count differs from request"
            );
        }

        session.chapters.clear();
        session.failures.clear();
        session.progress = Progress { completed: 0, total };
        on_progress(session.progress);

        let request = &session.request;
        let language = self.settings.language;
        let delay = self.settings.chapter_delay;
        let mut results = stream::iter(titles.into_iter().enumerate())
            .map(|(position, chapter_title)| {
                let index = position + 1;
                let prompt = prompts::chapter_prompt(
                    language,
                    &ChapterPrompt {
                        chapter_number: index,
                        title: &request.title,
                        genre: &request.genre,
                        synopsis: &sections.synopsis,
                        characters: &sections.characters,
                        chapter_title: &chapter_title,
                    },
                );
                async move {
                    let outcome = self.request(prompt, self.settings.chapter_max_tokens).await;
                    if index < total && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    (index, chapter_title, outcome)
                }
            })
            .buffered(self.settings.chapter_concurrency.max(1));

        let mut chapters = Vec::with_capacity(total);
        let mut failures = Vec::new();
        while let Some((index, title, outcome)) = results.next().await {
            let content = match outcome {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!(
                        chapter = index,
                        title = %title,
                        transport = e.is_transport(),
                        error = %e,
                        preview = %preview(e.preview(), PREVIEW_CHARS),
                        "chapter generation failed"
                    );
                    failures.push(ChapterFailure {
                        index,
                        title: title.clone(),
                        message: format!("Chapter {index} ({title}) failed: {e}"),
                    });
                    None
                }
            };
            chapters.push(Chapter {
                index,
                title,
                content,
            });

            let progress = Progress {
                completed: chapters.len(),
                total,
            };
            tracing::info!(
                completed = progress.completed,
                total = progress.total,
                "chapter finished"
            );
            on_progress(progress);
        }
        drop(results);

        tracing::info!(
            chapters = total,
            failed = chapters.iter().filter(|c| c.is_failed()).count(),
            "chapter generation finished"
        );

        session.chapters = chapters;
        session.failures = failures;
        session.progress = Progress {
            completed: total,
            total,
        };
        Ok(())
    }

    /// Outline followed by every chapter. An outline failure aborts before any
    /// chapter request is made.
    pub async fn run<F>(
        &self,
        request: GenerationRequest,
        on_progress: F,
    ) -> Result<GenerationSession, PipelineError>
    where
        F: FnMut(Progress),
    {
        let mut session = GenerationSession::new(request);
        self.generate_outline(&mut session)
            .await
            .map_err(PipelineError::Outline)?;
        self.generate_chapters(&mut session, on_progress).await?;
        Ok(session)
    }

    /// Single-request short story in the style of a given author.
    pub async fn generate_story(&self, story: &StoryRequest) -> Result<String, GenerationError> {
        let prompt = prompts::story_prompt(self.settings.language, story);
        self.request(prompt, self.settings.story_max_tokens)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    title = %story.title,
                    error = %e,
                    preview = %e.preview(),
                    "story generation failed"
                )
            })
    }
}
