use crate::error::ConfigError;
use crate::services::export::FailedChapters;
use crate::services::generator::GenerationSettings;
use crate::services::llm::LLMSettings;
use crate::services::outline::{MarkerRule, UntitledMarker};
use crate::services::prompts::Language;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://proxy.tune.app/chat/completions";
pub const DEFAULT_MODEL: &str = "meta/llama-3.1-8b-instruct";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub llm: LLMSettings,
    pub generation: GenerationSettings,
    pub failed_chapters: FailedChapters,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_key = get("LLM_API_KEY").ok_or(ConfigError::Missing("LLM_API_KEY"))?;
        let language = match get("NOVELA_LANGUAGE") {
            Some(code) => Language::parse(&code).ok_or(ConfigError::Invalid {
                var: "NOVELA_LANGUAGE",
                value: code,
            })?,
            None => Language::default(),
        };
        let untitled = match get("NOVELA_UNTITLED_MARKER").as_deref() {
            None | Some("whole-line") => UntitledMarker::WholeLine,
            Some("skip") => UntitledMarker::Skip,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NOVELA_UNTITLED_MARKER",
                    value: other.to_string(),
                });
            }
        };
        let failed_chapters = match get("NOVELA_FAILED_CHAPTERS").as_deref() {
            None | Some("marker") => FailedChapters::Marker,
            Some("skip") => FailedChapters::Skip,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NOVELA_FAILED_CHAPTERS",
                    value: other.to_string(),
                });
            }
        };

        let defaults = GenerationSettings::default();
        let delay_ms: u64 = parsed(&get, "NOVELA_CHAPTER_DELAY_MS")?
            .unwrap_or(defaults.chapter_delay.as_millis() as u64);
        let concurrency: usize = parsed(&get, "NOVELA_CHAPTER_CONCURRENCY")?
            .unwrap_or(defaults.chapter_concurrency);
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "NOVELA_CHAPTER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            bind: parsed(&get, "NOVELA_BIND")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000))),
            llm: LLMSettings {
                api_url: get("LLM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                api_key,
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                temperature: parsed(&get, "LLM_TEMPERATURE")?.unwrap_or(0.8),
                top_p: parsed(&get, "LLM_TOP_P")?,
                frequency_penalty: Some(parsed(&get, "LLM_FREQUENCY_PENALTY")?.unwrap_or(1.04)),
            },
            generation: GenerationSettings {
                language,
                marker: MarkerRule::new(language.marker(), untitled),
                outline_max_tokens: parsed(&get, "NOVELA_OUTLINE_MAX_TOKENS")?
                    .unwrap_or(defaults.outline_max_tokens),
                chapter_max_tokens: parsed(&get, "NOVELA_CHAPTER_MAX_TOKENS")?
                    .unwrap_or(defaults.chapter_max_tokens),
                story_max_tokens: parsed(&get, "NOVELA_STORY_MAX_TOKENS")?
                    .unwrap_or(defaults.story_max_tokens),
                chapter_delay: Duration::from_millis(delay_ms),
                chapter_concurrency: concurrency,
            },
            failed_chapters,
        })
    }
}

fn parsed<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert_eq!(
            config(&[]).unwrap_err(),
            ConfigError::Missing("LLM_API_KEY")
        );
        assert_eq!(
            config(&[("LLM_API_KEY", "  ")]).unwrap_err(),
            ConfigError::Missing("LLM_API_KEY")
        );
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("LLM_API_KEY", "k")]).unwrap();
        assert_eq!(config.llm.api_url, DEFAULT_API_URL);
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.frequency_penalty, Some(1.04));
        assert_eq!(config.generation.marker.marker, "Capítulo");
        assert_eq!(config.generation.marker.untitled, UntitledMarker::WholeLine);
        assert_eq!(config.generation.chapter_concurrency, 1);
        assert_eq!(config.generation.chapter_delay, Duration::from_millis(1000));
        assert_eq!(config.failed_chapters, FailedChapters::Marker);
        assert_eq!(config.bind.port(), 3000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("LLM_API_KEY", "k"),
            ("NOVELA_LANGUAGE", "en"),
            ("NOVELA_UNTITLED_MARKER", "skip"),
            ("NOVELA_FAILED_CHAPTERS", "skip"),
            ("NOVELA_CHAPTER_DELAY_MS", "250"),
            ("NOVELA_CHAPTER_CONCURRENCY", "3"),
            ("LLM_TOP_P", "0.9"),
            ("NOVELA_BIND", "127.0.0.1:8080"),
        ])
        .unwrap();
        assert_eq!(config.generation.marker.marker, "Chapter");
        assert_eq!(config.generation.marker.untitled, UntitledMarker::Skip);
        assert_eq!(config.failed_chapters, FailedChapters::Skip);
        assert_eq!(config.generation.chapter_delay, Duration::from_millis(250));
        assert_eq!(config.generation.chapter_concurrency, 3);
        assert_eq!(config.llm.top_p, Some(0.9));
        assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            config(&[("LLM_API_KEY", "k"), ("NOVELA_CHAPTER_DELAY_MS", "soon")]).unwrap_err(),
            ConfigError::Invalid {
                var: "NOVELA_CHAPTER_DELAY_MS",
                value: "soon".to_string()
            }
        );
        assert!(config(&[("LLM_API_KEY", "k"), ("NOVELA_CHAPTER_CONCURRENCY", "0")]).is_err());
        assert!(config(&[("LLM_API_KEY", "k"), ("NOVELA_LANGUAGE", "fr")]).is_err());
    }
}
