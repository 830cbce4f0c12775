use crate::error::RequestError;
use serde::{Deserialize, Serialize};

pub const MIN_CHAPTERS: u32 = 1;
pub const MAX_CHAPTERS: u32 = 24;

/// Novel metadata collected from the form. Fixed once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub title: String,
    pub genre: String,
    #[serde(default)]
    pub author: Option<String>,
    pub chapter_count: u32,
}

impl GenerationRequest {
    /// Trims the text fields, drops a blank author and checks the chapter bound.
    pub fn validate(self) -> Result<Self, RequestError> {
        let title = self.title.trim().to_string();
        let genre = self.genre.trim().to_string();
        if title.is_empty() {
            return Err(RequestError::EmptyField("title"));
        }
        if genre.is_empty() {
            return Err(RequestError::EmptyField("genre"));
        }
        if !(MIN_CHAPTERS..=MAX_CHAPTERS).contains(&self.chapter_count) {
            return Err(RequestError::ChapterCount {
                value: self.chapter_count,
                min: MIN_CHAPTERS,
                max: MAX_CHAPTERS,
            });
        }
        let author = self
            .author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        Ok(GenerationRequest {
            title,
            genre,
            author,
            chapter_count: self.chapter_count,
        })
    }
}

/// Input of the single-shot short story generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub title: String,
    pub genre: String,
    pub author: String,
}

impl StoryRequest {
    pub fn validate(self) -> Result<Self, RequestError> {
        let title = self.title.trim().to_string();
        let genre = self.genre.trim().to_string();
        let author = self.author.trim().to_string();
        if title.is_empty() {
            return Err(RequestError::EmptyField("title"));
        }
        if genre.is_empty() {
            return Err(RequestError::EmptyField("genre"));
        }
        if author.is_empty() {
            return Err(RequestError::EmptyField("author"));
        }
        Ok(StoryRequest {
            title,
            genre,
            author,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based position in the outline's table of contents.
    pub index: usize,
    pub title: String,
    /// `None` when the request for this chapter failed.
    pub content: Option<String>,
}

impl Chapter {
    pub fn is_failed(&self) -> bool {
        self.content.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub index: usize,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Everything one user accumulates between re-submissions: the request, the
/// latest outline and the chapters generated from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSession {
    pub request: GenerationRequest,
    pub outline: Option<String>,
    pub chapters: Vec<Chapter>,
    pub failures: Vec<ChapterFailure>,
    pub progress: Progress,
    /// Bumped every time a new outline is installed.
    #[serde(default)]
    pub outline_revision: u64,
}

impl GenerationSession {
    pub fn new(request: GenerationRequest) -> Self {
        GenerationSession {
            request,
            outline: None,
            chapters: Vec::new(),
            failures: Vec::new(),
            progress: Progress::default(),
            outline_revision: 0,
        }
    }

    /// Installs a fresh outline; chapters built from the previous one are dropped.
    pub fn set_outline(&mut self, outline: String) {
        self.outline = Some(outline);
        self.outline_revision += 1;
        self.chapters.clear();
        self.failures.clear();
        self.progress = Progress::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(chapter_count: u32) -> GenerationRequest {
        GenerationRequest {
            title: "  La Casa  ".to_string(),
            genre: "Misterio".to_string(),
            author: Some("   ".to_string()),
            chapter_count,
        }
    }

    #[test]
    fn validate_trims_and_drops_blank_author() {
        let req = request(3).validate().unwrap();
        assert_eq!(req.title, "La Casa");
        assert_eq!(req.author, None);
    }

    #[test]
    fn validate_rejects_out_of_range_chapter_count() {
        assert_eq!(
            request(0).validate(),
            Err(RequestError::ChapterCount {
                value: 0,
                min: 1,
                max: 24
            })
        );
        assert!(request(25).validate().is_err());
        assert!(request(24).validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_genre() {
        let mut req = request(2);
        req.genre = " ".to_string();
        assert_eq!(req.validate(), Err(RequestError::EmptyField("genre")));
    }

    #[test]
    fn set_outline_resets_chapters() {
        let mut session = GenerationSession::new(request(1).validate().unwrap());
        session.chapters.push(Chapter {
            index: 1,
            title: "Viejo".to_string(),
            content: None,
        });
        session.progress = Progress {
            completed: 1,
            total: 1,
        };
        session.set_outline("Capítulo 1: Nuevo".to_string());
        assert!(session.chapters.is_empty());
        assert_eq!(session.progress, Progress::default());
        assert_eq!(session.outline.as_deref(), Some("Capítulo 1: Nuevo"));
        assert_eq!(session.outline_revision, 1);
        session.set_outline("Capítulo 1: Otro".to_string());
        assert_eq!(session.outline_revision, 2);
    }
}
