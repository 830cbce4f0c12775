use crate::models::{GenerationRequest, StoryRequest};
use serde::{Deserialize, Serialize};

/// Language of the prompts and of the chapter marker word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "es" | "spanish" | "español" => Some(Language::Spanish),
            "en" | "english" => Some(Language::English),
            _ => None,
        }
    }

    /// Word that starts every chapter heading line.
    pub fn marker(self) -> &'static str {
        match self {
            Language::Spanish => "Capítulo",
            Language::English => "Chapter",
        }
    }

    pub fn persona(self) -> &'static str {
        match self {
            Language::Spanish => "Eres un escritor latinoamericano de novelas.",
            Language::English => "You are an accomplished novelist.",
        }
    }

    pub(crate) fn failed_chapter_note(self, index: usize) -> String {
        match self {
            Language::Spanish => format!("[Error: no se pudo generar el capítulo {index}]"),
            Language::English => format!("[Error: chapter {index} could not be generated]"),
        }
    }
}

/// Fields embedded in every chapter prompt.
#[derive(Debug, Clone, Copy)]
pub struct ChapterPrompt<'a> {
    pub chapter_number: usize,
    pub title: &'a str,
    pub genre: &'a str,
    pub synopsis: &'a str,
    pub characters: &'a [String],
    pub chapter_title: &'a str,
}

pub fn outline_prompt(language: Language, request: &GenerationRequest) -> String {
    let marker = language.marker();
    let count = request.chapter_count;
    match language {
        Language::Spanish => {
            let style = request
                .author
                .as_deref()
                .map(|a| format!(" en el estilo de {a}"))
                .unwrap_or_default();
            format!(
                "Escribe el esquema de una novela{style} titulada '{title}' del género '{genre}'. \
                 Incluye estas secciones, cada una encabezada por su nombre seguido de dos puntos: \
                 Sinopsis, Trama, Personajes, Ambientación, Técnica narrativa e Índice. \
                 En Personajes escribe un personaje por línea con el formato 'Nombre: descripción'. \
                 El Índice debe tener exactamente {count} capítulos, uno por línea, \
                 con el formato '{marker} N: Título'.",
                title = request.title,
                genre = request.genre,
            )
        }
        Language::English => {
            let style = request
                .author
                .as_deref()
                .map(|a| format!(" in the style of {a}"))
                .unwrap_or_default();
            format!(
                "Write the outline of a novel{style} titled '{title}' in the '{genre}' genre. \
                 Include these sections, each introduced by its name followed by a colon: \
                 Synopsis, Plot, Characters, Setting, Narrative technique and Contents. \
                 Under Characters list one character per line as 'Name: description'. \
                 The Contents must list exactly {count} chapters, one per line, \
                 formatted as '{marker} N: Title'.",
                title = request.title,
                genre = request.genre,
            )
        }
    }
}

/// An empty character list renders an empty clause.
pub fn character_clause(characters: &[String]) -> String {
    characters.join(", ")
}

pub fn chapter_prompt(language: Language, chapter: &ChapterPrompt<'_>) -> String {
    let characters = character_clause(chapter.characters);
    match language {
        Language::Spanish => format!(
            "Escribe el capítulo {number} titulado '{chapter_title}' de la novela '{title}', \
             del género '{genre}'. Sinopsis de la novela: {synopsis}. \
             Personajes: {characters}. \
             Escribe solo el texto del capítulo, en prosa, sin repetir el esquema.",
            number = chapter.chapter_number,
            chapter_title = chapter.chapter_title,
            title = chapter.title,
            genre = chapter.genre,
            synopsis = chapter.synopsis,
        ),
        Language::English => format!(
            "Write chapter {number}, titled '{chapter_title}', of the novel '{title}' \
             in the '{genre}' genre. Synopsis of the novel: {synopsis}. \
             Characters: {characters}. \
             Write only the prose of the chapter, without repeating the outline.",
            number = chapter.chapter_number,
            chapter_title = chapter.chapter_title,
            title = chapter.title,
            genre = chapter.genre,
            synopsis = chapter.synopsis,
        ),
    }
}

pub fn story_prompt(language: Language, story: &StoryRequest) -> String {
    match language {
        Language::Spanish => format!(
            "Crea un cuento largo en el estilo de {author} con el título '{title}' y del género '{genre}'.",
            author = story.author,
            title = story.title,
            genre = story.genre,
        ),
        Language::English => format!(
            "Write a long short story in the style of {author}, titled '{title}', in the '{genre}' genre.",
            author = story.author,
            title = story.title,
            genre = story.genre,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            title: "El Faro".to_string(),
            genre: "Misterio".to_string(),
            author: Some("Julio Cortázar".to_string()),
            chapter_count: 7,
        }
    }

    #[test]
    fn outline_prompt_asks_for_exact_chapter_count() {
        let prompt = outline_prompt(Language::Spanish, &request());
        assert!(prompt.contains("exactamente 7 capítulos"));
        assert!(prompt.contains("'Capítulo N: Título'"));
        assert!(prompt.contains("en el estilo de Julio Cortázar"));
    }

    #[test]
    fn outline_prompt_without_author_has_no_style_clause() {
        let mut req = request();
        req.author = None;
        let prompt = outline_prompt(Language::English, &req);
        assert!(!prompt.contains("in the style of"));
        assert!(prompt.contains("'Chapter N: Title'"));
    }

    #[test]
    fn empty_character_list_renders_empty_clause() {
        assert_eq!(character_clause(&[]), "");
        let prompt = chapter_prompt(
            Language::Spanish,
            &ChapterPrompt {
                chapter_number: 2,
                title: "El Faro",
                genre: "Misterio",
                synopsis: "Un farero desaparece",
                characters: &[],
                chapter_title: "La tormenta",
            },
        );
        assert!(prompt.contains("Personajes: ."));
        assert!(prompt.contains("capítulo 2 titulado 'La tormenta'"));
    }

    #[test]
    fn character_clause_joins_with_commas() {
        let characters = vec!["Ana".to_string(), "Tomás".to_string()];
        assert_eq!(character_clause(&characters), "Ana, Tomás");
    }

    #[test]
    fn language_codes() {
        assert_eq!(Language::parse("ES"), Some(Language::Spanish));
        assert_eq!(Language::parse("en"), Some(Language::English));
        assert_eq!(Language::parse("fr"), None);
    }
}
