use crate::error::{GenerationError, PipelineError, RequestError, SessionError};
use crate::models::{Chapter, ChapterFailure, GenerationRequest, GenerationSession, StoryRequest};
use crate::services::export::{ExportFormat, FailedChapters, NovelDocument};
use crate::services::generator::Generator;
use crate::services::outline::ChapterTitles;
use crate::services::session::SessionStore;
use crate::utils::file_stem;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub sessions: SessionStore,
    pub failed_chapters: FailedChapters,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/outline", post(create_outline))
        .route("/story", post(create_story))
        .route("/sessions/:id", get(show_session))
        .route("/sessions/:id/outline", post(regenerate_outline))
        .route("/sessions/:id/chapters", post(generate_chapters))
        .route("/sessions/:id/export", get(export_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

#[derive(Debug)]
pub enum ApiError {
    Invalid(RequestError),
    NotFound(Uuid),
    /// The outline was replaced while the request was running.
    Stale(Uuid),
    Pipeline(PipelineError),
    Generation(GenerationError),
    Export(anyhow::Error),
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        ApiError::Invalid(e)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        ApiError::Generation(e)
    }
}

impl ApiError {
    fn session(id: Uuid, e: SessionError) -> Self {
        match e {
            SessionError::NotFound => ApiError::NotFound(id),
            SessionError::Stale => ApiError::Stale(id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Invalid(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("unknown session {id}")),
            ApiError::Stale(id) => (
                StatusCode::CONFLICT,
                format!("session {id}: {}", SessionError::Stale),
            ),
            ApiError::Pipeline(PipelineError::OutlineMissing) => {
                (StatusCode::CONFLICT, PipelineError::OutlineMissing.to_string())
            }
            ApiError::Pipeline(e @ PipelineError::Outline(_)) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            ApiError::Generation(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::Export(e) => {
                tracing::error!(error = %e, "export failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "export failed".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutlineResponse {
    pub session_id: Uuid,
    pub outline: String,
    pub chapter_titles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChaptersResponse {
    pub chapters: Vec<Chapter>,
    pub failures: Vec<ChapterFailure>,
    /// The assembled novel, exactly as it is exported.
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryResponse {
    pub story: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

fn outline_response(state: &AppState, id: Uuid, session: &GenerationSession) -> OutlineResponse {
    let outline = session.outline.clone().unwrap_or_default();
    let chapter_titles = ChapterTitles::new(&outline, &state.generator.settings().marker)
        .iter()
        .map(str::to_string)
        .collect();
    OutlineResponse {
        session_id: id,
        outline,
        chapter_titles,
    }
}

fn assemble(state: &AppState, session: &GenerationSession) -> NovelDocument {
    let settings = state.generator.settings();
    NovelDocument::assemble(
        session,
        &settings.marker,
        settings.language,
        state.failed_chapters,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn create_outline(
    State(state): State<AppState>,
    Form(request): Form<GenerationRequest>,
) -> Result<Json<OutlineResponse>, ApiError> {
    let mut session = GenerationSession::new(request.validate()?);
    state.generator.generate_outline(&mut session).await?;

    let id = state.sessions.insert(session.clone());
    tracing::info!(session = %id, sessions = state.sessions.count(), "session created");
    Ok(Json(outline_response(&state, id, &session)))
}

async fn regenerate_outline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutlineResponse>, ApiError> {
    let mut session = state.sessions.get(&id).ok_or(ApiError::NotFound(id))?;
    let base = session.outline_revision;
    state.generator.generate_outline(&mut session).await?;

    state
        .sessions
        .commit(&id, base, session.clone())
        .map_err(|e| ApiError::session(id, e))?;
    Ok(Json(outline_response(&state, id, &session)))
}

async fn generate_chapters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChaptersResponse>, ApiError> {
    let mut session = state.sessions.get(&id).ok_or(ApiError::NotFound(id))?;
    let revision = session.outline_revision;
    let sessions = state.sessions.clone();
    state
        .generator
        .generate_chapters(&mut session, |progress| {
            sessions.set_progress(&id, revision, progress)
        })
        .await?;

    for failure in &session.failures {
        tracing::warn!(session = %id, chapter = failure.index, "{}", failure.message);
    }
    if let Err(e) = state.sessions.commit(&id, revision, session.clone()) {
        tracing::warn!(session = %id, error = %e, "discarding generated chapters");
        return Err(ApiError::session(id, e));
    }

    let text = assemble(&state, &session).text();
    Ok(Json(ChaptersResponse {
        chapters: session.chapters,
        failures: session.failures,
        text,
    }))
}

async fn show_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationSession>, ApiError> {
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let session = state.sessions.get(&id).ok_or(ApiError::NotFound(id))?;
    if session.outline.is_none() {
        return Err(PipelineError::OutlineMissing.into());
    }

    let document = assemble(&state, &session);
    let bytes = document.render(query.format).map_err(ApiError::Export)?;

    let format = query.format;
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        file_stem(&document.title),
        format.extension()
    );
    tracing::info!(session = %id, format = format.extension(), bytes = bytes.len(), "document exported");
    Ok((
        [
            (CONTENT_TYPE, format.mime_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn create_story(
    State(state): State<AppState>,
    Form(story): Form<StoryRequest>,
) -> Result<Json<StoryResponse>, ApiError> {
    let story = story.validate()?;
    let text = state.generator.generate_story(&story).await?;
    Ok(Json(StoryResponse { story: text }))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Generador de Novelas</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Georgia, serif; margin: 40px; max-width: 860px; }
        label { display: block; margin: 10px 0 4px; }
        input, select { padding: 6px; width: 320px; }
        button { margin: 16px 8px 0 0; padding: 8px 16px; }
        pre { white-space: pre-wrap; background-color: #f5f5f5; padding: 16px; border-radius: 4px; }
        .error { color: #b00020; }
    </style>
</head>
<body>
    <h1>Generador de Novelas</h1>

    <form id="novel">
        <label for="title">Título</label>
        <input id="title" name="title" required>
        <label for="genre">Género</label>
        <input id="genre" name="genre" required>
        <label for="author">Autor o estilo (opcional)</label>
        <input id="author" name="author">
        <label for="chapter_count">Número de capítulos</label>
        <input id="chapter_count" name="chapter_count" type="number" min="1" max="24" value="5" required>
        <div>
            <button type="button" id="outline-btn">Generar esquema</button>
            <button type="button" id="chapters-btn" disabled>Generar capítulos</button>
            <a id="docx" hidden>Exportar DOCX</a>
            <a id="epub" hidden>Exportar EPUB</a>
        </div>
    </form>

    <h2>Cuento corto</h2>
    <form id="story">
        <label for="story-title">Título</label>
        <input id="story-title" name="title" required>
        <label for="story-author">Autor cuyo estilo se imitará</label>
        <select id="story-author" name="author" required>
            <option>Gabriel García Márquez</option>
            <option>Isabel Allende</option>
            <option>Mario Vargas Llosa</option>
            <option>Julio Cortázar</option>
            <option>Jorge Luis Borges</option>
        </select>
        <label for="story-genre">Género</label>
        <select id="story-genre" name="genre" required>
            <option>Aventuras</option>
            <option>Ciencia Ficción</option>
            <option>Fantasía</option>
            <option>Misterio</option>
            <option>Romance</option>
            <option>Terror</option>
            <option>Drama</option>
            <option>Comedia</option>
            <option>Historia</option>
            <option>Ficción histórica</option>
            <option>Ficción científica</option>
            <option>Ficción de aventuras</option>
            <option>Ficción de misterio</option>
            <option>Ficción de terror</option>
        </select>
        <div>
            <button type="button" id="story-btn">Generar cuento</button>
        </div>
    </form>

    <progress id="progress" value="0" max="1" hidden></progress>
    <p id="errors" class="error"></p>
    <pre id="output"></pre>

    <script>
        let sessionId = null;
        const form = document.getElementById('novel');
        const output = document.getElementById('output');
        const errors = document.getElementById('errors');
        const progress = document.getElementById('progress');
        const outlineBtn = document.getElementById('outline-btn');
        const chaptersBtn = document.getElementById('chapters-btn');

        async function call(method, url, body) {
            const res = await fetch(url, { method, body });
            const json = await res.json();
            if (!res.ok) throw new Error(json.error);
            return json;
        }

        function setExports() {
            for (const format of ['docx', 'epub']) {
                const link = document.getElementById(format);
                link.href = `/sessions/${sessionId}/export?format=${format}`;
                link.hidden = false;
            }
        }

        outlineBtn.onclick = async () => {
            errors.textContent = '';
            output.textContent = '...';
            try {
                const res = await call('POST', '/outline', new URLSearchParams(new FormData(form)));
                sessionId = res.session_id;
                output.textContent = res.outline;
                chaptersBtn.disabled = false;
                setExports();
            } catch (e) {
                output.textContent = '';
                errors.textContent = e.message;
            }
        };

        chaptersBtn.onclick = async () => {
            errors.textContent = '';
            outlineBtn.disabled = true;
            chaptersBtn.disabled = true;
            progress.hidden = false;
            const timer = setInterval(async () => {
                const s = await call('GET', `/sessions/${sessionId}`);
                progress.max = Math.max(s.progress.total, 1);
                progress.value = s.progress.completed;
            }, 1000);
            try {
                const res = await call('POST', `/sessions/${sessionId}/chapters`);
                output.textContent = res.text;
                errors.textContent = res.failures.map(f => f.message).join('\n');
            } catch (e) {
                errors.textContent = e.message;
            } finally {
                clearInterval(timer);
                progress.hidden = true;
                outlineBtn.disabled = false;
                chaptersBtn.disabled = false;
            }
        };

        document.getElementById('story-btn').onclick = async () => {
            const story = document.getElementById('story');
            if (!story.reportValidity()) return;
            errors.textContent = '';
            output.textContent = '...';
            try {
                const res = await call('POST', '/story', new URLSearchParams(new FormData(story)));
                output.textContent = res.story;
            } catch (e) {
                output.textContent = '';
                errors.textContent = e.message;
            }
        };
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::generator::tests::{ScriptedClient, fast_settings};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const OUTLINE: &str = "Sinopsis: X\nCapítulo 1: El Inicio\nCapítulo 2: El Final";

    fn app(client: Arc<ScriptedClient>) -> (Router, SessionStore) {
        let sessions = SessionStore::new();
        let state = AppState {
            generator: Arc::new(Generator::new(client, fast_settings())),
            sessions: sessions.clone(),
            failed_chapters: FailedChapters::Marker,
        };
        (router(state), sessions)
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_and_index() {
        let (app, _) = app(ScriptedClient::new(vec![]));
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/")).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8_lossy(&body);
        assert!(page.contains(r#"max="24""#));
        assert!(page.contains(r#"<select id="story-author" name="author" required>"#));
        assert!(page.contains("<option>Jorge Luis Borges</option>"));
        assert!(page.contains("<option>Ficción de terror</option>"));
    }

    #[tokio::test]
    async fn outline_chapters_and_export() {
        let client = ScriptedClient::new(vec![
            Ok(OUTLINE.to_string()),
            Ok("Era de noche.".to_string()),
            Ok("Amaneció.".to_string()),
        ]);
        let (app, _) = app(client.clone());

        let response = app
            .clone()
            .oneshot(form("/outline", "title=El+Faro&genre=Misterio&author=&chapter_count=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outline: OutlineResponse = json(response).await;
        assert_eq!(outline.chapter_titles, vec!["El Inicio", "El Final"]);
        let id = outline.session_id;

        let response = app
            .clone()
            .oneshot(post(&format!("/sessions/{id}/chapters")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let chapters: ChaptersResponse = json(response).await;
        assert_eq!(chapters.chapters.len(), 2);
        assert_eq!(chapters.chapters[1].content.as_deref(), Some("Amaneció."));
        assert!(chapters.failures.is_empty());
        assert_eq!(
            chapters.text,
            format!(
                "{OUTLINE}\n\nCapítulo 1: El Inicio\n\nEra de noche.\n\n\
                 Capítulo 2: El Final\n\nAmaneció."
            )
        );

        let response = app
            .clone()
            .oneshot(get(&format!("/sessions/{id}")))
            .await
            .unwrap();
        let session: GenerationSession = json(response).await;
        assert_eq!(session.progress.completed, 2);
        assert_eq!(session.request.author, None);

        let response = app
            .oneshot(get(&format!("/sessions/{id}/export?format=docx")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            ExportFormat::Docx.mime_type()
        );
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"El_Faro.docx\""
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..2], b"PK");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn page_text_matches_export_with_failed_chapter() {
        let client = ScriptedClient::new(vec![
            Ok(OUTLINE.to_string()),
            Err(GenerationError::Status {
                status: 503,
                preview: "busy".to_string(),
            }),
            Ok("Amaneció.".to_string()),
        ]);
        let (app, sessions) = app(client);

        let response = app
            .clone()
            .oneshot(form("/outline", "title=El+Faro&genre=Misterio&chapter_count=2"))
            .await
            .unwrap();
        let outline: OutlineResponse = json(response).await;
        let id = outline.session_id;

        let response = app
            .oneshot(post(&format!("/sessions/{id}/chapters")))
            .await
            .unwrap();
        let chapters: ChaptersResponse = json(response).await;
        assert_eq!(chapters.failures.len(), 1);

        let session = sessions.get(&id).unwrap();
        let exported = NovelDocument::assemble(
            &session,
            &fast_settings().marker,
            fast_settings().language,
            FailedChapters::Marker,
        );
        assert_eq!(chapters.text, exported.text());
        assert!(chapters.text.contains("Capítulo 1: El Inicio\n\n"));
        assert!(chapters.text.ends_with("Capítulo 2: El Final\n\nAmaneció."));
    }

    #[tokio::test(start_paused = true)]
    async fn chapters_for_a_replaced_outline_are_discarded() {
        let client = ScriptedClient::slow(
            vec![
                Ok(OUTLINE.to_string()),
                Ok("Era de noche.".to_string()),
                Ok("Sinopsis: Y\nCapítulo 1: Nuevo".to_string()),
                Ok("Amaneció.".to_string()),
            ],
            Duration::from_millis(100),
        );
        let (app, sessions) = app(client.clone());

        let response = app
            .clone()
            .oneshot(form("/outline", "title=El+Faro&genre=Misterio&chapter_count=2"))
            .await
            .unwrap();
        let outline: OutlineResponse = json(response).await;
        let id = outline.session_id;

        let chapters = tokio::spawn(app.clone().oneshot(post(&format!("/sessions/{id}/chapters"))));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = app
            .oneshot(post(&format!("/sessions/{id}/outline")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let regenerated: OutlineResponse = json(response).await;
        assert_eq!(regenerated.chapter_titles, vec!["Nuevo"]);

        let response = chapters.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(client.calls(), 4);

        let stored = sessions.get(&id).unwrap();
        assert_eq!(stored.outline.as_deref(), Some("Sinopsis: Y\nCapítulo 1: Nuevo"));
        assert_eq!(stored.outline_revision, 2);
        assert!(stored.chapters.is_empty());
        assert_eq!(stored.progress.completed, 0);
    }

    #[tokio::test]
    async fn invalid_form_is_rejected_without_requests() {
        let client = ScriptedClient::new(vec![]);
        let (app, _) = app(client.clone());
        let response = app
            .oneshot(form("/outline", "title=El+Faro&genre=Misterio&chapter_count=30"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn outline_failure_creates_no_session() {
        let client = ScriptedClient::new(vec![Err(GenerationError::Status {
            status: 500,
            preview: "boom".to_string(),
        })]);
        let (app, sessions) = app(client);
        let response = app
            .oneshot(form("/outline", "title=El+Faro&genre=Misterio&chapter_count=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = json(response).await;
        assert!(body["error"].as_str().unwrap().contains("HTTP 500"));
        assert_eq!(sessions.count(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (app, _) = app(ScriptedClient::new(vec![]));
        let response = app
            .oneshot(post(&format!("/sessions/{}/chapters", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn story_returns_generated_text() {
        let (app, _) = app(ScriptedClient::new(vec![Ok("Había una vez".to_string())]));
        let response = app
            .oneshot(form(
                "/story",
                "title=La+Niebla&genre=Terror&author=Julio+Cort%C3%A1zar",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let story: StoryResponse = json(response).await;
        assert_eq!(story.story, "Había una vez");
    }
}
