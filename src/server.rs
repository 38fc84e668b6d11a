use crate::config::ServerConfig;
use crate::data::{CohortKey, GenerationInput, Timetable, TimetableEntry};
use crate::disruption::{
    CancellationAction, CancellationRequest, CancellationSubmission, ResolveOutcome,
    SubstitutionOffer,
};
use crate::error::ScheduleError;
use crate::session::{ElectiveOption, Session, SessionStatus, StudentMeeting, TeacherSchedule};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn reject(e: ScheduleError) -> (StatusCode, Json<ErrorBody>) {
    let status = match e {
        ScheduleError::PreconditionFailed(_) | ScheduleError::MissingField(_) => {
            StatusCode::BAD_REQUEST
        }
        ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleError::InfeasibleSchedule { .. } | ScheduleError::Inconsistency(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!("{} {e}", status.as_u16());
    (status, Json(ErrorBody { error: e.to_string() }))
}

fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Serialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResolveBody {
    action: CancellationAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OffersQuery {
    teacher_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptBody {
    accepting_teacher_id: Option<String>,
}

async fn generate_handler(
    State(session): State<SharedSession>,
    Json(input): Json<GenerationInput>,
) -> ApiResult<Timetable> {
    // the colony search is CPU bound
    let joined = tokio::task::spawn_blocking(move || lock(&session).generate(input)).await;
    match joined {
        Ok(result) => result.map(Json).map_err(reject),
        Err(e) => {
            error!("Generation task failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Generation task failed".to_string(),
                }),
            ))
        }
    }
}

async fn timetable_handler(State(session): State<SharedSession>) -> ApiResult<Timetable> {
    lock(&session).timetable().cloned().map(Json).map_err(reject)
}

async fn student_timetable_handler(
    State(session): State<SharedSession>,
    Path(student_id): Path<String>,
) -> ApiResult<Vec<StudentMeeting>> {
    lock(&session).student_view(&student_id).map(Json).map_err(reject)
}

async fn teacher_timetable_handler(
    State(session): State<SharedSession>,
    Path(teacher_id): Path<String>,
) -> ApiResult<TeacherSchedule> {
    lock(&session).teacher_view(&teacher_id).map(Json).map_err(reject)
}

async fn cohort_timetable_handler(
    State(session): State<SharedSession>,
    Path((program, semester, section)): Path<(String, u32, String)>,
) -> ApiResult<Vec<TimetableEntry>> {
    let cohort = CohortKey {
        program,
        semester,
        section,
    };
    lock(&session)
        .cohort_view(&cohort)
        .map(|entries| Json(entries.into_iter().cloned().collect()))
        .map_err(reject)
}

async fn electives_handler(
    State(session): State<SharedSession>,
    Path(student_id): Path<String>,
) -> ApiResult<Vec<ElectiveOption>> {
    lock(&session)
        .available_electives(&student_id)
        .map(Json)
        .map_err(reject)
}

async fn status_handler(State(session): State<SharedSession>) -> Json<SessionStatus> {
    Json(lock(&session).status())
}

async fn submit_cancellation_handler(
    State(session): State<SharedSession>,
    Json(submission): Json<CancellationSubmission>,
) -> Result<(StatusCode, Json<Created>), (StatusCode, Json<ErrorBody>)> {
    let id = lock(&session).submit_cancellation(submission).map_err(reject)?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

async fn pending_cancellations_handler(
    State(session): State<SharedSession>,
) -> Json<Vec<CancellationRequest>> {
    Json(lock(&session).pending_cancellations().to_vec())
}

async fn resolve_cancellation_handler(
    State(session): State<SharedSession>,
    Path(request_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> ApiResult<ResolveOutcome> {
    lock(&session)
        .resolve_cancellation(&request_id, body.action)
        .map(Json)
        .map_err(reject)
}

async fn offers_handler(
    State(session): State<SharedSession>,
    Query(query): Query<OffersQuery>,
) -> ApiResult<Vec<SubstitutionOffer>> {
    let teacher_id = query
        .teacher_id
        .ok_or(ScheduleError::MissingField("teacherId"))
        .map_err(reject)?;
    let offers = lock(&session)
        .offers_for(&teacher_id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(offers))
}

async fn accept_offer_handler(
    State(session): State<SharedSession>,
    Path(offer_id): Path<String>,
    Json(body): Json<AcceptBody>,
) -> ApiResult<TimetableEntry> {
    let teacher_id = body
        .accepting_teacher_id
        .ok_or(ScheduleError::MissingField("acceptingTeacherId"))
        .map_err(reject)?;
    lock(&session)
        .accept_substitution(&offer_id, &teacher_id)
        .map(Json)
        .map_err(reject)
}

pub fn router(session: SharedSession) -> Router {
    Router::new()
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/v1/timetable", get(timetable_handler))
        .route("/v1/timetable/students/:id", get(student_timetable_handler))
        .route("/v1/timetable/teachers/:id", get(teacher_timetable_handler))
        .route(
            "/v1/timetable/cohorts/:program/:semester/:section",
            get(cohort_timetable_handler),
        )
        .route("/v1/students/:id/electives", get(electives_handler))
        .route("/v1/status", get(status_handler))
        .route(
            "/v1/cancellations",
            post(submit_cancellation_handler).get(pending_cancellations_handler),
        )
        .route("/v1/cancellations/:id/resolve", post(resolve_cancellation_handler))
        .route("/v1/offers", get(offers_handler))
        .route("/v1/offers/:id/accept", post(accept_offer_handler))
        .with_state(session)
}

pub async fn run_server(config: ServerConfig, session: SharedSession) -> std::io::Result<()> {
    let app = router(session);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
