use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::relay::Destination;
use crate::http::server::AppState;
use crate::mapping::{MappingRecord, Rule, StoreError};

/// Admin API failures.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("no mapping at index {0}")]
    NotFound(usize),

    #[error("invalid mapping: {0}")]
    InvalidRule(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdminError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::Forbidden => StatusCode::FORBIDDEN,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidRule(_) | AdminError::InvalidMove(_) => StatusCode::BAD_REQUEST,
            AdminError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AdminError::Store(e) => {
                tracing::error!(error = %e, "Mapping table edit failed");
                "mapping table unavailable".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub rules: usize,
    pub enabled_rules: usize,
    pub sessions: usize,
}

/// A rule together with its position in the table.
#[derive(Debug, Serialize)]
pub struct MappingEntry {
    pub index: usize,
    #[serde(flatten)]
    pub record: MappingRecord,
}

impl MappingEntry {
    fn new(index: usize, rule: &Rule) -> Self {
        Self {
            index,
            record: MappingRecord::from(rule.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: i64,
}

fn entries(rules: &[Rule]) -> Vec<MappingEntry> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| MappingEntry::new(index, rule))
        .collect()
}

/// Accept a record only if its destination can actually be relayed to.
pub fn validate_record(record: MappingRecord) -> Result<Rule, AdminError> {
    let destination = record.http_dest.trim();
    if destination.is_empty() {
        return Err(AdminError::InvalidRule("http_dest is required".to_string()));
    }
    Destination::parse(destination).map_err(|e| AdminError::InvalidRule(e.to_string()))?;
    Ok(Rule::from(record))
}

/// Index reached by moving `index` by `direction` positions, if inside `len`.
pub fn move_target(index: usize, direction: i64, len: usize) -> Option<usize> {
    let target = i64::try_from(index).ok()?.checked_add(direction)?;
    usize::try_from(target).ok().filter(|t| *t < len)
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let rules = state.store.list().await;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        rules: rules.len(),
        enabled_rules: rules.iter().filter(|r| !r.flags.disabled).count(),
        sessions: state.sessions.len(),
    })
}

pub async fn list_mappings(State(state): State<AppState>) -> Json<Vec<MappingEntry>> {
    Json(entries(&state.store.list().await))
}

pub async fn add_mapping(
    State(state): State<AppState>,
    Json(record): Json<MappingRecord>,
) -> Result<(StatusCode, Json<MappingEntry>), AdminError> {
    let rule = validate_record(record)?;
    let (rules, index) = state
        .store
        .edit(|rules| {
            rules.push(rule);
            Ok::<_, AdminError>(rules.len() - 1)
        })
        .await?;
    tracing::info!(index, match_url = %rules[index].match_url(), "Mapping added");
    Ok((StatusCode::CREATED, Json(MappingEntry::new(index, &rules[index]))))
}

pub async fn update_mapping(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(record): Json<MappingRecord>,
) -> Result<Json<MappingEntry>, AdminError> {
    let rule = validate_record(record)?;
    let (rules, ()) = state
        .store
        .edit(|rules| {
            let slot = rules.get_mut(index).ok_or(AdminError::NotFound(index))?;
            *slot = rule;
            Ok::<_, AdminError>(())
        })
        .await?;
    tracing::info!(index, match_url = %rules[index].match_url(), "Mapping updated");
    Ok(Json(MappingEntry::new(index, &rules[index])))
}

pub async fn move_mapping(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Vec<MappingEntry>>, AdminError> {
    let (rules, target) = state
        .store
        .edit(|rules| {
            if index >= rules.len() {
                return Err(AdminError::NotFound(index));
            }
            let target = move_target(index, request.direction, rules.len()).ok_or_else(|| {
                AdminError::InvalidMove(format!(
                    "cannot move {} by {} in a table of {}",
                    index,
                    request.direction,
                    rules.len()
                ))
            })?;
            rules.swap(index, target);
            Ok(target)
        })
        .await?;
    tracing::info!(from = index, to = target, "Mapping moved");
    Ok(Json(entries(&rules)))
}

pub async fn delete_mapping(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<MappingEntry>, AdminError> {
    let (_, removed) = state
        .store
        .edit(|rules| {
            if index >= rules.len() {
                return Err(AdminError::NotFound(index));
            }
            Ok(rules.remove(index))
        })
        .await?;
    tracing::info!(index, match_url = %removed.match_url(), "Mapping deleted");
    Ok(Json(MappingEntry::new(index, &removed)))
}
