//! Order note endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderNoteId;
use domain::{OrderNote, OrderRepository};
use serde::Deserialize;

use super::orders::ids;
use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub content: String,
}

/// POST /businesses/{business_id}/orders/{order_id}/notes
#[tracing::instrument(skip(state, payload))]
pub async fn create<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderNote>), ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    let Json(request) = payload?;
    let note = state
        .orders
        .add_note(business_id, order_id, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /businesses/{business_id}/orders/{order_id}/notes
#[tracing::instrument(skip(state))]
pub async fn list<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id)): Path<(String, String)>,
) -> Result<Json<Vec<OrderNote>>, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    Ok(Json(state.orders.list_notes(business_id, order_id).await?))
}

/// DELETE /businesses/{business_id}/orders/{order_id}/notes/{note_id}
#[tracing::instrument(skip(state))]
pub async fn delete<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((business_id, order_id, note_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let (business_id, order_id) = ids(&business_id, &order_id)?;
    let note_id: OrderNoteId = parse_id(&note_id, "note_id")?;
    state
        .orders
        .delete_note(business_id, order_id, note_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
