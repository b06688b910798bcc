use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use mozho_chat::parse_id;
use mozho_types::api::{Claims, CreateRoomRequest, LeaveResponse, RoomResponse};

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

/// Open (or reopen) the caller's direct room with another user.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let other = parse_id("other_user_id", &req.other_user_id)?;
    let me = claims.sub;

    let (room, members) = state
        .with_rooms(move |rooms| {
            let room = rooms.create_direct_room(me, other)?;
            let members = rooms.members(room.id)?;
            Ok((room, members))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(RoomResponse::new(room, members))))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let rooms = state.with_rooms(move |rooms| rooms.list_rooms(me)).await?;

    let rooms: Vec<RoomResponse> = rooms
        .into_iter()
        .map(|room| RoomResponse::new(room, vec![]))
        .collect();
    Ok(Json(rooms))
}

pub async fn get_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let room_id = parse_id("room_id", &room_id)?;
    let me = claims.sub;

    let (room, members) = state
        .with_rooms(move |rooms| {
            rooms.authorize(room_id, me)?;
            rooms.room_details(room_id)
        })
        .await?;

    Ok(Json(RoomResponse::new(room, members)))
}

pub async fn join_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let room_id = parse_id("room_id", &room_id)?;
    let me = claims.sub;

    let (room, members) = state
        .with_rooms(move |rooms| {
            rooms.join(room_id, me)?;
            rooms.room_details(room_id)
        })
        .await?;

    Ok(Json(RoomResponse::new(room, members)))
}

pub async fn leave_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let room_id = parse_id("room_id", &room_id)?;
    let me = claims.sub;

    let reclaimed = state.with_rooms(move |rooms| rooms.leave(room_id, me)).await?;
    Ok(Json(LeaveResponse { room_id, reclaimed }))
}

/// Members only.
pub async fn delete_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let room_id = parse_id("room_id", &room_id)?;
    let me = claims.sub;

    state
        .with_rooms(move |rooms| {
            rooms.authorize(room_id, me)?;
            rooms.delete_room(room_id)
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
