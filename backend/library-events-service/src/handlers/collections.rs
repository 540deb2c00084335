/// Collection mutation endpoints
///
/// Thin wrappers over `VisibilityTracker`: check the caller may touch the
/// collection, run the mutation, and return the per-item report.
use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::AuthenticatedUser;
use crate::models::{
    AddItemsRequest, CreateGroupingRequest, Grouping, ReleaseRequest, ShareRequest,
    UpdateGroupingRequest, UploadItemRequest,
};
use crate::state::AppState;

/// Only the owner or an admin may change a collection
async fn owned_grouping(
    state: &AppState,
    user: &AuthenticatedUser,
    grouping_id: Uuid,
) -> Result<Grouping> {
    let grouping = state
        .repo
        .get_grouping(grouping_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("collection {}", grouping_id)))?;

    if grouping.owner_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(format!(
            "collection {} belongs to another user",
            grouping_id
        )));
    }
    Ok(grouping)
}

/// Endpoint: POST /api/v1/items
pub async fn upload_item(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<UploadItemRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }

    let (item, report) = state.tracker.stage_upload(user.id, req.into_item()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "item": item,
        "report": report,
    })))
}

/// Endpoint: POST /api/v1/collections
pub async fn create_collection(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<CreateGroupingRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let change = state
        .tracker
        .create_grouping(user.id, req.name, req.item_ids)
        .await?;
    Ok(HttpResponse::Created().json(change))
}

/// Endpoint: PATCH /api/v1/collections/{id}
pub async fn rename_collection(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateGroupingRequest>,
) -> Result<HttpResponse> {
    let grouping_id = path.into_inner();
    let req = body.into_inner();
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    owned_grouping(&state, &user, grouping_id).await?;

    let grouping = state
        .tracker
        .rename_grouping(user.id, grouping_id, req.name)
        .await?;
    Ok(HttpResponse::Ok().json(grouping))
}

/// Endpoint: DELETE /api/v1/collections/{id}
pub async fn delete_collection(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let grouping_id = path.into_inner();
    owned_grouping(&state, &user, grouping_id).await?;

    let report = state.tracker.delete_grouping(user.id, grouping_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Endpoint: POST /api/v1/collections/{id}/items
pub async fn add_items(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<AddItemsRequest>,
) -> Result<HttpResponse> {
    let grouping_id = path.into_inner();
    let req = body.into_inner();
    if req.item_ids.is_empty() {
        return Err(AppError::BadRequest("itemIds must not be empty".into()));
    }
    owned_grouping(&state, &user, grouping_id).await?;

    let report = state
        .tracker
        .add_items(user.id, grouping_id, req.item_ids)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Endpoint: DELETE /api/v1/collections/{id}/items/{item_id}
pub async fn remove_item(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse> {
    let (grouping_id, item_id) = path.into_inner();
    owned_grouping(&state, &user, grouping_id).await?;

    let report = state
        .tracker
        .remove_item(user.id, grouping_id, item_id)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Endpoint: POST /api/v1/collections/{id}/shares
pub async fn share_collection(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ShareRequest>,
) -> Result<HttpResponse> {
    let grouping_id = path.into_inner();
    let grantee_id = body.into_inner().grantee_id;
    let grouping = owned_grouping(&state, &user, grouping_id).await?;
    if grantee_id == grouping.owner_id {
        return Err(AppError::BadRequest(
            "cannot share a collection with its owner".into(),
        ));
    }

    let report = state
        .tracker
        .share_grouping(user.id, grouping_id, grantee_id)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Endpoint: DELETE /api/v1/collections/{id}/shares/{grantee_id}
pub async fn unshare_collection(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse> {
    let (grouping_id, grantee_id) = path.into_inner();
    owned_grouping(&state, &user, grouping_id).await?;

    let report = state
        .tracker
        .unshare_grouping(user.id, grouping_id, grantee_id)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Endpoint: POST /api/v1/staging/release
pub async fn release_staged(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<ReleaseRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    if req.item_ids.is_empty() {
        return Err(AppError::BadRequest("itemIds must not be empty".into()));
    }
    for &target in &req.grouping_ids {
        let grouping = owned_grouping(&state, &user, target).await?;
        if grouping.is_staging {
            return Err(AppError::BadRequest(
                "release target cannot be a staging collection".into(),
            ));
        }
    }

    let report = state
        .tracker
        .release_staged(user.id, req.item_ids, req.grouping_ids)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/items", web::post().to(upload_item))
        .route("/api/v1/staging/release", web::post().to(release_staged))
        .service(
            web::scope("/api/v1/collections")
                .route("", web::post().to(create_collection))
                .route("/{id}", web::patch().to(rename_collection))
                .route("/{id}", web::delete().to(delete_collection))
                .route("/{id}/items", web::post().to(add_items))
                .route("/{id}/items/{item_id}", web::delete().to(remove_item))
                .route("/{id}/shares", web::post().to(share_collection))
                .route(
                    "/{id}/shares/{grantee_id}",
                    web::delete().to(unshare_collection),
                ),
        );
}
