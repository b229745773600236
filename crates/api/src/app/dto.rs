use serde::Deserialize;
use serde_json::{Value, json};

use crm_applications::{Application, Comment};
use crm_auth::{TokenPair, User};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateManagerRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

// -------------------------
// Read models
// -------------------------

/// An application with its manager and comment authors resolved.
#[derive(Debug, Clone)]
pub struct ApplicationView {
    pub application: Application,
    pub manager: Option<User>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub comment: Comment,
    pub author: Option<User>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// Public account shape. The password hash is never included.
pub fn user_to_json(user: &User) -> Value {
    json!({
        "_id": user.id.to_string(),
        "email": user.email,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "role": user.role.as_str(),
        "isActive": user.is_active,
        "isBanned": user.is_banned,
        "managers": user.managers.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "createdAt": user.created_at.to_rfc3339(),
        "updatedAt": user.updated_at.to_rfc3339(),
    })
}

pub fn tokens_to_json(tokens: &TokenPair) -> Value {
    json!({
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
    })
}

fn manager_summary(user: &User) -> Value {
    json!({
        "_id": user.id.to_string(),
        "firstName": user.first_name,
        "email": user.email,
    })
}

fn author_summary(user: &User) -> Value {
    json!({
        "_id": user.id.to_string(),
        "firstName": user.first_name,
        "email": user.email,
        "createdAt": user.created_at.to_rfc3339(),
    })
}

pub fn comment_to_json(view: &CommentView) -> Value {
    json!({
        "_id": view.comment.id.to_string(),
        "applicationId": view.comment.application_id.to_string(),
        "text": view.comment.text,
        "author": view.author.as_ref().map(author_summary),
        "createdAt": view.comment.created_at.to_rfc3339(),
    })
}

pub fn application_to_json(view: &ApplicationView) -> Value {
    let app = &view.application;
    json!({
        "_id": app.id.to_string(),
        "name": app.name,
        "surname": app.surname,
        "email": app.email,
        "phone": app.phone,
        "age": app.age,
        "course": app.course.as_str(),
        "course_type": app.course_type.as_str(),
        "course_format": app.course_format.as_str(),
        "status": app.status.map(|s| s.as_str()),
        "sum": app.sum,
        "already_paid": app.already_paid,
        "group": app.group,
        "manager": view.manager.as_ref().map(manager_summary),
        "utm": app.utm,
        "msg": app.msg,
        "comments": view.comments.iter().map(comment_to_json).collect::<Vec<_>>(),
        "createdAt": app.created_at.to_rfc3339(),
        "updatedAt": app.updated_at.to_rfc3339(),
    })
}
