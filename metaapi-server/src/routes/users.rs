//! User endpoints backed by the query store

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metaapi_db::{Connector, Row};

use crate::error::ApiError;
use crate::extractors::FormFields;
use crate::state::AppState;
use crate::validation::{form_context, validate_required};

const CREATE_USER_FIELDS: &[(&str, &str)] = &[
    ("first_name", "first_name"),
    ("last_name", "last_name"),
    ("email", "email"),
];

const COGNITO_USER_FIELDS: &[(&str, &str)] = &[
    ("email", "email"),
    ("email_verified", "email_verified"),
    ("datestamp", "datestamp"),
    ("userPoolId", "user_pool_id"),
    ("userName", "user_id"),
];

fn keys(fields: &[(&str, &'static str)]) -> Vec<&'static str> {
    fields.iter().map(|(_, key)| *key).collect()
}

/// GET|POST /getUsers
async fn get_users<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = state.db.select("getUsers", &Default::default()).await?;
    Ok(Json(rows))
}

/// GET|POST /createUser - returns the new user id
async fn create_user<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    FormFields(form): FormFields,
) -> Result<Json<u64>, ApiError> {
    let data = form_context(&form, CREATE_USER_FIELDS);
    validate_required(&data, &keys(CREATE_USER_FIELDS))?;

    let id = state.db.insert("createUser", &data).await?;
    tracing::info!(user_id = id, "Created user");
    Ok(Json(id))
}

/// POST /cognitoUserToRDS - mirror a Cognito sign-up into the users table
async fn cognito_user_to_rds<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    FormFields(form): FormFields,
) -> Result<Json<u64>, ApiError> {
    let data = form_context(&form, COGNITO_USER_FIELDS);
    validate_required(&data, &keys(COGNITO_USER_FIELDS))?;

    let id = state.db.insert("cognitoUserToRDS", &data).await?;
    Ok(Json(id))
}

pub fn router<C: Connector>() -> Router<Arc<AppState<C>>> {
    Router::new()
        .route("/getUsers", get(get_users::<C>).post(get_users::<C>))
        .route("/createUser", get(create_user::<C>).post(create_user::<C>))
        .route("/cognitoUserToRDS", post(cognito_user_to_rds::<C>))
}
