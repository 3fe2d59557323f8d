//! Custom Axum extractors

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Form, FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;

/// Request fields from the query string (GET/HEAD), a urlencoded body or a
/// multipart body. File parts are skipped. A body that cannot be read yields
/// no fields, so required-field validation answers with a 400.
pub struct FormFields(pub HashMap<String, String>);

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        let fields = if multipart {
            match Multipart::from_request(req, state).await {
                Ok(multipart) => read_multipart(multipart).await,
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable multipart body");
                    HashMap::new()
                }
            }
        } else {
            match Form::<HashMap<String, String>>::from_request(req, state).await {
                Ok(Form(fields)) => fields,
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable form body");
                    HashMap::new()
                }
            }
        };
        Ok(Self(fields))
    }
}

async fn read_multipart(mut multipart: Multipart) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed multipart body");
                break;
            }
        };
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match field.text().await {
            Ok(value) => {
                fields.insert(name, value);
            }
            Err(e) => {
                tracing::debug!(field = %name, error = %e, "Unreadable multipart field");
                break;
            }
        }
    }
    fields
}
