//! HTTP request routing.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::{Method, Request};
use microlytics_config::Auth;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::database::Sharded;
use crate::enrich::Enricher;

use super::auth;
use super::error::RequestError;
use super::params;
use super::post::{PostAnalytic, PostAnalytics};
use super::response::{render, render_empty, render_error, render_not_found, HttpResponse};

/// Shared request handling state.
pub struct App {
    pub driver: Arc<Sharded>,
    pub auth: Option<Auth>,
    pub enricher: Enricher,
}

/// Entry point per request: buffer the body, dispatch, render errors.
pub async fn handle(app: Arc<App>, request: Request<Incoming>) -> HttpResponse {
    let (parts, body) = request.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return render_error(&RequestError::Internal),
    };

    match route(&app, &parts, body).await {
        Ok(response) => response,
        Err(err) => render_error(&err),
    }
}

async fn route(app: &App, parts: &Parts, body: Bytes) -> Result<HttpResponse, RequestError> {
    auth::check(&app.auth, header(parts, "authorization"))?;

    let url = request_url(parts)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match (&parts.method, segments.as_slice()) {
        (&Method::GET, []) => Ok(render(&json!({
            "message": "Welcome to microlytics!"
        }))),

        (&Method::GET, [db]) => {
            validate_db_name(db)?;
            let request = params::parse(db, &url)?;

            Ok(render(&app.driver.query(&request).await?))
        }

        (&Method::GET, [db, "count"]) => {
            validate_db_name(db)?;
            let request = params::parse(db, &url)?;

            Ok(render(&app.driver.count(&request).await?))
        }

        (&Method::GET, [db, "time"]) => {
            validate_db_name(db)?;
            let request = params::parse(db, &url)?;

            Ok(render(&app.driver.series(&request).await?))
        }

        (&Method::GET, [db, property]) => {
            validate_db_name(db)?;
            let mut request = params::parse(db, &url)?;
            request.property = Some(params::property_from(property)?);

            Ok(render(&app.driver.group_by(&request).await?))
        }

        (&Method::POST, [db]) => {
            validate_db_name(db)?;
            let post: PostAnalytic =
                serde_json::from_slice(&body).map_err(|_| RequestError::InvalidJson)?;
            let analytic = post.into_analytic(&app.enricher)?;

            app.driver.insert(db, analytic).await?;
            debug!("inserted event into {}", db);

            Ok(render_empty())
        }

        (&Method::POST, [db, "bulk"]) => {
            validate_db_name(db)?;
            let post: PostAnalytics =
                serde_json::from_slice(&body).map_err(|_| RequestError::InvalidJson)?;

            let mut analytics = Vec::with_capacity(post.list.len());
            for entry in post.list {
                analytics.push(entry.into_analytic(&app.enricher)?);
            }

            app.driver.bulk_insert(db, analytics).await?;
            Ok(render_empty())
        }

        (&Method::DELETE, [db]) => {
            validate_db_name(db)?;
            app.driver.delete(db).await?;
            debug!("deleted database {}", db);

            Ok(render_empty())
        }

        _ => Ok(render_not_found()),
    }
}

/// Tenant names address directories; anything that could escape the
/// root is rejected outright.
fn validate_db_name(db_name: &str) -> Result<(), RequestError> {
    let ok = !db_name.is_empty()
        && db_name != "."
        && db_name != ".."
        && !db_name.contains(['/', '\\', '\0']);

    if ok {
        Ok(())
    } else {
        Err(RequestError::InvalidDatabaseName)
    }
}

/// The request target as an absolute URL; the cache fingerprint is
/// derived from it downstream.
fn request_url(parts: &Parts) -> Result<Url, RequestError> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Url::parse(&format!("http://microlytics{}", path_and_query))
        .map_err(|_| RequestError::Internal)
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|value| value.to_str().ok())
}
