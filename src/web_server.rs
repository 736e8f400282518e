use crate::config::AppConfig;
use crate::error::AppError;
use crate::job::ScanJobs;
use crate::query::QUERY_HELP;
use crate::settings::{save_overrides, SettingsForm, TaggerSettings};
use crate::store::NoteStore;
use crate::sync::{SyncPlan, NO_KEYWORDS_NOTICE};
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    query: String,
}

async fn get_scan(jobs: web::Data<ScanJobs>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(jobs.status()?))
}

async fn start_scan(
    app_config: web::Data<AppConfig>,
    jobs: web::Data<ScanJobs>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    // Only an absent body means "whole collection"; anything unreadable is rejected.
    let request: ScanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScanRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    log::debug!("Received scan request with query: {:?}", request.query);

    // Settings are read fresh so edits saved since startup take effect.
    let config = app_config.reload()?;
    let plan = SyncPlan::new(&request.query, &config.tagger_settings(), config.num_workers)?;

    if plan.matcher.is_empty() {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "skipped",
            "reason": "no_keywords",
            "message": NO_KEYWORDS_NOTICE,
        })));
    }

    let policy = plan.policy.clone();
    jobs.start_with(plan, |status| {
        log::info!("Scan finished: {:?}", status);
    })?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "status": "started",
        "policy": policy,
        "job": jobs.status()?,
    })))
}

async fn get_settings(app_config: web::Data<AppConfig>) -> Result<HttpResponse, AppError> {
    let settings = app_config.reload()?.tagger_settings();
    Ok(HttpResponse::Ok().json(SettingsForm::from(&settings)))
}

async fn put_settings(
    app_config: web::Data<AppConfig>,
    form: web::Json<SettingsForm>,
) -> Result<HttpResponse, AppError> {
    let settings = TaggerSettings::from(form.into_inner());
    save_overrides(&app_config.config_dir, &settings)?;
    Ok(HttpResponse::Ok().json(SettingsForm::from(&settings)))
}

async fn reset_settings(app_config: web::Data<AppConfig>) -> Result<HttpResponse, AppError> {
    let defaults = TaggerSettings::packaged_defaults();
    save_overrides(&app_config.config_dir, &defaults)?;
    Ok(HttpResponse::Ok().json(SettingsForm::from(&defaults)))
}

async fn search_notes(
    jobs: web::Data<ScanJobs>,
    query: web::Query<std::collections::HashMap<String, String>>,
) -> Result<HttpResponse, AppError> {
    let search_query = query.get("q").cloned().unwrap_or_default();
    log::debug!("Received search request: {:?}", search_query);

    let store = jobs.store();
    let ids = if search_query.trim().is_empty() {
        store.all_note_ids().await?
    } else {
        store.find_notes(&search_query).await?
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": ids.len(),
        "ids": ids,
    })))
}

async fn query_help() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(QUERY_HELP)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/scan")
            .route(web::get().to(get_scan))
            .route(web::post().to(start_scan)),
    )
    .service(
        web::resource("/api/settings")
            .route(web::get().to(get_settings))
            .route(web::put().to(put_settings)),
    )
    .service(web::resource("/api/settings/reset").route(web::post().to(reset_settings)))
    .service(web::resource("/api/notes").to(search_notes))
    .service(web::resource("/api/query-help").to(query_help));
}

pub async fn start_web_server(config: Arc<AppConfig>, jobs: ScanJobs) -> std::io::Result<()> {
    let port = config.web_port;
    let config_data = web::Data::from(config);
    let jobs_data = web::Data::new(jobs);

    log::info!("Starting web server on port: {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(jobs_data.clone())
            .configure(routes)
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
}
