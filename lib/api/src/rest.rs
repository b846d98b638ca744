use actix_cors::Cors;
use actix_files::NamedFile;
use actix_multipart::form::bytes::Bytes as UploadBytes;
use actix_multipart::form::text::Text;
use actix_multipart::form::{MultipartForm, MultipartFormConfig};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};
use solescope_core::Error;
use solescope_pipeline::PredictionPipeline;
use solescope_storage::{Blob, InventoryUpsert};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Upload extensions accepted by `/predict` and `/add-to-inventory`.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(MultipartForm)]
struct PredictForm {
    #[multipart(limit = "10MB")]
    file: Option<UploadBytes>,
}

#[derive(MultipartForm)]
struct InventoryForm {
    slug: Option<Text<String>>,
    class_name: Option<Text<String>>,
    brand: Option<Text<String>>,
    model: Option<Text<String>>,
    product_name: Option<Text<String>>,
    product_type: Option<Text<String>>,
    quantity: Option<Text<u64>>,
    price_modified: Option<Text<f64>>,
    price_predicted: Option<Text<f64>>,
    reset_quantity: Option<Text<bool>>,
    #[multipart(limit = "10MB")]
    image: Option<UploadBytes>,
}

#[derive(Deserialize)]
struct RebuildQuery {
    #[serde(default)]
    augment: bool,
}

#[derive(Serialize)]
struct RebuildInfo {
    category: String,
    entries: usize,
    unique_sources: usize,
    augmented: bool,
    built_at: String,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(pipeline: Arc<PredictionPipeline>, port: u16) -> std::io::Result<()> {
        info!(port, "Starting REST API");
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(pipeline.clone()))
                .configure(Self::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    /// Register every route. Expects `web::Data<Arc<PredictionPipeline>>`
    /// in app data.
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.app_data(
            MultipartFormConfig::default()
                .total_limit(2 * UPLOAD_LIMIT)
                .memory_limit(2 * UPLOAD_LIMIT),
        )
        .route("/predict", web::post().to(predict))
        .route("/add-to-inventory", web::post().to(add_to_inventory))
        .route("/inventory", web::get().to(list_inventory))
        .route("/image/{blob_ref}", web::get().to(get_blob))
        .route("/reference/{path:.*}", web::get().to(get_reference))
        .route("/index/{category}/rebuild", web::post().to(rebuild_index));
    }
}

fn error_response(e: &Error) -> HttpResponse {
    let body = serde_json::json!({
        "error": e.to_string(),
        "code": e.code(),
    });
    match e {
        Error::Validation(_) | Error::InvalidCategory(_) | Error::Image(_) => {
            HttpResponse::BadRequest().json(body)
        }
        Error::PathEscape(_) => HttpResponse::Forbidden().json(body),
        Error::NotFound(_) | Error::EmptyCategory(_) => HttpResponse::NotFound().json(body),
        Error::Timeout(_) => HttpResponse::GatewayTimeout().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

fn blocking_failed(e: actix_web::error::BlockingError) -> HttpResponse {
    error_response(&Error::Storage(format!("worker pool: {}", e)))
}

/// Check an upload's name and size. Returns the lowercase extension.
fn validate_upload(upload: &UploadBytes) -> Result<String, Error> {
    if upload.data.is_empty() {
        return Err(Error::Validation("uploaded file is empty".to_string()));
    }
    let name = upload
        .file_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Validation("no file selected".to_string()))?;
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::Validation(format!("unsupported file type: {}", name)));
    }
    Ok(ext)
}

fn content_type_for(upload: &UploadBytes, ext: &str) -> String {
    if let Some(mime) = &upload.content_type {
        if mime.type_() == "image" {
            return mime.essence_str().to_string();
        }
    }
    match ext {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
    .to_string()
}

/// Trimmed text field, with blank treated as absent.
fn text(field: Option<Text<String>>) -> Option<String> {
    field
        .map(|t| t.into_inner().trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn predict(
    pipeline: web::Data<Arc<PredictionPipeline>>,
    MultipartForm(form): MultipartForm<PredictForm>,
) -> ActixResult<HttpResponse> {
    let upload = match form.file {
        Some(upload) => upload,
        None => {
            return Ok(error_response(&Error::Validation(
                "no file part in request".to_string(),
            )))
        }
    };
    if let Err(e) = validate_upload(&upload) {
        return Ok(error_response(&e));
    }

    let pipeline = pipeline.get_ref().clone();
    let result = web::block(move || {
        let image = image::load_from_memory(&upload.data)?;
        pipeline.predict(&image)
    })
    .await;

    match result {
        Ok(Ok(response)) => Ok(HttpResponse::Ok().json(response)),
        Ok(Err(e)) => {
            warn!(code = e.code(), error = %e, "Prediction failed");
            Ok(error_response(&e))
        }
        Err(e) => Ok(blocking_failed(e)),
    }
}

async fn add_to_inventory(
    pipeline: web::Data<Arc<PredictionPipeline>>,
    MultipartForm(form): MultipartForm<InventoryForm>,
) -> ActixResult<HttpResponse> {
    let slug = match text(form.slug) {
        Some(slug) => slug,
        None => return Ok(error_response(&Error::Validation("slug is required".to_string()))),
    };

    let image = match form.image {
        Some(upload) if !upload.data.is_empty() => match validate_upload(&upload) {
            Ok(ext) => Some(Blob {
                content_type: content_type_for(&upload, &ext),
                bytes: upload.data.to_vec(),
            }),
            Err(e) => return Ok(error_response(&e)),
        },
        _ => None,
    };

    let request = InventoryUpsert {
        slug,
        category_label: text(form.class_name),
        brand: text(form.brand),
        model: text(form.model),
        product_name: text(form.product_name),
        product_type: text(form.product_type),
        quantity: form.quantity.map(Text::into_inner).unwrap_or(1),
        price_predicted: form.price_predicted.map(Text::into_inner),
        price_modified: form.price_modified.map(Text::into_inner),
        reset_quantity: form.reset_quantity.map(Text::into_inner).unwrap_or(false),
        image,
    };

    let inventory = pipeline.inventory().clone();
    match web::block(move || inventory.upsert(request)).await {
        Ok(Ok(outcome)) => Ok(HttpResponse::Ok().json(outcome)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failed(e)),
    }
}

async fn list_inventory(
    pipeline: web::Data<Arc<PredictionPipeline>>,
) -> ActixResult<HttpResponse> {
    let inventory = pipeline.inventory().clone();
    match web::block(move || inventory.list()).await {
        Ok(Ok(records)) => Ok(HttpResponse::Ok().json(records)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failed(e)),
    }
}

async fn get_blob(
    pipeline: web::Data<Arc<PredictionPipeline>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let blob_ref = path.into_inner();
    let inventory = pipeline.inventory().clone();
    match web::block(move || inventory.blob(&blob_ref)).await {
        Ok(Ok(blob)) => Ok(HttpResponse::Ok()
            .content_type(blob.content_type)
            .body(blob.bytes)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failed(e)),
    }
}

async fn get_reference(
    req: HttpRequest,
    pipeline: web::Data<Arc<PredictionPipeline>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let relative = path.into_inner();
    match pipeline.cache().library().resolve(&relative) {
        Ok(file) => Ok(NamedFile::open(file)?.into_response(&req)),
        Err(e) => {
            if matches!(e, Error::PathEscape(_)) {
                warn!(path = %relative, "Rejected reference path outside the root");
            }
            Ok(error_response(&e))
        }
    }
}

async fn rebuild_index(
    pipeline: web::Data<Arc<PredictionPipeline>>,
    path: web::Path<String>,
    query: web::Query<RebuildQuery>,
) -> ActixResult<HttpResponse> {
    let category = path.into_inner();
    let augment = query.augment;
    let cache = pipeline.cache().clone();

    match web::block(move || cache.get_with(&category, true, augment)).await {
        Ok(Ok(index)) => Ok(HttpResponse::Ok().json(RebuildInfo {
            category: index.category().to_string(),
            entries: index.len(),
            unique_sources: index.unique_sources(),
            augmented: index.is_augmented(),
            built_at: index.built_at().to_rfc3339(),
        })),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failed(e)),
    }
}
