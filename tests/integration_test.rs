// Integration tests for SoleScope
use actix_web::{http::StatusCode, test, web, App};
use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::Mutex;
use solescope::prelude::*;
use solescope_pipeline::{DecisionAction, DecisionStatus, GateConfidence, Stage};
use solescope_storage::{CatalogRow, UpsertStatus};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::TempDir;

/// Embeds an image as its mean color and answers the gate with a fixed
/// positive mass.
struct FakeEncoder {
    sneaker_mass: f32,
    embed_delay: Duration,
    embeds: AtomicUsize,
}

impl FakeEncoder {
    fn new(sneaker_mass: f32) -> Self {
        Self {
            sneaker_mass,
            embed_delay: Duration::ZERO,
            embeds: AtomicUsize::new(0),
        }
    }
}

impl ImageEncoder for FakeEncoder {
    fn embed(&self, image: &DynamicImage) -> Result<Vector> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        if !self.embed_delay.is_zero() {
            std::thread::sleep(self.embed_delay);
        }
        let rgb = image.to_rgb8();
        let n = (rgb.width() * rgb.height()).max(1) as f32;
        let mut acc = [0.0f32; 3];
        for px in rgb.pixels() {
            for c in 0..3 {
                acc[c] += px[c] as f32 + 1.0;
            }
        }
        Ok(Vector::new(acc.iter().map(|a| a / n).collect()))
    }

    fn compare_texts(&self, _image: &DynamicImage, prompts: &[&str]) -> Result<Vec<f32>> {
        let mut probs = vec![self.sneaker_mass / 4.0; 4];
        let rest = prompts.len() - 4;
        probs.extend(std::iter::repeat((1.0 - self.sneaker_mass) / rest as f32).take(rest));
        Ok(probs)
    }
}

struct FakeClassifier(Mutex<Result<Classification>>);

impl FakeClassifier {
    fn returning(category: &str, confidence: f32) -> Self {
        Self(Mutex::new(Ok(Classification {
            category_label: category.to_string(),
            confidence,
            brand_guess: None,
            model_guess: None,
        })))
    }
}

impl ImageClassifier for FakeClassifier {
    fn classify(&self, _image: &DynamicImage) -> Result<Classification> {
        self.0.lock().clone()
    }
}

struct FakeRegressor {
    seen: Mutex<Vec<FeatureRow>>,
}

impl PriceRegressor for FakeRegressor {
    fn predict(&self, features: &FeatureRow) -> Result<f64> {
        self.seen.lock().push(features.clone());
        Ok(123.456)
    }
}

fn write_image(path: &Path, color: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(16, 16, Rgb(color)).save(path).unwrap();
}

fn solid(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(color)))
}

fn catalog() -> JsonCatalog {
    let rows: Vec<CatalogRow> = serde_json::from_value(serde_json::json!([
        {"slug": "samba-og-white", "class_name": "adidas_samba", "title": "Samba OG Cloud White",
         "brand": "adidas", "silhouette": "Samba", "retail_price_usd": 100.0,
         "lowest_price_usd": 85.0, "release_date": "4/8/2022",
         "product_url": "https://example.com/samba-og-white"},
        {"slug": "samba-og-black", "class_name": "adidas_samba", "title": "Samba OG Core Black",
         "brand": "adidas", "silhouette": "Samba", "retail_price_usd": 100.0,
         "release_date": "2021-01-15"}
    ]))
    .unwrap();
    JsonCatalog::from_rows(rows)
}

struct Fixture {
    _reference: TempDir,
    _data: TempDir,
    encoder: Arc<FakeEncoder>,
    regressor: Arc<FakeRegressor>,
    pipeline: Arc<PredictionPipeline>,
}

impl Fixture {
    fn new(encoder: FakeEncoder, classifier: FakeClassifier, config: PipelineConfig) -> Self {
        let reference = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_image(
            &reference.path().join("adidas_samba/samba-og-white/1.png"),
            [240, 240, 240],
        );
        write_image(
            &reference.path().join("adidas_samba/samba-og-white/2.png"),
            [230, 230, 225],
        );
        write_image(
            &reference.path().join("adidas_samba/samba-og-black/1.png"),
            [20, 20, 90],
        );

        let encoder = Arc::new(encoder);
        let regressor = Arc::new(FakeRegressor {
            seen: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(IndexCache::new(
            SnapshotStore::new(data.path().join("snapshots")).unwrap(),
            ReferenceLibrary::open(reference.path()).unwrap(),
            encoder.clone(),
            CacheOptions::default(),
        ));
        let inventory = Arc::new(InventoryStore::open(data.path().join("lmdb")).unwrap());

        let pipeline = PredictionPipeline::new(
            PipelineServices {
                encoder: encoder.clone(),
                classifier: Arc::new(classifier),
                regressor: regressor.clone(),
                catalog: Arc::new(catalog()),
                cache,
                inventory,
            },
            config,
        )
        .unwrap();

        Self {
            _reference: reference,
            _data: data,
            encoder,
            regressor,
            pipeline: Arc::new(pipeline),
        }
    }

    fn standard() -> Self {
        Self::new(
            FakeEncoder::new(0.9),
            FakeClassifier::returning("adidas_samba", 0.93),
            PipelineConfig {
                query_augmentation: false,
                ..Default::default()
            },
        )
    }
}

fn empty_cache(reference: &Path, data: &Path, encoder: Arc<FakeEncoder>) -> IndexCache {
    IndexCache::new(
        SnapshotStore::new(data).unwrap(),
        ReferenceLibrary::open(reference).unwrap(),
        encoder,
        CacheOptions::default(),
    )
}

#[::core::prelude::v1::test]
fn test_ranker_dedupes_sorts_and_truncates() {
    let raw = vec![
        ("A".to_string(), 0.9),
        ("B".to_string(), 0.8),
        ("A".to_string(), 0.95),
        ("C".to_string(), 0.7),
    ];
    let ranked = SimilarityRanker::new().rank(raw, 2);
    assert_eq!(ranked, vec![("A".to_string(), 0.95), ("B".to_string(), 0.8)]);
    assert_eq!(SimilarityRanker::new().rank(ranked.clone(), 2), ranked);
}

#[::core::prelude::v1::test]
fn test_gate_threshold_boundary() {
    let gate = GateDecisionEngine::new(Arc::new(FakeEncoder::new(0.0)), 0.741);
    assert!(gate.decide(0.741).is_sneaker);
    assert!(!gate.decide(0.740).is_sneaker);
}

#[::core::prelude::v1::test]
fn test_inventory_accumulates_and_merges() {
    let dir = TempDir::new().unwrap();
    let store = InventoryStore::open(dir.path()).unwrap();

    let first = store
        .upsert(InventoryUpsert {
            slug: "samba-og-white".to_string(),
            quantity: 1,
            price_predicted: Some(120.0),
            ..Default::default()
        })
        .unwrap();
    let second = store
        .upsert(InventoryUpsert {
            slug: "samba-og-white".to_string(),
            quantity: 1,
            price_modified: Some(110.0),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(
        [first.status, second.status],
        [UpsertStatus::Inserted, UpsertStatus::Updated]
    );
    assert_eq!(second.quantity, 2);
    let record = store.get("samba-og-white").unwrap().unwrap();
    assert_eq!(record.price_predicted, Some(120.0));
    assert_eq!(record.price_modified, Some(110.0));
}

#[::core::prelude::v1::test]
fn test_empty_category_then_retry_succeeds() {
    let reference = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let cache = empty_cache(reference.path(), data.path(), Arc::new(FakeEncoder::new(0.9)));

    let err = cache.get("nike_dunk").unwrap_err();
    assert_eq!(err, Error::EmptyCategory("nike_dunk".to_string()));
    assert!(cache.cached("nike_dunk").is_none());
    assert!(std::fs::read_dir(data.path()).unwrap().next().is_none());

    write_image(&reference.path().join("nike_dunk/panda/1.png"), [0, 0, 0]);
    write_image(&reference.path().join("nike_dunk/panda/2.png"), [255, 255, 255]);
    let index = cache.get("nike_dunk").unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(cache.build_count(), 2);
}

#[::core::prelude::v1::test]
fn test_concurrent_misses_build_once() {
    let reference = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    for i in 0..4u8 {
        write_image(
            &reference.path().join(format!("nike_dunk/panda/{}.png", i)),
            [i * 40, 10, 200],
        );
    }
    let encoder = Arc::new(FakeEncoder {
        embed_delay: Duration::from_millis(25),
        ..FakeEncoder::new(0.9)
    });
    let cache = Arc::new(empty_cache(reference.path(), data.path(), encoder.clone()));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                cache.get("nike_dunk").unwrap()
            })
        })
        .collect();
    let indices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(cache.build_count(), 1);
    assert_eq!(encoder.embeds.load(Ordering::SeqCst), 4);
    assert!(indices.iter().all(|i| Arc::ptr_eq(i, &indices[0])));
}

#[::core::prelude::v1::test]
fn test_index_invariants_and_rebuild_cardinality() {
    let reference = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_image(&reference.path().join("nike_dunk/panda/1.png"), [3, 4, 0]);
    write_image(&reference.path().join("nike_dunk/panda/2.png"), [200, 10, 90]);
    write_image(&reference.path().join("nike_dunk/grey/1.png"), [120, 120, 120]);
    let cache = empty_cache(reference.path(), data.path(), Arc::new(FakeEncoder::new(0.9)));

    let first = cache.get("nike_dunk").unwrap();
    assert_eq!(first.len(), first.source_refs().len());
    for row in first.vectors() {
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-5);
    }

    let rebuilt = cache.get_with("nike_dunk", true, false).unwrap();
    assert_eq!(rebuilt.len(), first.len());
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert!(Arc::ptr_eq(&rebuilt, &cache.get("nike_dunk").unwrap()));
}

#[::core::prelude::v1::test]
fn test_pipeline_completes_with_all_stages() {
    let fixture = Fixture::standard();
    let response = fixture.pipeline.predict(&solid([235, 235, 235])).unwrap();
    let completed = response.completed().expect("completed prediction");

    assert!(completed.gate.is_sneaker);
    assert_eq!(completed.gate.confidence, GateConfidence::High);
    assert_eq!(completed.classification.category_label, "adidas_samba");
    assert_eq!(completed.classification.brand, "Adidas");

    let similar = completed.similar.ok().expect("search succeeded");
    assert_eq!(similar.len(), 3);
    assert_eq!(similar[0].slug.as_deref(), Some("samba-og-white"));
    assert_eq!(similar[0].category.as_deref(), Some("adidas_samba"));
    assert!(similar.windows(2).all(|w| w[0].score >= w[1].score));

    let price = completed.price.ok().expect("pricing succeeded");
    assert_eq!(price.slug_used, "samba-og-black");
    assert_eq!(price.predicted_price, 123.46);
    assert!(price.features.release_age_years.is_some());
    assert_eq!(fixture.regressor.seen.lock().len(), 1);

    assert_eq!(completed.product.brand, "adidas");
    assert_eq!(completed.product.model, "Samba");
    assert_eq!(
        completed.product.product_name.as_deref(),
        Some("Samba OG Cloud White")
    );

    assert_eq!(completed.inventory.ok().map(|s| s.exists), Some(false));
    assert_eq!(completed.decision.status, DecisionStatus::Ok);
    assert_eq!(completed.decision.decision, DecisionAction::Continue);
}

#[::core::prelude::v1::test]
fn test_pipeline_rejects_non_sneakers() {
    let fixture = Fixture::new(
        FakeEncoder::new(0.2),
        FakeClassifier::returning("adidas_samba", 0.93),
        PipelineConfig::default(),
    );
    let response = fixture.pipeline.predict(&solid([10, 200, 10])).unwrap();
    assert!(response.completed().is_none());
    assert!(!response.gate().is_sneaker);
    assert_eq!(response.gate().confidence, GateConfidence::High);
    assert_eq!(fixture.encoder.embeds.load(Ordering::SeqCst), 0);
    assert_eq!(
        serde_json::to_value(&response).unwrap()["state"],
        serde_json::json!("rejected")
    );
}

#[::core::prelude::v1::test]
fn test_pipeline_soft_failures_still_complete() {
    let fixture = Fixture::new(
        FakeEncoder::new(0.9),
        FakeClassifier::returning("nike_dunk", 0.44),
        PipelineConfig::default(),
    );
    let response = fixture.pipeline.predict(&solid([10, 10, 10])).unwrap();
    let completed = response.completed().unwrap();

    let search = completed.similar.failure().expect("search failed softly");
    assert_eq!(search.code, "empty_category");
    let price = completed.price.failure().expect("pricing failed softly");
    assert_eq!(price.code, "not_found");
    assert!(matches!(completed.inventory, Stage::Ok(_)));

    assert_eq!(completed.product.brand, "Nike");
    assert_eq!(completed.product.model, "Dunk");
    assert_eq!(completed.decision.status, DecisionStatus::LowConfidence);
    assert_eq!(completed.decision.decision, DecisionAction::ManualCheck);
}

#[::core::prelude::v1::test]
fn test_pipeline_classifier_timeout_is_fatal() {
    let classifier = FakeClassifier::returning("adidas_samba", 0.9);
    *classifier.0.lock() = Err(Error::Timeout("classify".to_string()));
    let fixture = Fixture::new(FakeEncoder::new(0.9), classifier, PipelineConfig::default());
    let err = fixture.pipeline.predict(&solid([1, 2, 3])).unwrap_err();
    assert_eq!(err.code(), "timeout");
}

#[::core::prelude::v1::test]
fn test_pipeline_widens_search_over_augmented_index() {
    let fixture = Fixture::new(
        FakeEncoder::new(0.9),
        FakeClassifier::returning("adidas_samba", 0.93),
        PipelineConfig {
            top_k: 3,
            query_augmentation: false,
            index_augmentation: true,
            ..Default::default()
        },
    );
    let response = fixture.pipeline.predict(&solid([240, 240, 240])).unwrap();
    let similar = response.completed().unwrap().similar.ok().unwrap().clone();

    let index = fixture.pipeline.cache().cached("adidas_samba").unwrap();
    assert!(index.is_augmented());
    assert_eq!(index.len(), 15);
    assert_eq!(index.unique_sources(), 3);

    let mut paths: Vec<&str> = similar.iter().map(|item| item.path.as_str()).collect();
    assert_eq!(paths.len(), 3);
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3);
    assert!(similar.windows(2).all(|w| w[0].score >= w[1].score));
}

#[::core::prelude::v1::test]
fn test_pipeline_reports_inventory_for_category() {
    let fixture = Fixture::standard();
    fixture
        .pipeline
        .inventory()
        .upsert(InventoryUpsert {
            slug: "samba-og-white".to_string(),
            category_label: Some("adidas_samba".to_string()),
            quantity: 4,
            ..Default::default()
        })
        .unwrap();
    let response = fixture.pipeline.predict(&solid([235, 235, 235])).unwrap();
    let snapshot = response.completed().unwrap().inventory.ok().unwrap().clone();
    assert!(snapshot.exists);
    assert_eq!(snapshot.record.unwrap().quantity, 4);
}

#[::core::prelude::v1::test]
fn test_query_augmentation_mean_is_not_renormalized() {
    let fixture = Fixture::new(
        FakeEncoder::new(0.9),
        FakeClassifier::returning("adidas_samba", 0.9),
        PipelineConfig::default(),
    );
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
        Rgb([(x * 8) as u8, (y * 8) as u8, 90])
    }));
    let query = fixture.pipeline.query_embedding(&image).unwrap();
    assert_eq!(query.dim(), 3);
    assert!(query.norm() <= 1.0 + 1e-5);
    assert_eq!(fixture.encoder.embeds.load(Ordering::SeqCst), 6);
}

fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    solid(color)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

const BOUNDARY: &str = "solescope-test-boundary";

fn multipart_content_type() -> (&'static str, String) {
    (
        "content-type",
        format!("multipart/form-data; boundary={}", BOUNDARY),
    )
}

#[actix_web::test]
async fn test_http_predict_and_validation() {
    let fixture = Fixture::standard();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fixture.pipeline.clone()))
            .configure(RestApi::configure),
    )
    .await;

    let png = png_bytes([235, 235, 235]);
    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(BOUNDARY, &[("file", Some("shoe.png"), &png)]))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "completed");
    assert_eq!(body["decision"]["status"], "ok");
    assert_eq!(body["price"]["ok"]["predicted_price"], 123.46);

    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(BOUNDARY, &[("file", Some("shoe.gif"), &png)]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(BOUNDARY, &[("other", None, b"x")]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "validation");
}

#[actix_web::test]
async fn test_http_inventory_roundtrip() {
    let fixture = Fixture::standard();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fixture.pipeline.clone()))
            .configure(RestApi::configure),
    )
    .await;

    let png = png_bytes([1, 2, 3]);
    for expected in ["inserted", "updated"] {
        let req = test::TestRequest::post()
            .uri("/add-to-inventory")
            .insert_header(multipart_content_type())
            .set_payload(multipart_body(
                BOUNDARY,
                &[
                    ("slug", None, b"samba-og-white"),
                    ("class_name", None, b"adidas_samba"),
                    ("model", None, b"Samba"),
                    ("image", Some("shoe.png"), &png),
                ],
            ))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], expected);
    }

    let req = test::TestRequest::get().uri("/inventory").to_request();
    let records: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(records[0]["quantity"], 2);
    assert_eq!(records[0]["product_name"], "Samba");

    let blob_ref = records[0]["image_blob_ref"].as_str().unwrap().to_string();
    let req = test::TestRequest::get()
        .uri(&format!("/image/{}", blob_ref))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.as_ref(), png.as_slice());

    let req = test::TestRequest::post()
        .uri("/add-to-inventory")
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(BOUNDARY, &[("quantity", None, b"1")]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_http_reference_serving_stays_in_root() {
    let fixture = Fixture::standard();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fixture.pipeline.clone()))
            .configure(RestApi::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/reference/adidas_samba/samba-og-white/1.png")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/reference/adidas_samba/../../outside.png")
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::get()
        .uri("/reference/adidas_samba/missing.png")
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn test_http_rebuild_index() {
    let fixture = Fixture::standard();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fixture.pipeline.clone()))
            .configure(RestApi::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/index/adidas_samba/rebuild?augment=true")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["unique_sources"], 3);
    assert_eq!(body["entries"], 15);
    assert_eq!(body["augmented"], true);

    let req = test::TestRequest::post()
        .uri("/index/nike_dunk/rebuild")
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}
