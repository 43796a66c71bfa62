use super::*;
use axum::http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;

fn scraping_app() -> Router {
    let launcher = ScriptedLauncher::new(vec![
        (url_for("a"), Page::Price(ExtractionResult::regular(dec!(120.00)))),
        (url_for("b"), Page::Timeout),
    ]);
    app_with(service_with(PriceMonitor::new(Arc::new(launcher), no_delay())))
}

fn product_json(id: &str, price: f64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Product {}", id),
        "competitorName": "acme",
        "url": url_for(id),
        "currentPrice": price
    })
}

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let (status, body) = make_request(&scraping_app(), Method::GET, "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_scrape_then_poll_status() -> anyhow::Result<()> {
    let app = scraping_app();
    let request = json!({
        "sessionId": "api-1",
        "products": [product_json("a", 100.0), product_json("b", 50.0)]
    });

    let (status, body) = make_request(&app, Method::POST, "/api/v1/scrape", Some(request)).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["sessionId"], "api-1");
    assert_eq!(body["data"]["updatedProducts"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["priceChanges"][0]["percentageChange"], "20.00");
    assert_eq!(body["meta"]["failed"], 1);

    let (status, session) = make_request(&app, Method::GET, "/api/v1/scrape/api-1/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["complete"]["total"], 2);
    assert_eq!(session["complete"]["updated"], 1);
    assert_eq!(session["progress"]["completed"], 2);
    Ok(())
}

#[tokio::test]
async fn test_scrape_generates_session_id() -> anyhow::Result<()> {
    let request = json!({"products": [product_json("a", 120.0)]});

    let (status, body) = make_request(&scraping_app(), Method::POST, "/api/v1/scrape", Some(request)).await?;

    assert_eq!(status, StatusCode::OK);
    let session_id = body["data"]["sessionId"].as_str().unwrap_or_default();
    assert_eq!(session_id.len(), 36);
    assert_eq!(body["data"]["priceChanges"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_scrape_rejects_invalid_products() -> anyhow::Result<()> {
    let mut invalid = product_json("a", 10.0);
    invalid["name"] = json!("");
    let request = json!({"products": [invalid]});

    let (status, body) = make_request(&scraping_app(), Method::POST, "/api/v1/scrape", Some(request)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_scrape_rejects_negative_price() -> anyhow::Result<()> {
    let request = json!({"products": [product_json("a", -5.0)]});

    let (status, _) = make_request(&scraping_app(), Method::POST, "/api/v1/scrape", Some(request)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_is_unavailable() -> anyhow::Result<()> {
    let app = app_with(service_with(PriceMonitor::new(
        Arc::new(ScriptedLauncher::failing()),
        no_delay(),
    )));
    let request = json!({"sessionId": "api-2", "products": [product_json("a", 10.0)]});

    let (status, body) = make_request(&app, Method::POST, "/api/v1/scrape", Some(request)).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    let (_, session) = make_request(&app, Method::GET, "/api/v1/scrape/api-2/status", None).await?;
    assert!(session["error"].as_str().is_some());
    assert!(session.get("complete").is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_status_is_empty() -> anyhow::Result<()> {
    let (status, body) = make_request(&scraping_app(), Method::GET, "/api/v1/scrape/nope/status", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    Ok(())
}

#[tokio::test]
async fn test_products_passthrough() -> anyhow::Result<()> {
    let catalog = RecordingCatalog {
        products: vec![product("a", dec!(10)), product("b", dec!(20))],
        ..Default::default()
    };
    let monitor = PriceMonitor::new(Arc::new(ScriptedLauncher::new(vec![])), no_delay())
        .with_catalog(Arc::new(catalog));
    let app = app_with(service_with(monitor));

    let (status, body) = make_request(&app, Method::GET, "/api/v1/products", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"][1]["competitorName"], "acme");
    Ok(())
}
