// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concrete [`PlatformScanner`](crate::PlatformScanner) implementations.

use crate::{looks_not_found, PlatformScanner, ScanOutcome};
use async_trait::async_trait;
use rv_browser_pool::Context;
use rv_config::StrategyKind;
use rv_core::{SaleStatus, ScannedData};
use rv_error::{ErrorCode, RvError};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashMap;

/// CSS selectors (or JSON pointer paths, for API back-ends) a scanner uses
/// to pull each field out of a page or response body.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelectors {
    /// Product name selector/path.
    pub product_name: String,
    /// Thumbnail `src`/`url` selector/path.
    pub thumbnail: String,
    /// List price selector/path.
    pub original_price: String,
    /// Sale price selector/path.
    pub discounted_price: String,
    /// Raw sale-status token selector/path.
    pub sale_status: String,
    /// Platform-specific token → canonical [`SaleStatus`] mapping.
    #[serde(default)]
    pub sale_status_map: HashMap<String, SaleStatus>,
}

impl FieldSelectors {
    fn map_sale_status(&self, raw: &str) -> SaleStatus {
        self.sale_status_map
            .get(raw.trim())
            .copied()
            .unwrap_or(SaleStatus::OnSale)
    }
}

fn parse_price(raw: &str) -> i64 {
    raw.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn normalize(mut data: ScannedData) -> ScannedData {
    if data.original_price == 0 && data.discounted_price > 0 {
        data.original_price = data.discounted_price;
    }
    if data.discounted_price > data.original_price {
        data.discounted_price = data.original_price;
    }
    data
}

fn text_of(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next().map(|el| el.text().collect::<String>().trim().to_string())
}

fn attr_of(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next().and_then(|el| el.value().attr(attr)).map(str::to_string)
}

fn extract_from_html(html: &str, selectors: &FieldSelectors) -> Option<ScannedData> {
    let doc = Html::parse_document(html);
    let product_name = text_of(&doc, &selectors.product_name)?;
    let thumbnail = attr_of(&doc, &selectors.thumbnail, "src").unwrap_or_default();
    let original_price = text_of(&doc, &selectors.original_price).map(|s| parse_price(&s)).unwrap_or(0);
    let discounted_price = text_of(&doc, &selectors.discounted_price).map(|s| parse_price(&s)).unwrap_or(original_price);
    let raw_status = text_of(&doc, &selectors.sale_status).unwrap_or_default();
    Some(normalize(ScannedData {
        product_name,
        thumbnail,
        original_price,
        discounted_price,
        sale_status: selectors.map_sale_status(&raw_status),
    }))
}

/// Headless-browser-driven DOM extraction (§4.3, `browser` strategy).
pub struct BrowserScanner {
    selectors: FieldSelectors,
}

impl BrowserScanner {
    /// Build a scanner from its field selector configuration.
    #[must_use]
    pub fn new(selectors: FieldSelectors) -> Self {
        Self { selectors }
    }
}

#[async_trait]
impl PlatformScanner for BrowserScanner {
    fn scan_method(&self) -> StrategyKind {
        StrategyKind::Browser
    }

    async fn scan(&self, url: &str, context: Option<&mut Context>) -> Result<ScanOutcome, RvError> {
        let ctx = context.ok_or_else(|| {
            RvError::new(ErrorCode::BrowserError, "browser scan requires a live context")
        })?;
        ctx.goto(url).await?;
        let final_url = ctx.current_url().await?;
        let html = ctx.html().await?;

        if looks_not_found(None, &html, &final_url, url) {
            return Ok(ScanOutcome::not_found(StrategyKind::Browser));
        }

        match extract_from_html(&html, &self.selectors) {
            Some(data) => Ok(ScanOutcome::found(data, StrategyKind::Browser)),
            None => Err(RvError::new(ErrorCode::ExtractionFailed, "required selectors did not match")
                .with_context("url", url)),
        }
    }
}

/// Plain HTTP request + HTML or JSON response parsing (§4.3, `http`
/// strategy).
pub struct HttpScanner {
    selectors: FieldSelectors,
    client: reqwest::Client,
}

impl HttpScanner {
    /// Build a scanner from its field selector configuration.
    #[must_use]
    pub fn new(selectors: FieldSelectors) -> Self {
        Self {
            selectors,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlatformScanner for HttpScanner {
    fn scan_method(&self) -> StrategyKind {
        StrategyKind::Http
    }

    async fn scan(&self, url: &str, _context: Option<&mut Context>) -> Result<ScanOutcome, RvError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RvError::new(ErrorCode::NetworkError, e.to_string()).with_context("url", url))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| RvError::new(ErrorCode::NetworkError, e.to_string()))?;

        if looks_not_found(Some(status), &body, &final_url, url) {
            return Ok(ScanOutcome::not_found(StrategyKind::Http));
        }
        if !(200..300).contains(&status) {
            return Err(RvError::new(ErrorCode::NetworkError, format!("unexpected status {status}")));
        }

        match extract_from_html(&body, &self.selectors) {
            Some(data) => Ok(ScanOutcome::found(data, StrategyKind::Http)),
            None => Err(RvError::new(ErrorCode::ExtractionFailed, "required selectors did not match")),
        }
    }
}

/// GraphQL request with the query embedded in the strategy options
/// (§4.3, `graphql` strategy).
pub struct GraphQlScanner {
    endpoint: String,
    query: String,
    status_map: HashMap<String, SaleStatus>,
    client: reqwest::Client,
}

impl GraphQlScanner {
    /// Build a scanner targeting `endpoint` with a fixed `query` document.
    /// The product id is interpolated into `variables.id` at call time.
    /// `status_map` maps the platform's raw `status` token onto the
    /// canonical [`SaleStatus`] set, the same role `FieldSelectors::
    /// sale_status_map` plays for the `browser`/`http` strategies.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, query: impl Into<String>, status_map: HashMap<String, SaleStatus>) -> Self {
        Self {
            endpoint: endpoint.into(),
            query: query.into(),
            status_map,
            client: reqwest::Client::new(),
        }
    }

    fn map_sale_status(&self, raw: &str) -> SaleStatus {
        self.status_map.get(raw.trim()).copied().unwrap_or(SaleStatus::OnSale)
    }
}

#[async_trait]
impl PlatformScanner for GraphQlScanner {
    fn scan_method(&self) -> StrategyKind {
        StrategyKind::GraphQl
    }

    async fn scan(&self, url: &str, _context: Option<&mut Context>) -> Result<ScanOutcome, RvError> {
        let body = serde_json::json!({
            "query": self.query,
            "variables": { "url": url },
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RvError::new(ErrorCode::NetworkError, e.to_string()))?;
        let status = resp.status().as_u16();
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RvError::new(ErrorCode::ExtractionFailed, e.to_string()))?;

        let product = json.pointer("/data/product");
        if status == 404 || product.map(serde_json::Value::is_null).unwrap_or(true) {
            return Ok(ScanOutcome::not_found(StrategyKind::GraphQl));
        }
        let product = product.unwrap();

        let name = product.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let thumbnail = product.get("thumbnail").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let original_price = product.get("originalPrice").and_then(|v| v.as_i64()).unwrap_or(0);
        let discounted_price = product.get("discountedPrice").and_then(|v| v.as_i64()).unwrap_or(original_price);
        let raw_status = product.get("status").and_then(|v| v.as_str()).unwrap_or_default();

        Ok(ScanOutcome::found(
            normalize(ScannedData {
                product_name: name,
                thumbnail,
                original_price,
                discounted_price,
                sale_status: self.map_sale_status(raw_status),
            }),
            StrategyKind::GraphQl,
        ))
    }
}
