// ABOUTME: End-to-end pipeline tests over built-in dealer profiles, discovery and refinement outcomes.
// ABOUTME: Uses stub completion backends and a mock HTTP server for page fetches.

use std::time::Duration;

use async_trait::async_trait;
use autodesc::llm::{LlmRequest, LlmResponse, Usage};
use autodesc::result::DISCOVERED;
use autodesc::{
    load_builtin_registry, Client, CompletionBackend, ErrorCode, PathStep, ProfileRegistry,
    Provider, ProviderError, SearchPath, SiteProfile, Status,
};
use chrono::Utc;
use httpmock::prelude::*;
use pretty_assertions::assert_eq;

const SF_TOYOTA: &str = r#"<!DOCTYPE html>
<html><head><title>Used 2020 Toyota RAV4 | SF Toyota</title></head>
<body>
  <nav><a href="/new">New</a><a href="/used">Used</a><a href="/service">Service</a></nav>
  <div class="vehicle-info"><span>Stock #T1234</span><span>VIN 2T3P1RFV5LC000000</span></div>
  <div class="dealer-comments dealer-comments--square">
    <h3>Dealer Comments</h3>
    <div id="dealer-comments" class="dealer-comments__text">
      <p>This RAV4 LE was traded in by a local owner and has a full service history.</p>
      <p>Apple CarPlay, adaptive cruise control and lane keep assist come standard.</p>
    </div>
  </div>
  <footer>Prices exclude tax, title and license.</footer>
</body></html>"#;

const GREG_HUBLER: &str = r#"<html><body>
  <div id="vehicle-description">
    <div class="description">
      Low mile Escape with a clean title and two keys.<br>
      Introducing the All New Greg Hubler Promise: lifetime powertrain coverage on every vehicle.
    </div>
  </div>
</body></html>"#;

const BERGERON: &str = r#"<html><body>
  <div id="dealernotes1-app-root">
    <div class="title">Dealer Notes</div>
    <div class="content">Jeep Wrangler Sport with the Tow package. Garage kept and never off road.</div>
  </div>
</body></html>"#;

const UNPROFILED: &str = r#"<html><head><title>2018 Ford F-150</title></head><body>
  <header><nav class="main-nav"><ul><li><a href="/new">New</a></li><li><a href="/used">Used</a></li></ul></nav></header>
  <main>
    <h1>2018 Ford F-150 XLT</h1>
    <ul class="specs"><li>Mileage: 41,200</li><li>Engine: 3.5L V6</li></ul>
    <section class="vehicle-overview">
      <h2>Vehicle Description</h2>
      <div class="description-text">
        <p>This F-150 XLT has been locally owned and dealer maintained. It comes with a towing package, new all-terrain tires and a spotless interior.</p>
        <p>Stop by for a test drive today.</p>
      </div>
    </section>
    <div class="disclaimer">Prices do not include tax, title, license and dealer fees. See dealer for details.</div>
  </main>
  <footer class="site-footer">Copyright 2025 Example Motors. All rights reserved.</footer>
</body></html>"#;

fn client() -> Client {
    Client::builder().refine(false).build()
}

#[tokio::test]
async fn sftoyota_profile_extracts_dealer_comments() {
    let result = client()
        .scrape_html(SF_TOYOTA, "https://www.sftoyota.com/used/Toyota/2020-Toyota-RAV4.htm")
        .await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.domain, "sftoyota.com");
    assert_eq!(
        result.description,
        "This RAV4 LE was traded in by a local owner and has a full service history.\n\
         Apple CarPlay, adaptive cruise control and lane keep assist come standard."
    );
    let path = result.selected_path.unwrap();
    assert!(path.contains("dealer-comments__text"), "path was {}", path);
}

#[tokio::test]
async fn greghubler_promise_paragraph_is_removed() {
    let result = client()
        .scrape_html(GREG_HUBLER, "https://greghublerford.com/vdp/55")
        .await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.description, "Low mile Escape with a clean title and two keys.");
}

#[tokio::test]
async fn bergeron_profile_reads_content_div() {
    let result = client()
        .scrape_html(BERGERON, "https://www.bergeronchryslerjeep.com/used/jeep")
        .await;
    assert_eq!(
        result.description,
        "Jeep Wrangler Sport with the Tow package. Garage kept and never off road."
    );
}

#[tokio::test]
async fn unprofiled_site_uses_discovery() {
    let result = client()
        .scrape_html(UNPROFILED, "https://examplemotors.com/inventory/f150")
        .await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.selected_path.as_deref(), Some(DISCOVERED));
    assert!(result.description.contains("locally owned and dealer maintained"));
    assert!(!result.description.contains("Prices do not include"));
    assert!(!result.description.contains("Mileage"));
    let score = result.score.unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[tokio::test]
async fn partially_matching_profile_still_finds_text() {
    let mut registry = ProfileRegistry::new();
    registry.register(SiteProfile::new(
        "examplemotors.com",
        vec![SearchPath::chain(
            vec![
                PathStep::new("section").with_class("vehicle-overview"),
                PathStep::new("div").with_class("renamed-in-redesign"),
            ],
            0.9,
        )],
    ));
    let client = Client::builder().profiles(registry).refine(false).build();
    let result = client
        .scrape_html(UNPROFILED, "https://examplemotors.com/inventory/f150")
        .await;
    assert_eq!(result.status, Status::Success);
    assert!(result.description.contains("locally owned"));
}

#[tokio::test]
async fn proposed_profile_is_used_after_publish() {
    let client = Client::builder().profiles(ProfileRegistry::new()).refine(false).build();
    let report = client
        .determine_search_paths(UNPROFILED, "https://examplemotors.com/inventory/f150")
        .unwrap();
    assert_eq!(report.domain, "examplemotors.com");
    assert!(!report.profiled);

    let before = client.registry().snapshot();
    let profile = report.to_profile(Utc::now()).expect("a specific proposal");
    client.registry().publish(profile);

    assert!(before.lookup("examplemotors.com").is_none());
    assert!(client.registry().snapshot().lookup("examplemotors.com").is_some());

    let result = client
        .scrape_html(UNPROFILED, "https://examplemotors.com/inventory/f150")
        .await;
    assert_eq!(result.status, Status::Success);
    assert_ne!(result.selected_path.as_deref(), Some(DISCOVERED));
    assert!(result.description.contains("locally owned"));
}

#[test]
fn builtin_registry_has_original_dealers() {
    let registry = load_builtin_registry();
    assert_eq!(
        registry.domains(),
        vec!["bergeronchryslerjeep.com", "greghublerford.com", "sftoyota.com"]
    );
    assert!(registry.lookup("https://www.SFToyota.com/used/").is_some());
}

#[tokio::test]
async fn fetched_page_is_scraped() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/inventory/f150");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(UNPROFILED);
        })
        .await;

    let client = Client::builder()
        .allow_private_networks(true)
        .refine(false)
        .build();
    let result = client.scrape_description(&server.url("/inventory/f150")).await;
    assert_eq!(result.status, Status::Success);
    assert!(result.description.contains("locally owned"));
}

#[tokio::test]
async fn missing_page_fails_with_fetch_code() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sold");
            then.status(404);
        })
        .await;

    let client = Client::builder().allow_private_networks(true).build();
    let result = client.scrape_description(&server.url("/sold")).await;
    assert_eq!(result.status, Status::Failed);
    let err = result.error.unwrap();
    assert_eq!(err.code, ErrorCode::Fetch);
    assert!(err.message.contains("page not found"));
}

#[tokio::test]
async fn undecodable_page_is_malformed_input() {
    let mut body = b"<html><body><div class='vehicle-description'>".to_vec();
    for _ in 0..200 {
        body.extend_from_slice(&[0x80, 0xfe, 0xc3, 0x28]);
    }
    body.extend_from_slice(b"</div></body></html>");

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/vdp/garbled");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(&body);
        })
        .await;

    let client = Client::builder()
        .allow_private_networks(true)
        .refine(false)
        .build();
    let result = client.scrape_description(&server.url("/vdp/garbled")).await;
    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.description, "");
    assert_eq!(result.error.unwrap().code, ErrorCode::MalformedInput);
}

#[tokio::test]
async fn page_with_only_short_text_is_not_found() {
    let result = client()
        .scrape_html(
            "<html><body><p>short</p><span>tiny</span></body></html>",
            "https://examplemotors.com/vdp/2",
        )
        .await;
    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::NotFound);
}

#[tokio::test]
async fn private_address_blocked_by_default() {
    let result = client().scrape_description("http://127.0.0.1:9/vdp").await;
    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::InvalidUrl);
}

/// Replies with the text it was sent, reporting five tokens.
struct Echo;

#[async_trait]
impl CompletionBackend for Echo {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn model(&self) -> &str {
        "echo-1"
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            text,
            model: "echo-1".to_string(),
            provider: Provider::Anthropic,
            usage: Some(Usage::new(3, 2)),
            finish_reason: Some("end_turn".to_string()),
        })
    }
}

#[tokio::test]
async fn bare_description_div_is_refined_by_backend() {
    let client = Client::builder()
        .profiles(ProfileRegistry::new())
        .backend(Echo)
        .build();
    let result = client
        .scrape_html(
            r#"<div class="vehicle-description">Great car, one owner.</div>"#,
            "https://onelot.example/vdp/3",
        )
        .await;
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.description, "Great car, one owner.");
    assert_eq!(result.token_count, 5);
    assert_eq!(result.provider, Some(Provider::Anthropic));
    assert!(result.error.is_none());
}

struct Hanging;

#[async_trait]
impl CompletionBackend for Hanging {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        "gpt-4o-mini"
    }

    async fn send(&self, _request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        std::future::pending::<()>().await;
        Err(ProviderError::Cancelled)
    }
}

#[tokio::test(start_paused = true)]
async fn refinement_deadline_returns_partial() {
    let client = Client::builder()
        .backend(Hanging)
        .refine_deadline(Duration::from_secs(5))
        .build();
    let result = client
        .scrape_html(SF_TOYOTA, "https://www.sftoyota.com/used/rav4")
        .await;
    assert_eq!(result.status, Status::Partial);
    assert_eq!(result.provider, Some(Provider::OpenAi));
    assert_eq!(result.token_count, 0);
    assert!(result.description.starts_with("This RAV4 LE"));
    assert_eq!(result.error.unwrap().code, ErrorCode::ProviderTransient);
}

#[tokio::test]
async fn json_result_carries_status_and_path() {
    let result = client()
        .scrape_html(BERGERON, "https://bergeronchryslerjeep.com/vdp/9")
        .await;
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["domain"], "bergeronchryslerjeep.com");
    assert_eq!(json["selected_path"], "div#dealernotes1-app-root div.content");
    assert_eq!(json["token_count"], 0);
    assert!(json["error"].is_null());
}
