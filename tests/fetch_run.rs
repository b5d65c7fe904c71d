mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use common::{config, orchestrator, Method, MockTransport};
use wxrecall::config::FetchPolicy;
use wxrecall::models::{
    ItemPayload, ItemStatus, RunState, SessionEntry, SiteRecord, SiteRequest, SiteResult,
};
use wxrecall::session::SessionAggregator;

fn record<'a>(entry: &'a SessionEntry, site: &str) -> &'a SiteRecord {
    entry.data[site]
        .record()
        .unwrap_or_else(|| panic!("{} should have a record", site))
}

fn error_of(payload: &ItemPayload) -> String {
    match payload {
        ItemPayload::Error { error } => error.clone(),
        ItemPayload::Data(data) => panic!("expected an error payload, got {}", data),
    }
}

#[tokio::test]
async fn test_metar_ok_taf_not_found() {
    let transport = MockTransport::new();
    transport.on_get_json(
        &["site=CYYT", "alpha=metar"],
        json!({"data": [{"raw": "METAR CYYT 011230Z 27015KT 15SM FEW030 12/04 A2992"}]}),
    );
    let config = config(&["CYYT"], &["metar", "taf"], &[]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let cyyt = record(&entry, "CYYT");
    assert_eq!(cyyt.gfa_region.as_deref(), Some("GFACN34"));
    assert!(!cyyt.alpha_data["metar"].is_error());
    assert_eq!(
        cyyt.alpha_data["taf"],
        ItemPayload::error("HTTP 404: Not Found")
    );
    assert_eq!(cyyt.fetch_summary.total_requests, 2);
    assert_eq!(cyyt.fetch_summary.successful_requests, 1);
    assert_eq!(cyyt.fetch_summary.failed_requests, 1);
    assert_eq!(cyyt.fetch_summary.data_points, 1);
    assert!(entry.has_errors());
    assert_eq!(orchestrator.status().state, RunState::CompletedWithErrors);

    // the relay wraps the encoded upstream url
    let gets = transport.urls(Method::Get);
    assert_eq!(gets.len(), 2);
    assert!(gets[0].starts_with("https://corsproxy.io/?https://plan.navcanada.ca/weather/api/alpha/?site=CYYT&alpha=metar&notam_choice=default&_="));
}

#[tokio::test]
async fn test_repeated_type_codes_are_fetched_once() {
    let transport = MockTransport::new();
    transport.on_get_json(&["alpha=metar"], json!({"data": [{"raw": "METAR"}]}));
    let config = config(&["CYYT"], &[], &[]);
    let orchestrator = orchestrator(&transport, &config);

    let requests = vec![SiteRequest {
        icao: "cyyt".to_string(),
        alpha_types: vec!["metar".to_string(), "METAR".to_string()],
        image_types: vec![],
    }];
    let entry = orchestrator.run(&requests).await;

    let cyyt = record(&entry, "CYYT");
    assert_eq!(cyyt.items.len(), 1);
    assert_eq!(cyyt.alpha_data.len(), 1);
    assert_eq!(cyyt.fetch_summary.total_requests, 1);
    assert_eq!(cyyt.fetch_summary.successful_requests, 1);
    assert_eq!(transport.urls(Method::Get).len(), 1);
}

#[tokio::test]
async fn test_every_item_gets_one_terminal_outcome() {
    let transport = MockTransport::new();
    transport.on_get_json(&["alpha=metar"], json!({"data": [{"raw": "METAR"}]}));
    transport.on_get_network_error(&["alpha=notam"], "connection refused");
    transport.on_get_json(&["image=SIG_WX/HIGH_LEVEL"], json!({"data": [{"text": "{}"}]}));
    let config = config(
        &["CYYT", "CYHZ"],
        &["metar", "taf", "notam", ""],
        &["SIG_WX/HIGH_LEVEL", "RADAR/COMPOSITE"],
    );
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    assert_eq!(entry.sites, vec!["CYYT", "CYHZ"]);
    for site in ["CYYT", "CYHZ"] {
        let rec = record(&entry, site);
        assert_eq!(rec.items.len(), 6);
        assert!(rec.items.iter().all(|item| item.status.is_terminal()));
        assert!(rec.is_finalized());
        assert_eq!(rec.fetch_summary.total_requests, 5);
        assert_eq!(
            rec.fetch_summary.total_requests,
            rec.fetch_summary.successful_requests + rec.fetch_summary.failed_requests
        );
        assert!(rec.fetch_summary.end_time.unwrap() >= rec.fetch_summary.start_time);

        let skipped: Vec<_> = rec
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(
            rec.alpha_data["notam"],
            ItemPayload::error("Network error: connection refused")
        );
    }
}

#[tokio::test]
async fn test_gfa_fourth_query_shape_wins_without_probes() {
    let transport = MockTransport::new();
    transport.on_get_json(
        &["site=CYYT&alpha=gfa&gfa_region=GFACN34"],
        json!({"data": [{"frame_lists": []}]}),
    );
    let config = config(&["CYYT"], &[], &["GFA/CLDWX"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let payload = record(&entry, "CYYT").image_data["GFA/CLDWX"]
        .data()
        .cloned()
        .expect("gfa payload");
    assert_eq!(payload["gfa_pattern_used"], "site=CYYT&alpha=gfa&gfa_region=GFACN34");
    assert_eq!(payload["gfa_region"], "GFACN34");

    let gets = transport.urls(Method::Get);
    assert_eq!(gets.len(), 4);
    assert!(gets[0].contains("site=CYYT&image=GFA/GFACN34/CLDWX&_="));
    assert!(gets[1].contains("site=CYYT&gfa_region=GFACN34&image=GFA/CLDWX&_="));
    assert!(gets[2].contains("?gfa_region=GFACN34&image=GFA/CLDWX&_="));
    assert!(transport.urls(Method::Head).is_empty());
}

#[tokio::test]
async fn test_gfa_direct_probe_hits_second_host_at_006() {
    let transport = MockTransport::new();
    transport.on_head_ok(
        &["https://plan.navcanada.ca/weather/images/gfa/gfacn34_cldwx_006.gif"],
        "image/gif",
    );
    let config = config(&["CYYT"], &[], &["GFA/CLDWX"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let rec = record(&entry, "CYYT");
    let payload = rec.image_data["GFA/CLDWX"].data().cloned().expect("direct set");
    assert_eq!(payload["type"], "direct_gfa_images");
    assert_eq!(payload["gfa_region"], "GFACN34");
    let images = payload["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["period"], "006");
    assert_eq!(
        images[0]["url"],
        "https://plan.navcanada.ca/weather/images/gfa/gfacn34_cldwx_006.gif"
    );
    assert_eq!(images[0]["content_type"], "image/gif");
    assert_eq!(rec.fetch_summary.successful_requests, 1);
    assert_eq!(rec.fetch_summary.data_points, 1);

    // five api shapes, then 3 + 2 + 3 + 3 probes across the four periods
    assert_eq!(transport.urls(Method::Get).len(), 5);
    assert_eq!(transport.urls(Method::Head).len(), 11);
}

#[tokio::test]
async fn test_gfa_with_no_images_counts_as_failure() {
    let transport = MockTransport::new();
    let config = config(&["CYYT"], &[], &["GFA/TURBC"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let rec = record(&entry, "CYYT");
    let error = error_of(&rec.image_data["GFA/TURBC"]);
    assert!(error.starts_with("No imagery found for GFA/TURBC"));
    assert!(error.contains("HTTP 404: Not Found"));
    assert_eq!(rec.fetch_summary.failed_requests, 1);
    assert_eq!(rec.fetch_summary.data_points, 0);
}

#[tokio::test]
async fn test_gfa_for_site_without_region_uses_plain_image_fetch() {
    let transport = MockTransport::new();
    transport.on_get_json(&["site=KJFK", "image=GFA/CLDWX"], json!({"data": [{"text": "{}"}]}));
    let config = config(&["KJFK"], &[], &["GFA/CLDWX"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let rec = record(&entry, "KJFK");
    assert_eq!(rec.gfa_region, None);
    assert!(!rec.image_data["GFA/CLDWX"].is_error());
    assert_eq!(transport.urls(Method::Get).len(), 1);
}

#[tokio::test]
async fn test_satellite_falls_back_to_direct_probe() {
    let transport = MockTransport::new();
    transport.on_get_status(&["image=SATELLITE/IR"], 500, "Internal Server Error");
    transport.on_head_ok(&["https://weather.gc.ca/data/satellite/gfacn34_ir.jpg"], "image/jpeg");
    let config = config(&["CYYT"], &[], &["SATELLITE/IR"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let payload = record(&entry, "CYYT").image_data["SATELLITE/IR"]
        .data()
        .cloned()
        .expect("direct satellite set");
    assert_eq!(payload["type"], "direct_satellite_images");
    assert_eq!(payload["images"][0]["period"], "latest");
    assert_eq!(transport.urls(Method::Head).len(), 1);
}

#[tokio::test]
async fn test_radar_with_empty_api_and_no_probe_hits_fails() {
    let transport = MockTransport::new();
    transport.on_get_json(&["image=RADAR/COMPOSITE"], json!({"data": []}));
    let config = config(&["CYYT"], &[], &["RADAR/COMPOSITE"]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    let rec = record(&entry, "CYYT");
    assert_eq!(
        rec.image_data["RADAR/COMPOSITE"],
        ItemPayload::error("No imagery found for RADAR/COMPOSITE")
    );
    assert_eq!(transport.urls(Method::Head).len(), 2);
}

#[tokio::test]
async fn test_panic_in_one_site_does_not_abort_the_run() {
    let transport = MockTransport::new();
    // rules match in order, so the panic has to come before the generic metar rule
    transport.panic_on_get(&["site=CYQX"], "upstream exploded");
    transport.on_get_json(&["alpha=metar"], json!({"data": [{"raw": "METAR"}]}));
    let config = config(&["CYYT", "CYQX", "CYHZ"], &["metar"], &[]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    assert_eq!(entry.sites, vec!["CYYT", "CYQX", "CYHZ"]);
    assert!(entry.data["CYYT"].record().is_some());
    assert!(entry.data["CYHZ"].record().is_some());
    assert_eq!(
        entry.data["CYQX"],
        SiteResult::Failed {
            site: "CYQX".to_string(),
            error: "upstream exploded".to_string(),
        }
    );

    let stats = entry.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(orchestrator.status().state, RunState::CompletedWithErrors);
}

#[tokio::test]
async fn test_invalid_site_is_a_site_failure() {
    let transport = MockTransport::new();
    let config = config(&["CYYT", "CY1"], &["metar"], &[]);
    let orchestrator = orchestrator(&transport, &config);

    let entry = orchestrator.run(&config.site_requests()).await;

    assert_eq!(
        entry.data["CY1"],
        SiteResult::Failed {
            site: "CY1".to_string(),
            error: "Invalid ICAO code: CY1".to_string(),
        }
    );
    // no request was issued for the bad code
    assert!(transport
        .urls(Method::Get)
        .iter()
        .all(|url| !url.contains("site=CY1&")));
}

#[tokio::test]
async fn test_progress_is_reported_per_site() {
    let transport = MockTransport::new();
    let config = config(&["CYYT", "CYQX", "CYHZ"], &["metar"], &[]);
    let orchestrator = orchestrator(&transport, &config);
    let status = orchestrator.subscribe();

    let mut seen = Vec::new();
    orchestrator
        .run_with_progress(&config.site_requests(), |progress| {
            seen.push((progress.site.clone(), progress.completed, progress.total));
        })
        .await;

    assert_eq!(
        seen,
        vec![
            ("CYYT".to_string(), 1, 3),
            ("CYQX".to_string(), 2, 3),
            ("CYHZ".to_string(), 3, 3),
        ]
    );
    let last = status.borrow().clone();
    assert_eq!(last.progress, 1.0);
    assert!(last.message.starts_with("Completed fetching data for 3 sites"));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_policy_waits_between_items() {
    let transport = MockTransport::new();
    let mut config = config(&["CYYT"], &["metar", "taf"], &[]);
    config.request_delay = 500;
    let orchestrator = orchestrator(&transport, &config);

    let started = Instant::now();
    orchestrator.run(&config.site_requests()).await;

    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_policy_matches_sequential_results() {
    let transport = MockTransport::new();
    transport.on_get_json(&["alpha=metar"], json!({"data": [{"raw": "METAR"}]}));
    let mut config = config(&["CYYT", "CYQX"], &["metar", "taf", "notam"], &[]);
    config.request_delay = 500;
    config.policy = FetchPolicy::Parallel;
    let orchestrator = orchestrator(&transport, &config);

    let started = Instant::now();
    let entry = orchestrator.run(&config.site_requests()).await;

    assert!(started.elapsed() < Duration::from_millis(500));
    for site in ["CYYT", "CYQX"] {
        let rec = record(&entry, site);
        let codes: Vec<_> = rec.items.iter().map(|item| item.type_code.as_str()).collect();
        assert_eq!(codes, vec!["metar", "taf", "notam"]);
        assert_eq!(rec.fetch_summary.successful_requests, 1);
        assert_eq!(rec.fetch_summary.failed_requests, 2);
    }
}

#[tokio::test]
async fn test_clear_resets_session_statistics() {
    let transport = MockTransport::new();
    transport.on_get_json(&["alpha=metar"], json!({"data": [{"raw": "METAR"}]}));
    let config = config(&["CYYT"], &["metar", "taf"], &[]);
    let orchestrator = orchestrator(&transport, &config);
    let mut session = SessionAggregator::new();

    session.record(orchestrator.run(&config.site_requests()).await);
    session.record(orchestrator.run(&config.site_requests()).await);
    assert_eq!(session.stats().total, 4);
    assert_eq!(session.stats().successful, 2);

    session.clear();
    assert!(session.history().is_empty());
    assert_eq!(session.stats().total, 0);
    assert_eq!(session.stats().successful, 0);
    assert_eq!(session.stats().failed, 0);
    assert_eq!(session.stats().data_points, 0);
    assert!(session.stats().response_times.is_empty());
}
