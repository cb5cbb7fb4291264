// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatcher tests against the JSON promo store, the SQLite contact store
//! and a mock link.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wapulse_campaign::{CampaignContexts, CampaignDispatcher, CampaignPacing};
use wapulse_core::{
    ContactPool, ContactRecord, ContactStore, OutboundPayload, PromoId, TenantId,
    TenantPreferences, WapulseError,
};
use wapulse_storage::{Database, JsonPromoStore, SqliteContactStore};
use wapulse_test_utils::MockLink;

struct Fixture {
    dir: TempDir,
    contacts: Arc<SqliteContactStore>,
    contexts: Arc<CampaignContexts>,
    dispatcher: CampaignDispatcher,
}

fn tenant() -> TenantId {
    TenantId::parse("42").unwrap()
}

async fn fixture(promos: serde_json::Value, delay_ms: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let promos_dir = dir.path().join("user_data");
    let media_dir = dir.path().join("promos");
    std::fs::create_dir_all(promos_dir.join("user_42")).unwrap();
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(
        promos_dir.join("user_42").join("promos.json"),
        serde_json::to_vec(&promos).unwrap(),
    )
    .unwrap();

    let contacts = Arc::new(SqliteContactStore::new(Database::open_in_memory().await.unwrap()));
    let contexts = Arc::new(CampaignContexts::new());
    let dispatcher = CampaignDispatcher::new(
        contacts.clone(),
        Arc::new(JsonPromoStore::new(promos_dir, media_dir)),
        contexts.clone(),
        CampaignPacing {
            delay: Duration::from_millis(delay_ms)..=Duration::from_millis(delay_ms),
            auto_campaign_mode: true,
        },
        "General store",
    );
    Fixture {
        dir,
        contacts,
        contexts,
        dispatcher,
    }
}

fn standard_promos() -> serde_json::Value {
    serde_json::json!([
        {"id": 1, "text": "{Hello} from the shop"},
        {"id": 2, "text": "Look at this", "image": "banner.png"},
        {"id": 3, "text": "", "image": "missing.png"},
        {"id": 4, "text": "Text only", "image": "missing.png"}
    ])
}

async fn save_contact(store: &SqliteContactStore, phone: &str, pool: ContactPool) {
    store
        .upsert_contact(ContactRecord {
            owner: tenant(),
            phone: phone.into(),
            name: None,
            pool,
            last_sent: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn text_promo_is_expanded_and_stamped() {
    let fx = fixture(standard_promos(), 0).await;
    save_contact(&fx.contacts, "15550001", ContactPool::Saved).await;
    let link = MockLink::connected();

    let result = fx
        .dispatcher
        .send_one(&tenant(), link.as_ref(), "15550001", PromoId(1), ContactPool::Saved)
        .await
        .unwrap();

    assert!(result.success);
    let sent = link.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_str(), "15550001@s.whatsapp.net");
    assert_eq!(sent[0].1, OutboundPayload::Text("Hello from the shop".into()));

    let record = fx
        .contacts
        .get_contact(&tenant(), "15550001", ContactPool::Saved)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.last_sent, Some(chrono::Utc::now().date_naive()));
}

#[tokio::test]
async fn resolvable_image_is_sent_with_caption() {
    let fx = fixture(standard_promos(), 0).await;
    std::fs::write(fx.dir.path().join("promos").join("banner.png"), b"png").unwrap();
    let link = MockLink::connected();

    let result = fx
        .dispatcher
        .send_one(&tenant(), link.as_ref(), "15550001", PromoId(2), ContactPool::Imported)
        .await
        .unwrap();

    assert!(result.success);
    match &link.sent()[0].1 {
        OutboundPayload::Image { path, caption } => {
            assert!(path.ends_with("banner.png"));
            assert_eq!(caption, "Look at this");
        }
        other => panic!("expected image payload, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_image_falls_back_to_text() {
    let fx = fixture(standard_promos(), 0).await;
    let link = MockLink::connected();

    fx.dispatcher
        .send_one(&tenant(), link.as_ref(), "15550001", PromoId(4), ContactPool::Saved)
        .await
        .unwrap();

    assert_eq!(link.sent()[0].1, OutboundPayload::Text("Text only".into()));
}

#[tokio::test]
async fn empty_promo_sends_nothing() {
    let fx = fixture(standard_promos(), 0).await;
    let link = MockLink::connected();

    let result = fx
        .dispatcher
        .send_one(&tenant(), link.as_ref(), "15550001", PromoId(3), ContactPool::Saved)
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(link.sent().is_empty());
}

#[tokio::test]
async fn preconditions_are_errors() {
    let fx = fixture(standard_promos(), 0).await;

    let missing = fx
        .dispatcher
        .send_one(&tenant(), MockLink::connected().as_ref(), "1", PromoId(99), ContactPool::Saved)
        .await;
    assert!(matches!(missing, Err(WapulseError::PromoNotFound { .. })));

    let offline = fx
        .dispatcher
        .send_one(&tenant(), MockLink::disconnected().as_ref(), "1", PromoId(1), ContactPool::Saved)
        .await;
    assert!(matches!(offline, Err(WapulseError::NotConnected { .. })));
}

#[tokio::test]
async fn send_failure_is_reported_not_raised() {
    let fx = fixture(standard_promos(), 0).await;
    let link = MockLink::connected();
    link.fail_sends_to(["15550001"]);

    let result = fx
        .dispatcher
        .send_one(&tenant(), link.as_ref(), "15550001", PromoId(1), ContactPool::Saved)
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("mock send failed"));
}

#[tokio::test(start_paused = true)]
async fn sequential_send_paces_between_recipients() {
    let fx = fixture(standard_promos(), 1_000).await;
    let link = MockLink::connected();
    let recipients = vec!["111".to_string(), "222".into(), "333".into()];

    let started = tokio::time::Instant::now();
    let mut run = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), recipients, PromoId(1), ContactPool::Imported)
        .await
        .unwrap();

    let mut phones = Vec::new();
    while let Some(result) = run.recv().await {
        assert!(result.success);
        phones.push(result.phone);
    }
    let summary = run.summary().await.unwrap();

    assert_eq!(phones, vec!["111", "222", "333"]);
    assert_eq!((summary.total, summary.sent, summary.failed), (3, 3, 0));
    assert!(!summary.aborted);
    // Two gaps, no delay after the last send.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2_000));
    assert!(elapsed < Duration::from_millis(3_000));
}

#[tokio::test(start_paused = true)]
async fn sequential_send_aborts_on_disconnect() {
    let fx = fixture(standard_promos(), 500).await;
    let link = MockLink::connected();
    link.disconnect_after_sends(2);
    let recipients: Vec<String> = (1..=5).map(|i| format!("5550{i}")).collect();

    let mut run = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), recipients, PromoId(1), ContactPool::Saved)
        .await
        .unwrap();

    let mut results = Vec::new();
    while let Some(result) = run.recv().await {
        results.push(result);
    }
    let summary = run.summary().await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(summary.aborted);
    assert_eq!(summary.sent, 2);
    assert_eq!(link.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn send_failing_on_lost_session_ends_the_run() {
    let fx = fixture(standard_promos(), 500).await;
    let link = MockLink::connected();
    link.drop_sends_to(["55502"]);
    let recipients: Vec<String> = (1..=4).map(|i| format!("5550{i}")).collect();

    let mut run = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), recipients, PromoId(1), ContactPool::Saved)
        .await
        .unwrap();

    let mut results = Vec::new();
    while let Some(result) = run.recv().await {
        results.push(result);
    }
    let summary = run.summary().await.unwrap();

    let phones: Vec<_> = results.iter().map(|r| r.phone.as_str()).collect();
    assert_eq!(phones, vec!["55501", "55502"]);
    assert!(!results[1].success);
    assert!(summary.aborted);
    assert_eq!((summary.sent, summary.failed), (1, 1));
    assert_eq!(link.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_campaign_per_tenant() {
    let fx = fixture(standard_promos(), 1_000).await;
    let link = MockLink::connected();
    let recipients = vec!["111".to_string(), "222".into()];

    let run = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), recipients.clone(), PromoId(1), ContactPool::Saved)
        .await
        .unwrap();
    let second = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), recipients.clone(), PromoId(1), ContactPool::Saved)
        .await;
    assert!(matches!(second, Err(WapulseError::CampaignAlreadyRunning(_))));

    run.summary().await.unwrap();
    assert!(fx
        .dispatcher
        .send_sequential(&tenant(), link, recipients, PromoId(1), ContactPool::Saved)
        .await
        .is_ok());
}

#[tokio::test]
async fn failed_start_releases_the_tenant() {
    let fx = fixture(standard_promos(), 0).await;
    let link = MockLink::connected();

    let missing = fx
        .dispatcher
        .send_sequential(&tenant(), link.clone(), vec!["1".into()], PromoId(99), ContactPool::Saved)
        .await;
    assert!(matches!(missing, Err(WapulseError::PromoNotFound { .. })));

    assert!(fx
        .dispatcher
        .send_sequential(&tenant(), link, vec!["1".into()], PromoId(1), ContactPool::Saved)
        .await
        .is_ok());
}

#[tokio::test]
async fn campaign_mode_prefers_tenant_prompt() {
    let fx = fixture(standard_promos(), 0).await;

    let ctx = fx
        .dispatcher
        .enter_campaign_mode(&tenant(), PromoId(4))
        .await
        .unwrap();
    assert!(ctx.assistant_prompt.starts_with("General store"));
    assert!(ctx.assistant_prompt.contains("Text only"));

    fx.contacts
        .set_tenant_preferences(
            &tenant(),
            TenantPreferences {
                auto_responder_enabled: true,
                default_prompt: Some("Bike shop in Oran".into()),
            },
        )
        .await
        .unwrap();
    fx.dispatcher
        .enter_campaign_mode(&tenant(), PromoId(1))
        .await
        .unwrap();

    let active = fx.contexts.get(&tenant()).unwrap();
    assert_eq!(active.promo_id, PromoId(1));
    assert!(active.assistant_prompt.starts_with("Bike shop in Oran"));
    assert_eq!(active.promo_text, "{Hello} from the shop");
}
