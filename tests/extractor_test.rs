mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use helpers::{FailingEmbedder, Failure, FakeExtractor};
use rapport::memory::episodes::{EpisodeQuery, EpisodeStore};
use rapport::memory::extractor::{EpisodeRequest, SummaryRequest};
use rapport::memory::metrics::MetricsStore;
use rapport::memory::store::MemoryStore;
use rapport::memory::types::{MemoryType, MessageSender, SummaryType};
use rapport::memory::MemoryError;

fn request(partner_id: &str, message_ids: Vec<String>) -> SummaryRequest {
    SummaryRequest {
        partner_id: partner_id.to_string(),
        message_ids,
        summary_type: SummaryType::Daily,
        episode: None,
    }
}

fn work_payload() -> serde_json::Value {
    json!({
        "summary": "Talked about a hard week at the hospital",
        "memories": [
            {"type": "fact", "content": "Works as a nurse", "importance": 8, "emotionalWeight": 3,
             "tags": ["work", "hospital"], "relatedPeople": []},
            {"type": "emotion", "content": "Exhausted after night shifts", "importance": 6, "emotionalWeight": 7,
             "tags": ["work"]},
            {"type": "relationship", "content": "Sister Mika visits on Sundays", "importance": 12,
             "emotionalWeight": -14, "relatedPeople": ["Mika"]}
        ],
        "episodes": [
            {"title": "First solo night shift", "summary": "Nervous but proud", "emotionalWeight": 7,
             "tags": ["work"]}
        ]
    })
}

fn conversation() -> Vec<(MessageSender, &'static str)> {
    vec![
        (MessageSender::User, "I'm a nurse and this week was rough"),
        (MessageSender::Partner, "That sounds exhausting. What happened?"),
        (MessageSender::User, "Night shifts. My sister Mika helps on Sundays"),
    ]
}

#[tokio::test]
async fn empty_message_list_fails_without_calling_extractor() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    let err = service.create_summary(request(&partner.id, vec![])).await.unwrap_err();

    assert!(matches!(err, MemoryError::NotFound(_)));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn missing_partner_is_not_found() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    let err = service.create_summary(request("ghost", ids)).await.unwrap_err();

    assert!(matches!(err, MemoryError::NotFound(_)));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn messages_of_another_partner_are_ignored() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let other = store.create_partner("user-1", "Ren").unwrap();
    let ids = helpers::seed_messages(&store, &other.id, &conversation());
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    let err = service.create_summary(request(&partner.id, ids)).await.unwrap_err();

    assert!(matches!(err, MemoryError::NotFound(_)));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn unknown_message_ids_are_not_found() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    let err = service
        .create_summary(request(&partner.id, vec!["nope".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn transcript_is_chronological_with_speaker_labels() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let mut ids = helpers::seed_messages(&store, &partner.id, &conversation());
    ids.reverse();
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    service.create_summary(request(&partner.id, ids)).await.unwrap();

    assert_eq!(
        extractor.last_transcript().unwrap(),
        "User: I'm a nurse and this week was rough\n\
         Aoi: That sounds exhausting. What happened?\n\
         User: Night shifts. My sister Mika helps on Sundays"
    );
    let instructions = extractor.last_instructions().unwrap();
    assert!(instructions.contains("Partner name: Aoi"));
    assert!(instructions.contains("Summary type: daily"));
}

#[tokio::test]
async fn memories_are_persisted_clamped_and_embedded() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(&store, FakeExtractor::responding(work_payload()));

    let response = service.create_summary(request(&partner.id, ids)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.summary_text, "Talked about a hard week at the hospital");
    assert_eq!(response.memories_created.len(), 3);

    let sister = &response.memories_created[2];
    assert_eq!(sister.memory_type, MemoryType::Relationship);
    assert_eq!(sister.importance, 10.0);
    assert_eq!(sister.emotional_weight, -10.0);
    assert_eq!(sister.related_people, vec!["Mika".to_string()]);

    let stored = store.find_recent(&partner.id, 0.0, 10).unwrap();
    assert_eq!(stored.len(), 3);
    for m in &stored {
        assert!((0.0..=10.0).contains(&m.importance));
        assert!((-10.0..=10.0).contains(&m.emotional_weight));
    }
    let nurse = stored.iter().find(|m| m.content == "Works as a nurse").unwrap();
    assert_eq!(nurse.vector, helpers::keyword_vector("Works as a nurse"));
}

#[tokio::test]
async fn important_memories_bump_shared_counter() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(&store, FakeExtractor::responding(work_payload()));

    service.create_summary(request(&partner.id, ids)).await.unwrap();

    // importance 8 and 12 (clamped to 10) qualify, 6 does not
    let metrics = store.find_metrics(&partner.id).unwrap().unwrap();
    assert_eq!(metrics.shared_memories, 2);
}

#[tokio::test]
async fn proposed_episodes_are_stored_without_counter_bump() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let payload = json!({
        "summary": "Small talk",
        "memories": [],
        "episodes": [
            {"title": "Rainy walk", "summary": "Shared an umbrella", "emotionalWeight": 6},
            {"title": "Karaoke", "description": "Sang badly together", "emotionalWeight": 14,
             "participants": ["Aoi", "User", "Mika"], "tags": ["music"]}
        ]
    });
    let service = helpers::service(&store, FakeExtractor::responding(payload));

    let response = service.create_summary(request(&partner.id, ids)).await.unwrap();

    assert_eq!(response.episodes_created.len(), 2);
    let walk = &response.episodes_created[0];
    assert_eq!(walk.participants, vec!["Aoi".to_string()]);
    assert!(walk.tags.is_empty());
    let karaoke = &response.episodes_created[1];
    assert_eq!(karaoke.description, "Sang badly together");
    assert_eq!(karaoke.emotional_weight, 10.0);
    assert_eq!(karaoke.participants.len(), 3);

    assert!(store.find_metrics(&partner.id).unwrap().is_none());
}

#[tokio::test]
async fn explicit_episode_replaces_proposed_ones() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(&store, FakeExtractor::responding(work_payload()));

    let mut req = request(&partner.id, ids);
    req.summary_type = SummaryType::Episode;
    req.episode = Some(EpisodeRequest {
        title: "The hard week".into(),
        description: None,
    });
    let response = service.create_summary(req).await.unwrap();

    assert_eq!(response.episodes_created.len(), 1);
    let episode = &response.episodes_created[0];
    assert_eq!(episode.title, "The hard week");
    assert_eq!(episode.description, "Talked about a hard week at the hospital");
    assert_eq!(episode.emotional_weight, 8.0);
    assert_eq!(episode.tags, vec!["work".to_string(), "hospital".to_string()]);
    assert_eq!(episode.participants, vec!["Aoi".to_string(), "User".to_string()]);

    let stored = store.find_episodes(&partner.id, &EpisodeQuery::default()).unwrap();
    assert_eq!(stored.len(), 1);

    // two important memories plus the explicit episode
    let metrics = store.find_metrics(&partner.id).unwrap().unwrap();
    assert_eq!(metrics.shared_memories, 3);
}

#[tokio::test]
async fn explicit_episode_without_memories_has_no_tags() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(
        &store,
        FakeExtractor::responding(json!({"summary": "Quiet evening", "memories": []})),
    );

    let mut req = request(&partner.id, ids);
    req.episode = Some(EpisodeRequest {
        title: "Quiet evening".into(),
        description: Some("Watched the rain".into()),
    });
    let response = service.create_summary(req).await.unwrap();

    let episode = &response.episodes_created[0];
    assert_eq!(episode.description, "Watched the rain");
    assert!(episode.tags.is_empty());
}

#[tokio::test]
async fn blank_explicit_description_falls_back_to_summary() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let service = helpers::service(
        &store,
        FakeExtractor::responding(json!({"summary": "Quiet evening", "memories": []})),
    );

    for description in ["", "   "] {
        let ids = helpers::seed_messages(&store, &partner.id, &conversation());
        let mut req = request(&partner.id, ids);
        req.episode = Some(EpisodeRequest {
            title: "Rainy night".into(),
            description: Some(description.into()),
        });
        let response = service.create_summary(req).await.unwrap();

        assert_eq!(response.episodes_created[0].description, "Quiet evening");
    }
}

#[tokio::test]
async fn blank_explicit_title_is_invalid() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let extractor = FakeExtractor::responding(work_payload());
    let service = helpers::service(&store, extractor.clone());

    let mut req = request(&partner.id, ids);
    req.episode = Some(EpisodeRequest {
        title: "  ".into(),
        description: None,
    });
    let err = service.create_summary(req).await.unwrap_err();

    assert!(matches!(err, MemoryError::InvalidInput(_)));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn timeout_persists_nothing() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(&store, FakeExtractor::hanging(Duration::from_secs(5)));

    let err = service.create_summary(request(&partner.id, ids)).await.unwrap_err();

    assert!(matches!(err, MemoryError::ExtractionTimeout(_)));
    assert!(err.is_retryable());
    assert_eq!(helpers::count_rows(&store, "memories"), 0);
    assert_eq!(helpers::count_rows(&store, "episode_memories"), 0);
}

#[tokio::test]
async fn malformed_output_persists_nothing() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    // second memory has an unknown type; the first must not be written either
    let service = helpers::service(
        &store,
        FakeExtractor::responding(json!({
            "summary": "s",
            "memories": [
                {"type": "fact", "content": "ok", "importance": 5, "emotionalWeight": 1},
                {"type": "gossip", "content": "bad", "importance": 5, "emotionalWeight": 1}
            ]
        })),
    );

    let err = service.create_summary(request(&partner.id, ids)).await.unwrap_err();

    assert!(matches!(err, MemoryError::ExtractionParse(_)));
    assert!(!err.is_retryable());
    assert_eq!(helpers::count_rows(&store, "memories"), 0);
}

#[tokio::test]
async fn non_json_output_is_parse_error() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service(&store, FakeExtractor::raw("I'm sorry, I can't do that"));

    let err = service.create_summary(request(&partner.id, ids)).await.unwrap_err();
    assert!(matches!(err, MemoryError::ExtractionParse(_)));
}

#[tokio::test]
async fn provider_failures_map_by_cause() {
    let cases = [
        (Failure::RateLimited, true),
        (Failure::Auth, false),
        (Failure::Provider, true),
    ];
    for (failure, retryable) in cases {
        let (store, partner) = helpers::store_with_partner("Aoi");
        let ids = helpers::seed_messages(&store, &partner.id, &conversation());
        let service = helpers::service(&store, FakeExtractor::failing(failure));

        let err = service.create_summary(request(&partner.id, ids)).await.unwrap_err();
        match failure {
            Failure::RateLimited => assert!(matches!(err, MemoryError::ExtractionRateLimit)),
            Failure::Auth => assert!(matches!(err, MemoryError::ExtractionAuth(_))),
            Failure::Provider => assert!(matches!(err, MemoryError::ExtractionProvider(_))),
        }
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(helpers::count_rows(&store, "memories"), 0);
    }
}

#[tokio::test]
async fn embedding_failure_stores_empty_vectors() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let ids = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = helpers::service_with(
        &store,
        Arc::new(FailingEmbedder),
        FakeExtractor::responding(work_payload()),
        &helpers::test_config(),
    );

    let response = service.create_summary(request(&partner.id, ids)).await.unwrap();

    assert_eq!(response.memories_created.len(), 3);
    let stored = store.find_recent(&partner.id, 0.0, 10).unwrap();
    assert!(stored.iter().all(|m| m.vector.is_empty()));
}

#[tokio::test]
async fn concurrent_calls_for_one_partner_both_complete() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let first = helpers::seed_messages(&store, &partner.id, &conversation());
    let second = helpers::seed_messages(&store, &partner.id, &conversation());
    let service = Arc::new(helpers::service(&store, FakeExtractor::responding(work_payload())));

    let a = {
        let service = Arc::clone(&service);
        let req = request(&partner.id, first);
        tokio::spawn(async move { service.create_summary(req).await })
    };
    let b = {
        let service = Arc::clone(&service);
        let req = request(&partner.id, second);
        tokio::spawn(async move { service.create_summary(req).await })
    };

    assert!(a.await.unwrap().is_ok());
    assert!(b.await.unwrap().is_ok());
    assert_eq!(helpers::count_rows(&store, "memories"), 6);
    assert_eq!(store.find_metrics(&partner.id).unwrap().unwrap().shared_memories, 4);
}
