//! Playout state machine scenarios: take guards, hold continuity, ad-lib
//! queueing, activation conflicts, and piece truncation.

mod common;

use common::{ingest_part_with_payload, simple_rundown, Harness};
use rundown_core::models::{HoldState, PieceLifespan};
use serde_json::json;

/// Rundown with one segment of two parts; part0 carries an extend-on-hold
/// file piece, part1 a plain camera piece
async fn hold_fixture(h: &Harness) {
    let mut tree = simple_rundown("holdshow", &[("segment0", 0)]);
    tree.segments[0].parts.push(ingest_part_with_payload(
        "segment0_part0",
        0.0,
        json!({
            "pieces": [{
                "externalId": "music",
                "name": "music bed",
                "sourceLayerId": "audio0",
                "extendOnHold": true,
                "content": {"fileName": "bed.wav"}
            }]
        }),
    ));
    tree.segments[0].parts.push(ingest_part_with_payload(
        "segment0_part1",
        1.0,
        json!({
            "pieces": [{
                "externalId": "cam",
                "name": "camera 1",
                "sourceLayerId": "camera0",
                "content": {}
            }]
        }),
    ));
    h.push_rundown(tree).await;
}

#[tokio::test]
async fn test_take_without_next_fails_and_leaves_current() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("abc", &[("segment0", 1)])).await;
    let playlist_id = h.playlist_id("abc");

    // Inactive playlist: take is a precondition failure
    let response = h.playout.take(&playlist_id).await;
    assert_eq!(response.error_code(), Some(412));

    assert!(h.playout.activate(&playlist_id, false).await.is_ok());
    assert!(h.playout.take(&playlist_id).await.is_ok());

    let current_before = h.current_part_instance("abc").await.unwrap();
    // Single part: nothing left to cue, the second take must fail
    let playlist = h.playlist("abc").await;
    assert_eq!(playlist.next_part_instance_id, None);
    let response = h.playout.take(&playlist_id).await;
    assert_eq!(response.error_code(), Some(412));

    let current_after = h.current_part_instance("abc").await.unwrap();
    assert_eq!(current_after.id, current_before.id);
}

#[tokio::test]
async fn test_activation_cues_first_part_and_take_advances() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("abc", &[("segment0", 2), ("segment1", 1)]))
        .await;
    let playlist_id = h.playlist_id("abc");

    assert!(h.playout.activate(&playlist_id, false).await.is_ok());
    let next = h.next_part_instance("abc").await.unwrap();
    assert_eq!(next.part.id, h.part_id("abc", "segment0_part0"));
    assert!(h.current_part_instance("abc").await.is_none());

    assert!(h.playout.take(&playlist_id).await.is_ok());
    let current = h.current_part_instance("abc").await.unwrap();
    assert!(current.is_taken);
    assert_eq!(current.part.id, h.part_id("abc", "segment0_part0"));
    let next = h.next_part_instance("abc").await.unwrap();
    assert_eq!(next.part.id, h.part_id("abc", "segment0_part1"));

    // Timeline recompute requested for activate and take
    assert!(h.timeline.requests().len() >= 2);
}

#[tokio::test]
async fn test_hold_extends_and_completes_one_continuation() {
    let h = Harness::new().await;
    hold_fixture(&h).await;
    let playlist_id = h.playlist_id("holdshow");

    h.activate_and_take_to("holdshow", "segment0_part0").await;

    assert!(h.playout.activate_hold(&playlist_id).await.is_ok());
    assert_eq!(h.playlist("holdshow").await.hold_state, HoldState::Pending);

    // The take enters the hold and extends the flagged piece
    assert!(h.playout.take(&playlist_id).await.is_ok());
    assert_eq!(h.playlist("holdshow").await.hold_state, HoldState::Active);

    let instances = h.ctx.store.piece_instances.find(|_| true).await.unwrap();
    let continuations: Vec<_> = instances
        .iter()
        .filter(|pi| pi.infinite.as_ref().map(|i| i.from_hold).unwrap_or(false))
        .collect();
    assert_eq!(continuations.len(), 1, "exactly one hold continuation");
    let continuation = continuations[0];

    // The original shares the freshly minted infinite id
    let original = instances
        .iter()
        .find(|pi| {
            pi.id != continuation.id
                && pi.infinite.as_ref().map(|i| {
                    i.infinite_instance_id
                        == continuation.infinite.as_ref().unwrap().infinite_instance_id
                }) == Some(true)
        })
        .expect("original tagged with shared infinite id");
    assert_eq!(original.piece.name, "music bed");
    assert_eq!(
        continuation.started_playback, original.started_playback,
        "continuation preserves the original playback start"
    );
    // File-backed content resumes where the original got to
    assert!(continuation.piece.content.get("seek").is_some());

    // Undo crops the continuation and nothing else
    assert!(h.playout.deactivate_hold(&playlist_id).await.is_ok());
    assert_eq!(h.playlist("holdshow").await.hold_state, HoldState::Complete);

    let instances = h.ctx.store.piece_instances.find(|_| true).await.unwrap();
    let continuation = instances.iter().find(|pi| pi.id == continuation.id).unwrap();
    assert!(continuation.user_duration.is_some(), "continuation cropped");
    let camera = instances
        .iter()
        .find(|pi| pi.piece.name == "camera 1" && !pi.reset)
        .unwrap();
    assert!(camera.user_duration.is_none(), "unrelated piece untouched");
}

#[tokio::test]
async fn test_hold_requires_same_segment_boundary() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("abc", &[("segment0", 1), ("segment1", 1)]))
        .await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part0").await;
    // Next sits in a different segment: hold must be rejected
    let response = h.playout.activate_hold(&playlist_id).await;
    assert_eq!(response.error_code(), Some(412));
}

#[tokio::test]
async fn test_adlib_queue_inserts_dynamic_part_as_next() {
    let h = Harness::new().await;
    let mut tree = simple_rundown("abc", &[("segment0", 0)]);
    tree.segments[0].parts.push(ingest_part_with_payload(
        "segment0_part0",
        0.0,
        json!({
            "adLibs": [{
                "externalId": "breaking",
                "name": "breaking news",
                "sourceLayerId": "gfx0",
                "content": {"fileName": "breaking.mov"}
            }]
        }),
    ));
    tree.segments[0].parts.push(ingest_part_with_payload("segment0_part1", 1.0, json!({})));
    h.push_rundown(tree).await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part0").await;
    let current = h.current_part_instance("abc").await.unwrap();

    let adlib_id = h.adlib_id("abc", "segment0_part0", "breaking");
    let response = h
        .playout
        .segment_adlib_piece_start(&playlist_id, &current.id, &adlib_id, true)
        .await;
    assert!(response.is_ok(), "adlib queue failed: {response:?}");

    let next = h.next_part_instance("abc").await.unwrap();
    assert!(next.part.is_dynamically_inserted());
    assert_eq!(
        next.part.dynamically_inserted_after_part_id,
        Some(current.part.id.clone())
    );
    // Queued directly after current, before the following ingest part
    let following_rank = h
        .ctx
        .store
        .parts
        .find_one(&h.part_id("abc", "segment0_part1"))
        .await
        .unwrap()
        .unwrap()
        .rank;
    assert!(next.part.rank > current.part.rank && next.part.rank < following_rank);

    // Take it on air; the piece instance carries its ad-lib origin
    assert!(h.playout.take(&playlist_id).await.is_ok());
    let on_air = h.current_part_instance("abc").await.unwrap();
    assert_eq!(on_air.id, next.id);
    let pieces = h
        .ctx
        .store
        .piece_instances
        .find(|pi| pi.part_instance_id == on_air.id)
        .await
        .unwrap();
    assert!(pieces.iter().any(|pi| pi.adlib_source_id.is_some()));
}

#[tokio::test]
async fn test_adlib_insert_into_current_part() {
    let h = Harness::new().await;
    let mut tree = simple_rundown("abc", &[("segment0", 1)]);
    tree.segments[0].parts[0].payload = Some(json!({
        "adLibs": [{
            "externalId": "sting",
            "name": "sting",
            "sourceLayerId": "audio1",
            "content": {}
        }]
    }));
    h.push_rundown(tree).await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part0").await;
    let current = h.current_part_instance("abc").await.unwrap();

    let adlib_id = h.adlib_id("abc", "segment0_part0", "sting");
    let response = h
        .playout
        .segment_adlib_piece_start(&playlist_id, &current.id, &adlib_id, false)
        .await;
    assert!(response.is_ok());

    let pieces = h
        .ctx
        .store
        .piece_instances
        .find(|pi| pi.part_instance_id == current.id)
        .await
        .unwrap();
    let adlibbed = pieces
        .iter()
        .find(|pi| pi.dynamically_inserted)
        .expect("adlibbed piece instance");
    assert_eq!(adlibbed.piece.name, "sting");
    assert!(adlibbed.started_playback.is_some());
}

#[tokio::test]
async fn test_activate_conflicts_with_other_playlist_in_studio() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("show-a", &[("segment0", 1)])).await;
    h.push_rundown(simple_rundown("show-b", &[("segment0", 1)])).await;

    assert!(h
        .playout
        .activate(&h.playlist_id("show-a"), false)
        .await
        .is_ok());

    let response = h.playout.activate(&h.playlist_id("show-b"), false).await;
    assert_eq!(response.error_code(), Some(409));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["details"]["activeRundowns"][0], "Rundown show-a");

    // Deactivating the first frees the studio
    assert!(h.playout.deactivate(&h.playlist_id("show-a")).await.is_ok());
    assert!(h
        .playout
        .activate(&h.playlist_id("show-b"), false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_stop_pieces_truncation_strategies() {
    let h = Harness::new().await;
    let mut tree = simple_rundown("abc", &[("segment0", 0)]);
    tree.segments[0].parts.push(ingest_part_with_payload(
        "segment0_part0",
        0.0,
        json!({
            "pieces": [
                {
                    "externalId": "gfx",
                    "name": "lower third",
                    "sourceLayerId": "gfx0",
                    "lifespan": "out_on_segment_change",
                    "content": {}
                },
                {
                    "externalId": "bug",
                    "name": "channel bug",
                    "sourceLayerId": "gfx1",
                    "lifespan": "out_on_segment_end",
                    "content": {}
                }
            ]
        }),
    ));
    h.push_rundown(tree).await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part0").await;
    let current = h.current_part_instance("abc").await.unwrap();

    let response = h
        .playout
        .source_layer_on_part_stop(
            &playlist_id,
            &current.id,
            vec!["gfx0".into(), "gfx1".into()],
        )
        .await;
    assert!(response.is_ok());

    let pieces = h
        .ctx
        .store
        .piece_instances
        .find(|pi| pi.part_instance_id == current.id)
        .await
        .unwrap();

    // Change-lifespan piece is cropped with a user duration
    let gfx = pieces.iter().find(|pi| pi.piece.name == "lower third").unwrap();
    assert!(gfx.user_duration.is_some());

    // End-lifespan piece instead got a virtual terminator on its layer
    let bug = pieces.iter().find(|pi| pi.piece.name == "channel bug").unwrap();
    assert!(bug.user_duration.is_none());
    let terminator = pieces
        .iter()
        .find(|pi| pi.piece.is_virtual && pi.piece.source_layer_id == "gfx1")
        .expect("virtual terminator inserted");
    assert_eq!(terminator.piece.lifespan, PieceLifespan::OutOnSegmentEnd);
    assert!(terminator.infinite.is_some());
}

#[tokio::test]
async fn test_sticky_piece_replays_last_played() {
    let h = Harness::new().await;
    let mut tree = simple_rundown("abc", &[("segment0", 0)]);
    tree.segments[0].parts.push(ingest_part_with_payload(
        "segment0_part0",
        0.0,
        json!({
            "pieces": [{
                "externalId": "vt",
                "name": "opening clip",
                "sourceLayerId": "vt0",
                "content": {"fileName": "opening.mov"}
            }]
        }),
    ));
    tree.segments[0].parts.push(ingest_part_with_payload("segment0_part1", 1.0, json!({})));
    h.push_rundown(tree).await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part1").await;
    let current = h.current_part_instance("abc").await.unwrap();
    assert_eq!(current.part.id, h.part_id("abc", "segment0_part1"));

    let response = h
        .playout
        .source_layer_sticky_piece_start(&playlist_id, "vt0", true)
        .await;
    assert!(response.is_ok(), "sticky start failed: {response:?}");

    let replayed = h
        .ctx
        .store
        .piece_instances
        .find(|pi| pi.part_instance_id == current.id && pi.dynamically_inserted)
        .await
        .unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].piece.name, "opening clip");
    assert_eq!(replayed[0].piece.content["fileName"], "opening.mov");
}

#[tokio::test]
async fn test_set_next_and_reset() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("abc", &[("segment0", 3)])).await;
    let playlist_id = h.playlist_id("abc");

    assert!(h.playout.activate(&playlist_id, true).await.is_ok());

    // Jump the next pointer over part0 straight to part2
    let part2 = h.part_id("abc", "segment0_part2");
    let response = h.playout.set_next(&playlist_id, &part2, None).await;
    assert!(response.is_ok());
    assert_eq!(h.next_part_instance("abc").await.unwrap().part.id, part2);

    assert!(h.playout.take(&playlist_id).await.is_ok());
    assert_eq!(
        h.current_part_instance("abc").await.unwrap().part.id,
        part2
    );

    // Rehearsal reset re-cues the first part and wipes history
    let response = h.playout.reset_rundown_playlist(&playlist_id).await;
    assert!(response.is_ok());
    let playlist = h.playlist("abc").await;
    assert!(playlist.current_part_instance_id.is_none());
    assert_eq!(
        h.next_part_instance("abc").await.unwrap().part.id,
        h.part_id("abc", "segment0_part0")
    );
    let live_instances = h
        .ctx
        .store
        .part_instances
        .find(|pi| !pi.reset && pi.is_taken)
        .await
        .unwrap();
    assert!(live_instances.is_empty());
}

#[tokio::test]
async fn test_playback_callbacks_record_timings() {
    let h = Harness::new().await;
    h.push_rundown(simple_rundown("abc", &[("segment0", 2)])).await;
    let playlist_id = h.playlist_id("abc");

    h.activate_and_take_to("abc", "segment0_part0").await;
    let next = h.next_part_instance("abc").await.unwrap();

    let reported = chrono::Utc::now();
    let response = h
        .playout
        .on_part_playback_started(&playlist_id, &next.id, reported)
        .await;
    assert!(response.is_ok());

    let stored = h
        .ctx
        .store
        .part_instances
        .find_one(&next.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.timings.started_playback, Some(reported));

    let response = h
        .playout
        .on_part_playback_started(
            &playlist_id,
            &rundown_core::models::PartInstanceId::new("missing"),
            reported,
        )
        .await;
    assert_eq!(response.error_code(), Some(404));
}
