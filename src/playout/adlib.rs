//! Ad-lib operations: start a template piece on the current part, queue it
//! as a freshly synthesized part, replay the last piece of a sticky source
//! layer, or promote an arbitrary piece with take-now.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::constants::ranks::QUEUED_PART_RANK_STEP;
use crate::error::{not_found, precondition, Result};
use crate::ingest::ranks;
use crate::models::{
    AdLibPieceId, BucketAdLibId, Part, PartId, PartInstanceId, Piece, PieceEnable, PieceId,
    PieceInstance, PieceLifespan,
};

use super::{guards, selection, stop};

struct AdLibSource {
    source_id: String,
    name: String,
    source_layer_id: String,
    output_layer_id: String,
    lifespan: PieceLifespan,
    expected_duration_ms: Option<u64>,
    to_be_queued: bool,
    content: serde_json::Value,
}

impl From<&crate::models::AdLibPiece> for AdLibSource {
    fn from(adlib: &crate::models::AdLibPiece) -> Self {
        Self {
            source_id: adlib.id.to_string(),
            name: adlib.name.clone(),
            source_layer_id: adlib.source_layer_id.clone(),
            output_layer_id: adlib.output_layer_id.clone(),
            lifespan: adlib.lifespan,
            expected_duration_ms: adlib.expected_duration_ms,
            to_be_queued: adlib.to_be_queued,
            content: adlib.content.clone(),
        }
    }
}

impl From<&crate::models::BucketAdLib> for AdLibSource {
    fn from(adlib: &crate::models::BucketAdLib) -> Self {
        Self {
            source_id: adlib.id.to_string(),
            name: adlib.name.clone(),
            source_layer_id: adlib.source_layer_id.clone(),
            output_layer_id: adlib.output_layer_id.clone(),
            lifespan: adlib.lifespan,
            expected_duration_ms: adlib.expected_duration_ms,
            to_be_queued: adlib.to_be_queued,
            content: adlib.content.clone(),
        }
    }
}

fn check_adlib_allowed(
    cache: &PlaylistCache,
    part_instance_id: &PartInstanceId,
) -> Result<crate::models::PartInstance> {
    guards::check_active(cache)?;
    if cache.playlist.hold_state.is_in_hold() {
        return Err(precondition("cannot ad-lib while a hold is in progress"));
    }
    let current = cache
        .current_part_instance()
        .ok_or_else(|| precondition("no part is on air"))?;
    if current.id != *part_instance_id {
        return Err(precondition(
            "ad-libs may only target the current part instance",
        ));
    }
    Ok(current.clone())
}

/// Start a segment or baseline ad-lib piece, inserting into the current
/// part or queueing a synthesized part after it
pub fn adlib_piece_start(
    cache: &mut PlaylistCache,
    part_instance_id: &PartInstanceId,
    adlib_id: &AdLibPieceId,
    queue: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let current = check_adlib_allowed(cache, part_instance_id)?;
    let adlib = cache
        .adlib_pieces
        .find_one(adlib_id)
        .ok_or_else(|| not_found(format!("ad-lib piece {adlib_id}")))?;
    let source = AdLibSource::from(adlib);

    start_adlib_source(cache, &current, source, queue, now)
}

/// Start a studio-bucket ad-lib; the template lives outside the playlist
pub async fn bucket_adlib_piece_start(
    cache: &mut PlaylistCache,
    part_instance_id: &PartInstanceId,
    bucket_adlib_id: &BucketAdLibId,
    queue: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let current = check_adlib_allowed(cache, part_instance_id)?;
    let adlib = cache
        .store()
        .bucket_adlibs
        .find_one(bucket_adlib_id)
        .await?
        .ok_or_else(|| not_found(format!("bucket ad-lib {bucket_adlib_id}")))?;
    if adlib.studio_id != cache.playlist.studio_id {
        return Err(precondition("bucket ad-lib belongs to a different studio"));
    }
    let source = AdLibSource::from(&adlib);

    start_adlib_source(cache, &current, source, queue, now)
}

fn start_adlib_source(
    cache: &mut PlaylistCache,
    current: &crate::models::PartInstance,
    source: AdLibSource,
    queue: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if queue || source.to_be_queued {
        queue_adlib_part(cache, current, source, now)
    } else {
        insert_adlib_piece_instance(cache, current, source, now);
        Ok(())
    }
}

/// Synthesize a dynamically-inserted part directly after the current one,
/// seed it with the ad-lib's piece, and cue it as next
fn queue_adlib_part(
    cache: &mut PlaylistCache,
    current: &crate::models::PartInstance,
    source: AdLibSource,
    now: DateTime<Utc>,
) -> Result<()> {
    let part = Part {
        id: PartId::random(),
        rundown_id: current.rundown_id.clone(),
        segment_id: current.segment_id.clone(),
        external_id: String::new(),
        name: source.name.clone(),
        rank: current.part.rank + QUEUED_PART_RANK_STEP,
        expected_duration_ms: source.expected_duration_ms,
        autonext: false,
        in_transition_duration_ms: None,
        floated: false,
        invalid: false,
        dynamically_inserted_after_part_id: Some(current.part.id.clone()),
        notes: Vec::new(),
    };
    let part_id = part.id.clone();

    let piece = Piece {
        id: PieceId::random(),
        rundown_id: part.rundown_id.clone(),
        start_part_id: part_id.clone(),
        external_id: String::new(),
        name: source.name.clone(),
        source_layer_id: source.source_layer_id.clone(),
        output_layer_id: source.output_layer_id.clone(),
        enable: PieceEnable {
            start_ms: 0,
            duration_ms: source.expected_duration_ms,
        },
        lifespan: source.lifespan,
        extend_on_hold: false,
        is_virtual: false,
        content: source.content.clone(),
    };

    cache.parts.insert(part.clone());
    cache.pieces.insert(piece);
    ranks::renormalize_part_ranks(cache, &part.segment_id);

    // Re-read: renormalization may have moved the rank
    let part = cache
        .parts
        .find_one(&part_id)
        .cloned()
        .ok_or_else(|| crate::error::RundownError::Internal("queued part vanished".into()))?;
    selection::set_next_part(cache, Some(&part), None, now)?;

    // Tag the created piece instances with their ad-lib origin
    if let Some(next_id) = cache.playlist.next_part_instance_id.clone() {
        cache.piece_instances.update_where(
            |pi| pi.part_instance_id == next_id && pi.piece.start_part_id == part_id,
            |pi| {
                pi.dynamically_inserted = true;
                pi.adlib_source_id = Some(source.source_id.clone());
            },
        );
    }

    tracing::info!(
        playlist_id = %cache.playlist.id,
        part_id = %part_id,
        adlib = %source.name,
        "▶️ PLAYOUT: ad-lib queued as next"
    );
    Ok(())
}

/// Insert the ad-lib directly into the current part, starting now
fn insert_adlib_piece_instance(
    cache: &mut PlaylistCache,
    current: &crate::models::PartInstance,
    source: AdLibSource,
    now: DateTime<Utc>,
) {
    let part_started = current.timings.started_playback.unwrap_or(now);
    let start_ms = (now - part_started).num_milliseconds().max(0) as u64;

    let piece = Piece {
        id: PieceId::random(),
        rundown_id: current.rundown_id.clone(),
        start_part_id: current.part.id.clone(),
        external_id: String::new(),
        name: source.name.clone(),
        source_layer_id: source.source_layer_id.clone(),
        output_layer_id: source.output_layer_id.clone(),
        enable: PieceEnable {
            start_ms,
            duration_ms: source.expected_duration_ms,
        },
        lifespan: source.lifespan,
        extend_on_hold: false,
        is_virtual: false,
        content: source.content,
    };

    let mut instance = PieceInstance::from_piece(piece, current.id.clone());
    instance.dynamically_inserted = true;
    instance.adlib_source_id = Some(source.source_id);
    instance.started_playback = Some(now);
    cache.piece_instances.insert(instance);

    tracing::info!(
        playlist_id = %cache.playlist.id,
        part_instance_id = %current.id,
        adlib = %source.name,
        "▶️ PLAYOUT: ad-lib started on current part"
    );
}

/// Replay the most recent piece ever played on a sticky source layer.
/// With `original_only`, ad-libbed occurrences are ignored and only
/// ingest-defined pieces count.
pub fn sticky_piece_start(
    cache: &mut PlaylistCache,
    source_layer_id: &str,
    original_only: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    guards::check_active(cache)?;
    if cache.playlist.hold_state.is_in_hold() {
        return Err(precondition("cannot ad-lib while a hold is in progress"));
    }
    let current = cache
        .current_part_instance()
        .ok_or_else(|| precondition("no part is on air"))?
        .clone();

    let last_played = cache
        .piece_instances
        .find(|pi| {
            pi.piece.source_layer_id == source_layer_id
                && !pi.piece.is_virtual
                && pi.started_playback.is_some()
                && (!original_only || pi.adlib_source_id.is_none())
        })
        .into_iter()
        .max_by_key(|pi| pi.started_playback);

    let Some(last_played) = last_played else {
        return Err(not_found(format!(
            "no piece has played on source layer {source_layer_id}"
        )));
    };

    let source = AdLibSource {
        source_id: last_played.piece.id.to_string(),
        name: last_played.piece.name.clone(),
        source_layer_id: last_played.piece.source_layer_id.clone(),
        output_layer_id: last_played.piece.output_layer_id.clone(),
        lifespan: last_played.piece.lifespan,
        expected_duration_ms: last_played.piece.enable.duration_ms,
        to_be_queued: false,
        content: last_played.piece.content.clone(),
    };
    insert_adlib_piece_instance(cache, &current, source, now);
    Ok(())
}

/// Promote a piece (or an existing piece instance's piece) onto the current
/// part right now, stopping whatever runs on its source layer
pub fn piece_take_now(
    cache: &mut PlaylistCache,
    part_instance_id: &PartInstanceId,
    piece_or_instance_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let current = check_adlib_allowed(cache, part_instance_id)?;

    let piece = match cache.pieces.find_one(&PieceId::new(piece_or_instance_id)) {
        Some(piece) => piece.clone(),
        None => cache
            .piece_instances
            .find_one(&crate::models::PieceInstanceId::new(piece_or_instance_id))
            .map(|pi| pi.piece.clone())
            .ok_or_else(|| not_found(format!("piece {piece_or_instance_id}")))?,
    };

    stop::stop_pieces_on_source_layers(
        cache,
        &current.id,
        &[piece.source_layer_id.clone()],
        now,
    );

    let source = AdLibSource {
        source_id: piece.id.to_string(),
        name: piece.name.clone(),
        source_layer_id: piece.source_layer_id.clone(),
        output_layer_id: piece.output_layer_id.clone(),
        lifespan: piece.lifespan,
        expected_duration_ms: piece.enable.duration_ms,
        to_be_queued: false,
        content: piece.content.clone(),
    };
    insert_adlib_piece_instance(cache, &current, source, now);
    Ok(())
}
