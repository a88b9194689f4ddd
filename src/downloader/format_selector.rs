// Format selection - audio tier bucketing and video/audio pairing
//
// Converts the classified catalog into menu-ready choices:
// - Audio tiers: many near-duplicate audio streams collapse onto a fixed
//   set of canonical bitrates, smallest file wins each tier
// - Video qualities: one stream per height, each paired with the audio
//   tier closest to a height-interpolated bitrate target

use std::cmp::Ordering;
use std::collections::HashSet;

use super::models::{Combination, Format};

/// Canonical audio bitrate tiers in kbps, ascending
pub const AUDIO_TIERS: [f64; 7] = [32.0, 35.0, 48.0, 50.0, 70.0, 128.0, 160.0];

/// Max distance (inclusive, kbps) between a stream and its tier
pub const TIER_TOLERANCE: f64 = 5.0;

/// Audio target at height 0 and at 1080p
const TARGET_LOW_KBPS: f64 = 48.0;
const TARGET_HIGH_KBPS: f64 = 160.0;
const TARGET_REFERENCE_HEIGHT: f64 = 1080.0;

/// One representative per populated tier, ascending by tier
pub fn bucket_audio(audio: &[Format]) -> Vec<Format> {
    AUDIO_TIERS
        .iter()
        .filter_map(|&tier| best_for_tier(audio, tier))
        .cloned()
        .collect()
}

/// Smallest known-size stream within tolerance of `tier`; unsized streams
/// lose to any sized one, ties keep catalog order
fn best_for_tier(audio: &[Format], tier: f64) -> Option<&Format> {
    audio
        .iter()
        .filter(|a| (a.bitrate() - tier).abs() <= TIER_TOLERANCE)
        .min_by_key(|a| {
            let size = a.effective_size();
            (size.is_none(), size.unwrap_or(0))
        })
}

/// First sized stream for every distinct height, ascending by height
pub fn dedupe_by_height(video: &[Format]) -> Vec<&Format> {
    let mut sorted: Vec<&Format> = video.iter().collect();
    sorted.sort_by_key(|f| f.height.unwrap_or(0));

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|f| match f.height {
            Some(h) if h > 0 && f.effective_size().is_some() => seen.insert(h),
            _ => false,
        })
        .collect()
}

/// Linear audio target for a video height; not clamped outside 0..=1080
pub fn target_bitrate(height: u32) -> f64 {
    TARGET_LOW_KBPS + (height as f64 / TARGET_REFERENCE_HEIGHT) * (TARGET_HIGH_KBPS - TARGET_LOW_KBPS)
}

/// Audio stream whose bitrate is nearest `target`; earliest wins ties
pub fn closest_audio(audio: &[Format], target: f64) -> Option<&Format> {
    audio.iter().min_by(|a, b| {
        let da = (a.bitrate() - target).abs();
        let db = (b.bitrate() - target).abs();
        da.partial_cmp(&db).unwrap_or(Ordering::Equal)
    })
}

/// One Combination per distinct video height, ascending
pub fn pair_qualities(video: &[Format], audio_tiers: &[Format]) -> Vec<Combination> {
    dedupe_by_height(video)
        .into_iter()
        .map(|v| {
            let target = target_bitrate(v.height.unwrap_or(0));
            let audio = closest_audio(audio_tiers, target).cloned();
            Combination::new(v.clone(), audio)
        })
        .collect()
}
