//! Decides what plays after the current track.
//!
//! [`compute_next`] is pure: it never mutates the queue and takes its
//! randomness from the caller, so shuffle is reproducible with a seeded RNG.

use rand::Rng;

use crate::audio::queue::{Queue, RepeatMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackDecision {
    /// Move the cursor to this index and play it.
    NextIndex(usize),
    /// Nothing left to play. The caller rewinds the cursor to 0.
    Stop,
    /// Append one related track, then play it at this index.
    RequestAutoplayThenIndex(usize),
}

pub fn compute_next<R: Rng + ?Sized>(queue: &Queue, rng: &mut R) -> PlaybackDecision {
    let Some(current) = queue.current_index() else {
        return PlaybackDecision::Stop;
    };
    let len = queue.len();

    if queue.shuffle_enabled() {
        return PlaybackDecision::NextIndex(shuffle_pick(queue, current, rng));
    }

    if queue.repeat_mode() == RepeatMode::Single {
        return PlaybackDecision::NextIndex(current);
    }

    if queue.is_last() {
        return match queue.repeat_mode() {
            RepeatMode::All => PlaybackDecision::NextIndex(0),
            _ if queue.autoplay_enabled() => PlaybackDecision::RequestAutoplayThenIndex(len),
            _ => PlaybackDecision::Stop,
        };
    }

    PlaybackDecision::NextIndex(current + 1)
}

/// Uniform pick among indices not yet visited in this shuffle cycle. A
/// complete cycle is treated as if only `current` had been played.
fn shuffle_pick<R: Rng + ?Sized>(queue: &Queue, current: usize, rng: &mut R) -> usize {
    let played = queue.shuffle_played();
    let cycle_complete = played.len() >= queue.len();

    let candidates: Vec<usize> = (0..queue.len())
        .filter(|index| {
            if cycle_complete {
                *index != current
            } else {
                !played.contains(index)
            }
        })
        .collect();

    if candidates.is_empty() {
        return current;
    }
    candidates[rng.gen_range(0..candidates.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::TrackRecord;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serenity::model::id::UserId;

    fn queue(len: usize) -> Queue {
        let mut queue = Queue::new(100);
        let tracks = (0..len)
            .map(|i| TrackRecord::new(format!("t{i}"), format!("Track {i}"), "https://youtu.be/x"))
            .collect();
        queue.append(tracks, UserId::new(1)).unwrap();
        queue
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn empty_queue_stops() {
        assert_eq!(compute_next(&Queue::new(10), &mut rng()), PlaybackDecision::Stop);
    }

    #[test]
    fn advances_in_order() {
        let q = queue(3);
        assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::NextIndex(1));
    }

    #[test]
    fn last_track_without_repeat_stops() {
        let mut q = queue(3);
        q.jump_to(2).unwrap();
        assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::Stop);
    }

    #[test]
    fn last_track_with_repeat_all_wraps() {
        let mut q = queue(3);
        q.jump_to(2).unwrap();
        q.set_repeat_mode(RepeatMode::All);
        assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::NextIndex(0));
    }

    #[test]
    fn last_track_with_autoplay_requests_related() {
        let mut q = queue(2);
        q.jump_to(1).unwrap();
        q.set_autoplay(true);
        assert_eq!(
            compute_next(&q, &mut rng()),
            PlaybackDecision::RequestAutoplayThenIndex(2)
        );
    }

    #[test]
    fn repeat_all_takes_precedence_over_autoplay() {
        let mut q = queue(1);
        q.set_autoplay(true);
        q.set_repeat_mode(RepeatMode::All);
        assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::NextIndex(0));
    }

    #[test]
    fn repeat_single_replays_at_any_position() {
        let mut q = queue(3);
        q.set_repeat_mode(RepeatMode::Single);
        for index in 0..3 {
            q.jump_to(index).unwrap();
            assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::NextIndex(index));
        }
    }

    #[test]
    fn shuffle_with_single_entry_replays_it() {
        let mut q = queue(1);
        q.set_shuffle(true);
        q.record_shuffle_pick(0);
        assert_eq!(compute_next(&q, &mut rng()), PlaybackDecision::NextIndex(0));
    }

    #[test]
    fn shuffle_never_repeats_within_a_cycle() {
        let mut q = queue(6);
        q.set_shuffle(true);
        let mut rng = rng();
        let mut seen = Vec::new();
        for _ in 0..6 {
            let PlaybackDecision::NextIndex(index) = compute_next(&q, &mut rng) else {
                panic!("shuffle must always pick an index");
            };
            q.record_shuffle_pick(index);
            q.jump_to(index).unwrap();
            seen.push(index);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }
}
