use std::collections::BTreeSet;

use jukebox::audio::{
    policy::{compute_next, PlaybackDecision},
    Queue, RepeatMode, TrackRecord,
};
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use serenity::model::id::UserId;

fn queue(len: usize) -> Queue {
    let mut queue = Queue::new(1000);
    let tracks = (0..len)
        .map(|i| TrackRecord::new(format!("t{i}"), format!("Track {i}"), "https://youtu.be/x"))
        .collect();
    queue.append(tracks, UserId::new(1)).unwrap();
    queue
}

/// Applies one natural advance the way the player does.
fn step(queue: &mut Queue, rng: &mut StdRng) -> Option<usize> {
    match compute_next(queue, rng) {
        PlaybackDecision::NextIndex(index) => {
            if queue.shuffle_enabled() {
                queue.record_shuffle_pick(index);
            }
            queue.jump_to(index).unwrap();
            Some(index)
        }
        PlaybackDecision::Stop | PlaybackDecision::RequestAutoplayThenIndex(_) => None,
    }
}

fn current_key(queue: &Queue) -> u64 {
    queue.current().unwrap().key
}

proptest! {
    #[test]
    fn repeat_all_returns_to_start_after_len_steps(
        (len, start) in (1usize..30).prop_flat_map(|len| (Just(len), 0..len)),
        seed in any::<u64>(),
    ) {
        let mut q = queue(len);
        q.set_repeat_mode(RepeatMode::All);
        q.jump_to(start).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..len {
            prop_assert!(step(&mut q, &mut rng).is_some());
        }
        prop_assert_eq!(q.current_index(), Some(start));
    }

    #[test]
    fn repeat_single_is_a_fixed_point(
        (len, start) in (1usize..30).prop_flat_map(|len| (Just(len), 0..len)),
        steps in 1usize..50,
        autoplay in any::<bool>(),
    ) {
        let mut q = queue(len);
        q.set_repeat_mode(RepeatMode::Single);
        q.set_autoplay(autoplay);
        q.jump_to(start).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for _ in 0..steps {
            prop_assert_eq!(step(&mut q, &mut rng), Some(start));
        }
    }

    #[test]
    fn shuffle_covers_every_index_once_per_cycle(len in 2usize..20, seed in any::<u64>()) {
        let mut q = queue(len);
        q.set_shuffle(true);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut visited = Vec::new();
        for _ in 0..len {
            visited.push(step(&mut q, &mut rng).unwrap());
        }
        let distinct: BTreeSet<usize> = visited.iter().copied().collect();
        prop_assert_eq!(distinct.len(), len);
        prop_assert_eq!(q.shuffle_played().len(), len);

        // Next cycle starts over, never repeating the track just played.
        let last = q.current_index().unwrap();
        let first_of_cycle = step(&mut q, &mut rng).unwrap();
        prop_assert_ne!(first_of_cycle, last);
        let expected: BTreeSet<usize> = [last, first_of_cycle].into_iter().collect();
        prop_assert_eq!(q.shuffle_played(), &expected);
    }

    #[test]
    fn removing_before_cursor_keeps_current_track(
        (len, cursor, removed) in (2usize..30)
            .prop_flat_map(|len| (Just(len), 1..len))
            .prop_flat_map(|(len, cursor)| (Just(len), Just(cursor), 0..cursor)),
    ) {
        let mut q = queue(len);
        q.jump_to(cursor).unwrap();
        let key = current_key(&q);

        q.remove_at(removed).unwrap();

        prop_assert_eq!(current_key(&q), key);
        prop_assert_eq!(q.current_index(), Some(cursor - 1));
    }

    #[test]
    fn removing_current_moves_to_successor_or_last(
        (len, cursor) in (2usize..30).prop_flat_map(|len| (Just(len), 0..len)),
    ) {
        let mut q = queue(len);
        q.jump_to(cursor).unwrap();
        let successor = q.get(cursor + 1).map(|entry| entry.key);
        let predecessor = cursor.checked_sub(1).and_then(|i| q.get(i)).map(|entry| entry.key);

        q.remove_at(cursor).unwrap();

        match successor {
            Some(key) => prop_assert_eq!(current_key(&q), key),
            None => prop_assert_eq!(Some(current_key(&q)), predecessor),
        }
    }

    #[test]
    fn removing_after_cursor_keeps_index(
        (len, cursor, removed) in (2usize..30)
            .prop_flat_map(|len| (Just(len), 0..len - 1))
            .prop_flat_map(|(len, cursor)| (Just(len), Just(cursor), cursor + 1..len)),
    ) {
        let mut q = queue(len);
        q.jump_to(cursor).unwrap();
        let key = current_key(&q);

        q.remove_at(removed).unwrap();

        prop_assert_eq!(q.current_index(), Some(cursor));
        prop_assert_eq!(current_key(&q), key);
    }
}

#[test]
fn autoplay_only_on_last_track_without_repeat() {
    let mut q = queue(3);
    q.set_autoplay(true);
    let mut rng = StdRng::seed_from_u64(1);

    assert_eq!(compute_next(&q, &mut rng), PlaybackDecision::NextIndex(1));
    q.jump_to(2).unwrap();
    assert_eq!(
        compute_next(&q, &mut rng),
        PlaybackDecision::RequestAutoplayThenIndex(3)
    );
}
