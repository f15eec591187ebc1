//! Next/previous track selection
//!
//! Pure functions over a queue snapshot. Disliked tracks are never chosen;
//! when no playable candidate exists the result is `None` and the caller
//! stops at Idle.

use crate::queue::Cursor;
use ambi_common::{RepeatMode, Track};
use rand::Rng;

/// Mode flags consulted by selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionPolicy {
    pub shuffle: bool,
    pub repeat: RepeatMode,
    /// Random picks tried before falling back to a forward scan
    pub shuffle_attempts: u32,
}

/// Index of the track to play after the cursor
pub fn next_index<R: Rng>(
    tracks: &[Track],
    cursor: Cursor,
    policy: SelectionPolicy,
    rng: &mut R,
) -> Option<usize> {
    let len = tracks.len();
    if len == 0 {
        return None;
    }

    if policy.shuffle {
        for _ in 0..policy.shuffle_attempts.max(1) {
            let pick = rng.gen_range(0..len);
            if !tracks[pick].is_disliked() {
                return Some(pick);
            }
        }
        // Unlucky picks; scan from a random start so a playable track is
        // still found when one exists.
        let start = rng.gen_range(0..len);
        return (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| !tracks[index].is_disliked());
    }

    if policy.repeat == RepeatMode::One {
        if let Cursor::At(index) = cursor {
            if !tracks[index].is_disliked() {
                return Some(index);
            }
        }
    }

    let start = match cursor {
        Cursor::At(index) => index + 1,
        Cursor::Gap(index) => index,
        Cursor::Unset => 0,
    };
    let wrap = policy.repeat == RepeatMode::All;
    for offset in 0..len {
        let mut index = start + offset;
        if index >= len {
            if !wrap {
                return None;
            }
            index %= len;
        }
        if !tracks[index].is_disliked() {
            return Some(index);
        }
    }
    None
}

/// Index of the track to play before the cursor
///
/// At the front without repeat-all the first playable track is chosen,
/// so `previous` from the first track replays it.
pub fn previous_index(tracks: &[Track], cursor: Cursor, policy: SelectionPolicy) -> Option<usize> {
    let len = tracks.len();
    if len == 0 {
        return None;
    }
    let wrap = policy.repeat == RepeatMode::All;
    let first_playable = || tracks.iter().position(|t| !t.is_disliked());

    let start = match cursor {
        Cursor::At(index) | Cursor::Gap(index) if index > 0 => index.min(len) - 1,
        _ if wrap => len - 1,
        _ => return first_playable(),
    };

    let mut index = start;
    for _ in 0..len {
        if !tracks[index].is_disliked() {
            return Some(index);
        }
        if index == 0 {
            if !wrap {
                return first_playable();
            }
            index = len - 1;
        } else {
            index -= 1;
        }
    }
    None
}
