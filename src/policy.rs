//! Gesture to action mapping.

use crate::config::{Action, EngineConfig};
use crate::signal::Polarity;
use crate::trigger::{Gesture, GestureKind};

/// Pick the action for a gesture.
///
/// North-tagged gestures read the `n_*` entries; everything else (south, or a
/// press armed without a clear pole) reads the `s_*` entries. In
/// [`PoleMode::Both`](crate::config::PoleMode::Both) the two sides are expected
/// to hold the same actions, so the pole makes no difference there.
pub fn resolve(gesture: &Gesture, config: &EngineConfig) -> Action {
    let map = &config.actions;
    match (gesture.polarity, gesture.kind) {
        (Polarity::North, GestureKind::ShortPress) => map.n_short,
        (Polarity::North, GestureKind::LongPress) => map.n_long,
        (_, GestureKind::ShortPress) => map.s_short,
        (_, GestureKind::LongPress) => map.s_long,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionMap, PoleMode};

    fn differentiated() -> EngineConfig {
        EngineConfig {
            pole_mode: PoleMode::Differentiated,
            actions: ActionMap {
                n_short: Action::MediaToggle,
                n_long: Action::VoiceAssist,
                s_short: Action::MediaNext,
                s_long: Action::VolumeDown,
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn each_cell_of_the_map_is_reachable() {
        let config = differentiated();
        assert_eq!(resolve(&Gesture::short(Polarity::North), &config), Action::MediaToggle);
        assert_eq!(resolve(&Gesture::long(Polarity::North), &config), Action::VoiceAssist);
        assert_eq!(resolve(&Gesture::short(Polarity::South), &config), Action::MediaNext);
        assert_eq!(resolve(&Gesture::long(Polarity::South), &config), Action::VolumeDown);
    }

    #[test]
    fn unclassified_pole_reads_south_side() {
        let config = differentiated();
        assert_eq!(resolve(&Gesture::short(Polarity::None), &config), Action::MediaNext);
        assert_eq!(resolve(&Gesture::long(Polarity::None), &config), Action::VolumeDown);
    }

    #[test]
    fn symmetric_map_ignores_pole() {
        let config = EngineConfig::default();
        for pole in [Polarity::North, Polarity::South, Polarity::None] {
            assert_eq!(resolve(&Gesture::short(pole), &config), Action::MediaToggle);
            assert_eq!(resolve(&Gesture::long(pole), &config), Action::VoiceAssist);
        }
    }

    #[test]
    fn same_input_same_output() {
        let config = differentiated();
        let gesture = Gesture::long(Polarity::South);
        let first = resolve(&gesture, &config);
        for _ in 0..10 {
            assert_eq!(resolve(&gesture, &config), first);
        }
    }
}
