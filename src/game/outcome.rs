//! Outcome evaluation - who won, and whether the match is decided yet

use super::r#match::{Match, Slot};

/// When the evaluator is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// After a kill; decides only if one side reached the threshold
    KillThreshold,
    /// At countdown expiry; always decides
    Timeout,
}

/// Evaluate a match snapshot. `None` means no decision yet.
pub fn evaluate(game: &Match, mode: EvaluationMode, kill_threshold: u32) -> Option<Slot> {
    match mode {
        EvaluationMode::KillThreshold => threshold_winner(game, kill_threshold),
        EvaluationMode::Timeout => Some(timeout_winner(game)),
    }
}

fn threshold_winner(game: &Match, kill_threshold: u32) -> Option<Slot> {
    let one = game.player1.kills >= kill_threshold;
    let two = game.player2.kills >= kill_threshold;
    match (one, two) {
        (true, false) => Some(Slot::One),
        (false, true) => Some(Slot::Two),
        _ => None,
    }
}

/// Kills, then remaining hit points, then slot 1.
/// Settlement needs exactly one winner, so there is no draw.
fn timeout_winner(game: &Match) -> Slot {
    let (p1, p2) = (&game.player1, &game.player2);
    match p1.kills.cmp(&p2.kills).then(p1.hp.cmp(&p2.hp)) {
        std::cmp::Ordering::Less => Slot::Two,
        _ => Slot::One,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::tests::test_match;

    fn with_stats(kills: (u32, u32), hp: (u32, u32)) -> Match {
        let mut m = test_match(100);
        m.player1.kills = kills.0;
        m.player2.kills = kills.1;
        m.player1.hp = hp.0;
        m.player2.hp = hp.1;
        m
    }

    #[test]
    fn test_threshold_undecided_below_threshold() {
        let m = with_stats((2, 2), (100, 100));
        assert_eq!(evaluate(&m, EvaluationMode::KillThreshold, 3), None);
    }

    #[test]
    fn test_threshold_single_side() {
        let m = with_stats((3, 1), (100, 100));
        assert_eq!(evaluate(&m, EvaluationMode::KillThreshold, 3), Some(Slot::One));

        let m = with_stats((0, 4), (100, 100));
        assert_eq!(evaluate(&m, EvaluationMode::KillThreshold, 3), Some(Slot::Two));
    }

    #[test]
    fn test_threshold_both_sides_undecided() {
        let m = with_stats((3, 3), (100, 100));
        assert_eq!(evaluate(&m, EvaluationMode::KillThreshold, 3), None);
    }

    #[test]
    fn test_timeout_more_kills_wins() {
        let m = with_stats((1, 2), (100, 5));
        assert_eq!(evaluate(&m, EvaluationMode::Timeout, 3), Some(Slot::Two));
    }

    #[test]
    fn test_timeout_kill_tie_higher_hp_wins() {
        let m = with_stats((2, 2), (40, 70));
        assert_eq!(evaluate(&m, EvaluationMode::Timeout, 3), Some(Slot::Two));

        let m = with_stats((2, 2), (70, 40));
        assert_eq!(evaluate(&m, EvaluationMode::Timeout, 3), Some(Slot::One));
    }

    #[test]
    fn test_timeout_full_tie_goes_to_slot_one() {
        let m = with_stats((1, 1), (55, 55));
        assert_eq!(evaluate(&m, EvaluationMode::Timeout, 3), Some(Slot::One));
    }

    #[test]
    fn test_timeout_always_decides() {
        for k1 in 0..4 {
            for k2 in 0..4 {
                for hp in [0, 50, 100] {
                    let m = with_stats((k1, k2), (hp, 100 - hp));
                    assert!(evaluate(&m, EvaluationMode::Timeout, 3).is_some());
                }
            }
        }
    }
}
