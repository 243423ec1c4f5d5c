// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Properties of the scoring rule checked over every score up to 8-8.

use scorecast::services::scoring::{CORRECT_OUTCOME_POINTS, EXACT_SCORE_POINTS};
use scorecast::services::{score, ScoreReason};

const MAX: u32 = 8;

fn grid() -> impl Iterator<Item = (u32, u32, u32, u32)> {
    (0..=MAX).flat_map(|ph| {
        (0..=MAX).flat_map(move |pa| {
            (0..=MAX).flat_map(move |ah| (0..=MAX).map(move |aa| (ph, pa, ah, aa)))
        })
    })
}

#[test]
fn test_points_are_always_0_2_or_5() {
    for (ph, pa, ah, aa) in grid() {
        let outcome = score(ph, pa, Some(ah), Some(aa)).unwrap();
        assert!(
            [0, CORRECT_OUTCOME_POINTS, EXACT_SCORE_POINTS].contains(&outcome.points),
            "{ph}-{pa} vs {ah}-{aa}"
        );
    }
}

#[test]
fn test_exact_iff_scores_match() {
    for (ph, pa, ah, aa) in grid() {
        let outcome = score(ph, pa, Some(ah), Some(aa)).unwrap();
        let exact = ph == ah && pa == aa;
        assert_eq!(outcome.reason == ScoreReason::ExactScore, exact);
        assert_eq!(outcome.points == EXACT_SCORE_POINTS, exact);
    }
}

#[test]
fn test_points_follow_outcome_agreement() {
    for (ph, pa, ah, aa) in grid() {
        let outcome = score(ph, pa, Some(ah), Some(aa)).unwrap();
        let same_outcome = ph.cmp(&pa) == ah.cmp(&aa);
        if same_outcome {
            assert!(outcome.points >= CORRECT_OUTCOME_POINTS);
        } else {
            assert_eq!(outcome.points, 0);
            assert_eq!(outcome.reason, ScoreReason::Incorrect);
        }
    }
}

#[test]
fn test_mirroring_both_scores_preserves_points() {
    for (ph, pa, ah, aa) in grid() {
        let direct = score(ph, pa, Some(ah), Some(aa)).unwrap();
        let mirrored = score(pa, ph, Some(aa), Some(ah)).unwrap();
        assert_eq!(direct, mirrored);
    }
}

#[test]
fn test_missing_final_score_is_rejected() {
    for goals in 0..=MAX {
        assert!(score(goals, goals, None, Some(goals)).is_err());
        assert!(score(goals, goals, Some(goals), None).is_err());
        assert!(score(goals, goals, None, None).is_err());
    }
}
