//! State carried from one iteration to the next.

use policyforge_harness::Candidate;
use serde::{Deserialize, Serialize};

/// The winner of an iteration together with the best score it was judged against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub best_before: f64,
}

impl ChosenCandidate {
    pub fn improved(&self) -> bool {
        self.score > self.best_before
    }

    /// Sentence handed to the next refine prompt.
    pub fn feedback(&self) -> String {
        if self.improved() {
            format!(
                "Great! Policy improved from {:.4} to {:.4}. Please refine further, preserving the winning mechanism.",
                self.best_before, self.score
            )
        } else {
            format!(
                "Policy scored {:.4}, not better than {:.4}. Try a materially different mechanism.",
                self.score, self.best_before
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    pub iteration_index: usize,
    pub best_score_so_far: f64,
    pub previous_chosen: Option<ChosenCandidate>,
}

impl IterationState {
    pub fn new(initial_best: f64) -> Self {
        Self {
            iteration_index: 0,
            best_score_so_far: initial_best,
            previous_chosen: None,
        }
    }

    /// State for the next iteration.
    ///
    /// Without a winner only the index moves; the best score and the previous
    /// choice stay as they were. The best score never decreases.
    pub fn advance(&self, chosen: Option<(Candidate, f64)>) -> IterationState {
        match chosen {
            None => IterationState {
                iteration_index: self.iteration_index + 1,
                ..self.clone()
            },
            Some((candidate, score)) => IterationState {
                iteration_index: self.iteration_index + 1,
                best_score_so_far: self.best_score_so_far.max(score),
                previous_chosen: Some(ChosenCandidate {
                    candidate,
                    score,
                    best_before: self.best_score_so_far,
                }),
            },
        }
    }
}

/// True when `chosen_score` beats a positive `pre_iteration_best` by more than `ratio`.
pub fn early_exit(pre_iteration_best: f64, chosen_score: f64, ratio: f64) -> bool {
    pre_iteration_best > 0.0 && chosen_score / pre_iteration_best > ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyforge_harness::ResponseSections;

    fn candidate(iteration: usize, name: &str) -> Candidate {
        Candidate::new(
            iteration,
            0,
            ResponseSections {
                name: name.into(),
                description: "d".into(),
                code: "int x;".into(),
            },
        )
    }

    #[test]
    fn test_best_score_is_monotone() {
        let scores = [0.8, 1.2, 0.5, 1.1, 1.3, 0.0];
        let mut state = IterationState::new(1.0);
        let mut history = vec![state.best_score_so_far];
        for (i, score) in scores.iter().enumerate() {
            state = state.advance(Some((candidate(i, "p"), *score)));
            history.push(state.best_score_so_far);
        }
        assert!(history.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(state.best_score_so_far, 1.3);
        assert_eq!(state.iteration_index, scores.len());
    }

    #[test]
    fn test_skipped_iteration_keeps_state() {
        let state = IterationState::new(0.9).advance(Some((candidate(0, "a"), 1.0)));
        let skipped = state.advance(None);
        assert_eq!(skipped.iteration_index, 2);
        assert_eq!(skipped.best_score_so_far, state.best_score_so_far);
        assert_eq!(skipped.previous_chosen, state.previous_chosen);
    }

    #[test]
    fn test_previous_choice_remembers_best_before() {
        let state = IterationState::new(1.0).advance(Some((candidate(0, "a"), 0.7)));
        let chosen = state.previous_chosen.unwrap();
        assert_eq!(chosen.best_before, 1.0);
        assert!(!chosen.improved());
        assert_eq!(
            chosen.feedback(),
            "Policy scored 0.7000, not better than 1.0000. Try a materially different mechanism."
        );
        assert_eq!(state.best_score_so_far, 1.0);
    }

    #[test]
    fn test_improvement_feedback() {
        let state = IterationState::new(1.0).advance(Some((candidate(0, "a"), 1.25)));
        let chosen = state.previous_chosen.unwrap();
        assert!(chosen.improved());
        assert!(chosen.feedback().starts_with("Great! Policy improved from 1.0000 to 1.2500."));
    }

    #[test]
    fn test_early_exit_rule() {
        assert!(early_exit(1.0, 1.31, 1.3));
        assert!(!early_exit(1.0, 1.3, 1.3));
        assert!(!early_exit(0.0, 5.0, 1.3));
        assert!(!early_exit(-1.0, 5.0, 1.3));
    }
}
