//! Coin selection policy
//!
//! Chooses which spendable outputs fund a build request. Candidates are
//! sorted once into a mode-specific total order, then consumed by a
//! cursor walk that accumulates value until the target is covered or the
//! input cap is hit. The cursor survives the first pass so the single
//! fee-driven re-selection continues the same order without re-sorting.

use crate::types::SpendableOutput;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Candidate ordering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Oldest first (ascending DAA score, ties by ascending amount),
    /// consolidating aged dust-like outputs
    Auto,
    /// Descending amount, minimizing input count
    LargestFirst,
    /// Ascending amount, maximizing consolidation
    SmallestFirst,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Auto => "auto",
            SelectionMode::LargestFirst => "largest_first",
            SelectionMode::SmallestFirst => "smallest_first",
        }
    }
}

/// The outcome of selection for one build request
///
/// `truncated_by_cap` is set whenever the walk stopped short of the
/// required target, either because the input cap was hit or because the
/// candidates ran out; the orchestrator decides what to do with such a
/// deliberately weak plan.
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    pub mode: SelectionMode,
    pub inputs: Vec<SpendableOutput>,
    pub selected_amount: u64,
    pub required_target: u64,
    pub truncated_by_cap: bool,
}

impl SelectionPlan {
    /// Count of selected coinbase outputs, carried in the policy trace
    pub fn coinbase_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_coinbase).count()
    }
}

/// Stateful selector holding the sorted candidate order and a cursor
pub struct Selector {
    mode: SelectionMode,
    cap: usize,
    ordered: Vec<SpendableOutput>,
    cursor: usize,
    selected_amount: u64,
}

impl Selector {
    /// Sort candidates into the mode's total order. Zero-amount outputs
    /// are unspendable artifacts and are dropped up front.
    pub fn new(mode: SelectionMode, candidates: Vec<SpendableOutput>, cap: usize) -> Self {
        let mut ordered: Vec<SpendableOutput> =
            candidates.into_iter().filter(|c| c.amount > 0).collect();
        match mode {
            SelectionMode::Auto => ordered.sort_by_key(|c| {
                (c.confirmation_height, c.amount, c.transaction_id, c.index)
            }),
            SelectionMode::LargestFirst => {
                ordered.sort_by_key(|c| (Reverse(c.amount), c.transaction_id, c.index))
            }
            SelectionMode::SmallestFirst => {
                ordered.sort_by_key(|c| (c.amount, c.transaction_id, c.index))
            }
        }
        Self { mode, cap, ordered, cursor: 0, selected_amount: 0 }
    }

    /// Walk forward until `target` is covered, the cap is hit, or the
    /// candidates are exhausted. Calling again with a larger target
    /// continues from the cursor.
    pub fn extend_to(&mut self, target: u64) {
        while self.selected_amount < target
            && self.cursor < self.cap
            && self.cursor < self.ordered.len()
        {
            self.selected_amount = self.selected_amount.saturating_add(self.ordered[self.cursor].amount);
            self.cursor += 1;
        }
    }

    /// Take every remaining candidate up to the cap, regardless of
    /// target; used by the all-inputs fallback attempt
    pub fn extend_to_cap(&mut self) {
        while self.cursor < self.cap && self.cursor < self.ordered.len() {
            self.selected_amount = self.selected_amount.saturating_add(self.ordered[self.cursor].amount);
            self.cursor += 1;
        }
    }

    pub fn selected_amount(&self) -> u64 {
        self.selected_amount
    }

    pub fn selected_count(&self) -> usize {
        self.cursor
    }

    /// Candidates surviving the zero-amount filter
    pub fn total_available(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the current selection is a strict subset of the candidates
    pub fn is_strict_subset(&self) -> bool {
        self.cursor < self.ordered.len()
    }

    /// Snapshot the current state as a plan against `required_target`
    pub fn plan(&self, required_target: u64) -> SelectionPlan {
        SelectionPlan {
            mode: self.mode,
            inputs: self.ordered[..self.cursor].to_vec(),
            selected_amount: self.selected_amount,
            required_target,
            truncated_by_cap: self.selected_amount < required_target,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use proptest::prelude::*;

    fn output(seed: u8, amount: u64, height: u64) -> SpendableOutput {
        SpendableOutput {
            transaction_id: TransactionId::new([seed; 32]),
            index: 0,
            amount,
            script_bytes: vec![0x20, seed],
            confirmation_height: height,
            is_coinbase: false,
        }
    }

    #[test]
    fn test_auto_mode_selects_oldest_first() {
        // Amounts [300M, 100M, 200M, 500M] at heights [120, 100, 110,
        // 130], target 250M, cap 3
        let candidates = vec![
            output(1, 300_000_000, 120),
            output(2, 100_000_000, 100),
            output(3, 200_000_000, 110),
            output(4, 500_000_000, 130),
        ];
        let mut selector = Selector::new(SelectionMode::Auto, candidates, 3);
        selector.extend_to(250_000_000);
        let plan = selector.plan(250_000_000);

        assert_eq!(plan.inputs.len(), 2);
        assert_eq!(plan.inputs[0].confirmation_height, 100);
        assert_eq!(plan.inputs[1].confirmation_height, 110);
        assert_eq!(plan.selected_amount, 300_000_000);
        assert!(!plan.truncated_by_cap);
    }

    #[test]
    fn test_largest_first_single_sufficient_input() {
        let candidates = vec![output(1, 900_000_000, 50)];
        let mut selector = Selector::new(SelectionMode::LargestFirst, candidates, 1);
        selector.extend_to(200_000_000);
        let plan = selector.plan(200_000_000);

        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(plan.selected_amount, 900_000_000);
        assert!(!plan.truncated_by_cap);
    }

    #[test]
    fn test_smallest_first_consolidates() {
        let candidates =
            vec![output(1, 500, 10), output(2, 100, 20), output(3, 300, 30), output(4, 200, 40)];
        let mut selector = Selector::new(SelectionMode::SmallestFirst, candidates, 10);
        selector.extend_to(550);
        let plan = selector.plan(550);

        let amounts: Vec<u64> = plan.inputs.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![100, 200, 300]);
    }

    #[test]
    fn test_cap_truncates_selection() {
        let candidates = vec![output(1, 100, 1), output(2, 100, 2), output(3, 100, 3)];
        let mut selector = Selector::new(SelectionMode::SmallestFirst, candidates, 2);
        selector.extend_to(1_000);
        let plan = selector.plan(1_000);

        assert_eq!(plan.inputs.len(), 2);
        assert_eq!(plan.selected_amount, 200);
        assert!(plan.truncated_by_cap);
    }

    #[test]
    fn test_reselection_continues_same_order() {
        let candidates =
            vec![output(1, 100, 1), output(2, 200, 2), output(3, 300, 3), output(4, 400, 4)];
        let mut selector = Selector::new(SelectionMode::Auto, candidates, 10);
        selector.extend_to(250);
        assert_eq!(selector.selected_count(), 2);

        // Fee enlarged the target; the walk resumes at the cursor
        selector.extend_to(550);
        let plan = selector.plan(550);
        assert_eq!(plan.inputs.len(), 3);
        assert_eq!(plan.selected_amount, 600);
        assert!(!plan.truncated_by_cap);
    }

    #[test]
    fn test_zero_candidates_yield_empty_plan() {
        let mut selector = Selector::new(SelectionMode::Auto, vec![], 5);
        selector.extend_to(1_000);
        let plan = selector.plan(1_000);

        assert!(plan.inputs.is_empty());
        assert_eq!(plan.selected_amount, 0);
        assert!(plan.truncated_by_cap);
    }

    #[test]
    fn test_zero_amount_outputs_are_dropped() {
        let candidates = vec![output(1, 0, 1), output(2, 500, 2)];
        let selector = Selector::new(SelectionMode::Auto, candidates, 5);
        assert_eq!(selector.total_available(), 1);
    }

    proptest! {
        #[test]
        fn prop_selection_never_exceeds_cap(
            amounts in proptest::collection::vec(1u64..1_000_000, 0..40),
            cap in 1usize..10,
            target in 1u64..5_000_000,
        ) {
            let candidates: Vec<SpendableOutput> = amounts
                .iter()
                .enumerate()
                .map(|(i, &a)| output(i as u8, a, i as u64))
                .collect();
            let mut selector = Selector::new(SelectionMode::LargestFirst, candidates, cap);
            selector.extend_to(target);
            let plan = selector.plan(target);
            prop_assert!(plan.inputs.len() <= cap);
        }

        #[test]
        fn prop_auto_mode_is_height_ordered(
            entries in proptest::collection::vec((1u64..1_000_000, 0u64..10_000), 0..40),
            target in 1u64..10_000_000,
        ) {
            let candidates: Vec<SpendableOutput> = entries
                .iter()
                .enumerate()
                .map(|(i, &(a, h))| output(i as u8, a, h))
                .collect();
            let mut selector = Selector::new(SelectionMode::Auto, candidates, 64);
            selector.extend_to(target);
            let plan = selector.plan(target);
            for pair in plan.inputs.windows(2) {
                prop_assert!(pair[0].confirmation_height <= pair[1].confirmation_height);
            }
        }

        #[test]
        fn prop_untruncated_plans_cover_target(
            amounts in proptest::collection::vec(1u64..1_000_000, 0..40),
            target in 1u64..5_000_000,
        ) {
            let candidates: Vec<SpendableOutput> = amounts
                .iter()
                .enumerate()
                .map(|(i, &a)| output(i as u8, a, i as u64))
                .collect();
            let mut selector = Selector::new(SelectionMode::SmallestFirst, candidates, 64);
            selector.extend_to(target);
            let plan = selector.plan(target);
            if !plan.truncated_by_cap {
                prop_assert!(plan.selected_amount >= plan.required_target);
            }
        }
    }
}
