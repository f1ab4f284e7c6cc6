// crates/bactrace-cli/src/dispatch.rs

//! Selection of parallel restarts.
//!
//! Workers are independent; each runs the whole sliding-window schedule
//! on its own cloned state and writes into its own directory tree. Only
//! the ranking of finished results happens here.

use std::collections::VecDeque;
use std::path::PathBuf;

use clap::ValueEnum;

/// How finished restarts are ranked before keeping the first `keep`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Lowest final cost first.
    #[value(name = "best-wins")]
    BestWins,
    /// Highest final cost first.
    #[value(name = "worst-wins")]
    WorstWins,
    /// Alternate between the best and worst remaining results.
    #[value(name = "extreme-wins")]
    ExtremeWins,
}

/// One finished worker.
#[derive(Clone, Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub cost: f64,
    pub output_root: PathBuf,
}

/// Rank `outcomes` by `strategy` and keep the first `keep`.
#[must_use]
pub fn select(mut outcomes: Vec<WorkerOutcome>, strategy: Strategy, keep: usize) -> Vec<WorkerOutcome> {
    match strategy {
        Strategy::BestWins => outcomes.sort_by(|a, b| a.cost.total_cmp(&b.cost)),
        Strategy::WorstWins => outcomes.sort_by(|a, b| b.cost.total_cmp(&a.cost)),
        Strategy::ExtremeWins => {
            outcomes.sort_by(|a, b| a.cost.total_cmp(&b.cost));
            outcomes = interleave_extremes(outcomes);
        }
    }
    outcomes.truncate(keep);
    outcomes
}

fn interleave_extremes(sorted: Vec<WorkerOutcome>) -> Vec<WorkerOutcome> {
    let mut queue: VecDeque<WorkerOutcome> = sorted.into();
    let mut result = Vec::with_capacity(queue.len());
    let mut take_best = true;
    loop {
        let next = if take_best {
            queue.pop_front()
        } else {
            queue.pop_back()
        };
        match next {
            Some(outcome) => result.push(outcome),
            None => break,
        }
        take_best = !take_best;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(costs: &[f64]) -> Vec<WorkerOutcome> {
        costs
            .iter()
            .enumerate()
            .map(|(worker, &cost)| WorkerOutcome {
                worker,
                cost,
                output_root: PathBuf::new(),
            })
            .collect()
    }

    #[test]
    fn best_wins_keeps_the_cheapest() {
        let kept = select(outcomes(&[5.0, 1.0, 3.0]), Strategy::BestWins, 2);
        assert_eq!(kept.iter().map(|o| o.cost).collect::<Vec<_>>(), [1.0, 3.0]);
    }

    #[test]
    fn worst_wins_keeps_the_most_expensive() {
        let kept = select(outcomes(&[5.0, 1.0, 3.0]), Strategy::WorstWins, 1);
        assert_eq!(kept[0].cost, 5.0);
    }

    #[test]
    fn extreme_wins_alternates_ends() {
        let kept = select(outcomes(&[4.0, 1.0, 3.0, 2.0]), Strategy::ExtremeWins, 4);
        assert_eq!(
            kept.iter().map(|o| o.cost).collect::<Vec<_>>(),
            [1.0, 4.0, 2.0, 3.0]
        );
    }
}
