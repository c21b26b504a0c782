use serde::{Deserialize, Serialize};

use crate::entity::SurvivorId;

/// Minimal view of a living survivor for ranking.
#[derive(Clone, Debug, PartialEq)]
pub struct PodiumCandidate {
    pub id: SurvivorId,
    pub name: String,
    pub energy: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PodiumEntry {
    /// 1-based.
    pub rank: usize,
    pub id: SurvivorId,
    pub name: String,
    pub energy: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PodiumOutcome {
    Hidden,
    Ranked(Vec<PodiumEntry>),
    Winner(PodiumEntry),
}

impl PodiumOutcome {
    pub fn entries(&self) -> Vec<PodiumEntry> {
        match self {
            PodiumOutcome::Hidden => Vec::new(),
            PodiumOutcome::Ranked(entries) => entries.clone(),
            PodiumOutcome::Winner(entry) => vec![entry.clone()],
        }
    }
}

/// Rank the living survivors once few enough remain.
///
/// Candidates must be given in creation order; equal energies keep that order.
pub fn select(candidates: &[PodiumCandidate], threshold: usize, places: usize) -> PodiumOutcome {
    if candidates.is_empty() || candidates.len() > threshold {
        return PodiumOutcome::Hidden;
    }

    let mut ranked: Vec<&PodiumCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.energy.total_cmp(&a.energy));

    let entries: Vec<PodiumEntry> = ranked
        .into_iter()
        .take(places)
        .enumerate()
        .map(|(i, c)| PodiumEntry {
            rank: i + 1,
            id: c.id,
            name: c.name.clone(),
            energy: c.energy,
        })
        .collect();

    if candidates.len() == 1 {
        match entries.into_iter().next() {
            Some(entry) => PodiumOutcome::Winner(entry),
            None => PodiumOutcome::Hidden,
        }
    } else {
        PodiumOutcome::Ranked(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, energy: f32) -> PodiumCandidate {
        PodiumCandidate {
            id: SurvivorId(id),
            name: format!("S{id}"),
            energy,
        }
    }

    #[test]
    fn hidden_above_threshold() {
        let population: Vec<_> = (0..11).map(|i| candidate(i, 10.0)).collect();
        assert_eq!(select(&population, 10, 3), PodiumOutcome::Hidden);
        assert_eq!(select(&[], 10, 3), PodiumOutcome::Hidden);
    }

    #[test]
    fn top_three_by_descending_energy() {
        let population = vec![
            candidate(0, 12.0),
            candidate(1, 40.0),
            candidate(2, 5.0),
            candidate(3, 33.0),
        ];
        let PodiumOutcome::Ranked(entries) = select(&population, 10, 3) else {
            panic!("expected a ranking");
        };
        let ids: Vec<u32> = entries.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 3, 0]);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[2].rank, 3);
    }

    #[test]
    fn ties_keep_creation_order() {
        let population = vec![candidate(4, 20.0), candidate(2, 20.0), candidate(7, 20.0)];
        let entries = select(&population, 10, 3).entries();
        let ids: Vec<u32> = entries.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![4, 2, 7]);
    }

    #[test]
    fn fewer_than_three_ranks_everyone() {
        let population = vec![candidate(0, 1.0), candidate(1, 2.0)];
        assert_eq!(select(&population, 10, 3).entries().len(), 2);
    }

    #[test]
    fn single_survivor_is_the_winner() {
        let outcome = select(&[candidate(5, 17.0)], 10, 3);
        match outcome {
            PodiumOutcome::Winner(entry) => {
                assert_eq!(entry.id, SurvivorId(5));
                assert_eq!(entry.rank, 1);
            }
            other => panic!("expected winner, got {other:?}"),
        }
    }
}
