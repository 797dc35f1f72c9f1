use serde::Serialize;

use super::snapshot::{ClusterSnapshot, NodeLoad};

/// Most and least loaded nodes of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Extremes<'a> {
    pub highest: &'a NodeLoad,
    pub lowest: &'a NodeLoad,
}

impl Extremes<'_> {
    pub fn spread(&self) -> f64 {
        self.highest.load_score() - self.lowest.load_score()
    }

    pub fn is_same_node(&self) -> bool {
        self.highest.name == self.lowest.name
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Detection<'a> {
    /// No usable nodes in the snapshot.
    Empty,
    Balanced(Extremes<'a>),
    Imbalanced(Extremes<'a>),
}

/// Score of one node, detached from the snapshot for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeScore {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub load_score: f64,
}

impl From<&NodeLoad> for NodeScore {
    fn from(node: &NodeLoad) -> Self {
        Self {
            name: node.name.clone(),
            cpu_percent: node.cpu_percent,
            memory_percent: node.memory_usage_percent(),
            load_score: node.load_score(),
        }
    }
}

/// Argmax and argmin of the load score.
///
/// Comparisons are strict, so on equal scores the node seen first in snapshot
/// order wins both ways.
pub fn find_extremes(snapshot: &ClusterSnapshot) -> Option<Extremes<'_>> {
    let mut nodes = snapshot.nodes();
    let first = nodes.next()?;

    let mut extremes = Extremes {
        highest: first,
        lowest: first,
    };
    let mut highest_score = first.load_score();
    let mut lowest_score = highest_score;

    for node in nodes {
        let score = node.load_score();
        if score > highest_score {
            highest_score = score;
            extremes.highest = node;
        }
        if score < lowest_score {
            lowest_score = score;
            extremes.lowest = node;
        }
    }

    Some(extremes)
}

/// Imbalance exists when the spread reaches `load_threshold` (inclusive) and
/// the extremes are two different nodes.
pub fn detect(snapshot: &ClusterSnapshot, load_threshold: f64) -> Detection<'_> {
    match find_extremes(snapshot) {
        None => Detection::Empty,
        Some(extremes) if extremes.is_same_node() => Detection::Balanced(extremes),
        Some(extremes) if extremes.spread() >= load_threshold => Detection::Imbalanced(extremes),
        Some(extremes) => Detection::Balanced(extremes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn node(name: &str, cpu: f64, mem_percent: u64) -> NodeLoad {
        NodeLoad {
            name: name.to_string(),
            cpu_percent: cpu,
            memory_used_bytes: mem_percent,
            memory_total_bytes: 100,
            running_workloads: Vec::new(),
        }
    }

    fn snapshot(nodes: Vec<NodeLoad>) -> ClusterSnapshot {
        nodes.into_iter().collect()
    }

    #[test]
    fn test_scenario_a_picks_source_and_target() {
        let snap = snapshot(vec![node("x", 80.0, 90), node("y", 10.0, 10)]);
        match detect(&snap, 20.0) {
            Detection::Imbalanced(ex) => {
                assert_eq!(ex.highest.name, "x");
                assert_eq!(ex.lowest.name, "y");
                assert!((ex.spread() - 150.0).abs() < 1e-9);
            }
            other => panic!("expected imbalance, got {:?}", other),
        }
    }

    #[test]
    fn test_scenario_c_small_spread_is_balanced() {
        let snap = snapshot(vec![node("x", 30.0, 30), node("y", 25.0, 30)]);
        assert!(matches!(detect(&snap, 20.0), Detection::Balanced(_)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let exact = snapshot(vec![node("x", 30.0, 50), node("y", 10.0, 50)]);
        assert!(matches!(detect(&exact, 20.0), Detection::Imbalanced(_)));

        let just_below = snapshot(vec![node("x", 29.999, 50), node("y", 10.0, 50)]);
        assert!(matches!(detect(&just_below, 20.0), Detection::Balanced(_)));
    }

    #[test]
    fn test_ties_go_to_first_in_order() {
        let snap = snapshot(vec![
            node("a", 50.0, 50),
            node("b", 10.0, 10),
            node("c", 50.0, 50),
            node("d", 10.0, 10),
        ]);
        let ex = find_extremes(&snap).unwrap();
        assert_eq!(ex.highest.name, "a");
        assert_eq!(ex.lowest.name, "b");
    }

    #[test]
    fn test_single_node_never_imbalanced() {
        let snap = snapshot(vec![node("solo", 100.0, 100)]);
        assert!(matches!(detect(&snap, 0.0), Detection::Balanced(ex) if ex.is_same_node()));
    }

    #[test]
    fn test_all_equal_scores_are_balanced_even_at_zero_threshold() {
        let snap = snapshot(vec![node("a", 20.0, 20), node("b", 20.0, 20)]);
        assert!(matches!(detect(&snap, 0.0), Detection::Balanced(_)));
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(matches!(detect(&ClusterSnapshot::default(), 20.0), Detection::Empty));
    }

    #[test]
    fn test_extremes_match_argmax_and_argmin() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let count = rng.gen_range(2..8);
            let nodes: Vec<NodeLoad> = (0..count)
                .map(|i| {
                    // Coarse values so ties actually happen.
                    let cpu = rng.gen_range(0..5) as f64 * 10.0;
                    let mem = rng.gen_range(0..5) * 10;
                    node(&format!("n{}", i), cpu, mem)
                })
                .collect();
            let scores: Vec<f64> = nodes.iter().map(|n| n.load_score()).collect();
            let snap = snapshot(nodes);

            let max = scores.iter().cloned().fold(f64::MIN, f64::max);
            let min = scores.iter().cloned().fold(f64::MAX, f64::min);
            let first_max = scores.iter().position(|s| *s == max).unwrap();
            let first_min = scores.iter().position(|s| *s == min).unwrap();

            let ex = find_extremes(&snap).unwrap();
            assert_eq!(ex.highest.name, format!("n{}", first_max));
            assert_eq!(ex.lowest.name, format!("n{}", first_min));

            // Detection is a pure function of the snapshot.
            let again = find_extremes(&snap).unwrap();
            assert_eq!(again.highest.name, ex.highest.name);
            assert_eq!(again.lowest.name, ex.lowest.name);
        }
    }
}
