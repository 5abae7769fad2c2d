use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a set of votes is turned into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrategy {
    /// More approvals than rejections; ties reject.
    Majority,
    /// More approving weight than rejecting weight.
    Weighted,
    /// Any rejection vetoes.
    Veto,
}

impl std::fmt::Display for ConsensusStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusStrategy::Majority => write!(f, "majority"),
            ConsensusStrategy::Weighted => write!(f, "weighted"),
            ConsensusStrategy::Veto => write!(f, "veto"),
        }
    }
}

impl std::str::FromStr for ConsensusStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "majority" => Ok(ConsensusStrategy::Majority),
            "weighted" => Ok(ConsensusStrategy::Weighted),
            "veto" => Ok(ConsensusStrategy::Veto),
            other => Err(format!("unknown consensus strategy '{other}'")),
        }
    }
}

/// Outcome of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
    Vetoed,
    Deadlock,
}

/// A single agent's vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: String,
    pub approve: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Negative, NaN and infinite weights carry no voting power.
fn effective_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

impl Vote {
    /// A vote with weight 1.0.
    pub fn new(voter: impl Into<String>, approve: bool) -> Self {
        Self {
            voter: voter.into(),
            approve,
            weight: default_weight(),
            reason: None,
        }
    }

    /// A vote with an explicit weight. Negative or non-finite weights count as zero.
    pub fn weighted(voter: impl Into<String>, approve: bool, weight: f64) -> Self {
        Self {
            weight: effective_weight(weight),
            ..Self::new(voter, approve)
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A decision together with everything needed to audit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub decision: Decision,
    /// Fraction of support in `[0, 1]`, weight-adjusted for weighted votes.
    pub approval_score: f64,
    pub votes: Vec<Vote>,
    pub strategy: ConsensusStrategy,
}

impl ConsensusResult {
    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}

/// Resolve `votes` under `strategy`.
pub fn resolve(votes: Vec<Vote>, strategy: ConsensusStrategy) -> ConsensusResult {
    if votes.is_empty() {
        return deadlock(votes, strategy);
    }

    let approvals = votes.iter().filter(|v| v.approve).count();
    let rejections = votes.len() - approvals;
    let count_score = approvals as f64 / votes.len() as f64;

    let (decision, approval_score) = match strategy {
        ConsensusStrategy::Majority => {
            let decision = if approvals > rejections {
                Decision::Approved
            } else {
                Decision::Rejected
            };
            (decision, count_score)
        }
        ConsensusStrategy::Weighted => {
            let weight = |approve: bool| -> f64 {
                votes
                    .iter()
                    .filter(|v| v.approve == approve)
                    .map(|v| effective_weight(v.weight))
                    .sum()
            };
            let (for_weight, against_weight) = (weight(true), weight(false));
            let total = for_weight + against_weight;
            if total <= 0.0 {
                return deadlock(votes, strategy);
            }
            let decision = if for_weight > against_weight {
                Decision::Approved
            } else {
                Decision::Rejected
            };
            (decision, for_weight / total)
        }
        ConsensusStrategy::Veto => {
            let decision = if rejections > 0 {
                Decision::Vetoed
            } else {
                Decision::Approved
            };
            (decision, count_score)
        }
    };

    debug!(
        %strategy,
        votes = votes.len(),
        approval_score,
        decision = ?decision,
        "Consensus resolved"
    );
    ConsensusResult {
        decision,
        approval_score,
        votes,
        strategy,
    }
}

fn deadlock(votes: Vec<Vote>, strategy: ConsensusStrategy) -> ConsensusResult {
    ConsensusResult {
        decision: Decision::Deadlock,
        approval_score: 0.0,
        votes,
        strategy,
    }
}

/// Resolves votes with a default strategy and a minimum voter count.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    strategy: ConsensusStrategy,
    quorum: usize,
}

impl ConsensusEngine {
    /// Engine with the given default strategy and a quorum of one vote.
    pub fn new(strategy: ConsensusStrategy) -> Self {
        Self {
            strategy,
            quorum: 1,
        }
    }

    /// Require at least `quorum` distinct voters; fewer deadlocks.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum.max(1);
        self
    }

    pub fn strategy(&self) -> ConsensusStrategy {
        self.strategy
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Resolve with the engine's default strategy.
    pub fn decide(&self, votes: Vec<Vote>) -> ConsensusResult {
        self.resolve(votes, self.strategy)
    }

    /// Resolve with an explicit strategy.
    ///
    /// When one voter casts several votes only the last one counts.
    pub fn resolve(&self, votes: Vec<Vote>, strategy: ConsensusStrategy) -> ConsensusResult {
        let votes = dedup_last_wins(votes);
        if votes.len() < self.quorum {
            debug!(
                votes = votes.len(),
                quorum = self.quorum,
                "Quorum not reached"
            );
            return deadlock(votes, strategy);
        }
        resolve(votes, strategy)
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ConsensusStrategy::Majority)
    }
}

fn dedup_last_wins(votes: Vec<Vote>) -> Vec<Vote> {
    let mut kept: Vec<Vote> = Vec::with_capacity(votes.len());
    for vote in votes {
        match kept.iter_mut().find(|v| v.voter == vote.voter) {
            Some(existing) => *existing = vote,
            None => kept.push(vote),
        }
    }
    kept
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ALL: [ConsensusStrategy; 3] = [
        ConsensusStrategy::Majority,
        ConsensusStrategy::Weighted,
        ConsensusStrategy::Veto,
    ];

    #[test]
    fn test_empty_votes_deadlock_for_every_strategy() {
        for strategy in ALL {
            let result = resolve(vec![], strategy);
            assert_eq!(result.decision, Decision::Deadlock);
            assert_eq!(result.approval_score, 0.0);
            assert_eq!(result.strategy, strategy);
        }
    }

    #[test]
    fn test_majority() {
        let result = resolve(
            vec![
                Vote::new("a", true),
                Vote::new("b", true),
                Vote::new("c", false),
            ],
            ConsensusStrategy::Majority,
        );
        assert_eq!(result.decision, Decision::Approved);
        assert!((result.approval_score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.votes.len(), 3);
    }

    #[test]
    fn test_majority_tie_rejects() {
        let result = resolve(
            vec![Vote::new("a", true), Vote::new("b", false)],
            ConsensusStrategy::Majority,
        );
        assert_eq!(result.decision, Decision::Rejected);
        assert_eq!(result.approval_score, 0.5);
    }

    #[test]
    fn test_weighted_heavy_approval_wins() {
        let result = resolve(
            vec![
                Vote::weighted("lead", true, 3.0),
                Vote::weighted("junior", false, 1.0),
            ],
            ConsensusStrategy::Weighted,
        );
        assert_eq!(result.decision, Decision::Approved);
        assert_eq!(result.approval_score, 0.75);
    }

    #[test]
    fn test_weighted_outvoted_by_weight() {
        let result = resolve(
            vec![
                Vote::weighted("a", true, 1.0),
                Vote::weighted("b", true, 1.0),
                Vote::weighted("lead", false, 5.0),
            ],
            ConsensusStrategy::Weighted,
        );
        assert_eq!(result.decision, Decision::Rejected);
        assert!(result.approval_score < 0.5);
    }

    #[test]
    fn test_weighted_zero_weight_deadlocks() {
        let result = resolve(
            vec![Vote::weighted("a", true, 0.0), Vote::weighted("b", false, -2.0)],
            ConsensusStrategy::Weighted,
        );
        assert_eq!(result.decision, Decision::Deadlock);
    }

    #[test]
    fn test_veto() {
        let unanimous = resolve(
            vec![Vote::new("a", true), Vote::new("b", true)],
            ConsensusStrategy::Veto,
        );
        assert_eq!(unanimous.decision, Decision::Approved);
        assert_eq!(unanimous.approval_score, 1.0);

        let vetoed = resolve(
            vec![
                Vote::new("a", true),
                Vote::new("b", true),
                Vote::new("c", false).with_reason("unsafe"),
            ],
            ConsensusStrategy::Veto,
        );
        assert_eq!(vetoed.decision, Decision::Vetoed);
        assert_eq!(vetoed.votes[2].reason.as_deref(), Some("unsafe"));
    }

    #[test]
    fn test_score_is_normalized() {
        for strategy in ALL {
            let result = resolve(
                vec![
                    Vote::weighted("a", true, 7.0),
                    Vote::weighted("b", false, 0.5),
                    Vote::new("c", true),
                ],
                strategy,
            );
            assert!((0.0..=1.0).contains(&result.approval_score));
        }

        // Weights that bypassed the constructor, e.g. via deserialization.
        let mut infinite = Vote::new("a", true);
        infinite.weight = f64::INFINITY;
        let mut nan = Vote::new("c", true);
        nan.weight = f64::NAN;
        let result = resolve(
            vec![infinite, Vote::weighted("b", false, 1.0), nan],
            ConsensusStrategy::Weighted,
        );
        assert_eq!(result.decision, Decision::Rejected);
        assert_eq!(result.approval_score, 0.0);
    }

    #[test]
    fn test_non_finite_weight_is_zeroed() {
        assert_eq!(Vote::weighted("a", true, f64::INFINITY).weight, 0.0);
        assert_eq!(Vote::weighted("a", true, f64::NAN).weight, 0.0);

        let result = resolve(
            vec![
                Vote::weighted("a", true, f64::INFINITY),
                Vote::weighted("b", false, 1.0),
            ],
            ConsensusStrategy::Weighted,
        );
        assert!(result.approval_score.is_finite());
        assert!((0.0..=1.0).contains(&result.approval_score));
        assert_eq!(result.decision, Decision::Rejected);
    }

    #[test]
    fn test_negative_weight_is_clamped() {
        assert_eq!(Vote::weighted("a", true, -4.0).weight, 0.0);
    }

    #[test]
    fn test_engine_quorum() {
        let engine = ConsensusEngine::new(ConsensusStrategy::Majority).with_quorum(3);
        let result = engine.decide(vec![Vote::new("a", true), Vote::new("b", true)]);
        assert_eq!(result.decision, Decision::Deadlock);

        let result = engine.decide(vec![
            Vote::new("a", true),
            Vote::new("b", true),
            Vote::new("c", false),
        ]);
        assert!(result.is_approved());
    }

    #[test]
    fn test_engine_last_vote_per_voter_wins() {
        let engine = ConsensusEngine::default();
        let result = engine.decide(vec![
            Vote::new("a", true),
            Vote::new("b", false),
            Vote::new("b", true),
        ]);
        assert_eq!(result.votes.len(), 2);
        assert_eq!(result.decision, Decision::Approved);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "Weighted".parse::<ConsensusStrategy>().unwrap(),
            ConsensusStrategy::Weighted
        );
        assert!("plurality".parse::<ConsensusStrategy>().is_err());
    }
}
