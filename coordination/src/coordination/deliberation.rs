//! Deliberation: turning participant inputs into one candidate decision
//!
//! Each mode picks or builds a decision from the inputs and reports a
//! confidence plus the share of inputs backing that decision. The consensus
//! score is that backing share scaled by how many of the invited
//! participants actually answered.

use serde_json::{json, Map, Value};

use super::mode::CoordinationMode;
use super::transport::AgentResponse;

/// Confidence reported when the expert with the highest score decides
pub const EXPERT_CONFIDENCE: f64 = 0.8;

/// Confidence reported when the highest hierarchy level decides
pub const HIERARCHICAL_CONFIDENCE: f64 = 0.7;

/// Confidence reported for a merged collaborative decision
pub const COLLABORATIVE_CONFIDENCE: f64 = 0.6;

/// One participant's contribution to a round
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInput {
    pub agent_id: String,
    /// The proposed decision
    pub payload: Value,
    pub expertise_score: f64,
    pub hierarchy_level: i64,
    pub score: f64,
}

impl AgentInput {
    pub fn new(agent_id: &str, payload: Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            payload,
            expertise_score: 0.0,
            hierarchy_level: 0,
            score: 0.0,
        }
    }

    /// Build an input from a response payload.
    ///
    /// The proposal is the `decision` field when present, otherwise the
    /// whole payload. `expertise_score`, `hierarchy_level` and `score`
    /// default to zero.
    pub fn from_response(response: &AgentResponse) -> Self {
        let fields = response.payload.as_object();
        let number = |key: &str| fields.and_then(|f| f.get(key)).and_then(Value::as_f64);

        let payload = fields
            .and_then(|f| f.get("decision"))
            .cloned()
            .unwrap_or_else(|| response.payload.clone());

        Self {
            agent_id: response.agent_id.clone(),
            payload,
            expertise_score: number("expertise_score").unwrap_or(0.0),
            hierarchy_level: fields
                .and_then(|f| f.get("hierarchy_level"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
            score: number("score").unwrap_or(0.0),
        }
    }
}

/// Candidate decision produced by a mode
#[derive(Debug, Clone, PartialEq)]
pub struct DeliberationOutcome {
    pub decision: Value,
    pub confidence: f64,
    /// Weighted share of inputs agreeing with `decision`, in `[0, 1]`
    pub support: f64,
    /// Agent whose input was chosen, when a single input won
    pub decided_by: Option<String>,
}

/// Run the mode's deliberation over the inputs.
///
/// Returns `None` when there are no inputs.
pub fn deliberate(mode: CoordinationMode, inputs: &[AgentInput]) -> Option<DeliberationOutcome> {
    let first = inputs.first()?;

    let outcome = match mode {
        CoordinationMode::Consensus => {
            let unanimous = inputs.iter().all(|i| i.payload == first.payload);
            DeliberationOutcome {
                decision: first.payload.clone(),
                confidence: if unanimous { 1.0 } else { 0.0 },
                support: if unanimous { 1.0 } else { 0.0 },
                decided_by: unanimous.then(|| first.agent_id.clone()),
            }
        }
        CoordinationMode::Majority => {
            let groups = group_identical(inputs);
            let (winner, count) = largest_group(&groups)?;
            let share = count as f64 / inputs.len() as f64;
            DeliberationOutcome {
                decision: winner.payload.clone(),
                confidence: share,
                support: share,
                decided_by: Some(winner.agent_id.clone()),
            }
        }
        CoordinationMode::ExpertOpinion => {
            let expert = first_max_by(first, inputs, |a, b| a.expertise_score > b.expertise_score);
            DeliberationOutcome {
                decision: expert.payload.clone(),
                confidence: EXPERT_CONFIDENCE,
                support: weighted_support(inputs, &expert.payload, |i| i.expertise_score),
                decided_by: Some(expert.agent_id.clone()),
            }
        }
        CoordinationMode::Hierarchical => {
            let senior = first_max_by(first, inputs, |a, b| a.hierarchy_level > b.hierarchy_level);
            DeliberationOutcome {
                decision: senior.payload.clone(),
                confidence: HIERARCHICAL_CONFIDENCE,
                support: weighted_support(inputs, &senior.payload, |i| {
                    (i.hierarchy_level.max(0) + 1) as f64
                }),
                decided_by: Some(senior.agent_id.clone()),
            }
        }
        CoordinationMode::Collaborative => {
            let mut merged = Map::new();
            for input in inputs {
                merged.insert(input.agent_id.clone(), input.payload.clone());
            }
            let total_score: f64 = inputs.iter().map(|i| i.score).sum();
            DeliberationOutcome {
                decision: json!({
                    "inputs": merged,
                    "total_score": total_score,
                    "participant_count": inputs.len(),
                }),
                confidence: COLLABORATIVE_CONFIDENCE,
                support: agreement_ratio(inputs),
                decided_by: None,
            }
        }
    };

    Some(outcome)
}

/// Consensus score for a round.
///
/// The outcome's support scaled by participant coverage
/// (`responded / invited`). No responses means a score of zero.
pub fn consensus_score(outcome: &DeliberationOutcome, responded: usize, invited: usize) -> f64 {
    if responded == 0 || invited == 0 {
        return 0.0;
    }
    let coverage = (responded.min(invited) as f64) / invited as f64;
    (outcome.support * coverage).clamp(0.0, 1.0)
}

/// Share of the total weight held by inputs proposing `chosen`.
///
/// Negative weights count as zero; if nothing carries weight every input
/// counts once.
fn weighted_support(
    inputs: &[AgentInput],
    chosen: &Value,
    weight: impl Fn(&AgentInput) -> f64,
) -> f64 {
    let weights: Vec<f64> = inputs.iter().map(|i| weight(i).max(0.0)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let backing = inputs.iter().filter(|i| &i.payload == chosen).count();
        return backing as f64 / inputs.len().max(1) as f64;
    }
    let backing: f64 = inputs
        .iter()
        .zip(&weights)
        .filter(|(i, _)| &i.payload == chosen)
        .map(|(_, w)| w)
        .sum();
    backing / total
}

/// Share of inputs in the largest group of identical proposals
pub fn agreement_ratio(inputs: &[AgentInput]) -> f64 {
    if inputs.is_empty() {
        return 0.0;
    }
    let groups = group_identical(inputs);
    largest_group(&groups)
        .map(|(_, count)| count as f64 / inputs.len() as f64)
        .unwrap_or(0.0)
}

/// Group inputs by structurally equal payloads, in first-seen order
fn group_identical(inputs: &[AgentInput]) -> Vec<(&AgentInput, usize)> {
    let mut groups: Vec<(&AgentInput, usize)> = Vec::new();
    for input in inputs {
        match groups.iter_mut().find(|(rep, _)| rep.payload == input.payload) {
            Some((_, count)) => *count += 1,
            None => groups.push((input, 1)),
        }
    }
    groups
}

/// Largest group; ties keep the earliest
fn largest_group<'a>(groups: &[(&'a AgentInput, usize)]) -> Option<(&'a AgentInput, usize)> {
    let mut best: Option<(&AgentInput, usize)> = None;
    for &(rep, count) in groups {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((rep, count));
        }
    }
    best
}

/// Earliest input that no other input strictly beats
fn first_max_by<'a>(
    first: &'a AgentInput,
    inputs: &'a [AgentInput],
    greater: impl Fn(&AgentInput, &AgentInput) -> bool,
) -> &'a AgentInput {
    inputs
        .iter()
        .skip(1)
        .fold(first, |best, input| if greater(input, best) { input } else { best })
}
