use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::sharder::get_md5_shard;
use crate::ContextAttributes;

use super::{
    BanditCategoricalAttributeCoefficient, BanditModelData, BanditNumericAttributeCoefficient,
};

// total_shards is not configurable for bandits.
const TOTAL_SHARDS: u64 = 10_000;

/// Outcome of scoring and selecting among a set of actions.
#[derive(Debug, Clone, PartialEq)]
pub struct BanditEvaluation {
    /// Selected action.
    pub action_key: String,
    /// Score of the selected action.
    pub action_score: f64,
    /// Probability with which the selected action was chosen.
    pub action_weight: f64,
    /// Distance between best and selected actions' scores.
    pub optimality_gap: f64,
}

impl BanditModelData {
    /// Score every action, weigh them, and pick one deterministically for the subject.
    pub fn evaluate(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
    ) -> Result<BanditEvaluation> {
        if actions.is_empty() {
            return Err(Error::NoActionsSupplied);
        }

        // Ordered by action key, so weight accumulation and tie-breaking are reproducible.
        let scores = actions
            .iter()
            .map(|(key, attributes)| {
                (
                    key.as_str(),
                    self.score_action(key, attributes, subject_attributes),
                )
            })
            .collect::<BTreeMap<_, _>>();

        // Only a numerically greater score replaces the best, so among equal scores (including
        // -0.0 and 0.0) the lexicographically smallest key is kept. NaN never takes over.
        let best = scores
            .iter()
            .fold(None, |best: Option<(&str, f64)>, (&key, &score)| match best {
                Some((_, best_score)) if score <= best_score || score.is_nan() => best,
                _ => Some((key, score)),
            })
            .ok_or(Error::NoActionsSupplied)?;

        let weights = self.weigh_actions(&scores, best);

        // Pseudo-random shuffle unique per subject. When weights shift slightly, subjects pushed
        // away from an action land on different actions rather than all on the same neighbour.
        let shuffled_actions = {
            let mut shuffled = scores.keys().copied().collect::<Vec<_>>();
            shuffled.sort_by_cached_key(|&action_key| {
                let hash =
                    get_md5_shard(&[flag_key, "-", subject_key, "-", action_key], TOTAL_SHARDS);
                (hash, action_key)
            });
            shuffled
        };

        let selection_point =
            get_md5_shard(&[flag_key, "-", subject_key], TOTAL_SHARDS) as f64 / TOTAL_SHARDS as f64;

        let selected_action = select_action(&shuffled_actions, &weights, selection_point)
            .ok_or(Error::NoActionsSupplied)?;

        let action_score = scores[selected_action];

        log::trace!(target: "flagkit",
            flag_key,
            subject_key,
            action_key = selected_action,
            best_action = best.0;
            "selected bandit action");

        Ok(BanditEvaluation {
            action_key: selected_action.to_owned(),
            action_score,
            action_weight: weights[selected_action],
            optimality_gap: best.1 - action_score,
        })
    }

    /// Weigh actions depending on their scores. Every non-best action gets at least
    /// `floor / n`; the best action receives the remainder.
    fn weigh_actions<'a>(
        &self,
        scores: &BTreeMap<&'a str, f64>,
        (best_action, best_score): (&'a str, f64),
    ) -> HashMap<&'a str, f64> {
        let n_actions = scores.len() as f64;
        let min_probability = self.action_probability_floor / n_actions;

        let mut weights = HashMap::with_capacity(scores.len());
        let mut remainder_weight = 1.0;
        for (&action, &score) in scores {
            if action != best_action {
                let weight =
                    min_probability.max(1.0 / (n_actions + self.gamma * (best_score - score)));
                weights.insert(action, weight);
                remainder_weight -= weight;
            }
        }

        weights.insert(best_action, f64::max(remainder_weight, 0.0));

        weights
    }

    fn score_action(
        &self,
        action_key: &str,
        action_attributes: &ContextAttributes,
        subject_attributes: &ContextAttributes,
    ) -> f64 {
        let Some(coefficients) = self.coefficients.get(action_key) else {
            return self.default_action_score;
        };

        // Summation order is fixed: intercept, subject terms, then action terms.
        coefficients.intercept
            + score_numeric(subject_attributes, &coefficients.subject_numeric_coefficients)
            + score_categorical(
                subject_attributes,
                &coefficients.subject_categorical_coefficients,
            )
            + score_numeric(action_attributes, &coefficients.action_numeric_coefficients)
            + score_categorical(
                action_attributes,
                &coefficients.action_categorical_coefficients,
            )
    }
}

/// Walk `shuffled_actions` accumulating weights and return the first action whose cumulative
/// weight exceeds `selection_point`. Rounding can leave the total short of the point, in which
/// case the last action is returned.
fn select_action<'a>(
    shuffled_actions: &[&'a str],
    weights: &HashMap<&'a str, f64>,
    selection_point: f64,
) -> Option<&'a str> {
    let mut cumulative_weight = 0.0;
    shuffled_actions
        .iter()
        .find(|&&action_key| {
            cumulative_weight += weights.get(action_key).copied().unwrap_or(0.0);
            cumulative_weight > selection_point
        })
        .or_else(|| shuffled_actions.last())
        .copied()
}

fn score_numeric(
    attributes: &ContextAttributes,
    coefficients: &[BanditNumericAttributeCoefficient],
) -> f64 {
    coefficients
        .iter()
        .map(|coef| {
            attributes
                .numeric
                .get(&coef.attribute_key)
                .copied()
                // Non-finite values poison every downstream weight, treat them as missing.
                .filter(|value| value.is_finite())
                .map(|value| value * coef.coefficient)
                .unwrap_or(coef.missing_value_coefficient)
        })
        .sum()
}

fn score_categorical(
    attributes: &ContextAttributes,
    coefficients: &[BanditCategoricalAttributeCoefficient],
) -> f64 {
    coefficients
        .iter()
        .map(|coef| {
            attributes
                .categorical
                .get(&coef.attribute_key)
                .and_then(|value| coef.value_coefficients.get(value))
                .copied()
                .unwrap_or(coef.missing_value_coefficient)
        })
        .sum()
}
