use chrono::{DateTime, Utc};

use crate::{
    events::{event_meta_data, AssignmentEvent},
    sharder::get_md5_shard,
    ufc::{Allocation, Assignment, Flag, Shard, Split, TryParse, VariationType},
    Attributes, Configuration, Error, Result,
};

use super::{eval_rules::matches_any_rule, subject::Subject};

/// Evaluate the specified feature flag for the given subject and return assigned variation and
/// an optional assignment event for logging.
///
/// Every reason for not producing an assignment is reported as an `Err`. Use
/// [`Error::is_normal`] to tell ordinary outcomes (flag disabled, subject not allocated) apart
/// from configuration or usage problems.
pub fn get_assignment(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &Attributes,
    expected_type: Option<VariationType>,
    now: DateTime<Utc>,
) -> Result<Assignment> {
    let result = eval_flag(
        configuration,
        flag_key,
        subject_key,
        subject_attributes,
        expected_type,
        now,
    );

    match &result {
        Ok(assignment) => {
            log::trace!(target: "flagkit",
                    flag_key,
                    subject_key,
                    assignment:serde = assignment.value;
                    "evaluated a flag");
        }

        Err(Error::ConfigurationMissing) => {
            log::warn!(target: "flagkit",
                       flag_key,
                       subject_key;
                       "evaluating a flag before configuration has been fetched");
        }

        Err(err) if err.is_normal() => {
            log::trace!(target: "flagkit",
                        flag_key,
                        subject_key;
                        "returning default assignment because of: {err}");
        }

        Err(err) => {
            log::warn!(target: "flagkit",
                       flag_key,
                       subject_key;
                       "error occurred while evaluating a flag: {err}");
        }
    }

    result
}

fn eval_flag(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &Attributes,
    expected_type: Option<VariationType>,
    now: DateTime<Utc>,
) -> Result<Assignment> {
    if flag_key.is_empty() {
        return Err(Error::InvalidArgument("flag key must not be empty"));
    }
    if subject_key.is_empty() {
        return Err(Error::InvalidArgument("subject key must not be empty"));
    }

    let configuration = configuration.ok_or(Error::ConfigurationMissing)?;

    let flag = match configuration.flags.get(flag_key) {
        None => return Err(Error::FlagNotFound),
        Some(TryParse::ParseFailed(_)) => return Err(Error::ConfigurationParseError),
        Some(TryParse::Parsed(flag)) => flag,
    };

    if !flag.enabled {
        return Err(Error::FlagDisabled);
    }

    if let Some(ty) = expected_type {
        flag.verify_type(ty)?;
    }

    flag.eval(&Subject::new(subject_key, subject_attributes), now)
}

impl Flag {
    fn verify_type(&self, ty: VariationType) -> Result<()> {
        if self.variation_type == ty {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: ty,
                found: self.variation_type,
            })
        }
    }

    fn eval(&self, subject: &Subject, now: DateTime<Utc>) -> Result<Assignment> {
        let Some((allocation, split)) = self.allocations.iter().find_map(|allocation| {
            allocation
                .get_matching_split(subject, now, self.total_shards)
                .map(|split| (allocation, split))
        }) else {
            return Err(Error::NoAllocation);
        };

        let variation = self.variations.get(&split.variation_key).ok_or_else(|| {
            log::warn!(target: "flagkit",
                       flag_key:display = self.key,
                       allocation_key:display = allocation.key,
                       variation_key:display = split.variation_key;
                       "split references a variation that does not exist");
            Error::ConfigurationIntegrity
        })?;

        let value = variation
            .value
            .to_assignment_value(self.variation_type)
            .ok_or(Error::InvalidVariationValue {
                variation_type: self.variation_type,
            })?;

        let event = allocation.do_log.then(|| AssignmentEvent {
            feature_flag: self.key.clone(),
            allocation: allocation.key.clone(),
            experiment: format!("{}-{}", self.key, allocation.key),
            variation: variation.key.clone(),
            subject: subject.key().to_owned(),
            subject_attributes: subject.attributes().clone(),
            timestamp: now,
            meta_data: event_meta_data(),
            extra_logging: split.extra_logging.clone(),
        });

        Ok(Assignment { value, event })
    }
}

impl Allocation {
    fn get_matching_split(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
        total_shards: u64,
    ) -> Option<&Split> {
        if !self.is_active(now) {
            return None;
        }

        if !self.rules.is_empty() && !matches_any_rule(&self.rules, subject) {
            return None;
        }

        self.splits
            .iter()
            .find(|split| split.matches(subject.key(), total_shards))
    }

    /// Active window is `[start_at, end_at)`.
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_at.map_or(true, |start_at| start_at <= now);
        let ended = self.end_at.map_or(false, |end_at| now >= end_at);
        started && !ended
    }
}

impl Split {
    /// Return `true` if `subject_key` matches the given split under the provided `total_shards`.
    ///
    /// To match a split, subject must match all underlying shards.
    fn matches(&self, subject_key: &str, total_shards: u64) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, total_shards))
    }
}

impl Shard {
    /// Return `true` if `subject_key` matches the given shard under the provided `total_shards`.
    fn matches(&self, subject_key: &str, total_shards: u64) -> bool {
        let h = get_md5_shard(&[self.salt.as_str(), "-", subject_key], total_shards);
        self.ranges.iter().any(|range| range.contains(h))
    }
}
