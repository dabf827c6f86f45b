//! Escalation strategies for exhausted consumer retries.
//!
//! When every processing attempt on a record has failed, the consumer
//! pipeline consults this strategy. The default is the conservative one:
//! stall rather than lose data, and rely on restart-with-redelivery.

use std::str::FromStr;

use crate::error::PipelineError;

/// What the consumer pipeline does after retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EscalationStrategy {
    /// Stop consuming without acknowledging; the record is redelivered
    /// after restart. Favors stalling over silent loss.
    #[default]
    Halt,

    /// Acknowledge and move on — an explicit opt-in to losing the
    /// record, logged loudly.
    Skip,

    /// Publish the record to a dead-letter topic, then acknowledge. A
    /// failed dead-letter publish degrades to `Halt` semantics.
    DeadLetter {
        /// Destination topic for poisoned records.
        topic: String,
    },
}

impl FromStr for EscalationStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "halt" | "fail" => Ok(Self::Halt),
            "skip" => Ok(Self::Skip),
            other => {
                if let Some(topic) = other.strip_prefix("dead-letter:") {
                    if topic.is_empty() {
                        return Err(PipelineError::Configuration(
                            "dead-letter strategy requires a topic: 'dead-letter:<topic>'".into(),
                        ));
                    }
                    return Ok(Self::DeadLetter {
                        topic: topic.to_string(),
                    });
                }
                Err(PipelineError::Configuration(format!(
                    "unknown escalation strategy: '{s}' \
                     (expected 'halt', 'skip', or 'dead-letter:<topic>')"
                )))
            }
        }
    }
}

impl std::fmt::Display for EscalationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Halt => f.write_str("halt"),
            Self::Skip => f.write_str("skip"),
            Self::DeadLetter { topic } => write!(f, "dead-letter:{topic}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_halt() {
        assert_eq!(EscalationStrategy::default(), EscalationStrategy::Halt);
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(
            "halt".parse::<EscalationStrategy>().unwrap(),
            EscalationStrategy::Halt
        );
        assert_eq!(
            "FAIL".parse::<EscalationStrategy>().unwrap(),
            EscalationStrategy::Halt
        );
        assert_eq!(
            "skip".parse::<EscalationStrategy>().unwrap(),
            EscalationStrategy::Skip
        );
        assert_eq!(
            "dead-letter:changes-dlq".parse::<EscalationStrategy>().unwrap(),
            EscalationStrategy::DeadLetter {
                topic: "changes-dlq".into()
            }
        );
        assert_eq!(
            "dead_letter:dlq".parse::<EscalationStrategy>().unwrap(),
            EscalationStrategy::DeadLetter {
                topic: "dlq".into()
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_missing_topic() {
        assert!("retry-forever".parse::<EscalationStrategy>().is_err());
        assert!("dead-letter:".parse::<EscalationStrategy>().is_err());
        assert!("dead-letter".parse::<EscalationStrategy>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["halt", "skip", "dead-letter:dlq"] {
            let strategy: EscalationStrategy = s.parse().unwrap();
            assert_eq!(strategy.to_string(), s);
        }
    }
}
