//! Topic filters and topic validation
//!
//! A `TopicPattern` is a subscription filter parsed once into segments so
//! matching an incoming topic is a single pairwise walk. Patterns are
//! validated when they are created; a pattern that exists is always
//! well-formed, so matching never has to report an error.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::TopicError;

/// Longest topic the MQTT wire format can carry.
pub const MAX_TOPIC_LEN: usize = 65_535;

const SINGLE_LEVEL: char = '+';
const MULTI_LEVEL: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    /// `+`: exactly one level.
    SingleLevel,
    /// `#`: zero or more trailing levels. Only ever the last segment.
    MultiLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse and validate a subscription filter.
    pub fn parse(pattern: &str) -> Result<Self, TopicError> {
        validate_common(pattern)?;

        let levels: Vec<&str> = pattern.split('/').collect();
        let last = levels.len() - 1;
        let mut segments = Vec::with_capacity(levels.len());

        for (i, level) in levels.into_iter().enumerate() {
            let segment = match level {
                "+" => Segment::SingleLevel,
                "#" if i == last => Segment::MultiLevel,
                "#" => return Err(TopicError::MultiLevelNotLast),
                literal => {
                    if let Some(wildcard) = literal
                        .chars()
                        .find(|c| *c == SINGLE_LEVEL || *c == MULTI_LEVEL)
                    {
                        return Err(TopicError::MisplacedWildcard {
                            wildcard,
                            segment: literal.to_string(),
                        });
                    }
                    Segment::Literal(literal.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }

    /// Whether a concrete `topic` falls under this filter.
    pub fn matches(&self, topic: &str) -> bool {
        let mut levels = topic.split('/');

        for segment in &self.segments {
            match segment {
                Segment::MultiLevel => return true,
                Segment::SingleLevel => {
                    if levels.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match levels.next() {
                    Some(level) if level == expected => {}
                    _ => return false,
                },
            }
        }

        levels.next().is_none()
    }
}

impl FromStr for TopicPattern {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Match a raw filter string against a topic. Malformed filters match nothing.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    TopicPattern::parse(pattern)
        .map(|p| p.matches(topic))
        .unwrap_or(false)
}

/// Validate a subscription filter without keeping the parsed form.
pub fn validate_subscribe_topic(topic: &str) -> Result<(), TopicError> {
    TopicPattern::parse(topic).map(|_| ())
}

/// Publish topics follow the filter rules and must not contain wildcards.
pub fn validate_publish_topic(topic: &str) -> Result<(), TopicError> {
    validate_common(topic)?;
    if topic.contains([SINGLE_LEVEL, MULTI_LEVEL]) {
        return Err(TopicError::WildcardInPublish(topic.to_string()));
    }
    Ok(())
}

fn validate_common(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong(topic.len()));
    }
    if topic.contains('\0') {
        return Err(TopicError::NullCharacter);
    }
    Ok(())
}
