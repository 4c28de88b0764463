//! Per-topic predicates
//!
//! Transforms are often configured for a subset of topics (`main` but not
//! `preview`). A predicate gates an in-place frame rewrite so unselected
//! frames pass through untouched, keeping their shared buffers.

use std::collections::HashSet;

use sieve_protocol::{Frame, Image};

use crate::Result;

/// Selects which topics a transform applies to
#[derive(Debug, Clone, Default)]
pub struct TopicPredicate {
    /// `None` selects every topic
    topics: Option<HashSet<String>>,
}

impl TopicPredicate {
    /// Match every topic
    pub fn all() -> Self {
        Self { topics: None }
    }

    /// Match only the listed topics; `*` anywhere reverts to match-all
    pub fn only<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = topics.into_iter().map(Into::into).collect();
        if set.contains("*") {
            return Self::all();
        }
        Self { topics: Some(set) }
    }

    /// True if the transform applies to this topic
    pub fn matches(&self, topic: &str) -> bool {
        match &self.topics {
            None => true,
            Some(set) => set.contains(topic),
        }
    }

    /// Apply a transform to the frame's image when the topic matches
    ///
    /// Frames without an image, or on unselected topics, pass through.
    /// Returns whether the transform ran.
    pub fn apply<F>(&self, frame: &mut Frame, op: F) -> Result<bool>
    where
        F: FnOnce(&Image) -> Result<Image>,
    {
        if !self.matches(frame.topic()) {
            return Ok(false);
        }
        let Some(image) = frame.image() else {
            return Ok(false);
        };
        let transformed = op(image)?;
        frame.set_image(Some(transformed));
        Ok(true)
    }
}
