use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// Posted by the hosted page.
    Message,
    /// Requested by the host through [`crate::HostHandle::link`].
    Manual,
}

/// A validated identity value waiting to be linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    value: String,
    source: LinkSource,
}

impl LinkRequest {
    /// Callers validate first; see [`crate::gateway::validate_external_id`].
    pub(crate) fn new(value: impl Into<String>, source: LinkSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> LinkSource {
        self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { position: usize },
    AlreadyLinked,
    Duplicate,
}

/// FIFO of pending identity links, unique by value.
#[derive(Debug, Default)]
pub struct LinkQueue {
    pending: VecDeque<LinkRequest>,
    last_linked: Option<String>,
}

impl LinkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: LinkRequest) -> EnqueueOutcome {
        if self.last_linked.as_deref() == Some(request.value()) {
            return EnqueueOutcome::AlreadyLinked;
        }
        if self.contains(request.value()) {
            return EnqueueOutcome::Duplicate;
        }
        self.pending.push_back(request);
        EnqueueOutcome::Queued {
            position: self.pending.len() - 1,
        }
    }

    pub fn head(&self) -> Option<&LinkRequest> {
        self.pending.front()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.pending.iter().any(|request| request.value() == value)
    }

    /// Pop the head after a successful link and remember it. Returns `None`
    /// (and changes nothing) if the head is not `value`.
    pub fn complete_head(&mut self, value: &str) -> Option<LinkRequest> {
        let request = self.take_head(value)?;
        self.last_linked = Some(request.value().to_string());
        Some(request)
    }

    /// Pop the head without recording it as linked.
    pub fn abandon_head(&mut self, value: &str) -> Option<LinkRequest> {
        self.take_head(value)
    }

    pub fn last_linked(&self) -> Option<&str> {
        self.last_linked.as_deref()
    }

    pub fn forget_last_linked(&mut self) -> Option<String> {
        self.last_linked.take()
    }

    pub fn values(&self) -> Vec<String> {
        self.pending
            .iter()
            .map(|request| request.value().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take_head(&mut self, value: &str) -> Option<LinkRequest> {
        if self.head()?.value() != value {
            return None;
        }
        self.pending.pop_front()
    }
}
