use std::collections::VecDeque;
use std::path::PathBuf;

use serde::Serialize;

/// One backend attempt and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-identifier acquisition state.
///
/// The candidate queue head is the next backend to try. Every recorded
/// attempt against the head pops it; a success also clears the queue so the
/// task is never retried elsewhere.
#[derive(Debug, Clone)]
pub struct AcquisitionTask {
    identifier: String,
    queue: VecDeque<String>,
    resolved: Option<(PathBuf, String)>,
    attempts: Vec<Attempt>,
    terminal_error: Option<String>,
}

impl AcquisitionTask {
    /// Build the task with `initial` first (when it is one of `fallback`)
    /// followed by `fallback` without repeats.
    pub fn new(identifier: impl Into<String>, initial: Option<&str>, fallback: &[String]) -> Self {
        let mut queue: VecDeque<String> = VecDeque::with_capacity(fallback.len());
        if let Some(initial) = initial
            && fallback.iter().any(|name| name == initial)
        {
            queue.push_back(initial.to_string());
        }
        for name in fallback {
            if !queue.contains(name) {
                queue.push_back(name.clone());
            }
        }

        Self {
            identifier: identifier.into(),
            queue,
            resolved: None,
            attempts: Vec::new(),
            terminal_error: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn head(&self) -> Option<&str> {
        self.queue.front().map(String::as_str)
    }

    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolved artifact path and the backend that produced it.
    pub fn resolution(&self) -> Option<(&PathBuf, &str)> {
        self.resolved.as_ref().map(|(path, backend)| (path, backend.as_str()))
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }

    pub fn terminal_error(&self) -> Option<&str> {
        self.terminal_error.as_deref()
    }

    fn pop_if_head(&mut self, backend: &str) {
        if self.head() == Some(backend) {
            self.queue.pop_front();
        }
    }

    /// Record a successful fetch; the remaining queue is discarded.
    pub fn record_success(&mut self, backend: &str, path: PathBuf) {
        self.pop_if_head(backend);
        self.attempts.push(Attempt {
            backend: backend.to_string(),
            error: None,
        });
        self.queue.clear();
        self.resolved = Some((path, backend.to_string()));
    }

    /// Record a failed fetch; the task moves on to its next candidate.
    pub fn record_failure(&mut self, backend: &str, error: impl Into<String>) {
        self.pop_if_head(backend);
        self.attempts.push(Attempt {
            backend: backend.to_string(),
            error: Some(error.into()),
        });
    }

    pub(crate) fn mark_terminal(&mut self, error: impl Into<String>) {
        if !self.is_resolved() {
            self.terminal_error = Some(error.into());
        }
    }
}
