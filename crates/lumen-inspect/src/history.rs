use std::collections::VecDeque;

/// Bounded history of console submissions with an up/down cursor.
///
/// The cursor rests on the most recent entry after every submission; moving
/// up walks towards older entries and moving down back towards newer ones,
/// both clamped at the ends.
#[derive(Debug, Clone)]
pub struct EvalHistory {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: Option<usize>,
}

impl EvalHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            cursor: None,
        }
    }

    /// Record a submitted expression. Blank input and an immediate repeat of
    /// the most recent entry are not stored, but still reset the cursor.
    pub fn push(&mut self, expression: &str) {
        let expression = expression.trim();
        if !expression.is_empty() && self.entries.back().map(String::as_str) != Some(expression) {
            self.entries.push_back(expression.to_string());
            while self.entries.len() > self.capacity {
                self.entries.pop_front();
            }
        }
        self.cursor = self.entries.len().checked_sub(1);
    }

    pub fn can_navigate_up(&self) -> bool {
        self.cursor.is_some_and(|cursor| cursor > 0)
    }

    pub fn can_navigate_down(&self) -> bool {
        self.cursor
            .is_some_and(|cursor| cursor + 1 < self.entries.len())
    }

    pub fn navigate_up(&mut self) -> Option<&str> {
        if let Some(cursor) = self.cursor.as_mut() {
            *cursor = cursor.saturating_sub(1);
        }
        self.current_text()
    }

    pub fn navigate_down(&mut self) -> Option<&str> {
        let len = self.entries.len();
        if let Some(cursor) = self.cursor.as_mut() {
            if *cursor + 1 < len {
                *cursor += 1;
            }
        }
        self.current_text()
    }

    pub fn current_text(&self) -> Option<&str> {
        self.cursor
            .and_then(|cursor| self.entries.get(cursor))
            .map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
