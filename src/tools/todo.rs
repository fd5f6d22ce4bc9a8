//! Todo list - in-memory task tracking for one session

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

use super::TODO;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    #[serde(alias = "in-progress", alias = "active")]
    InProgress,
    #[serde(alias = "done", alias = "complete")]
    Completed,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
        };
        f.write_str(mark)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: usize,
    pub title: String,
    pub status: TodoStatus,
}

/// Task list scoped to one session. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    items: Vec<TodoItem>,
    next_id: usize,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending item and return its id.
    pub fn add(&mut self, title: impl Into<String>) -> usize {
        self.next_id += 1;
        self.items.push(TodoItem {
            id: self.next_id,
            title: title.into(),
            status: TodoStatus::Pending,
        });
        self.next_id
    }

    pub fn update_status(&mut self, id: usize, status: TodoStatus) -> Result<&TodoItem> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::ToolExecution {
                tool: TODO.to_string(),
                message: format!("No todo item with id {id}"),
            })?;
        item.status = status;
        Ok(item)
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Render the list for the model.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "Todo list is empty.".to_string();
        }
        self.items
            .iter()
            .map(|i| format!("{} {}. {}", i.status, i.id, i.title))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn completed_titles(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|i| i.status == TodoStatus::Completed)
            .map(|i| i.title.as_str())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_update_render() {
        let mut todos = TodoList::new();
        let first = todos.add("Reproduce the bug");
        let second = todos.add("Write a regression test");
        assert_eq!((first, second), (1, 2));

        todos.update_status(first, TodoStatus::Completed).unwrap();
        todos.update_status(second, TodoStatus::InProgress).unwrap();

        let rendered = todos.render();
        assert!(rendered.contains("[x] 1. Reproduce the bug"));
        assert!(rendered.contains("[~] 2. Write a regression test"));
        assert_eq!(todos.completed_titles().collect::<Vec<_>>(), vec!["Reproduce the bug"]);
    }

    #[test]
    fn test_update_unknown_id() {
        let mut todos = TodoList::new();
        assert!(todos.update_status(7, TodoStatus::Completed).is_err());
    }

    #[test]
    fn test_clear_resets_ids() {
        let mut todos = TodoList::new();
        todos.add("a");
        todos.clear();
        assert_eq!(todos.render(), "Todo list is empty.");
        assert_eq!(todos.add("b"), 1);
    }
}
