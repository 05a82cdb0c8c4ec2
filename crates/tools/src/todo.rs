//! Todo list tool: a per-session checklist the model keeps up to date.

use quill_core::tool::ToolResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn indicator(self) -> char {
        match self {
            Self::Pending => '○',
            Self::InProgress => '◐',
            Self::Completed => '●',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
}

/// A partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoUpdate {
    pub id: String,
    #[serde(default)]
    pub status: Option<TodoStatus>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub priority: Option<TodoPriority>,
}

#[derive(Debug, Default)]
pub struct TodoTool {
    items: Vec<TodoItem>,
}

impl TodoTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Replace the whole list.
    pub fn create_todo_list(&mut self, items: Vec<TodoItem>) -> ToolResult {
        self.items = items;
        ToolResult::ok(self.render())
    }

    /// Apply every update or none of them.
    pub fn update_todo_list(&mut self, updates: Vec<TodoUpdate>) -> ToolResult {
        let mut next = self.items.clone();
        for update in updates {
            let Some(item) = next.iter_mut().find(|t| t.id == update.id) else {
                return ToolResult::fail(format!("Todo with id {} not found", update.id));
            };
            if let Some(status) = update.status {
                item.status = status;
            }
            if let Some(content) = update.content {
                item.content = content;
            }
            if let Some(priority) = update.priority {
                item.priority = priority;
            }
        }
        self.items = next;
        ToolResult::ok(self.render())
    }

    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No todos created yet".to_string();
        }
        self.items
            .iter()
            .map(|t| format!("{} {}", t.status.indicator(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, content: &str, status: TodoStatus, priority: TodoPriority) -> TodoItem {
        TodoItem {
            id: id.into(),
            content: content.into(),
            status,
            priority,
        }
    }

    fn seeded() -> TodoTool {
        let mut tool = TodoTool::new();
        tool.create_todo_list(vec![
            item("1", "Task 1", TodoStatus::Pending, TodoPriority::High),
            item("2", "Task 2", TodoStatus::Pending, TodoPriority::Medium),
        ]);
        tool
    }

    #[test]
    fn empty_list_renders_placeholder() {
        let mut tool = TodoTool::new();
        let result = tool.create_todo_list(vec![]);
        assert_eq!(result.output(), Some("No todos created yet"));
    }

    #[test]
    fn status_indicators() {
        let mut tool = TodoTool::new();
        let result = tool.create_todo_list(vec![
            item("1", "Pending", TodoStatus::Pending, TodoPriority::High),
            item("2", "In Progress", TodoStatus::InProgress, TodoPriority::High),
            item("3", "Completed", TodoStatus::Completed, TodoPriority::High),
        ]);
        assert_eq!(result.output(), Some("○ Pending\n◐ In Progress\n● Completed"));
    }

    #[test]
    fn multiple_updates() {
        let mut tool = seeded();
        let result = tool.update_todo_list(vec![
            TodoUpdate {
                id: "1".into(),
                status: Some(TodoStatus::Completed),
                content: Some("Completed Task 1".into()),
                priority: None,
            },
            TodoUpdate {
                id: "2".into(),
                status: Some(TodoStatus::InProgress),
                priority: Some(TodoPriority::High),
                ..TodoUpdate::default()
            },
        ]);
        let out = result.output().unwrap();
        assert!(out.contains("● Completed Task 1"));
        assert!(out.contains("◐ Task 2"));
        assert_eq!(tool.items()[1].priority, TodoPriority::High);
    }

    #[test]
    fn unknown_id_fails_without_partial_apply() {
        let mut tool = seeded();
        let result = tool.update_todo_list(vec![
            TodoUpdate {
                id: "1".into(),
                status: Some(TodoStatus::Completed),
                ..TodoUpdate::default()
            },
            TodoUpdate {
                id: "nonexistent".into(),
                ..TodoUpdate::default()
            },
        ]);
        assert_eq!(result.error(), Some("Todo with id nonexistent not found"));
        assert_eq!(tool.items()[0].status, TodoStatus::Pending);
    }

    #[test]
    fn empty_updates_just_render() {
        let mut tool = seeded();
        let result = tool.update_todo_list(vec![]);
        assert_eq!(result.output(), Some("○ Task 1\n○ Task 2"));
    }

    #[test]
    fn invalid_status_string_rejected() {
        let parsed: Result<TodoItem, _> = serde_json::from_value(serde_json::json!({
            "id": "1", "content": "x", "status": "done", "priority": "high"
        }));
        assert!(parsed.is_err());
    }
}
