use crate::models::event::{EventType, TaskEvent};

/// Builds the display text for an event. Total over every event type and
/// every payload shape: a missing title renders as an empty string.
pub fn synthesize(event: &TaskEvent) -> String {
    let title = event.task.title();

    match &event.event_type {
        EventType::Created => format!("New task created: \"{}\"", title),
        EventType::Updated => format!("Task updated: \"{}\"", title),
        EventType::Deleted => format!("Task deleted: \"{}\"", title),
        EventType::Unknown(key) => format!("Task event: {}", key),
    }
}
