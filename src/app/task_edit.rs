use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::app::generator::DescriptionGenerator;
use crate::app::models::{Priority, Task, TaskPatch};
use crate::app::service::TaskService;
use derivative::Derivative;

use super::ui::App;

// Title, description, priority
const FIELD_COUNT: usize = 3;

// State object for the task edit dialog
// Keeps track of the state of the dialog and the content of the task being edited
#[derive(Derivative)]
#[derivative(Default)]
pub struct TaskEditDialogState {
    pub dialog_active: bool,
    task_id: Option<i64>,
    content: Option<TaskEditDialogContent>,
    error_message: Option<String>,
    // (char column, field row)
    cursor_position: Option<(usize, usize)>,
}

// Current content of the task being edited/created
#[derive(Derivative)]
#[derivative(Default)]
struct TaskEditDialogContent {
    title: String,
    description: String,
    #[derivative(Default(value = "Priority::Medium"))]
    priority: Priority,
}

// Refer to https://stackoverflow.com/a/66609806
impl<'a> Default for &'a TaskEditDialogContent {
    fn default() -> &'a TaskEditDialogContent {
        static VALUE: TaskEditDialogContent = TaskEditDialogContent {
            title: String::new(),
            description: String::new(),
            priority: Priority::Medium,
        };
        &VALUE
    }
}

// Byte offset of the char at `char_pos`, or the end of the string
fn byte_offset(value: &str, char_pos: usize) -> usize {
    value
        .char_indices()
        .nth(char_pos)
        .map(|(offset, _)| offset)
        .unwrap_or(value.len())
}

impl TaskEditDialogState {
    // Opens the dialog and prepares to accept an input for the new task
    pub fn create_a_new_task(&mut self) {
        self.dialog_active = true;
        self.task_id = None;
        self.error_message = None;
        self.cursor_position = Some((0, 0));
        self.content = Some(TaskEditDialogContent::default());
    }

    // Opens the dialog and prepares to accept an input for the existing task
    pub fn edit_task(&mut self, task: &Task) {
        self.dialog_active = true;
        self.task_id = Some(task.id);
        self.error_message = None;
        self.cursor_position = Some((0, 0));
        self.content = Some(TaskEditDialogContent {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.clone(),
        });
    }

    pub fn close(&mut self) {
        self.dialog_active = false;
        self.error_message = None;
    }

    // Move the cursor one line BELOW the current one.
    // An overflow should be prevented, and the horizontal cursor position should be preserved if possible
    pub fn move_cursor_down(&mut self) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));
        let future_y_position = (cursor_position.1 + 1).min(FIELD_COUNT - 1);
        self.cursor_position = Some((
            cursor_position.0.min(self.field_length(future_y_position)),
            future_y_position,
        ));
    }

    // Move the cursor one line ABOVE the current one.
    pub fn move_cursor_up(&mut self) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));
        if cursor_position.1 > 0 {
            let future_y_position = cursor_position.1 - 1;
            self.cursor_position = Some((
                cursor_position.0.min(self.field_length(future_y_position)),
                future_y_position,
            ));
        }
    }

    // Move the cursor one char LEFT to the current one.
    pub fn move_cursor_left(&mut self) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));
        if cursor_position.0 > 0 {
            self.cursor_position = Some((cursor_position.0 - 1, cursor_position.1));
        }
    }

    // Move the cursor one char RIGHT to the current one.
    pub fn move_cursor_right(&mut self) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));
        self.cursor_position = Some((
            (cursor_position.0 + 1).min(self.field_length(cursor_position.1)),
            cursor_position.1,
        ));
    }

    // Delete the char before the cursor
    pub fn delete_char(&mut self) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));
        if cursor_position.0 == 0 {
            return;
        }

        let Some(field) = self.text_field_mut(cursor_position.1) else {
            return;
        };
        let at = byte_offset(field, cursor_position.0 - 1);
        if at < field.len() {
            field.remove(at);
        }

        self.move_cursor_left();
    }

    // Returns the content of the string at the given y position
    // Think of this as a mapper of vertical cursor position to the string content
    fn content_of_string_at_y_pos(&self, y_position: usize) -> String {
        let content = self.content.as_ref().unwrap_or_default();
        match y_position {
            0 => content.title.clone(),
            1 => content.description.clone(),
            2 => content.priority.to_string(),
            _ => String::new(),
        }
    }

    fn field_length(&self, y_position: usize) -> usize {
        self.content_of_string_at_y_pos(y_position).chars().count()
    }

    // Only title and description are free text
    fn text_field_mut(&mut self, y_position: usize) -> Option<&mut String> {
        let content = self.content.as_mut()?;
        match y_position {
            0 => Some(&mut content.title),
            1 => Some(&mut content.description),
            _ => None,
        }
    }

    // Saves the task through the service, keeps the dialog open on failure
    pub fn save_task(&mut self, service: &TaskService) {
        let content = self.content.as_ref().unwrap_or_default();

        let result = match self.task_id {
            Some(id) => service.update(
                id,
                TaskPatch {
                    title: Some(content.title.clone()),
                    description: Some(content.description.clone()),
                    // a value read back from a shared table is left as it is
                    priority: Some(content.priority.clone()).filter(Priority::is_known),
                    ..Default::default()
                },
            ),
            None => service.create(
                &content.title,
                Some(content.description.clone()),
                Some(content.priority.clone()),
            ),
        };

        match result {
            Ok(_) => self.close(),
            Err(err) => self.error_message = Some(err.to_string()),
        }
    }

    // Fill the description from the title; blocks until the generator answers
    pub fn generate_description(&mut self, generator: &DescriptionGenerator) {
        let title = self.content.as_ref().unwrap_or_default().title.trim().to_string();
        if title.is_empty() {
            self.error_message = Some("Enter a title first".to_string());
            return;
        }

        let description = generator.generate(&title);
        let length = description.chars().count();
        if let Some(content) = self.content.as_mut() {
            content.description = description;
        }
        self.error_message = None;
        self.cursor_position = Some((length, 1));
    }

    // Handles the input of a char by inserting it at the cursor of the currently active field
    pub fn input(&mut self, to_insert: char) {
        let cursor_position = self.cursor_position.unwrap_or((0, 0));

        if cursor_position.1 == 2 {
            if let Some(content) = self.content.as_mut() {
                match to_insert {
                    'h' => content.priority = Priority::High,
                    'm' => content.priority = Priority::Medium,
                    'l' => content.priority = Priority::Low,
                    _ => {}
                }
            }
            self.cursor_position = Some((0, 2));
            return;
        }

        let Some(field) = self.text_field_mut(cursor_position.1) else {
            return;
        };
        let at = byte_offset(field, cursor_position.0);
        field.insert(at, to_insert);

        self.move_cursor_right();
    }
}

// Returns the UI content for the task edit dialog
pub fn get_task_edit_ui<'a>(app: &'a App<'a>) -> Vec<Line<'a>> {
    const GRAY_TEXT: Style = Style::new().fg(Color::Rgb(62, 62, 62));
    const WHITE_TEXT: Style = Style::new().fg(Color::White);
    const BLACK_ON_WHITE: Style = Style::new().fg(Color::Black).bg(Color::White);
    let mut text = Vec::new();

    struct TextDialogInputLine {
        prefix: &'static str,
        placeholder: &'static str,
        value: String,
    }

    let dialog = &app.task_edit_dialog_state;

    // Define the lines (input fields) of the dialog
    let lines = [
        TextDialogInputLine {
            prefix: "Title:       ",
            placeholder: "会議の準備",
            value: dialog.content_of_string_at_y_pos(0),
        },
        TextDialogInputLine {
            prefix: "Description: ",
            placeholder: "F2 to suggest one",
            value: dialog.content_of_string_at_y_pos(1),
        },
        TextDialogInputLine {
            prefix: "Priority:    ",
            placeholder: "medium",
            value: dialog.content_of_string_at_y_pos(2),
        },
    ];

    let cursor_position = dialog.cursor_position.unwrap_or((0, 0));

    for (i, line) in lines.iter().enumerate() {
        let mut spans = vec![Span::styled(line.prefix, WHITE_TEXT)];

        if line.value.is_empty() {
            // If the line is empty, a placeholder is displayed
            if cursor_position.1 == i {
                // Line is selected. First char is highlighted, the rest is gray
                spans.push(Span::styled(
                    line.placeholder.chars().take(1).collect::<String>(),
                    BLACK_ON_WHITE,
                ));
                spans.push(Span::styled(
                    line.placeholder.chars().skip(1).collect::<String>(),
                    GRAY_TEXT,
                ));
            } else {
                spans.push(Span::styled(line.placeholder, GRAY_TEXT));
            }
        } else if cursor_position.1 == i {
            // All chars are white, except for the one at the cursor position which is highlighted
            spans.push(Span::styled(
                line.value.chars().take(cursor_position.0).collect::<String>(),
                WHITE_TEXT,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(cursor_position.0).take(1).collect::<String>(),
                BLACK_ON_WHITE,
            ));
            spans.push(Span::styled(
                line.value.chars().skip(cursor_position.0 + 1).collect::<String>(),
                WHITE_TEXT,
            ));

            if cursor_position.0 >= line.value.chars().count() {
                spans.push(Span::styled(" ", BLACK_ON_WHITE));
            }
        } else {
            spans.push(Span::styled(line.value.clone(), WHITE_TEXT));
        }

        text.push(Line::from(spans));
    }

    text.push(Line::raw(""));

    // Display the error message if there is one
    if let Some(ref error_message) = dialog.error_message {
        text.push(Line::from(vec![Span::styled(
            error_message.as_str(),
            Style::new().fg(Color::Red),
        )]));
        text.push(Line::raw(""));
    }

    text.push(Line::from(vec![Span::styled(
        "Enter - save, Esc - cancel, F2 - suggest description",
        WHITE_TEXT,
    )]));
    text.push(Line::from(vec![Span::styled(
        "Priority: h - high, m - medium, l - low",
        WHITE_TEXT,
    )]));

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::storage::{SqliteStore, TaskStore};
    use std::sync::Arc;

    fn service() -> TaskService {
        TaskService::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    fn type_text(dialog: &mut TaskEditDialogState, text: &str) {
        for c in text.chars() {
            dialog.input(c);
        }
    }

    #[test]
    fn typing_multibyte_title() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();

        type_text(&mut dialog, "会議準備");
        dialog.move_cursor_left();
        dialog.move_cursor_left();
        dialog.input('の');
        assert_eq!(dialog.content_of_string_at_y_pos(0), "会議の準備");

        dialog.delete_char();
        assert_eq!(dialog.content_of_string_at_y_pos(0), "会議準備");
        assert_eq!(dialog.cursor_position, Some((2, 0)));
    }

    #[test]
    fn cursor_stays_inside_fields() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "long title");

        dialog.move_cursor_down();
        // empty description pulls the column back to 0
        assert_eq!(dialog.cursor_position, Some((0, 1)));
        for _ in 0..5 {
            dialog.move_cursor_down();
        }
        assert_eq!(dialog.cursor_position, Some((0, 2)));

        dialog.move_cursor_up();
        assert_eq!(dialog.cursor_position, Some((0, 1)));
        dialog.move_cursor_left();
        assert_eq!(dialog.cursor_position, Some((0, 1)));
    }

    #[test]
    fn priority_field_takes_shortcuts_only() {
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        assert_eq!(dialog.content_of_string_at_y_pos(2), "medium");

        dialog.move_cursor_down();
        dialog.move_cursor_down();
        dialog.input('h');
        assert_eq!(dialog.content_of_string_at_y_pos(2), "high");
        dialog.input('z');
        assert_eq!(dialog.content_of_string_at_y_pos(2), "high");
        dialog.input('l');
        assert_eq!(dialog.content_of_string_at_y_pos(2), "low");
    }

    #[test]
    fn save_creates_and_closes() {
        let service = service();
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "散歩");

        dialog.save_task(&service);
        assert!(!dialog.dialog_active);

        let tasks = service.list().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "散歩");
        assert_eq!(tasks[0].priority, Priority::Medium);
    }

    #[test]
    fn save_with_blank_title_keeps_dialog_open() {
        let service = service();
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();
        type_text(&mut dialog, "  ");

        dialog.save_task(&service);
        assert!(dialog.dialog_active);
        assert_eq!(dialog.error_message.as_deref(), Some("Title is required"));
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn save_updates_existing_task() {
        let service = service();
        let task = service.create("資料", None, Some(Priority::Low)).unwrap();

        let mut dialog = TaskEditDialogState::default();
        dialog.edit_task(&task);
        dialog.cursor_position = Some((2, 0));
        type_text(&mut dialog, "作成");
        dialog.save_task(&service);

        let saved = service.get(task.id).unwrap();
        assert_eq!(saved.title, "資料作成");
        assert_eq!(saved.priority, Priority::Low);
        assert_eq!(saved.order, task.order);
    }

    #[test]
    fn save_keeps_unrecognised_priority_untouched() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TaskService::new(store.clone());
        let task = service.create("資料", None, None).unwrap();
        let task = store
            .update(
                task.id,
                &TaskPatch {
                    priority: Some(Priority::Unknown("urgent".into())),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut dialog = TaskEditDialogState::default();
        dialog.edit_task(&task);
        dialog.cursor_position = Some((2, 0));
        type_text(&mut dialog, "作成");
        dialog.save_task(&service);

        assert!(!dialog.dialog_active);
        assert!(dialog.error_message.is_none());
        let saved = service.get(task.id).unwrap();
        assert_eq!(saved.title, "資料作成");
        assert_eq!(saved.priority, Priority::Unknown("urgent".into()));
    }

    #[test]
    fn save_applies_priority_chosen_over_unrecognised_one() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TaskService::new(store.clone());
        let task = service.create("資料", None, None).unwrap();
        let task = store
            .update(
                task.id,
                &TaskPatch {
                    priority: Some(Priority::Unknown("urgent".into())),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut dialog = TaskEditDialogState::default();
        dialog.edit_task(&task);
        dialog.cursor_position = Some((0, 2));
        dialog.input('h');
        dialog.save_task(&service);

        assert_eq!(service.get(task.id).unwrap().priority, Priority::High);
    }

    #[test]
    fn generate_fills_description_from_title() {
        let generator = DescriptionGenerator::rule_based();
        let mut dialog = TaskEditDialogState::default();
        dialog.create_a_new_task();

        dialog.generate_description(&generator);
        assert_eq!(dialog.error_message.as_deref(), Some("Enter a title first"));

        type_text(&mut dialog, "バグ修正");
        dialog.generate_description(&generator);
        assert_eq!(dialog.content_of_string_at_y_pos(1), "バグ修正対応");
        assert_eq!(dialog.cursor_position, Some((6, 1)));
        assert!(dialog.error_message.is_none());
    }
}
