use chrono::Utc;
use now::DateTimeNow;
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::app::models::{Priority, ReorderItem, Task};
use crate::app::service::TaskService;

use super::ui::App;

// Direction of a manual move in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Up,
    Down,
}

pub struct TaskList<'a> {
    pub state: ListState,
    pub items: Vec<Task>,
    service: &'a TaskService,
    // Last failure reported by the service, shown in the statistics box
    pub last_error: Option<String>,
}

impl<'a> TaskList<'a> {
    // Initialize a task list with items in display order
    pub fn with_items_from_service(service: &'a TaskService) -> TaskList<'a> {
        let mut list = TaskList {
            state: ListState::default(),
            items: Vec::new(),
            service,
            last_error: None,
        };
        list.update_items();
        list
    }

    // Refresh the items of this list from the service
    pub fn update_items(&mut self) {
        match self.service.list() {
            Ok(items) => {
                self.items = items;
                if let Some(i) = self.state.selected() {
                    if self.items.is_empty() {
                        self.state.select(None);
                    } else if i >= self.items.len() {
                        self.state.select(Some(self.items.len() - 1));
                    }
                }
            }
            Err(err) => self.last_error = Some(err.to_string()),
        }
    }

    // Move the selection to the next item
    pub fn next(&mut self) {
        let i = match self.state.selected() {
            Some(i) => {
                if self.items.is_empty() || i >= self.items.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    // Move the selection to the previous item
    pub fn previous(&mut self) {
        let i = match self.state.selected() {
            Some(i) => {
                if self.items.is_empty() {
                    0
                } else if i == 0 {
                    self.items.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn unselect(&mut self) {
        self.state.select(None);
    }

    fn select_id(&mut self, id: i64) {
        let position = self.items.iter().position(|task| task.id == id);
        self.state.select(position);
    }

    fn report<T>(&mut self, result: Result<T, crate::app::error::TaskError>) {
        match result {
            Ok(_) => self.last_error = None,
            Err(err) => self.last_error = Some(err.to_string()),
        }
    }

    // Flip the selected task between to do and done
    pub fn toggle_completed(&mut self) {
        let Some(id) = self.get_selected().map(|task| task.id) else {
            return;
        };
        let result = self.service.toggle(id);
        self.report(result);
        self.update_items();
        self.select_id(id);
    }

    // Delete the selected task; Update the items
    pub fn delete_selected(&mut self) {
        let Some(id) = self.get_selected().map(|task| task.id) else {
            return;
        };
        let result = self.service.delete(id);
        self.report(result);
        self.update_items();
    }

    // Swap the selected task with its neighbour inside the same priority group
    pub fn move_selected(&mut self, movement: Movement) {
        let Some(i) = self.state.selected() else {
            return;
        };
        let neighbour = match movement {
            Movement::Up => i.checked_sub(1),
            Movement::Down => Some(i + 1),
        };
        let (Some(current), Some(other)) = (
            self.items.get(i),
            neighbour.and_then(|j| self.items.get(j)),
        ) else {
            return;
        };

        if current.priority.rank() != other.priority.rank() {
            self.last_error = Some("Change the priority to move across groups".to_string());
            return;
        }

        let batch = if current.order != other.order {
            vec![
                ReorderItem { id: current.id, order: other.order },
                ReorderItem { id: other.id, order: current.order },
            ]
        } else {
            let order = match movement {
                Movement::Up => other.order - 1,
                Movement::Down => other.order + 1,
            };
            vec![ReorderItem { id: current.id, order }]
        };
        let moved = current.id;

        let result = self.service.reorder(&batch);
        self.report(result);
        self.update_items();
        self.select_id(moved);
    }

    // Get the selected task
    pub fn get_selected(&self) -> Option<&Task> {
        self.state.selected().and_then(|i| self.items.get(i))
    }

    // Get the uncompleted tasks
    pub fn get_uncompleted(&self) -> Vec<&Task> {
        self.items.iter().filter(|task| !task.completed).collect()
    }

    // Open tasks marked high
    pub fn get_open_high_priority(&self) -> Vec<&Task> {
        self.items
            .iter()
            .filter(|task| !task.completed && task.priority == Priority::High)
            .collect()
    }

    // Tasks finished since midnight (UTC)
    pub fn get_completed_today(&self) -> Vec<&Task> {
        let start_of_day = Utc::now().beginning_of_day();
        self.items
            .iter()
            .filter(|task| task.completed && task.updated_at >= start_of_day)
            .collect()
    }
}

fn priority_color(priority: &Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::White,
        Priority::Unknown(_) => Color::DarkGray,
    }
}

// Build the UI (list) for task list
pub fn get_list_items_ui(tasks: &[Task]) -> Vec<ListItem<'_>> {
    tasks
        .iter()
        .map(|task| {
            let mut lines = vec![Line::from(vec![
                Span::from(if task.completed { "[x] " } else { "[ ] " }),
                Span::from(task.title.as_str()).fg(priority_color(&task.priority)),
            ])];

            let mut details = vec![Span::from(format!(
                "    {} #{}",
                task.priority, task.order
            ))];
            if !task.description.is_empty() {
                details.push(Span::from(format!("  {}", task.description)));
            }
            lines.push(Line::from(details));

            ListItem::new(lines).style(Style::default().fg(Color::White))
        })
        .collect()
}

// Build the UI (lines) for statistics infobox
pub fn get_statistics_ui<'a>(app: &'a App<'a>) -> Vec<Line<'a>> {
    let mut lines = vec![
        Line::from(format!("Total tasks: {}", app.items.items.len())),
        Line::from(format!(
            "Uncompleted tasks: {}",
            app.items.get_uncompleted().len()
        )),
        Line::from(format!(
            "Open high priority: {}",
            app.items.get_open_high_priority().len()
        )),
        Line::from(format!(
            "Completed today: {}",
            app.items.get_completed_today().len()
        )),
    ];

    if let Some(error) = &app.items.last_error {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::from(error.as_str()).fg(Color::Red)));
    }

    lines
}

// Build the UI (lines) for instructions infobox
pub fn get_instructions_ui<'a>() -> Vec<Line<'a>> {
    vec![
        "Enter - toggle do/done".into(),
        "a - add a task".into(),
        "e - edit a task".into(),
        "x - delete a task".into(),
        "K / J - move up / down".into(),
        "r - reload".into(),
        "q - quit".into(),
    ]
}
