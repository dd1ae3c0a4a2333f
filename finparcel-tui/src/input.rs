use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Trigger an aggregation run outside the schedule
    Refresh,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Char, Down, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    match key.code {
        Char('q') | KeyCode::Esc => Action::Quit,
        Char('r') | KeyCode::F(5) => Action::Refresh,
        Up | Char('k') => {
            app.scroll_up();
            Action::None
        }
        Down | Char('j') => {
            app.scroll_down();
            Action::None
        }
        _ => Action::None,
    }
}
