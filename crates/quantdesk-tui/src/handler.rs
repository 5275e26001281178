use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::Search => handle_search_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.focus = app.focus.next(),

        // Input box
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Enter if app.focus == FocusPane::Input => {
            app.input_mode = InputMode::Editing;
        }

        // Watchlist
        KeyCode::Char('s') | KeyCode::Char('a') => app.open_search(),
        KeyCode::Char('x') | KeyCode::Delete if app.focus == FocusPane::Watchlist => {
            app.remove_selected();
        }

        // Chart controls
        KeyCode::Char('p') => app.run_prediction(),
        KeyCode::Char('f') => app.toggle_forecast(),
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Char('d') => app.cycle_range(),

        // Analyst
        KeyCode::Char(c @ '1'..='4') => {
            let index = (c as usize) - ('1' as usize);
            app.quick_action(index);
        }
        KeyCode::Char('c') => app.compare_with_next(),
        KeyCode::Char('h') => app.check_agent(),

        // Navigation, depending on focus
        KeyCode::Down | KeyCode::Char('j') => match app.focus {
            FocusPane::Watchlist => app.watchlist_down(),
            FocusPane::Chat | FocusPane::Input => app.scroll_chat_down(),
        },
        KeyCode::Up | KeyCode::Char('k') => match app.focus {
            FocusPane::Watchlist => app.watchlist_up(),
            FocusPane::Chat | FocusPane::Input => app.scroll_chat_up(),
        },
        KeyCode::End | KeyCode::Char('G') => app.chat_follow = true,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Keep the draft while a question is in flight
            if !app.session.is_pending() && !app.query.text.trim().is_empty() {
                app.submit_input();
                app.input_mode = InputMode::Normal;
            }
        }
        _ => {
            app.query.handle_key(key);
        }
    }
}

fn handle_search_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_search(),
        KeyCode::Enter => app.confirm_search(),
        KeyCode::Down => app.search_down(),
        KeyCode::Up => app.search_up(),
        _ => {
            if app.search.handle_key(key) {
                app.search_changed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantdesk_core::Config;

    fn press(app: &mut App, code: KeyCode) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))).unwrap();
    }

    #[test]
    fn test_search_mode_edits_search_not_query() {
        let mut app = App::new(Config::new()).unwrap();
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.input_mode, InputMode::Search);

        // Letters that are shortcuts in normal mode are plain text here
        for c in "pq".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.search.text, "pq");
        assert!(app.query.is_empty());
        assert!(!app.should_quit);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.search.is_empty());
    }

    #[test]
    fn test_editing_mode_keeps_blank_draft() {
        let mut app = App::new(Config::new()).unwrap();
        press(&mut app, KeyCode::Char('i'));
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.input_mode, InputMode::Editing);
        assert_eq!(app.session.messages().len(), 1);
    }
}
