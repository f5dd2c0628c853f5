use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::App;
use crate::tui::AppEvent;

const PAGE: u16 = 10;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::View(event) => app.apply_view_event(event),
        AppEvent::TurnFinished(report) => app.finish_turn(report),
        AppEvent::Health(healthy) => app.server_healthy = Some(healthy),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.stop();
                app.should_quit = true;
                return;
            }
            KeyCode::Char('t') => {
                app.toggle_mode();
                return;
            }
            _ => {}
        }
    }

    if app.show_help {
        handle_help(app, key);
        return;
    }

    if app.show_model_picker {
        match key.code {
            KeyCode::Esc => {
                app.show_model_picker = false;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                app.model_picker_nav_down();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                app.model_picker_nav_up();
            }
            KeyCode::Enter => {
                app.select_model();
            }
            _ => {}
        }
        return;
    }

    handle_chat(app, key);
}

fn handle_help(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q') => {
            app.show_help = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.help_scroll = app.help_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.help_scroll = app.help_scroll.saturating_sub(1);
        }
        KeyCode::Char(c @ '1'..='9') => {
            let n = c as usize - '1' as usize;
            app.copy_help_block(n);
        }
        _ => {}
    }
}

fn handle_chat(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('y') => app.copy_latest_code(),
            KeyCode::Char('l') => app.reset_session(),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit_or_stop(),
        KeyCode::Esc => {
            if app.is_streaming() {
                app.stop();
            }
        }
        KeyCode::F(1) => {
            app.help_scroll = 0;
            app.show_help = true;
        }
        KeyCode::F(2) => app.open_model_picker(),
        KeyCode::PageUp => app.scroll_up(PAGE),
        KeyCode::PageDown => app.scroll_down(PAGE),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        // The input is disabled while a reply streams
        _ if app.is_streaming() => {}
        KeyCode::Backspace => app.active_input_mut().backspace(),
        KeyCode::Delete => app.active_input_mut().delete(),
        KeyCode::Left => app.active_input_mut().left(),
        KeyCode::Right => app.active_input_mut().right(),
        KeyCode::Home => app.active_input_mut().home(),
        KeyCode::End => app.active_input_mut().end(),
        KeyCode::Char(c) => app.active_input_mut().insert(c),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
