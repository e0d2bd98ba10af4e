use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, SheetConfig, SheetError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &SheetConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, SheetError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            if model.raw_keyevents() {
                return Ok(Some(Message::RawKey(key)));
            }
            return Ok(self.handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Right, _) | (KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::Left, _) | (KeyCode::Char('p'), _) => Some(Message::PreviousPage),
            (KeyCode::Char('g'), _) => Some(Message::GoToPage),
            (KeyCode::Tab, _) => Some(Message::SelectNextColumn),
            (KeyCode::BackTab, _) => Some(Message::SelectPreviousColumn),
            (KeyCode::Char('s'), _) => Some(Message::SortSelectedColumn),
            (KeyCode::Char('f'), _) => Some(Message::FilterSelectedColumn),
            (KeyCode::Char('/'), _) => Some(Message::EnterQuery),
            (KeyCode::Enter, _) => Some(Message::Search),
            (KeyCode::Char('u'), _) => Some(Message::Upload),
            (KeyCode::Char('c'), _) => Some(Message::Clear),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode, modifiers: KeyModifiers) -> Option<Message> {
        Controller::new(&SheetConfig::default()).handle_key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn maps_navigation_keys() {
        assert_eq!(map(KeyCode::Right, KeyModifiers::NONE), Some(Message::NextPage));
        assert_eq!(map(KeyCode::Char('p'), KeyModifiers::NONE), Some(Message::PreviousPage));
        assert_eq!(map(KeyCode::Char('g'), KeyModifiers::NONE), Some(Message::GoToPage));
        assert_eq!(map(KeyCode::BackTab, KeyModifiers::SHIFT), Some(Message::SelectPreviousColumn));
    }

    #[test]
    fn ctrl_c_quits_but_c_clears() {
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Message::Quit));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::NONE), Some(Message::Clear));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert_eq!(map(KeyCode::Char('z'), KeyModifiers::NONE), None);
    }
}
