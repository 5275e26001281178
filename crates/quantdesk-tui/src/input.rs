use crossterm::event::{KeyCode, KeyEvent};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a cursor counted in chars.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Take the text out, leaving the field empty.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Apply an editing key. Returns whether the text changed; keys that are
    /// not editing keys are ignored.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Backspace => {
                if self.cursor == 0 {
                    return false;
                }
                self.cursor -= 1;
                let byte_pos = char_to_byte_index(&self.text, self.cursor);
                self.text.remove(byte_pos);
                true
            }
            KeyCode::Delete => {
                if self.cursor >= self.char_count() {
                    return false;
                }
                let byte_pos = char_to_byte_index(&self.text, self.cursor);
                self.text.remove(byte_pos);
                true
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                false
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.char_count());
                false
            }
            KeyCode::Home => {
                self.cursor = 0;
                false
            }
            KeyCode::End => {
                self.cursor = self.char_count();
                false
            }
            KeyCode::Char(c) => {
                let byte_pos = char_to_byte_index(&self.text, self.cursor);
                self.text.insert(byte_pos, c);
                self.cursor += 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "né€x";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 3), 6);
        assert_eq!(char_to_byte_index(s, 10), s.len());
    }

    #[test]
    fn test_editing_around_multibyte_chars() {
        let mut input = TextInput::default();
        for c in "p€x".chars() {
            assert!(input.handle_key(key(KeyCode::Char(c))));
        }
        assert!(!input.handle_key(key(KeyCode::Left)));
        assert!(input.handle_key(key(KeyCode::Backspace)));
        assert_eq!(input.text, "px");
        assert_eq!(input.cursor, 1);

        assert!(!input.handle_key(key(KeyCode::End)));
        assert!(!input.handle_key(key(KeyCode::Delete)));
        assert_eq!(input.take(), "px");
        assert!(input.is_empty());
        assert_eq!(input.cursor, 0);
    }
}
