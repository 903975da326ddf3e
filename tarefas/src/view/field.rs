//! Single-line text input with a character cursor.

/// The two inputs of a task form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormField {
    #[default]
    Titulo,
    Descricao,
}

impl FormField {
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Titulo => Self::Descricao,
            Self::Descricao => Self::Titulo,
        }
    }
}

/// An editable line of text.
///
/// The cursor is a character index, so multi-byte input never splits a
/// code point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextField {
    value: String,
    cursor: usize,
}

impl TextField {
    /// A field prefilled with `value`, cursor at the end.
    pub fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set(&mut self, value: impl Into<String>) {
        *self = Self::with_value(value);
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// Deletes the character before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let at = self.byte_index(self.cursor - 1);
        self.value.remove(at);
        self.cursor -= 1;
    }

    pub const fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.value.chars().count() {
            self.cursor += 1;
        }
    }

    pub const fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    fn byte_index(&self, chars: usize) -> usize {
        self.value
            .char_indices()
            .nth(chars)
            .map_or(self.value.len(), |(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_multibyte_text() {
        let mut field = TextField::with_value("açã");
        field.backspace();
        field.insert('o');
        assert_eq!(field.value(), "aço");
        field.home();
        field.move_right();
        field.insert('x');
        assert_eq!(field.value(), "axço");
        assert_eq!(field.cursor(), 2);
    }

    #[test]
    fn backspace_at_start_is_noop() {
        let mut field = TextField::with_value("ab");
        field.home();
        field.backspace();
        assert_eq!(field.value(), "ab");
    }
}
