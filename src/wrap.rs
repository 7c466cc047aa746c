//! Script-aware subtitle line wrapping.

/// How a text block is broken into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    /// Whole words, joined by single spaces
    Words,
    /// Individual characters, for scripts written without spaces
    Characters,
}

/// Pick the wrapping mode for `text`: any kana or CJK ideograph selects
/// character mode.
pub fn detect_mode(text: &str) -> WrapMode {
    if text.chars().any(is_dense_script) {
        WrapMode::Characters
    } else {
        WrapMode::Words
    }
}

fn is_dense_script(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30FF}' | '\u{4E00}'..='\u{9FFF}')
}

/// Wrap `text` into lines of at most `budget` characters.
///
/// In word mode a single word longer than the budget is kept whole on its
/// own line. In character mode every line except the last holds exactly
/// `budget` characters.
pub fn wrap_lines(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    match detect_mode(text) {
        WrapMode::Characters => wrap_characters(text, budget),
        WrapMode::Words => wrap_words(text, budget),
    }
}

fn wrap_characters(text: &str, budget: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        if count == budget {
            lines.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn wrap_words(text: &str, budget: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= budget {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_mode_breaks_on_budget() {
        assert_eq!(
            wrap_lines("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn oversized_word_stays_whole() {
        assert_eq!(
            wrap_lines("a extraordinarily b", 5),
            vec!["a", "extraordinarily", "b"]
        );
    }

    #[test]
    fn character_mode_fills_lines_exactly() {
        let text: String = std::iter::repeat('日').take(45).collect();
        let lines = wrap_lines(&text, 40);
        let lengths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert_eq!(lengths, vec![40, 5]);
    }

    #[test]
    fn kana_selects_character_mode() {
        assert_eq!(detect_mode("これはペンです"), WrapMode::Characters);
        assert_eq!(detect_mode("plain words"), WrapMode::Words);
        assert_eq!(wrap_lines("ひらがなabc", 3), vec!["ひらが", "なab", "c"]);
    }

    #[test]
    fn word_lines_respect_budget() {
        let text = "It was the best of times it was the worst of times it was the age of wisdom";
        for line in wrap_lines(text, 12) {
            assert!(line.len() <= 12 || !line.contains(' '), "{line:?}");
        }
    }

    #[test]
    fn empty_text_has_no_lines() {
        assert!(wrap_lines("", 10).is_empty());
        assert!(wrap_lines("   ", 10).is_empty());
    }
}
