//! Distributing secondary-language sentences across subtitle intervals.

use crate::error::AllocationError;

/// Sentence-terminal marks of the secondary script.
const SENTENCE_TERMINALS: [char; 3] = ['。', '！', '？'];

/// The sentences shown alongside one interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentenceGroup {
    pub sentences: Vec<String>,
}

impl SentenceGroup {
    /// Sentences joined without separators; their own punctuation delimits them.
    pub fn text(&self) -> String {
        self.sentences.concat()
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// Split `text` after every terminal mark, trimming fragments and dropping
/// empty ones. Trailing text without a terminal counts as a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if SENTENCE_TERMINALS.contains(&c) {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Partition the sentences of `text` into exactly `intervals` groups of
/// `ceil(T / intervals)` sentences each, in order. Trailing groups are
/// empty when there are too few sentences to reach them.
pub fn allocate_sentences(
    text: &str,
    intervals: usize,
) -> Result<Vec<SentenceGroup>, AllocationError> {
    if intervals == 0 {
        return Err(AllocationError::NoIntervals);
    }

    let sentences = split_sentences(text);
    let group_size = sentences.len().div_ceil(intervals);

    let mut groups = vec![SentenceGroup::default(); intervals];
    if group_size > 0 {
        for (i, sentence) in sentences.into_iter().enumerate() {
            groups[i / group_size].sentences.push(sentence);
        }
    }
    Ok(groups)
}
