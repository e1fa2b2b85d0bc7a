use anyhow::{bail, Result};

/// One ordered narration unit. The index is stable for the lifetime of the
/// job and fixes both narration order and caption order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSentence {
    pub index: usize,
    pub text: String,
}

/// An immutable, ordered script. Built once at submission; the orchestrator
/// never reorders or rewrites it.
#[derive(Debug, Clone)]
pub struct Script {
    sentences: Vec<ScriptSentence>,
}

impl Script {
    /// Splits raw script text into sentences on `.`, `!`, `?` and newlines,
    /// re-chunking anything longer than `max_len` at a whitespace boundary.
    pub fn parse(text: &str, max_len: usize) -> Result<Self> {
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for ch in text.chars() {
            match ch {
                '\n' => {
                    push_piece(&mut pieces, &mut current);
                }
                '.' | '!' | '?' => {
                    current.push(ch);
                    push_piece(&mut pieces, &mut current);
                }
                _ => current.push(ch),
            }
        }
        push_piece(&mut pieces, &mut current);

        let mut sentences = Vec::new();
        for piece in pieces {
            for chunk in rechunk(&piece, max_len) {
                sentences.push(ScriptSentence {
                    index: sentences.len(),
                    text: chunk,
                });
            }
        }

        if sentences.is_empty() {
            bail!("script contains no sentences");
        }
        Ok(Self { sentences })
    }

    pub fn sentences(&self) -> &[ScriptSentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

fn push_piece(pieces: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
    current.clear();
}

/// Splits an over-long sentence at whitespace so no chunk exceeds `max_len`
/// characters. A single word longer than the limit is kept whole.
fn rechunk(piece: &str, max_len: usize) -> Vec<String> {
    if piece.chars().count() <= max_len {
        return vec![piece.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in piece.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_terminators() -> Result<()> {
        let script = Script::parse("Hello world. This is a test.", 100)?;
        let texts: Vec<&str> = script.sentences().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello world.", "This is a test."]);
        Ok(())
    }

    #[test]
    fn test_indices_are_stable_and_ordered() -> Result<()> {
        let script = Script::parse("One.\nTwo!\nThree?", 100)?;
        for (i, s) in script.sentences().iter().enumerate() {
            assert_eq!(s.index, i);
        }
        assert_eq!(script.len(), 3);
        Ok(())
    }

    #[test]
    fn test_blank_lines_and_whitespace_dropped() -> Result<()> {
        let script = Script::parse("  First line \n\n \n Second line \n", 100)?;
        let texts: Vec<&str> = script.sentences().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["First line", "Second line"]);
        Ok(())
    }

    #[test]
    fn test_long_sentence_rechunked_at_whitespace() -> Result<()> {
        let script = Script::parse("aaaa bbbb cccc dddd", 9)?;
        let texts: Vec<&str> = script.sentences().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa bbbb", "cccc dddd"]);
        Ok(())
    }

    #[test]
    fn test_empty_script_rejected() {
        assert!(Script::parse("", 100).is_err());
        assert!(Script::parse("   \n  ", 100).is_err());
    }
}
