//! Map a click in the rendered page back to the source file.
//!
//! The rendered text is diffed against the raw source. Walking the hunks
//! accumulates a cursor in both texts until the displayed cursor reaches the
//! click. A click inside text that only exists in the rendering (an inserted
//! hunk) lands on the nearest source boundary.
//!
//! Offsets are UTF-16 code units on both ends, matching the content frame and
//! the host editor.

use std::time::Duration;

use similar::{Algorithm, ChangeTag, TextDiff};

/// Upper bound for the diff; a timed-out diff is coarser but still valid.
const DIFF_TIMEOUT: Duration = Duration::from_secs(1);

/// Typographic apostrophe inserted by Hugo's smart quotes.
const RIGHT_SINGLE_QUOTE: char = '\u{2019}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hunk {
    pub tag: ChangeTag,
    pub text: String,
}

impl Hunk {
    fn new(tag: ChangeTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// Source offset corresponding to `offset` in `displayed`.
pub fn map_click(source: &str, displayed: &str, offset: usize) -> usize {
    let displayed = displayed.replace(RIGHT_SINGLE_QUOTE, "'");
    let hunks = cleanup_semantic(diff(source, &displayed));

    let mut source_pos = 0;
    let mut displayed_pos = 0;
    for hunk in &hunks {
        let len = utf16_len(&hunk.text);
        if hunk.tag != ChangeTag::Delete {
            if displayed_pos + len >= offset {
                if hunk.tag == ChangeTag::Equal {
                    source_pos += offset - displayed_pos;
                }
                break;
            }
            displayed_pos += len;
        }
        if hunk.tag != ChangeTag::Insert {
            source_pos += len;
        }
    }
    source_pos
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Character diff grouped into runs of equal tag.
fn diff(old: &str, new: &str) -> Vec<Hunk> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_TIMEOUT)
        .diff_chars(old, new);

    let mut hunks: Vec<Hunk> = Vec::new();
    for change in diff.iter_all_changes() {
        match hunks.last_mut() {
            Some(last) if last.tag == change.tag() => last.text.push_str(change.value()),
            _ => hunks.push(Hunk::new(change.tag(), change.value())),
        }
    }
    cleanup_merge(hunks)
}

// ============================================================================
// Cleanup
// ============================================================================

/// Turn short equalities that are dominated by edits on both sides into
/// edits, so scattered single-character matches don't split real changes.
pub(crate) fn cleanup_semantic(mut hunks: Vec<Hunk>) -> Vec<Hunk> {
    let mut changed = false;
    // Indices of equalities seen so far
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<usize> = None;
    // Edit lengths before (1) and after (2) the last equality
    let (mut ins_before, mut del_before) = (0, 0);
    let (mut ins_after, mut del_after) = (0, 0);

    let mut pointer = 0;
    while pointer < hunks.len() {
        let len = hunks[pointer].text.chars().count();
        let tag = hunks[pointer].tag;
        match tag {
            ChangeTag::Equal => {
                equalities.push(pointer);
                (ins_before, del_before) = (ins_after, del_after);
                (ins_after, del_after) = (0, 0);
                last_equality = Some(len);
            }
            _ => {
                if tag == ChangeTag::Insert {
                    ins_after += len;
                } else {
                    del_after += len;
                }
                let dominated = last_equality.is_some_and(|eq| {
                    eq <= ins_before.max(del_before) && eq <= ins_after.max(del_after)
                });
                if dominated {
                    let Some(at) = equalities.pop() else {
                        break;
                    };
                    // Equality becomes a deletion followed by an insertion
                    let text = hunks[at].text.clone();
                    hunks[at].tag = ChangeTag::Insert;
                    hunks.insert(at, Hunk::new(ChangeTag::Delete, text));
                    // The previous equality needs another look too
                    equalities.pop();
                    (ins_before, del_before, ins_after, del_after) = (0, 0, 0, 0);
                    last_equality = None;
                    changed = true;
                    match equalities.last() {
                        Some(&eq) => pointer = eq,
                        None => {
                            pointer = 0;
                            continue;
                        }
                    }
                }
            }
        }
        pointer += 1;
    }

    if changed { cleanup_merge(hunks) } else { hunks }
}

/// Merge neighbouring hunks of the same kind, order each edit run as
/// deletion then insertion, and move text common to both sides of a
/// replacement into the surrounding equalities.
pub(crate) fn cleanup_merge(hunks: Vec<Hunk>) -> Vec<Hunk> {
    let mut out: Vec<Hunk> = Vec::with_capacity(hunks.len());
    let mut deleted = String::new();
    let mut inserted = String::new();

    for hunk in hunks {
        match hunk.tag {
            ChangeTag::Delete => deleted.push_str(&hunk.text),
            ChangeTag::Insert => inserted.push_str(&hunk.text),
            ChangeTag::Equal => {
                let mut equal = hunk.text;
                flush_edits(&mut out, &mut deleted, &mut inserted, &mut equal);
                push_equal(&mut out, equal);
            }
        }
    }
    let mut tail = String::new();
    flush_edits(&mut out, &mut deleted, &mut inserted, &mut tail);
    push_equal(&mut out, tail);
    out
}

/// Emit the pending edit run. Common prefix goes to the previous equality,
/// common suffix to the front of `next`.
fn flush_edits(out: &mut Vec<Hunk>, deleted: &mut String, inserted: &mut String, next: &mut String) {
    if !deleted.is_empty() && !inserted.is_empty() {
        let prefix = common_prefix(deleted, inserted);
        if prefix > 0 {
            push_equal(out, deleted[..prefix].to_string());
            deleted.drain(..prefix);
            inserted.drain(..prefix);
        }
        let suffix = common_suffix(deleted, inserted);
        if suffix > 0 {
            next.insert_str(0, &deleted[deleted.len() - suffix..]);
            deleted.truncate(deleted.len() - suffix);
            inserted.truncate(inserted.len() - suffix);
        }
    }
    if !deleted.is_empty() {
        out.push(Hunk::new(ChangeTag::Delete, std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        out.push(Hunk::new(ChangeTag::Insert, std::mem::take(inserted)));
    }
}

fn push_equal(out: &mut Vec<Hunk>, text: String) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.tag == ChangeTag::Equal => last.text.push_str(&text),
        _ => out.push(Hunk::new(ChangeTag::Equal, text)),
    }
}

/// Byte length of the common prefix.
fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Byte length of the common suffix.
fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}
