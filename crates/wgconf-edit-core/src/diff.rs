use similar::{ChangeTag, TextDiff};

/// Unified diff of one file edit with per-line counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    pub text: String,
    pub insertions: usize,
    pub deletions: usize,
}

pub fn unified_diff(original: &str, modified: &str, path: &str) -> Option<DiffSummary> {
    if original == modified {
        return None;
    }

    let diff = TextDiff::from_lines(original, modified);
    let (insertions, deletions) = diff
        .iter_all_changes()
        .fold((0, 0), |(ins, del), change| match change.tag() {
            ChangeTag::Insert => (ins + 1, del),
            ChangeTag::Delete => (ins, del + 1),
            ChangeTag::Equal => (ins, del),
        });

    let header_old = format!("a/{path}");
    let header_new = format!("b/{path}");
    let text = diff
        .unified_diff()
        .context_radius(2)
        .header(&header_old, &header_new)
        .to_string();

    Some(DiffSummary {
        text,
        insertions,
        deletions,
    })
}
