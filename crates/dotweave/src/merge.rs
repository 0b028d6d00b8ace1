//! Line-based three-way merge between a previous pure render, the on-disk
//! rendered file and a fresh render.
//!
//! Lines are matched strictly by index. There is no alignment step, so an
//! insertion on one side shifts every following line. Config files are
//! mostly edited in place, which is the case this handles well.

pub const CONFLICT_START: &str = "<<<<<<< user-edits";
pub const CONFLICT_SEPARATOR: &str = "=======";
pub const CONFLICT_END: &str = ">>>>>>> template";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub content: String,
    pub has_conflict: bool,
}

impl MergeResult {
    fn clean(content: &str) -> Self {
        Self {
            content: content.to_string(),
            has_conflict: false,
        }
    }
}

/// Merges `theirs` (user-edited file) and `ours` (fresh template output)
/// against `base` (last pure render). Never fails; conflicting lines are
/// emitted between markers and flagged in the result.
pub fn three_way_merge(base: &str, theirs: &str, ours: &str) -> MergeResult {
    if base == theirs {
        return MergeResult::clean(ours);
    }
    if base == ours {
        return MergeResult::clean(theirs);
    }
    if theirs == ours {
        return MergeResult::clean(ours);
    }

    merge_lines(&split_lines(base), &split_lines(theirs), &split_lines(ours))
}

/// An empty string has no lines; otherwise every `\n` separates two lines,
/// so a trailing newline yields a final empty line.
fn split_lines(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split('\n').collect()
}

fn merge_lines(base: &[&str], theirs: &[&str], ours: &[&str]) -> MergeResult {
    let max_len = base.len().max(theirs.len()).max(ours.len());
    let mut out: Vec<String> = Vec::with_capacity(max_len);
    let mut has_conflict = false;

    for i in 0..max_len {
        match (base.get(i), theirs.get(i), ours.get(i)) {
            (Some(b), Some(t), Some(o)) => {
                if b == t && t == o {
                    out.push(b.to_string());
                } else if b == t {
                    out.push(o.to_string());
                } else if b == o {
                    out.push(t.to_string());
                } else if t == o {
                    out.push(o.to_string());
                } else {
                    push_conflict(&mut out, t, o);
                    has_conflict = true;
                }
            }
            (None, Some(t), Some(o)) => {
                if t == o {
                    out.push(o.to_string());
                } else {
                    push_conflict(&mut out, t, o);
                    has_conflict = true;
                }
            }
            (Some(b), None, Some(o)) => {
                // user deleted the line; only a changed template line conflicts
                if b != o {
                    let placeholder = format!("(line deleted by user, was: {})", b);
                    push_conflict(&mut out, &placeholder, o);
                    has_conflict = true;
                }
            }
            (Some(b), Some(t), None) => {
                if b != t {
                    out.push(t.to_string());
                }
            }
            (None, Some(t), None) => out.push(t.to_string()),
            (None, None, Some(o)) => out.push(o.to_string()),
            (Some(_), None, None) | (None, None, None) => {}
        }
    }

    MergeResult {
        content: out.join("\n"),
        has_conflict,
    }
}

fn push_conflict(out: &mut Vec<String>, theirs: &str, ours: &str) {
    out.push(CONFLICT_START.to_string());
    out.push(theirs.to_string());
    out.push(CONFLICT_SEPARATOR.to_string());
    out.push(ours.to_string());
    out.push(CONFLICT_END.to_string());
}
