//! Named capture groups of `rex` patterns.

#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupKind {
    Named(String),
    Capturing,
    NonCapturing,
}

#[derive(Debug)]
struct GroupOpen {
    /// Byte offset of the `(`.
    start: usize,
    /// Byte length of the group header after the `(`, e.g. `?P<user>`.
    header_len: usize,
    kind: GroupKind,
}

/// Finds every group opening outside escapes and character classes.
fn scan(pattern: &str) -> Vec<GroupOpen> {
    let chars: Vec<(usize, char)> = pattern.char_indices().collect();
    let mut groups = Vec::new();
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            '\\' => {
                i += 2;
                continue;
            }
            '[' if !in_class => {
                in_class = true;
                i += 1;
                if chars.get(i).map(|&(_, c)| c) == Some('^') {
                    i += 1;
                }
                // A `]` right after the opening bracket is a literal.
                if chars.get(i).map(|&(_, c)| c) == Some(']') {
                    i += 1;
                }
                continue;
            }
            ']' if in_class => in_class = false,
            '(' if !in_class => groups.push(group_at(pattern, pos)),
            _ => {}
        }
        i += 1;
    }

    groups
}

fn group_at(pattern: &str, start: usize) -> GroupOpen {
    let rest = &pattern[start + 1..];
    let named = rest.strip_prefix("?P<").or_else(|| {
        rest.strip_prefix("?<")
            .filter(|after| !after.starts_with('=') && !after.starts_with('!'))
    });

    if let Some(after) = named {
        if let Some(end) = after.find('>') {
            return GroupOpen {
                start,
                header_len: rest.len() - after.len() + end + 1,
                kind: GroupKind::Named(after[..end].to_string()),
            };
        }
    }

    let kind = if rest.starts_with('?') {
        GroupKind::NonCapturing
    } else {
        GroupKind::Capturing
    };
    GroupOpen {
        start,
        header_len: 0,
        kind,
    }
}

/// Names of the named capture groups, in pattern order.
#[must_use]
pub fn named_groups(pattern: &str) -> Vec<String> {
    scan(pattern)
        .into_iter()
        .filter_map(|group| match group.kind {
            GroupKind::Named(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Rewrites `pattern` so that `name` is its only capturing group.
///
/// Other named and plain groups become non-capturing, so a first-group extractor
/// returns exactly the requested group.
#[must_use]
pub fn isolate_group(pattern: &str, name: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;

    for group in scan(pattern) {
        let replacement = match &group.kind {
            GroupKind::Named(n) if n == name => "(",
            GroupKind::Named(_) | GroupKind::Capturing => "(?:",
            GroupKind::NonCapturing => continue,
        };
        out.push_str(&pattern[last..group.start]);
        out.push_str(replacement);
        last = group.start + 1 + group.header_len;
    }

    out.push_str(&pattern[last..]);
    out
}
