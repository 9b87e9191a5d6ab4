//! Item key and function parameter grammar for the in-memory collaborator.
//!
//! Item keys look like `name[p1,"p 2",[a,b]]`: parameters are unquoted,
//! quoted with `\"` escapes, or one level of array. Function parameter
//! lists use the same parameter forms without arrays.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Unquoted,
    Quoted,
}

/// A leaf parameter and its byte range in the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawParam {
    kind: ParamKind,
    start: usize,
    end: usize,
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos) == Some(&b' ') {
        pos += 1;
    }
    pos
}

/// Parse a comma separated list starting at `pos`, ended by `close` (or by
/// the end of input when `close` is `None`). Returns the position after
/// the list.
fn parse_list(
    text: &str,
    mut pos: usize,
    close: Option<u8>,
    allow_arrays: bool,
    leaves: &mut Vec<RawParam>,
) -> Option<usize> {
    let bytes = text.as_bytes();
    loop {
        pos = skip_spaces(bytes, pos);
        match bytes.get(pos) {
            Some(b'"') => {
                let start = pos;
                pos += 1;
                loop {
                    match bytes.get(pos)? {
                        b'\\' if bytes.get(pos + 1) == Some(&b'"') => pos += 2,
                        b'"' => {
                            pos += 1;
                            break;
                        }
                        _ => pos += 1,
                    }
                }
                leaves.push(RawParam {
                    kind: ParamKind::Quoted,
                    start,
                    end: pos,
                });
                pos = skip_spaces(bytes, pos);
            }
            Some(b'[') if allow_arrays => {
                pos = parse_list(text, pos + 1, Some(b']'), false, leaves)?;
                pos = skip_spaces(bytes, pos);
            }
            _ => {
                let start = pos;
                while let Some(&b) = bytes.get(pos) {
                    if b == b',' || Some(b) == close || (b == b']' && close != Some(b')')) {
                        break;
                    }
                    pos += 1;
                }
                leaves.push(RawParam {
                    kind: ParamKind::Unquoted,
                    start,
                    end: pos,
                });
            }
        }
        match bytes.get(pos) {
            Some(b',') => pos += 1,
            Some(&b) if Some(b) == close => return Some(pos + 1),
            None if close.is_none() => return Some(pos),
            _ => return None,
        }
    }
}

fn unquote(raw: &str) -> String {
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw)
        .replace("\\\"", "\"")
}

fn quote(value: &str, forced: bool, specials: &[char]) -> String {
    if !forced && !value.starts_with(['"', ' ']) && !value.contains(specials) {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\\\""))
}

fn item_key_leaves(key: &str) -> Option<Vec<RawParam>> {
    let name_end = key.find('[').unwrap_or(key.len());
    let name = &key[..name_end];
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return None;
    }
    let mut leaves = Vec::new();
    if name_end < key.len() {
        let end = parse_list(key, name_end + 1, Some(b']'), true, &mut leaves)?;
        if end != key.len() {
            return None;
        }
    }
    Some(leaves)
}

fn function_leaves(parameter: &str) -> Option<Vec<RawParam>> {
    let mut leaves = Vec::new();
    parse_list(parameter, 0, None, false, &mut leaves)?;
    Some(leaves)
}

fn values(text: &str, leaves: &[RawParam]) -> Vec<String> {
    leaves
        .iter()
        .map(|p| {
            let raw = &text[p.start..p.end];
            match p.kind {
                ParamKind::Unquoted => raw.to_string(),
                ParamKind::Quoted => unquote(raw),
            }
        })
        .collect()
}

fn rewrite(
    text: &str,
    leaves: &[RawParam],
    specials: &[char],
    rewrite: &dyn Fn(&str) -> String,
) -> String {
    let mut out = text.to_string();
    for p in leaves.iter().rev() {
        let raw = &text[p.start..p.end];
        let replaced = match p.kind {
            ParamKind::Unquoted => quote(&rewrite(raw), false, specials),
            ParamKind::Quoted => quote(&rewrite(&unquote(raw)), true, specials),
        };
        out.replace_range(p.start..p.end, &replaced);
    }
    out
}

pub(crate) fn item_key_params(key: &str) -> Option<Vec<String>> {
    item_key_leaves(key).map(|leaves| values(key, &leaves))
}

pub(crate) fn rewrite_item_key(key: &str, f: &dyn Fn(&str) -> String) -> String {
    match item_key_leaves(key) {
        Some(leaves) => rewrite(key, &leaves, &[',', ']'], f),
        None => key.to_string(),
    }
}

pub(crate) fn function_params(parameter: &str) -> Option<Vec<String>> {
    function_leaves(parameter).map(|leaves| values(parameter, &leaves))
}

pub(crate) fn rewrite_function_params(parameter: &str, f: &dyn Fn(&str) -> String) -> String {
    match function_leaves(parameter) {
        Some(leaves) => rewrite(parameter, &leaves, &[',', ')'], f),
        None => parameter.to_string(),
    }
}
