use crate::shared::color;

/// Color tags at or below this alpha are treated as decorative and stripped;
/// anything more opaque stays in the name verbatim.
const MAX_TAG_ALPHA: f32 = 0.8;

pub fn sanitize_name(name: &str, max_len: usize) -> String {
    let trimmed = name.trim();
    if trimmed == "[" || trimmed == "]" {
        return String::new();
    }

    let mut chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        // A genuine tag opener is a '[' not doubled on either side; '[[' is
        // the escaped literal form.
        if chars[i] == '['
            && i != chars.len() - 1
            && chars[i + 1] != '['
            && (i == 0 || chars[i - 1] != '[')
        {
            let tail = strip_color_tag(&chars[i..]);
            chars.truncate(i);
            chars.extend(tail);
        }
        i += 1;
    }

    let mut result = String::new();
    for ch in chars {
        if result.len() + ch.len_utf8() > max_len {
            break;
        }
        result.push(ch);
    }
    result
}

fn strip_color_tag(tag: &[char]) -> Vec<char> {
    for i in 1..tag.len() {
        if tag[i] != ']' {
            continue;
        }
        let label: String = tag[1..i].iter().collect();
        if let Some(resolved) = color::named(&label) {
            if resolved.a <= MAX_TAG_ALPHA {
                return tag[i + 1..].to_vec();
            }
        } else {
            match color::parse_hex(&label) {
                Some(resolved) if resolved.a <= MAX_TAG_ALPHA => return tag[i + 1..].to_vec(),
                Some(_) => {}
                // Not a color at all, so this bracket is not an escape.
                None => return tag.to_vec(),
            }
        }
    }
    tag.to_vec()
}
