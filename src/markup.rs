use crate::dom::{Document, NodeId, is_raw_text_element, is_void_element};

/// Parses `html` and appends the resulting nodes to `parent`.
///
/// Returns the nodes appended directly under `parent`.
pub fn parse_fragment(doc: &mut Document, parent: NodeId, html: &str) -> Vec<NodeId> {
    let mut top_level = Vec::new();
    let mut stack: Vec<(NodeId, String)> = Vec::new();
    let mut pos = 0usize;
    let bytes = html.as_bytes();

    while pos < html.len() {
        let rest = &html[pos..];
        let current = stack.last().map(|(node, _)| *node).unwrap_or(parent);

        if rest.starts_with("<!--") {
            pos += rest.find("-->").map(|end| end + 3).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos += rest.find('>').map(|end| end + 1).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("</") {
            let end = rest.find('>').map(|end| end + 1).unwrap_or(rest.len());
            let name = rest[2..end]
                .trim_end_matches('>')
                .trim()
                .to_ascii_lowercase();
            if let Some(depth) = stack.iter().rposition(|(_, tag)| *tag == name) {
                stack.truncate(depth);
            }
            pos += end;
            continue;
        }
        if bytes[pos] == b'<' && bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic) {
            let tag = parse_start_tag(rest);
            let node = doc.create_element(&tag.name);
            for (name, value) in &tag.attrs {
                doc.set_attr(node, name, value.clone());
            }
            doc.append_child(current, node);
            if current == parent {
                top_level.push(node);
            }
            pos += tag.consumed;

            if is_raw_text_element(&tag.name) && !tag.self_closing {
                let body = &html[pos..];
                let close = find_ascii_case_insensitive(body, &format!("</{}", tag.name));
                let text_end = close.unwrap_or(body.len());
                if text_end > 0 {
                    doc.append_text(node, &body[..text_end]);
                }
                pos += text_end;
                if close.is_some() {
                    pos += html[pos..].find('>').map(|end| end + 1).unwrap_or(html.len() - pos);
                }
            } else if !tag.self_closing && !is_void_element(&tag.name) {
                stack.push((node, tag.name));
            }
            continue;
        }

        // Text runs to the next tag-looking `<`.
        let mut end = rest.len();
        let mut search_from = if rest.starts_with('<') { 1 } else { 0 };
        while let Some(offset) = rest[search_from..].find('<') {
            let candidate = search_from + offset;
            let next = rest.as_bytes().get(candidate + 1).copied();
            if matches!(next, Some(b'/' | b'!' | b'?')) || next.is_some_and(|b| b.is_ascii_alphabetic()) {
                end = candidate;
                break;
            }
            search_from = candidate + 1;
        }
        let text = decode_entities(&rest[..end]);
        let node = doc.append_text(current, text);
        if current == parent {
            top_level.push(node);
        }
        pos += end;
    }

    top_level
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    consumed: usize,
}

fn parse_start_tag(input: &str) -> StartTag {
    let bytes = input.as_bytes();
    let mut pos = 1;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' && bytes[pos] != b'/' {
        pos += 1;
    }
    let name = input[1..pos].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' => {
                pos += 1;
                if bytes.get(pos) == Some(&b'>') {
                    self_closing = true;
                    pos += 1;
                    break;
                }
            }
            _ => {
                let start = pos;
                while pos < bytes.len()
                    && !bytes[pos].is_ascii_whitespace()
                    && !matches!(bytes[pos], b'=' | b'>' | b'/')
                {
                    pos += 1;
                }
                let attr_name = input[start..pos].to_ascii_lowercase();
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                let mut value = String::new();
                if bytes.get(pos) == Some(&b'=') {
                    pos += 1;
                    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                        pos += 1;
                    }
                    match bytes.get(pos) {
                        Some(&quote @ (b'"' | b'\'')) => {
                            let body_start = pos + 1;
                            let body_end = input[body_start..]
                                .find(quote as char)
                                .map(|offset| body_start + offset)
                                .unwrap_or(input.len());
                            value = decode_entities(&input[body_start..body_end]);
                            pos = (body_end + 1).min(input.len());
                        }
                        _ => {
                            let body_start = pos;
                            while pos < bytes.len()
                                && !bytes[pos].is_ascii_whitespace()
                                && bytes[pos] != b'>'
                            {
                                pos += 1;
                            }
                            value = decode_entities(&input[body_start..pos]);
                        }
                    }
                }
                if !attr_name.is_empty() {
                    attrs.push((attr_name, value));
                }
            }
        }
    }

    StartTag {
        name,
        attrs,
        self_closing,
        consumed: pos,
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Decodes the named entities the page shells emit plus numeric references.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
