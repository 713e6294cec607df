//! Markdown standardizer.
//!
//! Splits a document into sections at ATX headings (`#` through `######`) so
//! that every non-heading line belongs to exactly one section, and extracts
//! headings, links, images, fenced code blocks, and list runs.

use crate::document::{
    CodeBlock, DocumentPayload, ListGroup, ListItem, MarkdownData, MarkdownHeading, MarkdownImage,
    MarkdownLink, MarkdownLists, MarkdownSection, MarkdownStatistics, StandardizedDocument,
};
use crate::meta::{DocumentMetadata, UploadedFile};

pub fn standardize(file: &UploadedFile) -> StandardizedDocument {
    let metadata = DocumentMetadata::build(file, "md");
    let content = file.text();
    let lines: Vec<&str> = content.split('\n').collect();

    let (sections, headings) = extract_structure(&lines);
    let links = extract_links(&content);
    let images = extract_images(&content);
    let code_blocks = extract_code_blocks(&lines);
    let lists = extract_lists(&lines);

    let statistics = MarkdownStatistics {
        total_characters: content.chars().count(),
        total_words: content.split_whitespace().count(),
        total_lines: lines.len(),
        heading_count: headings.len(),
        link_count: links.len(),
        image_count: images.len(),
        code_block_count: code_blocks.len(),
        list_count: lists.ordered.len() + lists.unordered.len(),
    };

    StandardizedDocument {
        metadata,
        payload: DocumentPayload::Markdown {
            data: MarkdownData {
                full_text: content,
                sections,
                headings,
                links,
                images,
                code_blocks,
                lists,
            },
            statistics,
        },
    }
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    let title = rest.strip_prefix(' ').or_else(|| rest.strip_prefix('\t'))?;
    let title = title.trim();
    (!title.is_empty()).then_some((hashes, title))
}

/// Split the document into sections. Content before the first heading goes
/// into an implicit level-0 "Introduction" section (omitted when empty); each
/// heading opens a section that runs to the next heading, and a heading with
/// no body still gets an empty section.
fn extract_structure(lines: &[&str]) -> (Vec<MarkdownSection>, Vec<MarkdownHeading>) {
    let mut sections = Vec::new();
    let mut headings = Vec::new();

    let mut title = "Introduction".to_string();
    let mut level = 0usize;
    let mut body: Vec<&str> = Vec::new();
    let mut opened_by_heading = false;

    for (line_index, line) in lines.iter().enumerate() {
        if let Some((depth, heading_title)) = parse_heading(line) {
            if opened_by_heading || !body.iter().all(|l| l.trim().is_empty()) {
                sections.push(MarkdownSection {
                    id: format!("section-{}", sections.len()),
                    title,
                    level,
                    content: body.join("\n"),
                });
            }
            body = Vec::new();
            title = heading_title.to_string();
            level = depth;
            opened_by_heading = true;
            headings.push(MarkdownHeading {
                title: heading_title.to_string(),
                level: depth,
                line: line_index,
            });
        } else {
            body.push(line);
        }
    }

    if opened_by_heading || !body.iter().all(|l| l.trim().is_empty()) {
        sections.push(MarkdownSection {
            id: format!("section-{}", sections.len()),
            title,
            level,
            content: body.join("\n"),
        });
    }

    (sections, headings)
}

/// Inline links `[text](url)`, excluding image links.
fn extract_links(content: &str) -> Vec<MarkdownLink> {
    scan_bracket_pairs(content)
        .into_iter()
        .filter(|(is_image, ..)| !is_image)
        .map(|(_, text, url, position)| MarkdownLink {
            text,
            url,
            position,
        })
        .collect()
}

/// Image references `![alt](url)`.
fn extract_images(content: &str) -> Vec<MarkdownImage> {
    scan_bracket_pairs(content)
        .into_iter()
        .filter(|(is_image, ..)| *is_image)
        .map(|(_, alt, url, position)| MarkdownImage {
            alt,
            url,
            position,
        })
        .collect()
}

/// Find `[..](..)` pairs, flagging ones preceded by `!`. Position is the
/// char offset of the opening bracket (or the `!` for images).
fn scan_bracket_pairs(content: &str) -> Vec<(bool, String, String, usize)> {
    let chars: Vec<char> = content.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '[' {
            i += 1;
            continue;
        }
        let is_image = i > 0 && chars[i - 1] == '!';
        let Some(close) = find_from(&chars, i + 1, ']') else {
            i += 1;
            continue;
        };
        if chars.get(close + 1) != Some(&'(') {
            i = close + 1;
            continue;
        }
        let Some(paren_close) = find_from(&chars, close + 2, ')') else {
            i = close + 1;
            continue;
        };
        let text: String = chars[i + 1..close].iter().collect();
        let url: String = chars[close + 2..paren_close].iter().collect();
        if !url.is_empty() && (is_image || !text.is_empty()) {
            let position = if is_image { i - 1 } else { i };
            found.push((is_image, text, url, position));
        }
        i = paren_close + 1;
    }
    found
}

fn find_from(chars: &[char], start: usize, needle: char) -> Option<usize> {
    chars[start..]
        .iter()
        .position(|c| *c == needle)
        .map(|p| start + p)
}

/// Fenced code blocks delimited by ``` lines. An unclosed fence runs to the
/// end of the document.
fn extract_code_blocks(lines: &[&str]) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, Vec<&str>, usize)> = None;

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            match open.take() {
                Some((language, code, start_line)) => blocks.push(CodeBlock {
                    language,
                    code: code.join("\n"),
                    start_line,
                    end_line: index,
                }),
                None => {
                    let language = trimmed.trim_start_matches('`').trim().to_string();
                    open = Some((language, Vec::new(), index));
                }
            }
        } else if let Some((_, code, _)) = open.as_mut() {
            code.push(line);
        }
    }

    if let Some((language, code, start_line)) = open {
        blocks.push(CodeBlock {
            language,
            code: code.join("\n"),
            start_line,
            end_line: lines.len().saturating_sub(1),
        });
    }

    blocks
}

enum ListKind {
    Ordered,
    Unordered,
}

fn parse_list_item(line: &str) -> Option<(ListKind, usize, &str)> {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];

    if let Some(stripped) = rest
        .strip_prefix('*')
        .or_else(|| rest.strip_prefix('-'))
        .or_else(|| rest.strip_prefix('+'))
    {
        let content = stripped.strip_prefix(' ')?.trim();
        return (!content.is_empty()).then_some((ListKind::Unordered, indent, content));
    }

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after.strip_prefix('.') {
            let content = stripped.strip_prefix(' ')?.trim();
            return (!content.is_empty()).then_some((ListKind::Ordered, indent, content));
        }
    }
    None
}

/// Group consecutive list items into runs; a non-item line closes the run,
/// and switching between ordered and unordered starts a new one.
fn extract_lists(lines: &[&str]) -> MarkdownLists {
    let mut lists = MarkdownLists::default();
    let mut current: Option<(ListKind, ListGroup)> = None;

    let close = |lists: &mut MarkdownLists, run: (ListKind, ListGroup)| match run.0 {
        ListKind::Ordered => lists.ordered.push(run.1),
        ListKind::Unordered => lists.unordered.push(run.1),
    };

    for (index, line) in lines.iter().enumerate() {
        match parse_list_item(line) {
            Some((kind, indent, content)) => {
                let switch = match (&current, &kind) {
                    (Some((ListKind::Ordered, _)), ListKind::Unordered) => true,
                    (Some((ListKind::Unordered, _)), ListKind::Ordered) => true,
                    _ => false,
                };
                if switch {
                    if let Some(run) = current.take() {
                        close(&mut lists, run);
                    }
                }
                let (_, group) = current.get_or_insert_with(|| {
                    (
                        kind,
                        ListGroup {
                            items: Vec::new(),
                            start_line: index,
                            end_line: index,
                            indent,
                        },
                    )
                });
                group.items.push(ListItem {
                    content: content.to_string(),
                    line: index,
                    indent,
                });
                group.end_line = index;
            }
            None => {
                if let Some(run) = current.take() {
                    close(&mut lists, run);
                }
            }
        }
    }

    if let Some(run) = current.take() {
        close(&mut lists, run);
    }

    lists
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(content: &str) -> MarkdownData {
        let doc = standardize(&UploadedFile::from_bytes(
            "t.md",
            content.as_bytes().to_vec(),
        ));
        match doc.payload {
            DocumentPayload::Markdown { data, .. } => data,
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn sections_cover_every_non_heading_line() {
        let content = "intro line\n\n# One\nbody a\n## Two\n\n# Three\nbody c\n";
        let data = md(content);

        let expected: Vec<&str> = content
            .split('\n')
            .filter(|l| parse_heading(l).is_none())
            .collect();
        let covered: Vec<String> = data
            .sections
            .iter()
            .flat_map(|s| s.content.split('\n').map(str::to_string))
            .collect();
        assert_eq!(covered, expected);

        assert_eq!(data.sections[0].title, "Introduction");
        assert_eq!(data.sections[0].level, 0);
        assert_eq!(data.sections[1].title, "One");
        assert_eq!(data.sections[2].title, "Two");
        assert_eq!(data.sections[2].content, "");
        assert_eq!(data.sections[3].id, "section-3");
    }

    #[test]
    fn no_introduction_section_when_document_opens_with_heading() {
        let data = md("# Top\nbody\n");
        assert_eq!(data.sections.len(), 1);
        assert_eq!(data.sections[0].title, "Top");
        assert_eq!(data.headings.len(), 1);
        assert_eq!(data.headings[0].line, 0);
    }

    #[test]
    fn links_and_images_are_distinguished() {
        let data = md("See [docs](https://docs.rs) and ![logo](img.png).");
        assert_eq!(data.links.len(), 1);
        assert_eq!(data.links[0].text, "docs");
        assert_eq!(data.links[0].url, "https://docs.rs");
        assert_eq!(data.images.len(), 1);
        assert_eq!(data.images[0].alt, "logo");
    }

    #[test]
    fn fenced_code_blocks_with_language() {
        let data = md("before\n```rust\nfn main() {}\n```\nafter\n```\nplain\n");
        assert_eq!(data.code_blocks.len(), 2);
        assert_eq!(data.code_blocks[0].language, "rust");
        assert_eq!(data.code_blocks[0].code, "fn main() {}");
        assert_eq!(data.code_blocks[0].start_line, 1);
        assert_eq!(data.code_blocks[0].end_line, 3);
        // Unclosed fence runs to the last line (including the trailing blank).
        assert_eq!(data.code_blocks[1].language, "");
        assert_eq!(data.code_blocks[1].code, "plain\n");
    }

    #[test]
    fn list_runs_split_on_kind_and_blank_lines() {
        let data = md("- a\n- b\n\n1. one\n2. two\n- mixed\n");
        assert_eq!(data.lists.unordered.len(), 2);
        assert_eq!(data.lists.unordered[0].items.len(), 2);
        assert_eq!(data.lists.unordered[0].start_line, 0);
        assert_eq!(data.lists.unordered[0].end_line, 1);
        assert_eq!(data.lists.ordered.len(), 1);
        assert_eq!(data.lists.ordered[0].items[1].content, "two");
    }

    #[test]
    fn statistics_count_extracted_structures() {
        let doc = standardize(&UploadedFile::from_bytes(
            "t.md",
            b"# H\n\nwords here now\n- item\n".to_vec(),
        ));
        match doc.payload {
            DocumentPayload::Markdown { statistics, .. } => {
                assert_eq!(statistics.heading_count, 1);
                assert_eq!(statistics.list_count, 1);
                assert_eq!(statistics.total_words, 7);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
