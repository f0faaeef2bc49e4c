//! 文本分段器
//!
//! 将过长的文本切分为不超过 `max_len` 字符的片段，尽量沿自然边界切分：
//! 先按空行分段落，段落过长时按句末标点，再退到逗号/分号，最后按空白。
//! 片段按贪心方式累积；当前累积长度不足 `min_len` 时会继续细分下一块，
//! 避免产生过碎的片段。单个无法再切分的词超过 `max_len` 时原样输出。

use std::collections::VecDeque;

/// 切分粒度，由粗到细
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Granularity {
    Paragraph,
    Sentence,
    Clause,
    Word,
}

impl Granularity {
    fn finer(self) -> Option<Granularity> {
        match self {
            Granularity::Paragraph => Some(Granularity::Sentence),
            Granularity::Sentence => Some(Granularity::Clause),
            Granularity::Clause => Some(Granularity::Word),
            Granularity::Word => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    level: Granularity,
    ends_paragraph: bool,
}

/// 片段之后的边界类型，决定重组译文时的连接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    /// 段落内部：空格连接，两侧有中日文字符时直接相连
    #[default]
    Inline,
    /// 原文在此处换行
    LineBreak,
    /// 段落边界：空行连接
    Paragraph,
}

impl Boundary {
    fn glue(self, before: &str, after: &str) -> &'static str {
        match self {
            Boundary::Paragraph => "\n\n",
            Boundary::LineBreak => "\n",
            Boundary::Inline
                if before.chars().last().is_some_and(is_cjk)
                    || after.chars().next().is_some_and(is_cjk) =>
            {
                ""
            }
            Boundary::Inline => " ",
        }
    }
}

/// 带边界信息的片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// 片段之后是否是段落边界（重组译文时用空行连接）
    pub paragraph_break_after: bool,
    /// 片段在段落内部的换行处结束
    pub line_break_after: bool,
}

impl Segment {
    pub fn char_count(&self) -> usize {
        char_len(&self.text)
    }

    pub fn boundary(&self) -> Boundary {
        if self.paragraph_break_after {
            Boundary::Paragraph
        } else if self.line_break_after {
            Boundary::LineBreak
        } else {
            Boundary::Inline
        }
    }
}

/// 将文本切分为有序片段
pub fn split_into_segments(text: &str, max_len: usize, min_len: usize) -> Vec<String> {
    split_with_boundaries(text, max_len, min_len)
        .into_iter()
        .map(|segment| segment.text)
        .collect()
}

/// 切分文本并保留每个片段之后的边界类型
pub fn split_with_boundaries(text: &str, max_len: usize, min_len: usize) -> Vec<Segment> {
    let max_len = max_len.max(1);
    let mut pending: VecDeque<Piece> = split_paragraphs(text)
        .into_iter()
        .map(|paragraph| Piece {
            text: paragraph,
            level: Granularity::Paragraph,
            ends_paragraph: true,
        })
        .collect();

    let mut segments = Vec::new();
    let mut acc = Accumulator::default();

    while let Some(piece) = pending.pop_front() {
        if char_len(piece.text.trim()) > max_len {
            if let Some(parts) = refine(&piece) {
                prepend(&mut pending, parts);
                continue;
            }
        }

        if acc.is_empty() {
            acc.push(piece);
            continue;
        }

        if char_len(acc.joined(&piece).trim()) <= max_len {
            acc.push(piece);
            continue;
        }

        // 累积内容过短时，先尝试把下一块切细再合并
        if acc.len() < min_len {
            if let Some(parts) = refine(&piece) {
                prepend(&mut pending, parts);
                continue;
            }
        }

        segments.push(acc.take());
        acc.push(piece);
    }

    if !acc.is_empty() {
        segments.push(acc.take());
    }

    segments
}

/// 将各片段的译文重新拼接为一段文本
///
/// 段落边界用空行连接，原文换行处用换行连接；
/// 其余边界在两侧都不是中日文字符时补一个空格。
pub fn rejoin_segments<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = (&'a str, Boundary)>,
{
    let mut out = String::new();
    let mut previous = Boundary::Inline;

    for (text, boundary) in parts {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            let glue = previous.glue(&out, text);
            out.push_str(glue);
        }
        out.push_str(text);
        previous = boundary;
    }

    out
}

#[derive(Default)]
struct Accumulator {
    text: String,
    ends_paragraph: bool,
}

impl Accumulator {
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn len(&self) -> usize {
        char_len(self.text.trim())
    }

    fn joined(&self, piece: &Piece) -> String {
        if self.text.is_empty() {
            piece.text.clone()
        } else if self.ends_paragraph {
            format!("{}\n\n{}", self.text.trim_end(), piece.text)
        } else {
            format!("{}{}", self.text, piece.text)
        }
    }

    fn push(&mut self, piece: Piece) {
        self.text = self.joined(&piece);
        self.ends_paragraph = piece.ends_paragraph;
    }

    fn take(&mut self) -> Segment {
        let trailing = &self.text[self.text.trim_end().len()..];
        let segment = Segment {
            text: self.text.trim().to_string(),
            paragraph_break_after: self.ends_paragraph,
            line_break_after: !self.ends_paragraph && trailing.contains('\n'),
        };
        *self = Accumulator::default();
        segment
    }
}

/// 按更细的粒度切分，只有切出两块以上才算成功
fn refine(piece: &Piece) -> Option<Vec<Piece>> {
    let mut level = piece.level;

    while let Some(finer) = level.finer() {
        let parts = match finer {
            Granularity::Sentence => split_sentences(&piece.text),
            Granularity::Clause => split_clauses(&piece.text),
            Granularity::Word => split_words(&piece.text),
            Granularity::Paragraph => unreachable!(),
        };

        if parts.len() > 1 {
            let last = parts.len() - 1;
            return Some(
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| Piece {
                        text,
                        level: finer,
                        ends_paragraph: i == last && piece.ends_paragraph,
                    })
                    .collect(),
            );
        }
        level = finer;
    }

    None
}

fn prepend(pending: &mut VecDeque<Piece>, parts: Vec<Piece>) {
    for part in parts.into_iter().rev() {
        pending.push_front(part);
    }
}

/// 按空行切分段落
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs
}

fn is_latin_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_cjk_sentence_end(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_latin_clause_end(c: char) -> bool {
    matches!(c, ',' | ';')
}

fn is_cjk_clause_end(c: char) -> bool {
    matches!(c, '，' | '；' | '、')
}

fn split_sentences(text: &str) -> Vec<String> {
    split_after_punctuation(text, is_latin_sentence_end, is_cjk_sentence_end)
}

fn split_clauses(text: &str) -> Vec<String> {
    split_after_punctuation(text, is_latin_clause_end, is_cjk_clause_end)
}

/// 在标点之后切分，标点和其后的空白留在前一块。
/// 拉丁标点只有后跟空白或位于末尾时才算边界（避免切开 "3.14"、"e.g."）。
fn split_after_punctuation(
    text: &str,
    latin: fn(char) -> bool,
    cjk: fn(char) -> bool,
) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let is_mark = |c: char| latin(c) || cjk(c);
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !is_mark(chars[i].1) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && is_mark(chars[j].1) {
            j += 1;
        }

        let has_cjk_mark = chars[i..j].iter().any(|&(_, c)| cjk(c));
        let at_boundary = has_cjk_mark || j == chars.len() || chars[j].1.is_whitespace();

        if at_boundary {
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            let end = chars.get(j).map_or(text.len(), |&(offset, _)| offset);
            parts.push(text[start..end].to_string());
            start = end;
        }
        i = j;
    }

    if start < text.len() {
        parts.push(text[start..].to_string());
    }

    parts.retain(|part| !part.trim().is_empty());
    parts
}

/// 在空白之后切分
fn split_words(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            parts.push(std::mem::take(&mut current));
            in_space = false;
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts.retain(|part| !part.trim().is_empty());
    parts
}

/// 中日文字符与全角标点
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3000}'..='\u{303F}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}')
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
