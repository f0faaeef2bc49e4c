//! 批次规划
//!
//! 把多个翻译单元贪心地打包成若干批次，每个批次对应一次远端调用。
//! 超过最大分段长度的单元先经 [`segmenter`](super::segmenter) 切分，
//! 切出的片段与普通单元一样参与打包，并记录回原单元的映射，
//! 以便译文按原顺序拼回。
//!
//! 批次文本的编码格式为：
//!
//! ```text
//! [[0]] 第一项
//!
//! [[1]] 第二项
//! ```
//!
//! 正文中形如 `[[n]]` 的文本编码时前加反斜杠转义（`\[[n]]`），解码后还原，
//! 因此只有不带反斜杠的标记才会被当作分项边界。
//! 解码时优先按索引标记取回译文，标记缺失时才按位置对应。

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::segmenter::{rejoin_segments, split_with_boundaries, Boundary, Segment};
use crate::translation::config::{constants, SchedulerConfig};

/// 批次中的一项：某个单元的某个片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// 在提交中的单元下标
    pub unit_index: usize,
    /// 在该单元切分结果中的片段下标
    pub segment_index: usize,
    pub text: String,
}

/// 一次远端调用的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: usize,
    pub items: Vec<BatchItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 编码后的字符数
    pub fn encoded_chars(&self) -> usize {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| encoded_item_chars(i, &item.text))
            .sum::<usize>()
            + separator_chars(self.items.len())
    }

    /// 发送给翻译服务的文本
    pub fn encode(&self) -> String {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{} {}", marker(i), escape_markers(&item.text)))
            .collect::<Vec<_>>()
            .join(constants::JOIN_SEPARATOR)
    }

    /// 把响应拆回各项，结果下标与 `items` 一致；无法对应的位置为 `None`
    pub fn decode(&self, response: &str) -> Vec<Option<String>> {
        decode_indexed(response, self.items.len())
    }
}

/// 单元的切分布局：每个片段之后的边界类型
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitLayout {
    pub boundaries: Vec<Boundary>,
}

impl UnitLayout {
    pub fn segment_count(&self) -> usize {
        self.boundaries.len()
    }

    /// 把各片段译文按原顺序拼回；任一片段缺失时返回 `None`
    pub fn rejoin(&self, translations: &[Option<String>]) -> Option<String> {
        if translations.len() != self.segment_count() {
            return None;
        }
        if translations.len() == 1 {
            return translations[0].as_ref().map(|text| text.trim().to_string());
        }

        let mut parts = Vec::with_capacity(translations.len());
        for (translation, boundary) in translations.iter().zip(&self.boundaries) {
            parts.push((translation.as_deref()?, *boundary));
        }
        Some(rejoin_segments(parts))
    }
}

/// 规划结果
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// 以单元下标为键的切分布局
    pub layouts: HashMap<usize, UnitLayout>,
}

impl BatchPlan {
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn item_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// 规划批次
///
/// `units` 为 `(单元下标, 文本)`，按提交顺序给出。空文本应由调用方提前剔除。
pub fn plan_batches<'a, I>(units: I, config: &SchedulerConfig) -> BatchPlan
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut plan = BatchPlan::default();
    let mut current: Vec<BatchItem> = Vec::new();
    let mut current_chars = 0usize;

    for (unit_index, text) in units {
        let segments = segment_unit(text, config);
        plan.layouts.insert(
            unit_index,
            UnitLayout {
                boundaries: segments.iter().map(Segment::boundary).collect(),
            },
        );

        for (segment_index, segment) in segments.into_iter().enumerate() {
            let position = current.len();
            let added = encoded_item_chars(position, &segment.text)
                + if position == 0 { 0 } else { constants::JOIN_SEPARATOR.len() };

            if !current.is_empty() && current_chars + added > config.max_batch_chars {
                flush(&mut plan, &mut current);
                current_chars = encoded_item_chars(0, &segment.text);
            } else {
                current_chars += added;
            }

            current.push(BatchItem {
                unit_index,
                segment_index,
                text: segment.text,
            });
        }
    }

    flush(&mut plan, &mut current);

    tracing::debug!(
        "规划了 {} 个批次，共 {} 项",
        plan.batch_count(),
        plan.item_count()
    );

    plan
}

fn segment_unit(text: &str, config: &SchedulerConfig) -> Vec<Segment> {
    let text = text.trim();
    if text.chars().count() <= config.max_segment_length {
        return vec![Segment {
            text: text.to_string(),
            paragraph_break_after: false,
            line_break_after: false,
        }];
    }
    split_with_boundaries(text, config.max_segment_length, config.min_segment_length)
}

fn flush(plan: &mut BatchPlan, current: &mut Vec<BatchItem>) {
    if current.is_empty() {
        return;
    }
    let id = plan.batches.len();
    plan.batches.push(Batch {
        id,
        items: std::mem::take(current),
    });
}

fn marker(index: usize) -> String {
    format!("[[{}]]", index)
}

fn encoded_item_chars(index: usize, text: &str) -> usize {
    // 标记 + 空格 + 转义后的正文
    marker(index).len() + 1 + escape_markers(text).chars().count()
}

fn separator_chars(items: usize) -> usize {
    items.saturating_sub(1) * constants::JOIN_SEPARATOR.len()
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(\\*)\[\[(\d+)\]\][ \t]*").expect("marker pattern is valid"))
}

fn escaped_regex() -> &'static Regex {
    static ESCAPED: OnceLock<Regex> = OnceLock::new();
    ESCAPED.get_or_init(|| Regex::new(r"\\(\\*\[\[\d+\]\])").expect("escape pattern is valid"))
}

/// 给正文中形如 `[[n]]` 的文本加一个反斜杠，使其不会被当作分项标记
pub fn escape_markers(text: &str) -> Cow<'_, str> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN
        .get_or_init(|| Regex::new(r"\\*\[\[\d+\]\]").expect("token pattern is valid"))
        .replace_all(text, r"\$0")
}

/// [`escape_markers`] 的逆操作
pub fn unescape_markers(text: &str) -> Cow<'_, str> {
    escaped_regex().replace_all(text, "$1")
}

/// 解析带索引标记的响应
///
/// - 标记可以出现在任意位置，前面带反斜杠的是正文里被转义的文本，不算标记
/// - 每个标记到下一个标记之间的文本为该项译文，越界或重复的索引忽略
/// - 标记数多于期望项数说明分项已经错乱，整批视为无法对应
/// - 没有任何标记时：只期望一项则整段作为译文；
///   否则按空行（再退到单个换行）切分，数量吻合才按位置对应
pub fn decode_indexed(response: &str, expected: usize) -> Vec<Option<String>> {
    let mut results: Vec<Option<String>> = vec![None; expected];
    let markers: Vec<(usize, usize, usize)> = marker_regex()
        .captures_iter(response)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            if !captures.get(1)?.as_str().is_empty() {
                return None;
            }
            let index = captures.get(2)?.as_str().parse::<usize>().ok()?;
            Some((index, whole.start(), whole.end()))
        })
        .collect();

    if markers.is_empty() {
        for (slot, text) in results.iter_mut().zip(positional_split(response, expected)) {
            *slot = Some(unescape_markers(&text).into_owned());
        }
        return results;
    }

    if markers.len() > expected {
        tracing::warn!("响应中有 {} 个索引标记，多于期望的 {} 项", markers.len(), expected);
        return results;
    }

    for (i, &(index, _, text_start)) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(response.len(), |&(_, start, _)| start);
        let text = response[text_start..end].trim();

        match results.get_mut(index) {
            Some(slot) => {
                // 重复的索引只取第一次出现
                if slot.is_none() && !text.is_empty() {
                    *slot = Some(unescape_markers(text).into_owned());
                }
            }
            None => tracing::debug!("忽略越界的索引标记 [[{}]]", index),
        }
    }

    results
}

fn positional_split(response: &str, expected: usize) -> Vec<String> {
    let response = response.trim();
    if response.is_empty() {
        return Vec::new();
    }
    if expected == 1 {
        return vec![response.to_string()];
    }

    for separator in [constants::JOIN_SEPARATOR, "\n"] {
        let parts: Vec<String> = response
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if parts.len() == expected {
            return parts;
        }
    }

    tracing::warn!("响应中没有索引标记且分段数量与期望的 {} 不符", expected);
    Vec::new()
}
