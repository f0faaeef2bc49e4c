//! 翻译单元
//!
//! 一个翻译单元对应页面上的一个文本节点：调用方提供的标识、源文本以及译文槽位。

use crate::translation::error::TranslationError;

/// 翻译单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    /// 调用方的不透明标识（例如节点路径）
    pub id: String,
    /// 去除首尾空白后的源文本
    pub text: String,
    /// 译文，翻译成功后写入
    pub translation: Option<String>,
}

impl TranslationUnit {
    pub fn new(id: impl Into<String>, text: impl AsRef<str>) -> Self {
        Self {
            id: id.into(),
            text: text.as_ref().trim().to_string(),
            translation: None,
        }
    }

    /// 字符数（按Unicode标量计）
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_translated(&self) -> bool {
        self.translation.is_some()
    }
}

static UNREPORTED: TranslationError = TranslationError::Cancelled;

/// 单个单元的失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub id: String,
    pub error: TranslationError,
}

/// 一次提交的结果
///
/// `units` 保持提交时的顺序；每个单元要么带有译文，要么在 `failures` 中有一条记录。
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    pub units: Vec<TranslationUnit>,
    pub failures: Vec<UnitFailure>,
}

impl SubmissionReport {
    /// 所有单元均已翻译
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn translated_count(&self) -> usize {
        self.units.iter().filter(|unit| unit.is_translated()).count()
    }

    /// 查找某个单元的译文
    pub fn translation_of(&self, id: &str) -> Option<&str> {
        self.units
            .iter()
            .find(|unit| unit.id == id)
            .and_then(|unit| unit.translation.as_deref())
    }

    /// 查找某个单元的失败原因
    pub fn failure_of(&self, id: &str) -> Option<&TranslationError> {
        self.failures
            .iter()
            .find(|failure| failure.id == id)
            .map(|failure| &failure.error)
    }

    /// 按提交顺序返回 `id -> 译文 | 错误`
    pub fn results(&self) -> Vec<(&str, Result<&str, &TranslationError>)> {
        self.units
            .iter()
            .map(|unit| {
                let result = match (&unit.translation, self.failure_of(&unit.id)) {
                    (Some(text), _) => Ok(text.as_str()),
                    (None, Some(error)) => Err(error),
                    // 由调度器保证不会出现
                    (None, None) => Err(&UNREPORTED),
                };
                (unit.id.as_str(), result)
            })
            .collect()
    }
}
