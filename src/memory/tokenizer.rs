//! 检索分词
//!
//! 中英文混合：含 CJK 字符时用 jieba 搜索引擎模式切词，否则按空白切词；
//! 统一小写、去掉首尾标点、过滤英文停用词，供内存索引做关键词匹配。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 英文停用词：疑问词、冠词、介词等，不参与打分
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "am", "do", "does", "did",
    "what", "which", "who", "whom", "how", "why", "when", "where", "can", "could", "would",
    "should", "will", "shall", "may", "might", "you", "your", "me", "my", "we", "our", "it",
    "its", "this", "that", "these", "those", "of", "to", "in", "on", "at", "by", "for", "from",
    "with", "about", "and", "or", "but", "not", "no", "so", "if", "as", "into", "please",
    "tell", "there", "their", "them", "they", "he", "she", "his", "her", "any", "some",
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// 去掉首尾非字母数字字符（保留词内撇号，如 contoso's）
fn normalize(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// 分词：返回有序词列表（可能重复）
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let raw: Vec<String> = if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(normalize)
            .collect()
    } else {
        text.split_whitespace().map(normalize).collect()
    };

    raw.into_iter()
        .filter(|t| !t.is_empty())
        .filter(|t| t.chars().count() > 1 || t.chars().next().is_some_and(is_cjk))
        .filter(|t| !is_stopword(t))
        .collect()
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 重叠分数：两个词集合的交集大小
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}
