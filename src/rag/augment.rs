//! 增强提示构建
//!
//! augment(query, context) 是纯函数：输出只由两个输入决定，布局固定，
//! 编排器直接调用与 Agent 通过 augment_prompt 工具调用得到的结果逐字节一致。

/// 检索上下文段落标题
pub const CONTEXT_LABEL: &str = "Retrieved Context:";
/// 用户问题段落标题
pub const QUERY_LABEL: &str = "User Query:";
/// 约束 Agent 仅依据上下文作答
pub const GROUNDING_INSTRUCTION: &str = "Answer the user query using only the retrieved context above. If the context does not contain the answer, say that the provided documents do not cover it.";

/// 由用户问题与检索上下文构建增强提示
pub fn augment(query: &str, context: &str) -> String {
    format!("{CONTEXT_LABEL}\n{context}\n\n{QUERY_LABEL}\n{query}\n\n{GROUNDING_INSTRUCTION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::NO_CONTEXT;

    #[test]
    fn test_layout_is_fixed() {
        let prompt = augment("What is covered?", "Document: Lost baggage is covered.");
        assert_eq!(
            prompt,
            "Retrieved Context:\nDocument: Lost baggage is covered.\n\n\
             User Query:\nWhat is covered?\n\n\
             Answer the user query using only the retrieved context above. \
             If the context does not contain the answer, say that the provided documents do not cover it."
        );
    }

    #[test]
    fn test_is_deterministic_and_contains_inputs() {
        let inputs = [
            ("", ""),
            ("q", NO_CONTEXT),
            ("Can you explain Contoso's travel insurance coverage?", "Document: a\n\nDocument: b"),
            ("旅行保险包括什么？", "Document: 医疗急救"),
        ];
        for (query, context) in inputs {
            let first = augment(query, context);
            assert_eq!(first, augment(query, context));
            assert!(first.contains(query));
            assert!(first.contains(context));
        }
    }

    #[test]
    fn test_context_precedes_query() {
        let prompt = augment("QUERY-MARK", "CONTEXT-MARK");
        let ctx = prompt.find("CONTEXT-MARK").unwrap();
        let query = prompt.find("QUERY-MARK").unwrap();
        assert!(ctx < query);
        assert!(prompt.ends_with(GROUNDING_INSTRUCTION));
    }
}
