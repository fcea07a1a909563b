//! 索引播种：内置示例文档、从目录加载文档、建索引并上传

use std::path::Path;

use walkdir::WalkDir;

use crate::core::RagError;
use crate::index::{Document, DocumentIndex, IndexSchema};

/// 作为文档读取的扩展名
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// 内置示例语料（保险 / 差旅场景）
pub fn sample_documents() -> Vec<Document> {
    vec![
        Document::new(
            "1",
            "Contoso's travel insurance covers medical emergencies, trip cancellations, and lost baggage.",
        ),
        Document::new(
            "2",
            "Contoso's travel insurance does not cover pre-existing conditions or extreme sports injuries.",
        ),
        Document::new(
            "3",
            "Claims for Contoso travel insurance must be submitted within 30 days of returning home, with receipts attached.",
        ),
        Document::new(
            "4",
            "Contoso employees booking business travel must use the corporate travel portal and economy class for flights under six hours.",
        ),
    ]
}

/// 由相对路径生成文档 key：仅保留字母、数字、'_'、'-'、'='（Azure AI Search key 字符集）
fn document_id(relative: &Path) -> String {
    relative
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '=' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 递归读取目录下的 .txt / .md 文件，每个文件一篇文档；空文件跳过，结果按路径排序
pub fn load_documents_from_dir(dir: &Path) -> Result<Vec<Document>, RagError> {
    if !dir.is_dir() {
        return Err(RagError::Index(format!(
            "seed directory not found: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| RagError::Index(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_document = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if !is_document {
            continue;
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Index(format!("{}: {}", path.display(), e)))?;
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!(path = %path.display(), "skipping empty document");
            continue;
        }
        let relative = path.strip_prefix(dir).unwrap_or(path);
        documents.push(Document::new(document_id(relative), content));
    }
    Ok(documents)
}

/// 建索引并上传文档，返回上传条数
pub async fn seed_index(
    index: &dyn DocumentIndex,
    schema: &IndexSchema,
    documents: &[Document],
) -> Result<usize, RagError> {
    index.create_index(schema).await.map_err(RagError::Index)?;
    let uploaded = index.upload(documents).await.map_err(RagError::Index)?;
    tracing::info!(uploaded, "document index seeded");
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;

    #[test]
    fn test_document_id_sanitizes_path() {
        assert_eq!(document_id(Path::new("policies/travel v2.md")), "policies_travel_v2_md");
    }

    #[test]
    fn test_load_documents_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second doc").unwrap();
        std::fs::write(dir.path().join("a.md"), "first doc\n").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();
        std::fs::write(dir.path().join("image.png"), "binary").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "nested doc").unwrap();

        let docs = load_documents_from_dir(dir.path()).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a_md", "b_txt", "nested_c_txt"]);
        assert_eq!(docs[0].content, "first doc");
    }

    #[test]
    fn test_load_documents_missing_dir() {
        let err = load_documents_from_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, RagError::Index(_)));
    }

    #[tokio::test]
    async fn test_seed_index_uploads_samples() {
        let index = InMemoryIndex::new();
        let n = seed_index(&index, &IndexSchema::default(), &sample_documents())
            .await
            .unwrap();
        assert_eq!(n, sample_documents().len());
        assert_eq!(index.len(), n);
    }
}
