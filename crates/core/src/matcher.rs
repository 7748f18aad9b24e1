//! 候选插件匹配
//!
//! 按目录枚举顺序查找声明支持请求 MIME 类型的插件（精确或通配），
//! 并记录每个候选实际匹配的 MIME 类型。MIME 类型为空时退回到按 URL 扩展名匹配。

use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::catalog::PluginCatalog;
use crate::errors::CollaboratorResult;
use crate::types::{MimeAssociation, PluginDescriptor};

/// 单次请求中的候选插件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub plugin: Arc<PluginDescriptor>,
    /// 实际匹配的 MIME 类型
    pub actual_mime_type: String,
}

/// 有序候选集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// 与候选一一对应的实际 MIME 类型
    pub fn considered_mime_types(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(|c| c.actual_mime_type.as_str())
            .collect()
    }
}

/// 候选匹配器
#[derive(Clone)]
pub struct CandidateMatcher {
    catalog: Arc<dyn PluginCatalog>,
}

impl CandidateMatcher {
    pub fn new(catalog: Arc<dyn PluginCatalog>) -> Self {
        Self { catalog }
    }

    /// 查找候选插件
    ///
    /// 没有匹配时返回空集合；只有目录本身不可用时才返回错误。
    pub async fn find_candidates(
        &self,
        url: &Url,
        mime_type: &str,
        allow_wildcard: bool,
    ) -> CollaboratorResult<CandidateSet> {
        let plugins = self.catalog.enumerate_plugins().await?;
        let extension = if mime_type.is_empty() {
            url_extension(url)
        } else {
            None
        };

        let candidates: Vec<Candidate> = plugins
            .into_iter()
            .filter_map(|plugin| {
                let associations = self.catalog.mime_associations(&plugin);
                let actual = match_associations(&associations, mime_type, extension, allow_wildcard)?;
                Some(Candidate {
                    plugin: Arc::clone(&plugin),
                    actual_mime_type: actual,
                })
            })
            .collect();

        let set = CandidateSet { candidates };
        debug!(
            "[CandidateMatcher] MIME `{}` 匹配到 {} 个候选",
            mime_type,
            set.len()
        );
        Ok(set)
    }
}

/// 在一个插件的关联中查找匹配，返回实际 MIME 类型
///
/// 同一插件内精确匹配优先于通配匹配。
fn match_associations(
    associations: &[MimeAssociation],
    mime_type: &str,
    extension: Option<&str>,
    allow_wildcard: bool,
) -> Option<String> {
    if !mime_type.is_empty() {
        let matched = associations.iter().any(|a| a.matches_exact(mime_type))
            || (allow_wildcard && associations.iter().any(|a| a.matches_wildcard(mime_type)));
        return matched.then(|| mime_type.to_string());
    }

    let extension = extension?;
    associations
        .iter()
        .find(|a| !a.is_wildcard && a.matches_extension(extension))
        .map(|a| a.mime_type.clone())
}

/// URL 路径最后一段的扩展名
fn url_extension(url: &Url) -> Option<&str> {
    let last_segment = url.path_segments()?.last()?;
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::types::PluginType;

    fn test_catalog() -> Arc<dyn PluginCatalog> {
        Arc::new(StaticCatalog::new(vec![
            PluginDescriptor::new("pdf", "PDF Viewer", PluginType::Sandboxed).with_mime(
                MimeAssociation::exact("application/pdf").with_extensions(["pdf"]),
            ),
            PluginDescriptor::new("video", "Video", PluginType::SandboxedOutOfProcess)
                .with_mime(MimeAssociation::wildcard("video/*")),
            PluginDescriptor::new("legacy", "Legacy", PluginType::LegacyInProcess)
                .with_mime(MimeAssociation::wildcard("*/*")),
        ]))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ids(set: &CandidateSet) -> Vec<&str> {
        set.candidates.iter().map(|c| c.plugin.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_exact_and_wildcard_in_catalog_order() {
        let matcher = CandidateMatcher::new(test_catalog());
        let set = matcher
            .find_candidates(&url("https://a.test/x"), "application/pdf", true)
            .await
            .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(ids(&set), vec!["pdf", "legacy"]);
        assert_eq!(
            set.considered_mime_types(),
            vec!["application/pdf", "application/pdf"]
        );
    }

    #[tokio::test]
    async fn test_wildcard_disabled() {
        let matcher = CandidateMatcher::new(test_catalog());
        let set = matcher
            .find_candidates(&url("https://a.test/x"), "video/mp4", false)
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_top_level_wildcard() {
        let matcher = CandidateMatcher::new(test_catalog());
        let set = matcher
            .find_candidates(&url("https://a.test/x"), "video/mp4", true)
            .await
            .unwrap();
        assert_eq!(ids(&set), vec!["video", "legacy"]);
    }

    #[tokio::test]
    async fn test_empty_mime_falls_back_to_extension() {
        let matcher = CandidateMatcher::new(test_catalog());
        let set = matcher
            .find_candidates(&url("https://a.test/files/report.PDF?dl=1"), "", true)
            .await
            .unwrap();

        assert_eq!(ids(&set), vec!["pdf"]);
        assert_eq!(set.candidates[0].actual_mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_empty_mime_without_extension_matches_nothing() {
        let matcher = CandidateMatcher::new(test_catalog());
        let set = matcher
            .find_candidates(&url("https://a.test/files/"), "", true)
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_matching_is_case_sensitive() {
        let matcher = CandidateMatcher::new(Arc::new(StaticCatalog::new(vec![
            PluginDescriptor::new("pdf", "PDF", PluginType::Sandboxed)
                .with_mime(MimeAssociation::exact("application/pdf")),
        ])));
        let set = matcher
            .find_candidates(&url("https://a.test/x"), "Application/PDF", true)
            .await
            .unwrap();
        assert!(set.is_empty());
    }
}
